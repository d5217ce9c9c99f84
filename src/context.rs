//! Resolution context - immutable, chainable key/value side-channel
//!
//! A [`Context`] is a persistent linked list of entries. Extending it with
//! [`Context::with_value`] returns a new view that shares the tail with the
//! original, so a child node can layer values on top of what its parent saw
//! without the parent (or a sibling) ever observing them.
//!
//! Keys are scoped: crate-internal keys live in the `tagbind` scope and
//! caller keys in the `user` scope, so `"namespace"` set by a caller never
//! shadows the bound namespace.

use std::any::Any;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Scope used by keys created through [`ContextKey::new`].
pub const USER_SCOPE: &str = "user";
/// Scope reserved for the crate's own keys.
pub const INTERNAL_SCOPE: &str = "tagbind";

/// A scoped context key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    scope: &'static str,
    name: Cow<'static, str>,
}

impl ContextKey {
    /// A key in the caller (`user`) scope.
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self {
            scope: USER_SCOPE,
            name: name.into(),
        }
    }

    /// A key in an explicit scope (e.g. an executor library's own name).
    pub const fn scoped(scope: &'static str, name: &'static str) -> Self {
        Self {
            scope,
            name: Cow::Borrowed(name),
        }
    }

    pub fn scope(&self) -> &str {
        self.scope
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.name)
    }
}

impl From<&'static str> for ContextKey {
    fn from(name: &'static str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ContextKey {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

/// Keys the engine itself reads and writes.
pub mod keys {
    use super::{ContextKey, INTERNAL_SCOPE};

    /// `bool`: a former directive in this node's chain already set the value.
    pub const FIELD_SET: ContextKey = ContextKey::scoped(INTERNAL_SCOPE, "field-set");

    /// `Arc<Namespace>`: executor registry used to dispatch directives.
    pub const NAMESPACE: ContextKey = ContextKey::scoped(INTERNAL_SCOPE, "namespace");

    /// `bool`: recurse into children of nodes that carry their own directives.
    pub const RESOLVE_NESTED_DIRECTIVES: ContextKey =
        ContextKey::scoped(INTERNAL_SCOPE, "resolve-nested-directives");

    /// `Arc<dyn Source>`: key/value data source consulted by lookup executors.
    pub const SOURCE: ContextKey = ContextKey::scoped(INTERNAL_SCOPE, "source");
}

struct Entry {
    key: ContextKey,
    value: Arc<dyn Any + Send + Sync>,
    next: Option<Arc<Entry>>,
}

/// Immutable key/value chain with an optional cancellation token.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
    cancellation: Option<CancellationToken>,
}

impl Context {
    /// Empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a new context with `key` bound to `value`.
    ///
    /// Later bindings shadow earlier ones; `self` is left untouched.
    pub fn with_value<V>(&self, key: impl Into<ContextKey>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.with_shared(key.into(), Arc::new(value))
    }

    pub(crate) fn with_shared(&self, key: ContextKey, value: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key,
                value,
                next: self.head.clone(),
            })),
            cancellation: self.cancellation.clone(),
        }
    }

    /// Return a new context observing `token`.
    pub fn with_cancellation(&self, token: CancellationToken) -> Self {
        Self {
            head: self.head.clone(),
            cancellation: Some(token),
        }
    }

    /// Most recent value bound to `key`, if it has type `V`.
    ///
    /// A binding of a different type shadows older bindings of the same key
    /// and yields `None`.
    pub fn value<V: Any>(&self, key: &ContextKey) -> Option<&V> {
        self.raw(key).and_then(|value| value.downcast_ref::<V>())
    }

    /// Whether `key` is bound at all (regardless of type).
    pub fn contains(&self, key: &ContextKey) -> bool {
        self.raw(key).is_some()
    }

    fn raw(&self, key: &ContextKey) -> Option<&(dyn Any + Send + Sync)> {
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if &entry.key == key {
                return Some(entry.value.as_ref());
            }
            cursor = entry.next.as_deref();
        }
        None
    }

    /// `true` when a cancellation token is attached and has fired.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(CancellationToken::is_cancelled)
    }

    pub fn cancellation_token(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    /// Visible keys, most recent first, without shadowed duplicates.
    pub fn keys(&self) -> Vec<&ContextKey> {
        let mut keys: Vec<&ContextKey> = Vec::new();
        let mut cursor = self.head.as_deref();
        while let Some(entry) = cursor {
            if !keys.contains(&&entry.key) {
                keys.push(&entry.key);
            }
            cursor = entry.next.as_deref();
        }
        keys
    }

    /// Shorthand for the `FIELD_SET` flag (absent means `false`).
    pub fn is_field_set(&self) -> bool {
        self.value::<bool>(&keys::FIELD_SET).copied().unwrap_or(false)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.keys())
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
