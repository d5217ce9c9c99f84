//! Bind-time and resolve-time options
//!
//! The same [`Options`] value configures a resolver when it is bound
//! ([`Resolver::with_options`](crate::Resolver::with_options)) and each
//! resolution call. Options given to a call override the bound ones.

use std::any::Any;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::{keys, Context, ContextKey};
use crate::namespace::Namespace;
use crate::source::Source;

#[derive(Clone, Default)]
pub struct Options {
    values: Vec<(ContextKey, Arc<dyn Any + Send + Sync>)>,
    cancellation: Option<CancellationToken>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch directives through `namespace` instead of the bound one.
    pub fn namespace(self, namespace: Arc<Namespace>) -> Self {
        self.value(keys::NAMESPACE, namespace)
    }

    /// Expose a context value to every executor.
    pub fn value<V>(mut self, key: impl Into<ContextKey>, value: V) -> Self
    where
        V: Any + Send + Sync,
    {
        self.values.push((key.into(), Arc::new(value)));
        self
    }

    /// Recurse into children of nodes that carry their own directives
    /// (default `true`).
    pub fn resolve_nested_directives(self, enabled: bool) -> Self {
        self.value(keys::RESOLVE_NESTED_DIRECTIVES, enabled)
    }

    /// Attach a key/value data source for lookup executors.
    pub fn source(self, source: impl Source + 'static) -> Self {
        let source: Arc<dyn Source> = Arc::new(source);
        self.value(keys::SOURCE, source)
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.cancellation.is_none()
    }

    /// Layer these options on top of `ctx`.
    pub fn apply(&self, ctx: &Context) -> Context {
        let mut ctx = self
            .values
            .iter()
            .fold(ctx.clone(), |ctx, (key, value)| ctx.with_shared(key.clone(), Arc::clone(value)));
        if let Some(token) = &self.cancellation {
            ctx = ctx.with_cancellation(token.clone());
        }
        ctx
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("keys", &self.values.iter().map(|(key, _)| key).collect::<Vec<_>>())
            .field("cancellation", &self.cancellation.is_some())
            .finish()
    }
}
