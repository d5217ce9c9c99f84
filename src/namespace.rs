//! Namespaces - registries mapping directive names to executors
//!
//! A namespace is shared between threads: registration takes a write lock,
//! dispatch only a read lock and clones the executor handle out. A process
//! wide default namespace is created lazily and used whenever a resolver is
//! bound without an explicit one.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::directive::is_valid_directive_name;
use crate::error::BindError;
use crate::executor::DirectiveExecutor;

/// Process-wide default namespace
static DEFAULT_NAMESPACE: Lazy<Arc<Namespace>> = Lazy::new(|| Arc::new(Namespace::new()));

/// Shared handle on the default namespace.
pub fn default_namespace() -> Arc<Namespace> {
    Arc::clone(&DEFAULT_NAMESPACE)
}

/// Register `executor` under `name` in the default namespace.
pub fn register_directive_executor(
    name: &str,
    executor: impl DirectiveExecutor + 'static,
) -> Result<(), BindError> {
    DEFAULT_NAMESPACE.register(name, executor)
}

/// Register or overwrite `name` in the default namespace.
pub fn replace_directive_executor(
    name: &str,
    executor: impl DirectiveExecutor + 'static,
) -> Result<(), BindError> {
    DEFAULT_NAMESPACE.replace(name, executor)
}

/// Look `name` up in the default namespace.
pub fn lookup_executor(name: &str) -> Option<Arc<dyn DirectiveExecutor>> {
    DEFAULT_NAMESPACE.lookup(name)
}

/// Name → executor registry.
#[derive(Default)]
pub struct Namespace {
    executors: RwLock<FxHashMap<String, Arc<dyn DirectiveExecutor>>>,
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new executor; fails if the name is taken.
    pub fn register(&self, name: &str, executor: impl DirectiveExecutor + 'static) -> Result<(), BindError> {
        self.register_shared(name, Some(Arc::new(executor)))
    }

    /// Register an executor handle, e.g. one looked up from another namespace.
    ///
    /// `None` is rejected with [`BindError::NilExecutor`].
    pub fn register_shared(
        &self,
        name: &str,
        executor: Option<Arc<dyn DirectiveExecutor>>,
    ) -> Result<(), BindError> {
        let executor = Self::validate(name, executor)?;
        let mut executors = self.executors.write();
        if executors.contains_key(name) {
            return Err(BindError::DuplicatedExecutor {
                name: name.to_string(),
            });
        }
        executors.insert(name.to_string(), executor);
        tracing::debug!(directive = name, "registered directive executor");
        Ok(())
    }

    /// Register or overwrite an executor.
    pub fn replace(&self, name: &str, executor: impl DirectiveExecutor + 'static) -> Result<(), BindError> {
        self.replace_shared(name, Some(Arc::new(executor)))
    }

    pub fn replace_shared(
        &self,
        name: &str,
        executor: Option<Arc<dyn DirectiveExecutor>>,
    ) -> Result<(), BindError> {
        let executor = Self::validate(name, executor)?;
        if self.executors.write().insert(name.to_string(), executor).is_some() {
            tracing::debug!(directive = name, "replaced directive executor");
        }
        Ok(())
    }

    fn validate(
        name: &str,
        executor: Option<Arc<dyn DirectiveExecutor>>,
    ) -> Result<Arc<dyn DirectiveExecutor>, BindError> {
        if !is_valid_directive_name(name) {
            return Err(BindError::InvalidDirectiveName {
                name: name.to_string(),
            });
        }
        executor.ok_or_else(|| BindError::NilExecutor {
            name: name.to_string(),
        })
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn DirectiveExecutor>> {
        self.executors.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.executors.read().contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.executors.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.executors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.read().is_empty()
    }
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("executors", &self.names())
            .finish()
    }
}
