//! Directive executors and the runtime they receive
//!
//! An executor is the behaviour behind a directive name. When the engine
//! reaches a directive it looks the name up in the effective namespace and
//! calls [`DirectiveExecutor::execute`] with a [`DirectiveRuntime`] that
//! exposes the directive, the node being resolved, the current context and
//! the field's storage.

use std::any::{type_name, Any};

use crate::context::{keys, Context, ContextKey};
use crate::directive::Directive;
use crate::error::{BindError, ExecutorError};
use crate::resolver::NodeRef;
use crate::source::Source;

/// Behaviour bound to a directive name.
pub trait DirectiveExecutor: Send + Sync {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError>;
}

/// Adapter turning a closure into a [`DirectiveExecutor`].
pub struct ExecutorFn<F>(F);

impl<F> DirectiveExecutor for ExecutorFn<F>
where
    F: Fn(&mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> + Send + Sync,
{
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        (self.0)(rt)
    }
}

/// Wrap a closure as an executor.
///
/// ```
/// use tagbind::{executor_fn, Namespace};
///
/// let ns = Namespace::new();
/// ns.register("upper", executor_fn(|rt| {
///     if let Some(value) = rt.value_mut::<String>() {
///         *value = value.to_uppercase();
///     }
///     Ok(())
/// }))
/// .unwrap();
/// ```
pub fn executor_fn<F>(f: F) -> ExecutorFn<F>
where
    F: Fn(&mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> + Send + Sync,
{
    ExecutorFn(f)
}

/// Everything an executor sees while running one directive.
pub struct DirectiveRuntime<'a> {
    /// The directive being executed
    pub directive: &'a Directive,
    /// The node being resolved (navigable to parent, siblings, children)
    pub resolver: NodeRef<'a>,
    /// Context flowing through this node's directive chain.
    ///
    /// Replace it to pass values to the next directive and to child nodes.
    pub context: Context,
    value: &'a mut dyn Any,
}

impl<'a> DirectiveRuntime<'a> {
    pub(crate) fn new(
        directive: &'a Directive,
        resolver: NodeRef<'a>,
        context: Context,
        value: &'a mut dyn Any,
    ) -> Self {
        Self {
            directive,
            resolver,
            context,
            value,
        }
    }

    pub(crate) fn into_context(self) -> Context {
        self.context
    }

    /// Read the field's current value if it has type `T`.
    pub fn value<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutable access to the field's value if it has type `T`.
    ///
    /// Writing through this reference does not mark the field as set; call
    /// [`DirectiveRuntime::mark_value_set`] if later directives should know.
    pub fn value_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// Type-erased access to the field's storage.
    pub fn value_any(&mut self) -> &mut dyn Any {
        &mut *self.value
    }

    /// Overwrite the field's value and mark it as set.
    pub fn set_value<T: Any>(&mut self, value: T) -> Result<(), BindError> {
        match self.value.downcast_mut::<T>() {
            Some(slot) => {
                *slot = value;
                self.mark_value_set();
                Ok(())
            }
            None => Err(BindError::TypeMismatch {
                expected: self.resolver.type_name(),
                found: type_name::<T>(),
            }),
        }
    }

    /// Whether a former directive of this node already set the value.
    pub fn is_value_set(&self) -> bool {
        self.context.is_field_set()
    }

    pub fn mark_value_set(&mut self) {
        self.context = self.context.with_value(keys::FIELD_SET, true);
    }

    /// Look a key up in the call context first, then in the node's bound context.
    pub fn lookup<V: Any>(&self, key: &ContextKey) -> Option<&V> {
        self.context
            .value::<V>(key)
            .or_else(|| self.resolver.context().value::<V>(key))
    }

    /// The data source attached through `Options::source`, if any.
    pub fn source(&self) -> Option<&dyn Source> {
        self.lookup::<std::sync::Arc<dyn Source>>(&keys::SOURCE)
            .map(|source| source.as_ref())
    }
}
