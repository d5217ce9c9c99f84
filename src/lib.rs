//! tagbind - tag-driven data binding
//!
//! Describe a record's fields once, attach `;`-separated directives to each
//! field's tag, register an executor per directive name, and let a
//! [`Resolver`] fill the record by running the directives field by field,
//! parents before children, in declaration order.
//!
//! ```
//! use tagbind::{executor_fn, Namespace, Options, Record, Resolver, Schema};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Default)]
//! struct Config {
//!     name: String,
//!     retries: u32,
//! }
//!
//! impl Record for Config {
//!     fn describe(schema: &mut Schema<Self>) {
//!         schema
//!             .field("Name", "fixed=tagbind", |c| &mut c.name)
//!             .field("Retries", "", |c| &mut c.retries);
//!     }
//! }
//!
//! let ns = Arc::new(Namespace::new());
//! ns.register("fixed", executor_fn(|rt| {
//!     let value = rt.directive.argv.join(",");
//!     rt.set_value(value)?;
//!     Ok(())
//! }))
//! .unwrap();
//!
//! let resolver = Resolver::with_options::<Config>(&Options::new().namespace(ns)).unwrap();
//! let config: Config = resolver.resolve_as(&Options::new()).unwrap();
//! assert_eq!(config.name, "tagbind");
//! ```

pub mod context;
pub mod directive;
pub mod error;
pub mod executor;
pub mod executors;
pub mod namespace;
pub mod options;
mod resolve;
pub mod resolver;
pub mod schema;
pub mod source;

pub use context::{keys, Context, ContextKey};
pub use directive::{format_tag, is_valid_directive_name, parse_tag, Directive};
pub use error::{
    AggregateError, BindError, DirectiveExecutionError, ExecutorError, FixSuggestion, ResolveError,
};
pub use executor::{executor_fn, DirectiveExecutor, DirectiveRuntime, ExecutorFn};
pub use namespace::{
    default_namespace, lookup_executor, register_directive_executor, replace_directive_executor,
    Namespace,
};
pub use options::Options;
pub use resolver::{NodeRef, Resolver, ResolverNode};
pub use schema::{FieldShape, FieldSpec, Record, RecordType, Schema, TypeShape};
pub use source::{MapSource, Source};

/// Resolver for `T` bound to the default namespace.
pub fn new<T: Record>() -> Result<Resolver, BindError> {
    Resolver::new::<T>()
}
