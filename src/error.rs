//! Error types with fix suggestions
//!
//! Every failure the binder can report is a [`BindError`]. Build-time
//! failures abort tree construction; resolution failures are wrapped per node
//! in a [`ResolveError`] that carries the failing field path, and the
//! populate modes fold independent failures into an [`AggregateError`].

use std::fmt;

use thiserror::Error;

use crate::directive::Directive;

/// Failure type returned by directive executors.
///
/// Boxed so executors can `?` any error type or return a plain string.
pub type ExecutorError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum BindError {
    // ─────────────────────────────────────────────────────────────
    // Build-time errors (tag parsing, schema shape)
    // ─────────────────────────────────────────────────────────────
    #[error("invalid directive name: {name:?}")]
    InvalidDirectiveName { name: String },

    #[error("duplicate directive: {name:?}")]
    DuplicateDirective { name: String },

    #[error("unsupported type: {type_name} (expected a record or one level of indirection over a record)")]
    UnsupportedType { type_name: String },

    #[error("build field {path:?}: {source}")]
    Build {
        path: String,
        #[source]
        source: Box<BindError>,
    },

    // ─────────────────────────────────────────────────────────────
    // Namespace errors
    // ─────────────────────────────────────────────────────────────
    #[error("duplicate executor: {name:?}")]
    DuplicatedExecutor { name: String },

    #[error("nil executor: {name:?}")]
    NilExecutor { name: String },

    #[error("missing namespace")]
    NilNamespace,

    #[error("directive executor not found: {name:?}")]
    MissingExecutor { name: String },

    // ─────────────────────────────────────────────────────────────
    // Resolution errors
    // ─────────────────────────────────────────────────────────────
    #[error(transparent)]
    DirectiveExecution(#[from] DirectiveExecutionError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error("type mismatch: expected {expected}, got {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("field {path:?} is absent (nil pointer) and cannot be scanned into")]
    ScanNilField { path: String },

    #[error("nil value: the target is absent")]
    NilValue,

    #[error("resolution cancelled")]
    Cancelled,
}

impl BindError {
    /// Follow `Build`/`Resolve` wrappers down to the innermost cause.
    pub fn root_cause(&self) -> &BindError {
        match self {
            BindError::Build { source, .. } => source.root_cause(),
            BindError::Resolve(err) => err.source.root_cause(),
            other => other,
        }
    }
}

/// An executor returned an error while running a directive.
#[derive(Error, Debug)]
#[error("execute directive \"{directive}\" failed: {source}")]
pub struct DirectiveExecutionError {
    pub directive: Directive,
    #[source]
    pub source: ExecutorError,
}

/// Per-node wrapper: which field failed, and why.
///
/// Only the failing node wraps the cause; ancestors pass it up unchanged.
/// `path` and `indexes` describe the whole route from the root, so
/// `Resolver::lookup_by_index(&err.indexes)` finds the failing node again.
#[derive(Error, Debug)]
#[error("resolve field {:?} failed: {source}", .path.join("."))]
pub struct ResolveError {
    /// Sibling position of the failing node (`None` for the root).
    pub index: Option<usize>,
    /// Sibling positions from the root to the failing node.
    pub indexes: Vec<usize>,
    /// Field names from the root to the failing node.
    pub path: Vec<String>,
    #[source]
    pub source: Box<BindError>,
}

impl ResolveError {
    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    /// The directive whose executor failed, if that is what happened.
    pub fn directive(&self) -> Option<&Directive> {
        match self.source.as_ref() {
            BindError::DirectiveExecution(err) => Some(&err.directive),
            _ => None,
        }
    }
}

/// Composite error collected by `scan` / `resolve_to`.
#[derive(Debug, Default)]
pub struct AggregateError {
    errors: Vec<BindError>,
}

impl AggregateError {
    pub(crate) fn new(errors: Vec<BindError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[BindError] {
        &self.errors
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BindError> {
        self.errors.iter()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_errors(self) -> Vec<BindError> {
        self.errors
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} field(s) failed to resolve", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  - {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

impl<'a> IntoIterator for &'a AggregateError {
    type Item = &'a BindError;
    type IntoIter = std::slice::Iter<'a, BindError>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}

impl FixSuggestion for BindError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            BindError::InvalidDirectiveName { .. } => {
                Some("Directive names may only contain letters, digits and '_'")
            }
            BindError::DuplicateDirective { .. } => {
                Some("Each directive may appear once per field tag; merge the arguments")
            }
            BindError::UnsupportedType { .. } => {
                Some("Build resolvers from a Record type, Option<T> or Option<Box<T>>")
            }
            BindError::Build { source, .. } => source.fix_suggestion(),
            BindError::DuplicatedExecutor { .. } => {
                Some("Use replace() to override an existing executor")
            }
            BindError::NilExecutor { .. } => {
                Some("The executor being registered was not found in its source namespace")
            }
            BindError::NilNamespace => {
                Some("Bind a namespace with Options::namespace or keep the node context inherited")
            }
            BindError::MissingExecutor { .. } => {
                Some("Register an executor for this directive name before resolving")
            }
            BindError::DirectiveExecution(_) => Some("Check the executor's input for this field"),
            BindError::Resolve(err) => err.source.fix_suggestion(),
            BindError::Aggregate(_) => Some("Fix each listed field and resolve again"),
            BindError::TypeMismatch { .. } => {
                Some("Pass a target of the same record type the resolver was built from")
            }
            BindError::ScanNilField { .. } => {
                Some("Allocate the optional field before scanning, or use resolve_to")
            }
            BindError::NilValue => Some("Pass a present (Some) target"),
            BindError::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_execution_error_message() {
        let err = DirectiveExecutionError {
            directive: Directive::new("form", ["page"]),
            source: "boom".into(),
        };
        assert_eq!(err.to_string(), "execute directive \"form=page\" failed: boom");
    }

    #[test]
    fn test_resolve_error_carries_path_and_directive() {
        let err = ResolveError {
            index: Some(1),
            indexes: vec![0, 1],
            path: vec!["User".into(), "Name".into()],
            source: Box::new(BindError::DirectiveExecution(DirectiveExecutionError {
                directive: Directive::new("form", ["name"]),
                source: "bad".into(),
            })),
        };
        assert_eq!(err.path_string(), "User.Name");
        assert_eq!(err.directive(), Some(&Directive::new("form", ["name"])));
        assert!(err.to_string().starts_with("resolve field \"User.Name\" failed"));
    }

    #[test]
    fn test_root_cause_unwraps_build_and_resolve() {
        let err = BindError::Build {
            path: "A.B".into(),
            source: Box::new(BindError::DuplicateDirective {
                name: "form".into(),
            }),
        };
        assert!(matches!(err.root_cause(), BindError::DuplicateDirective { .. }));
    }

    #[test]
    fn test_aggregate_error_lists_every_cause() {
        let err = AggregateError::new(vec![BindError::NilValue, BindError::Cancelled]);
        assert_eq!(err.len(), 2);
        let text = err.to_string();
        assert!(text.contains("2 field(s)"));
        assert!(text.contains("nil value"));
        assert!(text.contains("cancelled"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_every_build_error_has_a_suggestion() {
        let errors = [
            BindError::InvalidDirectiveName { name: ".x".into() },
            BindError::DuplicateDirective { name: "x".into() },
            BindError::UnsupportedType {
                type_name: "i32".into(),
            },
        ];
        for err in &errors {
            assert!(err.fix_suggestion().is_some(), "{err}");
        }
    }
}
