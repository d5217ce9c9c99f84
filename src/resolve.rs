//! Resolution engine
//!
//! Three entry points walk a bound [`Resolver`] tree:
//!
//! | call         | root value            | absent optional field    | errors     |
//! |--------------|-----------------------|--------------------------|------------|
//! | `resolve`    | allocated             | allocated                | first only |
//! | `resolve_to` | caller's `&mut`       | allocated                | aggregated |
//! | `scan`       | moved in and returned | `ScanNilField` per field | aggregated |
//!
//! Per node: reset the field-set flag, run the directives in order (each sees
//! the context left by the previous one), then recurse into the children with
//! the resulting context.

use std::any::{type_name, Any};
use std::sync::Arc;

use crate::context::{keys, Context, ContextKey};
use crate::error::{AggregateError, BindError, DirectiveExecutionError, ResolveError};
use crate::executor::DirectiveRuntime;
use crate::namespace::Namespace;
use crate::options::Options;
use crate::resolver::{Resolver, ResolverNode};
use crate::schema::Located;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Allocate absent optional records on demand
    Lenient,
    /// Report absent optional records instead of allocating them
    Strict,
}

impl Resolver {
    /// Allocate and populate a fresh value of the tree's record type.
    pub fn resolve(&self) -> Result<Box<dyn Any + Send>, BindError> {
        self.resolve_with(&Options::default())
    }

    pub fn resolve_with(&self, options: &Options) -> Result<Box<dyn Any + Send>, BindError> {
        let ctx = options.apply(&Context::new());
        self.resolve_node(0, &ctx)
    }

    /// [`Resolver::resolve_with`] followed by a downcast to `T`.
    pub fn resolve_as<T: Any>(&self, options: &Options) -> Result<T, BindError> {
        let found = self.root().type_name();
        self.resolve_with(options)?
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| BindError::TypeMismatch {
                expected: type_name::<T>(),
                found,
            })
    }

    /// Populate an existing value in place, allocating absent optional records.
    ///
    /// `target` may be the record type `R` itself, `Box<R>`, `Option<R>` or
    /// `Option<Box<R>>`.
    pub fn resolve_to<T: Any>(&self, target: &mut T) -> Result<(), BindError> {
        self.resolve_to_with(target, &Options::default())
    }

    pub fn resolve_to_with<T: Any>(&self, target: &mut T, options: &Options) -> Result<(), BindError> {
        self.populate(target, type_name::<T>(), options, Mode::Lenient)
    }

    /// Populate `value` and hand it back; absent optional records are errors.
    pub fn scan<T: Any>(&self, value: T) -> Result<T, BindError> {
        self.scan_with(value, &Options::default())
    }

    pub fn scan_with<T: Any>(&self, mut value: T, options: &Options) -> Result<T, BindError> {
        self.populate(&mut value, type_name::<T>(), options, Mode::Strict)?;
        Ok(value)
    }

    // ────────────────────────────────────────────────────────────
    // Allocate-and-return
    // ────────────────────────────────────────────────────────────

    fn resolve_node(&self, id: usize, ctx: &Context) -> Result<Box<dyn Any + Send>, BindError> {
        let node = self.node(id);
        let mut value = node.new_value();
        let ctx = self
            .run_directives(id, &mut *value, ctx)
            .map_err(|err| self.wrap(id, err))?;

        if !descends(node, &ctx) {
            return Ok(value);
        }

        let record: &mut dyn Any = match node.pointer_ops() {
            None => &mut *value,
            Some(ops) => (ops.alloc)(&mut *value).ok_or_else(|| self.wrap(id, slot_mismatch(node)))?,
        };

        for &child_id in node.children_ids() {
            let resolved = self.resolve_node(child_id, &ctx)?;
            let child = self.node(child_id);
            let stored = match child.field_spec() {
                Some(field) => match field.slot(&mut *record) {
                    Some(slot) => field.store(slot, resolved),
                    None => false,
                },
                None => false,
            };
            if !stored {
                return Err(self.wrap(child_id, slot_mismatch(child)));
            }
        }

        Ok(value)
    }

    // ────────────────────────────────────────────────────────────
    // Populate-existing
    // ────────────────────────────────────────────────────────────

    fn populate(
        &self,
        target: &mut dyn Any,
        found: &'static str,
        options: &Options,
        mode: Mode,
    ) -> Result<(), BindError> {
        let record = self.root().record_type().ok_or(BindError::UnsupportedType {
            type_name: found.to_string(),
        })?;
        let root = match record.locate(target) {
            Located::Record(root) => root,
            Located::Absent => return Err(BindError::NilValue),
            Located::Mismatch => {
                return Err(BindError::TypeMismatch {
                    expected: record.name(),
                    found,
                })
            }
        };

        let ctx = options.apply(&Context::new());
        let mut errors = Vec::new();
        self.populate_node(0, root, &ctx, mode, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(record = record.name(), failed = errors.len(), "populate finished with errors");
            Err(AggregateError::new(errors).into())
        }
    }

    fn populate_node(
        &self,
        id: usize,
        slot: &mut dyn Any,
        ctx: &Context,
        mode: Mode,
        errors: &mut Vec<BindError>,
    ) {
        let node = self.node(id);
        let ctx = match self.run_directives(id, &mut *slot, ctx) {
            Ok(ctx) => ctx,
            Err(err) => {
                errors.push(self.wrap(id, err));
                return;
            }
        };

        if !descends(node, &ctx) {
            return;
        }

        let record = match node.pointer_ops() {
            None => Some(slot),
            Some(ops) if (ops.is_present)(slot) => (ops.get)(slot),
            Some(_) if mode == Mode::Strict => {
                self.report_absent(id, errors);
                return;
            }
            Some(ops) => (ops.alloc)(slot),
        };
        let Some(record) = record else {
            errors.push(self.wrap(id, slot_mismatch(node)));
            return;
        };

        for &child_id in node.children_ids() {
            let child = self.node(child_id);
            let child_slot = match child.field_spec() {
                Some(field) => field.slot(&mut *record),
                None => None,
            };
            match child_slot {
                Some(child_slot) => self.populate_node(child_id, child_slot, &ctx, mode, errors),
                None => errors.push(self.wrap(child_id, slot_mismatch(child))),
            }
        }
    }

    /// One `ScanNilField` per descendant that has directives to run.
    fn report_absent(&self, id: usize, errors: &mut Vec<BindError>) {
        for &child_id in self.node(id).children_ids() {
            let child = self.node(child_id);
            if !child.directives().is_empty() {
                let path = child.path_string();
                errors.push(self.wrap(child_id, BindError::ScanNilField { path }));
            }
            self.report_absent(child_id, errors);
        }
    }

    // ────────────────────────────────────────────────────────────
    // Directive dispatch
    // ────────────────────────────────────────────────────────────

    fn run_directives(&self, id: usize, value: &mut dyn Any, ctx: &Context) -> Result<Context, BindError> {
        let node = self.node(id);
        let mut ctx = ctx.with_value(keys::FIELD_SET, false);
        if node.directives().is_empty() {
            return Ok(ctx);
        }

        let namespace = effective::<Arc<Namespace>>(node, &ctx, &keys::NAMESPACE)
            .cloned()
            .ok_or(BindError::NilNamespace)?;

        for directive in node.directives() {
            if ctx.is_cancelled() || node.context().is_cancelled() {
                return Err(BindError::Cancelled);
            }
            let executor = namespace
                .lookup(&directive.name)
                .ok_or_else(|| BindError::MissingExecutor {
                    name: directive.name.clone(),
                })?;

            tracing::trace!(path = %node.path_string(), %directive, "execute directive");
            let mut rt = DirectiveRuntime::new(directive, self.node_ref(id), ctx, &mut *value);
            executor
                .execute(&mut rt)
                .map_err(|source| DirectiveExecutionError {
                    directive: directive.clone(),
                    source,
                })?;
            ctx = rt.into_context();
        }

        Ok(ctx)
    }
}

/// Call context first, then the node's bound context.
fn effective<'c, V: Any>(node: &'c ResolverNode, ctx: &'c Context, key: &ContextKey) -> Option<&'c V> {
    ctx.value::<V>(key).or_else(|| node.context().value::<V>(key))
}

fn descends(node: &ResolverNode, ctx: &Context) -> bool {
    if node.is_leaf() {
        return false;
    }
    node.directives().is_empty()
        || effective::<bool>(node, ctx, &keys::RESOLVE_NESTED_DIRECTIVES)
            .copied()
            .unwrap_or(true)
}

fn slot_mismatch(node: &ResolverNode) -> BindError {
    BindError::TypeMismatch {
        expected: node.type_name(),
        found: "<unreachable field storage>",
    }
}

impl Resolver {
    /// Wrap `err` once, at the node that produced it.
    fn wrap(&self, id: usize, err: BindError) -> BindError {
        let node = self.node(id);
        tracing::debug!(path = %node.path_string(), error = %err, "field resolution failed");

        let mut indexes = Vec::with_capacity(node.path().len());
        let mut current = Some(self.node_ref(id));
        while let Some(at) = current {
            indexes.extend(at.index());
            current = at.parent();
        }
        indexes.reverse();

        ResolveError {
            index: node.index(),
            indexes,
            path: node.path().to_vec(),
            source: Box::new(err),
        }
        .into()
    }
}
