//! Schema description - how a record type exposes its fields
//!
//! There is no runtime reflection in Rust, so every bindable record
//! describes itself: the ordered list of its fields, each with a name, a tag
//! string and an accessor into the live storage.
//!
//! ```
//! use tagbind::{Record, Schema};
//!
//! #[derive(Debug, Default)]
//! struct Pagination {
//!     page: i64,
//!     size: i64,
//! }
//!
//! impl Record for Pagination {
//!     fn describe(schema: &mut Schema<Self>) {
//!         schema
//!             .field("Page", "form=page", |p| &mut p.page)
//!             .field("Size", "form=size;default=20", |p| &mut p.size);
//!     }
//! }
//! ```
//!
//! Nested records come in three flavours:
//! - [`Schema::record`] - the record is stored inline (`T`)
//! - [`Schema::optional`] - stored as `Option<T>`
//! - [`Schema::boxed`] - stored as `Option<Box<T>>` (needed for self-reference)
//!
//! The two optional forms are the "one level of indirection" the resolver
//! dereferences: an absent value is allocated on demand when children need
//! to be populated.

use std::any::{type_name, Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::BindError;

/// A record type that can be bound field by field.
pub trait Record: Any + Default + Send {
    /// Declare the fields of `Self`, in declaration order.
    fn describe(schema: &mut Schema<Self>);
}

/// Type-erased accessor: parent record storage → field storage.
pub(crate) type FieldAccess = Arc<dyn Fn(&mut dyn Any) -> Option<&mut dyn Any> + Send + Sync>;

type NewValueFn = fn() -> Box<dyn Any + Send>;
type StoreFn = fn(&mut dyn Any, Box<dyn Any + Send>) -> bool;
type SlotFn = fn(&mut dyn Any) -> Option<&mut dyn Any>;

// ============================================================================
// RECORD TYPE
// ============================================================================

/// Type-erased handle on a [`Record`] implementation.
#[derive(Clone, Copy)]
pub struct RecordType {
    name: &'static str,
    id: TypeId,
    new_value: NewValueFn,
    fields: fn() -> Vec<FieldSpec>,
    locate: fn(&mut dyn Any) -> Located<'_>,
}

impl RecordType {
    pub fn of<T: Record>() -> Self {
        Self {
            name: type_name::<T>(),
            id: TypeId::of::<T>(),
            new_value: new_boxed::<T>,
            fields: describe_fields::<T>,
            locate: locate_record::<T>,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Declared fields (visible and hidden), in declaration order.
    pub fn fields(&self) -> Vec<FieldSpec> {
        (self.fields)()
    }

    pub(crate) fn new_value(&self) -> Box<dyn Any + Send> {
        (self.new_value)()
    }

    pub(crate) fn locate<'a>(&self, target: &'a mut dyn Any) -> Located<'a> {
        (self.locate)(target)
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordType").field(&self.name).finish()
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

/// Where the record lives inside a caller-supplied target.
pub(crate) enum Located<'a> {
    Record(&'a mut dyn Any),
    Absent,
    Mismatch,
}

/// Accept `T`, `Box<T>`, `Option<T>` and `Option<Box<T>>` as a root target.
fn locate_record<T: Record>(target: &mut dyn Any) -> Located<'_> {
    if target.is::<T>() {
        return Located::Record(target);
    }
    if target.is::<Box<T>>() {
        return match target.downcast_mut::<Box<T>>() {
            Some(boxed) => Located::Record(boxed.as_mut()),
            None => Located::Mismatch,
        };
    }
    if target.is::<Option<T>>() {
        return match target.downcast_mut::<Option<T>>() {
            Some(Some(record)) => Located::Record(record),
            _ => Located::Absent,
        };
    }
    match target.downcast_mut::<Option<Box<T>>>() {
        Some(Some(record)) => Located::Record(record.as_mut()),
        Some(None) => Located::Absent,
        None => Located::Mismatch,
    }
}

fn describe_fields<T: Record>() -> Vec<FieldSpec> {
    let mut schema = Schema::<T>::new();
    T::describe(&mut schema);
    schema.fields
}

// ============================================================================
// TYPE SHAPE
// ============================================================================

/// The shape of a type handed to the tree builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// A record stored by value
    Record(RecordType),
    /// One level of optional/boxed indirection over a record
    Pointer(RecordType),
    /// Anything that is not record-shaped
    Scalar(&'static str),
    /// No type at all
    Absent,
}

impl TypeShape {
    pub fn record<T: Record>() -> Self {
        TypeShape::Record(RecordType::of::<T>())
    }

    /// `Option<T>` over a record
    pub fn optional<T: Record>() -> Self {
        TypeShape::Pointer(RecordType::of::<T>())
    }

    /// `Option<Box<T>>` over a record
    pub fn boxed<T: Record>() -> Self {
        TypeShape::Pointer(RecordType::of::<T>())
    }

    pub fn scalar<T: ?Sized>() -> Self {
        TypeShape::Scalar(type_name::<T>())
    }

    /// Dereference one level of indirection and require a record.
    pub fn into_record(self) -> Result<RecordType, BindError> {
        match self {
            TypeShape::Record(record) | TypeShape::Pointer(record) => Ok(record),
            TypeShape::Scalar(name) => Err(BindError::UnsupportedType {
                type_name: name.to_string(),
            }),
            TypeShape::Absent => Err(BindError::UnsupportedType {
                type_name: "<absent>".to_string(),
            }),
        }
    }
}

// ============================================================================
// FIELDS
// ============================================================================

/// How a field's storage relates to nested records.
#[derive(Clone, Copy)]
pub enum FieldShape {
    /// Leaf value (scalar, list, map, anything not described as a record)
    Value,
    /// Inline nested record
    Record(fn() -> RecordType),
    /// Optional nested record
    Pointer {
        target: fn() -> RecordType,
        ops: PointerOps,
    },
}

/// Operations on an optional slot (`Option<T>` or `Option<Box<T>>`).
#[derive(Clone, Copy)]
pub struct PointerOps {
    pub(crate) is_present: fn(&dyn Any) -> bool,
    pub(crate) get: SlotFn,
    pub(crate) alloc: SlotFn,
}

/// One declared field of a record.
#[derive(Clone)]
pub struct FieldSpec {
    name: &'static str,
    tag: Cow<'static, str>,
    exported: bool,
    type_name: &'static str,
    shape: FieldShape,
    access: Option<FieldAccess>,
    new_value: NewValueFn,
    store: StoreFn,
}

impl FieldSpec {
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Hidden fields never get a resolver node.
    pub fn is_exported(&self) -> bool {
        self.exported
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn shape(&self) -> FieldShape {
        self.shape
    }

    /// Nested record type, after one level of indirection.
    pub fn record_type(&self) -> Option<RecordType> {
        match self.shape {
            FieldShape::Value => None,
            FieldShape::Record(target) | FieldShape::Pointer { target, .. } => Some(target()),
        }
    }

    pub(crate) fn pointer_ops(&self) -> Option<PointerOps> {
        match self.shape {
            FieldShape::Pointer { ops, .. } => Some(ops),
            _ => None,
        }
    }

    /// Borrow this field's storage out of its parent record.
    pub(crate) fn slot<'a>(&self, parent: &'a mut dyn Any) -> Option<&'a mut dyn Any> {
        self.access.as_ref().and_then(|access| access(parent))
    }

    pub(crate) fn new_value(&self) -> Box<dyn Any + Send> {
        (self.new_value)()
    }

    pub(crate) fn store(&self, slot: &mut dyn Any, value: Box<dyn Any + Send>) -> bool {
        (self.store)(slot, value)
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("tag", &self.tag)
            .field("exported", &self.exported)
            .field("type_name", &self.type_name)
            .finish()
    }
}

// ============================================================================
// BUILDER
// ============================================================================

/// Field declaration builder handed to [`Record::describe`].
pub struct Schema<T> {
    fields: Vec<FieldSpec>,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> Schema<T> {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            _record: PhantomData,
        }
    }

    /// Declare a leaf field.
    pub fn field<F, A>(&mut self, name: &'static str, tag: impl Into<Cow<'static, str>>, access: A) -> &mut Self
    where
        F: Any + Default + Send,
        A: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.push::<F, A>(name, tag.into(), FieldShape::Value, access)
    }

    /// Declare an inline nested record.
    pub fn record<R, A>(&mut self, name: &'static str, tag: impl Into<Cow<'static, str>>, access: A) -> &mut Self
    where
        R: Record,
        A: Fn(&mut T) -> &mut R + Send + Sync + 'static,
    {
        self.push::<R, A>(name, tag.into(), FieldShape::Record(RecordType::of::<R>), access)
    }

    /// Declare an `Option<R>` nested record.
    pub fn optional<R, A>(&mut self, name: &'static str, tag: impl Into<Cow<'static, str>>, access: A) -> &mut Self
    where
        R: Record,
        A: Fn(&mut T) -> &mut Option<R> + Send + Sync + 'static,
    {
        let shape = FieldShape::Pointer {
            target: RecordType::of::<R>,
            ops: PointerOps {
                is_present: option_present::<R>,
                get: option_get::<R>,
                alloc: option_alloc::<R>,
            },
        };
        self.push::<Option<R>, A>(name, tag.into(), shape, access)
    }

    /// Declare an `Option<Box<R>>` nested record; `R` may be `T` itself.
    pub fn boxed<R, A>(&mut self, name: &'static str, tag: impl Into<Cow<'static, str>>, access: A) -> &mut Self
    where
        R: Record,
        A: Fn(&mut T) -> &mut Option<Box<R>> + Send + Sync + 'static,
    {
        let shape = FieldShape::Pointer {
            target: RecordType::of::<R>,
            ops: PointerOps {
                is_present: boxed_present::<R>,
                get: boxed_get::<R>,
                alloc: boxed_alloc::<R>,
            },
        };
        self.push::<Option<Box<R>>, A>(name, tag.into(), shape, access)
    }

    /// Declare a field that is not externally visible.
    ///
    /// It keeps its place in the declaration but produces no resolver node,
    /// so its directives never run.
    pub fn hidden(&mut self, name: &'static str, tag: impl Into<Cow<'static, str>>) -> &mut Self {
        self.fields.push(FieldSpec {
            name,
            tag: tag.into(),
            exported: false,
            type_name: "<hidden>",
            shape: FieldShape::Value,
            access: None,
            new_value: new_boxed::<()>,
            store: store_boxed::<()>,
        });
        self
    }

    fn push<F, A>(&mut self, name: &'static str, tag: Cow<'static, str>, shape: FieldShape, access: A) -> &mut Self
    where
        F: Any + Default + Send,
        A: Fn(&mut T) -> &mut F + Send + Sync + 'static,
    {
        self.fields.push(FieldSpec {
            name,
            tag,
            exported: true,
            type_name: type_name::<F>(),
            shape,
            access: Some(erase_access::<T, F, A>(access)),
            new_value: new_boxed::<F>,
            store: store_boxed::<F>,
        });
        self
    }
}

fn erase_access<T, F, A>(access: A) -> FieldAccess
where
    T: Any,
    F: Any,
    A: Fn(&mut T) -> &mut F + Send + Sync + 'static,
{
    // Pins the closure to the higher-ranked signature of `FieldAccess`.
    fn pin<C>(closure: C) -> C
    where
        C: Fn(&mut dyn Any) -> Option<&mut dyn Any>,
    {
        closure
    }

    Arc::new(pin(move |record: &mut dyn Any| {
        record
            .downcast_mut::<T>()
            .map(|record| access(record) as &mut dyn Any)
    }))
}

fn new_boxed<F: Any + Default + Send>() -> Box<dyn Any + Send> {
    Box::new(F::default())
}

fn store_boxed<F: Any + Send>(slot: &mut dyn Any, value: Box<dyn Any + Send>) -> bool {
    match (slot.downcast_mut::<F>(), value.downcast::<F>()) {
        (Some(slot), Ok(value)) => {
            *slot = *value;
            true
        }
        _ => false,
    }
}

fn option_present<R: Record>(slot: &dyn Any) -> bool {
    slot.downcast_ref::<Option<R>>().is_some_and(Option::is_some)
}

fn option_get<R: Record>(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    slot.downcast_mut::<Option<R>>()?
        .as_mut()
        .map(|record| record as &mut dyn Any)
}

fn option_alloc<R: Record>(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    slot.downcast_mut::<Option<R>>()
        .map(|option| option.get_or_insert_with(R::default) as &mut dyn Any)
}

fn boxed_present<R: Record>(slot: &dyn Any) -> bool {
    slot.downcast_ref::<Option<Box<R>>>().is_some_and(Option::is_some)
}

fn boxed_get<R: Record>(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    slot.downcast_mut::<Option<Box<R>>>()?
        .as_deref_mut()
        .map(|record| record as &mut dyn Any)
}

fn boxed_alloc<R: Record>(slot: &mut dyn Any) -> Option<&mut dyn Any> {
    slot.downcast_mut::<Option<Box<R>>>()
        .map(|option| option.get_or_insert_with(Box::default).as_mut() as &mut dyn Any)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Inner {
        value: String,
    }

    impl Record for Inner {
        fn describe(schema: &mut Schema<Self>) {
            schema.field("Value", "form=value", |r| &mut r.value);
        }
    }

    #[derive(Debug, Default)]
    struct Outer {
        name: String,
        inner: Inner,
        maybe: Option<Inner>,
        boxed: Option<Box<Outer>>,
    }

    impl Record for Outer {
        fn describe(schema: &mut Schema<Self>) {
            schema
                .field("Name", "form=name", |r| &mut r.name)
                .hidden("secret", "form=secret")
                .record("Inner", "", |r| &mut r.inner)
                .optional("Maybe", "", |r| &mut r.maybe)
                .boxed("Next", "", |r| &mut r.boxed);
        }
    }

    #[test]
    fn test_fields_keep_declaration_order() {
        let names: Vec<_> = RecordType::of::<Outer>().fields().iter().map(FieldSpec::name).collect();
        assert_eq!(names, vec!["Name", "secret", "Inner", "Maybe", "Next"]);
    }

    #[test]
    fn test_hidden_field_is_not_exported() {
        let fields = RecordType::of::<Outer>().fields();
        assert!(fields[0].is_exported());
        assert!(!fields[1].is_exported());
        assert_eq!(fields[1].tag(), "form=secret");
    }

    #[test]
    fn test_record_type_of_nested_fields() {
        let fields = RecordType::of::<Outer>().fields();
        assert_eq!(fields[0].record_type(), None);
        assert_eq!(fields[2].record_type(), Some(RecordType::of::<Inner>()));
        assert_eq!(fields[3].record_type(), Some(RecordType::of::<Inner>()));
        assert_eq!(fields[4].record_type(), Some(RecordType::of::<Outer>()));
    }

    #[test]
    fn test_slot_and_store_round_trip() {
        let fields = RecordType::of::<Outer>().fields();
        let mut outer = Outer::default();

        let slot = fields[0].slot(&mut outer).unwrap();
        assert!(fields[0].store(slot, Box::new("Ada".to_string())));
        assert_eq!(outer.name, "Ada");

        let slot = fields[0].slot(&mut outer).unwrap();
        assert!(!fields[0].store(slot, Box::new(42_i32)));
    }

    #[test]
    fn test_pointer_ops_allocate_on_demand() {
        let fields = RecordType::of::<Outer>().fields();
        let ops = fields[3].pointer_ops().unwrap();
        let mut outer = Outer::default();

        let slot = fields[3].slot(&mut outer).unwrap();
        assert!(!(ops.is_present)(slot));
        assert!((ops.get)(slot).is_none());
        assert!((ops.alloc)(slot).is_some());
        assert_eq!(outer.maybe, Some(Inner::default()));
    }

    #[test]
    fn test_type_shape_into_record() {
        assert!(TypeShape::record::<Outer>().into_record().is_ok());
        assert!(TypeShape::boxed::<Outer>().into_record().is_ok());
        assert!(matches!(
            TypeShape::scalar::<i32>().into_record(),
            Err(BindError::UnsupportedType { .. })
        ));
        assert!(matches!(
            TypeShape::Absent.into_record(),
            Err(BindError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_locate_accepts_one_level_of_indirection() {
        let record = RecordType::of::<Inner>();

        let mut plain = Inner::default();
        assert!(matches!(record.locate(&mut plain), Located::Record(_)));

        let mut some: Option<Box<Inner>> = Some(Box::default());
        assert!(matches!(record.locate(&mut some), Located::Record(_)));

        let mut none: Option<Inner> = None;
        assert!(matches!(record.locate(&mut none), Located::Absent));

        let mut other = 5_u8;
        assert!(matches!(record.locate(&mut other), Located::Mismatch));
    }
}
