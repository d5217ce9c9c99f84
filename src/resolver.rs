//! Resolver trees - one node per visible field, built once per record type
//!
//! Nodes live in an arena (`Vec<ResolverNode>`) in depth-first pre-order:
//! a node's parent is a plain index and a deep copy is a `Vec` clone. The
//! first build for a record type is stored as a template in a process-wide
//! cache; every later build hands out an independent copy of it.
//!
//! ```text
//! (demo::Signup)
//!     0# Name (alloc::string::String) form=name
//!     1# Address (demo::Address)
//!         0# Address.City (alloc::string::String) form=city
//! ```

use std::any::TypeId;
use std::fmt::Write as _;
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::context::{keys, Context};
use crate::directive::{format_tag, parse_tag, Directive};
use crate::error::BindError;
use crate::namespace::default_namespace;
use crate::options::Options;
use crate::schema::{FieldSpec, PointerOps, Record, RecordType, TypeShape};

/// Schema-keyed template cache
static TEMPLATES: Lazy<DashMap<TypeId, Arc<Resolver>>> = Lazy::new(DashMap::new);

/// Number of cached templates.
pub fn cached_templates() -> usize {
    TEMPLATES.len()
}

#[derive(Clone)]
enum NodeKind {
    Root(RecordType),
    Field(Arc<FieldSpec>),
}

/// One node of a resolver tree.
#[derive(Clone)]
pub struct ResolverNode {
    kind: NodeKind,
    record: Option<RecordType>,
    index: Option<usize>,
    path: Vec<String>,
    directives: Vec<Directive>,
    parent: Option<usize>,
    children: Vec<usize>,
    context: Context,
    cycle_cut: bool,
}

impl ResolverNode {
    fn root(record: RecordType) -> Self {
        Self {
            kind: NodeKind::Root(record),
            record: Some(record),
            index: None,
            path: Vec::new(),
            directives: Vec::new(),
            parent: None,
            children: Vec::new(),
            context: Context::new(),
            cycle_cut: false,
        }
    }

    /// Type of the value this node resolves.
    pub fn type_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Root(record) => record.name(),
            NodeKind::Field(field) => field.type_name(),
        }
    }

    /// Field descriptor (`None` for the root).
    pub fn field(&self) -> Option<&FieldSpec> {
        match &self.kind {
            NodeKind::Root(_) => None,
            NodeKind::Field(field) => Some(field),
        }
    }

    /// Field name, or `""` for the root.
    pub fn name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// Record type reached through this node, if it is record-shaped.
    pub fn record_type(&self) -> Option<RecordType> {
        self.record
    }

    /// Position among the parent's children (`None` for the root).
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    pub fn directives(&self) -> &[Directive] {
        &self.directives
    }

    pub fn directives_mut(&mut self) -> &mut Vec<Directive> {
        &mut self.directives
    }

    pub fn directive_by_name(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// A repeated ancestor type stopped expansion below this node.
    pub fn is_cycle_cut(&self) -> bool {
        self.cycle_cut
    }

    pub(crate) fn children_ids(&self) -> &[usize] {
        &self.children
    }

    pub(crate) fn pointer_ops(&self) -> Option<PointerOps> {
        match &self.kind {
            NodeKind::Root(_) => None,
            NodeKind::Field(field) => field.pointer_ops(),
        }
    }

    pub(crate) fn field_spec(&self) -> Option<&Arc<FieldSpec>> {
        match &self.kind {
            NodeKind::Root(_) => None,
            NodeKind::Field(field) => Some(field),
        }
    }

    pub(crate) fn new_value(&self) -> Box<dyn std::any::Any + Send> {
        match &self.kind {
            NodeKind::Root(record) => record.new_value(),
            NodeKind::Field(field) => field.new_value(),
        }
    }
}

impl std::fmt::Debug for ResolverNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverNode")
            .field("path", &self.path_string())
            .field("type", &self.type_name())
            .field("directives", &format_tag(&self.directives))
            .field("children", &self.children.len())
            .finish()
    }
}

/// Read-only view of a node that can walk to its relatives.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    tree: &'a Resolver,
    id: usize,
}

impl<'a> NodeRef<'a> {
    pub fn node(&self) -> &'a ResolverNode {
        &self.tree.nodes[self.id]
    }

    pub fn tree(&self) -> &'a Resolver {
        self.tree
    }

    pub fn type_name(&self) -> &'static str {
        self.node().type_name()
    }

    pub fn context(&self) -> &'a Context {
        &self.node().context
    }

    pub fn parent(&self) -> Option<NodeRef<'a>> {
        self.node().parent.map(|id| self.tree.node_ref(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        self.node().children.iter().map(move |&id| tree.node_ref(id))
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'a>> {
        self.node().children.get(index).map(|&id| self.tree.node_ref(id))
    }

    /// Find a descendant by dotted path relative to this node.
    pub fn lookup(&self, path: &str) -> Option<NodeRef<'a>> {
        path.split('.').try_fold(*self, |node, name| {
            node.children().find(|child| child.node().name() == name)
        })
    }
}

impl std::ops::Deref for NodeRef<'_> {
    type Target = ResolverNode;

    fn deref(&self) -> &ResolverNode {
        self.node()
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.node().fmt(f)
    }
}

/// A resolver tree for one record type.
#[derive(Clone, Debug)]
pub struct Resolver {
    nodes: Vec<ResolverNode>,
}

impl Resolver {
    /// Build (or copy from cache) a tree for `T`, bound to the default namespace.
    pub fn new<T: Record>() -> Result<Self, BindError> {
        Self::with_options::<T>(&Options::default())
    }

    /// Build a tree for `T` with bind-time options.
    pub fn with_options<T: Record>(options: &Options) -> Result<Self, BindError> {
        Self::from_shape(TypeShape::record::<T>(), options)
    }

    /// Build a tree for any shape; only record-shaped types are accepted.
    pub fn from_shape(shape: TypeShape, options: &Options) -> Result<Self, BindError> {
        let record = shape.into_record()?;
        let mut tree = Self::cached(record)?;
        tree.bind(options);
        Ok(tree)
    }

    /// Build a fresh tree without consulting or filling the cache.
    pub fn build_uncached(shape: TypeShape) -> Result<Self, BindError> {
        let mut tree = Self::build(shape.into_record()?)?;
        tree.bind(&Options::default());
        Ok(tree)
    }

    fn cached(record: RecordType) -> Result<Self, BindError> {
        if let Some(template) = TEMPLATES.get(&record.type_id()) {
            tracing::trace!(record = record.name(), "resolver template cache hit");
            return Ok(Resolver::clone(&template));
        }

        let template = TEMPLATES
            .entry(record.type_id())
            .or_try_insert_with(|| {
                let tree = Self::build(record)?;
                tracing::debug!(
                    record = record.name(),
                    nodes = tree.len(),
                    "cached resolver template"
                );
                Ok::<_, BindError>(Arc::new(tree))
            })?;
        Ok(Resolver::clone(&template))
    }

    fn build(record: RecordType) -> Result<Self, BindError> {
        let mut tree = Self {
            nodes: vec![ResolverNode::root(record)],
        };
        let mut ancestors = vec![record.type_id()];
        tree.build_children(0, record, &mut ancestors)?;
        Ok(tree)
    }

    fn build_children(
        &mut self,
        parent: usize,
        record: RecordType,
        ancestors: &mut Vec<TypeId>,
    ) -> Result<(), BindError> {
        let mut index = 0;
        for field in record.fields() {
            if !field.is_exported() {
                continue;
            }

            let mut path = self.nodes[parent].path.clone();
            path.push(field.name().to_string());
            let directives = parse_tag(field.tag()).map_err(|source| BindError::Build {
                path: path.join("."),
                source: Box::new(source),
            })?;

            let nested = field.record_type();
            let id = self.nodes.len();
            self.nodes.push(ResolverNode {
                kind: NodeKind::Field(Arc::new(field)),
                record: nested,
                index: Some(index),
                path,
                directives,
                parent: Some(parent),
                children: Vec::new(),
                context: Context::new(),
                cycle_cut: false,
            });
            self.nodes[parent].children.push(id);
            index += 1;

            let Some(nested) = nested else { continue };
            if ancestors.contains(&nested.type_id()) {
                tracing::debug!(
                    path = %self.nodes[id].path_string(),
                    record = nested.name(),
                    "self-referential field, children not expanded"
                );
                self.nodes[id].cycle_cut = true;
                continue;
            }
            ancestors.push(nested.type_id());
            self.build_children(id, nested, ancestors)?;
            ancestors.pop();
        }
        Ok(())
    }

    /// Bind options: every node inherits the root context.
    fn bind(&mut self, options: &Options) {
        let base = Context::new().with_value(keys::NAMESPACE, default_namespace());
        let context = options.apply(&base);
        for node in &mut self.nodes {
            node.context = context.clone();
        }
    }

    pub(crate) fn node_ref(&self, id: usize) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub(crate) fn node(&self, id: usize) -> &ResolverNode {
        &self.nodes[id]
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node_ref(0)
    }

    pub fn record_type(&self) -> Option<RecordType> {
        self.nodes[0].record
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Find a node by dotted field-name path (`"Address.City"`).
    pub fn lookup(&self, path: &str) -> Option<NodeRef<'_>> {
        self.root().lookup(path)
    }

    /// Find a node by sibling positions; `&[]` is the root.
    pub fn lookup_by_index(&self, indexes: &[usize]) -> Option<NodeRef<'_>> {
        indexes
            .iter()
            .try_fold(self.root(), |node, &index| node.child(index))
    }

    /// Visit every node depth-first, parents before children.
    pub fn iterate<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(NodeRef<'_>) -> Result<(), E>,
    {
        (0..self.nodes.len()).try_for_each(|id| f(self.node_ref(id)))
    }

    /// Like [`Resolver::iterate`], with mutable access to contexts and directives.
    pub fn iterate_mut<E, F>(&mut self, f: F) -> Result<(), E>
    where
        F: FnMut(&mut ResolverNode) -> Result<(), E>,
    {
        self.nodes.iter_mut().try_for_each(f)
    }

    /// Debug rendering, one line per node.
    pub fn layout_text(&self) -> String {
        let mut out = format!("({})", self.nodes[0].type_name());
        for node in self.nodes.iter().skip(1) {
            let indent = "    ".repeat(node.path.len());
            let _ = write!(
                out,
                "\n{indent}{}# {} ({})",
                node.index.unwrap_or_default(),
                node.path_string(),
                node.type_name()
            );
            if !node.directives.is_empty() {
                let _ = write!(out, " {}", format_tag(&node.directives));
            }
        }
        out
    }
}
