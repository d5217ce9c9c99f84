//! Test helpers: execution tracking and sample schemas

#![allow(dead_code)]

use std::sync::Arc;

use parking_lot::Mutex;
use tagbind::executors::{DefaultExecutor, SourceExecutor};
use tagbind::{
    executor_fn, Directive, DirectiveExecutor, DirectiveRuntime, ExecutorError, Namespace, Record,
    Schema,
};

/// One recorded directive invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    pub path: String,
    pub directive: Directive,
}

/// Shared log of executed directives, in invocation order.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    executed: Mutex<Vec<Executed>>,
}

impl ExecutionTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, rt: &DirectiveRuntime<'_>) {
        self.executed.lock().push(Executed {
            path: rt.resolver.path_string(),
            directive: rt.directive.clone(),
        });
    }

    pub fn executed(&self) -> Vec<Executed> {
        self.executed.lock().clone()
    }

    pub fn directives(&self) -> Vec<Directive> {
        self.executed().into_iter().map(|e| e.directive).collect()
    }

    /// `"path:directive"` per invocation.
    pub fn trace(&self) -> Vec<String> {
        self.executed()
            .into_iter()
            .map(|e| format!("{}:{}", e.path, e.directive))
            .collect()
    }

    pub fn clear(&self) {
        self.executed.lock().clear();
    }
}

/// Records the invocation, then delegates.
pub struct Tracked<E> {
    inner: E,
    tracker: Arc<ExecutionTracker>,
}

impl<E: DirectiveExecutor> DirectiveExecutor for Tracked<E> {
    fn execute(&self, rt: &mut DirectiveRuntime<'_>) -> Result<(), ExecutorError> {
        self.tracker.record(rt);
        self.inner.execute(rt)
    }
}

pub fn tracked<E: DirectiveExecutor>(inner: E, tracker: &Arc<ExecutionTracker>) -> Tracked<E> {
    Tracked {
        inner,
        tracker: Arc::clone(tracker),
    }
}

/// Namespace where every name records and does nothing else.
pub fn noop_namespace(names: &[&str]) -> (Arc<Namespace>, Arc<ExecutionTracker>) {
    let tracker = ExecutionTracker::new();
    let ns = Arc::new(Namespace::new());
    for name in names {
        ns.register(name, tracked(executor_fn(|_| Ok(())), &tracker))
            .unwrap();
    }
    (ns, tracker)
}

/// Namespace with tracked `form` (source lookup) and `default` executors.
pub fn form_namespace() -> (Arc<Namespace>, Arc<ExecutionTracker>) {
    let tracker = ExecutionTracker::new();
    let ns = Arc::new(Namespace::new());
    ns.register("form", tracked(SourceExecutor, &tracker)).unwrap();
    ns.register("default", tracked(DefaultExecutor, &tracker)).unwrap();
    (ns, tracker)
}

// ────────────────────────────────────────────────────────────────
// Sample schemas
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub age: String,
}

impl Record for Person {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Name", "form=name", |p| &mut p.name)
            .field("Age", "form=age;default=18", |p| &mut p.age);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Pagination {
    pub page: i64,
    pub size: i64,
}

impl Record for Pagination {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Page", "form=page", |p| &mut p.page)
            .field("Size", "form=size", |p| &mut p.size);
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Query {
    pub keyword: String,
    pub pagination: Pagination,
    pub filter: Option<Box<Filter>>,
}

impl Record for Query {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Keyword", "form=q", |q| &mut q.keyword)
            .record("Pagination", "", |q| &mut q.pagination)
            .boxed("Filter", "", |q| &mut q.filter);
    }
}

/// Three leaf directives, reached through an optional pointer.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Filter {
    pub owner: String,
    pub state: String,
    pub limit: u32,
}

impl Record for Filter {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Owner", "form=owner", |f| &mut f.owner)
            .field("State", "form=state", |f| &mut f.state)
            .field("Limit", "form=limit", |f| &mut f.limit);
    }
}

/// Self-referential list
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Chain {
    pub value: String,
    pub next: Option<Box<Chain>>,
}

impl Record for Chain {
    fn describe(schema: &mut Schema<Self>) {
        schema
            .field("Value", "form=value", |c| &mut c.value)
            .boxed("Next", "", |c| &mut c.next);
    }
}
