//! In-memory host adapter.
//!
//! Nodes form a plain tree of [`MemoryNode`]s. Every mutation is applied and
//! also recorded as a [`RecordedOp`], so tests can assert on exactly what a
//! commit did. Scheduled work is queued until [`MemoryHost::run_scheduled`]
//! (or [`MemoryHost::run_next`]) runs it.

use std::cell::{Cell, RefCell};
use std::fmt::Write as _;
use std::rc::Rc;

use crate::element::{AttrValue, Attrs, Instance, EMPTY_MARKER};
use crate::platform::{HostAdapter, Mutation, NativeHandle, WorkCallback};
use crate::types::ScheduleOptions;

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Container(String),
    Element(Rc<str>),
    Text,
    Comment,
}

/// One node of the in-memory tree.
pub struct MemoryNode {
    id: u64,
    kind: NodeKind,
    attrs: RefCell<Attrs>,
    text: RefCell<String>,
    children: RefCell<Vec<NativeHandle>>,
    hydrated: Cell<bool>,
}

impl MemoryNode {
    fn new(id: u64, kind: NodeKind) -> Self {
        Self {
            id,
            kind,
            attrs: RefCell::new(Attrs::new()),
            text: RefCell::new(String::new()),
            children: RefCell::new(Vec::new()),
            hydrated: Cell::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn attr(&self, name: &str) -> Option<AttrValue> {
        self.attrs.borrow().get(name).cloned()
    }

    pub fn text(&self) -> String {
        self.text.borrow().clone()
    }

    pub fn children(&self) -> Vec<NativeHandle> {
        self.children.borrow().clone()
    }

    /// Created while hydrating.
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.get()
    }

    fn apply(&self, instance: &Instance) {
        match instance {
            Instance::Tag(tag) => *self.attrs.borrow_mut() = tag.attrs.clone(),
            Instance::Text(value) | Instance::Comment(value) => {
                *self.text.borrow_mut() = value.to_string();
            }
            Instance::Component(_) => {}
        }
    }

    fn insert(&self, handle: &NativeHandle, index: usize) {
        let mut children = self.children.borrow_mut();
        let index = index.min(children.len());
        children.insert(index, handle.clone());
    }

    fn remove(&self, handle: &NativeHandle) {
        self.children.borrow_mut().retain(|child| !child.ptr_eq(handle));
    }
}

// =============================================================================
// Recorded Operations
// =============================================================================

/// A mutation as seen by the host, with nodes identified by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedOp {
    Create { node: u64, parent: u64, index: usize },
    Update { node: u64 },
    Move { nodes: Vec<u64>, parent: u64, index: usize },
    Detach { nodes: Vec<u64>, parent: u64 },
    Delete { nodes: Vec<u64>, parent: u64 },
    UnmountPortal { target: u64 },
}

impl RecordedOp {
    pub fn is_create(&self) -> bool {
        matches!(self, RecordedOp::Create { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, RecordedOp::Update { .. })
    }

    pub fn is_move(&self) -> bool {
        matches!(self, RecordedOp::Move { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, RecordedOp::Delete { .. })
    }
}

// =============================================================================
// Host
// =============================================================================

struct HostState {
    next_id: u64,
    container: NativeHandle,
    ops: Vec<RecordedOp>,
    scheduled: Vec<(WorkCallback, ScheduleOptions)>,
    yield_after: Option<usize>,
    batches: usize,
}

/// Cloneable in-memory host. Clones share one tree and one work queue.
#[derive(Clone)]
pub struct MemoryHost {
    state: Rc<RefCell<HostState>>,
    units: Rc<Cell<usize>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    pub fn new() -> Self {
        let container = NativeHandle::from_rc(Rc::new(MemoryNode::new(
            0,
            NodeKind::Container("root".to_string()),
        )));
        Self {
            state: Rc::new(RefCell::new(HostState {
                next_id: 1,
                container,
                ops: Vec::new(),
                scheduled: Vec::new(),
                yield_after: None,
                batches: 0,
            })),
            units: Rc::new(Cell::new(0)),
        }
    }

    /// The default container node.
    pub fn container(&self) -> NativeHandle {
        self.state.borrow().container.clone()
    }

    /// A new detached container, e.g. a portal target.
    pub fn create_container(&self, name: &str) -> NativeHandle {
        let id = self.next_id();
        NativeHandle::from_rc(Rc::new(MemoryNode::new(
            id,
            NodeKind::Container(name.to_string()),
        )))
    }

    fn next_id(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        id
    }

    pub fn node(handle: &NativeHandle) -> Option<Rc<MemoryNode>> {
        handle.downcast::<MemoryNode>()
    }

    pub fn node_id(handle: &NativeHandle) -> u64 {
        handle.downcast_ref::<MemoryNode>().map_or(0, MemoryNode::id)
    }

    /// Ask the engine to yield after every `units` work units.
    pub fn set_yield_after(&self, units: Option<usize>) {
        self.state.borrow_mut().yield_after = units;
        self.units.set(0);
    }

    pub fn ops(&self) -> Vec<RecordedOp> {
        self.state.borrow().ops.clone()
    }

    pub fn take_ops(&self) -> Vec<RecordedOp> {
        std::mem::take(&mut self.state.borrow_mut().ops)
    }

    pub fn clear_ops(&self) {
        self.state.borrow_mut().ops.clear();
    }

    /// Number of finished commit batches.
    pub fn batches(&self) -> usize {
        self.state.borrow().batches
    }

    pub fn scheduled_len(&self) -> usize {
        self.state.borrow().scheduled.len()
    }

    /// Run the most urgent scheduled callback. Returns false when none is
    /// queued.
    pub fn run_next(&self) -> bool {
        let next = {
            let mut state = self.state.borrow_mut();
            let index = state
                .scheduled
                .iter()
                .enumerate()
                .rev()
                .max_by_key(|(_, (_, options))| options.priority)
                .map(|(index, _)| index);
            index.map(|index| state.scheduled.remove(index))
        };
        match next {
            Some((callback, _)) => {
                self.units.set(0);
                callback();
                true
            }
            None => false,
        }
    }

    /// Run scheduled callbacks, including ones they schedule, until none is
    /// left.
    pub fn run_scheduled(&self) {
        while self.run_next() {}
    }

    /// Serialize the children of `handle`. Empty placeholders are left out.
    pub fn render_to_string(&self, handle: &NativeHandle) -> String {
        let mut out = String::new();
        if let Some(node) = handle.downcast_ref::<MemoryNode>() {
            for child in node.children.borrow().iter() {
                write_node(child, &mut out);
            }
        }
        out
    }

    fn record(&self, op: RecordedOp) {
        self.state.borrow_mut().ops.push(op);
    }
}

fn ids(handles: &[NativeHandle]) -> Vec<u64> {
    handles.iter().map(MemoryHost::node_id).collect()
}

fn write_node(handle: &NativeHandle, out: &mut String) {
    let Some(node) = handle.downcast_ref::<MemoryNode>() else {
        return;
    };
    match &node.kind {
        NodeKind::Text => out.push_str(&node.text.borrow()),
        NodeKind::Comment => {
            let text = node.text.borrow();
            if *text != EMPTY_MARKER {
                let _ = write!(out, "<!--{text}-->");
            }
        }
        NodeKind::Element(_) | NodeKind::Container(_) => {
            let name = match &node.kind {
                NodeKind::Element(name) => name.to_string(),
                NodeKind::Container(name) => name.clone(),
                NodeKind::Text | NodeKind::Comment => String::new(),
            };
            let _ = write!(out, "<{name}");
            for (attr, value) in node.attrs.borrow().iter() {
                if !matches!(value, AttrValue::Any(_)) {
                    let _ = write!(out, " {attr}=\"{value}\"");
                }
            }
            out.push('>');
            for child in node.children.borrow().iter() {
                write_node(child, out);
            }
            let _ = write!(out, "</{name}>");
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_native_handle(&mut self, instance: &Instance) -> NativeHandle {
        let kind = match instance {
            Instance::Tag(tag) => NodeKind::Element(tag.name.clone()),
            Instance::Text(_) => NodeKind::Text,
            Instance::Comment(_) | Instance::Component(_) => NodeKind::Comment,
        };
        let node = MemoryNode::new(self.next_id(), kind);
        node.apply(instance);
        NativeHandle::from_rc(Rc::new(node))
    }

    fn commit(&mut self, mutation: Mutation<'_>) {
        match mutation {
            Mutation::Create {
                handle,
                instance,
                parent,
                index,
                hydrating,
            } => {
                if let Some(node) = handle.downcast_ref::<MemoryNode>() {
                    node.apply(instance);
                    node.hydrated.set(hydrating);
                }
                if let Some(parent) = parent.downcast_ref::<MemoryNode>() {
                    parent.insert(handle, index);
                }
                self.record(RecordedOp::Create {
                    node: MemoryHost::node_id(handle),
                    parent: MemoryHost::node_id(parent),
                    index,
                });
            }
            Mutation::Update { handle, next, .. } => {
                if let Some(node) = handle.downcast_ref::<MemoryNode>() {
                    node.apply(next);
                }
                self.record(RecordedOp::Update {
                    node: MemoryHost::node_id(handle),
                });
            }
            Mutation::Move {
                handles,
                parent,
                index,
            } => {
                if let Some(parent) = parent.downcast_ref::<MemoryNode>() {
                    for (offset, handle) in handles.iter().enumerate() {
                        parent.remove(handle);
                        parent.insert(handle, index + offset);
                    }
                }
                self.record(RecordedOp::Move {
                    nodes: ids(handles),
                    parent: MemoryHost::node_id(parent),
                    index,
                });
            }
            Mutation::Detach { handles, parent } => {
                if let Some(parent) = parent.downcast_ref::<MemoryNode>() {
                    for handle in handles {
                        parent.remove(handle);
                    }
                }
                self.record(RecordedOp::Detach {
                    nodes: ids(handles),
                    parent: MemoryHost::node_id(parent),
                });
            }
            Mutation::Delete { handles, parent } => {
                if let Some(parent) = parent.downcast_ref::<MemoryNode>() {
                    for handle in handles {
                        parent.remove(handle);
                    }
                }
                self.record(RecordedOp::Delete {
                    nodes: ids(handles),
                    parent: MemoryHost::node_id(parent),
                });
            }
        }
    }

    fn finish_commit_batch(&mut self) {
        self.state.borrow_mut().batches += 1;
    }

    fn schedule_work(&mut self, callback: WorkCallback, options: ScheduleOptions) {
        self.state.borrow_mut().scheduled.push((callback, options));
    }

    fn should_yield(&self) -> bool {
        let Some(limit) = self.state.borrow().yield_after else {
            return false;
        };
        let units = self.units.get() + 1;
        self.units.set(units);
        units >= limit
    }

    fn unmount_portal(&mut self, target: &NativeHandle) {
        self.record(RecordedOp::UnmountPortal {
            target: MemoryHost::node_id(target),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{tag, text};
    use crate::types::Priority;

    fn create(host: &mut MemoryHost, instance: &Instance, parent: &NativeHandle, index: usize) -> NativeHandle {
        let handle = host.create_native_handle(instance);
        host.commit(Mutation::Create {
            handle: &handle,
            instance,
            parent,
            index,
            hydrating: false,
        });
        handle
    }

    #[test]
    fn test_create_and_serialize() {
        let mut host = MemoryHost::new();
        let container = host.container();
        let div: Instance = tag("div").attr("id", "a").into();
        let node = create(&mut host, &div, &container, 0);
        create(&mut host, &text("hi"), &node, 0);

        assert_eq!(host.render_to_string(&container), "<div id=\"a\">hi</div>");
        assert_eq!(host.ops().len(), 2);
        assert!(host.ops().iter().all(RecordedOp::is_create));
    }

    #[test]
    fn test_move_reinserts_in_order() {
        let mut host = MemoryHost::new();
        let container = host.container();
        let handles: Vec<_> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(index, value)| create(&mut host, &text(value), &container, index))
            .collect();

        host.commit(Mutation::Move {
            handles: std::slice::from_ref(&handles[2]),
            parent: &container,
            index: 0,
        });
        assert_eq!(host.render_to_string(&container), "cab");

        host.commit(Mutation::Delete {
            handles: &handles[..1],
            parent: &container,
        });
        assert_eq!(host.render_to_string(&container), "cb");
    }

    #[test]
    fn test_scheduled_work_runs_by_priority() {
        let mut host = MemoryHost::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        for (name, priority) in [("low", Priority::Low), ("high", Priority::High), ("normal", Priority::Normal)] {
            let log = log.clone();
            host.schedule_work(Box::new(move || log.borrow_mut().push(name)), ScheduleOptions::new(priority));
        }
        host.run_scheduled();
        assert_eq!(*log.borrow(), vec!["high", "normal", "low"]);
        assert_eq!(host.scheduled_len(), 0);
    }

    #[test]
    fn test_yield_after_units() {
        let host = MemoryHost::new();
        assert!(!host.should_yield());
        host.set_yield_after(Some(2));
        assert!(!host.should_yield());
        assert!(host.should_yield());
    }
}
