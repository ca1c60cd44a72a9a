//! Fiber Tree - arena of durable render positions.
//!
//! Fibers live in a [`SlotMap`] and link to each other by [`FiberId`]:
//! `parent`, `child` (first), `next_sibling` and `alternate`. The alternate
//! is a weak back-reference to the fiber of the previous commit at the same
//! position; it is used for diffing only. Because keys are generational a
//! stale alternate simply fails to resolve once its fiber was freed.
//!
//! The committed tree is never mutated while a pass is in progress. Fibers
//! built by the pass are recorded so an abandoned pass can be dropped.

mod walk;

pub(crate) use walk::ChildIter;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};

use crate::element::Instance;
use crate::error::ComponentError;
use crate::hooks::SharedHookStore;
use crate::platform::NativeHandle;
use crate::suspense::Pending;
use crate::types::{EffectTag, FiberFlags};

new_key_type! {
    /// Handle of a fiber in the arena.
    pub struct FiberId;
}

/// Called with the error of a failed descendant.
pub(crate) type ErrorHandler = Rc<dyn Fn(ComponentError)>;
/// Called with the pending signal of a suspended descendant.
pub(crate) type SuspenseHandler = Rc<dyn Fn(Pending)>;

// =============================================================================
// Provider Map
// =============================================================================

pub(crate) type Subscriber = Rc<dyn Fn(&Rc<dyn Any>)>;

pub(crate) struct ProviderEntry {
    pub(crate) value: Rc<dyn Any>,
    subscribers: Vec<(u64, Subscriber)>,
}

#[derive(Default)]
struct ProviderMapInner {
    entries: HashMap<u64, ProviderEntry>,
    next_subscriber: u64,
}

/// Committed context values of a provider fiber and their subscribers,
/// shared with its alternate so subscriptions survive re-renders.
#[derive(Clone, Default)]
pub(crate) struct ProviderMap(Rc<RefCell<ProviderMapInner>>);

impl ProviderMap {
    pub(crate) fn set_value(&self, context: u64, value: Rc<dyn Any>) {
        let mut inner = self.0.borrow_mut();
        match inner.entries.get_mut(&context) {
            Some(entry) => entry.value = value,
            None => {
                inner.entries.insert(
                    context,
                    ProviderEntry {
                        value,
                        subscribers: Vec::new(),
                    },
                );
            }
        }
    }

    pub(crate) fn subscribe(&self, context: u64, subscriber: Subscriber) -> u64 {
        let mut inner = self.0.borrow_mut();
        inner.next_subscriber += 1;
        let id = inner.next_subscriber;
        if let Some(entry) = inner.entries.get_mut(&context) {
            entry.subscribers.push((id, subscriber));
        }
        id
    }

    pub(crate) fn unsubscribe(&self, context: u64, id: u64) {
        if let Some(entry) = self.0.borrow_mut().entries.get_mut(&context) {
            entry.subscribers.retain(|(sub, _)| *sub != id);
        }
    }

    /// Hand the current value to every subscriber.
    pub(crate) fn notify(&self, context: u64) {
        let (value, subscribers) = {
            let inner = self.0.borrow();
            let Some(entry) = inner.entries.get(&context) else {
                return;
            };
            let subscribers: Vec<Subscriber> =
                entry.subscribers.iter().map(|(_, s)| s.clone()).collect();
            (entry.value.clone(), subscribers)
        };
        for subscriber in subscribers {
            subscriber(&value);
        }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self, context: u64) -> usize {
        self.0
            .borrow()
            .entries
            .get(&context)
            .map_or(0, |entry| entry.subscribers.len())
    }

    pub(crate) fn ptr_id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }
}

// =============================================================================
// Fiber
// =============================================================================

/// A child position planned by the reconciler.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PlannedChild {
    /// Previous fiber chosen as the diff baseline.
    pub(crate) alternate: Option<FiberId>,
    /// Keyed child changed relative order.
    pub(crate) moved: bool,
}

pub(crate) struct Fiber {
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) next_sibling: Option<FiberId>,
    pub(crate) alternate: Option<FiberId>,
    /// Position among the siblings.
    pub(crate) idx: usize,
    pub(crate) instance: Instance,
    pub(crate) hooks: Option<SharedHookStore>,
    pub(crate) tag: EffectTag,
    pub(crate) flags: FiberFlags,
    pub(crate) native: Option<NativeHandle>,
    /// Target handle if this fiber is a portal.
    pub(crate) portal: Option<NativeHandle>,
    pub(crate) providers: Option<ProviderMap>,
    /// Context id and value this fiber provided in its last render.
    pub(crate) provided: Option<(u64, Rc<dyn Any>)>,
    pub(crate) catch: Option<ErrorHandler>,
    pub(crate) suspense: Option<SuspenseHandler>,
    /// Child instances waiting to be mounted, with their plan.
    pub(crate) pending: Vec<Instance>,
    pub(crate) plan: Vec<PlannedChild>,
}

impl Fiber {
    pub(crate) fn new(instance: Instance) -> Self {
        Self {
            parent: None,
            child: None,
            next_sibling: None,
            alternate: None,
            idx: 0,
            instance,
            hooks: None,
            tag: EffectTag::Create,
            flags: FiberFlags::empty(),
            native: None,
            portal: None,
            providers: None,
            provided: None,
            catch: None,
            suspense: None,
            pending: Vec::new(),
            plan: Vec::new(),
        }
    }

    /// Primitive fiber owning a native node.
    pub(crate) fn is_host(&self) -> bool {
        self.instance.is_primitive()
    }

    /// Not taken out of its parent by a hidden shadow.
    pub(crate) fn is_attached(&self) -> bool {
        !self.flags.contains(FiberFlags::DETACHED)
    }

    pub(crate) fn name(&self) -> String {
        self.instance.display_name()
    }

    pub(crate) fn component_name(&self) -> &'static str {
        match &self.instance {
            Instance::Component(invocation) => invocation.name(),
            Instance::Tag(_) => "tag",
            Instance::Text(_) => "text",
            Instance::Comment(_) => "comment",
        }
    }
}

// =============================================================================
// Fiber Tree
// =============================================================================

#[derive(Default)]
pub(crate) struct FiberTree {
    fibers: SlotMap<FiberId, Fiber>,
}

impl FiberTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub(crate) fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub(crate) fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub(crate) fn len(&self) -> usize {
        self.fibers.len()
    }

    pub(crate) fn remove(&mut self, id: FiberId) -> Option<Fiber> {
        self.fibers.remove(id)
    }

    /// Free a fiber and all of its descendants.
    pub(crate) fn remove_subtree(&mut self, id: FiberId) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(fiber) = self.fibers.remove(id) else {
                continue;
            };
            let mut child = fiber.child;
            while let Some(current) = child {
                stack.push(current);
                child = self.fibers.get(current).and_then(|f| f.next_sibling);
            }
        }
    }

    pub(crate) fn parent(&self, id: FiberId) -> Option<FiberId> {
        self.get(id).and_then(|fiber| fiber.parent)
    }

    pub(crate) fn children(&self, id: FiberId) -> ChildIter<'_> {
        ChildIter::new(self, self.get(id).and_then(|fiber| fiber.child))
    }

    /// Set flags on a fiber and bubble the bubbling ones to its ancestors.
    pub(crate) fn mark(&mut self, id: FiberId, flags: FiberFlags) {
        let mut current = Some(id);
        let bubbling = flags & FiberFlags::BUBBLING;
        let mut first = true;
        while let Some(id) = current {
            let Some(fiber) = self.fibers.get_mut(id) else {
                break;
            };
            let wanted = if first { flags } else { bubbling };
            if !first && fiber.flags.contains(wanted) {
                break;
            }
            fiber.flags |= wanted;
            first = false;
            current = fiber.parent;
        }
    }

    /// Point the children of `id` at it as their parent.
    pub(crate) fn adopt_children(&mut self, id: FiberId) {
        let mut child = self.get(id).and_then(|fiber| fiber.child);
        while let Some(current) = child {
            let Some(fiber) = self.fibers.get_mut(current) else {
                break;
            };
            fiber.parent = Some(id);
            child = fiber.next_sibling;
        }
    }

    /// Nearest ancestor that owns a native container: a host fiber or a
    /// portal. Returns the fiber and the handle children are placed into.
    pub(crate) fn host_container(&self, id: FiberId) -> Option<(FiberId, NativeHandle)> {
        let mut current = self.parent(id);
        while let Some(id) = current {
            let fiber = self.get(id)?;
            if let Some(target) = &fiber.portal {
                return Some((id, target.clone()));
            }
            if fiber.is_host() {
                if let Some(native) = &fiber.native {
                    return Some((id, native.clone()));
                }
            }
            current = fiber.parent;
        }
        None
    }

    /// Whether a hidden shadow above `id` keeps its native nodes out of
    /// their host container.
    pub(crate) fn in_hidden_shadow(&self, id: FiberId) -> bool {
        let mut current = self.parent(id);
        while let Some(id) = current {
            let Some(fiber) = self.get(id) else {
                return false;
            };
            if fiber.is_host() || fiber.portal.is_some() {
                return false;
            }
            if fiber.instance.is_hidden_shadow() {
                return true;
            }
            current = fiber.parent;
        }
        false
    }

    /// Walk from `id` towards the root until `visit` returns a value.
    pub(crate) fn find_ancestor<T>(
        &self,
        id: FiberId,
        mut visit: impl FnMut(&Fiber) -> Option<T>,
    ) -> Option<T> {
        let mut current = Some(id);
        while let Some(id) = current {
            let fiber = self.get(id)?;
            if let Some(found) = visit(fiber) {
                return Some(found);
            }
            current = fiber.parent;
        }
        None
    }

    // -------------------------------------------------------------------------
    // Host node queries
    // -------------------------------------------------------------------------

    /// Top-level native nodes of the subtree rooted at `id` that sit in
    /// their parent. Nodes hidden by a shadow are not included.
    ///
    /// With `placed_only`, descendants that are newly created or moved on
    /// their own are left out: they are placed separately by the commit walk.
    pub(crate) fn host_nodes(&self, id: FiberId, placed_only: bool) -> Vec<NativeHandle> {
        let mut out = Vec::new();
        self.collect_host_nodes(id, placed_only, true, &mut out);
        out
    }

    fn collect_host_nodes(
        &self,
        id: FiberId,
        placed_only: bool,
        is_root: bool,
        out: &mut Vec<NativeHandle>,
    ) {
        let Some(fiber) = self.get(id) else {
            return;
        };
        if !is_root {
            if fiber.portal.is_some() {
                return;
            }
            if placed_only
                && (fiber.tag == EffectTag::Create || fiber.flags.contains(FiberFlags::MOVED))
            {
                return;
            }
        }
        if fiber.is_host() {
            if let Some(native) = fiber.native.as_ref().filter(|_| fiber.is_attached()) {
                out.push(native.clone());
            }
            return;
        }
        if fiber.portal.is_some() {
            return;
        }
        for child in self.children(id) {
            self.collect_host_nodes(child, placed_only, false, out);
        }
    }

    /// Native nodes placed inside `container` before the subtree of
    /// `target`, which must be a descendant of `container`.
    pub(crate) fn host_index_before(&self, container: FiberId, target: FiberId) -> usize {
        let mut count = 0;
        for child in self.children(container) {
            if self.count_until(child, target, &mut count) {
                break;
            }
        }
        count
    }

    // Returns true once `target` was reached.
    fn count_until(&self, id: FiberId, target: FiberId, count: &mut usize) -> bool {
        if id == target {
            return true;
        }
        let Some(fiber) = self.get(id) else {
            return false;
        };
        if fiber.portal.is_some() {
            return false;
        }
        if fiber.is_host() {
            if fiber.native.is_some() && fiber.is_attached() {
                *count += 1;
            }
            return false;
        }
        for child in self.children(id) {
            if self.count_until(child, target, count) {
                return true;
            }
        }
        false
    }
}
