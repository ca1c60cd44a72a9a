//! Commit - applies a finished pass to the host.
//!
//! The root drives the phases and runs user callbacks between them with no
//! engine state borrowed:
//!
//! 1. Insertion effects
//! 2. Deletions: cleanups child before parent, then native removal
//! 3. Detach of moved nodes
//! 4. Placement walk in tree order: creates, moves and updates with final
//!    indices
//! 5. Layout effects
//! 6. Passive effects, handed to the host scheduler
//! 7. Promotion of the work-in-progress tree to current
//!
//! Native nodes under a hidden shadow stay mounted but out of their parent.
//! The walk tracks whether it is inside one and detaches or reattaches each
//! top-level node accordingly.
//!
//! This module holds the phases that touch the tree and the host.

mod unmount;

pub(crate) use unmount::{collect_unmount, Unmounted};

use std::slice;

use crate::element::Instance;
use crate::fiber::{FiberId, FiberTree};
use crate::platform::{HostAdapter, Mutation, NativeHandle};
use crate::scheduler::work_loop::{PassKind, WorkInProgress};
use crate::types::{EffectTag, FiberFlags};

/// Host work done by one commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitReport {
    pub created: usize,
    pub updated: usize,
    pub moved: usize,
    /// Deleted subtrees.
    pub deleted: usize,
    /// Memoized subtrees reused without rendering.
    pub skipped: usize,
}

impl CommitReport {
    /// No native node was touched.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.moved == 0 && self.deleted == 0
    }
}

// =============================================================================
// Deletions
// =============================================================================

/// Remove deleted subtrees from the host and free them.
///
/// Effect cleanups must have run already (see [`collect_unmount`]).
pub(crate) fn apply_deletions(
    tree: &mut FiberTree,
    deletions: &[FiberId],
    unmounted: &Unmounted,
    host: &mut dyn HostAdapter,
    report: &mut CommitReport,
) {
    for portal in &unmounted.portals {
        if !portal.nodes.is_empty() {
            host.commit(Mutation::Delete {
                handles: &portal.nodes,
                parent: &portal.target,
            });
        }
        host.unmount_portal(&portal.target);
    }

    for &id in deletions {
        if !tree.contains(id) {
            continue;
        }
        let handles = tree.host_nodes(id, false);
        tracing::trace!(fiber = ?id, nodes = handles.len(), "delete");
        if !handles.is_empty() {
            if let Some((_, parent)) = tree.host_container(id) {
                host.commit(Mutation::Delete {
                    handles: &handles,
                    parent: &parent,
                });
            }
        }
        tree.remove_subtree(id);
        report.deleted += 1;
    }
}

// =============================================================================
// Moves
// =============================================================================

/// Take every moved node out of its parent so the placement walk can
/// reinsert it at its final index.
pub(crate) fn detach_moved(tree: &FiberTree, moves: &[FiberId], host: &mut dyn HostAdapter) {
    for &id in moves {
        // Nodes ending up in a hidden shadow are detached by the walk
        let hidden = tree
            .get(id)
            .is_some_and(|fiber| fiber.instance.is_hidden_shadow());
        if hidden || tree.in_hidden_shadow(id) {
            continue;
        }
        let handles = tree.host_nodes(id, true);
        if handles.is_empty() {
            continue;
        }
        if let Some((_, parent)) = tree.host_container(id) {
            host.commit(Mutation::Detach {
                handles: &handles,
                parent: &parent,
            });
        }
    }
}

// =============================================================================
// Placement Walk
// =============================================================================

/// Insertion point among the native children of a container.
struct HostFrame {
    handle: NativeHandle,
    next: usize,
}

struct Walk<'a> {
    host: &'a mut dyn HostAdapter,
    report: &'a mut CommitReport,
    hydrating: bool,
    /// Inside a hidden shadow of the current host frame.
    hidden: bool,
}

/// Issue creates, moves and updates for the pass in tree order.
pub(crate) fn place(
    tree: &mut FiberTree,
    wip: &WorkInProgress,
    host: &mut dyn HostAdapter,
    report: &mut CommitReport,
) {
    let mut walk = Walk {
        host,
        report,
        hydrating: wip.hydrating,
        hidden: false,
    };
    match wip.kind {
        PassKind::Full => {
            let Some(handle) = tree.get(wip.root).and_then(|root| root.native.clone()) else {
                return;
            };
            let mut frame = HostFrame { handle, next: 0 };
            place_children(tree, wip.root, &mut frame, &mut walk);
        }
        PassKind::Partial { replaces } => {
            let Some((container, handle)) = tree.host_container(wip.root) else {
                return;
            };
            let next = tree.host_index_before(container, replaces);
            let mut frame = HostFrame { handle, next };
            walk.hidden = tree.in_hidden_shadow(wip.root);
            place_fiber(tree, wip.root, &mut frame, &mut walk);
        }
    }
}

fn place_children(tree: &mut FiberTree, id: FiberId, frame: &mut HostFrame, walk: &mut Walk<'_>) {
    let mut child = tree.get(id).and_then(|fiber| fiber.child);
    while let Some(current) = child {
        place_fiber(tree, current, frame, walk);
        child = tree.get(current).and_then(|fiber| fiber.next_sibling);
    }
}

fn place_fiber(tree: &mut FiberTree, id: FiberId, frame: &mut HostFrame, walk: &mut Walk<'_>) {
    let Some(fiber) = tree.get(id) else {
        return;
    };
    if let Some(hooks) = &fiber.hooks {
        hooks.borrow().target.set_owner(id);
    }
    let tag = fiber.tag;
    let moved = fiber.flags.contains(FiberFlags::MOVED);
    let detached = !fiber.is_attached();
    let is_host = fiber.is_host();
    let native = fiber.native.clone();
    let portal = fiber.portal.clone();
    let instance = fiber.instance.clone();
    let previous = fiber
        .alternate
        .and_then(|alternate| tree.get(alternate))
        .map(|alternate| alternate.instance.clone());

    if tag == EffectTag::Skip {
        place_kept(tree, id, moved, frame, walk);
        tree.adopt_children(id);
        walk.report.skipped += 1;
        return;
    }

    if let Some(target) = portal {
        // A portal's nodes live in its target; its own position is irrelevant
        let mut portal_frame = HostFrame {
            handle: target,
            next: 0,
        };
        let hidden = std::mem::replace(&mut walk.hidden, false);
        place_children(tree, id, &mut portal_frame, walk);
        walk.hidden = hidden;
        return;
    }

    if !is_host {
        let hidden = walk.hidden;
        walk.hidden |= instance.is_hidden_shadow();
        if tag == EffectTag::Update && moved && !walk.hidden {
            let handles = tree.host_nodes(id, true);
            if !handles.is_empty() {
                walk.host.commit(Mutation::Move {
                    handles: &handles,
                    parent: &frame.handle,
                    index: frame.next,
                });
            }
            walk.report.moved += 1;
        }
        place_children(tree, id, frame, walk);
        walk.hidden = hidden;
        return;
    }

    let Some(native) = native else {
        return;
    };
    let index = frame.next;
    if !walk.hidden {
        frame.next += 1;
    }
    tracing::trace!(fiber = ?id, ?tag, moved, index, hidden = walk.hidden, "place");
    match (tag, &previous) {
        (EffectTag::Create, _) => {
            walk.host.commit(Mutation::Create {
                handle: &native,
                instance: &instance,
                parent: &frame.handle,
                index,
                hydrating: walk.hydrating,
            });
            walk.report.created += 1;
            if walk.hidden {
                detach(walk, &native, &frame.handle);
            }
        }
        (EffectTag::Update, Some(previous)) => {
            if walk.hidden {
                if !detached {
                    detach(walk, &native, &frame.handle);
                }
            } else if moved || detached {
                walk.host.commit(Mutation::Move {
                    handles: slice::from_ref(&native),
                    parent: &frame.handle,
                    index,
                });
                walk.report.moved += 1;
            }
            if previous.differs_for_host(&instance) {
                walk.host.commit(Mutation::Update {
                    handle: &native,
                    prev: previous,
                    next: &instance,
                });
                walk.report.updated += 1;
            }
        }
        _ => {}
    }
    swap_node_ref(previous.as_ref(), &instance, &native);
    if let Some(fiber) = tree.get_mut(id) {
        fiber.flags.set(FiberFlags::DETACHED, walk.hidden);
    }
    tree.mark(id, FiberFlags::MOUNTED_TO_HOST);

    let hidden = std::mem::replace(&mut walk.hidden, false);
    let mut child_frame = HostFrame {
        handle: native,
        next: 0,
    };
    place_children(tree, id, &mut child_frame, walk);
    walk.hidden = hidden;
}

fn detach(walk: &mut Walk<'_>, native: &NativeHandle, parent: &NativeHandle) {
    walk.host.commit(Mutation::Detach {
        handles: slice::from_ref(native),
        parent,
    });
}

/// Top-level host fiber of a reused subtree.
struct KeptNode {
    id: FiberId,
    native: NativeHandle,
    /// Under a hidden shadow after this commit.
    hide: bool,
    detached: bool,
}

fn collect_kept(tree: &FiberTree, id: FiberId, hide: bool, out: &mut Vec<KeptNode>) {
    for child in tree.children(id) {
        let Some(fiber) = tree.get(child) else {
            continue;
        };
        if fiber.portal.is_some() {
            continue;
        }
        if fiber.is_host() {
            if let Some(native) = &fiber.native {
                out.push(KeptNode {
                    id: child,
                    native: native.clone(),
                    hide,
                    detached: !fiber.is_attached(),
                });
            }
            continue;
        }
        collect_kept(tree, child, hide || fiber.instance.is_hidden_shadow(), out);
    }
}

/// Position the nodes of a memoized subtree reused as is.
///
/// Its fibers are not walked; only their attachment can change, when the
/// subtree moved or a shadow around it was shown or hidden.
fn place_kept(
    tree: &mut FiberTree,
    id: FiberId,
    moved: bool,
    frame: &mut HostFrame,
    walk: &mut Walk<'_>,
) {
    let mut kept = Vec::new();
    collect_kept(tree, id, walk.hidden, &mut kept);
    if moved {
        walk.report.moved += 1;
    }

    // Moved out of a visible region: detached as a whole before the walk
    let lifted = moved && !walk.hidden;
    let settled = kept.iter().all(|node| node.hide == node.detached);
    if lifted && settled {
        let handles: Vec<NativeHandle> = kept
            .iter()
            .filter(|node| !node.hide)
            .map(|node| node.native.clone())
            .collect();
        if !handles.is_empty() {
            walk.host.commit(Mutation::Move {
                handles: &handles,
                parent: &frame.handle,
                index: frame.next,
            });
        }
        frame.next += handles.len();
        return;
    }

    for node in kept {
        let detached = node.detached || lifted;
        if node.hide {
            if !detached {
                detach(walk, &node.native, &frame.handle);
            }
        } else {
            if detached {
                walk.host.commit(Mutation::Move {
                    handles: slice::from_ref(&node.native),
                    parent: &frame.handle,
                    index: frame.next,
                });
            }
            frame.next += 1;
        }
        if let Some(fiber) = tree.get_mut(node.id) {
            fiber.flags.set(FiberFlags::DETACHED, node.hide);
        }
    }
}

fn swap_node_ref(previous: Option<&Instance>, next: &Instance, native: &NativeHandle) {
    let previous_ref = previous
        .and_then(Instance::as_tag)
        .and_then(|tag| tag.node_ref.as_ref());
    let next_ref = next.as_tag().and_then(|tag| tag.node_ref.as_ref());
    if let Some(previous_ref) = previous_ref {
        if next_ref.is_none_or(|next_ref| !next_ref.ptr_eq(previous_ref)) {
            previous_ref.set(None);
        }
    }
    if let Some(next_ref) = next_ref {
        next_ref.set(Some(native.clone()));
    }
}

// =============================================================================
// Promotion
// =============================================================================

/// Make the pass the current tree and free the fibers it replaced.
pub(crate) fn promote(tree: &mut FiberTree, wip: &WorkInProgress, current: &mut Option<FiberId>) {
    match wip.kind {
        PassKind::Full => *current = Some(wip.root),
        PassKind::Partial { replaces } => splice(tree, replaces, wip.root),
    }
    for &id in &wip.created {
        let Some(fiber) = tree.get_mut(id) else {
            continue;
        };
        fiber.flags.remove(FiberFlags::MOVED);
        // Committed: later passes must not take it for a fresh node
        if fiber.tag == EffectTag::Create {
            fiber.tag = EffectTag::Update;
        }
        fiber.pending = Vec::new();
        fiber.plan = Vec::new();
        if let Some(alternate) = fiber.alternate.take() {
            tree.remove(alternate);
        }
    }
}

/// Put `new` in the sibling chain in place of `old`.
fn splice(tree: &mut FiberTree, old: FiberId, new: FiberId) {
    let next_sibling = tree.get(old).and_then(|fiber| fiber.next_sibling);
    if let Some(fiber) = tree.get_mut(new) {
        fiber.next_sibling = next_sibling;
    }
    let Some(parent) = tree.parent(old) else {
        return;
    };
    if tree.get(parent).and_then(|fiber| fiber.child) == Some(old) {
        if let Some(parent) = tree.get_mut(parent) {
            parent.child = Some(new);
        }
        return;
    }
    let previous = tree
        .children(parent)
        .find(|sibling| tree.get(*sibling).and_then(|fiber| fiber.next_sibling) == Some(old));
    if let Some(previous) = previous.and_then(|previous| tree.get_mut(previous)) {
        previous.next_sibling = Some(new);
    }
}
