//! Unmount bookkeeping for deleted subtrees.

use crate::element::Instance;
use crate::fiber::{FiberId, FiberTree};
use crate::hooks::{Cleanup, EffectPhase};
use crate::platform::NativeHandle;
use crate::types::FiberFlags;

/// Cleanups of one fiber run in this phase order.
const UNMOUNT_ORDER: [EffectPhase; 3] =
    [EffectPhase::Insertion, EffectPhase::Layout, EffectPhase::Passive];

/// Native nodes a portal rendered into its target.
pub(crate) struct PortalRemoval {
    pub(crate) target: NativeHandle,
    pub(crate) nodes: Vec<NativeHandle>,
}

/// Everything collected from deleted subtrees before they are freed.
#[derive(Default)]
pub(crate) struct Unmounted {
    /// Effect cleanups, children before parents.
    pub(crate) cleanups: Vec<Cleanup>,
    pub(crate) portals: Vec<PortalRemoval>,
    pub(crate) fibers: usize,
}

impl Unmounted {
    /// Run every collected cleanup in order.
    pub(crate) fn run_cleanups(&mut self) {
        for cleanup in std::mem::take(&mut self.cleanups) {
            cleanup();
        }
    }
}

/// Collect the subtree at `id` post-order.
///
/// Update targets are released on the way so updates requested by the
/// cleanups themselves are ignored.
pub(crate) fn collect_unmount(tree: &FiberTree, id: FiberId, out: &mut Unmounted) {
    let Some(fiber) = tree.get(id) else {
        return;
    };
    for child in tree.children(id) {
        collect_unmount(tree, child, out);
    }

    if let Some(target) = &fiber.portal {
        let nodes = tree
            .children(id)
            .flat_map(|child| tree.host_nodes(child, false))
            .collect();
        out.portals.push(PortalRemoval {
            target: target.clone(),
            nodes,
        });
    }
    if let Some(hooks) = &fiber.hooks {
        let mut store = hooks.borrow_mut();
        store.target.release();
        if fiber.flags.intersects(FiberFlags::NEEDS_UNMOUNT) {
            out.cleanups.extend(store.take_cleanups(&UNMOUNT_ORDER));
        }
    }
    if let Instance::Tag(tag) = &fiber.instance {
        if let (Some(node_ref), Some(native)) = (&tag.node_ref, &fiber.native) {
            if node_ref.get().is_some_and(|current| current.ptr_eq(native)) {
                node_ref.set(None);
            }
        }
    }
    out.fibers += 1;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{tag, Component, Element, NodeRef};
    use crate::fiber::Fiber;
    use crate::hooks::HookStore;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_children_clean_up_before_parents() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let comp: Component<()> = Component::new("C", |_, _| Ok(Element::Empty));
        let mut tree = FiberTree::new();

        let mut ids = Vec::new();
        let mut parent = None;
        for name in ["outer", "inner"] {
            let store = HookStore::new_shared();
            {
                let mut store = store.borrow_mut();
                let mut mismatch = None;
                store.begin();
                let (state, _) = store.effect_slot(EffectPhase::Passive, None, &mut mismatch);
                let log = log.clone();
                state.run(
                    None,
                    Box::new(move || Some(Box::new(move || log.borrow_mut().push(name)) as Cleanup)),
                );
            }
            let mut fiber = Fiber::new(comp.call(()));
            fiber.hooks = Some(store);
            fiber.parent = parent;
            fiber.flags = FiberFlags::EFFECT_HOST;
            let id = tree.insert(fiber);
            if let Some(parent) = parent {
                tree.get_mut(parent).unwrap().child = Some(id);
            }
            parent = Some(id);
            ids.push(id);
        }

        let mut out = Unmounted::default();
        collect_unmount(&tree, ids[0], &mut out);
        assert_eq!(out.fibers, 2);
        out.run_cleanups();
        assert_eq!(*log.borrow(), vec!["inner", "outer"]);
    }

    #[test]
    fn test_node_ref_is_cleared() {
        let node_ref = NodeRef::new();
        let native = NativeHandle::new(());
        node_ref.set(Some(native.clone()));

        let mut tree = FiberTree::new();
        let mut fiber = Fiber::new(tag("div").node_ref(&node_ref).into());
        fiber.native = Some(native);
        let id = tree.insert(fiber);

        let mut out = Unmounted::default();
        collect_unmount(&tree, id, &mut out);
        assert!(node_ref.get().is_none());
    }
}
