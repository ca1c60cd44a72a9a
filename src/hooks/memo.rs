//! Memoization hooks.

use std::cell::RefCell;
use std::rc::Rc;

use super::Hooks;
use crate::element::{memo_with, Component, Element, Instance};

/// Children captured by `use_memo_node`.
pub(crate) struct MemoNodeProps {
    node: Rc<Vec<Instance>>,
}

thread_local! {
    static MEMO_NODE: Component<MemoNodeProps> = memo_with(
        Component::new("MemoNode", |props: &MemoNodeProps, _| {
            Ok(props.node.iter().cloned().collect::<Element>())
        }),
        |prev: &MemoNodeProps, next: &MemoNodeProps| !Rc::ptr_eq(&prev.node, &next.node),
    );
}

impl Hooks<'_> {
    /// Value recomputed only when `deps` changed.
    ///
    /// Deps are compared with `PartialEq`, not by identity: an `Rc` dep
    /// holding an equal value counts as unchanged.
    pub fn use_memo<T, D>(&mut self, deps: D, compute: impl FnOnce() -> T) -> Rc<T>
    where
        T: 'static,
        D: PartialEq + 'static,
    {
        self.value_slot(Some(Box::new(deps)), compute)
    }

    /// Callback whose identity is stable while `deps` are unchanged.
    pub fn use_callback<F, D>(&mut self, deps: D, callback: F) -> Rc<F>
    where
        F: 'static,
        D: PartialEq + 'static,
    {
        self.use_memo(deps, || callback)
    }

    /// Mutable box kept across renders. Writing to it never re-renders.
    pub fn use_ref<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
        self.value_slot(None, || RefCell::new(init()))
    }

    /// Element subtree rebuilt only when `deps` changed.
    ///
    /// While `deps` are unchanged the returned instance is skipped by the
    /// reconciler, together with everything below it.
    pub fn use_memo_node<D>(&mut self, deps: D, render: impl FnOnce() -> Element) -> Instance
    where
        D: PartialEq + 'static,
    {
        let node = self.use_memo(deps, || render().flatten());
        MEMO_NODE.with(|component| component.call(MemoNodeProps { node }))
    }
}
