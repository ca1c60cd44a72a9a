//! Hook Store - the ordered slot list behind a component's hooks.
//!
//! Each hook call takes the slot at the cursor and advances it. Slots are
//! matched by call order only, so a component must call the same hooks in
//! the same order on every render. In development mode a changed hook kind
//! or hook count is reported as a diagnostic.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::Diagnostic;
use crate::fiber::FiberId;

/// Cleanup returned by an effect, run before the next run and on unmount.
pub type Cleanup = Box<dyn FnOnce()>;

// =============================================================================
// Dependency Lists
// =============================================================================

/// Type-erased dependency list compared through `PartialEq` (a tuple
/// compares element-wise). Equal values count as unchanged, whatever their
/// identity.
pub(crate) trait AnyDeps {
    fn same(&self, other: &dyn AnyDeps) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: PartialEq + 'static> AnyDeps for T {
    fn same(&self, other: &dyn AnyDeps) -> bool {
        other.as_any().downcast_ref::<T>() == Some(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn deps_changed(prev: Option<&dyn AnyDeps>, next: Option<&dyn AnyDeps>) -> bool {
    match (prev, next) {
        (Some(prev), Some(next)) => !next.same(prev),
        _ => true,
    }
}

// =============================================================================
// Slots
// =============================================================================

/// When an effect runs relative to the commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectPhase {
    /// Before any mutation is applied.
    Insertion,
    /// Right after mutations, before control returns to the host.
    Layout,
    /// Deferred to a later host tick.
    Passive,
}

/// Committed state of one effect slot.
///
/// Dependencies are recorded when the effect actually runs, so a render pass
/// that is abandoned before commit leaves the slot untouched.
#[derive(Default)]
pub(crate) struct EffectState {
    deps: RefCell<Option<Box<dyn AnyDeps>>>,
    cleanup: RefCell<Option<Cleanup>>,
    mounted: Cell<bool>,
}

impl EffectState {
    /// Run the previous cleanup, then the effect, keeping its cleanup.
    pub(crate) fn run(
        &self,
        deps: Option<Box<dyn AnyDeps>>,
        effect: Box<dyn FnOnce() -> Option<Cleanup>>,
    ) {
        let previous = self.cleanup.borrow_mut().take();
        if let Some(cleanup) = previous {
            cleanup();
        }
        *self.deps.borrow_mut() = deps;
        self.mounted.set(true);
        let cleanup = effect();
        *self.cleanup.borrow_mut() = cleanup;
    }

    pub(crate) fn take_cleanup(&self) -> Option<Cleanup> {
        self.cleanup.borrow_mut().take()
    }

    fn should_run(&self, deps: Option<&dyn AnyDeps>) -> bool {
        !self.mounted.get() || deps_changed(self.deps.borrow().as_deref(), deps)
    }
}

pub(crate) enum HookSlot {
    /// Memo-like: a cached value and the deps it was computed from.
    /// `deps: None` means the value is computed once.
    Value {
        deps: Option<Box<dyn AnyDeps>>,
        value: Rc<dyn Any>,
    },
    /// An effect record.
    Effect {
        phase: EffectPhase,
        state: Rc<EffectState>,
    },
}

// =============================================================================
// Update Target
// =============================================================================

/// Stable identity of a component instance for scheduling updates.
///
/// Shared by the store and every update handle it gave out. The owner is
/// refreshed to the committed fiber after each commit; a released target
/// ignores further updates.
#[derive(Debug, Default)]
pub(crate) struct UpdateTarget {
    owner: Cell<Option<FiberId>>,
    released: Cell<bool>,
}

impl UpdateTarget {
    pub(crate) fn owner(&self) -> Option<FiberId> {
        if self.released.get() {
            None
        } else {
            self.owner.get()
        }
    }

    pub(crate) fn set_owner(&self, fiber: FiberId) {
        self.owner.set(Some(fiber));
    }

    pub(crate) fn release(&self) {
        self.released.set(true);
    }

    pub(crate) fn is_released(&self) -> bool {
        self.released.get()
    }
}

// =============================================================================
// Hook Store
// =============================================================================

#[derive(Default)]
pub(crate) struct HookStore {
    slots: Vec<HookSlot>,
    cursor: usize,
    /// Hook count of the last completed render.
    settled_len: Option<usize>,
    pub(crate) target: Rc<UpdateTarget>,
}

pub(crate) type SharedHookStore = Rc<RefCell<HookStore>>;

impl HookStore {
    pub(crate) fn new_shared() -> SharedHookStore {
        Rc::new(RefCell::new(HookStore::default()))
    }

    /// Reset the cursor before rendering the owning component.
    pub(crate) fn begin(&mut self) {
        self.cursor = 0;
    }

    /// Close a render; returns a diagnostic if the hook count changed.
    pub(crate) fn finish(&mut self, component: &'static str) -> Option<Diagnostic> {
        let found = self.cursor;
        let previous = self.settled_len.replace(found);
        match previous {
            Some(expected) if expected != found => Some(Diagnostic::HookOrderMismatch {
                component,
                expected,
                found,
            }),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Which effect phases this store has slots for.
    pub(crate) fn has_phase(&self, phase: EffectPhase) -> bool {
        self.slots
            .iter()
            .any(|slot| matches!(slot, HookSlot::Effect { phase: p, .. } if *p == phase))
    }

    /// Take the slot at the cursor for a memo-like hook.
    ///
    /// Recomputes when the slot is new, when `deps` changed or when the slot
    /// held something else (a hook order violation).
    pub(crate) fn value_slot<T: 'static>(
        &mut self,
        deps: Option<Box<dyn AnyDeps>>,
        compute: impl FnOnce() -> T,
        mismatch: &mut Option<usize>,
    ) -> Rc<T> {
        let index = self.cursor;
        self.cursor += 1;

        if let Some(HookSlot::Value {
            deps: prev_deps,
            value,
        }) = self.slots.get_mut(index)
        {
            let reusable = match (&*prev_deps, &deps) {
                (None, None) => true,
                (Some(prev), Some(next)) => next.same(&**prev),
                _ => false,
            };
            if let Ok(typed) = value.clone().downcast::<T>() {
                if reusable {
                    return typed;
                }
                let fresh = Rc::new(compute());
                *prev_deps = deps;
                *value = fresh.clone();
                return fresh;
            }
        }

        if index < self.slots.len() {
            *mismatch = Some(index);
        }
        let fresh = Rc::new(compute());
        let slot = HookSlot::Value {
            deps,
            value: fresh.clone(),
        };
        self.put(index, slot);
        fresh
    }

    /// Take the slot at the cursor for an effect hook.
    ///
    /// Returns the slot state and whether the effect has to run this time.
    pub(crate) fn effect_slot(
        &mut self,
        phase: EffectPhase,
        deps: Option<&dyn AnyDeps>,
        mismatch: &mut Option<usize>,
    ) -> (Rc<EffectState>, bool) {
        let index = self.cursor;
        self.cursor += 1;

        if let Some(HookSlot::Effect {
            phase: prev_phase,
            state,
        }) = self.slots.get(index)
        {
            if *prev_phase == phase {
                return (state.clone(), state.should_run(deps));
            }
        }

        if index < self.slots.len() {
            *mismatch = Some(index);
        }
        let state = Rc::new(EffectState::default());
        let slot = HookSlot::Effect {
            phase,
            state: state.clone(),
        };
        self.put(index, slot);
        (state, true)
    }

    fn put(&mut self, index: usize, slot: HookSlot) {
        if index < self.slots.len() {
            self.slots[index] = slot;
        } else {
            self.slots.push(slot);
        }
    }

    /// Take every stored effect cleanup, in the given phase order.
    pub(crate) fn take_cleanups(&mut self, order: &[EffectPhase]) -> Vec<Cleanup> {
        let mut cleanups = Vec::new();
        for wanted in order {
            for slot in &self.slots {
                if let HookSlot::Effect { phase, state } = slot {
                    if phase == wanted {
                        cleanups.extend(state.take_cleanup());
                    }
                }
            }
        }
        cleanups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps<T: PartialEq + 'static>(value: T) -> Option<Box<dyn AnyDeps>> {
        Some(Box::new(value))
    }

    #[test]
    fn test_value_slot_recomputes_on_deps_change() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        let mut computed = 0;

        for (round, d) in [(1, 1), (2, 1), (3, 2), (4, 2)] {
            store.begin();
            let value = store.value_slot(deps((d, "x")), || {
                computed += 1;
                round
            }, &mut mismatch);
            assert_eq!(*value, if d == 1 { 1 } else { 3 });
            assert!(store.finish("Test").is_none());
        }
        assert_eq!(computed, 2);
        assert!(mismatch.is_none());
    }

    #[test]
    fn test_equal_rc_deps_count_as_unchanged() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        let mut computed = 0;

        for label in ["a", "a", "b"] {
            store.begin();
            store.value_slot(deps(Rc::new(String::from(label))), || computed += 1, &mut mismatch);
            assert!(store.finish("Test").is_none());
        }
        assert_eq!(computed, 2);
    }

    #[test]
    fn test_value_slot_without_deps_is_stable() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        store.begin();
        let first = store.value_slot(None, || 1u8, &mut mismatch);
        store.begin();
        let second = store.value_slot(None, || 2u8, &mut mismatch);
        assert!(Rc::ptr_eq(&first, &second));
    }

    fn run(state: &EffectState, deps: Option<Box<dyn AnyDeps>>) {
        state.run(deps, Box::new(|| None));
    }

    #[test]
    fn test_effect_slot_runs() {
        let mut store = HookStore::default();
        let mut mismatch = None;

        store.begin();
        let (state, should) = store.effect_slot(EffectPhase::Passive, Some(&1), &mut mismatch);
        assert!(should);

        // Not committed yet: still due on the next render
        store.begin();
        let (_, should) = store.effect_slot(EffectPhase::Passive, Some(&1), &mut mismatch);
        assert!(should);
        run(&state, deps(1));

        store.begin();
        let (_, should) = store.effect_slot(EffectPhase::Passive, Some(&1), &mut mismatch);
        assert!(!should);
        store.begin();
        let (_, should) = store.effect_slot(EffectPhase::Passive, Some(&2), &mut mismatch);
        assert!(should);
        store.begin();
        let (_, should) = store.effect_slot(EffectPhase::Passive, None, &mut mismatch);
        assert!(should);
        run(&state, None);
        store.begin();
        let (_, should) = store.effect_slot(EffectPhase::Passive, None, &mut mismatch);
        assert!(should);

        assert!(store.has_phase(EffectPhase::Passive));
        assert!(!store.has_phase(EffectPhase::Layout));
        assert!(mismatch.is_none());
    }

    #[test]
    fn test_cleanup_runs_before_next_effect() {
        let state = EffectState::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        for round in 0..2 {
            let log = log.clone();
            state.run(
                deps(round),
                Box::new(move || {
                    log.borrow_mut().push(format!("run {round}"));
                    let log = log.clone();
                    Some(Box::new(move || log.borrow_mut().push(format!("clean {round}"))) as Cleanup)
                }),
            );
        }
        if let Some(cleanup) = state.take_cleanup() {
            cleanup();
        }
        assert_eq!(*log.borrow(), vec!["run 0", "clean 0", "run 1", "clean 1"]);
    }

    #[test]
    fn test_kind_change_is_reported() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        store.begin();
        store.value_slot(None, || 0u32, &mut mismatch);
        store.finish("Test");

        store.begin();
        store.effect_slot(EffectPhase::Layout, None, &mut mismatch);
        assert_eq!(mismatch, Some(0));
    }

    #[test]
    fn test_hook_count_change_is_reported() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        store.begin();
        store.value_slot(None, || 0u32, &mut mismatch);
        assert!(store.finish("Counter").is_none());

        store.begin();
        store.value_slot(None, || 0u32, &mut mismatch);
        store.value_slot(None, || 0u32, &mut mismatch);
        assert_eq!(
            store.finish("Counter"),
            Some(Diagnostic::HookOrderMismatch {
                component: "Counter",
                expected: 1,
                found: 2,
            })
        );
    }

    #[test]
    fn test_take_cleanups_in_phase_order() {
        let mut store = HookStore::default();
        let mut mismatch = None;
        let log = Rc::new(RefCell::new(Vec::new()));

        store.begin();
        for phase in [EffectPhase::Passive, EffectPhase::Layout] {
            let (state, _) = store.effect_slot(phase, None, &mut mismatch);
            let log = log.clone();
            state.run(
                None,
                Box::new(move || Some(Box::new(move || log.borrow_mut().push(phase)) as Cleanup)),
            );
        }

        for cleanup in store.take_cleanups(&[EffectPhase::Layout, EffectPhase::Passive]) {
            cleanup();
        }
        assert_eq!(*log.borrow(), vec![EffectPhase::Layout, EffectPhase::Passive]);
        assert!(store.take_cleanups(&[EffectPhase::Layout]).is_empty());
    }
}
