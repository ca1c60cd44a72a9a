//! State hooks and update handles.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use super::{Hooks, UpdateTarget};
use crate::root::RootInner;
use crate::types::{Priority, Zones};

// =============================================================================
// Update Handle
// =============================================================================

/// Schedules a re-render of the component it was created by.
///
/// Handles outlive renders and may be moved into callbacks and effects.
/// Triggering a handle after its component unmounted does nothing.
#[derive(Clone)]
pub struct UpdateHandle {
    root: Weak<RootInner>,
    target: Rc<UpdateTarget>,
}

impl UpdateHandle {
    pub(crate) fn new(root: Weak<RootInner>, target: Rc<UpdateTarget>) -> Self {
        Self { root, target }
    }

    /// Schedule a re-render at the priority of the current zone.
    pub fn update(&self) {
        self.schedule(None);
    }

    pub fn update_with_priority(&self, priority: Priority) {
        self.schedule(Some(priority));
    }

    fn schedule(&self, priority: Option<Priority>) {
        if self.target.is_released() {
            return;
        }
        if let Some(root) = self.root.upgrade() {
            root.request_update(&self.target, priority);
        }
    }

    /// Same component instance as `other`.
    pub fn ptr_eq(&self, other: &UpdateHandle) -> bool {
        Rc::ptr_eq(&self.target, &other.target)
    }
}

impl fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateHandle")
            .field("owner", &self.target.owner())
            .finish()
    }
}

// =============================================================================
// Setter
// =============================================================================

/// Writes a state slot and schedules a re-render.
///
/// The same setter is returned on every render of an instance. Setting a
/// value equal to the current one schedules nothing.
pub struct Setter<T> {
    cell: Rc<RefCell<T>>,
    update: UpdateHandle,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
            update: self.update.clone(),
        }
    }
}

impl<T: PartialEq + 'static> Setter<T> {
    pub fn set(&self, value: T) {
        self.replace(value, None);
    }

    /// Set to a value computed from the current one.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.borrow());
        self.replace(next, None);
    }

    pub fn set_with_priority(&self, value: T, priority: Priority) {
        self.replace(value, Some(priority));
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.cell.borrow().clone()
    }

    /// Same state slot as `other`.
    pub fn ptr_eq(&self, other: &Setter<T>) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    fn replace(&self, value: T, priority: Option<Priority>) {
        {
            let mut current = self.cell.borrow_mut();
            if *current == value {
                return;
            }
            *current = value;
        }
        self.update.schedule(priority);
    }
}

// =============================================================================
// Dispatch
// =============================================================================

type Reducer<S, A> = Rc<dyn Fn(&S, A) -> S>;

/// Sends actions through the latest reducer of a `use_reducer` slot.
pub struct Dispatch<S, A> {
    setter: Setter<S>,
    reducer: Rc<RefCell<Option<Reducer<S, A>>>>,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            setter: self.setter.clone(),
            reducer: self.reducer.clone(),
        }
    }
}

impl<S: PartialEq + 'static, A> Dispatch<S, A> {
    pub fn dispatch(&self, action: A) {
        let reducer = self.reducer.borrow().clone();
        if let Some(reducer) = reducer {
            self.setter.update(|state| reducer(state, action));
        }
    }
}

// =============================================================================
// Transition
// =============================================================================

/// Runs closures whose updates are low priority.
#[derive(Clone)]
pub struct Transition {
    root: Weak<RootInner>,
}

impl Transition {
    pub fn start(&self, f: impl FnOnce()) {
        match self.root.upgrade() {
            Some(root) => root.with_zone(Zones::TRANSITION, f),
            None => f(),
        }
    }
}

// =============================================================================
// Hooks
// =============================================================================

impl Hooks<'_> {
    /// Local state initialized by `init` on the first render.
    pub fn use_state<T>(&mut self, init: impl FnOnce() -> T) -> (T, Setter<T>)
    where
        T: Clone + PartialEq + 'static,
    {
        let update = self.use_update();
        let setter = self.value_slot(None, move || Setter {
            cell: Rc::new(RefCell::new(init())),
            update,
        });
        let value = setter.cell.borrow().clone();
        (value, (*setter).clone())
    }

    /// State driven by a reducer. The reducer of the latest render is used.
    pub fn use_reducer<S, A, R>(&mut self, reducer: R, init: impl FnOnce() -> S) -> (S, Dispatch<S, A>)
    where
        S: Clone + PartialEq + 'static,
        A: 'static,
        R: Fn(&S, A) -> S + 'static,
    {
        let (state, setter) = self.use_state(init);
        let slot = self.value_slot(None, || RefCell::new(None::<Reducer<S, A>>));
        *slot.borrow_mut() = Some(Rc::new(reducer));
        (state, Dispatch { setter, reducer: slot })
    }

    /// Handle for running low priority updates.
    pub fn use_transition(&mut self) -> Transition {
        Transition {
            root: self.root.clone(),
        }
    }

    /// A copy of `value` that follows it with low priority.
    ///
    /// The first render returns `value` itself. Afterwards a change of
    /// `value` is reflected by a follow-up low priority render.
    pub fn use_deferred_value<T>(&mut self, value: T) -> T
    where
        T: Clone + PartialEq + 'static,
    {
        let initial = value.clone();
        let (deferred, setter) = self.use_state(move || initial);
        let target = value.clone();
        self.use_effect(Some(value), move || {
            setter.set_with_priority(target, Priority::Low);
            None
        });
        deferred
    }
}
