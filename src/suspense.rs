//! Suspension signals.
//!
//! A component that needs data which is not ready yet returns
//! `Err(Throw::Pending(..))`, usually through `resource.read()?`. The engine
//! renders the nearest suspense boundary's fallback and re-renders the
//! boundary once the [`Pending`] signal resolves.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

// =============================================================================
// Pending
// =============================================================================

struct PendingInner {
    resolved: Cell<bool>,
    waiters: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// A signal that some data will become available later.
#[derive(Clone)]
pub struct Pending {
    inner: Rc<PendingInner>,
}

/// The write side of a [`Pending`].
pub struct Resolver {
    inner: Rc<PendingInner>,
}

impl Pending {
    /// Create an unresolved signal and its resolver.
    #[allow(clippy::new_ret_no_self)]
    pub fn new() -> (Pending, Resolver) {
        let inner = Rc::new(PendingInner {
            resolved: Cell::new(false),
            waiters: RefCell::new(Vec::new()),
        });
        (
            Pending {
                inner: inner.clone(),
            },
            Resolver { inner },
        )
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.get()
    }

    /// Run `callback` once the signal resolves (immediately if it already has).
    pub fn on_resolve(&self, callback: impl FnOnce() + 'static) {
        if self.is_resolved() {
            callback();
        } else {
            self.inner.waiters.borrow_mut().push(Box::new(callback));
        }
    }

    pub fn ptr_eq(&self, other: &Pending) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Resolver {
    /// Resolve the signal and wake every waiter. Later calls do nothing.
    pub fn resolve(&self) {
        if self.inner.resolved.replace(true) {
            return;
        }
        let waiters = std::mem::take(&mut *self.inner.waiters.borrow_mut());
        for waiter in waiters {
            waiter();
        }
    }
}

// =============================================================================
// Resource
// =============================================================================

struct ResourceInner<T> {
    value: RefCell<Option<T>>,
    pending: Pending,
    resolver: Resolver,
}

/// A value that arrives later, readable from components.
///
/// ```ignore
/// let user = resource.read()?;
/// ```
pub struct Resource<T> {
    inner: Rc<ResourceInner<T>>,
}

impl<T> Clone for Resource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Clone + 'static> Resource<T> {
    pub fn new() -> Self {
        let (pending, resolver) = Pending::new();
        Self {
            inner: Rc::new(ResourceInner {
                value: RefCell::new(None),
                pending,
                resolver,
            }),
        }
    }

    /// A resource that is already available.
    pub fn ready(value: T) -> Self {
        let resource = Self::new();
        resource.resolve(value);
        resource
    }

    /// The value, or the pending signal to suspend on.
    pub fn read(&self) -> Result<T, Pending> {
        match &*self.inner.value.borrow() {
            Some(value) => Ok(value.clone()),
            None => Err(self.inner.pending.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.value.borrow().is_some()
    }

    /// Store the value and wake suspended boundaries.
    pub fn resolve(&self, value: T) {
        *self.inner.value.borrow_mut() = Some(value);
        self.inner.resolver.resolve();
    }
}

impl<T: Clone + 'static> Default for Resource<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waiters_run_once() {
        let (pending, resolver) = Pending::new();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        pending.on_resolve(move || c.set(c.get() + 1));
        assert_eq!(count.get(), 0);

        resolver.resolve();
        resolver.resolve();
        assert_eq!(count.get(), 1);

        // Late subscribers run immediately
        let c = count.clone();
        pending.on_resolve(move || c.set(c.get() + 1));
        assert_eq!(count.get(), 2);
    }

    #[test]
    fn test_resource_read() {
        let resource: Resource<u32> = Resource::new();
        let pending = resource.read().unwrap_err();
        assert!(!pending.is_resolved());

        resource.resolve(7);
        assert!(pending.is_resolved());
        assert_eq!(resource.read().unwrap(), 7);
        assert_eq!(Resource::ready("x").read().unwrap(), "x");
    }
}
