//! Host adapter contract.
//!
//! The engine never touches a real target. Everything target specific goes
//! through a [`HostAdapter`]: allocating native handles, applying mutations,
//! scheduling deferred work and answering the yield predicate.
//!
//! # Re-entrancy
//!
//! Adapter methods are called while the engine is mid-pass. They must not
//! call back into the root that owns them. In particular `schedule_work`
//! must store the callback and run it later; urgent work is flagged with
//! `force_sync` and the engine runs it itself.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::element::Instance;
use crate::types::ScheduleOptions;

// =============================================================================
// Native Handle
// =============================================================================

/// Opaque, host-owned reference to a native node.
///
/// Cloning shares the same node. Identity is pointer identity.
#[derive(Clone)]
pub struct NativeHandle(Rc<dyn Any>);

impl NativeHandle {
    pub fn new<T: Any>(node: T) -> Self {
        Self(Rc::new(node))
    }

    pub fn from_rc<T: Any>(node: Rc<T>) -> Self {
        Self(node)
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn downcast<T: Any>(&self) -> Option<Rc<T>> {
        self.0.clone().downcast::<T>().ok()
    }

    pub fn ptr_eq(&self, other: &NativeHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for NativeHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NativeHandle({:p})", Rc::as_ptr(&self.0))
    }
}

// =============================================================================
// Mutations
// =============================================================================

/// One change to apply to the real target.
///
/// Parents and indices are already resolved: `index` is the final position
/// among the host children of `parent`, counting only nodes placed so far.
#[derive(Debug)]
pub enum Mutation<'a> {
    /// Insert a freshly created node.
    Create {
        handle: &'a NativeHandle,
        instance: &'a Instance,
        parent: &'a NativeHandle,
        index: usize,
        hydrating: bool,
    },
    /// Patch a reused node whose description changed.
    Update {
        handle: &'a NativeHandle,
        prev: &'a Instance,
        next: &'a Instance,
    },
    /// Reinsert previously detached nodes, in order, starting at `index`.
    Move {
        handles: &'a [NativeHandle],
        parent: &'a NativeHandle,
        index: usize,
    },
    /// Take nodes out of `parent` ahead of a `Move`.
    Detach {
        handles: &'a [NativeHandle],
        parent: &'a NativeHandle,
    },
    /// Remove nodes for good.
    Delete {
        handles: &'a [NativeHandle],
        parent: &'a NativeHandle,
    },
}

/// Deferred engine work handed to the host.
pub type WorkCallback = Box<dyn FnOnce()>;

// =============================================================================
// Host Adapter
// =============================================================================

/// Platform contract the engine renders through.
pub trait HostAdapter {
    /// Allocate the native node for a primitive (tag, text, comment).
    fn create_native_handle(&mut self, instance: &Instance) -> NativeHandle;

    /// Apply one mutation.
    fn commit(&mut self, mutation: Mutation<'_>);

    /// Called once after all mutations of a commit were applied.
    fn finish_commit_batch(&mut self) {}

    /// Run `callback` later, honoring `options` as far as the host can.
    fn schedule_work(&mut self, callback: WorkCallback, options: ScheduleOptions);

    /// True when the engine should pause between work units.
    fn should_yield(&self) -> bool {
        false
    }

    /// Whether a component instance renders into a detached target.
    fn is_portal_target(&self, instance: &Instance) -> bool {
        instance.portal_target().is_some()
    }

    /// A portal is being unmounted; clear whatever it rendered into `target`.
    fn unmount_portal(&mut self, target: &NativeHandle) {
        let _ = target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_identity() {
        let a = NativeHandle::new(1u32);
        let b = a.clone();
        let c = NativeHandle::new(1u32);
        assert!(a.ptr_eq(&b));
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert!(a.downcast::<u64>().is_none());
    }
}
