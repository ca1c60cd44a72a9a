//! Core types for spark-fiber.
//!
//! These types are shared by every stage of the engine: the reconciler tags
//! fibers with them, the scheduler orders work by them and the commit walker
//! reads them to decide which host mutations to issue.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

// =============================================================================
// Key
// =============================================================================

/// Explicit identity of an element among its siblings.
///
/// Keys only have to be unique within one sibling list. Integer and string
/// keys never compare equal to each other.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "{value}"),
            Key::Str(value) => write!(f, "{value:?}"),
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<u32> for Key {
    fn from(value: u32) -> Self {
        Key::Int(value as i64)
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Key::Int(value as i64)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

// =============================================================================
// Effect Tag
// =============================================================================

/// What the commit phase has to do with a fiber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EffectTag {
    /// New position: allocate a native handle and insert it.
    #[default]
    Create,
    /// Same type and key as the alternate: reuse handle and hook store.
    Update,
    /// The fiber no longer has a counterpart and must be released.
    Delete,
    /// Memoized: the previous subtree is reused untouched.
    Skip,
}

// =============================================================================
// Fiber Flags (bitflags)
// =============================================================================

bitflags::bitflags! {
    /// Per-fiber flags.
    ///
    /// The `*_HOST` flags bubble from a fiber to all of its ancestors so that
    /// walkers can skip subtrees with nothing to do. `MOVED` and `DETACHED`
    /// are local.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FiberFlags: u8 {
        /// Subtree owns native handles attached to the host.
        const MOUNTED_TO_HOST = 1 << 0;
        /// Subtree has passive effects.
        const EFFECT_HOST = 1 << 1;
        /// Subtree has layout effects.
        const LAYOUT_EFFECT_HOST = 1 << 2;
        /// Subtree has insertion effects.
        const INSERTION_EFFECT_HOST = 1 << 3;
        /// Subtree contains a portal.
        const PORTAL_HOST = 1 << 4;
        /// Keyed fiber changed its relative order among its siblings.
        const MOVED = 1 << 5;
        /// Host fiber whose native node a hidden shadow keeps out of its
        /// parent.
        const DETACHED = 1 << 6;

        /// Flags that propagate to ancestors.
        const BUBBLING = Self::MOUNTED_TO_HOST.bits()
            | Self::EFFECT_HOST.bits()
            | Self::LAYOUT_EFFECT_HOST.bits()
            | Self::INSERTION_EFFECT_HOST.bits()
            | Self::PORTAL_HOST.bits();

        /// Flags that mean unmounting has cleanups to run.
        const NEEDS_UNMOUNT = Self::EFFECT_HOST.bits()
            | Self::LAYOUT_EFFECT_HOST.bits()
            | Self::INSERTION_EFFECT_HOST.bits()
            | Self::PORTAL_HOST.bits();
    }
}

// =============================================================================
// Priority
// =============================================================================

/// Scheduling priority of a render task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Animation = 3,
}

/// Options attached to a scheduled unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScheduleOptions {
    pub priority: Priority,
    /// After this long in the queue the task is promoted to `High`.
    pub timeout: Option<Duration>,
    /// Run to completion without consulting `should_yield`.
    pub force_sync: bool,
}

impl ScheduleOptions {
    pub fn new(priority: Priority) -> Self {
        Self {
            priority,
            timeout: None,
            force_sync: false,
        }
    }

    pub fn sync(priority: Priority) -> Self {
        Self {
            priority,
            timeout: None,
            force_sync: true,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// =============================================================================
// Zones
// =============================================================================

bitflags::bitflags! {
    /// Execution zones a root can be in.
    ///
    /// Zones change how updates requested from user code are scheduled.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Zones: u8 {
        /// Inside `RootHandle::batch`; host scheduling is deferred.
        const BATCH = 1 << 0;
        /// Inside a transition; updates are low priority.
        const TRANSITION = 1 << 1;
        /// Rendering against existing native nodes.
        const HYDRATE = 1 << 2;
        /// Running insertion effects.
        const INSERTION_EFFECTS = 1 << 3;
        /// Running layout effects; updates become synchronous.
        const LAYOUT_EFFECTS = 1 << 4;
        /// Reconciling a partial (single component) update.
        const UPDATE = 1 << 5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_order() {
        assert!(Priority::Animation > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_key_kinds_differ() {
        assert_ne!(Key::from(1), Key::from("1"));
        assert_eq!(Key::from("a"), Key::from(String::from("a")));
        assert_eq!(Key::from(3usize).to_string(), "3");
    }

    #[test]
    fn test_bubbling_flags() {
        assert!(FiberFlags::BUBBLING.contains(FiberFlags::PORTAL_HOST));
        assert!(!FiberFlags::BUBBLING.contains(FiberFlags::MOVED));
        assert!(!FiberFlags::NEEDS_UNMOUNT.contains(FiberFlags::MOUNTED_TO_HOST));
    }
}
