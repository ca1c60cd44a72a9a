//! Runtime configuration for a root.

use std::time::Duration;

use crate::types::Priority;

/// How unkeyed sibling lists whose length changed are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnkeyedListPolicy {
    /// Warn (in development mode) and match children by position.
    #[default]
    WarnAndReuse,
    /// Remount every child of the list.
    Remount,
}

/// Settings fixed when a root is created.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Report programmer errors and fail passes with duplicate keys.
    pub dev_diagnostics: bool,
    pub unkeyed_lists: UnkeyedListPolicy,
    /// Priority of `render` and of updates outside any zone.
    pub default_priority: Priority,
    /// Priority used to schedule passive effects.
    pub passive_priority: Priority,
    /// Timeout attached to updates issued inside a transition.
    pub transition_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            dev_diagnostics: cfg!(debug_assertions),
            unkeyed_lists: UnkeyedListPolicy::default(),
            default_priority: Priority::Normal,
            passive_priority: Priority::Low,
            transition_timeout: None,
        }
    }
}

impl RuntimeConfig {
    pub fn with_dev_diagnostics(mut self, enabled: bool) -> Self {
        self.dev_diagnostics = enabled;
        self
    }

    pub fn with_unkeyed_lists(mut self, policy: UnkeyedListPolicy) -> Self {
        self.unkeyed_lists = policy;
        self
    }

    pub fn with_default_priority(mut self, priority: Priority) -> Self {
        self.default_priority = priority;
        self
    }

    pub fn with_passive_priority(mut self, priority: Priority) -> Self {
        self.passive_priority = priority;
        self
    }

    pub fn with_transition_timeout(mut self, timeout: Duration) -> Self {
        self.transition_timeout = Some(timeout);
        self
    }
}
