//! Error taxonomy.
//!
//! - [`RenderError`] - engine level failures returned from the public API
//!   and collected on a root.
//! - [`ComponentError`] - an error raised by user component code.
//! - [`Throw`] - the error half of a component render: suspend or fail.
//! - [`Diagnostic`] - development-mode programmer errors.

use std::fmt;
use std::rc::Rc;

use crate::root::RootId;
use crate::suspense::Pending;
use crate::types::Key;

// =============================================================================
// Component Error
// =============================================================================

/// Error produced by a component while rendering.
///
/// Wraps an [`anyhow::Error`] behind an `Rc` so boundaries can keep it in
/// state and hand out clones.
#[derive(Clone)]
pub struct ComponentError(Rc<anyhow::Error>);

impl ComponentError {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Rc::new(anyhow::Error::new(error)))
    }

    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Self(Rc::new(anyhow::Error::msg(message)))
    }

    pub fn from_anyhow(error: anyhow::Error) -> Self {
        Self(Rc::new(error))
    }

    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// True if both values are the same error instance.
    pub fn ptr_eq(&self, other: &ComponentError) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for ComponentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl PartialEq for ComponentError {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

// =============================================================================
// Throw
// =============================================================================

/// Why a component did not produce an element.
#[derive(Debug, Clone)]
pub enum Throw {
    /// Data is not ready; the nearest suspense boundary shows its fallback.
    Pending(Pending),
    /// Rendering failed; the nearest error boundary handles it.
    Failed(ComponentError),
}

impl From<Pending> for Throw {
    fn from(pending: Pending) -> Self {
        Throw::Pending(pending)
    }
}

impl From<ComponentError> for Throw {
    fn from(error: ComponentError) -> Self {
        Throw::Failed(error)
    }
}

impl Throw {
    /// Fail with any standard error.
    pub fn error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Throw::Failed(ComponentError::new(error))
    }

    /// Fail with a message.
    pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
        Throw::Failed(ComponentError::msg(message))
    }
}

// =============================================================================
// Render Error
// =============================================================================

/// Engine level error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RenderError {
    #[error("duplicate key {key} among the children of {parent}")]
    DuplicateKey { key: Key, parent: String },

    #[error("hook order changed in {component}: expected {expected} hooks, found {found}")]
    HookOrderMismatch {
        component: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{component} suspended outside of a suspense boundary")]
    MissingFallback { component: &'static str },

    #[error("uncaught error in {component}: {error}")]
    Uncaught {
        component: &'static str,
        error: ComponentError,
    },

    #[error("root {0} is not mounted")]
    RootNotFound(RootId),

    #[error("no host factory installed on this thread")]
    NoHostFactory,
}

// =============================================================================
// Diagnostics
// =============================================================================

/// A programmer error detected while rendering in development mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Diagnostic {
    #[error("duplicate key {key} among the children of {parent}")]
    DuplicateKey { key: Key, parent: String },

    #[error(
        "children of {parent} changed length ({prev} -> {next}) without keys; \
         node identity cannot be tracked"
    )]
    UnkeyedList {
        parent: String,
        prev: usize,
        next: usize,
    },

    #[error("hook order changed in {component}: expected {expected} hooks, found {found}")]
    HookOrderMismatch {
        component: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("hook #{index} in {component} changed kind between renders")]
    HookKindMismatch { component: &'static str, index: usize },

    #[error("{component} suspended outside of a suspense boundary")]
    MissingFallback { component: &'static str },
}

impl Diagnostic {
    /// Render failure equivalent, for diagnostics that abort a pass.
    pub(crate) fn into_error(self) -> Option<RenderError> {
        match self {
            Diagnostic::DuplicateKey { key, parent } => {
                Some(RenderError::DuplicateKey { key, parent })
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_error_identity() {
        let a = ComponentError::msg("boom");
        let b = a.clone();
        let c = ComponentError::msg("boom");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.to_string(), "boom");
    }

    #[test]
    fn test_question_mark_converts() {
        fn fails() -> Result<(), Throw> {
            Err(ComponentError::msg("nope"))?;
            Ok(())
        }
        match fails() {
            Err(Throw::Failed(error)) => assert_eq!(error.to_string(), "nope"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_key_aborts() {
        let diagnostic = Diagnostic::DuplicateKey {
            key: Key::from(1),
            parent: "ul".into(),
        };
        assert!(diagnostic.into_error().is_some());
        let unkeyed = Diagnostic::UnkeyedList {
            parent: "ul".into(),
            prev: 1,
            next: 2,
        };
        assert!(unkeyed.into_error().is_none());
    }
}
