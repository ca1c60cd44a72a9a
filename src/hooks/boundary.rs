//! Error and suspense boundaries.

use std::rc::Rc;

use super::{Hooks, Setter};
use crate::element::{Component, ComponentKind, Element, Instance};
use crate::error::ComponentError;
use crate::suspense::Pending;

/// Clears the error caught by a boundary so its children render again.
#[derive(Clone)]
pub struct ErrorReset {
    setter: Setter<Option<ComponentError>>,
}

impl ErrorReset {
    pub fn reset(&self) {
        self.setter.set(None);
    }
}

impl Hooks<'_> {
    /// Make this component an error boundary.
    ///
    /// Errors raised while rendering descendants are stored here and the
    /// component re-renders with them. While an error is held the component
    /// does not catch, so a failing fallback reaches the next boundary up.
    pub fn use_error(&mut self) -> (Option<ComponentError>, ErrorReset) {
        let (error, setter) = self.use_state(|| None::<ComponentError>);
        if error.is_none() {
            let catch = setter.clone();
            self.out.catch = Some(Rc::new(move |error: ComponentError| catch.set(Some(error))));
        }
        (error, ErrorReset { setter })
    }

    /// Make this component a suspense boundary.
    ///
    /// Returns true while a descendant is waiting. Each pending signal
    /// triggers one re-render of this component when it resolves.
    pub(crate) fn use_suspense(&mut self) -> bool {
        let (waiting, setter) = self.use_state(|| 0usize);
        self.out.suspense = Some(Rc::new(move |pending: Pending| {
            setter.update(|count| count + 1);
            let setter = setter.clone();
            pending.on_resolve(move || setter.update(|count| count.saturating_sub(1)));
        }));
        waiting > 0
    }
}

// =============================================================================
// Built-in Boundaries
// =============================================================================

type Fallback = Rc<dyn Fn(&ComponentError, &ErrorReset) -> Element>;

pub(crate) struct ErrorBoundaryProps {
    fallback: Fallback,
    children: Vec<Instance>,
}

pub(crate) struct SuspenseProps {
    fallback: Vec<Instance>,
    children: Vec<Instance>,
}

thread_local! {
    static ERROR_BOUNDARY: Component<ErrorBoundaryProps> = Component::with_kind(
        "ErrorBoundary",
        ComponentKind::ErrorBoundary,
        |props: &ErrorBoundaryProps, hooks| {
            let (error, reset) = hooks.use_error();
            Ok(match error {
                Some(error) => (props.fallback)(&error, &reset),
                None => props.children.iter().cloned().collect(),
            })
        },
    );

    static SUSPENSE: Component<SuspenseProps> = Component::with_kind(
        "Suspense",
        ComponentKind::Suspense,
        |props: &SuspenseProps, hooks| {
            let shown = if hooks.use_suspense() {
                &props.fallback
            } else {
                &props.children
            };
            Ok(shown.iter().cloned().collect())
        },
    );
}

/// Render `children`, or `fallback` once one of them failed.
pub fn error_boundary<F>(fallback: F, children: impl Into<Element>) -> Instance
where
    F: Fn(&ComponentError, &ErrorReset) -> Element + 'static,
{
    let props = ErrorBoundaryProps {
        fallback: Rc::new(fallback),
        children: children.into().flatten(),
    };
    ERROR_BOUNDARY.with(|component| component.call(props))
}

/// Render `children`, or `fallback` while one of them is suspended.
pub fn suspense(fallback: impl Into<Element>, children: impl Into<Element>) -> Instance {
    let props = SuspenseProps {
        fallback: fallback.into().flatten(),
        children: children.into().flatten(),
    };
    SUSPENSE.with(|component| component.call(props))
}
