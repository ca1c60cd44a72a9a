//! Hooks - per-instance state for function components.
//!
//! A component receives `&mut Hooks` while it renders. Every hook takes the
//! next slot of the instance's hook store, so hooks must be called
//! unconditionally and in the same order on every render.
//!
//! - State: [`Hooks::use_state`], [`Hooks::use_reducer`], [`Hooks::use_update`]
//! - Memoization: [`Hooks::use_memo`], [`Hooks::use_callback`], [`Hooks::use_ref`],
//!   [`Hooks::use_memo_node`]
//! - Effects: [`Hooks::use_effect`], [`Hooks::use_layout_effect`],
//!   [`Hooks::use_insertion_effect`]
//! - Context: [`Hooks::use_context`] with [`create_context`]
//! - Boundaries: [`Hooks::use_error`], [`error_boundary`], [`suspense`]
//! - Scheduling: [`Hooks::use_transition`], [`Hooks::use_deferred_value`]

mod boundary;
mod context;
mod effect;
mod memo;
mod state;
mod store;

pub use boundary::{error_boundary, suspense, ErrorReset};
pub use context::{create_context, Context, ContextId};
pub use state::{Dispatch, Setter, Transition, UpdateHandle};
pub use store::{Cleanup, EffectPhase};

pub(crate) use effect::EffectJob;
pub(crate) use store::{HookStore, SharedHookStore, UpdateTarget};

use std::any::Any;
use std::rc::{Rc, Weak};

use crate::element::{ComponentInvocation, NodeRef};
use crate::error::Diagnostic;
use crate::fiber::{ErrorHandler, FiberId, FiberTree, ProviderMap, SuspenseHandler};
use crate::root::RootInner;
use store::AnyDeps;

/// Passed as the deps of an effect that runs after every render.
pub const EVERY_RENDER: Option<()> = None;

// =============================================================================
// Render Output
// =============================================================================

/// What a render produced besides its element.
#[derive(Default)]
pub(crate) struct RenderOutput {
    /// Effects due this commit, in call order.
    pub(crate) effects: Vec<(EffectPhase, EffectJob)>,
    pub(crate) providers: Option<ProviderMap>,
    pub(crate) provided: Option<(u64, Rc<dyn Any>)>,
    pub(crate) catch: Option<ErrorHandler>,
    pub(crate) suspense: Option<SuspenseHandler>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

// =============================================================================
// Hooks
// =============================================================================

/// Hook access for the component being rendered.
pub struct Hooks<'a> {
    pub(crate) store: &'a mut HookStore,
    pub(crate) tree: &'a FiberTree,
    pub(crate) fiber: FiberId,
    pub(crate) root: &'a Weak<RootInner>,
    pub(crate) invocation: &'a ComponentInvocation,
    pub(crate) out: &'a mut RenderOutput,
}

impl Hooks<'_> {
    /// Name of the component being rendered.
    pub fn component_name(&self) -> &'static str {
        self.invocation.name()
    }

    /// Node ref forwarded by the caller with `Component::with_ref`.
    pub fn forwarded_ref(&self) -> Option<NodeRef> {
        self.invocation.forwarded_ref().cloned()
    }

    /// Handle that re-renders this component when triggered.
    pub fn use_update(&self) -> UpdateHandle {
        UpdateHandle::new(self.root.clone(), self.store.target.clone())
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.out.diagnostics.push(diagnostic);
    }

    fn report_mismatch(&mut self, mismatch: Option<usize>) {
        if let Some(index) = mismatch {
            let component = self.component_name();
            self.report(Diagnostic::HookKindMismatch { component, index });
        }
    }

    /// Memo-like slot; `deps: None` computes once.
    pub(crate) fn value_slot<T: 'static>(
        &mut self,
        deps: Option<Box<dyn AnyDeps>>,
        compute: impl FnOnce() -> T,
    ) -> Rc<T> {
        let mut mismatch = None;
        let value = self.store.value_slot(deps, compute, &mut mismatch);
        self.report_mismatch(mismatch);
        value
    }
}

/// Identity comparison for values kept as dependencies.
pub(crate) struct RcIdentity(pub(crate) Rc<dyn Any>);

impl PartialEq for RcIdentity {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Rc::as_ptr(&self.0), Rc::as_ptr(&other.0))
    }
}
