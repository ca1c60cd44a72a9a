//! Effect hooks.
//!
//! An effect is queued by the render that declared it and runs during the
//! commit of that render (insertion, layout) or shortly after (passive).
//! Within one phase effects run in render order, which is parent before
//! child. The previous cleanup of the same slot always runs first.

use std::rc::Rc;

use super::store::{AnyDeps, EffectState};
use super::{Cleanup, EffectPhase, Hooks};
use crate::types::FiberFlags;

type EffectFn = Box<dyn FnOnce() -> Option<Cleanup>>;

/// An effect due in a commit.
pub(crate) struct EffectJob {
    state: Rc<EffectState>,
    deps: Option<Box<dyn AnyDeps>>,
    effect: EffectFn,
}

impl EffectJob {
    pub(crate) fn run(self) {
        self.state.run(self.deps, self.effect);
    }
}

impl EffectPhase {
    /// Fiber flag marking a subtree with effects of this phase.
    pub(crate) fn host_flag(self) -> FiberFlags {
        match self {
            EffectPhase::Insertion => FiberFlags::INSERTION_EFFECT_HOST,
            EffectPhase::Layout => FiberFlags::LAYOUT_EFFECT_HOST,
            EffectPhase::Passive => FiberFlags::EFFECT_HOST,
        }
    }
}

impl Hooks<'_> {
    /// Run `effect` after the commit, deferred to a later host tick.
    ///
    /// With `Some(deps)` the effect re-runs only when `deps` changed; with
    /// `None` (see [`EVERY_RENDER`](super::EVERY_RENDER)) after every render.
    /// Deps are compared with `PartialEq`, so an `Rc` dep holding an equal
    /// value counts as unchanged. The layout and insertion variants compare
    /// the same way.
    pub fn use_effect<D, F>(&mut self, deps: Option<D>, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        self.effect_hook(EffectPhase::Passive, deps, effect);
    }

    /// Run `effect` synchronously after mutations were applied.
    ///
    /// Updates requested from a layout effect are processed before control
    /// returns to the host.
    pub fn use_layout_effect<D, F>(&mut self, deps: Option<D>, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        self.effect_hook(EffectPhase::Layout, deps, effect);
    }

    /// Run `effect` before any mutation of the commit is applied.
    pub fn use_insertion_effect<D, F>(&mut self, deps: Option<D>, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        self.effect_hook(EffectPhase::Insertion, deps, effect);
    }

    fn effect_hook<D, F>(&mut self, phase: EffectPhase, deps: Option<D>, effect: F)
    where
        D: PartialEq + 'static,
        F: FnOnce() -> Option<Cleanup> + 'static,
    {
        let deps: Option<Box<dyn AnyDeps>> = deps.map(|deps| Box::new(deps) as Box<dyn AnyDeps>);
        let mut mismatch = None;
        let (state, due) = self.store.effect_slot(phase, deps.as_deref(), &mut mismatch);
        self.report_mismatch(mismatch);
        if due {
            let job = EffectJob {
                state,
                deps,
                effect: Box::new(effect),
            };
            self.out.effects.push((phase, job));
        }
    }
}
