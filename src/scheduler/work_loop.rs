//! Work loop - builds the work-in-progress tree one unit at a time.
//!
//! A pass starts at its root fiber (the root of the tree for a full render,
//! a copy of one component fiber for a partial update) and walks depth
//! first. Each unit mounts one child fiber: it is paired with the alternate
//! the reconciler planned for it, rendered if it is a component and gets
//! its own children planned. The walk state lives in [`WorkInProgress`], so
//! the loop can stop after any unit and resume later.
//!
//! Nothing reachable from the committed tree is changed by a pass. Fibers
//! built by the pass are recorded in `created`, which is all an abandoned
//! pass needs to free.

use std::rc::Weak;

use crate::config::RuntimeConfig;
use crate::element::{tag, ComponentInvocation, ComponentKind, Instance};
use crate::error::{ComponentError, Diagnostic, RenderError, Throw};
use crate::fiber::{Fiber, FiberId, FiberTree};
use crate::hooks::{EffectJob, EffectPhase, HookStore, Hooks, RenderOutput};
use crate::platform::{HostAdapter, NativeHandle};
use crate::reconciler::{self, DiffOptions};
use crate::root::RootInner;
use crate::suspense::Pending;
use crate::types::{EffectTag, FiberFlags};

use super::{Task, TaskKind};

/// Tag name of the fiber standing for the root container.
pub(crate) const ROOT_TAG: &str = "#root";

// =============================================================================
// Work In Progress
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PassKind {
    /// The whole tree is rebuilt from the root.
    Full,
    /// One component is re-rendered; its fiber is replaced at commit.
    Partial { replaces: FiberId },
}

/// Effects collected by a pass, per phase, in render order.
#[derive(Default)]
pub(crate) struct EffectQueues {
    pub(crate) insertion: Vec<EffectJob>,
    pub(crate) layout: Vec<EffectJob>,
    pub(crate) passive: Vec<EffectJob>,
}

impl EffectQueues {
    fn push(&mut self, phase: EffectPhase, job: EffectJob) {
        match phase {
            EffectPhase::Insertion => self.insertion.push(job),
            EffectPhase::Layout => self.layout.push(job),
            EffectPhase::Passive => self.passive.push(job),
        }
    }
}

pub(crate) struct WorkInProgress {
    pub(crate) task: Task,
    pub(crate) root: FiberId,
    pub(crate) kind: PassKind,
    /// Fiber the next unit continues from.
    pub(crate) next: Option<FiberId>,
    /// Walking down into children (true) or returning to parents (false).
    pub(crate) deep: bool,
    pub(crate) hydrating: bool,
    pub(crate) created: Vec<FiberId>,
    pub(crate) deletions: Vec<FiberId>,
    /// Moved fibers in tree order.
    pub(crate) moves: Vec<FiberId>,
    pub(crate) effects: EffectQueues,
    pub(crate) errors: Vec<RenderError>,
    pub(crate) diagnostics: Vec<Diagnostic>,
    pub(crate) failure: Option<RenderError>,
    pub(crate) units: usize,
}

impl WorkInProgress {
    fn new(task: Task, root: FiberId, kind: PassKind, hydrating: bool) -> Self {
        Self {
            task,
            root,
            kind,
            next: Some(root),
            deep: true,
            hydrating,
            created: vec![root],
            deletions: Vec::new(),
            moves: Vec::new(),
            effects: EffectQueues::default(),
            errors: Vec::new(),
            diagnostics: Vec::new(),
            failure: None,
            units: 0,
        }
    }
}

/// What a pass needs from its root besides the tree.
pub(crate) struct PassContext<'a> {
    pub(crate) host: &'a mut dyn HostAdapter,
    pub(crate) root: &'a Weak<RootInner>,
    pub(crate) config: &'a RuntimeConfig,
}

#[derive(Debug)]
pub(crate) enum WorkOutcome {
    Complete,
    Yielded,
    Failed(RenderError),
}

// =============================================================================
// Starting a pass
// =============================================================================

/// Start a full render of the root against `current`.
pub(crate) fn begin_full(
    tree: &mut FiberTree,
    current: Option<FiberId>,
    container: &NativeHandle,
    task: Task,
    cx: &mut PassContext<'_>,
) -> WorkInProgress {
    let (children, hydrate) = match &task.kind {
        TaskKind::Render { children, hydrate } => (children.clone(), *hydrate),
        TaskKind::Update(_) => (Vec::new(), false),
    };

    let mut fiber = Fiber::new(tag(ROOT_TAG).into());
    fiber.native = Some(container.clone());
    fiber.pending = children;
    if let Some(current) = current.filter(|id| tree.contains(*id)) {
        fiber.alternate = Some(current);
        fiber.tag = EffectTag::Update;
    }
    let root = tree.insert(fiber);

    let mut wip = WorkInProgress::new(task, root, PassKind::Full, hydrate);
    plan(tree, &mut wip, cx, root);
    tracing::trace!(?root, "full pass started");
    wip
}

/// Start re-rendering the component at `owner`.
///
/// Returns `None` when the fiber is no longer part of the tree.
pub(crate) fn begin_partial(
    tree: &mut FiberTree,
    owner: FiberId,
    task: Task,
    cx: &mut PassContext<'_>,
) -> Option<WorkInProgress> {
    let source = tree.get(owner)?;
    if !matches!(source.instance, Instance::Component(_)) {
        return None;
    }
    let mut fiber = Fiber::new(source.instance.clone());
    fiber.parent = source.parent;
    fiber.next_sibling = source.next_sibling;
    fiber.idx = source.idx;
    fiber.alternate = Some(owner);
    fiber.tag = EffectTag::Update;
    fiber.hooks = source.hooks.clone();
    fiber.providers = source.providers.clone();
    fiber.provided = source.provided.clone();
    fiber.catch = source.catch.clone();
    fiber.suspense = source.suspense.clone();
    fiber.portal = source.portal.clone();
    let root = tree.insert(fiber);

    let mut wip = WorkInProgress::new(task, root, PassKind::Partial { replaces: owner }, false);
    mount_fiber(tree, &mut wip, cx, root, true);
    tracing::trace!(?root, ?owner, "partial pass started");
    Some(wip)
}

/// Drop a pass, freeing every fiber it built. Returns its task.
pub(crate) fn abandon(tree: &mut FiberTree, wip: WorkInProgress) -> Task {
    for id in &wip.created {
        tree.remove(*id);
    }
    tracing::debug!(units = wip.units, "render pass abandoned");
    wip.task
}

// =============================================================================
// Loop
// =============================================================================

/// Run units until the pass completes, fails or the host asks to yield.
pub(crate) fn perform_work(
    tree: &mut FiberTree,
    wip: &mut WorkInProgress,
    cx: &mut PassContext<'_>,
    force_sync: bool,
) -> WorkOutcome {
    loop {
        if let Some(error) = wip.failure.take() {
            return WorkOutcome::Failed(error);
        }
        let Some(current) = wip.next else {
            return WorkOutcome::Complete;
        };
        wip.next = perform_unit_of_work(tree, wip, cx, current);
        wip.units += 1;
        tracing::trace!(unit = wip.units, next = ?wip.next, "unit of work");
        if wip.next.is_some() && !force_sync && cx.host.should_yield() {
            return WorkOutcome::Yielded;
        }
    }
}

fn has_pending(tree: &FiberTree, id: FiberId) -> bool {
    tree.get(id).is_some_and(|fiber| !fiber.pending.is_empty())
}

/// Mount the next fiber after `fiber` in depth-first order.
fn perform_unit_of_work(
    tree: &mut FiberTree,
    wip: &mut WorkInProgress,
    cx: &mut PassContext<'_>,
    fiber: FiberId,
) -> Option<FiberId> {
    let mut current = fiber;
    loop {
        if wip.deep && has_pending(tree, current) {
            return mount_child(tree, wip, cx, current, 0, None);
        }
        if current == wip.root {
            complete(tree, current);
            return None;
        }
        let parent = tree.parent(current)?;
        let next_index = tree.get(current)?.idx + 1;
        if tree.get(parent).is_some_and(|p| next_index < p.pending.len()) {
            wip.deep = true;
            return mount_child(tree, wip, cx, parent, next_index, Some(current));
        }
        complete(tree, parent);
        wip.deep = false;
        current = parent;
    }
}

// All children mounted: the instances and plan are no longer needed.
fn complete(tree: &mut FiberTree, id: FiberId) {
    if let Some(fiber) = tree.get_mut(id) {
        fiber.pending = Vec::new();
        fiber.plan = Vec::new();
    }
}

// =============================================================================
// Mounting
// =============================================================================

fn mount_child(
    tree: &mut FiberTree,
    wip: &mut WorkInProgress,
    cx: &mut PassContext<'_>,
    parent: FiberId,
    index: usize,
    previous: Option<FiberId>,
) -> Option<FiberId> {
    let (instance, planned) = {
        let parent = tree.get(parent)?;
        let instance = parent.pending.get(index)?.clone();
        (instance, parent.plan.get(index).copied().unwrap_or_default())
    };

    let mut fiber = Fiber::new(instance);
    fiber.parent = Some(parent);
    fiber.idx = index;
    if let Some(alternate) = planned.alternate {
        match tree.get(alternate) {
            Some(old) if old.instance.matches(&fiber.instance) => {
                fiber.tag = EffectTag::Update;
                fiber.alternate = Some(alternate);
                fiber.native = old.native.clone();
                fiber.hooks = old.hooks.clone();
                fiber.providers = old.providers.clone();
                fiber.provided = old.provided.clone();
                fiber.catch = old.catch.clone();
                fiber.suspense = old.suspense.clone();
                fiber.portal = old.portal.clone();
                fiber.flags |= old.flags & FiberFlags::DETACHED;
                if planned.moved {
                    fiber.flags |= FiberFlags::MOVED;
                }
            }
            Some(_) => wip.deletions.push(alternate),
            None => {}
        }
    }
    let moved = fiber.flags.contains(FiberFlags::MOVED);
    let id = tree.insert(fiber);

    match previous {
        Some(previous) => {
            if let Some(previous) = tree.get_mut(previous) {
                previous.next_sibling = Some(id);
            }
        }
        None => {
            if let Some(parent) = tree.get_mut(parent) {
                parent.child = Some(id);
            }
        }
    }
    wip.created.push(id);
    if moved {
        wip.moves.push(id);
    }

    mount_fiber(tree, wip, cx, id, false);
    Some(id)
}

/// Produce the children of a freshly linked fiber and plan them.
fn mount_fiber(
    tree: &mut FiberTree,
    wip: &mut WorkInProgress,
    cx: &mut PassContext<'_>,
    id: FiberId,
    force_render: bool,
) {
    let Some(fiber) = tree.get_mut(id) else {
        return;
    };
    let instance = fiber.instance.clone();
    match &instance {
        Instance::Component(invocation) => {
            if !force_render && skip_memoized(tree, id, invocation) {
                return;
            }
            render_component(tree, wip, cx, id, invocation);
        }
        _ => {
            if fiber.native.is_none() {
                fiber.native = Some(cx.host.create_native_handle(&instance));
            }
            fiber.pending = instance.static_children().to_vec();
        }
    }
    plan(tree, wip, cx, id);
}

/// Reuse the previous subtree of a memoized component whose props did not
/// change. Its children are re-parented at commit.
fn skip_memoized(tree: &mut FiberTree, id: FiberId, invocation: &ComponentInvocation) -> bool {
    if invocation.kind() != ComponentKind::Memo {
        return false;
    }
    let Some(fiber) = tree.get(id) else {
        return false;
    };
    if fiber.tag != EffectTag::Update {
        return false;
    }
    let Some(previous) = fiber.alternate.and_then(|alternate| tree.get(alternate)) else {
        return false;
    };
    let Some(previous_invocation) = previous.instance.as_component() else {
        return false;
    };
    if invocation.should_update(previous_invocation) {
        return false;
    }

    let child = previous.child;
    let flags = previous.flags & FiberFlags::BUBBLING;
    if let Some(fiber) = tree.get_mut(id) {
        fiber.tag = EffectTag::Skip;
        fiber.child = child;
    }
    if !flags.is_empty() {
        tree.mark(id, flags);
    }
    tracing::trace!(component = invocation.name(), "memoized subtree reused");
    true
}

fn render_component(
    tree: &mut FiberTree,
    wip: &mut WorkInProgress,
    cx: &mut PassContext<'_>,
    id: FiberId,
    invocation: &ComponentInvocation,
) {
    let component = invocation.name();
    let Some(fiber) = tree.get_mut(id) else {
        return;
    };
    let is_portal = cx.host.is_portal_target(&fiber.instance);
    if is_portal {
        fiber.portal = fiber.instance.portal_target();
    }
    let store = fiber.hooks.get_or_insert_with(HookStore::new_shared).clone();
    let mut out = RenderOutput {
        providers: fiber.providers.clone(),
        ..RenderOutput::default()
    };
    if is_portal {
        tree.mark(id, FiberFlags::PORTAL_HOST);
    }

    let (result, count_mismatch) = {
        let mut store = store.borrow_mut();
        store.begin();
        let result = {
            let mut hooks = Hooks {
                store: &mut store,
                tree: &*tree,
                fiber: id,
                root: cx.root,
                invocation,
                out: &mut out,
            };
            invocation.render(&mut hooks)
        };
        let mismatch = store.finish(component);
        (result, mismatch)
    };

    let mut flags = FiberFlags::empty();
    {
        let store = store.borrow();
        for phase in [EffectPhase::Insertion, EffectPhase::Layout, EffectPhase::Passive] {
            if store.has_phase(phase) {
                flags |= phase.host_flag();
            }
        }
    }
    let RenderOutput {
        effects,
        providers,
        provided,
        catch,
        suspense,
        diagnostics,
    } = out;
    if let Some(fiber) = tree.get_mut(id) {
        fiber.providers = providers;
        fiber.provided = provided;
        fiber.catch = catch;
        fiber.suspense = suspense;
    }
    if !flags.is_empty() {
        tree.mark(id, flags);
    }
    for (phase, job) in effects {
        wip.effects.push(phase, job);
    }
    if cx.config.dev_diagnostics {
        for diagnostic in diagnostics.into_iter().chain(count_mismatch) {
            tracing::warn!(component, %diagnostic, "hook misuse");
            wip.diagnostics.push(diagnostic);
        }
    }

    let mut children = match result {
        Ok(element) => element.flatten(),
        Err(Throw::Failed(error)) => {
            raise(tree, wip, id, component, error);
            Vec::new()
        }
        Err(Throw::Pending(pending)) => {
            suspend(tree, wip, cx, id, component, pending);
            Vec::new()
        }
    };
    if children.is_empty() {
        children.push(Instance::empty());
    }
    if let Some(fiber) = tree.get_mut(id) {
        fiber.pending = children;
    }
}

/// Hand a render error to the nearest error boundary above `id`.
fn raise(
    tree: &FiberTree,
    wip: &mut WorkInProgress,
    id: FiberId,
    component: &'static str,
    error: ComponentError,
) {
    let handler = tree
        .parent(id)
        .and_then(|parent| tree.find_ancestor(parent, |fiber| fiber.catch.clone()));
    match handler {
        Some(catch) => {
            tracing::debug!(component, %error, "render error caught by boundary");
            catch(error);
        }
        None => {
            tracing::error!(component, %error, "uncaught render error");
            wip.errors.push(RenderError::Uncaught { component, error });
        }
    }
}

/// Hand a pending signal to the nearest suspense boundary above `id`.
fn suspend(
    tree: &FiberTree,
    wip: &mut WorkInProgress,
    cx: &PassContext<'_>,
    id: FiberId,
    component: &'static str,
    pending: Pending,
) {
    let handler = tree
        .parent(id)
        .and_then(|parent| tree.find_ancestor(parent, |fiber| fiber.suspense.clone()));
    match handler {
        Some(suspense) => suspense(pending),
        None => {
            tracing::warn!(component, "suspended without a suspense boundary");
            if cx.config.dev_diagnostics {
                wip.diagnostics.push(Diagnostic::MissingFallback { component });
            }
            wip.errors.push(RenderError::MissingFallback { component });
        }
    }
}

fn plan(tree: &mut FiberTree, wip: &mut WorkInProgress, cx: &PassContext<'_>, id: FiberId) {
    let options = DiffOptions {
        dev: cx.config.dev_diagnostics,
        unkeyed: cx.config.unkeyed_lists,
    };
    match reconciler::plan_children(tree, id, options) {
        Ok(diff) => {
            wip.deletions.extend(diff.deleted);
            wip.diagnostics.extend(diff.diagnostics);
        }
        Err(diagnostic) => {
            tracing::error!(%diagnostic, "render pass aborted");
            wip.failure = diagnostic.clone().into_error();
            wip.diagnostics.push(diagnostic);
        }
    }
}
