//! Roots - one mounted element tree per native container.
//!
//! A root owns the fiber arena, the task queue and the host adapter. All
//! entry points funnel into [`RootInner::run`], which processes queued
//! tasks one pass at a time:
//!
//! - A pass runs unit by unit until it completes or the host asks to yield;
//!   a yielded pass is resumed from a host-scheduled callback.
//! - A queued task of strictly higher priority abandons the pass in
//!   progress; its task is queued again and restarts from scratch.
//! - A completed pass is committed in phases. User callbacks (effects,
//!   cleanups) run between phases with no engine state borrowed, so they may
//!   request updates freely.
//!
//! `run` is guarded against re-entrancy: work requested while it is active
//! is queued and picked up by the active loop.

mod registry;

pub use registry::{
    create_root, create_root_with_config, find_root, install_host_factory, render, reset_roots,
    root_for_container, unmount_root,
};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Instant;

use crate::commit::{self, collect_unmount, CommitReport, Unmounted};
use crate::config::RuntimeConfig;
use crate::element::Element;
use crate::error::{Diagnostic, RenderError};
use crate::fiber::{FiberId, FiberTree};
use crate::hooks::{EffectJob, UpdateTarget};
use crate::platform::{HostAdapter, NativeHandle};
use crate::scheduler::work_loop::{self, PassContext, PassKind, WorkInProgress, WorkOutcome};
use crate::scheduler::{Task, TaskKind, TaskQueue};
use crate::types::{EffectTag, FiberFlags, Key, Priority, ScheduleOptions, Zones};

/// Identity of a mounted root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RootId(u64);

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Root State
// =============================================================================

#[derive(Default)]
pub(crate) struct RootState {
    pub(crate) tree: FiberTree,
    /// Root fiber of the committed tree.
    pub(crate) current: Option<FiberId>,
    pub(crate) wip: Option<WorkInProgress>,
    pub(crate) last_commit: CommitReport,
    pub(crate) commits: usize,
}

pub(crate) struct RootInner {
    id: RootId,
    this: Weak<RootInner>,
    config: RuntimeConfig,
    container: NativeHandle,
    host: RefCell<Box<dyn HostAdapter>>,
    state: RefCell<RootState>,
    queue: RefCell<TaskQueue>,
    /// Passive effects of committed passes, waiting for their host tick.
    passive: RefCell<Vec<EffectJob>>,
    zones: Cell<Zones>,
    running: Cell<bool>,
    run_scheduled: Cell<bool>,
    passive_scheduled: Cell<bool>,
    unmounted: Cell<bool>,
    errors: RefCell<Vec<RenderError>>,
    diagnostics: RefCell<Vec<Diagnostic>>,
}

impl RootInner {
    pub(crate) fn new(
        id: RootId,
        container: NativeHandle,
        host: Box<dyn HostAdapter>,
        config: RuntimeConfig,
    ) -> Rc<Self> {
        Rc::new_cyclic(|this| Self {
            id,
            this: this.clone(),
            config,
            container,
            host: RefCell::new(host),
            state: RefCell::new(RootState::default()),
            queue: RefCell::new(TaskQueue::default()),
            passive: RefCell::new(Vec::new()),
            zones: Cell::new(Zones::empty()),
            running: Cell::new(false),
            run_scheduled: Cell::new(false),
            passive_scheduled: Cell::new(false),
            unmounted: Cell::new(false),
            errors: RefCell::new(Vec::new()),
            diagnostics: RefCell::new(Vec::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Queue a re-render of the component behind `target`.
    pub(crate) fn request_update(&self, target: &Rc<UpdateTarget>, priority: Option<Priority>) {
        if self.unmounted.get() || target.is_released() {
            return;
        }
        let options = self.options_for(priority);
        self.enqueue(Task::new(TaskKind::Update(target.clone()), options));
    }

    fn request_render(&self, element: Element, hydrate: bool, priority: Option<Priority>) {
        if self.unmounted.get() {
            return;
        }
        let children = element.flatten();
        let options = self.options_for(priority);
        self.enqueue(Task::new(TaskKind::Render { children, hydrate }, options));
    }

    /// Scheduling options for a request made in the current zones.
    fn options_for(&self, priority: Option<Priority>) -> ScheduleOptions {
        let zones = self.zones.get();
        let mut options = if zones.contains(Zones::TRANSITION) {
            let options = ScheduleOptions::new(priority.unwrap_or(Priority::Low));
            match self.config.transition_timeout {
                Some(timeout) => options.with_timeout(timeout),
                None => options,
            }
        } else {
            ScheduleOptions::new(priority.unwrap_or(self.config.default_priority))
        };
        if zones.contains(Zones::LAYOUT_EFFECTS) {
            options.force_sync = true;
        }
        options
    }

    fn enqueue(&self, task: Task) {
        let options = self.queue.borrow_mut().push(task);
        tracing::trace!(root = %self.id, priority = ?options.priority, "task queued");
        self.kick(options);
    }

    /// Make sure queued work will run.
    fn kick(&self, options: ScheduleOptions) {
        if self.running.get() || self.zones.get().contains(Zones::BATCH) {
            return;
        }
        if options.force_sync {
            self.run(true);
        } else {
            self.schedule_run(options);
        }
    }

    fn schedule_run(&self, options: ScheduleOptions) {
        if self.run_scheduled.replace(true) {
            return;
        }
        let this = self.this.clone();
        let callback = Box::new(move || {
            if let Some(root) = this.upgrade() {
                root.run(false);
            }
        });
        match self.host.try_borrow_mut() {
            Ok(mut host) => host.schedule_work(callback, options),
            Err(_) => {
                self.run_scheduled.set(false);
                tracing::warn!(root = %self.id, "host busy, work stays queued");
            }
        }
    }

    fn schedule_passive(&self) {
        if self.passive_scheduled.replace(true) {
            return;
        }
        let this = self.this.clone();
        let callback = Box::new(move || {
            if let Some(root) = this.upgrade() {
                root.flush_passive_effects();
            }
        });
        let options = ScheduleOptions::new(self.config.passive_priority);
        match self.host.try_borrow_mut() {
            Ok(mut host) => host.schedule_work(callback, options),
            Err(_) => self.passive_scheduled.set(false),
        }
    }

    /// Run `f` with `zone` entered.
    pub(crate) fn with_zone<R>(&self, zone: Zones, f: impl FnOnce() -> R) -> R {
        let previous = self.zones.get();
        self.zones.set(previous | zone);
        let result = f();
        self.zones.set(previous);
        result
    }

    // -------------------------------------------------------------------------
    // Run loop
    // -------------------------------------------------------------------------

    /// Process queued tasks. With `sync` the host is never asked to yield.
    pub(crate) fn run(&self, sync: bool) {
        if self.running.get() || self.unmounted.get() {
            return;
        }
        self.running.set(true);
        self.run_scheduled.set(false);
        let resume = self.work(sync);
        self.running.set(false);
        if let Some(options) = resume {
            self.schedule_run(options);
        }
    }

    // Returns the options to resume with when the loop yielded.
    fn work(&self, sync: bool) -> Option<ScheduleOptions> {
        loop {
            self.preempt();

            if self.state.borrow().wip.is_none() {
                let task = self.queue.borrow_mut().pop(Instant::now());
                let task = task?;
                self.begin(task);
                continue;
            }

            let outcome = {
                let mut state = self.state.borrow_mut();
                let mut host = self.host.borrow_mut();
                let RootState { tree, wip, .. } = &mut *state;
                let Some(wip) = wip.as_mut() else {
                    continue;
                };
                let force = sync || wip.task.options.force_sync;
                let zone = pass_zone(wip);
                let mut cx = PassContext {
                    host: &mut **host,
                    root: &self.this,
                    config: &self.config,
                };
                let outcome =
                    self.with_zone(zone, || work_loop::perform_work(tree, wip, &mut cx, force));
                match outcome {
                    WorkOutcome::Yielded => return Some(wip.task.options),
                    outcome => outcome,
                }
            };

            match outcome {
                WorkOutcome::Complete => self.commit(),
                WorkOutcome::Failed(error) => self.fail(error),
                WorkOutcome::Yielded => {}
            }

            if sync || self.queue.borrow().has_sync() {
                continue;
            }
            let next = self.queue.borrow().peek(Instant::now());
            if let Some((_, options)) = next {
                if self.host.borrow().should_yield() {
                    return Some(options);
                }
            }
        }
    }

    /// Abandon the pass in progress if a more urgent task is queued.
    fn preempt(&self) {
        let now = Instant::now();
        let mut state = self.state.borrow_mut();
        let Some(current) = state.wip.as_ref().map(|wip| wip.task.effective_priority(now)) else {
            return;
        };
        let urgent = self
            .queue
            .borrow()
            .peek(now)
            .is_some_and(|(priority, _)| priority > current);
        if !urgent {
            return;
        }
        let RootState { tree, wip, .. } = &mut *state;
        if let Some(wip) = wip.take() {
            tracing::debug!(root = %self.id, ?current, "pass preempted");
            let task = work_loop::abandon(tree, wip);
            self.queue.borrow_mut().requeue(task);
        }
    }

    fn begin(&self, task: Task) {
        let owner = match &task.kind {
            TaskKind::Render { .. } => None,
            TaskKind::Update(target) => Some(target.owner()),
        };
        let mut state = self.state.borrow_mut();
        let mut host = self.host.borrow_mut();
        let RootState {
            tree, current, wip, ..
        } = &mut *state;
        let mut cx = PassContext {
            host: &mut **host,
            root: &self.this,
            config: &self.config,
        };
        *wip = match owner {
            None => Some(work_loop::begin_full(
                tree,
                *current,
                &self.container,
                task,
                &mut cx,
            )),
            Some(Some(owner)) => work_loop::begin_partial(tree, owner, task, &mut cx),
            Some(None) => {
                tracing::trace!(root = %self.id, "update for an unmounted component dropped");
                None
            }
        };
    }

    fn fail(&self, error: RenderError) {
        let wip = self.state.borrow_mut().wip.take();
        if let Some(mut wip) = wip {
            self.errors
                .borrow_mut()
                .extend(std::mem::take(&mut wip.errors));
            self.diagnostics
                .borrow_mut()
                .extend(std::mem::take(&mut wip.diagnostics));
            let mut state = self.state.borrow_mut();
            work_loop::abandon(&mut state.tree, wip);
        }
        tracing::error!(root = %self.id, %error, "render pass failed, previous commit kept");
        self.errors.borrow_mut().push(error);
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    fn commit(&self) {
        // Passive effects of the previous commit must not observe this one
        self.flush_passive_effects();

        let (insertion, layout, passive) = {
            let mut state = self.state.borrow_mut();
            let Some(wip) = state.wip.as_mut() else {
                return;
            };
            self.errors
                .borrow_mut()
                .extend(std::mem::take(&mut wip.errors));
            self.diagnostics
                .borrow_mut()
                .extend(std::mem::take(&mut wip.diagnostics));
            let effects = std::mem::take(&mut wip.effects);
            (effects.insertion, effects.layout, effects.passive)
        };

        self.with_zone(Zones::INSERTION_EFFECTS, || {
            for job in insertion {
                job.run();
            }
        });

        let mut unmounted = Unmounted::default();
        {
            let state = self.state.borrow();
            if let Some(wip) = &state.wip {
                for &id in &wip.deletions {
                    collect_unmount(&state.tree, id, &mut unmounted);
                }
            }
        }
        unmounted.run_cleanups();

        let report = {
            let mut state = self.state.borrow_mut();
            let mut host = self.host.borrow_mut();
            let RootState {
                tree,
                current,
                wip,
                last_commit,
                commits,
            } = &mut *state;
            let Some(wip) = wip.take() else {
                return;
            };
            let mut report = CommitReport::default();
            commit::apply_deletions(tree, &wip.deletions, &unmounted, &mut **host, &mut report);
            commit::detach_moved(tree, &wip.moves, &mut **host);
            commit::place(tree, &wip, &mut **host, &mut report);
            host.finish_commit_batch();
            commit::promote(tree, &wip, current);
            *last_commit = report;
            *commits += 1;
            report
        };
        tracing::debug!(
            root = %self.id,
            created = report.created,
            updated = report.updated,
            moved = report.moved,
            deleted = report.deleted,
            skipped = report.skipped,
            "commit"
        );

        self.with_zone(Zones::LAYOUT_EFFECTS, || {
            for job in layout {
                job.run();
            }
        });

        if !passive.is_empty() && !self.unmounted.get() {
            self.passive.borrow_mut().extend(passive);
            self.schedule_passive();
        }
    }

    pub(crate) fn flush_passive_effects(&self) {
        self.passive_scheduled.set(false);
        let jobs = std::mem::take(&mut *self.passive.borrow_mut());
        for job in jobs {
            job.run();
        }
    }

    // -------------------------------------------------------------------------
    // Unmount
    // -------------------------------------------------------------------------

    fn unmount(&self) {
        if self.unmounted.replace(true) {
            return;
        }
        self.queue.borrow_mut().clear();
        self.passive.borrow_mut().clear();
        {
            let mut state = self.state.borrow_mut();
            let RootState { tree, wip, .. } = &mut *state;
            if let Some(wip) = wip.take() {
                work_loop::abandon(tree, wip);
            }
        }

        let mut unmounted = Unmounted::default();
        let children: Vec<FiberId> = {
            let state = self.state.borrow();
            match state.current {
                Some(root) => {
                    collect_unmount(&state.tree, root, &mut unmounted);
                    state.tree.children(root).collect()
                }
                None => Vec::new(),
            }
        };
        unmounted.run_cleanups();

        {
            let mut state = self.state.borrow_mut();
            let mut host = self.host.borrow_mut();
            let mut report = CommitReport::default();
            commit::apply_deletions(
                &mut state.tree,
                &children,
                &unmounted,
                &mut **host,
                &mut report,
            );
            host.finish_commit_batch();
            state.tree = FiberTree::new();
            state.current = None;
            state.last_commit = report;
        }
        tracing::debug!(root = %self.id, fibers = unmounted.fibers, "root unmounted");
    }
}

fn pass_zone(wip: &WorkInProgress) -> Zones {
    let mut zone = Zones::empty();
    if wip.hydrating {
        zone |= Zones::HYDRATE;
    }
    if matches!(wip.kind, PassKind::Partial { .. }) {
        zone |= Zones::UPDATE;
    }
    zone
}

// =============================================================================
// Root Handle
// =============================================================================

/// Public handle of a mounted root.
#[derive(Clone)]
pub struct RootHandle {
    inner: Rc<RootInner>,
}

/// One fiber of the committed tree, as seen by [`RootHandle::snapshot`].
#[derive(Debug, Clone, PartialEq)]
pub struct FiberSnapshot {
    pub depth: usize,
    pub name: String,
    pub key: Option<Key>,
    pub tag: EffectTag,
    pub flags: FiberFlags,
}

impl RootHandle {
    pub(crate) fn new(inner: Rc<RootInner>) -> Self {
        Self { inner }
    }

    pub fn id(&self) -> RootId {
        self.inner.id
    }

    pub fn container(&self) -> &NativeHandle {
        &self.inner.container
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// Schedule rendering `element` into the container.
    pub fn render(&self, element: impl Into<Element>) {
        self.inner.request_render(element.into(), false, None);
    }

    pub fn render_with_priority(&self, element: impl Into<Element>, priority: Priority) {
        self.inner.request_render(element.into(), false, Some(priority));
    }

    /// Like `render`, but creates are flagged as adopting existing native
    /// nodes.
    pub fn hydrate(&self, element: impl Into<Element>) {
        self.inner.request_render(element.into(), true, None);
    }

    /// Process all queued work now, ignoring the yield predicate.
    pub fn flush_sync(&self) {
        self.inner.run(true);
    }

    /// Run passive effects that are waiting for their host tick.
    pub fn flush_passive_effects(&self) {
        self.inner.flush_passive_effects();
    }

    /// Run `f`, deferring host scheduling of its updates until it returns.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        let result = self.inner.with_zone(Zones::BATCH, f);
        if !self.inner.zones.get().contains(Zones::BATCH) {
            let next = self.inner.queue.borrow().peek(Instant::now());
            if let Some((_, options)) = next {
                self.inner.kick(options);
            }
        }
        result
    }

    /// Run `f` with its updates scheduled at low priority.
    pub fn start_transition(&self, f: impl FnOnce()) {
        self.inner.with_zone(Zones::TRANSITION, f);
    }

    /// Unmount everything and forget the root.
    pub fn unmount(&self) {
        self.inner.unmount();
        registry::forget(self.inner.id);
    }

    pub fn is_mounted(&self) -> bool {
        !self.inner.unmounted.get()
    }

    /// No pass in progress and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.inner.state.borrow().wip.is_none() && self.inner.queue.borrow().is_empty()
    }

    pub fn last_commit(&self) -> CommitReport {
        self.inner.state.borrow().last_commit
    }

    /// Number of commits so far.
    pub fn commit_count(&self) -> usize {
        self.inner.state.borrow().commits
    }

    /// Errors collected since the last call.
    pub fn take_errors(&self) -> Vec<RenderError> {
        std::mem::take(&mut *self.inner.errors.borrow_mut())
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.diagnostics.borrow().clone()
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        std::mem::take(&mut *self.inner.diagnostics.borrow_mut())
    }

    /// Fibers alive in the arena, committed or in progress.
    pub fn fiber_count(&self) -> usize {
        self.inner.state.borrow().tree.len()
    }

    /// The committed tree in depth-first order, without the root fiber.
    pub fn snapshot(&self) -> Vec<FiberSnapshot> {
        let state = self.inner.state.borrow();
        let mut out = Vec::new();
        if let Some(root) = state.current {
            for child in state.tree.children(root) {
                snapshot_fiber(&state.tree, child, 0, &mut out);
            }
        }
        out
    }
}

fn snapshot_fiber(tree: &FiberTree, id: FiberId, depth: usize, out: &mut Vec<FiberSnapshot>) {
    let Some(fiber) = tree.get(id) else {
        return;
    };
    out.push(FiberSnapshot {
        depth,
        name: fiber.name(),
        key: fiber.instance.key().cloned(),
        tag: fiber.tag,
        flags: fiber.flags,
    });
    for child in tree.children(id) {
        snapshot_fiber(tree, child, depth + 1, out);
    }
}

impl fmt::Debug for RootHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootHandle")
            .field("id", &self.inner.id)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
