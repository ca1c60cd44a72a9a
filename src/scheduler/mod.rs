//! Scheduler - the queue of pending render tasks and the interruptible
//! work loop that executes them.
//!
//! A task is either a full render of the root or the re-render of one
//! component instance. Tasks run one at a time, highest priority first and
//! in request order within one priority. A task whose timeout elapsed is
//! treated as `High`. Requests for a component that already has a queued
//! task are merged into it.

pub(crate) mod work_loop;

use std::rc::Rc;
use std::time::Instant;

use crate::element::Instance;
use crate::hooks::UpdateTarget;
use crate::types::{Priority, ScheduleOptions};

// =============================================================================
// Task
// =============================================================================

pub(crate) enum TaskKind {
    /// Reconcile the whole root against these children.
    Render {
        children: Vec<Instance>,
        hydrate: bool,
    },
    /// Re-render the component instance behind `target`.
    Update(Rc<UpdateTarget>),
}

pub(crate) struct Task {
    pub(crate) kind: TaskKind,
    pub(crate) options: ScheduleOptions,
    queued_at: Instant,
    seq: u64,
}

impl Task {
    pub(crate) fn new(kind: TaskKind, options: ScheduleOptions) -> Self {
        Self {
            kind,
            options,
            queued_at: Instant::now(),
            seq: 0,
        }
    }

    /// Priority after applying an elapsed timeout.
    pub(crate) fn effective_priority(&self, now: Instant) -> Priority {
        match self.options.timeout {
            Some(timeout) if now.duration_since(self.queued_at) >= timeout => {
                self.options.priority.max(Priority::High)
            }
            _ => self.options.priority,
        }
    }

    pub(crate) fn is_render(&self) -> bool {
        matches!(self.kind, TaskKind::Render { .. })
    }
}

// =============================================================================
// Task Queue
// =============================================================================

#[derive(Default)]
pub(crate) struct TaskQueue {
    tasks: Vec<Task>,
    next_seq: u64,
}

impl TaskQueue {
    /// Queue a task, merging it into a queued task for the same target.
    ///
    /// A new root render replaces a queued one. Returns the options the
    /// queued task ends up with.
    pub(crate) fn push(&mut self, mut task: Task) -> ScheduleOptions {
        let existing = self.tasks.iter_mut().find(|queued| same_target(queued, &task));
        if let Some(queued) = existing {
            merge_options(&mut queued.options, task.options);
            return queued.options;
        }

        if task.is_render() {
            if let Some(position) = self.tasks.iter().position(Task::is_render) {
                let replaced = self.tasks.remove(position);
                merge_options(&mut task.options, replaced.options);
            }
        }
        let options = task.options;
        self.insert(task);
        options
    }

    /// Put back a task that was started but not finished. It keeps its
    /// place in request order.
    pub(crate) fn requeue(&mut self, task: Task) {
        let existing = self.tasks.iter_mut().find(|queued| same_target(queued, &task));
        if let Some(queued) = existing {
            merge_options(&mut queued.options, task.options);
            queued.seq = queued.seq.min(task.seq);
            return;
        }
        let superseded = task.is_render() && self.tasks.iter().any(Task::is_render);
        if !superseded {
            self.tasks.push(task);
        }
    }

    fn insert(&mut self, mut task: Task) {
        task.seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(task);
    }

    fn best(&self, now: Instant) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| {
                a.effective_priority(now)
                    .cmp(&b.effective_priority(now))
                    .then(a.options.force_sync.cmp(&b.options.force_sync))
                    .then(b.seq.cmp(&a.seq))
            })
            .map(|(index, _)| index)
    }

    /// Take the task to run next.
    pub(crate) fn pop(&mut self, now: Instant) -> Option<Task> {
        let index = self.best(now)?;
        Some(self.tasks.swap_remove(index))
    }

    /// Options of the task that would run next.
    pub(crate) fn peek(&self, now: Instant) -> Option<(Priority, ScheduleOptions)> {
        let index = self.best(now)?;
        let task = &self.tasks[index];
        Some((task.effective_priority(now), task.options))
    }

    pub(crate) fn has_sync(&self) -> bool {
        self.tasks.iter().any(|task| task.options.force_sync)
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub(crate) fn clear(&mut self) {
        self.tasks.clear();
    }
}

fn same_target(a: &Task, b: &Task) -> bool {
    match (&a.kind, &b.kind) {
        (TaskKind::Update(a), TaskKind::Update(b)) => Rc::ptr_eq(a, b),
        _ => false,
    }
}

fn merge_options(into: &mut ScheduleOptions, other: ScheduleOptions) {
    into.priority = into.priority.max(other.priority);
    into.force_sync |= other.force_sync;
    into.timeout = match (into.timeout, other.timeout) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (Some(a), None) | (None, Some(a)) => Some(a),
        (None, None) => None,
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn update(target: &Rc<UpdateTarget>, priority: Priority) -> Task {
        Task::new(TaskKind::Update(target.clone()), ScheduleOptions::new(priority))
    }

    fn render(priority: Priority) -> Task {
        Task::new(
            TaskKind::Render {
                children: Vec::new(),
                hydrate: false,
            },
            ScheduleOptions::new(priority),
        )
    }

    #[test]
    fn test_priority_then_fifo() {
        let mut queue = TaskQueue::default();
        let a = Rc::new(UpdateTarget::default());
        let b = Rc::new(UpdateTarget::default());
        let c = Rc::new(UpdateTarget::default());
        queue.push(update(&a, Priority::Normal));
        queue.push(update(&b, Priority::High));
        queue.push(update(&c, Priority::Normal));

        let order: Vec<_> = std::iter::from_fn(|| queue.pop(Instant::now()))
            .map(|task| match task.kind {
                TaskKind::Update(target) => target,
                TaskKind::Render { .. } => unreachable!(),
            })
            .collect();
        assert!(Rc::ptr_eq(&order[0], &b));
        assert!(Rc::ptr_eq(&order[1], &a));
        assert!(Rc::ptr_eq(&order[2], &c));
    }

    #[test]
    fn test_updates_for_one_target_merge() {
        let mut queue = TaskQueue::default();
        let a = Rc::new(UpdateTarget::default());
        queue.push(update(&a, Priority::Low));
        let merged = queue.push(update(&a, Priority::High));
        assert_eq!(queue.len(), 1);
        assert_eq!(merged.priority, Priority::High);
    }

    #[test]
    fn test_new_render_replaces_queued_render() {
        let mut queue = TaskQueue::default();
        queue.push(render(Priority::Normal));
        queue.push(render(Priority::Low));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.peek(Instant::now()).unwrap().0, Priority::Normal);
    }

    #[test]
    fn test_timeout_promotes() {
        let mut queue = TaskQueue::default();
        let a = Rc::new(UpdateTarget::default());
        let b = Rc::new(UpdateTarget::default());
        let mut late = update(&a, Priority::Low);
        late.options.timeout = Some(Duration::from_secs(60));
        queue.push(late);
        queue.push(update(&b, Priority::Normal));

        let later = Instant::now() + Duration::from_secs(120);
        assert_eq!(queue.peek(later).unwrap().0, Priority::High);
        assert_eq!(queue.peek(Instant::now()).unwrap().0, Priority::Normal);
    }
}
