use crate::op::{Op, OpQueue};
use crate::scheduler::{Inner, Scheduler, context};
use parking_lot::MutexGuard;
use std::sync::atomic::Ordering;

/// Runs after a reactor run, on every exit path.
///
/// Publishes the worker's private outstanding-work delta, splices the
/// operations the reactor produced (and any the worker batched privately)
/// onto the global queue, and reinstalls the poll slot at the tail. The
/// success path goes through [`TaskCleanup::finish`], which hands the
/// reacquired lock back to the dequeue loop; a panic inside `Reactor::run`
/// performs the same cleanup from `Drop`.
pub(super) struct TaskCleanup<'a> {
    scheduler: &'a Scheduler,

    /// The poll slot this worker extracted; holding it is the token that
    /// made entering the reactor legal.
    slot: Option<Box<Op>>,

    /// Where the reactor drains ready events.
    ready: OpQueue,
}

impl<'a> TaskCleanup<'a> {
    pub(super) fn new(scheduler: &'a Scheduler, slot: Box<Op>) -> Self {
        Self {
            scheduler,
            slot: Some(slot),
            ready: OpQueue::new(),
        }
    }

    pub(super) fn ready_ops(&mut self) -> &mut OpQueue {
        &mut self.ready
    }

    pub(super) fn finish(mut self) -> MutexGuard<'a, Inner> {
        self.run()
    }

    fn run(&mut self) -> MutexGuard<'a, Inner> {
        let scheduler = self.scheduler;
        let key = scheduler.key();

        let delta = context::take_private_work(key);
        if delta > 0 {
            scheduler
                .outstanding_work
                .fetch_add(delta as usize, Ordering::Relaxed);
        }

        // Anything posted onto the private queue while the reactor ran must
        // become globally visible along with the reactor's own output.
        let mut private = context::take_private_queue(key);

        let mut lock = scheduler.inner.lock();
        lock.task_interrupted = true;
        lock.queue.push_queue(&mut self.ready);
        lock.queue.push_queue(&mut private);
        lock.queue
            .push(self.slot.take().expect("poll slot reinstalled twice"));
        lock
    }
}

impl Drop for TaskCleanup<'_> {
    fn drop(&mut self) {
        if self.slot.is_some() {
            drop(self.run());
        }
    }
}

/// Runs after one completion handler, on every exit path.
///
/// Settles the outstanding-work account: the worker consumed one operation
/// and produced `delta` private ones, so a surplus is published in one
/// atomic add and a deficit ends one unit of work (possibly stopping the
/// scheduler). Whatever the handler batched privately is then spliced onto
/// the global queue so the worker can never park while holding unpublished
/// work.
pub(super) struct WorkCleanup<'a> {
    scheduler: &'a Scheduler,
}

impl<'a> WorkCleanup<'a> {
    pub(super) fn new(scheduler: &'a Scheduler) -> Self {
        Self { scheduler }
    }
}

impl Drop for WorkCleanup<'_> {
    fn drop(&mut self) {
        let scheduler = self.scheduler;
        let key = scheduler.key();

        let delta = context::take_private_work(key);
        if delta > 1 {
            scheduler
                .outstanding_work
                .fetch_add((delta - 1) as usize, Ordering::Relaxed);
        } else if delta < 1 {
            scheduler.work_finished();
        }

        let mut private = context::take_private_queue(key);
        if !private.is_empty() {
            let mut lock = scheduler.inner.lock();
            lock.queue.push_queue(&mut private);
        }
    }
}
