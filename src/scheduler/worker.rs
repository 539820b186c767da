use crate::scheduler::cleanup::{TaskCleanup, WorkCleanup};
use crate::scheduler::{Inner, Scheduler};
use parking_lot::MutexGuard;
use std::time::Duration;

// The dequeue loop. Three variants share one structure and differ only in
// the reactor blocking policy and whether they iterate: do_run_one blocks
// indefinitely, do_wait_one waits at most once for a bounded time, and
// do_poll_one never blocks.
//
// Each variant is entered with the lock held and returns with it released.
// Because the poll slot is a single token in the FIFO, at most one worker
// ever holds the right to enter `Reactor::run`; the others find a real
// operation at the head or park on the wakeup event.
impl Scheduler {
    pub(super) fn do_run_one<'a>(&'a self, mut lock: MutexGuard<'a, Inner>) -> usize {
        while !lock.stopped {
            let Some(op) = lock.queue.pop() else {
                self.wakeup.clear(&mut lock);
                self.wakeup.wait(&mut lock);
                continue;
            };
            let more_handlers = !lock.queue.is_empty();

            if lock.is_poll_slot(&op) {
                // If residual work is waiting, the reactor must not block
                // and may be cut short by an interrupt.
                lock.task_interrupted = more_handlers;
                let task = lock
                    .task
                    .clone()
                    .expect("poll slot queued without a reactor");

                if more_handlers && !self.one_thread {
                    self.wakeup.unlock_and_signal_one(lock);
                } else {
                    drop(lock);
                }

                let mut on_exit = TaskCleanup::new(self, op);
                let timeout = more_handlers.then_some(Duration::ZERO);
                task.run(timeout, on_exit.ready_ops());
                lock = on_exit.finish();
            } else {
                let task_result = op.task_result();

                if more_handlers && !self.one_thread {
                    self.wake_one_thread_and_unlock(lock);
                } else {
                    drop(lock);
                }

                // Ensure the private queue and work delta are published on
                // every exit path, a handler panic included.
                let _on_exit = WorkCleanup::new(self);

                op.complete(self, Ok(()), task_result);
                return 1;
            }
        }

        0
    }

    pub(super) fn do_wait_one<'a>(&'a self, mut lock: MutexGuard<'a, Inner>, mut timeout: Duration) -> usize {
        if lock.stopped {
            return 0;
        }

        if lock.queue.is_empty() {
            self.wakeup.clear(&mut lock);
            self.wakeup.wait_for(&mut lock, timeout);
            // Wait at most once.
            timeout = Duration::ZERO;
        }

        if lock.front_is_poll_slot() {
            let slot = lock.queue.pop().expect("peeked poll slot disappeared");
            let more_handlers = !lock.queue.is_empty();

            lock.task_interrupted = more_handlers;
            let task = lock
                .task
                .clone()
                .expect("poll slot queued without a reactor");

            if more_handlers && !self.one_thread {
                self.wakeup.unlock_and_signal_one(lock);
            } else {
                drop(lock);
            }

            let mut on_exit = TaskCleanup::new(self, slot);
            let run_timeout = if more_handlers {
                Some(Duration::ZERO)
            } else {
                Some(timeout)
            };
            task.run(run_timeout, on_exit.ready_ops());
            lock = on_exit.finish();

            if lock.front_is_poll_slot() {
                // The reactor produced nothing. Hand the remaining time
                // budget to a sleeping peer, if any.
                let _ = self.wakeup.maybe_unlock_and_signal_one(lock);
                return 0;
            }
        }

        let Some(op) = lock.queue.pop() else {
            return 0;
        };
        let more_handlers = !lock.queue.is_empty();

        let task_result = op.task_result();

        if more_handlers && !self.one_thread {
            self.wake_one_thread_and_unlock(lock);
        } else {
            drop(lock);
        }

        let _on_exit = WorkCleanup::new(self);

        op.complete(self, Ok(()), task_result);
        1
    }

    pub(super) fn do_poll_one<'a>(&'a self, mut lock: MutexGuard<'a, Inner>) -> usize {
        if lock.stopped {
            return 0;
        }

        if lock.front_is_poll_slot() {
            let slot = lock.queue.pop().expect("peeked poll slot disappeared");
            let more_handlers = !lock.queue.is_empty();

            lock.task_interrupted = more_handlers;
            let task = lock
                .task
                .clone()
                .expect("poll slot queued without a reactor");

            if more_handlers && !self.one_thread {
                self.wakeup.unlock_and_signal_one(lock);
            } else {
                drop(lock);
            }

            let mut on_exit = TaskCleanup::new(self, slot);
            task.run(Some(Duration::ZERO), on_exit.ready_ops());
            lock = on_exit.finish();

            if lock.front_is_poll_slot() {
                let _ = self.wakeup.maybe_unlock_and_signal_one(lock);
                return 0;
            }
        }

        let Some(op) = lock.queue.pop() else {
            return 0;
        };
        let more_handlers = !lock.queue.is_empty();

        let task_result = op.task_result();

        if more_handlers && !self.one_thread {
            self.wake_one_thread_and_unlock(lock);
        } else {
            drop(lock);
        }

        let _on_exit = WorkCleanup::new(self);

        op.complete(self, Ok(()), task_result);
        1
    }
}
