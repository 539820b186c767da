use crate::op::{Op, OpQueue};
use crate::reactor::Reactor;
#[allow(unused)]
use crate::utils::tracker::{Call, Method, Tracker};
use parking_lot::{Mutex, MutexGuard};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

// Public API
mod builder;
pub use builder::{Builder, ConcurrencyHint};

// Exports
pub(crate) mod context;
use context::ThreadContext;

mod cleanup;

mod wakeup;
use wakeup::WakeupEvent;

mod worker;


use builder::SchedulerConfig;

/// Shared state guarded by the scheduler mutex.
pub(super) struct Inner {
    /// Global FIFO of ready operations, with the poll slot in-band.
    pub(super) queue: OpQueue,

    /// All run methods return 0 immediately while set.
    pub(super) stopped: bool,

    /// Enqueues become no-ops (aside from work accounting) once set.
    pub(super) shutdown: bool,

    /// False only while a worker may be blocked inside `Reactor::run`
    /// without having been interrupted. Anything that makes new work
    /// visible while this is false must interrupt the reactor.
    pub(super) task_interrupted: bool,

    /// Installed by `init_task`, cleared at shutdown.
    pub(super) task: Option<Arc<dyn Reactor>>,

    /// Address identity of the poll slot operation. Zero when none is
    /// planted.
    pub(super) poll_slot_addr: usize,
}

impl Inner {
    pub(super) fn is_poll_slot(&self, op: &Op) -> bool {
        self.poll_slot_addr != 0 && std::ptr::from_ref(op) as usize == self.poll_slot_addr
    }

    pub(super) fn front_is_poll_slot(&self) -> bool {
        self.queue.front().is_some_and(|op| self.is_poll_slot(op))
    }
}

/// Interleaves externally posted completion handlers with a single
/// privileged reactor-polling task.
///
/// One or more worker threads drive the scheduler cooperatively through the
/// run methods, each dequeuing one operation at a time and running it to
/// completion. The scheduler spawns no threads of its own.
pub struct Scheduler {
    cfg: SchedulerConfig,

    /// Derived once from the configuration: at most one concurrent worker
    /// was promised, so peer signalling can be skipped and continuations
    /// always stay on the private queue.
    one_thread: bool,

    inner: Mutex<Inner>,

    /// Condition variable bound to `inner`, used both to park idle workers
    /// and for the fused unlock-and-signal handoff.
    wakeup: WakeupEvent,

    /// Operations the scheduler regards as in flight. Reaching zero stops
    /// the scheduler.
    outstanding_work: AtomicUsize,

    #[cfg(test)]
    pub(crate) tracker: Tracker,
}

impl Scheduler {
    pub(crate) fn new(cfg: SchedulerConfig) -> Self {
        let one_thread = cfg.one_thread();
        Self {
            cfg,
            one_thread,
            inner: Mutex::new(Inner {
                queue: OpQueue::new(),
                stopped: false,
                shutdown: false,
                task_interrupted: true,
                task: None,
                poll_slot_addr: 0,
            }),
            wakeup: WakeupEvent::new(),
            outstanding_work: AtomicUsize::new(0),

            #[cfg(test)]
            tracker: Tracker::new(),
        }
    }

    /// The concurrency hint recorded at construction.
    pub fn concurrency_hint(&self) -> usize {
        self.cfg.concurrency_hint
    }

    /// Stable identity for thread-local worker registration.
    pub(crate) fn key(&self) -> usize {
        std::ptr::from_ref(&self.inner) as usize
    }

    // Small price to pay to get introspection on the enqueue paths during
    // testing. No op in release builds.
    #[allow(unused)]
    #[inline(always)]
    fn track(&self, method: Method, call: Call) {
        #[cfg(test)]
        self.tracker.record(method, call);
    }

    /// Install the reactor and plant the poll slot in the queue. Idempotent;
    /// silently does nothing after shutdown.
    pub fn init_task(&self, reactor: &Arc<dyn Reactor>) {
        let mut lock = self.inner.lock();
        if lock.shutdown || lock.task.is_some() {
            return;
        }

        lock.task = Some(Arc::clone(reactor));

        let slot = Op::poll_slot();
        lock.poll_slot_addr = std::ptr::from_ref(&*slot) as usize;
        lock.queue.push(slot);

        debug!("reactor installed");
        self.wake_one_thread_and_unlock(lock);
    }

    /// Stop all workers. Each run method returns 0 once it observes the
    /// flag; a worker blocked inside the reactor is interrupted.
    pub fn stop(&self) {
        self.track(Method::Stop, Call::Stop);
        let lock = self.inner.lock();
        self.stop_all_threads(lock);
    }

    pub fn stopped(&self) -> bool {
        self.inner.lock().stopped
    }

    /// Clear the stopped flag so a fresh set of run calls can make progress.
    pub fn restart(&self) {
        let mut lock = self.inner.lock();
        lock.stopped = false;
    }

    /// Note that some work has started, keeping the run methods from
    /// returning until a matching `work_finished`.
    pub fn work_started(&self) {
        self.outstanding_work.fetch_add(1, Ordering::Relaxed);
    }

    /// Note that some work has finished. On the last outstanding unit the
    /// scheduler stops itself.
    pub fn work_finished(&self) {
        if self.outstanding_work.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.stop();
        }
    }

    /// Credit one unit of work to the calling worker's private delta,
    /// balancing a `work_finished` that a handler will issue later. Must be
    /// called from a worker thread of this scheduler.
    pub fn compensating_work_started(&self) {
        context::add_private_work(self.key(), 1);
    }

    /// True when the calling thread is inside one of this scheduler's run
    /// methods, so a posted handler could be run inline.
    pub fn can_dispatch(&self) -> bool {
        context::is_worker(self.key())
    }

    /// Enqueue `op` for eventual execution, counting it as outstanding
    /// work.
    ///
    /// Continuations posted from a worker thread stay on that worker's
    /// private queue: no lock, no wakeup, and the handler chain keeps its
    /// cache locality. Everything else goes through the global queue and
    /// wakes one peer.
    pub fn post_immediate_completion(&self, op: Box<Op>, is_continuation: bool) {
        let mut op = op;
        if self.one_thread || is_continuation {
            match context::push_private_with_work(self.key(), op) {
                Ok(()) => {
                    self.track(
                        Method::Post,
                        Call::Post {
                            is_continuation,
                            private: true,
                        },
                    );
                    return;
                }
                Err(returned) => op = returned,
            }
        }

        self.track(
            Method::Post,
            Call::Post {
                is_continuation,
                private: false,
            },
        );

        self.work_started();
        let mut lock = self.inner.lock();
        if lock.shutdown {
            return;
        }
        lock.queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Enqueue `op` without touching the outstanding-work count; the caller
    /// already counted it via `work_started`.
    pub fn post_deferred_completion(&self, op: Box<Op>) {
        let mut op = op;
        if self.one_thread {
            match context::push_private(self.key(), op) {
                Ok(()) => {
                    self.track(Method::Defer, Call::Defer { private: true });
                    return;
                }
                Err(returned) => op = returned,
            }
        }

        self.track(Method::Defer, Call::Defer { private: false });

        let mut lock = self.inner.lock();
        if lock.shutdown {
            return;
        }
        lock.queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Batched form of [`post_deferred_completion`]; the whole batch splices
    /// in one shot.
    ///
    /// [`post_deferred_completion`]: Scheduler::post_deferred_completion
    pub fn post_deferred_completions(&self, ops: &mut OpQueue) {
        if ops.is_empty() {
            return;
        }

        if self.one_thread && context::push_private_queue(self.key(), ops) {
            self.track(Method::Defer, Call::Defer { private: true });
            return;
        }

        self.track(Method::Defer, Call::Defer { private: false });

        let mut lock = self.inner.lock();
        if lock.shutdown {
            let _discarded = mem::take(ops);
            return;
        }
        lock.queue.push_queue(ops);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Enqueue `op` so that any worker may pick it up, never the posting
    /// thread's private queue.
    pub fn do_dispatch(&self, op: Box<Op>) {
        self.track(Method::Dispatch, Call::Dispatch);

        self.work_started();
        let mut lock = self.inner.lock();
        if lock.shutdown {
            return;
        }
        lock.queue.push(op);
        self.wake_one_thread_and_unlock(lock);
    }

    /// Take ownership of a batch of operations and discard them without
    /// running them. Used during forced teardown of sub-contexts.
    pub fn abandon_operations(&self, ops: &mut OpQueue) {
        let _discarded = mem::take(ops);
    }

    /// Discard every queued operation without running it and drop the
    /// reactor reference. Idempotent. Must not be called while a worker is
    /// inside a run method.
    pub fn shutdown(&self) {
        self.track(Method::Shutdown, Call::Shutdown);

        let mut lock = self.inner.lock();
        if lock.shutdown {
            return;
        }
        lock.shutdown = true;
        let discarded = mem::take(&mut lock.queue);
        let task = lock.task.take();
        lock.poll_slot_addr = 0;
        drop(lock);

        debug!("scheduler shut down");

        // Handlers release their captures in Drop; the poll slot goes down
        // with the queue.
        drop(discarded);
        drop(task);
    }

    /// Run the dequeue loop until stopped. Returns the number of handlers
    /// executed (saturating).
    pub fn run(&self) -> usize {
        if self.outstanding_work.load(Ordering::Acquire) == 0 {
            self.stop();
            return 0;
        }

        let _ctx = ThreadContext::enter(self.key());

        let mut n: usize = 0;
        let mut lock = self.inner.lock();
        loop {
            match self.do_run_one(lock) {
                0 => return n,
                _ => {
                    n = n.saturating_add(1);
                    lock = self.inner.lock();
                }
            }
        }
    }

    /// Run at most one handler, blocking until one is available or the
    /// scheduler is stopped.
    pub fn run_one(&self) -> usize {
        if self.outstanding_work.load(Ordering::Acquire) == 0 {
            self.stop();
            return 0;
        }

        let _ctx = ThreadContext::enter(self.key());

        let lock = self.inner.lock();
        self.do_run_one(lock)
    }

    /// Run at most one handler, waiting at most `timeout` for one to become
    /// available.
    pub fn wait_one(&self, timeout: Duration) -> usize {
        if self.outstanding_work.load(Ordering::Acquire) == 0 {
            self.stop();
            return 0;
        }

        let _ctx = ThreadContext::enter(self.key());

        let lock = self.inner.lock();
        self.do_wait_one(lock, timeout)
    }

    /// Run ready handlers without blocking, returning how many were
    /// executed.
    pub fn poll(&self) -> usize {
        if self.outstanding_work.load(Ordering::Acquire) == 0 {
            self.stop();
            return 0;
        }

        let ctx = ThreadContext::enter(self.key());

        let mut lock = self.inner.lock();
        self.splice_outer_private_queue(&ctx, &mut lock);

        let mut n: usize = 0;
        loop {
            match self.do_poll_one(lock) {
                0 => return n,
                _ => {
                    n = n.saturating_add(1);
                    lock = self.inner.lock();
                }
            }
        }
    }

    /// Run at most one ready handler without blocking.
    pub fn poll_one(&self) -> usize {
        if self.outstanding_work.load(Ordering::Acquire) == 0 {
            self.stop();
            return 0;
        }

        let ctx = ThreadContext::enter(self.key());

        let mut lock = self.inner.lock();
        self.splice_outer_private_queue(&ctx, &mut lock);

        self.do_poll_one(lock)
    }

    // A nested poll must observe the operations the enclosing worker has
    // batched on its private queue, which would otherwise stay invisible
    // until that worker's cleanup point.
    fn splice_outer_private_queue(&self, _ctx: &ThreadContext, lock: &mut MutexGuard<'_, Inner>) {
        if self.one_thread {
            if let Some(mut outer_ops) = context::take_outer_private_queue(self.key()) {
                lock.queue.push_queue(&mut outer_ops);
            }
        }
    }

    /// Wake one sleeping peer if there is one; failing that, interrupt the
    /// reactor so a worker parked inside it cycles back through the queue.
    /// Releases the lock in all cases.
    pub(super) fn wake_one_thread_and_unlock(&self, lock: MutexGuard<'_, Inner>) {
        if let Some(mut lock) = self.wakeup.maybe_unlock_and_signal_one(lock) {
            if !lock.task_interrupted {
                if let Some(task) = lock.task.clone() {
                    lock.task_interrupted = true;
                    trace!("interrupting reactor");
                    task.interrupt();
                }
            }
        }
    }

    fn stop_all_threads(&self, mut lock: MutexGuard<'_, Inner>) {
        lock.stopped = true;
        trace!("stopping all workers");
        self.wakeup.signal_all(&mut lock);

        if !lock.task_interrupted {
            if let Some(task) = lock.task.clone() {
                lock.task_interrupted = true;
                task.interrupt();
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("cfg", &self.cfg)
            .field("one_thread", &self.one_thread)
            .field(
                "outstanding_work",
                &self.outstanding_work.load(Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}
