use crate::op::OpQueue;
use crate::reactor::Reactor;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A scriptable reactor.
///
/// Each call to `run` delivers the next scripted batch of operations, if
/// any. With no batch ready it honors the blocking policy: a `None` timeout
/// parks the caller until a batch or an interrupt arrives, a bounded timeout
/// waits at most that long, and a zero timeout returns immediately. Run and
/// interrupt counts are exposed so tests can assert how the scheduler drove
/// the reactor.
pub(crate) struct MockReactor {
    state: Mutex<State>,
    cond: Condvar,
    runs: AtomicUsize,
    interrupts: AtomicUsize,

    /// Guards the contract that at most one thread is ever inside `run`.
    active: AtomicBool,
}

struct State {
    /// Scripted batches, one drained per `run` call.
    ready: VecDeque<OpQueue>,

    /// Sticky until the next `run` observes it, like a readable interrupt
    /// pipe.
    interrupted: bool,
}

impl MockReactor {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State {
                ready: VecDeque::new(),
                interrupted: false,
            }),
            cond: Condvar::new(),
            runs: AtomicUsize::new(0),
            interrupts: AtomicUsize::new(0),
            active: AtomicBool::new(false),
        })
    }

    /// Queue a batch of operations to hand out on a subsequent `run` call,
    /// waking a parked caller.
    pub(crate) fn script(&self, ops: OpQueue) {
        let mut state = self.state.lock();
        state.ready.push_back(ops);
        self.cond.notify_all();
    }

    pub(crate) fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    pub(crate) fn interrupt_count(&self) -> usize {
        self.interrupts.load(Ordering::SeqCst)
    }
}

impl MockReactor {
    fn run_inner(&self, timeout: Option<Duration>, out: &mut OpQueue) {
        let mut state = self.state.lock();

        if state.interrupted {
            state.interrupted = false;
            return;
        }

        if state.ready.is_empty() {
            match timeout {
                Some(t) if t.is_zero() => {}
                Some(t) => {
                    let deadline = Instant::now() + t;
                    while state.ready.is_empty() && !state.interrupted {
                        if self.cond.wait_until(&mut state, deadline).timed_out() {
                            break;
                        }
                    }
                }
                None => {
                    while state.ready.is_empty() && !state.interrupted {
                        self.cond.wait(&mut state);
                    }
                }
            }
        }

        if state.interrupted {
            state.interrupted = false;
            return;
        }

        if let Some(mut batch) = state.ready.pop_front() {
            out.push_queue(&mut batch);
        }
    }
}

impl Reactor for MockReactor {
    fn run(&self, timeout: Option<Duration>, out: &mut OpQueue) {
        assert!(
            !self.active.swap(true, Ordering::SeqCst),
            "reactor entered by two threads at once"
        );
        self.runs.fetch_add(1, Ordering::SeqCst);

        self.run_inner(timeout, out);

        self.active.store(false, Ordering::SeqCst);
    }

    fn interrupt(&self) {
        self.interrupts.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.lock();
        state.interrupted = true;
        self.cond.notify_all();
    }
}
