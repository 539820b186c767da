use crate::scheduler::Scheduler;
use std::fmt;

// Exports
pub mod queue;
pub use queue::OpQueue;

/// Error status handed to a completion handler. The scheduler itself always
/// passes `Ok(())`; a reactor that needs to report a failed I/O operation
/// captures the error inside the handler it enqueues.
pub type Status = std::io::Result<()>;

type Handler = Box<dyn FnOnce(&Scheduler, Status, usize) + Send>;

enum OpKind {
    /// A posted completion handler, run exactly once or dropped unexecuted
    /// at shutdown.
    Handler(Handler),

    /// Reserves the reactor's slot in the operation queue. Identified by
    /// address, never completed, destroyed only at shutdown.
    PollSlot,
}

/// An opaque unit of deferred work.
///
/// Producers allocate an `Op` and hand exclusive ownership to the scheduler
/// on enqueue. The worker that dequeues it consumes it through [`Op::complete`];
/// operations discarded by `shutdown` release their captures in `Drop` instead.
pub struct Op {
    /// Intrusive FIFO link. Managed exclusively by [`OpQueue`].
    pub(crate) next: Option<Box<Op>>,

    /// Precomputed result for reactor-produced operations. Unused (zero) for
    /// plain posted handlers.
    task_result: usize,

    kind: OpKind,
}

impl Op {
    pub fn new<F>(handler: F) -> Box<Op>
    where
        F: FnOnce(&Scheduler, Status, usize) + Send + 'static,
    {
        Box::new(Op {
            next: None,
            task_result: 0,
            kind: OpKind::Handler(Box::new(handler)),
        })
    }

    pub(crate) fn poll_slot() -> Box<Op> {
        Box::new(Op {
            next: None,
            task_result: 0,
            kind: OpKind::PollSlot,
        })
    }

    /// Set by the reactor before the operation is enqueued, read back by the
    /// worker that completes it.
    pub fn set_task_result(&mut self, task_result: usize) {
        self.task_result = task_result;
    }

    pub(crate) fn task_result(&self) -> usize {
        self.task_result
    }

    /// Run the completion handler, consuming the operation. The operation is
    /// never referenced again after this call.
    pub(crate) fn complete(self: Box<Self>, scheduler: &Scheduler, status: Status, task_result: usize) {
        match self.kind {
            OpKind::Handler(handler) => handler(scheduler, status, task_result),
            OpKind::PollSlot => unreachable!("the poll slot is never completed"),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            OpKind::Handler(_) => "handler",
            OpKind::PollSlot => "poll_slot",
        };
        f.debug_struct("Op")
            .field("kind", &kind)
            .field("task_result", &self.task_result)
            .finish()
    }
}
