use crate::op::{Op, OpQueue};
use std::cell::RefCell;
use std::mem;

/// One frame per active `run*` / `poll*` call on this thread.
///
/// The frame batches work produced by the handler the worker is currently
/// running: completions land on the private queue and outstanding-work
/// increments accumulate in the private delta, both published to the
/// scheduler at the cleanup points of the dequeue loop. Only the owning
/// thread ever touches a frame.
struct Frame {
    /// Identity of the scheduler this frame belongs to. Nested calls into a
    /// different scheduler push their own frames on top.
    key: usize,

    private_queue: OpQueue,

    private_outstanding_work: isize,
}

impl Frame {
    fn new(key: usize) -> Self {
        Self {
            key,
            private_queue: OpQueue::new(),
            private_outstanding_work: 0,
        }
    }
}

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Registers the current thread as a worker of the keyed scheduler for the
/// duration of one `run*` / `poll*` call. Popped on drop, unwinding included.
pub(crate) struct ThreadContext {
    key: usize,
}

impl ThreadContext {
    pub(crate) fn enter(key: usize) -> Self {
        FRAMES.with(|frames| frames.borrow_mut().push(Frame::new(key)));
        Self { key }
    }
}

impl Drop for ThreadContext {
    fn drop(&mut self) {
        FRAMES.with(|frames| {
            let frame = frames
                .borrow_mut()
                .pop()
                .expect("scheduler frame stack underflow");
            debug_assert_eq!(frame.key, self.key, "frames popped out of order");
            // The cleanup scopes publish the private queue on every exit
            // path, so nothing may be left behind here.
            debug_assert!(
                frame.private_queue.is_empty(),
                "private operations abandoned on frame exit"
            );
        });
    }
}

fn with_current_frame<R>(key: usize, f: impl FnOnce(&mut Frame) -> R) -> Option<R> {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames.iter_mut().rev().find(|frame| frame.key == key).map(f)
    })
}

/// True when the calling thread is currently inside a `run*` / `poll*` call
/// of the keyed scheduler.
pub(crate) fn is_worker(key: usize) -> bool {
    with_current_frame(key, |_| ()).is_some()
}

/// Fast-path enqueue onto the current worker frame, also crediting the
/// private outstanding-work delta. Hands the operation back when the calling
/// thread is not a worker of this scheduler.
pub(crate) fn push_private_with_work(key: usize, op: Box<Op>) -> Result<(), Box<Op>> {
    let mut op = Some(op);
    let pushed = with_current_frame(key, |frame| {
        frame.private_outstanding_work += 1;
        frame
            .private_queue
            .push(op.take().expect("operation consumed twice"));
    });
    match pushed {
        Some(()) => Ok(()),
        None => Err(op.take().expect("operation lost")),
    }
}

/// Fast-path enqueue without touching the work accounting (the caller has
/// already counted the operation).
pub(crate) fn push_private(key: usize, op: Box<Op>) -> Result<(), Box<Op>> {
    let mut op = Some(op);
    let pushed = with_current_frame(key, |frame| {
        frame
            .private_queue
            .push(op.take().expect("operation consumed twice"));
    });
    match pushed {
        Some(()) => Ok(()),
        None => Err(op.take().expect("operation lost")),
    }
}

/// Batched form of [`push_private`]. Returns false, leaving `ops` untouched,
/// when the calling thread is not a worker.
pub(crate) fn push_private_queue(key: usize, ops: &mut OpQueue) -> bool {
    with_current_frame(key, |frame| frame.private_queue.push_queue(ops)).is_some()
}

pub(crate) fn add_private_work(key: usize, delta: isize) {
    with_current_frame(key, |frame| frame.private_outstanding_work += delta)
        .expect("not inside a worker of this scheduler")
}

/// Take and zero the private outstanding-work delta of the current frame.
pub(crate) fn take_private_work(key: usize) -> isize {
    with_current_frame(key, |frame| {
        mem::replace(&mut frame.private_outstanding_work, 0)
    })
    .expect("not inside a worker of this scheduler")
}

/// Take the private queue of the current frame, leaving it empty.
pub(crate) fn take_private_queue(key: usize) -> OpQueue {
    with_current_frame(key, |frame| mem::take(&mut frame.private_queue))
        .expect("not inside a worker of this scheduler")
}

/// Take the private queue of the enclosing `run*` call for the same
/// scheduler, if any. Used by nested polls to make operations the outer
/// worker has batched visible to the inner dequeue loop.
pub(crate) fn take_outer_private_queue(key: usize) -> Option<OpQueue> {
    FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        frames
            .iter_mut()
            .rev()
            .filter(|frame| frame.key == key)
            .nth(1)
            .map(|frame| mem::take(&mut frame.private_queue))
    })
}
