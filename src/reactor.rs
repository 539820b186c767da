use crate::op::OpQueue;
use std::time::Duration;

/// The OS readiness source driven by the scheduler.
///
/// The scheduler guarantees that at most one thread calls [`Reactor::run`]
/// at a time (the holder of the poll slot in the operation queue), so an
/// implementation only needs to make `interrupt` callable concurrently
/// with `run`.
pub trait Reactor: Send + Sync {
    /// Drain ready events into `out` as completed operations, with their
    /// task results already set.
    ///
    /// `None` blocks until an event or an interrupt arrives. `Some(d)` waits
    /// at most `d`, and a zero duration must not block at all.
    fn run(&self, timeout: Option<Duration>, out: &mut OpQueue);

    /// Unblock a thread currently inside [`Reactor::run`]. Idempotent; must
    /// not acquire scheduler locks.
    fn interrupt(&self);
}
