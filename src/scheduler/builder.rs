use crate::scheduler::Scheduler;
use anyhow::{Result, anyhow};
use bitflags::bitflags;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Kind {
    SingleThread,
    MultiThread,
}

bitflags! {
    /// Promises the embedding executor makes about how the scheduler will be
    /// driven. They only ever relax internal coordination; an empty set is
    /// always safe.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ConcurrencyHint: u32 {
        /// At most one thread will call the run methods, so peer wakeups can
        /// be skipped and continuations always take the private fast path.
        const SINGLE_THREAD = 1;

        /// The reactor is driven without internal locking. Only sound when a
        /// single thread runs the scheduler, so this promise enables the same
        /// fast paths as [`ConcurrencyHint::SINGLE_THREAD`].
        const UNLOCKED_IO = 1 << 1;
    }
}

#[derive(Debug)]
pub struct Builder {
    kind: Kind,

    /// Expected number of threads driving the scheduler concurrently.
    ///
    /// Defaults to 1 for the single-thread flavor, and to one per CPU core
    /// otherwise.
    concurrency_hint: Option<usize>,

    hints: ConcurrencyHint,
}

impl Builder {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            concurrency_hint: None,
            hints: ConcurrencyHint::empty(),
        }
    }

    /// Returns a new builder promising a single driving thread.
    ///
    /// Configuration methods can be chained on the return value.
    pub fn new_single_thread() -> Builder {
        Builder::new(Kind::SingleThread)
    }

    pub fn new_multi_thread() -> Builder {
        Builder::new(Kind::MultiThread)
    }

    /// Sets the expected number of concurrent driving threads. A hint of 1
    /// enables the same fast paths as the single-thread flavor.
    pub fn concurrency_hint(mut self, val: usize) -> Self {
        self.concurrency_hint = Some(val);
        self
    }

    pub fn hints(mut self, val: ConcurrencyHint) -> Self {
        self.hints |= val;
        self
    }

    /// Creates the configured `Scheduler`.
    ///
    /// The returned scheduler accepts work immediately; it runs no threads
    /// of its own.
    pub fn try_build(self) -> Result<Scheduler> {
        let cfg = self.try_into()?;
        Ok(Scheduler::new(cfg))
    }
}

// Export the builder as a SchedulerConfig object to be consumed by the
// scheduler core.
#[derive(Debug, Clone)]
pub(crate) struct SchedulerConfig {
    pub(crate) kind: Kind,
    pub(crate) concurrency_hint: usize,
    pub(crate) hints: ConcurrencyHint,
}

impl SchedulerConfig {
    fn validate(&self) -> Result<()> {
        if self.concurrency_hint == 0 {
            return Err(anyhow!("concurrency_hint must be greater than 0"));
        }

        Ok(())
    }

    /// True when the configuration promises at most one concurrent worker,
    /// directly or by promising unlocked reactor access.
    pub(crate) fn one_thread(&self) -> bool {
        matches!(self.kind, Kind::SingleThread)
            || self.concurrency_hint == 1
            || self
                .hints
                .intersects(ConcurrencyHint::SINGLE_THREAD | ConcurrencyHint::UNLOCKED_IO)
    }
}

impl TryFrom<Builder> for SchedulerConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let concurrency_hint = match builder.concurrency_hint {
            Some(hint) => hint,
            None => match builder.kind {
                Kind::SingleThread => 1,
                Kind::MultiThread => thread::available_parallelism()?.get(),
            },
        };

        let cfg = SchedulerConfig {
            kind: builder.kind,
            concurrency_hint,
            hints: builder.hints,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use static_assertions::assert_impl_all;

    // The config is cloned into whatever threads the embedding executor
    // spawns.
    assert_impl_all!(SchedulerConfig: Send, Sync, Clone);

    #[test]
    fn test_zero_concurrency_hint_is_rejected() {
        let err = Builder::new_multi_thread().concurrency_hint(0).try_build();
        assert!(err.is_err());
    }

    #[rstest]
    #[case::single_thread_kind(Builder::new_single_thread(), true)]
    #[case::hint_of_one(Builder::new_multi_thread().concurrency_hint(1), true)]
    #[case::single_thread_promise(
        Builder::new_multi_thread()
            .concurrency_hint(4)
            .hints(ConcurrencyHint::SINGLE_THREAD),
        true
    )]
    #[case::unlocked_io_promise(
        Builder::new_multi_thread()
            .concurrency_hint(4)
            .hints(ConcurrencyHint::UNLOCKED_IO),
        true
    )]
    #[case::multi_thread(Builder::new_multi_thread().concurrency_hint(4), false)]
    fn test_one_thread_derivation(#[case] builder: Builder, #[case] one_thread: bool) {
        let cfg: SchedulerConfig = builder.try_into().expect("valid config");
        assert_eq!(cfg.one_thread(), one_thread);
    }
}
