use crate::op::Op;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

// Exports
pub(crate) mod mocks;
pub(crate) use mocks::MockReactor;

/// Handler that bumps `runs` when executed.
pub(crate) fn counting_op(runs: &Arc<AtomicUsize>) -> Box<Op> {
    let runs = Arc::clone(runs);
    Op::new(move |_, _, _| {
        runs.fetch_add(1, Ordering::SeqCst);
    })
}

/// Handler that bumps `runs` when executed and `drops` when destroyed,
/// whether or not it ever ran. Lets tests tell "executed exactly once"
/// apart from "discarded exactly once".
pub(crate) fn probed_op(runs: &Arc<AtomicUsize>, drops: &Arc<AtomicUsize>) -> Box<Op> {
    struct Probe(Arc<AtomicUsize>);

    impl Drop for Probe {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let probe = Probe(Arc::clone(drops));
    let runs = Arc::clone(runs);
    Op::new(move |_, _, _| {
        let _keep = &probe;
        runs.fetch_add(1, Ordering::SeqCst);
    })
}
