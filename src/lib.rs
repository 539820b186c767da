pub mod op;

pub mod reactor;

pub mod scheduler;

mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use op::{Op, OpQueue, Status};
pub use reactor::Reactor;
pub use scheduler::{Builder, ConcurrencyHint, Scheduler};
