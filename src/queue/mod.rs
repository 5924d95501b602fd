mod entry;
pub mod pool;

pub use pool::{Breakpoints, PoolOptions, PoolStats, WorkerPolicy, WorkerPool};
