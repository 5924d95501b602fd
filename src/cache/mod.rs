pub mod memoize;
pub mod store;

pub use memoize::{CustomMemoized, Memoized};
pub use store::{parse_rotation_schedule, CacheOptions, CacheStore, KeyPath, DEFAULT_MAX_SIZE};
