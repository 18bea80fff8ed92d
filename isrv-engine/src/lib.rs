pub mod cache;
pub mod key;
pub mod sweeper;

pub use cache::{CacheEntry, CacheStats, PutOutcome, ResponseCache};
pub use key::CacheKey;
pub use sweeper::SweeperHandle;
