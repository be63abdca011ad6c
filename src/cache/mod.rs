//! Response cache invalidation across the fleet.
//!
//! When one host evicts response cache entries, it announces the requested
//! keys on the cache channel and every other host drops the same keys from its
//! own cache. Messages carry the publishing host so nobody reacts to its own
//! announcements.

mod invalidation;
mod store;

pub use invalidation::{CacheInvalidationListener, CacheInvalidator};
pub use store::{MemoryCache, ResponseCache};
