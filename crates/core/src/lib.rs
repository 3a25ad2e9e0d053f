//! Portal core types and utilities
//!
//! Storage, clock and data types shared by the portal HTTP client and its
//! persistent store backends.

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod session;
pub mod store;
pub mod tracing;

#[cfg(any(test, feature = "tests"))]
pub mod tests;

pub use cache::{CacheEntry, CacheEntryStatus, CacheStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheSettings, ClientSettings, EndpointSettings, SessionSettings};
pub use errors::{Error, Result};
pub use session::{Session, SessionKeys, UserProfile};
pub use store::{KeyValueStore, MemoryStore};
