//! Stored form of cached responses

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A cached payload together with when it was written and how long it lives.
///
/// Serialized as `{ "data", "timestamp", "expirationTime" }`, both numbers in
/// milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub data: Value,
    pub timestamp: i64,
    pub expiration_time: u64,
}

impl CacheEntry {
    pub fn new(data: Value, timestamp: i64, ttl: Duration) -> Self {
        Self {
            data,
            timestamp,
            expiration_time: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn age_millis(&self, now: i64) -> i64 {
        now.saturating_sub(self.timestamp)
    }

    /// An entry is fresh while `now - timestamp < expirationTime`
    pub fn is_fresh(&self, now: i64) -> bool {
        let age = self.age_millis(now);
        age < 0 || age.unsigned_abs() < self.expiration_time
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.expiration_time)
    }
}

/// Summary of one stored entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntryStatus {
    pub key: String,
    pub timestamp: i64,
    pub expiration_time: u64,
    pub size: usize,
}

/// Summary of everything stored under a cache namespace
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatus {
    pub total_entries: usize,
    pub total_size: usize,
    pub entries: Vec<CacheEntryStatus>,
}

impl FromIterator<CacheEntryStatus> for CacheStatus {
    fn from_iter<I: IntoIterator<Item = CacheEntryStatus>>(iter: I) -> Self {
        let entries: Vec<_> = iter.into_iter().collect();
        Self {
            total_entries: entries.len(),
            total_size: entries.iter().map(|entry| entry.size).sum(),
            entries,
        }
    }
}
