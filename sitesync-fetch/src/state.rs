//! Fetch counters threaded through a sync run.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Request bookkeeping for one endpoint, or merged for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncState {
    pub requests: u64,
    pub retries: u64,
    pub pages: u64,
    pub items: u64,
    pub cooldowns: u32,
    /// Failed attempts since the last success; reset by a cooldown.
    #[serde(skip)]
    pub consecutive_failures: u32,
    /// Endpoints that resumed from a checkpoint.
    pub resumed: Vec<String>,
    pub last_fetch_at: Option<DateTime<Utc>>,
}

impl SyncState {
    /// Fold another endpoint's counters into this one.
    pub fn merge(&mut self, other: SyncState) {
        self.requests += other.requests;
        self.retries += other.retries;
        self.pages += other.pages;
        self.items += other.items;
        self.cooldowns += other.cooldowns;
        self.resumed.extend(other.resumed);
        self.last_fetch_at = self.last_fetch_at.max(other.last_fetch_at);
    }
}
