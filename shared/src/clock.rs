//! Translation of absolute server timestamps into a client's local time base.
//!
//! There is no offset handshake. A translator is built fresh at every message
//! boundary from the client's local clock and its estimate of "server now"
//! (its own wall clock), so drift is overwritten on each update rather than
//! accumulated.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Wall clock in seconds since the Unix epoch.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs_f64()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTranslator {
    local_now: f64,
    server_now_estimate: f64,
}

impl ClockTranslator {
    pub fn new(local_now: f64, server_now_estimate: f64) -> Self {
        Self {
            local_now,
            server_now_estimate,
        }
    }

    /// Uses the wall clock as the server-time estimate.
    pub fn at(local_now: f64) -> Self {
        Self::new(local_now, now_secs())
    }

    /// `local_now + max(0, server_ts - server_now_estimate)`.
    ///
    /// A zero timestamp is the wire marker for "expired" and stays zero.
    pub fn to_local(&self, server_ts: f64) -> f64 {
        if server_ts <= 0.0 {
            return 0.0;
        }
        self.local_now + (server_ts - self.server_now_estimate).max(0.0)
    }

    /// Remaining seconds until `server_ts`, as seen from this client.
    pub fn remaining(&self, server_ts: f64) -> f64 {
        (self.to_local(server_ts) - self.local_now).max(0.0)
    }
}
