//! Domain Entities

use serde::Serialize;

use crate::domain::value_objects::FixedWindow;

/// Outcome of one rate limit check.
///
/// Produced for every call, allowed or denied; the counter has already
/// been incremented by the time this exists.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Position of this request within the window, 1-based
    pub count: i64,
    pub limit: u32,
    pub remaining: u32,
    /// When the current window's allowance resets (epoch millis)
    pub reset_at_ms: i64,
}

impl RateLimitDecision {
    /// Evaluate a post-increment count against the limit.
    pub fn evaluate(count: i64, limit: u32, window: FixedWindow) -> Self {
        Self {
            allowed: count <= i64::from(limit),
            count,
            limit,
            remaining: (i64::from(limit) - count).max(0) as u32,
            reset_at_ms: window.reset_at_ms(),
        }
    }

    /// Decision handed out when the store is unreachable under the
    /// fail-open policy: the request passes and nothing was counted.
    pub fn fail_open(limit: u32, window: FixedWindow) -> Self {
        Self {
            allowed: true,
            count: 0,
            limit,
            remaining: limit,
            reset_at_ms: window.reset_at_ms(),
        }
    }

    /// Whole seconds until the window resets, rounded up. Never zero for
    /// a denied request inside its window.
    pub fn retry_after_secs(&self, now_ms: i64) -> u64 {
        let delta = (self.reset_at_ms - now_ms).max(0);
        (delta as u64).div_ceil(1000)
    }
}

/// Snapshot of a completed response, stored verbatim so a replay can be
/// served byte-identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status_code: u16,
    pub body: Vec<u8>,
}

/// Result of attempting to reserve an idempotency key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReserveOutcome {
    /// No usable record existed; this request owns the key and must run
    /// the operation. Covers both a fresh key and a reservation abandoned
    /// past its TTL.
    Created,
    /// The operation already completed with the same payload; serve the
    /// stored response without executing anything.
    Replay(CachedResponse),
    /// A request with the same key and payload is still executing.
    InFlight,
    /// The key was reused with a different payload. Never cached.
    Conflict,
}
