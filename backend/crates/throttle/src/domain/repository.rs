//! Repository Traits
//!
//! Interfaces for data persistence. Implementations live in the
//! infrastructure layer; in-memory fakes live in the tests.
//!
//! Handlers share no process memory, so these primitives are the only
//! synchronization points. Each mutating call must be a single atomic
//! statement on the implementing store.

use crate::domain::entities::ReserveOutcome;
use crate::domain::value_objects::{ActorKey, Bucket};
use crate::error::ThrottleResult;

/// Rate limit counter repository
#[trait_variant::make(RateLimitRepository: Send)]
pub trait LocalRateLimitRepository {
    /// Insert the `(bucket, actor, window)` row with count 1 if absent,
    /// otherwise increment it, and return the post-increment count.
    /// One statement; two racing processes end with one row reflecting
    /// both increments.
    async fn increment_and_get(
        &self,
        bucket: Bucket,
        actor: &ActorKey,
        window_start_ms: i64,
    ) -> ThrottleResult<i64>;

    /// Delete counters for a bucket, optionally narrowed to one actor.
    /// Operator and test use only; never on the request hot path.
    async fn clear(&self, bucket: Bucket, actor: Option<&ActorKey>) -> ThrottleResult<u64>;
}

/// Idempotency record repository
#[trait_variant::make(IdempotencyRepository: Send)]
pub trait LocalIdempotencyRepository {
    /// Try to claim `key_hash` for this request. The unique constraint on
    /// `key_hash` is the sole synchronization primitive: exactly one of
    /// two racing callers observes [`ReserveOutcome::Created`].
    ///
    /// Reservations older than `reclaim_before_ms` that never completed
    /// are re-claimed atomically in the same statement.
    async fn reserve(
        &self,
        key_hash: &str,
        request_hash: &str,
        now_ms: i64,
        reclaim_before_ms: i64,
    ) -> ThrottleResult<ReserveOutcome>;

    /// Persist the terminal outcome for a previously created reservation.
    /// A record that already completed is left untouched.
    async fn complete(
        &self,
        key_hash: &str,
        status_code: u16,
        response_snapshot: &[u8],
        now_ms: i64,
    ) -> ThrottleResult<()>;
}

/// Security event classification for the audit collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEventType {
    RateLimitExceeded,
    IdempotencyConflict,
    StoreUnavailable,
}

impl SecurityEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::IdempotencyConflict => "idempotency_conflict",
            SecurityEventType::StoreUnavailable => "store_unavailable",
        }
    }
}

/// External audit collaborator. Called on every denial and conflict;
/// storage and retention are not this layer's concern.
pub trait AuditSink: Send + Sync {
    fn log_security_event(
        &self,
        actor: &ActorKey,
        event_type: SecurityEventType,
        subject: &str,
        outcome: &str,
    );
}

/// Default sink: structured tracing events, picked up by whatever
/// subscriber the binary installs.
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_security_event(
        &self,
        actor: &ActorKey,
        event_type: SecurityEventType,
        subject: &str,
        outcome: &str,
    ) {
        tracing::warn!(
            actor = %actor,
            event = event_type.as_str(),
            subject,
            outcome,
            "security event"
        );
    }
}
