//! Request Throttling and Replay Protection
//!
//! Clean Architecture structure:
//! - `domain/` - Buckets, actor keys, window math, repository traits
//! - `application/` - Rate limit and idempotency use cases
//! - `infra/` - PostgreSQL implementations
//! - `presentation/` - HTTP middleware and envelopes
//!
//! ## Coordination Model
//! - Request handlers share no process memory; every counter and every
//!   idempotency reservation lives in the shared store
//! - All mutation happens through single-statement atomics (insert-or-increment,
//!   insert-or-reclaim); there is no read-modify-write on the hot path
//! - Fixed one-minute windows, chosen for O(1) storage per actor per window;
//!   a caller can burst up to ~2x the limit across a window boundary and
//!   that tradeoff is deliberate
//! - Store calls carry a short timeout and a named fail-open/fail-closed policy

pub mod application;
pub mod domain;
pub mod error;
pub mod infra;
pub mod presentation;

// Re-exports for convenience
pub use application::config::{FailurePolicy, ThrottleConfig};
pub use application::idempotency::IdempotencyGuard;
pub use application::rate_limit::RateLimitUseCase;
pub use domain::repository::{AuditSink, SecurityEventType, TracingAuditSink};
pub use domain::value_objects::{ActorKey, Bucket, Principal};
pub use error::{ThrottleError, ThrottleResult};
pub use infra::postgres::PgThrottleRepository;
pub use presentation::middleware::{
    IdempotencyState, RateLimitState, enforce_rate_limit, idempotency_gate,
};

// Re-export kernel error types for unified error handling
pub use kernel::error::{
    app_error::{AppError, AppResult, OptionExt, ResultExt},
    kind::ErrorKind,
};
