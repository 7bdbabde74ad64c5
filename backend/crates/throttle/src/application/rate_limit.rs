//! Rate Limit Use Case
//!
//! Fixed one-minute windows over a shared persistent counter. Every call
//! increments, including denied ones, so probing the limit is never free.

use std::sync::Arc;

use chrono::Utc;

use crate::application::config::{FailurePolicy, ThrottleConfig};
use crate::domain::entities::RateLimitDecision;
use crate::domain::repository::{AuditSink, RateLimitRepository, SecurityEventType};
use crate::domain::value_objects::{ActorKey, Bucket, FixedWindow};
use crate::error::{ThrottleError, ThrottleResult};

/// Rate Limit Use Case
pub struct RateLimitUseCase<R>
where
    R: RateLimitRepository,
{
    repo: Arc<R>,
    sink: Arc<dyn AuditSink>,
    config: Arc<ThrottleConfig>,
}

impl<R> RateLimitUseCase<R>
where
    R: RateLimitRepository,
{
    pub fn new(repo: Arc<R>, sink: Arc<dyn AuditSink>, config: Arc<ThrottleConfig>) -> Self {
        Self { repo, sink, config }
    }

    /// Soft check: increment and report, letting the caller decide what a
    /// denial means.
    pub async fn check(&self, actor: &ActorKey, bucket: Bucket) -> ThrottleResult<RateLimitDecision> {
        self.check_at(actor, bucket, Utc::now().timestamp_millis())
            .await
    }

    /// Hard check: denial becomes a [`ThrottleError::RateLimitExceeded`],
    /// which renders as 429 with `Retry-After`.
    pub async fn require(
        &self,
        actor: &ActorKey,
        bucket: Bucket,
    ) -> ThrottleResult<RateLimitDecision> {
        self.require_at(actor, bucket, Utc::now().timestamp_millis())
            .await
    }

    pub async fn check_at(
        &self,
        actor: &ActorKey,
        bucket: Bucket,
        now_ms: i64,
    ) -> ThrottleResult<RateLimitDecision> {
        let limit = self.config.limit_for(bucket);
        let window = FixedWindow::containing(now_ms);

        let count = tokio::time::timeout(
            self.config.store_timeout,
            self.repo.increment_and_get(bucket, actor, window.start_ms),
        )
        .await
        .unwrap_or(Err(ThrottleError::StoreTimeout));

        let count = match count {
            Ok(count) => count,
            Err(err) => return self.store_failure(actor, bucket, limit, window, err),
        };

        let decision = RateLimitDecision::evaluate(count, limit, window);

        if !decision.allowed {
            tracing::warn!(
                bucket = %bucket,
                actor = %actor,
                count = decision.count,
                limit,
                "rate limit exceeded"
            );
            self.sink.log_security_event(
                actor,
                SecurityEventType::RateLimitExceeded,
                bucket.as_str(),
                "denied",
            );
        }

        Ok(decision)
    }

    pub async fn require_at(
        &self,
        actor: &ActorKey,
        bucket: Bucket,
        now_ms: i64,
    ) -> ThrottleResult<RateLimitDecision> {
        let decision = self.check_at(actor, bucket, now_ms).await?;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(ThrottleError::RateLimitExceeded {
                limit: decision.limit,
                retry_after_secs: decision.retry_after_secs(now_ms),
                reset_at_ms: decision.reset_at_ms,
            })
        }
    }

    /// Apply the configured policy to a store failure. Only infrastructure
    /// faults land here; a denial is not a failure.
    fn store_failure(
        &self,
        actor: &ActorKey,
        bucket: Bucket,
        limit: u32,
        window: FixedWindow,
        err: ThrottleError,
    ) -> ThrottleResult<RateLimitDecision> {
        match self.config.failure_policy {
            FailurePolicy::FailOpen => {
                tracing::warn!(
                    bucket = %bucket,
                    error = %err,
                    "rate limit store unreachable, allowing request (fail-open)"
                );
                self.sink.log_security_event(
                    actor,
                    SecurityEventType::StoreUnavailable,
                    bucket.as_str(),
                    "allowed_fail_open",
                );
                Ok(RateLimitDecision::fail_open(limit, window))
            }
            FailurePolicy::FailClosed => {
                self.sink.log_security_event(
                    actor,
                    SecurityEventType::StoreUnavailable,
                    bucket.as_str(),
                    "denied_fail_closed",
                );
                Err(err)
            }
        }
    }
}
