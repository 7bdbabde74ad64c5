//! Idempotency Guard Use Case
//!
//! Wraps one mutating operation: reserve the key, execute at most once,
//! cache the outcome. Replays are served from the cache; a reused key with
//! a different payload is rejected and never cached.

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;

use crate::application::config::ThrottleConfig;
use crate::domain::entities::{CachedResponse, ReserveOutcome};
use crate::domain::repository::{AuditSink, IdempotencyRepository, SecurityEventType};
use crate::domain::value_objects::{ActorKey, idempotency_key_hash, request_body_hash};
use crate::error::{ThrottleError, ThrottleResult};

/// Idempotency Guard Use Case
pub struct IdempotencyGuard<R>
where
    R: IdempotencyRepository,
{
    repo: Arc<R>,
    sink: Arc<dyn AuditSink>,
    config: Arc<ThrottleConfig>,
}

impl<R> IdempotencyGuard<R>
where
    R: IdempotencyRepository,
{
    pub fn new(repo: Arc<R>, sink: Arc<dyn AuditSink>, config: Arc<ThrottleConfig>) -> Self {
        Self { repo, sink, config }
    }

    pub fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Run `op` at most once for this `(endpoint, client_key)` pair.
    ///
    /// - First sighting: `op` runs, its outcome is cached and returned.
    /// - Replay with the same payload: the cached outcome is returned
    ///   verbatim and `op` never runs.
    /// - Same key, different payload: [`ThrottleError::IdempotencyConflict`].
    /// - Same key while the first request is still executing:
    ///   [`ThrottleError::OperationInFlight`].
    pub async fn execute<F, Fut>(
        &self,
        actor: &ActorKey,
        endpoint: &str,
        client_key: &str,
        body: &[u8],
        op: F,
    ) -> ThrottleResult<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ThrottleResult<CachedResponse>>,
    {
        self.execute_at(
            actor,
            endpoint,
            client_key,
            body,
            Utc::now().timestamp_millis(),
            op,
        )
        .await
    }

    pub async fn execute_at<F, Fut>(
        &self,
        actor: &ActorKey,
        endpoint: &str,
        client_key: &str,
        body: &[u8],
        now_ms: i64,
        op: F,
    ) -> ThrottleResult<CachedResponse>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ThrottleResult<CachedResponse>>,
    {
        let key_hash = idempotency_key_hash(endpoint, client_key);
        let request_hash = request_body_hash(body);
        let reclaim_before_ms = now_ms - self.config.reservation_ttl_ms();

        let outcome = tokio::time::timeout(
            self.config.store_timeout,
            self.repo
                .reserve(&key_hash, &request_hash, now_ms, reclaim_before_ms),
        )
        .await
        .unwrap_or(Err(ThrottleError::StoreTimeout))?;

        match outcome {
            ReserveOutcome::Created => {
                let response = op().await?;
                self.persist_outcome(&key_hash, &response, now_ms).await;
                Ok(response)
            }
            ReserveOutcome::Replay(cached) => {
                tracing::debug!(endpoint, "idempotent replay served from cache");
                Ok(cached)
            }
            ReserveOutcome::InFlight => {
                self.sink.log_security_event(
                    actor,
                    SecurityEventType::IdempotencyConflict,
                    endpoint,
                    "in_flight",
                );
                Err(ThrottleError::OperationInFlight)
            }
            ReserveOutcome::Conflict => {
                tracing::warn!(
                    endpoint,
                    actor = %actor,
                    "idempotency key reused with a different payload"
                );
                self.sink.log_security_event(
                    actor,
                    SecurityEventType::IdempotencyConflict,
                    endpoint,
                    "conflict",
                );
                Err(ThrottleError::IdempotencyConflict)
            }
        }
    }

    /// The operation already ran; failing to cache its outcome must not
    /// fail the request. An uncached reservation is reclaimed after the
    /// TTL and the client's retry re-executes.
    async fn persist_outcome(&self, key_hash: &str, response: &CachedResponse, now_ms: i64) {
        let result = tokio::time::timeout(
            self.config.store_timeout,
            self.repo
                .complete(key_hash, response.status_code, &response.body, now_ms),
        )
        .await
        .unwrap_or(Err(ThrottleError::StoreTimeout));

        if let Err(err) = result {
            tracing::error!(
                error = %err,
                "failed to persist idempotency outcome; key stays reserved until TTL"
            );
        }
    }
}
