//! PostgreSQL Repository Implementations
//!
//! Every mutation is a single statement; the database linearizes racing
//! handlers, not application code.

use sqlx::PgPool;

use crate::domain::entities::{CachedResponse, ReserveOutcome};
use crate::domain::repository::{IdempotencyRepository, RateLimitRepository};
use crate::domain::value_objects::{ActorKey, Bucket};
use crate::error::ThrottleResult;

const OLD_WINDOW_MS: i64 = 3600_000; // 1 hour
const IDEMPOTENCY_RETENTION_MS: i64 = 7 * 86_400_000; // 7 days

/// PostgreSQL-backed repository
#[derive(Clone)]
pub struct PgThrottleRepository {
    pool: PgPool,
}

impl PgThrottleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete rate limit windows that ended over an hour ago and
    /// idempotency records past the retention horizon. Startup and
    /// operator use; the hot path never depends on it.
    pub async fn cleanup_expired(&self, now_ms: i64) -> ThrottleResult<(u64, u64)> {
        let windows_deleted = sqlx::query("DELETE FROM rate_limits WHERE window_start_ms < $1")
            .bind(now_ms - OLD_WINDOW_MS)
            .execute(&self.pool)
            .await?
            .rows_affected();

        let records_deleted =
            sqlx::query("DELETE FROM idempotency_keys WHERE updated_at_ms < $1")
                .bind(now_ms - IDEMPOTENCY_RETENTION_MS)
                .execute(&self.pool)
                .await?
                .rows_affected();

        tracing::info!(
            rate_limit_windows = windows_deleted,
            idempotency_records = records_deleted,
            "Cleaned up expired throttle data"
        );

        Ok((windows_deleted, records_deleted))
    }
}

impl RateLimitRepository for PgThrottleRepository {
    async fn increment_and_get(
        &self,
        bucket: Bucket,
        actor: &ActorKey,
        window_start_ms: i64,
    ) -> ThrottleResult<i64> {
        let row = sqlx::query_as::<_, (i32,)>(
            r#"
            INSERT INTO rate_limits (bucket, actor_key, window_start_ms, request_count)
            VALUES ($1, $2, $3, 1)
            ON CONFLICT (bucket, actor_key, window_start_ms)
            DO UPDATE SET request_count = rate_limits.request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(bucket.as_str())
        .bind(actor.as_str())
        .bind(window_start_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(i64::from(row.0))
    }

    async fn clear(&self, bucket: Bucket, actor: Option<&ActorKey>) -> ThrottleResult<u64> {
        let deleted = match actor {
            Some(actor) => {
                sqlx::query("DELETE FROM rate_limits WHERE bucket = $1 AND actor_key = $2")
                    .bind(bucket.as_str())
                    .bind(actor.as_str())
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
            None => {
                sqlx::query("DELETE FROM rate_limits WHERE bucket = $1")
                    .bind(bucket.as_str())
                    .execute(&self.pool)
                    .await?
                    .rows_affected()
            }
        };

        tracing::info!(bucket = %bucket, deleted, "Cleared rate limit counters");
        Ok(deleted)
    }
}

impl IdempotencyRepository for PgThrottleRepository {
    async fn reserve(
        &self,
        key_hash: &str,
        request_hash: &str,
        now_ms: i64,
        reclaim_before_ms: i64,
    ) -> ThrottleResult<ReserveOutcome> {
        // Insert a fresh reservation, or atomically take over one that was
        // abandoned before the reclaim cutoff. Returns a row only when this
        // caller now owns the key.
        let claimed = sqlx::query_as::<_, (String,)>(
            r#"
            INSERT INTO idempotency_keys (key_hash, request_hash, created_at_ms, updated_at_ms)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (key_hash) DO UPDATE
            SET request_hash = EXCLUDED.request_hash,
                created_at_ms = EXCLUDED.created_at_ms,
                updated_at_ms = EXCLUDED.updated_at_ms
            WHERE idempotency_keys.status_code IS NULL
              AND idempotency_keys.created_at_ms < $4
            RETURNING key_hash
            "#,
        )
        .bind(key_hash)
        .bind(request_hash)
        .bind(now_ms)
        .bind(reclaim_before_ms)
        .fetch_optional(&self.pool)
        .await?;

        if claimed.is_some() {
            return Ok(ReserveOutcome::Created);
        }

        // The key is held by an earlier request; classify it.
        let row = sqlx::query_as::<_, IdempotencyRow>(
            r#"
            SELECT request_hash, status_code, response_snapshot
            FROM idempotency_keys
            WHERE key_hash = $1
            "#,
        )
        .bind(key_hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) if row.request_hash != request_hash => Ok(ReserveOutcome::Conflict),
            Some(row) => Ok(row.into_outcome()),
            // Row vanished between the two statements (cleanup or reclaim
            // race); the caller's retry will land on a fresh key.
            None => Ok(ReserveOutcome::InFlight),
        }
    }

    async fn complete(
        &self,
        key_hash: &str,
        status_code: u16,
        response_snapshot: &[u8],
        now_ms: i64,
    ) -> ThrottleResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE idempotency_keys
            SET status_code = $2, response_snapshot = $3, updated_at_ms = $4
            WHERE key_hash = $1 AND status_code IS NULL
            "#,
        )
        .bind(key_hash)
        .bind(i16::try_from(status_code).unwrap_or(500))
        .bind(response_snapshot)
        .bind(now_ms)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Completed records are immutable; this reservation was either
            // finished elsewhere or reclaimed past its TTL.
            tracing::warn!(key_hash, "idempotency record was not completable");
        }

        Ok(())
    }
}

// Internal row type for sqlx mapping
#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    request_hash: String,
    status_code: Option<i16>,
    response_snapshot: Option<Vec<u8>>,
}

impl IdempotencyRow {
    fn into_outcome(self) -> ReserveOutcome {
        match self.status_code {
            Some(code) => ReserveOutcome::Replay(CachedResponse {
                status_code: code as u16,
                body: self.response_snapshot.unwrap_or_default(),
            }),
            None => ReserveOutcome::InFlight,
        }
    }
}
