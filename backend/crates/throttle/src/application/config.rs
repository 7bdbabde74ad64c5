//! Application Configuration

use std::time::Duration;

use crate::domain::value_objects::Bucket;

/// Behavior when the store cannot be reached during a rate limit check.
///
/// Either way the behavior is named and tested, never an accident of
/// error propagation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Allow the request and log; a storage outage must not take down
    /// unrelated traffic.
    FailOpen,
    /// Deny with 503; nothing passes uncounted.
    FailClosed,
}

/// Throttle layer configuration
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Per-minute limit for sign-in attempts
    pub login_limit: u32,
    /// Per-minute limit for account registration
    pub registration_limit: u32,
    /// Per-minute limit for creating trade entries
    pub trade_create_limit: u32,
    /// Per-minute limit for editing trade entries
    pub trade_update_limit: u32,
    /// Per-minute limit for admin approval actions
    pub admin_approval_limit: u32,
    /// Policy when the store is unreachable
    pub failure_policy: FailurePolicy,
    /// How long an uncompleted idempotency reservation stays claimed
    /// before a retry may take it over
    pub reservation_ttl: Duration,
    /// Deadline for any single store call
    pub store_timeout: Duration,
    /// Largest request body the idempotency gate will buffer
    pub max_body_bytes: usize,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            login_limit: 5,
            registration_limit: 3,
            trade_create_limit: 30,
            trade_update_limit: 30,
            admin_approval_limit: 10,
            failure_policy: FailurePolicy::FailOpen,
            // Generous on purpose: premature reclaim double-executes,
            // while a wedged key only lasts a day
            reservation_ttl: Duration::from_secs(24 * 3600),
            store_timeout: Duration::from_secs(2),
            max_body_bytes: 256 * 1024,
        }
    }
}

impl ThrottleConfig {
    /// Limit for a bucket. Exhaustive over the closed bucket set.
    pub fn limit_for(&self, bucket: Bucket) -> u32 {
        match bucket {
            Bucket::Login => self.login_limit,
            Bucket::Registration => self.registration_limit,
            Bucket::TradeCreate => self.trade_create_limit,
            Bucket::TradeUpdate => self.trade_update_limit,
            Bucket::AdminApproval => self.admin_approval_limit,
        }
    }

    /// Startup validation: every bucket needs a usable limit.
    pub fn validate(&self) -> Result<(), String> {
        for bucket in Bucket::ALL {
            if self.limit_for(bucket) == 0 {
                return Err(format!("bucket {} has a zero limit", bucket));
            }
        }
        if self.store_timeout.is_zero() {
            return Err("store_timeout must be non-zero".to_string());
        }
        if self.reservation_ttl.is_zero() {
            return Err("reservation_ttl must be non-zero".to_string());
        }
        Ok(())
    }

    pub fn reservation_ttl_ms(&self) -> i64 {
        self.reservation_ttl.as_millis() as i64
    }
}
