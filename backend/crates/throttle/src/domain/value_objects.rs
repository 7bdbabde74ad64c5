//! Domain Value Objects
//!
//! Buckets, actor keys, fixed-window math and request hashing. Everything
//! here is pure and deterministic; nothing touches the store.

use std::net::IpAddr;

use platform::crypto::{sha256, sha256_hex, to_hex};
use uuid::Uuid;

/// Fixed window length. One minute, by contract; callers that need a
/// different period need a different table.
pub const WINDOW_MS: i64 = 60_000;

/// A named quota domain with its own independent limit and counters.
///
/// The set is closed on purpose: free-form bucket strings let a typo mint
/// an unrelated, untracked bucket. Adding a call site means adding a
/// variant here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bucket {
    Login,
    Registration,
    TradeCreate,
    TradeUpdate,
    AdminApproval,
}

impl Bucket {
    pub const ALL: [Bucket; 5] = [
        Bucket::Login,
        Bucket::Registration,
        Bucket::TradeCreate,
        Bucket::TradeUpdate,
        Bucket::AdminApproval,
    ];

    /// Storage name of the bucket. Stable; persisted in `rate_limits.bucket`.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Bucket::Login => "login",
            Bucket::Registration => "registration",
            Bucket::TradeCreate => "api:trades:create",
            Bucket::TradeUpdate => "api:trades:update",
            Bucket::AdminApproval => "admin:approval",
        }
    }
}

impl std::fmt::Display for Bucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Authenticated principal, inserted into request extensions by the
/// surrounding application's auth middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
}

/// The identity string a quota is tracked against.
///
/// `user:<uuid>` for authenticated callers, `anon:<hash>` otherwise.
/// Derived per request, never persisted beyond the counter rows, and
/// stable across requests from the same caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActorKey(String);

impl ActorKey {
    /// Key for an authenticated principal.
    pub fn for_user(user_id: Uuid) -> Self {
        Self(format!("user:{}", user_id))
    }

    /// Key for an anonymous caller, derived from a hash of the client
    /// address so raw addresses never reach the store.
    pub fn for_anonymous(ip: IpAddr) -> Self {
        let hash = sha256(ip.to_string().as_bytes());
        Self(format!("anon:{}", to_hex(&hash[..16])))
    }

    /// Fallback when no principal and no address could be resolved.
    /// All such callers share one anonymous allowance.
    pub fn unresolved() -> Self {
        Self("anon:unresolved".to_string())
    }

    /// Derive the actor key from whatever identity the request carries.
    /// Total: always returns a non-empty key.
    pub fn resolve(principal: Option<&Principal>, client_ip: Option<IpAddr>) -> Self {
        match (principal, client_ip) {
            (Some(p), _) => Self::for_user(p.user_id),
            (None, Some(ip)) => Self::for_anonymous(ip),
            (None, None) => Self::unresolved(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ActorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A fixed one-minute time slice bounding a counting period.
///
/// A new window is a fresh logical entity with its own row, not a reset
/// of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub start_ms: i64,
}

impl FixedWindow {
    /// The window containing `now_ms` (truncated to the minute).
    pub fn containing(now_ms: i64) -> Self {
        Self {
            start_ms: (now_ms / WINDOW_MS) * WINDOW_MS,
        }
    }

    /// When this window's allowance resets.
    pub fn reset_at_ms(&self) -> i64 {
        self.start_ms + WINDOW_MS
    }
}

/// Hash identifying one logical idempotent operation: the endpoint and the
/// client-supplied key, so the same token on different endpoints never
/// collides.
pub fn idempotency_key_hash(endpoint: &str, client_key: &str) -> String {
    let mut data = Vec::with_capacity(endpoint.len() + 1 + client_key.len());
    data.extend_from_slice(endpoint.as_bytes());
    data.push(0);
    data.extend_from_slice(client_key.as_bytes());
    sha256_hex(&data)
}

/// Hash of the normalized request body.
///
/// JSON bodies are parsed and re-serialized before hashing; `serde_json`'s
/// map keeps keys ordered, so two payloads that differ only in key order
/// hash identically. Non-JSON bodies hash as raw bytes.
pub fn request_body_hash(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => match serde_json::to_vec(&value) {
            Ok(normalized) => sha256_hex(&normalized),
            Err(_) => sha256_hex(body),
        },
        Err(_) => sha256_hex(body),
    }
}
