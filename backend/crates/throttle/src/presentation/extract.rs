//! Request Extraction
//!
//! Bridges HTTP request parts to domain identities.

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderMap, Request};
use platform::client::extract_client_ip;
use std::net::SocketAddr;

use crate::domain::value_objects::{ActorKey, Principal};

/// Header carrying the client-supplied idempotency token.
pub const IDEMPOTENCY_KEY_HEADER: &str = "idempotency-key";

/// Resolve the actor key for a request: authenticated principal if the
/// auth middleware put one in the extensions, hashed client address
/// otherwise. Total; an unresolvable caller shares the anonymous fallback.
pub fn resolve_actor(req: &Request<Body>) -> ActorKey {
    let principal = req.extensions().get::<Principal>();
    let direct_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip());
    let client_ip = extract_client_ip(req.headers(), direct_ip);

    ActorKey::resolve(principal, client_ip)
}

/// The idempotency token, if the client sent a non-empty one. Absent
/// header means the operation runs unprotected.
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
