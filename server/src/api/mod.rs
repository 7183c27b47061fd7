use std::net::SocketAddr;

use axum::http::HeaderMap;
use serde::Serialize;

pub mod location;
pub mod session;
pub mod trips;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Caller IP for audit payloads: the first x-forwarded-for hop when a
/// proxy supplied one, otherwise the socket peer.
pub fn client_ip(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}
