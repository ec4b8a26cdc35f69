//! Per-principal rate limiting (§4.7). Keyed on `user:{id}` when a caller
//! identifies itself, else `ip:{addr}` — preferring the first hop of
//! `X-Forwarded-For` over the raw connection address, since the service
//! typically sits behind a load balancer.
//!
//! The previous version of this middleware accepted a configured limiter
//! but never actually consulted it before letting requests through; this
//! one calls `check_key` on every request and returns a real `429`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use governor::{Quota, RateLimiter};

use crate::constants::RATE_LIMIT_PER_MINUTE;
use crate::error::ResearchError;

type KeyedLimiter = RateLimiter<String, governor::state::keyed::DefaultKeyedStateStore<String>, governor::clock::DefaultClock>;

#[derive(Clone)]
pub struct RateLimitState {
    limiter: Arc<KeyedLimiter>,
}

impl RateLimitState {
    pub fn new() -> Self {
        let per_minute = std::num::NonZeroU32::new(RATE_LIMIT_PER_MINUTE)
            .expect("RATE_LIMIT_PER_MINUTE must be nonzero");
        let quota = Quota::per_minute(per_minute).allow_burst(per_minute);
        Self {
            limiter: Arc::new(RateLimiter::keyed(quota)),
        }
    }
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

fn rate_limit_key(request: &Request, addr: Option<SocketAddr>) -> String {
    if let Some(user_id) = request
        .headers()
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
    {
        return format!("user:{user_id}");
    }

    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_hop) = forwarded.split(',').next() {
            let ip = first_hop.trim();
            if !ip.is_empty() {
                return format!("ip:{ip}");
            }
        }
    }

    match addr {
        Some(addr) => format!("ip:{}", addr.ip()),
        None => "ip:unknown".to_string(),
    }
}

pub async fn rate_limit_layer(
    State(state): State<RateLimitState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
    next: Next,
) -> Result<Response, ResearchError> {
    let key = rate_limit_key(&request, connect_info.map(|c| c.0));

    match state.limiter.check_key(&key) {
        Ok(()) => Ok(next.run(request).await),
        Err(not_until) => {
            let retry_after = not_until.wait_time_from(governor::clock::DefaultClock::default().now());
            Err(ResearchError::RateLimited {
                retry_after_secs: retry_after.as_secs().max(1),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn rate_limit_key_prefers_user_header() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-user-id", HeaderValue::from_static("alice"));
        assert_eq!(rate_limit_key(&request, None), "user:alice");
    }

    #[test]
    fn rate_limit_key_uses_first_hop_of_forwarded_for() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.5, 10.0.0.1"),
        );
        assert_eq!(rate_limit_key(&request, None), "ip:203.0.113.5");
    }

    #[test]
    fn rate_limit_key_falls_back_to_connection_addr() {
        let request = Request::new(axum::body::Body::empty());
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        assert_eq!(rate_limit_key(&request, Some(addr)), "ip:127.0.0.1");
    }

    #[tokio::test]
    async fn limiter_allows_then_rejects_past_quota() {
        let state = RateLimitState::new();
        for _ in 0..RATE_LIMIT_PER_MINUTE {
            assert!(state.limiter.check_key(&"user:bob".to_string()).is_ok());
        }
        assert!(state.limiter.check_key(&"user:bob".to_string()).is_err());
    }
}
