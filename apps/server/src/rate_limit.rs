use axum::{
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use dashmap::DashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::models::ApiResponse;

// ── Tiers ──

/// Rate limit tier, one per route group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Read-only public endpoints (snapshot, slots).
    Public,
    /// Booking creation, the strictest tier.
    Booking,
    /// Studio-side endpoints.
    Admin,
}

impl Tier {
    /// Sliding-window budget for the tier.
    fn limit(self) -> (u32, Duration) {
        match self {
            Tier::Public => (60, Duration::from_secs(60)),
            Tier::Booking => (5, Duration::from_secs(300)),
            Tier::Admin => (120, Duration::from_secs(60)),
        }
    }
}

// ── Limiter ──

/// In-memory per-IP sliding-window rate limiter. Keys are (tier, client
/// IP); values are the request timestamps still inside the window.
#[derive(Debug, Clone, Default)]
pub struct RateLimiter {
    hits: Arc<DashMap<(Tier, IpAddr), Vec<Instant>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `Ok(())` when the request is allowed, or the number of
    /// seconds to wait when the tier's budget is exhausted.
    pub fn check(&self, tier: Tier, ip: IpAddr) -> Result<(), u64> {
        let (max_requests, window) = tier.limit();
        let now = Instant::now();

        let mut timestamps = self.hits.entry((tier, ip)).or_default();
        timestamps.retain(|t| now.duration_since(*t) < window);

        if timestamps.len() >= max_requests as usize {
            let oldest = timestamps[0];
            let retry_after = (oldest + window)
                .saturating_duration_since(now)
                .as_secs()
                .max(1);
            return Err(retry_after);
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drop entries idle for longer than twice their tier's window.
    /// Called periodically from a background task.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.hits.retain(|(tier, _ip), timestamps| {
            let (_, window) = tier.limit();
            timestamps.retain(|t| now.duration_since(*t) < window * 2);
            !timestamps.is_empty()
        });
    }
}

// ── IP extraction ──

/// Client IP from X-Forwarded-For (reverse proxy) or ConnectInfo.
pub fn extract_client_ip(req: &Request) -> IpAddr {
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first_ip) = forwarded.split(',').next() {
            if let Ok(ip) = first_ip.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip())
        .unwrap_or_else(|| IpAddr::from([127, 0, 0, 1]))
}

// ── Middleware ──

async fn enforce(limiter: RateLimiter, tier: Tier, req: Request, next: Next) -> Response {
    let ip = extract_client_ip(&req);
    match limiter.check(tier, ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            let body = ApiResponse::<()>::error(format!(
                "Too many requests. Try again in {} seconds",
                retry_after
            ));
            (
                StatusCode::TOO_MANY_REQUESTS,
                [("Retry-After", retry_after.to_string())],
                Json(body),
            )
                .into_response()
        }
    }
}

pub async fn rate_limit_public(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    enforce(limiter, Tier::Public, req, next).await
}

pub async fn rate_limit_booking(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    enforce(limiter, Tier::Booking, req, next).await
}

pub async fn rate_limit_admin(
    State(limiter): State<RateLimiter>,
    req: Request,
    next: Next,
) -> Response {
    enforce(limiter, Tier::Admin, req, next).await
}

// ── Tests ──
