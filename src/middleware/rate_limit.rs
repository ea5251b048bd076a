use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use crate::{config::Settings, error::ApiError};

/// Per-client request budget for the write endpoints.
pub struct IpRateLimiter {
    limiter: DefaultKeyedRateLimiter<IpAddr>,
}

impl IpRateLimiter {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.rate_limit_requests,
            Duration::from_secs(u64::from(settings.rate_limit_window_seconds)),
        )
    }

    /// Allow `requests` per `window` per client; at least one request is always allowed.
    pub fn new(requests: u32, window: Duration) -> Self {
        let requests_per_window = NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN);
        let window = window.max(Duration::from_secs(1));
        let period = (window / requests_per_window.get()).max(Duration::from_millis(1));

        let quota = Quota::with_period(period)
            .unwrap_or_else(|| Quota::per_second(requests_per_window))
            .allow_burst(requests_per_window);

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    pub fn check_ip(&self, ip: IpAddr) -> bool {
        self.limiter.check_key(&ip).is_ok()
    }
}

/// Extract client IP from proxy headers
fn extract_client_ip(headers: &HeaderMap) -> Option<IpAddr> {
    // Take the first IP in the X-Forwarded-For chain
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|first| first.trim().parse::<IpAddr>().ok())
    {
        return Some(ip);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<IpAddr>().ok())
}

fn client_ip(request: &Request) -> IpAddr {
    extract_client_ip(request.headers())
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// IP-based rate limiting middleware
pub async fn ip_rate_limit_middleware(
    State(ip_limiter): State<Arc<IpRateLimiter>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&request);

    if ip_limiter.check_ip(ip) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(client_ip = %ip, uri = %request.uri(), "rate limit exceeded");
        Err(ApiError::rate_limit("Too many requests, please slow down"))
    }
}
