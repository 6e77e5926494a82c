//! Fixed-window request limiting keyed by client IP.
//!
//! Every response passing through a limiter carries `RateLimit-Limit`,
//! `RateLimit-Remaining` and `RateLimit-Reset`; rejected requests also get
//! `Retry-After`.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;

const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Prune expired windows once the table grows past this many clients.
const PRUNE_AT: usize = 10_000;

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

struct Window {
    started: Instant,
    count: u32,
}

/// Result of counting one request against its client's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window closes.
    pub reset: Duration,
}

pub struct RateLimiter {
    max: u32,
    window: Duration,
    skip_successful: bool,
    message: &'static str,
    clients: Mutex<HashMap<IpAddr, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window: Duration, message: &'static str) -> Self {
        Self {
            max,
            window,
            skip_successful: false,
            message,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Stop counting requests that end in a non-error status.
    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    /// Applied to every route.
    pub fn general() -> Self {
        Self::new(
            100,
            WINDOW,
            "Too many requests from this IP, please try again later.",
        )
    }

    /// Applied to register and login; only failed attempts count.
    pub fn auth() -> Self {
        Self::new(
            5,
            WINDOW,
            "Too many authentication attempts, please try again later.",
        )
        .skip_successful()
    }

    /// Count a request from `ip` arriving at `now`.
    pub fn check(&self, ip: IpAddr, now: Instant) -> Admission {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);

        if clients.len() >= PRUNE_AT {
            let window = self.window;
            clients.retain(|_, w| now.duration_since(w.started) < window);
        }

        let entry = clients.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(entry.started) >= self.window {
            entry.started = now;
            entry.count = 0;
        }
        entry.count = entry.count.saturating_add(1);

        Admission {
            allowed: entry.count <= self.max,
            limit: self.max,
            remaining: self.max.saturating_sub(entry.count),
            reset: self
                .window
                .saturating_sub(now.duration_since(entry.started)),
        }
    }

    /// Take back one request counted against `ip`.
    pub fn refund(&self, ip: IpAddr) {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(window) = clients.get_mut(&ip) {
            window.count = window.count.saturating_sub(1);
        }
    }
}

/// Middleware: admit or reject the request against the limiter in state.
pub async fn enforce(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(&req);
    let admission = limiter.check(ip, Instant::now());

    if !admission.allowed {
        warn!("Rate limit exceeded for {}", ip);
        let mut res = ApiError::TooManyRequests(limiter.message).into_response();
        let headers = res.headers_mut();
        set_headers(headers, &admission);
        headers.insert(header::RETRY_AFTER, HeaderValue::from(reset_secs(&admission)));
        return res;
    }

    let mut res = next.run(req).await;

    let mut admission = admission;
    if limiter.skip_successful && res.status().as_u16() < 400 {
        limiter.refund(ip);
        admission.remaining = admission.remaining.saturating_add(1).min(admission.limit);
    }
    set_headers(res.headers_mut(), &admission);
    res
}

/// Peer address from `ConnectInfo`; requests built without one (tests)
/// share the unspecified address.
fn client_ip(req: &Request) -> IpAddr {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

fn reset_secs(admission: &Admission) -> u64 {
    admission.reset.as_secs_f64().ceil() as u64
}

/// An inner limiter's headers win over an outer one's.
fn set_headers(headers: &mut HeaderMap, admission: &Admission) {
    headers
        .entry(RATELIMIT_LIMIT)
        .or_insert(HeaderValue::from(admission.limit));
    headers
        .entry(RATELIMIT_REMAINING)
        .or_insert(HeaderValue::from(admission.remaining));
    headers
        .entry(RATELIMIT_RESET)
        .or_insert(HeaderValue::from(reset_secs(admission)));
}
