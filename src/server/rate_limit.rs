use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::{debug, warn};

use super::error::ErrorEnvelope;
use super::AppState;
use crate::config::RateLimitConfig;

const THROTTLED: &str = "Too many requests from this IP, please try again later.";
/// Expired windows are swept, at most once per window, once the table holds this many clients.
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: Duration },
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter keyed by client identity.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    prune_threshold: usize,
    table: Mutex<Table>,
}

#[derive(Debug)]
struct Table {
    windows: HashMap<String, Window>,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            prune_threshold: PRUNE_THRESHOLD,
            table: Mutex::new(Table {
                windows: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_secs(config.window_secs))
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> Decision {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let Table {
            windows,
            last_sweep,
        } = &mut *table;

        // At most one sweep per window, however large the table grows
        if windows.len() >= self.prune_threshold
            && now.saturating_duration_since(*last_sweep) >= self.window
        {
            let window = self.window;
            windows.retain(|_, w| now.saturating_duration_since(w.started) < window);
            *last_sweep = now;
            debug!(clients = windows.len(), "swept expired rate limit windows");
        }

        let entry = windows.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.saturating_duration_since(entry.started);
        if elapsed >= self.window {
            *entry = Window {
                started: now,
                count: 0,
            };
        }

        if entry.count >= self.max_requests {
            return Decision::Limited {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }
        entry.count += 1;
        Decision::Allowed {
            remaining: self.max_requests - entry.count,
        }
    }
}

/// Client identity: the hop appended by the fronting proxy, else the peer address.
pub fn client_ip(request: &Request) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.rsplit(',').map(str::trim).find(|hop| !hop.is_empty()));
    if let Some(hop) = forwarded {
        return hop.to_string();
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let ip = client_ip(&request);
    debug!(method = %request.method(), path = %request.uri().path(), ip = %ip, "request");

    match state.limiter.check(&ip) {
        Decision::Allowed { .. } => next.run(request).await,
        Decision::Limited { retry_after } => {
            warn!(ip = %ip, "rate limit exceeded");
            (
                StatusCode::TOO_MANY_REQUESTS,
                [(RETRY_AFTER, retry_after.as_secs().max(1).to_string())],
                Json(ErrorEnvelope {
                    code: "rate_limited",
                    error: THROTTLED.to_string(),
                    detail: None,
                }),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    const FIFTEEN_MINUTES: Duration = Duration::from_secs(15 * 60);

    #[test]
    fn test_hundred_and_first_request_is_limited() {
        let limiter = RateLimiter::new(100, FIFTEEN_MINUTES);
        let start = Instant::now();

        for i in 0..100 {
            let decision = limiter.check_at("10.0.0.1", start + Duration::from_secs(i));
            assert!(matches!(decision, Decision::Allowed { .. }), "request {} was limited", i + 1);
        }
        let decision = limiter.check_at("10.0.0.1", start + Duration::from_secs(100));
        assert!(matches!(decision, Decision::Limited { .. }));
    }

    #[test]
    fn test_clients_are_counted_separately() {
        let limiter = RateLimiter::new(1, FIFTEEN_MINUTES);
        let now = Instant::now();
        assert!(matches!(limiter.check_at("a", now), Decision::Allowed { remaining: 0 }));
        assert!(matches!(limiter.check_at("b", now), Decision::Allowed { .. }));
        assert!(matches!(limiter.check_at("a", now), Decision::Limited { .. }));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(2, FIFTEEN_MINUTES);
        let start = Instant::now();
        limiter.check_at("a", start);
        limiter.check_at("a", start);

        let decision = limiter.check_at("a", start + Duration::from_secs(60));
        assert_eq!(
            decision,
            Decision::Limited {
                retry_after: FIFTEEN_MINUTES - Duration::from_secs(60)
            }
        );

        let decision = limiter.check_at("a", start + FIFTEEN_MINUTES);
        assert_eq!(decision, Decision::Allowed { remaining: 1 });
    }

    #[test]
    fn test_expired_windows_are_swept_once_per_window() {
        let mut limiter = RateLimiter::new(5, Duration::from_secs(60));
        limiter.prune_threshold = 2;
        let tracked = |limiter: &RateLimiter| limiter.table.lock().unwrap().windows.len();
        let start = Instant::now();

        limiter.check_at("a", start);
        limiter.check_at("b", start);
        assert_eq!(tracked(&limiter), 2);

        // a and b have expired, so the sweep leaves only c
        limiter.check_at("c", start + Duration::from_secs(61));
        assert_eq!(tracked(&limiter), 1);

        limiter.check_at("d", start + Duration::from_secs(62));
        // Over the threshold again, but the last sweep was under a window ago
        limiter.check_at("e", start + Duration::from_secs(63));
        assert_eq!(tracked(&limiter), 3);
    }

    #[test]
    fn test_concurrent_checks_count_every_request() {
        let limiter = std::sync::Arc::new(RateLimiter::new(1000, FIFTEEN_MINUTES));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        limiter.check("shared");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(limiter.check("shared"), Decision::Allowed { remaining: 199 });
    }

    #[test]
    fn test_client_ip_prefers_last_forwarded_hop() {
        let request = axum::http::Request::builder()
            .header("x-forwarded-for", "203.0.113.9, 198.51.100.7")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request), "198.51.100.7");
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let mut request = axum::http::Request::builder().body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([192, 0, 2, 4], 4000))));
        assert_eq!(client_ip(&request), "192.0.2.4");

        let bare = axum::http::Request::builder().body(Body::empty()).unwrap();
        assert_eq!(client_ip(&bare), "unknown");
    }
}
