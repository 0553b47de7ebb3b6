//! Access control for the HTTP API: an optional bearer key and a per-client
//! request budget.

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header::AUTHORIZATION, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use std::{
    collections::{HashMap, VecDeque},
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

/// Requests per client per minute when `BACKTRACK_RATE_LIMIT` is unset.
pub const DEFAULT_RATE_LIMIT: u32 = 100;

const RATE_WINDOW: Duration = Duration::from_secs(60);

/// How the server guards its project routes.
///
/// Read from the environment by [`SecurityConfig::from_env`]:
/// - `BACKTRACK_API_KEY`: bearer key required on every route but `/health`
/// - `BACKTRACK_CORS_ORIGINS`: comma-separated allowed origins
/// - `BACKTRACK_RATE_LIMIT`: requests per client per minute (needs a key)
/// - `BACKTRACK_TRUST_PROXY`: `true` to identify clients by `X-Forwarded-For`
#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub api_key: Option<String>,
    pub cors_origins: Option<Vec<String>>,
    pub rate_limiter: Option<RateLimiter>,
}

impl SecurityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = lookup("BACKTRACK_API_KEY").filter(|key| !key.is_empty());

        let cors_origins = lookup("BACKTRACK_CORS_ORIGINS").map(|list| {
            list.split(',')
                .map(str::trim)
                .filter(|origin| !origin.is_empty())
                .map(String::from)
                .collect()
        });

        let budget = lookup("BACKTRACK_RATE_LIMIT")
            .and_then(|value| value.parse().ok())
            .unwrap_or(DEFAULT_RATE_LIMIT);
        let trust_proxy = lookup("BACKTRACK_TRUST_PROXY")
            .is_some_and(|value| matches!(value.trim(), "1" | "true" | "yes"));

        // An open local server has nothing to protect a budget for
        let rate_limiter = api_key.as_ref().map(|_| {
            let limiter = RateLimiter::new(budget, RATE_WINDOW);
            if trust_proxy {
                limiter.trusting_forwarded_for()
            } else {
                limiter
            }
        });

        Self {
            api_key,
            cors_origins,
            rate_limiter,
        }
    }

    /// No key, no budget, permissive CORS.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            cors_origins: None,
            rate_limiter: None,
        }
    }

    pub fn with_api_key(key: impl Into<String>) -> Self {
        Self {
            api_key: Some(key.into()),
            ..Self::disabled()
        }
    }

    pub fn with_rate_limit(max_requests: u32) -> Self {
        Self {
            rate_limiter: Some(RateLimiter::new(max_requests, RATE_WINDOW)),
            ..Self::disabled()
        }
    }
}

/// Sliding-window request budget per client address.
///
/// Clients are identified by the peer address of the connection. Forwarding
/// headers are only honoured when the server sits behind a trusted proxy, as
/// any caller can set them. Without a peer address (in-process requests) all
/// callers share one budget.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    trust_forwarded_for: bool,
    clients: Arc<Mutex<HashMap<IpAddr, VecDeque<Instant>>>>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            trust_forwarded_for: false,
            clients: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Identify clients by `X-Forwarded-For` / `X-Real-IP` when present.
    pub fn trusting_forwarded_for(mut self) -> Self {
        self.trust_forwarded_for = true;
        self
    }

    /// Record a request from `client`; false once its budget is spent.
    ///
    /// Clients with no request left inside the window are forgotten, so the
    /// table only holds clients seen during the last window.
    pub fn check(&self, client: IpAddr) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().expect("rate limiter lock poisoned");

        clients.retain(|_, hits| {
            while hits
                .front()
                .is_some_and(|&hit| now.duration_since(hit) >= self.window)
            {
                hits.pop_front();
            }
            !hits.is_empty()
        });

        let hits = clients.entry(client).or_default();
        if hits.len() < self.max_requests as usize {
            hits.push_back(now);
            true
        } else {
            false
        }
    }

    /// Number of clients with requests inside the current window.
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().expect("rate limiter lock poisoned").len()
    }

    fn client_of(&self, request: &Request<Body>) -> IpAddr {
        let forwarded = self
            .trust_forwarded_for
            .then(|| forwarded_client(request))
            .flatten();

        forwarded
            .or_else(|| {
                request
                    .extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(peer)| peer.ip())
            })
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
    }
}

fn forwarded_client(request: &Request<Body>) -> Option<IpAddr> {
    ["X-Forwarded-For", "X-Real-IP"].into_iter().find_map(|name| {
        request
            .headers()
            .get(name)?
            .to_str()
            .ok()?
            .split(',')
            .next()?
            .trim()
            .parse()
            .ok()
    })
}

/// Reject requests without the configured bearer key.
pub async fn require_api_key(
    State(config): State<SecurityConfig>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = config.api_key.as_deref() else {
        return Ok(next.run(request).await);
    };

    let rejection = match bearer_token(&request) {
        Some(token) if token == expected => None,
        Some(_) => Some("wrong API key"),
        None => Some("missing bearer token"),
    };

    match rejection {
        None => Ok(next.run(request).await),
        Some(reason) => {
            tracing::warn!(uri = %request.uri(), "Rejected request: {}", reason);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

fn bearer_token(request: &Request<Body>) -> Option<&str> {
    request
        .headers()
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Answer `429 Too Many Requests` once a client has spent its budget.
pub async fn enforce_rate_limit(
    State(limiter): State<RateLimiter>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let client = limiter.client_of(&request);

    if limiter.check(client) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(%client, "Rate limit exceeded");
        Err(StatusCode::TOO_MANY_REQUESTS)
    }
}
