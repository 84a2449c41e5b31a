//! Per-endpoint rate limiting for the FishFish API
//!
//! Reactive: a limiter only starts throttling after its endpoint has answered
//! with a 429. Token creation is throttled far harder than bulk reads.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, Ordering};

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use log::debug;

/// Categories of API endpoints with their rate limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointCategory {
    /// /users/@me/tokens (POST) - 10/min
    Tokens,
    /// /domains* - 6 req/sec
    Domains,
    /// /urls* - 6 req/sec
    Urls,
    /// Everything else - 6 req/sec
    Default,
}

impl EndpointCategory {
    pub const ALL: [EndpointCategory; 4] = [
        EndpointCategory::Tokens,
        EndpointCategory::Domains,
        EndpointCategory::Urls,
        EndpointCategory::Default,
    ];

    /// Categorize a request by its path (without base URL) and method.
    pub fn from_request(path: &str, method: &reqwest::Method) -> Self {
        let path = path.strip_prefix("/v1").unwrap_or(path);

        if path.starts_with("/users/") && path.ends_with("/tokens") && *method == reqwest::Method::POST
        {
            return EndpointCategory::Tokens;
        }

        if path.starts_with("/domains") {
            return EndpointCategory::Domains;
        }

        if path.starts_with("/urls") {
            return EndpointCategory::Urls;
        }

        EndpointCategory::Default
    }

    /// Requests per second allowed once throttling is active.
    pub fn rate_limit(&self) -> f64 {
        match self {
            EndpointCategory::Tokens => 0.167, // 10 per minute
            EndpointCategory::Domains => 6.0,
            EndpointCategory::Urls => 6.0,
            EndpointCategory::Default => 6.0,
        }
    }
}

/// Rate limiter state for a single endpoint category.
pub struct EndpointRateLimiter {
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    active: AtomicBool,
    category: EndpointCategory,
}

impl EndpointRateLimiter {
    pub fn new(category: EndpointCategory) -> Self {
        let rate = category.rate_limit();

        // Sub-1 rates are expressed per minute
        let quota = if rate >= 1.0 {
            Quota::per_second(NonZeroU32::new(rate as u32).unwrap_or(NonZeroU32::MIN))
        } else {
            let per_min = (rate * 60.0).round() as u32;
            Quota::per_minute(NonZeroU32::new(per_min).unwrap_or(NonZeroU32::MIN))
        };

        Self {
            limiter: RateLimiter::direct(quota),
            active: AtomicBool::new(false),
            category,
        }
    }

    pub fn activate(&self) {
        let was_active = self.active.swap(true, Ordering::SeqCst);
        if !was_active {
            debug!("Rate limiting activated for {:?}", self.category);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait for permission if rate limiting is active.
    pub async fn wait_if_active(&self) {
        if self.is_active() {
            debug!("Waiting for rate limiter {:?}", self.category);
            self.limiter.until_ready().await;
        }
    }
}

/// Collection of rate limiters for all endpoint categories.
pub struct RateLimiterSet {
    limiters: HashMap<EndpointCategory, EndpointRateLimiter>,
}

impl Default for RateLimiterSet {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterSet {
    pub fn new() -> Self {
        let limiters = EndpointCategory::ALL
            .into_iter()
            .map(|category| (category, EndpointRateLimiter::new(category)))
            .collect();

        Self { limiters }
    }

    pub async fn wait_for(&self, category: EndpointCategory) {
        if let Some(limiter) = self.limiters.get(&category) {
            limiter.wait_if_active().await;
        }
    }

    /// Activate rate limiting for a category (called on 429).
    pub fn activate(&self, category: EndpointCategory) {
        if let Some(limiter) = self.limiters.get(&category) {
            limiter.activate();
        }
    }

    pub fn is_active(&self, category: EndpointCategory) -> bool {
        self.limiters
            .get(&category)
            .is_some_and(EndpointRateLimiter::is_active)
    }
}
