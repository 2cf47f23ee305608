use std::{
    net::IpAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{config::RateLimitConfig, error::ServiceError, state::AppState};

/// Characters of a bearer credential used as its bucket key.
const CREDENTIAL_KEY_PREFIX: usize = 12;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: u32,
    refilled_at: Instant,
}

/// Bucket key and allowance of one caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateKey {
    /// `key:<credential prefix>` or `ip:<address>`.
    pub key: String,
    /// Requests allowed per window.
    pub limit: u32,
}

/// Fixed-window request budget per caller.
///
/// One instance lives in the shared state for the whole process.
#[derive(Debug)]
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    policy: RateLimitConfig,
}

impl RateLimiter {
    /// Create an empty limiter enforcing `policy`.
    pub fn new(policy: RateLimitConfig) -> Self {
        Self {
            buckets: DashMap::new(),
            policy,
        }
    }

    /// Policy this limiter enforces.
    pub fn policy(&self) -> RateLimitConfig {
        self.policy
    }

    /// Derive the bucket of a caller. Credential holders are keyed by a prefix of
    /// their credential, everyone else by network address.
    pub fn key_for(
        &self,
        bearer: Option<&str>,
        forwarded_for: Option<&str>,
        peer: Option<IpAddr>,
    ) -> RateKey {
        if let Some(credential) = bearer {
            let prefix: String = credential.chars().take(CREDENTIAL_KEY_PREFIX).collect();
            return RateKey {
                key: format!("key:{prefix}"),
                limit: self.policy.bot_limit,
            };
        }

        let forwarded = forwarded_for
            .and_then(|header| header.split(',').next())
            .map(str::trim)
            .filter(|address| !address.is_empty())
            .map(str::to_owned);
        let address = forwarded
            .or_else(|| peer.map(|ip| ip.to_string()))
            .unwrap_or_else(|| "unknown".to_owned());
        RateKey {
            key: format!("ip:{address}"),
            limit: self.policy.default_limit,
        }
    }

    /// Consume one request from the caller's bucket.
    pub fn check(&self, key: &RateKey) -> Result<(), ServiceError> {
        self.check_at(key, Instant::now()).map_err(|retry_after| {
            warn!(key = %key.key, retry_after_secs = retry_after.as_secs(), "rate limit exceeded");
            ServiceError::RateLimited { retry_after }
        })
    }

    fn check_at(&self, key: &RateKey, now: Instant) -> Result<(), Duration> {
        let window = self.policy.window;
        let mut bucket = self.buckets.entry(key.key.clone()).or_insert(Bucket {
            tokens: key.limit,
            refilled_at: now,
        });

        let elapsed = now.saturating_duration_since(bucket.refilled_at);
        if elapsed >= window {
            bucket.tokens = key.limit;
            bucket.refilled_at = now;
        }

        if bucket.tokens == 0 {
            let remaining = window.saturating_sub(elapsed);
            let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
            return Err(Duration::from_secs(secs.max(1)));
        }

        bucket.tokens -= 1;
        Ok(())
    }

    /// Drop buckets not refilled for more than two windows. Returns how many were dropped.
    pub fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> usize {
        let idle_after = self.policy.window * 2;
        let before = self.buckets.len();
        self.buckets
            .retain(|_, bucket| now.saturating_duration_since(bucket.refilled_at) <= idle_after);
        before.saturating_sub(self.buckets.len())
    }

    /// Number of live buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether no bucket is tracked.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// Periodically evict idle buckets until the shared state is dropped.
pub fn spawn_cleanup(state: &Arc<AppState>) {
    let weak = Arc::downgrade(state);
    let every = state.rate_limiter().policy().cleanup_interval;
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            let evicted = state.rate_limiter().evict_idle();
            if evicted > 0 {
                debug!(evicted, remaining = state.rate_limiter().len(), "evicted idle rate-limit buckets");
            }
        }
    });
}
