//! Application-level configuration loading: turn budgets, credential salt,
//! throttling policy, trophy sweep cadence and list limits.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DIALOLICAL_BACK_CONFIG_PATH";
const DEFAULT_CREDENTIAL_SALT: &str = "dialolical";
/// Upper bound on `maxTurnBudget`; keeps the doubled turn capacity within `u32`.
const TURN_BUDGET_CEILING: u32 = 10_000;

/// Immutable runtime configuration shared across the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Turns per side when a dialogue is created without a budget.
    pub default_turn_budget: u32,
    /// Largest accepted turn budget per side.
    pub max_turn_budget: u32,
    /// Salt prepended to bot credentials before hashing.
    pub credential_salt: String,
    /// Throttling policy for mutating routes.
    pub rate_limit: RateLimitConfig,
    /// Interval between trophy backfill sweeps.
    pub trophy_sweep_interval: Duration,
    /// Paging limits of read projections.
    pub limits: ListLimits,
}

/// Fixed-window throttling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests per window for callers presenting a bearer credential.
    pub bot_limit: u32,
    /// Requests per window for every other caller.
    pub default_limit: u32,
    /// Window after which a bucket is refilled.
    pub window: Duration,
    /// Interval between evictions of idle buckets.
    pub cleanup_interval: Duration,
}

/// A caller-supplied limit clamped to `1..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limit {
    /// Used when the caller supplies nothing or zero.
    pub default: usize,
    /// Upper bound.
    pub max: usize,
}

impl Limit {
    const fn new(default: usize, max: usize) -> Self {
        Self { default, max }
    }

    /// Resolve a requested limit.
    pub fn resolve(&self, requested: Option<usize>) -> usize {
        match requested {
            Some(value) if value > 0 => value.min(self.max),
            _ => self.default.min(self.max),
        }
    }
}

/// Limits applied to list-shaped reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListLimits {
    /// `GET /api/dialogues`.
    pub dialogues: Limit,
    /// `GET /api/leaderboard`.
    pub leaderboard: Limit,
    /// `GET /api/reactions/dimensions`.
    pub dimensions: Limit,
    /// Maximum reactors listed in a profile's `scoredBy`.
    pub scored_by_cap: usize,
    /// Dialogues listed in a profile's recent activity.
    pub recent_dialogues: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            bot_limit: 60,
            default_limit: 120,
            window: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(300),
        }
    }
}

impl Default for ListLimits {
    fn default() -> Self {
        Self {
            dialogues: Limit::new(20, 100),
            leaderboard: Limit::new(20, 100),
            dimensions: Limit::new(50, 200),
            scored_by_cap: 20,
            recent_dialogues: 10,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_turn_budget: 5,
            max_turn_budget: 50,
            credential_salt: DEFAULT_CREDENTIAL_SALT.to_owned(),
            rate_limit: RateLimitConfig::default(),
            trophy_sweep_interval: Duration::from_secs(300),
            limits: ListLimits::default(),
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        default_turn_budget = app_config.default_turn_budget,
                        max_turn_budget = app_config.max_turn_budget,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a JSON document; every field is optional.
    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    default_turn_budget: Option<u32>,
    max_turn_budget: Option<u32>,
    credential_salt: Option<String>,
    rate_limit: RawRateLimit,
    trophy_sweep_interval_secs: Option<u64>,
    limits: RawLimits,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawRateLimit {
    bot_limit: Option<u32>,
    default_limit: Option<u32>,
    window_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLimits {
    dialogues_default: Option<usize>,
    dialogues_max: Option<usize>,
    leaderboard_default: Option<usize>,
    leaderboard_max: Option<usize>,
    dimensions_default: Option<usize>,
    dimensions_max: Option<usize>,
    scored_by_cap: Option<usize>,
    recent_dialogues: Option<usize>,
}

fn secs_or(value: Option<u64>, fallback: Duration) -> Duration {
    value
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .unwrap_or(fallback)
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let rate = defaults.rate_limit;
        let limits = defaults.limits;

        let max_turn_budget = raw
            .max_turn_budget
            .filter(|max| *max > 0)
            .unwrap_or(defaults.max_turn_budget)
            .min(TURN_BUDGET_CEILING);
        let default_turn_budget = raw
            .default_turn_budget
            .unwrap_or(defaults.default_turn_budget)
            .clamp(1, max_turn_budget);

        Self {
            default_turn_budget,
            max_turn_budget,
            credential_salt: raw.credential_salt.unwrap_or(defaults.credential_salt),
            rate_limit: RateLimitConfig {
                bot_limit: raw.rate_limit.bot_limit.unwrap_or(rate.bot_limit),
                default_limit: raw.rate_limit.default_limit.unwrap_or(rate.default_limit),
                window: secs_or(raw.rate_limit.window_secs, rate.window),
                cleanup_interval: secs_or(
                    raw.rate_limit.cleanup_interval_secs,
                    rate.cleanup_interval,
                ),
            },
            trophy_sweep_interval: secs_or(
                raw.trophy_sweep_interval_secs,
                defaults.trophy_sweep_interval,
            ),
            limits: ListLimits {
                dialogues: Limit::new(
                    raw.limits.dialogues_default.unwrap_or(limits.dialogues.default),
                    raw.limits.dialogues_max.unwrap_or(limits.dialogues.max),
                ),
                leaderboard: Limit::new(
                    raw.limits
                        .leaderboard_default
                        .unwrap_or(limits.leaderboard.default),
                    raw.limits.leaderboard_max.unwrap_or(limits.leaderboard.max),
                ),
                dimensions: Limit::new(
                    raw.limits
                        .dimensions_default
                        .unwrap_or(limits.dimensions.default),
                    raw.limits.dimensions_max.unwrap_or(limits.dimensions.max),
                ),
                scored_by_cap: raw.limits.scored_by_cap.unwrap_or(limits.scored_by_cap),
                recent_dialogues: raw
                    .limits
                    .recent_dialogues
                    .unwrap_or(limits.recent_dialogues),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(AppConfig::from_json("{}").unwrap(), AppConfig::default());
    }

    #[test]
    fn partial_document_overrides_only_given_fields() {
        let config = AppConfig::from_json(
            r#"{"defaultTurnBudget": 3, "rateLimit": {"botLimit": 5}, "limits": {"dialoguesMax": 10}}"#,
        )
        .unwrap();
        assert_eq!(config.default_turn_budget, 3);
        assert_eq!(config.rate_limit.bot_limit, 5);
        assert_eq!(config.rate_limit.default_limit, 120);
        assert_eq!(config.limits.dialogues.max, 10);
        assert_eq!(config.limits.dialogues.default, 20);
    }

    #[test]
    fn default_budget_is_clamped_to_max() {
        let config =
            AppConfig::from_json(r#"{"defaultTurnBudget": 80, "maxTurnBudget": 10}"#).unwrap();
        assert_eq!(config.default_turn_budget, 10);
    }

    #[test]
    fn max_budget_is_capped() {
        let config = AppConfig::from_json(r#"{"maxTurnBudget": 4294967295}"#).unwrap();
        assert_eq!(config.max_turn_budget, TURN_BUDGET_CEILING);
        assert!(config.max_turn_budget.checked_mul(2).is_some());
    }

    #[test]
    fn limits_resolve_requests() {
        let limit = Limit::new(20, 100);
        assert_eq!(limit.resolve(None), 20);
        assert_eq!(limit.resolve(Some(0)), 20);
        assert_eq!(limit.resolve(Some(7)), 7);
        assert_eq!(limit.resolve(Some(500)), 100);
    }
}
