pub mod events;
pub mod state_machine;
pub mod tally;
pub mod transitions;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::dialogue_store::DialogueStore, error::ServiceError,
    services::rate_limit::RateLimiter,
};

pub use self::events::{DialogueEvent, EventBus};
pub use self::state_machine::{DialogueAction, DialogueStateMachine, Plan, TransitionError};

pub type SharedState = Arc<AppState>;

/// Central application state: storage handle, configuration, domain event bus
/// and the process-wide rate limiter.
pub struct AppState {
    dialogue_store: RwLock<Option<Arc<dyn DialogueStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    events: EventBus,
    rate_limiter: RateLimiter,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            dialogue_store: RwLock::new(None),
            degraded: degraded_tx,
            rate_limiter: RateLimiter::new(config.rate_limit),
            events: EventBus::default(),
            config,
        })
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn dialogue_store(&self) -> Option<Arc<dyn DialogueStore>> {
        self.dialogue_store.read().await.as_ref().cloned()
    }

    /// Current store, or [`ServiceError::Degraded`] while storage is unavailable.
    pub async fn require_dialogue_store(&self) -> Result<Arc<dyn DialogueStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.dialogue_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a store implementation and leave degraded mode.
    pub async fn set_dialogue_store(&self, store: Arc<dyn DialogueStore>) {
        *self.dialogue_store.write().await = Some(store);
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_dialogue_store(&self) {
        self.dialogue_store.write().await.take();
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Domain event bus.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Process-wide request throttle.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
