use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{dialogue_store::DialogueStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

fn backoff(delay: Duration) -> Duration {
    (delay * 2).min(MAX_DELAY)
}

/// Connect to the dialogue store and keep the application degraded while it is unreachable.
///
/// Runs forever: after a store is lost for good it is uninstalled and a fresh
/// connection is attempted with exponential backoff.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn DialogueStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.set_dialogue_store(store.clone()).await;
                info!("dialogue store connected; leaving degraded mode");
                delay = INITIAL_DELAY;

                monitor(&state, store.as_ref()).await;

                state.clear_dialogue_store().await;
                warn!("dialogue store lost; reconnecting from scratch");
            }
            Err(err) => {
                warn!(error = %err, retry_in = ?delay, "dialogue store connection failed");
            }
        }
        sleep(delay).await;
        delay = backoff(delay);
    }
}

/// Poll the store until it fails and cannot be revived in place.
async fn monitor(state: &SharedState, store: &dyn DialogueStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("dialogue store healthy again; leaving degraded mode");
                    state.update_degraded(false);
                }
            }
            Err(err) => {
                warn!(error = %err, "dialogue store health check failed; entering degraded mode");
                state.update_degraded(true);
                if !revive(store).await {
                    warn!("exhausted reconnect attempts");
                    return;
                }
                state.update_degraded(false);
            }
        }
        sleep(HEALTH_POLL_INTERVAL).await;
    }
}

async fn revive(store: &dyn DialogueStore) -> bool {
    let mut delay = INITIAL_DELAY;
    for attempt in 1..=MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "dialogue store reconnected");
                return true;
            }
            Err(err) => {
                warn!(attempt, error = %err, "dialogue store reconnect failed");
                sleep(delay).await;
                delay = backoff(delay);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, dao::dialogue_store::memory::MemoryDialogueStore, state::AppState,
    };

    #[test]
    fn backoff_is_capped() {
        assert_eq!(backoff(Duration::from_secs(1)), Duration::from_secs(2));
        assert_eq!(backoff(Duration::from_secs(8)), MAX_DELAY);
    }

    #[tokio::test]
    async fn supervisor_installs_the_store() {
        let state = AppState::new(AppConfig::default());
        assert!(state.is_degraded());

        let task = tokio::spawn(run(state.clone(), || async {
            Ok(Arc::new(MemoryDialogueStore::new()) as Arc<dyn DialogueStore>)
        }));

        let mut watcher = state.degraded_watcher();
        watcher
            .wait_for(|degraded| !degraded)
            .await
            .expect("degraded flag cleared");
        assert!(state.require_dialogue_store().await.is_ok());
        task.abort();
    }
}
