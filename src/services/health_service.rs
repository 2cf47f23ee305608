use tracing::warn;

use crate::{
    dto::health::{HealthResponse, HealthStatus},
    state::SharedState,
};

/// Ping the installed store and report the degraded flag.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let storage_reachable = match state.dialogue_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                false
            }
        },
        None => {
            warn!("no dialogue store installed (degraded mode)");
            false
        }
    };

    let status = if state.is_degraded() {
        HealthStatus::Degraded
    } else {
        HealthStatus::Ok
    };
    HealthResponse {
        status,
        storage_reachable,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::dialogue_store::memory::MemoryDialogueStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        let before = health_status(&state).await;
        assert_eq!(before.status, HealthStatus::Degraded);
        assert!(!before.storage_reachable);

        state
            .set_dialogue_store(Arc::new(MemoryDialogueStore::new()))
            .await;
        let after = health_status(&state).await;
        assert_eq!(after.status, HealthStatus::Ok);
        assert!(after.storage_reachable);
    }
}
