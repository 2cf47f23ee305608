use axum::{Router, middleware};

use crate::state::SharedState;

pub mod dialogues;
pub mod docs;
pub mod extract;
pub mod health;
pub mod leaderboard;
pub mod participants;
pub mod reactions;
pub mod throttle;

/// Compose all route trees, wiring in shared state and documentation routes.
///
/// Mutating `/api` routes are throttled per caller.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = participants::router()
        .merge(dialogues::router())
        .merge(reactions::router())
        .merge(leaderboard::router())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            throttle::throttle_mutations,
        ));

    let docs_router = docs::router(state.clone());

    api_router
        .merge(health::router())
        .merge(docs_router)
        .with_state(state)
}
