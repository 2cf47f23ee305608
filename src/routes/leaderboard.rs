use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::leaderboard::{LeaderboardEntry, LeaderboardQuery},
    error::AppError,
    routes::extract::ApiQuery,
    services::leaderboard_service,
    state::SharedState,
};

/// Leaderboard route.
pub fn router() -> Router<SharedState> {
    Router::new().route("/api/leaderboard", get(leaderboard))
}

/// Participants ranked by reactions received on their turns.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    tag = "leaderboard",
    params(LeaderboardQuery),
    responses((status = 200, description = "Ranking", body = [LeaderboardEntry]))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    ApiQuery(query): ApiQuery<LeaderboardQuery>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    Ok(Json(leaderboard_service::leaderboard(&state, query).await?))
}
