use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::dao::models::{ParticipantId, ParticipantKind};

/// Query parameters of `GET /api/leaderboard`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
#[into_params(parameter_in = Query)]
pub struct LeaderboardQuery {
    /// Count only reactions with this label.
    pub dimension: Option<String>,
    pub limit: Option<usize>,
}

/// Ranked participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based position in this response.
    pub rank: usize,
    pub participant_id: ParticipantId,
    pub display_name: Option<String>,
    pub kind: Option<ParticipantKind>,
    pub count: u64,
}
