use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{ReactionEntity, ReactionId, TargetKind},
    dto::{format_system_time, validation::validate_not_blank},
};

/// Payload used to score a turn or a dialogue.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct AddReactionRequest {
    /// `turn` or `dialogue`.
    pub target_kind: Option<String>,
    pub target_id: Option<String>,
    /// Ignored when a bearer credential is presented.
    pub reactor_id: Option<String>,
    /// Emoji, word or phrase.
    #[validate(custom(function = "validate_not_blank"))]
    pub label: Option<String>,
}

/// Stored reaction.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub id: ReactionId,
    pub target_kind: TargetKind,
    pub target_id: Uuid,
    pub label: String,
    pub created_at: String,
}

impl From<ReactionEntity> for ReactionResponse {
    fn from(value: ReactionEntity) -> Self {
        Self {
            id: value.id,
            target_kind: value.target.kind(),
            target_id: value.target.raw_id(),
            label: value.label,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Query parameters of `GET /api/reactions/dimensions`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
#[into_params(parameter_in = Query)]
pub struct DimensionsQuery {
    pub limit: Option<usize>,
}

/// One label of the open vocabulary with its global count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DimensionEntry {
    pub dimension: String,
    pub count: u64,
}
