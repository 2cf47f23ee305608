use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    dao::models::{DialogueId, LabelTally, ParticipantId, TrophyEntity, TrophyId, TrophyKind},
    dto::format_system_time,
};

/// Trophy awarded for one concluded dialogue.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrophyResponse {
    pub id: TrophyId,
    pub participant_id: ParticipantId,
    pub dialogue_id: DialogueId,
    pub kind: TrophyKind,
    /// Label counts received on the participant's turns in that dialogue.
    #[schema(value_type = Object)]
    pub breakdown: LabelTally,
    pub title: String,
    pub awarded_at: String,
}

impl From<TrophyEntity> for TrophyResponse {
    fn from(value: TrophyEntity) -> Self {
        Self {
            id: value.id,
            participant_id: value.participant_id,
            dialogue_id: value.dialogue_id,
            kind: value.kind,
            breakdown: value.breakdown,
            title: value.title,
            awarded_at: format_system_time(value.awarded_at),
        }
    }
}
