use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    dao::models::{
        DialogueId, DialoguePhase, Disclosure, LabelTally, ParticipantEntity, ParticipantId,
        ParticipantKind, Side,
    },
    dto::{format_system_time, validation::validate_not_blank},
};

/// Payload used to register a participant.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct RegisterParticipantRequest {
    /// `human` or `bot`.
    pub kind: Option<String>,
    /// `anonymous`, `pseudonymous` or `named`.
    pub disclosure: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub display_name: Option<String>,
    /// Model label; ignored for humans.
    pub model: Option<String>,
}

/// Public projection of a participant. Never carries the credential hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResponse {
    pub id: ParticipantId,
    pub kind: ParticipantKind,
    pub disclosure: Disclosure,
    pub display_name: String,
    pub model: Option<String>,
    pub created_at: String,
}

impl From<ParticipantEntity> for ParticipantResponse {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            disclosure: value.disclosure,
            display_name: value.display_name,
            model: value.model,
            created_at: format_system_time(value.created_at),
        }
    }
}

/// Registration result. `apiKey` is only present for bots and is never shown again.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredParticipantResponse {
    #[serde(flatten)]
    pub participant: ParticipantResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

/// Reactions one scorer gave to a participant's turns.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScorerBreakdown {
    pub reactor_id: ParticipantId,
    /// `None` when the scorer record could not be found.
    pub display_name: Option<String>,
    pub total: u64,
    #[schema(value_type = Object)]
    pub labels: LabelTally,
}

/// A dialogue the participant took part in, with the side they held.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentDialogue {
    pub id: DialogueId,
    pub proposition: String,
    pub phase: DialoguePhase,
    pub role: Side,
    pub created_at: String,
}

/// Activity and reception statistics of one participant.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStats {
    pub dialogues: u64,
    pub concluded: u64,
    /// Percentage of dialogues that reached `concluded`, rounded.
    pub completion_rate: u64,
    pub turns: u64,
    #[schema(value_type = Object)]
    pub reactions_received: LabelTally,
    pub scored_by: Vec<ScorerBreakdown>,
    pub recent_dialogues: Vec<RecentDialogue>,
}

/// Participant record together with its statistics.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProfileResponse {
    #[serde(flatten)]
    pub participant: ParticipantResponse,
    pub stats: ParticipantStats,
}
