use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    dao::models::{
        DialogueEntity, DialogueId, DialoguePhase, LabelTally, ParticipantId, Side, TurnEntity,
        TurnId,
    },
    dto::{format_system_time, participant::ParticipantResponse, validation::validate_not_blank},
};

/// Payload used to open a dialogue.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct CreateDialogueRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub proposition: Option<String>,
    /// Ignored when a bearer credential is presented.
    pub challenger_id: Option<String>,
    /// Turns per side; defaults to the configured budget.
    pub turn_budget: Option<u32>,
}

/// Payload identifying the acting participant, used by `join`.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinDialogueRequest {
    /// Ignored when a bearer credential is presented.
    pub participant_id: Option<String>,
}

/// Payload used to submit the next turn.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmitTurnRequest {
    pub participant_id: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub content: Option<String>,
}

/// Payload used to submit a closing conclusion.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ConcludeDialogueRequest {
    pub participant_id: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub conclusion: Option<String>,
}

/// Ordering of the dialogue list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DialogueSort {
    /// Creation time, newest first.
    #[default]
    Newest,
    /// Reaction count, then newest first.
    MostScored,
}

/// Query parameters of `GET /api/dialogues`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(default)]
#[into_params(parameter_in = Query)]
pub struct ListDialoguesQuery {
    /// Phase filter; unknown values are ignored.
    pub phase: Option<String>,
    pub sort: Option<DialogueSort>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Persisted dialogue record.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DialogueResponse {
    pub id: DialogueId,
    pub proposition: String,
    pub phase: DialoguePhase,
    pub challenger_id: ParticipantId,
    pub respondent_id: Option<ParticipantId>,
    pub turn_budget: u32,
    pub current_turn: u32,
    pub challenger_conclusion: Option<String>,
    pub respondent_conclusion: Option<String>,
    pub created_at: String,
    pub concluded_at: Option<String>,
}

impl From<DialogueEntity> for DialogueResponse {
    fn from(value: DialogueEntity) -> Self {
        Self {
            id: value.id,
            proposition: value.proposition,
            phase: value.phase,
            challenger_id: value.challenger_id,
            respondent_id: value.respondent_id,
            turn_budget: value.turn_budget,
            current_turn: value.current_turn,
            challenger_conclusion: value.challenger_conclusion,
            respondent_conclusion: value.respondent_conclusion,
            created_at: format_system_time(value.created_at),
            concluded_at: value.concluded_at.map(format_system_time),
        }
    }
}

/// Row of the dialogue list.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DialogueSummary {
    pub id: DialogueId,
    pub proposition: String,
    pub phase: DialoguePhase,
    pub turn_budget: u32,
    pub current_turn: u32,
    pub created_at: String,
    pub challenger_name: Option<String>,
    pub respondent_name: Option<String>,
    pub turn_count: u64,
    /// Reactions on the dialogue itself and on its turns.
    pub reaction_count: u64,
    pub top_labels: Vec<String>,
}

/// One turn with the reactions it received.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub id: TurnId,
    pub author_id: ParticipantId,
    pub index: u32,
    pub side: Side,
    pub content: String,
    pub created_at: String,
    #[schema(value_type = Object)]
    pub reactions: LabelTally,
}

impl TurnView {
    pub fn new(turn: TurnEntity, reactions: LabelTally) -> Self {
        Self {
            id: turn.id,
            author_id: turn.author_id,
            index: turn.index,
            side: Side::for_turn(turn.index),
            content: turn.content,
            created_at: format_system_time(turn.created_at),
            reactions,
        }
    }
}

/// Full dialogue read: sides, ordered turns, tallies and the derived next actor.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DialogueDetailResponse {
    #[serde(flatten)]
    pub dialogue: DialogueResponse,
    pub challenger: Option<ParticipantResponse>,
    pub respondent: Option<ParticipantResponse>,
    pub turns: Vec<TurnView>,
    /// Reactions attached to the dialogue as a whole.
    #[schema(value_type = Object)]
    pub reactions: LabelTally,
    /// Who must submit the next turn; `null` outside `in_progress`.
    pub next_participant_id: Option<ParticipantId>,
}

/// Result of a turn submission.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTurnResponse {
    pub id: TurnId,
    pub index: u32,
    /// Phase after the turn, `scoring` once the budget is exhausted.
    pub phase: DialoguePhase,
}
