pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;

use crate::dao::models::{
    DialogueEntity, DialogueId, DialoguePhase, ParticipantEntity, ParticipantId, ReactionEntity,
    ReactionTarget, TargetKind, TrophyEntity, TurnEntity, TurnId,
};
use crate::dao::storage::StorageResult;

/// Selection of dialogues. Results are always ordered newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DialogueFilter {
    /// Keep only dialogues in this phase.
    pub phase: Option<DialoguePhase>,
    /// Keep only dialogues where this participant holds either side.
    pub participant: Option<ParticipantId>,
}

/// Selection of turns. Results are ordered by dialogue then turn index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnFilter {
    /// Turns with one of these ids.
    Ids(Vec<TurnId>),
    /// Turns written by one participant.
    Author(ParticipantId),
    /// Turns of any of these dialogues.
    Dialogues(Vec<DialogueId>),
}

/// Selection of reactions. Every populated field must match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionFilter {
    /// Attached to one of these targets.
    pub targets: Option<Vec<ReactionTarget>>,
    /// Attached to a target of this kind.
    pub target_kind: Option<TargetKind>,
    /// Carrying exactly this label.
    pub label: Option<String>,
}

impl ReactionFilter {
    /// Reactions attached to any of `targets`.
    pub fn on_targets(targets: Vec<ReactionTarget>) -> Self {
        Self {
            targets: Some(targets),
            ..Self::default()
        }
    }

    /// Whether `reaction` is selected by this filter.
    pub fn matches(&self, reaction: &ReactionEntity) -> bool {
        if let Some(targets) = &self.targets {
            if !targets.contains(&reaction.target) {
                return false;
            }
        }
        if let Some(kind) = self.target_kind {
            if reaction.target.kind() != kind {
                return false;
            }
        }
        if let Some(label) = &self.label {
            if &reaction.label != label {
                return false;
            }
        }
        true
    }
}

/// Fields a dialogue row must still hold for a transition to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DialogueGuard {
    /// Expected phase.
    pub phase: DialoguePhase,
    /// Expected turn counter.
    pub current_turn: u32,
    /// Expected respondent slot.
    pub respondent_id: Option<ParticipantId>,
    /// Whether the challenger conclusion slot is filled.
    pub challenger_concluded: bool,
    /// Whether the respondent conclusion slot is filled.
    pub respondent_concluded: bool,
}

impl DialogueGuard {
    /// Capture the guarded fields of `dialogue`.
    pub fn of(dialogue: &DialogueEntity) -> Self {
        Self {
            phase: dialogue.phase,
            current_turn: dialogue.current_turn,
            respondent_id: dialogue.respondent_id,
            challenger_concluded: dialogue.challenger_conclusion.is_some(),
            respondent_concluded: dialogue.respondent_conclusion.is_some(),
        }
    }

    /// Whether `dialogue` still holds the guarded values.
    pub fn matches(&self, dialogue: &DialogueEntity) -> bool {
        *self == Self::of(dialogue)
    }
}

/// Compare-and-set write of a dialogue row, optionally appending a turn in the same step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogueTransition {
    /// Fields the stored row must still hold.
    pub guard: DialogueGuard,
    /// Row after the transition.
    pub next: DialogueEntity,
    /// Turn appended in the same write, if any.
    pub turn: Option<TurnEntity>,
}

/// Result of [`DialogueStore::apply_transition`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The guard held and the row now equals the returned value.
    Applied(DialogueEntity),
    /// The row changed since the guard was captured; nothing was written.
    Conflict,
    /// The row no longer exists.
    Missing,
}

/// Abstraction over the persistence layer for participants, dialogues, turns,
/// reactions and trophies.
pub trait DialogueStore: Send + Sync {
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_participant(
        &self,
        id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    fn find_participants(
        &self,
        ids: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    fn find_participant_by_credential(
        &self,
        credential_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;

    fn insert_dialogue(&self, dialogue: DialogueEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_dialogue(
        &self,
        id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Option<DialogueEntity>>>;
    fn list_dialogues(
        &self,
        filter: DialogueFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<DialogueEntity>>>;
    /// Atomically apply `transition` if its guard still matches the stored row.
    fn apply_transition(
        &self,
        transition: DialogueTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>>;

    fn find_turns(&self, filter: TurnFilter) -> BoxFuture<'static, StorageResult<Vec<TurnEntity>>>;

    fn insert_reaction(&self, reaction: ReactionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_reactions(
        &self,
        filter: ReactionFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ReactionEntity>>>;

    /// Insert the trophies of one dialogue. Each `(dialogue, participant)` slot is
    /// written at most once; a trophy whose slot is taken is dropped and the stored
    /// row is left untouched. Returns the trophies actually written.
    fn insert_trophies(
        &self,
        dialogue_id: DialogueId,
        trophies: Vec<TrophyEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>>;
    /// Participants already holding a trophy for the dialogue.
    fn trophy_holders(
        &self,
        dialogue_id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantId>>>;
    /// Trophies of one participant, newest award first.
    fn list_trophies(
        &self,
        participant_id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
