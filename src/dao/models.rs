use std::{fmt, str::FromStr, time::SystemTime};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(value.trim()).map(Self)
            }
        }
    };
}

entity_id!(
    /// Identifier of a registered participant.
    ParticipantId
);
entity_id!(
    /// Identifier of a dialogue.
    DialogueId
);
entity_id!(
    /// Identifier of a single turn.
    TurnId
);
entity_id!(
    /// Identifier of a reaction record.
    ReactionId
);
entity_id!(
    /// Identifier of a trophy record.
    TrophyId
);

/// Label → count breakdown, ordered by count descending then label ascending.
pub type LabelTally = IndexMap<String, u64>;

/// Whether a participant is a person or an automated agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantKind {
    /// A person using the web client.
    Human,
    /// An automated agent calling the API with a credential.
    Bot,
}

/// How much of their identity a participant discloses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Disclosure {
    /// No identity shown.
    Anonymous,
    /// A stable handle unrelated to a real identity.
    Pseudonymous,
    /// A real name or model name.
    Named,
}

impl FromStr for ParticipantKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "human" => Ok(ParticipantKind::Human),
            "bot" => Ok(ParticipantKind::Bot),
            _ => Err(()),
        }
    }
}

impl FromStr for Disclosure {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "anonymous" => Ok(Disclosure::Anonymous),
            "pseudonymous" => Ok(Disclosure::Pseudonymous),
            "named" => Ok(Disclosure::Named),
            _ => Err(()),
        }
    }
}

/// Registered identity. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Unique identifier.
    pub id: ParticipantId,
    /// Person or agent.
    pub kind: ParticipantKind,
    /// Identity disclosure level.
    pub disclosure: Disclosure,
    /// Trimmed name shown next to turns and rankings.
    pub display_name: String,
    /// Model label, only ever set for bots.
    pub model: Option<String>,
    /// Salted credential hash, only ever set for bots.
    pub credential_hash: Option<String>,
    /// Registration time.
    pub created_at: SystemTime,
}

/// Lifecycle phase of a dialogue. Ordered: a dialogue never moves backwards.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum DialoguePhase {
    /// Waiting for a respondent.
    Open,
    /// Sides alternate turns.
    InProgress,
    /// Turn budget exhausted, waiting for both conclusions.
    Scoring,
    /// Both conclusions submitted.
    Concluded,
}

impl DialoguePhase {
    /// Wire name of the phase.
    pub fn as_str(self) -> &'static str {
        match self {
            DialoguePhase::Open => "open",
            DialoguePhase::InProgress => "in_progress",
            DialoguePhase::Scoring => "scoring",
            DialoguePhase::Concluded => "concluded",
        }
    }
}

impl fmt::Display for DialoguePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialoguePhase {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "open" => Ok(DialoguePhase::Open),
            "in_progress" => Ok(DialoguePhase::InProgress),
            "scoring" => Ok(DialoguePhase::Scoring),
            "concluded" => Ok(DialoguePhase::Concluded),
            _ => Err(()),
        }
    }
}

/// The two sides of a dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// Opened the dialogue; owns even turn indices.
    Challenger,
    /// Joined the dialogue; owns odd turn indices.
    Respondent,
}

impl Side {
    /// Side owning the turn at `index`.
    pub fn for_turn(index: u32) -> Self {
        if index % 2 == 0 {
            Side::Challenger
        } else {
            Side::Respondent
        }
    }
}

/// Persisted dialogue row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DialogueEntity {
    /// Unique identifier.
    pub id: DialogueId,
    /// Claim under debate.
    pub proposition: String,
    /// Current lifecycle phase.
    pub phase: DialoguePhase,
    /// Participant who opened the dialogue.
    pub challenger_id: ParticipantId,
    /// Set exactly when the phase is past `open`.
    pub respondent_id: Option<ParticipantId>,
    /// Turns per side; total capacity is twice this value.
    pub turn_budget: u32,
    /// Number of persisted turns.
    pub current_turn: u32,
    /// Closing statement of the challenger.
    pub challenger_conclusion: Option<String>,
    /// Closing statement of the respondent.
    pub respondent_conclusion: Option<String>,
    /// Creation time.
    pub created_at: SystemTime,
    /// Set when the second conclusion lands.
    pub concluded_at: Option<SystemTime>,
}

impl DialogueEntity {
    /// Total number of turns both sides may submit.
    pub fn turn_capacity(&self) -> u32 {
        self.turn_budget.saturating_mul(2)
    }

    /// Participant holding `side`, if that side is filled.
    pub fn participant_for(&self, side: Side) -> Option<ParticipantId> {
        match side {
            Side::Challenger => Some(self.challenger_id),
            Side::Respondent => self.respondent_id,
        }
    }

    /// Side held by `participant`, if any.
    pub fn side_of(&self, participant: ParticipantId) -> Option<Side> {
        if participant == self.challenger_id {
            Some(Side::Challenger)
        } else if self.respondent_id == Some(participant) {
            Some(Side::Respondent)
        } else {
            None
        }
    }

    /// Conclusion slot of `side`.
    pub fn conclusion(&self, side: Side) -> Option<&str> {
        match side {
            Side::Challenger => self.challenger_conclusion.as_deref(),
            Side::Respondent => self.respondent_conclusion.as_deref(),
        }
    }
}

/// One argument in a dialogue. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TurnEntity {
    /// Unique identifier.
    pub id: TurnId,
    /// Dialogue the turn belongs to.
    pub dialogue_id: DialogueId,
    /// Side holder who wrote it.
    pub author_id: ParticipantId,
    /// Argument text as submitted.
    pub content: String,
    /// 0-based position; equals the dialogue counter at submission time.
    pub index: u32,
    /// Submission time.
    pub created_at: SystemTime,
}

/// Discriminant of a [`ReactionTarget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// A single turn.
    Turn,
    /// A whole dialogue.
    Dialogue,
}

impl FromStr for TargetKind {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "turn" => Ok(TargetKind::Turn),
            "dialogue" => Ok(TargetKind::Dialogue),
            _ => Err(()),
        }
    }
}

/// What a reaction points at. Existence of the target is not enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ReactionTarget {
    /// Reaction on one turn.
    Turn(TurnId),
    /// Reaction on a dialogue as a whole.
    Dialogue(DialogueId),
}

impl ReactionTarget {
    /// Build a target from its discriminant and raw id.
    pub fn new(kind: TargetKind, id: Uuid) -> Self {
        match kind {
            TargetKind::Turn => ReactionTarget::Turn(TurnId(id)),
            TargetKind::Dialogue => ReactionTarget::Dialogue(DialogueId(id)),
        }
    }

    /// Discriminant of this target.
    pub fn kind(&self) -> TargetKind {
        match self {
            ReactionTarget::Turn(_) => TargetKind::Turn,
            ReactionTarget::Dialogue(_) => TargetKind::Dialogue,
        }
    }

    /// Raw id regardless of kind.
    pub fn raw_id(&self) -> Uuid {
        match self {
            ReactionTarget::Turn(id) => id.0,
            ReactionTarget::Dialogue(id) => id.0,
        }
    }
}

/// Open-vocabulary score attached to a turn or a dialogue. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReactionEntity {
    /// Unique identifier.
    pub id: ReactionId,
    /// What is being scored.
    pub target: ReactionTarget,
    /// Participant who reacted.
    pub reactor_id: ParticipantId,
    /// Emoji, word or phrase.
    pub label: String,
    /// Time of the reaction.
    pub created_at: SystemTime,
    /// Reactions the reactor had received when reacting.
    pub reactor_profile: Option<LabelTally>,
}

/// Outcome tag of a trophy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrophyKind {
    /// The side with strictly more reactions.
    Winner,
    /// Every other side, including both sides of a tie.
    Participant,
}

/// Summary of one participant's reception in one concluded dialogue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrophyEntity {
    /// Unique identifier.
    pub id: TrophyId,
    /// Holder of the trophy.
    pub participant_id: ParticipantId,
    /// Concluded dialogue it was earned in.
    pub dialogue_id: DialogueId,
    /// Winner or participant.
    pub kind: TrophyKind,
    /// Reactions the holder's turns received in that dialogue.
    pub breakdown: LabelTally,
    /// Copy of the dialogue proposition.
    pub title: String,
    /// Time of the award.
    pub awarded_at: SystemTime,
}
