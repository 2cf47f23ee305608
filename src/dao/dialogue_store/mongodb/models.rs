//! BSON document shapes. Ids are stored as hyphenated strings; labels are kept
//! as `{label, count}` pairs because arbitrary labels are not valid field names.

use std::str::FromStr;

use mongodb::bson::{Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::{
    models::{
        DialogueEntity, DialoguePhase, Disclosure, LabelTally, ParticipantEntity, ParticipantKind,
        ReactionEntity, ReactionTarget, TargetKind, TrophyEntity, TrophyKind, TurnEntity,
    },
    storage::StorageError,
};

fn parse_id<T: FromStr>(raw: &str) -> Result<T, StorageError> {
    raw.parse()
        .map_err(|_| StorageError::corrupted(raw, "malformed identifier"))
}

fn count_from_bson(owner: &str, value: i64) -> Result<u32, StorageError> {
    u32::try_from(value).map_err(|_| StorageError::corrupted(owner, "counter out of range"))
}

pub fn doc_id(id: impl ToString) -> Document {
    doc! { "_id": id.to_string() }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoLabelCount {
    label: String,
    count: i64,
}

fn tally_to_documents(tally: LabelTally) -> Vec<MongoLabelCount> {
    tally
        .into_iter()
        .map(|(label, count)| MongoLabelCount {
            label,
            count: count as i64,
        })
        .collect()
}

fn tally_from_documents(entries: Vec<MongoLabelCount>) -> LabelTally {
    entries
        .into_iter()
        .map(|entry| (entry.label, entry.count.max(0) as u64))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    kind: ParticipantKind,
    disclosure: Disclosure,
    display_name: String,
    model: Option<String>,
    credential_hash: Option<String>,
    created_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            kind: value.kind,
            disclosure: value.disclosure,
            display_name: value.display_name,
            model: value.model,
            credential_hash: value.credential_hash,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = StorageError;

    fn try_from(value: MongoParticipantDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            kind: value.kind,
            disclosure: value.disclosure,
            display_name: value.display_name,
            model: value.model,
            credential_hash: value.credential_hash,
            created_at: value.created_at.to_system_time(),
        })
    }
}

/// Turn embedded in its dialogue document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTurnDocument {
    #[serde(rename = "_id")]
    id: String,
    author_id: String,
    content: String,
    index: i64,
    created_at: DateTime,
}

impl MongoTurnDocument {
    /// BSON value appended with `$push` during a transition.
    pub fn into_bson(self) -> Bson {
        Bson::Document(doc! {
            "_id": self.id,
            "author_id": self.author_id,
            "content": self.content,
            "index": self.index,
            "created_at": self.created_at,
        })
    }

    fn into_entity(self, dialogue: &MongoDialogueDocument) -> Result<TurnEntity, StorageError> {
        Ok(TurnEntity {
            id: parse_id(&self.id)?,
            dialogue_id: parse_id(&dialogue.id)?,
            author_id: parse_id(&self.author_id)?,
            index: count_from_bson(&self.id, self.index)?,
            content: self.content,
            created_at: self.created_at.to_system_time(),
        })
    }
}

impl From<TurnEntity> for MongoTurnDocument {
    fn from(value: TurnEntity) -> Self {
        Self {
            id: value.id.to_string(),
            author_id: value.author_id.to_string(),
            content: value.content,
            index: i64::from(value.index),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDialogueDocument {
    #[serde(rename = "_id")]
    id: String,
    proposition: String,
    phase: DialoguePhase,
    challenger_id: String,
    respondent_id: Option<String>,
    turn_budget: i64,
    current_turn: i64,
    challenger_conclusion: Option<String>,
    respondent_conclusion: Option<String>,
    created_at: DateTime,
    concluded_at: Option<DateTime>,
    #[serde(default)]
    turns: Vec<MongoTurnDocument>,
}

impl MongoDialogueDocument {
    /// Split the document into its row and its embedded turns.
    pub fn into_parts(self) -> Result<(DialogueEntity, Vec<TurnEntity>), StorageError> {
        let turns = self
            .turns
            .clone()
            .into_iter()
            .map(|turn| turn.into_entity(&self))
            .collect::<Result<Vec<_>, _>>()?;

        let dialogue = DialogueEntity {
            id: parse_id(&self.id)?,
            challenger_id: parse_id(&self.challenger_id)?,
            respondent_id: self.respondent_id.as_deref().map(parse_id).transpose()?,
            turn_budget: count_from_bson(&self.id, self.turn_budget)?,
            current_turn: count_from_bson(&self.id, self.current_turn)?,
            proposition: self.proposition,
            phase: self.phase,
            challenger_conclusion: self.challenger_conclusion,
            respondent_conclusion: self.respondent_conclusion,
            created_at: self.created_at.to_system_time(),
            concluded_at: self.concluded_at.map(|at| at.to_system_time()),
        };
        Ok((dialogue, turns))
    }
}

impl From<DialogueEntity> for MongoDialogueDocument {
    fn from(value: DialogueEntity) -> Self {
        Self {
            id: value.id.to_string(),
            proposition: value.proposition,
            phase: value.phase,
            challenger_id: value.challenger_id.to_string(),
            respondent_id: value.respondent_id.map(|id| id.to_string()),
            turn_budget: i64::from(value.turn_budget),
            current_turn: i64::from(value.current_turn),
            challenger_conclusion: value.challenger_conclusion,
            respondent_conclusion: value.respondent_conclusion,
            created_at: DateTime::from_system_time(value.created_at),
            concluded_at: value.concluded_at.map(DateTime::from_system_time),
            turns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoReactionDocument {
    #[serde(rename = "_id")]
    id: String,
    target_kind: TargetKind,
    target_id: String,
    reactor_id: String,
    label: String,
    created_at: DateTime,
    reactor_profile: Option<Vec<MongoLabelCount>>,
}

impl From<ReactionEntity> for MongoReactionDocument {
    fn from(value: ReactionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            target_kind: value.target.kind(),
            target_id: value.target.raw_id().to_string(),
            reactor_id: value.reactor_id.to_string(),
            label: value.label,
            created_at: DateTime::from_system_time(value.created_at),
            reactor_profile: value.reactor_profile.map(tally_to_documents),
        }
    }
}

impl TryFrom<MongoReactionDocument> for ReactionEntity {
    type Error = StorageError;

    fn try_from(value: MongoReactionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            target: ReactionTarget::new(value.target_kind, parse_id(&value.target_id)?),
            reactor_id: parse_id(&value.reactor_id)?,
            label: value.label,
            created_at: value.created_at.to_system_time(),
            reactor_profile: value.reactor_profile.map(tally_from_documents),
        })
    }
}

/// Filter clause selecting reactions attached to `target`.
pub fn target_clause(target: &ReactionTarget) -> Document {
    doc! {
        "target_kind": kind_name(target.kind()),
        "target_id": target.raw_id().to_string(),
    }
}

pub fn kind_name(kind: TargetKind) -> &'static str {
    match kind {
        TargetKind::Turn => "turn",
        TargetKind::Dialogue => "dialogue",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoTrophyDocument {
    #[serde(rename = "_id")]
    id: String,
    participant_id: String,
    dialogue_id: String,
    kind: TrophyKind,
    breakdown: Vec<MongoLabelCount>,
    title: String,
    awarded_at: DateTime,
}

impl From<TrophyEntity> for MongoTrophyDocument {
    fn from(value: TrophyEntity) -> Self {
        Self {
            id: value.id.to_string(),
            participant_id: value.participant_id.to_string(),
            dialogue_id: value.dialogue_id.to_string(),
            kind: value.kind,
            breakdown: tally_to_documents(value.breakdown),
            title: value.title,
            awarded_at: DateTime::from_system_time(value.awarded_at),
        }
    }
}

fn trophy_kind_name(kind: TrophyKind) -> &'static str {
    match kind {
        TrophyKind::Winner => "winner",
        TrophyKind::Participant => "participant",
    }
}

impl MongoTrophyDocument {
    /// Filter on the `(dialogue, participant)` slot and a `$setOnInsert` update filling it.
    pub fn into_slot_upsert(self) -> (Document, Document) {
        let filter = doc! {
            "dialogue_id": self.dialogue_id,
            "participant_id": self.participant_id,
        };
        let breakdown: Vec<Bson> = self
            .breakdown
            .into_iter()
            .map(|entry| Bson::Document(doc! { "label": entry.label, "count": entry.count }))
            .collect();
        let update = doc! {
            "$setOnInsert": {
                "_id": self.id,
                "kind": trophy_kind_name(self.kind),
                "breakdown": breakdown,
                "title": self.title,
                "awarded_at": self.awarded_at,
            }
        };
        (filter, update)
    }
}

impl TryFrom<MongoTrophyDocument> for TrophyEntity {
    type Error = StorageError;

    fn try_from(value: MongoTrophyDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            participant_id: parse_id(&value.participant_id)?,
            dialogue_id: parse_id(&value.dialogue_id)?,
            kind: value.kind,
            breakdown: tally_from_documents(value.breakdown),
            title: value.title,
            awarded_at: value.awarded_at.to_system_time(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::dao::models::{DialogueId, ParticipantId, TrophyId};

    #[test]
    fn trophy_upsert_only_fills_an_empty_slot() {
        let dialogue_id = DialogueId::generate();
        let participant_id = ParticipantId::generate();
        let trophy = TrophyEntity {
            id: TrophyId::generate(),
            participant_id,
            dialogue_id,
            kind: TrophyKind::Winner,
            breakdown: [("🔥".to_owned(), 2)].into_iter().collect(),
            title: "tabs beat spaces".into(),
            awarded_at: SystemTime::now(),
        };

        let (filter, update) = MongoTrophyDocument::from(trophy).into_slot_upsert();
        assert_eq!(
            filter,
            doc! {
                "dialogue_id": dialogue_id.to_string(),
                "participant_id": participant_id.to_string(),
            }
        );
        assert_eq!(update.keys().collect::<Vec<_>>(), vec!["$setOnInsert"]);
        let fields = update.get_document("$setOnInsert").unwrap();
        assert_eq!(fields.get_str("kind").unwrap(), "winner");
        assert_eq!(fields.get_array("breakdown").unwrap().len(), 1);
        assert!(!fields.contains_key("participant_id"));
    }
}
