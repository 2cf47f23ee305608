use std::{collections::HashMap, sync::Arc};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Bson, Document, doc},
    error::{Error as MongoError, ErrorKind, WriteFailure},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoDialogueDocument, MongoParticipantDocument, MongoReactionDocument,
        MongoTrophyDocument, MongoTurnDocument, doc_id, kind_name, target_clause,
    },
};
use crate::dao::{
    dialogue_store::{
        DialogueFilter, DialogueGuard, DialogueStore, DialogueTransition, ReactionFilter,
        TransitionOutcome, TurnFilter,
    },
    models::{
        DialogueEntity, DialogueId, ParticipantEntity, ParticipantId, ReactionEntity,
        TrophyEntity, TurnEntity,
    },
    storage::{StorageError, StorageResult},
};

const PARTICIPANTS: &str = "participants";
const DIALOGUES: &str = "dialogues";
const REACTIONS: &str = "reactions";
const TROPHIES: &str = "trophies";

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed [`DialogueStore`]; cloning shares the connection.
#[derive(Clone)]
pub struct MongoDialogueStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Kept so the connection pool lives as long as the handle.
    _client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = open_database(&self.config).await?;
        let mut guard = self.state.write().await;
        guard._client = client;
        guard.database = database;
        info!(database = %self.config.database_name, "MongoDB connection re-established");
        Ok(())
    }
}

fn is_duplicate_key(err: &MongoError) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(failure)) if failure.code == DUPLICATE_KEY
    )
}

fn id_strings<T: ToString>(ids: &[T]) -> Vec<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn guard_filter(id: DialogueId, guard: &DialogueGuard) -> Document {
    let concluded = |done: bool| -> Bson {
        if done {
            Bson::Document(doc! { "$ne": Bson::Null })
        } else {
            Bson::Null
        }
    };

    doc! {
        "_id": id.to_string(),
        "phase": guard.phase.as_str(),
        "current_turn": i64::from(guard.current_turn),
        "respondent_id": guard.respondent_id.map(|id| id.to_string()),
        "challenger_conclusion": concluded(guard.challenger_concluded),
        "respondent_conclusion": concluded(guard.respondent_concluded),
    }
}

fn transition_update(next: &DialogueEntity, turn: Option<TurnEntity>) -> Document {
    let mut update = doc! {
        "$set": {
            "phase": next.phase.as_str(),
            "respondent_id": next.respondent_id.map(|id| id.to_string()),
            "current_turn": i64::from(next.current_turn),
            "challenger_conclusion": next.challenger_conclusion.clone(),
            "respondent_conclusion": next.respondent_conclusion.clone(),
            "concluded_at": next.concluded_at.map(mongodb::bson::DateTime::from_system_time),
        }
    };
    if let Some(turn) = turn {
        update.insert(
            "$push",
            doc! { "turns": MongoTurnDocument::from(turn).into_bson() },
        );
    }
    update
}

impl MongoDialogueStore {
    /// Connect to MongoDB and make sure every index the store relies on exists.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = open_database(&config).await?;
        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState {
                    _client: client,
                    database,
                }),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let specs: [(&'static str, &'static str, Document, bool); 8] = [
            (PARTICIPANTS, "credential_hash", doc! { "credential_hash": 1 }, false),
            (DIALOGUES, "phase,created_at", doc! { "phase": 1, "created_at": -1 }, false),
            (DIALOGUES, "turns._id", doc! { "turns._id": 1 }, false),
            (DIALOGUES, "turns.author_id", doc! { "turns.author_id": 1 }, false),
            (REACTIONS, "target_kind,target_id", doc! { "target_kind": 1, "target_id": 1 }, false),
            (REACTIONS, "label", doc! { "label": 1 }, false),
            (TROPHIES, "dialogue_id,participant_id", doc! { "dialogue_id": 1, "participant_id": 1 }, true),
            (TROPHIES, "participant_id,awarded_at", doc! { "participant_id": 1, "awarded_at": -1 }, false),
        ];

        for (collection, index, keys, unique) in specs {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().unique(Some(unique)).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
            debug!(collection, index, "MongoDB index ensured");
        }
        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.state.read().await.database.clone()
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.database().await.collection(PARTICIPANTS)
    }

    async fn dialogues(&self) -> Collection<MongoDialogueDocument> {
        self.database().await.collection(DIALOGUES)
    }

    async fn reactions(&self) -> Collection<MongoReactionDocument> {
        self.database().await.collection(REACTIONS)
    }

    async fn trophies(&self) -> Collection<MongoTrophyDocument> {
        self.database().await.collection(TROPHIES)
    }

    async fn insert_participant(&self, participant: ParticipantEntity) -> StorageResult<()> {
        let id = participant.id.to_string();
        let document = MongoParticipantDocument::from(participant);
        self.participants()
            .await
            .insert_one(document)
            .await
            .map_err(|source| MongoDaoError::Insert {
                collection: PARTICIPANTS,
                id,
                source,
            })?;
        Ok(())
    }

    async fn find_participant_by(&self, filter: Document) -> StorageResult<Option<ParticipantEntity>> {
        let document = self
            .participants()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTICIPANTS,
                source,
            })?;
        document.map(ParticipantEntity::try_from).transpose()
    }

    async fn find_participants(&self, ids: Vec<ParticipantId>) -> StorageResult<Vec<ParticipantEntity>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(doc! { "_id": { "$in": id_strings(&ids) } })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTICIPANTS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: PARTICIPANTS,
                source,
            })?;

        let mut by_id = documents
            .into_iter()
            .map(ParticipantEntity::try_from)
            .map(|entity| entity.map(|entity| (entity.id, entity)))
            .collect::<StorageResult<HashMap<_, _>>>()?;
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }

    async fn insert_dialogue(&self, dialogue: DialogueEntity) -> StorageResult<()> {
        let id = dialogue.id.to_string();
        let document = MongoDialogueDocument::from(dialogue);
        self.dialogues()
            .await
            .insert_one(document)
            .await
            .map_err(|source| MongoDaoError::Insert {
                collection: DIALOGUES,
                id,
                source,
            })?;
        Ok(())
    }

    async fn find_dialogue(&self, id: DialogueId) -> StorageResult<Option<DialogueEntity>> {
        let document = self
            .dialogues()
            .await
            .find_one(doc_id(id))
            .projection(doc! { "turns": 0 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?;
        match document {
            Some(document) => Ok(Some(document.into_parts()?.0)),
            None => Ok(None),
        }
    }

    async fn list_dialogues(&self, filter: DialogueFilter) -> StorageResult<Vec<DialogueEntity>> {
        let mut query = Document::new();
        if let Some(phase) = filter.phase {
            query.insert("phase", phase.as_str());
        }
        if let Some(participant) = filter.participant {
            let participant = participant.to_string();
            query.insert(
                "$or",
                vec![
                    doc! { "challenger_id": participant.clone() },
                    doc! { "respondent_id": participant },
                ],
            );
        }

        let documents: Vec<MongoDialogueDocument> = self
            .dialogues()
            .await
            .find(query)
            .projection(doc! { "turns": 0 })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?;

        documents
            .into_iter()
            .map(|document| document.into_parts().map(|(dialogue, _)| dialogue))
            .collect()
    }

    async fn apply_transition(&self, transition: DialogueTransition) -> StorageResult<TransitionOutcome> {
        let DialogueTransition { guard, next, turn } = transition;
        let id = next.id;
        let collection = self.dialogues().await;

        let updated = collection
            .find_one_and_update(guard_filter(id, &guard), transition_update(&next, turn))
            .projection(doc! { "turns": 0 })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::Transition {
                id: id.to_string(),
                source,
            })?;

        if let Some(document) = updated {
            return Ok(TransitionOutcome::Applied(document.into_parts()?.0));
        }

        if self.dialogue_exists(id).await? {
            Ok(TransitionOutcome::Conflict)
        } else {
            Ok(TransitionOutcome::Missing)
        }
    }

    async fn dialogue_exists(&self, id: DialogueId) -> StorageResult<bool> {
        let count = self
            .database()
            .await
            .collection::<Document>(DIALOGUES)
            .count_documents(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?;
        Ok(count > 0)
    }

    async fn find_turns(&self, filter: TurnFilter) -> StorageResult<Vec<TurnEntity>> {
        let query = match &filter {
            TurnFilter::Ids(ids) => doc! { "turns._id": { "$in": id_strings(ids) } },
            TurnFilter::Author(author) => doc! { "turns.author_id": author.to_string() },
            TurnFilter::Dialogues(ids) => doc! { "_id": { "$in": id_strings(ids) } },
        };

        let documents: Vec<MongoDialogueDocument> = self
            .dialogues()
            .await
            .find(query)
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: DIALOGUES,
                source,
            })?;

        let mut turns = Vec::new();
        for document in documents {
            let (_, dialogue_turns) = document.into_parts()?;
            turns.extend(dialogue_turns.into_iter().filter(|turn| match &filter {
                TurnFilter::Ids(ids) => ids.contains(&turn.id),
                TurnFilter::Author(author) => turn.author_id == *author,
                TurnFilter::Dialogues(_) => true,
            }));
        }
        turns.sort_by_key(|turn| (turn.dialogue_id, turn.index));
        Ok(turns)
    }

    async fn insert_reaction(&self, reaction: ReactionEntity) -> StorageResult<()> {
        let id = reaction.id.to_string();
        let document = MongoReactionDocument::from(reaction);
        self.reactions()
            .await
            .insert_one(document)
            .await
            .map_err(|source| MongoDaoError::Insert {
                collection: REACTIONS,
                id,
                source,
            })?;
        Ok(())
    }

    async fn list_reactions(&self, filter: ReactionFilter) -> StorageResult<Vec<ReactionEntity>> {
        let mut query = Document::new();
        if let Some(targets) = &filter.targets {
            if targets.is_empty() {
                return Ok(Vec::new());
            }
            query.insert(
                "$or",
                targets.iter().map(target_clause).collect::<Vec<_>>(),
            );
        }
        if let Some(kind) = filter.target_kind {
            query.insert("target_kind", kind_name(kind));
        }
        if let Some(label) = &filter.label {
            query.insert("label", label.as_str());
        }

        let documents: Vec<MongoReactionDocument> = self
            .reactions()
            .await
            .find(query)
            .sort(doc! { "created_at": 1, "_id": 1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: REACTIONS,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: REACTIONS,
                source,
            })?;

        documents.into_iter().map(ReactionEntity::try_from).collect()
    }

    async fn insert_trophies(
        &self,
        dialogue_id: DialogueId,
        trophies: Vec<TrophyEntity>,
    ) -> StorageResult<Vec<TrophyEntity>> {
        let collection = self.trophies().await;
        let mut written = Vec::with_capacity(trophies.len());

        for trophy in trophies {
            let participant_id = trophy.participant_id;
            let (filter, update) = MongoTrophyDocument::from(trophy.clone()).into_slot_upsert();
            match collection.update_one(filter, update).upsert(true).await {
                Ok(result) if result.upserted_id.is_some() => written.push(trophy),
                Ok(_) => debug!(%dialogue_id, %participant_id, "trophy slot already filled"),
                Err(err) if is_duplicate_key(&err) => {
                    debug!(%dialogue_id, %participant_id, "trophy slot filled by a concurrent writer");
                }
                Err(source) => {
                    return Err(MongoDaoError::Insert {
                        collection: TROPHIES,
                        id: format!("{dialogue_id}/{participant_id}"),
                        source,
                    }
                    .into());
                }
            }
        }
        Ok(written)
    }

    async fn trophy_holders(&self, dialogue_id: DialogueId) -> StorageResult<Vec<ParticipantId>> {
        let documents: Vec<MongoTrophyDocument> = self
            .trophies()
            .await
            .find(doc! { "dialogue_id": dialogue_id.to_string() })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: TROPHIES,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: TROPHIES,
                source,
            })?;

        documents
            .into_iter()
            .map(|document| TrophyEntity::try_from(document).map(|trophy| trophy.participant_id))
            .collect()
    }

    async fn list_trophies(&self, participant_id: ParticipantId) -> StorageResult<Vec<TrophyEntity>> {
        let documents: Vec<MongoTrophyDocument> = self
            .trophies()
            .await
            .find(doc! { "participant_id": participant_id.to_string() })
            .sort(doc! { "awarded_at": -1 })
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: TROPHIES,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Query {
                collection: TROPHIES,
                source,
            })?;

        documents.into_iter().map(TrophyEntity::try_from).collect()
    }
}

impl DialogueStore for MongoDialogueStore {
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_participant(participant).await })
    }

    fn find_participant(
        &self,
        id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participant_by(doc_id(id)).await })
    }

    fn find_participants(
        &self,
        ids: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participants(ids).await })
    }

    fn find_participant_by_credential(
        &self,
        credential_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_participant_by(doc! { "credential_hash": credential_hash })
                .await
        })
    }

    fn insert_dialogue(&self, dialogue: DialogueEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_dialogue(dialogue).await })
    }

    fn find_dialogue(
        &self,
        id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Option<DialogueEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_dialogue(id).await })
    }

    fn list_dialogues(
        &self,
        filter: DialogueFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<DialogueEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_dialogues(filter).await })
    }

    fn apply_transition(
        &self,
        transition: DialogueTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.apply_transition(transition).await })
    }

    fn find_turns(&self, filter: TurnFilter) -> BoxFuture<'static, StorageResult<Vec<TurnEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_turns(filter).await })
    }

    fn insert_reaction(&self, reaction: ReactionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_reaction(reaction).await })
    }

    fn list_reactions(
        &self,
        filter: ReactionFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ReactionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_reactions(filter).await })
    }

    fn insert_trophies(
        &self,
        dialogue_id: DialogueId,
        trophies: Vec<TrophyEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.insert_trophies(dialogue_id, trophies).await })
    }

    fn trophy_holders(
        &self,
        dialogue_id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantId>>> {
        let store = self.clone();
        Box::pin(async move { store.trophy_holders(dialogue_id).await })
    }

    fn list_trophies(
        &self,
        participant_id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_trophies(participant_id).await })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(StorageError::from) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(StorageError::from) })
    }
}
