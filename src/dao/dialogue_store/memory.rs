//! Process-local store used by tests and by `STORAGE_BACKEND=memory`.
//!
//! Every operation takes the single state lock, so a compare-and-set and the
//! turn it appends are observed together or not at all.

use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;

use super::{
    DialogueFilter, DialogueStore, DialogueTransition, ReactionFilter, TransitionOutcome,
    TurnFilter,
};
use crate::dao::{
    models::{
        DialogueEntity, DialogueId, ParticipantEntity, ParticipantId, ReactionEntity,
        TrophyEntity, TurnEntity,
    },
    storage::StorageResult,
};

/// Process-local store. One write lock serialises every mutation.
#[derive(Clone, Default)]
pub struct MemoryDialogueStore {
    inner: Arc<RwLock<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    participants: HashMap<ParticipantId, ParticipantEntity>,
    dialogues: IndexMap<DialogueId, DialogueEntity>,
    turns: Vec<TurnEntity>,
    reactions: Vec<ReactionEntity>,
    trophies: Vec<TrophyEntity>,
}

impl MemoryDialogueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) async fn seed_turn(&self, turn: TurnEntity) {
        self.inner.write().await.turns.push(turn);
    }

    async fn apply_guarded(&self, transition: DialogueTransition) -> TransitionOutcome {
        let mut state = self.inner.write().await;
        let DialogueTransition { guard, next, turn } = transition;

        let Some(current) = state.dialogues.get_mut(&next.id) else {
            return TransitionOutcome::Missing;
        };
        if !guard.matches(current) {
            return TransitionOutcome::Conflict;
        }

        *current = next.clone();
        if let Some(turn) = turn {
            state.turns.push(turn);
        }
        TransitionOutcome::Applied(next)
    }

    async fn select_dialogues(&self, filter: DialogueFilter) -> Vec<DialogueEntity> {
        let state = self.inner.read().await;
        let mut dialogues: Vec<DialogueEntity> = state
            .dialogues
            .values()
            .rev()
            .filter(|dialogue| filter.phase.is_none_or(|phase| dialogue.phase == phase))
            .filter(|dialogue| {
                filter
                    .participant
                    .is_none_or(|participant| dialogue.side_of(participant).is_some())
            })
            .cloned()
            .collect();
        dialogues.sort_by_key(|dialogue| Reverse(dialogue.created_at));
        dialogues
    }

    async fn select_turns(&self, filter: TurnFilter) -> Vec<TurnEntity> {
        let state = self.inner.read().await;
        let mut turns: Vec<TurnEntity> = state
            .turns
            .iter()
            .filter(|turn| match &filter {
                TurnFilter::Ids(ids) => ids.contains(&turn.id),
                TurnFilter::Author(author) => turn.author_id == *author,
                TurnFilter::Dialogues(ids) => ids.contains(&turn.dialogue_id),
            })
            .cloned()
            .collect();
        turns.sort_by_key(|turn| (turn.dialogue_id, turn.index));
        turns
    }

    async fn fill_trophy_slots(
        &self,
        dialogue_id: DialogueId,
        trophies: Vec<TrophyEntity>,
    ) -> Vec<TrophyEntity> {
        let mut state = self.inner.write().await;
        let mut written = Vec::new();
        for trophy in trophies {
            let taken = state.trophies.iter().any(|held| {
                held.dialogue_id == dialogue_id && held.participant_id == trophy.participant_id
            });
            if !taken {
                state.trophies.push(trophy.clone());
                written.push(trophy);
            }
        }
        written
    }

    async fn trophies_of(&self, participant_id: ParticipantId) -> Vec<TrophyEntity> {
        let state = self.inner.read().await;
        let mut trophies: Vec<TrophyEntity> = state
            .trophies
            .iter()
            .rev()
            .filter(|trophy| trophy.participant_id == participant_id)
            .cloned()
            .collect();
        trophies.sort_by_key(|trophy| Reverse(trophy.awarded_at));
        trophies
    }
}

impl DialogueStore for MemoryDialogueStore {
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.inner.write().await;
            state.participants.insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.read().await.participants.get(&id).cloned()) })
    }

    fn find_participants(
        &self,
        ids: Vec<ParticipantId>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.inner.read().await;
            Ok(ids
                .iter()
                .filter_map(|id| state.participants.get(id).cloned())
                .collect())
        })
    }

    fn find_participant_by_credential(
        &self,
        credential_hash: String,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.inner.read().await;
            Ok(state
                .participants
                .values()
                .find(|participant| {
                    participant.credential_hash.as_deref() == Some(credential_hash.as_str())
                })
                .cloned())
        })
    }

    fn insert_dialogue(&self, dialogue: DialogueEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut state = store.inner.write().await;
            state.dialogues.insert(dialogue.id, dialogue);
            Ok(())
        })
    }

    fn find_dialogue(
        &self,
        id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Option<DialogueEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.read().await.dialogues.get(&id).cloned()) })
    }

    fn list_dialogues(
        &self,
        filter: DialogueFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<DialogueEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.select_dialogues(filter).await) })
    }

    fn apply_transition(
        &self,
        transition: DialogueTransition,
    ) -> BoxFuture<'static, StorageResult<TransitionOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.apply_guarded(transition).await) })
    }

    fn find_turns(&self, filter: TurnFilter) -> BoxFuture<'static, StorageResult<Vec<TurnEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.select_turns(filter).await) })
    }

    fn insert_reaction(&self, reaction: ReactionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.write().await.reactions.push(reaction);
            Ok(())
        })
    }

    fn list_reactions(
        &self,
        filter: ReactionFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<ReactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.inner.read().await;
            Ok(state
                .reactions
                .iter()
                .filter(|reaction| filter.matches(reaction))
                .cloned()
                .collect())
        })
    }

    fn insert_trophies(
        &self,
        dialogue_id: DialogueId,
        trophies: Vec<TrophyEntity>,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.fill_trophy_slots(dialogue_id, trophies).await) })
    }

    fn trophy_holders(
        &self,
        dialogue_id: DialogueId,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantId>>> {
        let store = self.clone();
        Box::pin(async move {
            let state = store.inner.read().await;
            Ok(state
                .trophies
                .iter()
                .filter(|trophy| trophy.dialogue_id == dialogue_id)
                .map(|trophy| trophy.participant_id)
                .collect())
        })
    }

    fn list_trophies(
        &self,
        participant_id: ParticipantId,
    ) -> BoxFuture<'static, StorageResult<Vec<TrophyEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.trophies_of(participant_id).await) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use super::*;
    use crate::dao::{
        dialogue_store::DialogueGuard,
        models::{DialoguePhase, TrophyId, TrophyKind, TurnId},
    };

    fn dialogue(created_at: SystemTime) -> DialogueEntity {
        DialogueEntity {
            id: DialogueId::generate(),
            proposition: "tabs beat spaces".into(),
            phase: DialoguePhase::Open,
            challenger_id: ParticipantId::generate(),
            respondent_id: None,
            turn_budget: 1,
            current_turn: 0,
            challenger_conclusion: None,
            respondent_conclusion: None,
            created_at,
            concluded_at: None,
        }
    }

    fn trophy(dialogue_id: DialogueId) -> TrophyEntity {
        TrophyEntity {
            id: TrophyId::generate(),
            participant_id: ParticipantId::generate(),
            dialogue_id,
            kind: TrophyKind::Participant,
            breakdown: Default::default(),
            title: "t".into(),
            awarded_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn stale_guard_is_rejected_without_writing() {
        let store = MemoryDialogueStore::new();
        let original = dialogue(SystemTime::now());
        store.insert_dialogue(original.clone()).await.unwrap();

        let guard = DialogueGuard::of(&original);
        let mut joined = original.clone();
        joined.phase = DialoguePhase::InProgress;
        joined.respondent_id = Some(ParticipantId::generate());

        let first = store
            .apply_transition(DialogueTransition {
                guard,
                next: joined.clone(),
                turn: None,
            })
            .await
            .unwrap();
        assert_eq!(first, TransitionOutcome::Applied(joined.clone()));

        let mut other = original.clone();
        other.phase = DialoguePhase::InProgress;
        other.respondent_id = Some(ParticipantId::generate());
        let second = store
            .apply_transition(DialogueTransition {
                guard,
                next: other,
                turn: Some(TurnEntity {
                    id: TurnId::generate(),
                    dialogue_id: original.id,
                    author_id: original.challenger_id,
                    content: "x".into(),
                    index: 0,
                    created_at: SystemTime::now(),
                }),
            })
            .await
            .unwrap();
        assert_eq!(second, TransitionOutcome::Conflict);

        let stored = store.find_dialogue(original.id).await.unwrap().unwrap();
        assert_eq!(stored, joined);
        let turns = store
            .find_turns(TurnFilter::Dialogues(vec![original.id]))
            .await
            .unwrap();
        assert!(turns.is_empty());
    }

    #[tokio::test]
    async fn dialogues_are_listed_newest_first() {
        let store = MemoryDialogueStore::new();
        let now = SystemTime::now();
        let older = dialogue(now - Duration::from_secs(60));
        let newer = dialogue(now);
        store.insert_dialogue(newer.clone()).await.unwrap();
        store.insert_dialogue(older.clone()).await.unwrap();

        let listed = store
            .list_dialogues(DialogueFilter::default())
            .await
            .unwrap();
        let ids: Vec<_> = listed.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn trophy_slots_are_written_once() {
        let store = MemoryDialogueStore::new();
        let dialogue_id = DialogueId::generate();
        let first = trophy(dialogue_id);
        let second = trophy(dialogue_id);

        let written = store
            .insert_trophies(dialogue_id, vec![first.clone()])
            .await
            .unwrap();
        assert_eq!(written, vec![first.clone()]);

        let mut replacement = trophy(dialogue_id);
        replacement.participant_id = first.participant_id;
        replacement.kind = TrophyKind::Winner;
        let written = store
            .insert_trophies(dialogue_id, vec![replacement, second.clone()])
            .await
            .unwrap();
        assert_eq!(written, vec![second.clone()]);

        let mut holders = store.trophy_holders(dialogue_id).await.unwrap();
        holders.sort();
        let mut expected = vec![first.participant_id, second.participant_id];
        expected.sort();
        assert_eq!(holders, expected);

        let kept = store.list_trophies(first.participant_id).await.unwrap();
        assert_eq!(kept, vec![first]);
    }
}
