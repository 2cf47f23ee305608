use std::collections::HashMap;

use crate::{
    dao::{
        dialogue_store::{ReactionFilter, TurnFilter},
        models::{ParticipantId, ReactionTarget, TargetKind, TurnId},
    },
    dto::leaderboard::{LeaderboardEntry, LeaderboardQuery},
    error::ServiceError,
    state::{SharedState, tally::rank_by_total},
};

/// Rank participants by reactions received on their turns, optionally for one label only.
pub async fn leaderboard(
    state: &SharedState,
    query: LeaderboardQuery,
) -> Result<Vec<LeaderboardEntry>, ServiceError> {
    let limit = state.config().limits.leaderboard.resolve(query.limit);
    let dimension = query
        .dimension
        .filter(|dimension| !dimension.trim().is_empty());

    let store = state.require_dialogue_store().await?;
    let reactions = store
        .list_reactions(ReactionFilter {
            target_kind: Some(TargetKind::Turn),
            label: dimension,
            ..ReactionFilter::default()
        })
        .await?;

    let turn_ids: Vec<TurnId> = reactions
        .iter()
        .filter_map(|reaction| match reaction.target {
            ReactionTarget::Turn(id) => Some(id),
            ReactionTarget::Dialogue(_) => None,
        })
        .collect();
    if turn_ids.is_empty() {
        return Ok(Vec::new());
    }
    let authors: HashMap<TurnId, ParticipantId> = store
        .find_turns(TurnFilter::Ids(turn_ids))
        .await?
        .into_iter()
        .map(|turn| (turn.id, turn.author_id))
        .collect();

    let mut totals: HashMap<ParticipantId, u64> = HashMap::new();
    for reaction in &reactions {
        if let ReactionTarget::Turn(turn_id) = reaction.target {
            // Reactions on unknown turns have no author to credit.
            if let Some(author) = authors.get(&turn_id) {
                *totals.entry(*author).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<(ParticipantId, u64)> = totals.into_iter().collect();
    rank_by_total(&mut ranked);
    ranked.truncate(limit);

    let participants: HashMap<_, _> = store
        .find_participants(ranked.iter().map(|(id, _)| *id).collect())
        .await?
        .into_iter()
        .map(|participant| (participant.id, participant))
        .collect();

    Ok(ranked
        .into_iter()
        .enumerate()
        .map(|(position, (participant_id, count))| {
            let participant = participants.get(&participant_id);
            LeaderboardEntry {
                rank: position + 1,
                participant_id,
                display_name: participant.map(|p| p.display_name.clone()),
                kind: participant.map(|p| p.kind),
                count,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            dialogue_store::{DialogueStore, memory::MemoryDialogueStore},
            models::{
                DialogueId, Disclosure, ParticipantEntity, ParticipantKind, ReactionEntity,
                ReactionId, TurnEntity,
            },
        },
        state::AppState,
    };

    async fn author(store: &MemoryDialogueStore, name: &str, kind: ParticipantKind) -> TurnEntity {
        let participant = ParticipantEntity {
            id: ParticipantId::generate(),
            kind,
            disclosure: Disclosure::Named,
            display_name: name.into(),
            model: None,
            credential_hash: None,
            created_at: SystemTime::now(),
        };
        store.insert_participant(participant.clone()).await.unwrap();
        let turn = TurnEntity {
            id: TurnId::generate(),
            dialogue_id: DialogueId::generate(),
            author_id: participant.id,
            content: "argument".into(),
            index: 0,
            created_at: SystemTime::now(),
        };
        store.seed_turn(turn.clone()).await;
        turn
    }

    async fn react(store: &MemoryDialogueStore, target: ReactionTarget, label: &str) {
        store
            .insert_reaction(ReactionEntity {
                id: ReactionId::generate(),
                target,
                reactor_id: ParticipantId::generate(),
                label: label.into(),
                created_at: SystemTime::now(),
                reactor_profile: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn ranks_by_reactions_received_on_turns() {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryDialogueStore::new());
        state.set_dialogue_store(store.clone()).await;

        let ada = author(&store, "Ada", ParticipantKind::Human).await;
        let bot = author(&store, "Bot", ParticipantKind::Bot).await;
        react(&store, ReactionTarget::Turn(ada.id), "🔥").await;
        react(&store, ReactionTarget::Turn(bot.id), "🔥").await;
        react(&store, ReactionTarget::Turn(bot.id), "weak").await;
        react(&store, ReactionTarget::Dialogue(ada.dialogue_id), "🔥").await;
        react(&store, ReactionTarget::Dialogue(ada.dialogue_id), "🔥").await;

        let board = leaderboard(&state, LeaderboardQuery::default())
            .await
            .unwrap();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].participant_id, bot.author_id);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[0].count, 2);
        assert_eq!(board[0].kind, Some(ParticipantKind::Bot));
        assert_eq!(board[1].display_name.as_deref(), Some("Ada"));

        let fire = leaderboard(
            &state,
            LeaderboardQuery {
                dimension: Some("🔥".into()),
                limit: Some(1),
            },
        )
        .await
        .unwrap();
        assert_eq!(fire.len(), 1);
        assert_eq!(fire[0].count, 1);
        let expected = ada.author_id.min(bot.author_id);
        assert_eq!(fire[0].participant_id, expected);
    }

    #[tokio::test]
    async fn empty_ledger_gives_empty_board() {
        let state = AppState::new(AppConfig::default());
        state
            .set_dialogue_store(Arc::new(MemoryDialogueStore::new()))
            .await;
        assert!(
            leaderboard(&state, LeaderboardQuery::default())
                .await
                .unwrap()
                .is_empty()
        );
    }
}
