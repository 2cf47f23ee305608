use std::{collections::HashMap, time::SystemTime};

use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        dialogue_store::{DialogueStore, ReactionFilter, TurnFilter},
        models::{
            LabelTally, ParticipantId, ReactionEntity, ReactionId, ReactionTarget, TargetKind,
        },
        storage::StorageResult,
    },
    dto::{
        participant::ScorerBreakdown,
        reaction::{AddReactionRequest, DimensionEntry, DimensionsQuery, ReactionResponse},
    },
    error::ServiceError,
    services::identity::{parse_body_id, require_participant, resolve_caller},
    state::{
        SharedState,
        tally::{rank_by_total, tally_labels},
    },
};

/// Reactions attached to any turn authored by `participant`, across all dialogues.
pub async fn reactions_received(
    store: &dyn DialogueStore,
    participant: ParticipantId,
) -> StorageResult<Vec<ReactionEntity>> {
    let turns = store.find_turns(TurnFilter::Author(participant)).await?;
    let targets = turns
        .iter()
        .map(|turn| ReactionTarget::Turn(turn.id))
        .collect();
    store.list_reactions(ReactionFilter::on_targets(targets)).await
}

/// Label counts of a set of reactions.
pub fn tally_of(reactions: &[ReactionEntity]) -> LabelTally {
    tally_labels(reactions.iter().map(|reaction| reaction.label.as_str()))
}

/// Group reactions by reactor, heaviest scorer first, keeping at most `cap` scorers.
///
/// Display names are resolved from the store; a missing record leaves the name empty.
pub async fn scored_by(
    store: &dyn DialogueStore,
    reactions: &[ReactionEntity],
    cap: usize,
) -> StorageResult<Vec<ScorerBreakdown>> {
    let mut by_reactor: HashMap<ParticipantId, Vec<&str>> = HashMap::new();
    for reaction in reactions {
        by_reactor
            .entry(reaction.reactor_id)
            .or_default()
            .push(reaction.label.as_str());
    }

    let mut ranked: Vec<(ParticipantId, u64)> = by_reactor
        .iter()
        .map(|(reactor, labels)| (*reactor, labels.len() as u64))
        .collect();
    rank_by_total(&mut ranked);
    ranked.truncate(cap);

    let ids: Vec<ParticipantId> = ranked.iter().map(|(id, _)| *id).collect();
    let names: HashMap<ParticipantId, String> = store
        .find_participants(ids)
        .await?
        .into_iter()
        .map(|participant| (participant.id, participant.display_name))
        .collect();

    Ok(ranked
        .into_iter()
        .map(|(reactor_id, total)| ScorerBreakdown {
            reactor_id,
            display_name: names.get(&reactor_id).cloned(),
            total,
            labels: tally_labels(by_reactor.get(&reactor_id).into_iter().flatten().copied()),
        })
        .collect())
}

/// Append a reaction. The target id must be well formed but is not checked for existence.
pub async fn add_reaction(
    state: &SharedState,
    bearer: Option<&str>,
    payload: AddReactionRequest,
) -> Result<ReactionResponse, ServiceError> {
    payload.validate()?;

    let kind = payload
        .target_kind
        .as_deref()
        .map(str::trim)
        .filter(|kind| !kind.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput("`targetKind` is required".into()))?
        .parse::<TargetKind>()
        .map_err(|_| {
            ServiceError::InvalidInput("`targetKind` must be `turn` or `dialogue`".into())
        })?;
    let target_id: Uuid = parse_body_id(payload.target_id.as_deref(), "targetId")?;
    let label = payload
        .label
        .ok_or_else(|| ServiceError::InvalidInput("`label` is required".into()))?;

    let caller = resolve_caller(state, bearer, payload.reactor_id.as_deref(), "reactorId").await?;
    let reactor = require_participant(state, caller, "reactor").await?;

    let store = state.require_dialogue_store().await?;
    let profile = tally_of(&reactions_received(store.as_ref(), reactor.id).await?);

    let reaction = ReactionEntity {
        id: ReactionId::generate(),
        target: ReactionTarget::new(kind, target_id),
        reactor_id: reactor.id,
        label,
        created_at: SystemTime::now(),
        reactor_profile: (!profile.is_empty()).then_some(profile),
    };
    store.insert_reaction(reaction.clone()).await?;

    info!(
        reaction_id = %reaction.id,
        target_kind = ?kind,
        %target_id,
        reactor_id = %reaction.reactor_id,
        label = %reaction.label,
        "reaction recorded"
    );
    Ok(reaction.into())
}

/// Every label ever used, with global counts, most used first.
pub async fn list_dimensions(
    state: &SharedState,
    query: DimensionsQuery,
) -> Result<Vec<DimensionEntry>, ServiceError> {
    let limit = state.config().limits.dimensions.resolve(query.limit);
    let store = state.require_dialogue_store().await?;
    let reactions = store.list_reactions(ReactionFilter::default()).await?;

    Ok(tally_of(&reactions)
        .into_iter()
        .take(limit)
        .map(|(dimension, count)| DimensionEntry { dimension, count })
        .collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            dialogue_store::memory::MemoryDialogueStore,
            models::{DialogueId, Disclosure, ParticipantEntity, ParticipantKind},
        },
        state::AppState,
    };

    async fn state_with_reactor() -> (SharedState, ParticipantEntity) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryDialogueStore::new();
        let reactor = ParticipantEntity {
            id: ParticipantId::generate(),
            kind: ParticipantKind::Human,
            disclosure: Disclosure::Pseudonymous,
            display_name: "judge".into(),
            model: None,
            credential_hash: None,
            created_at: SystemTime::now(),
        };
        store.insert_participant(reactor.clone()).await.unwrap();
        state.set_dialogue_store(Arc::new(store)).await;
        (state, reactor)
    }

    fn request(reactor: &ParticipantEntity, kind: &str, label: &str) -> AddReactionRequest {
        AddReactionRequest {
            target_kind: Some(kind.into()),
            target_id: Some(DialogueId::generate().to_string()),
            reactor_id: Some(reactor.id.to_string()),
            label: Some(label.into()),
        }
    }

    #[tokio::test]
    async fn unknown_target_kind_is_invalid_input() {
        let (state, reactor) = state_with_reactor().await;
        let err = add_reaction(&state, None, request(&reactor, "comment", "🔥"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn blank_label_is_invalid_input() {
        let (state, reactor) = state_with_reactor().await;
        let err = add_reaction(&state, None, request(&reactor, "dialogue", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_reactor_is_not_found() {
        let (state, _) = state_with_reactor().await;
        let payload = AddReactionRequest {
            target_kind: Some("turn".into()),
            target_id: Some(Uuid::new_v4().to_string()),
            reactor_id: Some(ParticipantId::generate().to_string()),
            label: Some("🔥".into()),
        };
        let err = add_reaction(&state, None, payload).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn dimensions_count_every_reaction() {
        let (state, reactor) = state_with_reactor().await;
        for label in ["clear", "🔥", "clear", "clear", "🔥", "weak"] {
            add_reaction(&state, None, request(&reactor, "dialogue", label))
                .await
                .unwrap();
        }

        let dimensions = list_dimensions(&state, DimensionsQuery { limit: Some(2) })
            .await
            .unwrap();
        assert_eq!(
            dimensions,
            vec![
                DimensionEntry {
                    dimension: "clear".into(),
                    count: 3
                },
                DimensionEntry {
                    dimension: "🔥".into(),
                    count: 2
                },
            ]
        );
    }
}
