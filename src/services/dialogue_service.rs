use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use tracing::info;
use validator::Validate;

use crate::{
    dao::{
        dialogue_store::{DialogueFilter, DialogueStore, ReactionFilter, TurnFilter},
        models::{
            DialogueEntity, DialogueId, DialoguePhase, ParticipantEntity, ParticipantId,
            ReactionEntity, ReactionTarget, TurnEntity,
        },
        storage::StorageResult,
    },
    dto::{
        dialogue::{
            ConcludeDialogueRequest, CreateDialogueRequest, DialogueDetailResponse,
            DialogueResponse, DialogueSort, DialogueSummary, JoinDialogueRequest,
            ListDialoguesQuery, SubmitTurnRequest, SubmitTurnResponse, TurnView,
        },
        format_system_time,
    },
    error::ServiceError,
    services::{
        identity::{require_participant, resolve_caller},
        reaction_service::tally_of,
    },
    state::{
        SharedState,
        state_machine::{DialogueAction, next_actor},
        tally::top_labels,
        transitions::run_dialogue_transition,
    },
};

const SUMMARY_TOP_LABELS: usize = 3;

fn parse_dialogue_id(id: &str) -> Result<DialogueId, ServiceError> {
    id.parse()
        .map_err(|_| ServiceError::NotFound(format!("dialogue `{id}`")))
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ServiceError> {
    value.ok_or_else(|| ServiceError::InvalidInput(format!("`{field}` is required")))
}

/// Open a new dialogue with the caller as challenger.
pub async fn create_dialogue(
    state: &SharedState,
    bearer: Option<&str>,
    payload: CreateDialogueRequest,
) -> Result<DialogueResponse, ServiceError> {
    payload.validate()?;

    let proposition = required_text(payload.proposition, "proposition")?
        .trim()
        .to_owned();
    let config = state.config();
    let turn_budget = payload.turn_budget.unwrap_or(config.default_turn_budget);
    if !(1..=config.max_turn_budget).contains(&turn_budget) {
        return Err(ServiceError::InvalidInput(format!(
            "`turnBudget` must be between 1 and {}",
            config.max_turn_budget
        )));
    }

    let caller = resolve_caller(
        state,
        bearer,
        payload.challenger_id.as_deref(),
        "challengerId",
    )
    .await?;
    let challenger = require_participant(state, caller, "challenger").await?;

    let dialogue = DialogueEntity {
        id: DialogueId::generate(),
        proposition,
        phase: DialoguePhase::Open,
        challenger_id: challenger.id,
        respondent_id: None,
        turn_budget,
        current_turn: 0,
        challenger_conclusion: None,
        respondent_conclusion: None,
        created_at: SystemTime::now(),
        concluded_at: None,
    };

    let store = state.require_dialogue_store().await?;
    store.insert_dialogue(dialogue.clone()).await?;

    info!(
        dialogue_id = %dialogue.id,
        challenger_id = %dialogue.challenger_id,
        turn_budget,
        "dialogue opened"
    );
    Ok(dialogue.into())
}

/// Take the respondent side of an open dialogue.
pub async fn join_dialogue(
    state: &SharedState,
    id: &str,
    bearer: Option<&str>,
    payload: JoinDialogueRequest,
) -> Result<DialogueResponse, ServiceError> {
    let dialogue_id = parse_dialogue_id(id)?;
    let caller = resolve_caller(
        state,
        bearer,
        payload.participant_id.as_deref(),
        "participantId",
    )
    .await?;
    let participant = require_participant(state, caller, "participant").await?;

    let applied = run_dialogue_transition(
        state,
        dialogue_id,
        DialogueAction::Join {
            participant: participant.id,
        },
    )
    .await?;
    Ok(applied.dialogue.into())
}

/// Append the next turn. Only the side owning the current index may submit.
pub async fn submit_turn(
    state: &SharedState,
    id: &str,
    bearer: Option<&str>,
    payload: SubmitTurnRequest,
) -> Result<SubmitTurnResponse, ServiceError> {
    let dialogue_id = parse_dialogue_id(id)?;
    payload.validate()?;
    let content = required_text(payload.content, "content")?;
    let caller = resolve_caller(
        state,
        bearer,
        payload.participant_id.as_deref(),
        "participantId",
    )
    .await?;

    let applied = run_dialogue_transition(
        state,
        dialogue_id,
        DialogueAction::SubmitTurn {
            author: caller.id,
            content,
        },
    )
    .await?;
    let turn = applied.turn.ok_or_else(|| {
        ServiceError::InvalidState(format!("dialogue `{dialogue_id}` did not record the turn"))
    })?;

    Ok(SubmitTurnResponse {
        id: turn.id,
        index: turn.index,
        phase: applied.dialogue.phase,
    })
}

/// Fill the caller's conclusion slot while the dialogue is scoring.
pub async fn conclude_dialogue(
    state: &SharedState,
    id: &str,
    bearer: Option<&str>,
    payload: ConcludeDialogueRequest,
) -> Result<DialogueResponse, ServiceError> {
    let dialogue_id = parse_dialogue_id(id)?;
    payload.validate()?;
    let text = required_text(payload.conclusion, "conclusion")?;
    let caller = resolve_caller(
        state,
        bearer,
        payload.participant_id.as_deref(),
        "participantId",
    )
    .await?;

    let applied = run_dialogue_transition(
        state,
        dialogue_id,
        DialogueAction::SubmitConclusion {
            participant: caller.id,
            text,
        },
    )
    .await?;
    Ok(applied.dialogue.into())
}

/// Page of dialogue summaries.
pub async fn list_dialogues(
    state: &SharedState,
    query: ListDialoguesQuery,
) -> Result<Vec<DialogueSummary>, ServiceError> {
    let phase = query
        .phase
        .as_deref()
        .and_then(|phase| phase.trim().parse::<DialoguePhase>().ok());
    let limit = state.config().limits.dialogues.resolve(query.limit);
    let offset = query.offset.unwrap_or(0);

    let store = state.require_dialogue_store().await?;
    let dialogues = store
        .list_dialogues(DialogueFilter {
            phase,
            ..DialogueFilter::default()
        })
        .await?;

    let summaries = match query.sort.unwrap_or_default() {
        DialogueSort::Newest => {
            let page: Vec<DialogueEntity> =
                dialogues.into_iter().skip(offset).take(limit).collect();
            summarize(store.as_ref(), page).await?
        }
        DialogueSort::MostScored => {
            let mut all = summarize(store.as_ref(), dialogues).await?;
            // Stable sort keeps newest first among equal counts.
            all.sort_by(|a, b| b.reaction_count.cmp(&a.reaction_count));
            all.into_iter().skip(offset).take(limit).collect()
        }
    };
    Ok(summaries)
}

async fn summarize(
    store: &dyn DialogueStore,
    dialogues: Vec<DialogueEntity>,
) -> StorageResult<Vec<DialogueSummary>> {
    if dialogues.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<DialogueId> = dialogues.iter().map(|dialogue| dialogue.id).collect();
    let turns = store.find_turns(TurnFilter::Dialogues(ids.clone())).await?;
    let turn_owner: HashMap<ReactionTarget, DialogueId> = turns
        .iter()
        .map(|turn| (ReactionTarget::Turn(turn.id), turn.dialogue_id))
        .collect();
    let mut turn_counts: HashMap<DialogueId, u64> = HashMap::new();
    for turn in &turns {
        *turn_counts.entry(turn.dialogue_id).or_default() += 1;
    }

    let targets = ids
        .iter()
        .map(|id| ReactionTarget::Dialogue(*id))
        .chain(turn_owner.keys().copied())
        .collect();
    let reactions = store
        .list_reactions(ReactionFilter::on_targets(targets))
        .await?;
    let mut by_dialogue: HashMap<DialogueId, Vec<ReactionEntity>> = HashMap::new();
    for reaction in reactions {
        let owner = match reaction.target {
            ReactionTarget::Dialogue(id) => Some(id),
            target @ ReactionTarget::Turn(_) => turn_owner.get(&target).copied(),
        };
        if let Some(owner) = owner {
            by_dialogue.entry(owner).or_default().push(reaction);
        }
    }

    let names = participant_names(store, &dialogues).await?;
    let name_of = |id: Option<ParticipantId>| {
        id.and_then(|id| names.get(&id))
            .map(|participant| participant.display_name.clone())
    };

    Ok(dialogues
        .into_iter()
        .map(|dialogue| {
            let reactions = by_dialogue.remove(&dialogue.id).unwrap_or_default();
            let tally = tally_of(&reactions);
            DialogueSummary {
                id: dialogue.id,
                challenger_name: name_of(Some(dialogue.challenger_id)),
                respondent_name: name_of(dialogue.respondent_id),
                turn_count: turn_counts.get(&dialogue.id).copied().unwrap_or(0),
                reaction_count: reactions.len() as u64,
                top_labels: top_labels(&tally, SUMMARY_TOP_LABELS),
                proposition: dialogue.proposition,
                phase: dialogue.phase,
                turn_budget: dialogue.turn_budget,
                current_turn: dialogue.current_turn,
                created_at: format_system_time(dialogue.created_at),
            }
        })
        .collect())
}

async fn participant_names(
    store: &dyn DialogueStore,
    dialogues: &[DialogueEntity],
) -> StorageResult<HashMap<ParticipantId, ParticipantEntity>> {
    let ids: HashSet<ParticipantId> = dialogues
        .iter()
        .flat_map(|dialogue| [Some(dialogue.challenger_id), dialogue.respondent_id])
        .flatten()
        .collect();
    Ok(store
        .find_participants(ids.into_iter().collect())
        .await?
        .into_iter()
        .map(|participant| (participant.id, participant))
        .collect())
}

/// Full read of one dialogue with its turns and reaction tallies.
pub async fn get_dialogue(
    state: &SharedState,
    id: &str,
) -> Result<DialogueDetailResponse, ServiceError> {
    let dialogue_id = parse_dialogue_id(id)?;
    let store = state.require_dialogue_store().await?;
    let dialogue = store
        .find_dialogue(dialogue_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("dialogue `{dialogue_id}`")))?;

    let turns = store
        .find_turns(TurnFilter::Dialogues(vec![dialogue_id]))
        .await?;
    let targets = std::iter::once(ReactionTarget::Dialogue(dialogue_id))
        .chain(turns.iter().map(|turn| ReactionTarget::Turn(turn.id)))
        .collect();
    let reactions = store
        .list_reactions(ReactionFilter::on_targets(targets))
        .await?;

    let mut names = participant_names(store.as_ref(), std::slice::from_ref(&dialogue)).await?;
    let challenger = names.remove(&dialogue.challenger_id).map(Into::into);
    let respondent = dialogue
        .respondent_id
        .and_then(|id| names.remove(&id))
        .map(Into::into);

    let next_participant_id = next_actor(
        dialogue.phase,
        dialogue.current_turn,
        dialogue.challenger_id,
        dialogue.respondent_id,
    );

    Ok(DialogueDetailResponse {
        turns: turn_views(turns, &reactions),
        reactions: tally_of(
            &reactions
                .iter()
                .filter(|reaction| reaction.target == ReactionTarget::Dialogue(dialogue_id))
                .cloned()
                .collect::<Vec<_>>(),
        ),
        dialogue: dialogue.into(),
        challenger,
        respondent,
        next_participant_id,
    })
}

fn turn_views(turns: Vec<TurnEntity>, reactions: &[ReactionEntity]) -> Vec<TurnView> {
    turns
        .into_iter()
        .map(|turn| {
            let target = ReactionTarget::Turn(turn.id);
            let own: Vec<ReactionEntity> = reactions
                .iter()
                .filter(|reaction| reaction.target == target)
                .cloned()
                .collect();
            TurnView::new(turn, tally_of(&own))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            dialogue_store::memory::MemoryDialogueStore,
            models::{Disclosure, ParticipantKind, ReactionId, Side},
        },
        state::AppState,
    };

    struct Fixture {
        state: SharedState,
        store: Arc<MemoryDialogueStore>,
        alice: ParticipantId,
        bob: ParticipantId,
    }

    async fn participant(store: &MemoryDialogueStore, name: &str) -> ParticipantId {
        let entity = ParticipantEntity {
            id: ParticipantId::generate(),
            kind: ParticipantKind::Human,
            disclosure: Disclosure::Named,
            display_name: name.into(),
            model: None,
            credential_hash: None,
            created_at: SystemTime::now(),
        };
        store.insert_participant(entity.clone()).await.unwrap();
        entity.id
    }

    async fn fixture() -> Fixture {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryDialogueStore::new());
        let alice = participant(&store, "Alice").await;
        let bob = participant(&store, "Bob").await;
        state.set_dialogue_store(store.clone()).await;
        Fixture {
            state,
            store,
            alice,
            bob,
        }
    }

    fn create(challenger: ParticipantId, budget: Option<u32>) -> CreateDialogueRequest {
        CreateDialogueRequest {
            proposition: Some("Tabs beat spaces".into()),
            challenger_id: Some(challenger.to_string()),
            turn_budget: budget,
        }
    }

    fn turn(author: ParticipantId, content: &str) -> SubmitTurnRequest {
        SubmitTurnRequest {
            participant_id: Some(author.to_string()),
            content: Some(content.into()),
        }
    }

    fn join(participant: ParticipantId) -> JoinDialogueRequest {
        JoinDialogueRequest {
            participant_id: Some(participant.to_string()),
        }
    }

    #[tokio::test]
    async fn create_uses_default_budget_and_rejects_out_of_range() {
        let fx = fixture().await;
        let dialogue = create_dialogue(&fx.state, None, create(fx.alice, None))
            .await
            .unwrap();
        assert_eq!(dialogue.turn_budget, 5);
        assert_eq!(dialogue.phase, DialoguePhase::Open);

        for budget in [0, 51] {
            let err = create_dialogue(&fx.state, None, create(fx.alice, Some(budget)))
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn create_requires_a_known_challenger() {
        let fx = fixture().await;
        let err = create_dialogue(&fx.state, None, create(ParticipantId::generate(), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));

        let blank = CreateDialogueRequest {
            proposition: Some("  ".into()),
            ..create(fx.alice, None)
        };
        let err = create_dialogue(&fx.state, None, blank).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn one_round_dialogue_reaches_concluded() {
        let fx = fixture().await;
        let id = create_dialogue(&fx.state, None, create(fx.alice, Some(1)))
            .await
            .unwrap()
            .id
            .to_string();

        let joined = join_dialogue(&fx.state, &id, None, join(fx.bob))
            .await
            .unwrap();
        assert_eq!(joined.phase, DialoguePhase::InProgress);
        assert_eq!(joined.respondent_id, Some(fx.bob));

        let first = submit_turn(&fx.state, &id, None, turn(fx.alice, "opening"))
            .await
            .unwrap();
        assert_eq!((first.index, first.phase), (0, DialoguePhase::InProgress));
        let second = submit_turn(&fx.state, &id, None, turn(fx.bob, "rebuttal"))
            .await
            .unwrap();
        assert_eq!((second.index, second.phase), (1, DialoguePhase::Scoring));

        let conclude = |who: ParticipantId| ConcludeDialogueRequest {
            participant_id: Some(who.to_string()),
            conclusion: Some("done".into()),
        };
        let scoring = conclude_dialogue(&fx.state, &id, None, conclude(fx.alice))
            .await
            .unwrap();
        assert_eq!(scoring.phase, DialoguePhase::Scoring);
        let err = conclude_dialogue(&fx.state, &id, None, conclude(fx.alice))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let concluded = conclude_dialogue(&fx.state, &id, None, conclude(fx.bob))
            .await
            .unwrap();
        assert_eq!(concluded.phase, DialoguePhase::Concluded);
        assert!(concluded.concluded_at.is_some());
    }

    #[tokio::test]
    async fn turn_order_and_self_join_are_enforced() {
        let fx = fixture().await;
        let id = create_dialogue(&fx.state, None, create(fx.alice, None))
            .await
            .unwrap()
            .id
            .to_string();

        let err = join_dialogue(&fx.state, &id, None, join(fx.alice))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let err = submit_turn(&fx.state, &id, None, turn(fx.alice, "too early"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        join_dialogue(&fx.state, &id, None, join(fx.bob))
            .await
            .unwrap();
        let err = submit_turn(&fx.state, &id, None, turn(fx.bob, "me first"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let err = submit_turn(&fx.state, &id, None, turn(fx.alice, "   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn unknown_or_malformed_dialogue_is_not_found() {
        let fx = fixture().await;
        for id in ["garbage".to_string(), DialogueId::generate().to_string()] {
            assert!(matches!(
                get_dialogue(&fx.state, &id).await.unwrap_err(),
                ServiceError::NotFound(_)
            ));
            assert!(matches!(
                join_dialogue(&fx.state, &id, None, join(fx.bob))
                    .await
                    .unwrap_err(),
                ServiceError::NotFound(_)
            ));
        }
    }

    #[tokio::test]
    async fn detail_carries_turn_tallies_and_next_actor() {
        let fx = fixture().await;
        let id = create_dialogue(&fx.state, None, create(fx.alice, None))
            .await
            .unwrap()
            .id;
        let path = id.to_string();
        join_dialogue(&fx.state, &path, None, join(fx.bob))
            .await
            .unwrap();
        let first = submit_turn(&fx.state, &path, None, turn(fx.alice, "opening"))
            .await
            .unwrap();

        for (target, label) in [
            (ReactionTarget::Turn(first.id), "🔥"),
            (ReactionTarget::Turn(first.id), "🔥"),
            (ReactionTarget::Dialogue(id), "fun"),
        ] {
            fx.store
                .insert_reaction(ReactionEntity {
                    id: ReactionId::generate(),
                    target,
                    reactor_id: fx.bob,
                    label: label.into(),
                    created_at: SystemTime::now(),
                    reactor_profile: None,
                })
                .await
                .unwrap();
        }

        let detail = get_dialogue(&fx.state, &path).await.unwrap();
        assert_eq!(detail.next_participant_id, Some(fx.bob));
        assert_eq!(detail.turns.len(), 1);
        assert_eq!(detail.turns[0].side, Side::Challenger);
        assert_eq!(detail.turns[0].reactions.get("🔥"), Some(&2));
        assert_eq!(detail.reactions.get("fun"), Some(&1));
        assert_eq!(
            detail.challenger.as_ref().map(|p| p.display_name.as_str()),
            Some("Alice")
        );

        let summaries = list_dialogues(&fx.state, ListDialoguesQuery::default())
            .await
            .unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].reaction_count, 3);
        assert_eq!(summaries[0].turn_count, 1);
        assert_eq!(summaries[0].top_labels, vec!["🔥", "fun"]);
        assert_eq!(summaries[0].respondent_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn listing_filters_sorts_and_pages() {
        let fx = fixture().await;
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                create_dialogue(&fx.state, None, create(fx.alice, None))
                    .await
                    .unwrap()
                    .id,
            );
        }
        join_dialogue(&fx.state, &ids[0].to_string(), None, join(fx.bob))
            .await
            .unwrap();
        fx.store
            .insert_reaction(ReactionEntity {
                id: ReactionId::generate(),
                target: ReactionTarget::Dialogue(ids[0]),
                reactor_id: fx.bob,
                label: "good".into(),
                created_at: SystemTime::now(),
                reactor_profile: None,
            })
            .await
            .unwrap();

        let open = list_dialogues(
            &fx.state,
            ListDialoguesQuery {
                phase: Some("open".into()),
                ..ListDialoguesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(open.len(), 2);

        let unknown_phase = list_dialogues(
            &fx.state,
            ListDialoguesQuery {
                phase: Some("bogus".into()),
                ..ListDialoguesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(unknown_phase.len(), 3);

        let scored = list_dialogues(
            &fx.state,
            ListDialoguesQuery {
                sort: Some(DialogueSort::MostScored),
                limit: Some(1),
                ..ListDialoguesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].id, ids[0]);

        let paged = list_dialogues(
            &fx.state,
            ListDialoguesQuery {
                offset: Some(2),
                ..ListDialoguesQuery::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(paged.len(), 1);
    }
}
