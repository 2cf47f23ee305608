//! Trophy awarding for concluded dialogues.
//!
//! The awarder runs from two places: a worker reacting to
//! [`DialogueEvent::Concluded`] and a periodic sweep that backfills anything the
//! worker missed. Both funnel into [`award_trophies_for_dialogue`]. The store
//! writes each `(dialogue, participant)` slot at most once, so reruns never
//! duplicate a trophy and an interrupted award is completed on the next run.

use std::{sync::Arc, time::SystemTime};

use futures::StreamExt;
use tokio::time::{MissedTickBehavior, interval};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};
use tracing::{debug, info, warn};

use crate::{
    dao::{
        dialogue_store::{DialogueFilter, ReactionFilter, TurnFilter},
        models::{
            DialogueEntity, DialogueId, DialoguePhase, LabelTally, ParticipantId, ReactionEntity,
            ReactionTarget, Side, TrophyEntity, TrophyId, TrophyKind, TurnEntity,
        },
    },
    error::ServiceError,
    services::reaction_service::tally_of,
    state::{AppState, DialogueEvent, SharedState, tally::total},
};

/// Result of one awarder invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwardOutcome {
    /// Trophies were written by this invocation.
    Awarded(Vec<TrophyEntity>),
    /// Nothing was written.
    Skipped(SkipReason),
}

/// Why the awarder did not write anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The dialogue does not exist.
    Missing,
    /// The dialogue has not reached `concluded`.
    NotConcluded,
    /// The dialogue lacks two distinct sides.
    IncompleteSides,
    /// Both sides already hold a trophy for the dialogue.
    AlreadyAwarded,
}

/// Reception of one side within one dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SideScore {
    /// Participant holding the side.
    pub participant_id: ParticipantId,
    /// Label counts on that side's turns.
    pub breakdown: LabelTally,
}

/// Decide trophy kinds for the two sides. Only a strictly greater total wins.
pub fn decide_awards(challenger: &SideScore, respondent: &SideScore) -> (TrophyKind, TrophyKind) {
    let challenger_total = total(&challenger.breakdown);
    let respondent_total = total(&respondent.breakdown);
    match challenger_total.cmp(&respondent_total) {
        std::cmp::Ordering::Greater => (TrophyKind::Winner, TrophyKind::Participant),
        std::cmp::Ordering::Less => (TrophyKind::Participant, TrophyKind::Winner),
        std::cmp::Ordering::Equal => (TrophyKind::Participant, TrophyKind::Participant),
    }
}

fn side_score(
    dialogue: &DialogueEntity,
    side: Side,
    turns: &[TurnEntity],
    reactions: &[ReactionEntity],
) -> Option<SideScore> {
    let participant_id = dialogue.participant_for(side)?;
    let targets: Vec<ReactionTarget> = turns
        .iter()
        .filter(|turn| Side::for_turn(turn.index) == side)
        .map(|turn| ReactionTarget::Turn(turn.id))
        .collect();
    let own: Vec<ReactionEntity> = reactions
        .iter()
        .filter(|reaction| targets.contains(&reaction.target))
        .cloned()
        .collect();
    Some(SideScore {
        participant_id,
        breakdown: tally_of(&own),
    })
}

/// Award trophies for one dialogue if it is concluded and has none yet.
pub async fn award_trophies_for_dialogue(
    state: &SharedState,
    dialogue_id: DialogueId,
) -> Result<AwardOutcome, ServiceError> {
    let store = state.require_dialogue_store().await?;

    let Some(dialogue) = store.find_dialogue(dialogue_id).await? else {
        return Ok(AwardOutcome::Skipped(SkipReason::Missing));
    };
    if dialogue.phase != DialoguePhase::Concluded {
        return Ok(AwardOutcome::Skipped(SkipReason::NotConcluded));
    }
    if dialogue.respondent_id.is_none_or(|respondent| respondent == dialogue.challenger_id) {
        return Ok(AwardOutcome::Skipped(SkipReason::IncompleteSides));
    }
    let holders = store.trophy_holders(dialogue_id).await?;
    let sides_held = [Some(dialogue.challenger_id), dialogue.respondent_id]
        .into_iter()
        .flatten()
        .all(|side| holders.contains(&side));
    if sides_held {
        return Ok(AwardOutcome::Skipped(SkipReason::AlreadyAwarded));
    }

    let turns = store
        .find_turns(TurnFilter::Dialogues(vec![dialogue_id]))
        .await?;
    let reactions = store
        .list_reactions(ReactionFilter::on_targets(
            turns.iter().map(|turn| ReactionTarget::Turn(turn.id)).collect(),
        ))
        .await?;

    let (Some(challenger), Some(respondent)) = (
        side_score(&dialogue, Side::Challenger, &turns, &reactions),
        side_score(&dialogue, Side::Respondent, &turns, &reactions),
    ) else {
        return Ok(AwardOutcome::Skipped(SkipReason::IncompleteSides));
    };
    let (challenger_kind, respondent_kind) = decide_awards(&challenger, &respondent);

    let awarded_at = SystemTime::now();
    let trophies: Vec<TrophyEntity> = [(challenger, challenger_kind), (respondent, respondent_kind)]
        .into_iter()
        .filter(|(score, _)| !holders.contains(&score.participant_id))
        .map(|(score, kind)| TrophyEntity {
            id: TrophyId::generate(),
            participant_id: score.participant_id,
            dialogue_id,
            kind,
            breakdown: score.breakdown,
            title: dialogue.proposition.clone(),
            awarded_at,
        })
        .collect();

    let trophies = store.insert_trophies(dialogue_id, trophies).await?;
    if trophies.is_empty() {
        debug!(%dialogue_id, "trophies were awarded concurrently");
        return Ok(AwardOutcome::Skipped(SkipReason::AlreadyAwarded));
    }

    for trophy in &trophies {
        info!(
            %dialogue_id,
            participant_id = %trophy.participant_id,
            kind = ?trophy.kind,
            received = total(&trophy.breakdown),
            "trophy awarded"
        );
    }
    Ok(AwardOutcome::Awarded(trophies))
}

/// Award every concluded dialogue still missing trophies. Returns how many were awarded.
///
/// A dialogue that fails is logged and left for the next sweep.
pub async fn sweep(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_dialogue_store().await?;
    let concluded = store
        .list_dialogues(DialogueFilter {
            phase: Some(DialoguePhase::Concluded),
            ..DialogueFilter::default()
        })
        .await?;

    let mut awarded = 0;
    for dialogue in concluded {
        match award_trophies_for_dialogue(state, dialogue.id).await {
            Ok(AwardOutcome::Awarded(_)) => awarded += 1,
            Ok(AwardOutcome::Skipped(_)) => {}
            Err(ServiceError::Degraded) => return Err(ServiceError::Degraded),
            Err(err) => {
                warn!(dialogue_id = %dialogue.id, error = %err, "trophy awarding failed during sweep");
            }
        }
    }
    Ok(awarded)
}

/// Spawn the worker consuming conclusion events from the bus.
pub fn spawn_trophy_worker(state: &Arc<AppState>) {
    let weak = Arc::downgrade(state);
    let mut events = BroadcastStream::new(state.events().subscribe());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let Some(state) = weak.upgrade() else {
                break;
            };
            match event {
                Ok(DialogueEvent::Concluded { dialogue_id }) => {
                    if let Err(err) = award_trophies_for_dialogue(&state, dialogue_id).await {
                        warn!(%dialogue_id, error = %err, "trophy awarding failed; the sweep will retry");
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "trophy worker lagged behind; the sweep will catch up");
                }
            }
        }
        debug!("trophy worker stopped");
    });
}

/// Spawn the periodic backfill sweep. The first run happens immediately.
pub fn spawn_trophy_sweep(state: &Arc<AppState>) {
    let weak = Arc::downgrade(state);
    let every = state.config().trophy_sweep_interval;
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(state) = weak.upgrade() else {
                break;
            };
            match sweep(&state).await {
                Ok(0) => {}
                Ok(awarded) => info!(awarded, "trophy sweep awarded dialogues"),
                Err(ServiceError::Degraded) => debug!("trophy sweep skipped while degraded"),
                Err(err) => warn!(error = %err, "trophy sweep failed"),
            }
        }
    });
}
