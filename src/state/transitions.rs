use std::time::SystemTime;

use tracing::{debug, info};

use crate::{
    dao::{
        dialogue_store::TransitionOutcome,
        models::{DialogueEntity, DialogueId, DialoguePhase, TurnEntity},
    },
    error::ServiceError,
    state::{
        DialogueEvent, SharedState,
        state_machine::{DialogueAction, DialogueStateMachine, Plan},
    },
};

/// Lost compare-and-set races tolerated before giving up.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// Row written by a successful transition, plus the turn it appended.
#[derive(Debug, Clone)]
pub struct AppliedTransition {
    /// Dialogue as stored after the write.
    pub dialogue: DialogueEntity,
    /// Turn persisted with the write, for turn submissions.
    pub turn: Option<TurnEntity>,
}

/// Load a dialogue, plan `action` against it and persist the plan with
/// compare-and-set semantics.
///
/// When another writer wins the race the row is re-read and re-planned, so the
/// caller receives the error matching the state it lost to. Reaching
/// `concluded` publishes [`DialogueEvent::Concluded`].
pub async fn run_dialogue_transition(
    state: &SharedState,
    dialogue_id: DialogueId,
    action: DialogueAction,
) -> Result<AppliedTransition, ServiceError> {
    let store = state.require_dialogue_store().await?;

    for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
        let dialogue = store
            .find_dialogue(dialogue_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("dialogue `{dialogue_id}`")))?;

        let Plan {
            from,
            to,
            transition,
        } = DialogueStateMachine::new(dialogue).plan(action.clone(), SystemTime::now())?;
        let turn = transition.turn.clone();

        match store.apply_transition(transition).await? {
            TransitionOutcome::Applied(dialogue) => {
                info!(
                    dialogue_id = %dialogue.id,
                    from = %from,
                    to = %to,
                    current_turn = dialogue.current_turn,
                    "dialogue transition applied"
                );
                if to == DialoguePhase::Concluded && from != DialoguePhase::Concluded {
                    state.events().publish(DialogueEvent::Concluded {
                        dialogue_id: dialogue.id,
                    });
                }
                return Ok(AppliedTransition { dialogue, turn });
            }
            TransitionOutcome::Conflict => {
                debug!(%dialogue_id, attempt, "dialogue changed concurrently; re-planning");
            }
            TransitionOutcome::Missing => {
                return Err(ServiceError::NotFound(format!("dialogue `{dialogue_id}`")));
            }
        }
    }

    Err(ServiceError::InvalidState(format!(
        "dialogue `{dialogue_id}` is being modified concurrently; retry"
    )))
}
