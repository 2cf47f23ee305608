use std::time::SystemTime;

use thiserror::Error;

use crate::dao::{
    dialogue_store::{DialogueGuard, DialogueTransition},
    models::{DialogueEntity, DialoguePhase, ParticipantId, Side, TurnEntity, TurnId},
};

/// Actions a participant can take against a dialogue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueAction {
    /// Take the respondent side of an open dialogue.
    Join {
        /// Participant asking to join.
        participant: ParticipantId,
    },
    /// Append the next argument.
    SubmitTurn {
        /// Participant claiming the turn.
        author: ParticipantId,
        /// Argument text.
        content: String,
    },
    /// Fill the caller's conclusion slot while scoring.
    SubmitConclusion {
        /// Participant concluding.
        participant: ParticipantId,
        /// Closing text.
        text: String,
    },
}

/// Reasons an action is rejected by the current dialogue state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// Join attempted on a dialogue that already has a respondent.
    #[error("dialogue is {phase}, only open dialogues can be joined")]
    NotOpen {
        /// Phase observed when planning.
        phase: DialoguePhase,
    },
    /// The challenger tried to take the respondent side too.
    #[error("a participant cannot join their own dialogue")]
    SelfJoin,
    /// Turn submitted outside `in_progress`.
    #[error("dialogue is {phase}, turns are only accepted in_progress")]
    NotInProgress {
        /// Phase observed when planning.
        phase: DialoguePhase,
    },
    /// Turn submitted by the side that does not own the current index.
    #[error("not your turn (turn {index} belongs to the {side:?})")]
    NotYourTurn {
        /// Index that was up for submission.
        index: u32,
        /// Side owning that index.
        side: Side,
    },
    /// Conclusion submitted outside `scoring`.
    #[error("dialogue is {phase}, conclusions are only accepted while scoring")]
    NotScoring {
        /// Phase observed when planning.
        phase: DialoguePhase,
    },
    /// Conclusion submitted by someone holding neither side.
    #[error("only the two sides of a dialogue may conclude it")]
    NotASide,
    /// The caller's side already has a conclusion.
    #[error("the {side:?} conclusion was already submitted")]
    AlreadyConcluded {
        /// Side whose slot is full.
        side: Side,
    },
}

/// A validated transition, ready to be written with compare-and-set semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Phase when the plan was computed.
    pub from: DialoguePhase,
    /// Phase after the plan is applied.
    pub to: DialoguePhase,
    /// Guarded write handed to the store.
    pub transition: DialogueTransition,
}

/// Derive who must submit the next turn.
///
/// The challenger owns even counter values and the respondent odd ones. Nobody
/// acts outside `in_progress`.
pub fn next_actor(
    phase: DialoguePhase,
    current_turn: u32,
    challenger: ParticipantId,
    respondent: Option<ParticipantId>,
) -> Option<ParticipantId> {
    if phase != DialoguePhase::InProgress {
        return None;
    }
    match Side::for_turn(current_turn) {
        Side::Challenger => Some(challenger),
        Side::Respondent => respondent,
    }
}

/// State machine over one persisted dialogue row.
///
/// Planning never mutates anything; it only computes the row the store should
/// hold next and the guard that row must still satisfy.
#[derive(Debug, Clone)]
pub struct DialogueStateMachine {
    dialogue: DialogueEntity,
}

impl DialogueStateMachine {
    /// Wrap the current row of a dialogue.
    pub fn new(dialogue: DialogueEntity) -> Self {
        Self { dialogue }
    }

    /// Current phase.
    pub fn phase(&self) -> DialoguePhase {
        self.dialogue.phase
    }

    /// Participant expected to submit the next turn, if any.
    pub fn next_actor(&self) -> Option<ParticipantId> {
        next_actor(
            self.dialogue.phase,
            self.dialogue.current_turn,
            self.dialogue.challenger_id,
            self.dialogue.respondent_id,
        )
    }

    /// Validate `action` against the wrapped row and compute the resulting plan.
    pub fn plan(&self, action: DialogueAction, now: SystemTime) -> Result<Plan, TransitionError> {
        let guard = DialogueGuard::of(&self.dialogue);
        let mut next = self.dialogue.clone();
        let mut turn = None;

        match action {
            DialogueAction::Join { participant } => {
                if self.dialogue.phase != DialoguePhase::Open {
                    return Err(TransitionError::NotOpen {
                        phase: self.dialogue.phase,
                    });
                }
                if participant == self.dialogue.challenger_id {
                    return Err(TransitionError::SelfJoin);
                }
                next.respondent_id = Some(participant);
                next.phase = DialoguePhase::InProgress;
            }
            DialogueAction::SubmitTurn { author, content } => {
                if self.dialogue.phase != DialoguePhase::InProgress {
                    return Err(TransitionError::NotInProgress {
                        phase: self.dialogue.phase,
                    });
                }
                let index = self.dialogue.current_turn;
                if self.next_actor() != Some(author) {
                    return Err(TransitionError::NotYourTurn {
                        index,
                        side: Side::for_turn(index),
                    });
                }
                turn = Some(TurnEntity {
                    id: TurnId::generate(),
                    dialogue_id: self.dialogue.id,
                    author_id: author,
                    content,
                    index,
                    created_at: now,
                });
                next.current_turn = index + 1;
                if next.current_turn >= next.turn_capacity() {
                    next.phase = DialoguePhase::Scoring;
                }
            }
            DialogueAction::SubmitConclusion { participant, text } => {
                if self.dialogue.phase != DialoguePhase::Scoring {
                    return Err(TransitionError::NotScoring {
                        phase: self.dialogue.phase,
                    });
                }
                let side = self
                    .dialogue
                    .side_of(participant)
                    .ok_or(TransitionError::NotASide)?;
                if self.dialogue.conclusion(side).is_some() {
                    return Err(TransitionError::AlreadyConcluded { side });
                }
                match side {
                    Side::Challenger => next.challenger_conclusion = Some(text),
                    Side::Respondent => next.respondent_conclusion = Some(text),
                }
                if next.challenger_conclusion.is_some() && next.respondent_conclusion.is_some() {
                    next.phase = DialoguePhase::Concluded;
                    next.concluded_at = Some(now);
                }
            }
        }

        Ok(Plan {
            from: self.dialogue.phase,
            to: next.phase,
            transition: DialogueTransition { guard, next, turn },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::DialogueId;

    fn open_dialogue(budget: u32) -> DialogueEntity {
        DialogueEntity {
            id: DialogueId::generate(),
            proposition: "X".into(),
            phase: DialoguePhase::Open,
            challenger_id: ParticipantId::generate(),
            respondent_id: None,
            turn_budget: budget,
            current_turn: 0,
            challenger_conclusion: None,
            respondent_conclusion: None,
            created_at: SystemTime::now(),
            concluded_at: None,
        }
    }

    fn apply(dialogue: DialogueEntity, action: DialogueAction) -> DialogueEntity {
        DialogueStateMachine::new(dialogue)
            .plan(action, SystemTime::now())
            .unwrap()
            .transition
            .next
    }

    fn turn(author: ParticipantId) -> DialogueAction {
        DialogueAction::SubmitTurn {
            author,
            content: "argument".into(),
        }
    }

    fn conclude(participant: ParticipantId) -> DialogueAction {
        DialogueAction::SubmitConclusion {
            participant,
            text: "closing".into(),
        }
    }

    #[test]
    fn huge_budget_capacity_saturates() {
        assert_eq!(open_dialogue(u32::MAX).turn_capacity(), u32::MAX);
        assert_eq!(open_dialogue(3).turn_capacity(), 6);
    }

    #[test]
    fn full_lifecycle_walks_every_phase() {
        let dialogue = open_dialogue(2);
        let a = dialogue.challenger_id;
        let b = ParticipantId::generate();

        let mut dialogue = apply(dialogue, DialogueAction::Join { participant: b });
        assert_eq!(dialogue.phase, DialoguePhase::InProgress);
        assert_eq!(dialogue.respondent_id, Some(b));

        for author in [a, b, a] {
            dialogue = apply(dialogue, turn(author));
            assert_eq!(dialogue.phase, DialoguePhase::InProgress);
        }
        dialogue = apply(dialogue, turn(b));
        assert_eq!(dialogue.current_turn, 4);
        assert_eq!(dialogue.phase, DialoguePhase::Scoring);

        dialogue = apply(dialogue, conclude(a));
        assert_eq!(dialogue.phase, DialoguePhase::Scoring);
        assert!(dialogue.concluded_at.is_none());

        dialogue = apply(dialogue, conclude(b));
        assert_eq!(dialogue.phase, DialoguePhase::Concluded);
        assert!(dialogue.concluded_at.is_some());
    }

    #[test]
    fn turn_plan_carries_index_and_author() {
        let dialogue = open_dialogue(1);
        let a = dialogue.challenger_id;
        let dialogue = apply(
            dialogue,
            DialogueAction::Join {
                participant: ParticipantId::generate(),
            },
        );

        let plan = DialogueStateMachine::new(dialogue.clone())
            .plan(turn(a), SystemTime::now())
            .unwrap();
        let turn = plan.transition.turn.unwrap();
        assert_eq!(turn.index, 0);
        assert_eq!(turn.author_id, a);
        assert_eq!(turn.dialogue_id, dialogue.id);
        assert_eq!(plan.transition.guard, DialogueGuard::of(&dialogue));
    }

    #[test]
    fn wrong_side_is_rejected() {
        let dialogue = open_dialogue(2);
        let b = ParticipantId::generate();
        let dialogue = apply(dialogue, DialogueAction::Join { participant: b });

        let err = DialogueStateMachine::new(dialogue)
            .plan(turn(b), SystemTime::now())
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotYourTurn {
                index: 0,
                side: Side::Challenger
            }
        );
    }

    #[test]
    fn outsider_cannot_take_a_turn() {
        let dialogue = open_dialogue(2);
        let dialogue = apply(
            dialogue,
            DialogueAction::Join {
                participant: ParticipantId::generate(),
            },
        );

        let err = DialogueStateMachine::new(dialogue)
            .plan(turn(ParticipantId::generate()), SystemTime::now())
            .unwrap_err();
        assert!(matches!(err, TransitionError::NotYourTurn { .. }));
    }

    #[test]
    fn self_join_is_rejected() {
        let dialogue = open_dialogue(2);
        let a = dialogue.challenger_id;
        let err = DialogueStateMachine::new(dialogue)
            .plan(DialogueAction::Join { participant: a }, SystemTime::now())
            .unwrap_err();
        assert_eq!(err, TransitionError::SelfJoin);
    }

    #[test]
    fn second_join_observes_in_progress() {
        let dialogue = apply(
            open_dialogue(2),
            DialogueAction::Join {
                participant: ParticipantId::generate(),
            },
        );
        let err = DialogueStateMachine::new(dialogue)
            .plan(
                DialogueAction::Join {
                    participant: ParticipantId::generate(),
                },
                SystemTime::now(),
            )
            .unwrap_err();
        assert_eq!(
            err,
            TransitionError::NotOpen {
                phase: DialoguePhase::InProgress
            }
        );
    }

    #[test]
    fn conclusions_are_guarded() {
        let dialogue = open_dialogue(1);
        let a = dialogue.challenger_id;
        let b = ParticipantId::generate();

        let early = DialogueStateMachine::new(dialogue.clone())
            .plan(conclude(a), SystemTime::now())
            .unwrap_err();
        assert_eq!(
            early,
            TransitionError::NotScoring {
                phase: DialoguePhase::Open
            }
        );

        let mut dialogue = apply(dialogue, DialogueAction::Join { participant: b });
        dialogue = apply(dialogue, turn(a));
        dialogue = apply(dialogue, turn(b));
        assert_eq!(dialogue.phase, DialoguePhase::Scoring);

        let outsider = DialogueStateMachine::new(dialogue.clone())
            .plan(conclude(ParticipantId::generate()), SystemTime::now())
            .unwrap_err();
        assert_eq!(outsider, TransitionError::NotASide);

        dialogue = apply(dialogue, conclude(a));
        let twice = DialogueStateMachine::new(dialogue.clone())
            .plan(conclude(a), SystemTime::now())
            .unwrap_err();
        assert_eq!(
            twice,
            TransitionError::AlreadyConcluded {
                side: Side::Challenger
            }
        );
        assert_eq!(dialogue.challenger_conclusion.as_deref(), Some("closing"));
    }

    #[test]
    fn next_actor_follows_parity() {
        let a = ParticipantId::generate();
        let b = ParticipantId::generate();
        assert_eq!(next_actor(DialoguePhase::Open, 0, a, None), None);
        assert_eq!(next_actor(DialoguePhase::InProgress, 0, a, Some(b)), Some(a));
        assert_eq!(next_actor(DialoguePhase::InProgress, 3, a, Some(b)), Some(b));
        assert_eq!(next_actor(DialoguePhase::Scoring, 4, a, Some(b)), None);
    }
}
