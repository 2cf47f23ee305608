use std::time::SystemTime;

use tracing::info;
use validator::Validate;

use crate::{
    dao::{
        dialogue_store::{DialogueFilter, TurnFilter},
        models::{
            DialoguePhase, Disclosure, ParticipantEntity, ParticipantId, ParticipantKind,
        },
    },
    dto::{
        format_system_time,
        participant::{
            ParticipantProfileResponse, ParticipantStats, RecentDialogue,
            RegisterParticipantRequest, RegisteredParticipantResponse,
        },
        trophy::TrophyResponse,
    },
    error::ServiceError,
    services::{
        identity::{generate_credential, hash_credential},
        reaction_service::{reactions_received, scored_by, tally_of},
    },
    state::SharedState,
};

/// Register a participant. Bots receive a credential that is returned only here.
pub async fn register_participant(
    state: &SharedState,
    payload: RegisterParticipantRequest,
) -> Result<RegisteredParticipantResponse, ServiceError> {
    payload.validate()?;

    let kind: ParticipantKind = parse_choice(payload.kind.as_deref(), "kind", "`human` or `bot`")?;
    let disclosure: Disclosure = parse_choice(
        payload.disclosure.as_deref(),
        "disclosure",
        "`anonymous`, `pseudonymous` or `named`",
    )?;
    let display_name = payload
        .display_name
        .map(|name| name.trim().to_owned())
        .ok_or_else(|| ServiceError::InvalidInput("`displayName` is required".into()))?;

    let (model, credential) = match kind {
        ParticipantKind::Bot => (
            payload
                .model
                .map(|model| model.trim().to_owned())
                .filter(|model| !model.is_empty()),
            Some(generate_credential()),
        ),
        ParticipantKind::Human => (None, None),
    };

    let participant = ParticipantEntity {
        id: ParticipantId::generate(),
        kind,
        disclosure,
        display_name,
        model,
        credential_hash: credential
            .as_deref()
            .map(|credential| hash_credential(&state.config().credential_salt, credential)),
        created_at: SystemTime::now(),
    };

    let store = state.require_dialogue_store().await?;
    store.insert_participant(participant.clone()).await?;

    info!(
        participant_id = %participant.id,
        kind = ?participant.kind,
        "participant registered"
    );

    Ok(RegisteredParticipantResponse {
        participant: participant.into(),
        api_key: credential,
    })
}

fn parse_choice<T: std::str::FromStr>(
    value: Option<&str>,
    field: &str,
    allowed: &str,
) -> Result<T, ServiceError> {
    let raw = value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput(format!("`{field}` is required")))?;
    raw.parse()
        .map_err(|_| ServiceError::InvalidInput(format!("`{field}` must be {allowed}")))
}

/// Participant record with activity and reception statistics.
pub async fn get_profile(
    state: &SharedState,
    id: &str,
) -> Result<ParticipantProfileResponse, ServiceError> {
    let not_found = || ServiceError::NotFound(format!("participant `{id}`"));
    let participant_id: ParticipantId = id.parse().map_err(|_| not_found())?;

    let store = state.require_dialogue_store().await?;
    let participant = store
        .find_participant(participant_id)
        .await?
        .ok_or_else(not_found)?;

    let dialogues = store
        .list_dialogues(DialogueFilter {
            participant: Some(participant_id),
            ..DialogueFilter::default()
        })
        .await?;
    let concluded = dialogues
        .iter()
        .filter(|dialogue| dialogue.phase == DialoguePhase::Concluded)
        .count() as u64;

    let turns = store
        .find_turns(TurnFilter::Author(participant_id))
        .await?
        .len() as u64;
    let received = reactions_received(store.as_ref(), participant_id).await?;
    let limits = &state.config().limits;
    let scorers = scored_by(store.as_ref(), &received, limits.scored_by_cap).await?;

    let recent_dialogues = dialogues
        .iter()
        .filter_map(|dialogue| {
            dialogue.side_of(participant_id).map(|role| RecentDialogue {
                id: dialogue.id,
                proposition: dialogue.proposition.clone(),
                phase: dialogue.phase,
                role,
                created_at: format_system_time(dialogue.created_at),
            })
        })
        .take(limits.recent_dialogues)
        .collect();

    Ok(ParticipantProfileResponse {
        participant: participant.into(),
        stats: ParticipantStats {
            dialogues: dialogues.len() as u64,
            concluded,
            completion_rate: completion_rate(concluded, dialogues.len() as u64),
            turns,
            reactions_received: tally_of(&received),
            scored_by: scorers,
            recent_dialogues,
        },
    })
}

fn completion_rate(concluded: u64, dialogues: u64) -> u64 {
    if dialogues == 0 {
        return 0;
    }
    (concluded * 200 + dialogues) / (dialogues * 2)
}

/// Trophies of a participant, newest first. An unknown or malformed id yields an empty list.
pub async fn list_trophies(
    state: &SharedState,
    id: &str,
) -> Result<Vec<TrophyResponse>, ServiceError> {
    let Ok(participant_id) = id.parse::<ParticipantId>() else {
        return Ok(Vec::new());
    };
    let store = state.require_dialogue_store().await?;
    let trophies = store.list_trophies(participant_id).await?;
    Ok(trophies.into_iter().map(Into::into).collect())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::dialogue_store::{DialogueStore, memory::MemoryDialogueStore},
        state::AppState,
    };

    async fn state() -> (SharedState, Arc<MemoryDialogueStore>) {
        let state = AppState::new(AppConfig::default());
        let store = Arc::new(MemoryDialogueStore::new());
        state.set_dialogue_store(store.clone()).await;
        (state, store)
    }

    fn request(kind: &str, name: &str) -> RegisterParticipantRequest {
        RegisterParticipantRequest {
            kind: Some(kind.into()),
            disclosure: Some("named".into()),
            display_name: Some(name.into()),
            model: Some("gpt-like".into()),
        }
    }

    #[tokio::test]
    async fn bots_get_a_credential_and_humans_do_not() {
        let (state, store) = state().await;

        let bot = register_participant(&state, request("bot", "Bot A"))
            .await
            .unwrap();
        let credential = bot.api_key.clone().expect("bot credential");
        assert!(credential.starts_with("dlg_"));
        assert_eq!(bot.participant.model.as_deref(), Some("gpt-like"));

        let stored = store
            .find_participant(bot.participant.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            stored.credential_hash,
            Some(hash_credential(&state.config().credential_salt, &credential))
        );

        let human = register_participant(&state, request("human", "Ada"))
            .await
            .unwrap();
        assert!(human.api_key.is_none());
        assert!(human.participant.model.is_none());
    }

    #[tokio::test]
    async fn invalid_registration_is_rejected() {
        let (state, _) = state().await;
        for payload in [
            request("alien", "x"),
            request("human", "   "),
            RegisterParticipantRequest {
                disclosure: Some("secret".into()),
                ..request("human", "x")
            },
            RegisterParticipantRequest::default(),
        ] {
            let err = register_participant(&state, payload).await.unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }

    #[tokio::test]
    async fn profile_of_unknown_participant_is_not_found() {
        let (state, _) = state().await;
        for id in ["nope".to_string(), ParticipantId::generate().to_string()] {
            let err = get_profile(&state, &id).await.unwrap_err();
            assert!(matches!(err, ServiceError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn fresh_profile_has_empty_stats() {
        let (state, _) = state().await;
        let human = register_participant(&state, request("human", "Ada"))
            .await
            .unwrap();
        let profile = get_profile(&state, &human.participant.id.to_string())
            .await
            .unwrap();
        assert_eq!(profile.stats.dialogues, 0);
        assert_eq!(profile.stats.completion_rate, 0);
        assert!(profile.stats.reactions_received.is_empty());
        assert!(profile.stats.scored_by.is_empty());
    }

    #[tokio::test]
    async fn trophies_of_unknown_participant_are_empty() {
        let (state, _) = state().await;
        assert!(list_trophies(&state, "garbage").await.unwrap().is_empty());
    }

    #[test]
    fn completion_rate_rounds_to_nearest() {
        assert_eq!(completion_rate(0, 0), 0);
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(3, 3), 100);
    }
}
