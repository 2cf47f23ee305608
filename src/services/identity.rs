use rand::{Rng, distr::Alphanumeric};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::{
    dao::models::{ParticipantEntity, ParticipantId},
    error::ServiceError,
    state::SharedState,
};

const CREDENTIAL_PREFIX: &str = "dlg_";
const CREDENTIAL_RANDOM_LEN: usize = 32;

/// Generate a fresh bot credential. The plaintext is returned to the bot once
/// and never stored.
pub fn generate_credential() -> String {
    let random: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(CREDENTIAL_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{CREDENTIAL_PREFIX}{random}")
}

/// Salted SHA-256 of a credential, hex encoded.
pub fn hash_credential(salt: &str, credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(credential.as_bytes());
    hex::encode(hasher.finalize())
}

/// Participant acting on a request.
#[derive(Debug, Clone)]
pub struct Caller {
    /// Resolved participant id.
    pub id: ParticipantId,
    /// Loaded record when the caller authenticated with a credential.
    pub participant: Option<ParticipantEntity>,
}

/// Parse an id supplied in a payload field.
pub fn parse_body_id<T: std::str::FromStr>(
    value: Option<&str>,
    field: &str,
) -> Result<T, ServiceError> {
    let raw = value
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .ok_or_else(|| ServiceError::InvalidInput(format!("`{field}` is required")))?;
    raw.parse()
        .map_err(|_| ServiceError::InvalidInput(format!("`{field}` is not a valid id")))
}

/// Resolve the acting participant.
///
/// A bearer credential wins over the body id. A credential that matches nobody
/// is rejected rather than falling back to the body.
pub async fn resolve_caller(
    state: &SharedState,
    bearer: Option<&str>,
    body_id: Option<&str>,
    field: &str,
) -> Result<Caller, ServiceError> {
    let Some(credential) = bearer else {
        return Ok(Caller {
            id: parse_body_id(body_id, field)?,
            participant: None,
        });
    };

    let store = state.require_dialogue_store().await?;
    let hash = hash_credential(&state.config().credential_salt, credential);
    match store.find_participant_by_credential(hash).await? {
        Some(participant) => Ok(Caller {
            id: participant.id,
            participant: Some(participant),
        }),
        None => {
            warn!("bearer credential did not match any participant");
            Err(ServiceError::Unauthorized("unknown credential".into()))
        }
    }
}

/// Load the caller's participant record, failing with `NotFound` when it does not exist.
pub async fn require_participant(
    state: &SharedState,
    caller: Caller,
    role: &str,
) -> Result<ParticipantEntity, ServiceError> {
    if let Some(participant) = caller.participant {
        return Ok(participant);
    }
    let store = state.require_dialogue_store().await?;
    store
        .find_participant(caller.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("{role} `{}`", caller.id)))
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::SystemTime};

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            dialogue_store::{DialogueStore, memory::MemoryDialogueStore},
            models::{Disclosure, ParticipantKind},
        },
        state::AppState,
    };

    #[test]
    fn credentials_have_the_expected_shape() {
        let credential = generate_credential();
        assert!(credential.starts_with("dlg_"));
        assert_eq!(credential.len(), 4 + 32);
        assert!(credential[4..].chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(credential, generate_credential());
    }

    #[test]
    fn hashing_depends_on_the_salt() {
        let a = hash_credential("one", "dlg_x");
        assert_eq!(a, hash_credential("one", "dlg_x"));
        assert_ne!(a, hash_credential("two", "dlg_x"));
        assert_eq!(a.len(), 64);
    }

    async fn state_with_bot() -> (SharedState, ParticipantEntity, String) {
        let state = AppState::new(AppConfig::default());
        let store = MemoryDialogueStore::new();
        let credential = generate_credential();
        let bot = ParticipantEntity {
            id: ParticipantId::generate(),
            kind: ParticipantKind::Bot,
            disclosure: Disclosure::Named,
            display_name: "bot".into(),
            model: Some("m".into()),
            credential_hash: Some(hash_credential(
                &state.config().credential_salt,
                &credential,
            )),
            created_at: SystemTime::now(),
        };
        store.insert_participant(bot.clone()).await.unwrap();
        state.set_dialogue_store(Arc::new(store)).await;
        (state, bot, credential)
    }

    #[tokio::test]
    async fn credential_takes_precedence_over_body() {
        let (state, bot, credential) = state_with_bot().await;
        let other = ParticipantId::generate().to_string();
        let caller = resolve_caller(&state, Some(&credential), Some(&other), "participantId")
            .await
            .unwrap();
        assert_eq!(caller.id, bot.id);
    }

    #[tokio::test]
    async fn unknown_credential_is_unauthorized() {
        let (state, bot, _) = state_with_bot().await;
        let body = bot.id.to_string();
        let err = resolve_caller(&state, Some("dlg_nope"), Some(&body), "participantId")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn missing_or_malformed_body_id_is_invalid_input() {
        let (state, _, _) = state_with_bot().await;
        for body in [None, Some(""), Some("not-a-uuid")] {
            let err = resolve_caller(&state, None, body, "participantId")
                .await
                .unwrap_err();
            assert!(matches!(err, ServiceError::InvalidInput(_)));
        }
    }
}
