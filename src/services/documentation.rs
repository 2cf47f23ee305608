use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for Dialolical Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::participants::register_participant,
        crate::routes::participants::get_participant,
        crate::routes::participants::list_trophies,
        crate::routes::dialogues::create_dialogue,
        crate::routes::dialogues::list_dialogues,
        crate::routes::dialogues::get_dialogue,
        crate::routes::dialogues::join_dialogue,
        crate::routes::dialogues::submit_turn,
        crate::routes::dialogues::conclude_dialogue,
        crate::routes::reactions::add_reaction,
        crate::routes::reactions::list_dimensions,
        crate::routes::leaderboard::leaderboard,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::participant::RegisterParticipantRequest,
            crate::dto::participant::RegisteredParticipantResponse,
            crate::dto::participant::ParticipantResponse,
            crate::dto::participant::ParticipantProfileResponse,
            crate::dto::participant::ParticipantStats,
            crate::dto::participant::ScorerBreakdown,
            crate::dto::participant::RecentDialogue,
            crate::dto::dialogue::CreateDialogueRequest,
            crate::dto::dialogue::JoinDialogueRequest,
            crate::dto::dialogue::SubmitTurnRequest,
            crate::dto::dialogue::ConcludeDialogueRequest,
            crate::dto::dialogue::DialogueSort,
            crate::dto::dialogue::DialogueResponse,
            crate::dto::dialogue::DialogueSummary,
            crate::dto::dialogue::DialogueDetailResponse,
            crate::dto::dialogue::TurnView,
            crate::dto::dialogue::SubmitTurnResponse,
            crate::dto::reaction::AddReactionRequest,
            crate::dto::reaction::ReactionResponse,
            crate::dto::reaction::DimensionEntry,
            crate::dto::leaderboard::LeaderboardEntry,
            crate::dto::trophy::TrophyResponse,
            crate::dao::models::DialoguePhase,
            crate::dao::models::ParticipantKind,
            crate::dao::models::Disclosure,
            crate::dao::models::Side,
            crate::dao::models::TargetKind,
            crate::dao::models::TrophyKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "participants", description = "Registration and profiles"),
        (name = "dialogues", description = "Dialogue lifecycle and reads"),
        (name = "reactions", description = "Open-vocabulary scoring ledger"),
        (name = "leaderboard", description = "Ranking by reactions received"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/api/participants",
            "/api/participants/{id}",
            "/api/participants/{id}/trophies",
            "/api/dialogues",
            "/api/dialogues/{id}",
            "/api/dialogues/{id}/join",
            "/api/dialogues/{id}/turns",
            "/api/dialogues/{id}/conclude",
            "/api/reactions",
            "/api/reactions/dimensions",
            "/api/leaderboard",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
