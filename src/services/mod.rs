/// Dialogue lifecycle operations and read projections.
pub mod dialogue_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Caller resolution and bot credentials.
pub mod identity;
/// Ranking of participants by reactions received.
pub mod leaderboard_service;
/// Participant registration, profiles and trophy lists.
pub mod participant_service;
/// Per-caller request throttling.
pub mod rate_limit;
/// Scoring ledger writes and aggregations.
pub mod reaction_service;
/// Storage connection supervisor with backoff.
pub mod storage_supervisor;
/// Trophy awarding worker and backfill sweep.
pub mod trophy_service;
