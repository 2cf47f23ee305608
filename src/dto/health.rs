use serde::Serialize;
use utoipa::ToSchema;

/// Overall service condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Ok,
    /// Storage is unreachable; mutating and reading routes answer `503`.
    Degraded,
}

/// Body of `GET /healthcheck`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    /// Whether the last storage ping succeeded.
    pub storage_reachable: bool,
}
