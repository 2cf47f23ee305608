use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

const SWAGGER_PATH: &str = "/docs";
const OPENAPI_JSON_PATH: &str = "/api-doc/openapi.json";

/// Swagger UI at `/docs`, backed by the document served at `/api-doc/openapi.json`.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::from(SwaggerUi::new(SWAGGER_PATH).url(OPENAPI_JSON_PATH, ApiDoc::openapi()))
        .with_state(state)
}
