use std::net::SocketAddr;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, routes::extract::bearer_token, state::SharedState};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Charge mutating requests against the caller's bucket. Reads pass through.
pub async fn throttle_mutations(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return Ok(next.run(req).await);
    }

    let bearer = bearer_token(req.headers());
    let forwarded_for = req
        .headers()
        .get(FORWARDED_FOR)
        .and_then(|value| value.to_str().ok());
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    let limiter = state.rate_limiter();
    let key = limiter.key_for(bearer.as_deref(), forwarded_for, peer);
    limiter.check(&key)?;

    Ok(next.run(req).await)
}
