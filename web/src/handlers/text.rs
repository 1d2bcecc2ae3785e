//! The request/reply endpoint.

use crate::WebResult;
use crate::state::AppState;
use axum::extract::State;

/// Send a request and return the reply text.
///
/// # Endpoint
///
/// ```text
/// GET /text
/// ```
///
/// # Responses
///
/// - `200 OK`: reply text as `text/plain`
/// - `502 Bad Gateway`: the request could not be queued
/// - `504 Gateway Timeout`: no reply within the await budget
///
/// # Errors
///
/// Returns [`AppError`](crate::AppError) mapped from the relay error.
pub async fn get_text(State(state): State<AppState>) -> WebResult<String> {
    Ok(state.handler.request().await?)
}
