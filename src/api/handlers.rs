use std::convert::Infallible;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};
use warp::filters::body::BodyDeserializeError;
use warp::http::StatusCode;
use warp::reject::{self, Rejection};
use warp::reply::{Reply, Response};

use super::AppState;
use crate::error::{ProctorError, Result};
use crate::session::{ParticipantInput, ParticipantStatus, SessionUpdate};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub name: String,
    pub host_id: String,
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRequest {
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateSessionRequest {
    pub secret: String,
    #[serde(flatten)]
    pub update: SessionUpdate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRequest {
    pub secret: String,
    pub user_id: String,
    pub status: ParticipantStatus,
}

fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    warp::reply::with_status(warp::reply::json(value), status).into_response()
}

fn error_reply(err: &ProctorError) -> Response {
    json_reply(&serde_json::json!({ "error": err.to_string() }), err.status_code())
}

fn respond<T: Serialize>(result: Result<T>) -> std::result::Result<Response, Infallible> {
    Ok(match result {
        Ok(value) => json_reply(&value, StatusCode::OK),
        Err(e) => {
            tracing::debug!(error = %e, "Request failed");
            error_reply(&e)
        }
    })
}

fn ack(message: &str) -> serde_json::Value {
    serde_json::json!({ "message": message })
}

/// Turns filter rejections into the same `{"error": ...}` body handlers use
pub async fn handle_rejection(err: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Route not found".to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, format!("Invalid request body: {}", e))
    } else if err.find::<reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large".to_string())
    } else if err.find::<reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "Content-Length required".to_string())
    } else if err.find::<reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected application/json".to_string())
    } else if err.find::<reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        tracing::warn!(rejection = ?err, "Unhandled rejection");
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(json_reply(&serde_json::json!({ "error": message }), status))
}

pub async fn health(state: AppState) -> std::result::Result<Response, Infallible> {
    let viewers = state.hub.stats().await.map(|s| s.viewers);
    let status = if viewers.is_some() { "healthy" } else { "degraded" };
    respond(Ok(serde_json::json!({
        "status": status,
        "service": "Proctor Server",
        "version": env!("CARGO_PKG_VERSION"),
        "viewers": viewers,
    })))
}

pub async fn list_sessions(state: AppState) -> std::result::Result<Response, Infallible> {
    respond(Ok(state.registry.list_sessions().await))
}

pub async fn create_session(
    request: CreateSessionRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let created = state
        .registry
        .create_session(request.name, request.host_id, request.secret)
        .await;
    respond(Ok(created))
}

pub async fn get_session(code: String, state: AppState) -> std::result::Result<Response, Infallible> {
    respond(state.registry.get_session(&code).await)
}

pub async fn update_session(
    code: String,
    request: UpdateSessionRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = state
        .registry
        .update_session(&code, &request.secret, request.update)
        .await
        .map(|()| ack("Session updated"));
    respond(result)
}

pub async fn start_session(
    code: String,
    request: SecretRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = state
        .registry
        .start_session(&code, &request.secret)
        .await
        .map(|(start_time, end_time)| {
            serde_json::json!({
                "message": "Session started",
                "startTime": start_time,
                "endTime": end_time,
            })
        });
    respond(result)
}

pub async fn join_session(
    code: String,
    remote: Option<SocketAddr>,
    input: ParticipantInput,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let origin = remote.map(|addr| addr.to_string()).unwrap_or_default();
    respond(state.registry.join_session(&code, input, &origin).await)
}

pub async fn set_participant_status(
    code: String,
    request: StatusRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = state
        .registry
        .set_participant_status(&code, &request.secret, &request.user_id, request.status)
        .await
        .map(|()| ack("Participant status updated"));
    respond(result)
}

pub async fn ping(
    code: String,
    participant_id: String,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = state
        .registry
        .record_ping(&code, &participant_id)
        .await
        .map(|()| ack("pong"));
    respond(result)
}

pub async fn scan(state: AppState) -> std::result::Result<Response, Infallible> {
    respond(state.scanner.scan().await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_flattens_optional_fields() {
        let request: UpdateSessionRequest = serde_json::from_str(
            r#"{"secret":"k1","name":"Algo102","state":"Paused"}"#,
        )
        .unwrap();
        assert_eq!(request.secret, "k1");
        assert_eq!(request.update.name.as_deref(), Some("Algo102"));
        assert!(request.update.sets.is_none());
        assert!(request.update.time_allocated_secs.is_none());
    }

    #[tokio::test]
    async fn test_unknown_route_rejection_is_json() {
        let response = handle_rejection(warp::reject::not_found()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = warp::hyper::body::to_bytes(response.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Route not found");
    }

    #[test]
    fn test_error_reply_status() {
        let response = error_reply(&ProctorError::Unauthorized("AB12CD".into()));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
