use crate::error::{OcrError, ScanError, ScannerError};
use crate::events::ScanEvent;
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use super::server::ServerState;

#[derive(Debug, Deserialize)]
pub struct ManualRequest {
    pub code: String,
}

fn status_for(error: &ScannerError) -> StatusCode {
    match error {
        ScannerError::NotRunning => StatusCode::SERVICE_UNAVAILABLE,
        ScannerError::Scan(ScanError::InvalidManualInput(_))
        | ScannerError::Scan(ScanError::ClassificationReject { .. }) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ScannerError::Scan(_) => StatusCode::BAD_REQUEST,
        ScannerError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
        ScannerError::Ocr(OcrError::Disabled) => StatusCode::NOT_IMPLEMENTED,
        ScannerError::Ocr(_) | ScannerError::ServeFailed { .. } => StatusCode::BAD_GATEWAY,
        ScannerError::InvalidTransition { .. }
        | ScannerError::OcrNotReady { .. }
        | ScannerError::NoResolvedOrder
        | ScannerError::AlreadyServed { .. }
        | ScannerError::NotEligible { .. } => StatusCode::CONFLICT,
    }
}

fn error_response(error: ScannerError) -> Response {
    let status = status_for(&error);
    debug!("Command refused ({}): {}", status, error);
    (
        status,
        Json(serde_json::json!({
            "error": error.to_string(),
        })),
    )
        .into_response()
}

fn respond<T: serde::Serialize>(result: Result<T, ScannerError>) -> Response {
    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

/// Handler for health check endpoint
pub async fn health_handler(State(state): State<ServerState>) -> impl IntoResponse {
    let latest_frame = state.source.latest_frame();
    let snapshot = state.scanner.snapshot();

    let health_info = serde_json::json!({
        "status": "healthy",
        "scanner_state": snapshot.state,
        "frames_available": latest_frame.is_some(),
        "latest_frame_id": latest_frame.map(|f| f.id),
        "source": state.source.name(),
        "server_info": {
            "subscribers": state.event_bus.subscriber_count(),
        }
    });

    (StatusCode::OK, Json(health_info))
}

pub async fn state_handler(State(state): State<ServerState>) -> impl IntoResponse {
    Json(state.scanner.snapshot())
}

/// Server-sent events feed of everything on the bus
pub async fn events_handler(
    State(state): State<ServerState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("New event feed client connected");
    let mut receiver = state.event_bus.subscribe();

    let stream = async_stream::stream! {
        loop {
            let event: ScanEvent = match receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(n)) => {
                    warn!("Event feed client lagged by {} events", n);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };

            match Event::default().event(event.event_type()).json_data(&event) {
                Ok(sse) => yield Ok(sse),
                Err(e) => warn!("Failed to encode {} event: {}", event.event_type(), e),
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

pub async fn manual_handler(
    State(state): State<ServerState>,
    Json(request): Json<ManualRequest>,
) -> Response {
    respond(state.scanner.submit_manual(&request.code).await)
}

pub async fn reset_handler(State(state): State<ServerState>) -> Response {
    respond(state.scanner.reset().await.map(|_| state.scanner.snapshot()))
}

pub async fn continue_handler(State(state): State<ServerState>) -> Response {
    respond(
        state
            .scanner
            .continue_scanning()
            .await
            .map(|_| state.scanner.snapshot()),
    )
}

pub async fn ocr_handler(State(state): State<ServerState>) -> Response {
    respond(state.scanner.request_ocr().await)
}

pub async fn confirm_serve_handler(State(state): State<ServerState>) -> Response {
    respond(state.scanner.confirm_serve().await)
}
