pub mod call;
pub mod recording;
pub mod room;

use crate::recording::RecordingSettings;
use acs::{CallAutomationClient, RoomsClient};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use room::RoomSettings;
use tower_http::cors::{Any, CorsLayer};

/// Stateless control path over the platform clients. Handlers never touch
/// the queue-driven recording controller.
pub fn router(
    call_automation: CallAutomationClient,
    rooms: RoomsClient,
    recording_settings: RecordingSettings,
    room_settings: RoomSettings,
) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health_check", get(health_check))
        .route("/api/recording/:id/start", post(recording::start))
        .route("/api/recording/:id/stop", post(recording::stop))
        .route("/api/recording/:id/pause", post(recording::pause))
        .route("/api/recording/:id/resume", post(recording::resume))
        .route(
            "/api/recording/:id/GetRecordingState",
            post(recording::get_state),
        )
        .route("/api/recording/:id/download", post(recording::download))
        .route("/api/recording/:id/delete", post(recording::delete))
        .route("/api/room", post(room::create_room))
        .route("/api/room/:id", get(room::get_room))
        .route("/api/room/:id/participants", get(room::list_participants))
        .route("/api/call/:id/dtmf", post(call::send_dtmf_tones))
        .fallback(not_found)
        .layer(cors)
        .layer(Extension(call_automation))
        .layer(Extension(rooms))
        .layer(Extension(recording_settings))
        .layer(Extension(room_settings))
}

pub async fn health_check() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({ "error": "Not Found" })),
    )
}
