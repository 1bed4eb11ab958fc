use crate::recording::RecordingSettings;
use acs::{AcsError, CallAutomationClient, RecordingStateResult};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::Local;
use serde::Serialize;
use url::Url;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadedRecording {
    pub file: String,
    pub bytes: u64,
}

pub async fn start(
    Extension(client): Extension<CallAutomationClient>,
    Extension(settings): Extension<RecordingSettings>,
    Path(server_call_id): Path<String>,
) -> Result<Json<RecordingStateResult>, StatusCode> {
    let result = client
        .recording()
        .start(&settings.start_options(&server_call_id))
        .await
        .map_err(|e| {
            log::error!("Error starting a recording for server call {server_call_id}: {e}");
            StatusCode::BAD_GATEWAY
        })?;

    log::info!(
        "Recording started with recording id: {} recording state: {:?}",
        result.recording_id,
        result.recording_state
    );
    Ok(Json(result))
}

pub async fn stop(
    Extension(client): Extension<CallAutomationClient>,
    Path(recording_id): Path<String>,
) -> StatusCode {
    outcome("stop", &recording_id, client.recording().stop(&recording_id).await)
}

pub async fn pause(
    Extension(client): Extension<CallAutomationClient>,
    Path(recording_id): Path<String>,
) -> StatusCode {
    outcome("pause", &recording_id, client.recording().pause(&recording_id).await)
}

pub async fn resume(
    Extension(client): Extension<CallAutomationClient>,
    Path(recording_id): Path<String>,
) -> StatusCode {
    outcome("resume", &recording_id, client.recording().resume(&recording_id).await)
}

/// Responds with `null` when the state cannot be fetched.
pub async fn get_state(
    Extension(client): Extension<CallAutomationClient>,
    Path(recording_id): Path<String>,
) -> Json<Option<RecordingStateResult>> {
    match client.recording().get_state(&recording_id).await {
        Ok(state) => {
            log::info!("Recording state: {:?}", state.recording_state);
            Json(Some(state))
        }
        Err(e) => {
            log::error!("Error getting the state of recording {recording_id}: {e}");
            Json(None)
        }
    }
}

/// `content_location` arrives URL-escaped in the path and is decoded by the extractor.
pub async fn download(
    Extension(client): Extension<CallAutomationClient>,
    Extension(settings): Extension<RecordingSettings>,
    Path(content_location): Path<String>,
) -> Result<Json<DownloadedRecording>, StatusCode> {
    let location = parse_location(&content_location)?;
    let file = settings.download_path(Local::now(), &document_id(&location));

    let bytes = client
        .recording()
        .download_to(&location, &file)
        .await
        .map_err(|e| {
            log::error!("Error downloading recording from {location}: {e}");
            failure_status(&e)
        })?;

    log::info!("Recording downloaded to {} ({bytes} bytes)", file.display());
    Ok(Json(DownloadedRecording {
        file: file.display().to_string(),
        bytes,
    }))
}

pub async fn delete(
    Extension(client): Extension<CallAutomationClient>,
    Path(delete_location): Path<String>,
) -> StatusCode {
    let location = match parse_location(&delete_location) {
        Ok(location) => location,
        Err(status) => return status,
    };

    outcome("delete", location.as_str(), client.recording().delete(&location).await)
}

fn parse_location(location: &str) -> Result<Url, StatusCode> {
    Url::parse(location).map_err(|e| {
        log::warn!("Rejecting recording location {location}: {e}");
        StatusCode::BAD_REQUEST
    })
}

/// The object id in `.../objects/<document id>/content/...`, or the whole
/// path when the location has another shape.
fn document_id(location: &Url) -> String {
    let mut segments = location.path_segments().into_iter().flatten();
    match segments.by_ref().find(|segment| *segment == "objects") {
        Some(_) => segments.next().unwrap_or_default().to_string(),
        None => location.path().to_string(),
    }
}

/// Locations the client refuses to call are the caller's fault.
fn failure_status(e: &AcsError) -> StatusCode {
    match e {
        AcsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn outcome(action: &str, target: &str, result: Result<(), AcsError>) -> StatusCode {
    match result {
        Ok(()) => {
            log::info!("Recording {action} succeeded for {target}");
            StatusCode::OK
        }
        Err(e) => {
            log::error!("Error trying to {action} recording {target}: {e}");
            failure_status(&e)
        }
    }
}
