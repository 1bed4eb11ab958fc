use crate::dtmf::convert_to_dtmf_tone;
use acs::CallAutomationClient;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDtmfTonesRequest {
    #[serde(default)]
    pub target_identity: String,
    #[serde(default)]
    pub dtmf_tones: Vec<String>,
}

pub async fn send_dtmf_tones(
    Extension(client): Extension<CallAutomationClient>,
    Path(call_connection_id): Path<String>,
    Json(request): Json<SendDtmfTonesRequest>,
) -> StatusCode {
    let tones = match request
        .dtmf_tones
        .iter()
        .map(|tone| convert_to_dtmf_tone(tone))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(tones) if !tones.is_empty() && !request.target_identity.is_empty() => tones,
        Ok(_) => {
            log::warn!("Rejecting DTMF request for {call_connection_id} without tones or target");
            return StatusCode::BAD_REQUEST;
        }
        Err(e) => {
            log::warn!("Rejecting DTMF request for {call_connection_id}: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    match client
        .call_connection(&call_connection_id)
        .send_dtmf_tones(&tones, &request.target_identity)
        .await
    {
        Ok(()) => {
            log::info!(
                "Sent {} DTMF tones to {} on call {call_connection_id}",
                tones.len(),
                request.target_identity
            );
            StatusCode::OK
        }
        Err(e) => {
            log::error!("Error sending DTMF tones on call {call_connection_id}: {e}");
            StatusCode::BAD_GATEWAY
        }
    }
}
