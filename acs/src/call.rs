use crate::{json_body, AcsError, Pipeline, CALL_AUTOMATION_API_VERSION};
use reqwest::Method;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DtmfTone {
    Zero,
    One,
    Two,
    Three,
    Four,
    Five,
    Six,
    Seven,
    Eight,
    Nine,
    A,
    B,
    C,
    D,
    Pound,
    Asterisk,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendDtmfTonesRequest<'a> {
    tones: &'a [DtmfTone],
    target_participant: CommunicationUserIdentifier<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CommunicationUserIdentifier<'a> {
    raw_id: &'a str,
    kind: &'static str,
    communication_user: CommunicationUser<'a>,
}

#[derive(Serialize)]
struct CommunicationUser<'a> {
    id: &'a str,
}

/// An established call, addressed by its call connection id.
pub struct CallConnection<'a> {
    pipeline: &'a Pipeline,
    call_connection_id: String,
}

impl<'a> CallConnection<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, call_connection_id: &str) -> CallConnection<'a> {
        CallConnection {
            pipeline,
            call_connection_id: call_connection_id.to_string(),
        }
    }

    /// Plays `tones` to the communication user `target_identity`.
    pub async fn send_dtmf_tones(
        &self,
        tones: &[DtmfTone],
        target_identity: &str,
    ) -> Result<(), AcsError> {
        if tones.is_empty() {
            return Err(AcsError::InvalidInput("no DTMF tones to send".to_string()));
        }

        let request = SendDtmfTonesRequest {
            tones,
            target_participant: CommunicationUserIdentifier {
                raw_id: target_identity,
                kind: "communicationUser",
                communication_user: CommunicationUser {
                    id: target_identity,
                },
            },
        };
        let segment = format!("{}:sendDtmfTones", self.call_connection_id);
        let url = self
            .pipeline
            .url(&["calling", "callConnections", &segment], CALL_AUTOMATION_API_VERSION)?;

        self.pipeline
            .send(Method::POST, url, json_body(&request)?)
            .await?;
        Ok(())
    }
}
