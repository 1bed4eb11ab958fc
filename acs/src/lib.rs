mod auth;
mod call;
pub mod events;
mod queue;
mod recording;
mod rooms;

pub use auth::ConnectionString;
pub use call::{CallConnection, DtmfTone};
pub use queue::{QueueClient, QueueMessage, StorageConnectionString};
pub use recording::{
    CallRecording, RecordingChannel, RecordingContent, RecordingFormat, RecordingState,
    RecordingStateResult, StartRecordingOptions,
};
pub use rooms::{
    CommunicationRoom, CreateRoomOptions, ParticipantRole, RoomParticipant, RoomsClient,
};

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client as ReqwestClient, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use url::Url;

const CALL_AUTOMATION_API_VERSION: &str = "2023-10-15";
const ROOMS_API_VERSION: &str = "2023-06-14";
/// Recording content and delete locations are served from this domain.
const RECORDING_STORAGE_DOMAIN: &str = ".asm.skype.com";

#[derive(Debug, thiserror::Error)]
pub enum AcsError {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error("invalid HTTP status code {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("parsing error: {0}")]
    Parsing(String),
    #[error("invalid connection string: {0}")]
    ConnectionString(String),
    #[error("invalid request: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<url::ParseError> for AcsError {
    fn from(e: url::ParseError) -> Self {
        AcsError::InvalidInput(e.to_string())
    }
}

/// Client for the call automation surface of Azure Communication Services.
/// Recording operations hang off [`CallAutomationClient::recording`], call
/// media operations off [`CallAutomationClient::call_connection`].
#[derive(Clone)]
pub struct CallAutomationClient {
    pipeline: Pipeline,
}

impl CallAutomationClient {
    pub fn new(connection_string: &str) -> Result<CallAutomationClient, AcsError> {
        Ok(CallAutomationClient {
            pipeline: Pipeline::new(ConnectionString::parse(connection_string)?),
        })
    }

    pub fn recording(&self) -> CallRecording<'_> {
        CallRecording::new(&self.pipeline)
    }

    pub fn call_connection(&self, call_connection_id: &str) -> CallConnection<'_> {
        CallConnection::new(&self.pipeline, call_connection_id)
    }
}

/// Signed HTTP transport shared by the Communication Services clients.
#[derive(Clone)]
pub(crate) struct Pipeline {
    connection: ConnectionString,
    client: ReqwestClient,
}

impl Pipeline {
    pub(crate) fn new(connection: ConnectionString) -> Pipeline {
        Pipeline {
            connection,
            client: ReqwestClient::new(),
        }
    }

    /// Builds `<endpoint>/<segments..>?api-version=<version>`, escaping each segment.
    pub(crate) fn url(&self, segments: &[&str], api_version: &str) -> Result<Url, AcsError> {
        let mut url = self.connection.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| AcsError::InvalidInput("endpoint cannot be a base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        url.query_pairs_mut().append_pair("api-version", api_version);
        Ok(url)
    }

    /// Resolves a link returned by the service, which may be absolute or relative to the endpoint.
    pub(crate) fn resolve(&self, link: &str) -> Result<Url, AcsError> {
        Ok(self.connection.endpoint.join(link)?)
    }

    /// Signed requests only go to the resource endpoint itself or, over https,
    /// to recording storage.
    pub(crate) fn check_location(&self, location: &Url) -> Result<(), AcsError> {
        let same_origin = location.origin() == self.connection.endpoint.origin();
        let recording_storage = location.scheme() == "https"
            && location
                .host_str()
                .is_some_and(|host| host.ends_with(RECORDING_STORAGE_DOMAIN));

        match same_origin || recording_storage {
            true => Ok(()),
            false => Err(AcsError::InvalidInput(format!(
                "location {} is outside the recording storage",
                location.origin().ascii_serialization()
            ))),
        }
    }

    pub(crate) async fn send(
        &self,
        method: Method,
        url: Url,
        body: Vec<u8>,
    ) -> Result<Response, AcsError> {
        let signed = auth::sign(self.connection.access_key(), &method, &url, &body)?;

        let mut request = self
            .client
            .request(method, url)
            .header("x-ms-date", signed.date)
            .header("x-ms-content-sha256", signed.content_hash)
            .header(AUTHORIZATION, signed.authorization);
        if !body.is_empty() {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::debug!("Communication Services responded with {status}: {body}");
        Err(AcsError::Http { status, body })
    }

    pub(crate) async fn send_json<T>(
        &self,
        method: Method,
        url: Url,
        body: Vec<u8>,
    ) -> Result<T, AcsError>
    where
        T: DeserializeOwned,
    {
        self.send(method, url, body)
            .await?
            .json::<T>()
            .await
            .map_err(|e| AcsError::Parsing(e.to_string()))
    }
}

pub(crate) fn json_body<T: Serialize>(value: &T) -> Result<Vec<u8>, AcsError> {
    serde_json::to_vec(value).map_err(|e| AcsError::InvalidInput(e.to_string()))
}
