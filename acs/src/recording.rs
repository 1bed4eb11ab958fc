use crate::{json_body, AcsError, Pipeline, CALL_AUTOMATION_API_VERSION};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use futures::StreamExt;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::pin::pin;
use std::str::FromStr;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingChannel {
    Mixed,
    Unmixed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingContent {
    Audio,
    AudioVideo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingFormat {
    Wav,
    Mp3,
    Mp4,
}

impl RecordingFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RecordingFormat::Wav => "wav",
            RecordingFormat::Mp3 => "mp3",
            RecordingFormat::Mp4 => "mp4",
        }
    }
}

impl FromStr for RecordingChannel {
    type Err = AcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mixed" => Ok(RecordingChannel::Mixed),
            "unmixed" => Ok(RecordingChannel::Unmixed),
            other => Err(AcsError::InvalidInput(format!("unknown recording channel `{other}`"))),
        }
    }
}

impl FromStr for RecordingContent {
    type Err = AcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "audio" => Ok(RecordingContent::Audio),
            "audiovideo" => Ok(RecordingContent::AudioVideo),
            other => Err(AcsError::InvalidInput(format!("unknown recording content `{other}`"))),
        }
    }
}

impl FromStr for RecordingFormat {
    type Err = AcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "wav" => Ok(RecordingFormat::Wav),
            "mp3" => Ok(RecordingFormat::Mp3),
            "mp4" => Ok(RecordingFormat::Mp4),
            other => Err(AcsError::InvalidInput(format!("unknown recording format `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    Active,
    Inactive,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStateResult {
    pub recording_id: String,
    pub recording_state: RecordingState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_kind: Option<String>,
}

/// Options for recording a call located by its server call id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartRecordingOptions {
    pub server_call_id: String,
    pub channel: RecordingChannel,
    pub content: RecordingContent,
    pub format: RecordingFormat,
    pub state_callback_uri: Option<Url>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRecordingRequest<'a> {
    call_locator: CallLocator<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recording_state_callback_uri: Option<&'a str>,
    recording_channel_type: RecordingChannel,
    recording_content_type: RecordingContent,
    recording_format_type: RecordingFormat,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CallLocator<'a> {
    kind: &'static str,
    server_call_id: &'a str,
}

pub struct CallRecording<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> CallRecording<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> CallRecording<'a> {
        CallRecording { pipeline }
    }

    pub async fn start(
        &self,
        options: &StartRecordingOptions,
    ) -> Result<RecordingStateResult, AcsError> {
        let request = StartRecordingRequest {
            call_locator: CallLocator {
                kind: "serverCallLocator",
                server_call_id: &options.server_call_id,
            },
            recording_state_callback_uri: options.state_callback_uri.as_ref().map(Url::as_str),
            recording_channel_type: options.channel,
            recording_content_type: options.content,
            recording_format_type: options.format,
        };
        let url = self
            .pipeline
            .url(&["calling", "recordings"], CALL_AUTOMATION_API_VERSION)?;

        self.pipeline
            .send_json(Method::POST, url, json_body(&request)?)
            .await
    }

    pub async fn stop(&self, recording_id: &str) -> Result<(), AcsError> {
        let url = self
            .pipeline
            .url(&["calling", "recordings", recording_id], CALL_AUTOMATION_API_VERSION)?;
        self.pipeline.send(Method::DELETE, url, Vec::new()).await?;
        Ok(())
    }

    pub async fn pause(&self, recording_id: &str) -> Result<(), AcsError> {
        self.action(recording_id, "pause").await
    }

    pub async fn resume(&self, recording_id: &str) -> Result<(), AcsError> {
        self.action(recording_id, "resume").await
    }

    pub async fn get_state(&self, recording_id: &str) -> Result<RecordingStateResult, AcsError> {
        let url = self
            .pipeline
            .url(&["calling", "recordings", recording_id], CALL_AUTOMATION_API_VERSION)?;
        self.pipeline.send_json(Method::GET, url, Vec::new()).await
    }

    /// Streams the recording content at `content_location` into `destination`,
    /// creating the parent directory when missing. Returns the number of bytes written.
    ///
    /// The content is staged in a `.part` file next to `destination` and only
    /// linked into place once complete. An existing `destination` is never
    /// replaced: the download fails with `AlreadyExists` instead.
    pub async fn download_to(
        &self,
        content_location: &Url,
        destination: &Path,
    ) -> Result<u64, AcsError> {
        self.pipeline.check_location(content_location)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = self
            .pipeline
            .send(Method::GET, content_location.clone(), Vec::new())
            .await?;

        let partial = partial_path(destination);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&partial)
            .await?;

        let copied = async {
            let mut stream = pin!(response.bytes_stream());
            let mut written = 0u64;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk?;
                file.write_all(&chunk).await?;
                written += chunk.len() as u64;
            }
            file.flush().await?;
            Ok::<_, AcsError>(written)
        }
        .await;
        drop(file);

        let result = match copied {
            Ok(written) => tokio::fs::hard_link(&partial, destination)
                .await
                .map(|()| written)
                .map_err(AcsError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = tokio::fs::remove_file(&partial).await {
            log::warn!("Failed to remove partial download {}: {e}", partial.display());
        }

        result
    }

    pub async fn delete(&self, delete_location: &Url) -> Result<(), AcsError> {
        self.pipeline.check_location(delete_location)?;
        self.pipeline
            .send(Method::DELETE, delete_location.clone(), Vec::new())
            .await?;
        Ok(())
    }

    async fn action(&self, recording_id: &str, action: &str) -> Result<(), AcsError> {
        let segment = format!("{recording_id}:{action}");
        let url = self
            .pipeline
            .url(&["calling", "recordings", &segment], CALL_AUTOMATION_API_VERSION)?;
        self.pipeline.send(Method::POST, url, Vec::new()).await?;
        Ok(())
    }
}

/// `<dir>/.<file name>.part`
fn partial_path(destination: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(destination.file_name().unwrap_or_default());
    name.push(".part");
    destination.with_file_name(name)
}
