use crate::events::{CallEvent, InboundEvent, RecordingFileStatusEvent};
use crate::CONFIG;
use acs::{
    AcsError, CallAutomationClient, RecordingChannel, RecordingContent, RecordingFormat,
    RecordingStateResult, StartRecordingOptions,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

/// The recording calls the controller makes against the communication platform.
#[async_trait]
pub trait RecordingOperations: Send + Sync {
    async fn start_recording(
        &self,
        options: &StartRecordingOptions,
    ) -> Result<RecordingStateResult, AcsError>;

    async fn stop_recording(&self, recording_id: &str) -> Result<(), AcsError>;

    async fn download_recording(
        &self,
        content_location: &Url,
        destination: &Path,
    ) -> Result<u64, AcsError>;

    async fn delete_recording(&self, delete_location: &Url) -> Result<(), AcsError>;
}

#[async_trait]
impl RecordingOperations for CallAutomationClient {
    async fn start_recording(
        &self,
        options: &StartRecordingOptions,
    ) -> Result<RecordingStateResult, AcsError> {
        self.recording().start(options).await
    }

    async fn stop_recording(&self, recording_id: &str) -> Result<(), AcsError> {
        self.recording().stop(recording_id).await
    }

    async fn download_recording(
        &self,
        content_location: &Url,
        destination: &Path,
    ) -> Result<u64, AcsError> {
        self.recording().download_to(content_location, destination).await
    }

    async fn delete_recording(&self, delete_location: &Url) -> Result<(), AcsError> {
        self.recording().delete(delete_location).await
    }
}

/// How recordings are requested and where downloaded files go. Shared by the
/// queue-driven controller and the HTTP surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingSettings {
    pub channel: RecordingChannel,
    pub content: RecordingContent,
    pub format: RecordingFormat,
    pub callback_uri: Option<Url>,
    pub download_dir: PathBuf,
}

impl RecordingSettings {
    pub fn from_config(callback_uri: Option<Url>) -> Result<Self> {
        Ok(Self {
            channel: CONFIG.recording.channel.parse().context("recording.channel")?,
            content: CONFIG.recording.content.parse().context("recording.content")?,
            format: CONFIG.recording.format.parse().context("recording.format")?,
            callback_uri,
            download_dir: PathBuf::from(CONFIG.recording.download_dir),
        })
    }

    pub fn start_options(&self, server_call_id: &str) -> StartRecordingOptions {
        StartRecordingOptions {
            server_call_id: server_call_id.to_owned(),
            channel: self.channel,
            content: self.content,
            format: self.format,
            state_callback_uri: self.callback_uri.clone(),
        }
    }

    /// `RecordingFile_<yyyyMMddHHmmss>_<source>.<format>` under the download
    /// directory, where `<source>` is the first 8 alphanumerics of `source_id`.
    pub fn download_path(&self, now: DateTime<Local>, source_id: &str) -> PathBuf {
        let source: String = source_id
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(8)
            .collect();
        let stem = match source.is_empty() {
            true => format!("RecordingFile_{}", now.format("%Y%m%d%H%M%S")),
            false => format!("RecordingFile_{}_{source}", now.format("%Y%m%d%H%M%S")),
        };

        self.download_dir
            .join(format!("{stem}.{}", self.format.extension()))
    }
}

/// The single tracked recording. `content_location` and `delete_location` are
/// filled in once the recording file is ready.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallRecordingSession {
    pub recording_id: String,
    pub content_location: Option<Url>,
    pub delete_location: Option<Url>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Ignored,
    Started { recording_id: String },
    Stopped { recording_id: String },
    Collected { recording_id: String, file: PathBuf },
}

/// A failed platform call. The controller has already applied its state
/// transition by the time one of these is returned.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("failed to start recording for server call {server_call_id}")]
    Start {
        server_call_id: String,
        #[source]
        source: AcsError,
    },
    #[error("failed to stop recording {recording_id}")]
    Stop {
        recording_id: String,
        #[source]
        source: AcsError,
    },
    #[error("failed to download recording {recording_id} from {location}")]
    Download {
        recording_id: String,
        location: Url,
        #[source]
        source: AcsError,
    },
    #[error("failed to delete recording {recording_id} at {location}")]
    Delete {
        recording_id: String,
        location: Url,
        #[source]
        source: AcsError,
    },
}

/// Correlates call lifecycle events into recording actions. Tracks at most one
/// recording at a time:
///
/// - idle + `CallStarted`: start recording, track the returned id
/// - recording + `CallEnded`: stop recording, back to idle
/// - recording + `RecordingFileStatusUpdated`: download then delete the first chunk, back to idle
///
/// Everything else is ignored.
pub struct RecordingController<R> {
    operations: R,
    settings: RecordingSettings,
    session: Option<CallRecordingSession>,
}

impl<R: RecordingOperations> RecordingController<R> {
    pub fn new(operations: R, settings: RecordingSettings) -> Self {
        Self {
            operations,
            settings,
            session: None,
        }
    }

    pub fn session(&self) -> Option<&CallRecordingSession> {
        self.session.as_ref()
    }

    pub fn recording_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.recording_id.as_str())
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub async fn handle(&mut self, event: InboundEvent) -> Result<Transition, ControllerError> {
        match event {
            InboundEvent::CallStarted(call) if !self.is_recording() => self.start(call).await,
            InboundEvent::CallEnded(_) if self.is_recording() => self.stop().await,
            InboundEvent::RecordingFileStatusUpdated(status) if self.is_recording() => {
                self.collect(status).await
            }
            event => {
                log::debug!(
                    "Ignoring {} event, recording in progress: {}",
                    event.kind(),
                    self.is_recording()
                );
                Ok(Transition::Ignored)
            }
        }
    }

    async fn start(&mut self, call: CallEvent) -> Result<Transition, ControllerError> {
        let options = self.settings.start_options(&call.server_call_id);
        let started = self
            .operations
            .start_recording(&options)
            .await
            .and_then(|result| match result.recording_id.trim().is_empty() {
                true => Err(AcsError::Parsing("empty recording id".to_string())),
                false => Ok(result),
            })
            .map_err(|source| ControllerError::Start {
                server_call_id: call.server_call_id.clone(),
                source,
            })?;

        log::info!(
            "Recording started with recording id: {} recording state: {:?}",
            started.recording_id,
            started.recording_state
        );

        self.session = Some(CallRecordingSession {
            recording_id: started.recording_id.clone(),
            ..Default::default()
        });

        Ok(Transition::Started {
            recording_id: started.recording_id,
        })
    }

    async fn stop(&mut self) -> Result<Transition, ControllerError> {
        // The session is dropped whether or not the platform confirms the stop.
        let Some(session) = self.session.take() else {
            return Ok(Transition::Ignored);
        };

        match self.operations.stop_recording(&session.recording_id).await {
            Ok(()) => {
                log::info!("Recording {} stopped", session.recording_id);
                Ok(Transition::Stopped {
                    recording_id: session.recording_id,
                })
            }
            Err(source) => Err(ControllerError::Stop {
                recording_id: session.recording_id,
                source,
            }),
        }
    }

    async fn collect(
        &mut self,
        status: RecordingFileStatusEvent,
    ) -> Result<Transition, ControllerError> {
        let chunk = status.first_chunk();
        let Some(session) = self.session.as_mut() else {
            return Ok(Transition::Ignored);
        };
        session.content_location = Some(chunk.content_location.clone());
        session.delete_location = Some(chunk.delete_location.clone());
        let recording_id = session.recording_id.clone();

        log::debug!(
            "Recording {recording_id} content location: {}, delete location: {}",
            chunk.content_location,
            chunk.delete_location
        );

        let file = self.settings.download_path(Local::now(), &recording_id);
        let result = self.download_and_delete(&recording_id, &status, &file).await;
        self.session = None;

        result.map(|()| Transition::Collected { recording_id, file })
    }

    async fn download_and_delete(
        &self,
        recording_id: &str,
        status: &RecordingFileStatusEvent,
        file: &Path,
    ) -> Result<(), ControllerError> {
        let chunk = status.first_chunk();

        let bytes = self
            .operations
            .download_recording(&chunk.content_location, file)
            .await
            .map_err(|source| ControllerError::Download {
                recording_id: recording_id.to_owned(),
                location: chunk.content_location.clone(),
                source,
            })?;
        log::info!(
            "Recording {recording_id} downloaded to {} ({bytes} bytes)",
            file.display()
        );

        self.operations
            .delete_recording(&chunk.delete_location)
            .await
            .map_err(|source| ControllerError::Delete {
                recording_id: recording_id.to_owned(),
                location: chunk.delete_location.clone(),
                source,
            })?;
        log::info!("Recording {recording_id} deleted");

        Ok(())
    }
}
