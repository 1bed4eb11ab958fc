//! Cloud event envelope and the Communication Services system event payloads
//! delivered through Event Grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudEvent {
    pub id: String,
    pub source: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specversion: Option<String>,
}

/// Payload of `Microsoft.Communication.CallStarted` and `Microsoft.Communication.CallEnded`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEventData {
    pub server_call_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<serde_json::Value>,
}

/// Payload of `Microsoft.Communication.RecordingFileStatusUpdated`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingFileStatusUpdatedEventData {
    pub recording_storage_info: RecordingStorageInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recording_duration_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_end_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingStorageInfo {
    #[serde(default)]
    pub recording_chunks: Vec<RecordingChunkInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingChunkInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_reason: Option<String>,
    pub content_location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_location: Option<String>,
    pub delete_location: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_recording_file_status_payload() {
        let data: RecordingFileStatusUpdatedEventData = serde_json::from_value(json!({
            "recordingStorageInfo": {
                "recordingChunks": [{
                    "documentId": "doc-1",
                    "index": 0,
                    "endReason": "SessionEnded",
                    "contentLocation": "https://x/content",
                    "metadataLocation": "https://x/metadata",
                    "deleteLocation": "https://x/delete"
                }]
            },
            "recordingStartTime": "2024-01-01T10:00:00Z",
            "recordingDurationMs": 5000,
            "sessionEndReason": "CallEnded"
        }))
        .unwrap();

        let chunk = &data.recording_storage_info.recording_chunks[0];
        assert_eq!(chunk.content_location, "https://x/content");
        assert_eq!(chunk.delete_location, "https://x/delete");
        assert_eq!(data.recording_duration_ms, Some(5000));
    }

    #[test]
    fn missing_chunk_list_reads_as_empty() {
        let data: RecordingFileStatusUpdatedEventData =
            serde_json::from_value(json!({ "recordingStorageInfo": {} })).unwrap();

        assert!(data.recording_storage_info.recording_chunks.is_empty());
    }

    #[test]
    fn envelope_type_field_is_renamed() {
        let event: CloudEvent = serde_json::from_value(json!({
            "id": "1",
            "source": "/acs",
            "type": "Microsoft.Communication.CallStarted",
            "data": { "serverCallId": "abc" },
            "specversion": "1.0"
        }))
        .unwrap();

        assert_eq!(event.event_type, "Microsoft.Communication.CallStarted");
        assert_eq!(event.data["serverCallId"], "abc");
    }
}
