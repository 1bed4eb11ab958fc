use crate::{json_body, AcsError, ConnectionString, Pipeline, ROOMS_API_VERSION};
use chrono::{DateTime, Utc};
use futures::stream::{self, Stream, TryStreamExt};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipantRole {
    Presenter,
    Attendee,
    Consumer,
    Collaborator,
}

impl FromStr for ParticipantRole {
    type Err = AcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "presenter" => Ok(ParticipantRole::Presenter),
            "attendee" => Ok(ParticipantRole::Attendee),
            "consumer" => Ok(ParticipantRole::Consumer),
            "collaborator" => Ok(ParticipantRole::Collaborator),
            other => Err(AcsError::InvalidInput(format!("unknown participant role `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomParticipant {
    pub raw_id: String,
    pub role: ParticipantRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommunicationRoom {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub pstn_dial_out_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRoomOptions {
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub pstn_dial_out_enabled: bool,
    pub participants: Vec<RoomParticipant>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateRoomRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    valid_until: Option<DateTime<Utc>>,
    pstn_dial_out_enabled: bool,
    participants: BTreeMap<&'a str, ParticipantProperties>,
}

#[derive(Serialize)]
struct ParticipantProperties {
    role: ParticipantRole,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParticipantsPage {
    #[serde(default)]
    value: Vec<RoomParticipant>,
    next_link: Option<String>,
}

#[derive(Clone)]
pub struct RoomsClient {
    pipeline: Pipeline,
}

impl RoomsClient {
    pub fn new(connection_string: &str) -> Result<RoomsClient, AcsError> {
        Ok(RoomsClient {
            pipeline: Pipeline::new(ConnectionString::parse(connection_string)?),
        })
    }

    pub async fn create_room(
        &self,
        options: &CreateRoomOptions,
    ) -> Result<CommunicationRoom, AcsError> {
        let request = CreateRoomRequest {
            valid_from: options.valid_from,
            valid_until: options.valid_until,
            pstn_dial_out_enabled: options.pstn_dial_out_enabled,
            participants: options
                .participants
                .iter()
                .map(|p| (p.raw_id.as_str(), ParticipantProperties { role: p.role }))
                .collect(),
        };
        let url = self.pipeline.url(&["rooms"], ROOMS_API_VERSION)?;

        self.pipeline
            .send_json(Method::POST, url, json_body(&request)?)
            .await
    }

    pub async fn get_room(&self, room_id: &str) -> Result<CommunicationRoom, AcsError> {
        let url = self.pipeline.url(&["rooms", room_id], ROOMS_API_VERSION)?;
        self.pipeline.send_json(Method::GET, url, Vec::new()).await
    }

    /// Lists the participants of a room. Pages are fetched lazily, one request
    /// per page, following `nextLink` until the service stops returning one.
    /// The stream ends after the first failed page request.
    pub fn participants(
        &self,
        room_id: &str,
    ) -> impl Stream<Item = Result<RoomParticipant, AcsError>> + Send + 'static {
        let pipeline = self.pipeline.clone();
        let first = Some(
            self.pipeline
                .url(&["rooms", room_id, "participants"], ROOMS_API_VERSION),
        );

        stream::try_unfold(first, move |cursor: Option<Result<Url, AcsError>>| {
            let pipeline = pipeline.clone();
            async move {
                let Some(url) = cursor else {
                    return Ok(None);
                };
                let page: ParticipantsPage =
                    pipeline.send_json(Method::GET, url?, Vec::new()).await?;
                let next = page.next_link.map(|link| pipeline.resolve(&link));

                Ok::<_, AcsError>(Some((page.value, next)))
            }
        })
        .map_ok(|page| stream::iter(page.into_iter().map(Ok::<_, AcsError>)))
        .try_flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::connection_string;
    use chrono::TimeZone;
    use futures::StreamExt;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn room_json() -> serde_json::Value {
        json!({
            "id": "room-1",
            "createdAt": "2024-01-01T00:00:00Z",
            "validFrom": "2024-01-01T00:00:00Z",
            "validUntil": "2024-01-31T00:00:00Z",
            "pstnDialOutEnabled": true
        })
    }

    #[tokio::test]
    async fn create_room_sends_participants_keyed_by_raw_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rooms"))
            .and(query_param("api-version", ROOMS_API_VERSION))
            .and(body_json(json!({
                "validFrom": "2024-01-01T00:00:00Z",
                "validUntil": "2024-01-31T00:00:00Z",
                "pstnDialOutEnabled": true,
                "participants": {
                    "8:acs:a": { "role": "Presenter" },
                    "8:acs:b": { "role": "Presenter" }
                }
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(room_json()))
            .expect(1)
            .mount(&server)
            .await;

        let client = RoomsClient::new(&connection_string(&server.uri())).unwrap();
        let options = CreateRoomOptions {
            valid_from: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            valid_until: Some(Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap()),
            pstn_dial_out_enabled: true,
            participants: ["8:acs:a", "8:acs:b"]
                .iter()
                .map(|id| RoomParticipant {
                    raw_id: id.to_string(),
                    role: ParticipantRole::Presenter,
                })
                .collect(),
        };

        let room = client.create_room(&options).await.unwrap();

        assert_eq!(room.id, "room-1");
        assert!(room.pstn_dial_out_enabled);
    }

    #[tokio::test]
    async fn get_room_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/room-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(room_json()))
            .mount(&server)
            .await;

        let client = RoomsClient::new(&connection_string(&server.uri())).unwrap();
        let room = client.get_room("room-1").await.unwrap();

        assert_eq!(room.valid_until, Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap());
    }

    #[tokio::test]
    async fn participants_follow_next_link_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/room-1/participants"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [
                    { "rawId": "8:acs:a", "role": "Presenter" },
                    { "rawId": "8:acs:b", "role": "Attendee" }
                ],
                "nextLink": format!("{}/rooms/room-1/participants/page2", server.uri())
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rooms/room-1/participants/page2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [{ "rawId": "8:acs:c", "role": "Consumer" }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RoomsClient::new(&connection_string(&server.uri())).unwrap();
        let participants: Vec<RoomParticipant> =
            client.participants("room-1").try_collect().await.unwrap();

        let ids: Vec<&str> = participants.iter().map(|p| p.raw_id.as_str()).collect();
        assert_eq!(ids, ["8:acs:a", "8:acs:b", "8:acs:c"]);
        assert_eq!(participants[2].role, ParticipantRole::Consumer);
    }

    #[tokio::test]
    async fn participants_stream_is_lazy_and_ends_after_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rooms/room-1/participants"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let client = RoomsClient::new(&connection_string(&server.uri())).unwrap();
        let participants = client.participants("room-1");
        assert!(server.received_requests().await.unwrap().is_empty());

        let results: Vec<_> = participants.collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(AcsError::Http { .. })));
    }

    #[test]
    fn parses_role_names() {
        assert_eq!(
            "Presenter".parse::<ParticipantRole>().unwrap(),
            ParticipantRole::Presenter
        );
        assert!("owner".parse::<ParticipantRole>().is_err());
    }
}
