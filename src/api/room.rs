use crate::CONFIG;
use acs::{CommunicationRoom, CreateRoomOptions, ParticipantRole, RoomParticipant, RoomsClient};
use anyhow::{Context, Result};
use axum::extract::Path;
use axum::http::StatusCode;
use axum::{Extension, Json};
use chrono::{DateTime, Duration, Utc};
use futures::TryStreamExt;

/// Defaults applied to every room created through the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSettings {
    pub validity: Duration,
    pub role: ParticipantRole,
    pub pstn_dial_out_enabled: bool,
}

impl RoomSettings {
    pub fn from_config() -> Result<Self> {
        Ok(Self {
            validity: Duration::days(CONFIG.rooms.validity_days),
            role: CONFIG
                .rooms
                .participant_role
                .parse()
                .context("rooms.participant_role")?,
            pstn_dial_out_enabled: CONFIG.rooms.pstn_dial_out_enabled,
        })
    }

    /// A room valid from `now` for the configured window, every participant
    /// holding the configured role.
    pub fn create_options(
        &self,
        participants: Vec<String>,
        now: DateTime<Utc>,
    ) -> CreateRoomOptions {
        CreateRoomOptions {
            valid_from: Some(now),
            valid_until: Some(now + self.validity),
            pstn_dial_out_enabled: self.pstn_dial_out_enabled,
            participants: participants
                .into_iter()
                .map(|raw_id| RoomParticipant {
                    raw_id,
                    role: self.role,
                })
                .collect(),
        }
    }
}

/// A `null` body creates a room without participants.
pub async fn create_room(
    Extension(rooms): Extension<RoomsClient>,
    Extension(settings): Extension<RoomSettings>,
    Json(participants): Json<Option<Vec<String>>>,
) -> Result<Json<CommunicationRoom>, StatusCode> {
    let options = settings.create_options(participants.unwrap_or_default(), Utc::now());

    let room = rooms.create_room(&options).await.map_err(|e| {
        log::error!("Error creating a room: {e}");
        StatusCode::BAD_GATEWAY
    })?;

    log::info!(
        "Room {} created with {} participants, valid until {}",
        room.id,
        options.participants.len(),
        room.valid_until
    );
    Ok(Json(room))
}

pub async fn get_room(
    Extension(rooms): Extension<RoomsClient>,
    Path(room_id): Path<String>,
) -> Result<Json<CommunicationRoom>, StatusCode> {
    rooms.get_room(&room_id).await.map(Json).map_err(|e| {
        log::error!("Error getting room {room_id}: {e}");
        StatusCode::BAD_GATEWAY
    })
}

pub async fn list_participants(
    Extension(rooms): Extension<RoomsClient>,
    Path(room_id): Path<String>,
) -> Result<Json<Vec<RoomParticipant>>, StatusCode> {
    rooms
        .participants(&room_id)
        .try_collect::<Vec<_>>()
        .await
        .map(Json)
        .map_err(|e| {
            log::error!("Error listing participants of room {room_id}: {e}");
            StatusCode::BAD_GATEWAY
        })
}
