//! Video room creation for live sessions.

use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::FunctionError;
use crate::gateways::VideoRoomProvider;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateRoomRequest {
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRoomResponse {
    pub name: String,
    pub url: String,
}

/// Provider room names allow `[A-Za-z0-9_-]` only.
pub fn room_name(session_id: &str) -> String {
    let cleaned: String = session_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("session-{cleaned}")
}

pub async fn create_video_room(
    rooms: &dyn VideoRoomProvider,
    user: &AuthUser,
    request: CreateRoomRequest,
) -> Result<CreateRoomResponse, FunctionError> {
    if request.session_id.trim().is_empty() {
        return Err(FunctionError::validation("session_id is required"));
    }

    let room = rooms.create_room(&room_name(&request.session_id)).await?;
    log::debug!("{} opened room {}", user.user_id, room.name);
    Ok(CreateRoomResponse {
        name: room.name,
        url: room.url,
    })
}
