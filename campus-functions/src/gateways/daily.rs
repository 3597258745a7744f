//! Daily.co room adapter.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{upstream_error, VideoRoom, VideoRoomProvider};
use crate::error::FunctionError;

pub struct DailyRoomProvider {
    client: Client,
    api_key: String,
    base_url: String,
    room_ttl_secs: i64,
}

#[derive(Debug, Deserialize)]
struct DailyRoom {
    name: String,
    url: String,
}

impl DailyRoomProvider {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, room_ttl_secs: i64) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            room_ttl_secs,
        }
    }
}

#[async_trait]
impl VideoRoomProvider for DailyRoomProvider {
    async fn create_room(&self, name: &str) -> Result<VideoRoom, FunctionError> {
        let body = json!({
            "name": name,
            "privacy": "private",
            "properties": {
                "exp": Utc::now().timestamp() + self.room_ttl_secs,
                "enable_screenshare": true,
                "enable_chat": true,
            }
        });

        let response = self
            .client
            .post(format!("{}/rooms", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error("Daily", response).await);
        }

        let room: DailyRoom = response
            .json()
            .await
            .map_err(|e| FunctionError::Unknown(format!("Failed to parse Daily response: {e}")))?;
        log::info!("Created video room {}", room.name);
        Ok(VideoRoom {
            name: room.name,
            url: room.url,
        })
    }
}
