use crate::backend::entity::EntityState;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Client → Server frames
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    Auth {
        access_token: String,
    },
    SubscribeEvents {
        id: u64,
    },
    GetStates {
        id: u64,
    },
    CallService {
        id: u64,
        domain: String,
        service: String,
        service_data: Value,
        target: Value,
    },
}

impl OutboundMessage {
    /// Correlation id carried by the frame (auth frames have none)
    pub fn id(&self) -> Option<u64> {
        match self {
            OutboundMessage::Auth { .. } => None,
            OutboundMessage::SubscribeEvents { id }
            | OutboundMessage::GetStates { id }
            | OutboundMessage::CallService { id, .. } => Some(*id),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Server → Client frames
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        #[serde(default = "default_success")]
        success: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<ResultError>,
    },
    Event {
        #[serde(default)]
        id: Option<u64>,
        event: EventPayload,
    },
    #[serde(other)]
    Unknown,
}

fn default_success() -> bool {
    true
}

/// Error detail attached to a failed `result` frame
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResultError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

/// Body of an `event` frame
#[derive(Debug, Clone, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
}

/// `data` of a `state_changed` event. `new_state` is null when the entity
/// was removed on the server.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChangedData {
    pub entity_id: String,
    #[serde(default)]
    pub new_state: Option<EntityState>,
}

pub const STATE_CHANGED: &str = "state_changed";

/// Parse a text frame received from the server
pub fn parse_inbound(text: &str) -> serde_json::Result<InboundMessage> {
    serde_json::from_str(text)
}
