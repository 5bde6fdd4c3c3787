//! In-process Home Assistant session for key and menu tests.

use super::{Backend, HomeAssistantClient, HomeAssistantConfig};
use crate::transport::{outbound_channel, MessageHandler};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A client that went through the handshake on a fake connection
pub(crate) struct LiveBackend {
    pub client: Arc<HomeAssistantClient>,
    frames: UnboundedReceiver<String>,
    get_states_id: u64,
}

impl LiveBackend {
    pub fn connected() -> Self {
        let config = HomeAssistantConfig {
            url: "ws://localhost:8123/api/websocket".to_string(),
            token: "secret".to_string(),
            insecure: false,
            reconnect_delay_secs: 1,
        };
        let client = Arc::new(HomeAssistantClient::new("home", &config).unwrap());
        let (outbound, frames) = outbound_channel();
        client.on_open(outbound);
        client.handle_message(r#"{"type":"auth_required"}"#);
        client.handle_message(r#"{"type":"auth_ok"}"#);

        let mut live = Self {
            client,
            frames,
            get_states_id: 0,
        };
        live.get_states_id = live
            .drain()
            .iter()
            .find(|f| f["type"] == "get_states")
            .and_then(|f| f["id"].as_u64())
            .unwrap();
        live
    }

    pub fn backend(&self) -> Arc<dyn Backend> {
        self.client.clone()
    }

    /// Answer the pending get_states request
    pub fn load_states(&self, entities: Vec<Value>) {
        self.client.handle_message(
            &json!({ "id": self.get_states_id, "type": "result", "success": true, "result": entities })
                .to_string(),
        );
    }

    /// Push a state_changed event
    pub fn change(&self, entity: Value) {
        let entity_id = entity["entity_id"].clone();
        self.client.handle_message(
            &json!({
                "id": 1,
                "type": "event",
                "event": {
                    "event_type": "state_changed",
                    "data": { "entity_id": entity_id, "new_state": entity }
                }
            })
            .to_string(),
        );
    }

    /// Service calls sent since the last drain
    pub fn service_calls(&mut self) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter(|f| f["type"] == "call_service")
            .map(|mut f| {
                if let Some(frame) = f.as_object_mut() {
                    frame.remove("id");
                    frame.remove("type");
                }
                f
            })
            .collect()
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(text) = self.frames.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }
}

pub(crate) fn entity(entity_id: &str, state: &str, attributes: Value) -> Value {
    json!({
        "entity_id": entity_id,
        "state": state,
        "attributes": attributes,
        "last_changed": "2024-05-01T10:00:00.000000+00:00",
        "last_reported": "2024-05-01T10:00:00.000000+00:00",
        "last_updated": "2024-05-01T10:00:00.000000+00:00",
        "context": { "id": "01HX", "parent_id": null, "user_id": null }
    })
}
