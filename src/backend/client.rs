use crate::backend::entity::EntityState;
use crate::backend::protocol::{
    parse_inbound, InboundMessage, OutboundMessage, ResultError, StateChangedData, STATE_CHANGED,
};
use crate::backend::registry::{HandlerRegistry, RegistrationKey, StateChangeHandler};
use crate::backend::Backend;
use crate::transport::{MessageHandler, Outbound, SessionConfig, TransportSession};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Home Assistant backend configuration (`backends.<name>.values`)
#[derive(Clone, Debug, Deserialize)]
pub struct HomeAssistantConfig {
    /// WebSocket API endpoint, e.g. "wss://hass.local:8123/api/websocket"
    pub url: String,
    /// Long-lived access token
    pub token: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
}

fn default_reconnect_delay_secs() -> u64 {
    1
}

impl HomeAssistantConfig {
    pub fn session_config(&self) -> Result<SessionConfig> {
        let url = Url::parse(&self.url).with_context(|| format!("invalid url '{}'", self.url))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            bail!("url '{}' must use the ws:// or wss:// scheme", self.url);
        }
        if self.token.is_empty() {
            bail!("token must not be empty");
        }

        Ok(SessionConfig {
            url,
            insecure: self.insecure,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        })
    }
}

/// Where one connection attempt is in the handshake
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    AwaitingAuth,
    AuthSent,
    Subscribing,
    Synced,
}

/// What an outstanding request was sent for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestPurpose {
    SubscribeEvents,
    GetStates,
    CallService,
}

/// State-synchronising client for the Home Assistant WebSocket API.
///
/// Keeps a local cache of every entity, pushed by `state_changed` events and
/// refreshed in bulk by `get_states` after each (re)connect. The cache
/// survives reconnects, so a backend outage shows stale state rather than
/// nothing.
pub struct HomeAssistantClient {
    name: String,
    access_token: String,
    session: TransportSession,

    /// Lock-free entity cache, one atomic swap per update
    entities: DashMap<String, Arc<EntityState>>,

    handlers: HandlerRegistry,

    /// Correlation ids, strictly increasing for the life of the client
    next_id: AtomicU64,

    /// Id of the `get_states` request of the current connection (0 = none)
    get_states_id: AtomicU64,

    pending: Mutex<HashMap<u64, RequestPurpose>>,
    outbound: Mutex<Option<Outbound>>,
    phase: Mutex<SessionPhase>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl HomeAssistantClient {
    pub fn new(name: &str, config: &HomeAssistantConfig) -> Result<Self> {
        let session_config = config
            .session_config()
            .with_context(|| format!("backend '{name}'"))?;

        Ok(Self {
            name: name.to_string(),
            access_token: config.token.clone(),
            session: TransportSession::new(session_config),
            entities: DashMap::new(),
            handlers: HandlerRegistry::new(),
            next_id: AtomicU64::new(1),
            get_states_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(None),
            phase: Mutex::new(SessionPhase::Disconnected),
        })
    }

    pub fn phase(&self) -> SessionPhase {
        *lock(&self.phase)
    }

    fn set_phase(&self, phase: SessionPhase) {
        *lock(&self.phase) = phase;
    }

    /// Number of entities in the cache
    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Number of live state change handlers for an entity
    pub fn handler_count(&self, entity_id: &str) -> usize {
        self.handlers.count(entity_id)
    }

    /// Number of requests still waiting for their `result`
    pub fn pending_requests(&self) -> usize {
        lock(&self.pending).len()
    }

    /// Queue a frame on the current connection without waiting for it to
    /// reach the wire. Frames are dropped while disconnected.
    fn send(&self, message: &OutboundMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(backend = %self.name, error = %e, "Failed to encode frame");
                return false;
            }
        };

        // Clone the handle so the lock is not held while queueing
        let outbound = lock(&self.outbound).clone();
        match outbound {
            Some(outbound) if outbound.send(text) => true,
            _ => {
                warn!(backend = %self.name, id = ?message.id(), "Not connected, dropping frame");
                false
            }
        }
    }

    /// Send a request with a fresh correlation id, returning the id.
    fn send_with_id(&self, purpose: RequestPurpose, build: impl FnOnce(u64) -> OutboundMessage) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        lock(&self.pending).insert(id, purpose);
        if !self.send(&build(id)) {
            lock(&self.pending).remove(&id);
        }
        id
    }

    /// Process one inbound text frame
    pub fn handle_message(&self, text: &str) {
        debug!(backend = %self.name, message = %text, "Received message");

        let message = match parse_inbound(text) {
            Ok(message) => message,
            Err(e) => {
                warn!(backend = %self.name, error = %e, "Malformed frame dropped");
                return;
            }
        };

        match message {
            InboundMessage::AuthRequired { ha_version } => {
                info!(backend = %self.name, version = ?ha_version, "Authentication required");
                self.send(&OutboundMessage::Auth {
                    access_token: self.access_token.clone(),
                });
                self.set_phase(SessionPhase::AuthSent);
            }
            InboundMessage::AuthOk { .. } => {
                info!(backend = %self.name, "Authenticated, subscribing to events");
                self.set_phase(SessionPhase::Subscribing);
                self.send_with_id(RequestPurpose::SubscribeEvents, |id| {
                    OutboundMessage::SubscribeEvents { id }
                });
                let id = self.send_with_id(RequestPurpose::GetStates, |id| {
                    OutboundMessage::GetStates { id }
                });
                self.get_states_id.store(id, Ordering::SeqCst);
            }
            InboundMessage::AuthInvalid { message } => {
                warn!(
                    backend = %self.name,
                    reason = message.as_deref().unwrap_or("unknown"),
                    "Authentication rejected"
                );
            }
            InboundMessage::Result {
                id,
                success,
                result,
                error,
            } => self.handle_result(id, success, result, error),
            InboundMessage::Event { event, .. } => {
                if event.event_type != STATE_CHANGED {
                    debug!(backend = %self.name, event_type = %event.event_type, "Ignoring event");
                    return;
                }
                match serde_json::from_value::<StateChangedData>(event.data) {
                    Ok(data) => self.apply_state_change(data),
                    Err(e) => warn!(backend = %self.name, error = %e, "Malformed state_changed event"),
                }
            }
            InboundMessage::Unknown => {
                warn!(backend = %self.name, message = %text, "Unknown message");
            }
        }
    }

    fn handle_result(&self, id: u64, success: bool, result: Value, error: Option<ResultError>) {
        let purpose = lock(&self.pending).remove(&id);

        if !success {
            // Failed requests only get logged; state follows the event stream
            let error = error.unwrap_or_default();
            warn!(
                backend = %self.name,
                id = id,
                purpose = ?purpose,
                code = %error.code,
                message = %error.message,
                "Request failed"
            );
            return;
        }

        let get_states_id = self.get_states_id.load(Ordering::SeqCst);
        if get_states_id != 0 && id == get_states_id {
            if self.apply_states(result) {
                self.set_phase(SessionPhase::Synced);
            }
        } else {
            debug!(backend = %self.name, id = id, purpose = ?purpose, "Request succeeded");
        }
    }

    /// Bulk population from a `get_states` result. Observers fire per
    /// entity, in the order received. Returns false if the result was not
    /// a list.
    fn apply_states(&self, result: Value) -> bool {
        let Value::Array(entities) = result else {
            warn!(backend = %self.name, "get_states result is not a list, ignoring");
            return false;
        };

        let mut loaded = 0;
        for raw in entities {
            match serde_json::from_value::<EntityState>(raw) {
                Ok(state) => {
                    self.store_and_dispatch(state);
                    loaded += 1;
                }
                Err(e) => warn!(backend = %self.name, error = %e, "Skipping malformed entity"),
            }
        }

        info!(backend = %self.name, entities = loaded, "Initial states loaded");
        true
    }

    fn apply_state_change(&self, data: StateChangedData) {
        match data.new_state {
            Some(state) => self.store_and_dispatch(state),
            None => {
                if self.entities.remove(&data.entity_id).is_some() {
                    info!(backend = %self.name, entity_id = %data.entity_id, "Entity removed");
                }
            }
        }
    }

    fn store_and_dispatch(&self, state: EntityState) {
        let state = Arc::new(state);
        self.entities
            .insert(state.entity_id.clone(), Arc::clone(&state));
        self.handlers.dispatch(&state);
    }
}

impl MessageHandler for HomeAssistantClient {
    fn on_open(&self, outbound: Outbound) {
        *lock(&self.outbound) = Some(outbound);
        lock(&self.pending).clear();
        self.get_states_id.store(0, Ordering::SeqCst);
        self.set_phase(SessionPhase::AwaitingAuth);
    }

    fn on_message(&self, text: &str) {
        self.handle_message(text);
    }

    fn on_close(&self) {
        *lock(&self.outbound) = None;
        self.set_phase(SessionPhase::Disconnected);
        info!(
            backend = %self.name,
            cached_entities = self.entities.len(),
            "Disconnected, keeping cached state"
        );
    }
}

#[async_trait]
impl Backend for HomeAssistantClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Arc<Self>) {
        info!(backend = %self.name, url = %self.session.config().url, "Starting backend session");
        self.session.run_forever(&*self).await;
    }

    fn call_service(&self, domain: &str, service: &str, data: Value, target: Value) {
        info!(backend = %self.name, domain = %domain, service = %service, "Calling service");
        self.send_with_id(RequestPurpose::CallService, |id| OutboundMessage::CallService {
            id,
            domain: domain.to_string(),
            service: service.to_string(),
            service_data: data,
            target,
        });
    }

    fn get_entity_info(&self, entity_id: &str) -> Option<Arc<EntityState>> {
        self.entities.get(entity_id).map(|e| Arc::clone(e.value()))
    }

    fn register_state_change_handler(
        &self,
        entity_id: &str,
        handler: StateChangeHandler,
    ) -> RegistrationKey {
        self.handlers.register(entity_id, handler)
    }

    fn unregister_state_change_handler(&self, key: &RegistrationKey) {
        self.handlers.unregister(key);
    }
}
