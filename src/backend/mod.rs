// Backend state synchronisation (entity cache + observers)

mod client;
mod entity;
pub mod protocol;
mod registry;

pub use client::{HomeAssistantClient, HomeAssistantConfig, RequestPurpose, SessionPhase};
pub use entity::{entity_domain, EntityState};
pub use registry::{HandlerRegistry, RegistrationKey, StateChangeHandler};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

#[cfg(test)]
pub(crate) mod test_support;

/// Capability interface keys use to talk to a backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Name the backend was configured under
    fn name(&self) -> &str;

    /// Run the session for the life of the process. Connection failures are
    /// logged and retried; this never returns.
    async fn run(self: Arc<Self>);

    /// Fire-and-forget service call. Success is only observable through
    /// later state changes.
    fn call_service(&self, domain: &str, service: &str, data: Value, target: Value);

    /// Current cached snapshot, `None` if the entity was never seen
    fn get_entity_info(&self, entity_id: &str) -> Option<Arc<EntityState>>;

    /// Observe `entity_id`. The handler runs on the backend task with the
    /// observer table locked; it must not register or unregister handlers
    /// itself. Doing so panics inside the handler, which is logged and
    /// skipped.
    fn register_state_change_handler(
        &self,
        entity_id: &str,
        handler: StateChangeHandler,
    ) -> RegistrationKey;

    /// Remove a registration. Unknown keys are ignored. Same re-entry rule
    /// as registering.
    fn unregister_state_change_handler(&self, key: &RegistrationKey);
}

/// RAII registration: unregisters its handler when dropped.
pub struct StateSubscription {
    backend: Arc<dyn Backend>,
    key: Option<RegistrationKey>,
}

impl StateSubscription {
    pub fn register(
        backend: &Arc<dyn Backend>,
        entity_id: &str,
        handler: StateChangeHandler,
    ) -> Self {
        let key = backend.register_state_change_handler(entity_id, handler);
        Self {
            backend: Arc::clone(backend),
            key: Some(key),
        }
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.key.as_ref().map(RegistrationKey::entity_id)
    }
}

impl Drop for StateSubscription {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            self.backend.unregister_state_change_handler(&key);
        }
    }
}

/// Backend kinds, selected by `kind` with the kind-specific `values`.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "kind", content = "values")]
pub enum BackendConfig {
    HomeAssistantBackend(HomeAssistantConfig),
}

impl BackendConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::HomeAssistantBackend(_) => "HomeAssistantBackend",
        }
    }

    /// Check kind-specific values without connecting
    pub fn validate(&self) -> Result<()> {
        match self {
            BackendConfig::HomeAssistantBackend(config) => config.session_config().map(|_| ()),
        }
    }
}

/// Backend kinds compiled into this build
pub const AVAILABLE: &[&str] = &["HomeAssistantBackend"];

/// Instantiate every configured backend (sessions are not started)
pub fn create_backends(
    configs: &BTreeMap<String, BackendConfig>,
) -> Result<BTreeMap<String, Arc<dyn Backend>>> {
    let mut backends: BTreeMap<String, Arc<dyn Backend>> = BTreeMap::new();

    for (name, config) in configs {
        let backend: Arc<dyn Backend> = match config {
            BackendConfig::HomeAssistantBackend(values) => {
                Arc::new(HomeAssistantClient::new(name, values)?)
            }
        };
        info!(backend = %name, kind = config.kind(), "Loaded backend");
        backends.insert(name.clone(), backend);
    }

    Ok(backends)
}
