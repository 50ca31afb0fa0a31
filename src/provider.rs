//! The plugin contract for resource-type providers, plus the shared
//! per-run instance cache. The wire protocol behind a real plugin is out
//! of scope; the engine sees only this trait.

use crate::addrs::ProviderConfig;
use crate::diags::Diagnostics;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

// ─── Errors ───────────────────────────────────────────────────

#[derive(Clone, Debug, Error)]
pub enum ProviderError {
    #[error("no provider is registered for type {0:?}")]
    UnknownType(String),
    #[error("provider instance failed to start: {0}")]
    Start(String),
    #[error("provider call failed: {0}")]
    Call(String),
}

// ─── Wire envelopes ───────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct PlanChangeRequest {
    pub type_name: String,
    /// Prior object value; `Null` when the object does not exist yet.
    pub prior: Value,
    /// The configuration-derived proposed new value.
    pub proposed: Value,
    pub private: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct PlanChangeResponse {
    pub planned: Value,
    /// True when the proposed change cannot be applied in place and the
    /// object must be replaced.
    pub requires_replace: bool,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug)]
pub struct ApplyChangeRequest {
    pub type_name: String,
    pub prior: Value,
    /// Planned new value; `Null` requests a destroy.
    pub planned: Value,
    pub private: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct ApplyChangeResponse {
    /// The object value after the change; `Null` after a destroy.
    pub new_value: Value,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug)]
pub struct ReadResourceRequest {
    pub type_name: String,
    pub prior: Value,
    pub private: Vec<u8>,
}

#[derive(Clone, Debug, Default)]
pub struct ReadResourceResponse {
    /// Refreshed value; `Null` means the object no longer exists.
    pub new_value: Value,
    pub private: Vec<u8>,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug)]
pub struct ReadDataSourceRequest {
    pub type_name: String,
    pub config: Value,
}

#[derive(Clone, Debug, Default)]
pub struct ReadDataSourceResponse {
    pub value: Value,
    pub diagnostics: Diagnostics,
}

#[derive(Clone, Debug)]
pub struct ImportRequest {
    pub type_name: String,
    pub id: String,
}

#[derive(Clone, Debug, Default)]
pub struct ImportResponse {
    pub value: Value,
    pub diagnostics: Diagnostics,
}

// ─── The provider trait ───────────────────────────────────────

/// One live provider plugin instance. All calls may block on I/O; the
/// walker invokes them outside any engine lock. `stop` asks the instance
/// to cancel in-flight work cooperatively and is best-effort.
#[async_trait]
pub trait Provider: Send + Sync {
    async fn configure(&self, config: Value) -> Diagnostics;
    async fn plan_resource_change(&self, req: PlanChangeRequest) -> PlanChangeResponse;
    async fn apply_resource_change(&self, req: ApplyChangeRequest) -> ApplyChangeResponse;
    async fn read_resource(&self, req: ReadResourceRequest) -> ReadResourceResponse;
    async fn read_data_source(&self, req: ReadDataSourceRequest) -> ReadDataSourceResponse;
    async fn import_resource_state(&self, req: ImportRequest) -> ImportResponse;
    async fn stop(&self) -> Result<(), ProviderError>;
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Provider")
    }
}

/// Constructs provider instances on demand, one per resolved provider
/// configuration address.
pub type ProviderFactory =
    Arc<dyn Fn() -> Result<Arc<dyn Provider>, ProviderError> + Send + Sync>;

// ─── Instance cache ───────────────────────────────────────────

/// One live plugin instance per resolved provider configuration address,
/// shared read/write across all concurrently executing vertices under a
/// dedicated lock.
pub struct ProviderCache {
    factories: HashMap<String, ProviderFactory>,
    instances: Mutex<HashMap<ProviderConfig, Arc<dyn Provider>>>,
}

impl ProviderCache {
    pub fn new(factories: HashMap<String, ProviderFactory>) -> Self {
        ProviderCache {
            factories,
            instances: Mutex::new(HashMap::new()),
        }
    }

    pub fn has_type(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Get or start the instance for an address, configuring a freshly
    /// started one with the given configuration value.
    pub async fn ensure(
        &self,
        addr: &ProviderConfig,
        config: Value,
    ) -> Result<Arc<dyn Provider>, Diagnostics> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(addr) {
            return Ok(existing.clone());
        }
        let factory = self.factories.get(&addr.type_name).ok_or_else(|| {
            Diagnostics::from(
                crate::diags::Diagnostic::error(
                    "Missing required provider",
                    format!(
                        "This configuration requires provider {:?}, but no factory for it was registered with the context.",
                        addr.type_name
                    ),
                )
                .with_address(addr),
            )
        })?;
        let instance = factory().map_err(|e| {
            Diagnostics::from(
                crate::diags::Diagnostic::error("Failed to start provider", e.to_string())
                    .with_address(addr),
            )
        })?;
        debug!(provider = %addr, "started provider instance");
        let diags = instance.configure(config).await;
        if diags.has_errors() {
            return Err(diags);
        }
        instances.insert(addr.clone(), instance.clone());
        Ok(instance)
    }

    /// The already-started instance for an address, if any.
    pub async fn get(&self, addr: &ProviderConfig) -> Option<Arc<dyn Provider>> {
        self.instances.lock().await.get(addr).cloned()
    }

    /// Snapshot of all currently-instantiated instances, taken under the
    /// cache lock. Used by the stop watcher.
    pub async fn snapshot(&self) -> Vec<(ProviderConfig, Arc<dyn Provider>)> {
        self.instances
            .lock()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
