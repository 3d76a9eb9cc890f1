//! Backend manager: discovery, health monitoring, routing and failover.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Config;
use crate::error::BackendError;

use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, LmStudioDriver,
    OllamaDriver, OpenRouterDriver, ResponseStream, VllmDriver,
};

/// Default connection timeout for backend discovery probes.
const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cadence of the background health loop.
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Name patterns for models recommended for coding tasks, in preference order.
const RECOMMENDED_MODEL_PATTERNS: &[&str] = &[
    "qwen2.5-coder",
    "qwen-coder",
    "qwen3",
    "codeqwen",
    "starcoder",
    "codellama",
    "deepseek-coder",
    "deepcoder",
];

/// Whether a model switch took effect immediately or only updated the default.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSwitch {
    Live,
    Deferred,
}

/// One model as reported by the model-management surface.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub backend: BackendKind,
}

/// Snapshot of pool health for status displays.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StatusSummary {
    pub total_backends: usize,
    pub available_backends: usize,
    pub preferred_backend: Option<String>,
    pub backend_status: HashMap<String, BackendStatus>,
    pub healthy: bool,
}

/// Manages the driver pool. Drivers are exclusively owned here; routing reads a
/// snapshot of the healthy set at request start, and the health loop never
/// holds the pool lock across network I/O.
pub struct BackendManager {
    config: RwLock<Config>,
    drivers: RwLock<HashMap<BackendKind, Arc<dyn BackendDriver>>>,
    health_task: std::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl BackendManager {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            drivers: RwLock::new(HashMap::new()),
            health_task: std::sync::Mutex::new(None),
        }
    }

    /// Discovers available backends: instantiate each configured kind, probe
    /// with a connection timeout, keep the successes. Then starts the health
    /// loop. Returns per-kind error messages for kinds that failed.
    pub async fn initialize(self: &Arc<Self>) -> HashMap<BackendKind, Option<String>> {
        tracing::info!("initializing backend manager");
        let results = self.discover_backends().await;
        self.start_health_loop();
        let discovered: Vec<&BackendKind> = results
            .iter()
            .filter(|(_, err)| err.is_none())
            .map(|(kind, _)| kind)
            .collect();
        tracing::info!(backends = ?discovered, "backend manager initialized");
        results
    }

    async fn discover_backends(&self) -> HashMap<BackendKind, Option<String>> {
        let config = self.config.read().await.clone();
        let mut results = HashMap::new();

        for kind in BackendKind::ALL {
            let driver: Arc<dyn BackendDriver> = match kind {
                BackendKind::Ollama => Arc::new(OllamaDriver::new(config.ollama.clone())),
                BackendKind::LmStudio => Arc::new(LmStudioDriver::new(config.lm_studio.clone())),
                BackendKind::Vllm => Arc::new(VllmDriver::new(config.vllm.clone())),
                BackendKind::OpenRouter => match OpenRouterDriver::new(config.openrouter.clone()) {
                    Ok(d) => Arc::new(d),
                    Err(e) => {
                        tracing::debug!(backend = %kind, error = %e, "backend not configured");
                        results.insert(kind, Some(e.to_string()));
                        continue;
                    }
                },
            };

            match tokio::time::timeout(DISCOVERY_TIMEOUT, driver.initialize()).await {
                Ok(Ok(())) => {
                    // The probe succeeded; mark routable immediately.
                    driver.health_check().await;
                    self.drivers.write().await.insert(kind, driver);
                    results.insert(kind, None);
                    tracing::info!(backend = %kind, "backend discovered and ready");
                }
                Ok(Err(e)) => {
                    tracing::debug!(backend = %kind, error = %e, "backend not available");
                    driver.cleanup().await;
                    results.insert(kind, Some(e.to_string()));
                }
                Err(_) => {
                    tracing::debug!(backend = %kind, "backend discovery timed out");
                    driver.cleanup().await;
                    results.insert(kind, Some("connection timeout".to_string()));
                }
            }
        }

        results
    }

    /// Inserts a pre-built driver. Used when a driver is constructed outside
    /// discovery (tests, custom providers).
    pub async fn insert_driver(&self, driver: Arc<dyn BackendDriver>) {
        self.drivers.write().await.insert(driver.kind(), driver);
    }

    fn start_health_loop(self: &Arc<Self>) {
        let manager = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_CHECK_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await; // first tick fires immediately; skip it
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                // Snapshot under the lock, probe outside it.
                let snapshot: Vec<Arc<dyn BackendDriver>> =
                    manager.drivers.read().await.values().cloned().collect();
                for driver in snapshot {
                    if driver.status() == BackendStatus::Disconnected {
                        continue;
                    }
                    let healthy = driver.health_check().await;
                    tracing::debug!(backend = %driver.kind(), healthy, "periodic health check");
                }
            }
        });
        *self.health_task.lock().unwrap() = Some(handle);
    }

    /// Stops the health loop and cleans up all drivers.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.health_task.lock().unwrap().take() {
            handle.abort();
        }
        let drivers: Vec<Arc<dyn BackendDriver>> =
            self.drivers.write().await.drain().map(|(_, d)| d).collect();
        for driver in drivers {
            driver.cleanup().await;
        }
        tracing::info!("backend manager cleaned up");
    }

    pub async fn get_driver(&self, kind: BackendKind) -> Option<Arc<dyn BackendDriver>> {
        self.drivers.read().await.get(&kind).cloned()
    }

    /// Drivers whose latest probe succeeded.
    pub async fn healthy_drivers(&self) -> Vec<Arc<dyn BackendDriver>> {
        let config = self.config.read().await;
        let drivers = self.drivers.read().await;
        let mut ordered: Vec<Arc<dyn BackendDriver>> = Vec::new();
        for kind in config
            .preferred_backends
            .iter()
            .copied()
            .chain(BackendKind::ALL)
        {
            if ordered.iter().any(|d| d.kind() == kind) {
                continue;
            }
            if let Some(driver) = drivers.get(&kind) {
                if driver.status() == BackendStatus::Available {
                    ordered.push(Arc::clone(driver));
                }
            }
        }
        ordered
    }

    /// Routing: caller preference if healthy, else configured preference list,
    /// else any healthy driver.
    pub async fn select_backend(
        &self,
        preferred: Option<BackendKind>,
    ) -> Option<Arc<dyn BackendDriver>> {
        if let Some(kind) = preferred {
            if let Some(driver) = self.get_driver(kind).await {
                if driver.status() == BackendStatus::Available {
                    return Some(driver);
                }
            }
        }
        self.healthy_drivers().await.into_iter().next()
    }

    /// Generates with failover.
    ///
    /// The chosen driver streams first; if it fails before its terminal element
    /// and `fallback` is set, the remaining healthy drivers are tried in
    /// preference order with a restarted request. Output already delivered is
    /// not retracted. When every candidate fails, the final error is an
    /// aggregate `Unavailable`.
    pub async fn generate(
        &self,
        request: LlmRequest,
        preferred: Option<BackendKind>,
        fallback: bool,
    ) -> Result<ResponseStream, BackendError> {
        // Snapshot the candidate list at request start; later health mutations
        // do not reorder an in-flight request.
        let mut candidates: Vec<Arc<dyn BackendDriver>> = Vec::new();
        if let Some(kind) = preferred {
            if let Some(driver) = self.get_driver(kind).await {
                if driver.status() == BackendStatus::Available {
                    candidates.push(driver);
                }
            }
        }
        for driver in self.healthy_drivers().await {
            if !candidates.iter().any(|c| c.kind() == driver.kind()) {
                candidates.push(driver);
            }
        }
        if candidates.is_empty() {
            return Err(BackendError::Unavailable(
                "no healthy backends are available".to_string(),
            ));
        }
        if !fallback {
            candidates.truncate(1);
        }

        let first = Arc::clone(&candidates[0]);
        tracing::info!(backend = %first.kind(), candidates = candidates.len(), "routing request");

        let stream = async_stream::stream! {
            let mut last_error: Option<BackendError> = None;
            let total = candidates.len();
            for (i, driver) in candidates.into_iter().enumerate() {
                if i > 0 {
                    tracing::info!(backend = %driver.kind(), "trying fallback backend");
                }
                match driver.generate(request.clone()).await {
                    Ok(mut inner) => {
                        let mut failed = false;
                        while let Some(item) = inner.next().await {
                            match item {
                                Ok(response) => {
                                    let terminal = !response.is_partial;
                                    yield Ok(response);
                                    if terminal {
                                        return;
                                    }
                                }
                                Err(e) => {
                                    tracing::warn!(backend = %driver.kind(), error = %e, "request failed mid-stream");
                                    last_error = Some(e);
                                    failed = true;
                                    break;
                                }
                            }
                        }
                        if !failed {
                            // Stream ended without a terminal element; treat as
                            // a failure so failover (or the aggregate error)
                            // kicks in rather than dangling.
                            last_error = Some(BackendError::InvalidResponse(format!(
                                "{}: stream ended without a terminal element",
                                driver.kind()
                            )));
                        }
                    }
                    Err(e) => {
                        tracing::warn!(backend = %driver.kind(), error = %e, "request failed to start");
                        last_error = Some(e);
                    }
                }
                if i + 1 == total {
                    match last_error.take() {
                        Some(e) if total == 1 => yield Err(e),
                        Some(e) => {
                            yield Err(BackendError::Unavailable(format!(
                                "all backends failed; last error: {}",
                                e
                            )));
                        }
                        None => {
                            yield Err(BackendError::Unavailable(
                                "all backends failed".to_string(),
                            ));
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    // Model management surface.

    pub async fn get_all_models(&self) -> HashMap<BackendKind, Vec<ModelInfo>> {
        let drivers: Vec<(BackendKind, Arc<dyn BackendDriver>)> = self
            .drivers
            .read()
            .await
            .iter()
            .map(|(k, d)| (*k, Arc::clone(d)))
            .collect();
        let mut all = HashMap::new();
        for (kind, driver) in drivers {
            let models = match driver.list_models().await {
                Ok(ids) => ids
                    .into_iter()
                    .map(|id| ModelInfo {
                        name: id.clone(),
                        id,
                        backend: kind,
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(backend = %kind, error = %e, "failed to list models");
                    Vec::new()
                }
            };
            all.insert(kind, models);
        }
        all
    }

    pub async fn get_models_by_backend(&self, kind: BackendKind) -> Vec<ModelInfo> {
        let Some(driver) = self.get_driver(kind).await else {
            return Vec::new();
        };
        match driver.list_models().await {
            Ok(ids) => ids
                .into_iter()
                .map(|id| ModelInfo {
                    name: id.clone(),
                    id,
                    backend: kind,
                })
                .collect(),
            Err(e) => {
                tracing::warn!(backend = %kind, error = %e, "failed to list models");
                Vec::new()
            }
        }
    }

    /// Currently active/default model per discovered backend.
    pub async fn get_current_models(&self) -> HashMap<BackendKind, Option<String>> {
        let drivers: Vec<(BackendKind, Arc<dyn BackendDriver>)> = self
            .drivers
            .read()
            .await
            .iter()
            .map(|(k, d)| (*k, Arc::clone(d)))
            .collect();
        let mut current = HashMap::new();
        for (kind, driver) in drivers {
            current.insert(kind, driver.current_model().await);
        }
        current
    }

    /// Switches the model on one backend; the result says whether the change
    /// is live or deferred to the provider's own controls.
    pub async fn switch_model(
        &self,
        kind: BackendKind,
        model_id: &str,
    ) -> Result<ModelSwitch, BackendError> {
        let driver = self
            .get_driver(kind)
            .await
            .ok_or_else(|| BackendError::Unavailable(format!("backend {} not discovered", kind)))?;
        let switch = driver.switch_model(model_id).await?;
        tracing::info!(backend = %kind, model = model_id, ?switch, "model switch");
        Ok(switch)
    }

    /// Case-insensitive substring search across every backend's model list.
    pub async fn find_model_across_backends(&self, pattern: &str) -> Vec<ModelInfo> {
        let needle = pattern.to_lowercase();
        let mut matches = Vec::new();
        for models in self.get_all_models().await.into_values() {
            for model in models {
                if model.id.to_lowercase().contains(&needle)
                    || model.name.to_lowercase().contains(&needle)
                {
                    matches.push(model);
                }
            }
        }
        matches
    }

    /// Models matching the fixed coding-model pattern list, deduplicated,
    /// pattern order preserved.
    pub async fn get_recommended_models(&self) -> Vec<ModelInfo> {
        let mut seen = std::collections::HashSet::new();
        let mut recommended = Vec::new();
        for pattern in RECOMMENDED_MODEL_PATTERNS {
            for model in self.find_model_across_backends(pattern).await {
                let key = (model.backend, model.id.clone());
                if seen.insert(key) {
                    recommended.push(model);
                }
            }
        }
        recommended
    }

    pub async fn get_backend_info(&self) -> HashMap<BackendKind, BackendInfo> {
        let drivers: Vec<(BackendKind, Arc<dyn BackendDriver>)> = self
            .drivers
            .read()
            .await
            .iter()
            .map(|(k, d)| (*k, Arc::clone(d)))
            .collect();
        let mut info = HashMap::new();
        for (kind, driver) in drivers {
            info.insert(kind, driver.get_info().await);
        }
        info
    }

    pub async fn status_summary(&self) -> StatusSummary {
        let drivers = self.drivers.read().await;
        let backend_status: HashMap<String, BackendStatus> = drivers
            .iter()
            .map(|(kind, driver)| (kind.to_string(), driver.status()))
            .collect();
        drop(drivers);
        let healthy = self.healthy_drivers().await;
        StatusSummary {
            total_backends: backend_status.len(),
            available_backends: healthy.len(),
            preferred_backend: healthy.first().map(|d| d.kind().to_string()),
            backend_status,
            healthy: !healthy.is_empty(),
        }
    }

    /// Moves `kind` to the front of the preference order.
    pub async fn switch_backend(&self, kind: BackendKind) -> bool {
        if self.get_driver(kind).await.is_none() {
            return false;
        }
        let mut config = self.config.write().await;
        let mut order = vec![kind];
        order.extend(config.preferred_backends.iter().copied().filter(|k| *k != kind));
        config.preferred_backends = order;
        tracing::info!(backend = %kind, "switched primary backend");
        true
    }
}
