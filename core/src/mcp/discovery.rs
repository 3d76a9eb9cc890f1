//! MCP discovery service: keeps server connections alive and mirrors their
//! tools into the local registry.
//!
//! Two background loops: a reconnect loop (30 s) that retries failed servers
//! subject to `retry_attempts`/`retry_delay`, and a health loop (60 s) that
//! pings connected servers and bounces them on failure. Registry access goes
//! through the [`RegistryMutator`] handle, so discovery has no compile-time
//! dependency on the registry internals.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dashmap::DashMap;

use crate::error::McpError;
use crate::tools::{Tool, ToolRegistry};

use super::{McpClient, McpServerConfig, McpServerState, McpServerStatus, McpToolAdapter};

const RECONNECT_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_INTERVAL: Duration = Duration::from_secs(60);

/// Registry surface the discovery service needs.
pub trait RegistryMutator: Send + Sync {
    fn register_server_tool(&self, server_name: &str, tool: Arc<dyn Tool>);
    fn remove_server_tools(&self, server_name: &str) -> usize;
}

impl RegistryMutator for ToolRegistry {
    fn register_server_tool(&self, server_name: &str, tool: Arc<dyn Tool>) {
        ToolRegistry::register_server_tool(self, server_name, tool)
    }

    fn remove_server_tools(&self, server_name: &str) -> usize {
        ToolRegistry::remove_server_tools(self, server_name)
    }
}

struct ServerEntry {
    client: Arc<McpClient>,
    state: Arc<Mutex<McpServerState>>,
}

/// Holds `name -> server state` and drives connect/reconnect/health.
pub struct McpDiscovery {
    servers: DashMap<String, ServerEntry>,
    registry: Arc<dyn RegistryMutator>,
    tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl McpDiscovery {
    pub fn new(configs: Vec<McpServerConfig>, registry: Arc<dyn RegistryMutator>) -> Arc<Self> {
        let servers = DashMap::new();
        for config in configs {
            if config.name.is_empty() {
                tracing::warn!("skipping MCP server with empty name");
                continue;
            }
            let client = Arc::new(McpClient::new(config.clone()));
            servers.insert(
                config.name.clone(),
                ServerEntry {
                    client,
                    state: Arc::new(Mutex::new(McpServerState::new(config))),
                },
            );
        }
        Arc::new(Self {
            servers,
            registry,
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Connects all enabled servers in parallel, then starts the background
    /// loops.
    pub async fn start(self: &Arc<Self>) {
        let names: Vec<String> = self
            .servers
            .iter()
            .filter(|entry| entry.value().state.lock().unwrap().config.enabled)
            .map(|entry| entry.key().clone())
            .collect();

        let connects = names.iter().map(|name| {
            let this = Arc::clone(self);
            let name = name.clone();
            async move {
                if let Err(e) = this.connect_server(&name).await {
                    tracing::warn!(server = %name, error = %e, "initial MCP connect failed");
                }
            }
        });
        futures::future::join_all(connects).await;

        self.spawn_reconnect_loop();
        self.spawn_health_loop();
        tracing::info!(servers = self.servers.len(), "MCP discovery started");
    }

    /// Stops the loops, disconnects every server and deregisters its tools.
    pub async fn stop(&self) {
        for handle in self.tasks.lock().unwrap().drain(..) {
            handle.abort();
        }
        let names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            let _ = self.disconnect_server(&name).await;
        }
        tracing::info!("MCP discovery stopped");
    }

    /// Connects one server, lists its tools and registers the adapters.
    pub async fn connect_server(&self, name: &str) -> Result<usize, McpError> {
        let (client, state) = {
            let entry = self
                .servers
                .get(name)
                .ok_or_else(|| McpError::Discovery(format!("unknown MCP server: {}", name)))?;
            (Arc::clone(&entry.client), Arc::clone(&entry.state))
        };

        {
            let mut s = state.lock().unwrap();
            if !s.config.enabled {
                return Err(McpError::Discovery(format!("server {} is disabled", name)));
            }
            s.status = McpServerStatus::Connecting;
            s.connection_attempts += 1;
        }

        match client.connect().await {
            Ok(info) => {
                let tools = match client.list_tools().await {
                    Ok(tools) => tools,
                    Err(e) => {
                        client.disconnect().await;
                        let mut s = state.lock().unwrap();
                        s.status = McpServerStatus::Error;
                        s.last_error = Some(e.to_string());
                        return Err(e);
                    }
                };

                // Replace any stale registrations before adding the fresh set.
                self.registry.remove_server_tools(name);
                for tool in &tools {
                    let adapter = McpToolAdapter::new(tool.clone(), Arc::clone(&client), name);
                    self.registry.register_server_tool(name, Arc::new(adapter));
                }

                let count = tools.len();
                let mut s = state.lock().unwrap();
                s.status = McpServerStatus::Connected;
                s.info = Some(info);
                s.tools = tools;
                s.last_error = None;
                s.last_connected = Some(chrono::Utc::now());
                s.connection_attempts = 0;
                tracing::info!(server = name, tools = count, "MCP server connected");
                Ok(count)
            }
            Err(e) => {
                let mut s = state.lock().unwrap();
                s.status = McpServerStatus::Error;
                s.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Disconnects one server and removes its adapters from the registry.
    pub async fn disconnect_server(&self, name: &str) -> Result<(), McpError> {
        let (client, state) = {
            let entry = self
                .servers
                .get(name)
                .ok_or_else(|| McpError::Discovery(format!("unknown MCP server: {}", name)))?;
            (Arc::clone(&entry.client), Arc::clone(&entry.state))
        };

        let removed = self.registry.remove_server_tools(name);
        client.disconnect().await;
        let mut s = state.lock().unwrap();
        s.status = if s.config.enabled {
            McpServerStatus::Disconnected
        } else {
            McpServerStatus::Disabled
        };
        s.tools.clear();
        tracing::info!(server = name, removed, "MCP server disconnected");
        Ok(())
    }

    pub fn server_status(&self, name: &str) -> Option<McpServerState> {
        self.servers
            .get(name)
            .map(|entry| entry.state.lock().unwrap().clone())
    }

    pub fn all_server_status(&self) -> Vec<McpServerState> {
        self.servers
            .iter()
            .map(|entry| entry.state.lock().unwrap().clone())
            .collect()
    }

    fn spawn_reconnect_loop(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(RECONNECT_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(this) = this.upgrade() else { break };
                let candidates: Vec<(String, u64)> = this
                    .servers
                    .iter()
                    .filter_map(|entry| {
                        let s = entry.value().state.lock().unwrap();
                        let retriable = matches!(
                            s.status,
                            McpServerStatus::Error | McpServerStatus::Disconnected
                        );
                        if s.config.enabled
                            && retriable
                            && s.connection_attempts < s.config.retry_attempts
                        {
                            Some((entry.key().clone(), s.config.retry_delay))
                        } else {
                            None
                        }
                    })
                    .collect();
                for (name, retry_delay) in candidates {
                    tokio::time::sleep(Duration::from_secs(retry_delay)).await;
                    match this.connect_server(&name).await {
                        Ok(_) => tracing::info!(server = %name, "reconnected to MCP server"),
                        Err(e) => {
                            tracing::debug!(server = %name, error = %e, "MCP reconnect failed")
                        }
                    }
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }

    fn spawn_health_loop(self: &Arc<Self>) {
        let this = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(HEALTH_INTERVAL);
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(this) = this.upgrade() else { break };
                let connected: Vec<(String, Arc<McpClient>)> = this
                    .servers
                    .iter()
                    .filter(|e| {
                        e.value().state.lock().unwrap().status == McpServerStatus::Connected
                    })
                    .map(|e| (e.key().clone(), Arc::clone(&e.value().client)))
                    .collect();
                for (name, client) in connected {
                    if !client.ping().await {
                        tracing::warn!(server = %name, "MCP ping failed, reconnecting");
                        let _ = this.disconnect_server(&name).await;
                        if let Err(e) = this.connect_server(&name).await {
                            tracing::warn!(server = %name, error = %e, "MCP reconnect after ping failure failed");
                        }
                    }
                }
            }
        });
        self.tasks.lock().unwrap().push(handle);
    }
}
