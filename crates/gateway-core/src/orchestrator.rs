//! Per-session initialization sequencing: build the gateway, await the
//! downstream's capabilities, connect every configured upstream in parallel,
//! wire bidirectional forwarders, and tear everything down again on close.

use std::sync::Arc;

use config::McpConfig;
use futures_util::stream::{FuturesUnordered, StreamExt};
use rmcp::RoleServer;

use crate::{
    aggregator::{PromptAggregator, ResourceAggregator},
    capability::{CapabilityStore, DownstreamCapabilities},
    discovery::ToolDiscovery,
    gateway::{GatewayServer, PeerForwarder},
    manager::{ClientManager, SessionChangeCallback},
    script::ScriptRuntime,
};

/// Owns every collaborator shared across sessions and builds one
/// [`GatewayServer`] per downstream session.
pub struct SessionOrchestrator {
    config: Arc<McpConfig>,
    manager: Arc<ClientManager>,
    capabilities: Arc<CapabilityStore>,
    resources: Arc<ResourceAggregator>,
    prompts: Arc<PromptAggregator>,
    discovery: Arc<ToolDiscovery>,
    script_runtime: Arc<dyn ScriptRuntime>,
    instructions: Arc<str>,
}

impl SessionOrchestrator {
    /// Builds the orchestrator, wiring the manager's resource/prompt
    /// change-notification callbacks to the two aggregators.
    pub fn new(config: McpConfig, script_runtime: Arc<dyn ScriptRuntime>, instructions: String) -> Self {
        let resources = Arc::new(ResourceAggregator::new());
        let prompts = Arc::new(PromptAggregator::new());

        let on_resource_changed: SessionChangeCallback = {
            let resources = resources.clone();
            Arc::new(move |server_name, session_id| resources.on_list_changed(server_name, session_id))
        };

        let on_prompt_changed: SessionChangeCallback = {
            let prompts = prompts.clone();
            Arc::new(move |server_name, session_id| prompts.on_list_changed(server_name, session_id))
        };

        Self {
            config: Arc::new(config),
            manager: Arc::new(ClientManager::new(on_resource_changed, on_prompt_changed)),
            capabilities: Arc::new(CapabilityStore::new()),
            resources,
            prompts,
            discovery: Arc::new(ToolDiscovery::new()),
            script_runtime,
            instructions: instructions.into(),
        }
    }

    /// Builds the [`GatewayServer`] for a new downstream session. The
    /// returned server fires its `on_initialized` callback from inside
    /// `ServerHandler::initialize`, which this method wires to
    /// [`Self::on_downstream_initialized`].
    pub fn new_session(&self, session_id: String) -> GatewayServer {
        let config = self.config.clone();
        let manager = self.manager.clone();
        let capabilities = self.capabilities.clone();
        let session_id_for_callback = session_id.clone();

        let on_initialized = Arc::new(move |downstream_capabilities: DownstreamCapabilities, peer: rmcp::Peer<RoleServer>| {
            let config = config.clone();
            let manager = manager.clone();
            let session_id = session_id_for_callback.clone();

            tokio::spawn(async move {
                Self::on_downstream_initialized(config, manager, session_id, downstream_capabilities, peer).await;
            });
        });

        GatewayServer::new(
            session_id,
            self.manager.clone(),
            self.capabilities.clone(),
            self.resources.clone(),
            self.prompts.clone(),
            self.discovery.clone(),
            self.script_runtime.clone(),
            self.instructions.clone(),
            on_initialized,
        )
    }

    /// Connects every configured upstream for `session_id` in parallel
    /// (settle-all, never fail-fast) and registers bidirectional forwarders
    /// on each newly-connected session, gated by what the downstream
    /// advertised.
    async fn on_downstream_initialized(
        config: Arc<McpConfig>,
        manager: Arc<ClientManager>,
        session_id: String,
        downstream_capabilities: DownstreamCapabilities,
        peer: rmcp::Peer<RoleServer>,
    ) {
        // Advertised to every upstream verbatim, so it knows which
        // bidirectional request kinds this gateway can actually forward on to
        // the downstream (spec.md §4.2).
        let client_capabilities = downstream_capabilities.to_client_capabilities();

        let mut connects: FuturesUnordered<_> = config
            .servers
            .iter()
            .map(|(name, upstream)| {
                let manager = manager.clone();
                let name = name.clone();
                let upstream = upstream.clone();
                let client_capabilities = client_capabilities.clone();
                let session_id = session_id.clone();

                async move { manager.connect_client(&name, &session_id, &upstream, client_capabilities).await }
            })
            .collect();

        let mut successful = Vec::new();
        let mut failed = Vec::new();

        while let Some(outcome) = connects.next().await {
            if outcome.success {
                successful.push(outcome.name);
            } else {
                failed.push((outcome.name, outcome.error.unwrap_or_default()));
            }
        }

        if !config.servers.is_empty() && successful.is_empty() {
            log::warn!("session '{session_id}': every configured upstream failed to connect");
        } else if !failed.is_empty() {
            for (name, message) in &failed {
                log::error!("session '{session_id}': upstream '{name}' failed to connect: {message}");
            }
        } else {
            log::info!("session '{session_id}': connected {} upstream(s)", successful.len());
        }

        let forwarder = PeerForwarder::new(peer).shared();
        let gate = PeerForwarder::gate(downstream_capabilities);

        for server_name in &successful {
            if let Some(session) = manager.get_client(server_name, &session_id).await {
                session.set_forwarder(forwarder.clone(), gate).await;
            }
        }
    }

    /// Tears down a closed session: closes every upstream connection and
    /// discards its recorded capabilities. Best-effort; errors are logged,
    /// not propagated.
    pub async fn close_session(&self, session_id: &str) {
        self.manager.close_session(session_id).await;
        self.capabilities.delete(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::NullScriptRuntime;

    #[tokio::test]
    async fn new_session_builds_a_server_with_no_upstreams_configured() {
        let orchestrator = SessionOrchestrator::new(McpConfig::default(), Arc::new(NullScriptRuntime), "no servers".to_owned());
        let server = orchestrator.new_session("default".to_owned());
        assert_eq!(server.session_id(), "default");
    }

    #[tokio::test]
    async fn close_session_on_unknown_session_is_a_no_op() {
        let orchestrator = SessionOrchestrator::new(McpConfig::default(), Arc::new(NullScriptRuntime), String::new());
        orchestrator.close_session("missing").await;
    }
}
