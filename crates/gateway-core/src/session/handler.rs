//! The `rmcp` client-role handler for one upstream connection: reacts to
//! `*_list_changed` notifications by invalidating the owning `ClientSession`'s
//! caches, and relays sampling/elicitation requests toward the downstream
//! client once a forwarder has been installed for this session.
//!
//! The exact bidirectional request shape is not directly grounded in the
//! retrieved corpus (no example repo implements an MCP *client* that itself
//! forwards `sampling/createMessage`/`elicitation/elicit` upstream-to-downstream);
//! this is a best-effort design built from the documented MCP wire contract,
//! recorded as such.

use std::{future::Future, pin::Pin, sync::Arc};

use rmcp::{
    ClientHandler, RoleClient,
    model::{ClientCapabilities, ClientInfo, Implementation, ProtocolVersion},
};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::GatewayError;

/// A boxed, `Send` future returned by [`DownstreamForwarder`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Forwards a bidirectional request from an upstream to the one downstream
/// client owning this session. Implemented by the gateway server over the
/// downstream peer handle.
pub trait DownstreamForwarder: Send + Sync {
    /// Forwards a `sampling/createMessage` request verbatim and returns the
    /// downstream's response verbatim.
    fn create_message(&self, params: Value) -> BoxFuture<'_, Result<Value, GatewayError>>;

    /// Forwards an `elicitation/elicit` request verbatim and returns the
    /// downstream's response verbatim.
    fn elicit(&self, params: Value) -> BoxFuture<'_, Result<Value, GatewayError>>;
}

/// A forwarder installed after connection, once the downstream's capabilities
/// are known. `None` until the session orchestrator wires it in.
pub type SharedForwarder = Arc<dyn DownstreamForwarder>;

/// Callbacks a [`super::ClientSession`] registers on its transport so that
/// upstream `*_list_changed` notifications invalidate the right caches.
#[derive(Clone)]
pub struct ClientSessionEvents {
    pub(crate) on_tool_list_changed: Arc<dyn Fn() + Send + Sync>,
    pub(crate) on_resource_list_changed: Arc<dyn Fn() + Send + Sync>,
    pub(crate) on_prompt_list_changed: Arc<dyn Fn() + Send + Sync>,
}

impl ClientSessionEvents {
    /// Builds a new set of event callbacks.
    pub fn new(
        on_tool_list_changed: impl Fn() + Send + Sync + 'static,
        on_resource_list_changed: impl Fn() + Send + Sync + 'static,
        on_prompt_list_changed: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            on_tool_list_changed: Arc::new(on_tool_list_changed),
            on_resource_list_changed: Arc::new(on_resource_list_changed),
            on_prompt_list_changed: Arc::new(on_prompt_list_changed),
        }
    }
}

/// `rmcp::ClientHandler` for one upstream connection.
#[derive(Clone)]
pub struct UpstreamClientHandler {
    capabilities: ClientCapabilities,
    events: ClientSessionEvents,
    forward: Arc<RwLock<Option<(SharedForwarder, ForwardGate)>>>,
}

/// Which bidirectional request kinds the downstream has advertised support
/// for, gating what an upstream may have forwarded to it.
#[derive(Clone, Copy, Default)]
pub struct ForwardGate {
    /// Whether `sampling/createMessage` may be forwarded.
    pub sampling: bool,
    /// Whether `elicitation/elicit` may be forwarded.
    pub elicitation: bool,
}

impl UpstreamClientHandler {
    pub(crate) fn new(capabilities: ClientCapabilities, events: ClientSessionEvents) -> Self {
        Self {
            capabilities,
            events,
            forward: Arc::new(RwLock::new(None)),
        }
    }

    /// Installs (or replaces) the downstream forwarder and the gate
    /// describing which request kinds the downstream actually supports.
    pub async fn set_forwarder(&self, forwarder: SharedForwarder, gate: ForwardGate) {
        *self.forward.write().await = Some((forwarder, gate));
    }
}

impl ClientHandler for UpstreamClientHandler {
    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities.clone(),
            client_info: Implementation {
                name: "mcp-gateway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        }
    }

    async fn create_message(
        &self,
        params: rmcp::model::CreateMessageRequestParam,
        _context: rmcp::service::RequestContext<RoleClient>,
    ) -> Result<rmcp::model::CreateMessageResult, rmcp::ErrorData> {
        let forward = self.forward.read().await;

        let Some((forwarder, gate)) = forward.as_ref() else {
            return Err(rmcp::ErrorData::internal_error("downstream does not support sampling", None));
        };

        if !gate.sampling {
            return Err(rmcp::ErrorData::internal_error("downstream did not advertise sampling support", None));
        }

        let params = serde_json::to_value(params).map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))?;

        let response = forwarder
            .create_message(params)
            .await
            .map_err(|e| e.into_error_data())?;

        serde_json::from_value(response).map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))
    }

    async fn create_elicitation(
        &self,
        params: rmcp::model::CreateElicitationRequestParam,
        _context: rmcp::service::RequestContext<RoleClient>,
    ) -> Result<rmcp::model::CreateElicitationResult, rmcp::ErrorData> {
        let forward = self.forward.read().await;

        let Some((forwarder, gate)) = forward.as_ref() else {
            return Err(rmcp::ErrorData::internal_error("downstream does not support elicitation", None));
        };

        if !gate.elicitation {
            return Err(rmcp::ErrorData::internal_error("downstream did not advertise elicitation support", None));
        }

        let params = serde_json::to_value(params).map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))?;

        let response = forwarder.elicit(params).await.map_err(|e| e.into_error_data())?;

        serde_json::from_value(response).map_err(|e| rmcp::ErrorData::internal_error(e.to_string(), None))
    }

    async fn on_tool_list_changed(&self, _context: rmcp::service::NotificationContext<RoleClient>) {
        (self.events.on_tool_list_changed)();
    }

    async fn on_resource_list_changed(&self, _context: rmcp::service::NotificationContext<RoleClient>) {
        (self.events.on_resource_list_changed)();
    }

    async fn on_prompt_list_changed(&self, _context: rmcp::service::NotificationContext<RoleClient>) {
        (self.events.on_prompt_list_changed)();
    }
}
