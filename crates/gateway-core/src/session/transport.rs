//! Opens and drives one upstream connection over whichever transport its
//! `UpstreamConfig` names: the same TLS/auth/header wiring for HTTP, the same
//! `TokioChildProcess` spawn shape for stdio, one connection per
//! `(serverName, sessionId)`.

use std::{future::Future, io::Read as _, pin::Pin, sync::Arc};

use config::{ClientAuthConfig, McpHeaderRule, StdioTarget, TlsClientConfig, UpstreamConfig};
use reqwest::{Certificate, Identity};
use rmcp::{
    RoleClient, ServiceExt,
    model::ClientCapabilities,
    service::RunningService,
    transport::{SseClientTransport, StreamableHttpClientTransport, TokioChildProcess, common::client_side_sse::FixedInterval, sse_client::SseClientConfig, streamable_http_client::StreamableHttpClientTransportConfig},
};
use secrecy::ExposeSecret;
use serde_json::Value;
use tokio::process::Command;

use crate::error::GatewayError;
use crate::session::handler::{ClientSessionEvents, UpstreamClientHandler};

/// A boxed, `Send` future, used to keep [`UpstreamConnection`]'s methods
/// callable through an `Arc` without forcing every caller to be generic.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A live connection to one upstream MCP server.
pub struct UpstreamConnection {
    server_name: String,
    service: RunningService<RoleClient, UpstreamClientHandler>,
}

impl UpstreamConnection {
    /// Opens a connection to `config`, completing the MCP handshake and
    /// advertising `downstream_capabilities` verbatim so the upstream knows it
    /// may send sampling/elicitation requests.
    #[fastrace::trace(name = "upstream:connect")]
    pub async fn connect(
        server_name: &str,
        config: &UpstreamConfig,
        client_capabilities: ClientCapabilities,
        events: ClientSessionEvents,
    ) -> Result<Self, GatewayError> {
        let handler = UpstreamClientHandler::new(client_capabilities, events);

        let service = match config {
            UpstreamConfig::Http { .. } => connect_http(server_name, config, handler).await,
            UpstreamConfig::Stdio { .. } => connect_stdio(server_name, config, handler).await,
        }?;

        Ok(Self {
            server_name: server_name.to_owned(),
            service,
        })
    }

    /// Lists every tool the upstream advertises, unfiltered, un-paginated (MCP
    /// does not paginate tool listings).
    #[fastrace::trace(name = "upstream:list_tools")]
    pub async fn list_tools(&self) -> Result<Value, GatewayError> {
        log::debug!("listing tools for {}", self.server_name);

        let result = self
            .service
            .list_tools(Default::default())
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Fetches one page of the resource list.
    #[fastrace::trace(name = "upstream:list_resources")]
    pub async fn list_resources_page(&self, cursor: Option<String>) -> Result<Value, GatewayError> {
        log::debug!("listing resources for {} (cursor={cursor:?})", self.server_name);

        let result = self
            .service
            .list_resources(Some(rmcp::model::PaginatedRequestParam { cursor }))
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Fetches one page of the prompt list.
    #[fastrace::trace(name = "upstream:list_prompts")]
    pub async fn list_prompts_page(&self, cursor: Option<String>) -> Result<Value, GatewayError> {
        log::debug!("listing prompts for {} (cursor={cursor:?})", self.server_name);

        let result = self
            .service
            .list_prompts(Some(rmcp::model::PaginatedRequestParam { cursor }))
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Reads a resource by its original (un-namespaced) URI.
    #[fastrace::trace(name = "upstream:read_resource")]
    pub async fn read_resource(&self, uri: String) -> Result<Value, GatewayError> {
        log::debug!("reading resource {uri} from {}", self.server_name);

        let result = self
            .service
            .read_resource(rmcp::model::ReadResourceRequestParam { uri })
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Gets a prompt by its original (un-namespaced) name.
    #[fastrace::trace(name = "upstream:get_prompt")]
    pub async fn get_prompt(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<Value, GatewayError> {
        log::debug!("getting prompt {name} from {}", self.server_name);

        let result = self
            .service
            .get_prompt(rmcp::model::GetPromptRequestParam { name, arguments })
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Calls a tool by its original (un-namespaced) name.
    #[fastrace::trace(name = "upstream:call_tool")]
    pub async fn call_tool(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<Value, GatewayError> {
        log::debug!("calling tool {name} on {}", self.server_name);

        let result = self
            .service
            .call_tool(rmcp::model::CallToolRequestParam { name: name.into(), arguments })
            .await
            .map_err(|e| self.map_error(e))?;

        serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
    }

    /// Installs the forwarder used to relay sampling/elicitation requests this
    /// upstream sends, toward the downstream client.
    pub async fn set_forwarder(&self, forwarder: super::handler::SharedForwarder, gate: super::handler::ForwardGate) {
        self.service.service().set_forwarder(forwarder, gate).await;
    }

    /// The upstream's advertised `InitializeResult` (name/version/instructions),
    /// if the handshake completed. Used by `ToolDiscovery::listServers`.
    pub fn peer_info(&self) -> Option<Value> {
        self.service.peer_info().and_then(|info| serde_json::to_value(info).ok())
    }

    /// Closes the upstream connection. Best-effort; errors are logged, not propagated.
    pub async fn close(self) {
        self.service.cancellation_token().cancel();

        if let Err(e) = self.service.waiting().await {
            log::warn!("error closing upstream '{}': {e}", self.server_name);
        }
    }

    fn map_error(&self, error: rmcp::ServiceError) -> GatewayError {
        GatewayError::Upstream {
            message: format!("{}: {error}", self.server_name),
        }
    }
}

async fn connect_http(
    server_name: &str,
    config: &UpstreamConfig,
    handler: UpstreamClientHandler,
) -> Result<RunningService<RoleClient, UpstreamClientHandler>, GatewayError> {
    let UpstreamConfig::Http { url, headers, auth, tls, .. } = config else {
        unreachable!("connect_http called with non-http config")
    };

    let client = build_http_client(headers, auth, tls.as_ref())
        .map_err(|e| GatewayError::TransportUnavailable { server: server_name.to_owned(), message: e.to_string() })?;

    let streamable_config = StreamableHttpClientTransportConfig::with_uri(url.as_str().to_string());
    let transport = StreamableHttpClientTransport::with_client(client.clone(), streamable_config);

    match handler.clone().serve(transport).await {
        Ok(service) => Ok(service),
        Err(_) => {
            log::debug!("streamable-http connect to '{server_name}' failed, falling back to SSE");

            let sse_config = SseClientConfig {
                sse_endpoint: url.as_str().to_string().into(),
                retry_policy: Arc::new(FixedInterval::default()),
                use_message_endpoint: None,
            };

            let transport = SseClientTransport::start_with_client(client, sse_config)
                .await
                .map_err(|e| GatewayError::TransportUnavailable { server: server_name.to_owned(), message: e.to_string() })?;

            handler
                .serve(transport)
                .await
                .map_err(|e| GatewayError::TransportUnavailable { server: server_name.to_owned(), message: e.to_string() })
        }
    }
}

fn build_http_client(
    headers: &[McpHeaderRule],
    auth: &Option<ClientAuthConfig>,
    tls: Option<&TlsClientConfig>,
) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    let mut default_headers = http::HeaderMap::new();

    for rule in headers {
        let McpHeaderRule::Insert(insert) = rule;
        default_headers.insert(insert.name.as_ref().clone(), insert.value.as_ref().clone());
    }

    if let Some(ClientAuthConfig::Token { token }) = auth {
        let value = format!("Bearer {}", token.expose_secret());
        let mut header_value = http::HeaderValue::from_str(&value)?;
        header_value.set_sensitive(true);
        default_headers.insert(http::header::AUTHORIZATION, header_value);
    }

    builder = builder.default_headers(default_headers);

    if let Some(tls) = tls {
        builder = builder
            .danger_accept_invalid_certs(!tls.verify_certs)
            .danger_accept_invalid_hostnames(tls.accept_invalid_hostnames);

        if let Some(path) = &tls.root_ca_cert_path {
            let mut pem = Vec::new();
            std::fs::File::open(path)?.read_to_end(&mut pem)?;
            builder = builder.add_root_certificate(Certificate::from_pem(&pem)?);
        }

        if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) {
            let mut combined = Vec::new();
            std::fs::File::open(cert_path)?.read_to_end(&mut combined)?;
            combined.push(b'\n');
            std::fs::File::open(key_path)?.read_to_end(&mut combined)?;
            builder = builder.identity(Identity::from_pem(&combined)?);
        }
    }

    Ok(builder.build()?)
}

async fn connect_stdio(
    server_name: &str,
    config: &UpstreamConfig,
    handler: UpstreamClientHandler,
) -> Result<RunningService<RoleClient, UpstreamClientHandler>, GatewayError> {
    let UpstreamConfig::Stdio { command, args, env, cwd, stderr, .. } = config else {
        unreachable!("connect_stdio called with non-stdio config")
    };

    let mut process = Command::new(command);
    process.args(args).envs(env);

    if let Some(cwd) = cwd {
        process.current_dir(cwd);
    }

    let transport = TokioChildProcess::builder(process)
        .stderr(stdio_target(stderr, server_name)?)
        .spawn()
        .map(|(transport, _stderr)| transport)
        .map_err(|e| GatewayError::TransportUnavailable { server: server_name.to_owned(), message: e.to_string() })?;

    handler
        .serve(transport)
        .await
        .map_err(|e| GatewayError::TransportUnavailable { server: server_name.to_owned(), message: e.to_string() })
}

fn stdio_target(target: &StdioTarget, server_name: &str) -> Result<std::process::Stdio, GatewayError> {
    let map_io_err = |e: std::io::Error| GatewayError::TransportUnavailable {
        server: server_name.to_owned(),
        message: e.to_string(),
    };

    match target {
        StdioTarget::Pipe => Ok(std::process::Stdio::piped()),
        StdioTarget::Inherit => Ok(std::process::Stdio::inherit()),
        StdioTarget::Null => Ok(std::process::Stdio::null()),
        StdioTarget::File { file } => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .map_err(map_io_err)?;

            Ok(std::process::Stdio::from(file))
        }
    }
}
