//! The downstream-facing MCP endpoint: registers meta-tools, routes
//! resource/prompt requests to the aggregators, rewrites URIs in forwarded
//! tool results, and forwards sampling/elicitation requests to the
//! downstream. Overrides `initialize` to trigger per-session upstream connects from inside the handshake.

use std::sync::Arc;

use rmcp::{
    ErrorData, RoleServer, ServerHandler,
    model::{
        CallToolRequestParam, CallToolResult, Content, GetPromptRequestParam, GetPromptResult, Implementation, InitializeRequestParam, InitializeResult,
        ListPromptsResult, ListResourcesResult, ListToolsResult, PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
        ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
    },
    service::{NotificationContext, RequestContext},
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::{
    aggregator::{PromptAggregator, ResourceAggregator},
    capability::{CapabilityStore, DownstreamCapabilities, ElicitationMode},
    discovery::ToolDiscovery,
    error::GatewayError,
    formatter,
    manager::ClientManager,
    namespace,
    script::{ScriptBindings, ScriptRuntime, ToolCallback},
    session::handler::{BoxFuture, DownstreamForwarder, ForwardGate, SharedForwarder},
};

/// A callback invoked exactly once, after the downstream completes MCP
/// initialize, with the capabilities it advertised and the downstream
/// [`rmcp::Peer`] handle to forward bidirectional requests toward.
pub type OnInitializedCallback = Arc<dyn Fn(DownstreamCapabilities, rmcp::Peer<RoleServer>) + Send + Sync>;

/// The downstream-facing MCP server for one session.
pub struct GatewayServer {
    session_id: String,
    manager: Arc<ClientManager>,
    capabilities: Arc<CapabilityStore>,
    resources: Arc<ResourceAggregator>,
    prompts: Arc<PromptAggregator>,
    discovery: Arc<ToolDiscovery>,
    script_runtime: Arc<dyn ScriptRuntime>,
    instructions: Arc<str>,
    on_initialized: OnInitializedCallback,
}

impl GatewayServer {
    /// Builds the gateway server for one session. `instructions` is the
    /// precomputed static text from [`crate::preloader::ServerInfoPreloader`];
    /// `on_initialized` fires once, from inside [`ServerHandler::initialize`],
    /// with the downstream's advertised capabilities.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        manager: Arc<ClientManager>,
        capabilities: Arc<CapabilityStore>,
        resources: Arc<ResourceAggregator>,
        prompts: Arc<PromptAggregator>,
        discovery: Arc<ToolDiscovery>,
        script_runtime: Arc<dyn ScriptRuntime>,
        instructions: Arc<str>,
        on_initialized: OnInitializedCallback,
    ) -> Self {
        Self {
            session_id,
            manager,
            capabilities,
            resources,
            prompts,
            discovery,
            script_runtime,
            instructions,
            on_initialized,
        }
    }

    /// The session id this server instance is scoped to.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn call_meta_tool(&self, params: CallToolRequestParam) -> Result<CallToolResult, ErrorData> {
        let arguments = Value::Object(params.arguments.clone().unwrap_or_default());

        match params.name.as_ref() {
            "list-servers" => {
                let text = self.discovery.list_servers(&self.manager, &self.session_id).await;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "list-server-tools" => {
                let args: ListServerToolsArgs = parse_args(arguments)?;
                let text = self.discovery.list_server_tools(&self.manager, &args.lua_server_name, &self.session_id).await;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "tool-details" => {
                let args: ToolDetailsArgs = parse_args(arguments)?;
                let text = self
                    .discovery
                    .get_tool_details(&self.manager, &args.lua_server_name, &args.lua_tool_name, &self.session_id)
                    .await;
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            "inspect-tool-response" => {
                let args: InspectToolResponseArgs = parse_args(arguments)?;
                self.inspect_tool_response(args).await
            }
            "execute" => {
                let args: ExecuteArgs = parse_args(arguments)?;
                self.execute_script(args).await
            }
            other => Err(ErrorData::invalid_params(format!("unknown meta-tool '{other}'"), None)),
        }
    }

    async fn inspect_tool_response(&self, args: InspectToolResponseArgs) -> Result<CallToolResult, ErrorData> {
        let clients = self.manager.get_clients_by_session(&self.session_id).await;

        let Some((server_name, client)) = clients.iter().find(|(name, _)| namespace::sanitize(name) == args.lua_server_name) else {
            let text = formatter::format_server_not_found(&args.lua_server_name, clients.keys().map(String::as_str));
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        };

        let tools = client.list_tools().await;

        let Some(tool) = tools
            .iter()
            .find(|tool| tool.get("name").and_then(Value::as_str).map(namespace::sanitize).as_deref() == Some(args.lua_tool_name.as_str()))
        else {
            let available = tools.iter().filter_map(|t| t.get("name").and_then(Value::as_str));
            let text = formatter::format_tool_not_found(&args.lua_server_name, &args.lua_tool_name, available);
            return Ok(CallToolResult::success(vec![Content::text(text)]));
        };

        let Some(original_name) = tool.get("name").and_then(Value::as_str).map(str::to_owned) else {
            return Ok(CallToolResult::error(vec![Content::text("tool has no name".to_owned())]));
        };

        match client.call_tool(original_name, args.sample_args.as_object().cloned()).await {
            Ok(response) => {
                let text = formatter::format_inspect_tool_response(server_name, &args.lua_tool_name, &args.sample_args, &response);
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    async fn execute_script(&self, args: ExecuteArgs) -> Result<CallToolResult, ErrorData> {
        let clients = self.manager.get_clients_by_session(&self.session_id).await;
        let mut bindings = ScriptBindings::new();

        for (server_name, client) in clients {
            let client = client.clone();

            let callback: ToolCallback = Arc::new(move |tool_name, arguments| {
                let client = client.clone();
                Box::pin(async move { client.call_tool(tool_name, arguments).await }) as BoxFuture<'static, Result<Value, GatewayError>>
            });

            bindings.insert(namespace::sanitize(&server_name), callback);
        }

        match self.script_runtime.run(args.script, bindings).await {
            Ok(outcome) => {
                let mut content = Vec::new();

                if !outcome.stdout.is_empty() {
                    content.push(Content::text(outcome.stdout));
                }

                content.push(Content::text(outcome.value.to_string()));

                Ok(CallToolResult::success(content))
            }
            Err(failure) => Ok(CallToolResult::error(vec![Content::text(failure.message)])),
        }
    }

    fn meta_tools() -> Vec<Tool> {
        vec![list_servers_tool(), list_server_tools_tool(), tool_details_tool(), inspect_tool_response_tool(), execute_tool()]
    }
}

impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().enable_prompts().enable_resources().build(),
            server_info: Implementation {
                name: "mcp-gateway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
            instructions: Some(self.instructions.to_string()),
        }
    }

    async fn initialize(&self, request: InitializeRequestParam, context: RequestContext<RoleServer>) -> Result<InitializeResult, ErrorData> {
        let capabilities = extract_downstream_capabilities(&request.capabilities);
        self.capabilities.set(&self.session_id, capabilities);
        (self.on_initialized)(capabilities, context.peer);

        Ok(self.get_info())
    }

    async fn list_tools(&self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>) -> Result<ListToolsResult, ErrorData> {
        let mut tools = Self::meta_tools();

        for (server_name, client) in self.manager.get_clients_by_session(&self.session_id).await {
            for upstream_tool in client.list_tools().await {
                let Some(name) = upstream_tool.get("name").and_then(Value::as_str) else {
                    continue;
                };

                let namespaced = namespace::build_tool_name(&server_name, name);
                let description = upstream_tool.get("description").and_then(Value::as_str).map(str::to_owned);
                let input_schema = upstream_tool
                    .get("inputSchema")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();

                tools.push(Tool {
                    name: namespaced.into(),
                    description: description.map(Into::into),
                    input_schema: Arc::new(input_schema),
                    output_schema: None,
                    annotations: None,
                });
            }
        }

        Ok(ListToolsResult { tools, next_cursor: None })
    }

    async fn call_tool(&self, params: CallToolRequestParam, _context: RequestContext<RoleServer>) -> Result<CallToolResult, ErrorData> {
        if is_meta_tool(&params.name) {
            return self.call_meta_tool(params).await;
        }

        let clients = self.manager.get_clients_by_session(&self.session_id).await;

        let mut catalog = Vec::new();
        for (server_name, client) in &clients {
            let tools = client.list_tools().await;
            catalog.push((server_name.clone(), tools));
        }

        let servers_for_resolution: Vec<(&str, Vec<&str>)> = catalog
            .iter()
            .map(|(name, tools)| {
                let names: Vec<&str> = tools.iter().filter_map(|t| t.get("name").and_then(Value::as_str)).collect();
                (name.as_str(), names)
            })
            .collect();

        let Some((server_name, tool_name)) = namespace::resolve_tool_name(&params.name, servers_for_resolution.iter().map(|(n, t)| (*n, t.iter().copied())))
        else {
            return Err(ErrorData::invalid_params(format!("unknown tool '{}'", params.name), None));
        };

        let client = clients
            .get(&server_name)
            .ok_or_else(|| GatewayError::server_not_found(&server_name, clients.keys().cloned()).into_error_data())?;

        match client.call_tool(tool_name, params.arguments).await {
            Ok(mut result) => {
                rewrite_tool_result_uris(&mut result, &server_name);
                serde_json::from_value(result).map_err(|e| ErrorData::internal_error(e.to_string(), None))
            }
            Err(e) => Err(e.into_error_data()),
        }
    }

    async fn list_resources(&self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>) -> Result<ListResourcesResult, ErrorData> {
        let resources = self.resources.list_resources(&self.manager, &self.session_id).await;
        let resources = resources.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect();

        Ok(ListResourcesResult { resources, next_cursor: None })
    }

    async fn read_resource(&self, params: ReadResourceRequestParam, _context: RequestContext<RoleServer>) -> Result<ReadResourceResult, ErrorData> {
        let result = self
            .resources
            .read_resource(&self.manager, &params.uri, &self.session_id)
            .await
            .map_err(GatewayError::into_error_data)?;

        serde_json::from_value(result).map_err(|e| ErrorData::internal_error(e.to_string(), None))
    }

    async fn list_prompts(&self, _request: Option<PaginatedRequestParam>, _context: RequestContext<RoleServer>) -> Result<ListPromptsResult, ErrorData> {
        let prompts = self.prompts.list_prompts(&self.manager, &self.session_id).await;
        let prompts = prompts.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect();

        Ok(ListPromptsResult { prompts, next_cursor: None })
    }

    async fn get_prompt(&self, params: GetPromptRequestParam, _context: RequestContext<RoleServer>) -> Result<GetPromptResult, ErrorData> {
        let result = self
            .prompts
            .get_prompt(&self.manager, &params.name, params.arguments, &self.session_id)
            .await
            .map_err(GatewayError::into_error_data)?;

        serde_json::from_value(result).map_err(|e| ErrorData::internal_error(e.to_string(), None))
    }

    async fn on_tool_list_changed(&self, _context: NotificationContext<RoleServer>) {}
}

fn is_meta_tool(name: &str) -> bool {
    matches!(name, "list-servers" | "list-server-tools" | "tool-details" | "inspect-tool-response" | "execute")
}

/// `rmcp` has no explicit "session closed" notification on [`ServerHandler`];
/// the transport layer instead drops the per-session handler it built through
/// the session manager once the session ends. Tearing the session down from
/// `Drop` (grounded in `npolshakova-agentgateway`'s `SessionDropper`, which
/// spawns its async cleanup from a synchronous `Drop::drop`) is therefore the
/// only reliable hook for tearing a session down, independent of which transport served it.
impl Drop for GatewayServer {
    fn drop(&mut self) {
        let manager = self.manager.clone();
        let capabilities = self.capabilities.clone();
        let session_id = self.session_id.clone();

        tokio::spawn(async move {
            manager.close_session(&session_id).await;
            capabilities.delete(&session_id);
        });
    }
}

/// Forwards sampling/elicitation requests received from an upstream toward
/// the downstream client owning this session, via its [`rmcp::Peer`] handle.
/// Not directly grounded in the retrieved corpus — no example repo implements
/// an MCP server that itself re-forwards these requests it received from a
/// client it is acting as a client toward; this is the downstream-facing half
/// of the same best-effort design documented in
/// [`crate::session::handler::UpstreamClientHandler`] (see DESIGN.md).
pub struct PeerForwarder {
    peer: rmcp::Peer<RoleServer>,
}

impl PeerForwarder {
    /// Builds a forwarder over the downstream peer captured at initialize.
    pub fn new(peer: rmcp::Peer<RoleServer>) -> Self {
        Self { peer }
    }

    /// Builds the [`ForwardGate`] matching what the downstream advertised.
    pub fn gate(capabilities: DownstreamCapabilities) -> ForwardGate {
        ForwardGate {
            sampling: capabilities.sampling,
            elicitation: capabilities.has_elicitation(),
        }
    }

    /// Wraps this forwarder for installation on an upstream [`crate::session::ClientSession`].
    pub fn shared(self) -> SharedForwarder {
        Arc::new(self)
    }
}

impl DownstreamForwarder for PeerForwarder {
    fn create_message(&self, params: Value) -> BoxFuture<'_, Result<Value, GatewayError>> {
        Box::pin(async move {
            let params = serde_json::from_value(params).map_err(|e| GatewayError::Upstream { message: e.to_string() })?;

            let result = self
                .peer
                .create_message(params)
                .await
                .map_err(|e| GatewayError::Upstream { message: e.to_string() })?;

            serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
        })
    }

    fn elicit(&self, params: Value) -> BoxFuture<'_, Result<Value, GatewayError>> {
        Box::pin(async move {
            let params = serde_json::from_value(params).map_err(|e| GatewayError::Upstream { message: e.to_string() })?;

            let result = self
                .peer
                .create_elicitation(params)
                .await
                .map_err(|e| GatewayError::Upstream { message: e.to_string() })?;

            serde_json::to_value(result).map_err(|e| GatewayError::Upstream { message: e.to_string() })
        })
    }
}

/// Reads `ClientCapabilities.sampling`/`.elicitation` defensively: `rmcp`
/// represents each as an opaque `Option<Value>`-shaped field, so presence
/// alone signals support and the elicitation value's `form`/`url` keys (when
/// it is a JSON object) select the supported modes, matching the `{sampling?,
/// elicitation?: {form?, url?}}` shape.
pub fn extract_downstream_capabilities(capabilities: &rmcp::model::ClientCapabilities) -> DownstreamCapabilities {
    let sampling = capabilities.sampling.is_some();

    let elicitation_value = capabilities.elicitation.as_ref().map(|e| serde_json::to_value(e).unwrap_or(Value::Null));

    let (elicitation_form, elicitation_url) = match &elicitation_value {
        Some(Value::Object(map)) => (map.contains_key("form"), map.contains_key("url")),
        Some(_) => (true, false),
        None => (false, false),
    };

    DownstreamCapabilities {
        sampling,
        elicitation_form,
        elicitation_url,
    }
}

/// Narrowly rewrites `uri` fields on top-level `content[]` blocks of type
/// `resource_link`/`resource` in a forwarded tool-call result. Deliberately
/// scoped to this one shape, unlike the aggregators' generic
/// [`crate::aggregator::rewrite_uris`] structural walk, since a tool result's
/// schema is otherwise unconstrained and only these two content-block kinds
/// are defined to carry a `uri`: `resource_link` carries it directly, while
/// `resource` nests it one level down, under `resource.uri` (an embedded
/// `TextResourceContents`/`BlobResourceContents`).
fn rewrite_tool_result_uris(result: &mut Value, server_name: &str) {
    let Some(content) = result.get_mut("content").and_then(Value::as_array_mut) else {
        return;
    };

    for block in content {
        match block.get("type").and_then(Value::as_str) {
            Some("resource_link") => {
                if let Some(Value::String(uri)) = block.get_mut("uri") {
                    *uri = namespace::build_resource_uri(server_name, uri);
                }
            }
            Some("resource") => {
                if let Some(Value::String(uri)) = block.get_mut("resource").and_then(|r| r.get_mut("uri")) {
                    *uri = namespace::build_resource_uri(server_name, uri);
                }
            }
            _ => {}
        }
    }
}

fn parse_args<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, ErrorData> {
    serde_json::from_value(value).map_err(|e| ErrorData::invalid_params(e.to_string(), None))
}

#[derive(Deserialize, JsonSchema)]
struct ListServerToolsArgs {
    lua_server_name: String,
}

#[derive(Deserialize, JsonSchema)]
struct ToolDetailsArgs {
    lua_server_name: String,
    lua_tool_name: String,
}

#[derive(Deserialize, JsonSchema)]
struct InspectToolResponseArgs {
    lua_server_name: String,
    lua_tool_name: String,
    sample_args: Value,
}

#[derive(Deserialize, JsonSchema)]
struct ExecuteArgs {
    script: String,
}

fn list_servers_tool() -> Tool {
    Tool {
        name: "list-servers".into(),
        description: Some("Lists every upstream MCP server connected in this session, including any that failed to connect.".into()),
        input_schema: Arc::new(serde_json::Map::new()),
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(true)),
    }
}

fn list_server_tools_tool() -> Tool {
    let schema = schema_for::<ListServerToolsArgs>();

    Tool {
        name: "list-server-tools".into(),
        description: Some("Lists the tools exposed by one upstream server, named by its sanitized identifier.".into()),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(true)),
    }
}

fn tool_details_tool() -> Tool {
    let schema = schema_for::<ToolDetailsArgs>();

    Tool {
        name: "tool-details".into(),
        description: Some("Shows the input schema and a generated usage example for one tool on one upstream server.".into()),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(ToolAnnotations::new().read_only(true)),
    }
}

fn inspect_tool_response_tool() -> Tool {
    let schema = schema_for::<InspectToolResponseArgs>();

    Tool {
        name: "inspect-tool-response".into(),
        description: Some("Calls a tool once with the given sample arguments and returns a shape view of its response.".into()),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(ToolAnnotations::new().destructive(true).open_world(true)),
    }
}

fn execute_tool() -> Tool {
    let schema = schema_for::<ExecuteArgs>();

    Tool {
        name: "execute".into(),
        description: Some(
            "Runs an embedded script whose standard library exposes each connected upstream as a namespace of callable tools.".into(),
        ),
        input_schema: Arc::new(schema),
        output_schema: None,
        annotations: Some(ToolAnnotations::new().destructive(true).open_world(true)),
    }
}

fn schema_for<T: JsonSchema>() -> serde_json::Map<String, Value> {
    serde_json::to_value(schemars::schema_for!(T)).unwrap().as_object().unwrap().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_no_capabilities_by_default() {
        let caps = extract_downstream_capabilities(&rmcp::model::ClientCapabilities::default());
        assert!(!caps.sampling);
        assert!(!caps.has_elicitation());
    }

    #[test]
    fn rewrite_tool_result_uris_only_touches_resource_kinds() {
        let mut result = serde_json::json!({
            "content": [
                {"type": "resource_link", "uri": "file:///data/report.json"},
                {"type": "text", "text": "no uri here"}
            ]
        });

        rewrite_tool_result_uris(&mut result, "data-server");

        assert_eq!(result["content"][0]["uri"], "mcp://data-server/file:///data/report.json");
        assert_eq!(result["content"][1]["text"], "no uri here");
    }

    #[test]
    fn rewrite_tool_result_uris_handles_nested_embedded_resource() {
        let mut result = serde_json::json!({
            "content": [
                {"type": "resource", "resource": {"uri": "file:///data/report.json", "mimeType": "application/json", "text": "{}"}}
            ]
        });

        rewrite_tool_result_uris(&mut result, "data-server");

        assert_eq!(result["content"][0]["resource"]["uri"], "mcp://data-server/file:///data/report.json");
    }

    #[test]
    fn is_meta_tool_recognizes_registered_names() {
        assert!(is_meta_tool("execute"));
        assert!(is_meta_tool("list-servers"));
        assert!(!is_meta_tool("data_server_get_report"));
    }
}
