//! Read-only introspection backing the `list-servers`/`list-server-tools`/
//! `tool-details` meta-tools. All output is text, produced by
//! [`crate::formatter`].

use serde_json::Value;

use crate::{formatter, manager::ClientManager, namespace};

/// One upstream's contribution to `list-servers`: either its advertised
/// server info, or the error that kept it from connecting.
pub struct ServerEntry {
    /// The underscore-sanitized server name used elsewhere as a namespace.
    pub lua_identifier: String,
    /// `Ok` with the upstream's advertised info, or `Err` with the failure
    /// message (either a connect failure from `ClientManager::failed`, or an
    /// error retrieving the upstream's advertised version).
    pub info: Result<ServerInfoSummary, String>,
}

/// An upstream's advertised `InitializeResult`, reduced to what `list-servers`
/// displays.
#[derive(Default)]
pub struct ServerInfoSummary {
    /// The upstream's advertised implementation name.
    pub name: String,
    /// The upstream's advertised implementation version.
    pub version: String,
    /// The upstream's advertised instructions, if any.
    pub instructions: Option<String>,
}

/// One tool entry in `list-server-tools`.
pub struct ToolEntry {
    /// The sanitized (Lua-identifier-safe) tool name.
    pub lua_name: String,
    /// The tool's description, if the upstream provided one.
    pub description: Option<String>,
}

/// Read-only introspection over the upstreams connected in one session.
#[derive(Default)]
pub struct ToolDiscovery;

impl ToolDiscovery {
    /// Builds a discovery backend. Stateless: every call takes the
    /// `ClientManager` it should query.
    pub fn new() -> Self {
        Self
    }

    /// Formatted text enumerating connected upstreams and their failed
    /// siblings.
    pub async fn list_servers(&self, manager: &ClientManager, session_id: &str) -> String {
        let mut entries = Vec::new();

        for (server_name, client) in manager.get_clients_by_session(session_id).await {
            let info = match client.peer_info() {
                Some(value) => Ok(summarize_peer_info(&value)),
                None => Err("upstream did not advertise server info".to_owned()),
            };

            entries.push(ServerEntry {
                lua_identifier: namespace::sanitize(&server_name),
                info,
            });
        }

        for (server_name, message) in manager.get_failed_servers(session_id).await {
            entries.push(ServerEntry {
                lua_identifier: namespace::sanitize(&server_name),
                info: Err(message),
            });
        }

        entries.sort_by(|a, b| a.lua_identifier.cmp(&b.lua_identifier));

        formatter::format_server_list(&entries)
    }

    /// Formatted tool list for one upstream, matched by its sanitized name.
    /// Lists available servers instead if no upstream matches.
    pub async fn list_server_tools(&self, manager: &ClientManager, lua_server_name: &str, session_id: &str) -> String {
        let clients = manager.get_clients_by_session(session_id).await;

        let Some((server_name, client)) = clients.iter().find(|(name, _)| namespace::sanitize(name) == lua_server_name) else {
            return formatter::format_server_not_found(lua_server_name, clients.keys().map(String::as_str));
        };

        let tools: Vec<ToolEntry> = client
            .list_tools()
            .await
            .into_iter()
            .map(|tool| ToolEntry {
                lua_name: tool.get("name").and_then(Value::as_str).map(namespace::sanitize).unwrap_or_default(),
                description: tool.get("description").and_then(Value::as_str).map(str::to_owned),
            })
            .collect();

        formatter::format_server_tools(server_name, &tools)
    }

    /// Formatted schema and a generated usage example for one tool, matched
    /// by its sanitized server and tool names.
    pub async fn get_tool_details(&self, manager: &ClientManager, lua_server_name: &str, lua_tool_name: &str, session_id: &str) -> String {
        let clients = manager.get_clients_by_session(session_id).await;

        let Some((server_name, client)) = clients.iter().find(|(name, _)| namespace::sanitize(name) == lua_server_name) else {
            return formatter::format_server_not_found(lua_server_name, clients.keys().map(String::as_str));
        };

        let tools = client.list_tools().await;

        let Some(tool) = tools
            .iter()
            .find(|tool| tool.get("name").and_then(Value::as_str).map(namespace::sanitize).as_deref() == Some(lua_tool_name))
        else {
            let available = tools.iter().filter_map(|t| t.get("name").and_then(Value::as_str));
            return formatter::format_tool_not_found(lua_server_name, lua_tool_name, available);
        };

        let description = tool.get("description").and_then(Value::as_str);
        let schema = tool.get("inputSchema").cloned().unwrap_or(Value::Null);

        formatter::format_tool_details(server_name, lua_tool_name, description, &schema)
    }
}

pub(crate) fn summarize_peer_info(value: &Value) -> ServerInfoSummary {
    ServerInfoSummary {
        name: value
            .get("serverInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned(),
        version: value
            .get("serverInfo")
            .and_then(|info| info.get("version"))
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_owned(),
        instructions: value.get("instructions").and_then(Value::as_str).map(str::to_owned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_servers_on_empty_manager_is_empty_text() {
        let manager = ClientManager::new(std::sync::Arc::new(|_, _| {}), std::sync::Arc::new(|_, _| {}));
        let discovery = ToolDiscovery::new();

        let text = discovery.list_servers(&manager, "session-a").await;
        assert!(text.contains("No upstream"));
    }
}
