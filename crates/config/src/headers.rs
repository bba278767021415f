//! Static header-insertion rules for HTTP requests to upstream MCP servers.

use serde::Deserialize;

use crate::http_types::{HeaderName, HeaderValue};

/// A header transformation rule for an upstream MCP server. Only insertion is
/// supported: the gateway never forwards or rewrites headers from the downstream
/// request (see Non-goals: authenticating downstream clients is out of scope).
/// Kept as a tagged enum for forward compatibility as the set of operations grows.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum McpHeaderRule {
    /// Insert a static header with a value. The value may contain `{{ env.VAR }}`
    /// templating, expanded at config-load time.
    Insert(HeaderInsert),
}

/// Header insertion rule.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HeaderInsert {
    /// The name of the header.
    pub name: HeaderName,
    /// The value of the header.
    pub value: HeaderValue,
}
