//! Configuration structures mapping the gateway's TOML configuration file.

#![deny(missing_docs)]

mod auth;
mod headers;
mod http_types;
mod loader;
mod mcp;
mod server;
mod tls;

use std::path::Path;

pub use auth::ClientAuthConfig;
pub use headers::{HeaderInsert, McpHeaderRule};
pub use http_types::{HeaderName, HeaderValue};
pub use loader::{ConfigSearchEntry, config_search_paths, resolve_config_path};
pub use mcp::{McpConfig, StdioTarget, UpstreamConfig};
use serde::Deserialize;
pub use server::{ServerConfig, TransportMode};
pub use tls::TlsClientConfig;

/// Root configuration structure for the gateway.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Downstream-facing server settings (listener transport/address).
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream MCP servers to aggregate.
    #[serde(default)]
    pub mcp: McpConfig,
}

impl Config {
    /// Loads configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Validates that the configuration has at least one upstream to aggregate.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate_has_downstreams(self)
    }
}

#[cfg(test)]
mod tests {
    use crate::Config;

    #[test]
    fn defaults_have_no_servers() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.mcp.servers.is_empty());
    }

    #[test]
    fn parses_http_and_stdio_upstreams() {
        let raw = r#"
            [mcp.servers.docs]
            kind = "http"
            url = "https://docs.example.com/mcp"
            allowed_tools = ["search"]

            [mcp.servers.files]
            kind = "stdio"
            command = "mcp-files"
            args = ["--root", "/srv"]
        "#;

        let config: Config = toml::from_str(raw).unwrap();
        assert_eq!(config.mcp.servers.len(), 2);
        assert!(config.mcp.servers.contains_key("docs"));
        assert!(config.mcp.servers.contains_key("files"));
    }
}
