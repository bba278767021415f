//! Downstream-facing listener configuration.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::Deserialize;

/// Top-level downstream-facing server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// How the downstream client reaches this gateway.
    #[serde(default)]
    pub transport: TransportMode,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: TransportMode::default(),
        }
    }
}

/// The downstream transport the gateway listens on. Exactly one session exists
/// for the lifetime of the process in stdio mode; HTTP mode allocates a session
/// per `initialize` request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TransportMode {
    /// JSON-RPC framed over stdin/stdout. The implicit session id is `"default"`.
    Stdio,
    /// Streamable HTTP. Each `initialize` request allocates a fresh session id.
    Http {
        /// Address to bind the HTTP listener to. Overridable by `HOST`/`PORT`.
        #[serde(default = "default_listen_address")]
        listen_address: SocketAddr,
        /// Path the streamable-http endpoint is mounted at.
        #[serde(default = "default_mcp_path")]
        path: String,
    },
}

impl Default for TransportMode {
    fn default() -> Self {
        TransportMode::Http {
            listen_address: default_listen_address(),
            path: default_mcp_path(),
        }
    }
}

fn default_listen_address() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(127, 0, 0, 1), 8000))
}

fn default_mcp_path() -> String {
    "/mcp".to_owned()
}
