//! The set of upstream MCP servers this gateway aggregates.

use std::{
    collections::{BTreeMap, BTreeSet},
    path::PathBuf,
};

use serde::Deserialize;
use url::Url;

use crate::{auth::ClientAuthConfig, headers::McpHeaderRule, tls::TlsClientConfig};

/// The set of upstream MCP servers this gateway aggregates, keyed by the name
/// used in namespacing (tool/resource/prompt names and URIs).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct McpConfig {
    /// `serverName → UpstreamConfig`.
    pub servers: BTreeMap<String, UpstreamConfig>,
}

/// Configuration for one upstream MCP server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UpstreamConfig {
    /// Reached over streamable HTTP (falling back to SSE if the upstream does
    /// not speak streamable-http).
    Http {
        /// The upstream's MCP endpoint.
        url: Url,
        /// Static headers inserted on every request to this upstream.
        #[serde(default)]
        headers: Vec<McpHeaderRule>,
        /// How the gateway authenticates to this upstream, if at all.
        #[serde(default)]
        auth: Option<ClientAuthConfig>,
        /// TLS settings for this upstream connection.
        #[serde(default)]
        tls: Option<TlsClientConfig>,
        /// Optional allow-list of upstream tool names. Absence means "all tools
        /// visible"; an empty set means "no tools visible".
        #[serde(default)]
        allowed_tools: Option<BTreeSet<String>>,
    },
    /// Reached by spawning a child process speaking stdio-framed JSON-RPC.
    Stdio {
        /// The executable to spawn.
        command: String,
        /// Arguments passed to the executable.
        #[serde(default)]
        args: Vec<String>,
        /// Extra environment variables set on the child process.
        #[serde(default)]
        env: BTreeMap<String, String>,
        /// Working directory for the child process. Defaults to the gateway's own.
        #[serde(default)]
        cwd: Option<PathBuf>,
        /// Where the child's stderr stream goes.
        #[serde(default)]
        stderr: StdioTarget,
        /// Optional allow-list of upstream tool names. Absence means "all tools
        /// visible"; an empty set means "no tools visible".
        #[serde(default)]
        allowed_tools: Option<BTreeSet<String>>,
    },
}

impl UpstreamConfig {
    /// The configured allow-list, if any.
    pub fn allowed_tools(&self) -> Option<&BTreeSet<String>> {
        match self {
            UpstreamConfig::Http { allowed_tools, .. } => allowed_tools.as_ref(),
            UpstreamConfig::Stdio { allowed_tools, .. } => allowed_tools.as_ref(),
        }
    }
}

/// Where a stdio upstream's stderr output is routed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum StdioTarget {
    /// Forwarded into the gateway's own log stream at debug level.
    #[default]
    Pipe,
    /// Inherited directly from the gateway process.
    Inherit,
    /// Discarded.
    Null,
    /// Appended to a file.
    File {
        /// Path of the file stderr is appended to.
        file: PathBuf,
    },
}
