//! Authentication the gateway presents to upstream MCP servers.

use secrecy::SecretString;
use serde::Deserialize;

/// How the gateway authenticates itself to an HTTP upstream. The gateway never
/// authenticates the *downstream* client (see Non-goals); this is purely outbound.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAuthConfig {
    /// Send `Authorization: Bearer {token}` on every request to this upstream.
    Token {
        /// The bearer token. Supports `{{ env.VAR }}` templating, expanded at load time.
        token: SecretString,
    },
}
