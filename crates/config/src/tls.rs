//! TLS configuration for connections to upstream MCP servers.

use std::path::PathBuf;

use serde::Deserialize;

/// TLS configuration for an HTTP upstream connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsClientConfig {
    /// Verify the upstream's certificate chain. Defaults to true; set to false only
    /// for upstreams behind self-signed or otherwise untrusted certificates.
    #[serde(default = "default_verify_certs")]
    pub verify_certs: bool,
    /// Accept certificates whose hostname does not match the connection address.
    #[serde(default)]
    pub accept_invalid_hostnames: bool,
    /// Additional root CA certificate (PEM) to trust for this upstream.
    #[serde(default)]
    pub root_ca_cert_path: Option<PathBuf>,
    /// Client certificate (PEM) for mutual TLS.
    #[serde(default)]
    pub client_cert_path: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    #[serde(default)]
    pub client_key_path: Option<PathBuf>,
}

fn default_verify_certs() -> bool {
    true
}

impl Default for TlsClientConfig {
    fn default() -> Self {
        Self {
            verify_certs: true,
            accept_invalid_hostnames: false,
            root_ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
        }
    }
}
