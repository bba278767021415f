//! The gateway's error taxonomy and its mapping onto the MCP wire protocol.

use rmcp::model::{ErrorCode, ErrorData};

/// Errors the gateway core can surface, either to the downstream client or
/// only into logs (see each variant's doc comment for which).
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Could not open or sustain a connection to an upstream. Recorded in
    /// `ClientManager::failed`; surfaced to the downstream only via the
    /// `list-servers` meta-tool, never raised from a request that didn't ask
    /// for that upstream.
    #[error("could not reach upstream '{server}': {message}")]
    TransportUnavailable {
        /// The upstream this failure is about.
        server: String,
        /// The underlying failure.
        message: String,
    },

    /// An upstream returned an error to a `read`/`get`/`call` request. Always
    /// re-raised to the downstream verbatim (list operations absorb this
    /// variant instead of propagating it; see the aggregators).
    #[error("{message}")]
    Upstream {
        /// The upstream's error message.
        message: String,
    },

    /// A namespaced URI or prompt name did not match the required shape.
    #[error("invalid format: expected {expected}, got '{received}'")]
    InvalidFormat {
        /// A human description of the expected shape.
        expected: String,
        /// The value that failed to parse.
        received: String,
    },

    /// The namespaced target names a server or tool absent from this session.
    #[error("not found: {message}")]
    NotFound {
        /// Names the missing target and lists what is available.
        message: String,
    },

    /// The embedded script runtime reported a failure during `execute`.
    /// Returned as a tool result with `isError = true`, never raised as a
    /// protocol-level error.
    #[error("script execution failed: {message}")]
    ScriptFailure {
        /// The failure text to show the caller.
        message: String,
    },
}

impl GatewayError {
    /// Builds a `NotFound` error listing the currently available server names.
    pub fn server_not_found(server: &str, available: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = available.into_iter().collect();

        let available = if names.is_empty() {
            "none".to_owned()
        } else {
            names.sort();
            names.join(", ")
        };

        GatewayError::NotFound {
            message: format!("no upstream named '{server}' in this session; available: {available}"),
        }
    }

    /// Converts this error into the wire-level shape the MCP SDK expects at a
    /// `ServerHandler` boundary.
    pub fn into_error_data(self) -> ErrorData {
        match self {
            GatewayError::TransportUnavailable { server, message } => {
                ErrorData::new(ErrorCode::INTERNAL_ERROR, format!("upstream '{server}' unavailable: {message}"), None)
            }
            GatewayError::Upstream { message } => ErrorData::new(ErrorCode::INTERNAL_ERROR, message, None),
            GatewayError::InvalidFormat { expected, received } => ErrorData::new(
                ErrorCode::INVALID_PARAMS,
                format!("invalid format: expected {expected}, got '{received}'"),
                None,
            ),
            GatewayError::NotFound { message } => ErrorData::new(ErrorCode::INVALID_PARAMS, message, None),
            GatewayError::ScriptFailure { message } => ErrorData::new(ErrorCode::INTERNAL_ERROR, message, None),
        }
    }
}
