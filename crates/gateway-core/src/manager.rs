//! Per-session pool of connected upstreams: parallel-safe connect, failure
//! bookkeeping, and best-effort teardown.

use std::{collections::HashMap, sync::Arc};

use config::UpstreamConfig;
use rmcp::model::ClientCapabilities;
use tokio::sync::RwLock;

use crate::session::{ClientSession, PromptChangeCallback, ResourceChangeCallback};

/// `serverName → sessionId`-independent key used by both of the manager's maps.
type Key = (String, String);

/// Callback the manager propagates into every `ClientSession` it creates so a
/// `resource_list_changed`/`prompt_list_changed` notification can invalidate
/// the right aggregator cache. Invoked with `(serverName, sessionId)`.
pub type SessionChangeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// The result of one `connect_client` call, mirroring the source's
/// `{name, success, error?}` shape.
#[derive(Debug, Clone)]
pub struct ConnectOutcome {
    /// The upstream name this outcome is about.
    pub name: String,
    /// Whether a usable `ClientSession` now exists for `(name, sessionId)`.
    pub success: bool,
    /// The failure message, present only when `success` is false.
    pub error: Option<String>,
}

/// Per-session pool of connected upstream sessions, keyed by `(serverName, sessionId)`.
///
/// `addHttpClient`/`addStdioClient` in the spec collapse into a single
/// [`ClientManager::connect_client`] here: `UpstreamConfig` already carries
/// the transport kind, so there is nothing left for two separate methods to
/// distinguish.
pub struct ClientManager {
    clients: RwLock<HashMap<Key, Arc<ClientSession>>>,
    failed: RwLock<HashMap<Key, String>>,
    on_resource_changed: SessionChangeCallback,
    on_prompt_changed: SessionChangeCallback,
}

impl ClientManager {
    /// Builds a manager that forwards resource/prompt invalidation events to
    /// the given session-scoped callbacks.
    pub fn new(on_resource_changed: SessionChangeCallback, on_prompt_changed: SessionChangeCallback) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            failed: RwLock::new(HashMap::new()),
            on_resource_changed,
            on_prompt_changed,
        }
    }

    /// Connects `server_name` for `session_id`, or reports success
    /// immediately if a client under that name already exists for the
    /// session. On failure, records the error under `failed` and clears
    /// nothing; on success, clears any prior `failed` entry for the pair.
    pub async fn connect_client(
        &self,
        server_name: &str,
        session_id: &str,
        config: &UpstreamConfig,
        client_capabilities: ClientCapabilities,
    ) -> ConnectOutcome {
        let key = (server_name.to_owned(), session_id.to_owned());

        if self.clients.read().await.contains_key(&key) {
            return ConnectOutcome {
                name: server_name.to_owned(),
                success: true,
                error: None,
            };
        }

        let on_resource_changed = self.scoped_resource_callback(session_id);
        let on_prompt_changed = self.scoped_prompt_callback(session_id);

        match ClientSession::connect(server_name, session_id, config, client_capabilities, on_resource_changed, on_prompt_changed).await {
            Ok(session) => {
                self.clients.write().await.insert(key.clone(), Arc::new(session));
                self.failed.write().await.remove(&key);

                ConnectOutcome {
                    name: server_name.to_owned(),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                let message = e.to_string();
                log::error!("failed to connect upstream '{server_name}' for session '{session_id}': {message}");
                self.failed.write().await.insert(key, message.clone());

                ConnectOutcome {
                    name: server_name.to_owned(),
                    success: false,
                    error: Some(message),
                }
            }
        }
    }

    /// Exact-name lookup, scoped to one session.
    pub async fn get_client(&self, server_name: &str, session_id: &str) -> Option<Arc<ClientSession>> {
        self.clients.read().await.get(&(server_name.to_owned(), session_id.to_owned())).cloned()
    }

    /// `serverName → ClientSession` for every upstream connected in `session_id`.
    pub async fn get_clients_by_session(&self, session_id: &str) -> HashMap<String, Arc<ClientSession>> {
        self.clients
            .read()
            .await
            .iter()
            .filter(|((_, sid), _)| sid == session_id)
            .map(|((name, _), session)| (name.clone(), session.clone()))
            .collect()
    }

    /// `serverName → errorMessage` for every failed connect attempt in `session_id`.
    pub async fn get_failed_servers(&self, session_id: &str) -> HashMap<String, String> {
        self.failed
            .read()
            .await
            .iter()
            .filter(|((_, sid), _)| sid == session_id)
            .map(|((name, _), message)| (name.clone(), message.clone()))
            .collect()
    }

    /// Closes every `ClientSession` belonging to `session_id` and purges both
    /// maps for it. Best-effort: a session still referenced elsewhere (should
    /// not happen in practice, since callers never hold an `Arc` past the
    /// request that fetched it) is logged and skipped rather than leaked.
    pub async fn close_session(&self, session_id: &str) {
        let keys: Vec<Key> = {
            let clients = self.clients.read().await;
            clients.keys().filter(|(_, sid)| sid == session_id).cloned().collect()
        };

        for key in keys {
            let removed = self.clients.write().await.remove(&key);

            if let Some(session) = removed {
                match Arc::try_unwrap(session) {
                    Ok(session) => session.close().await,
                    Err(_) => log::warn!("upstream '{}' for session '{session_id}' still referenced at close", key.0),
                }
            }
        }

        self.failed.write().await.retain(|(_, sid), _| sid != session_id);
    }

    /// Closes every session known to the manager. Best-effort across all of
    /// them, diverging intentionally from the source's observed
    /// first-failure short-circuit (see DESIGN.md).
    pub async fn close(&self) {
        let session_ids: std::collections::HashSet<String> = self.clients.read().await.keys().map(|(_, sid)| sid.clone()).collect();

        for session_id in session_ids {
            self.close_session(&session_id).await;
        }
    }

    fn scoped_resource_callback(&self, session_id: &str) -> ResourceChangeCallback {
        let callback = self.on_resource_changed.clone();
        let session_id = session_id.to_owned();
        Arc::new(move |server_name: &str| callback(server_name, &session_id))
    }

    fn scoped_prompt_callback(&self, session_id: &str) -> PromptChangeCallback {
        let callback = self.on_prompt_changed.clone();
        let session_id = session_id.to_owned();
        Arc::new(move |server_name: &str| callback(server_name, &session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_session_yields_empty_maps() {
        let manager = ClientManager::new(Arc::new(|_, _| {}), Arc::new(|_, _| {}));

        assert!(manager.get_clients_by_session("missing").await.is_empty());
        assert!(manager.get_failed_servers("missing").await.is_empty());
        assert!(manager.get_client("any", "missing").await.is_none());
    }

    #[tokio::test]
    async fn close_session_on_unknown_session_is_a_no_op() {
        let manager = ClientManager::new(Arc::new(|_, _| {}), Arc::new(|_, _| {}));
        manager.close_session("missing").await;
    }
}
