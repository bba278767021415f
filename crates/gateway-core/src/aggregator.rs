//! Session-wide resource and prompt aggregation: namespaced listing with a
//! whole-session cache, and namespace-routed read/get with URI rewriting on
//! the way back.

use std::{collections::HashMap, sync::RwLock};

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;

use crate::{error::GatewayError, manager::ClientManager, namespace};

const DEFAULT_SESSION_ID: &str = "default";

fn effective_session_id(session_id: &str) -> &str {
    if session_id.is_empty() { DEFAULT_SESSION_ID } else { session_id }
}

/// Aggregated resource listing and URI-routed reads, cached per session.
#[derive(Default)]
pub struct ResourceAggregator {
    cache: RwLock<HashMap<String, Vec<Value>>>,
}

impl ResourceAggregator {
    /// Builds an aggregator with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached, namespaced resource list for `session_id`,
    /// fanning out to every connected upstream on a cache miss.
    pub async fn list_resources(&self, manager: &ClientManager, session_id: &str) -> Vec<Value> {
        let session_id = effective_session_id(session_id);

        if let Some(cached) = read_cache(&self.cache, session_id) {
            log::debug!("resource list cache hit for session '{session_id}'");
            return cached;
        }

        let clients = manager.get_clients_by_session(session_id).await;
        let mut fetches = FuturesUnordered::new();

        for (server_name, client) in clients {
            fetches.push(async move {
                let resources = client.list_resources().await;
                (server_name, resources)
            });
        }

        let mut aggregated = Vec::new();

        while let Some((server_name, resources)) = fetches.next().await {
            for mut resource in resources {
                if let Some(uri) = resource.get("uri").and_then(Value::as_str).map(str::to_owned) {
                    resource["uri"] = Value::String(namespace::build_resource_uri(&server_name, &uri));
                }

                aggregated.push(resource);
            }
        }

        write_cache(&self.cache, session_id, aggregated.clone());

        aggregated
    }

    /// Reads a namespaced resource: parses the namespace, looks up the
    /// owning upstream, calls through, and re-namespaces every `uri` in the
    /// response back to `mcp://{serverName}/...`.
    pub async fn read_resource(&self, manager: &ClientManager, namespaced_uri: &str, session_id: &str) -> Result<Value, GatewayError> {
        let session_id = effective_session_id(session_id);
        let (server_name, original_uri) = namespace::parse_resource_uri(namespaced_uri)?;

        let client = manager
            .get_client(server_name, session_id)
            .await
            .ok_or_else(|| GatewayError::server_not_found(server_name, manager.get_clients_by_session(session_id).await.into_keys()))?;

        let mut result = client.read_resource(original_uri.to_owned()).await?;
        rewrite_uris(&mut result, server_name);

        Ok(result)
    }

    /// Drops the whole cached list for `session_id`; `server_name` is
    /// unused, since invalidation is coarse: any change drops the whole cached session entry.
    pub fn on_list_changed(&self, _server_name: &str, session_id: &str) {
        let session_id = effective_session_id(session_id);
        log::debug!("dropping resource cache for session '{session_id}'");
        self.cache_write().remove(session_id);
    }

    fn cache_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>> {
        write_guard(&self.cache)
    }
}

/// Aggregated prompt listing and name-routed gets, cached per session.
/// Identical shape to [`ResourceAggregator`]; kept as a separate type since
/// the two namespace schemes and response shapes differ.
#[derive(Default)]
pub struct PromptAggregator {
    cache: RwLock<HashMap<String, Vec<Value>>>,
}

impl PromptAggregator {
    /// Builds an aggregator with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached, namespaced prompt list for `session_id`, fanning
    /// out to every connected upstream on a cache miss.
    pub async fn list_prompts(&self, manager: &ClientManager, session_id: &str) -> Vec<Value> {
        let session_id = effective_session_id(session_id);

        if let Some(cached) = read_cache(&self.cache, session_id) {
            log::debug!("prompt list cache hit for session '{session_id}'");
            return cached;
        }

        let clients = manager.get_clients_by_session(session_id).await;
        let mut fetches = FuturesUnordered::new();

        for (server_name, client) in clients {
            fetches.push(async move {
                let prompts = client.list_prompts().await;
                (server_name, prompts)
            });
        }

        let mut aggregated = Vec::new();

        while let Some((server_name, prompts)) = fetches.next().await {
            for mut prompt in prompts {
                if let Some(name) = prompt.get("name").and_then(Value::as_str).map(str::to_owned) {
                    prompt["name"] = Value::String(namespace::build_prompt_name(&server_name, &name));
                }

                aggregated.push(prompt);
            }
        }

        write_cache(&self.cache, session_id, aggregated.clone());

        aggregated
    }

    /// Gets a namespaced prompt: parses the namespace, looks up the owning
    /// upstream, calls through, and rewrites any embedded resource
    /// references in the returned messages.
    pub async fn get_prompt(
        &self,
        manager: &ClientManager,
        namespaced_name: &str,
        arguments: Option<serde_json::Map<String, Value>>,
        session_id: &str,
    ) -> Result<Value, GatewayError> {
        let session_id = effective_session_id(session_id);
        let (server_name, original_name) = namespace::parse_prompt_name(namespaced_name)?;

        let client = manager
            .get_client(server_name, session_id)
            .await
            .ok_or_else(|| GatewayError::server_not_found(server_name, manager.get_clients_by_session(session_id).await.into_keys()))?;

        let mut result = client.get_prompt(original_name.to_owned(), arguments).await?;
        rewrite_uris(&mut result, server_name);

        Ok(result)
    }

    /// Drops the whole cached list for `session_id`; `server_name` is
    /// unused, since invalidation is coarse: any change drops the whole cached session entry.
    pub fn on_list_changed(&self, _server_name: &str, session_id: &str) {
        let session_id = effective_session_id(session_id);
        log::debug!("dropping prompt cache for session '{session_id}'");
        self.cache_write().remove(session_id);
    }

    fn cache_write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>> {
        write_guard(&self.cache)
    }
}

/// Recursively rewrites every `uri` string field found anywhere in `value`
/// by re-namespacing it under `server_name`, so resource/prompt links an
/// upstream embeds in its response keep pointing through this gateway.
/// Schemas at this boundary are untyped JSON values, so a structural walk is
/// used instead of matching concrete content-block types.
pub(crate) fn rewrite_uris(value: &mut Value, server_name: &str) {
    match value {
        Value::Object(map) => {
            if let Some(Value::String(uri)) = map.get_mut("uri") {
                *uri = namespace::build_resource_uri(server_name, uri);
            }

            for nested in map.values_mut() {
                rewrite_uris(nested, server_name);
            }
        }
        Value::Array(items) => {
            for item in items {
                rewrite_uris(item, server_name);
            }
        }
        _ => {}
    }
}

fn read_cache(cache: &RwLock<HashMap<String, Vec<Value>>>, session_id: &str) -> Option<Vec<Value>> {
    read_guard(cache).get(session_id).cloned()
}

fn write_cache(cache: &RwLock<HashMap<String, Vec<Value>>>, session_id: &str, value: Vec<Value>) {
    write_guard(cache).insert(session_id.to_owned(), value);
}

fn read_guard(cache: &RwLock<HashMap<String, Vec<Value>>>) -> std::sync::RwLockReadGuard<'_, HashMap<String, Vec<Value>>> {
    match cache.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("aggregator cache lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

fn write_guard(cache: &RwLock<HashMap<String, Vec<Value>>>) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Vec<Value>>> {
    match cache.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("aggregator cache lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_session_id_is_normalized() {
        assert_eq!(effective_session_id(""), DEFAULT_SESSION_ID);
        assert_eq!(effective_session_id("abc"), "abc");
    }

    #[test]
    fn rewrite_uris_handles_nested_content() {
        let mut value = serde_json::json!({
            "content": [
                {"type": "resource_link", "uri": "file:///data/report.json"},
                {"type": "text", "text": "no uri here"}
            ]
        });

        rewrite_uris(&mut value, "data-server");

        assert_eq!(value["content"][0]["uri"], "mcp://data-server/file:///data/report.json");
        assert_eq!(value["content"][1]["text"], "no uri here");
    }

    #[tokio::test]
    async fn list_resources_on_manager_with_no_clients_is_empty() {
        let manager = ClientManager::new(std::sync::Arc::new(|_, _| {}), std::sync::Arc::new(|_, _| {}));
        let aggregator = ResourceAggregator::new();

        assert!(aggregator.list_resources(&manager, "session-a").await.is_empty());
    }
}
