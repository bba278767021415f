//! One connected upstream: filtered tool list, paginated resource/prompt
//! lists, cache + notification-driven invalidation, bidirectional request
//! handler registration.

pub mod handler;
pub mod transport;

use std::{
    collections::BTreeSet,
    sync::{Arc, RwLock},
};

use config::UpstreamConfig;
use rmcp::model::ClientCapabilities;
use serde_json::Value;

pub use handler::{ClientSessionEvents, DownstreamForwarder, ForwardGate, SharedForwarder};
use transport::UpstreamConnection;

use crate::error::GatewayError;

/// A callback fired whenever this session's resource (or prompt) cache is
/// invalidated by a `*_list_changed` notification, so the owning aggregator
/// can drop its own composite cache for the session. Invoked with this
/// upstream's `server_name`.
pub type ResourceChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Same shape as [`ResourceChangeCallback`], kept as a distinct alias for the
/// prompt side of the aggregator hookup.
pub type PromptChangeCallback = Arc<dyn Fn(&str) + Send + Sync>;

type Cache = Arc<RwLock<Option<Vec<Value>>>>;
type ListCache = Arc<RwLock<Option<CachedList>>>;

/// A page-concatenated resource or prompt list, with the last page's `_meta`
/// preserved and `nextCursor` erased (spec.md §4.1).
#[derive(Debug, Clone, Default)]
struct CachedList {
    items: Vec<Value>,
    meta: Option<Value>,
}

/// One connected upstream, scoped to exactly one `(serverName, sessionId)` pair.
pub struct ClientSession {
    server_name: String,
    session_id: String,
    allowed_tools: Option<BTreeSet<String>>,
    connection: UpstreamConnection,
    cached_tools: Cache,
    cached_resources: ListCache,
    cached_prompts: ListCache,
}

impl ClientSession {
    /// Connects to `config` and constructs the owning session.
    ///
    /// `on_resource_changed`/`on_prompt_changed` are invoked (with
    /// `server_name`) whenever the matching `*_list_changed` notification
    /// invalidates this session's own cache, after that cache has already
    /// been cleared — the aggregator only needs to drop its composite cache,
    /// never to read this session's state synchronously with the event.
    pub async fn connect(
        server_name: &str,
        session_id: &str,
        config: &UpstreamConfig,
        client_capabilities: ClientCapabilities,
        on_resource_changed: ResourceChangeCallback,
        on_prompt_changed: PromptChangeCallback,
    ) -> Result<Self, GatewayError> {
        let cached_tools: Cache = Arc::new(RwLock::new(None));
        let cached_resources: ListCache = Arc::new(RwLock::new(None));
        let cached_prompts: ListCache = Arc::new(RwLock::new(None));

        let on_tool_list_changed = {
            let cache = cached_tools.clone();
            move || *cache.write_poisoned() = None
        };

        let on_resource_list_changed = {
            let cache = cached_resources.clone();
            let server_name = server_name.to_owned();
            move || {
                *cache.write_poisoned() = None;
                on_resource_changed(&server_name);
            }
        };

        let on_prompt_list_changed = {
            let cache = cached_prompts.clone();
            let server_name = server_name.to_owned();
            move || {
                *cache.write_poisoned() = None;
                on_prompt_changed(&server_name);
            }
        };

        let events = ClientSessionEvents::new(on_tool_list_changed, on_resource_list_changed, on_prompt_list_changed);

        let connection = UpstreamConnection::connect(server_name, config, client_capabilities, events).await?;

        Ok(Self {
            server_name: server_name.to_owned(),
            session_id: session_id.to_owned(),
            allowed_tools: config.allowed_tools().cloned(),
            connection,
            cached_tools,
            cached_resources,
            cached_prompts,
        })
    }

    /// The upstream's configured name.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The owning session id.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Installs the downstream forwarder for bidirectional requests, gated by
    /// which kinds the downstream actually advertised.
    pub async fn set_forwarder(&self, forwarder: SharedForwarder, gate: ForwardGate) {
        self.connection.set_forwarder(forwarder, gate).await;
    }

    /// Returns the cached, filtered tool list, fetching and filtering it on
    /// first call. Never fails the caller: transport errors are logged and
    /// yield an empty list.
    pub async fn list_tools(&self) -> Vec<Value> {
        if let Some(cached) = self.read_cache(&self.cached_tools) {
            return cached;
        }

        let fetched = match self.connection.list_tools().await {
            Ok(value) => value,
            Err(e) => {
                log::error!("failed to list tools for '{}': {e}", self.server_name);
                return Vec::new();
            }
        };

        let tools = fetched.get("tools").and_then(Value::as_array).cloned().unwrap_or_default();
        let filtered = self.apply_tool_filter(tools);

        *self.cached_tools.write_poisoned() = Some(filtered.clone());

        filtered
    }

    fn apply_tool_filter(&self, tools: Vec<Value>) -> Vec<Value> {
        let Some(allowed) = &self.allowed_tools else {
            return tools;
        };

        if allowed.is_empty() {
            log::error!("all tools blocked for '{}': allowedTools is empty", self.server_name);
            return Vec::new();
        }

        let available: BTreeSet<&str> = tools.iter().filter_map(|t| t["name"].as_str()).collect();

        for name in allowed {
            if !available.contains(name.as_str()) {
                let names: Vec<&str> = available.iter().copied().collect();
                log::error!(
                    "allowed tool '{name}' not found on '{}'; available tools: {}",
                    self.server_name,
                    names.join(", ")
                );
            }
        }

        tools
            .into_iter()
            .filter(|t| t["name"].as_str().is_some_and(|name| allowed.contains(name)))
            .collect()
    }

    /// Returns the cached, page-concatenated resource list.
    pub async fn list_resources(&self) -> Vec<Value> {
        if let Some(cached) = self.read_list_cache(&self.cached_resources) {
            return cached.items;
        }

        let resources = self
            .paginate("resources", |cursor| self.connection.list_resources_page(cursor), "does not support resources")
            .await;

        *self.cached_resources.write_poisoned() = Some(resources.clone());

        resources.items
    }

    /// The `_meta` carried over from the last page of the cached resource
    /// list, if any. Populated by the same fetch as [`Self::list_resources`];
    /// calling this before that has never been invoked returns `None`.
    pub fn resources_meta(&self) -> Option<Value> {
        self.read_list_cache(&self.cached_resources).and_then(|c| c.meta)
    }

    /// Returns the cached, page-concatenated prompt list.
    pub async fn list_prompts(&self) -> Vec<Value> {
        if let Some(cached) = self.read_list_cache(&self.cached_prompts) {
            return cached.items;
        }

        let prompts = self
            .paginate("prompts", |cursor| self.connection.list_prompts_page(cursor), "does not support prompts")
            .await;

        *self.cached_prompts.write_poisoned() = Some(prompts.clone());

        prompts.items
    }

    /// The `_meta` carried over from the last page of the cached prompt list,
    /// if any. Populated by the same fetch as [`Self::list_prompts`]; calling
    /// this before that has never been invoked returns `None`.
    pub fn prompts_meta(&self) -> Option<Value> {
        self.read_list_cache(&self.cached_prompts).and_then(|c| c.meta)
    }

    async fn paginate<F, Fut>(&self, field: &str, fetch_page: F, unsupported_marker: &str) -> CachedList
    where
        F: Fn(Option<String>) -> Fut,
        Fut: std::future::Future<Output = Result<Value, GatewayError>>,
    {
        let mut items = Vec::new();
        let mut meta = None;
        let mut cursor = None;

        loop {
            match fetch_page(cursor.clone()).await {
                Ok(page) => {
                    if let Some(page_items) = page.get(field).and_then(Value::as_array) {
                        items.extend(page_items.iter().cloned());
                    }

                    meta = page.get("_meta").cloned();
                    cursor = page.get("nextCursor").and_then(Value::as_str).map(str::to_owned);

                    if cursor.is_none() {
                        break;
                    }
                }
                Err(GatewayError::Upstream { message }) if message.contains(unsupported_marker) => {
                    log::debug!("'{}' {unsupported_marker}", self.server_name);
                    return CachedList::default();
                }
                Err(e) => {
                    log::error!("failed to list {field} for '{}': {e}", self.server_name);
                    return CachedList { items, meta: None };
                }
            }
        }

        CachedList { items, meta }
    }

    /// Reads a resource by its original (un-namespaced) URI. Errors propagate
    /// to the caller.
    pub async fn read_resource(&self, uri: String) -> Result<Value, GatewayError> {
        self.connection.read_resource(uri).await
    }

    /// Gets a prompt by its original (un-namespaced) name. Errors propagate to
    /// the caller.
    pub async fn get_prompt(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<Value, GatewayError> {
        self.connection.get_prompt(name, arguments).await
    }

    /// Calls a tool by its original (un-namespaced) name. Errors propagate to
    /// the caller.
    pub async fn call_tool(&self, name: String, arguments: Option<serde_json::Map<String, Value>>) -> Result<Value, GatewayError> {
        self.connection.call_tool(name, arguments).await
    }

    /// Closes the upstream connection. Best-effort.
    pub async fn close(self) {
        self.connection.close().await;
    }

    /// The upstream's advertised `InitializeResult`, if the handshake completed.
    pub fn peer_info(&self) -> Option<Value> {
        self.connection.peer_info()
    }

    fn read_cache(&self, cache: &RwLock<Option<Vec<Value>>>) -> Option<Vec<Value>> {
        match cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("cache lock poisoned for '{}', recovering", self.server_name);
                poisoned.into_inner().clone()
            }
        }
    }

    fn read_list_cache(&self, cache: &RwLock<Option<CachedList>>) -> Option<CachedList> {
        match cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => {
                log::warn!("cache lock poisoned for '{}', recovering", self.server_name);
                poisoned.into_inner().clone()
            }
        }
    }
}

/// Extension trait giving lock-poisoning-recovered write access, matching the
/// accessor style used throughout this gateway for shared caches.
trait PoisonRecoveringWrite<T> {
    fn write_poisoned(&self) -> std::sync::RwLockWriteGuard<'_, T>;
}

impl<T> PoisonRecoveringWrite<T> for RwLock<T> {
    fn write_poisoned(&self) -> std::sync::RwLockWriteGuard<'_, T> {
        match self.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
