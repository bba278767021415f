//! The `execute(script)` meta-tool's embedded scripting runtime, specified
//! specified only at its interface: the embedded script runtime is represented
//! as a trait at its call boundary, using the same boxed-future trait-object
//! shape as [`crate::session::handler::DownstreamForwarder`].

use std::{collections::BTreeMap, future::Future, pin::Pin, sync::Arc};

use serde_json::Value;

use crate::error::GatewayError;

/// A boxed, `Send` future, matching the shape used throughout this crate for
/// trait-object-friendly async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Calls one upstream tool by its original (un-namespaced) name. Bound to a
/// single upstream so the script's generated namespace object only needs to
/// carry the tool name, not the owning server.
pub type ToolCallback = Arc<dyn Fn(String, Option<serde_json::Map<String, Value>>) -> BoxFuture<'static, Result<Value, GatewayError>> + Send + Sync>;

/// Everything an `execute(script)` call exposes to the script: one callable
/// namespace per connected upstream in the calling session, keyed by the
/// Lua-identifier-safe sanitized server name.
#[derive(Clone, Default)]
pub struct ScriptBindings {
    /// `luaServerName → callback`, where the callback dispatches to that
    /// upstream by its original (un-namespaced) tool name.
    pub namespaces: BTreeMap<String, ToolCallback>,
}

impl ScriptBindings {
    /// An empty binding set, used when no upstream is connected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the callable namespace for one upstream.
    pub fn insert(&mut self, lua_server_name: String, callback: ToolCallback) {
        self.namespaces.insert(lua_server_name, callback);
    }
}

/// The result of a successful `execute(script)` run: the script's return
/// value plus anything it wrote to its captured standard output.
#[derive(Debug, Clone, Default)]
pub struct ScriptOutcome {
    /// The script's return value, as an untyped JSON value.
    pub value: Value,
    /// Captured stdout text produced while the script ran.
    pub stdout: String,
}

/// The embedded-script runtime reported a failure during `execute`. Always
/// converted into a `CallToolResult` with `isError = true`, never raised as a
/// protocol-level error.
#[derive(Debug, Clone)]
pub struct ScriptFailure {
    /// The failure text shown to the caller.
    pub message: String,
}

impl ScriptFailure {
    /// Builds the failure returned when no real script runtime is wired in.
    pub fn unavailable() -> Self {
        Self {
            message: "no script runtime is configured for this gateway".to_owned(),
        }
    }
}

impl From<ScriptFailure> for GatewayError {
    fn from(failure: ScriptFailure) -> Self {
        GatewayError::ScriptFailure { message: failure.message }
    }
}

/// Executes an embedded script whose standard library exposes each connected
/// upstream as a namespace of callable tools.
pub trait ScriptRuntime: Send + Sync {
    /// Runs `script` with `bindings` installed as its standard library.
    fn run(&self, script: String, bindings: ScriptBindings) -> BoxFuture<'static, Result<ScriptOutcome, ScriptFailure>>;
}

/// A [`ScriptRuntime`] that always fails, used when no real runtime is wired
/// into the gateway by default.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScriptRuntime;

impl ScriptRuntime for NullScriptRuntime {
    fn run(&self, _script: String, _bindings: ScriptBindings) -> BoxFuture<'static, Result<ScriptOutcome, ScriptFailure>> {
        Box::pin(async { Err(ScriptFailure::unavailable()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_runtime_always_fails() {
        let runtime = NullScriptRuntime;
        let result = runtime.run("return 1".to_owned(), ScriptBindings::new()).await;
        assert!(result.is_err());
    }
}
