//! Core of the aggregating MCP gateway: connects to many upstream MCP
//! servers, presents their union as one server to a single downstream
//! client, and exposes introspection/execution meta-tools.
//!
//! This crate is the transport-agnostic composition root. The binary crate
//! wires it to a concrete downstream transport (stdio or streamable HTTP).

pub mod aggregator;
pub mod capability;
pub mod discovery;
pub mod error;
pub mod formatter;
pub mod gateway;
pub mod manager;
pub mod namespace;
pub mod orchestrator;
pub mod preloader;
pub mod script;
pub mod session;
pub mod skill;

pub use capability::{CapabilityStore, DownstreamCapabilities, ElicitationMode};
pub use error::GatewayError;
pub use gateway::GatewayServer;
pub use manager::{ClientManager, ConnectOutcome};
pub use orchestrator::SessionOrchestrator;
pub use preloader::{ServerInfoPreloader, UpstreamProbe};
pub use script::{NullScriptRuntime, ScriptBindings, ScriptOutcome, ScriptRuntime};
pub use session::ClientSession;
pub use skill::{InMemorySkillStore, SkillRecord, SkillStore};
