use std::sync::Arc;

use args::Args;
use clap::Parser;
use config::{Config, TransportMode, config_search_paths};
use gateway_core::{InMemorySkillStore, NullScriptRuntime, ServerInfoPreloader, SessionOrchestrator, SkillStore};

mod args;
mod logger;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.show_config_path {
        print_config_search_paths();
        return Ok(());
    }

    logger::init(&args);

    let mut config = load_config()?;
    apply_listener_overrides(&mut config);

    let preloader = ServerInfoPreloader::new();
    let probes = preloader.probe_all(&config.mcp).await;
    let aggregated = preloader.build_aggregated_instructions(&probes);

    let skills = InMemorySkillStore::empty().list().await;
    let skill_instructions = preloader.build_skill_instructions(&skills);

    let instructions = if skill_instructions.is_empty() {
        aggregated
    } else {
        format!("{aggregated}\n\n{skill_instructions}")
    };

    let orchestrator = SessionOrchestrator::new(config.mcp, Arc::new(NullScriptRuntime), instructions);

    server::run(orchestrator, config.server.transport).await
}

/// Prints every place the gateway would look for its configuration file, in
/// search order, each annotated with whether a file currently exists there.
fn print_config_search_paths() {
    for entry in config_search_paths() {
        let status = if entry.exists { "found" } else { "not found" };
        println!("{} ({status})", entry.path.display());
    }
}

/// Loads the gateway's configuration from the first existing path in
/// [`config_search_paths`], or the empty default if none exists (which then
/// fails validation with a helpful message, per spec).
fn load_config() -> anyhow::Result<Config> {
    let config = match config::resolve_config_path() {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };

    config.validate()?;

    Ok(config)
}

/// `HOST` and `PORT` override the configured HTTP listener address, taking
/// priority over whatever the TOML file set.
fn apply_listener_overrides(config: &mut Config) {
    let TransportMode::Http { listen_address, .. } = &mut config.server.transport else {
        return;
    };

    if let Ok(host) = std::env::var("HOST") {
        match host.parse() {
            Ok(ip) => listen_address.set_ip(ip),
            Err(e) => log::warn!("ignoring invalid HOST override '{host}': {e}"),
        }
    }

    if let Ok(port) = std::env::var("PORT") {
        match port.parse() {
            Ok(port) => listen_address.set_port(port),
            Err(e) => log::warn!("ignoring invalid PORT override '{port}': {e}"),
        }
    }
}
