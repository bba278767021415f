use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::bail;
use directories::ProjectDirs;
use indoc::formatdoc;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::Config;

/// Loads and validates a TOML configuration file from `path`.
pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    let config = Config::deserialize(raw_config)?;
    validate_has_downstreams(&config)?;

    Ok(config)
}

/// A configuration with no upstream servers at all cannot aggregate anything;
/// fail fast at startup with a helpful example rather than later in a request.
pub(crate) fn validate_has_downstreams(config: &Config) -> anyhow::Result<()> {
    if !config.mcp.servers.is_empty() {
        return Ok(());
    }

    let message = formatdoc! {r#"
        No upstream MCP servers are configured. The gateway has nothing to aggregate.

        Example configuration:

          [mcp.servers.my-server]
          kind = "stdio"
          command = "npx"
          args = ["-y", "@example/mcp-server"]

        or:

          [mcp.servers.my-server]
          kind = "http"
          url = "https://example.com/mcp"
    "#};

    bail!(message);
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]").unwrap(),
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}

/// One entry in the ordered `--config-path` search list, annotated with whether
/// the file exists at that location.
#[derive(Debug, Clone)]
pub struct ConfigSearchEntry {
    /// The candidate path.
    pub path: PathBuf,
    /// Whether a file currently exists at `path`.
    pub exists: bool,
}

/// Builds the ordered list of places the gateway looks for its configuration
/// file, in the order they are consulted: `$CONFIG_PATH`, `./gateway.toml`, then
/// the platform config directory (`$XDG_CONFIG_HOME/mcp-gateway/config.toml` on
/// Linux, falling back to `~/.config/mcp-gateway/config.toml` when neither
/// `XDG_CONFIG_HOME` nor a platform default is available).
pub fn config_search_paths() -> Vec<ConfigSearchEntry> {
    let mut candidates = Vec::new();

    if let Ok(from_env) = std::env::var("CONFIG_PATH") {
        candidates.push(PathBuf::from(from_env));
    }

    candidates.push(PathBuf::from("./gateway.toml"));

    if let Some(dirs) = ProjectDirs::from("", "", "mcp-gateway") {
        candidates.push(dirs.config_dir().join("config.toml"));
    }

    candidates
        .into_iter()
        .map(|path| {
            let exists = path.exists();
            ConfigSearchEntry { path, exists }
        })
        .collect()
}

/// Resolves the first existing path from [`config_search_paths`], if any.
pub fn resolve_config_path() -> Option<PathBuf> {
    config_search_paths().into_iter().find(|e| e.exists).map(|e| e.path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_dynamic_strings_leaves_plain_strings() {
        let mut value: Value = toml::from_str("name = \"my-server\"").unwrap();
        expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap();
        assert_eq!(value["name"].as_str(), Some("my-server"));
    }

    #[test]
    fn expand_dynamic_strings_substitutes_env_var() {
        unsafe { std::env::set_var("GATEWAY_TEST_TOKEN", "secret-value") };

        let mut value: Value = toml::from_str("token = \"{{ env.GATEWAY_TEST_TOKEN }}\"").unwrap();
        expand_dynamic_strings(&mut Vec::new(), &mut value).unwrap();

        assert_eq!(value["token"].as_str(), Some("secret-value"));
    }

    #[test]
    fn validate_has_downstreams_rejects_empty_config() {
        let config = Config::default();
        assert!(validate_has_downstreams(&config).is_err());
    }
}
