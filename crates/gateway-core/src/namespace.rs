//! Namespacing scheme that lets the gateway present many upstreams as one
//! server: tool names, prompt names, and resource URIs are all prefixed with
//! the owning upstream's name and reversed by re-parsing rather than by a
//! stored mapping table.

use crate::error::GatewayError;

/// Replaces hyphens with underscores, the only sanitization namespaced
/// identifiers apply (names stay Lua-identifier-safe for the `execute` script
/// runtime's generated bindings).
pub fn sanitize(name: &str) -> String {
    name.replace('-', "_")
}

/// Builds the downstream-visible tool name `{serverName}_{toolName}`.
pub fn build_tool_name(server_name: &str, tool_name: &str) -> String {
    format!("{}_{}", sanitize(server_name), sanitize(tool_name))
}

/// Recovers `(serverName, originalToolName)` from a namespaced tool name by
/// matching against the live tool lists of known upstreams. No mapping table
/// is stored; `servers` supplies, for each candidate server name, the current
/// (unsanitized) tool names advertised by that upstream.
pub fn resolve_tool_name<'a, I, J>(full_name: &str, servers: I) -> Option<(String, String)>
where
    I: IntoIterator<Item = (&'a str, J)>,
    J: IntoIterator<Item = &'a str>,
{
    for (server_name, tools) in servers {
        let prefix = format!("{}_", sanitize(server_name));

        let Some(rest) = full_name.strip_prefix(&prefix) else {
            continue;
        };

        for tool_name in tools {
            if sanitize(tool_name) == rest {
                return Some((server_name.to_owned(), tool_name.to_owned()));
            }
        }
    }

    None
}

/// Builds the downstream-visible prompt name `{serverName}/{originalName}`.
pub fn build_prompt_name(server_name: &str, prompt_name: &str) -> String {
    format!("{server_name}/{prompt_name}")
}

/// Splits a namespaced prompt name on its first `/`. The remainder may itself
/// contain `/`.
pub fn parse_prompt_name(full_name: &str) -> Result<(&str, &str), GatewayError> {
    let Some((server, rest)) = full_name.split_once('/') else {
        return Err(GatewayError::InvalidFormat {
            expected: "{serverName}/{promptName}".to_owned(),
            received: full_name.to_owned(),
        });
    };

    if server.is_empty() || rest.is_empty() {
        return Err(GatewayError::InvalidFormat {
            expected: "{serverName}/{promptName}".to_owned(),
            received: full_name.to_owned(),
        });
    }

    Ok((server, rest))
}

/// Builds the downstream-visible resource URI `mcp://{serverName}/{originalUri}`.
pub fn build_resource_uri(server_name: &str, original_uri: &str) -> String {
    format!("mcp://{server_name}/{original_uri}")
}

const RESOURCE_SCHEME: &str = "mcp://";

/// Splits a namespaced resource URI into `(serverName, originalUri)`. Requires
/// the `mcp://` scheme, a non-empty server name, and a non-empty remainder.
pub fn parse_resource_uri(uri: &str) -> Result<(&str, &str), GatewayError> {
    let expected = "mcp://{serverName}/{originalUri}".to_owned();

    let Some(rest) = uri.strip_prefix(RESOURCE_SCHEME) else {
        return Err(GatewayError::InvalidFormat {
            expected,
            received: uri.to_owned(),
        });
    };

    let Some((server, original)) = rest.split_once('/') else {
        return Err(GatewayError::InvalidFormat {
            expected,
            received: uri.to_owned(),
        });
    };

    if server.is_empty() || original.is_empty() {
        return Err(GatewayError::InvalidFormat {
            expected,
            received: uri.to_owned(),
        });
    }

    Ok((server, original))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_hyphens() {
        assert_eq!(sanitize("docs-server"), "docs_server");
        assert_eq!(sanitize("plain"), "plain");
    }

    #[test]
    fn tool_name_round_trips() {
        let full = build_tool_name("data-server", "get-report-link");
        assert_eq!(full, "data_server_get_report_link");

        let servers = [("data-server", vec!["get-report-link", "other-tool"])];
        let resolved = resolve_tool_name(&full, servers.iter().map(|(n, t)| (*n, t.iter().copied())));
        assert_eq!(resolved, Some(("data-server".to_owned(), "get-report-link".to_owned())));
    }

    #[test]
    fn tool_name_resolution_picks_the_right_server_among_several() {
        let full = build_tool_name("config-server", "settings");

        let servers = [
            ("docs-server", vec!["readme"]),
            ("config-server", vec!["settings", "other"]),
        ];

        let resolved = resolve_tool_name(&full, servers.iter().map(|(n, t)| (*n, t.iter().copied())));
        assert_eq!(resolved, Some(("config-server".to_owned(), "settings".to_owned())));
    }

    #[test]
    fn prompt_name_round_trips() {
        let full = build_prompt_name("docs-server", "greeting");
        let (server, rest) = parse_prompt_name(&full).unwrap();
        assert_eq!(server, "docs-server");
        assert_eq!(rest, "greeting");
    }

    #[test]
    fn prompt_name_remainder_may_contain_slashes() {
        let (server, rest) = parse_prompt_name("docs-server/a/b/c").unwrap();
        assert_eq!(server, "docs-server");
        assert_eq!(rest, "a/b/c");
    }

    #[test]
    fn resource_uri_round_trips() {
        let full = build_resource_uri("docs-server", "file:///docs/README.md");
        let (server, original) = parse_resource_uri(&full).unwrap();
        assert_eq!(server, "docs-server");
        assert_eq!(original, "file:///docs/README.md");
    }

    #[test]
    fn resource_uri_rejects_missing_scheme() {
        assert!(parse_resource_uri("not-a-valid-uri").is_err());
    }

    #[test]
    fn resource_uri_rejects_empty_server_name() {
        assert!(parse_resource_uri("mcp:///file:///x").is_err());
    }

    #[test]
    fn resource_uri_rejects_empty_remainder() {
        assert!(parse_resource_uri("mcp://server1/").is_err());
    }
}
