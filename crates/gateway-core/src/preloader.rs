//! Startup probing of every configured upstream, used to build the gateway's
//! static `instructions`. Runs once, before any downstream session exists, so
//! it connects and closes its own throwaway sessions rather than going
//! through [`crate::manager::ClientManager`].

use std::sync::Arc;

use config::{McpConfig, UpstreamConfig};
use futures_util::stream::{FuturesUnordered, StreamExt};
use rmcp::model::ClientCapabilities;

use crate::{
    discovery::{self, ServerInfoSummary},
    formatter,
    session::ClientSession,
    skill::SkillRecord,
};

/// The result of probing one configured upstream at startup.
pub struct UpstreamProbe {
    /// The upstream's configured name.
    pub server_name: String,
    /// `Ok` with the upstream's advertised info, or `Err` with the connect
    /// failure message.
    pub info: Result<ServerInfoSummary, String>,
}

/// Probes every configured upstream once at startup so the gateway can
/// advertise a static, informative `instructions` string without making every
/// downstream client wait on a live fan-out first.
#[derive(Default)]
pub struct ServerInfoPreloader;

impl ServerInfoPreloader {
    /// Builds a preloader. Stateless: every call takes the config it probes.
    pub fn new() -> Self {
        Self
    }

    /// Connects to every configured upstream in parallel, records its
    /// advertised info (or failure), and closes it again. Never fails: an
    /// unreachable upstream just yields a failed [`UpstreamProbe`].
    pub async fn probe_all(&self, config: &McpConfig) -> Vec<UpstreamProbe> {
        let mut futures: FuturesUnordered<_> = config
            .servers
            .iter()
            .map(|(name, upstream)| {
                let name = name.clone();
                let upstream = upstream.clone();
                async move { Self::probe_one(name, upstream).await }
            })
            .collect();

        let mut probes = Vec::new();

        while let Some(probe) = futures.next().await {
            probes.push(probe);
        }

        probes.sort_by(|a, b| a.server_name.cmp(&b.server_name));
        probes
    }

    async fn probe_one(server_name: String, config: UpstreamConfig) -> UpstreamProbe {
        let noop_resource = Arc::new(|_: &str| {});
        let noop_prompt = Arc::new(|_: &str| {});

        let result = ClientSession::connect(&server_name, "__preload__", &config, ClientCapabilities::default(), noop_resource, noop_prompt).await;

        match result {
            Ok(session) => {
                let info = match session.peer_info() {
                    Some(value) => Ok(discovery::summarize_peer_info(&value)),
                    None => Err("upstream did not advertise server info".to_owned()),
                };

                session.close().await;

                UpstreamProbe { server_name, info }
            }
            Err(e) => UpstreamProbe {
                server_name,
                info: Err(e.to_string()),
            },
        }
    }

    /// Builds the Markdown block listing every configured upstream and a
    /// truncated form of its advertised instructions, embedded in the
    /// gateway's own `instructions`.
    pub fn build_aggregated_instructions(&self, probes: &[UpstreamProbe]) -> String {
        if probes.is_empty() {
            return "No upstream MCP servers are configured.".to_owned();
        }

        let mut out = String::from("Aggregated upstream MCP servers:\n\n");

        for probe in probes {
            match &probe.info {
                Ok(info) => {
                    out.push_str(&format!("- {} ({} {})\n", probe.server_name, info.name, info.version));

                    if let Some(instructions) = &info.instructions {
                        out.push_str(&format!("  {}\n", formatter::truncate(instructions, 200)));
                    }
                }
                Err(message) => out.push_str(&format!("- {} (unreachable: {message})\n", probe.server_name)),
            }
        }

        out
    }

    /// Builds the XML-tagged `<available_skills>` block listing every known
    /// skill, embedded in the gateway's own `instructions`. Empty
    /// when no skills are known, so the block never appears for a gateway
    /// with no skill store configured.
    pub fn build_skill_instructions(&self, skills: &[SkillRecord]) -> String {
        if skills.is_empty() {
            return String::new();
        }

        let mut out = String::from("<available_skills>\n");

        for skill in skills {
            out.push_str(&format!(
                "  <skill><name>{}</name><description>{}</description></skill>\n",
                xml_escape(&skill.name),
                xml_escape(&skill.description)
            ));
        }

        out.push_str("</available_skills>");
        out
    }
}

fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn probe_all_on_empty_config_is_empty() {
        let preloader = ServerInfoPreloader::new();
        let probes = preloader.probe_all(&McpConfig::default()).await;
        assert!(probes.is_empty());
    }

    #[test]
    fn aggregated_instructions_on_no_probes_says_so() {
        let preloader = ServerInfoPreloader::new();
        let text = preloader.build_aggregated_instructions(&[]);
        assert!(text.contains("No upstream"));
    }

    #[test]
    fn skill_instructions_on_no_skills_is_empty() {
        let preloader = ServerInfoPreloader::new();
        assert_eq!(preloader.build_skill_instructions(&[]), "");
    }

    #[test]
    fn skill_instructions_escape_xml_special_characters() {
        let preloader = ServerInfoPreloader::new();
        let skills = vec![SkillRecord {
            name: "a<b>".to_owned(),
            description: "x & y".to_owned(),
        }];

        let text = preloader.build_skill_instructions(&skills);
        assert!(text.contains("a&lt;b&gt;"));
        assert!(text.contains("x &amp; y"));
    }
}
