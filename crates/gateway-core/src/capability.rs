//! What the downstream client advertised at initialize, so upstream servers
//! can be told which bidirectional request types are supported end-to-end.

use std::{collections::HashMap, sync::RwLock};

/// An elicitation mode a downstream client may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElicitationMode {
    /// Structured-form elicitation.
    Form,
    /// URL-based elicitation.
    Url,
}

/// Bidirectional request capabilities the downstream client advertised at
/// `initialize`. Observed exactly once per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct DownstreamCapabilities {
    /// Whether the downstream supports `sampling/createMessage`.
    pub sampling: bool,
    /// Whether the downstream supports form-based elicitation.
    pub elicitation_form: bool,
    /// Whether the downstream supports URL-based elicitation.
    pub elicitation_url: bool,
}

impl DownstreamCapabilities {
    /// Whether any elicitation mode is supported.
    pub fn has_elicitation(&self) -> bool {
        self.elicitation_form || self.elicitation_url
    }

    /// Whether the given elicitation mode is supported.
    pub fn has_elicitation_mode(&self, mode: ElicitationMode) -> bool {
        match mode {
            ElicitationMode::Form => self.elicitation_form,
            ElicitationMode::Url => self.elicitation_url,
        }
    }

    /// Re-encodes these capabilities as the `rmcp::model::ClientCapabilities`
    /// this gateway advertises to an upstream on its behalf, so the upstream
    /// knows it may send the bidirectional request kinds the downstream
    /// actually supports (spec.md §4.2: "advertising downstreamCaps
    /// verbatim"). Round-trips through JSON rather than constructing the
    /// struct's fields directly, since `rmcp`'s capability fields are
    /// forward-compatible maps rather than fields this crate should assume a
    /// fixed shape for — matching how [`crate::gateway::extract_downstream_capabilities`]
    /// reads the same struct in the other direction.
    pub fn to_client_capabilities(self) -> rmcp::model::ClientCapabilities {
        let mut value = serde_json::Map::new();

        if self.sampling {
            value.insert("sampling".to_owned(), serde_json::json!({}));
        }

        if self.has_elicitation() {
            let mut elicitation = serde_json::Map::new();

            if self.elicitation_form {
                elicitation.insert("form".to_owned(), serde_json::Value::Bool(true));
            }

            if self.elicitation_url {
                elicitation.insert("url".to_owned(), serde_json::Value::Bool(true));
            }

            value.insert("elicitation".to_owned(), serde_json::Value::Object(elicitation));
        }

        serde_json::from_value(serde_json::Value::Object(value)).unwrap_or_default()
    }
}

/// Pure in-memory `sessionId → DownstreamCapabilities` map. Lifetime matches
/// the owning session: written once at downstream initialize, deleted at
/// session close.
#[derive(Default)]
pub struct CapabilityStore {
    entries: RwLock<HashMap<String, DownstreamCapabilities>>,
}

impl CapabilityStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `capabilities` for `session_id`, overwriting any prior entry.
    pub fn set(&self, session_id: &str, capabilities: DownstreamCapabilities) {
        let mut entries = self.write();
        entries.insert(session_id.to_owned(), capabilities);
    }

    /// Returns the capabilities recorded for `session_id`, if any.
    pub fn get(&self, session_id: &str) -> Option<DownstreamCapabilities> {
        self.read().get(session_id).copied()
    }

    /// Whether `session_id` has sampling capability.
    pub fn has_sampling(&self, session_id: &str) -> bool {
        self.get(session_id).map(|c| c.sampling).unwrap_or(false)
    }

    /// Whether `session_id` has the given elicitation mode.
    pub fn has_elicitation_mode(&self, session_id: &str, mode: ElicitationMode) -> bool {
        self.get(session_id).map(|c| c.has_elicitation_mode(mode)).unwrap_or(false)
    }

    /// Removes the entry for `session_id`.
    pub fn delete(&self, session_id: &str) {
        self.write().remove(session_id);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, DownstreamCapabilities>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("capability store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, DownstreamCapabilities>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("capability store lock poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let store = CapabilityStore::new();

        store.set(
            "session-a",
            DownstreamCapabilities {
                sampling: true,
                elicitation_form: true,
                elicitation_url: false,
            },
        );

        assert!(store.has_sampling("session-a"));
        assert!(store.has_elicitation_mode("session-a", ElicitationMode::Form));
        assert!(!store.has_elicitation_mode("session-a", ElicitationMode::Url));
        assert!(!store.has_sampling("session-b"));
    }

    #[test]
    fn delete_removes_entry() {
        let store = CapabilityStore::new();
        store.set("session-a", DownstreamCapabilities::default());
        store.delete("session-a");
        assert!(store.get("session-a").is_none());
    }

    #[test]
    fn to_client_capabilities_round_trips_through_extraction() {
        let caps = DownstreamCapabilities {
            sampling: true,
            elicitation_form: true,
            elicitation_url: false,
        };

        let client_capabilities = caps.to_client_capabilities();
        let extracted = crate::gateway::extract_downstream_capabilities(&client_capabilities);

        assert!(extracted.sampling);
        assert!(extracted.elicitation_form);
        assert!(!extracted.elicitation_url);
    }

    #[test]
    fn no_capabilities_encode_to_empty_client_capabilities() {
        let client_capabilities = DownstreamCapabilities::default().to_client_capabilities();
        let extracted = crate::gateway::extract_downstream_capabilities(&client_capabilities);

        assert!(!extracted.sampling);
        assert!(!extracted.has_elicitation());
    }
}
