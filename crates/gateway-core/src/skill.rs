//! The filesystem-backed "skill" content store is an external collaborator;
//! this crate only needs its read interface so that
//! [`crate::preloader::ServerInfoPreloader::build_skill_instructions`] can
//! list what it knows about in the gateway's static instructions.

use std::{future::Future, pin::Pin};

/// A boxed, `Send` future, matching the shape used throughout this crate.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One skill the external skill store knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillRecord {
    /// The skill's name.
    pub name: String,
    /// A human-readable description of what the skill does.
    pub description: String,
}

/// Read-only view over the external skill content store.
pub trait SkillStore: Send + Sync {
    /// Lists every known skill.
    fn list(&self) -> BoxFuture<'_, Vec<SkillRecord>>;
}

/// A static, in-memory [`SkillStore`] — the default when no real filesystem-backed
/// store is wired in, and a convenient fixture for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySkillStore {
    skills: Vec<SkillRecord>,
}

impl InMemorySkillStore {
    /// Builds a store over a fixed list of skills.
    pub fn new(skills: Vec<SkillRecord>) -> Self {
        Self { skills }
    }

    /// Builds a store with no skills.
    pub fn empty() -> Self {
        Self::default()
    }
}

impl SkillStore for InMemorySkillStore {
    fn list(&self) -> BoxFuture<'_, Vec<SkillRecord>> {
        Box::pin(async { self.skills.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_store_lists_nothing() {
        let store = InMemorySkillStore::empty();
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn in_memory_store_lists_what_it_was_built_with() {
        let store = InMemorySkillStore::new(vec![SkillRecord {
            name: "summarize".to_owned(),
            description: "Summarizes long text".to_owned(),
        }]);

        let skills = store.list().await;
        assert_eq!(skills.len(), 1);
        assert_eq!(skills[0].name, "summarize");
    }
}
