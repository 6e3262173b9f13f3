//! Core types for the writers' room.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::Provider;

/// Stable identifier for each agent in the room.
///
/// The set is closed; routing a request to an agent goes through this enum, never
/// through a free-form name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Dramaturge,
    CharacterCreator,
    SceneArchitect,
    DialogueSpecialist,
    CreativeReviewer,
}

impl AgentRole {
    pub const ALL: [AgentRole; 5] = [
        AgentRole::Dramaturge,
        AgentRole::CharacterCreator,
        AgentRole::SceneArchitect,
        AgentRole::DialogueSpecialist,
        AgentRole::CreativeReviewer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Dramaturge => "dramaturge",
            AgentRole::CharacterCreator => "character_creator",
            AgentRole::SceneArchitect => "scene_architect",
            AgentRole::DialogueSpecialist => "dialogue_specialist",
            AgentRole::CreativeReviewer => "creative_reviewer",
        }
    }

    /// Suffix of the `TEMPERATURE_*` / `MAX_TOKENS_*` override variables.
    pub fn env_key(&self) -> &'static str {
        match self {
            AgentRole::Dramaturge => "DRAMATURGE",
            AgentRole::CharacterCreator => "CHARACTER_CREATOR",
            AgentRole::SceneArchitect => "ARCHITECT",
            AgentRole::DialogueSpecialist => "DIALOGUE",
            AgentRole::CreativeReviewer => "REVIEWER",
        }
    }

    /// Provider each stage runs on in the mixed-model room.
    pub fn default_provider(&self) -> Provider {
        match self {
            AgentRole::Dramaturge | AgentRole::SceneArchitect => Provider::OpenAi,
            AgentRole::CharacterCreator
            | AgentRole::DialogueSpecialist
            | AgentRole::CreativeReviewer => Provider::Anthropic,
        }
    }

    pub fn default_temperature(&self) -> f64 {
        match self {
            AgentRole::Dramaturge | AgentRole::CreativeReviewer => 0.3,
            AgentRole::CharacterCreator | AgentRole::SceneArchitect => 0.4,
            AgentRole::DialogueSpecialist => 0.5,
        }
    }

    pub fn default_max_tokens(&self) -> u64 {
        match self {
            AgentRole::Dramaturge | AgentRole::DialogueSpecialist => 1000,
            AgentRole::SceneArchitect => 1200,
            AgentRole::CharacterCreator | AgentRole::CreativeReviewer => 1500,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which model serves an agent and how it samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelBinding {
    pub provider: Provider,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u64,
}

/// A configured capability: who the agent is and which model it speaks through.
///
/// # Invariants
/// - Immutable once built; a descriptor belongs to exactly one roster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub role: AgentRole,
    /// Human-readable title used in the system prompt
    pub title: String,
    pub goal: String,
    /// Static system instructions
    pub instructions: String,
    pub binding: ModelBinding,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no agent registered for role {0}")]
    MissingRole(AgentRole),

    #[error("no client registered for provider {provider} (needed by {role})")]
    UnboundProvider { role: AgentRole, provider: Provider },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_model_assignment() {
        assert_eq!(AgentRole::Dramaturge.default_provider(), Provider::OpenAi);
        assert_eq!(AgentRole::SceneArchitect.default_provider(), Provider::OpenAi);
        assert_eq!(AgentRole::CharacterCreator.default_provider(), Provider::Anthropic);
        assert_eq!(AgentRole::CreativeReviewer.default_provider(), Provider::Anthropic);
    }

    #[test]
    fn roles_are_unique_and_ordered() {
        let mut names: Vec<_> = AgentRole::ALL.iter().map(|r| r.as_str()).collect();
        names.dedup();
        assert_eq!(names.len(), AgentRole::ALL.len());
        assert!(AgentRole::Dramaturge < AgentRole::CreativeReviewer);
        assert_eq!(AgentRole::SceneArchitect.to_string(), "scene_architect");
    }
}
