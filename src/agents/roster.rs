//! Role → agent mapping.

use std::collections::BTreeMap;

use super::{prompts, Agent, AgentError, AgentRole};
use crate::config::Config;
use crate::llm::ProviderRegistry;

/// The agents available to one orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    agents: BTreeMap<AgentRole, Agent>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind every role to the client for its configured provider.
    ///
    /// # Errors
    /// `AgentError::UnboundProvider` if the registry has no client for a role's provider.
    pub fn from_config(config: &Config, registry: &ProviderRegistry) -> Result<Self, AgentError> {
        let mut roster = Self::new();
        for role in AgentRole::ALL {
            let binding = config.binding(role);
            let client = registry
                .get(binding.provider)
                .ok_or(AgentError::UnboundProvider {
                    role,
                    provider: binding.provider,
                })?;
            roster = roster.with_agent(Agent::new(prompts::descriptor(role, binding), client));
        }
        Ok(roster)
    }

    /// Add or replace the agent for its role.
    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agents.insert(agent.role(), agent);
        self
    }

    pub fn get(&self, role: AgentRole) -> Option<&Agent> {
        self.agents.get(&role)
    }

    pub fn require(&self, role: AgentRole) -> Result<&Agent, AgentError> {
        self.get(role).ok_or(AgentError::MissingRole(role))
    }

    pub fn roles(&self) -> impl Iterator<Item = AgentRole> + '_ {
        self.agents.keys().copied()
    }
}
