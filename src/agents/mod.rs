//! Agents module - the writers' room.
//!
//! # Roles
//! - **Dramaturge**: structural analysis of the logline (checkpoint stage)
//! - **CharacterCreator**: character bible with contradictory desires
//! - **SceneArchitect**: three-paragraph scene outline
//! - **DialogueSpecialist**: screenplay-format dialogue
//! - **CreativeReviewer**: critique, revision directive, verdict and final scene
//!
//! An [`Agent`] is an immutable [`AgentDescriptor`] bound to one [`LlmClient`]. The
//! [`Roster`] maps each [`AgentRole`] to its agent and is resolved once, when the
//! orchestrator is built.

pub mod prompts;
mod roster;
mod types;

pub use roster::Roster;
pub use types::{AgentDescriptor, AgentError, AgentRole, ModelBinding};

use std::sync::Arc;

use crate::llm::{ChatMessage, ChatOptions, Completion, LlmClient, ProviderError};

/// A descriptor plus the client that serves it.
#[derive(Clone)]
pub struct Agent {
    descriptor: AgentDescriptor,
    client: Arc<dyn LlmClient>,
}

impl Agent {
    pub fn new(descriptor: AgentDescriptor, client: Arc<dyn LlmClient>) -> Self {
        Self { descriptor, client }
    }

    pub fn descriptor(&self) -> &AgentDescriptor {
        &self.descriptor
    }

    pub fn role(&self) -> AgentRole {
        self.descriptor.role
    }

    pub fn model(&self) -> &str {
        &self.descriptor.binding.model
    }

    /// Send one fully resolved prompt to the bound model.
    ///
    /// # Postcondition
    /// On success the completion carries non-empty text.
    pub async fn invoke(&self, prompt: &str) -> Result<Completion, ProviderError> {
        let messages = [
            ChatMessage::system(self.system_prompt()),
            ChatMessage::user(prompt),
        ];
        let binding = &self.descriptor.binding;
        let options = ChatOptions {
            temperature: Some(binding.temperature),
            top_p: None,
            max_tokens: Some(binding.max_tokens),
        };

        tracing::debug!(
            role = %self.role(),
            model = %binding.model,
            prompt_chars = prompt.len(),
            "Dispatching prompt"
        );

        let completion = self.client.complete(&binding.model, &messages, &options).await?;

        tracing::debug!(
            role = %self.role(),
            model = %completion.model,
            output_chars = completion.text.len(),
            "Agent replied"
        );
        Ok(completion)
    }

    /// Role header followed by the persona text, which does its own introduction.
    fn system_prompt(&self) -> String {
        format!(
            "ROLE: {}\nGOAL: {}.\n\n{}",
            self.descriptor.title, self.descriptor.goal, self.descriptor.instructions
        )
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.descriptor.role)
            .field("model", &self.descriptor.binding.model)
            .finish()
    }
}
