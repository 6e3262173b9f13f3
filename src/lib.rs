//! # SceneSmith
//!
//! A mixed-model writers' room: turns a one-line premise into a screenplay scene by
//! running it through a chain of LLM agents.
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │           SceneStudio            │
//!        │  (screenplay graph, memory, cost)│
//!        └────────────────┬─────────────────┘
//!                         │
//!                         ▼
//!                ┌─────────────────┐      ┌──────────────┐
//!                │  Orchestrator   │─────▶│  Validation  │
//!                │ (attempt loop)  │      └──────────────┘
//!                └────────┬────────┘
//!                         │ one task at a time
//!                         ▼
//!                ┌─────────────────┐
//!                │  Agent roster   │──▶ OpenAI / Anthropic
//!                └─────────────────┘
//! ```
//!
//! ## Flow
//! 1. Dramaturge analyzes the logline; the analysis is validated
//! 2. Character creator, scene architect and dialogue specialist build the draft
//! 3. Showrunner critiques, issues a verdict and delivers the final scene
//! 4. The reply is split into sections; the run is archived in scene memory
//!
//! ## Modules
//! - `orchestrator`: attempt loop, validation checkpoint, retry with feedback
//! - `task`: task specs, dependency graph and context injection
//! - `agents`: roles, personas and the role → agent roster
//! - `llm`: provider clients behind the `LlmClient` trait
//! - `review`: splits the final reply into critique, directive, verdict and scene
//! - `cost`, `memory`: per-call cost ledger and the scene archive

pub mod agents;
pub mod config;
pub mod cost;
pub mod llm;
pub mod logging;
pub mod memory;
pub mod orchestrator;
pub mod review;
pub mod studio;
pub mod task;
pub mod validation;

pub use config::Config;
pub use studio::{SceneMeta, SceneStudio};
