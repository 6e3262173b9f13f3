//! Scene studio: the screenplay pipeline from logline to finished scene.
//!
//! ```text
//! ACT I    analyze ─▶ character_bible (optional)
//! ACT II   scene_outline ─▶ dialogue
//! ACT III  final_scene (critique, directive, verdict, polished scene)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use crate::agents::{AgentRole, Roster};
use crate::config::Config;
use crate::cost::{self, CostLedger};
use crate::llm::ProviderRegistry;
use crate::memory::{self, extract_genre, SceneMemory, SceneRecord};
use crate::orchestrator::{Orchestrator, PipelineError, RunPhase, RunReport, TerminalCheck};
use crate::review::{ReviewSections, ReviewVerdict};
use crate::task::{placeholders, GraphError, TaskGraph, TaskSpec};
use crate::validation::RuleSet;

pub const LOGLINE: &str = "logline";
pub const ANALYZE: &str = "analyze";
pub const CHARACTER_BIBLE: &str = "character_bible";
pub const SCENE_OUTLINE: &str = "scene_outline";
pub const DIALOGUE: &str = "dialogue";
pub const FINAL_SCENE: &str = "final_scene";

const ANALYZE_TEMPLATE: &str = "Analyze this logline for character contradiction opportunities: \
'{{logline}}'

Identify where each character might have opposing conscious and unconscious desires, and lay \
the structural foundation the rest of the room will build on.";

const CHARACTER_BIBLE_TEMPLATE: &str = "Create a character bible for this logline: '{{logline}}'

STRUCTURAL ANALYSIS:
{{analyze}}

For each character, identify contradictory conscious and unconscious desires that create \
internal tension.";

/// Everything one run produced.
#[derive(Debug, Clone, Serialize)]
pub struct SceneMeta {
    pub logline: String,
    pub structural_analysis: String,
    pub character_bible: Option<String>,
    pub scene_outline: String,
    pub dialogue: String,
    /// Raw reply of the final stage
    pub final_review: String,
    pub critique: String,
    pub revision_directive: String,
    pub verdict: ReviewVerdict,
    pub final_scene: String,
    pub attempt_count: u32,
    pub audit_log: Vec<String>,
    pub total_cost: f64,
    pub cost_by_model: BTreeMap<String, f64>,
    pub phase: RunPhase,
}

impl SceneMeta {
    fn to_record(&self) -> SceneRecord {
        SceneRecord {
            id: Uuid::new_v4(),
            logline: self.logline.clone(),
            structural_analysis: self.structural_analysis.clone(),
            character_bible: self.character_bible.clone(),
            scene_outline: self.scene_outline.clone(),
            dialogue: self.dialogue.clone(),
            critique: self.critique.clone(),
            revision_directive: self.revision_directive.clone(),
            final_scene: self.final_scene.clone(),
            genre: extract_genre(&self.structural_analysis),
            retry_count: self.attempt_count.saturating_sub(1),
            total_cost: self.total_cost,
            created_at: Utc::now(),
        }
    }
}

/// Sends the draft back through the room when the showrunner says REVISE.
struct ShowrunnerVerdict;

impl TerminalCheck for ShowrunnerVerdict {
    fn revision_feedback(&self, final_output: &str) -> Option<String> {
        let review = ReviewSections::parse(final_output);
        if !review.verdict.requests_revision() {
            return None;
        }
        Some(if review.has_directive() {
            review.directive
        } else if review.has_critique() {
            review.critique
        } else {
            "The showrunner asked for another pass.".to_string()
        })
    }
}

/// Build the screenplay task graph.
///
/// Dependencies are taken from each template's placeholders, so a template can only
/// reference stages that run before it.
pub fn screenplay_graph(character_bible: bool) -> Result<TaskGraph, GraphError> {
    let characters = if character_bible {
        "CHARACTER BIBLE:\n{{character_bible}}"
    } else {
        "STRUCTURAL ANALYSIS:\n{{analyze}}"
    };

    let outline = [
        "Create a scene outline showing character contradictions in action.\n\n",
        "LOGLINE: {{logline}}\n\nSTRUCTURAL ANALYSIS:\n{{analyze}}",
        if character_bible {
            "\n\nCHARACTER BIBLE:\n{{character_bible}}"
        } else {
            ""
        },
        "\n\nShow how conscious and unconscious desires create behavioral contradictions.",
    ]
    .concat();

    let dialogue = [
        "Write dialogue where characters pursue conscious desires while unconscious desires \
         leak through.\n\n",
        characters,
        "\n\nSCENE OUTLINE:\n{{scene_outline}}\n\n",
        "Give every speaker a voice that fits their age and history, with meaningful subtext.",
    ]
    .concat();

    let final_scene = [
        "Eliminate AI-like writing and deliver the production-ready scene.\n\n",
        characters,
        "\n\nSCENE OUTLINE:\n{{scene_outline}}\n\nDIALOGUE:\n{{dialogue}}\n\n",
        "Remove purple prose, clichés and artificial patterns. Create authentic human behavior.",
    ]
    .concat();

    let mut tasks = vec![stage(ANALYZE, AgentRole::Dramaturge, ANALYZE_TEMPLATE)
        .expecting("Structural analysis with character contradiction opportunities.")];
    if character_bible {
        tasks.push(
            stage(CHARACTER_BIBLE, AgentRole::CharacterCreator, CHARACTER_BIBLE_TEMPLATE)
                .expecting("Character bible with conscious/unconscious desire contradictions."),
        );
    }
    tasks.push(
        stage(SCENE_OUTLINE, AgentRole::SceneArchitect, &outline)
            .expecting("Scene outline with character psychology driving action."),
    );
    tasks.push(
        stage(DIALOGUE, AgentRole::DialogueSpecialist, &dialogue)
            .expecting("Authentic dialogue revealing character contradictions."),
    );
    tasks.push(
        stage(FINAL_SCENE, AgentRole::CreativeReviewer, &final_scene)
            .expecting("Critique, revision directive, verdict and production-ready scene."),
    );

    TaskGraph::new(tasks)
}

fn stage(id: &str, role: AgentRole, template: &str) -> TaskSpec {
    placeholders(template)
        .iter()
        .filter(|name| name.as_str() != LOGLINE)
        .fold(TaskSpec::new(id, role, template), |spec, dep| {
            spec.depends_on(dep.as_str())
        })
}

/// The writers' room: one orchestrator plus the optional scene archive.
pub struct SceneStudio {
    orchestrator: Orchestrator,
    memory: Option<Arc<dyn SceneMemory>>,
    character_bible: bool,
}

impl SceneStudio {
    pub fn new(
        config: &Config,
        roster: Roster,
        ledger: Arc<CostLedger>,
    ) -> Result<Self, PipelineError> {
        let graph = screenplay_graph(config.character_bible)?;
        let orchestrator = Orchestrator::new(roster, graph, ledger)?
            .with_checkpoint(ANALYZE, RuleSet::structural_analysis())
            .with_terminal_check(ShowrunnerVerdict)
            .with_max_attempts(config.max_attempts)
            .with_clarification(config.clarification);

        Ok(Self {
            orchestrator,
            memory: None,
            character_bible: config.character_bible,
        })
    }

    /// Wire up HTTP clients, the roster, a fresh ledger and (if enabled) the archive.
    pub async fn from_config(config: &Config) -> Result<Self, PipelineError> {
        let registry = ProviderRegistry::from_config(config);
        let roster = Roster::from_config(config, &registry)?;
        let studio = Self::new(config, roster, Arc::new(CostLedger::new()))?;

        tracing::info!(
            max_attempts = config.max_attempts,
            character_bible = config.character_bible,
            "Mixed-model studio initialized"
        );

        Ok(match memory::open_memory(config).await {
            Some(memory) => studio.with_memory(memory),
            None => studio,
        })
    }

    pub fn with_memory(mut self, memory: Arc<dyn SceneMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        self.orchestrator.ledger()
    }

    /// Turn a logline into a finished scene.
    ///
    /// # Errors
    /// See [`Orchestrator::run`]. A weak analysis or an unstructured review is not an
    /// error; both are noted in the audit log.
    pub async fn generate_scene(&self, logline: &str) -> Result<SceneMeta, PipelineError> {
        tracing::info!(logline = %logline, "Starting production");

        let mark = self.ledger().len();
        let inputs = BTreeMap::from([(LOGLINE.to_string(), logline.to_string())]);
        let report = self.orchestrator.run(&inputs).await?;

        let run_costs = self.ledger().entries_since(mark);
        let meta = self.assemble(logline, report, &run_costs);

        tracing::info!(
            attempts = meta.attempt_count,
            verdict = %meta.verdict,
            cost_usd = meta.total_cost,
            "Production completed"
        );

        if let Some(memory) = &self.memory {
            if let Err(e) = memory.store(&meta.to_record()).await {
                tracing::warn!("Failed to store scene in memory: {}", e);
            }
        }

        Ok(meta)
    }

    fn assemble(
        &self,
        logline: &str,
        report: RunReport,
        run_costs: &[cost::CostEntry],
    ) -> SceneMeta {
        let output = |id: &str| report.output(id).unwrap_or_default().to_string();

        let final_review = output(FINAL_SCENE);
        let review = ReviewSections::parse(&final_review);
        let character_bible = self.character_bible.then(|| output(CHARACTER_BIBLE));
        let structural_analysis = output(ANALYZE);
        let scene_outline = output(SCENE_OUTLINE);
        let dialogue = output(DIALOGUE);

        let mut audit_log = report.audit_log;
        if review.degraded {
            audit_log.push(
                "Final review had no section markers; using the whole reply as the final scene",
            );
        }

        SceneMeta {
            logline: logline.to_string(),
            structural_analysis,
            character_bible,
            scene_outline,
            dialogue,
            final_review,
            critique: review.critique,
            revision_directive: review.directive,
            verdict: review.verdict,
            final_scene: review.final_scene,
            attempt_count: report.attempts,
            audit_log: audit_log.into_entries(),
            total_cost: cost::total_of(run_costs),
            cost_by_model: cost::by_model(run_costs),
            phase: report.phase,
        }
    }
}
