//! Pipeline orchestrator - runs a task graph through the writers' room.
//!
//! # Attempt loop
//! ```text
//! preflight (wiring, roles, checkpoint)
//!   │
//!   ▼
//! attempt n: for each task in dependency order
//!   resolve context ─▶ dispatch ─▶ record cost ─▶ store output
//!   │                                   │
//!   │                         checkpoint? validate
//!   │                                   │ invalid and n < max
//!   │                                   ▼
//!   │                      clarify, audit, restart with feedback
//!   ▼
//! terminal check ─▶ revision requested and n < max ─▶ restart with feedback
//!   │
//!   ▼
//! Succeeded
//! ```
//!
//! Every attempt starts from the first task with an empty [`OutputTable`]; the
//! [`AuditLog`] carries across attempts. A provider failure abandons the attempt and
//! counts against the same budget as validation retries.

mod error;
mod state;

pub use error::PipelineError;
pub use state::{AuditLog, OutputTable, RunPhase, RunReport};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::agents::{prompts, Agent, Roster};
use crate::cost::CostLedger;
use crate::llm::ProviderError;
use crate::task::{resolve, MissingContextError, TaskGraph, TaskId};
use crate::validation::RuleSet;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Decides, from the terminal task's output, whether the whole chain should run again.
pub trait TerminalCheck: Send + Sync {
    /// Feedback for the next attempt, or `None` when the output stands.
    fn revision_feedback(&self, final_output: &str) -> Option<String>;
}

impl<F> TerminalCheck for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn revision_feedback(&self, final_output: &str) -> Option<String> {
        self(final_output)
    }
}

/// The task whose output is validated before the rest of the chain runs.
#[derive(Debug)]
struct Checkpoint {
    task: TaskId,
    rules: RuleSet,
}

/// Notes carried from an abandoned attempt into the next one.
#[derive(Debug, Clone)]
struct Feedback {
    /// `None` applies the notes to every task
    target: Option<TaskId>,
    notes: String,
}

impl Feedback {
    fn applies_to(&self, task: &TaskId) -> bool {
        self.target.as_ref().map_or(true, |t| t == task)
    }
}

/// Feedback gathered over a run. A newer note replaces an older one with the same
/// target; notes for different targets accumulate.
#[derive(Debug, Default)]
struct FeedbackSet {
    items: Vec<Feedback>,
}

impl FeedbackSet {
    fn add(&mut self, feedback: Feedback) {
        self.items.retain(|f| f.target != feedback.target);
        self.items.push(feedback);
    }

    fn append_to(&self, task: &TaskId, prompt: String) -> String {
        let notes: Vec<&str> = self
            .items
            .iter()
            .filter(|f| f.applies_to(task))
            .map(|f| f.notes.as_str())
            .collect();
        if notes.is_empty() {
            return prompt;
        }
        format!(
            "{}\n\nNOTES FROM THE PREVIOUS DRAFT:\n{}",
            prompt,
            notes.join("\n\n")
        )
    }
}

enum AttemptOutcome {
    Completed(OutputTable),
    Retry(Feedback),
    ProviderFailed { stage: TaskId, error: ProviderError },
}

/// Phase bookkeeping for one run.
struct Progress {
    phase: RunPhase,
    history: Vec<RunPhase>,
    audit: AuditLog,
}

impl Progress {
    fn new() -> Self {
        Self {
            phase: RunPhase::NotStarted,
            history: vec![RunPhase::NotStarted],
            audit: AuditLog::new(),
        }
    }

    fn enter(&mut self, phase: RunPhase) {
        tracing::debug!(from = %self.phase, to = %phase, "Run phase change");
        self.phase = phase;
        self.history.push(phase);
    }

    fn finish(self, outputs: OutputTable, attempts: u32) -> RunReport {
        RunReport {
            outputs,
            attempts,
            audit_log: self.audit,
            phase: self.phase,
            history: self.history,
        }
    }
}

/// Executes a [`TaskGraph`] with validation and bounded retry.
///
/// Holds no per-run state; one orchestrator can serve any number of sequential runs.
pub struct Orchestrator {
    roster: Roster,
    graph: TaskGraph,
    ledger: Arc<CostLedger>,
    checkpoint: Option<Checkpoint>,
    terminal_check: Option<Box<dyn TerminalCheck>>,
    max_attempts: u32,
    clarification: bool,
}

impl Orchestrator {
    /// # Errors
    /// `PipelineError::Agent` if a task's role has no agent in `roster`.
    pub fn new(
        roster: Roster,
        graph: TaskGraph,
        ledger: Arc<CostLedger>,
    ) -> Result<Self, PipelineError> {
        for task in graph.ordered() {
            roster.require(task.role)?;
        }
        Ok(Self {
            roster,
            graph,
            ledger,
            checkpoint: None,
            terminal_check: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            clarification: true,
        })
    }

    /// Validate `task`'s output with `rules` as soon as it is produced.
    pub fn with_checkpoint(mut self, task: impl Into<TaskId>, rules: RuleSet) -> Self {
        self.checkpoint = Some(Checkpoint {
            task: task.into(),
            rules,
        });
        self
    }

    pub fn with_terminal_check(mut self, check: impl TerminalCheck + 'static) -> Self {
        self.terminal_check = Some(Box::new(check));
        self
    }

    /// Attempt budget; clamped to at least one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Ask the checkpoint agent to explain its fix after a failed validation.
    pub fn with_clarification(mut self, enabled: bool) -> Self {
        self.clarification = enabled;
        self
    }

    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    /// Run the graph to completion.
    ///
    /// `inputs` supplies run-level placeholders such as `logline`.
    ///
    /// # Errors
    /// - Wiring problems (`MissingContext`, `UnknownCheckpoint`) before any dispatch
    /// - `AttemptsExhausted` when a provider call fails on the last attempt
    ///
    /// Validation failures never produce an error; the last attempt's output is
    /// returned and the failures are listed in the audit log.
    pub async fn run(
        &self,
        inputs: &BTreeMap<String, String>,
    ) -> Result<RunReport, PipelineError> {
        self.preflight(inputs)?;

        let mut progress = Progress::new();
        let mut feedback = FeedbackSet::default();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            progress.enter(RunPhase::RunningAttempt(attempt));
            tracing::info!(attempt, max_attempts = self.max_attempts, "Starting attempt");

            match self
                .run_attempt(attempt, inputs, &feedback, &mut progress)
                .await?
            {
                AttemptOutcome::Completed(outputs) => {
                    if let Some(notes) = self.terminal_feedback(&outputs) {
                        if attempt < self.max_attempts {
                            progress.audit.push(format!(
                                "Attempt {}: reviewer requested a revision: {}",
                                attempt, notes
                            ));
                            progress.enter(RunPhase::Retrying(attempt));
                            feedback.add(Feedback {
                                target: None,
                                notes,
                            });
                            continue;
                        }
                        progress.audit.push(format!(
                            "Attempt {}: reviewer requested a revision, but no attempts remain; \
                             keeping this draft",
                            attempt
                        ));
                    }

                    progress.enter(RunPhase::Succeeded);
                    tracing::info!(attempts = attempt, "Pipeline finished");
                    return Ok(progress.finish(outputs, attempt));
                }
                AttemptOutcome::Retry(next) => {
                    progress.enter(RunPhase::Retrying(attempt));
                    feedback.add(next);
                }
                AttemptOutcome::ProviderFailed { stage, error } => {
                    progress.audit.push(format!(
                        "Attempt {}: stage '{}' failed: {}",
                        attempt, stage, error
                    ));
                    if attempt >= self.max_attempts {
                        progress.enter(RunPhase::Failed);
                        tracing::error!(
                            stage = %stage,
                            attempts = attempt,
                            error = %error,
                            "Pipeline failed"
                        );
                        return Err(PipelineError::AttemptsExhausted {
                            stage,
                            attempts: attempt,
                            source: error,
                            audit_log: progress.audit,
                        });
                    }
                    progress.enter(RunPhase::Retrying(attempt));
                }
            }
        }
    }

    /// Reject graphs that could only fail, before anything is dispatched.
    fn preflight(&self, inputs: &BTreeMap<String, String>) -> Result<(), PipelineError> {
        if let Some(checkpoint) = &self.checkpoint {
            if !self.graph.contains(&checkpoint.task) {
                return Err(PipelineError::UnknownCheckpoint(checkpoint.task.clone()));
            }
        }
        let names: Vec<&str> = inputs.keys().map(String::as_str).collect();
        self.graph.check_wiring(&names)?;
        Ok(())
    }

    async fn run_attempt(
        &self,
        attempt: u32,
        inputs: &BTreeMap<String, String>,
        feedback: &FeedbackSet,
        progress: &mut Progress,
    ) -> Result<AttemptOutcome, PipelineError> {
        let mut outputs = OutputTable::new();

        for task in self.graph.ordered() {
            if let Some(dep) = task.dependencies.iter().find(|d| !outputs.contains(d)) {
                return Err(MissingContextError::new(&task.id, dep.as_str()).into());
            }

            let prompt = resolve(&task.id, &task.template, |name| {
                outputs
                    .by_name(name)
                    .or_else(|| inputs.get(name).map(String::as_str))
            })?;
            let prompt = feedback.append_to(&task.id, prompt);

            let agent = self.roster.require(task.role)?;
            tracing::info!(stage = %task.id, role = %task.role, attempt, "Dispatching stage");

            let completion = match agent.invoke(&prompt).await {
                Ok(completion) => completion,
                Err(error) => {
                    tracing::warn!(stage = %task.id, attempt, error = %error, "Stage failed");
                    return Ok(AttemptOutcome::ProviderFailed {
                        stage: task.id.clone(),
                        error,
                    });
                }
            };
            self.ledger.record(
                task.role,
                &completion.model,
                completion.usage,
                &prompt,
                &completion.text,
            );
            outputs.insert(task.id.clone(), completion.text.clone());

            let Some(checkpoint) = self.checkpoint.as_ref().filter(|c| c.task == task.id) else {
                continue;
            };

            progress.enter(RunPhase::Validating(attempt));
            let verdict = checkpoint.rules.validate(&completion.text);
            if verdict.is_valid() {
                tracing::info!(stage = %task.id, attempt, "Checkpoint passed validation");
            } else {
                let reasons = verdict.joined_reasons();
                if attempt < self.max_attempts {
                    progress.audit.push(format!(
                        "Attempt {}: '{}' failed validation: {}",
                        attempt, task.id, reasons
                    ));
                    let plan = self
                        .clarify(agent, attempt, &reasons, &completion.text, &mut progress.audit)
                        .await;
                    return Ok(AttemptOutcome::Retry(Feedback {
                        target: Some(task.id.clone()),
                        notes: corrective_notes(&reasons, plan.as_deref()),
                    }));
                }
                progress.audit.push(format!(
                    "Attempt {}: '{}' failed validation: {}; no attempts remain, \
                     continuing with best-effort output",
                    attempt, task.id, reasons
                ));
            }
            progress.enter(RunPhase::RunningAttempt(attempt));
        }

        Ok(AttemptOutcome::Completed(outputs))
    }

    /// One follow-up to the checkpoint agent. A failure here is logged, not raised.
    async fn clarify(
        &self,
        agent: &Agent,
        attempt: u32,
        reasons: &str,
        previous_output: &str,
        audit: &mut AuditLog,
    ) -> Option<String> {
        if !self.clarification {
            return None;
        }

        let request = prompts::clarification_request(reasons, previous_output);
        match agent.invoke(&request).await {
            Ok(reply) => {
                self.ledger
                    .record(agent.role(), &reply.model, reply.usage, &request, &reply.text);
                tracing::info!(role = %agent.role(), attempt, "Received clarification");
                Some(reply.text)
            }
            Err(e) => {
                audit.push(format!(
                    "Attempt {}: clarification request to {} failed: {}",
                    attempt,
                    agent.role(),
                    e
                ));
                None
            }
        }
    }

    fn terminal_feedback(&self, outputs: &OutputTable) -> Option<String> {
        let check = self.terminal_check.as_ref()?;
        let terminal = self.graph.terminal()?;
        check.revision_feedback(outputs.get(&terminal.id)?)
    }
}

fn corrective_notes(reasons: &str, plan: Option<&str>) -> String {
    let mut notes = format!("The previous draft was rejected: {}.", reasons);
    if let Some(plan) = plan {
        notes.push_str("\nYour own plan for fixing it:\n");
        notes.push_str(plan.trim());
    }
    notes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{AgentError, AgentRole, ModelBinding};
    use crate::llm::testing::ScriptedClient;
    use crate::llm::Provider;
    use crate::task::TaskSpec;

    const LOGLINE: &str =
        "Two estranged friends, both in their sixties, meet again at a crowded beach gazebo in the rain.";

    const GOOD_ANALYSIS: &str = "GENRE: drama\n\
        PROTAGONIST: Rocky, sixty-four, a retired lifeguard\n\
        CONFLICT: pride against longing\n\
        STAKES: the last chance to repair a forty-year friendship\n";

    const BAD_ANALYSIS: &str = "GENRE: drama\n\
        PROTAGONIST: Rocky, sixty-four, a retired lifeguard\n\
        CONFLICT: pride against longing and a lifetime of silence\n";

    fn agent(role: AgentRole, client: &Arc<ScriptedClient>) -> Agent {
        let binding = ModelBinding {
            provider: Provider::OpenAi,
            model: "gpt-4o".to_string(),
            temperature: 0.3,
            max_tokens: 500,
        };
        Agent::new(prompts::descriptor(role, binding), client.clone())
    }

    fn graph() -> TaskGraph {
        TaskGraph::new(vec![
            TaskSpec::new("analyze", AgentRole::Dramaturge, "Analyze: {{logline}}"),
            TaskSpec::new("outline", AgentRole::SceneArchitect, "Outline from:\n{{analyze}}")
                .depends_on("analyze"),
            TaskSpec::new("final", AgentRole::CreativeReviewer, "Review:\n{{outline}}")
                .depends_on("outline"),
        ])
        .unwrap()
    }

    fn inputs() -> BTreeMap<String, String> {
        BTreeMap::from([("logline".to_string(), LOGLINE.to_string())])
    }

    fn fade_in() -> ScriptedClient {
        ScriptedClient::new(Provider::Anthropic)
            .respond_with(|_| Ok("### FINAL SCENE\nFADE IN:".into()))
    }

    struct Room {
        dramaturge: Arc<ScriptedClient>,
        architect: Arc<ScriptedClient>,
        reviewer: Arc<ScriptedClient>,
        ledger: Arc<CostLedger>,
    }

    impl Room {
        fn new(dramaturge: ScriptedClient) -> Self {
            Self::with_stages(
                dramaturge,
                ScriptedClient::new(Provider::OpenAi)
                    .respond_with(|r| Ok(format!("OUTLINE <{}>", r.prompt()))),
                fade_in(),
            )
        }

        fn with_stages(
            dramaturge: ScriptedClient,
            architect: ScriptedClient,
            reviewer: ScriptedClient,
        ) -> Self {
            Self {
                dramaturge: Arc::new(dramaturge),
                architect: Arc::new(architect),
                reviewer: Arc::new(reviewer),
                ledger: Arc::new(CostLedger::new()),
            }
        }

        fn roster(&self) -> Roster {
            Roster::new()
                .with_agent(agent(AgentRole::Dramaturge, &self.dramaturge))
                .with_agent(agent(AgentRole::SceneArchitect, &self.architect))
                .with_agent(agent(AgentRole::CreativeReviewer, &self.reviewer))
        }

        fn orchestrator(&self) -> Orchestrator {
            Orchestrator::new(self.roster(), graph(), self.ledger.clone())
                .unwrap()
                .with_checkpoint("analyze", RuleSet::structural_analysis())
        }
    }

    fn assert_monotonic(report: &RunReport, max: u32) {
        let attempts: Vec<u32> = report.history.iter().filter_map(|p| p.attempt()).collect();
        assert!(attempts.windows(2).all(|w| w[0] <= w[1]), "{:?}", report.history);
        assert!(attempts.iter().all(|&n| (1..=max).contains(&n)));
    }

    #[tokio::test]
    async fn missing_stakes_is_retried_once() {
        let room = Room::new(
            ScriptedClient::new(Provider::OpenAi)
                .reply(BAD_ANALYSIS)
                .reply("I will add a dedicated stakes line.")
                .reply(GOOD_ANALYSIS),
        );

        let report = room.orchestrator().run(&inputs()).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.phase, RunPhase::Succeeded);
        assert_eq!(report.audit_log.len(), 1);
        assert!(report.audit_log.entries()[0].contains("stakes"));
        assert_eq!(report.output("analyze"), Some(GOOD_ANALYSIS));

        let requests = room.dramaturge.requests();
        assert_eq!(requests.len(), 3);
        assert!(requests[1].prompt().contains("did not pass review"));
        assert!(requests[2].prompt().contains(LOGLINE));
        assert!(requests[2].prompt().contains("I will add a dedicated stakes line."));

        // The rest of the chain only ran on the attempt that passed.
        assert_eq!(room.architect.call_count(), 1);
        assert!(room.architect.requests()[0].prompt().contains("STAKES: the last chance"));
        assert_eq!(room.reviewer.call_count(), 1);

        // analyze twice, clarification, outline, final
        assert_eq!(room.ledger.len(), 5);
        assert_monotonic(&report, 3);
    }

    #[tokio::test]
    async fn wiring_gap_is_raised_before_dispatch() {
        let room = Room::new(ScriptedClient::new(Provider::OpenAi).reply(GOOD_ANALYSIS));
        let graph = TaskGraph::new(vec![TaskSpec::new(
            "outline",
            AgentRole::SceneArchitect,
            "Outline from:\n{{analyze}}",
        )
        .depends_on("analyze")])
        .unwrap();

        let orchestrator = Orchestrator::new(room.roster(), graph, room.ledger.clone()).unwrap();
        let err = orchestrator.run(&inputs()).await.unwrap_err();

        match err {
            PipelineError::MissingContext(e) => {
                assert_eq!(e.placeholder, "{{analyze}}");
                assert_eq!(e.task.as_str(), "outline");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dispatched(&room), 0);
    }

    fn dispatched(room: &Room) -> usize {
        room.dramaturge.call_count() + room.architect.call_count() + room.reviewer.call_count()
    }

    #[tokio::test]
    async fn undeclared_placeholder_is_a_wiring_error() {
        let room = Room::new(ScriptedClient::new(Provider::OpenAi));
        let graph = TaskGraph::new(vec![TaskSpec::new(
            "analyze",
            AgentRole::Dramaturge,
            "Analyze {{logline}} in the style of {{house_style}}",
        )])
        .unwrap();

        let err = Orchestrator::new(room.roster(), graph, room.ledger.clone())
            .unwrap()
            .run(&inputs())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::MissingContext(ref e) if e.placeholder == "{{house_style}}"
        ));
        assert_eq!(dispatched(&room), 0);
    }

    #[tokio::test]
    async fn validation_failure_on_every_attempt_is_soft() {
        let room = Room::new(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(BAD_ANALYSIS.into())),
        );

        let report = room
            .orchestrator()
            .with_clarification(false)
            .run(&inputs())
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.phase, RunPhase::Succeeded);
        assert_eq!(report.audit_log.len(), 3);
        assert!(report.audit_log.entries()[2].contains("best-effort"));
        assert_eq!(report.output("analyze"), Some(BAD_ANALYSIS));
        assert!(report.output("final").is_some());
        assert_eq!(room.dramaturge.call_count(), 3);
        assert_eq!(room.architect.call_count(), 1);
        assert_monotonic(&report, 3);
    }

    #[tokio::test]
    async fn single_attempt_budget_never_retries() {
        let room = Room::new(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(BAD_ANALYSIS.into())),
        );

        let report = room
            .orchestrator()
            .with_max_attempts(1)
            .run(&inputs())
            .await
            .unwrap();

        assert_eq!(report.attempts, 1);
        assert_eq!(report.audit_log.len(), 1);
        assert_eq!(room.dramaturge.call_count(), 1);
        assert!(!report.history.iter().any(|p| matches!(p, RunPhase::Retrying(_))));
    }

    #[tokio::test]
    async fn failed_clarification_is_logged_and_retry_continues() {
        let room = Room::new(
            ScriptedClient::new(Provider::OpenAi)
                .reply(BAD_ANALYSIS)
                .fail(ProviderError::network_error("connection reset".into()))
                .reply(GOOD_ANALYSIS),
        );

        let report = room.orchestrator().run(&inputs()).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.audit_log.len(), 2);
        assert!(report.audit_log.entries()[1].contains("clarification request"));
        let retry_prompt = room.dramaturge.requests()[2].prompt().to_string();
        assert!(retry_prompt.contains("rejected"));
        assert!(!retry_prompt.contains("Your own plan"));
    }

    #[tokio::test]
    async fn provider_failure_consumes_an_attempt() {
        let room = Room::with_stages(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(GOOD_ANALYSIS.into())),
            ScriptedClient::new(Provider::OpenAi)
                .fail(ProviderError::server_error(503, "overloaded".into()))
                .respond_with(|_| Ok("OUTLINE".into())),
            fade_in(),
        );

        let report = room.orchestrator().run(&inputs()).await.unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.audit_log.len(), 1);
        assert!(report.audit_log.entries()[0].contains("'outline' failed"));
        // The chain restarted from the first task.
        assert_eq!(room.dramaturge.call_count(), 2);
        assert_eq!(room.reviewer.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_on_last_attempt_is_fatal() {
        let room = Room::with_stages(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(GOOD_ANALYSIS.into())),
            ScriptedClient::new(Provider::OpenAi)
                .respond_with(|_| Err(ProviderError::client_error(401, "bad key".into()))),
            ScriptedClient::new(Provider::Anthropic),
        );

        let err = room
            .orchestrator()
            .with_max_attempts(2)
            .run(&inputs())
            .await
            .unwrap_err();

        assert_eq!(err.attempts(), 2);
        let audit = err.audit_log().expect("a failed run keeps its audit log");
        assert_eq!(audit.len(), 2);
        assert!(audit.entries().iter().all(|e| e.contains("'outline' failed")));
        assert!(audit.entries()[1].starts_with("Attempt 2"));
        match err {
            PipelineError::AttemptsExhausted { stage, source, .. } => {
                assert_eq!(stage.as_str(), "outline");
                assert_eq!(source.status_code, Some(401));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(room.architect.call_count(), 2);
        assert_eq!(room.reviewer.call_count(), 0);
    }

    #[tokio::test]
    async fn terminal_revision_restarts_with_notes() {
        let room = Room::with_stages(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(GOOD_ANALYSIS.into())),
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok("OUTLINE".into())),
            ScriptedClient::new(Provider::Anthropic)
                .reply("REVISE: the ending is too neat")
                .reply("APPROVED"),
        );

        let report = room
            .orchestrator()
            .with_terminal_check(|out: &str| out.strip_prefix("REVISE: ").map(str::to_string))
            .run(&inputs())
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.output("final"), Some("APPROVED"));
        assert_eq!(report.audit_log.len(), 1);
        assert!(room.dramaturge.requests()[1].prompt().contains("the ending is too neat"));
        assert!(room.reviewer.requests()[1].prompt().contains("the ending is too neat"));
        assert!(!room.dramaturge.requests()[0].prompt().contains("NOTES FROM"));
    }

    #[tokio::test]
    async fn revision_notes_survive_a_later_checkpoint_retry() {
        let room = Room::with_stages(
            ScriptedClient::new(Provider::OpenAi)
                .reply(GOOD_ANALYSIS)
                .reply(BAD_ANALYSIS)
                .reply("I will add a dedicated stakes line.")
                .reply(GOOD_ANALYSIS),
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok("OUTLINE".into())),
            ScriptedClient::new(Provider::Anthropic)
                .reply("REVISE: the ending is too neat")
                .reply("APPROVED"),
        );

        let report = room
            .orchestrator()
            .with_terminal_check(|out: &str| out.strip_prefix("REVISE: ").map(str::to_string))
            .run(&inputs())
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.output("final"), Some("APPROVED"));
        assert_eq!(report.audit_log.len(), 2);

        let third_analysis = room.dramaturge.requests()[3].prompt().to_string();
        assert!(third_analysis.contains("the ending is too neat"));
        assert!(third_analysis.contains("rejected"));
        assert_eq!(third_analysis.matches("NOTES FROM THE PREVIOUS DRAFT").count(), 1);

        // Only the checkpoint gets the validation notes; the directive reaches everyone.
        let outline = room.architect.requests()[1].prompt().to_string();
        assert!(outline.contains("the ending is too neat"));
        assert!(!outline.contains("rejected"));
        assert!(room.reviewer.requests()[1].prompt().contains("the ending is too neat"));
    }

    #[tokio::test]
    async fn terminal_revision_stops_at_budget() {
        let room = Room::with_stages(
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok(GOOD_ANALYSIS.into())),
            ScriptedClient::new(Provider::OpenAi).respond_with(|_| Ok("OUTLINE".into())),
            ScriptedClient::new(Provider::Anthropic).respond_with(|_| Ok("REVISE: again".into())),
        );

        let report = room
            .orchestrator()
            .with_max_attempts(2)
            .with_terminal_check(|out: &str| out.strip_prefix("REVISE: ").map(str::to_string))
            .run(&inputs())
            .await
            .unwrap();

        assert_eq!(report.attempts, 2);
        assert_eq!(report.phase, RunPhase::Succeeded);
        assert_eq!(report.audit_log.len(), 2);
        assert!(report.audit_log.entries()[1].contains("no attempts remain"));
        assert_monotonic(&report, 2);
    }

    #[tokio::test]
    async fn tasks_run_in_dependency_order() {
        let room = Room::new(ScriptedClient::new(Provider::OpenAi).reply(GOOD_ANALYSIS));
        let reversed = TaskGraph::new(vec![
            TaskSpec::new("final", AgentRole::CreativeReviewer, "Review:\n{{outline}}")
                .depends_on("outline"),
            TaskSpec::new("outline", AgentRole::SceneArchitect, "Outline from:\n{{analyze}}")
                .depends_on("analyze"),
            TaskSpec::new("analyze", AgentRole::Dramaturge, "Analyze: {{logline}}"),
        ])
        .unwrap();

        let report = Orchestrator::new(room.roster(), reversed, room.ledger.clone())
            .unwrap()
            .run(&inputs())
            .await
            .unwrap();

        let order: Vec<_> = report.outputs.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(order, vec!["analyze", "outline", "final"]);
        assert!(room.architect.requests()[0].prompt().contains(GOOD_ANALYSIS));
        assert!(room.reviewer.requests()[0].prompt().contains("OUTLINE <Outline from:"));
        assert_eq!(room.ledger.len(), 3);
    }

    #[test]
    fn unassigned_role_fails_construction() {
        let room = Room::new(ScriptedClient::new(Provider::OpenAi));
        let roster = Roster::new().with_agent(agent(AgentRole::Dramaturge, &room.dramaturge));

        let err = Orchestrator::new(roster, graph(), room.ledger.clone()).err().unwrap();
        assert!(matches!(
            err,
            PipelineError::Agent(AgentError::MissingRole(AgentRole::SceneArchitect))
        ));
    }

    #[tokio::test]
    async fn unknown_checkpoint_is_rejected() {
        let room = Room::new(ScriptedClient::new(Provider::OpenAi));
        let err = Orchestrator::new(room.roster(), graph(), room.ledger.clone())
            .unwrap()
            .with_checkpoint("character_bible", RuleSet::structural_analysis())
            .run(&inputs())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownCheckpoint(_)));
    }
}
