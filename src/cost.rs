//! Cost bookkeeping for mixed-provider runs.
//!
//! Prices live in a static table in nanodollars per token (1 USD = 1_000_000_000
//! nanodollars) so sums stay exact. The [`CostLedger`] is append-only and has no
//! influence on control flow.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::AgentRole;
use crate::llm::TokenUsage;

const NANOS_PER_USD: f64 = 1_000_000_000.0;

/// Model pricing in nanodollars per token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelPricing {
    pub input_nano_per_token: u64,
    pub output_nano_per_token: u64,
}

impl ModelPricing {
    /// Build from the usual "USD per 1K tokens" quote, e.g. `0.003` → 3_000 nano/token.
    const fn per_1k_micros(input_micro_usd: u64, output_micro_usd: u64) -> Self {
        // $X per 1K tokens = X * 1_000_000 nano per token; inputs are in micro-USD per 1K.
        Self {
            input_nano_per_token: input_micro_usd,
            output_nano_per_token: output_micro_usd,
        }
    }
}

/// Map versioned or aliased model names onto price-table keys.
fn normalize_model(model: &str) -> &str {
    let trimmed = model.trim();
    match trimmed {
        s if s.contains("claude-3-5-sonnet") || s.contains("claude-3.5-sonnet") => {
            "claude-3-5-sonnet"
        }
        s if s.contains("claude-3-5-haiku") || s.contains("claude-3.5-haiku") => "claude-3-5-haiku",
        s if s.contains("claude-3-haiku") => "claude-3-haiku",
        s if s.contains("claude-3-opus") => "claude-3-opus",
        s if s.contains("gpt-4o-mini") => "gpt-4o-mini",
        s if s.contains("gpt-4o") => "gpt-4o",
        s if s.contains("gpt-4-turbo") => "gpt-4-turbo",
        s if s.contains("gpt-4") => "gpt-4",
        _ => trimmed,
    }
}

/// Pricing for a model, or `None` if it is not in the table.
pub fn pricing_for_model(model: &str) -> Option<ModelPricing> {
    // Quotes in micro-USD per 1K tokens, which equals nanodollars per token.
    match normalize_model(model) {
        // $0.03 / $0.06 per 1K
        "gpt-4" => Some(ModelPricing::per_1k_micros(30_000, 60_000)),
        // $0.01 / $0.03 per 1K
        "gpt-4-turbo" => Some(ModelPricing::per_1k_micros(10_000, 30_000)),
        // $0.01 / $0.03 per 1K
        "gpt-4o" => Some(ModelPricing::per_1k_micros(10_000, 30_000)),
        // $0.00015 / $0.0006 per 1K
        "gpt-4o-mini" => Some(ModelPricing::per_1k_micros(150, 600)),
        // $0.003 / $0.015 per 1K
        "claude-3-5-sonnet" => Some(ModelPricing::per_1k_micros(3_000, 15_000)),
        // $0.0008 / $0.004 per 1K
        "claude-3-5-haiku" => Some(ModelPricing::per_1k_micros(800, 4_000)),
        // $0.00025 / $0.00125 per 1K
        "claude-3-haiku" => Some(ModelPricing::per_1k_micros(250, 1_250)),
        // $0.015 / $0.075 per 1K
        "claude-3-opus" => Some(ModelPricing::per_1k_micros(15_000, 75_000)),
        _ => None,
    }
}

/// Rough token count: about four characters per token.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.len() as u64 + 3) / 4
}

/// One recorded model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostEntry {
    pub role: AgentRole,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Token counts came from the provider rather than estimation
    pub reported: bool,
    pub input_cost_nano: u64,
    pub output_cost_nano: u64,
    pub timestamp: DateTime<Utc>,
}

impl CostEntry {
    pub fn total_cost_nano(&self) -> u64 {
        self.input_cost_nano.saturating_add(self.output_cost_nano)
    }

    pub fn input_cost(&self) -> f64 {
        self.input_cost_nano as f64 / NANOS_PER_USD
    }

    pub fn output_cost(&self) -> f64 {
        self.output_cost_nano as f64 / NANOS_PER_USD
    }

    /// Total in USD.
    pub fn total_cost(&self) -> f64 {
        self.total_cost_nano() as f64 / NANOS_PER_USD
    }
}

/// Append-only record of every model call in a run.
///
/// Constructed by the caller and handed to the orchestrator; never a process global.
#[derive(Debug, Default)]
pub struct CostLedger {
    entries: Mutex<Vec<CostEntry>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call. Uses provider-reported usage when present, otherwise estimates
    /// from the prompt and reply text. Unknown models are recorded at zero cost.
    pub fn record(
        &self,
        role: AgentRole,
        model: &str,
        usage: Option<TokenUsage>,
        prompt: &str,
        output: &str,
    ) -> CostEntry {
        let (input_tokens, output_tokens, reported) = match usage {
            Some(u) if u.total_tokens > 0 => (u.prompt_tokens, u.completion_tokens, true),
            _ => (estimate_tokens(prompt), estimate_tokens(output), false),
        };

        let (input_cost_nano, output_cost_nano) = match pricing_for_model(model) {
            Some(pricing) => (
                input_tokens.saturating_mul(pricing.input_nano_per_token),
                output_tokens.saturating_mul(pricing.output_nano_per_token),
            ),
            None => {
                tracing::warn!(model = %model, "Unknown model for cost calculation, using 0 cost");
                (0, 0)
            }
        };

        let entry = CostEntry {
            role,
            model: model.to_string(),
            input_tokens,
            output_tokens,
            reported,
            input_cost_nano,
            output_cost_nano,
            timestamp: Utc::now(),
        };

        tracing::info!(
            role = %role,
            model = %model,
            input_tokens,
            output_tokens,
            cost_usd = entry.total_cost(),
            "Recorded model call cost"
        );

        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry.clone());
        }
        entry
    }

    pub fn entries(&self) -> Vec<CostEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total across all calls, in USD.
    pub fn total_cost(&self) -> f64 {
        total_of(&self.entries())
    }

    /// Per-model totals in USD.
    pub fn cost_by_model(&self) -> BTreeMap<String, f64> {
        by_model(&self.entries())
    }

    /// Entries recorded after the first `mark` ones; pair with [`CostLedger::len`] taken
    /// before a run to isolate that run's calls.
    pub fn entries_since(&self, mark: usize) -> Vec<CostEntry> {
        self.entries
            .lock()
            .map(|e| e.get(mark..).map(<[CostEntry]>::to_vec).unwrap_or_default())
            .unwrap_or_default()
    }

    /// Human-readable breakdown, one line per call plus per-model and grand totals.
    pub fn summary_lines(&self) -> Vec<String> {
        let entries = self.entries();
        if entries.is_empty() {
            return vec!["No costs tracked.".to_string()];
        }

        let mut lines: Vec<String> = entries
            .iter()
            .map(|e| {
                format!(
                    "{} ({}): ${:.4} ({} in + {} out tokens{})",
                    e.role,
                    e.model,
                    e.total_cost(),
                    e.input_tokens,
                    e.output_tokens,
                    if e.reported { "" } else { ", estimated" }
                )
            })
            .collect();

        for (model, cost) in self.cost_by_model() {
            lines.push(format!("{}: ${:.4}", model, cost));
        }
        lines.push(format!("TOTAL: ${:.4}", self.total_cost()));
        lines
    }
}

/// Sum of `entries` in USD.
pub fn total_of(entries: &[CostEntry]) -> f64 {
    let nanos: u64 = entries.iter().map(CostEntry::total_cost_nano).sum();
    nanos as f64 / NANOS_PER_USD
}

/// Per-model sums of `entries` in USD.
pub fn by_model(entries: &[CostEntry]) -> BTreeMap<String, f64> {
    let mut nanos: BTreeMap<String, u64> = BTreeMap::new();
    for entry in entries {
        *nanos.entry(entry.model.clone()).or_default() += entry.total_cost_nano();
    }
    nanos
        .into_iter()
        .map(|(model, n)| (model, n as f64 / NANOS_PER_USD))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_model() {
        assert_eq!(normalize_model("claude-3-5-sonnet-20241022"), "claude-3-5-sonnet");
        assert_eq!(normalize_model("claude-3-haiku-20240307"), "claude-3-haiku");
        assert_eq!(normalize_model("gpt-4o-2024-08-06"), "gpt-4o");
        assert_eq!(normalize_model("gpt-4o-mini"), "gpt-4o-mini");
        assert_eq!(normalize_model("gpt-4-0613"), "gpt-4");
    }

    #[test]
    fn test_pricing_table() {
        assert_eq!(
            pricing_for_model("claude-3-5-sonnet-20241022"),
            Some(ModelPricing {
                input_nano_per_token: 3_000,
                output_nano_per_token: 15_000
            })
        );
        assert!(pricing_for_model("unknown-model-xyz").is_none());
    }

    #[test]
    fn reported_usage_is_priced_exactly() {
        let ledger = CostLedger::new();
        // gpt-4: 1000 in at $0.03/1K + 500 out at $0.06/1K = $0.06
        let entry = ledger.record(
            AgentRole::Dramaturge,
            "gpt-4",
            Some(TokenUsage::new(1000, 500)),
            "ignored",
            "ignored",
        );
        assert!(entry.reported);
        assert_eq!(entry.total_cost_nano(), 60_000_000);
        assert!((ledger.total_cost() - 0.06).abs() < 1e-12);
    }

    #[test]
    fn missing_usage_falls_back_to_estimation() {
        let ledger = CostLedger::new();
        let entry = ledger.record(AgentRole::DialogueSpecialist, "gpt-4o", None, "abcdefgh", "abc");
        assert!(!entry.reported);
        assert_eq!(entry.input_tokens, 2);
        assert_eq!(entry.output_tokens, 1);
    }

    #[test]
    fn unknown_model_costs_nothing_but_is_recorded() {
        let ledger = CostLedger::new();
        ledger.record(
            AgentRole::CreativeReviewer,
            "mystery-model",
            Some(TokenUsage::new(10, 10)),
            "",
            "",
        );
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.total_cost(), 0.0);
    }

    #[test]
    fn cost_by_model_groups_calls() {
        let ledger = CostLedger::new();
        ledger.record(AgentRole::Dramaturge, "gpt-4o", Some(TokenUsage::new(1000, 0)), "", "");
        ledger.record(AgentRole::SceneArchitect, "gpt-4o", Some(TokenUsage::new(1000, 0)), "", "");
        ledger.record(
            AgentRole::CharacterCreator,
            "claude-3-5-sonnet-20241022",
            Some(TokenUsage::new(0, 1000)),
            "",
            "",
        );

        let by_model = ledger.cost_by_model();
        assert!((by_model["gpt-4o"] - 0.02).abs() < 1e-12);
        assert!((by_model["claude-3-5-sonnet-20241022"] - 0.015).abs() < 1e-12);

        let summary = ledger.summary_lines();
        assert_eq!(summary.len(), 3 + 2 + 1);
        assert_eq!(summary.last().map(String::as_str), Some("TOTAL: $0.0350"));
    }

    #[test]
    fn entries_since_isolates_a_run() {
        let ledger = CostLedger::new();
        ledger.record(AgentRole::Dramaturge, "gpt-4", Some(TokenUsage::new(1000, 0)), "", "");
        let mark = ledger.len();
        ledger.record(AgentRole::Dramaturge, "gpt-4o", Some(TokenUsage::new(1000, 0)), "", "");

        let run = ledger.entries_since(mark);
        assert_eq!(run.len(), 1);
        assert!((total_of(&run) - 0.01).abs() < 1e-12);
        assert!(by_model(&run).contains_key("gpt-4o"));
        assert!(ledger.entries_since(10).is_empty());
    }

    #[test]
    fn empty_ledger_summary() {
        assert_eq!(CostLedger::new().summary_lines(), vec!["No costs tracked."]);
    }
}
