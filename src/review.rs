//! Result assembler: splits the reviewer's reply into its sections.
//!
//! Parsing is total and pure. Any input, including empty or garbled text, yields a
//! [`ReviewSections`]; the same input always yields the same value.

use serde::{Deserialize, Serialize};

pub const CRITIQUE_MARKER: &str = "### SHOWRUNNER'S CRITIQUE";
pub const DIRECTIVE_MARKER: &str = "### REVISION DIRECTIVE";
pub const VERDICT_MARKER: &str = "### VERDICT";
pub const FINAL_SCENE_MARKER: &str = "### FINAL SCENE";

/// Placeholder for a section the reply did not contain.
pub const NOT_FOUND: &str = "not found";

/// Spellings accepted for each marker. Models often typeset the apostrophe.
const CRITIQUE_VARIANTS: &[&str] = &[CRITIQUE_MARKER, "### SHOWRUNNER\u{2019}S CRITIQUE"];
const DIRECTIVE_VARIANTS: &[&str] = &[DIRECTIVE_MARKER];
const VERDICT_VARIANTS: &[&str] = &[VERDICT_MARKER];
const FINAL_SCENE_VARIANTS: &[&str] = &[FINAL_SCENE_MARKER];

/// Reviewer's decision on whether the draft goes back through the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    Revise,
    /// Absent or unrecognised; never triggers a revision
    Unknown,
}

impl ReviewVerdict {
    fn parse(segment: &str) -> Self {
        let word: String = segment
            .trim_start_matches(|c: char| !c.is_alphabetic())
            .chars()
            .take_while(|c| c.is_alphabetic())
            .collect();
        match word.to_ascii_uppercase().as_str() {
            "APPROVED" | "APPROVE" => ReviewVerdict::Approved,
            "REVISE" | "REVISION" => ReviewVerdict::Revise,
            _ => ReviewVerdict::Unknown,
        }
    }

    pub fn requests_revision(&self) -> bool {
        matches!(self, ReviewVerdict::Revise)
    }
}

impl std::fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ReviewVerdict::Approved => "APPROVED",
            ReviewVerdict::Revise => "REVISE",
            ReviewVerdict::Unknown => "UNKNOWN",
        })
    }
}

/// Parsed reviewer reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSections {
    pub critique: String,
    pub directive: String,
    pub verdict: ReviewVerdict,
    pub final_scene: String,
    /// The final-scene marker was missing and the whole reply became the scene
    pub degraded: bool,
}

impl ReviewSections {
    /// Split `raw` on the section markers.
    ///
    /// Markers match ASCII case-insensitively, first occurrence only. Each section runs
    /// from its marker to the next marker found (by position) or the end of the text,
    /// trimmed. Without a final-scene marker the entire input is the scene and the
    /// critique and directive are [`NOT_FOUND`].
    pub fn parse(raw: &str) -> Self {
        let lower = raw.to_ascii_lowercase();

        let final_scene = find_marker(&lower, FINAL_SCENE_VARIANTS);
        let Some(final_scene) = final_scene else {
            return Self {
                critique: NOT_FOUND.to_string(),
                directive: NOT_FOUND.to_string(),
                verdict: ReviewVerdict::Unknown,
                final_scene: raw.to_string(),
                degraded: true,
            };
        };

        let critique = find_marker(&lower, CRITIQUE_VARIANTS);
        let directive = find_marker(&lower, DIRECTIVE_VARIANTS);
        let verdict = find_marker(&lower, VERDICT_VARIANTS);

        let found: Vec<Span> = [Some(final_scene), critique, directive, verdict]
            .into_iter()
            .flatten()
            .collect();

        let section = |span: Option<Span>| -> Option<String> {
            span.map(|s| {
                let end = found
                    .iter()
                    .map(|other| other.start)
                    .filter(|&start| start > s.start)
                    .min()
                    .unwrap_or(raw.len());
                // A marker nested inside another marker's span cannot start before it ends.
                let end = end.max(s.end);
                raw[s.end..end].trim().to_string()
            })
        };

        Self {
            critique: section(critique).unwrap_or_else(|| NOT_FOUND.to_string()),
            directive: section(directive).unwrap_or_else(|| NOT_FOUND.to_string()),
            verdict: section(verdict)
                .map(|v| ReviewVerdict::parse(&v))
                .unwrap_or(ReviewVerdict::Unknown),
            final_scene: section(Some(final_scene)).unwrap_or_default(),
            degraded: false,
        }
    }

    pub fn has_critique(&self) -> bool {
        self.critique != NOT_FOUND
    }

    pub fn has_directive(&self) -> bool {
        self.directive != NOT_FOUND
    }
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
}

/// Earliest occurrence of any variant in the lowercased text.
fn find_marker(lower: &str, variants: &[&str]) -> Option<Span> {
    variants
        .iter()
        .filter_map(|variant| {
            let needle = variant.to_ascii_lowercase();
            lower.find(&needle).map(|start| Span {
                start,
                end: start + needle.len(),
            })
        })
        .min_by_key(|span| span.start)
}
