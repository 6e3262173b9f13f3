//! Types for the scene archive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Genres recognised in a structural analysis, checked in this order.
pub const KNOWN_GENRES: [&str; 10] = [
    "drama", "comedy", "thriller", "horror", "romance", "action", "sci-fi", "fantasy", "mystery",
    "western",
];

pub const DEFAULT_GENRE: &str = "drama";

/// Highest retry count a run may have and still count as a successful pattern.
pub const SUCCESSFUL_RETRY_LIMIT: u32 = 1;

/// Serializable snapshot of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneRecord {
    pub id: Uuid,
    pub logline: String,
    pub structural_analysis: String,
    pub character_bible: Option<String>,
    pub scene_outline: String,
    pub dialogue: String,
    pub critique: String,
    pub revision_directive: String,
    pub final_scene: String,
    pub genre: String,
    /// Attempts beyond the first
    pub retry_count: u32,
    pub total_cost: f64,
    pub created_at: DateTime<Utc>,
}

impl SceneRecord {
    /// Text indexed for similarity search.
    pub fn search_text(&self) -> String {
        let mut text = format!(
            "Logline: {}\nStructure: {}\n",
            self.logline, self.structural_analysis
        );
        if let Some(bible) = &self.character_bible {
            text.push_str(&format!("Characters: {}\n", bible));
        }
        text.push_str(&format!(
            "Outline: {}\nDialogue: {}\nReview: {}",
            self.scene_outline, self.dialogue, self.critique
        ));
        text
    }

    pub fn is_successful_pattern(&self) -> bool {
        self.retry_count <= SUCCESSFUL_RETRY_LIMIT
    }
}

/// A record with its similarity to a query (cosine, higher is closer).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredScene {
    pub record: SceneRecord,
    pub score: f32,
}

/// First known genre mentioned in the analysis, or [`DEFAULT_GENRE`].
pub fn extract_genre(structural_analysis: &str) -> String {
    let lower = structural_analysis.to_lowercase();
    KNOWN_GENRES
        .iter()
        .find(|genre| lower.contains(*genre))
        .copied()
        .unwrap_or(DEFAULT_GENRE)
        .to_string()
}

/// Cosine similarity; zero when either vector is empty, zero-length, or the sizes differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Keep the `k` best-scoring scenes, highest first; ties keep insertion order.
pub(crate) fn top_k(mut scored: Vec<ScoredScene>, k: usize) -> Vec<ScoredScene> {
    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

#[cfg(test)]
pub(crate) fn sample_record(logline: &str, analysis: &str, retry_count: u32) -> SceneRecord {
    SceneRecord {
        id: Uuid::new_v4(),
        logline: logline.to_string(),
        structural_analysis: analysis.to_string(),
        character_bible: None,
        scene_outline: "outline".to_string(),
        dialogue: "dialogue".to_string(),
        critique: "critique".to_string(),
        revision_directive: "directive".to_string(),
        final_scene: "FADE IN:".to_string(),
        genre: extract_genre(analysis),
        retry_count,
        total_cost: 0.0,
        created_at: Utc::now(),
    }
}
