//! Scene archive trait and the in-memory backend.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::embed::Embedder;
use super::types::{cosine_similarity, top_k, SceneRecord, ScoredScene};

/// Similarity-indexed, append-only archive of finished scenes.
///
/// Written once per successful run; reads serve future runs and never steer the run
/// that is in progress.
#[async_trait]
pub trait SceneMemory: Send + Sync {
    async fn store(&self, record: &SceneRecord) -> anyhow::Result<()>;

    /// Up to `k` scenes closest to `query`, most similar first.
    async fn retrieve_similar(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredScene>>;

    /// Up to `k` scenes tagged with `genre` (case-insensitive), most similar to the genre first.
    async fn genre_examples(&self, genre: &str, k: usize) -> anyhow::Result<Vec<SceneRecord>>;

    /// Up to `k` scenes that needed at most one retry, newest first.
    async fn successful_patterns(&self, k: usize) -> anyhow::Result<Vec<SceneRecord>>;

    async fn count(&self) -> anyhow::Result<usize>;
}

pub(crate) fn genre_query(genre: &str) -> String {
    format!("genre {} story structure character", genre)
}

/// Volatile archive; contents vanish with the process.
pub struct InMemorySceneStore {
    embedder: Arc<dyn Embedder>,
    scenes: RwLock<Vec<(SceneRecord, Vec<f32>)>>,
}

impl InMemorySceneStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            scenes: RwLock::new(Vec::new()),
        }
    }

    async fn ranked(
        &self,
        query: &str,
        filter: impl Fn(&SceneRecord) -> bool + Send,
    ) -> anyhow::Result<Vec<ScoredScene>> {
        let query_vec = self.embedder.embed(query).await?;
        let scenes = self.scenes.read().await;
        Ok(scenes
            .iter()
            .filter(|(record, _)| filter(record))
            .map(|(record, vector)| ScoredScene {
                record: record.clone(),
                score: cosine_similarity(&query_vec, vector),
            })
            .collect())
    }
}

#[async_trait]
impl SceneMemory for InMemorySceneStore {
    async fn store(&self, record: &SceneRecord) -> anyhow::Result<()> {
        let vector = self.embedder.embed(&record.search_text()).await?;
        self.scenes.write().await.push((record.clone(), vector));
        Ok(())
    }

    async fn retrieve_similar(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredScene>> {
        Ok(top_k(self.ranked(query, |_| true).await?, k))
    }

    async fn genre_examples(&self, genre: &str, k: usize) -> anyhow::Result<Vec<SceneRecord>> {
        let wanted = genre.to_lowercase();
        let scored = self
            .ranked(&genre_query(genre), move |r| r.genre.to_lowercase() == wanted)
            .await?;
        Ok(top_k(scored, k).into_iter().map(|s| s.record).collect())
    }

    async fn successful_patterns(&self, k: usize) -> anyhow::Result<Vec<SceneRecord>> {
        let scenes = self.scenes.read().await;
        let mut records: Vec<SceneRecord> = scenes
            .iter()
            .map(|(record, _)| record)
            .filter(|r| r.is_successful_pattern())
            .cloned()
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records.truncate(k);
        Ok(records)
    }

    async fn count(&self) -> anyhow::Result<usize> {
        Ok(self.scenes.read().await.len())
    }
}
