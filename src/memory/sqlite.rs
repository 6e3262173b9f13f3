//! SQLite-backed scene archive with stored embedding vectors.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::embed::Embedder;
use super::store::{genre_query, SceneMemory};
use super::types::{cosine_similarity, top_k, SceneRecord, ScoredScene, SUCCESSFUL_RETRY_LIMIT};

const SCHEMA: &str = r#"
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS scenes (
    id TEXT PRIMARY KEY NOT NULL,
    logline TEXT NOT NULL,
    structural_analysis TEXT NOT NULL,
    character_bible TEXT,
    scene_outline TEXT NOT NULL,
    dialogue TEXT NOT NULL,
    critique TEXT NOT NULL,
    revision_directive TEXT NOT NULL,
    final_scene TEXT NOT NULL,
    genre TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    total_cost REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    embedding TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_scenes_genre ON scenes(genre);
CREATE INDEX IF NOT EXISTS idx_scenes_created_at ON scenes(created_at DESC);
"#;

const SELECT_COLUMNS: &str = "id, logline, structural_analysis, character_bible, scene_outline, \
     dialogue, critique, revision_directive, final_scene, genre, retry_count, total_cost, \
     created_at, embedding";

pub const DB_FILE: &str = "scenes.db";

pub struct SqliteSceneStore {
    conn: Arc<Mutex<Connection>>,
    embedder: Arc<dyn Embedder>,
}

impl SqliteSceneStore {
    /// Open (or create) `scenes.db` under `dir`.
    pub async fn open(dir: &Path, embedder: Arc<dyn Embedder>) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create memory dir {}: {}", dir.display(), e))?;

        let path = dir.join(DB_FILE);
        let db_path = path.clone();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&db_path)?;
            conn.execute_batch(SCHEMA)?;
            Ok::<_, rusqlite::Error>(conn)
        })
        .await??;

        tracing::info!(path = %path.display(), "Opened scene memory");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            embedder,
        })
    }

    async fn query_records(
        &self,
        sql_tail: &'static str,
        genre: Option<String>,
    ) -> anyhow::Result<Vec<(SceneRecord, Vec<f32>)>> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            let sql = format!("SELECT {} FROM scenes {}", SELECT_COLUMNS, sql_tail);
            let mut stmt = conn.prepare(&sql)?;
            let rows = match genre {
                Some(g) => stmt
                    .query_map(params![g], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?,
                None => stmt
                    .query_map([], row_to_record)?
                    .collect::<Result<Vec<_>, _>>()?,
            };
            Ok::<_, anyhow::Error>(rows)
        })
        .await?
    }

    async fn rank(
        &self,
        query: &str,
        candidates: Vec<(SceneRecord, Vec<f32>)>,
        k: usize,
    ) -> anyhow::Result<Vec<ScoredScene>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let query_vec = self.embedder.embed(query).await?;
        let scored = candidates
            .into_iter()
            .map(|(record, vector)| ScoredScene {
                score: cosine_similarity(&query_vec, &vector),
                record,
            })
            .collect();
        Ok(top_k(scored, k))
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<(SceneRecord, Vec<f32>)> {
    let id: String = row.get(0)?;
    let created_at: String = row.get(12)?;
    let embedding: String = row.get(13)?;

    let record = SceneRecord {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        logline: row.get(1)?,
        structural_analysis: row.get(2)?,
        character_bible: row.get(3)?,
        scene_outline: row.get(4)?,
        dialogue: row.get(5)?,
        critique: row.get(6)?,
        revision_directive: row.get(7)?,
        final_scene: row.get(8)?,
        genre: row.get(9)?,
        retry_count: row.get::<_, i64>(10)?.max(0) as u32,
        total_cost: row.get(11)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    };
    let vector: Vec<f32> = serde_json::from_str(&embedding).unwrap_or_default();
    Ok((record, vector))
}

#[async_trait]
impl SceneMemory for SqliteSceneStore {
    async fn store(&self, record: &SceneRecord) -> anyhow::Result<()> {
        let vector = self.embedder.embed(&record.search_text()).await?;
        let embedding = serde_json::to_string(&vector)?;
        let record = record.clone();
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT OR REPLACE INTO scenes (id, logline, structural_analysis, character_bible,
                     scene_outline, dialogue, critique, revision_directive, final_scene, genre,
                     retry_count, total_cost, created_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id.to_string(),
                    record.logline,
                    record.structural_analysis,
                    record.character_bible,
                    record.scene_outline,
                    record.dialogue,
                    record.critique,
                    record.revision_directive,
                    record.final_scene,
                    record.genre,
                    record.retry_count as i64,
                    record.total_cost,
                    record.created_at.to_rfc3339(),
                    embedding,
                ],
            )?;
            Ok::<_, rusqlite::Error>(())
        })
        .await??;

        tracing::info!("Scene stored successfully in memory");
        Ok(())
    }

    async fn retrieve_similar(&self, query: &str, k: usize) -> anyhow::Result<Vec<ScoredScene>> {
        let candidates = self.query_records("", None).await?;
        let hits = self.rank(query, candidates, k).await?;
        tracing::info!(hits = hits.len(), "Retrieved similar scenes");
        Ok(hits)
    }

    async fn genre_examples(&self, genre: &str, k: usize) -> anyhow::Result<Vec<SceneRecord>> {
        let candidates = self
            .query_records("WHERE lower(genre) = ?1", Some(genre.to_lowercase()))
            .await?;
        let hits = self.rank(&genre_query(genre), candidates, k).await?;
        Ok(hits.into_iter().map(|s| s.record).collect())
    }

    async fn successful_patterns(&self, k: usize) -> anyhow::Result<Vec<SceneRecord>> {
        let limit = SUCCESSFUL_RETRY_LIMIT;
        let mut records: Vec<SceneRecord> = self
            .query_records("ORDER BY created_at DESC", None)
            .await?
            .into_iter()
            .map(|(record, _)| record)
            .filter(|r| r.retry_count <= limit)
            .collect();
        records.truncate(k);
        Ok(records)
    }

    async fn count(&self) -> anyhow::Result<usize> {
        let conn = self.conn.clone();
        let count = tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            conn.query_row("SELECT COUNT(*) FROM scenes", [], |row| row.get::<_, i64>(0))
        })
        .await??;
        Ok(count.max(0) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embed::HashingEmbedder;
    use crate::memory::types::sample_record;

    async fn open(dir: &Path) -> SqliteSceneStore {
        SqliteSceneStore::open(dir, Arc::new(HashingEmbedder::default()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = sample_record("Two friends at a gazebo", "GENRE: drama", 1);
        record.character_bible = Some("ROCKY: wants to confess".to_string());
        record.total_cost = 0.042;

        {
            let store = open(dir.path()).await;
            store.store(&record).await.unwrap();
        }

        let store = open(dir.path()).await;
        assert_eq!(store.count().await.unwrap(), 1);
        let hits = store.retrieve_similar("gazebo friends", 3).await.unwrap();
        assert_eq!(hits.len(), 1);
        let stored = &hits[0].record;
        assert_eq!(stored.id, record.id);
        assert_eq!(stored.character_bible, record.character_bible);
        assert_eq!(stored.retry_count, 1);
        assert!((stored.total_cost - 0.042).abs() < 1e-12);
    }

    #[tokio::test]
    async fn ranks_by_similarity() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store
            .store(&sample_record("A robot heist on a space station", "GENRE: sci-fi", 0))
            .await
            .unwrap();
        store
            .store(&sample_record("Estranged friends in the rain on a beach", "GENRE: drama", 0))
            .await
            .unwrap();

        let hits = store.retrieve_similar("rain beach friends", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].record.logline.contains("beach"));
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn genre_and_pattern_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = open(dir.path()).await;
        store.store(&sample_record("a", "GENRE: western", 0)).await.unwrap();
        store.store(&sample_record("b", "GENRE: western", 4)).await.unwrap();
        store.store(&sample_record("c", "GENRE: horror", 0)).await.unwrap();

        assert_eq!(store.genre_examples("Western", 5).await.unwrap().len(), 2);
        assert!(store.genre_examples("romance", 5).await.unwrap().is_empty());

        let patterns = store.successful_patterns(10).await.unwrap();
        assert_eq!(patterns.len(), 2);
        assert!(patterns.iter().all(|r| r.retry_count <= 1));
    }
}
