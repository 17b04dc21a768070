//! Relational storage backend
//!
//! A SQL store with a vector-index extension (HNSW over an embedding
//! column) and a full-text column with a generalized inverted index.
//! Hybrid search runs both ranked queries and fuses the weighted scores
//! in process, so fused scores mean the same thing as on the embedded
//! backend.

use crate::backend::{SearchHit, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::filters::{FilterValue, Filters};
use crate::meta::EmbeddingMetadata;
use crate::scoring;
use agent_brain_common::{RetryPolicy, retry_with_backoff};
use agent_brain_config::{DistanceMetric, PostgresConfig};
use agent_brain_ingest::{Chunk, SourceType};
use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use std::collections::HashMap;

/// Storage backend over Postgres with the `vector` extension
pub struct PostgresBackend {
    pool: PgPool,
    metric: DistanceMetric,
    hnsw_m: u32,
    hnsw_ef_construction: u32,
}

impl PostgresBackend {
    /// Connect a pool against the configured database
    ///
    /// # Errors
    /// Returns `StorageError::Unavailable` when the pool cannot connect.
    pub async fn connect(config: &PostgresConfig, metric: DistanceMetric) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            pool,
            metric,
            hnsw_m: config.hnsw_m,
            hnsw_ef_construction: config.hnsw_ef_construction,
        })
    }

    /// The distance operator for the configured metric
    const fn distance_operator(&self) -> &'static str {
        match self.metric {
            DistanceMetric::Cosine => "<=>",
            DistanceMetric::L2 => "<->",
            DistanceMetric::InnerProduct => "<#>",
        }
    }

    /// The HNSW operator class for the configured metric
    const fn operator_class(&self) -> &'static str {
        match self.metric {
            DistanceMetric::Cosine => "vector_cosine_ops",
            DistanceMetric::L2 => "vector_l2_ops",
            DistanceMetric::InnerProduct => "vector_ip_ops",
        }
    }

    /// Translate filters into SQL predicates with positional binds
    ///
    /// Returns the predicate fragment (starting with ` AND ...` or empty)
    /// and the bind values, beginning at placeholder `$start`.
    fn filter_sql(filters: &Filters, start: usize) -> (String, Vec<FilterBind>) {
        let mut sql = String::new();
        let mut binds = Vec::new();
        let mut position = start;
        for (key, value) in &filters.0 {
            match value {
                FilterValue::Eq(v) => {
                    sql.push_str(&format!(" AND {key} = ${position}"));
                    binds.push(FilterBind::Text(v.clone()));
                }
                FilterValue::In(vs) => {
                    sql.push_str(&format!(" AND {key} = ANY(${position})"));
                    binds.push(FilterBind::List(vs.clone()));
                }
            }
            position += 1;
        }
        (sql, binds)
    }

    async fn fetch_hits(
        &self,
        sql: &str,
        embedding: Option<String>,
        text: Option<String>,
        binds: Vec<FilterBind>,
        limit: i64,
    ) -> StorageResult<Vec<(Chunk, f32)>> {
        let rows = retry_with_backoff(RetryPolicy::default(), StorageError::is_transient, || {
            let mut query = sqlx::query(sql);
            if let Some(embedding) = &embedding {
                query = query.bind(embedding.clone());
            }
            if let Some(text) = &text {
                query = query.bind(text.clone());
            }
            for bind in &binds {
                query = match bind {
                    FilterBind::Text(v) => query.bind(v.clone()),
                    FilterBind::List(vs) => query.bind(vs.clone()),
                };
            }
            query = query.bind(limit);
            let pool = self.pool.clone();
            async move { query.fetch_all(&pool).await.map_err(StorageError::from) }
        })
        .await?;

        rows.iter().map(row_to_hit).collect()
    }
}

enum FilterBind {
    Text(String),
    List(Vec<String>),
}

const CHUNK_COLUMNS: &str = "chunk_id, source_path, chunk_index, text, summary, source_type, \
                             language, symbol_type, symbol_name, start_line, end_line, metadata";

fn row_to_hit(row: &PgRow) -> StorageResult<(Chunk, f32)> {
    let source_type: String = row.try_get("source_type")?;
    let source_type = if source_type == "code" {
        SourceType::Code
    } else {
        SourceType::Document
    };
    let metadata_json: String = row.try_get("metadata")?;
    let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

    let chunk = Chunk {
        chunk_id: row.try_get("chunk_id")?,
        source_path: row.try_get("source_path")?,
        text: row.try_get("text")?,
        embedding: None,
        source_type,
        language: row.try_get("language")?,
        symbol_type: row.try_get("symbol_type")?,
        symbol_name: row.try_get("symbol_name")?,
        chunk_index: usize::try_from(row.try_get::<i32, _>("chunk_index")?).unwrap_or(0),
        start_line: usize::try_from(row.try_get::<i32, _>("start_line")?).unwrap_or(0),
        end_line: usize::try_from(row.try_get::<i32, _>("end_line")?).unwrap_or(0),
        summary: row.try_get("summary")?,
        metadata,
    };
    let score: f32 = row.try_get("score")?;
    Ok((chunk, score))
}

/// Render an embedding in the `vector` extension's text format
fn vector_literal(embedding: &[f32]) -> String {
    let mut out = String::with_capacity(embedding.len() * 8 + 2);
    out.push('[');
    for (i, v) in embedding.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{v}"));
    }
    out.push(']');
    out
}

#[async_trait]
impl StorageBackend for PostgresBackend {
    async fn initialize(&self, embedding_dim: usize, embedding_model: &str) -> StorageResult<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await?;

        let create_chunks = format!(
            "CREATE TABLE IF NOT EXISTS chunks (
                chunk_id TEXT PRIMARY KEY,
                source_path TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                text TEXT NOT NULL,
                summary TEXT,
                source_type TEXT NOT NULL,
                language TEXT,
                symbol_type TEXT,
                symbol_name TEXT,
                start_line INTEGER NOT NULL DEFAULT 0,
                end_line INTEGER NOT NULL DEFAULT 0,
                metadata TEXT NOT NULL DEFAULT '{{}}',
                embedding vector({embedding_dim}) NOT NULL,
                text_search tsvector GENERATED ALWAYS AS (to_tsvector('english', text)) STORED,
                UNIQUE (source_path, chunk_index)
            )"
        );
        sqlx::query(&create_chunks).execute(&self.pool).await?;

        let create_hnsw = format!(
            "CREATE INDEX IF NOT EXISTS chunks_embedding_idx ON chunks \
             USING hnsw (embedding {}) WITH (m = {}, ef_construction = {})",
            self.operator_class(),
            self.hnsw_m,
            self.hnsw_ef_construction
        );
        sqlx::query(&create_hnsw).execute(&self.pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS chunks_text_search_idx ON chunks USING gin (text_search)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS embedding_meta (
                id INTEGER PRIMARY KEY DEFAULT 1 CHECK (id = 1),
                model TEXT NOT NULL,
                dimension INTEGER NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
        )
        .execute(&self.pool)
        .await?;

        // Validate the singleton against the configured model, writing it
        // on first initialization.
        match self.embedding_metadata().await? {
            Some(meta) => meta.validate(embedding_model, embedding_dim)?,
            None => {
                sqlx::query("INSERT INTO embedding_meta (id, model, dimension) VALUES (1, $1, $2)")
                    .bind(embedding_model)
                    .bind(i32::try_from(embedding_dim).unwrap_or(i32::MAX))
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    async fn upsert(&self, chunks: &[Chunk]) -> StorageResult<usize> {
        let mut tx = self.pool.begin().await?;
        for chunk in chunks {
            let embedding = chunk
                .embedding
                .as_deref()
                .map(vector_literal)
                .ok_or_else(|| {
                    StorageError::Other(format!("chunk {} has no embedding", chunk.chunk_id))
                })?;
            sqlx::query(
                "INSERT INTO chunks (chunk_id, source_path, chunk_index, text, summary, \
                                     source_type, language, symbol_type, symbol_name, \
                                     start_line, end_line, metadata, embedding) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13::vector) \
                 ON CONFLICT (source_path, chunk_index) DO UPDATE SET \
                     chunk_id = EXCLUDED.chunk_id, \
                     text = EXCLUDED.text, \
                     summary = EXCLUDED.summary, \
                     source_type = EXCLUDED.source_type, \
                     language = EXCLUDED.language, \
                     symbol_type = EXCLUDED.symbol_type, \
                     symbol_name = EXCLUDED.symbol_name, \
                     start_line = EXCLUDED.start_line, \
                     end_line = EXCLUDED.end_line, \
                     metadata = EXCLUDED.metadata, \
                     embedding = EXCLUDED.embedding",
            )
            .bind(&chunk.chunk_id)
            .bind(&chunk.source_path)
            .bind(i32::try_from(chunk.chunk_index).unwrap_or(i32::MAX))
            .bind(&chunk.text)
            .bind(&chunk.summary)
            .bind(chunk.source_type.to_string())
            .bind(&chunk.language)
            .bind(&chunk.symbol_type)
            .bind(&chunk.symbol_name)
            .bind(i32::try_from(chunk.start_line).unwrap_or(0))
            .bind(i32::try_from(chunk.end_line).unwrap_or(0))
            .bind(serde_json::to_string(&chunk.metadata)?)
            .bind(embedding)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(chunks.len())
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;
        if let Some(meta) = self.embedding_metadata().await? {
            if query_embedding.len() != meta.dimension {
                return Err(StorageError::QueryDimension {
                    expected: meta.dimension,
                    actual: query_embedding.len(),
                });
            }
        }

        let (filter_sql, binds) = Self::filter_sql(filters, 2);
        let limit_pos = 2 + binds.len();
        let operator = self.distance_operator();
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, (embedding {operator} $1::vector)::float4 AS score \
             FROM chunks WHERE TRUE{filter_sql} \
             ORDER BY embedding {operator} $1::vector ASC, chunk_id ASC \
             LIMIT ${limit_pos}"
        );

        let raw = self
            .fetch_hits(
                &sql,
                Some(vector_literal(query_embedding)),
                None,
                binds,
                i64::try_from(top_k).unwrap_or(i64::MAX),
            )
            .await?;

        // The operator yields a distance (negative inner product for <#>);
        // normalize into the shared [0, 1] scale and re-sort canonically.
        let mut scored: Vec<(String, f32)> = raw
            .iter()
            .map(|(chunk, distance)| {
                let raw_value = match self.metric {
                    DistanceMetric::InnerProduct => -*distance,
                    DistanceMetric::Cosine | DistanceMetric::L2 => *distance,
                };
                (
                    chunk.chunk_id.clone(),
                    scoring::normalize_vector_score(self.metric, raw_value),
                )
            })
            .collect();
        scoring::sort_hits(&mut scored);

        let by_id: HashMap<String, Chunk> = raw
            .into_iter()
            .map(|(chunk, _)| (chunk.chunk_id.clone(), chunk))
            .collect();
        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).map(|chunk| SearchHit {
                chunk: chunk.clone(),
                score,
            }))
            .collect())
    }

    async fn keyword_search(
        &self,
        query_text: &str,
        top_k: usize,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;

        let (filter_sql, binds) = Self::filter_sql(filters, 2);
        let limit_pos = 2 + binds.len();
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, \
                    ts_rank(text_search, plainto_tsquery('english', $1))::float4 AS score \
             FROM chunks \
             WHERE text_search @@ plainto_tsquery('english', $1){filter_sql} \
             ORDER BY score DESC, chunk_id ASC \
             LIMIT ${limit_pos}"
        );

        let raw = self
            .fetch_hits(
                &sql,
                None,
                Some(query_text.to_string()),
                binds,
                i64::try_from(top_k).unwrap_or(i64::MAX),
            )
            .await?;

        let mut scored: Vec<(String, f32)> = raw
            .iter()
            .map(|(chunk, score)| (chunk.chunk_id.clone(), *score))
            .collect();
        scoring::normalize_keyword_scores(&mut scored);
        scoring::sort_hits(&mut scored);

        let by_id: HashMap<String, Chunk> = raw
            .into_iter()
            .map(|(chunk, _)| (chunk.chunk_id.clone(), chunk))
            .collect();
        Ok(scored
            .into_iter()
            .filter_map(|(id, score)| by_id.get(&id).map(|chunk| SearchHit {
                chunk: chunk.clone(),
                score,
            }))
            .collect())
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        top_k: usize,
        alpha: f32,
        filters: &Filters,
    ) -> StorageResult<Vec<SearchHit>> {
        filters.validate()?;

        if alpha >= 1.0 {
            return self.vector_search(query_embedding, top_k, filters).await;
        }
        if alpha <= 0.0 {
            return self.keyword_search(query_text, top_k, filters).await;
        }

        let overfetch = top_k.saturating_mul(2).max(top_k);
        let (vector, keyword) = tokio::join!(
            self.vector_search(query_embedding, overfetch, filters),
            self.keyword_search(query_text, overfetch, filters),
        );
        let vector = vector?;
        let keyword = keyword?;

        let mut chunks: HashMap<String, Chunk> = HashMap::new();
        let mut combined: HashMap<String, (f32, f32)> = HashMap::new();
        for hit in vector {
            combined.entry(hit.chunk.chunk_id.clone()).or_default().0 = hit.score;
            chunks.insert(hit.chunk.chunk_id.clone(), hit.chunk);
        }
        for hit in keyword {
            combined.entry(hit.chunk.chunk_id.clone()).or_default().1 = hit.score;
            chunks.entry(hit.chunk.chunk_id.clone()).or_insert(hit.chunk);
        }

        let mut fused: Vec<(String, f32)> = combined
            .into_iter()
            .map(|(id, (v, k))| (id, alpha * v + (1.0 - alpha) * k))
            .collect();
        scoring::sort_hits(&mut fused);
        fused.truncate(top_k);

        Ok(fused
            .into_iter()
            .filter_map(|(id, score)| chunks.remove(&id).map(|chunk| SearchHit { chunk, score }))
            .collect())
    }

    async fn get_by_ids(&self, chunk_ids: &[String]) -> StorageResult<Vec<Chunk>> {
        if chunk_ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, 0.0::float4 AS score FROM chunks \
             WHERE chunk_id = ANY($1) ORDER BY chunk_id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(chunk_ids.to_vec())
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row_to_hit(row).map(|(chunk, _)| chunk))
            .collect()
    }

    async fn list_chunks(&self, filters: &Filters) -> StorageResult<Vec<Chunk>> {
        filters.validate()?;
        let (filter_sql, binds) = Self::filter_sql(filters, 1);
        let sql = format!(
            "SELECT {CHUNK_COLUMNS}, 0.0::float4 AS score FROM chunks \
             WHERE TRUE{filter_sql} ORDER BY chunk_id ASC"
        );
        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = match bind {
                FilterBind::Text(v) => query.bind(v.clone()),
                FilterBind::List(vs) => query.bind(vs.clone()),
            };
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row_to_hit(row).map(|(chunk, _)| chunk))
            .collect()
    }

    async fn delete_by_source(&self, source_path: &str) -> StorageResult<usize> {
        let result = sqlx::query("DELETE FROM chunks WHERE source_path = $1")
            .bind(source_path)
            .execute(&self.pool)
            .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(0))
    }

    async fn reset(&self) -> StorageResult<()> {
        sqlx::query("TRUNCATE chunks").execute(&self.pool).await?;
        sqlx::query("DELETE FROM embedding_meta")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_count(&self, filters: &Filters) -> StorageResult<usize> {
        filters.validate()?;
        let (filter_sql, binds) = Self::filter_sql(filters, 1);
        let sql = format!("SELECT COUNT(*) AS count FROM chunks WHERE TRUE{filter_sql}");

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = match bind {
                FilterBind::Text(v) => query.bind(v.clone()),
                FilterBind::List(vs) => query.bind(vs.clone()),
            };
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn embedding_metadata(&self) -> StorageResult<Option<EmbeddingMetadata>> {
        let row = sqlx::query("SELECT model, dimension, created_at FROM embedding_meta WHERE id = 1")
            .fetch_optional(&self.pool)
            .await;
        let row = match row {
            Ok(row) => row,
            // The singleton table does not exist before initialize.
            Err(sqlx::Error::Database(_)) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(row.map(|row| {
            let dimension: i32 = row.try_get("dimension").unwrap_or(0);
            EmbeddingMetadata {
                model: row.try_get("model").unwrap_or_default(),
                dimension: usize::try_from(dimension).unwrap_or(0),
                created_at: row.try_get("created_at").unwrap_or_else(|_| chrono::Utc::now()),
            }
        }))
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_literal_matches_extension_format() {
        assert_eq!(vector_literal(&[1.0, -0.5, 0.25]), "[1,-0.5,0.25]");
        assert_eq!(vector_literal(&[]), "[]");
    }

    #[test]
    fn filter_sql_numbers_placeholders_in_order() {
        let filters = Filters::from_pairs([
            ("language".to_string(), FilterValue::Eq("rust".to_string())),
            (
                "source_type".to_string(),
                FilterValue::In(vec!["code".to_string()]),
            ),
        ]);
        let (sql, binds) = PostgresBackend::filter_sql(&filters, 2);
        assert_eq!(sql, " AND language = $2 AND source_type = ANY($3)");
        assert_eq!(binds.len(), 2);
    }

    #[tokio::test]
    async fn metric_operators() {
        // Operator strings drive both search and index creation SQL; pin them.
        let cases = [
            (DistanceMetric::Cosine, "<=>", "vector_cosine_ops"),
            (DistanceMetric::L2, "<->", "vector_l2_ops"),
            (DistanceMetric::InnerProduct, "<#>", "vector_ip_ops"),
        ];
        for (metric, operator, class) in cases {
            let backend = PostgresBackend {
                pool: PgPoolOptions::new().connect_lazy("postgres://localhost/x").unwrap(),
                metric,
                hnsw_m: 16,
                hnsw_ef_construction: 64,
            };
            assert_eq!(backend.distance_operator(), operator);
            assert_eq!(backend.operator_class(), class);
        }
    }
}
