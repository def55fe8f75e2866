use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use tracing::debug;

use super::{
    EmbeddingProvider, SemanticModelConfig, decode_embedding_blob, embedding_text_hash,
    encode_embedding_blob,
};
use crate::util::{ensure_parent_directory, now_utc_string};

pub fn open_embedding_store(db_path: &Path) -> Result<Connection> {
    ensure_parent_directory(db_path)?;
    let connection = Connection::open(db_path)
        .with_context(|| format!("failed to open embedding cache {}", db_path.display()))?;

    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL for embedding cache")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL for embedding cache")?;

    ensure_embedding_schema(&connection)?;
    Ok(connection)
}

pub fn ensure_embedding_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS embedding_models (
              model_id TEXT PRIMARY KEY,
              backend TEXT NOT NULL,
              model_name TEXT NOT NULL,
              dimensions INTEGER NOT NULL,
              normalize INTEGER NOT NULL,
              created_at TEXT NOT NULL,
              config_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS title_embeddings (
              model_id TEXT NOT NULL,
              text_hash TEXT NOT NULL,
              embedding BLOB NOT NULL,
              embedding_dim INTEGER NOT NULL,
              generated_at TEXT NOT NULL,
              PRIMARY KEY(model_id, text_hash),
              FOREIGN KEY(model_id) REFERENCES embedding_models(model_id)
            );
            ",
        )
        .context("failed to ensure embedding cache schema")
}

pub fn ensure_model_entry(connection: &Connection, model: &SemanticModelConfig) -> Result<()> {
    let created_at = now_utc_string();
    let config_json = serde_json::json!({
        "model_id": model.model_id,
        "model_name": model.model_name,
        "dimensions": model.dimensions,
        "normalization": model.normalization,
        "backend": model.backend,
    })
    .to_string();

    connection.execute(
        "
        INSERT INTO embedding_models(model_id, backend, model_name, dimensions, normalize, created_at, config_json)
        VALUES(?1, ?2, ?3, ?4, 1, ?5, ?6)
        ON CONFLICT(model_id) DO UPDATE SET
          backend=excluded.backend,
          model_name=excluded.model_name,
          dimensions=excluded.dimensions,
          normalize=excluded.normalize,
          config_json=excluded.config_json
        ",
        params![
            model.model_id,
            model.backend,
            model.model_name,
            model.dimensions as i64,
            created_at,
            config_json,
        ],
    )?;

    Ok(())
}

pub fn count_cached_embeddings(connection: &Connection, model: &SemanticModelConfig) -> Result<usize> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM title_embeddings WHERE model_id = ?1 AND embedding_dim = ?2",
        params![model.model_id, model.dimensions as i64],
        |row| row.get(0),
    )?;
    Ok(count.max(0) as usize)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub cache_hits: usize,
    pub computed: usize,
}

/// Read-through cache in front of another provider, keyed by model id and
/// the hash of the whitespace-normalized text.
pub struct CachedEmbedder<'a> {
    inner: &'a dyn EmbeddingProvider,
    connection: &'a Connection,
    refresh: bool,
    cache_hits: Cell<usize>,
    computed: Cell<usize>,
}

impl<'a> CachedEmbedder<'a> {
    pub fn new(inner: &'a dyn EmbeddingProvider, connection: &'a Connection) -> Self {
        Self {
            inner,
            connection,
            refresh: false,
            cache_hits: Cell::new(0),
            computed: Cell::new(0),
        }
    }

    /// Recompute and overwrite every requested embedding.
    pub fn refreshing(mut self) -> Self {
        self.refresh = true;
        self
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            cache_hits: self.cache_hits.get(),
            computed: self.computed.get(),
        }
    }

    fn load_cached(&self, hashes: &[String]) -> Result<HashMap<String, Vec<f32>>> {
        let model = self.inner.model();
        let mut resolved = HashMap::<String, Vec<f32>>::new();
        if self.refresh {
            return Ok(resolved);
        }

        let mut statement = self.connection.prepare_cached(
            "
            SELECT embedding
            FROM title_embeddings
            WHERE model_id = ?1 AND text_hash = ?2 AND embedding_dim = ?3
            LIMIT 1
            ",
        )?;

        for hash in hashes {
            if resolved.contains_key(hash) {
                continue;
            }
            let blob = statement
                .query_row(
                    params![model.model_id, hash, model.dimensions as i64],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .optional()?;
            if let Some(vector) = blob.and_then(|blob| decode_embedding_blob(&blob, model.dimensions)) {
                resolved.insert(hash.clone(), vector);
            }
        }

        Ok(resolved)
    }

    fn store(&self, rows: &[(String, Vec<f32>)]) -> Result<()> {
        let model = self.inner.model();
        let generated_at = now_utc_string();
        let tx = self.connection.unchecked_transaction()?;
        {
            let mut statement = tx.prepare_cached(
                "
                INSERT INTO title_embeddings(model_id, text_hash, embedding, embedding_dim, generated_at)
                VALUES(?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(model_id, text_hash) DO UPDATE SET
                  embedding=excluded.embedding,
                  embedding_dim=excluded.embedding_dim,
                  generated_at=excluded.generated_at
                ",
            )?;
            for (hash, vector) in rows {
                statement.execute(params![
                    model.model_id,
                    hash,
                    encode_embedding_blob(vector),
                    vector.len() as i64,
                    generated_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }
}

impl EmbeddingProvider for CachedEmbedder<'_> {
    fn model(&self) -> &SemanticModelConfig {
        self.inner.model()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let hashes = texts
            .iter()
            .map(|text| embedding_text_hash(text))
            .collect::<Vec<String>>();
        let mut resolved = self.load_cached(&hashes)?;
        let hits = hashes
            .iter()
            .filter(|hash| resolved.contains_key(*hash))
            .count();

        let mut seen = HashSet::<&str>::new();
        let mut miss_texts = Vec::<String>::new();
        let mut miss_hashes = Vec::<String>::new();
        for (text, hash) in texts.iter().zip(hashes.iter()) {
            if resolved.contains_key(hash) || !seen.insert(hash.as_str()) {
                continue;
            }
            miss_texts.push(text.clone());
            miss_hashes.push(hash.clone());
        }

        if !miss_texts.is_empty() {
            let vectors = self.inner.embed(&miss_texts)?;
            if vectors.len() != miss_texts.len() {
                bail!(
                    "embedding provider returned {} vectors for {} texts",
                    vectors.len(),
                    miss_texts.len()
                );
            }
            let rows = miss_hashes
                .into_iter()
                .zip(vectors)
                .collect::<Vec<(String, Vec<f32>)>>();
            self.store(&rows)?;
            resolved.extend(rows);
        }

        self.cache_hits.set(self.cache_hits.get() + hits);
        self.computed.set(self.computed.get() + miss_texts.len());
        debug!(hits, computed = miss_texts.len(), "embedding cache batch");

        hashes
            .iter()
            .map(|hash| {
                resolved
                    .get(hash)
                    .cloned()
                    .with_context(|| format!("no embedding resolved for text hash {hash}"))
            })
            .collect()
    }
}
