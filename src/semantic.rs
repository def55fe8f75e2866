use std::sync::OnceLock;
use std::time::Instant;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::util::{normalize_whitespace, sha256_hex};

mod store;

pub use store::{CacheStats, CachedEmbedder, count_cached_embeddings, ensure_model_entry, open_embedding_store};

pub const DEFAULT_MODEL_ID: &str = "title-hash-v1";
pub const DEFAULT_MODEL_NAME: &str = "hashed-word-ngram-384";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_NORMALIZATION: &str = "l2";
pub const DEFAULT_BACKEND: &str = "local-hash-v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub model_name: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

pub fn resolve_model_config(model_id: &str) -> SemanticModelConfig {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    if resolved_id == DEFAULT_MODEL_ID {
        return SemanticModelConfig {
            model_id: DEFAULT_MODEL_ID.to_string(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            dimensions: DEFAULT_EMBEDDING_DIM,
            normalization: DEFAULT_NORMALIZATION.to_string(),
            backend: DEFAULT_BACKEND.to_string(),
        };
    }

    SemanticModelConfig {
        model_id: resolved_id.to_string(),
        model_name: resolved_id.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: DEFAULT_NORMALIZATION.to_string(),
        backend: DEFAULT_BACKEND.to_string(),
    }
}

/// Batched, order-preserving text embedding.
pub trait EmbeddingProvider {
    fn model(&self) -> &SemanticModelConfig;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

pub struct LocalHashEmbedder {
    model: SemanticModelConfig,
}

impl LocalHashEmbedder {
    pub fn new(model: SemanticModelConfig) -> Self {
        Self { model }
    }
}

impl EmbeddingProvider for LocalHashEmbedder {
    fn model(&self) -> &SemanticModelConfig {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| embed_text_local(text, self.model.dimensions))
            .collect())
    }
}

/// Embedding handle whose backend is built on first use and reused for the
/// rest of the process.
pub struct LazyEmbedder {
    model: SemanticModelConfig,
    backend: OnceLock<LocalHashEmbedder>,
}

impl LazyEmbedder {
    pub fn new(model: SemanticModelConfig) -> Self {
        Self {
            model,
            backend: OnceLock::new(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.get().is_some()
    }

    fn backend(&self) -> &LocalHashEmbedder {
        self.backend.get_or_init(|| {
            info!(
                model_id = %self.model.model_id,
                backend = %self.model.backend,
                dimensions = self.model.dimensions,
                "initializing embedding backend"
            );
            LocalHashEmbedder::new(self.model.clone())
        })
    }
}

impl EmbeddingProvider for LazyEmbedder {
    fn model(&self) -> &SemanticModelConfig {
        &self.model
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.backend().embed(texts)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbedBudget {
    started: Instant,
    timeout_ms: u64,
}

impl EmbedBudget {
    /// A zero timeout disables the budget.
    pub fn new(timeout_ms: u64) -> Option<Self> {
        if timeout_ms == 0 {
            return None;
        }
        Some(Self {
            started: Instant::now(),
            timeout_ms,
        })
    }

    fn elapsed_ms(self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }

    pub fn enforce(self, stage: &str) -> Result<()> {
        let elapsed_ms = self.elapsed_ms();
        if elapsed_ms <= self.timeout_ms as f64 {
            return Ok(());
        }

        bail!(
            "embedding timed out during {stage}: elapsed {:.1}ms exceeds {}ms",
            elapsed_ms,
            self.timeout_ms
        );
    }
}

fn enforce_budget(budget: Option<EmbedBudget>, stage: &str) -> Result<()> {
    if let Some(budget) = budget {
        budget.enforce(stage)?;
    }
    Ok(())
}

/// Embeds `texts` in provider calls of at most `batch_size` items
/// (`0` sends everything in one call), checking the budget between calls.
pub fn embed_in_batches(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
    budget: Option<EmbedBudget>,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = if batch_size == 0 {
        texts.len().max(1)
    } else {
        batch_size
    };

    let mut out = Vec::<Vec<f32>>::with_capacity(texts.len());
    for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
        enforce_budget(budget, "embedding batch")?;
        let vectors = provider.embed(batch)?;
        if vectors.len() != batch.len() {
            bail!(
                "embedding provider returned {} vectors for {} texts",
                vectors.len(),
                batch.len()
            );
        }
        debug!(batch_index, batch_len = batch.len(), "embedded batch");
        out.extend(vectors);
    }
    enforce_budget(budget, "embedding completion")?;

    Ok(out)
}

pub fn embedding_text_hash(payload: &str) -> String {
    sha256_hex(&normalize_whitespace(payload))
}

pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];
    let tokens = tokenize_payload(payload);

    if tokens.is_empty() {
        return vector;
    }

    for (token, base_weight) in tokens {
        let hash = stable_hash(&token);
        let index = (hash as usize) % dims;
        let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
        let weight = base_weight * (1.0 + (((hash >> 48) & 0xFF) as f32 / 255.0));
        vector[index] += sign * weight;
    }

    normalize_vector(&mut vector);
    vector
}

/// Cosine similarity in `[-1, 1]`; mismatched or zero vectors score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let (left_value, right_value) = (f64::from(*left_value), f64::from(*right_value));
        dot += left_value * right_value;
        left_norm += left_value * left_value;
        right_norm += right_value * right_value;
    }

    if left_norm <= 0.0 || right_norm <= 0.0 {
        return 0.0;
    }

    dot / (left_norm.sqrt() * right_norm.sqrt())
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let mut out = Vec::<f32>::with_capacity(expected_dim);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }

    if out.len() == expected_dim {
        Some(out)
    } else {
        None
    }
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Word unigrams and bigrams carry the meaning of a title; character
/// trigrams at lower weight let "Engineer" and "Engineering" overlap.
fn tokenize_payload(payload: &str) -> Vec<(String, f32)> {
    let normalized = normalize_whitespace(payload);
    if normalized.is_empty() {
        return Vec::new();
    }

    let words = normalized
        .split(' ')
        .map(|value| {
            value
                .chars()
                .filter(|character| character.is_alphanumeric())
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>();

    if words.is_empty() {
        return Vec::new();
    }

    let mut features = Vec::<(String, f32)>::with_capacity(words.len() * 6);
    for (index, word) in words.iter().enumerate() {
        features.push((format!("w:{word}"), 1.0));
        if let Some(next) = words.get(index + 1) {
            features.push((format!("b:{word}_{next}"), 0.75));
        }

        let padded = format!("#{word}#").chars().collect::<Vec<char>>();
        for window in padded.windows(3) {
            features.push((format!("t:{}", window.iter().collect::<String>()), 0.35));
        }
    }
    features
}

fn normalize_vector(values: &mut [f32]) {
    let squared_norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>();

    if squared_norm <= 0.0 {
        return;
    }

    let norm = squared_norm.sqrt() as f32;
    if norm == 0.0 {
        return;
    }

    for value in values {
        *value /= norm;
    }
}
