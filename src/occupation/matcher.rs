use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use super::corpus::AlternateTitleEntry;
use crate::semantic::{EmbedBudget, EmbeddingProvider, cosine_similarity, embed_in_batches};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub position: String,
    pub entry: AlternateTitleEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct MatchOptions {
    pub top_n: usize,
    pub batch_size: usize,
    pub budget: Option<EmbedBudget>,
}

/// Best corpus entries per distinct position, highest score first.
#[derive(Debug, Clone, Default)]
pub struct MatchTable {
    by_position: BTreeMap<String, Vec<MatchResult>>,
}

impl MatchTable {
    /// Every distinct position with no candidates.
    pub fn unmatched(positions: &[String]) -> Self {
        Self {
            by_position: distinct_positions(positions)
                .into_iter()
                .map(|position| (position, Vec::new()))
                .collect(),
        }
    }

    pub fn matches(&self, position: &str) -> &[MatchResult] {
        self.by_position
            .get(position)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn best(&self, position: &str) -> Option<&MatchResult> {
        self.matches(position).first()
    }

    pub fn len(&self) -> usize {
        self.by_position.len()
    }
}

/// Ranks every corpus title against every distinct position by cosine
/// similarity. Embeddings come from one batched pass over positions followed
/// by corpus titles; ties keep corpus order.
pub fn match_positions(
    positions: &[String],
    corpus: &[AlternateTitleEntry],
    provider: &dyn EmbeddingProvider,
    options: MatchOptions,
) -> Result<MatchTable> {
    let distinct = distinct_positions(positions);
    if distinct.is_empty() || corpus.is_empty() || options.top_n == 0 {
        return Ok(MatchTable::unmatched(&distinct));
    }

    let mut texts = distinct.clone();
    texts.extend(corpus.iter().map(|entry| entry.alternate_title.clone()));
    let vectors = embed_in_batches(provider, &texts, options.batch_size, options.budget)?;
    let (position_vectors, title_vectors) = vectors.split_at(distinct.len());

    let mut by_position = BTreeMap::<String, Vec<MatchResult>>::new();
    for (position, position_vector) in distinct.iter().zip(position_vectors) {
        let mut scored = title_vectors
            .iter()
            .enumerate()
            .map(|(index, title_vector)| (index, cosine_similarity(position_vector, title_vector)))
            .collect::<Vec<(usize, f64)>>();
        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        let results = scored
            .into_iter()
            .take(options.top_n)
            .map(|(index, score)| MatchResult {
                position: position.clone(),
                entry: corpus[index].clone(),
                score,
            })
            .collect::<Vec<MatchResult>>();
        by_position.insert(position.clone(), results);
    }

    info!(
        positions = distinct.len(),
        corpus_entries = corpus.len(),
        top_n = options.top_n,
        "matched positions against alternate titles"
    );

    Ok(MatchTable { by_position })
}

/// Like [`match_positions`], but an embedding failure or budget overrun leaves
/// every position with an empty match list and returns the reason as a
/// warning instead of failing the run.
pub fn match_positions_or_skip(
    positions: &[String],
    corpus: &[AlternateTitleEntry],
    provider: &dyn EmbeddingProvider,
    options: MatchOptions,
) -> (MatchTable, Option<String>) {
    match match_positions(positions, corpus, provider, options) {
        Ok(table) => (table, None),
        Err(err) => {
            warn!(error = %err, positions = positions.len(), "occupation matching skipped");
            (
                MatchTable::unmatched(positions),
                Some(format!("occupation matching skipped: {err:#}")),
            )
        }
    }
}

fn distinct_positions(positions: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::<&str>::new();
    positions
        .iter()
        .filter(|position| seen.insert(position.as_str()))
        .cloned()
        .collect()
}
