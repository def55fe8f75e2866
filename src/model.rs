use serde::{Deserialize, Serialize};

use crate::layout::{ContactFields, MalformedLayoutError};
use crate::occupation::{FlaggedRecord, OccupationGroup};
use crate::tenure::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRef {
    pub alternate_title: String,
    pub occupation_code: String,
}

/// One row per date period of a position.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExperienceRow {
    pub position: String,
    pub company: String,
    pub start: String,
    pub end: String,
    pub duration: String,
    #[serde(rename = "match")]
    pub matched: Option<MatchRef>,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub report_version: u32,
    pub generated_at: String,
    pub contact: ContactFields,
    pub experience: Vec<ExperienceRow>,
    pub total_experience: Duration,
    pub occupation_groups: Vec<OccupationGroup>,
    pub unmatched_positions: Vec<String>,
    pub skipped_line_count: usize,
    pub skipped_lines: Vec<MalformedLayoutError>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPaths {
    pub input_path: String,
    pub cache_root: String,
    pub db_path: String,
    pub report_path: String,
    pub summary_path: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisCounts {
    pub line_count: usize,
    pub companies: usize,
    pub positions: usize,
    pub distinct_positions: usize,
    pub date_periods: usize,
    pub unparseable_periods: usize,
    pub skipped_lines: usize,
    pub corpus_entries: usize,
    pub occupation_records: usize,
    pub occupation_groups: usize,
    pub cache_hits: usize,
    pub computed_embeddings: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub duration_ms: u128,
    pub model_id: String,
    pub top_n: usize,
    pub today: String,
    pub input_sha256: String,
    pub paths: AnalysisPaths,
    pub counts: AnalysisCounts,
    pub flagged_corpus_records: Vec<FlaggedRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub generated_at: String,
    pub model_id: String,
    pub model_name: String,
    pub embedding_dim: usize,
    pub normalization: String,
    pub backend: String,
    pub refresh_mode: String,
    pub source_path: String,
    pub source_sha256: String,
    pub corpus_entries: usize,
    pub distinct_titles: usize,
    pub cache_hits: usize,
    pub computed_embeddings: usize,
    pub cached_rows_after: usize,
    pub batch_size: usize,
    pub duration_ms: u128,
    pub status: String,
    pub flagged_records: Vec<FlaggedRecord>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SemanticModelConfigLock {
    pub manifest_version: u32,
    pub model_id: String,
    pub model_name: String,
    pub embedding_dim: usize,
    pub normalization: String,
    pub runtime_backend: String,
    pub created_at: String,
    pub checksum: String,
}
