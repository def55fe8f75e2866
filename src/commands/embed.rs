use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use super::{distinct_titles, load_corpus, resolve_db_path};
use crate::cli::{EmbedArgs, EmbedRefreshMode};
use crate::model::{EmbeddingRunManifest, SemanticModelConfigLock};
use crate::semantic::{
    CachedEmbedder, LocalHashEmbedder, SemanticModelConfig, count_cached_embeddings,
    embed_in_batches, ensure_model_entry, open_embedding_store, resolve_model_config,
};
use crate::util::{
    ensure_directory, ensure_parent_directory, now_utc_string, sha256_file, sha256_hex,
    utc_compact_string, write_json_pretty,
};

const SEMANTIC_MODEL_CONFIG_LOCK_PATH: &str =
    "manifests/semantic_model_config.lock.json";

pub fn run(args: EmbedArgs) -> Result<()> {
    let batch_size = args.batch_size.max(1);
    let model = resolve_model_config(&args.model_id);

    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());
    let manifest_dir = args.cache_root.join("manifests");
    ensure_directory(&manifest_dir)?;
    let semantic_model_lock_path = args
        .semantic_model_lock_path
        .clone()
        .unwrap_or_else(|| default_lock_path(&args.cache_root));

    let corpus = load_corpus(&args.corpus)?;
    let source_sha256 = sha256_file(&args.corpus.alternate_titles)?;
    let titles = distinct_titles(&corpus);

    let connection = open_embedding_store(&db_path)?;
    ensure_model_entry(&connection, &model)?;
    write_semantic_model_config_lockfile(&model, &semantic_model_lock_path)?;

    let started_at = now_utc_string();
    let started = Instant::now();
    let run_id = format!("embed-{}", utc_compact_string(Utc::now()));
    let mut warnings = Vec::<String>::new();

    let backend = LocalHashEmbedder::new(model.clone());
    let mut cached = CachedEmbedder::new(&backend, &connection);
    if args.refresh_mode == EmbedRefreshMode::Full {
        cached = cached.refreshing();
    }

    embed_in_batches(&cached, &titles, batch_size, None)?;
    let stats = cached.stats();
    let cached_rows_after = count_cached_embeddings(&connection, &model)?;

    if titles.is_empty() {
        warnings.push("alternate-title corpus produced no titles".to_string());
    }
    if !corpus.flagged.is_empty() {
        warn!(
            flagged = corpus.flagged.len(),
            "alternate-title records flagged during embedding"
        );
        warnings.push(format!(
            "{} alternate-title records flagged for review",
            corpus.flagged.len()
        ));
    }

    let manifest = EmbeddingRunManifest {
        manifest_version: 1,
        run_id,
        generated_at: started_at,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        normalization: model.normalization.clone(),
        backend: model.backend.clone(),
        refresh_mode: args.refresh_mode.as_str().to_string(),
        source_path: args.corpus.alternate_titles.display().to_string(),
        source_sha256,
        corpus_entries: corpus.entries.len(),
        distinct_titles: titles.len(),
        cache_hits: stats.cache_hits,
        computed_embeddings: stats.computed,
        cached_rows_after,
        batch_size,
        duration_ms: started.elapsed().as_millis(),
        status: "completed".to_string(),
        flagged_records: corpus.flagged,
        warnings,
    };

    let manifest_path = manifest_dir.join(format!(
        "embedding_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        path = %manifest_path.display(),
        model_id = %model.model_id,
        distinct_titles = manifest.distinct_titles,
        computed = manifest.computed_embeddings,
        cache_hits = manifest.cache_hits,
        "embedding refresh completed"
    );

    Ok(())
}

pub(crate) fn write_semantic_model_config_lockfile(
    model: &SemanticModelConfig,
    lock_path: &Path,
) -> Result<()> {
    let checksum = sha256_hex(&format!(
        "{}|{}|{}|{}|{}",
        model.model_id, model.model_name, model.dimensions, model.normalization, model.backend
    ));

    let lock = SemanticModelConfigLock {
        manifest_version: 1,
        model_id: model.model_id.clone(),
        model_name: model.model_name.clone(),
        embedding_dim: model.dimensions,
        normalization: model.normalization.clone(),
        runtime_backend: model.backend.clone(),
        created_at: now_utc_string(),
        checksum,
    };

    ensure_parent_directory(lock_path)?;
    write_json_pretty(lock_path, &lock)
}

pub(crate) fn default_lock_path(cache_root: &Path) -> PathBuf {
    cache_root.join(SEMANTIC_MODEL_CONFIG_LOCK_PATH)
}
