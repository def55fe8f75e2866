use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info;

use super::embed::{default_lock_path, write_semantic_model_config_lockfile};
use super::{load_corpus, resolve_db_path};
use crate::cli::AnalyzeArgs;
use crate::layout::{LayoutConfig, LayoutParser, load_token_stream};
use crate::model::{AnalysisCounts, AnalysisPaths, AnalysisReport, AnalysisRunManifest};
use crate::occupation::{
    MatchOptions, group_by_occupation, load_occupation_data, match_positions_or_skip,
};
use crate::report::{build_experience_rows, render_text_summary};
use crate::semantic::{
    CachedEmbedder, EmbedBudget, LazyEmbedder, ensure_model_entry, open_embedding_store,
    resolve_model_config,
};
use crate::tenure::{Clock, FixedClock, SystemClock, YearMonth};
use crate::util::{
    ensure_directory, now_utc_string, sha256_file, utc_compact_string, write_json_pretty,
    write_text,
};

pub fn run(args: AnalyzeArgs) -> Result<()> {
    let started_at = now_utc_string();
    let started = Instant::now();
    let stamp = utc_compact_string(Utc::now());
    let run_id = format!("analyze-{stamp}");

    let clock: Box<dyn Clock> = match args.today.as_deref() {
        Some(today) => Box::new(FixedClock(
            YearMonth::parse_iso(today).context("invalid --today value")?,
        )),
        None => Box::new(SystemClock),
    };
    let today = clock.current_month();

    let manifest_dir = args.cache_root.join("manifests");
    let report_dir = args.cache_root.join("reports");
    ensure_directory(&manifest_dir)?;
    let report_path = args
        .report_path
        .clone()
        .unwrap_or_else(|| report_dir.join(format!("analysis_report_{stamp}.json")));
    let summary_path = args
        .summary_path
        .clone()
        .unwrap_or_else(|| report_dir.join(format!("analysis_summary_{stamp}.txt")));
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());

    let config = LayoutConfig::load(args.layout_config.as_deref())?;
    let parser = LayoutParser::new(config)?;
    let input_sha256 = sha256_file(&args.input)?;
    let lines = load_token_stream(&args.input)?;

    let corpus = load_corpus(&args.corpus)?;
    let occupations = load_occupation_data(&args.occupation_data)?;

    let segmented = parser.segment(&lines);
    let positions = segmented.position_titles();

    let model = resolve_model_config(&args.model_id);
    let connection = open_embedding_store(&db_path)?;
    ensure_model_entry(&connection, &model)?;
    write_semantic_model_config_lockfile(&model, &default_lock_path(&args.cache_root))?;

    let embedder = LazyEmbedder::new(model.clone());
    let cached = CachedEmbedder::new(&embedder, &connection);
    let options = MatchOptions {
        top_n: args.top_n,
        batch_size: args.batch_size,
        budget: EmbedBudget::new(args.embed_timeout_ms),
    };

    let (matches, skipped_reason) =
        match_positions_or_skip(&positions, &corpus.entries, &cached, options);
    let mut warnings = skipped_reason.into_iter().collect::<Vec<String>>();
    let stats = cached.stats();
    info!(
        backend_initialized = embedder.is_initialized(),
        cache_hits = stats.cache_hits,
        computed = stats.computed,
        "embedding pass finished"
    );

    let grouping = group_by_occupation(&segmented.experience, &matches, &occupations, clock.as_ref());
    let table = build_experience_rows(&segmented.experience, &matches, clock.as_ref());

    if !segmented.skipped_lines.is_empty() {
        warnings.push(format!(
            "{} layout lines skipped as malformed",
            segmented.skipped_lines.len()
        ));
    }
    if table.unparseable_periods > 0 {
        warnings.push(format!(
            "{} date periods without a derivable duration",
            table.unparseable_periods
        ));
    }
    if !corpus.flagged.is_empty() {
        warnings.push(format!(
            "{} alternate-title records flagged for review",
            corpus.flagged.len()
        ));
    }

    let counts = AnalysisCounts {
        line_count: segmented.line_count,
        companies: segmented.experience.len(),
        positions: positions.len(),
        distinct_positions: matches.len(),
        date_periods: table.rows.len(),
        unparseable_periods: table.unparseable_periods,
        skipped_lines: segmented.skipped_lines.len(),
        corpus_entries: corpus.entries.len(),
        occupation_records: occupations.len(),
        occupation_groups: grouping.groups.len(),
        cache_hits: stats.cache_hits,
        computed_embeddings: stats.computed,
    };

    let report = AnalysisReport {
        report_version: 1,
        generated_at: now_utc_string(),
        contact: segmented.contact,
        experience: table.rows,
        total_experience: table.total,
        occupation_groups: grouping.groups,
        unmatched_positions: grouping.unmatched_positions,
        skipped_line_count: segmented.skipped_lines.len(),
        skipped_lines: segmented.skipped_lines,
        warnings: warnings.clone(),
    };

    write_json_pretty(&report_path, &report)?;
    let summary = render_text_summary(&report)?;
    write_text(&summary_path, &summary)?;
    print!("{summary}");

    let manifest = AnalysisRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        completed_at: now_utc_string(),
        duration_ms: started.elapsed().as_millis(),
        model_id: model.model_id.clone(),
        top_n: args.top_n,
        today: format!("{:04}-{:02}", today.year, today.month),
        input_sha256,
        paths: AnalysisPaths {
            input_path: args.input.display().to_string(),
            cache_root: args.cache_root.display().to_string(),
            db_path: db_path.display().to_string(),
            report_path: report_path.display().to_string(),
            summary_path: summary_path.display().to_string(),
        },
        counts,
        flagged_corpus_records: corpus.flagged,
        warnings,
    };

    let manifest_path = manifest_dir.join(format!("analysis_run_{stamp}.json"));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(
        report = %report_path.display(),
        summary = %summary_path.display(),
        manifest = %manifest_path.display(),
        total_experience = %report.total_experience,
        groups = report.occupation_groups.len(),
        warnings = manifest.warnings.len(),
        "analysis completed"
    );

    Ok(())
}
