use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::cli::CorpusArgs;
use crate::occupation::{AlternateTitleCorpus, SourcePrefixPolicy, load_alternate_titles};

pub mod analyze;
pub mod embed;
pub mod extract;

const EMBEDDING_DB_FILENAME: &str = "careermap_embeddings.sqlite";

pub(crate) fn resolve_db_path(cache_root: &Path, db_path: Option<&Path>) -> PathBuf {
    db_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cache_root.join(EMBEDDING_DB_FILENAME))
}

pub(crate) fn load_corpus(args: &CorpusArgs) -> Result<AlternateTitleCorpus> {
    let policy = SourcePrefixPolicy::from_args(&args.source_prefixes, args.keep_unsourced);
    load_alternate_titles(&args.alternate_titles, &policy)
}

/// Corpus titles in first-seen order without repeats.
pub(crate) fn distinct_titles(corpus: &AlternateTitleCorpus) -> Vec<String> {
    let mut seen = BTreeSet::<&str>::new();
    corpus
        .entries
        .iter()
        .map(|entry| entry.alternate_title.as_str())
        .filter(|title| seen.insert(*title))
        .map(str::to_string)
        .collect()
}
