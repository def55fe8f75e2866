use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Short-title markers that open the source column of the alternate-titles
/// export. Matched as token prefixes.
pub const DEFAULT_SOURCE_PREFIXES: [&str; 10] = [
    "n/a", "CEO", "CAO", "CFO", "CIO", "CNO", "COO", "CTO", "EVP", "Hospital",
];

const OCCUPATION_CODE_PATTERN: &str = r"^\d\d-\d\d\d\d\.\d\d$";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateTitleEntry {
    pub occupation_code: String,
    pub alternate_title: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccupationRecord {
    pub occupation_code: String,
    pub canonical_title: String,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagReason {
    TooFewFields,
    NoSourcePrefix,
    EmptyTitle,
}

/// A corpus row that needs manual review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlaggedRecord {
    pub line_number: usize,
    pub reason: FlagReason,
    pub kept: bool,
    pub raw: String,
}

#[derive(Debug, Clone)]
pub struct SourcePrefixPolicy {
    pub prefixes: Vec<String>,
    pub keep_unsourced: bool,
}

impl Default for SourcePrefixPolicy {
    fn default() -> Self {
        Self {
            prefixes: DEFAULT_SOURCE_PREFIXES
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            keep_unsourced: false,
        }
    }
}

impl SourcePrefixPolicy {
    pub fn from_args(prefixes: &[String], keep_unsourced: bool) -> Self {
        let mut policy = Self::default();
        if !prefixes.is_empty() {
            policy.prefixes = prefixes.to_vec();
        }
        policy.keep_unsourced = keep_unsourced;
        policy
    }

    fn is_source_token(&self, token: &str) -> bool {
        self.prefixes
            .iter()
            .any(|prefix| token.starts_with(prefix.as_str()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlternateTitleCorpus {
    pub entries: Vec<AlternateTitleEntry>,
    pub flagged: Vec<FlaggedRecord>,
}

pub fn load_alternate_titles(path: &Path, policy: &SourcePrefixPolicy) -> Result<AlternateTitleCorpus> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read alternate titles {}", path.display()))?;
    let corpus = parse_alternate_titles(&raw, policy)?;

    if !corpus.flagged.is_empty() {
        warn!(
            path = %path.display(),
            flagged = corpus.flagged.len(),
            kept = corpus.flagged.iter().filter(|record| record.kept).count(),
            "alternate-title records need review"
        );
    }
    info!(
        path = %path.display(),
        entries = corpus.entries.len(),
        "loaded alternate titles"
    );
    Ok(corpus)
}

/// Whitespace-split rows: code, title tokens, then a source column that
/// starts at the first token carrying a recognized prefix.
pub fn parse_alternate_titles(raw: &str, policy: &SourcePrefixPolicy) -> Result<AlternateTitleCorpus> {
    let code_pattern = occupation_code_regex()?;
    let mut corpus = AlternateTitleCorpus::default();

    for (index, line) in raw.lines().enumerate() {
        let line_number = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts = line.split_whitespace().collect::<Vec<&str>>();
        if line_number == 1 && !code_pattern.is_match(parts[0]) {
            continue;
        }

        let mut flag = |reason: FlagReason, kept: bool| {
            corpus.flagged.push(FlaggedRecord {
                line_number,
                reason,
                kept,
                raw: line.to_string(),
            });
        };

        if parts.len() < 4 {
            flag(FlagReason::TooFewFields, false);
            continue;
        }

        let source_index = parts
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, part)| policy.is_source_token(part))
            .map(|(index, _)| index);

        let (title_tokens, source) = match source_index {
            Some(source_index) => (&parts[1..source_index], parts[source_index..].join(" ")),
            None if policy.keep_unsourced => {
                flag(FlagReason::NoSourcePrefix, true);
                (&parts[1..], String::new())
            }
            None => {
                flag(FlagReason::NoSourcePrefix, false);
                continue;
            }
        };

        if title_tokens.is_empty() {
            flag(FlagReason::EmptyTitle, false);
            continue;
        }

        corpus.entries.push(AlternateTitleEntry {
            occupation_code: parts[0].to_string(),
            alternate_title: title_tokens.join(" "),
            source,
        });
    }

    Ok(corpus)
}

pub fn load_occupation_data(path: &Path) -> Result<BTreeMap<String, OccupationRecord>> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read occupation data {}", path.display()))?;
    let records = parse_occupation_data(&raw)?;
    info!(
        path = %path.display(),
        occupations = records.len(),
        "loaded occupation data"
    );
    Ok(records)
}

/// Tab-separated `code, title, description` rows; lines that do not open with
/// an occupation code continue the previous description.
pub fn parse_occupation_data(raw: &str) -> Result<BTreeMap<String, OccupationRecord>> {
    let code_pattern = occupation_code_regex()?;
    let mut records = BTreeMap::<String, OccupationRecord>::new();
    let mut current: Option<OccupationRecord> = None;

    for (index, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = line.split('\t').map(str::trim).collect::<Vec<&str>>();
        if code_pattern.is_match(fields[0]) {
            if let Some(previous) = current.take() {
                records.insert(previous.occupation_code.clone(), finish_record(previous));
            }
            current = Some(OccupationRecord {
                occupation_code: fields[0].to_string(),
                canonical_title: fields.get(1).copied().unwrap_or_default().to_string(),
                description: fields.get(2..).map(|rest| rest.join(" ")).unwrap_or_default(),
            });
            continue;
        }

        match current.as_mut() {
            Some(record) => {
                record.description.push(' ');
                record.description.push_str(line);
            }
            // Header row.
            None if index == 0 => {}
            None => warn!(line_number = index + 1, "occupation text before any code"),
        }
    }

    if let Some(last) = current.take() {
        records.insert(last.occupation_code.clone(), finish_record(last));
    }

    Ok(records)
}

fn finish_record(mut record: OccupationRecord) -> OccupationRecord {
    record.description = record.description.trim().to_string();
    record
}

fn occupation_code_regex() -> Result<Regex> {
    Regex::new(OCCUPATION_CODE_PATTERN).context("failed to compile occupation code regex")
}
