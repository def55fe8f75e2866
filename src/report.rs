use std::fmt::{self, Write as _};

use anyhow::{Context, Result};

use crate::layout::ExperienceEntry;
use crate::model::{AnalysisReport, ExperienceRow, MatchRef};
use crate::occupation::MatchTable;
use crate::tenure::{Clock, Duration, sum_duration_texts};

const UNKNOWN_DURATION: &str = "N/A";
const DESCRIPTION_PREVIEW_CHARS: usize = 200;
const RULE: &str = "==================================================";

#[derive(Debug, Clone, PartialEq)]
pub struct ExperienceTable {
    pub rows: Vec<ExperienceRow>,
    pub total: Duration,
    pub unparseable_periods: usize,
}

/// Flattens experience into one row per date period, attaching the best match
/// of each position. Periods whose duration cannot be derived render as
/// `N/A` and stay out of the total.
pub fn build_experience_rows(
    experience: &[ExperienceEntry],
    matches: &MatchTable,
    clock: &dyn Clock,
) -> ExperienceTable {
    let mut rows = Vec::<ExperienceRow>::new();
    let mut total = Duration::default();
    let mut unparseable_periods = 0usize;

    for entry in experience {
        for position in &entry.positions {
            let best = matches.best(&position.position);
            for period in &position.date_periods {
                let duration = period.duration(clock);
                match duration {
                    Some(value) => total = total + value,
                    None => unparseable_periods += 1,
                }

                rows.push(ExperienceRow {
                    position: position.position.clone(),
                    company: entry.company.clone(),
                    start: period.start.clone(),
                    end: period.end_label().to_string(),
                    duration: duration
                        .map(|value| value.to_string())
                        .unwrap_or_else(|| UNKNOWN_DURATION.to_string()),
                    matched: best.map(|result| MatchRef {
                        alternate_title: result.entry.alternate_title.clone(),
                        occupation_code: result.entry.occupation_code.clone(),
                    }),
                    score: best.map(|result| round_score(result.score)),
                });
            }
        }
    }

    debug_assert_eq!(
        sum_duration_texts(rows.iter().map(|row| row.duration.as_str())),
        total
    );

    ExperienceTable {
        rows,
        total,
        unparseable_periods,
    }
}

pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

pub fn render_text_summary(report: &AnalysisReport) -> Result<String> {
    let mut out = String::new();
    write_summary(&mut out, report).context("failed to render text summary")?;
    Ok(out)
}

fn write_summary(out: &mut String, report: &AnalysisReport) -> fmt::Result {
    let not_found = |value: &Option<String>| value.clone().unwrap_or_else(|| "Not Found".to_string());

    section(out, "CONTACT INFORMATION")?;
    writeln!(out, "Name: {}", not_found(&report.contact.name))?;
    writeln!(out, "Email: {}", not_found(&report.contact.email))?;
    writeln!(out, "Phone: {}", not_found(&report.contact.phone))?;
    writeln!(out, "LinkedIn: {}", not_found(&report.contact.linkedin))?;

    section(out, "WORK EXPERIENCE WITH MATCHED TITLES")?;
    for row in &report.experience {
        writeln!(
            out,
            "{} at {}: {} - {} ({})",
            row.position, row.company, row.start, row.end, row.duration
        )?;
        match (&row.matched, row.score) {
            (Some(matched), Some(score)) => {
                writeln!(
                    out,
                    "  Matched as: {} [{}] (Similarity: {:.4})",
                    matched.alternate_title, matched.occupation_code, score
                )?;
            }
            _ => {
                writeln!(out, "  No match")?;
            }
        }
    }

    section(out, "TOTAL WORK EXPERIENCE")?;
    writeln!(out, "Total Work Experience: {}", report.total_experience)?;

    section(out, "POSITIONS GROUPED BY OCCUPATION CODE")?;
    for group in &report.occupation_groups {
        writeln!(out)?;
        match &group.occupation {
            Some(record) => {
                writeln!(out, "Occupation Code: {}", record.occupation_code)?;
                writeln!(out, "Primary Occupation: {}", record.canonical_title)?;
                writeln!(out, "Description: {}", preview(&record.description))?;
            }
            None => {
                writeln!(out, "Unclassified occupation codes")?;
            }
        }

        writeln!(out, "Matched Positions:")?;
        for position in &group.positions {
            writeln!(
                out,
                "  - {} at {} (Similarity: {:.4})",
                position.position, position.company, position.score
            )?;
            writeln!(
                out,
                "    Matched as: {} [{}]",
                position.alternate_title, position.occupation_code
            )?;
        }
        writeln!(out, "Total experience in {}: {}", group.title(), group.total)?;
        if group.unknown_duration_periods > 0 {
            writeln!(
                out,
                "  ({} period(s) without a known duration)",
                group.unknown_duration_periods
            )?;
        }
    }

    if !report.unmatched_positions.is_empty() {
        section(out, "UNMATCHED POSITIONS")?;
        for position in &report.unmatched_positions {
            writeln!(out, "  - {position}")?;
        }
    }

    if report.skipped_line_count > 0 || !report.warnings.is_empty() {
        section(out, "WARNINGS")?;
        if report.skipped_line_count > 0 {
            writeln!(out, "Skipped layout lines: {}", report.skipped_line_count)?;
        }
        for warning in &report.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }

    Ok(())
}

fn section(out: &mut String, title: &str) -> fmt::Result {
    if !out.is_empty() {
        out.push('\n');
    }
    writeln!(out, "{RULE}\n{title}\n{RULE}")
}

fn preview(description: &str) -> String {
    if description.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return description.to_string();
    }
    let head = description
        .chars()
        .take(DESCRIPTION_PREVIEW_CHARS)
        .collect::<String>();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::{ContactFields, DateRange, PositionEntry};
    use crate::tenure::{FixedClock, YearMonth};

    fn experience() -> Vec<ExperienceEntry> {
        vec![ExperienceEntry {
            company: "Acme Corp".to_string(),
            positions: vec![PositionEntry {
                position: "Engineer".to_string(),
                date_periods: vec![
                    DateRange {
                        start: "June 2019".to_string(),
                        end: Some("August 2021".to_string()),
                        trailing_status: None,
                    },
                    DateRange {
                        start: "Spring 2022".to_string(),
                        end: None,
                        trailing_status: Some("Present".to_string()),
                    },
                ],
                meta: String::new(),
            }],
        }]
    }

    #[test]
    fn rows_render_unknown_durations_as_na_and_skip_them_in_total() {
        let clock = FixedClock(YearMonth::new(2024, 1).expect("valid month"));

        let table = build_experience_rows(&experience(), &MatchTable::default(), &clock);

        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].duration, "2 years 3 months");
        assert_eq!(table.rows[1].duration, UNKNOWN_DURATION);
        assert_eq!(table.rows[1].end, "Present");
        assert_eq!(table.rows[0].matched, None);
        assert_eq!(table.total, Duration { years: 2, months: 3 });
        assert_eq!(table.unparseable_periods, 1);
    }

    #[test]
    fn scores_round_to_four_places() {
        assert_eq!(round_score(0.876_543_21), 0.8765);
        assert_eq!(round_score(0.5), 0.5);
    }

    #[test]
    fn summary_lists_contact_total_and_warnings() {
        let clock = FixedClock(YearMonth::new(2024, 1).expect("valid month"));
        let table = build_experience_rows(&experience(), &MatchTable::default(), &clock);
        let report = AnalysisReport {
            report_version: 1,
            generated_at: "2024-01-01T00:00:00Z".to_string(),
            contact: ContactFields {
                name: Some("Jane Doe".to_string()),
                email: Some("jane@example.com".to_string()),
                phone: None,
                linkedin: None,
            },
            experience: table.rows,
            total_experience: table.total,
            occupation_groups: Vec::new(),
            unmatched_positions: vec!["Engineer".to_string()],
            skipped_line_count: 2,
            skipped_lines: Vec::new(),
            warnings: vec!["embedding timed out".to_string()],
        };

        let summary = render_text_summary(&report).expect("summary renders");

        assert!(summary.contains("Name: Jane Doe"));
        assert!(summary.contains("Phone: Not Found"));
        assert!(summary.contains("Engineer at Acme Corp: June 2019 - August 2021 (2 years 3 months)"));
        assert!(summary.contains("Total Work Experience: 2 years 3 months"));
        assert!(summary.contains("Skipped layout lines: 2"));
        assert!(summary.contains("  - embedding timed out"));
    }

    #[test]
    fn long_descriptions_are_truncated() {
        let long = "x".repeat(DESCRIPTION_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), DESCRIPTION_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
