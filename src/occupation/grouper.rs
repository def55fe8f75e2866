use std::collections::BTreeMap;

use serde::Serialize;

use super::corpus::OccupationRecord;
use super::matcher::MatchTable;
use crate::layout::ExperienceEntry;
use crate::tenure::{Clock, Duration};

pub const UNCLASSIFIED: &str = "unclassified";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedPosition {
    pub position: String,
    pub company: String,
    pub occupation_code: String,
    pub alternate_title: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OccupationGroup {
    pub occupation_code: String,
    pub occupation: Option<OccupationRecord>,
    pub positions: Vec<GroupedPosition>,
    pub total: Duration,
    pub unknown_duration_periods: usize,
}

impl OccupationGroup {
    fn new(occupation_code: &str, occupation: Option<OccupationRecord>) -> Self {
        Self {
            occupation_code: occupation_code.to_string(),
            occupation,
            positions: Vec::new(),
            total: Duration::default(),
            unknown_duration_periods: 0,
        }
    }

    pub fn title(&self) -> &str {
        self.occupation
            .as_ref()
            .map(|record| record.canonical_title.as_str())
            .unwrap_or(UNCLASSIFIED)
    }

    /// Keeps the highest-scoring occurrence of each `(position, company)`.
    fn add_display(&mut self, candidate: GroupedPosition) {
        match self
            .positions
            .iter_mut()
            .find(|existing| existing.position == candidate.position && existing.company == candidate.company)
        {
            Some(existing) if candidate.score > existing.score => *existing = candidate,
            Some(_) => {}
            None => self.positions.push(candidate),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GroupingOutcome {
    pub groups: Vec<OccupationGroup>,
    pub unmatched_positions: Vec<String>,
}

/// Groups every position occurrence under the code of its best match. Each
/// occurrence adds its own date periods to the group tenure, so repeated
/// `(position, company)` keys are summed rather than collapsed. Codes absent
/// from `occupations` share one unclassified bucket, listed last.
pub fn group_by_occupation(
    experience: &[ExperienceEntry],
    matches: &MatchTable,
    occupations: &BTreeMap<String, OccupationRecord>,
    clock: &dyn Clock,
) -> GroupingOutcome {
    let mut classified = BTreeMap::<String, OccupationGroup>::new();
    let mut unclassified: Option<OccupationGroup> = None;
    let mut unmatched_positions = Vec::<String>::new();

    for entry in experience {
        for position in &entry.positions {
            let Some(best) = matches.best(&position.position) else {
                if !unmatched_positions.contains(&position.position) {
                    unmatched_positions.push(position.position.clone());
                }
                continue;
            };

            let code = best.entry.occupation_code.as_str();
            let group = match occupations.get(code) {
                Some(record) => classified
                    .entry(code.to_string())
                    .or_insert_with(|| OccupationGroup::new(code, Some(record.clone()))),
                None => unclassified.get_or_insert_with(|| OccupationGroup::new(UNCLASSIFIED, None)),
            };

            for period in &position.date_periods {
                match period.duration(clock) {
                    Some(duration) => group.total = group.total + duration,
                    None => group.unknown_duration_periods += 1,
                }
            }

            group.add_display(GroupedPosition {
                position: position.position.clone(),
                company: entry.company.clone(),
                occupation_code: code.to_string(),
                alternate_title: best.entry.alternate_title.clone(),
                score: best.score,
            });
        }
    }

    let mut groups = classified.into_values().collect::<Vec<OccupationGroup>>();
    groups.extend(unclassified);
    for group in &mut groups {
        group
            .positions
            .sort_by(|left, right| right.score.total_cmp(&left.score));
    }

    GroupingOutcome {
        groups,
        unmatched_positions,
    }
}
