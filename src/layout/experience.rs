use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::config::LayoutConfig;
use super::dates::{DateRange, DateRangeParser};
use super::tokens::PositionedLine;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub position: String,
    pub date_periods: Vec<DateRange>,
    pub meta: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperienceEntry {
    pub company: String,
    pub positions: Vec<PositionEntry>,
}

/// A structural line that arrived before the parent it needs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MalformedLayoutError {
    #[error("position line before any company: {text:?}")]
    PositionWithoutCompany { text: String },
    #[error("detail line before any position: {text:?}")]
    DetailWithoutPosition { text: String },
    #[error("contact line before any contact title: {text:?}")]
    ContactLineWithoutRecord { text: String },
}

/// Records built from one section plus the lines that had to be skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction<T> {
    pub records: Vec<T>,
    pub skipped: Vec<MalformedLayoutError>,
}

#[derive(Default)]
struct ExperienceBuilder {
    finished: Vec<ExperienceEntry>,
    current_company: Option<ExperienceEntry>,
    current_position: Option<usize>,
}

impl ExperienceBuilder {
    fn start_company(&mut self, company: &str) {
        if let Some(previous) = self.current_company.take() {
            self.finished.push(previous);
        }
        self.current_company = Some(ExperienceEntry {
            company: company.to_string(),
            positions: Vec::new(),
        });
        self.current_position = None;
    }

    fn start_position(&mut self, position: &str) -> Result<(), MalformedLayoutError> {
        let Some(company) = self.current_company.as_mut() else {
            return Err(MalformedLayoutError::PositionWithoutCompany {
                text: position.to_string(),
            });
        };
        company.positions.push(PositionEntry {
            position: position.to_string(),
            date_periods: Vec::new(),
            meta: String::new(),
        });
        self.current_position = Some(company.positions.len() - 1);
        Ok(())
    }

    fn position_mut(&mut self, text: &str) -> Result<&mut PositionEntry, MalformedLayoutError> {
        let index = self.current_position;
        self.current_company
            .as_mut()
            .zip(index)
            .and_then(|(company, index)| company.positions.get_mut(index))
            .ok_or_else(|| MalformedLayoutError::DetailWithoutPosition {
                text: text.to_string(),
            })
    }

    fn add_periods(
        &mut self,
        periods: Vec<DateRange>,
        text: &str,
    ) -> Result<(), MalformedLayoutError> {
        self.position_mut(text)?.date_periods.extend(periods);
        Ok(())
    }

    fn add_meta(&mut self, text: &str) -> Result<(), MalformedLayoutError> {
        let position = self.position_mut(text)?;
        if !position.meta.is_empty() {
            position.meta.push(' ');
        }
        position.meta.push_str(text);
        Ok(())
    }

    fn finish(mut self) -> Vec<ExperienceEntry> {
        if let Some(last) = self.current_company.take() {
            self.finished.push(last);
        }
        self.finished
    }
}

/// Runs the company/position/detail state machine over the Experience
/// section. Heights other than the three structural ones are ignored.
pub fn extract_experience(
    lines: &[&PositionedLine],
    config: &LayoutConfig,
    dates: &DateRangeParser,
) -> Extraction<ExperienceEntry> {
    let mut builder = ExperienceBuilder::default();
    let mut skipped = Vec::<MalformedLayoutError>::new();

    for line in lines {
        let height = line.rounded_height();
        let text = line.text.as_str();

        let outcome = if height == config.company_height {
            builder.start_company(text);
            Ok(())
        } else if height == config.position_height {
            builder.start_position(text)
        } else if height == config.detail_height {
            let periods = dates.find_all(text);
            if periods.is_empty() {
                builder.add_meta(text)
            } else {
                builder.add_periods(periods, text)
            }
        } else {
            Ok(())
        };

        if let Err(error) = outcome {
            debug!(error = %error, "skipping experience line");
            skipped.push(error);
        }
    }

    Extraction {
        records: builder.finish(),
        skipped,
    }
}
