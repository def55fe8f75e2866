//! Layout reconstruction: positioned lines in, contact block and nested
//! experience entries out, using only geometry (indentation and line height).

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

mod config;
mod contact;
mod dates;
mod experience;
mod indent;
mod normalize;
mod sections;
#[cfg(test)]
mod tests;
mod tokens;

pub use config::LayoutConfig;
pub use contact::{ContactFields, ContactRecord, derive_contact_fields, extract_contact_records};
pub use dates::{DateRange, DateRangeParser};
pub use experience::{ExperienceEntry, MalformedLayoutError, PositionEntry, extract_experience};
pub use indent::{BandSummary, classify_indentation, summarize_bands};
pub use normalize::normalize_page_coordinates;
pub use sections::{assign_section_titles, first_title_line, section_lines};
pub use tokens::{PositionedLine, load_token_stream};

#[derive(Debug, Clone, Serialize)]
pub struct SegmentedResume {
    pub line_count: usize,
    pub bands: Vec<BandSummary>,
    pub contact: ContactFields,
    pub contact_records: Vec<ContactRecord>,
    pub experience: Vec<ExperienceEntry>,
    pub skipped_lines: Vec<MalformedLayoutError>,
}

impl SegmentedResume {
    /// Every position title in document order, duplicates included.
    pub fn position_titles(&self) -> Vec<String> {
        self.experience
            .iter()
            .flat_map(|entry| entry.positions.iter())
            .map(|position| position.position.clone())
            .collect()
    }
}

pub struct LayoutParser {
    config: LayoutConfig,
    dates: DateRangeParser,
}

impl LayoutParser {
    pub fn new(config: LayoutConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            dates: DateRangeParser::new()?,
        })
    }

    pub fn segment(&self, lines: &[PositionedLine]) -> SegmentedResume {
        let config = &self.config;
        let normalized = normalize_page_coordinates(lines);
        let classification = classify_indentation(&normalized, config.indent_tolerance);
        let bands = summarize_bands(&normalized, &classification);

        if classification.bands.len() <= config.primary_band.max(config.secondary_band) {
            warn!(
                band_count = classification.bands.len(),
                primary_band = config.primary_band,
                secondary_band = config.secondary_band,
                "fewer indentation bands than configured; sections may be empty"
            );
        }

        let primary = assign_section_titles(
            &normalized,
            classification.members(config.primary_band),
            config.primary_title_height,
        );
        let secondary = assign_section_titles(
            &normalized,
            classification.members(config.secondary_band),
            config.secondary_title_height,
        );

        let experience_lines = section_lines(&primary, &config.experience_title);
        let contact_lines = section_lines(&secondary, &config.contact_title);

        let experience = extract_experience(&experience_lines, config, &self.dates);
        let contact_records = extract_contact_records(&contact_lines, config);

        let name = first_title_line(&primary, config.primary_title_height);
        let contact = derive_contact_fields(name, &contact_records.records);

        let mut skipped_lines = experience.skipped;
        skipped_lines.extend(contact_records.skipped);

        info!(
            line_count = normalized.len(),
            band_count = classification.bands.len(),
            experience_lines = experience_lines.len(),
            contact_lines = contact_lines.len(),
            companies = experience.records.len(),
            skipped_lines = skipped_lines.len(),
            "segmented resume layout"
        );

        SegmentedResume {
            line_count: normalized.len(),
            bands,
            contact,
            contact_records: contact_records.records,
            experience: experience.records,
            skipped_lines,
        }
    }
}
