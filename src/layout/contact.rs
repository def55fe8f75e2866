use serde::{Deserialize, Serialize};
use tracing::debug;

use super::config::LayoutConfig;
use super::experience::{Extraction, MalformedLayoutError};
use super::tokens::PositionedLine;

const LINKEDIN_MARKER: &str = "(LinkedIn)";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactRecord {
    pub contact_lines: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContactFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
}

pub fn extract_contact_records(
    lines: &[&PositionedLine],
    config: &LayoutConfig,
) -> Extraction<ContactRecord> {
    let mut records = Vec::<ContactRecord>::new();
    let mut skipped = Vec::<MalformedLayoutError>::new();

    for line in lines {
        let height = line.rounded_height();
        if height == config.contact_title_height {
            records.push(ContactRecord::default());
        }

        if height != config.contact_line_height {
            continue;
        }

        match records.last_mut() {
            Some(record) => record.contact_lines.push(line.text.clone()),
            None => {
                let error = MalformedLayoutError::ContactLineWithoutRecord {
                    text: line.text.clone(),
                };
                debug!(error = %error, "skipping contact line");
                skipped.push(error);
            }
        }
    }

    Extraction { records, skipped }
}

/// Derives the presentation fields from the first contact record. `name` is
/// supplied by the caller (the first title of the primary band) and falls
/// back to the first contact line.
pub fn derive_contact_fields(name: Option<&str>, records: &[ContactRecord]) -> ContactFields {
    let lines = records
        .first()
        .map(|record| record.contact_lines.as_slice())
        .unwrap_or(&[]);

    let email = lines
        .iter()
        .find(|line| line.contains('@') && line.contains(".com"))
        .map(|line| line.trim().to_string());

    let phone = lines
        .iter()
        .filter(|line| line.contains("(Mobile)"))
        .map(|line| line.split('(').next().unwrap_or_default().trim().to_string())
        .find(|number| number.chars().any(|character| character.is_ascii_digit()));

    let linkedin = linkedin_url(lines);

    ContactFields {
        name: name
            .map(ToOwned::to_owned)
            .or_else(|| lines.first().cloned()),
        email,
        phone,
        linkedin,
    }
}

/// Profile URLs wrap across lines: the URL runs from the first line
/// mentioning linkedin through the line carrying the `(LinkedIn)` marker.
fn linkedin_url(lines: &[String]) -> Option<String> {
    let start = lines
        .iter()
        .position(|line| line.to_ascii_lowercase().contains("linkedin"))?;
    let end = lines[start..]
        .iter()
        .position(|line| line.contains(LINKEDIN_MARKER))
        .map(|offset| start + offset)
        .unwrap_or(start);

    let url = lines[start..=end]
        .iter()
        .map(|line| line.replace(LINKEDIN_MARKER, "").trim().to_string())
        .collect::<String>();
    (!url.is_empty()).then_some(url)
}
