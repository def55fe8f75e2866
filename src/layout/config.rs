use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Geometry thresholds for one family of resume exports. Heights are compared
/// against the rounded line height of each line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Relative x0 tolerance for joining an indentation band.
    pub indent_tolerance: f64,
    pub primary_band: usize,
    pub secondary_band: usize,
    pub primary_title_height: i64,
    pub secondary_title_height: i64,
    pub company_height: i64,
    pub position_height: i64,
    pub detail_height: i64,
    pub contact_title_height: i64,
    pub contact_line_height: i64,
    pub experience_title: String,
    pub contact_title: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            indent_tolerance: 0.001,
            primary_band: 1,
            secondary_band: 0,
            primary_title_height: 22,
            secondary_title_height: 18,
            company_height: 17,
            position_height: 16,
            detail_height: 15,
            contact_title_height: 18,
            contact_line_height: 15,
            experience_title: "Experience".to_string(),
            contact_title: "Contact".to_string(),
        }
    }
}

impl LayoutConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let raw = fs::read(path)
            .with_context(|| format!("failed to read layout config {}", path.display()))?;
        let config: LayoutConfig = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse layout config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.indent_tolerance.is_finite() || self.indent_tolerance < 0.0 {
            bail!(
                "indent_tolerance must be a non-negative number, got {}",
                self.indent_tolerance
            );
        }
        if self.primary_band == self.secondary_band {
            bail!(
                "primary_band and secondary_band must differ (both are {})",
                self.primary_band
            );
        }
        let structural = [
            self.company_height,
            self.position_height,
            self.detail_height,
        ];
        if structural[0] == structural[1]
            || structural[1] == structural[2]
            || structural[0] == structural[2]
        {
            bail!("company, position and detail heights must be distinct: {structural:?}");
        }
        Ok(())
    }
}
