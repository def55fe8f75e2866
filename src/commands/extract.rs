use anyhow::{Context, Result};
use tracing::info;

use crate::cli::ExtractArgs;
use crate::layout::{LayoutConfig, LayoutParser, load_token_stream};
use crate::util::write_json_pretty;

pub fn run(args: ExtractArgs) -> Result<()> {
    let config = LayoutConfig::load(args.layout_config.as_deref())?;
    let parser = LayoutParser::new(config)?;
    let lines = load_token_stream(&args.input)?;
    let segmented = parser.segment(&lines);

    match &args.output {
        Some(path) => {
            write_json_pretty(path, &segmented)?;
            info!(
                path = %path.display(),
                companies = segmented.experience.len(),
                skipped_lines = segmented.skipped_lines.len(),
                "wrote segmented resume"
            );
        }
        None => {
            let rendered = serde_json::to_string_pretty(&segmented)
                .context("failed to serialize segmented resume")?;
            println!("{rendered}");
        }
    }

    Ok(())
}
