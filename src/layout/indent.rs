use std::collections::BTreeMap;

use serde::Serialize;

use super::tokens::PositionedLine;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndentationBand {
    pub band_id: usize,
    pub anchor_x0: f64,
    pub members: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndentClassification {
    pub bands: Vec<IndentationBand>,
    pub band_of_line: Vec<usize>,
}

impl IndentClassification {
    pub fn members(&self, band_id: usize) -> &[usize] {
        self.bands
            .get(band_id)
            .map(|band| band.members.as_slice())
            .unwrap_or(&[])
    }
}

/// Line-height histogram of one band; used to tune the height thresholds.
#[derive(Debug, Clone, Serialize)]
pub struct BandSummary {
    pub band_id: usize,
    pub anchor_x0: f64,
    pub line_count: usize,
    pub height_histogram: BTreeMap<i64, usize>,
}

/// Greedy clustering of lines by x0. A line joins the first existing anchor
/// within `tolerance` (relative to the anchor), otherwise it founds a new one.
/// Band ids are the anchors' ranks in ascending x0 order.
pub fn classify_indentation(lines: &[PositionedLine], tolerance: f64) -> IndentClassification {
    let mut anchors = Vec::<(f64, Vec<usize>)>::new();

    for (index, line) in lines.iter().enumerate() {
        match anchors
            .iter_mut()
            .find(|(anchor, _)| within_tolerance(line.x0, *anchor, tolerance))
        {
            Some((_, members)) => members.push(index),
            None => anchors.push((line.x0, vec![index])),
        }
    }

    anchors.sort_by(|left, right| left.0.total_cmp(&right.0));

    let mut band_of_line = vec![0usize; lines.len()];
    let bands = anchors
        .into_iter()
        .enumerate()
        .map(|(band_id, (anchor_x0, members))| {
            for &member in &members {
                band_of_line[member] = band_id;
            }
            IndentationBand {
                band_id,
                anchor_x0,
                members,
            }
        })
        .collect();

    IndentClassification {
        bands,
        band_of_line,
    }
}

pub fn summarize_bands(
    lines: &[PositionedLine],
    classification: &IndentClassification,
) -> Vec<BandSummary> {
    classification
        .bands
        .iter()
        .map(|band| {
            let mut height_histogram = BTreeMap::<i64, usize>::new();
            for line in band.members.iter().filter_map(|&index| lines.get(index)) {
                *height_histogram.entry(line.rounded_height()).or_default() += 1;
            }
            BandSummary {
                band_id: band.band_id,
                anchor_x0: band.anchor_x0,
                line_count: band.members.len(),
                height_histogram,
            }
        })
        .collect()
}

fn within_tolerance(x0: f64, anchor: f64, tolerance: f64) -> bool {
    (x0 - anchor).abs() <= anchor.abs() * tolerance
}
