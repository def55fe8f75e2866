use std::collections::BTreeMap;

use super::tokens::PositionedLine;

/// Stitches pages onto one vertical axis: every line on page `p` is shifted
/// up by the summed maximum y of all later pages, so earlier pages sit above
/// later ones. y0 and y1 are offset by their own per-page maxima.
pub fn normalize_page_coordinates(lines: &[PositionedLine]) -> Vec<PositionedLine> {
    let mut page_maxima = BTreeMap::<usize, (f64, f64)>::new();
    for line in lines {
        page_maxima
            .entry(line.page_index)
            .and_modify(|(max_y0, max_y1)| {
                *max_y0 = max_y0.max(line.y0);
                *max_y1 = max_y1.max(line.y1);
            })
            .or_insert((line.y0, line.y1));
    }

    let mut offsets = BTreeMap::<usize, (f64, f64)>::new();
    let mut running = (0.0_f64, 0.0_f64);
    for (page_index, (max_y0, max_y1)) in page_maxima.iter().rev() {
        offsets.insert(*page_index, running);
        running.0 += max_y0;
        running.1 += max_y1;
    }

    lines
        .iter()
        .map(|line| {
            let (y0_offset, y1_offset) = offsets
                .get(&line.page_index)
                .copied()
                .unwrap_or((0.0, 0.0));
            line.with_offsets(y0_offset, y1_offset)
        })
        .collect()
}
