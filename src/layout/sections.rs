use super::tokens::PositionedLine;

/// A line tagged with the running section title of its band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TitledLine<'a> {
    pub line: &'a PositionedLine,
    pub title: Option<&'a str>,
}

/// Walks one band's lines in order, carrying the most recent title line
/// (rounded height at or above `title_height`). Lines ahead of the band's
/// first title carry no title.
pub fn assign_section_titles<'a>(
    lines: &'a [PositionedLine],
    members: &[usize],
    title_height: i64,
) -> Vec<TitledLine<'a>> {
    members
        .iter()
        .filter_map(|&index| lines.get(index))
        .scan(None::<&'a str>, |current_title, line| {
            if line.rounded_height() >= title_height {
                *current_title = Some(line.text.as_str());
            }
            Some(TitledLine {
                line,
                title: *current_title,
            })
        })
        .collect()
}

pub fn section_lines<'a>(titled: &[TitledLine<'a>], title: &str) -> Vec<&'a PositionedLine> {
    titled
        .iter()
        .filter(|entry| entry.title == Some(title))
        .map(|entry| entry.line)
        .collect()
}

/// First line of the band that qualifies as a title.
pub fn first_title_line<'a>(titled: &[TitledLine<'a>], title_height: i64) -> Option<&'a str> {
    titled
        .iter()
        .find(|entry| entry.line.rounded_height() >= title_height)
        .map(|entry| entry.line.text.as_str())
}
