use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::util::normalize_whitespace;

/// One extracted text line. `line_height` is captured from the raw page
/// coordinates and survives page-offset normalization unchanged.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PositionedLine {
    pub page_index: usize,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
    pub line_height: f64,
}

impl PositionedLine {
    pub fn new(page_index: usize, x0: f64, y0: f64, x1: f64, y1: f64, text: &str) -> Self {
        Self {
            page_index,
            x0,
            y0,
            x1,
            y1,
            text: normalize_whitespace(text),
            line_height: y1 - y0,
        }
    }

    pub fn rounded_height(&self) -> i64 {
        self.line_height.round_ties_even() as i64
    }

    pub(super) fn with_offsets(&self, y0_offset: f64, y1_offset: f64) -> Self {
        Self {
            y0: self.y0 + y0_offset,
            y1: self.y1 + y1_offset,
            ..self.clone()
        }
    }
}

/// Wire shape of the external extractor's JSON output.
#[derive(Debug, Clone, Deserialize)]
pub struct RawToken {
    pub page_index: usize,
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
    pub text: String,
}

impl From<RawToken> for PositionedLine {
    fn from(token: RawToken) -> Self {
        PositionedLine::new(
            token.page_index,
            token.x0,
            token.y0,
            token.x1,
            token.y1,
            &token.text,
        )
    }
}

/// Drops blank lines and orders the stream by page, then top to bottom.
pub fn prepare_token_stream(lines: Vec<PositionedLine>) -> Vec<PositionedLine> {
    let mut lines = lines
        .into_iter()
        .filter(|line| !line.text.is_empty())
        .collect::<Vec<PositionedLine>>();
    lines.sort_by(|left, right| {
        left.page_index
            .cmp(&right.page_index)
            .then(right.y1.total_cmp(&left.y1))
    });
    lines
}

pub fn load_token_stream(input_path: &Path) -> Result<Vec<PositionedLine>> {
    let is_pdf = input_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    let lines = if is_pdf {
        extract_lines_with_pdftotext(input_path)?
    } else {
        let raw = fs::read(input_path)
            .with_context(|| format!("failed to read token stream {}", input_path.display()))?;
        let tokens: Vec<RawToken> = serde_json::from_slice(&raw).with_context(|| {
            format!("failed to parse token stream {}", input_path.display())
        })?;
        tokens.into_iter().map(PositionedLine::from).collect()
    };

    let prepared = prepare_token_stream(lines);
    info!(
        path = %input_path.display(),
        line_count = prepared.len(),
        "loaded token stream"
    );
    Ok(prepared)
}

fn extract_lines_with_pdftotext(pdf_path: &Path) -> Result<Vec<PositionedLine>> {
    let output = Command::new("pdftotext")
        .arg("-bbox-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    parse_bbox_layout(&raw)
}

/// Reads `pdftotext -bbox-layout` XHTML. Poppler measures y from the top of
/// the page; lines are flipped into bottom-up coordinates using the page
/// height so that larger y means higher on the page.
pub fn parse_bbox_layout(xhtml: &str) -> Result<Vec<PositionedLine>> {
    let mut reader = Reader::from_str(xhtml);
    reader.trim_text(true);

    let mut lines = Vec::<PositionedLine>::new();
    let mut page: Option<(usize, f64)> = None;
    let mut open_line: Option<([f64; 4], Vec<String>)> = None;
    let mut open_word: Option<String> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => match element.local_name().as_ref() {
                b"page" => {
                    let height = attribute_f64(&element, b"height")?;
                    let next_index = page.map(|(index, _)| index + 1).unwrap_or(0);
                    page = Some((next_index, height));
                }
                b"line" => {
                    let bbox = [
                        attribute_f64(&element, b"xMin")?,
                        attribute_f64(&element, b"yMin")?,
                        attribute_f64(&element, b"xMax")?,
                        attribute_f64(&element, b"yMax")?,
                    ];
                    open_line = Some((bbox, Vec::new()));
                }
                b"word" => open_word = Some(String::new()),
                _ => {}
            },
            Ok(Event::Text(text)) => {
                if let Some(word) = open_word.as_mut() {
                    let decoded = text
                        .unescape()
                        .context("invalid character reference in bbox-layout word")?;
                    word.push_str(&decoded);
                }
            }
            Ok(Event::End(element)) => match element.local_name().as_ref() {
                b"word" => {
                    if let (Some(word), Some((_, words))) = (open_word.take(), open_line.as_mut()) {
                        words.push(word);
                    }
                }
                b"line" => {
                    let Some(([x_min, y_min, x_max, y_max], words)) = open_line.take() else {
                        continue;
                    };
                    let Some((page_index, page_height)) = page else {
                        bail!("bbox-layout line appears before any <page> element");
                    };
                    lines.push(PositionedLine::new(
                        page_index,
                        x_min,
                        page_height - y_max,
                        x_max,
                        page_height - y_min,
                        &words.join(" "),
                    ));
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "malformed bbox-layout XHTML near byte {}",
                        reader.buffer_position()
                    )
                });
            }
            _ => {}
        }
    }

    debug!(line_count = lines.len(), "parsed bbox-layout lines");
    Ok(lines)
}

fn attribute_f64(element: &BytesStart<'_>, name: &[u8]) -> Result<f64> {
    for attribute in element.attributes() {
        let attribute = attribute.context("malformed attribute in bbox-layout XHTML")?;
        if attribute.key.local_name().as_ref() != name {
            continue;
        }
        let value = attribute
            .unescape_value()
            .context("invalid attribute value in bbox-layout XHTML")?;
        return parse_coordinate(&value);
    }

    bail!(
        "bbox-layout <{}> element is missing {}",
        String::from_utf8_lossy(element.name().as_ref()),
        String::from_utf8_lossy(name)
    )
}

fn parse_coordinate(raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .with_context(|| format!("invalid coordinate in bbox-layout output: {raw:?}"))
}
