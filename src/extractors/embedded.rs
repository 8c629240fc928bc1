//! Embedded text extraction: PDF text spans inside a block.
//!
//! Spans are selected by overlap with the block (in PDF points), grouped
//! into lines by vertical centre, ordered left to right within a line and
//! joined with the geometric spacing rule: a space goes between two spans
//! when the horizontal gap exceeds a fraction of the text height and neither
//! side already carries whitespace. Lines are joined with
//! [`HyphenationHandler`] and the result is Unicode-normalized.
//!
//! The confidence starts at 1.0 and drops for the symptoms of a poor text
//! layer: almost no text, very short spans, long runs of letters without
//! spaces, and spans covering little of the block.

use crate::document::TextSpan;
use crate::geometry::BBox;
use crate::text::{normalize, HyphenationHandler};
use crate::utils::safe_float_cmp;

/// Fraction of a span's area that must lie inside the block.
pub const SPAN_INCLUSION: f32 = 0.5;

/// Gap, relative to the text height, above which spans are separate words.
pub const WORD_MARGIN: f32 = 0.1;

/// Letters in a row above which the text is assumed to be missing spaces.
pub const GLUED_RUN_LEN: usize = 20;

const TINY_TEXT_CHARS: usize = 4;
const SHORT_SPAN_CHARS: f32 = 3.0;
const MIN_COVERAGE: f32 = 0.5;

const TINY_TEXT_PENALTY: f32 = 0.5;
const SHORT_SPAN_PENALTY: f32 = 0.2;
const MISSING_SPACE_PENALTY: f32 = 0.25;
const LOW_COVERAGE_PENALTY: f32 = 0.15;

/// Embedded text of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedText {
    /// Normalized text; empty when no span was found
    pub text: String,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Spans that contributed
    pub span_count: usize,
}

impl EmbeddedText {
    fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            span_count: 0,
        }
    }

    /// Text has at least one non-whitespace character.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

/// Extracts embedded text spans inside a block.
#[derive(Debug, Clone)]
pub struct EmbeddedExtractor {
    word_margin: f32,
    hyphenation: HyphenationHandler,
}

impl Default for EmbeddedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EmbeddedExtractor {
    /// Extractor with the default word margin.
    pub fn new() -> Self {
        Self {
            word_margin: WORD_MARGIN,
            hyphenation: HyphenationHandler::new(),
        }
    }

    /// Override the word margin.
    pub fn with_word_margin(mut self, margin: f32) -> Self {
        self.word_margin = margin;
        self
    }

    /// Text of the spans inside `block` (PDF points, top-left origin).
    pub fn extract(&self, spans: &[TextSpan], block: &BBox) -> EmbeddedText {
        let selected: Vec<&TextSpan> = spans
            .iter()
            .filter(|s| !s.text.is_empty() && inside(&s.bbox, block))
            .collect();
        if selected.is_empty() {
            return EmbeddedText::empty();
        }

        let lines = group_lines(&selected);
        let rendered: Vec<String> = lines.iter().map(|line| self.join_line(line)).collect();
        let text = normalize(self.hyphenation.join_lines(&rendered).trim());

        let coverage = selected
            .iter()
            .map(|s| s.bbox.intersection_area(block))
            .sum::<f32>()
            / block.area().max(f32::EPSILON);
        let confidence = score(&text, selected.len(), coverage);
        log::trace!(
            "embedded: {} spans, coverage {:.2}, confidence {:.2}",
            selected.len(),
            coverage,
            confidence
        );

        EmbeddedText {
            text,
            confidence,
            span_count: selected.len(),
        }
    }

    fn join_line(&self, line: &[&TextSpan]) -> String {
        let mut out = String::new();
        let mut prev: Option<&TextSpan> = None;
        for span in line {
            if let Some(p) = prev {
                if self.needs_space(p, span) {
                    out.push(' ');
                }
            }
            out.push_str(&span.text);
            prev = Some(span);
        }
        out.trim().to_string()
    }

    fn needs_space(&self, prev: &TextSpan, next: &TextSpan) -> bool {
        let has_boundary_whitespace = prev.text.ends_with(char::is_whitespace)
            || next.text.starts_with(char::is_whitespace);
        if has_boundary_whitespace {
            return false;
        }
        let gap = next.bbox.x1 - prev.bbox.x2;
        let margin = self.word_margin * prev.bbox.height().max(next.bbox.height());
        gap > margin
    }
}

fn inside(span: &BBox, block: &BBox) -> bool {
    let area = span.area();
    area > 0.0 && span.intersection_area(block) >= SPAN_INCLUSION * area
}

/// Group spans into lines, top to bottom; each line left to right.
fn group_lines<'a>(spans: &[&'a TextSpan]) -> Vec<Vec<&'a TextSpan>> {
    let mut heights: Vec<f32> = spans.iter().map(|s| s.bbox.height()).collect();
    heights.sort_by(|a, b| safe_float_cmp(*a, *b));
    let tolerance = heights[heights.len() / 2] / 2.0;

    let mut ordered: Vec<&TextSpan> = spans.to_vec();
    ordered.sort_by(|a, b| safe_float_cmp(a.bbox.center().1, b.bbox.center().1));

    let mut lines: Vec<Vec<&TextSpan>> = Vec::new();
    let mut line_centre = f32::NEG_INFINITY;
    for span in ordered {
        let centre = span.bbox.center().1;
        match lines.last_mut() {
            Some(line) if (centre - line_centre).abs() < tolerance => line.push(span),
            _ => {
                lines.push(vec![span]);
                line_centre = centre;
            },
        }
    }
    for line in &mut lines {
        line.sort_by(|a, b| safe_float_cmp(a.bbox.x1, b.bbox.x1));
    }
    lines
}

fn score(text: &str, span_count: usize, coverage: f32) -> f32 {
    let visible = text.chars().filter(|c| !c.is_whitespace()).count();
    let mut confidence = 1.0;

    if visible < TINY_TEXT_CHARS {
        confidence -= TINY_TEXT_PENALTY;
    } else if (visible as f32 / span_count as f32) < SHORT_SPAN_CHARS {
        confidence -= SHORT_SPAN_PENALTY;
    }

    if looks_glued(text) {
        confidence -= MISSING_SPACE_PENALTY;
    }

    if coverage < MIN_COVERAGE {
        confidence -= LOW_COVERAGE_PENALTY;
    }

    f32::clamp(confidence, 0.0, 1.0)
}

/// Long letter runs, or long text with almost no whitespace.
fn looks_glued(text: &str) -> bool {
    let mut run = 0usize;
    let mut longest = 0usize;
    for c in text.chars() {
        if c.is_alphabetic() {
            run += 1;
            longest = longest.max(run);
        } else {
            run = 0;
        }
    }
    if longest >= GLUED_RUN_LEN {
        return true;
    }
    let total = text.chars().count();
    let spaces = text.chars().filter(|c| c.is_whitespace()).count();
    total >= 40 && (spaces as f32 / total as f32) < 0.05
}
