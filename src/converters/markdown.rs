//! Markdown rendering of a catalog.

use lazy_static::lazy_static;
use regex::Regex;

use crate::catalog::{Block, BlockRole, Catalog};

use super::{block_text, blocks_in_reading_order, figure_link, CatalogConverter};

lazy_static! {
    static ref RE_BLANK_RUN: Regex = Regex::new(r"\n{3,}").unwrap();
    static ref RE_TRAILING_SPACE: Regex = Regex::new(r"(?m)[ \t]+$").unwrap();
}

/// Strip trailing spaces and collapse blank-line runs, which OCR text and
/// empty blocks otherwise leave between paragraphs.
fn tidy(markdown: &str) -> String {
    let trimmed = RE_TRAILING_SPACE.replace_all(markdown, "");
    RE_BLANK_RUN.replace_all(&trimmed, "\n\n").into_owned()
}

/// Converter for catalog to Markdown.
///
/// Titles become `##` headings, list items `-` bullets, figures and tables
/// image links to their crops followed by their caption in italics.
#[derive(Debug, Clone, Default)]
pub struct MarkdownConverter {
    page_markers: bool,
}

impl MarkdownConverter {
    /// Create a new Markdown converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an HTML comment before every page.
    pub fn with_page_markers(mut self, enabled: bool) -> Self {
        self.page_markers = enabled;
        self
    }

    fn render_block(&self, block: &Block, out: &mut String) {
        let text = block_text(block);
        if block.metadata.parent_id.is_some() {
            if let Some(text) = text {
                out.push_str(&format!("*{}*\n\n", text));
            }
            return;
        }
        match block.role {
            BlockRole::Title => {
                if let Some(text) = text {
                    out.push_str(&format!("## {}\n\n", text.replace('\n', " ")));
                }
            },
            BlockRole::List | BlockRole::ListItem => {
                for line in text.into_iter().flat_map(str::lines) {
                    let item = line.trim().trim_start_matches(['•', '-', '*', '·']).trim();
                    if !item.is_empty() {
                        out.push_str(&format!("- {}\n", item));
                    }
                }
                out.push('\n');
            },
            BlockRole::Figure | BlockRole::Table => {
                if let Some(link) = figure_link(block) {
                    out.push_str(&format!("![{} {}]({})\n\n", block.role, block.id, link));
                }
                if let Some(text) = text {
                    out.push_str(&format!("*{}*\n\n", text));
                }
            },
            BlockRole::Separator => out.push_str("---\n\n"),
            BlockRole::Text | BlockRole::Other => {
                if let Some(text) = text {
                    out.push_str(text);
                    out.push_str("\n\n");
                }
            },
        }
    }
}

impl CatalogConverter for MarkdownConverter {
    fn convert(&self, catalog: &Catalog) -> String {
        let mut out = String::new();
        for (page_index, blocks) in blocks_in_reading_order(catalog).into_iter().enumerate() {
            if self.page_markers {
                out.push_str(&format!("<!-- page {} -->\n\n", page_index));
            }
            for block in blocks {
                self.render_block(block, &mut out);
            }
        }
        tidy(out.trim_end()) + "\n"
    }

    fn extension(&self) -> &'static str {
        "md"
    }
}
