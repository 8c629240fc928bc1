//! HTML rendering of a catalog.
//!
//! One `<section class="page">` per page; each block becomes an element whose
//! `id` is the block id, so a viewer can link text back to geometry.

use lazy_static::lazy_static;
use regex::Regex;

use crate::catalog::{Block, BlockRole, Catalog};

use super::{block_text, blocks_in_reading_order, figure_link, CatalogConverter};

lazy_static! {
    /// Regex for matching URLs in text
    static ref RE_URL: Regex = Regex::new(r"https?://[^\s<>()]+").unwrap();

    /// Regex for matching email addresses
    static ref RE_EMAIL: Regex = Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap();
}

/// Converter for catalog to HTML.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlConverter;

impl HtmlConverter {
    /// Create a new HTML converter.
    pub fn new() -> Self {
        Self
    }

    fn render_block(&self, block: &Block, out: &mut String) {
        let id = escape_html(&block.id);
        let text = block_text(block).map(linkify_urls_and_emails);
        if block.metadata.parent_id.is_some() {
            if let Some(text) = text {
                out.push_str(&format!("<p id=\"{}\" class=\"caption\">{}</p>\n", id, text));
            }
            return;
        }
        match block.role {
            BlockRole::Title => {
                out.push_str(&format!("<h2 id=\"{}\">{}</h2>\n", id, text.unwrap_or_default()));
            },
            BlockRole::List | BlockRole::ListItem => {
                out.push_str(&format!("<ul id=\"{}\">\n", id));
                for line in block_text(block).into_iter().flat_map(str::lines) {
                    let item = line.trim().trim_start_matches(['•', '-', '*', '·']).trim();
                    if !item.is_empty() {
                        out.push_str(&format!("<li>{}</li>\n", linkify_urls_and_emails(item)));
                    }
                }
                out.push_str("</ul>\n");
            },
            BlockRole::Figure | BlockRole::Table => {
                out.push_str(&format!("<figure id=\"{}\" class=\"{}\">\n", id, block.role.as_str().to_lowercase()));
                if let Some(link) = figure_link(block) {
                    out.push_str(&format!("<img src=\"{}\" alt=\"{}\">\n", escape_html(link), id));
                }
                if let Some(text) = text {
                    out.push_str(&format!("<figcaption>{}</figcaption>\n", text));
                }
                out.push_str("</figure>\n");
            },
            BlockRole::Separator => out.push_str(&format!("<hr id=\"{}\">\n", id)),
            BlockRole::Text | BlockRole::Other => {
                if let Some(text) = text {
                    out.push_str(&format!("<p id=\"{}\">{}</p>\n", id, text));
                }
            },
        }
    }
}

impl CatalogConverter for HtmlConverter {
    fn convert(&self, catalog: &Catalog) -> String {
        let title = escape_html(&catalog.metadata.source_path);
        let mut out = format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n",
            title
        );
        for (page_index, blocks) in blocks_in_reading_order(catalog).into_iter().enumerate() {
            out.push_str(&format!("<section class=\"page\" data-page=\"{}\">\n", page_index));
            for block in blocks {
                self.render_block(block, &mut out);
            }
            out.push_str("</section>\n");
        }
        out.push_str("</body>\n</html>\n");
        out
    }

    fn extension(&self) -> &'static str {
        "html"
    }
}

/// Escape HTML special characters.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// Escape `text` and turn URLs and email addresses into links.
///
/// # Examples
///
/// ```
/// # use pdf_catalog::converters::html::linkify_urls_and_emails;
/// let text = "Visit https://example.com or email test@example.com";
/// let linked = linkify_urls_and_emails(text);
/// assert!(linked.contains("<a href=\"https://example.com\">"));
/// assert!(linked.contains("<a href=\"mailto:test@example.com\">"));
/// ```
pub fn linkify_urls_and_emails(text: &str) -> String {
    let escaped = escape_html(text);

    let with_urls = RE_URL.replace_all(&escaped, |caps: &regex::Captures| {
        let url = &caps[0];
        format!(r#"<a href="{}">{}</a>"#, url, url)
    });

    let with_emails = RE_EMAIL.replace_all(&with_urls, |caps: &regex::Captures| {
        let email = &caps[0];
        format!(r#"<a href="mailto:{}">{}</a>"#, email, email)
    });

    with_emails.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PageInfo;
    use crate::geometry::BBox;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
    }

    #[test]
    fn test_sections_and_ids() {
        let bbox = BBox::new(0.0, 0.0, 10.0, 10.0);
        let mut catalog = Catalog {
            pages: vec![PageInfo::from_points(0, 612.0, 792.0, 72)],
            blocks: vec![
                Block::new("block_0_000", 0, BlockRole::Title, bbox).with_text("Dosing <adults>"),
                Block::new("block_0_001", 0, BlockRole::Text, bbox).with_text("See https://example.org"),
            ],
            reading_order: vec![vec!["block_0_000".to_string(), "block_0_001".to_string()]],
            ..Default::default()
        };
        catalog.metadata.source_path = "leaflet.pdf".to_string();
        let html = HtmlConverter::new().convert(&catalog);
        assert!(html.contains("<title>leaflet.pdf</title>"));
        assert!(html.contains("<section class=\"page\" data-page=\"0\">"));
        assert!(html.contains("<h2 id=\"block_0_000\">Dosing &lt;adults&gt;</h2>"));
        assert!(html.contains("<a href=\"https://example.org\">"));
    }
}
