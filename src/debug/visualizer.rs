//! Block overlays on page rasters.

use std::collections::HashMap;
use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::catalog::{Block, BlockRole, Catalog};
use crate::error::Result;
use crate::geometry::BBox;

/// Outline colour per role.
#[derive(Debug, Clone)]
pub struct RoleColors {
    /// Title blocks
    pub title: [u8; 3],
    /// Text blocks
    pub text: [u8; 3],
    /// List and list item blocks
    pub list: [u8; 3],
    /// Table blocks
    pub table: [u8; 3],
    /// Figure blocks
    pub figure: [u8; 3],
    /// Separators and anything else
    pub other: [u8; 3],
}

impl Default for RoleColors {
    fn default() -> Self {
        Self {
            title: [220, 30, 30],  // red
            text: [30, 90, 220],   // blue
            list: [30, 160, 60],   // green
            table: [230, 160, 0],  // amber
            figure: [170, 40, 200], // purple
            other: [120, 120, 120], // grey
        }
    }
}

impl RoleColors {
    /// Colour for `role`.
    pub fn for_role(&self, role: BlockRole) -> [u8; 3] {
        match role {
            BlockRole::Title => self.title,
            BlockRole::Text => self.text,
            BlockRole::List | BlockRole::ListItem => self.list,
            BlockRole::Table => self.table,
            BlockRole::Figure => self.figure,
            BlockRole::Separator | BlockRole::Other => self.other,
        }
    }
}

/// Options for debug visualization.
#[derive(Debug, Clone)]
pub struct DebugOptions {
    /// Draw separators and other decorative blocks
    pub show_decorative: bool,
    /// Draw each block's reading-order index at its top-left corner
    pub show_order_index: bool,
    /// Outline thickness in pixels
    pub line_width: u32,
    /// Outline colours
    pub colors: RoleColors,
}

impl Default for DebugOptions {
    fn default() -> Self {
        Self {
            show_decorative: true,
            show_order_index: true,
            line_width: 3,
            colors: RoleColors::default(),
        }
    }
}

impl DebugOptions {
    /// Outlines only, no index labels.
    pub fn outlines_only() -> Self {
        Self {
            show_order_index: false,
            ..Default::default()
        }
    }
}

/// Draws catalog blocks over page rasters.
#[derive(Debug, Clone, Default)]
pub struct DebugVisualizer {
    options: DebugOptions,
}

impl DebugVisualizer {
    /// Create a new debug visualizer with the given options.
    pub fn new(options: DebugOptions) -> Self {
        Self { options }
    }

    /// Copy of `image` with the blocks of `page_index` outlined.
    pub fn render_page(&self, image: &RgbImage, catalog: &Catalog, page_index: usize) -> RgbImage {
        let mut canvas = image.clone();
        let positions = order_positions(catalog, page_index);

        for block in self.visible_blocks(catalog, page_index) {
            let color = Rgb(self.options.colors.for_role(block.role));
            for inset in 0..self.options.line_width {
                if let Some(rect) = to_rect(&block.bbox.pad(-(inset as f32)), canvas.width(), canvas.height()) {
                    draw_hollow_rect_mut(&mut canvas, rect, color);
                }
            }
            if self.options.show_order_index {
                if let Some(&position) = positions.get(block.id.as_str()) {
                    draw_number(&mut canvas, position, block.bbox.x1, block.bbox.y1, color);
                }
            }
        }
        canvas
    }

    /// Render and save to `path` (PNG).
    pub fn render_page_to_file(
        &self,
        image: &RgbImage,
        catalog: &Catalog,
        page_index: usize,
        path: impl AsRef<Path>,
    ) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.render_page(image, catalog, page_index).save(path)?;
        Ok(())
    }

    /// SVG with one outlined `<rect>` per block, labelled with the
    /// reading-order index.
    pub fn export_page_svg(&self, catalog: &Catalog, page_index: usize) -> String {
        let (width, height) = catalog
            .pages
            .get(page_index)
            .map(|p| (p.pixel_width, p.pixel_height))
            .unwrap_or((0, 0));
        let positions = order_positions(catalog, page_index);

        let mut svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">"#,
            width, height, width, height
        );
        for block in self.visible_blocks(catalog, page_index) {
            let b = &block.bbox;
            svg.push_str(&format!(
                r#"<rect id="{}" class="{}" x="{}" y="{}" width="{}" height="{}" fill="none" stroke="{}" stroke-width="{}"/>"#,
                block.id,
                block.role,
                b.x1,
                b.y1,
                b.width(),
                b.height(),
                color_to_svg(self.options.colors.for_role(block.role)),
                self.options.line_width
            ));
            if let (true, Some(position)) = (self.options.show_order_index, positions.get(block.id.as_str())) {
                svg.push_str(&format!(
                    r#"<text x="{}" y="{}" font-size="14">{}</text>"#,
                    b.x1 + 2.0,
                    b.y1 + 14.0,
                    position
                ));
            }
        }
        svg.push_str("</svg>");
        svg
    }

    fn visible_blocks<'a>(&'a self, catalog: &'a Catalog, page_index: usize) -> impl Iterator<Item = &'a Block> {
        catalog
            .blocks_on_page(page_index)
            .filter(move |b| self.options.show_decorative || !b.role.is_decorative())
    }
}

fn order_positions(catalog: &Catalog, page_index: usize) -> HashMap<&str, usize> {
    catalog
        .reading_order
        .get(page_index)
        .map(|ids| ids.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect())
        .unwrap_or_default()
}

fn to_rect(bbox: &BBox, width: u32, height: u32) -> Option<Rect> {
    let clipped = bbox.clip(width as f32, height as f32)?;
    let w = clipped.width().round() as u32;
    let h = clipped.height().round() as u32;
    (w > 0 && h > 0).then(|| Rect::at(clipped.x1.round() as i32, clipped.y1.round() as i32).of_size(w, h))
}

fn color_to_svg(color: [u8; 3]) -> String {
    format!("rgb({},{},{})", color[0], color[1], color[2])
}

/// 3x5 digit glyphs, one row per byte, high three bits used.
const DIGITS: [[u8; 5]; 10] = [
    [0b111, 0b101, 0b101, 0b101, 0b111],
    [0b010, 0b110, 0b010, 0b010, 0b111],
    [0b111, 0b001, 0b111, 0b100, 0b111],
    [0b111, 0b001, 0b111, 0b001, 0b111],
    [0b101, 0b101, 0b111, 0b001, 0b001],
    [0b111, 0b100, 0b111, 0b001, 0b111],
    [0b111, 0b100, 0b111, 0b101, 0b111],
    [0b111, 0b001, 0b010, 0b010, 0b010],
    [0b111, 0b101, 0b111, 0b101, 0b111],
    [0b111, 0b101, 0b111, 0b001, 0b111],
];

const GLYPH_SCALE: u32 = 4;

/// Draw `n` on a white plate with its top-left corner at `(x, y)`.
fn draw_number(canvas: &mut RgbImage, n: usize, x: f32, y: f32, color: Rgb<u8>) {
    let text = n.to_string();
    let glyph_w = 3 * GLYPH_SCALE;
    let advance = glyph_w + GLYPH_SCALE;
    let plate_w = advance * text.len() as u32 + GLYPH_SCALE;
    let plate_h = 5 * GLYPH_SCALE + 2 * GLYPH_SCALE;
    let (x0, y0) = (x.max(0.0) as i32, y.max(0.0) as i32);
    draw_filled_rect_mut(canvas, Rect::at(x0, y0).of_size(plate_w, plate_h), Rgb([255, 255, 255]));

    for (i, digit) in text.bytes().enumerate() {
        let glyph = &DIGITS[(digit - b'0') as usize];
        let gx = x0 + (GLYPH_SCALE + i as u32 * advance) as i32;
        let gy = y0 + GLYPH_SCALE as i32;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..3 {
                if bits & (0b100 >> col) != 0 {
                    let px = gx + (col * GLYPH_SCALE) as i32;
                    let py = gy + (row as u32 * GLYPH_SCALE) as i32;
                    draw_filled_rect_mut(canvas, Rect::at(px, py).of_size(GLYPH_SCALE, GLYPH_SCALE), color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PageInfo;

    fn catalog() -> Catalog {
        Catalog {
            pages: vec![PageInfo::from_points(0, 200.0, 200.0, 72)],
            blocks: vec![
                Block::new("block_0_000", 0, BlockRole::Title, BBox::new(10.0, 10.0, 190.0, 60.0)),
                Block::new("block_0_001", 0, BlockRole::Separator, BBox::new(10.0, 100.0, 190.0, 104.0)),
            ],
            reading_order: vec![vec!["block_0_000".to_string()]],
            ..Default::default()
        }
    }

    #[test]
    fn test_role_colors() {
        let colors = RoleColors::default();
        assert_eq!(colors.for_role(BlockRole::ListItem), colors.list);
        assert_eq!(colors.for_role(BlockRole::Separator), colors.other);
    }

    #[test]
    fn test_render_page_draws_outlines() {
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let out = DebugVisualizer::default().render_page(&image, &catalog(), 0);
        assert_eq!(out.dimensions(), (200, 200));
        // Right edge of the title outline; the index plate sits top-left.
        assert_eq!(out.get_pixel(189, 30).0, RoleColors::default().title);
        assert_eq!(out.get_pixel(100, 150).0, [255, 255, 255]);
    }

    #[test]
    fn test_decoratives_can_be_hidden() {
        let image = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        let options = DebugOptions {
            show_decorative: false,
            ..DebugOptions::outlines_only()
        };
        let out = DebugVisualizer::new(options).render_page(&image, &catalog(), 0);
        assert_eq!(out.get_pixel(100, 100).0, [255, 255, 255]);
    }

    #[test]
    fn test_svg_export() {
        let svg = DebugVisualizer::default().export_page_svg(&catalog(), 0);
        assert!(svg.starts_with("<svg"));
        assert!(svg.contains(r#"id="block_0_000" class="Title""#));
        assert!(svg.contains(">0</text>"));
        assert_eq!(svg.matches("<text").count(), 1);
    }

    #[test]
    fn test_color_to_svg() {
        assert_eq!(color_to_svg([255, 0, 10]), "rgb(255,0,10)");
    }
}
