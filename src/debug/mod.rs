//! Debug overlays for layout inspection.
//!
//! Renders each page raster with block outlines coloured by role and the
//! block's position in the page's reading order, written to
//! `visualizations/page-NNN.png` when `create_visualizations` is on.
//!
//! ## Example
//!
//! ```ignore
//! use pdf_catalog::debug::{DebugOptions, DebugVisualizer};
//!
//! let visualizer = DebugVisualizer::new(DebugOptions::default());
//! visualizer.render_page_to_file(&page.image, &catalog, 0, "page-000.png")?;
//! ```

mod visualizer;

pub use visualizer::{DebugOptions, DebugVisualizer, RoleColors};
