//! OCR engines for the raster extractor.
//!
//! An [`OcrEngine`] is built once and shared; it receives a preprocessed
//! grayscale crop and returns text with a confidence in [0, 1].
//! With the `ocr` feature, [`TesseractEngine`] runs Tesseract in process
//! through `leptess`.

use image::GrayImage;

use crate::error::Result;

/// Text recognized in one image.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrOutput {
    /// Recognized text, lines separated by `\n`
    pub text: String,
    /// Mean word confidence in [0, 1]; 0 when nothing was recognized
    pub confidence: f32,
}

impl OcrOutput {
    /// Output with no text.
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
        }
    }

    /// Normalize raw engine output: trailing whitespace and blank lines are
    /// dropped, `mean_confidence` on a 0-100 scale is mapped to [0, 1].
    pub fn from_raw(text: &str, mean_confidence: i32) -> Self {
        let text = text
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return Self::empty();
        }
        Self {
            text,
            confidence: (mean_confidence as f32 / 100.0).clamp(0.0, 1.0),
        }
    }
}

/// Image → text.
pub trait OcrEngine: Send + Sync {
    /// Recognize text in a grayscale image.
    fn recognize(&self, image: &GrayImage) -> Result<OcrOutput>;

    /// Name for logs.
    fn name(&self) -> &str;
}

#[cfg(feature = "ocr")]
pub use tesseract::TesseractEngine;

#[cfg(feature = "ocr")]
mod tesseract {
    use image::GrayImage;
    use leptess::{LepTess, Variable};

    use super::{OcrEngine, OcrOutput};
    use crate::error::{Error, Result};

    /// Tesseract through `leptess`.
    ///
    /// `LepTess` handles are not shareable across threads, so each call
    /// initializes its own; the language data is checked once in [`new`](Self::new).
    #[derive(Debug, Clone)]
    pub struct TesseractEngine {
        language: String,
        page_segmentation_mode: u32,
    }

    impl TesseractEngine {
        /// Engine for `language` (e.g. `eng`, `eng+deu`), one uniform block
        /// of text (PSM 6). Fails when the language data is not installed.
        pub fn new(language: impl Into<String>) -> Result<Self> {
            let engine = Self {
                language: language.into(),
                page_segmentation_mode: 6,
            };
            engine.session()?;
            log::info!("tesseract ready for language '{}'", engine.language);
            Ok(engine)
        }

        /// Set the page segmentation mode.
        pub fn with_psm(mut self, psm: u32) -> Self {
            self.page_segmentation_mode = psm;
            self
        }

        /// Recognition language(s).
        pub fn language(&self) -> &str {
            &self.language
        }

        fn session(&self) -> Result<LepTess> {
            let mut lt = LepTess::new(None, &self.language).map_err(|e| {
                Error::Ocr(format!(
                    "cannot initialize tesseract for '{}': {}",
                    self.language, e
                ))
            })?;
            lt.set_variable(
                Variable::TesseditPagesegMode,
                &self.page_segmentation_mode.to_string(),
            )
            .map_err(|e| Error::Ocr(format!("cannot set page segmentation mode: {}", e)))?;
            Ok(lt)
        }
    }

    impl OcrEngine for TesseractEngine {
        fn recognize(&self, image: &GrayImage) -> Result<OcrOutput> {
            let (width, height) = image.dimensions();
            if width == 0 || height == 0 {
                return Err(Error::Ocr(format!("empty image {}x{}", width, height)));
            }

            // leptess decodes from an encoded buffer.
            let mut png = std::io::Cursor::new(Vec::new());
            image
                .write_to(&mut png, image::ImageFormat::Png)
                .map_err(|e| Error::Image(e.to_string()))?;

            let mut lt = self.session()?;
            lt.set_image_from_mem(png.get_ref())
                .map_err(|e| Error::Ocr(format!("cannot load image: {}", e)))?;
            let text = lt
                .get_utf8_text()
                .map_err(|e| Error::Ocr(format!("invalid utf-8 from tesseract: {}", e)))?;
            Ok(OcrOutput::from_raw(&text, lt.mean_text_conf()))
        }

        fn name(&self) -> &str {
            "tesseract"
        }
    }

}
