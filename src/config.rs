//! Ingestion configuration and profile presets.
//!
//! A [`Profile`] selects the detector label map and the default thresholds;
//! [`IngestConfig`] holds every tunable the pipeline reads. Options coming
//! from a JSON map (CLI `--config` file, caller-provided overrides) are
//! applied on top of a profile preset with [`IngestConfig::apply_options`].
//!
//! # Example
//!
//! ```
//! use pdf_catalog::config::{IngestConfig, Profile};
//!
//! let config = Profile::Marketing
//!     .create_config()
//!     .with_cache_dir("/tmp/catalogs")
//!     .with_box_padding(6.0);
//! assert_eq!(config.detection_dpi, 400);
//! assert_eq!(config.box_padding, 6.0);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// Named configuration bundle selecting label map and default thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    /// Scientific articles (PubLayNet-style detector)
    #[default]
    Scientific,
    /// Marketing one-pagers (PrimaLayout-style detector)
    Marketing,
}

impl Profile {
    /// Preset configuration for this profile.
    pub fn create_config(&self) -> IngestConfig {
        match self {
            Self::Scientific => IngestConfig::default(),
            Self::Marketing => Self::marketing_config(),
        }
    }

    fn marketing_config() -> IngestConfig {
        IngestConfig {
            profile: Profile::Marketing,
            detection_dpi: 400,
            score_threshold: 0.15,
            nms_threshold: 0.4,
            max_detections: 150,
            merge_threshold: 0.2,
            box_padding: 10.0,
            ..IngestConfig::default()
        }
    }

    /// Lowercase profile name as written to catalog metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scientific => "scientific",
            Self::Marketing => "marketing",
        }
    }
}

impl std::str::FromStr for Profile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "scientific" => Ok(Self::Scientific),
            "marketing" => Ok(Self::Marketing),
            other => Err(Error::Config(format!("unknown profile '{}'", other))),
        }
    }
}

/// Reading order policy used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadingOrderKind {
    /// Left half then right half, each top-to-bottom
    #[default]
    TwoColumn,
    /// Top-to-bottom, left-to-right over the whole page
    SingleColumn,
}

/// Full set of tunables for one ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Profile the defaults came from
    pub profile: Profile,
    /// DPI for rasterization and all bbox coordinates
    pub detection_dpi: u32,
    /// Minimum detector confidence
    pub score_threshold: f32,
    /// IoU threshold for detector NMS
    pub nms_threshold: f32,
    /// Maximum regions kept per page after NMS
    pub max_detections: usize,
    /// IoU threshold for same-role merging and overlap resolution
    pub merge_threshold: f32,
    /// Padding in pixels applied to every kept box
    pub box_padding: f32,
    /// Apply padding at all
    pub expand_boxes: bool,
    /// Merge fragmented same-role regions
    pub merge_overlapping: bool,
    /// Run spacing repair on low-confidence embedded text
    pub apply_text_processing: bool,
    /// Write debug overlays under `visualizations/`
    pub create_visualizations: bool,
    /// Persist raw and merged snapshots
    pub save_intermediate_states: bool,
    /// Root for per-document outputs
    pub cache_dir: PathBuf,
    /// Use the sanitized PDF stem as document id instead of a content hash
    pub human_readable_ids: bool,
    /// Per-page detector time budget
    pub detector_timeout: Option<Duration>,
    /// Per-block OCR time budget
    pub ocr_timeout: Option<Duration>,
    /// Domain words the spacing repair must never split
    pub preserve_terms: Vec<String>,
    /// Reading order policy
    pub reading_order: ReadingOrderKind,
    /// Write `document.md` and `document.html`
    pub write_renderings: bool,
    /// Record `created_at` in catalog metadata
    pub record_timestamp: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Scientific,
            detection_dpi: 200,
            score_threshold: 0.2,
            nms_threshold: 0.5,
            max_detections: 100,
            merge_threshold: 0.3,
            box_padding: 4.0,
            expand_boxes: true,
            merge_overlapping: true,
            apply_text_processing: true,
            create_visualizations: false,
            save_intermediate_states: false,
            cache_dir: PathBuf::from("cache"),
            human_readable_ids: false,
            detector_timeout: Some(Duration::from_secs(120)),
            ocr_timeout: Some(Duration::from_secs(60)),
            preserve_terms: Vec::new(),
            reading_order: ReadingOrderKind::TwoColumn,
            write_renderings: true,
            record_timestamp: true,
        }
    }
}

impl IngestConfig {
    /// Set the detection DPI.
    pub fn with_dpi(mut self, dpi: u32) -> Self {
        self.detection_dpi = dpi;
        self
    }

    /// Set the output root.
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the same-role merge threshold.
    pub fn with_merge_threshold(mut self, threshold: f32) -> Self {
        self.merge_threshold = threshold;
        self
    }

    /// Set the box padding in pixels.
    pub fn with_box_padding(mut self, px: f32) -> Self {
        self.box_padding = px;
        self
    }

    /// Enable or disable spacing repair.
    pub fn with_text_processing(mut self, enabled: bool) -> Self {
        self.apply_text_processing = enabled;
        self
    }

    /// Enable or disable debug overlays.
    pub fn with_visualizations(mut self, enabled: bool) -> Self {
        self.create_visualizations = enabled;
        self
    }

    /// Enable or disable raw/merged snapshots.
    pub fn with_intermediate_states(mut self, enabled: bool) -> Self {
        self.save_intermediate_states = enabled;
        self
    }

    /// Use readable document ids (PDF stem).
    pub fn with_human_readable_ids(mut self, enabled: bool) -> Self {
        self.human_readable_ids = enabled;
        self
    }

    /// Set the reading order policy.
    pub fn with_reading_order(mut self, kind: ReadingOrderKind) -> Self {
        self.reading_order = kind;
        self
    }

    /// Add domain terms that spacing repair must keep whole.
    pub fn with_preserve_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preserve_terms.extend(terms.into_iter().map(Into::into));
        self
    }

    /// Enable or disable `document.md` / `document.html`.
    pub fn with_renderings(mut self, enabled: bool) -> Self {
        self.write_renderings = enabled;
        self
    }

    /// Enable or disable the `created_at` timestamp.
    pub fn with_timestamp(mut self, enabled: bool) -> Self {
        self.record_timestamp = enabled;
        self
    }

    /// Set detector and OCR time budgets.
    pub fn with_timeouts(mut self, detector: Option<Duration>, ocr: Option<Duration>) -> Self {
        self.detector_timeout = detector;
        self.ocr_timeout = ocr;
        self
    }

    /// Apply a map of recognized options on top of this configuration.
    ///
    /// Unknown keys and ill-typed values are rejected.
    pub fn apply_options(&mut self, options: &Map<String, Value>) -> Result<()> {
        for (key, value) in options {
            match key.as_str() {
                "detection_dpi" => self.detection_dpi = as_u32(key, value)?,
                "score_threshold" => self.score_threshold = as_unit(key, value)?,
                "nms_threshold" => self.nms_threshold = as_unit(key, value)?,
                "max_detections" => self.max_detections = as_u32(key, value)? as usize,
                "merge_threshold" => self.merge_threshold = as_unit(key, value)?,
                "box_padding" => self.box_padding = as_f32(key, value)?.max(0.0),
                "expand_boxes" => self.expand_boxes = as_bool(key, value)?,
                "merge_overlapping" => self.merge_overlapping = as_bool(key, value)?,
                "apply_text_processing" => self.apply_text_processing = as_bool(key, value)?,
                "create_visualizations" => self.create_visualizations = as_bool(key, value)?,
                "save_intermediate_states" => {
                    self.save_intermediate_states = as_bool(key, value)?
                },
                "cache_dir" => self.cache_dir = PathBuf::from(as_str(key, value)?),
                "human_readable_ids" => self.human_readable_ids = as_bool(key, value)?,
                "detector_timeout_ms" => self.detector_timeout = as_timeout(key, value)?,
                "ocr_timeout_ms" => self.ocr_timeout = as_timeout(key, value)?,
                "write_renderings" => self.write_renderings = as_bool(key, value)?,
                "reading_order" => {
                    self.reading_order = serde_json::from_value(value.clone()).map_err(|_| {
                        Error::Config(format!("{}: expected two_column or single_column", key))
                    })?
                },
                "preserve_terms" => {
                    let terms = value.as_array().ok_or_else(|| {
                        Error::Config(format!("{}: expected an array of strings", key))
                    })?;
                    for term in terms {
                        self.preserve_terms.push(as_str(key, term)?.to_string());
                    }
                },
                _ => return Err(Error::Config(format!("unknown option '{}'", key))),
            }
        }
        if self.detection_dpi == 0 {
            return Err(Error::Config("detection_dpi must be positive".to_string()));
        }
        Ok(())
    }

    /// Load a profile preset and apply the JSON object stored at `path`.
    pub fn from_json_file(profile: Profile, path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&raw)?;
        let options = value
            .as_object()
            .ok_or_else(|| Error::Config(format!("{}: expected a JSON object", path.display())))?;
        let mut config = profile.create_config();
        config.apply_options(options)?;
        Ok(config)
    }
}

fn as_f32(key: &str, value: &Value) -> Result<f32> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| Error::Config(format!("{}: expected a number", key)))
}

fn as_unit(key: &str, value: &Value) -> Result<f32> {
    let v = as_f32(key, value)?;
    if (0.0..=1.0).contains(&v) {
        Ok(v)
    } else {
        Err(Error::Config(format!("{}: {} is outside [0, 1]", key, v)))
    }
}

fn as_u32(key: &str, value: &Value) -> Result<u32> {
    value
        .as_u64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| Error::Config(format!("{}: expected a non-negative integer", key)))
}

fn as_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| Error::Config(format!("{}: expected a boolean", key)))
}

fn as_str<'a>(key: &str, value: &'a Value) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::Config(format!("{}: expected a string", key)))
}

fn as_timeout(key: &str, value: &Value) -> Result<Option<Duration>> {
    if value.is_null() {
        return Ok(None);
    }
    Ok(Some(Duration::from_millis(u64::from(as_u32(key, value)?))))
}
