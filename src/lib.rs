//! haar_cascade - Viola-Jones object detection in pure Rust
//!
//! Finds faces (or any object a cascade was trained on) in grayscale images
//! with a pretrained Haar cascade:
//! - integral images give O(1) rectangle sums
//! - stages of boosted weak classifiers reject most windows early
//! - a sliding window is scanned over geometrically growing sizes
//! - overlapping hits are grouped into final boxes
//!
//! ```no_run
//! use haar_cascade::{CascadeModel, Detector, DetectorConfig, PixelBuffer};
//!
//! let model = CascadeModel::from_path("haarcascade_frontalface_alt2.xml")?;
//! let gray = vec![0u8; 640 * 480];
//! let pixels = PixelBuffer::new(&gray, 640, 480)?;
//! let detector = Detector::with_config(DetectorConfig::default().with_min_neighbors(5));
//! for face in detector.detect(&model, &pixels)? {
//!     println!("{}x{} at ({}, {})", face.width, face.height, face.x, face.y);
//! }
//! # Ok::<(), haar_cascade::DetectError>(())
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Cascade model and OpenCV XML loading
pub mod cascade;
mod config;
mod debug;
/// Feature, stage and cascade evaluation, multi-scale search, merging
pub mod detector;
/// Error type
pub mod error;
/// Core data structures (PixelBuffer, Window, Detection)
pub mod models;
/// Grid tile mapping of detections
pub mod tiles;
/// Image loading and report helpers
pub mod tools;
/// Integral images and disjoint sets
pub mod utils;

pub use cascade::{Branch, CascadeModel, DecisionNode, HaarFeature, Stage, WeakClassifier, WeightedRect};
pub use detector::{
    CancelToken, CascadeEvaluator, CascadeState, DetectionMerger, FeatureEvaluator, MergeConfig,
    MultiScaleSearch, SearchConfig, SearchTelemetry, StageClassifier,
};
pub use error::{DetectError, Result};
pub use models::{Detection, PixelBuffer, RawHit, Window};
pub use tiles::{GridCell, face_tiles, grid_cell};
pub use utils::integral::{IntegralImage, IntegralImageBuilder, IntegralImages};

use image::GrayImage;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Search and merge parameters for [`Detector`]
#[derive(Debug, Clone, Default)]
pub struct DetectorConfig {
    /// Window sizes, stride and cancellation
    pub search: SearchConfig,
    /// Grouping of raw hits
    pub merge: MergeConfig,
}

impl DetectorConfig {
    /// Growth factor between window sizes (default 1.1)
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.search.scale_factor = scale_factor;
        self
    }

    /// Minimum summed hits per detection (default 3)
    pub fn with_min_neighbors(mut self, min_neighbors: u32) -> Self {
        self.merge.min_neighbors = min_neighbors;
        self
    }

    /// Smallest window width (default: cascade base width)
    pub fn with_min_size(mut self, min_size: u32) -> Self {
        self.search.min_size = Some(min_size);
        self
    }

    /// Largest window width (default: smaller image side)
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.search.max_size = Some(max_size);
        self
    }

    /// Stride as a fraction of the window width (default 0.1)
    pub fn with_step_ratio(mut self, step_ratio: f64) -> Self {
        self.search.step_ratio = step_ratio;
        self
    }

    /// Allow the search to be stopped between scale levels
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.search.cancel = Some(token);
        self
    }

    /// Check both parameter groups
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.merge.validate()
    }
}

/// Detector with configuration options
///
/// Holds parameters only; the cascade is passed to every call so one model
/// can serve many detectors and threads.
#[derive(Debug, Clone, Default)]
pub struct Detector {
    config: DetectorConfig,
}

impl Detector {
    /// Create a new detector with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detector with explicit parameters
    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Active parameters
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Detect objects in a grayscale buffer
    pub fn detect(&self, model: &CascadeModel, pixels: &PixelBuffer<'_>) -> Result<Vec<Detection>> {
        self.detect_with_telemetry(model, pixels).map(|(detections, _)| detections)
    }

    /// Detect objects in a grayscale image
    pub fn detect_image(&self, model: &CascadeModel, image: &GrayImage) -> Result<Vec<Detection>> {
        self.detect(model, &PixelBuffer::from(image))
    }

    /// Detect objects and report scan counters
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(w = pixels.width(), h = pixels.height())))]
    pub fn detect_with_telemetry(
        &self,
        model: &CascadeModel,
        pixels: &PixelBuffer<'_>,
    ) -> Result<(Vec<Detection>, SearchTelemetry)> {
        self.config.validate()?;

        // Step 1: Prefix-sum tables
        let images = IntegralImageBuilder::build(pixels)?;

        // Step 2: Scan every scale level
        let search = MultiScaleSearch::new(model, &images, &self.config.search)?;
        let (hits, telemetry) = search.run_with_telemetry()?;

        // Step 3: Group raw hits
        let detections = DetectionMerger::new(self.config.merge).merge(&hits);

        if cfg!(debug_assertions) && debug::debug_enabled() {
            eprintln!(
                "DETECT: {}x{} scales={} windows={} accepted={} detections={}",
                pixels.width(),
                pixels.height(),
                telemetry.scales,
                telemetry.windows,
                telemetry.accepted,
                detections.len()
            );
        }
        Ok((detections, telemetry))
    }
}

/// Detect objects in a row-major grayscale buffer with default settings
///
/// # Arguments
/// * `pixels` - Grayscale bytes (1 byte per pixel)
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
/// * `model` - Pretrained cascade
pub fn detect(pixels: &[u8], width: usize, height: usize, model: &CascadeModel) -> Result<Vec<Detection>> {
    let buffer = PixelBuffer::new(pixels, width, height)?;
    Detector::new().detect(model, &buffer)
}

/// Detect objects in a grayscale image with default settings
pub fn detect_image(image: &GrayImage, model: &CascadeModel) -> Result<Vec<Detection>> {
    Detector::new().detect_image(model, image)
}

/// Detect objects with default settings and report scan counters
pub fn detect_with_telemetry(
    pixels: &PixelBuffer<'_>,
    model: &CascadeModel,
) -> Result<(Vec<Detection>, SearchTelemetry)> {
    Detector::new().detect_with_telemetry(model, pixels)
}
