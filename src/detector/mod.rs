//! Cascade detection
//!
//! Everything between the integral images and the final boxes:
//! - Feature responses over scaled windows
//! - Stage sums and the per-window stage state machine
//! - The multi-scale sliding-window scan
//! - Grouping of raw hits into detections

/// Cascade state machine for one window
pub mod evaluator;
/// Haar feature responses with variance normalization
pub mod feature;
/// Similarity grouping and overlap suppression
pub mod merge;
/// Sliding-window scan over scale levels
pub mod search;
/// Boosted stage sums
pub mod stage;

pub use evaluator::{CascadeEvaluator, CascadeRun, CascadeState, ScaledCascade};
pub use feature::FeatureEvaluator;
pub use merge::{DetectionMerger, MergeConfig};
pub use search::{CancelToken, MultiScaleSearch, ScaleLevel, SearchConfig, SearchTelemetry};
pub use stage::StageClassifier;
