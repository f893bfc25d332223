//! Pretrained cascade representation
//!
//! A [`CascadeModel`] is an ordered list of [`Stage`]s over a fixed base
//! window. Each stage sums the outputs of its [`WeakClassifier`]s; each weak
//! classifier walks a small decision tree whose nodes threshold a
//! [`HaarFeature`] response. A stump (one node, two leaves) is the common
//! case.
//!
//! Models are validated once at construction and never change afterwards,
//! so a single model can back any number of concurrent searches.

mod xml;

use crate::error::{malformed, Result};
use std::path::Path;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Axis-aligned rectangle in base-window coordinates with a signed weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedRect {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Width
    pub width: u32,
    /// Height
    pub height: u32,
    /// Signed weight applied to the rectangle sum
    pub weight: f32,
}

impl WeightedRect {
    /// Create a weighted rectangle
    pub fn new(x: u32, y: u32, width: u32, height: u32, weight: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            weight,
        }
    }

    /// Rectangle area in base-window pixels
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    fn check(&self, window: (u32, u32)) -> std::result::Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "rectangle {}x{} at ({}, {}) is empty",
                self.width, self.height, self.x, self.y
            ));
        }
        let right = self.x as u64 + self.width as u64;
        let bottom = self.y as u64 + self.height as u64;
        if right > window.0 as u64 || bottom > window.1 as u64 {
            return Err(format!(
                "rectangle ({}, {}, {}, {}) leaves the {}x{} window",
                self.x, self.y, self.width, self.height, window.0, window.1
            ));
        }
        if !self.weight.is_finite() {
            return Err(format!("rectangle weight {} is not finite", self.weight));
        }
        Ok(())
    }
}

/// Haar-like feature: two or three weighted rectangles
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HaarFeature {
    /// Edge / line features made of two rectangles
    TwoRect([WeightedRect; 2]),
    /// Center-surround and three-band features
    ThreeRect([WeightedRect; 3]),
}

impl HaarFeature {
    /// Build from a rectangle list; anything but 2 or 3 rectangles is malformed
    pub fn from_rects(rects: &[WeightedRect]) -> Result<Self> {
        match rects {
            [a, b] => Ok(HaarFeature::TwoRect([*a, *b])),
            [a, b, c] => Ok(HaarFeature::ThreeRect([*a, *b, *c])),
            _ => Err(malformed(format!(
                "feature must have 2 or 3 rectangles, found {}",
                rects.len()
            ))),
        }
    }

    /// Rectangles of the feature
    pub fn rects(&self) -> &[WeightedRect] {
        match self {
            HaarFeature::TwoRect(r) => r,
            HaarFeature::ThreeRect(r) => r,
        }
    }
}

/// Where a decision node sends the window next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    /// Continue at another node of the same tree
    Node(usize),
    /// Stop and emit a leaf value
    Leaf(usize),
}

/// One split of a weak classifier tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionNode {
    /// Feature thresholded by this node
    pub feature: HaarFeature,
    /// Responses below this go left
    pub threshold: f32,
    /// Branch taken when response < threshold
    pub left: Branch,
    /// Branch taken otherwise
    pub right: Branch,
}

/// Boosted weak learner: a small tree of feature thresholds
#[derive(Debug, Clone, PartialEq)]
pub struct WeakClassifier {
    nodes: Vec<DecisionNode>,
    leaves: Vec<f32>,
}

impl WeakClassifier {
    /// Single-split classifier: `left` if response < threshold, else `right`
    pub fn stump(feature: HaarFeature, threshold: f32, left: f32, right: f32) -> Self {
        Self {
            nodes: vec![DecisionNode {
                feature,
                threshold,
                left: Branch::Leaf(0),
                right: Branch::Leaf(1),
            }],
            leaves: vec![left, right],
        }
    }

    /// General tree; node 0 is the root. Structure is checked when the
    /// classifier is placed in a [`CascadeModel`].
    pub fn tree(nodes: Vec<DecisionNode>, leaves: Vec<f32>) -> Self {
        Self { nodes, leaves }
    }

    /// Decision nodes, root first
    pub fn nodes(&self) -> &[DecisionNode] {
        &self.nodes
    }

    /// Leaf values
    pub fn leaves(&self) -> &[f32] {
        &self.leaves
    }

    fn check(&self, window: (u32, u32)) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("classifier has no decision nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            if !node.threshold.is_finite() {
                return Err(format!("node {} threshold {} is not finite", i, node.threshold));
            }
            for rect in node.feature.rects() {
                rect.check(window).map_err(|e| format!("node {}: {}", i, e))?;
            }
            for branch in [node.left, node.right] {
                match branch {
                    // Children must come after their parent, which rules out cycles
                    Branch::Node(next) if next <= i || next >= self.nodes.len() => {
                        return Err(format!("node {} points to invalid node {}", i, next));
                    }
                    Branch::Leaf(leaf) if leaf >= self.leaves.len() => {
                        return Err(format!("node {} points to missing leaf {}", i, leaf));
                    }
                    _ => {}
                }
            }
        }
        if let Some(v) = self.leaves.iter().find(|v| !v.is_finite()) {
            return Err(format!("leaf value {} is not finite", v));
        }
        Ok(())
    }
}

/// Boosted stage: passes when the summed classifier outputs reach `threshold`
#[derive(Debug, Clone, PartialEq)]
pub struct Stage {
    classifiers: Vec<WeakClassifier>,
    threshold: f32,
}

impl Stage {
    /// Create a stage. A threshold of `f32::NEG_INFINITY` accepts every window.
    pub fn new(classifiers: Vec<WeakClassifier>, threshold: f32) -> Self {
        Self {
            classifiers,
            threshold,
        }
    }

    /// Weak classifiers in evaluation order
    pub fn classifiers(&self) -> &[WeakClassifier] {
        &self.classifiers
    }

    /// Acceptance threshold
    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

/// Immutable pretrained cascade
#[derive(Debug, Clone, PartialEq)]
pub struct CascadeModel {
    window_width: u32,
    window_height: u32,
    stages: Vec<Stage>,
}

impl CascadeModel {
    /// Validate and assemble a cascade over a `window.0` x `window.1` base window.
    ///
    /// Fails with `MalformedCascade` on an empty stage list, rectangles
    /// outside the base window, non-finite thresholds or leaves, or broken
    /// tree structure.
    pub fn new(window: (u32, u32), stages: Vec<Stage>) -> Result<Self> {
        if window.0 == 0 || window.1 == 0 {
            return Err(malformed(format!(
                "base window must be non-empty, got {}x{}",
                window.0, window.1
            )));
        }
        if stages.is_empty() {
            return Err(malformed("cascade has no stages"));
        }
        for (s, stage) in stages.iter().enumerate() {
            // -inf is the always-pass sentinel; NaN and +inf are rejected
            if stage.threshold.is_nan() || stage.threshold == f32::INFINITY {
                return Err(malformed(format!(
                    "stage {} threshold {} is not usable",
                    s, stage.threshold
                )));
            }
            for (c, classifier) in stage.classifiers.iter().enumerate() {
                classifier
                    .check(window)
                    .map_err(|e| malformed(format!("stage {} classifier {}: {}", s, c, e)))?;
            }
        }
        Ok(Self {
            window_width: window.0,
            window_height: window.1,
            stages,
        })
    }

    /// Parse an OpenCV cascade XML definition (current or legacy layout)
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(definition), fields(len = definition.len())))]
    pub fn load(definition: &str) -> Result<Self> {
        let model = xml::parse(definition)?;
        if cfg!(debug_assertions) && crate::debug::debug_enabled() {
            eprintln!(
                "CASCADE: loaded {}x{} window, {} stages, {} classifiers",
                model.window_width,
                model.window_height,
                model.stages.len(),
                model.classifier_count()
            );
        }
        Ok(model)
    }

    /// Read and parse a cascade file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::load(&text)
    }

    /// Base window (width, height)
    pub fn window_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    /// Stages in evaluation order
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Total weak classifiers across all stages
    pub fn classifier_count(&self) -> usize {
        self.stages.iter().map(|s| s.classifiers.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DetectError;

    fn edge_feature() -> HaarFeature {
        HaarFeature::TwoRect([
            WeightedRect::new(0, 0, 24, 12, -1.0),
            WeightedRect::new(0, 12, 24, 12, 1.0),
        ])
    }

    #[test]
    fn test_valid_model() {
        let stage = Stage::new(
            vec![WeakClassifier::stump(edge_feature(), 0.1, -1.0, 1.0)],
            0.0,
        );
        let model = CascadeModel::new((24, 24), vec![stage]).unwrap();
        assert_eq!(model.window_size(), (24, 24));
        assert_eq!(model.stage_count(), 1);
        assert_eq!(model.classifier_count(), 1);
    }

    #[test]
    fn test_zero_stages_is_malformed() {
        let err = CascadeModel::new((24, 24), vec![]).unwrap_err();
        assert!(matches!(err, DetectError::MalformedCascade(_)));
    }

    #[test]
    fn test_rect_outside_window_is_malformed() {
        let feature = HaarFeature::TwoRect([
            WeightedRect::new(0, 0, 20, 12, -1.0),
            WeightedRect::new(10, 12, 20, 12, 1.0),
        ]);
        let stage = Stage::new(vec![WeakClassifier::stump(feature, 0.0, -1.0, 1.0)], 0.0);
        assert!(CascadeModel::new((24, 24), vec![stage]).is_err());
    }

    #[test]
    fn test_non_finite_thresholds_are_malformed() {
        let nan_node = Stage::new(
            vec![WeakClassifier::stump(edge_feature(), f32::NAN, -1.0, 1.0)],
            0.0,
        );
        assert!(CascadeModel::new((24, 24), vec![nan_node]).is_err());

        let inf_leaf = Stage::new(
            vec![WeakClassifier::stump(edge_feature(), 0.0, f32::INFINITY, 1.0)],
            0.0,
        );
        assert!(CascadeModel::new((24, 24), vec![inf_leaf]).is_err());

        let nan_stage = Stage::new(vec![], f32::NAN);
        assert!(CascadeModel::new((24, 24), vec![nan_stage]).is_err());

        let pos_inf_stage = Stage::new(vec![], f32::INFINITY);
        assert!(CascadeModel::new((24, 24), vec![pos_inf_stage]).is_err());
    }

    #[test]
    fn test_neg_infinity_stage_threshold_is_accepted() {
        let stage = Stage::new(vec![], f32::NEG_INFINITY);
        assert!(CascadeModel::new((20, 20), vec![stage]).is_ok());
    }

    #[test]
    fn test_feature_rect_count() {
        let r = WeightedRect::new(0, 0, 2, 2, 1.0);
        assert!(HaarFeature::from_rects(&[r]).is_err());
        assert!(matches!(
            HaarFeature::from_rects(&[r, r]),
            Ok(HaarFeature::TwoRect(_))
        ));
        assert!(matches!(
            HaarFeature::from_rects(&[r, r, r]),
            Ok(HaarFeature::ThreeRect(_))
        ));
        assert!(HaarFeature::from_rects(&[r, r, r, r]).is_err());
    }

    #[test]
    fn test_tree_structure_is_checked() {
        let node = |left, right| DecisionNode {
            feature: edge_feature(),
            threshold: 0.0,
            left,
            right,
        };
        // Root -> node 1 -> leaves: fine
        let ok = WeakClassifier::tree(
            vec![
                node(Branch::Node(1), Branch::Leaf(0)),
                node(Branch::Leaf(1), Branch::Leaf(2)),
            ],
            vec![0.1, 0.2, 0.3],
        );
        assert!(CascadeModel::new((24, 24), vec![Stage::new(vec![ok], 0.0)]).is_ok());

        // Back edge
        let cycle = WeakClassifier::tree(
            vec![
                node(Branch::Node(1), Branch::Leaf(0)),
                node(Branch::Node(0), Branch::Leaf(1)),
            ],
            vec![0.1, 0.2],
        );
        assert!(CascadeModel::new((24, 24), vec![Stage::new(vec![cycle], 0.0)]).is_err());

        // Missing leaf
        let dangling = WeakClassifier::tree(vec![node(Branch::Leaf(0), Branch::Leaf(5))], vec![0.1]);
        assert!(CascadeModel::new((24, 24), vec![Stage::new(vec![dangling], 0.0)]).is_err());
    }
}
