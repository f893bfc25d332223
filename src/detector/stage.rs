/// Stage evaluation: boosted sums of weak classifier outputs
use super::feature::{Probe, ScaledFeature, WindowScale, window_fits};
use crate::cascade::{Branch, Stage, WeakClassifier};
use crate::models::Window;
use crate::utils::integral::{IntegralImage, IntegralImages};

#[derive(Debug, Clone)]
struct ScaledNode {
    feature: ScaledFeature,
    threshold: f64,
    left: Branch,
    right: Branch,
}

/// Weak classifier with its features resolved for one scale level
#[derive(Debug, Clone)]
pub struct ScaledClassifier {
    nodes: Vec<ScaledNode>,
    leaves: Vec<f64>,
}

impl ScaledClassifier {
    /// Resolve every node feature of `classifier` for `scale`
    pub fn new(classifier: &WeakClassifier, scale: &WindowScale) -> Self {
        Self {
            nodes: classifier
                .nodes()
                .iter()
                .map(|n| ScaledNode {
                    feature: ScaledFeature::new(&n.feature, scale),
                    threshold: n.threshold as f64,
                    left: n.left,
                    right: n.right,
                })
                .collect(),
            leaves: classifier.leaves().iter().map(|&v| v as f64).collect(),
        }
    }

    /// Walk the tree from the root and return the reached leaf value
    #[inline]
    pub fn predict(&self, sum: &IntegralImage, probe: &Probe) -> f64 {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            let next = if node.feature.response(sum, probe) < node.threshold {
                node.left
            } else {
                node.right
            };
            match next {
                Branch::Node(child) => idx = child,
                Branch::Leaf(leaf) => return self.leaves[leaf],
            }
        }
    }
}

/// Stage with its classifiers resolved for one scale level
#[derive(Debug, Clone)]
pub struct ScaledStage {
    classifiers: Vec<ScaledClassifier>,
    threshold: f64,
}

impl ScaledStage {
    /// Resolve `stage` for `scale`
    pub fn new(stage: &Stage, scale: &WindowScale) -> Self {
        Self {
            classifiers: stage
                .classifiers()
                .iter()
                .map(|c| ScaledClassifier::new(c, scale))
                .collect(),
            threshold: stage.threshold() as f64,
        }
    }

    /// Summed classifier outputs at the probed window
    #[inline]
    pub fn score(&self, sum: &IntegralImage, probe: &Probe) -> f64 {
        self.classifiers.iter().map(|c| c.predict(sum, probe)).sum()
    }

    /// Whether the window reaches the stage threshold
    #[inline]
    pub fn passes(&self, sum: &IntegralImage, probe: &Probe) -> bool {
        self.score(sum, probe) >= self.threshold
    }
}

/// One-off stage evaluation
pub struct StageClassifier;

impl StageClassifier {
    /// Whether `window` passes `stage` of a cascade with the given base window.
    /// Empty windows and windows reaching outside the image never pass.
    pub fn evaluate(
        stage: &Stage,
        base: (u32, u32),
        images: &IntegralImages,
        window: &Window,
    ) -> bool {
        if !window_fits(images, window) {
            return false;
        }
        let scale = WindowScale::new(base, window.width, window.height, images.sum.stride());
        let probe = scale.probe(images, window.x, window.y);
        ScaledStage::new(stage, &scale).passes(&images.sum, &probe)
    }
}
