//! Cascade evaluation for a single window
//!
//! Stages run strictly in stored order. The first failing stage rejects the
//! window and nothing after it is evaluated; passing the last stage accepts.

use super::feature::{Probe, WindowScale, window_fits};
use super::stage::ScaledStage;
use crate::cascade::CascadeModel;
use crate::models::Window;
use crate::utils::integral::{IntegralImage, IntegralImages};

/// Progress of one window through the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeState {
    /// Stage `i` is next
    Evaluating(usize),
    /// Stage `i` failed (terminal)
    Rejected(usize),
    /// Every stage passed (terminal)
    Accepted,
}

impl CascadeState {
    /// No further transitions
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CascadeState::Evaluating(_))
    }
}

/// Cascade resolved for one scale level.
///
/// Built once per level and shared read-only by every worker scanning it.
#[derive(Debug, Clone)]
pub struct ScaledCascade {
    scale: WindowScale,
    stages: Vec<ScaledStage>,
}

impl ScaledCascade {
    /// Resolve `model` for `width` x `height` windows over tables with row
    /// length `stride`
    pub fn new(model: &CascadeModel, width: u32, height: u32, stride: usize) -> Self {
        let scale = WindowScale::new(model.window_size(), width, height, stride);
        let stages = model
            .stages()
            .iter()
            .map(|s| ScaledStage::new(s, &scale))
            .collect();
        Self { scale, stages }
    }

    /// Geometry of this level
    pub fn scale(&self) -> &WindowScale {
        &self.scale
    }

    /// Number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Start a step-by-step run on the window at (x, y)
    pub fn start<'a>(&'a self, images: &'a IntegralImages, x: u32, y: u32) -> CascadeRun<'a> {
        CascadeRun {
            cascade: self,
            sum: &images.sum,
            probe: self.scale.probe(images, x, y),
            state: CascadeState::Evaluating(0),
        }
    }

    /// Run the window at (x, y) to a terminal state
    #[inline]
    pub fn classify(&self, images: &IntegralImages, x: u32, y: u32) -> CascadeState {
        self.start(images, x, y).finish()
    }
}

/// In-flight evaluation of one window
pub struct CascadeRun<'a> {
    cascade: &'a ScaledCascade,
    sum: &'a IntegralImage,
    probe: Probe,
    state: CascadeState,
}

impl CascadeRun<'_> {
    /// Current state
    pub fn state(&self) -> CascadeState {
        self.state
    }

    /// Evaluate the pending stage, if any, and return the new state.
    /// Terminal states are returned unchanged.
    pub fn step(&mut self) -> CascadeState {
        if let CascadeState::Evaluating(i) = self.state {
            let stages = &self.cascade.stages;
            self.state = if !stages[i].passes(self.sum, &self.probe) {
                CascadeState::Rejected(i)
            } else if i + 1 == stages.len() {
                CascadeState::Accepted
            } else {
                CascadeState::Evaluating(i + 1)
            };
        }
        self.state
    }

    /// Step until terminal
    pub fn finish(mut self) -> CascadeState {
        while !self.state.is_terminal() {
            self.step();
        }
        self.state
    }
}

/// Single-window cascade evaluation
pub struct CascadeEvaluator<'m> {
    model: &'m CascadeModel,
}

impl<'m> CascadeEvaluator<'m> {
    /// Evaluate windows against `model`
    pub fn new(model: &'m CascadeModel) -> Self {
        Self { model }
    }

    /// Terminal state of `window`. Empty windows and windows reaching outside
    /// the image are rejected at stage 0 without touching the tables.
    pub fn evaluate(&self, images: &IntegralImages, window: &Window) -> CascadeState {
        if !window_fits(images, window) {
            return CascadeState::Rejected(0);
        }
        ScaledCascade::new(self.model, window.width, window.height, images.sum.stride())
            .classify(images, window.x, window.y)
    }
}
