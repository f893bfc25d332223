//! Multi-scale sliding-window search
//!
//! Window sizes grow geometrically from `min_size` to `max_size`. At each
//! size the cascade is resolved once ([`ScaledCascade`]) and every position
//! on a stride grid proportional to the size is classified. Accepted windows
//! become [`RawHit`]s in scan order (size, then row, then column).

use super::evaluator::{CascadeState, ScaledCascade};
use super::feature::scaled_height;
use crate::cascade::CascadeModel;
use crate::error::{DetectError, Result};
use crate::models::{RawHit, Window};
use crate::utils::integral::IntegralImages;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Cooperative cancellation flag, checked between scale levels
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, not cancelled
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every search holding a clone of this token to stop
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Search parameters
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Smallest window width (defaults to the cascade base width)
    pub min_size: Option<u32>,
    /// Largest window width (defaults to the smaller image dimension)
    pub max_size: Option<u32>,
    /// Growth factor between sizes, finite and > 1
    pub scale_factor: f64,
    /// Stride as a fraction of the window width, finite and > 0
    pub step_ratio: f64,
    /// Optional cancellation
    pub cancel: Option<CancelToken>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_size: None,
            max_size: None,
            scale_factor: 1.1,
            step_ratio: 0.1,
            cancel: None,
        }
    }
}

impl SearchConfig {
    /// Set the growth factor between sizes
    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor;
        self
    }

    /// Set the smallest window width
    pub fn with_min_size(mut self, min_size: u32) -> Self {
        self.min_size = Some(min_size);
        self
    }

    /// Set the largest window width
    pub fn with_max_size(mut self, max_size: u32) -> Self {
        self.max_size = Some(max_size);
        self
    }

    /// Set the stride fraction
    pub fn with_step_ratio(mut self, step_ratio: f64) -> Self {
        self.step_ratio = step_ratio;
        self
    }

    /// Attach a cancel token
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Reject parameters the scan cannot honor
    pub fn validate(&self) -> Result<()> {
        if !self.scale_factor.is_finite() || self.scale_factor <= 1.0 {
            return Err(DetectError::InvalidConfig(format!(
                "scale_factor must be finite and > 1, got {}",
                self.scale_factor
            )));
        }
        if !self.step_ratio.is_finite() || self.step_ratio <= 0.0 {
            return Err(DetectError::InvalidConfig(format!(
                "step_ratio must be finite and > 0, got {}",
                self.step_ratio
            )));
        }
        if self.min_size == Some(0) || self.max_size == Some(0) {
            return Err(DetectError::InvalidConfig(
                "window sizes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One window size and its stride
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleLevel {
    /// Window width
    pub width: u32,
    /// Window height
    pub height: u32,
    /// Step between positions, both axes
    pub stride: u32,
}

impl ScaleLevel {
    fn columns(&self, image_width: u32) -> impl Iterator<Item = u32> {
        (0..=image_width - self.width).step_by(self.stride as usize)
    }

    fn rows(&self, image_height: u32) -> impl Iterator<Item = u32> {
        (0..=image_height - self.height).step_by(self.stride as usize)
    }

    /// Positions scanned at this level
    pub fn window_count(&self, image_width: u32, image_height: u32) -> usize {
        let per_axis = |extent: u32, size: u32| ((extent - size) / self.stride + 1) as usize;
        per_axis(image_width, self.width) * per_axis(image_height, self.height)
    }
}

/// Window sizes visited for an image, smallest first.
///
/// `size` runs `min, min*f, min*f^2, ...` while `size <= max`; each size is
/// rounded to a width, repeated widths are visited once, and widths whose
/// window does not fit the image are skipped.
pub fn scale_levels(
    base: (u32, u32),
    image_width: u32,
    image_height: u32,
    config: &SearchConfig,
) -> Result<Vec<ScaleLevel>> {
    config.validate()?;
    let min = config.min_size.unwrap_or(base.0);
    let max = config.max_size.unwrap_or(image_width.min(image_height));

    let mut levels = Vec::new();
    let mut size = min as f64;
    let mut last_width = 0;
    while size <= max as f64 {
        let width = size.round() as u32;
        size *= config.scale_factor;
        if width == last_width {
            continue;
        }
        last_width = width;
        let height = scaled_height(base, width);
        if width > image_width || height > image_height {
            continue;
        }
        let stride = ((width as f64 * config.step_ratio).floor() as u32).max(1);
        levels.push(ScaleLevel {
            width,
            height,
            stride,
        });
    }
    Ok(levels)
}

/// Counters gathered while scanning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchTelemetry {
    /// Scale levels scanned
    pub scales: usize,
    /// Windows classified
    pub windows: u64,
    /// Windows that passed every stage
    pub accepted: u64,
    /// Rejections per stage index
    pub rejected_at_stage: Vec<u64>,
}

impl SearchTelemetry {
    fn with_stages(stages: usize) -> Self {
        Self {
            rejected_at_stage: vec![0; stages],
            ..Self::default()
        }
    }

    fn record(&mut self, state: CascadeState) {
        self.windows += 1;
        match state {
            CascadeState::Accepted => self.accepted += 1,
            CascadeState::Rejected(i) => self.rejected_at_stage[i] += 1,
            CascadeState::Evaluating(_) => {}
        }
    }

    fn absorb(&mut self, other: &SearchTelemetry) {
        self.scales += other.scales;
        self.windows += other.windows;
        self.accepted += other.accepted;
        for (mine, theirs) in self.rejected_at_stage.iter_mut().zip(&other.rejected_at_stage) {
            *mine += theirs;
        }
    }
}

/// Hits and counters of one worker
struct Tally {
    hits: Vec<RawHit>,
    telemetry: SearchTelemetry,
}

impl Tally {
    fn new(stages: usize) -> Self {
        Self {
            hits: Vec::new(),
            telemetry: SearchTelemetry::with_stages(stages),
        }
    }

    fn merge(mut self, other: Tally) -> Tally {
        self.hits.extend(other.hits);
        self.telemetry.absorb(&other.telemetry);
        self
    }
}

/// Sliding-window scan of one image with one cascade
pub struct MultiScaleSearch<'a> {
    model: &'a CascadeModel,
    images: &'a IntegralImages,
    levels: Vec<ScaleLevel>,
    cancel: Option<CancelToken>,
}

impl<'a> MultiScaleSearch<'a> {
    /// Plan a search; fails with `InvalidConfig` on bad parameters.
    /// A `min_size` larger than the image plans zero levels.
    pub fn new(
        model: &'a CascadeModel,
        images: &'a IntegralImages,
        config: &SearchConfig,
    ) -> Result<Self> {
        let levels = scale_levels(
            model.window_size(),
            images.width() as u32,
            images.height() as u32,
            config,
        )?;
        Ok(Self {
            model,
            images,
            levels,
            cancel: config.cancel.clone(),
        })
    }

    /// Planned scale levels
    pub fn levels(&self) -> &[ScaleLevel] {
        &self.levels
    }

    /// Total windows the scan will classify
    pub fn window_count(&self) -> usize {
        let (w, h) = self.image_size();
        self.levels.iter().map(|l| l.window_count(w, h)).sum()
    }

    fn image_size(&self) -> (u32, u32) {
        (self.images.width() as u32, self.images.height() as u32)
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }

    fn resolve(&self, level: &ScaleLevel) -> ScaledCascade {
        ScaledCascade::new(self.model, level.width, level.height, self.images.sum.stride())
    }

    /// Lazy sequential scan. Each call starts over; a cancelled search
    /// yields one `Err(Cancelled)` and ends.
    pub fn hits(&self) -> Hits<'_, 'a> {
        Hits {
            search: self,
            level: 0,
            cascade: None,
            x: 0,
            y: 0,
            done: false,
        }
    }

    /// Eager scan, rows of large levels in parallel
    pub fn run(&self) -> Result<Vec<RawHit>> {
        self.run_with_telemetry().map(|(hits, _)| hits)
    }

    /// Eager scan that also reports counters
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip(self), fields(levels = self.levels.len())))]
    pub fn run_with_telemetry(&self) -> Result<(Vec<RawHit>, SearchTelemetry)> {
        self.scan(
            crate::config::parallel_search(),
            crate::config::parallel_min_windows(),
        )
    }

    fn scan(&self, parallel: bool, min_windows: usize) -> Result<(Vec<RawHit>, SearchTelemetry)> {
        let (image_w, image_h) = self.image_size();
        let stages = self.model.stage_count();
        let mut total = Tally::new(stages);

        for level in &self.levels {
            if self.cancelled() {
                return Err(DetectError::Cancelled);
            }
            let cascade = self.resolve(level);
            let rows: Vec<u32> = level.rows(image_h).collect();
            let scan_row = |mut tally: Tally, &y: &u32| {
                for x in level.columns(image_w) {
                    let state = cascade.classify(self.images, x, y);
                    tally.telemetry.record(state);
                    if state == CascadeState::Accepted {
                        tally
                            .hits
                            .push(RawHit::from_window(Window::new(x, y, level.width, level.height)));
                    }
                }
                tally
            };

            let mut tally = if parallel && level.window_count(image_w, image_h) >= min_windows {
                let mut tally = rows
                    .par_iter()
                    .fold(|| Tally::new(stages), scan_row)
                    .reduce(|| Tally::new(stages), Tally::merge);
                tally.hits.sort_unstable_by_key(|h| (h.y, h.x));
                tally
            } else {
                rows.iter().fold(Tally::new(stages), scan_row)
            };
            tally.telemetry.scales = 1;

            if cfg!(debug_assertions) && crate::debug::debug_enabled() {
                eprintln!(
                    "SEARCH: size {}x{} stride {} windows {} hits {}",
                    level.width,
                    level.height,
                    level.stride,
                    tally.telemetry.windows,
                    tally.hits.len()
                );
            }
            total = total.merge(tally);
        }

        Ok((total.hits, total.telemetry))
    }
}

/// Lazy iterator over accepted windows, see [`MultiScaleSearch::hits`]
pub struct Hits<'s, 'a> {
    search: &'s MultiScaleSearch<'a>,
    level: usize,
    cascade: Option<ScaledCascade>,
    x: u32,
    y: u32,
    done: bool,
}

impl Iterator for Hits<'_, '_> {
    type Item = Result<RawHit>;

    fn next(&mut self) -> Option<Self::Item> {
        let (image_w, image_h) = self.search.image_size();
        while !self.done {
            let Some(level) = self.search.levels.get(self.level).copied() else {
                self.done = true;
                break;
            };
            if self.cascade.is_none() {
                if self.search.cancelled() {
                    self.done = true;
                    return Some(Err(DetectError::Cancelled));
                }
                self.cascade = Some(self.search.resolve(&level));
                self.x = 0;
                self.y = 0;
            }
            if self.y + level.height > image_h {
                self.cascade = None;
                self.level += 1;
                continue;
            }

            let (x, y) = (self.x, self.y);
            self.x += level.stride;
            if self.x + level.width > image_w {
                self.x = 0;
                self.y += level.stride;
            }

            let accepted = self
                .cascade
                .as_ref()
                .is_some_and(|c| c.classify(self.search.images, x, y) == CascadeState::Accepted);
            if accepted {
                return Some(Ok(RawHit::from_window(Window::new(
                    x,
                    y,
                    level.width,
                    level.height,
                ))));
            }
        }
        None
    }
}
