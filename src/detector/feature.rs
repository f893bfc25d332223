/// Haar feature evaluation over scaled windows
///
/// A [`WindowScale`] maps base-window rectangles into one scanned window
/// size. Everything that depends only on the size (rectangle corner offsets,
/// area compensation, the normalization rectangle) is computed once per
/// scale level, so evaluating a window is four table lookups and one
/// multiply per rectangle plus a single variance probe.
use crate::cascade::{HaarFeature, WeightedRect};
use crate::models::Window;
use crate::utils::integral::{IntegralImage, IntegralImages};

/// Variance floor in squared gray levels; flat windows normalize by 1
const MIN_VARIANCE: f64 = 1.0;

/// Window height for a scan width, keeping the base aspect ratio
pub fn scaled_height(base: (u32, u32), width: u32) -> u32 {
    ((width as f64 * base.1 as f64 / base.0 as f64).round() as u32).max(1)
}

/// Whether `window` is non-empty and lies inside the image of `images`
pub(crate) fn window_fits(images: &IntegralImages, window: &Window) -> bool {
    window.width > 0
        && window.height > 0
        && window.x as u64 + window.width as u64 <= images.width() as u64
        && window.y as u64 + window.height as u64 <= images.height() as u64
}

/// Geometry of one scale level
#[derive(Debug, Clone)]
pub struct WindowScale {
    base: (u32, u32),
    width: u32,
    height: u32,
    stride: usize,
    norm: [usize; 4],
    norm_pixels: f64,
    norm_area: f64,
}

impl WindowScale {
    /// Scale `base` rectangles into `width` x `height` windows of an image whose
    /// integral tables have row length `stride`. Zero extents are raised to 1.
    pub fn new(base: (u32, u32), width: u32, height: u32, stride: usize) -> Self {
        let mut scale = Self {
            base,
            width: width.max(1),
            height: height.max(1),
            stride,
            norm: [0; 4],
            norm_pixels: 1.0,
            norm_area: 1.0,
        };

        // Variance is measured one base pixel inside the window edge
        let (nx, ny, nw, nh) = if base.0 >= 3 && base.1 >= 3 {
            (1, 1, base.0 - 2, base.1 - 2)
        } else {
            (0, 0, base.0, base.1)
        };
        let (corners, pixels) = scale.map_rect(nx, ny, nw, nh);
        scale.norm = corners;
        scale.norm_pixels = pixels as f64;
        scale.norm_area = (nw * nh) as f64;
        scale
    }

    /// Scanned window width
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Scanned window height
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `floor(v * limit / base)` for both ends, then clamped to `[0, limit]`
    /// with at least one pixel of extent
    fn span(start: u32, len: u32, base: u32, limit: u32) -> (u32, u32) {
        let map = |v: u32| (v as u64 * limit as u64 / base as u64) as u32;
        let lo = map(start).min(limit - 1);
        let hi = map(start + len).clamp(lo + 1, limit);
        (lo, hi)
    }

    /// Table offsets (tl, tr, bl, br) and pixel count of a base rectangle
    /// mapped into the window. The result always lies inside the window and
    /// covers at least one pixel.
    fn map_rect(&self, x: u32, y: u32, w: u32, h: u32) -> ([usize; 4], u32) {
        let (x0, x1) = Self::span(x, w, self.base.0, self.width);
        let (y0, y1) = Self::span(y, h, self.base.1, self.height);
        let s = self.stride;
        let (x0, x1, y0, y1) = (x0 as usize, x1 as usize, y0 as usize, y1 as usize);
        let corners = [y0 * s + x0, y0 * s + x1, y1 * s + x0, y1 * s + x1];
        (corners, ((x1 - x0) * (y1 - y0)) as u32)
    }

    /// Scale a weighted rectangle, folding the base/scaled area ratio into
    /// its weight
    pub fn scale_rect(&self, rect: &WeightedRect) -> ScaledRect {
        let (corners, pixels) = self.map_rect(rect.x, rect.y, rect.width, rect.height);
        ScaledRect {
            corners,
            weight: rect.weight as f64 * rect.area() as f64 / pixels as f64,
        }
    }

    /// Measure the window at (x, y) for variance normalization.
    ///
    /// The window must lie inside the image the tables were built from.
    #[inline]
    pub fn probe(&self, images: &IntegralImages, x: u32, y: u32) -> Probe {
        let base = y as usize * self.stride + x as usize;
        let sum = images.sum.offset_sum(base, &self.norm) as f64;
        let squared = images.squared.offset_sum(base, &self.norm) as f64;
        let mean = sum / self.norm_pixels;
        let variance = (squared / self.norm_pixels - mean * mean).max(MIN_VARIANCE);
        Probe {
            base,
            inv_norm: 1.0 / (variance.sqrt() * self.norm_area),
        }
    }
}

/// Per-window anchor and normalization factor
#[derive(Debug, Clone, Copy)]
pub struct Probe {
    pub(crate) base: usize,
    pub(crate) inv_norm: f64,
}

/// Rectangle resolved to table offsets for one scale level
#[derive(Debug, Clone, Copy)]
pub struct ScaledRect {
    corners: [usize; 4],
    weight: f64,
}

impl ScaledRect {
    #[inline]
    fn weighted_sum(&self, sum: &IntegralImage, base: usize) -> f64 {
        sum.offset_sum(base, &self.corners) as f64 * self.weight
    }
}

/// [`HaarFeature`] resolved for one scale level
#[derive(Debug, Clone, Copy)]
pub enum ScaledFeature {
    /// Two rectangles
    TwoRect([ScaledRect; 2]),
    /// Three rectangles
    ThreeRect([ScaledRect; 3]),
}

impl ScaledFeature {
    /// Resolve `feature` for the given scale level
    pub fn new(feature: &HaarFeature, scale: &WindowScale) -> Self {
        match feature {
            HaarFeature::TwoRect([a, b]) => {
                ScaledFeature::TwoRect([scale.scale_rect(a), scale.scale_rect(b)])
            }
            HaarFeature::ThreeRect([a, b, c]) => ScaledFeature::ThreeRect([
                scale.scale_rect(a),
                scale.scale_rect(b),
                scale.scale_rect(c),
            ]),
        }
    }

    /// Normalized response at the probed window
    #[inline]
    pub fn response(&self, sum: &IntegralImage, probe: &Probe) -> f64 {
        let raw = match self {
            ScaledFeature::TwoRect([a, b]) => {
                a.weighted_sum(sum, probe.base) + b.weighted_sum(sum, probe.base)
            }
            ScaledFeature::ThreeRect([a, b, c]) => {
                a.weighted_sum(sum, probe.base)
                    + b.weighted_sum(sum, probe.base)
                    + c.weighted_sum(sum, probe.base)
            }
        };
        raw * probe.inv_norm
    }
}

/// One-off feature evaluation
pub struct FeatureEvaluator;

impl FeatureEvaluator {
    /// Response of `feature`, defined over a `base` window, in `window`.
    ///
    /// Each rectangle sum is brought back to base-window units and the total
    /// is divided by the window's standard deviation times the base
    /// normalization area. An empty window or one reaching outside the image
    /// responds 0.0.
    pub fn evaluate(
        feature: &HaarFeature,
        base: (u32, u32),
        images: &IntegralImages,
        window: &Window,
    ) -> f64 {
        if !window_fits(images, window) {
            return 0.0;
        }
        let scale = WindowScale::new(base, window.width, window.height, images.sum.stride());
        let probe = scale.probe(images, window.x, window.y);
        ScaledFeature::new(feature, &scale).response(&images.sum, &probe)
    }
}
