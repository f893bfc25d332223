//! Helpers shared by the CLI, benches and integration tests

use crate::cascade::CascadeModel;
use crate::models::Detection;
use crate::tiles::GridCell;
use image::{GrayImage, Rgb, RgbImage};
use serde_json::{Value, json};
use std::path::Path;

/// Load an image file and convert it to 8-bit grayscale.
pub fn load_gray<P: AsRef<Path>>(path: P) -> Result<GrayImage, image::ImageError> {
    Ok(image::open(path)?.to_luma8())
}

/// Summary statistics for grayscale data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrayStats {
    /// Minimum grayscale value.
    pub min: u8,
    /// Maximum grayscale value.
    pub max: u8,
    /// Average grayscale value.
    pub avg: u8,
}

/// Compute min/max/avg for grayscale values.
pub fn gray_stats(gray: &[u8]) -> GrayStats {
    if gray.is_empty() {
        return GrayStats { min: 0, max: 0, avg: 0 };
    }
    let mut min = u8::MAX;
    let mut max = u8::MIN;
    let mut sum: u64 = 0;
    for &v in gray {
        min = min.min(v);
        max = max.max(v);
        sum += v as u64;
    }
    GrayStats {
        min,
        max,
        avg: (sum / gray.len() as u64) as u8,
    }
}

/// Outline color used by [`annotate`]
const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: u32 = 2;

/// Color copy of `image` with every detection outlined in red.
///
/// Outlines are clipped to the image.
pub fn annotate(image: &GrayImage, detections: &[Detection]) -> RgbImage {
    let (width, height) = image.dimensions();
    let mut out = RgbImage::from_fn(width, height, |x, y| {
        let v = image.get_pixel(x, y).0[0];
        Rgb([v, v, v])
    });
    for d in detections {
        let right = d.x.saturating_add(d.width);
        let bottom = d.y.saturating_add(d.height);
        for y in d.y..bottom.min(height) {
            for x in d.x..right.min(width) {
                let edge = x - d.x < BOX_THICKNESS
                    || y - d.y < BOX_THICKNESS
                    || right - x <= BOX_THICKNESS
                    || bottom - y <= BOX_THICKNESS;
                if edge {
                    out.put_pixel(x, y, BOX_COLOR);
                }
            }
        }
    }
    out
}

/// JSON report of a detection run.
///
/// `face_tiles` holds `[row, col]` pairs.
pub fn detection_report(width: u32, height: u32, detections: &[Detection], tiles: &[GridCell]) -> Value {
    json!({
        "width": width,
        "height": height,
        "detections": detections
            .iter()
            .map(|d| json!({
                "x": d.x,
                "y": d.y,
                "width": d.width,
                "height": d.height,
                "hit_count": d.hit_count,
            }))
            .collect::<Vec<_>>(),
        "face_tiles": tiles.iter().map(|t| [t.row, t.col]).collect::<Vec<_>>(),
    })
}

/// JSON description of a cascade's shape.
pub fn cascade_summary(model: &CascadeModel) -> Value {
    let (width, height) = model.window_size();
    let stages: Vec<Value> = model
        .stages()
        .iter()
        .map(|s| {
            json!({
                "classifiers": s.classifiers().len(),
                "nodes": s.classifiers().iter().map(|c| c.nodes().len()).sum::<usize>(),
                "threshold": s.threshold(),
            })
        })
        .collect();
    json!({
        "window": [width, height],
        "stage_count": model.stage_count(),
        "classifier_count": model.classifier_count(),
        "stages": stages,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cascade::{HaarFeature, Stage, WeakClassifier, WeightedRect};

    #[test]
    fn test_gray_stats() {
        assert_eq!(gray_stats(&[]), GrayStats { min: 0, max: 0, avg: 0 });
        assert_eq!(gray_stats(&[10, 20, 30, 41]), GrayStats { min: 10, max: 41, avg: 25 });
    }

    #[test]
    fn test_detection_report_shape() {
        let d = Detection {
            x: 120,
            y: 40,
            width: 60,
            height: 60,
            hit_count: 9,
        };
        let report = detection_report(640, 480, &[d], &[GridCell { row: 0, col: 1 }]);
        assert_eq!(report["detections"][0]["hit_count"], 9);
        assert_eq!(report["face_tiles"], json!([[0, 1]]));
        assert_eq!(report["width"], 640);
    }

    #[test]
    fn test_annotate_outlines_detections() {
        let image = GrayImage::from_pixel(40, 30, image::Luma([50]));
        let d = Detection {
            x: 10,
            y: 5,
            width: 10,
            height: 10,
            hit_count: 3,
        };
        // Reaches past the right and bottom edges
        let clipped = Detection {
            x: 35,
            y: 25,
            width: 20,
            height: 20,
            hit_count: 3,
        };
        let out = annotate(&image, &[d, clipped]);
        assert_eq!(out.dimensions(), (40, 30));
        assert_eq!(*out.get_pixel(10, 5), BOX_COLOR);
        assert_eq!(*out.get_pixel(11, 10), BOX_COLOR);
        assert_eq!(*out.get_pixel(19, 14), BOX_COLOR);
        assert_eq!(*out.get_pixel(15, 10), Rgb([50, 50, 50]));
        assert_eq!(*out.get_pixel(0, 0), Rgb([50, 50, 50]));
        assert_eq!(*out.get_pixel(35, 25), BOX_COLOR);
        assert_eq!(*out.get_pixel(39, 29), Rgb([50, 50, 50]));
    }

    #[test]
    fn test_cascade_summary() {
        let feature = HaarFeature::TwoRect([
            WeightedRect::new(0, 0, 20, 10, -1.0),
            WeightedRect::new(0, 10, 20, 10, 1.0),
        ]);
        let stump = WeakClassifier::stump(feature, 0.0, -1.0, 1.0);
        let model = CascadeModel::new(
            (20, 20),
            vec![Stage::new(vec![stump.clone()], 0.0), Stage::new(vec![stump.clone(), stump], 0.5)],
        )
        .unwrap();
        let summary = cascade_summary(&model);
        assert_eq!(summary["window"], json!([20, 20]));
        assert_eq!(summary["classifier_count"], 3);
        assert_eq!(summary["stages"][1]["classifiers"], 2);
    }
}
