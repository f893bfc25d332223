//! Grouping of raw hits into final detections
//!
//! Hits whose edges all lie within `eps * (min(w1,w2) + min(h1,h2)) / 2` of
//! each other are similar; similar hits are joined transitively with a
//! disjoint-set forest. Each group becomes one weight-averaged box whose
//! `hit_count` is the summed weight. Groups below `min_neighbors` are
//! dropped and a greedy pass folds every remaining box that overlaps a
//! stronger one by more than `nms_iou`, or is still similar to it, into that
//! box.

use crate::error::{DetectError, Result};
use crate::models::{BoxI, Detection, RawHit};
use crate::utils::union_find::UnionFind;
use std::cmp::Reverse;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Grouping parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MergeConfig {
    /// Groups with a smaller summed weight are discarded
    pub min_neighbors: u32,
    /// Edge tolerance of the similarity test, relative to box size
    pub group_eps: f64,
    /// Boxes overlapping a stronger box by more than this IoU are absorbed
    /// (similar boxes are absorbed regardless)
    pub nms_iou: f64,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            min_neighbors: 3,
            group_eps: 0.2,
            nms_iou: 0.3,
        }
    }
}

impl MergeConfig {
    /// Reject tolerances outside their meaningful range
    pub fn validate(&self) -> Result<()> {
        if !self.group_eps.is_finite() || self.group_eps < 0.0 {
            return Err(DetectError::InvalidConfig(format!(
                "group_eps must be finite and >= 0, got {}",
                self.group_eps
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_iou) {
            return Err(DetectError::InvalidConfig(format!(
                "nms_iou must lie in [0, 1], got {}",
                self.nms_iou
            )));
        }
        Ok(())
    }
}

/// Edge-wise similarity of two boxes
fn similar(a: &BoxI, b: &BoxI, eps: f64) -> bool {
    let delta = eps * (a.w.min(b.w) + a.h.min(b.h)) as f64 * 0.5;
    let close = |p: i64, q: i64| ((p - q).abs() as f64) <= delta;
    close(a.x, b.x) && close(a.y, b.y) && close(a.x + a.w, b.x + b.w) && close(a.y + a.h, b.y + b.h)
}

/// Weighted mean of one coordinate, rounded half up
fn weighted_mean(members: &[&RawHit], total: u64, coord: impl Fn(&RawHit) -> u32) -> u32 {
    if total == 0 {
        let n = members.len() as u64;
        let sum: u64 = members.iter().map(|h| coord(h) as u64).sum();
        return ((sum + n / 2) / n) as u32;
    }
    let sum: u64 = members
        .iter()
        .map(|h| coord(h) as u64 * h.weight as u64)
        .sum();
    ((sum + total / 2) / total) as u32
}

fn rank(d: &Detection) -> (Reverse<u32>, Reverse<u64>, u32, u32, u32) {
    (
        Reverse(d.hit_count),
        Reverse(d.width as u64 * d.height as u64),
        d.y,
        d.x,
        d.width,
    )
}

/// Clusters raw hits into detections
#[derive(Debug, Clone, Default)]
pub struct DetectionMerger {
    config: MergeConfig,
}

impl DetectionMerger {
    /// Merger with the given parameters
    pub fn new(config: MergeConfig) -> Self {
        Self { config }
    }

    /// Default tolerances with a custom neighbor threshold
    pub fn with_min_neighbors(min_neighbors: u32) -> Self {
        Self::new(MergeConfig {
            min_neighbors,
            ..MergeConfig::default()
        })
    }

    /// Active parameters
    pub fn config(&self) -> &MergeConfig {
        &self.config
    }

    /// Group `hits` into detections ordered by `hit_count` (then area, y, x).
    ///
    /// Merging the output again, each detection as a hit weighted by its
    /// count, returns the same detections.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self, hits), fields(hits = hits.len())))]
    pub fn merge(&self, hits: &[RawHit]) -> Vec<Detection> {
        let boxes: Vec<BoxI> = hits.iter().map(RawHit::bounds).collect();
        let mut sets = UnionFind::new(hits.len());
        for i in 0..boxes.len() {
            for j in i + 1..boxes.len() {
                if similar(&boxes[i], &boxes[j], self.config.group_eps) {
                    sets.union(i, j);
                }
            }
        }

        let mut candidates: Vec<Detection> = sets
            .groups()
            .into_iter()
            .filter_map(|group| {
                let members: Vec<&RawHit> = group.iter().map(|&i| &hits[i]).collect();
                let total: u64 = members.iter().map(|h| h.weight as u64).sum();
                let hit_count = total.min(u32::MAX as u64) as u32;
                if hit_count < self.config.min_neighbors {
                    return None;
                }
                Some(Detection {
                    x: weighted_mean(&members, total, |h| h.x),
                    y: weighted_mean(&members, total, |h| h.y),
                    width: weighted_mean(&members, total, |h| h.width),
                    height: weighted_mean(&members, total, |h| h.height),
                    hit_count,
                })
            })
            .collect();
        candidates.sort_by_key(rank);

        let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let bounds = candidate.bounds();
            // A similar pair would regroup on the next merge, whatever nms_iou is
            match kept.iter_mut().find(|k| {
                let kb = k.bounds();
                kb.iou(&bounds) > self.config.nms_iou
                    || similar(&kb, &bounds, self.config.group_eps)
            }) {
                Some(stronger) => {
                    stronger.hit_count = stronger.hit_count.saturating_add(candidate.hit_count)
                }
                None => kept.push(candidate),
            }
        }
        kept.sort_by_key(rank);

        if cfg!(debug_assertions) && crate::debug::debug_enabled() {
            eprintln!(
                "MERGE: {} hits -> {} detections (min_neighbors {})",
                hits.len(),
                kept.len(),
                self.config.min_neighbors
            );
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Window;

    fn hit(x: u32, y: u32, size: u32) -> RawHit {
        RawHit::from_window(Window::square(x, y, size))
    }

    fn remerge(merger: &DetectionMerger, detections: &[Detection]) -> Vec<Detection> {
        let hits: Vec<RawHit> = detections.iter().map(Detection::as_hit).collect();
        merger.merge(&hits)
    }

    #[test]
    fn test_empty_input() {
        assert!(DetectionMerger::default().merge(&[]).is_empty());
    }

    #[test]
    fn test_cluster_is_averaged() {
        let hits = [
            hit(100, 100, 40),
            hit(102, 100, 40),
            hit(100, 103, 42),
            hit(98, 101, 40),
            hit(101, 99, 38),
        ];
        let out = DetectionMerger::with_min_neighbors(3).merge(&hits);
        assert_eq!(out.len(), 1);
        let d = out[0];
        assert_eq!(d.hit_count, 5);
        assert_eq!((d.x, d.y, d.width, d.height), (100, 101, 40, 40));
    }

    #[test]
    fn test_min_neighbors_filter() {
        let hits = [hit(10, 10, 30), hit(11, 10, 30), hit(200, 200, 30)];
        let merger = DetectionMerger::with_min_neighbors(2);
        let out = merger.merge(&hits);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hit_count, 2);
        assert_eq!(DetectionMerger::with_min_neighbors(3).merge(&hits).len(), 0);
        assert_eq!(DetectionMerger::with_min_neighbors(0).merge(&hits).len(), 2);
    }

    #[test]
    fn test_overlapping_groups_are_suppressed() {
        // 12px apart: not similar (tolerance 8) but IoU ~0.54
        let hits = [
            hit(0, 0, 40),
            hit(0, 0, 40),
            hit(0, 0, 40),
            hit(12, 0, 40),
            hit(12, 0, 40),
        ];
        let out = DetectionMerger::with_min_neighbors(1).merge(&hits);
        assert_eq!(out.len(), 1);
        assert_eq!((out[0].x, out[0].y), (0, 0));
        assert_eq!(out[0].hit_count, 5);
    }

    #[test]
    fn test_output_order() {
        let hits = [
            hit(300, 0, 30),
            hit(0, 0, 30),
            hit(0, 0, 30),
            hit(100, 0, 60),
            hit(200, 0, 30),
        ];
        let out = DetectionMerger::with_min_neighbors(0).merge(&hits);
        let xs: Vec<u32> = out.iter().map(|d| d.x).collect();
        // Count first, then larger area, then position
        assert_eq!(xs, vec![0, 100, 200, 300]);
    }

    #[test]
    fn test_no_output_pair_overlaps() {
        let mut hits = Vec::new();
        for i in 0..40u32 {
            hits.push(hit((i * 37) % 150, (i * 53) % 120, 24 + (i % 5) * 6));
        }
        let out = DetectionMerger::with_min_neighbors(1).merge(&hits);
        for (i, a) in out.iter().enumerate() {
            for b in &out[i + 1..] {
                assert!(a.bounds().iou(&b.bounds()) <= 0.3);
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let merger = DetectionMerger::with_min_neighbors(2);
        let mut hits = Vec::new();
        for i in 0..60u32 {
            let cx = [20u32, 90, 160][(i % 3) as usize];
            hits.push(hit(cx + (i * 7) % 5, 30 + (i * 11) % 6, 36 + (i % 4)));
        }
        for i in 0..15u32 {
            hits.push(hit((i * 29) % 200, (i * 41) % 150, 24 + (i % 3) * 10));
        }
        let once = merger.merge(&hits);
        assert!(!once.is_empty());
        assert_eq!(remerge(&merger, &once), once);
    }

    #[test]
    fn test_merge_is_idempotent_with_loose_suppression() {
        // At nms_iou 0.6 two similar averaged boxes overlap by only ~0.58
        let merger = DetectionMerger::new(MergeConfig {
            min_neighbors: 1,
            group_eps: 0.2,
            nms_iou: 0.6,
        });
        assert!(merger.config().validate().is_ok());
        let hits = [hit(5, 38, 49), hit(8, 48, 49), hit(15, 42, 49)];
        let once = merger.merge(&hits);
        assert_eq!(once.len(), 1);
        assert_eq!((once[0].x, once[0].y, once[0].width), (12, 45, 49));
        assert_eq!(once[0].hit_count, 3);
        assert_eq!(remerge(&merger, &once), once);
    }

    #[test]
    fn test_merge_is_idempotent_across_tolerances() {
        let mut hits = Vec::new();
        for i in 0..80u32 {
            hits.push(hit((i * 13) % 90, (i * 17) % 70, 30 + (i % 7) * 3));
        }
        for (eps, iou) in [(0.1, 0.0), (0.3, 0.9), (0.5, 1.0), (0.0, 0.5)] {
            let merger = DetectionMerger::new(MergeConfig {
                min_neighbors: 1,
                group_eps: eps,
                nms_iou: iou,
            });
            let once = merger.merge(&hits);
            assert!(!once.is_empty());
            assert_eq!(remerge(&merger, &once), once, "eps {} iou {}", eps, iou);
        }
    }

    #[test]
    fn test_zero_weight_hits() {
        let merger = DetectionMerger::with_min_neighbors(0);
        let hits = [
            RawHit { x: 10, y: 10, width: 20, height: 20, weight: 0 },
            RawHit { x: 11, y: 10, width: 20, height: 20, weight: 0 },
        ];
        let out = merger.merge(&hits);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].hit_count, 0);
        assert_eq!(remerge(&merger, &out), out);
    }

    #[test]
    fn test_config_validation() {
        assert!(MergeConfig::default().validate().is_ok());
        let bad_eps = MergeConfig { group_eps: -0.1, ..MergeConfig::default() };
        assert!(bad_eps.validate().is_err());
        let bad_iou = MergeConfig { nms_iou: 1.5, ..MergeConfig::default() };
        assert!(bad_iou.validate().is_err());
        let nan_iou = MergeConfig { nms_iou: f64::NAN, ..MergeConfig::default() };
        assert!(nan_iou.validate().is_err());
    }
}
