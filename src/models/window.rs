/// Candidate sub-window in original image coordinates
///
/// `width` is the scanned window size; `height` differs from it only for
/// cascades trained on a non-square base window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Window width (the scan size)
    pub width: u32,
    /// Window height
    pub height: u32,
}

impl Window {
    /// Create a window
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Create a square window
    pub fn square(x: u32, y: u32, size: u32) -> Self {
        Self::new(x, y, size, size)
    }

    /// Scan size of the window
    pub fn size(&self) -> u32 {
        self.width
    }
}

/// Accepted window, not yet grouped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawHit {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Box width
    pub width: u32,
    /// Box height
    pub height: u32,
    /// Votes this hit contributes to its cluster (1 for a fresh hit)
    pub weight: u32,
}

impl RawHit {
    /// Hit with weight 1 from an accepted window
    pub fn from_window(window: Window) -> Self {
        Self {
            x: window.x,
            y: window.y,
            width: window.width,
            height: window.height,
            weight: 1,
        }
    }

    /// Box of this hit
    pub fn bounds(&self) -> BoxI {
        BoxI::new(self.x, self.y, self.width, self.height)
    }
}

/// Final merged detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Detection {
    /// Left edge
    pub x: u32,
    /// Top edge
    pub y: u32,
    /// Box width
    pub width: u32,
    /// Box height
    pub height: u32,
    /// Number of raw hits merged into this box (confidence proxy)
    pub hit_count: u32,
}

impl Detection {
    /// Feed this detection back into the merger as a weighted hit
    pub fn as_hit(&self) -> RawHit {
        RawHit {
            x: self.x,
            y: self.y,
            width: self.width,
            height: self.height,
            weight: self.hit_count,
        }
    }

    /// Box of this detection
    pub fn bounds(&self) -> BoxI {
        BoxI::new(self.x, self.y, self.width, self.height)
    }
}

/// Axis-aligned integer box used for overlap tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxI {
    /// Left edge
    pub x: i64,
    /// Top edge
    pub y: i64,
    /// Width
    pub w: i64,
    /// Height
    pub h: i64,
}

impl BoxI {
    /// Create a box from unsigned image coordinates
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Self {
            x: x as i64,
            y: y as i64,
            w: w as i64,
            h: h as i64,
        }
    }

    /// Box area
    pub fn area(&self) -> i64 {
        self.w * self.h
    }

    /// Area of the intersection with `other` (0 when disjoint)
    pub fn intersection(&self, other: &BoxI) -> i64 {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.w).min(other.x + other.w);
        let y1 = (self.y + self.h).min(other.y + other.h);
        if x1 <= x0 || y1 <= y0 {
            return 0;
        }
        (x1 - x0) * (y1 - y0)
    }

    /// Intersection over union
    pub fn iou(&self, other: &BoxI) -> f64 {
        let inter = self.intersection(other);
        if inter == 0 {
            return 0.0;
        }
        let union = self.area() + other.area() - inter;
        inter as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou() {
        let a = BoxI::new(0, 0, 10, 10);
        let b = BoxI::new(5, 0, 10, 10);
        assert_eq!(a.intersection(&b), 50);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-12);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_touching_boxes_do_not_overlap() {
        let a = BoxI::new(0, 0, 24, 24);
        let b = BoxI::new(24, 0, 24, 24);
        assert_eq!(a.intersection(&b), 0);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn test_detection_as_hit_carries_count() {
        let d = Detection {
            x: 3,
            y: 4,
            width: 20,
            height: 20,
            hit_count: 7,
        };
        let hit = d.as_hit();
        assert_eq!(hit.weight, 7);
        assert_eq!(hit.bounds(), d.bounds());
    }
}
