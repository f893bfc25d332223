/// Grid tiles covered by detections
///
/// The image is split into `grid` x `grid` equal cells and each detection is
/// assigned the cell holding its top-left corner.
use crate::error::{DetectError, Result};
use crate::models::Detection;

/// Cell of a square grid over the image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    /// Row index, 0 at the top
    pub row: u32,
    /// Column index, 0 at the left
    pub col: u32,
}

/// Cell holding the top-left corner of `detection`
pub fn grid_cell(detection: &Detection, image_width: u32, image_height: u32, grid: u32) -> Result<GridCell> {
    if grid == 0 {
        return Err(DetectError::InvalidConfig("grid must have at least one cell".to_string()));
    }
    let cell_h = (image_height / grid).max(1);
    let cell_w = (image_width / grid).max(1);
    Ok(GridCell {
        row: (detection.y / cell_h).min(grid - 1),
        col: (detection.x / cell_w).min(grid - 1),
    })
}

/// Cells of every detection, in detection order
pub fn face_tiles(
    detections: &[Detection],
    image_width: u32,
    image_height: u32,
    grid: u32,
) -> Result<Vec<GridCell>> {
    detections
        .iter()
        .map(|d| grid_cell(d, image_width, image_height, grid))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(x: u32, y: u32) -> Detection {
        Detection {
            x,
            y,
            width: 30,
            height: 30,
            hit_count: 5,
        }
    }

    #[test]
    fn test_grid_cell() {
        // 800x600 on an 8x8 grid: cells are 100 wide, 75 tall
        assert_eq!(grid_cell(&at(0, 0), 800, 600, 8).unwrap(), GridCell { row: 0, col: 0 });
        assert_eq!(grid_cell(&at(250, 160), 800, 600, 8).unwrap(), GridCell { row: 2, col: 2 });
        assert_eq!(grid_cell(&at(799, 599), 800, 600, 8).unwrap(), GridCell { row: 7, col: 7 });
    }

    #[test]
    fn test_indivisible_edges_are_clamped() {
        // 803 / 8 = 100, so x = 800 would land in column 8 without clamping
        assert_eq!(grid_cell(&at(800, 0), 803, 803, 8).unwrap().col, 7);
    }

    #[test]
    fn test_tiny_image() {
        assert_eq!(grid_cell(&at(5, 3), 6, 6, 8).unwrap(), GridCell { row: 3, col: 5 });
    }

    #[test]
    fn test_zero_grid_is_rejected() {
        assert!(matches!(grid_cell(&at(0, 0), 10, 10, 0), Err(DetectError::InvalidConfig(_))));
    }

    #[test]
    fn test_face_tiles() {
        let tiles = face_tiles(&[at(0, 0), at(400, 300)], 800, 600, 8).unwrap();
        assert_eq!(tiles, vec![GridCell { row: 0, col: 0 }, GridCell { row: 4, col: 4 }]);
    }
}
