/// Integral images (summed-area tables) for O(1) rectangle sums
///
/// `I[y][x]` holds the sum of all pixels with row < y and col < x, so the
/// tables are one row and one column larger than the image and their first
/// row and column are zero.
use crate::error::{DetectError, Result};
use crate::models::PixelBuffer;
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// (W+1) x (H+1) table of 64-bit prefix sums
#[derive(Debug, Clone)]
pub struct IntegralImage {
    stride: usize,
    rows: usize,
    data: Vec<u64>,
}

impl IntegralImage {
    /// Width of the source image (table width minus one)
    pub fn width(&self) -> usize {
        self.stride - 1
    }

    /// Height of the source image (table height minus one)
    pub fn height(&self) -> usize {
        self.rows - 1
    }

    /// Row length of the table
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `I[y][x]`, valid for `x <= width` and `y <= height`
    pub fn get(&self, x: usize, y: usize) -> u64 {
        self.data[y * self.stride + x]
    }

    /// Sum over the `w` x `h` rectangle with top-left corner (x, y)
    pub fn rect_sum(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let top = y * self.stride;
        let bottom = (y + h) * self.stride;
        self.data[bottom + x + w] + self.data[top + x]
            - self.data[top + x + w]
            - self.data[bottom + x]
    }

    /// Sum over a rectangle given as precomputed table offsets
    /// (`tl`, `tr`, `bl`, `br`) relative to `base`.
    #[inline]
    pub(crate) fn offset_sum(&self, base: usize, corners: &[usize; 4]) -> u64 {
        let d = &self.data;
        d[base + corners[3]] + d[base + corners[0]] - d[base + corners[1]] - d[base + corners[2]]
    }

    /// Raw table, row-major
    pub fn as_slice(&self) -> &[u64] {
        &self.data
    }
}

/// Sum and squared-sum tables built from the same image
#[derive(Debug, Clone)]
pub struct IntegralImages {
    /// Prefix sums of intensities
    pub sum: IntegralImage,
    /// Prefix sums of squared intensities
    pub squared: IntegralImage,
}

impl IntegralImages {
    /// Width of the source image
    pub fn width(&self) -> usize {
        self.sum.width()
    }

    /// Height of the source image
    pub fn height(&self) -> usize {
        self.sum.height()
    }
}

/// Builds [`IntegralImages`] from a grayscale buffer
pub struct IntegralImageBuilder;

impl IntegralImageBuilder {
    /// Build the sum and squared-sum tables.
    ///
    /// Rows are prefix-summed in parallel, then each row is accumulated onto
    /// the one above it. Fails with `InvalidInput` on a zero-sized image.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(pixels), fields(w = pixels.width(), h = pixels.height())))]
    pub fn build(pixels: &PixelBuffer<'_>) -> Result<IntegralImages> {
        let width = pixels.width();
        let height = pixels.height();
        if width == 0 || height == 0 {
            return Err(DetectError::InvalidInput(format!(
                "image must be non-empty, got {}x{}",
                width, height
            )));
        }

        let stride = width + 1;
        let rows = height + 1;
        let mut sum = vec![0u64; stride * rows];
        let mut squared = vec![0u64; stride * rows];

        // Row pass: table row y+1 holds running sums of pixel row y
        sum[stride..]
            .par_chunks_mut(stride)
            .zip(squared[stride..].par_chunks_mut(stride))
            .enumerate()
            .for_each(|(y, (sum_row, sq_row))| {
                let mut run = 0u64;
                let mut run_sq = 0u64;
                for (x, &p) in pixels.row(y).iter().enumerate() {
                    let p = p as u64;
                    run += p;
                    run_sq += p * p;
                    sum_row[x + 1] = run;
                    sq_row[x + 1] = run_sq;
                }
            });

        // Column pass
        accumulate_columns(&mut sum, stride, rows);
        accumulate_columns(&mut squared, stride, rows);

        Ok(IntegralImages {
            sum: IntegralImage {
                stride,
                rows,
                data: sum,
            },
            squared: IntegralImage {
                stride,
                rows,
                data: squared,
            },
        })
    }
}

fn accumulate_columns(data: &mut [u64], stride: usize, rows: usize) {
    for y in 2..rows {
        let (above, current) = data.split_at_mut(y * stride);
        let prev = &above[(y - 1) * stride..];
        for (cell, &up) in current[..stride].iter_mut().zip(prev.iter()) {
            *cell += up;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pseudo_random_image(width: usize, height: usize, seed: u32) -> Vec<u8> {
        let mut state = seed;
        (0..width * height)
            .map(|_| {
                state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_rect_sum_matches_brute_force() {
        let (w, h) = (9, 7);
        let data = pseudo_random_image(w, h, 42);
        let buf = PixelBuffer::new(&data, w, h).unwrap();
        let ii = IntegralImageBuilder::build(&buf).unwrap();

        for y in 0..h {
            for x in 0..w {
                for rh in 0..=(h - y) {
                    for rw in 0..=(w - x) {
                        let mut expected = 0u64;
                        let mut expected_sq = 0u64;
                        for yy in y..y + rh {
                            for xx in x..x + rw {
                                let p = buf.get(xx, yy) as u64;
                                expected += p;
                                expected_sq += p * p;
                            }
                        }
                        assert_eq!(ii.sum.rect_sum(x, y, rw, rh), expected);
                        assert_eq!(ii.squared.rect_sum(x, y, rw, rh), expected_sq);
                    }
                }
            }
        }
    }

    #[test]
    fn test_first_row_and_column_are_zero() {
        let data = vec![255u8; 6 * 4];
        let buf = PixelBuffer::new(&data, 6, 4).unwrap();
        let ii = IntegralImageBuilder::build(&buf).unwrap();
        assert_eq!(ii.width(), 6);
        assert_eq!(ii.height(), 4);
        for x in 0..=6 {
            assert_eq!(ii.sum.get(x, 0), 0);
        }
        for y in 0..=4 {
            assert_eq!(ii.sum.get(0, y), 0);
            assert_eq!(ii.squared.get(0, y), 0);
        }
        assert_eq!(ii.sum.get(6, 4), 255 * 24);
        assert_eq!(ii.squared.get(6, 4), 255 * 255 * 24);
    }

    #[test]
    fn test_offset_sum_matches_rect_sum() {
        let data = pseudo_random_image(12, 10, 7);
        let buf = PixelBuffer::new(&data, 12, 10).unwrap();
        let ii = IntegralImageBuilder::build(&buf).unwrap();
        let s = ii.sum.stride();
        // 4x3 rectangle at (2, 1) inside a window anchored at (3, 4)
        let corners = [s + 2, s + 6, 4 * s + 2, 4 * s + 6];
        let base = 4 * s + 3;
        assert_eq!(ii.sum.offset_sum(base, &corners), ii.sum.rect_sum(5, 5, 4, 3));
    }

    #[test]
    fn test_zero_sized_image_is_invalid_input() {
        let buf = PixelBuffer::new(&[], 0, 0).unwrap();
        let err = IntegralImageBuilder::build(&buf).unwrap_err();
        assert!(matches!(err, DetectError::InvalidInput(_)));

        let buf = PixelBuffer::new(&[], 5, 0).unwrap();
        assert!(IntegralImageBuilder::build(&buf).is_err());
    }
}
