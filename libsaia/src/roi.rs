use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::error::ImageError;

/// A square region of interest in image pixel coordinates.
///
/// x runs along columns and y along rows. The region starts at `center - size / 2`
/// (integer division) and spans exactly `size` pixels, so for odd sizes it is centred
/// and for even sizes it leans one pixel towards larger coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub center_x: usize,
    pub center_y: usize,
    pub size: usize,
}

/// Row and column ranges of a ROI that has been checked against an image shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoiBounds {
    pub rows: Range<usize>,
    pub cols: Range<usize>,
}

impl RoiBounds {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        self.rows.contains(&row) && self.cols.contains(&col)
    }

    pub fn n_pixels(&self) -> usize {
        self.rows.len() * self.cols.len()
    }
}

impl Roi {
    pub fn new(center_x: usize, center_y: usize, size: usize) -> Self {
        Self {
            center_x,
            center_y,
            size,
        }
    }

    /// Resolve the ROI against an image with the given number of rows and columns.
    ///
    /// Fails with InvalidRoi if the size is zero or any edge of the rectangle falls outside the image.
    pub fn resolve(&self, n_rows: usize, n_cols: usize) -> Result<RoiBounds, ImageError> {
        let invalid = || ImageError::InvalidRoi {
            center_x: self.center_x,
            center_y: self.center_y,
            size: self.size,
            rows: n_rows,
            cols: n_cols,
        };
        if self.size == 0 {
            return Err(invalid());
        }
        let half = self.size / 2;
        let col_start = self.center_x.checked_sub(half).ok_or_else(invalid)?;
        let row_start = self.center_y.checked_sub(half).ok_or_else(invalid)?;
        let col_end = col_start + self.size;
        let row_end = row_start + self.size;
        if col_end > n_cols || row_end > n_rows {
            return Err(invalid());
        }
        Ok(RoiBounds {
            rows: row_start..row_end,
            cols: col_start..col_end,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_even_size_leans_forward() {
        let bounds = Roi::new(2, 1, 2).resolve(4, 4).unwrap();
        assert_eq!(bounds.rows, 0..2);
        assert_eq!(bounds.cols, 1..3);
        assert_eq!(bounds.n_pixels(), 4);
    }

    #[test]
    fn test_odd_size_is_centred() {
        let bounds = Roi::new(5, 5, 3).resolve(10, 10).unwrap();
        assert_eq!(bounds.rows, 4..7);
        assert_eq!(bounds.cols, 4..7);
        assert!(bounds.contains(6, 4));
        assert!(!bounds.contains(7, 4));
    }

    #[test]
    fn test_bounds_exhaustive() {
        let pic_size = 6;
        for size in 0..=pic_size + 1 {
            for cx in 0..=pic_size + 1 {
                for cy in 0..=pic_size + 1 {
                    let roi = Roi::new(cx, cy, size);
                    let half = size / 2;
                    let inside = size >= 1
                        && cx >= half
                        && cy >= half
                        && cx - half + size <= pic_size
                        && cy - half + size <= pic_size;
                    match roi.resolve(pic_size, pic_size) {
                        Ok(bounds) => {
                            assert!(inside, "{roi:?} should have been rejected");
                            assert!(bounds.rows.end <= pic_size && bounds.cols.end <= pic_size);
                        }
                        Err(ImageError::InvalidRoi { .. }) => {
                            assert!(!inside, "{roi:?} should have been accepted")
                        }
                        Err(e) => panic!("unexpected error {e}"),
                    }
                }
            }
        }
    }

    #[test]
    fn test_non_square_image() {
        assert!(Roi::new(1, 3, 2).resolve(4, 3).is_ok());
        assert!(Roi::new(3, 1, 2).resolve(4, 3).is_err());
    }
}
