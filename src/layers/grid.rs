//! Receptive fields of convolution and pooling layers.
//!
//! A grid of `width x height` inputs is covered by frames laid out every
//! `stride` cells. Each frame is a square window of side `2 * margin + 1`
//! centered on its frame point; one neuron reads one window.

use crate::error::{Error, Result};

/// The rectangular window of the input grid read by one neuron.
///
/// Bounds are inclusive and may lie outside the grid; cells outside the grid
/// never receive an input.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Area {
    grid_width: usize,
    top: isize,
    left: isize,
    bottom: isize,
    right: isize,
}

impl Area {
    fn around(grid_width: usize, center: usize, margin: usize) -> Self {
        let y = (center / grid_width) as isize;
        let x = (center % grid_width) as isize;
        let margin = margin as isize;
        Area {
            grid_width,
            top: y - margin,
            left: x - margin,
            bottom: y + margin,
            right: x + margin,
        }
    }

    /// Side of the square window.
    pub fn side(&self) -> usize {
        (self.right - self.left + 1) as usize
    }

    /// Returns true if the global input `id` lies inside the window.
    pub fn does_intersect(&self, id: usize) -> bool {
        let y = (id / self.grid_width) as isize;
        let x = (id % self.grid_width) as isize;
        self.top <= y && y <= self.bottom && self.left <= x && x <= self.right
    }

    /// Maps the global input `id` to its row-major offset in the window.
    ///
    /// Only meaningful when [`Area::does_intersect`] holds for `id`.
    pub fn localize(&self, id: usize) -> usize {
        let y = (id / self.grid_width) as isize;
        let x = (id % self.grid_width) as isize;
        ((y - self.top) * self.side() as isize + (x - self.left)) as usize
    }

    /// Maps a window offset back to the global input it reads, if that cell
    /// is part of a grid with `height` rows.
    pub fn globalize(&self, local: usize, height: usize) -> Option<usize> {
        let side = self.side() as isize;
        let y = self.top + local as isize / side;
        let x = self.left + local as isize % side;
        if y < 0 || x < 0 || y >= height as isize || x >= self.grid_width as isize {
            return None;
        }
        Some(y as usize * self.grid_width + x as usize)
    }
}

/// The partition of an input grid into neuron windows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    width: usize,
    height: usize,
    stride: usize,
    margin: usize,
    areas: Vec<Area>,
    /// For every neuron and window offset, the global input cell it reads.
    canonical: Vec<Option<usize>>,
}

impl Grid {
    /// Computes the partition of a `width x height` grid.
    ///
    /// Arguments:
    ///
    ///  * `stride` - distance between two neighbouring frame points.
    ///  * `margin` - cells on each side of the frame point; windows have
    ///               `(2 * margin + 1)²` inputs.
    pub fn new(width: usize, height: usize, stride: usize, margin: usize) -> Result<Self> {
        if stride == 0 || stride > width || stride > height {
            return Err(Error::InvalidGrid {
                width,
                height,
                stride,
            });
        }
        let frames = (width / stride) * (height / stride);
        let areas: Vec<Area> = (0..frames)
            .map(|id| Area::around(width, calc_point(id, width, stride), margin))
            .collect();
        let window = (2 * margin + 1) * (2 * margin + 1);
        let canonical = areas
            .iter()
            .flat_map(|area| (0..window).map(move |local| area.globalize(local, height)))
            .collect();
        Ok(Grid {
            width,
            height,
            stride,
            margin,
            areas,
            canonical,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn margin(&self) -> usize {
        self.margin
    }

    /// Number of input cells.
    pub fn cells(&self) -> usize {
        self.width * self.height
    }

    /// Number of frames, which is also the number of neurons.
    pub fn frames(&self) -> usize {
        self.areas.len()
    }

    /// Number of inputs of one window.
    pub fn window(&self) -> usize {
        let side = 2 * self.margin + 1;
        side * side
    }

    pub fn area(&self, neuron: usize) -> &Area {
        &self.areas[neuron]
    }

    pub fn areas(&self) -> &[Area] {
        &self.areas
    }

    /// Returns the input cell shared by tap `local` of `neuron`, or `None`
    /// when the tap falls outside the grid.
    pub fn canonical_tap(&self, neuron: usize, local: usize) -> Option<usize> {
        self.canonical[neuron * self.window() + local]
    }

    /// Number of windows covering the input cell `id`.
    pub fn coverage(&self, id: usize) -> usize {
        self.areas.iter().filter(|a| a.does_intersect(id)).count()
    }
}

/// Returns the 0-based center cell of frame `id`.
///
/// Frame points are numbered row by row; `width / stride` of them fit in one
/// row of the grid.
pub fn calc_point(id: usize, width: usize, stride: usize) -> usize {
    let columns = width / stride;
    (id / columns) * stride * width
        + (stride - 1) * width
        + (id % columns) * stride
        + stride
        - 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn five_by_five_stride_two() {
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        assert_eq!(grid.frames(), 4);
        assert_eq!(grid.window(), 9);
        let centers: Vec<usize> = (0..4).map(|id| calc_point(id, 5, 2)).collect();
        assert_eq!(centers, vec![6, 8, 16, 18]);
    }

    #[test]
    fn area_bounds() {
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        let area = grid.area(0);
        assert!(area.does_intersect(0));
        assert!(area.does_intersect(12));
        assert!(!area.does_intersect(3));
        assert!(!area.does_intersect(15));
        assert_eq!(area.localize(0), 0);
        assert_eq!(area.localize(12), 8);
        assert_eq!(grid.area(3).localize(12), 0);
    }

    #[test]
    fn coverage_counts_overlaps() {
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        assert_eq!(grid.coverage(0), 1);
        assert_eq!(grid.coverage(2), 2);
        assert_eq!(grid.coverage(10), 2);
        assert_eq!(grid.coverage(12), 4);
    }

    #[test]
    fn canonical_taps_name_input_cells() {
        let grid = Grid::new(5, 5, 2, 1).unwrap();
        assert_eq!(grid.canonical_tap(0, 8), Some(12));
        assert_eq!(grid.canonical_tap(1, 6), Some(12));
        assert_eq!(grid.canonical_tap(3, 0), Some(12));
        assert_eq!(grid.canonical_tap(3, 8), Some(24));
    }

    #[test]
    fn clipped_windows() {
        let grid = Grid::new(4, 4, 1, 1).unwrap();
        assert_eq!(grid.frames(), 16);
        assert_eq!(grid.canonical_tap(0, 0), None);
        assert_eq!(grid.canonical_tap(0, 4), Some(0));
    }

    #[test]
    fn invalid_strides() {
        assert!(Grid::new(5, 5, 0, 1).is_err());
        assert!(Grid::new(5, 3, 4, 1).is_err());
    }

    proptest! {
        #[test]
        fn every_cell_is_claimed(size in 2usize..12, stride in 1usize..4, margin in 0usize..3) {
            prop_assume!(stride <= size && margin + 1 >= stride);
            let grid = Grid::new(size, size, stride, margin).unwrap();
            for id in 0..size * size {
                let claims: Vec<usize> = grid
                    .areas()
                    .iter()
                    .filter(|a| a.does_intersect(id))
                    .map(|a| a.localize(id))
                    .collect();
                let covered = (size / stride) * stride;
                prop_assert!(
                    !claims.is_empty() || id % size >= covered || id / size >= covered
                );
                prop_assert!(claims.iter().all(|&local| local < grid.window()));
            }
        }

        #[test]
        fn localize_has_no_collisions(stride in 1usize..4, margin in 0usize..3) {
            let grid = Grid::new(9, 9, stride, margin).unwrap();
            for area in grid.areas() {
                let mut seen = vec![false; grid.window()];
                for id in (0..81).filter(|&id| area.does_intersect(id)) {
                    let local = area.localize(id);
                    prop_assert!(!seen[local]);
                    seen[local] = true;
                }
            }
        }
    }
}
