//! Fixed-size binary occupancy grid.
//!
//! Cells are addressed as (x, y) with x the column and y the row. The grid
//! never grows: writes outside the bounds are ignored.

use serde::Serialize;

/// N×N grid of occupied/free flags
#[derive(Debug, Clone, PartialEq)]
pub struct OccupancyGrid {
    size: usize,
    resolution: f32,
    cells: Vec<bool>,
}

impl OccupancyGrid {
    /// Create an all-free grid of `size`×`size` cells, `resolution` meters per cell
    pub fn new(size: usize, resolution: f32) -> Self {
        Self {
            size,
            resolution,
            cells: vec![false; size * size],
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    /// Center cell, used as the session origin
    pub fn origin(&self) -> (f32, f32) {
        let c = (self.size / 2) as f32;
        (c, c)
    }

    #[inline]
    fn index(&self, x: i64, y: i64) -> Option<usize> {
        let n = self.size as i64;
        if (0..n).contains(&x) && (0..n).contains(&y) {
            Some(y as usize * self.size + x as usize)
        } else {
            None
        }
    }

    /// Mark a cell occupied. Returns `false` (and changes nothing) when out of bounds.
    pub fn mark_occupied(&mut self, x: i64, y: i64) -> bool {
        match self.index(x, y) {
            Some(i) => {
                self.cells[i] = true;
                true
            }
            None => false,
        }
    }

    /// Occupancy of a cell; out-of-bounds cells read as free
    pub fn is_occupied(&self, x: i64, y: i64) -> bool {
        self.index(x, y).is_some_and(|i| self.cells[i])
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c).count()
    }

    /// Sparse list of occupied cells as (x, y)
    pub fn occupied_cells(&self) -> Vec<(u32, u32)> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, c)| **c)
            .map(|(i, _)| ((i % self.size) as u32, (i / self.size) as u32))
            .collect()
    }

    /// Reset every cell to free
    pub fn clear(&mut self) {
        self.cells.fill(false);
    }

    /// Serializable summary for the control surface
    pub fn to_sparse(&self) -> SparseGrid {
        SparseGrid {
            size: self.size,
            resolution: self.resolution,
            occupied: self.occupied_cells(),
        }
    }
}

/// Occupied-cell listing of a grid
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct SparseGrid {
    pub size: usize,
    pub resolution: f32,
    pub occupied: Vec<(u32, u32)>,
}
