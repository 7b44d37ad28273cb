//! # Canvas Geometry
//!
//! Grid dimensions, validated coordinates and the read-only grid snapshot
//! handed to the UI.

use std::ops::Index;

use crate::color::Rgb;
use crate::error::{CanvasError, CanvasResult};

/// A coordinate already validated against some [`GridSize`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coord {
    /// Column, `0 <= x < width`.
    pub x: u32,
    /// Row, `0 <= y < height`.
    pub y: u32,
}

impl Coord {
    /// Creates a coordinate. Bounds are not checked here; use
    /// [`GridSize::validate`] on untrusted input.
    #[inline]
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

/// Fixed canvas dimensions, set once at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    width: u32,
    height: u32,
}

impl GridSize {
    /// Creates a size.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> CanvasResult<Self> {
        if width == 0 || height == 0 {
            return Err(CanvasError::InvalidConfig(format!(
                "canvas dimensions must be non-zero, got {width}x{height}"
            )));
        }
        Ok(Self { width, height })
    }

    /// Number of columns.
    #[inline]
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    #[inline]
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Total pixel count.
    #[inline]
    #[must_use]
    pub const fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Whether the coordinate lies on the canvas.
    #[inline]
    #[must_use]
    pub const fn contains(&self, coord: Coord) -> bool {
        coord.x < self.width && coord.y < self.height
    }

    /// Checks untrusted (possibly negative) input against the bounds.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for negative or too-large values.
    pub fn validate(&self, x: i64, y: i64) -> CanvasResult<Coord> {
        let column = u32::try_from(x).ok().filter(|&v| v < self.width);
        let row = u32::try_from(y).ok().filter(|&v| v < self.height);
        match (column, row) {
            (Some(x), Some(y)) => Ok(Coord::new(x, y)),
            _ => Err(CanvasError::CoordinateOutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            }),
        }
    }

    /// Row-major index of an in-bounds coordinate.
    #[inline]
    #[must_use]
    pub const fn index_of(&self, coord: Coord) -> usize {
        coord.y as usize * self.width as usize + coord.x as usize
    }
}

/// Immutable row-major view of the canvas.
///
/// `grid[y][x]` yields the color at column `x` of row `y`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grid {
    size: GridSize,
    cells: Vec<Rgb>,
}

impl Grid {
    /// A grid where every pixel is `color`.
    #[must_use]
    pub fn filled(size: GridSize, color: Rgb) -> Self {
        Self {
            size,
            cells: vec![color; size.area()],
        }
    }

    /// Builds a grid from row-major cells.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` when the cell count does not match the size.
    pub fn from_cells(size: GridSize, cells: Vec<Rgb>) -> CanvasResult<Self> {
        if cells.len() != size.area() {
            return Err(CanvasError::InvalidConfig(format!(
                "grid of {}x{} needs {} cells, got {}",
                size.width(),
                size.height(),
                size.area(),
                cells.len()
            )));
        }
        Ok(Self { size, cells })
    }

    /// Dimensions.
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Color at a coordinate, `None` when out of bounds.
    #[must_use]
    pub fn get(&self, coord: Coord) -> Option<Rgb> {
        self.size
            .contains(coord)
            .then(|| self.cells[self.size.index_of(coord)])
    }

    /// One row, `None` when out of bounds.
    #[must_use]
    pub fn row(&self, y: u32) -> Option<&[Rgb]> {
        (y < self.size.height()).then(|| {
            let start = y as usize * self.size.width() as usize;
            &self.cells[start..start + self.size.width() as usize]
        })
    }

    /// Iterates rows top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Rgb]> {
        self.cells.chunks(self.size.width() as usize)
    }
}

impl Index<usize> for Grid {
    type Output = [Rgb];

    fn index(&self, y: usize) -> &Self::Output {
        let width = self.size.width() as usize;
        &self.cells[y * width..(y + 1) * width]
    }
}
