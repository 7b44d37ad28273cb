//! # Canvas Cache
//!
//! In-memory mirror of the on-chain canvas with optimistic overlays.
//!
//! Each pixel holds the last color confirmed by the ledger and, while a
//! local placement is in flight, at most one pending color. Readers see
//! `pending.unwrap_or(confirmed)`.
//!
//! ```text
//!   applyOptimistic ──▶ pending = c
//!                          │
//!        ┌─────────────────┼─────────────────┐
//!        ▼                 ▼                 ▼
//!   reconcile(c)     applyRemote(c)     rollbackOptimistic
//!   confirmed = c    confirmed = c      pending = None
//!   pending = None   pending cleared
//!                    only if equal
//! ```

use crate::clock::Timestamp;
use crate::color::Rgb;
use crate::error::{CanvasError, CanvasResult};
use crate::grid::{Coord, Grid, GridSize};

/// State of one pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PixelState {
    /// Last color confirmed by the ledger.
    pub confirmed: Rgb,
    /// When the ledger last changed this pixel, if known.
    pub last_changed_at: Option<Timestamp>,
    /// Local color awaiting confirmation.
    pub pending: Option<Rgb>,
}

impl PixelState {
    /// The color a reader should display.
    #[inline]
    #[must_use]
    pub fn effective(&self) -> Rgb {
        self.pending.unwrap_or(self.confirmed)
    }
}

/// The local canvas mirror.
///
/// Mutated only through `apply_remote*`, `apply_optimistic`, `reconcile`
/// and `rollback_optimistic`. Every mutator returns the coordinates whose
/// effective color changed, which is what listeners get notified about.
pub struct CanvasCache {
    /// Fixed dimensions.
    size: GridSize,
    /// Row-major pixel states.
    pixels: Vec<PixelState>,
    /// Total mutations applied.
    updates_processed: u64,
}

impl CanvasCache {
    /// Creates a cache where every pixel shows `initial`.
    #[must_use]
    pub fn new(size: GridSize, initial: Rgb) -> Self {
        Self {
            size,
            pixels: vec![
                PixelState {
                    confirmed: initial,
                    last_changed_at: None,
                    pending: None,
                };
                size.area()
            ],
            updates_processed: 0,
        }
    }

    /// Dimensions.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> GridSize {
        self.size
    }

    /// Total mutations applied.
    #[inline]
    #[must_use]
    pub const fn updates_processed(&self) -> u64 {
        self.updates_processed
    }

    /// State of one pixel.
    #[must_use]
    pub fn pixel(&self, coord: Coord) -> Option<&PixelState> {
        self.size
            .contains(coord)
            .then(|| &self.pixels[self.size.index_of(coord)])
    }

    /// Number of pixels with an optimistic overlay.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pixels.iter().filter(|p| p.pending.is_some()).count()
    }

    /// Merges one confirmed remote value.
    ///
    /// A pending color equal to the confirmed value is reconciled away; a
    /// different pending color is newer than what was read and stays.
    ///
    /// Returns true if the visible color changed.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for coordinates off the canvas.
    pub fn apply_remote(
        &mut self,
        coord: Coord,
        color: Rgb,
        last_changed_at: Option<Timestamp>,
    ) -> CanvasResult<bool> {
        let pixel = self.pixel_mut(coord)?;
        let before = pixel.effective();

        pixel.confirmed = color;
        if last_changed_at.is_some() {
            pixel.last_changed_at = last_changed_at;
        }
        if pixel.pending == Some(color) {
            pixel.pending = None;
        }

        let changed = pixel.effective() != before;
        self.updates_processed += 1;
        Ok(changed)
    }

    /// Merges a full confirmed row. Returns coordinates whose visible
    /// color changed.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` if `y` is off the canvas, `InvalidConfig`
    /// if the row length differs from the canvas width.
    pub fn apply_remote_row(&mut self, y: u32, colors: &[Rgb]) -> CanvasResult<Vec<Coord>> {
        if y >= self.size.height() {
            return Err(self.out_of_bounds(Coord::new(0, y)));
        }
        if colors.len() != self.size.width() as usize {
            return Err(CanvasError::InvalidConfig(format!(
                "row {y} has {} colors, canvas width is {}",
                colors.len(),
                self.size.width()
            )));
        }

        let mut changed = Vec::new();
        for (x, &color) in (0u32..).zip(colors) {
            let coord = Coord::new(x, y);
            if self.apply_remote(coord, color, None)? {
                changed.push(coord);
            }
        }
        Ok(changed)
    }

    /// Shows `color` at `coord` until the ledger answers.
    ///
    /// A coordinate holds at most one pending color; a new one supersedes
    /// the old. The engine's single-transaction rule keeps this from
    /// happening in practice.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for coordinates off the canvas.
    pub fn apply_optimistic(&mut self, coord: Coord, color: Rgb) -> CanvasResult<bool> {
        let pixel = self.pixel_mut(coord)?;
        let before = pixel.effective();
        pixel.pending = Some(color);
        let changed = pixel.effective() != before;
        self.updates_processed += 1;
        Ok(changed)
    }

    /// The ledger confirmed `color` at `coord`: it becomes the confirmed
    /// value and the overlay is dropped.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for coordinates off the canvas.
    pub fn reconcile(
        &mut self,
        coord: Coord,
        color: Rgb,
        confirmed_at: Option<Timestamp>,
    ) -> CanvasResult<bool> {
        let pixel = self.pixel_mut(coord)?;
        let before = pixel.effective();
        pixel.confirmed = color;
        pixel.pending = None;
        if confirmed_at.is_some() {
            pixel.last_changed_at = confirmed_at;
        }
        let changed = pixel.effective() != before;
        self.updates_processed += 1;
        Ok(changed)
    }

    /// Drops the overlay, reverting to the confirmed color.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for coordinates off the canvas.
    pub fn rollback_optimistic(&mut self, coord: Coord) -> CanvasResult<bool> {
        let pixel = self.pixel_mut(coord)?;
        let before = pixel.effective();
        pixel.pending = None;
        let changed = pixel.effective() != before;
        self.updates_processed += 1;
        Ok(changed)
    }

    /// The effective grid: confirmed colors with pending overlays.
    #[must_use]
    pub fn snapshot(&self) -> Grid {
        let cells = self.pixels.iter().map(PixelState::effective).collect();
        // Cell count always matches the size; fall back to an empty view
        // rather than panic if that ever breaks.
        Grid::from_cells(self.size, cells).unwrap_or_else(|_| Grid::filled(self.size, Rgb::BLACK))
    }

    /// The confirmed grid without overlays.
    #[must_use]
    pub fn confirmed_snapshot(&self) -> Grid {
        let cells = self.pixels.iter().map(|p| p.confirmed).collect();
        Grid::from_cells(self.size, cells).unwrap_or_else(|_| Grid::filled(self.size, Rgb::BLACK))
    }

    fn pixel_mut(&mut self, coord: Coord) -> CanvasResult<&mut PixelState> {
        if !self.size.contains(coord) {
            return Err(self.out_of_bounds(coord));
        }
        let index = self.size.index_of(coord);
        Ok(&mut self.pixels[index])
    }

    fn out_of_bounds(&self, coord: Coord) -> CanvasError {
        CanvasError::CoordinateOutOfBounds {
            x: i64::from(coord.x),
            y: i64::from(coord.y),
            width: self.size.width(),
            height: self.size.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RED: Rgb = Rgb::new(0xFF, 0, 0);
    const BLUE: Rgb = Rgb::new(0, 0, 0xFF);

    fn cache() -> CanvasCache {
        CanvasCache::new(GridSize::new(3, 3).unwrap(), Rgb::BLACK)
    }

    #[test]
    fn test_optimistic_then_rollback() {
        let mut cache = cache();
        let c = Coord::new(1, 1);
        cache.apply_remote(c, BLUE, None).unwrap();

        assert!(cache.apply_optimistic(c, RED).unwrap());
        assert_eq!(cache.snapshot()[1][1], RED);
        assert_eq!(cache.confirmed_snapshot()[1][1], BLUE);

        assert!(cache.rollback_optimistic(c).unwrap());
        assert_eq!(cache.snapshot()[1][1], BLUE);
        assert_eq!(cache.pending_count(), 0);
    }

    #[test]
    fn test_remote_matching_pending_reconciles() {
        let mut cache = cache();
        let c = Coord::new(0, 2);
        cache.apply_optimistic(c, RED).unwrap();

        // Visible color does not change, but the overlay is gone.
        assert!(!cache.apply_remote(c, RED, None).unwrap());
        assert_eq!(cache.pixel(c).unwrap().pending, None);
        assert_eq!(cache.pixel(c).unwrap().confirmed, RED);
    }

    #[test]
    fn test_remote_different_keeps_pending() {
        let mut cache = cache();
        let c = Coord::new(2, 0);
        cache.apply_optimistic(c, RED).unwrap();

        assert!(!cache.apply_remote(c, BLUE, Some(Timestamp::from_secs(9))).unwrap());
        let pixel = cache.pixel(c).unwrap();
        assert_eq!(pixel.pending, Some(RED));
        assert_eq!(pixel.confirmed, BLUE);
        assert_eq!(pixel.last_changed_at, Some(Timestamp::from_secs(9)));
        assert_eq!(cache.snapshot()[0][2], RED);
    }

    #[test]
    fn test_reconcile_confirms() {
        let mut cache = cache();
        let c = Coord::new(1, 0);
        cache.apply_optimistic(c, RED).unwrap();
        cache.reconcile(c, RED, Some(Timestamp::from_secs(3))).unwrap();

        let pixel = cache.pixel(c).unwrap();
        assert_eq!(pixel.confirmed, RED);
        assert_eq!(pixel.pending, None);
        assert_eq!(pixel.last_changed_at, Some(Timestamp::from_secs(3)));
    }

    #[test]
    fn test_optimistic_supersedes_single_slot() {
        let mut cache = cache();
        let c = Coord::new(0, 0);
        cache.apply_optimistic(c, RED).unwrap();
        cache.apply_optimistic(c, BLUE).unwrap();
        assert_eq!(cache.pending_count(), 1);
        assert_eq!(cache.pixel(c).unwrap().pending, Some(BLUE));
    }

    #[test]
    fn test_row_merge_reports_changes() {
        let mut cache = cache();
        let changed = cache.apply_remote_row(1, &[Rgb::BLACK, RED, BLUE]).unwrap();
        assert_eq!(changed, vec![Coord::new(1, 1), Coord::new(2, 1)]);
        assert!(cache.apply_remote_row(3, &[RED; 3]).is_err());
        assert!(cache.apply_remote_row(0, &[RED; 2]).is_err());
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut cache = cache();
        assert!(matches!(
            cache.apply_optimistic(Coord::new(3, 0), RED),
            Err(CanvasError::CoordinateOutOfBounds { x: 3, y: 0, .. })
        ));
    }
}
