//! Adaptive dirty-region detection between the frame source and the
//! mirror buffer.
//!
//! A pass runs in two phases:
//!
//! 1. **Coarse probe.** Only rows `top + offset, top + offset + skip, …`
//!    are visited, and within each of them only columns
//!    `left + offset, left + offset + skip, …`. Because the same offset is
//!    used on both axes, exactly one cell per `skip × skip` block is
//!    compared: the block's diagonal cell for this offset.
//! 2. **Refinement.** If the probe found anything and `skip > 1`, the
//!    block-aligned area around the probe's bounding box is rescanned at
//!    full resolution (`skip = 1`) in four strips: above, left of, right
//!    of and below the bounding box.
//!
//! Every differing pixel is written into the mirror as soon as it is
//! found, so nested calls never report the same difference twice.
//!
//! # Coverage
//!
//! The probe is a heuristic, not an exhaustive diff. A change confined to
//! a block's non-probed cells goes unnoticed until the [`ScanOffset`]
//! rotates onto it, which takes at most `skip` passes for a change on the
//! block diagonal and may never happen for an isolated off-diagonal pixel
//! unless something next to it changes too. This trades completeness for
//! roughly `skip²` fewer comparisons per pass. Deployments that need a
//! complete diff select [`ScanMode::Exhaustive`].

use serde::{Deserialize, Serialize};

use crate::convert::PixelConverter;
use crate::types::{MirrorBuffer, PixelGrid, Rect};

/// Default probe stride in pixels.
pub const DEFAULT_SKIP: usize = 16;

// ── ScanMode ─────────────────────────────────────────────────────

/// How a full-frame pass walks the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Sparse diagonal probe plus block refinement.
    #[default]
    Adaptive,
    /// Compare every pixel on every pass.
    Exhaustive,
}

// ── ScanOffset ───────────────────────────────────────────────────

/// Rotating probe phase in `[0, skip)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOffset {
    value: usize,
    skip: usize,
}

impl ScanOffset {
    /// A `skip` of 0 is treated as 1.
    pub fn new(skip: usize) -> Self {
        Self {
            value: 0,
            skip: skip.max(1),
        }
    }

    pub fn get(&self) -> usize {
        self.value
    }

    /// Move to the next phase, wrapping at `skip`.
    pub fn advance(&mut self) {
        self.value = (self.value + 1) % self.skip;
    }
}

// ── DirtyRegionScanner ───────────────────────────────────────────

/// Stateless scanner: all state lives in the mirror buffer passed in.
#[derive(Debug, Clone)]
pub struct DirtyRegionScanner {
    converter: PixelConverter,
    skip: usize,
    mode: ScanMode,
}

impl DirtyRegionScanner {
    /// Create an adaptive scanner with the given probe stride (at least 1).
    pub fn new(converter: PixelConverter, skip: usize) -> Self {
        Self {
            converter,
            skip: skip.max(1),
            mode: ScanMode::Adaptive,
        }
    }

    pub fn with_mode(mut self, mode: ScanMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn skip(&self) -> usize {
        self.skip
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn converter(&self) -> &PixelConverter {
        &self.converter
    }

    /// Scan the whole frame at the given probe phase.
    pub fn scan_frame(&self, grid: &PixelGrid<'_>, mirror: &mut MirrorBuffer, offset: usize) -> Rect {
        let window = Rect::full(grid.width() as u32, grid.height() as u32);
        match self.mode {
            ScanMode::Adaptive => self.scan(grid, mirror, window, offset, self.skip),
            ScanMode::Exhaustive => self.scan(grid, mirror, window, 0, 1),
        }
    }

    /// Scan `window` (inclusive bounds) with an explicit phase and stride
    /// and return the bounding box of every difference found.
    ///
    /// The window is clipped to the grid. A `skip` of 0 is treated as 1 and
    /// `offset` is taken modulo `skip`.
    pub fn scan(
        &self,
        grid: &PixelGrid<'_>,
        mirror: &mut MirrorBuffer,
        window: Rect,
        offset: usize,
        skip: usize,
    ) -> Rect {
        let skip = skip.max(1);
        let offset = offset % skip;
        debug_assert_eq!(
            (grid.width(), grid.height()),
            (mirror.width(), mirror.height()),
            "grid and mirror dimensions differ"
        );
        let window = window.intersect(&Rect::full(
            mirror.width().min(grid.width()) as u32,
            mirror.height().min(grid.height()) as u32,
        ));
        self.scan_window(grid, mirror, window, offset as i32, skip as i32)
    }

    // ── Internal ─────────────────────────────────────────────────

    fn scan_window(
        &self,
        grid: &PixelGrid<'_>,
        mirror: &mut MirrorBuffer,
        window: Rect,
        offset: i32,
        skip: i32,
    ) -> Rect {
        let mut dirty = self.probe(grid, mirror, window, offset, skip);
        if dirty.is_empty() || skip <= 1 {
            return dirty;
        }

        // Block-aligned area the probe hits stand for. The near edges are
        // already aligned; the far edges stop at the window.
        let outer = Rect::new(
            dirty.x1 - offset,
            dirty.y1 - offset,
            (dirty.x2 + skip - offset - 1).min(window.x2),
            (dirty.y2 + skip - offset - 1).min(window.y2),
        );
        let strips = [
            Rect::new(outer.x1, outer.y1, outer.x2, dirty.y1 - 1),
            Rect::new(outer.x1, dirty.y1, dirty.x1 - 1, dirty.y2),
            Rect::new(dirty.x2 + 1, dirty.y1, outer.x2, dirty.y2),
            Rect::new(outer.x1, dirty.y2 + 1, outer.x2, outer.y2),
        ];
        for strip in strips {
            let found = self.scan_window(grid, mirror, strip, 0, 1);
            dirty = dirty.union(&found);
        }
        dirty
    }

    /// Compare the probe lattice of `window`, syncing every mismatch into
    /// the mirror.
    fn probe(
        &self,
        grid: &PixelGrid<'_>,
        mirror: &mut MirrorBuffer,
        window: Rect,
        offset: i32,
        skip: i32,
    ) -> Rect {
        let mut dirty = Rect::EMPTY;
        if window.is_empty() {
            return dirty;
        }

        let step = skip as usize;
        for y in (window.y1 + offset..=window.y2).step_by(step) {
            let row = mirror.row_mut(y as usize);
            for x in (window.x1 + offset..=window.x2).step_by(step) {
                let pixel = self.converter.convert(grid.pixel(x as usize, y as usize));
                let slot = &mut row[x as usize];
                if *slot != pixel {
                    *slot = pixel;
                    dirty.include(x, y);
                }
            }
        }
        dirty
    }
}

// ── Tests ────────────────────────────────────────────────────────
