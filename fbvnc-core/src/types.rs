//! Shared geometry and pixel-storage types used across the mirror pipeline.
//!
//! Two pixel grids take part in every pass:
//!
//! - [`PixelGrid`] is a read-only, bounds-checked view over the frame
//!   source (typically a memory-mapped framebuffer that the display driver
//!   rewrites underneath us).
//! - [`MirrorBuffer`] is the owned, tightly packed copy of what the remote
//!   observers have been told the screen looks like.

use std::marker::PhantomData;
use std::ptr;

use crate::error::FbVncError;

// ── Geometry ─────────────────────────────────────────────────────

/// Resolution and row layout reported by a frame source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Visible width in pixels.
    pub width: u32,
    /// Visible height in pixels.
    pub height: u32,
    /// Row pitch in **pixels** (may exceed `width`).
    pub stride: u32,
    /// Bits per pixel as reported by the device.
    pub bits_per_pixel: u32,
}

impl Geometry {
    /// Geometry of a tightly packed 32-bit grid.
    pub const fn packed(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            stride: width,
            bits_per_pixel: 32,
        }
    }

    /// The rectangle covering the whole screen.
    pub fn bounds(&self) -> Rect {
        Rect::full(self.width, self.height)
    }
}

// ── Rect ─────────────────────────────────────────────────────────

/// Axis-aligned rectangle with **inclusive** bounds.
///
/// Emptiness is encoded canonically as `x1 > x2`; a non-empty rectangle
/// produced by the scanner always lies inside the screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Rect {
    /// The canonical empty rectangle.
    pub const EMPTY: Rect = Rect {
        x1: i32::MAX,
        y1: i32::MAX,
        x2: i32::MIN,
        y2: i32::MIN,
    };

    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// The rectangle `(0, 0, width - 1, height - 1)`.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32 - 1, height as i32 - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.x1 > self.x2 || self.y1 > self.y2
    }

    pub fn width(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.x2 - self.x1 + 1) as u32
        }
    }

    pub fn height(&self) -> u32 {
        if self.is_empty() {
            0
        } else {
            (self.y2 - self.y1 + 1) as u32
        }
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Grow the rectangle so that it covers `(x, y)`.
    pub fn include(&mut self, x: i32, y: i32) {
        self.x1 = self.x1.min(x);
        self.y1 = self.y1.min(y);
        self.x2 = self.x2.max(x);
        self.y2 = self.y2.max(y);
    }

    /// Bounding box of both rectangles; empty operands are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        match (self.is_empty(), other.is_empty()) {
            (true, true) => Rect::EMPTY,
            (true, false) => *other,
            (false, true) => *self,
            (false, false) => Rect::new(
                self.x1.min(other.x1),
                self.y1.min(other.y1),
                self.x2.max(other.x2),
                self.y2.max(other.y2),
            ),
        }
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let r = Rect::new(
            self.x1.max(other.x1),
            self.y1.max(other.y1),
            self.x2.min(other.x2),
            self.y2.min(other.y2),
        );
        if r.is_empty() { Rect::EMPTY } else { r }
    }

    /// Translate into the exclusive-upper-bound form handed to the
    /// publisher. Returns `None` for an empty rectangle.
    pub fn to_region(&self) -> Option<Region> {
        if self.is_empty() {
            return None;
        }
        Some(Region {
            x1: self.x1,
            y1: self.y1,
            x2: self.x2 + 1,
            y2: self.y2 + 1,
        })
    }
}

impl Default for Rect {
    fn default() -> Self {
        Rect::EMPTY
    }
}

impl std::fmt::Display for Rect {
    /// X11 geometry notation: `WxH+X+Y`.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "{}x{}+{}+{}", self.width(), self.height(), self.x1, self.y1)
        }
    }
}

// ── Region ───────────────────────────────────────────────────────

/// Changed area as announced to the publisher: `x2` and `y2` are
/// **exclusive**.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Region {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Back to inclusive bounds.
    pub fn to_rect(&self) -> Rect {
        Rect::new(self.x1, self.y1, self.x2 - 1, self.y2 - 1)
    }
}

// ── PixelGrid ────────────────────────────────────────────────────

/// Read-only view over a 2-D grid of 32-bit pixels with a row stride.
///
/// The backing memory may be rewritten by hardware while the view is
/// alive, so every read is volatile and no snapshot is taken. A pass may
/// observe a torn frame; the next pass picks up the remainder.
///
/// Geometry is validated once at construction, after which [`pixel`]
/// only has to check the coordinates against `width` and `height`.
///
/// [`pixel`]: Self::pixel
pub struct PixelGrid<'a> {
    base: *const u32,
    len: usize,
    width: usize,
    height: usize,
    stride: usize,
    _marker: PhantomData<&'a [u32]>,
}

impl<'a> PixelGrid<'a> {
    /// View an ordinary slice as a pixel grid.
    pub fn new(
        pixels: &'a [u32],
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, FbVncError> {
        Self::validate(pixels.len(), width, height, stride)?;
        Ok(Self {
            base: pixels.as_ptr(),
            len: pixels.len(),
            width,
            height,
            stride,
            _marker: PhantomData,
        })
    }

    /// View externally owned memory (e.g. an `mmap`ed framebuffer).
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads of `len` consecutive `u32`s, suitably
    /// aligned, for the whole lifetime `'a`.
    pub unsafe fn from_raw_parts(
        base: *const u32,
        len: usize,
        width: usize,
        height: usize,
        stride: usize,
    ) -> Result<Self, FbVncError> {
        Self::validate(len, width, height, stride)?;
        Ok(Self {
            base,
            len,
            width,
            height,
            stride,
            _marker: PhantomData,
        })
    }

    fn validate(len: usize, width: usize, height: usize, stride: usize) -> Result<(), FbVncError> {
        if width == 0 || height == 0 {
            return Err(FbVncError::InvalidGeometry(format!(
                "empty grid {width}x{height}"
            )));
        }
        if stride < width {
            return Err(FbVncError::InvalidGeometry(format!(
                "stride {stride} is smaller than width {width}"
            )));
        }
        let required = (height - 1)
            .checked_mul(stride)
            .and_then(|n| n.checked_add(width))
            .ok_or_else(|| FbVncError::InvalidGeometry("grid size overflows".into()))?;
        if required > len {
            return Err(FbVncError::InvalidGeometry(format!(
                "{width}x{height} with stride {stride} needs {required} pixels, backing has {len}"
            )));
        }
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row pitch in pixels.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of `u32`s addressable through this view.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read the raw pixel at `(x, y)`.
    ///
    /// # Panics
    ///
    /// Panics if `(x, y)` lies outside `width × height`.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> u32 {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) outside {}x{} grid",
            self.width,
            self.height
        );
        // In range: y * stride + x <= (height - 1) * stride + width - 1 < len.
        unsafe { ptr::read_volatile(self.base.add(y * self.stride + x)) }
    }
}

// ── MirrorBuffer ─────────────────────────────────────────────────

/// Owned `width × height` pixel buffer, stride == width, initially zero.
///
/// Holds pixels in the publisher's channel order. It is the "previous"
/// side of every diff and the backing store the publisher transmits from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl MirrorBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![0; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        assert!(x < self.width, "x {x} out of bounds");
        self.pixels[y * self.width + x]
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is out of bounds.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: u32) {
        assert!(x < self.width, "x {x} out of bounds");
        self.pixels[y * self.width + x] = value;
    }

    /// One row of pixels.
    pub fn row(&self, y: usize) -> &[u32] {
        let start = y * self.width;
        &self.pixels[start..start + self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [u32] {
        let start = y * self.width;
        &mut self.pixels[start..start + self.width]
    }

    pub fn as_slice(&self) -> &[u32] {
        &self.pixels
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rect_is_canonical() {
        assert!(Rect::EMPTY.is_empty());
        assert!(Rect::new(5, 0, 4, 10).is_empty());
        assert_eq!(Rect::EMPTY.width(), 0);
        assert_eq!(Rect::EMPTY.to_region(), None);
    }

    #[test]
    fn include_grows_from_empty() {
        let mut r = Rect::EMPTY;
        r.include(7, 3);
        assert_eq!(r, Rect::new(7, 3, 7, 3));
        r.include(2, 9);
        assert_eq!(r, Rect::new(2, 3, 7, 9));
    }

    #[test]
    fn union_ignores_empty() {
        let a = Rect::new(1, 1, 2, 2);
        assert_eq!(a.union(&Rect::EMPTY), a);
        assert_eq!(Rect::EMPTY.union(&a), a);
        assert_eq!(a.union(&Rect::new(5, 0, 6, 1)), Rect::new(1, 0, 6, 2));
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = Rect::new(0, 0, 3, 3);
        assert!(a.intersect(&Rect::new(4, 4, 8, 8)).is_empty());
        assert_eq!(a.intersect(&Rect::new(2, 1, 8, 8)), Rect::new(2, 1, 3, 3));
    }

    #[test]
    fn region_uses_exclusive_upper_bound() {
        let region = Rect::new(2, 3, 5, 7).to_region().unwrap();
        assert_eq!(region, Region::new(2, 3, 6, 8));
        assert_eq!(region.to_rect(), Rect::new(2, 3, 5, 7));
    }

    #[test]
    fn display_uses_geometry_notation() {
        assert_eq!(Rect::new(10, 20, 13, 21).to_string(), "4x2+10+20");
    }

    #[test]
    fn grid_reads_through_stride() {
        // 3x2 visible, stride 4: the fourth column is padding.
        let data = [1, 2, 3, 99, 4, 5, 6, 99];
        let grid = PixelGrid::new(&data, 3, 2, 4).unwrap();
        assert_eq!(grid.pixel(0, 0), 1);
        assert_eq!(grid.pixel(2, 1), 6);
    }

    #[test]
    fn grid_allows_short_last_row() {
        let data = [0u32; 7];
        assert!(PixelGrid::new(&data, 3, 2, 4).is_ok());
    }

    #[test]
    fn grid_rejects_bad_geometry() {
        let data = [0u32; 8];
        assert!(PixelGrid::new(&data, 5, 2, 4).is_err());
        assert!(PixelGrid::new(&data, 4, 3, 4).is_err());
        assert!(PixelGrid::new(&data, 0, 2, 4).is_err());
    }

    #[test]
    #[should_panic]
    fn grid_pixel_out_of_bounds_panics() {
        let data = [0u32; 8];
        let grid = PixelGrid::new(&data, 3, 2, 4).unwrap();
        let _ = grid.pixel(3, 0);
    }

    #[test]
    fn mirror_starts_zeroed() {
        let m = MirrorBuffer::new(4, 3);
        assert_eq!(m.as_slice().len(), 12);
        assert!(m.as_slice().iter().all(|&p| p == 0));
    }

    #[test]
    fn mirror_set_get_row() {
        let mut m = MirrorBuffer::new(4, 3);
        m.set(1, 2, 0xABCDEF);
        assert_eq!(m.get(1, 2), 0xABCDEF);
        assert_eq!(m.row(2), &[0, 0xABCDEF, 0, 0]);
    }
}
