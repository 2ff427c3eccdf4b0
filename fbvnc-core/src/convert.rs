//! Pixel channel-order conversion.
//!
//! Framebuffers commonly store 32-bit pixels as `0xXXRRGGBB` (bytes
//! B, G, R, X in memory) while the mirror buffer is served to observers
//! as `0xXXBBGGRR` (bytes R, G, B, X). Conversion is a pure bit
//! permutation of the three 8-bit colour channels; the top byte is
//! dropped and there is no gamma or alpha handling.

use serde::{Deserialize, Serialize};

// ── ChannelLayout ────────────────────────────────────────────────

/// Bit offsets of the 8-bit colour channels inside a 32-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelLayout {
    pub red_shift: u8,
    pub green_shift: u8,
    pub blue_shift: u8,
}

impl ChannelLayout {
    /// Red in bits 16..24, blue in the low byte (`0xXXRRGGBB`).
    pub const BGRX: ChannelLayout = ChannelLayout {
        red_shift: 16,
        green_shift: 8,
        blue_shift: 0,
    };

    /// Red in the low byte, blue in bits 16..24 (`0xXXBBGGRR`).
    pub const RGBX: ChannelLayout = ChannelLayout {
        red_shift: 0,
        green_shift: 8,
        blue_shift: 16,
    };

    /// Build a layout from device-reported channel offsets.
    ///
    /// Returns `None` unless the offsets are distinct byte boundaries in
    /// the low 24 bits.
    pub fn from_offsets(red: u32, green: u32, blue: u32) -> Option<Self> {
        let valid = |o: u32| o <= 16 && o % 8 == 0;
        if !(valid(red) && valid(green) && valid(blue)) {
            return None;
        }
        if red == green || green == blue || red == blue {
            return None;
        }
        Some(Self {
            red_shift: red as u8,
            green_shift: green as u8,
            blue_shift: blue as u8,
        })
    }
}

// ── PixelConverter ───────────────────────────────────────────────

/// Converts raw frame-source pixels into the publisher's channel order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelConverter {
    source: ChannelLayout,
    target: ChannelLayout,
}

impl PixelConverter {
    pub const fn new(source: ChannelLayout, target: ChannelLayout) -> Self {
        Self { source, target }
    }

    /// Swap the low and third byte, keep the middle byte.
    pub const fn bgrx_to_rgbx() -> Self {
        Self::new(ChannelLayout::BGRX, ChannelLayout::RGBX)
    }

    /// No reordering; only the top byte is cleared.
    pub const fn identity(layout: ChannelLayout) -> Self {
        Self::new(layout, layout)
    }

    pub fn source(&self) -> ChannelLayout {
        self.source
    }

    pub fn target(&self) -> ChannelLayout {
        self.target
    }

    /// The converter that undoes this one (for the colour channels).
    pub fn inverse(&self) -> Self {
        Self::new(self.target, self.source)
    }

    /// Convert a single raw pixel.
    #[inline]
    pub fn convert(&self, raw: u32) -> u32 {
        let (s, t) = (&self.source, &self.target);
        let r = (raw >> s.red_shift) & 0xff;
        let g = (raw >> s.green_shift) & 0xff;
        let b = (raw >> s.blue_shift) & 0xff;
        (r << t.red_shift) | (g << t.green_shift) | (b << t.blue_shift)
    }
}

impl Default for PixelConverter {
    fn default() -> Self {
        Self::bgrx_to_rgbx()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bgrx_swaps_outer_bytes() {
        let conv = PixelConverter::bgrx_to_rgbx();
        assert_eq!(conv.convert(0x0011_2233), 0x0033_2211);
    }

    #[test]
    fn swap_is_self_inverse() {
        let conv = PixelConverter::bgrx_to_rgbx();
        for raw in [0x0011_2233, 0x00ab_cdef, 0x0000_00ff, 0x00ff_0000] {
            assert_eq!(conv.convert(conv.convert(raw)), raw);
        }
        assert_eq!(conv.inverse(), PixelConverter::new(ChannelLayout::RGBX, ChannelLayout::BGRX));
    }

    #[test]
    fn top_byte_is_discarded() {
        let conv = PixelConverter::bgrx_to_rgbx();
        assert_eq!(conv.convert(0xff11_2233), 0x0033_2211);
    }

    #[test]
    fn identity_keeps_channels() {
        let conv = PixelConverter::identity(ChannelLayout::RGBX);
        assert_eq!(conv.convert(0x0011_2233), 0x0011_2233);
        assert_eq!(conv.convert(0x8011_2233), 0x0011_2233);
    }

    #[test]
    fn layout_from_device_offsets() {
        assert_eq!(ChannelLayout::from_offsets(16, 8, 0), Some(ChannelLayout::BGRX));
        assert_eq!(ChannelLayout::from_offsets(0, 8, 16), Some(ChannelLayout::RGBX));
        // RGB565-style offsets are not byte aligned.
        assert_eq!(ChannelLayout::from_offsets(11, 5, 0), None);
        assert_eq!(ChannelLayout::from_offsets(8, 8, 0), None);
        assert_eq!(ChannelLayout::from_offsets(24, 8, 0), None);
    }
}
