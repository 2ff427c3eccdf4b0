//! Frame sources: where the pixels being mirrored come from.
//!
//! [`FramebufferDevice`] maps a Linux fbdev node (`/dev/fb*`) read-only
//! and exposes it as a [`PixelGrid`] without copying. [`MemoryFrame`] is a
//! plain in-memory grid used by tests and headless setups.
//!
//! # Platform
//!
//! The fbdev backend is **Linux-only**. On other platforms the type is
//! still defined but [`FramebufferDevice::open`] fails at runtime.

use std::path::{Path, PathBuf};

use crate::convert::ChannelLayout;
use crate::error::FbVncError;
use crate::types::{Geometry, PixelGrid, Rect};

// ── FrameSource ──────────────────────────────────────────────────

/// A read-only, externally refreshed grid of 32-bit pixels.
pub trait FrameSource {
    /// Resolution and row layout.
    fn geometry(&self) -> Geometry;

    /// Channel layout reported by the source, if it reports one.
    fn channel_layout(&self) -> Option<ChannelLayout> {
        None
    }

    /// Borrow the current pixels. No snapshot is taken.
    fn grid(&self) -> Result<PixelGrid<'_>, FbVncError>;
}

// ── MemoryFrame ──────────────────────────────────────────────────

/// Heap-backed frame source.
#[derive(Debug, Clone)]
pub struct MemoryFrame {
    geometry: Geometry,
    layout: ChannelLayout,
    pixels: Vec<u32>,
}

impl MemoryFrame {
    /// A zeroed, tightly packed `width × height` frame in BGRX order.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            geometry: Geometry::packed(width, height),
            layout: ChannelLayout::BGRX,
            pixels: vec![0; width as usize * height as usize],
        }
    }

    /// A zeroed frame whose rows are `stride` pixels apart.
    pub fn with_stride(width: u32, height: u32, stride: u32) -> Result<Self, FbVncError> {
        let pixels = vec![0; stride as usize * height as usize];
        PixelGrid::new(&pixels, width as usize, height as usize, stride as usize)?;
        Ok(Self {
            geometry: Geometry {
                width,
                height,
                stride,
                bits_per_pixel: 32,
            },
            layout: ChannelLayout::BGRX,
            pixels,
        })
    }

    pub fn with_layout(mut self, layout: ChannelLayout) -> Self {
        self.layout = layout;
        self
    }

    /// # Panics
    ///
    /// Panics if `(x, y)` is outside the frame.
    pub fn set_pixel(&mut self, x: u32, y: u32, value: u32) {
        assert!(x < self.geometry.width && y < self.geometry.height);
        let index = y as usize * self.geometry.stride as usize + x as usize;
        self.pixels[index] = value;
    }

    /// Paint every pixel of `rect` (clipped to the frame).
    pub fn fill_rect(&mut self, rect: Rect, value: u32) {
        let rect = rect.intersect(&self.geometry.bounds());
        if rect.is_empty() {
            return;
        }
        for y in rect.y1..=rect.y2 {
            for x in rect.x1..=rect.x2 {
                self.set_pixel(x as u32, y as u32, value);
            }
        }
    }

    /// Raw backing store, padding included.
    pub fn pixels_mut(&mut self) -> &mut [u32] {
        &mut self.pixels
    }
}

impl FrameSource for MemoryFrame {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn channel_layout(&self) -> Option<ChannelLayout> {
        Some(self.layout)
    }

    fn grid(&self) -> Result<PixelGrid<'_>, FbVncError> {
        PixelGrid::new(
            &self.pixels,
            self.geometry.width as usize,
            self.geometry.height as usize,
            self.geometry.stride as usize,
        )
    }
}

// ── FramebufferDevice ────────────────────────────────────────────

/// Read-only memory mapping of a Linux framebuffer device.
///
/// The mapping covers `line_length × yres` bytes from the start of the
/// device memory. Panning offsets are not followed.
pub struct FramebufferDevice {
    path: PathBuf,
    geometry: Geometry,
    layout: Option<ChannelLayout>,
    #[cfg(target_os = "linux")]
    _file: std::fs::File,
    #[cfg(target_os = "linux")]
    map: *mut libc::c_void,
    #[cfg(target_os = "linux")]
    map_len: usize,
}

impl FramebufferDevice {
    /// Device node this frame source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ── Linux implementation ─────────────────────────────────────────

#[cfg(target_os = "linux")]
mod platform {
    use std::fs::OpenOptions;
    use std::os::fd::AsRawFd;
    use std::ptr;

    use libc::{MAP_FAILED, MAP_SHARED, PROT_READ, c_ulong, c_void, ioctl, mmap, munmap};
    use tracing::debug;

    use super::*;

    const FBIOGET_VSCREENINFO: c_ulong = 0x4600;
    const FBIOGET_FSCREENINFO: c_ulong = 0x4602;

    /// `struct fb_bitfield`.
    #[allow(dead_code)]
    #[repr(C)]
    #[derive(Debug, Default, Clone, Copy)]
    struct Bitfield {
        offset: u32,
        length: u32,
        msb_right: u32,
    }

    /// `struct fb_var_screeninfo`.
    #[allow(dead_code)]
    #[repr(C)]
    #[derive(Debug, Default, Clone)]
    struct VarScreenInfo {
        xres: u32,
        yres: u32,
        xres_virtual: u32,
        yres_virtual: u32,
        xoffset: u32,
        yoffset: u32,
        bits_per_pixel: u32,
        grayscale: u32,
        red: Bitfield,
        green: Bitfield,
        blue: Bitfield,
        transp: Bitfield,
        nonstd: u32,
        activate: u32,
        height_mm: u32,
        width_mm: u32,
        accel_flags: u32,
        pixclock: u32,
        left_margin: u32,
        right_margin: u32,
        upper_margin: u32,
        lower_margin: u32,
        hsync_len: u32,
        vsync_len: u32,
        sync: u32,
        vmode: u32,
        rotate: u32,
        colorspace: u32,
        reserved: [u32; 4],
    }

    /// `struct fb_fix_screeninfo`.
    #[allow(dead_code)]
    #[repr(C)]
    #[derive(Debug, Default, Clone)]
    struct FixScreenInfo {
        id: [u8; 16],
        smem_start: c_ulong,
        smem_len: u32,
        kind: u32,
        kind_aux: u32,
        visual: u32,
        xpanstep: u16,
        ypanstep: u16,
        ywrapstep: u16,
        line_length: u32,
        mmio_start: c_ulong,
        mmio_len: u32,
        accel: u32,
        capabilities: u16,
        reserved: [u16; 2],
    }

    impl FramebufferDevice {
        /// Open `path`, query its geometry and map it read-only.
        pub fn open(path: impl AsRef<Path>) -> Result<Self, FbVncError> {
            let path = path.as_ref();
            let file = OpenOptions::new()
                .read(true)
                .open(path)
                .map_err(|e| FbVncError::from_open(path, e))?;
            let fd = file.as_raw_fd();

            let mut var = VarScreenInfo::default();
            if unsafe { ioctl(fd, FBIOGET_VSCREENINFO as _, &mut var as *mut VarScreenInfo) } != 0 {
                return Err(FbVncError::Ioctl {
                    request: "FBIOGET_VSCREENINFO",
                    source: std::io::Error::last_os_error(),
                });
            }

            let mut fix = FixScreenInfo::default();
            if unsafe { ioctl(fd, FBIOGET_FSCREENINFO as _, &mut fix as *mut FixScreenInfo) } != 0 {
                return Err(FbVncError::Ioctl {
                    request: "FBIOGET_FSCREENINFO",
                    source: std::io::Error::last_os_error(),
                });
            }

            debug!(
                "xres={}, yres={}, xresv={}, yresv={}, xoffs={}, yoffs={}, bpp={}, line_length={}",
                var.xres,
                var.yres,
                var.xres_virtual,
                var.yres_virtual,
                var.xoffset,
                var.yoffset,
                var.bits_per_pixel,
                fix.line_length,
            );

            if var.bits_per_pixel != 32 {
                return Err(FbVncError::UnsupportedDepth(var.bits_per_pixel));
            }

            let geometry = Geometry {
                width: var.xres,
                height: var.yres,
                stride: fix.line_length / 4,
                bits_per_pixel: var.bits_per_pixel,
            };
            let layout =
                ChannelLayout::from_offsets(var.red.offset, var.green.offset, var.blue.offset);

            let map_len = fix.line_length as usize * var.yres as usize;
            let map = unsafe { mmap(ptr::null_mut(), map_len, PROT_READ, MAP_SHARED, fd, 0) };
            if map == MAP_FAILED {
                return Err(FbVncError::MapFailed(std::io::Error::last_os_error()));
            }

            let device = Self {
                path: path.to_path_buf(),
                geometry,
                layout,
                _file: file,
                map,
                map_len,
            };
            // Reject a line length that cannot hold a row before anyone scans.
            device.grid()?;
            Ok(device)
        }
    }

    impl FrameSource for FramebufferDevice {
        fn geometry(&self) -> Geometry {
            self.geometry
        }

        fn channel_layout(&self) -> Option<ChannelLayout> {
            self.layout
        }

        fn grid(&self) -> Result<PixelGrid<'_>, FbVncError> {
            // The mapping lives as long as `self` and is page aligned.
            unsafe {
                PixelGrid::from_raw_parts(
                    self.map as *const u32,
                    self.map_len / 4,
                    self.geometry.width as usize,
                    self.geometry.height as usize,
                    self.geometry.stride as usize,
                )
            }
        }
    }

    impl Drop for FramebufferDevice {
        fn drop(&mut self) {
            unsafe {
                munmap(self.map as *mut c_void, self.map_len);
            }
        }
    }

    // The mapping is read-only and owned by this value.
    unsafe impl Send for FramebufferDevice {}
}

// ── Non-Linux stub ───────────────────────────────────────────────

#[cfg(not(target_os = "linux"))]
impl FramebufferDevice {
    /// fbdev is only available on Linux.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FbVncError> {
        Err(FbVncError::Other(format!(
            "{}: framebuffer devices are only available on Linux",
            path.as_ref().display()
        )))
    }
}

#[cfg(not(target_os = "linux"))]
impl FrameSource for FramebufferDevice {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn channel_layout(&self) -> Option<ChannelLayout> {
        self.layout
    }

    fn grid(&self) -> Result<PixelGrid<'_>, FbVncError> {
        Err(FbVncError::Other("Not supported on this platform".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────
