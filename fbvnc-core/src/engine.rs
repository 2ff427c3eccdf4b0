//! The mirror engine: frame source, mirror buffer, scanner and probe
//! phase bundled into one owned value.
//!
//! One [`pass`](MirrorEngine::pass) is one scheduler tick's worth of work:
//! scan at the current offset, publish the dirty rectangle, rotate the
//! offset.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::capture::FrameSource;
use crate::error::FbVncError;
use crate::publish::{Publisher, UpdatePublisher};
use crate::scan::{DirtyRegionScanner, ScanOffset};
use crate::types::{Geometry, MirrorBuffer, Rect, Region};

// ── PassReport ───────────────────────────────────────────────────

/// Outcome of a single scan pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    /// Probe phase the pass ran at.
    pub offset: usize,
    /// Dirty rectangle found (possibly empty).
    pub dirty: Rect,
    /// Region announced to the publisher, if any.
    pub published: Option<Region>,
    /// Wall-clock time spent scanning and copying.
    pub elapsed: Duration,
}

// ── MirrorEngine ─────────────────────────────────────────────────

pub struct MirrorEngine<F> {
    source: F,
    geometry: Geometry,
    mirror: MirrorBuffer,
    scanner: DirtyRegionScanner,
    updater: UpdatePublisher,
    offset: ScanOffset,
    passes: u64,
}

impl<F: FrameSource> MirrorEngine<F> {
    /// Size a zeroed mirror to the source's resolution.
    pub fn new(source: F, scanner: DirtyRegionScanner) -> Result<Self, FbVncError> {
        let geometry = source.geometry();
        if geometry.bits_per_pixel != 32 {
            return Err(FbVncError::UnsupportedDepth(geometry.bits_per_pixel));
        }
        // Fail at startup rather than on the first pass.
        source.grid()?;

        let mirror = MirrorBuffer::new(geometry.width as usize, geometry.height as usize);
        let updater = UpdatePublisher::new(*scanner.converter());
        let offset = ScanOffset::new(scanner.skip());

        Ok(Self {
            source,
            geometry,
            mirror,
            scanner,
            updater,
            offset,
            passes: 0,
        })
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn mirror(&self) -> &MirrorBuffer {
        &self.mirror
    }

    pub fn source(&self) -> &F {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut F {
        &mut self.source
    }

    pub fn scanner(&self) -> &DirtyRegionScanner {
        &self.scanner
    }

    /// Probe phase the next pass will use.
    pub fn offset(&self) -> usize {
        self.offset.get()
    }

    /// Completed passes so far.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    /// Announce the whole screen as changed (nothing has been sent yet).
    pub fn mark_all<P: Publisher + ?Sized>(&self, publisher: &mut P) {
        if let Some(region) = self.geometry.bounds().to_region() {
            publisher.mark_region_changed(region);
        }
    }

    /// Run one scan pass and publish its result.
    pub fn pass<P: Publisher + ?Sized>(&mut self, publisher: &mut P) -> Result<PassReport, FbVncError> {
        let started = Instant::now();
        let offset = self.offset.get();

        let grid = self.source.grid()?;
        let dirty = self.scanner.scan_frame(&grid, &mut self.mirror, offset);
        let published = self.updater.publish(&grid, &mut self.mirror, dirty, publisher);
        if !dirty.is_empty() {
            debug!("dirty region: {dirty}");
        }

        self.offset.advance();
        self.passes += 1;

        Ok(PassReport {
            offset,
            dirty,
            published,
            elapsed: started.elapsed(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::MemoryFrame;
    use crate::convert::PixelConverter;
    use crate::publish::tests::RecordingPublisher;

    fn engine(width: u32, height: u32) -> MirrorEngine<MemoryFrame> {
        MirrorEngine::new(
            MemoryFrame::new(width, height),
            DirtyRegionScanner::new(PixelConverter::default(), 16),
        )
        .unwrap()
    }

    #[test]
    fn mark_all_covers_screen() {
        let e = engine(64, 48);
        let mut publisher = RecordingPublisher::default();
        e.mark_all(&mut publisher);
        assert_eq!(publisher.marked, vec![Region::new(0, 0, 64, 48)]);
    }

    #[test]
    fn pass_publishes_and_rotates_offset() {
        let mut e = engine(64, 64);
        e.source_mut().fill_rect(Rect::new(16, 16, 31, 31), 0x0011_2233);
        let mut publisher = RecordingPublisher::default();

        let report = e.pass(&mut publisher).unwrap();
        assert_eq!(report.offset, 0);
        assert_eq!(report.dirty, Rect::new(16, 16, 31, 31));
        assert_eq!(publisher.marked, vec![Region::new(16, 16, 32, 32)]);
        assert_eq!(e.mirror().get(20, 30), 0x0033_2211);
        assert_eq!(e.offset(), 1);
        assert_eq!(e.passes(), 1);
    }

    #[test]
    fn repeated_pass_on_static_frame_is_empty() {
        let mut e = engine(64, 64);
        e.source_mut().fill_rect(Rect::new(0, 0, 63, 10), 0x00ff_ffff);
        let mut publisher = RecordingPublisher::default();

        assert!(!e.pass(&mut publisher).unwrap().dirty.is_empty());
        for _ in 0..32 {
            let report = e.pass(&mut publisher).unwrap();
            assert!(report.dirty.is_empty(), "offset {} found {}", report.offset, report.dirty);
        }
        assert_eq!(publisher.marked.len(), 1);
    }

    #[test]
    fn offset_wraps_after_skip_passes() {
        let mut e = engine(32, 32);
        let mut publisher = RecordingPublisher::default();
        for _ in 0..16 {
            e.pass(&mut publisher).unwrap();
        }
        assert_eq!(e.offset(), 0);
    }

    #[test]
    fn isolated_pixel_found_when_offset_comes_round() {
        let mut e = engine(64, 64);
        e.source_mut().set_pixel(40, 40, 0x00ab_cdef);
        let mut publisher = RecordingPublisher::default();

        let hits: Vec<usize> = (0..16)
            .filter_map(|_| {
                let report = e.pass(&mut publisher).unwrap();
                (!report.dirty.is_empty()).then_some(report.offset)
            })
            .collect();
        assert_eq!(hits, vec![8]);
        assert_eq!(publisher.marked, vec![Region::new(40, 40, 41, 41)]);
    }

    #[test]
    fn rejects_non_32_bit_sources() {
        struct Rgb565;
        impl FrameSource for Rgb565 {
            fn geometry(&self) -> Geometry {
                Geometry {
                    width: 4,
                    height: 4,
                    stride: 4,
                    bits_per_pixel: 16,
                }
            }
            fn grid(&self) -> Result<crate::types::PixelGrid<'_>, FbVncError> {
                Err(FbVncError::Other("unused".into()))
            }
        }

        let err = MirrorEngine::new(Rgb565, DirtyRegionScanner::new(PixelConverter::default(), 16))
            .err()
            .unwrap();
        assert!(matches!(err, FbVncError::UnsupportedDepth(16)));
    }
}
