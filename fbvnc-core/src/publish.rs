//! Hand-off from the scanner to the remote-display publisher.
//!
//! The [`Publisher`] trait is the seam to whatever streams the mirror
//! buffer to observers (the bundled [`VncPublisher`], or a test double).
//! [`UpdatePublisher`] brings a dirty rectangle of the mirror fully up to
//! date and announces it through that seam.
//!
//! [`VncPublisher`]: crate::vnc::VncPublisher

use std::time::Duration;

use async_trait::async_trait;
use bitflags::bitflags;

use crate::convert::PixelConverter;
use crate::error::FbVncError;
use crate::types::{MirrorBuffer, PixelGrid, Rect, Region};

// ── Pointer events ───────────────────────────────────────────────

bitflags! {
    /// Pointer button state as reported by an observer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ButtonMask: u8 {
        const LEFT = 1 << 0;
        const MIDDLE = 1 << 1;
        const RIGHT = 1 << 2;
        const WHEEL_UP = 1 << 3;
        const WHEEL_DOWN = 1 << 4;
        const WHEEL_LEFT = 1 << 5;
        const WHEEL_RIGHT = 1 << 6;
    }
}

/// One pointer report from a remote observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerEvent {
    pub buttons: ButtonMask,
    pub x: u16,
    pub y: u16,
}

impl PointerEvent {
    pub fn new(buttons: ButtonMask, x: u16, y: u16) -> Self {
        Self { buttons, x, y }
    }
}

/// Receives pointer events before the publisher's own cursor tracking.
pub trait PointerHandler: Send {
    fn pointer_event(&mut self, event: PointerEvent);
}

impl<F> PointerHandler for F
where
    F: FnMut(PointerEvent) + Send,
{
    fn pointer_event(&mut self, event: PointerEvent) {
        self(event)
    }
}

// ── Publisher ────────────────────────────────────────────────────

/// A remote-display publisher that streams the mirror buffer.
///
/// The mirror is lent to the publisher for the duration of
/// [`service_events`](Self::service_events) only. Implementations that
/// transmit from other tasks must copy what they need there, so a
/// rectangle is never sent half updated.
#[async_trait]
pub trait Publisher: Send {
    /// Whether at least one observer is attached.
    fn has_observers(&self) -> bool;

    /// Record that pixels within `region` (exclusive `x2`/`y2`) changed.
    fn mark_region_changed(&mut self, region: Region);

    /// Handle pending connections and observer messages, then transmit
    /// outstanding updates from `backing`.
    ///
    /// Waits at most `max_wait` for something to happen. Per-observer
    /// failures are handled internally; an `Err` means the publisher
    /// itself could not make progress.
    async fn service_events(
        &mut self,
        backing: &MirrorBuffer,
        max_wait: Duration,
    ) -> Result<(), FbVncError>;

    /// Install the hook invoked for every pointer event.
    fn set_pointer_handler(&mut self, handler: Box<dyn PointerHandler>);
}

// ── UpdatePublisher ──────────────────────────────────────────────

/// Copies a dirty rectangle into the mirror and notifies the publisher.
#[derive(Debug, Clone, Copy)]
pub struct UpdatePublisher {
    converter: PixelConverter,
}

impl UpdatePublisher {
    pub fn new(converter: PixelConverter) -> Self {
        Self { converter }
    }

    /// Publish `rect`. Does nothing for an empty rectangle.
    ///
    /// Every pixel inside the rectangle is re-read and converted, not just
    /// the ones the scanner compared, because the reported box usually
    /// covers pixels no probe visited. Returns the region announced to the
    /// publisher.
    pub fn publish<P>(
        &self,
        grid: &PixelGrid<'_>,
        mirror: &mut MirrorBuffer,
        rect: Rect,
        publisher: &mut P,
    ) -> Option<Region>
    where
        P: Publisher + ?Sized,
    {
        let rect = rect.intersect(&Rect::full(
            mirror.width().min(grid.width()) as u32,
            mirror.height().min(grid.height()) as u32,
        ));
        let region = rect.to_region()?;

        for y in rect.y1..=rect.y2 {
            let row = mirror.row_mut(y as usize);
            for x in rect.x1..=rect.x2 {
                row[x as usize] = self.converter.convert(grid.pixel(x as usize, y as usize));
            }
        }

        publisher.mark_region_changed(region);
        Some(region)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Publisher double that records every call.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub observers: usize,
        pub marked: Vec<Region>,
        pub serviced: usize,
        pub handler: Option<Box<dyn PointerHandler>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        fn has_observers(&self) -> bool {
            self.observers > 0
        }

        fn mark_region_changed(&mut self, region: Region) {
            self.marked.push(region);
        }

        async fn service_events(
            &mut self,
            _backing: &MirrorBuffer,
            _max_wait: Duration,
        ) -> Result<(), FbVncError> {
            self.serviced += 1;
            Ok(())
        }

        fn set_pointer_handler(&mut self, handler: Box<dyn PointerHandler>) {
            self.handler = Some(handler);
        }
    }

    #[test]
    fn empty_rect_is_a_noop() {
        let data = vec![0x00ff_ffffu32; 16];
        let grid = PixelGrid::new(&data, 4, 4, 4).unwrap();
        let mut mirror = MirrorBuffer::new(4, 4);
        let mut publisher = RecordingPublisher::default();

        let out = UpdatePublisher::new(PixelConverter::default()).publish(
            &grid,
            &mut mirror,
            Rect::EMPTY,
            &mut publisher,
        );
        assert_eq!(out, None);
        assert!(publisher.marked.is_empty());
        assert!(mirror.as_slice().iter().all(|&p| p == 0));
    }

    #[test]
    fn copies_whole_rect_and_marks_exclusive_bounds() {
        let (w, h) = (8usize, 10usize);
        let data: Vec<u32> = (0..(w * h) as u32).collect();
        let grid = PixelGrid::new(&data, w, h, w).unwrap();
        let mut mirror = MirrorBuffer::new(w, h);
        let mut publisher = RecordingPublisher::default();
        let conv = PixelConverter::default();

        let out = UpdatePublisher::new(conv).publish(
            &grid,
            &mut mirror,
            Rect::new(2, 3, 5, 7),
            &mut publisher,
        );

        assert_eq!(out, Some(Region::new(2, 3, 6, 8)));
        assert_eq!(publisher.marked, vec![Region::new(2, 3, 6, 8)]);
        for y in 0..h {
            for x in 0..w {
                let expected = if (2..=5).contains(&x) && (3..=7).contains(&y) {
                    conv.convert(data[y * w + x])
                } else {
                    0
                };
                assert_eq!(mirror.get(x, y), expected, "({x}, {y})");
            }
        }
    }

    #[test]
    fn closures_are_pointer_handlers() {
        let mut seen = Vec::new();
        {
            let mut handler = |ev: PointerEvent| seen.push(ev);
            handler.pointer_event(PointerEvent::new(ButtonMask::LEFT, 3, 4));
        }
        assert_eq!(seen, vec![PointerEvent::new(ButtonMask::LEFT, 3, 4)]);
    }
}
