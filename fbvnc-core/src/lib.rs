//! # fbvnc-core
//!
//! Mirror a Linux framebuffer to remote VNC observers.
//!
//! This crate contains:
//! - **Capture**: `FrameSource`, the fbdev-backed `FramebufferDevice` and the in-memory `MemoryFrame`
//! - **Convert**: `PixelConverter` for BGRX → RGBX channel reordering
//! - **Scan**: `DirtyRegionScanner`, the adaptive sparse change detector
//! - **Publish**: the `Publisher` seam and `UpdatePublisher` (mirror copy + region notification)
//! - **Engine**: `MirrorEngine`, one scan/publish pass per call
//! - **Scheduler**: `UpdateScheduler`, the idle/active rate-capped update loop
//! - **VNC**: `VncPublisher`, the `Publisher` backed by `rustvncserver`
//! - **Input**: `PointerEventBridge` and `UinputTouch` for optional touch injection
//! - **Error**: `FbVncError`, a `thiserror`-based error hierarchy

pub mod capture;
pub mod convert;
pub mod engine;
pub mod error;
pub mod input;
pub mod publish;
pub mod scan;
pub mod scheduler;
pub mod types;
pub mod vnc;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use capture::{FrameSource, FramebufferDevice, MemoryFrame};
pub use convert::{ChannelLayout, PixelConverter};
pub use engine::{MirrorEngine, PassReport};
pub use error::FbVncError;
pub use input::{InjectionSink, PointerEventBridge, UinputTouch};
pub use publish::{ButtonMask, PointerEvent, PointerHandler, Publisher, UpdatePublisher};
pub use scan::{DEFAULT_SKIP, DirtyRegionScanner, ScanMode, ScanOffset};
pub use scheduler::{SchedulerConfig, SchedulerState, Throttle, UpdateScheduler};
pub use types::{Geometry, MirrorBuffer, PixelGrid, Rect, Region};
pub use vnc::VncPublisher;
