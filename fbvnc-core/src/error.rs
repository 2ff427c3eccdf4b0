//! Domain-specific error types for the framebuffer mirror.
//!
//! Startup failures (device, mapping, listener, injection device) are
//! fatal to the caller. Runtime conditions are logged by the component
//! that hits them and never surface from the update loop.

use std::path::PathBuf;

use thiserror::Error;

/// The canonical error type for fbvnc.
#[derive(Debug, Error)]
pub enum FbVncError {
    // ── Frame Source Errors ──────────────────────────────────────
    /// The framebuffer device node does not exist.
    #[error("open {}: no such device", .0.display())]
    DeviceNotFound(PathBuf),

    /// The framebuffer device node exists but cannot be read.
    #[error("open {}: permission denied", .0.display())]
    PermissionDenied(PathBuf),

    /// A device ioctl failed.
    #[error("ioctl({request}) failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Mapping the pixel memory failed.
    #[error("mmap failed: {0}")]
    MapFailed(#[source] std::io::Error),

    /// The frame source does not deliver 32-bit pixels.
    #[error("unsupported depth: {0} bits per pixel (only 32 is supported)")]
    UnsupportedDepth(u32),

    /// Width, height, stride and backing length are inconsistent.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    // ── Publisher Errors ─────────────────────────────────────────
    /// The publisher could not bind its listening socket.
    #[error("bind {addr} failed: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // ── Injection Errors ─────────────────────────────────────────
    /// The input injection device could not be created.
    #[error("input injection unavailable: {0}")]
    InjectionUnavailable(#[source] std::io::Error),

    /// Writing an event to the injection device failed.
    #[error("input injection failed: {0}")]
    Injection(#[source] std::io::Error),

    // ── Generic ──────────────────────────────────────────────────
    /// The socket or file layer reported an error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be loaded or is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl FbVncError {
    /// Map an `open(2)` failure on `path` onto the typed device errors.
    pub fn from_open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => FbVncError::DeviceNotFound(path.into()),
            std::io::ErrorKind::PermissionDenied => FbVncError::PermissionDenied(path.into()),
            _ => FbVncError::Io(err),
        }
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for FbVncError {
    fn from(s: String) -> Self {
        FbVncError::Other(s)
    }
}

impl From<&str> for FbVncError {
    fn from(s: &str) -> Self {
        FbVncError::Other(s.to_string())
    }
}
