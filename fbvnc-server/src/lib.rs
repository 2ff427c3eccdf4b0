//! # fbvnc-server: framebuffer VNC service
//!
//! Maps a Linux framebuffer device, watches it for changes with the
//! adaptive scanner from `fbvnc-core`, and serves the result to VNC
//! viewers. Pointer clicks can optionally be replayed as taps on a
//! virtual touch device.

pub mod config;
pub mod service;
