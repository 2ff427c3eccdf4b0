//! Pointer-to-touch injection.
//!
//! Observers click on the mirrored screen; [`PointerEventBridge`] turns
//! every report with a pressed button into a tap on the local device
//! through an [`InjectionSink`]. [`UinputTouch`] is the Linux sink: a
//! virtual absolute-pointer device created through `/dev/uinput`.
//!
//! # Platform
//!
//! `UinputTouch` is **Linux-only**. On other platforms the type is still
//! defined but creation fails with [`FbVncError::InjectionUnavailable`].

use std::path::Path;

use tracing::{debug, warn};

use crate::error::FbVncError;
use crate::publish::{PointerEvent, PointerHandler};

/// Default uinput control node.
pub const UINPUT_PATH: &str = "/dev/uinput";

// ── InjectionSink ────────────────────────────────────────────────

/// Fire-and-forget input injection.
pub trait InjectionSink: Send {
    /// Press and release at `(x, y)` in screen coordinates.
    fn send_tap(&mut self, x: i32, y: i32) -> Result<(), FbVncError>;
}

// ── PointerEventBridge ───────────────────────────────────────────

/// Pointer hook that taps the local screen wherever an observer clicks.
///
/// Injection failures are logged and swallowed: the remote session keeps
/// running without local input.
pub struct PointerEventBridge<S> {
    sink: S,
    taps: u64,
}

impl<S: InjectionSink> PointerEventBridge<S> {
    pub fn new(sink: S) -> Self {
        Self { sink, taps: 0 }
    }

    /// Number of taps successfully injected.
    pub fn taps(&self) -> u64 {
        self.taps
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: InjectionSink> PointerHandler for PointerEventBridge<S> {
    fn pointer_event(&mut self, event: PointerEvent) {
        if event.buttons.is_empty() {
            return;
        }
        match self.sink.send_tap(event.x as i32, event.y as i32) {
            Ok(()) => {
                self.taps += 1;
                debug!("tap at ({}, {})", event.x, event.y);
            }
            Err(e) => warn!("tap at ({}, {}) not injected: {e}", event.x, event.y),
        }
    }
}

// ── UinputTouch ──────────────────────────────────────────────────

/// Virtual single-touch screen registered with the kernel input layer.
pub struct UinputTouch {
    #[cfg(target_os = "linux")]
    file: std::fs::File,
    x_range: u32,
    y_range: u32,
}

impl UinputTouch {
    /// Create a device named `name` accepting `0..x_range` × `0..y_range`.
    pub fn create(name: &str, x_range: u32, y_range: u32) -> Result<Self, FbVncError> {
        Self::create_at(UINPUT_PATH, name, x_range, y_range)
    }

    /// Axis ranges the device was registered with.
    pub fn ranges(&self) -> (u32, u32) {
        (self.x_range, self.y_range)
    }
}

// ── Linux implementation ─────────────────────────────────────────

#[cfg(target_os = "linux")]
mod platform {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::fd::AsRawFd;
    use std::os::unix::fs::OpenOptionsExt;

    use libc::{c_ulong, ioctl};

    use super::*;

    // <linux/uinput.h>
    const UI_DEV_CREATE: c_ulong = 0x5501;
    const UI_DEV_DESTROY: c_ulong = 0x5502;
    const UI_SET_EVBIT: c_ulong = 0x4004_5564;
    const UI_SET_KEYBIT: c_ulong = 0x4004_5565;
    const UI_SET_ABSBIT: c_ulong = 0x4004_5567;
    const UI_SET_PROPBIT: c_ulong = 0x4004_556e;
    const UINPUT_MAX_NAME_SIZE: usize = 80;

    // <linux/input-event-codes.h>
    const EV_SYN: u16 = 0x00;
    const EV_KEY: u16 = 0x01;
    const EV_ABS: u16 = 0x03;
    const SYN_REPORT: u16 = 0x00;
    const BTN_TOUCH: u16 = 0x14a;
    const ABS_X: u16 = 0x00;
    const ABS_Y: u16 = 0x01;
    const ABS_CNT: usize = 0x40;
    const INPUT_PROP_DIRECT: u16 = 0x01;
    const BUS_VIRTUAL: u16 = 0x06;

    /// `struct input_id`.
    #[repr(C)]
    #[allow(dead_code)]
    struct InputId {
        bustype: u16,
        vendor: u16,
        product: u16,
        version: u16,
    }

    /// `struct uinput_user_dev` (legacy setup interface).
    #[repr(C)]
    #[allow(dead_code)]
    struct UinputUserDev {
        name: [u8; UINPUT_MAX_NAME_SIZE],
        id: InputId,
        ff_effects_max: u32,
        absmax: [i32; ABS_CNT],
        absmin: [i32; ABS_CNT],
        absfuzz: [i32; ABS_CNT],
        absflat: [i32; ABS_CNT],
    }

    /// `struct input_event`.
    #[repr(C)]
    #[allow(dead_code)]
    struct InputEvent {
        time: libc::timeval,
        kind: u16,
        code: u16,
        value: i32,
    }

    fn as_bytes<T>(value: &T) -> &[u8] {
        unsafe { std::slice::from_raw_parts(value as *const T as *const u8, std::mem::size_of::<T>()) }
    }

    fn set_bit(fd: i32, request: c_ulong, bit: u16, name: &'static str) -> Result<(), FbVncError> {
        if unsafe { ioctl(fd, request as _, bit as libc::c_int) } < 0 {
            return Err(FbVncError::InjectionUnavailable(std::io::Error::other(format!(
                "{name}({bit:#x}): {}",
                std::io::Error::last_os_error()
            ))));
        }
        Ok(())
    }

    impl UinputTouch {
        /// Like [`create`](Self::create) with an explicit uinput node.
        pub fn create_at(
            path: impl AsRef<Path>,
            name: &str,
            x_range: u32,
            y_range: u32,
        ) -> Result<Self, FbVncError> {
            let mut file = OpenOptions::new()
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path.as_ref())
                .map_err(FbVncError::InjectionUnavailable)?;
            let fd = file.as_raw_fd();

            set_bit(fd, UI_SET_EVBIT, EV_SYN, "UI_SET_EVBIT")?;
            set_bit(fd, UI_SET_EVBIT, EV_KEY, "UI_SET_EVBIT")?;
            set_bit(fd, UI_SET_EVBIT, EV_ABS, "UI_SET_EVBIT")?;
            set_bit(fd, UI_SET_KEYBIT, BTN_TOUCH, "UI_SET_KEYBIT")?;
            set_bit(fd, UI_SET_ABSBIT, ABS_X, "UI_SET_ABSBIT")?;
            set_bit(fd, UI_SET_ABSBIT, ABS_Y, "UI_SET_ABSBIT")?;
            set_bit(fd, UI_SET_PROPBIT, INPUT_PROP_DIRECT, "UI_SET_PROPBIT")?;

            let mut dev = UinputUserDev {
                name: [0; UINPUT_MAX_NAME_SIZE],
                id: InputId {
                    bustype: BUS_VIRTUAL,
                    vendor: 0x1,
                    product: 0x1,
                    version: 1,
                },
                ff_effects_max: 0,
                absmax: [0; ABS_CNT],
                absmin: [0; ABS_CNT],
                absfuzz: [0; ABS_CNT],
                absflat: [0; ABS_CNT],
            };
            let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
            dev.name[..len].copy_from_slice(&name.as_bytes()[..len]);
            dev.absmax[ABS_X as usize] = x_range.saturating_sub(1) as i32;
            dev.absmax[ABS_Y as usize] = y_range.saturating_sub(1) as i32;

            file.write_all(as_bytes(&dev))
                .map_err(FbVncError::InjectionUnavailable)?;

            if unsafe { ioctl(fd, UI_DEV_CREATE as _) } < 0 {
                return Err(FbVncError::InjectionUnavailable(
                    std::io::Error::last_os_error(),
                ));
            }

            Ok(Self {
                file,
                x_range,
                y_range,
            })
        }

        fn event(kind: u16, code: u16, value: i32) -> InputEvent {
            InputEvent {
                time: libc::timeval {
                    tv_sec: 0,
                    tv_usec: 0,
                },
                kind,
                code,
                value,
            }
        }
    }

    impl InjectionSink for UinputTouch {
        fn send_tap(&mut self, x: i32, y: i32) -> Result<(), FbVncError> {
            let x = x.clamp(0, self.x_range.saturating_sub(1) as i32);
            let y = y.clamp(0, self.y_range.saturating_sub(1) as i32);
            let events = [
                Self::event(EV_ABS, ABS_X, x),
                Self::event(EV_ABS, ABS_Y, y),
                Self::event(EV_KEY, BTN_TOUCH, 1),
                Self::event(EV_SYN, SYN_REPORT, 0),
                Self::event(EV_KEY, BTN_TOUCH, 0),
                Self::event(EV_SYN, SYN_REPORT, 0),
            ];
            let mut buf = Vec::with_capacity(events.len() * std::mem::size_of::<InputEvent>());
            for ev in &events {
                buf.extend_from_slice(as_bytes(ev));
            }
            self.file.write_all(&buf).map_err(FbVncError::Injection)
        }
    }

    impl Drop for UinputTouch {
        fn drop(&mut self) {
            unsafe {
                ioctl(self.file.as_raw_fd(), UI_DEV_DESTROY as _);
            }
        }
    }
}

// ── Non-Linux stub ───────────────────────────────────────────────

#[cfg(not(target_os = "linux"))]
impl UinputTouch {
    pub fn create_at(
        _path: impl AsRef<Path>,
        _name: &str,
        _x_range: u32,
        _y_range: u32,
    ) -> Result<Self, FbVncError> {
        Err(FbVncError::InjectionUnavailable(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "uinput is only available on Linux",
        )))
    }
}

#[cfg(not(target_os = "linux"))]
impl InjectionSink for UinputTouch {
    fn send_tap(&mut self, _x: i32, _y: i32) -> Result<(), FbVncError> {
        Err(FbVncError::Other("Not supported on this platform".into()))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::publish::ButtonMask;

    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub taps: Vec<(i32, i32)>,
        pub fail: bool,
    }

    impl InjectionSink for RecordingSink {
        fn send_tap(&mut self, x: i32, y: i32) -> Result<(), FbVncError> {
            if self.fail {
                return Err(FbVncError::Injection(std::io::Error::from(
                    std::io::ErrorKind::BrokenPipe,
                )));
            }
            self.taps.push((x, y));
            Ok(())
        }
    }

    #[test]
    fn pressed_button_taps() {
        let mut bridge = PointerEventBridge::new(RecordingSink::default());
        bridge.pointer_event(PointerEvent::new(ButtonMask::LEFT, 10, 20));
        bridge.pointer_event(PointerEvent::new(ButtonMask::RIGHT | ButtonMask::MIDDLE, 1, 2));
        assert_eq!(bridge.sink().taps, vec![(10, 20), (1, 2)]);
        assert_eq!(bridge.taps(), 2);
    }

    #[test]
    fn motion_without_buttons_is_ignored() {
        let mut bridge = PointerEventBridge::new(RecordingSink::default());
        bridge.pointer_event(PointerEvent::new(ButtonMask::empty(), 10, 20));
        assert!(bridge.sink().taps.is_empty());
    }

    #[test]
    fn injection_failure_is_not_fatal() {
        let mut bridge = PointerEventBridge::new(RecordingSink {
            taps: Vec::new(),
            fail: true,
        });
        bridge.pointer_event(PointerEvent::new(ButtonMask::LEFT, 0, 0));
        bridge.pointer_event(PointerEvent::new(ButtonMask::LEFT, 0, 0));
        assert_eq!(bridge.taps(), 0);
    }

    #[test]
    fn missing_uinput_node_is_unavailable() {
        let err = UinputTouch::create_at("/nonexistent/uinput", "test", 10, 10)
            .err()
            .unwrap();
        assert!(matches!(err, FbVncError::InjectionUnavailable(_)));
    }
}
