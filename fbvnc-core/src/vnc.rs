//! VNC publisher backed by [`rustvncserver`].
//!
//! The server owns the listener and one task per observer; those tasks
//! negotiate, encode and transmit on their own. [`VncPublisher`] keeps the
//! server's framebuffer in step with the mirror buffer and turns server
//! events into observer counts and pointer callbacks.
//!
//! Buffer discipline:
//!
//! - The scheduler task is the only writer. Changed regions are collected by
//!   [`Publisher::mark_region_changed`] and copied out of the mirror inside
//!   [`Publisher::service_events`], which never overlaps a scan pass, so a
//!   region is always complete when it is copied.
//! - Observer tasks only read the server framebuffer under the server's own
//!   lock. A slow or stalled observer delays nobody but itself.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustvncserver::server::ServerEvent;
use rustvncserver::VncServer;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::error::FbVncError;
use crate::publish::{ButtonMask, PointerEvent, PointerHandler, Publisher};
use crate::types::{MirrorBuffer, Rect, Region};

/// Default VNC display :0 port.
pub const DEFAULT_PORT: u16 = 5900;

/// Upper bound on server events handled in one `service_events` call.
const MAX_EVENTS_PER_SERVICE: usize = 64;

/// Mirror pixel (`0xXXBBGGRR`) as the server's RGBA32 bytes.
#[inline]
fn to_rgba(pixel: u32) -> [u8; 4] {
    [pixel as u8, (pixel >> 8) as u8, (pixel >> 16) as u8, 0xff]
}

/// Check that `port` is free on all interfaces; port 0 picks one.
async fn reserve_port(port: u16) -> Result<u16, FbVncError> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| FbVncError::Bind { addr, source })?;
    Ok(listener.local_addr()?.port())
}

// ── VncPublisher ─────────────────────────────────────────────────

pub struct VncPublisher {
    server: Arc<VncServer>,
    events: UnboundedReceiver<ServerEvent>,
    listener: JoinHandle<()>,
    port: u16,
    desktop_name: String,
    width: u16,
    height: u16,
    observers: usize,
    /// Union of regions marked since the last successful push.
    pending: Rect,
    /// RGBA32 copy of the mirror handed to the server.
    staging: Vec<u8>,
    cursor: Option<(u16, u16)>,
    buttons: ButtonMask,
    pointer_handler: Option<Box<dyn PointerHandler>>,
}

impl VncPublisher {
    /// Serve a `width` × `height` desktop on `port` (0 picks a free port).
    pub async fn bind(
        port: u16,
        desktop_name: impl Into<String>,
        width: u32,
        height: u32,
    ) -> Result<Self, FbVncError> {
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(FbVncError::InvalidGeometry(format!(
                "{width}x{height} exceeds the protocol limit"
            )));
        };
        if w == 0 || h == 0 {
            return Err(FbVncError::InvalidGeometry(format!("{width}x{height}")));
        }

        let port = reserve_port(port).await?;
        let desktop_name = desktop_name.into();
        let (server, events) = VncServer::new(w, h, desktop_name.clone(), None);
        let server = Arc::new(server);

        let listener = tokio::spawn({
            let server = Arc::clone(&server);
            async move {
                if let Err(e) = server.listen(port).await {
                    error!("VNC listener on port {port} failed: {e}");
                }
            }
        });
        info!("listening for VNC observers on port {port}");

        Ok(Self {
            server,
            events,
            listener,
            port,
            desktop_name,
            width: w,
            height: h,
            observers: 0,
            pending: Rect::EMPTY,
            staging: vec![0; w as usize * h as usize * 4],
            cursor: None,
            buttons: ButtonMask::empty(),
            pointer_handler: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn desktop_name(&self) -> &str {
        &self.desktop_name
    }

    pub fn observer_count(&self) -> usize {
        self.observers
    }

    /// Marked area not yet handed to the server.
    pub fn pending(&self) -> Rect {
        self.pending
    }

    /// Last pointer position reported by any observer.
    pub fn cursor(&self) -> Option<(u16, u16)> {
        self.cursor
    }

    pub fn buttons(&self) -> ButtonMask {
        self.buttons
    }

    /// Route a pointer report: the installed handler first, then the
    /// publisher's own cursor tracking.
    pub fn pointer_event(&mut self, event: PointerEvent) {
        debug!("Pointer: {}, {}, {:#04x}", event.x, event.y, event.buttons.bits());
        if let Some(handler) = self.pointer_handler.as_mut() {
            handler.pointer_event(event);
        }
        self.cursor = Some((event.x, event.y));
        self.buttons = event.buttons;
    }

    fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::ClientConnected { .. } => {
                self.observers += 1;
                info!("observer connected ({} attached)", self.observers);
            }
            ServerEvent::ClientDisconnected { .. } => {
                self.observers = self.observers.saturating_sub(1);
                if self.observers == 0 {
                    info!("last observer left");
                } else {
                    info!("observer left ({} attached)", self.observers);
                }
            }
            ServerEvent::PointerMove {
                x, y, button_mask, ..
            } => {
                self.pointer_event(PointerEvent::new(
                    ButtonMask::from_bits_truncate(button_mask),
                    x,
                    y,
                ));
            }
            ServerEvent::KeyPress { down, key, .. } => {
                debug!("key {key:#x} down={down} (ignored)");
            }
            _ => {}
        }
    }

    /// Copy `rect` of the mirror into the staging buffer.
    fn stage(&mut self, backing: &MirrorBuffer, rect: Rect) {
        let width = self.width as usize;
        for y in rect.y1..=rect.y2 {
            let row = backing.row(y as usize);
            let base = y as usize * width;
            for x in rect.x1..=rect.x2 {
                let at = (base + x as usize) * 4;
                self.staging[at..at + 4].copy_from_slice(&to_rgba(row[x as usize]));
            }
        }
    }

    /// Hand the pending area to the server, giving up at `deadline`.
    ///
    /// A push that runs out of time stays pending and is retried on the
    /// next call.
    async fn push(&mut self, backing: &MirrorBuffer, deadline: Instant) -> Result<(), FbVncError> {
        let screen = Rect::full(self.width as u32, self.height as u32)
            .intersect(&Rect::full(backing.width() as u32, backing.height() as u32));
        let rect = self.pending.intersect(&screen);
        if rect.is_empty() {
            self.pending = Rect::EMPTY;
            return Ok(());
        }
        self.stage(backing, rect);

        let framebuffer = self.server.framebuffer();
        let update = framebuffer.update_from_slice(&self.staging);
        let outcome = tokio::time::timeout_at(deadline, update).await;
        match outcome {
            Ok(Ok(_)) => {
                debug!("pushed {rect}");
                self.pending = Rect::EMPTY;
                Ok(())
            }
            Ok(Err(e)) => Err(FbVncError::Other(format!("framebuffer update failed: {e}"))),
            Err(_) => {
                debug!("push of {rect} deferred");
                Ok(())
            }
        }
    }
}

impl Drop for VncPublisher {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

#[async_trait]
impl Publisher for VncPublisher {
    fn has_observers(&self) -> bool {
        self.observers > 0
    }

    fn mark_region_changed(&mut self, region: Region) {
        self.pending = self.pending.union(&region.to_rect());
    }

    async fn service_events(
        &mut self,
        backing: &MirrorBuffer,
        max_wait: Duration,
    ) -> Result<(), FbVncError> {
        let deadline = Instant::now() + max_wait;
        if self.listener.is_finished() {
            return Err(FbVncError::Other(format!(
                "VNC listener on port {} is not running",
                self.port
            )));
        }

        self.push(backing, deadline).await?;

        match tokio::time::timeout_at(deadline, self.events.recv()).await {
            Ok(Some(event)) => {
                self.handle_event(event);
                for _ in 1..MAX_EVENTS_PER_SERVICE {
                    let Ok(event) = self.events.try_recv() else {
                        break;
                    };
                    self.handle_event(event);
                }
                Ok(())
            }
            Ok(None) => Err(FbVncError::Other("VNC server event channel closed".into())),
            Err(_) => Ok(()),
        }
    }

    fn set_pointer_handler(&mut self, handler: Box<dyn PointerHandler>) {
        self.pointer_handler = Some(handler);
    }
}

// ── Tests ────────────────────────────────────────────────────────
