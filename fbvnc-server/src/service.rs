//! Service wiring: open the device, start the publisher, run the loop.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tracing::info;

use fbvnc_core::{
    FbVncError, FrameSource, FramebufferDevice, MirrorEngine, PointerEventBridge, Publisher,
    UinputTouch, UpdateScheduler, VncPublisher,
};

use crate::config::FbVncConfig;

// ── FbVncService ─────────────────────────────────────────────────

/// The top-level mirror service.
///
/// Owns the update scheduler so that a stop handle can be handed out
/// before the (potentially slow) startup in [`run`](Self::run).
pub struct FbVncService {
    config: FbVncConfig,
    scheduler: UpdateScheduler,
}

impl FbVncService {
    pub fn new(config: FbVncConfig) -> Self {
        let scheduler = UpdateScheduler::new(config.to_scheduler_config());
        Self { config, scheduler }
    }

    pub fn config(&self) -> &FbVncConfig {
        &self.config
    }

    /// Handle that stops the service when set to `false`.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.scheduler.stop_handle()
    }

    /// Open the configured framebuffer device and serve it until stopped.
    pub async fn run(&mut self) -> Result<(), FbVncError> {
        let device = FramebufferDevice::open(&self.config.device.path)?;
        let g = device.geometry();
        info!("device: {}", device.path().display());
        info!("width: {}", g.width);
        info!("height: {}", g.height);
        info!("bpp: {}", g.bits_per_pixel);
        info!("stride: {} pixels", g.stride);
        self.run_with(device).await
    }

    /// Serve `source` until stopped.
    pub async fn run_with<F: FrameSource>(&mut self, source: F) -> Result<(), FbVncError> {
        let converter = self.config.converter(source.channel_layout());
        let scanner = self.config.to_scan_config().scanner(converter);
        let mut engine = MirrorEngine::new(source, scanner)?;
        let geometry = engine.geometry();

        let server = &self.config.server;
        let mut publisher = VncPublisher::bind(
            server.port,
            server.desktop_name.clone(),
            geometry.width,
            geometry.height,
        )
        .await?;

        if self.config.input.touch {
            let touch = UinputTouch::create(
                &self.config.input.device_name,
                geometry.width,
                geometry.height,
            )?;
            publisher.set_pointer_handler(Box::new(PointerEventBridge::new(touch)));
            info!("touch injection via {}", self.config.input.device_name);
        }

        engine.mark_all(&mut publisher);
        self.scheduler.run(&mut engine, &mut publisher).await?;
        info!("fbvnc service stopped");
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use fbvnc_core::MemoryFrame;

    fn test_config() -> FbVncConfig {
        let mut cfg = FbVncConfig::default();
        cfg.server.port = 0;
        cfg.scan.idle_poll_ms = 5;
        cfg
    }

    #[tokio::test]
    async fn runs_until_stopped() {
        let mut service = FbVncService::new(test_config());
        let stop = service.stop_handle();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stop.store(false, Ordering::SeqCst);
        });

        let run = service.run_with(MemoryFrame::new(32, 32));
        tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("service did not stop")
            .unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn missing_device_is_fatal() {
        let mut cfg = test_config();
        cfg.device.path = "/nonexistent/fb9".into();
        let err = FbVncService::new(cfg).run().await.unwrap_err();
        assert!(matches!(err, FbVncError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn port_in_use_is_fatal() {
        let holder = std::net::TcpListener::bind("0.0.0.0:0").unwrap();
        let mut cfg = test_config();
        cfg.server.port = holder.local_addr().unwrap().port();

        let err = FbVncService::new(cfg)
            .run_with(MemoryFrame::new(8, 8))
            .await
            .unwrap_err();
        assert!(matches!(err, FbVncError::Bind { .. }));
    }
}
