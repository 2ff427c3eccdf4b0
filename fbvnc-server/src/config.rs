//! Configuration for the framebuffer VNC server.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fbvnc_core::{
    ChannelLayout, DEFAULT_SKIP, DirtyRegionScanner, FbVncError, PixelConverter, ScanMode,
    SchedulerConfig,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FbVncConfig {
    /// Framebuffer device settings.
    pub device: DeviceConfig,
    /// VNC listener settings.
    pub server: ServerConfig,
    /// Scan cadence and strategy.
    pub scan: ScanSection,
    /// Pointer injection.
    pub input: InputConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Pixel layout of the device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLayout {
    /// Use the device's reported channel offsets, BGRX if unknown.
    #[default]
    Auto,
    Bgrx,
    Rgbx,
}

impl SourceLayout {
    pub fn resolve(self, reported: Option<ChannelLayout>) -> ChannelLayout {
        match self {
            Self::Auto => reported.unwrap_or(ChannelLayout::BGRX),
            Self::Bgrx => ChannelLayout::BGRX,
            Self::Rgbx => ChannelLayout::RGBX,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Framebuffer device node.
    pub path: PathBuf,
    pub source_layout: SourceLayout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port for VNC observers.
    pub port: u16,
    /// Name shown by viewers.
    pub desktop_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSection {
    /// Probe spacing along the diagonal.
    pub skip: usize,
    /// Minimum time between scan passes.
    pub min_interval_ms: u64,
    pub mode: ScanMode,
    /// Passes slower than this are logged.
    pub slow_pass_warn_us: u64,
    /// Connection poll interval while nobody is watching.
    pub idle_poll_ms: u64,
    /// Bounded wait for observer I/O while active.
    pub service_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Forward pointer clicks as taps on a virtual touch device.
    pub touch: bool,
    /// Name of the virtual device.
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

/// Resolved scanner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub skip: usize,
    pub mode: ScanMode,
}

impl ScanConfig {
    pub fn scanner(&self, converter: PixelConverter) -> DirtyRegionScanner {
        DirtyRegionScanner::new(converter, self.skip).with_mode(self.mode)
    }
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/fb0"),
            source_layout: SourceLayout::Auto,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: fbvnc_core::vnc::DEFAULT_PORT,
            desktop_name: "framebuffer".into(),
        }
    }
}

impl Default for ScanSection {
    fn default() -> Self {
        Self {
            skip: DEFAULT_SKIP,
            min_interval_ms: 100,
            mode: ScanMode::Adaptive,
            slow_pass_warn_us: 10_000,
            idle_poll_ms: 100,
            service_wait_ms: 100,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            touch: false,
            device_name: "fbvnc-touch".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl FbVncConfig {
    /// Load configuration from a TOML file. A missing file yields the
    /// defaults; an unreadable or malformed one is an error.
    pub fn load(path: &Path) -> Result<Self, FbVncError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents)
                .map_err(|e| FbVncError::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("no config at {}; using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(FbVncError::Config(format!("{}: {e}", path.display()))),
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// The default configuration as TOML (for bootstrapping).
    pub fn default_toml() -> Result<String, FbVncError> {
        toml::to_string_pretty(&Self::default()).map_err(|e| FbVncError::Config(e.to_string()))
    }

    /// Write the default configuration to a file.
    pub fn write_default(path: &Path) -> Result<(), FbVncError> {
        std::fs::write(path, Self::default_toml()?)?;
        Ok(())
    }

    /// Convert scan timings into a `SchedulerConfig`.
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        let ms = |v: u64| Duration::from_millis(v.max(1));
        SchedulerConfig {
            min_interval: ms(self.scan.min_interval_ms),
            idle_poll: ms(self.scan.idle_poll_ms),
            service_wait: ms(self.scan.service_wait_ms),
            slow_pass: Duration::from_micros(self.scan.slow_pass_warn_us),
        }
    }

    pub fn to_scan_config(&self) -> ScanConfig {
        ScanConfig {
            skip: self.scan.skip.max(1),
            mode: self.scan.mode,
        }
    }

    /// Converter from the device layout (`reported` by the driver, if it
    /// says) to the mirror's RGBX layout.
    pub fn converter(&self, reported: Option<ChannelLayout>) -> PixelConverter {
        PixelConverter::new(self.device.source_layout.resolve(reported), ChannelLayout::RGBX)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = FbVncConfig::default_toml().unwrap();
        assert!(text.contains("[device]"));
        assert!(text.contains("/dev/fb0"));
        assert!(text.contains("port = 5900"));
        assert!(text.contains("mode = \"adaptive\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = FbVncConfig::default_toml().unwrap();
        let parsed = FbVncConfig::parse(&text).unwrap();
        assert_eq!(parsed.server.port, 5900);
        assert_eq!(parsed.server.desktop_name, "framebuffer");
        assert_eq!(parsed.scan.skip, 16);
        assert_eq!(parsed.device.source_layout, SourceLayout::Auto);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg = FbVncConfig::parse("[server]\nport = 5901\n\n[scan]\nmode = \"exhaustive\"\n").unwrap();
        assert_eq!(cfg.server.port, 5901);
        assert_eq!(cfg.server.desktop_name, "framebuffer");
        assert_eq!(cfg.scan.mode, ScanMode::Exhaustive);
        assert_eq!(cfg.scan.min_interval_ms, 100);
        assert!(!cfg.input.touch);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = std::env::temp_dir().join(format!("fbvnc-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bad.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        let err = FbVncConfig::load(&path).unwrap_err();
        assert!(matches!(err, FbVncError::Config(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_means_defaults() {
        let cfg = FbVncConfig::load(Path::new("/nonexistent/fbvnc.toml")).unwrap();
        assert_eq!(cfg.device.path, PathBuf::from("/dev/fb0"));
    }

    #[test]
    fn conversions_clamp() {
        let mut cfg = FbVncConfig::default();
        cfg.scan.skip = 0;
        cfg.scan.min_interval_ms = 0;
        cfg.scan.service_wait_ms = 0;
        let sched = cfg.to_scheduler_config();
        assert_eq!(sched.min_interval, Duration::from_millis(1));
        assert_eq!(sched.service_wait, Duration::from_millis(1));
        assert_eq!(sched.slow_pass, Duration::from_millis(10));
        assert_eq!(cfg.to_scan_config().skip, 1);
    }

    #[test]
    fn layout_resolution() {
        assert_eq!(SourceLayout::Auto.resolve(None), ChannelLayout::BGRX);
        assert_eq!(
            SourceLayout::Auto.resolve(Some(ChannelLayout::RGBX)),
            ChannelLayout::RGBX
        );
        assert_eq!(
            SourceLayout::Bgrx.resolve(Some(ChannelLayout::RGBX)),
            ChannelLayout::BGRX
        );

        let cfg = FbVncConfig::default();
        assert_eq!(cfg.converter(None).convert(0x0011_2233), 0x0033_2211);
        assert_eq!(cfg.converter(Some(ChannelLayout::RGBX)).convert(0x0011_2233), 0x0011_2233);
    }
}
