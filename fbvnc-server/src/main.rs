//! fbvnc-server entry point.
//!
//! ```text
//! fbvnc-server                      Serve /dev/fb0 on port 5900
//! fbvnc-server -f /dev/fb1 -p 5901  Other device and port
//! fbvnc-server --touch              Replay clicks on a uinput touch device
//! fbvnc-server --config <path>      Load a custom config TOML
//! fbvnc-server --gen-config         Write default config to stdout
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use fbvnc_server::config::FbVncConfig;
use fbvnc_server::service::FbVncService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "fbvnc-server", about = "Mirror a Linux framebuffer to VNC viewers")]
struct Cli {
    /// Framebuffer device (overrides the config file).
    #[arg(short = 'f', long)]
    device: Option<PathBuf>,

    /// TCP port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "fbvnc.toml")]
    config: PathBuf,

    /// Replay pointer clicks as touch taps via uinput.
    #[arg(short, long)]
    touch: bool,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Unrecognised arguments, logged and otherwise ignored.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, hide = true)]
    ignored: Vec<String>,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        println!("{}", FbVncConfig::default_toml()?);
        return Ok(());
    }

    let mut config = match FbVncConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            init_tracing("info");
            error!("{e}");
            std::process::exit(1);
        }
    };
    if let Some(device) = cli.device {
        config.device.path = device;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    config.input.touch |= cli.touch;

    init_tracing(&config.logging.level);
    if !cli.ignored.is_empty() {
        warn!("ignoring unrecognised arguments: {}", cli.ignored.join(" "));
    }

    info!("fbvnc-server v{}", env!("CARGO_PKG_VERSION"));
    info!("port: {}", config.server.port);
    info!("scan: skip {}, {:?}", config.scan.skip, config.scan.mode);

    let mut service = FbVncService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received; shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    if let Err(e) = service.run().await {
        error!("{e}");
        std::process::exit(1);
    }

    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
