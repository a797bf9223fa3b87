//! Headless daemon for a Phomemo T02 label printer.
//!
//! ```text
//! phomemo-printd               connect and keep the printer connected
//! phomemo-printd print <file>  print one or more images, then exit
//! phomemo-printd info          print device info as JSON, then exit
//! ```

mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use image::imageops::FilterType;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use phomemo::transport::{BleConnector, BleTransport};
use phomemo::{PRINT_WIDTH, Printer, PrinterState};

use config::AppConfig;

/// Time allowed for status answers to arrive before `info` reports.
const INFO_SETTLE_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, PartialEq)]
enum Command {
    Monitor,
    Print(Vec<PathBuf>),
    Info,
}

impl Command {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        match args.next().as_deref() {
            None | Some("monitor") => Ok(Self::Monitor),
            Some("info") => Ok(Self::Info),
            Some("print") => {
                let files: Vec<PathBuf> = args.map(PathBuf::from).collect();
                if files.is_empty() {
                    bail!("print needs at least one image file");
                }
                Ok(Self::Print(files))
            }
            Some(other) => bail!("unknown command '{other}' (expected monitor, print or info)"),
        }
    }
}

/// Sleep for `duration`; returns `true` if the token was cancelled first.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

struct Daemon {
    config: AppConfig,
    connector: BleConnector,
    printer: Printer<BleTransport>,
}

impl Daemon {
    async fn connect(&self) -> anyhow::Result<PrinterState> {
        let device = self
            .connector
            .find(&self.config.target(), self.config.scan_timeout)
            .await?;
        let link = self.connector.connect(&device).await?;
        let state = self.printer.connect(link).await?;
        Ok(state)
    }

    /// Stay connected until shutdown, reconnecting whenever the link drops.
    async fn monitor(&self, shutdown: &CancellationToken) {
        loop {
            match self.connect().await {
                Ok(state) => {
                    tracing::info!(%state, "Printer online");
                    self.watch(shutdown).await;
                }
                Err(e) => tracing::warn!("Printer connect failed: {e:#}"),
            }

            if sleep_or_cancel(shutdown, self.config.reconnect_delay).await {
                break;
            }
            tracing::info!("Reconnecting to printer");
        }
    }

    /// Log the device status on every poll interval while connected.
    async fn watch(&self, shutdown: &CancellationToken) {
        loop {
            if sleep_or_cancel(shutdown, self.config.poll_interval).await {
                return;
            }
            if !self.printer.is_connected() {
                tracing::warn!("Printer connection lost");
                return;
            }

            let info = self.printer.info();
            tracing::info!(
                state = %info.state,
                battery = info.battery_level,
                firmware = %info.firmware_version,
                "Printer status"
            );
        }
    }

    async fn print_files(&self, files: &[PathBuf]) -> anyhow::Result<()> {
        self.connect().await?;

        for path in files {
            let image = image::open(path)
                .with_context(|| format!("Failed to open image {}", path.display()))?;
            let image = if image.width() > PRINT_WIDTH {
                image.resize(PRINT_WIDTH, u32::MAX, FilterType::Triangle)
            } else {
                image
            };

            tracing::info!(path = %path.display(), width = image.width(), height = image.height(), "Printing image");
            self.printer
                .print_image(&image)
                .await
                .with_context(|| format!("Failed to print {}", path.display()))?;
        }

        Ok(())
    }

    async fn show_info(&self) -> anyhow::Result<()> {
        self.connect().await?;
        self.printer.refresh_status().await?;
        tokio::time::sleep(INFO_SETTLE_DELAY).await;

        println!("{}", serde_json::to_string_pretty(&self.printer.info())?);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    config::load_dotenv();
    let config = AppConfig::load();
    let command = Command::parse(std::env::args().skip(1))?;

    let connector = BleConnector::new()
        .await
        .context("Failed to initialize Bluetooth")?;
    let printer = Printer::new(config.driver_options());
    let daemon = Daemon {
        config,
        connector,
        printer,
    };

    let result = match command {
        Command::Monitor => {
            let shutdown = CancellationToken::new();
            let token = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Shutting down...");
                }
                token.cancel();
            });

            tracing::info!(device = %daemon.config.target(), "Monitoring printer. Press Ctrl+C to stop.");
            daemon.monitor(&shutdown).await;
            Ok(())
        }
        Command::Print(files) => daemon.print_files(&files).await,
        Command::Info => daemon.show_info().await,
    };

    if daemon.printer.is_connected() {
        if let Err(e) = daemon.printer.disconnect().await {
            tracing::debug!("Disconnect failed: {e}");
        }
    }
    result
}
