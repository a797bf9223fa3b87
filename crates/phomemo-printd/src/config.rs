//! Daemon configuration from `.env` and environment variables.

use std::time::Duration;

use phomemo::transport::DeviceTarget;
use phomemo::{DriverOptions, PrintOptions};

/// Runtime settings for the daemon.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Advertised name matched during the scan.
    pub printer_name: String,
    /// When set, match by address instead of name.
    pub printer_address: Option<String>,
    pub scan_timeout: Duration,
    pub poll_interval: Duration,
    pub print_timeout: Duration,
    pub connect_timeout: Duration,
    /// Pause between reconnect attempts in monitor mode.
    pub reconnect_delay: Duration,
    pub black_point: f32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            printer_name: "T02".into(),
            printer_address: None,
            scan_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(10),
            print_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(20),
            reconnect_delay: Duration::from_secs(5),
            black_point: 0.5,
        }
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn load() -> Self {
        Self::from_lookup(|key| std::env::var(key).unwrap_or_default())
    }

    fn from_lookup(g: impl Fn(&str) -> String) -> Self {
        let defaults = Self::default();
        let secs = |key: &str, default: Duration| {
            Duration::from_secs(parse_u64(&g(key), default.as_secs()))
        };

        let printer_name = {
            let name = g("PRINTER_NAME");
            if name.is_empty() { defaults.printer_name.clone() } else { name }
        };
        let printer_address = Some(g("PRINTER_ADDRESS")).filter(|a| !a.is_empty());

        let mut black_point = parse_f32(&g("BLACK_POINT"), defaults.black_point);
        if !(0.0..=1.0).contains(&black_point) {
            tracing::warn!(black_point, "BLACK_POINT out of range, using default");
            black_point = defaults.black_point;
        }

        Self {
            printer_name,
            printer_address,
            scan_timeout: secs("SCAN_TIMEOUT_SECS", defaults.scan_timeout),
            poll_interval: secs("POLL_INTERVAL_SECS", defaults.poll_interval),
            print_timeout: secs("PRINT_TIMEOUT_SECS", defaults.print_timeout),
            connect_timeout: secs("CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            reconnect_delay: secs("RECONNECT_DELAY_SECS", defaults.reconnect_delay),
            black_point,
        }
    }

    pub fn target(&self) -> DeviceTarget {
        match &self.printer_address {
            Some(address) => DeviceTarget::Address(address.clone()),
            None => DeviceTarget::Name(self.printer_name.clone()),
        }
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions::new()
            .with_poll_interval(self.poll_interval)
            .with_print_timeout(self.print_timeout)
            .with_connect_timeout(self.connect_timeout)
            .with_print_options(PrintOptions::new().with_black_point(self.black_point))
    }
}

/// Load .env from multiple candidate paths.
pub fn load_dotenv() {
    let candidates = [".env", "../.env"];
    for path in &candidates {
        if dotenvy::from_filename(path).is_ok() {
            tracing::info!("Loaded .env from: {path}");
            return;
        }
    }
    tracing::info!("No .env file found, using system environment variables");
}

fn parse_f32(s: &str, default: f32) -> f32 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}

fn parse_u64(s: &str, default: u64) -> u64 {
    if s.is_empty() {
        return default;
    }
    s.parse().unwrap_or(default)
}
