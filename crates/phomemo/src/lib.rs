//! Phomemo T02 label printer driver.
//!
//! Provides BLE connection management, the ESC/POS-style command protocol,
//! bitmap packing, and a state-machine driver that turns the printer's
//! notification-driven link into an awaitable `print` call.

pub mod bitmap;
pub mod driver;
pub mod options;
mod poller;
pub mod protocol;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use bitmap::{Bitmap, ImageBitmap, PackedBitmap, PixelBitmap};
pub use driver::Printer;
pub use options::{DriverOptions, PrintOptions};
pub use state::{DeviceInfo, PrinterState};
pub use transport::{Link, Transport, TransportEvent};

/// Print width in pixels (T02 print head).
pub const PRINT_WIDTH: u32 = 384;

/// Widest row the firmware accepts, in bytes.
pub const MAX_STRIDE: usize = 48;

/// Rows per bitmap command the firmware reliably accepts.
pub const MAX_CHUNK_ROWS: usize = 256;

/// Errors that can occur during printer operations.
#[derive(Debug, thiserror::Error)]
pub enum PrinterError {
    #[error("No BLE adapter available: {0}")]
    AdapterUnavailable(String),

    #[error("Printer '{0}' not found during BLE scan")]
    DeviceNotFound(String),

    #[error("Printer service {0} not found on device")]
    ServiceNotFound(uuid::Uuid),

    #[error("Missing characteristic {0} on connected device")]
    MissingCharacteristic(uuid::Uuid),

    #[error("BLE error: {0}")]
    Ble(String),

    #[error("Printer did not report paper status within {0} seconds")]
    ConnectTimeout(u64),

    #[error("Printer disconnected before becoming ready")]
    ConnectionLost,

    #[error("Printer is already connected")]
    AlreadyConnected,

    #[error("Printer is not ready (state: {0})")]
    NotReady(PrinterState),

    #[error("Not connected to any device")]
    NotConnected,

    #[error("Bitmap too wide for printer: stride {stride} bytes exceeds {max}")]
    BitmapTooWide { stride: usize, max: usize },

    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),

    #[error("Bitmap has no rows to print")]
    EmptyBitmap,

    #[error("Printer disconnected before finishing the print")]
    PrintIncomplete,

    #[error("Printer did not finish printing within {0} seconds")]
    PrintTimeout(u64),

    #[error("BLE write error: {0}")]
    Write(String),
}

/// Result type alias for printer operations.
pub type Result<T> = std::result::Result<T, PrinterError>;
