//! Printer transport layer.
//!
//! The driver only needs to write bytes and to receive the printer's
//! notifications; both are expressed here independently of the radio stack.
//!
//! - [`ble`]: btleplug-backed BLE GATT transport
//! - [`mock`]: in-memory transport for tests and dry runs

pub mod ble;
mod ble_init;
pub mod mock;

use std::future::Future;

use tokio::sync::mpsc;

use crate::Result;

pub use ble::{BleConnector, BleTransport, DeviceTarget, DiscoveredDevice};
pub use mock::{MockHandle, MockTransport};

/// Capacity of the notification channel between a transport and the driver.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Write side of a printer connection.
pub trait Transport: Send + Sync + 'static {
    /// Write one complete byte sequence to the printer.
    fn write(&self, data: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Tear the connection down. Further writes fail.
    fn close(&self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Inbound traffic from a connected printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Raw buffer pushed on the notify characteristic.
    Notification(Vec<u8>),
    /// The link dropped. No events follow.
    Disconnected,
}

/// An established connection: the write side plus its event stream.
#[derive(Debug)]
pub struct Link<T> {
    pub transport: T,
    pub events: mpsc::Receiver<TransportEvent>,
}

impl<T> Link<T> {
    pub fn new(transport: T, events: mpsc::Receiver<TransportEvent>) -> Self {
        Self { transport, events }
    }
}
