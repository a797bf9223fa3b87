//! BLE GATT transport using btleplug.
//!
//! Provides scanning, connecting with service/characteristic discovery,
//! notification forwarding, and chunked data writing for the printer.

use std::fmt;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{EVENT_CHANNEL_CAPACITY, Link, Transport, TransportEvent, ble_init};
use crate::protocol::{NOTIFY_CHARACTERISTIC, SERVICE_UUID, WRITE_CHARACTERISTIC, notification};
use crate::{PrinterError, Result};

/// Default BLE scan timeout.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Delay between BLE write chunks.
const CHUNK_WRITE_DELAY: Duration = Duration::from_millis(20);

/// Conservative write size (185 MTU - 3 byte ATT header).
const DEFAULT_CHUNK_SIZE: usize = 182;

fn ble_error(e: btleplug::Error) -> PrinterError {
    PrinterError::Ble(e.to_string())
}

/// Which peripheral to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// Advertised local name, e.g. `T02`.
    Name(String),
    /// Platform address (MAC on Linux/Windows, UUID on macOS).
    Address(String),
}

impl DeviceTarget {
    fn matches(&self, name: &str, address: &str, id: &str) -> bool {
        match self {
            Self::Name(want) => name == want,
            Self::Address(want) => {
                address.eq_ignore_ascii_case(want) || id.eq_ignore_ascii_case(want)
            }
        }
    }
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Address(address) => f.write_str(address),
        }
    }
}

/// A peripheral found during a scan.
#[derive(Debug, Clone)]
pub struct DiscoveredDevice {
    /// Advertised name (may be empty).
    pub name: String,
    pub address: String,
    /// The underlying btleplug peripheral handle.
    pub peripheral: Peripheral,
}

/// Owns the BLE adapter and sets up printer connections.
pub struct BleConnector {
    adapter: Adapter,
}

impl BleConnector {
    /// Open the first available BLE adapter, retrying while the host
    /// Bluetooth stack is still starting.
    pub async fn new() -> Result<Self> {
        ble_init::with_retry(Self::open_adapter).await
    }

    async fn open_adapter() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|e| PrinterError::AdapterUnavailable(e.to_string()))?;

        let adapter = manager
            .adapters()
            .await
            .map_err(|e| PrinterError::AdapterUnavailable(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| PrinterError::AdapterUnavailable("No BLE adapter found".into()))?;

        Ok(Self { adapter })
    }

    /// Scan until a peripheral matching `target` shows up or `timeout` expires.
    pub async fn find(&self, target: &DeviceTarget, timeout: Duration) -> Result<DiscoveredDevice> {
        tracing::info!(%target, timeout_secs = timeout.as_secs(), "Scanning for printer");

        let mut events = self.adapter.events().await.map_err(ble_error)?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(ble_error)?;

        // The stack may already know the device from an earlier scan.
        let mut found = None;
        for peripheral in self.adapter.peripherals().await.map_err(ble_error)? {
            if let Some(device) = self.describe_if_match(peripheral, target).await {
                found = Some(device);
                break;
            }
        }

        if found.is_none() {
            let deadline = tokio::time::sleep(timeout);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    _ = &mut deadline => break,
                    event = events.next() => match event {
                        Some(CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id)) => {
                            let Ok(peripheral) = self.adapter.peripheral(&id).await else {
                                continue;
                            };
                            if let Some(device) = self.describe_if_match(peripheral, target).await {
                                found = Some(device);
                                break;
                            }
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        }

        self.adapter.stop_scan().await.map_err(ble_error)?;

        let device = found.ok_or_else(|| PrinterError::DeviceNotFound(target.to_string()))?;
        tracing::info!(name = %device.name, address = %device.address, "Found printer");
        Ok(device)
    }

    async fn describe_if_match(
        &self,
        peripheral: Peripheral,
        target: &DeviceTarget,
    ) -> Option<DiscoveredDevice> {
        let props = peripheral.properties().await.ok()??;
        let name = props.local_name.unwrap_or_default();
        let address = props.address.to_string();
        let id = format!("{:?}", peripheral.id());

        target.matches(&name, &address, &id).then_some(DiscoveredDevice {
            name,
            address,
            peripheral,
        })
    }

    /// Connect, discover the printer service, and subscribe to notifications.
    ///
    /// The returned link's event stream ends with
    /// [`TransportEvent::Disconnected`] when the peripheral drops.
    pub async fn connect(&self, device: &DiscoveredDevice) -> Result<Link<BleTransport>> {
        tracing::info!(address = %device.address, name = %device.name, "Connecting to printer");

        let peripheral = device.peripheral.clone();
        // Listen for disconnects before the link exists so none are missed.
        let central_events = self.adapter.events().await.map_err(ble_error)?;

        peripheral.connect().await.map_err(ble_error)?;

        let (write_char, notifications) = match setup_characteristics(&peripheral).await {
            Ok(chars) => chars,
            Err(err) => {
                tracing::warn!(error = %err, "Printer setup failed, disconnecting");
                let _ = peripheral.disconnect().await;
                return Err(err);
            }
        };

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let shutdown = CancellationToken::new();
        tokio::spawn(forward_events(
            peripheral.id(),
            notifications,
            central_events,
            event_tx,
            shutdown.clone(),
        ));

        tracing::info!(chunk_size = DEFAULT_CHUNK_SIZE, "Connected and subscribed to printer");
        let transport = BleTransport {
            peripheral,
            write_char,
            chunk_size: DEFAULT_CHUNK_SIZE,
            shutdown,
        };
        Ok(Link::new(transport, event_rx))
    }
}

async fn setup_characteristics(
    peripheral: &Peripheral,
) -> Result<(Characteristic, BoxStream<'static, ValueNotification>)> {
    peripheral.discover_services().await.map_err(ble_error)?;

    let service = peripheral
        .services()
        .into_iter()
        .find(|s| s.uuid == SERVICE_UUID)
        .ok_or(PrinterError::ServiceNotFound(SERVICE_UUID))?;

    let find_char = |uuid: uuid::Uuid| {
        service
            .characteristics
            .iter()
            .find(|c| c.uuid == uuid)
            .cloned()
            .ok_or(PrinterError::MissingCharacteristic(uuid))
    };
    let write_char = find_char(WRITE_CHARACTERISTIC)?;
    let notify_char = find_char(NOTIFY_CHARACTERISTIC)?;

    // Subscribe to the stream first so the initial status burst is kept.
    let notifications = peripheral.notifications().await.map_err(ble_error)?;
    peripheral.subscribe(&notify_char).await.map_err(ble_error)?;

    Ok((write_char, notifications))
}

/// Pump notifications and the disconnect event into the link channel.
async fn forward_events(
    id: PeripheralId,
    mut notifications: BoxStream<'static, ValueNotification>,
    mut central_events: BoxStream<'static, CentralEvent>,
    event_tx: mpsc::Sender<TransportEvent>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            notification = notifications.next() => match notification {
                Some(n) if n.uuid == NOTIFY_CHARACTERISTIC => {
                    tracing::debug!(data = %notification::hex(&n.value), "Notification received");
                    if event_tx.send(TransportEvent::Notification(n.value)).await.is_err() {
                        return;
                    }
                }
                Some(_) => {}
                None => break,
            },
            event = central_events.next() => match event {
                Some(CentralEvent::DeviceDisconnected(gone)) if gone == id => break,
                Some(_) => {}
                None => break,
            },
        }
    }

    tracing::info!("Printer link dropped");
    let _ = event_tx.send(TransportEvent::Disconnected).await;
}

/// Write side of a connected BLE printer.
pub struct BleTransport {
    peripheral: Peripheral,
    write_char: Characteristic,
    chunk_size: usize,
    shutdown: CancellationToken,
}

impl Transport for BleTransport {
    /// Write data in MTU-sized chunks, pausing briefly between chunks to
    /// avoid overrunning the printer's buffer.
    async fn write(&self, data: &[u8]) -> Result<()> {
        let chunks: Vec<&[u8]> = data.chunks(self.chunk_size).collect();
        tracing::debug!(
            chunk_count = chunks.len(),
            chunk_size = self.chunk_size,
            total_bytes = data.len(),
            "Writing data in chunks"
        );

        for (i, chunk) in chunks.iter().enumerate() {
            self.peripheral
                .write(&self.write_char, chunk, WriteType::WithoutResponse)
                .await
                .map_err(|e| {
                    PrinterError::Write(format!("chunk {}/{}: {}", i + 1, chunks.len(), e))
                })?;
            tokio::time::sleep(CHUNK_WRITE_DELAY).await;
        }

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        tracing::info!("Disconnecting BLE printer");
        self.peripheral.disconnect().await.map_err(ble_error)
    }
}

impl Drop for BleTransport {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_matches_name_exactly() {
        let target = DeviceTarget::Name("T02".into());
        assert!(target.matches("T02", "AA:BB:CC:DD:EE:FF", "id"));
        assert!(!target.matches("T02S", "AA:BB:CC:DD:EE:FF", "id"));
    }

    #[test]
    fn test_target_matches_address_case_insensitive() {
        let target = DeviceTarget::Address("aa:bb:cc:dd:ee:ff".into());
        assert!(target.matches("", "AA:BB:CC:DD:EE:FF", "hci0/dev_AA_BB"));
        assert!(!target.matches("T02", "11:22:33:44:55:66", "hci0/dev_11_22"));

        let by_id = DeviceTarget::Address("5A1C2B3D-0000-1111-2222-333344445555".into());
        assert!(by_id.matches("", "00:00:00:00:00:00", "5a1c2b3d-0000-1111-2222-333344445555"));
    }
}
