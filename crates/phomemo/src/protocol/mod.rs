//! Phomemo T02 wire protocol.
//!
//! - `commands`: outbound ESC/POS-style command encoders
//! - `notification`: classification of inbound notify-characteristic buffers
//! - `job`: assembly of a packed bitmap into a print command sequence
//!
//! The service and both characteristics share one 128-bit UUID template
//! (`0000ffXX-0000-1000-8000-00805f9b34fb`); only the role byte differs.

pub mod commands;
pub mod job;
pub mod notification;

pub use commands::{Justify, LaserIntensity};
pub use job::PrintJob;
pub use notification::Notification;

use uuid::Uuid;

/// Role byte that distinguishes the printer's GATT UUIDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DeviceRole {
    Service = 0x00,
    Write = 0x02,
    Notify = 0x03,
}

const UUID_TEMPLATE: [u8; 16] = [
    0x00, 0x00, 0xff, 0x00, 0x00, 0x00, 0x10, 0x00, 0x80, 0x00, 0x00, 0x80, 0x5f, 0x9b, 0x34, 0xfb,
];

/// GATT UUID for the given role.
pub const fn device_uuid(role: DeviceRole) -> Uuid {
    let mut bytes = UUID_TEMPLATE;
    bytes[3] = role as u8;
    Uuid::from_bytes(bytes)
}

/// Primary printer service (`ff00`).
pub const SERVICE_UUID: Uuid = device_uuid(DeviceRole::Service);

/// Characteristic that accepts command data (`ff02`).
pub const WRITE_CHARACTERISTIC: Uuid = device_uuid(DeviceRole::Write);

/// Characteristic the printer pushes notifications on (`ff03`).
pub const NOTIFY_CHARACTERISTIC: Uuid = device_uuid(DeviceRole::Notify);
