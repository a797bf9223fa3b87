//! Inbound notification classification.
//!
//! The protocol is only partly documented, so anything unrecognised or too
//! short for its prefix is reported as [`Notification::Unknown`] rather than
//! treated as an error.

use std::fmt;

/// A classified notification from the printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `02 B6 00`, sent by some firmware once the printer is ready.
    Ready,
    /// `1A 0F 0C`, a print has finished.
    Finished,
    /// `1A 3B 04 ..`, ready to accept data (later firmware).
    ReadyForData(Vec<u8>),
    /// `1A 04 <level>`
    BatteryLevel(u8),
    /// `1A 07 <major> <minor> <patch>`
    FirmwareVersion(FirmwareVersion),
    /// `1A 06 <88|89>`, the low bit is set when paper is loaded.
    PaperStatus { loaded: bool },
    /// `01 01`, the last command was accepted.
    Acknowledged,
    Unknown(Vec<u8>),
}

/// Firmware version triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Notification {
    /// Classify a raw notify-characteristic buffer by its leading bytes.
    pub fn parse(data: &[u8]) -> Self {
        match data {
            [0x02, 0xb6, 0x00, ..] => Self::Ready,
            [0x1a, 0x0f, 0x0c, ..] => Self::Finished,
            [0x1a, 0x3b, 0x04, rest @ ..] => Self::ReadyForData(rest.to_vec()),
            [0x1a, 0x04, level, ..] => Self::BatteryLevel(*level),
            [0x1a, 0x07, major, minor, patch, ..] => Self::FirmwareVersion(FirmwareVersion {
                major: *major,
                minor: *minor,
                patch: *patch,
            }),
            [0x1a, 0x06, status @ (0x88 | 0x89), ..] => Self::PaperStatus {
                loaded: status & 1 == 1,
            },
            [0x01, 0x01, ..] => Self::Acknowledged,
            _ => Self::Unknown(data.to_vec()),
        }
    }
}

/// Lowercase hex rendering for log fields.
pub(crate) fn hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}
