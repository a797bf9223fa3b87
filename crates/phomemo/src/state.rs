//! Printer readiness state and device information snapshot.

use std::fmt;

use serde::Serialize;

/// Readiness of the connected printer.
///
/// `Disconnected -> Connecting -> Ready <-> Busy`, with `Ready`/`Busy`
/// falling into `OutOfPaper` and any state dropping to `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrinterState {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Busy,
    OutOfPaper,
}

impl PrinterState {
    /// Whether a print may be accepted in this state.
    pub fn accepts_print(self) -> bool {
        self == Self::Ready
    }

    /// Whether a status poll may be written in this state.
    pub fn accepts_poll(self) -> bool {
        !matches!(self, Self::Disconnected | Self::Busy)
    }
}

impl fmt::Display for PrinterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Busy => "busy",
            Self::OutOfPaper => "out_of_paper",
        };
        f.write_str(s)
    }
}

/// Last known device details, updated from notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub firmware_version: String,
    /// Battery percentage, `-1` until the device reports it.
    pub battery_level: i32,
    pub state: PrinterState,
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            firmware_version: String::new(),
            battery_level: -1,
            state: PrinterState::Disconnected,
        }
    }
}

impl DeviceInfo {
    /// Fresh info for a connection that has just been established.
    pub(crate) fn connecting() -> Self {
        Self {
            state: PrinterState::Connecting,
            ..Self::default()
        }
    }
}
