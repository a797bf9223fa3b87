//! Outbound command encoders.
//!
//! Each encoder is a pure function returning the exact fixed-length byte
//! sequence for one printer operation.

/// ESC control byte.
const ESC: u8 = 0x1b;
/// GS control byte.
const GS: u8 = 0x1d;
/// US control byte, prefix of the vendor-specific commands.
const US: u8 = 0x1f;

// -- Vendor (US 0x11) sub-commands --
const VENDOR: u8 = 0x11;
const SUB_INTENSITY: u8 = 0x02;
const SUB_FIRMWARE: u8 = 0x07;
const SUB_BATTERY: u8 = 0x08;
const SUB_SERIAL: u8 = 0x09;
const SUB_TIMER: u8 = 0x0e;
const SUB_PAPER: u8 = 0x11;

/// Horizontal alignment of a printed bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Justify {
    Left = 0x00,
    /// The only alignment the T02 honours reliably.
    #[default]
    Centre = 0x01,
    Right = 0x02,
}

/// Print head energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LaserIntensity {
    #[default]
    Low = 0x01,
    Medium = 0x03,
    High = 0x04,
}

/// Reset the printer and prepare it for commands.
pub fn init() -> [u8; 2] {
    [ESC, 0x40]
}

pub fn set_justify(justify: Justify) -> [u8; 3] {
    [ESC, 0x61, justify as u8]
}

pub fn set_laser_intensity(intensity: LaserIntensity) -> [u8; 4] {
    [US, VENDOR, SUB_INTENSITY, intensity as u8]
}

/// Raster bitmap header.
///
/// Must be followed by exactly `width_bytes * height_rows` bytes of packed
/// data. The height is little-endian.
pub fn bitmap_header(width_bytes: u8, height_rows: u16) -> [u8; 8] {
    let [lo, hi] = height_rows.to_le_bytes();
    [GS, 0x76, 0x30, 0x00, width_bytes, 0x00, lo, hi]
}

/// Spool `lines` blank lines.
pub fn feed_lines(lines: u8) -> [u8; 3] {
    [ESC, 0x64, lines]
}

pub fn query_battery() -> [u8; 3] {
    [US, VENDOR, SUB_BATTERY]
}

/// Paper loaded / lid state.
pub fn query_paper() -> [u8; 3] {
    [US, VENDOR, SUB_PAPER]
}

pub fn query_firmware() -> [u8; 3] {
    [US, VENDOR, SUB_FIRMWARE]
}

pub fn query_serial() -> [u8; 3] {
    [US, VENDOR, SUB_SERIAL]
}

/// Time left before the printer powers itself off.
pub fn query_timer() -> [u8; 3] {
    [US, VENDOR, SUB_TIMER]
}

/// The read-only status poll: battery, paper and firmware queries after an
/// init, as one buffer.
pub fn status_poll() -> Vec<u8> {
    [
        &init()[..],
        &query_battery()[..],
        &query_paper()[..],
        &query_firmware()[..],
    ]
    .concat()
}
