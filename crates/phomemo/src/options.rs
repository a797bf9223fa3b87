//! Print and driver configuration options.
//!
//! `PrintOptions` controls how a bitmap is laid out on the label;
//! `DriverOptions` controls the timing of the connection state machine.

use std::time::Duration;

use crate::protocol::{Justify, LaserIntensity};

/// Shortest accepted status poll interval.
const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Options applied to every print.
#[derive(Debug, Clone)]
pub struct PrintOptions {
    /// Alignment of the bitmap on the label.
    pub justify: Justify,

    /// Print head energy.
    pub intensity: LaserIntensity,

    /// Blank lines fed after the bitmap.
    pub feed_lines: u8,

    /// Black point threshold (0.0..=1.0) used when a decoded image is
    /// converted to a bitmap. Pixels darker than this print black.
    pub black_point: f32,
}

impl Default for PrintOptions {
    fn default() -> Self {
        Self {
            justify: Justify::Centre,
            intensity: LaserIntensity::Low,
            feed_lines: 4,
            black_point: 0.5,
        }
    }
}

impl PrintOptions {
    /// Create options with the printer's defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set justification.
    pub fn with_justify(mut self, val: Justify) -> Self {
        self.justify = val;
        self
    }

    /// Builder: set laser intensity.
    pub fn with_intensity(mut self, val: LaserIntensity) -> Self {
        self.intensity = val;
        self
    }

    /// Builder: set the number of lines fed after printing.
    pub fn with_feed_lines(mut self, val: u8) -> Self {
        self.feed_lines = val;
        self
    }

    /// Builder: set black point threshold.
    ///
    /// # Panics
    /// Panics if value is not in 0.0..=1.0 range.
    pub fn with_black_point(mut self, val: f32) -> Self {
        assert!(
            (0.0..=1.0).contains(&val),
            "Black point must be between 0.0 and 1.0, got {val}"
        );
        self.black_point = val;
        self
    }
}

/// Timing of the driver's state machine.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    /// Interval between background status polls.
    pub poll_interval: Duration,

    /// Delay after writing a print before listening for the finished signal.
    /// The T02 emits one early "finished" right after the data transfer.
    pub finish_grace: Duration,

    /// Longest wait for the finished signal before the print is abandoned.
    pub print_timeout: Duration,

    /// Longest wait for the first paper status after connecting.
    pub connect_timeout: Duration,

    /// Options used for every print.
    pub print: PrintOptions,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            finish_grace: Duration::from_millis(100),
            print_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(20),
            print: PrintOptions::default(),
        }
    }
}

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the status poll interval (minimum 1 second).
    pub fn with_poll_interval(mut self, val: Duration) -> Self {
        self.poll_interval = val.max(MIN_POLL_INTERVAL);
        self
    }

    /// Builder: set the spurious-finish grace delay.
    pub fn with_finish_grace(mut self, val: Duration) -> Self {
        self.finish_grace = val;
        self
    }

    /// Builder: set the print completion timeout.
    pub fn with_print_timeout(mut self, val: Duration) -> Self {
        self.print_timeout = val;
        self
    }

    /// Builder: set the connect handshake timeout.
    pub fn with_connect_timeout(mut self, val: Duration) -> Self {
        self.connect_timeout = val;
        self
    }

    /// Builder: set print options.
    pub fn with_print_options(mut self, val: PrintOptions) -> Self {
        self.print = val;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_print_options() {
        let opts = PrintOptions::default();
        assert_eq!(opts.justify, Justify::Centre);
        assert_eq!(opts.intensity, LaserIntensity::Low);
        assert_eq!(opts.feed_lines, 4);
        assert!((opts.black_point - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_builder_chain() {
        let opts = PrintOptions::new()
            .with_justify(Justify::Right)
            .with_intensity(LaserIntensity::Medium)
            .with_feed_lines(0)
            .with_black_point(0.7);

        assert_eq!(opts.justify, Justify::Right);
        assert_eq!(opts.intensity, LaserIntensity::Medium);
        assert_eq!(opts.feed_lines, 0);
        assert!((opts.black_point - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    #[should_panic(expected = "Black point must be between 0.0 and 1.0")]
    fn test_invalid_black_point() {
        PrintOptions::new().with_black_point(1.5);
    }

    #[test]
    fn test_driver_defaults() {
        let opts = DriverOptions::default();
        assert_eq!(opts.poll_interval, Duration::from_secs(10));
        assert_eq!(opts.finish_grace, Duration::from_millis(100));
        assert_eq!(opts.print_timeout, Duration::from_secs(60));
        assert_eq!(opts.connect_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_poll_interval_minimum() {
        let opts = DriverOptions::new().with_poll_interval(Duration::from_millis(10));
        assert_eq!(opts.poll_interval, Duration::from_secs(1));
    }
}
