//! Print job assembly.

use bytes::Bytes;

use super::commands;
use crate::bitmap::{Bitmap, PackedBitmap};
use crate::options::PrintOptions;
use crate::{MAX_CHUNK_ROWS, MAX_STRIDE, PrinterError, Result};

/// The ordered command sequence for one print.
///
/// Each segment is written separately; bitmap data segments share the
/// packed bitmap's buffer.
#[derive(Debug, Clone)]
pub struct PrintJob {
    segments: Vec<Bytes>,
}

impl PrintJob {
    /// Encode `init, justify, intensity, (header, rows)*, feed`.
    ///
    /// Rejects bitmaps wider than the print head and bitmaps with no rows.
    pub fn encode(bitmap: &PackedBitmap, options: &PrintOptions) -> Result<Self> {
        let stride = bitmap.stride();
        if stride > MAX_STRIDE {
            return Err(PrinterError::BitmapTooWide {
                stride,
                max: MAX_STRIDE,
            });
        }
        if bitmap.height() == 0 {
            return Err(PrinterError::EmptyBitmap);
        }
        let width_bytes = stride as u8;

        let mut segments = vec![
            Bytes::copy_from_slice(&commands::init()),
            Bytes::copy_from_slice(&commands::set_justify(options.justify)),
            Bytes::copy_from_slice(&commands::set_laser_intensity(options.intensity)),
        ];
        for chunk in bitmap.chunks(MAX_CHUNK_ROWS) {
            let rows = chunk.height() as u16;
            segments.push(Bytes::copy_from_slice(&commands::bitmap_header(
                width_bytes,
                rows,
            )));
            segments.push(chunk.bytes());
        }
        segments.push(Bytes::copy_from_slice(&commands::feed_lines(
            options.feed_lines,
        )));

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Bytes] {
        &self.segments
    }

    /// Total bytes across all segments.
    pub fn len(&self) -> usize {
        self.segments.iter().map(Bytes::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// All segments joined into one buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.segments.concat()
    }
}
