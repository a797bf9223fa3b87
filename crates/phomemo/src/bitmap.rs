//! 1-bit bitmaps and the packing into the printer's raster layout.
//!
//! Rows are packed MSB-first, 8 pixels per byte. When the width is not a
//! multiple of 8, the last byte of each row carries the remaining
//! `width % 8` pixels in its low bits, so reading a pixel from that byte
//! shifts by `pixels_in_byte - 1 - (x % 8)` instead of `7 - (x % 8)`.

use std::fmt;
use std::ops::Range;

use bytes::Bytes;
use image::{DynamicImage, GrayImage};

use crate::{PrinterError, Result};

const BITS_PER_BYTE: usize = 8;

/// A rectangular grid of single-bit pixels (1 = black).
pub trait Bitmap {
    fn width(&self) -> usize;
    fn height(&self) -> usize;
    /// Pixel at `(x, y)`, either 0 or 1.
    fn get_bit(&self, x: usize, y: usize) -> u8;
}

/// Unpacked bitmap holding one byte per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBitmap {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl PixelBitmap {
    /// Build from row-major pixels; any non-zero byte is a black pixel.
    pub fn new(width: usize, height: usize, pixels: Vec<u8>) -> Result<Self> {
        if pixels.len() != width * height {
            return Err(PrinterError::InvalidBitmap(format!(
                "got {} pixels, expected {width}*{height}={}",
                pixels.len(),
                width * height
            )));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    /// Build from a list of equally sized rows.
    pub fn from_rows(rows: &[Vec<u8>]) -> Result<Self> {
        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Err(PrinterError::InvalidBitmap("rows differ in length".into()));
        }
        Self::new(width, rows.len(), rows.concat())
    }
}

impl Bitmap for PixelBitmap {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn get_bit(&self, x: usize, y: usize) -> u8 {
        u8::from(self.pixels[y * self.width + x] != 0)
    }
}

impl fmt::Display for PixelBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PixelBitmap({},{})", self.width, self.height)
    }
}

/// Grayscale image thresholded at a black point.
///
/// No dithering is applied here; callers wanting dithered output hand over
/// an image that is already two-tone.
#[derive(Debug, Clone)]
pub struct ImageBitmap {
    image: GrayImage,
    threshold: u8,
}

impl ImageBitmap {
    /// Pixels with luma below `black_point * 255` print black.
    pub fn new(image: GrayImage, black_point: f32) -> Self {
        let threshold = (black_point.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { image, threshold }
    }

    pub fn from_dynamic(image: &DynamicImage, black_point: f32) -> Self {
        Self::new(image.to_luma8(), black_point)
    }
}

impl Bitmap for ImageBitmap {
    fn width(&self) -> usize {
        self.image.width() as usize
    }

    fn height(&self) -> usize {
        self.image.height() as usize
    }

    fn get_bit(&self, x: usize, y: usize) -> u8 {
        let luma = self.image.get_pixel(x as u32, y as u32).0[0];
        u8::from(luma < self.threshold)
    }
}

/// A bitmap packed in the printer's wire layout.
///
/// The buffer is reference counted, so [`PackedBitmap::slice`] and
/// [`PackedBitmap::chunks`] share it instead of copying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedBitmap {
    data: Bytes,
    width: usize,
    height: usize,
    stride: usize,
}

impl PackedBitmap {
    /// Pack any bitmap in a single pass over its pixels.
    pub fn pack<B: Bitmap + ?Sized>(bitmap: &B) -> Result<Self> {
        let (width, height) = (bitmap.width(), bitmap.height());
        if width == 0 {
            return Err(PrinterError::InvalidBitmap("width must be non-zero".into()));
        }
        let stride = width.div_ceil(BITS_PER_BYTE);
        let mut data = vec![0u8; stride * height];

        for (y, row) in data.chunks_exact_mut(stride).enumerate() {
            let mut acc: u8 = 0;
            for x in 0..width {
                acc = (acc << 1) | (bitmap.get_bit(x, y) & 1);
                if x % BITS_PER_BYTE == BITS_PER_BYTE - 1 || x == width - 1 {
                    row[x / BITS_PER_BYTE] = acc;
                    acc = 0;
                }
            }
        }

        Ok(Self {
            data: Bytes::from(data),
            width,
            height,
            stride,
        })
    }

    /// Wrap already packed data, checking it against the dimensions.
    pub fn from_packed(data: impl Into<Bytes>, width: usize, height: usize) -> Result<Self> {
        let data = data.into();
        if width == 0 {
            return Err(PrinterError::InvalidBitmap("width must be non-zero".into()));
        }
        let stride = width.div_ceil(BITS_PER_BYTE);
        if data.len() != stride * height {
            return Err(PrinterError::InvalidBitmap(format!(
                "got {} bytes, expected {stride}*{height}={}",
                data.len(),
                stride * height
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            stride,
        })
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Shared handle to the packed buffer.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Row-aligned view of `row_count` rows starting at `start_row`.
    pub fn slice(&self, start_row: usize, row_count: usize) -> Result<Self> {
        let end = start_row
            .checked_add(row_count)
            .filter(|&end| end <= self.height)
            .ok_or_else(|| {
                PrinterError::InvalidBitmap(format!(
                    "rows {start_row}..{} out of range for height {}",
                    start_row.saturating_add(row_count),
                    self.height
                ))
            })?;
        Ok(self.rows(start_row..end))
    }

    /// Consecutive views of at most `max_rows` rows each, covering every row.
    pub fn chunks(&self, max_rows: usize) -> impl Iterator<Item = PackedBitmap> + '_ {
        let max_rows = max_rows.max(1);
        (0..self.height)
            .step_by(max_rows)
            .map(move |start| self.rows(start..(start + max_rows).min(self.height)))
    }

    fn rows(&self, rows: Range<usize>) -> Self {
        Self {
            data: self.data.slice(rows.start * self.stride..rows.end * self.stride),
            width: self.width,
            height: rows.len(),
            stride: self.stride,
        }
    }
}

impl Bitmap for PackedBitmap {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn get_bit(&self, x: usize, y: usize) -> u8 {
        let bit_index = x % BITS_PER_BYTE;
        let pixels_in_byte = (self.width - (x - bit_index)).min(BITS_PER_BYTE);
        let byte = self.data[y * self.stride + x / BITS_PER_BYTE];
        (byte >> (pixels_in_byte - 1 - bit_index)) & 1
    }
}

impl fmt::Display for PackedBitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackedBitmap({},{})", self.width, self.height)
    }
}
