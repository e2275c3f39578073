//! Glyph bitmaps and pixel bit depths.

use crate::error::Error;

/// The number of bits used to store a single pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BitDepth {
    One = 1,
    Two = 2,
    Three = 3,
    Four = 4,
    Eight = 8,
}

impl BitDepth {
    pub const ALL: [BitDepth; 5] = [
        BitDepth::One,
        BitDepth::Two,
        BitDepth::Three,
        BitDepth::Four,
        BitDepth::Eight,
    ];

    /// Returns the depth for a bits-per-pixel value, or an error if LVGL can't
    /// draw glyphs with that many bits.
    pub fn new(bits: u8) -> Result<Self, Error> {
        match bits {
            1 => Ok(BitDepth::One),
            2 => Ok(BitDepth::Two),
            3 => Ok(BitDepth::Three),
            4 => Ok(BitDepth::Four),
            8 => Ok(BitDepth::Eight),
            _ => Err(Error::UnsupportedBitDepth(bits)),
        }
    }

    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// The largest pixel value representable at this depth.
    pub const fn max_value(self) -> u8 {
        ((1u16 << self.bits()) - 1) as u8
    }

    /// Reduces 8-bit coverage to this depth by dropping the low bits.
    pub const fn quantize(self, coverage: u8) -> u8 {
        coverage >> (8 - self.bits())
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = Error;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        BitDepth::new(bits)
    }
}

impl std::fmt::Display for BitDepth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} bpp", self.bits())
    }
}

/// An owned, row-major grid of quantized pixel values.
///
/// Rows may be padded: `stride` is the distance in bytes between the start
/// of two consecutive rows and is never smaller than `width`. Padding bytes
/// are never observed through the accessors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bitmap {
    width: u16,
    height: u16,
    stride: usize,
    data: Vec<u8>,
}

impl Bitmap {
    /// Creates a zero-filled bitmap without row padding.
    pub fn new(width: u16, height: u16) -> Self {
        let stride = width as usize;
        Bitmap {
            width,
            height,
            stride,
            data: vec![0; stride * height as usize],
        }
    }

    /// Wraps existing pixel rows.
    ///
    /// Returns `None` if the stride is smaller than the width or the buffer
    /// is too short for `height` rows.
    pub fn from_rows(width: u16, height: u16, stride: usize, data: Vec<u8>) -> Option<Self> {
        if stride < width as usize || data.len() < stride * height as usize {
            return None;
        }
        Some(Bitmap {
            width,
            height,
            stride,
            data,
        })
    }

    /// Builds a bitmap from unpadded row-major pixels.
    pub fn from_pixels(width: u16, height: u16, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() != width as usize * height as usize {
            return None;
        }
        Bitmap::from_rows(width, height, width as usize, pixels)
    }

    pub fn width(&self) -> u16 {
        self.width
    }

    pub fn height(&self) -> u16 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// `true` if the bitmap has no pixels at all (e.g. a space).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn get(&self, x: u16, y: u16) -> Option<u8> {
        self.index(x, y).map(|idx| self.data[idx])
    }

    /// Sets a pixel, returning `false` if the coordinates are out of bounds.
    pub fn set(&mut self, x: u16, y: u16, value: u8) -> bool {
        match self.index(x, y) {
            Some(idx) => {
                self.data[idx] = value;
                true
            }
            None => false,
        }
    }

    /// The visible pixels of a row, without padding.
    pub fn row(&self, y: u16) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        Some(&self.data[start..start + self.width as usize])
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.height).filter_map(|y| self.row(y))
    }

    /// All visible pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = u8> + '_ {
        self.rows().flat_map(|row| row.iter().copied())
    }

    /// Returns the first pixel value that does not fit in `depth`, if any.
    pub fn find_out_of_range(&self, depth: BitDepth) -> Option<u8> {
        let max = depth.max_value();
        self.pixels().find(|value| *value > max)
    }

    fn index(&self, x: u16, y: u16) -> Option<usize> {
        (x < self.width && y < self.height).then(|| y as usize * self.stride + x as usize)
    }
}
