//! Packing pixels into a continuous MSB-first bitstream.
//!
//! LVGL reads glyph bitmaps as a single stream of `bpp`-bit fields with no
//! padding between rows; only the last byte of a glyph is padded with zero
//! bits.

use crate::bitmap::{BitDepth, Bitmap};

/// Accumulates values of arbitrary bit width, most significant bit first.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    bytes: Vec<u8>,
    current: u8,
    filled: u8,
}

impl BitWriter {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    /// Writes the low `bits` bits of `value`.
    pub(crate) fn write(&mut self, value: u32, bits: u8) {
        debug_assert!(bits <= 32);
        for shift in (0..bits).rev() {
            let bit = ((value >> shift) & 1) as u8;
            self.current = (self.current << 1) | bit;
            self.filled += 1;
            if self.filled == 8 {
                self.bytes.push(self.current);
                self.current = 0;
                self.filled = 0;
            }
        }
    }

    pub(crate) fn bit_len(&self) -> usize {
        self.bytes.len() * 8 + self.filled as usize
    }

    /// Pads the trailing partial byte with zeros and returns the stream.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        if self.filled > 0 {
            self.bytes.push(self.current << (8 - self.filled));
        }
        self.bytes
    }
}

/// Reads values of arbitrary bit width, most significant bit first.
#[derive(Clone, Debug)]
pub(crate) struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        BitReader { data, pos: 0 }
    }

    /// Returns `None` once the stream is exhausted.
    pub(crate) fn read(&mut self, bits: u8) -> Option<u32> {
        if self.pos + bits as usize > self.data.len() * 8 {
            return None;
        }
        let mut value = 0u32;
        for _ in 0..bits {
            let byte = self.data[self.pos / 8];
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | bit as u32;
            self.pos += 1;
        }
        Some(value)
    }
}

/// The number of bytes needed to pack `pixel_count` pixels.
pub fn packed_len(pixel_count: usize, depth: BitDepth) -> usize {
    (pixel_count * depth.bits() as usize).div_ceil(8)
}

/// Packs the visible pixels of `bitmap`.
///
/// Pixel values must already fit in `depth`; higher bits are discarded.
pub fn pack(bitmap: &Bitmap, depth: BitDepth) -> Vec<u8> {
    pack_pixels(bitmap.pixels(), depth)
}

pub(crate) fn pack_pixels(pixels: impl IntoIterator<Item = u8>, depth: BitDepth) -> Vec<u8> {
    let mut writer = BitWriter::new();
    for pixel in pixels {
        writer.write(pixel as u32, depth.bits());
    }
    writer.finish()
}

/// Unpacks a `width`×`height` bitmap, or `None` if `data` is too short.
pub fn unpack(data: &[u8], width: u16, height: u16, depth: BitDepth) -> Option<Bitmap> {
    let count = width as usize * height as usize;
    let mut reader = BitReader::new(data);
    let pixels = (0..count)
        .map(|_| reader.read(depth.bits()).map(|value| value as u8))
        .collect::<Option<Vec<_>>>()?;
    Bitmap::from_pixels(width, height, pixels)
}
