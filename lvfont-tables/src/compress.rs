//! Run-length compression of glyph bitmaps.
//!
//! This is the modified I3BN scheme understood by LVGL's glyph decompressor.
//! Pixels are written at the font's bit depth. After two equal pixels the
//! encoder switches to repeat mode: each further repetition costs one `1`
//! bit, and a `0` bit ends the run. After eleven `1` bits a 6-bit counter
//! holds the remaining length. Runs longer than [`RLE_MAX_REPEATS`] plus one
//! are split.
//!
//! An optional prefilter XORs every row with the row above it, which turns
//! vertical edges into long runs of zeros.

use thiserror::Error;

use crate::{
    bitmap::{BitDepth, Bitmap},
    pack::{BitReader, BitWriter},
};

/// Pixels written verbatim before the encoder enters repeat mode.
const RLE_SKIP_COUNT: usize = 1;
/// Repetitions encoded as single `1` bits before the counter is used.
const RLE_BIT_COLLAPSED_COUNT: usize = 10;
const RLE_COUNTER_BITS: u8 = 6;
const RLE_COUNTER_MAX: usize = (1 << RLE_COUNTER_BITS) - 1;
/// The longest repetition a single run can express.
pub const RLE_MAX_REPEATS: usize = RLE_COUNTER_MAX + RLE_BIT_COLLAPSED_COUNT + 1;

/// How a glyph's bitmap bytes are stored.
///
/// The discriminants match LVGL's `lv_font_fmt_txt_bitmap_format_t`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum BitmapEncoding {
    /// Packed pixels, uncompressed.
    #[default]
    Raw = 0,
    /// Run-length encoded after the XOR row prefilter.
    RlePrefiltered = 1,
    /// Run-length encoded without prefilter.
    Rle = 2,
}

impl BitmapEncoding {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(BitmapEncoding::Raw),
            1 => Some(BitmapEncoding::RlePrefiltered),
            2 => Some(BitmapEncoding::Rle),
            _ => None,
        }
    }

    /// The name of the matching `LV_FONT_FMT_TXT_*` constant.
    pub fn lvgl_name(self) -> &'static str {
        match self {
            BitmapEncoding::Raw => "LV_FONT_FMT_TXT_PLAIN",
            BitmapEncoding::RlePrefiltered => "LV_FONT_FMT_TXT_COMPRESSED",
            BitmapEncoding::Rle => "LV_FONT_FMT_TXT_COMPRESSED_NO_PREFILTER",
        }
    }
}

/// Compression settings for a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompressionOptions {
    pub enabled: bool,
    /// Also try the XOR row prefilter.
    pub prefilter: bool,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        CompressionOptions {
            enabled: true,
            prefilter: true,
        }
    }
}

/// A compressed bitmap that won against the raw packed stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompressedBitmap {
    pub encoding: BitmapEncoding,
    pub data: Vec<u8>,
}

/// A compressed candidate did not decode back to its source pixels.
#[derive(Debug, Error)]
#[error("{encoding:?} candidate for a {width}x{height} bitmap does not decode to its source")]
pub(crate) struct CompressionRoundTripError {
    encoding: BitmapEncoding,
    width: u16,
    height: u16,
}

/// Run-length encodes a pixel stream at the given depth.
pub fn encode_rle(pixels: &[u8], depth: BitDepth) -> Vec<u8> {
    let bits = depth.bits();
    let mut writer = BitWriter::new();
    let mut offset = 0;
    while offset < pixels.len() {
        let pixel = pixels[offset];
        let mut same = pixels[offset..]
            .iter()
            .take_while(|value| **value == pixel)
            .count()
            .min(RLE_MAX_REPEATS + RLE_SKIP_COUNT);
        offset += same;

        if same <= RLE_SKIP_COUNT {
            for _ in 0..same {
                writer.write(pixel as u32, bits);
            }
            continue;
        }
        for _ in 0..RLE_SKIP_COUNT {
            writer.write(pixel as u32, bits);
        }
        same -= RLE_SKIP_COUNT;

        writer.write(pixel as u32, bits);
        if same <= RLE_BIT_COLLAPSED_COUNT {
            for _ in 1..same {
                writer.write(1, 1);
            }
            writer.write(0, 1);
            continue;
        }
        same -= RLE_BIT_COLLAPSED_COUNT + 1;
        for _ in 0..=RLE_BIT_COLLAPSED_COUNT {
            writer.write(1, 1);
        }
        writer.write(same as u32, RLE_COUNTER_BITS);
    }
    log::trace!(
        "rle: {} pixels -> {} bits",
        pixels.len(),
        writer.bit_len()
    );
    writer.finish()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RleState {
    Single,
    Repeated,
    Counter,
}

/// Decodes exactly `count` pixels, or returns `None` if the stream ends early.
///
/// This follows the state machine of LVGL's decoder, so anything it accepts
/// the device accepts too.
pub fn decode_rle(data: &[u8], depth: BitDepth, count: usize) -> Option<Vec<u8>> {
    let bits = depth.bits();
    let mut reader = BitReader::new(data);
    let mut out = Vec::with_capacity(count);
    let mut state = RleState::Single;
    let mut prev = 0u8;
    let mut repeats = 0usize;

    while out.len() < count {
        let value = match state {
            RleState::Single => {
                let value = reader.read(bits)? as u8;
                if !out.is_empty() && value == prev {
                    repeats = 0;
                    state = RleState::Repeated;
                }
                value
            }
            RleState::Repeated => {
                let marker = reader.read(1)?;
                repeats += 1;
                if marker == 1 {
                    if repeats == RLE_BIT_COLLAPSED_COUNT + 1 {
                        repeats = reader.read(RLE_COUNTER_BITS)? as usize;
                        if repeats != 0 {
                            state = RleState::Counter;
                            prev
                        } else {
                            state = RleState::Single;
                            reader.read(bits)? as u8
                        }
                    } else {
                        prev
                    }
                } else {
                    state = RleState::Single;
                    reader.read(bits)? as u8
                }
            }
            RleState::Counter => {
                repeats -= 1;
                if repeats == 0 {
                    state = RleState::Single;
                    reader.read(bits)? as u8
                } else {
                    prev
                }
            }
        };
        prev = value;
        out.push(value);
    }
    Some(out)
}

/// XORs every row with the original row above it.
pub fn xor_prefilter(bitmap: &Bitmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(bitmap.pixel_count());
    let mut above: Option<&[u8]> = None;
    for row in bitmap.rows() {
        match above {
            Some(above) => out.extend(row.iter().zip(above).map(|(a, b)| a ^ b)),
            None => out.extend_from_slice(row),
        }
        above = Some(row);
    }
    out
}

/// Undoes [`xor_prefilter`] in place on unpadded rows of `width` pixels.
pub fn xor_unfilter(pixels: &mut [u8], width: usize) {
    if width == 0 {
        return;
    }
    for idx in width..pixels.len() {
        pixels[idx] ^= pixels[idx - width];
    }
}

/// Decodes a stored bitmap back into pixels.
pub fn decompress(
    data: &[u8],
    encoding: BitmapEncoding,
    width: u16,
    height: u16,
    depth: BitDepth,
) -> Option<Bitmap> {
    let count = width as usize * height as usize;
    match encoding {
        BitmapEncoding::Raw => crate::pack::unpack(data, width, height, depth),
        BitmapEncoding::Rle => {
            Bitmap::from_pixels(width, height, decode_rle(data, depth, count)?)
        }
        BitmapEncoding::RlePrefiltered => {
            let mut pixels = decode_rle(data, depth, count)?;
            xor_unfilter(&mut pixels, width as usize);
            Bitmap::from_pixels(width, height, pixels)
        }
    }
}

/// Compresses one glyph, keeping the smallest candidate that beats `packed`.
///
/// Every candidate is decoded and compared against `bitmap` before it is
/// accepted. Returns `None` if the raw packed stream should be stored.
pub fn compress(
    bitmap: &Bitmap,
    packed: &[u8],
    depth: BitDepth,
    options: CompressionOptions,
) -> Option<CompressedBitmap> {
    if !options.enabled || bitmap.is_empty() {
        return None;
    }
    let pixels: Vec<u8> = bitmap.pixels().collect();
    let mut best: Option<CompressedBitmap> = None;

    let mut candidates = vec![(BitmapEncoding::Rle, encode_rle(&pixels, depth))];
    if options.prefilter {
        let filtered = xor_prefilter(bitmap);
        candidates.push((
            BitmapEncoding::RlePrefiltered,
            encode_rle(&filtered, depth),
        ));
    }

    for (encoding, data) in candidates {
        let limit = best.as_ref().map_or(packed.len(), |best| best.data.len());
        if data.len() >= limit {
            continue;
        }
        if let Err(e) = verify(&data, encoding, bitmap, depth) {
            log::warn!("{e}, storing the glyph without it");
            continue;
        }
        best = Some(CompressedBitmap { encoding, data });
    }
    best
}

fn verify(
    data: &[u8],
    encoding: BitmapEncoding,
    bitmap: &Bitmap,
    depth: BitDepth,
) -> Result<(), CompressionRoundTripError> {
    let decoded = decompress(data, encoding, bitmap.width(), bitmap.height(), depth);
    if decoded.as_ref().is_some_and(|decoded| decoded.pixels().eq(bitmap.pixels())) {
        Ok(())
    } else {
        Err(CompressionRoundTripError {
            encoding,
            width: bitmap.width(),
            height: bitmap.height(),
        })
    }
}
