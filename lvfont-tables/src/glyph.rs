//! Rendered glyphs and their compiled records.

use crate::{
    bitmap::{BitDepth, Bitmap},
    compress::{self, BitmapEncoding, CompressedBitmap, CompressionOptions},
    pack,
};

/// A glyph image as produced by a [`GlyphSource`](crate::GlyphSource).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RasterGlyph {
    /// Quantized pixels; every value must fit in the requested bit depth.
    pub bitmap: Bitmap,
    /// Left edge of the bitmap relative to the pen position.
    pub bearing_x: i16,
    /// Top edge of the bitmap relative to the baseline, positive up.
    pub bearing_y: i16,
    /// Horizontal advance in pixels.
    pub advance: f32,
}

/// A glyph that made it into the font.
#[derive(Clone, Debug, PartialEq)]
pub struct GlyphRecord {
    /// The codepoint looked up in the font.
    pub source_codepoint: u32,
    /// The codepoint the glyph is reachable by in the compiled font.
    pub mapped_codepoint: u32,
    /// Index of the font source the glyph was rendered from.
    pub font_index: usize,
    /// Assigned once all glyphs are sorted.
    pub glyph_index: u16,
    pub bitmap: Bitmap,
    pub bearing_x: i16,
    pub bearing_y: i16,
    pub advance: f32,
    pub packed: Vec<u8>,
    pub compressed: Option<CompressedBitmap>,
}

impl GlyphRecord {
    pub fn new(
        source_codepoint: u32,
        mapped_codepoint: u32,
        font_index: usize,
        bitmap: Bitmap,
    ) -> Self {
        GlyphRecord {
            source_codepoint,
            mapped_codepoint,
            font_index,
            glyph_index: 0,
            bitmap,
            bearing_x: 0,
            bearing_y: 0,
            advance: 0.0,
            packed: Vec::new(),
            compressed: None,
        }
    }

    /// Packs and, if enabled, compresses a rendered glyph.
    pub fn from_raster(
        source_codepoint: u32,
        mapped_codepoint: u32,
        font_index: usize,
        raster: RasterGlyph,
        depth: BitDepth,
        compression: CompressionOptions,
    ) -> Self {
        let packed = pack::pack(&raster.bitmap, depth);
        let compressed = compress::compress(&raster.bitmap, &packed, depth, compression);
        GlyphRecord {
            bearing_x: raster.bearing_x,
            bearing_y: raster.bearing_y,
            advance: raster.advance,
            packed,
            compressed,
            ..GlyphRecord::new(source_codepoint, mapped_codepoint, font_index, raster.bitmap)
        }
    }

    pub fn encoding(&self) -> BitmapEncoding {
        self.compressed
            .as_ref()
            .map_or(BitmapEncoding::Raw, |compressed| compressed.encoding)
    }

    /// The bytes that end up in the bitmap blob.
    pub fn stored_bytes(&self) -> &[u8] {
        self.compressed
            .as_ref()
            .map_or(&self.packed, |compressed| &compressed.data)
    }

    /// Advance width in 12.4 fixed point.
    pub fn advance_fp(&self) -> u16 {
        (self.advance * 16.0).round().clamp(0.0, u16::MAX as f32) as u16
    }

    /// Bottom edge of the bitmap relative to the baseline, positive up.
    pub fn offset_y(&self) -> i16 {
        self.bearing_y.saturating_sub_unsigned(self.bitmap.height())
    }
}
