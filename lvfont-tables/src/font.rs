//! The in-memory form of a compiled font, shared by all writers.

use crate::{
    bitmap::{BitDepth, Bitmap},
    cmap::CharacterMap,
    compress::{self, BitmapEncoding, CompressionOptions},
    glyph::GlyphRecord,
    kern::Kerning,
    metrics::FontMetrics,
    pack,
};

/// Placement and storage of one glyph, LVGL's `lv_font_fmt_txt_glyph_dsc_t`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct GlyphDescriptor {
    /// The codepoint the glyph is mapped to; informational only.
    pub codepoint: u32,
    /// Offset of the glyph's bytes in the bitmap blob.
    pub bitmap_offset: u32,
    pub bitmap_len: u32,
    /// Advance width, 12.4 fixed point.
    pub advance: u16,
    pub box_width: u16,
    pub box_height: u16,
    /// Left edge relative to the pen position.
    pub offset_x: i16,
    /// Bottom edge relative to the baseline, positive up.
    pub offset_y: i16,
    pub encoding: BitmapEncoding,
}

/// Everything the writers need to emit a font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledFont {
    pub name: String,
    pub metrics: FontMetrics,
    /// Indexed by glyph index.
    pub glyphs: Vec<GlyphDescriptor>,
    pub bitmap: Vec<u8>,
    pub cmap: CharacterMap,
    pub kerning: Kerning,
    /// Glyph 0 is the font's missing glyph rather than a real character.
    pub has_reserved_glyph: bool,
    pub compression: CompressionOptions,
}

impl CompiledFont {
    /// Lays out glyph records, which must be sorted by glyph index.
    pub fn assemble(
        name: impl Into<String>,
        metrics: FontMetrics,
        records: &[GlyphRecord],
        cmap: CharacterMap,
        kerning: Kerning,
        has_reserved_glyph: bool,
        compression: CompressionOptions,
    ) -> Self {
        debug_assert!(records
            .iter()
            .enumerate()
            .all(|(idx, record)| record.glyph_index as usize == idx));
        let mut bitmap = Vec::new();
        let glyphs = records
            .iter()
            .map(|record| {
                let bytes = record.stored_bytes();
                let descriptor = GlyphDescriptor {
                    codepoint: record.mapped_codepoint,
                    bitmap_offset: bitmap.len() as u32,
                    bitmap_len: bytes.len() as u32,
                    advance: record.advance_fp(),
                    box_width: record.bitmap.width(),
                    box_height: record.bitmap.height(),
                    offset_x: record.bearing_x,
                    offset_y: record.offset_y(),
                    encoding: record.encoding(),
                };
                bitmap.extend_from_slice(bytes);
                descriptor
            })
            .collect();
        CompiledFont {
            name: name.into(),
            metrics,
            glyphs,
            bitmap,
            cmap,
            kerning,
            has_reserved_glyph,
            compression,
        }
    }

    pub fn glyph_count(&self) -> usize {
        self.glyphs.len()
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.metrics.bit_depth
    }

    /// The descriptor of the glyph `codepoint` maps to.
    pub fn lookup(&self, codepoint: u32) -> Option<&GlyphDescriptor> {
        self.glyphs.get(self.cmap.lookup(codepoint)? as usize)
    }

    /// The stored bytes of a glyph.
    pub fn glyph_data(&self, index: u16) -> Option<&[u8]> {
        let glyph = self.glyphs.get(index as usize)?;
        let start = glyph.bitmap_offset as usize;
        self.bitmap.get(start..start + glyph.bitmap_len as usize)
    }

    /// Decodes a glyph's pixels, whatever its encoding.
    pub fn decode_glyph(&self, index: u16) -> Option<Bitmap> {
        let glyph = self.glyphs.get(index as usize)?;
        compress::decompress(
            self.glyph_data(index)?,
            glyph.encoding,
            glyph.box_width,
            glyph.box_height,
            self.bit_depth(),
        )
    }

    /// `true` if at least one glyph is stored compressed.
    pub fn has_compressed_glyphs(&self) -> bool {
        self.glyphs
            .iter()
            .any(|glyph| glyph.encoding != BitmapEncoding::Raw)
    }

    /// The encoding shared by every glyph with pixels, if they agree.
    pub fn uniform_encoding(&self) -> Option<BitmapEncoding> {
        let mut encodings = self
            .glyphs
            .iter()
            .filter(|glyph| glyph.bitmap_len > 0)
            .map(|glyph| glyph.encoding);
        let first = encodings.next().unwrap_or_default();
        encodings.all(|encoding| encoding == first).then_some(first)
    }

    /// Re-stores every glyph with `encoding`.
    ///
    /// LVGL's built-in decoder applies one format to the whole font, so
    /// fonts with mixed encodings are converted before emitting C source.
    /// Returns `None` if a stored glyph fails to decode.
    pub fn with_encoding(&self, encoding: BitmapEncoding) -> Option<CompiledFont> {
        let depth = self.bit_depth();
        let mut bitmap = Vec::with_capacity(self.bitmap.len());
        let mut glyphs = Vec::with_capacity(self.glyphs.len());
        for (index, glyph) in self.glyphs.iter().enumerate() {
            let pixels = self.decode_glyph(index as u16)?;
            let bytes = match encoding {
                _ if pixels.is_empty() => Vec::new(),
                BitmapEncoding::Raw => pack::pack(&pixels, depth),
                BitmapEncoding::Rle => {
                    compress::encode_rle(&pixels.pixels().collect::<Vec<_>>(), depth)
                }
                BitmapEncoding::RlePrefiltered => {
                    compress::encode_rle(&compress::xor_prefilter(&pixels), depth)
                }
            };
            glyphs.push(GlyphDescriptor {
                bitmap_offset: bitmap.len() as u32,
                bitmap_len: bytes.len() as u32,
                encoding,
                ..glyph.clone()
            });
            bitmap.extend(bytes);
        }
        Some(CompiledFont {
            glyphs,
            bitmap,
            ..self.clone()
        })
    }
}
