//! The packed binary container.
//!
//! All integers are little-endian. The file starts with a fixed 64 byte
//! header followed by four sections, each located by an offset/length pair
//! in the header:
//!
//! ```text
//! 0   magic "LVFB"           u8[4]
//! 4   version                u16
//! 6   header length          u16
//! 8   bits per pixel         u8
//! 9   flags                  u8
//! 10  pixel size             u16
//! 12  ascent                 u16
//! 14  descent                u16
//! 16  line height            u16
//! 18  baseline offset        u16   from the top of the line box
//! 20  underline position     i16
//! 22  underline thickness    u16
//! 24  glyph count            u32
//! 28  cmap subtable count    u16
//! 30  kern scale             u16   12.4 fixed point
//! 32  cmap                   (offset u32, length u32)
//! 40  glyph descriptors      (offset u32, length u32)
//! 48  bitmap blob            (offset u32, length u32)
//! 56  kerning                (offset u32, length u32)
//! ```
//!
//! The cmap section holds one 16 byte record per subtable, followed by the
//! subtable lists. Glyph descriptors are 20 bytes each. The kerning section
//! is empty when the font has no kerning.

use thiserror::Error;

use crate::{
    bitmap::BitDepth,
    cmap::{CharacterMap, CmapFormat, CmapSubtable},
    compress::{BitmapEncoding, CompressionOptions},
    font::{CompiledFont, GlyphDescriptor},
    kern::{Kerning, KerningClasses, KerningPair, KerningPairs, KerningTable},
    metrics::FontMetrics,
};

use super::{Cursor, TableWriter};

pub const MAGIC: [u8; 4] = *b"LVFB";
pub const VERSION: u16 = 1;
pub const HEADER_LEN: usize = 64;
pub const CMAP_RECORD_LEN: usize = 16;
pub const GLYPH_DESCRIPTOR_LEN: usize = 20;
const KERN_HEADER_LEN: usize = 8;

const KERN_KIND_PAIRS: u8 = 1;
const KERN_KIND_CLASSES: u8 = 2;

/// Bits of the header's flags byte.
pub mod flags {
    /// At least one glyph is stored compressed.
    pub const COMPRESSED: u8 = 1 << 0;
    pub const KERNING: u8 = 1 << 1;
    pub const KERNING_CLASSES: u8 = 1 << 2;
    /// Glyph 0 is the missing glyph.
    pub const RESERVED_GLYPH: u8 = 1 << 3;
}

/// An error encountered while reading a binary font.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReadError {
    #[error("Not a binary font: bad magic")]
    BadMagic,
    #[error("Unsupported format version {0}")]
    UnsupportedVersion(u16),
    #[error("Unexpected end of data in {0}")]
    Truncated(&'static str),
    #[error("Invalid {0}")]
    InvalidValue(&'static str),
}

/// Location of a section relative to the start of the file.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Section {
    pub offset: u32,
    pub len: u32,
}

impl Section {
    fn slice<'a>(&self, data: &'a [u8], name: &'static str) -> Result<&'a [u8], ReadError> {
        let start = self.offset as usize;
        data.get(start..start + self.len as usize)
            .ok_or(ReadError::Truncated(name))
    }
}

/// The fixed size file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub bpp: u8,
    pub flags: u8,
    pub pixel_size: u16,
    pub ascent: u16,
    pub descent: u16,
    pub line_height: u16,
    pub baseline_offset: u16,
    pub underline_position: i16,
    pub underline_thickness: u16,
    pub glyph_count: u32,
    pub cmap_count: u16,
    pub kern_scale: u16,
    pub cmap: Section,
    pub glyphs: Section,
    pub bitmap: Section,
    pub kerning: Section,
}

impl Header {
    fn write(&self, writer: &mut TableWriter) {
        writer.write_slice(&MAGIC);
        writer.write_u16(self.version);
        writer.write_u16(HEADER_LEN as u16);
        writer.write_u8(self.bpp);
        writer.write_u8(self.flags);
        writer.write_u16(self.pixel_size);
        writer.write_u16(self.ascent);
        writer.write_u16(self.descent);
        writer.write_u16(self.line_height);
        writer.write_u16(self.baseline_offset);
        writer.write_i16(self.underline_position);
        writer.write_u16(self.underline_thickness);
        writer.write_u32(self.glyph_count);
        writer.write_u16(self.cmap_count);
        writer.write_u16(self.kern_scale);
        for section in [self.cmap, self.glyphs, self.bitmap, self.kerning] {
            writer.write_u32(section.offset);
            writer.write_u32(section.len);
        }
    }

    pub fn read(data: &[u8]) -> Result<Self, ReadError> {
        let truncated = ReadError::Truncated("header");
        let mut cursor = Cursor::new(data);
        if cursor.read_array::<4>().ok_or(truncated.clone())? != MAGIC {
            return Err(ReadError::BadMagic);
        }
        let version = cursor.read_u16().ok_or(truncated.clone())?;
        if version != VERSION {
            return Err(ReadError::UnsupportedVersion(version));
        }
        let header_len = cursor.read_u16().ok_or(truncated.clone())?;
        if (header_len as usize) < HEADER_LEN {
            return Err(ReadError::InvalidValue("header length"));
        }
        let mut read = || -> Option<Header> {
            let mut header = Header {
                version,
                bpp: cursor.read_u8()?,
                flags: cursor.read_u8()?,
                pixel_size: cursor.read_u16()?,
                ascent: cursor.read_u16()?,
                descent: cursor.read_u16()?,
                line_height: cursor.read_u16()?,
                baseline_offset: cursor.read_u16()?,
                underline_position: cursor.read_i16()?,
                underline_thickness: cursor.read_u16()?,
                glyph_count: cursor.read_u32()?,
                cmap_count: cursor.read_u16()?,
                kern_scale: cursor.read_u16()?,
                cmap: Section::default(),
                glyphs: Section::default(),
                bitmap: Section::default(),
                kerning: Section::default(),
            };
            for section in [
                &mut header.cmap,
                &mut header.glyphs,
                &mut header.bitmap,
                &mut header.kerning,
            ] {
                section.offset = cursor.read_u32()?;
                section.len = cursor.read_u32()?;
            }
            Some(header)
        };
        read().ok_or(truncated)
    }
}

/// Serializes a font into the binary container.
pub fn to_bytes(font: &CompiledFont) -> Vec<u8> {
    let cmap = write_cmap(&font.cmap);
    let glyphs = write_glyphs(&font.glyphs);
    let kerning = write_kerning(&font.kerning, font.glyph_count());

    let mut offset = HEADER_LEN as u32;
    let mut section = |len: usize| {
        let section = Section {
            offset,
            len: len as u32,
        };
        offset += len as u32;
        section
    };
    let metrics = &font.metrics;
    let mut flag_bits = 0;
    if font.has_compressed_glyphs() {
        flag_bits |= flags::COMPRESSED;
    }
    match &font.kerning.table {
        Some(KerningTable::Pairs(_)) => flag_bits |= flags::KERNING,
        Some(KerningTable::Classes(_)) => flag_bits |= flags::KERNING | flags::KERNING_CLASSES,
        None => (),
    }
    if font.has_reserved_glyph {
        flag_bits |= flags::RESERVED_GLYPH;
    }
    let header = Header {
        version: VERSION,
        bpp: metrics.bit_depth.bits(),
        flags: flag_bits,
        pixel_size: metrics.pixel_size,
        ascent: metrics.ascent,
        descent: metrics.descent,
        line_height: metrics.line_height,
        baseline_offset: metrics.baseline_offset,
        underline_position: metrics.underline_position,
        underline_thickness: metrics.underline_thickness,
        glyph_count: font.glyph_count() as u32,
        cmap_count: font.cmap.len() as u16,
        kern_scale: font.kerning.scale,
        cmap: section(cmap.len()),
        glyphs: section(glyphs.len()),
        bitmap: section(font.bitmap.len()),
        kerning: section(kerning.len()),
    };

    let mut writer = TableWriter::default();
    header.write(&mut writer);
    debug_assert_eq!(writer.len(), HEADER_LEN);
    writer.write_slice(&cmap);
    writer.write_slice(&glyphs);
    writer.write_slice(&font.bitmap);
    writer.write_slice(&kerning);
    writer.into_inner()
}

fn write_cmap(cmap: &CharacterMap) -> Vec<u8> {
    let mut records = TableWriter::default();
    let mut lists = TableWriter::default();
    let lists_start = cmap.len() * CMAP_RECORD_LEN;
    for subtable in cmap.subtables() {
        records.write_u32(subtable.range_start);
        records.write_u16(subtable.range_length);
        records.write_u16(subtable.glyph_id_start);
        records.write_u16(subtable.list_length() as u16);
        records.write_u8(subtable.format as u8);
        records.write_u8(0);
        records.write_u32((lists_start + lists.len()) as u32);
        for offset in &subtable.unicode_list {
            lists.write_u16(*offset);
        }
        match subtable.format {
            CmapFormat::Format0Full => subtable
                .glyph_id_ofs_list
                .iter()
                .for_each(|offset| lists.write_u8(*offset as u8)),
            CmapFormat::SparseFull => subtable
                .glyph_id_ofs_list
                .iter()
                .for_each(|offset| lists.write_u16(*offset)),
            _ => (),
        }
    }
    let mut out = records.into_inner();
    out.extend(lists.into_inner());
    out
}

fn write_glyphs(glyphs: &[GlyphDescriptor]) -> Vec<u8> {
    let mut writer = TableWriter::default();
    for glyph in glyphs {
        writer.write_u32(glyph.bitmap_offset);
        writer.write_u32(glyph.bitmap_len);
        writer.write_u16(glyph.advance);
        writer.write_u16(glyph.box_width);
        writer.write_u16(glyph.box_height);
        writer.write_i16(glyph.offset_x);
        writer.write_i16(glyph.offset_y);
        writer.write_u8(glyph.encoding as u8);
        writer.write_u8(0);
    }
    writer.into_inner()
}

fn write_kerning(kerning: &Kerning, glyph_count: usize) -> Vec<u8> {
    let mut writer = TableWriter::default();
    match &kerning.table {
        None => (),
        Some(KerningTable::Pairs(pairs)) => {
            writer.write_u8(KERN_KIND_PAIRS);
            writer.write_u8(0);
            writer.write_u16(kerning.scale);
            writer.write_u32(pairs.pairs.len() as u32);
            for pair in &pairs.pairs {
                writer.write_u16(pair.left);
                writer.write_u16(pair.right);
                writer.write_i8(pair.value);
            }
        }
        Some(KerningTable::Classes(classes)) => {
            writer.write_u8(KERN_KIND_CLASSES);
            writer.write_u8(0);
            writer.write_u16(kerning.scale);
            writer.write_u16(classes.left_count as u16);
            writer.write_u16(classes.right_count as u16);
            debug_assert_eq!(classes.left_mapping.len(), glyph_count);
            writer.write_slice(&classes.left_mapping);
            writer.write_slice(&classes.right_mapping);
            for value in &classes.values {
                writer.write_i8(*value);
            }
        }
    }
    writer.into_inner()
}

/// Reads a font written by [`to_bytes`].
///
/// The font name is not stored in the container and is left empty.
pub fn from_bytes(data: &[u8]) -> Result<CompiledFont, ReadError> {
    let header = Header::read(data)?;
    let bit_depth =
        BitDepth::new(header.bpp).map_err(|_| ReadError::InvalidValue("bits per pixel"))?;
    let metrics = FontMetrics {
        bit_depth,
        pixel_size: header.pixel_size,
        ascent: header.ascent,
        descent: header.descent,
        line_height: header.line_height,
        baseline_offset: header.baseline_offset,
        underline_position: header.underline_position,
        underline_thickness: header.underline_thickness,
    };
    let cmap = read_cmap(header.cmap.slice(data, "cmap")?, header.cmap_count)?;
    let glyphs = read_glyphs(
        header.glyphs.slice(data, "glyph descriptors")?,
        header.glyph_count,
    )?;
    let bitmap = header.bitmap.slice(data, "bitmap")?.to_vec();
    if glyphs
        .iter()
        .any(|glyph| glyph.bitmap_offset as usize + glyph.bitmap_len as usize > bitmap.len())
    {
        return Err(ReadError::Truncated("bitmap"));
    }
    let kerning = read_kerning(
        header.kerning.slice(data, "kerning")?,
        header.glyph_count as usize,
    )?;
    let compressed = header.flags & flags::COMPRESSED != 0;
    Ok(CompiledFont {
        name: String::new(),
        metrics,
        glyphs,
        bitmap,
        cmap,
        kerning,
        has_reserved_glyph: header.flags & flags::RESERVED_GLYPH != 0,
        compression: CompressionOptions {
            enabled: compressed,
            prefilter: compressed,
        },
    })
}

fn read_cmap(data: &[u8], count: u16) -> Result<CharacterMap, ReadError> {
    const NAME: &str = "cmap";
    let mut records = Cursor::new(data);
    (0..count)
        .map(|_| {
            let truncated = ReadError::Truncated(NAME);
            let range_start = records.read_u32().ok_or(truncated.clone())?;
            let range_length = records.read_u16().ok_or(truncated.clone())?;
            let glyph_id_start = records.read_u16().ok_or(truncated.clone())?;
            let list_length = records.read_u16().ok_or(truncated.clone())? as usize;
            let format = records
                .read_u8()
                .and_then(CmapFormat::from_u8)
                .ok_or(ReadError::InvalidValue("cmap format"))?;
            records.read_u8().ok_or(truncated.clone())?;
            let data_offset = records.read_u32().ok_or(truncated.clone())? as usize;

            let mut lists = Cursor::new(data.get(data_offset..).ok_or(truncated.clone())?);
            let unicode_list = if format.is_sparse() {
                (0..list_length)
                    .map(|_| lists.read_u16())
                    .collect::<Option<Vec<_>>>()
                    .ok_or(truncated.clone())?
            } else {
                Vec::new()
            };
            let glyph_id_ofs_list = match format {
                CmapFormat::Format0Full => (0..list_length)
                    .map(|_| lists.read_u8().map(u16::from))
                    .collect::<Option<Vec<_>>>(),
                CmapFormat::SparseFull => (0..list_length)
                    .map(|_| lists.read_u16())
                    .collect::<Option<Vec<_>>>(),
                _ => Some(Vec::new()),
            }
            .ok_or(truncated)?;
            Ok(CmapSubtable {
                range_start,
                range_length,
                glyph_id_start,
                format,
                unicode_list,
                glyph_id_ofs_list,
            })
        })
        .collect()
}

fn read_glyphs(data: &[u8], count: u32) -> Result<Vec<GlyphDescriptor>, ReadError> {
    let mut cursor = Cursor::new(data);
    (0..count)
        .map(|_| {
            let mut read = || -> Option<GlyphDescriptor> {
                let glyph = GlyphDescriptor {
                    codepoint: 0,
                    bitmap_offset: cursor.read_u32()?,
                    bitmap_len: cursor.read_u32()?,
                    advance: cursor.read_u16()?,
                    box_width: cursor.read_u16()?,
                    box_height: cursor.read_u16()?,
                    offset_x: cursor.read_i16()?,
                    offset_y: cursor.read_i16()?,
                    encoding: BitmapEncoding::from_u8(cursor.read_u8()?)?,
                };
                cursor.read_u8()?;
                Some(glyph)
            };
            read().ok_or(ReadError::Truncated("glyph descriptors"))
        })
        .collect()
}

fn read_kerning(data: &[u8], glyph_count: usize) -> Result<Kerning, ReadError> {
    if data.is_empty() {
        return Ok(Kerning::default());
    }
    let truncated = ReadError::Truncated("kerning");
    if data.len() < KERN_HEADER_LEN {
        return Err(truncated);
    }
    let mut cursor = Cursor::new(data);
    let kind = cursor.read_u8().ok_or(truncated.clone())?;
    cursor.read_u8().ok_or(truncated.clone())?;
    let scale = cursor.read_u16().ok_or(truncated.clone())?;
    let table = match kind {
        KERN_KIND_PAIRS => {
            let count = cursor.read_u32().ok_or(truncated.clone())?;
            let pairs = (0..count)
                .map(|_| {
                    Some(KerningPair {
                        left: cursor.read_u16()?,
                        right: cursor.read_u16()?,
                        value: cursor.read_i8()?,
                    })
                })
                .collect::<Option<Vec<_>>>()
                .ok_or(truncated)?;
            KerningTable::Pairs(KerningPairs { pairs })
        }
        KERN_KIND_CLASSES => {
            let mut read = || -> Option<KerningClasses> {
                let left_count = u8::try_from(cursor.read_u16()?).ok()?;
                let right_count = u8::try_from(cursor.read_u16()?).ok()?;
                let left_mapping = cursor.read_slice(glyph_count)?.to_vec();
                let right_mapping = cursor.read_slice(glyph_count)?.to_vec();
                let values = cursor
                    .read_slice(left_count as usize * right_count as usize)?
                    .iter()
                    .map(|value| *value as i8)
                    .collect();
                Some(KerningClasses {
                    left_mapping,
                    right_mapping,
                    left_count,
                    right_count,
                    values,
                })
            };
            KerningTable::Classes(read().ok_or(truncated)?)
        }
        _ => return Err(ReadError::InvalidValue("kerning kind")),
    };
    Ok(Kerning {
        scale,
        table: Some(table),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{bitmap::Bitmap, glyph::GlyphRecord, kern::KerningBuilder, metrics::DesignMetrics};

    fn metrics() -> FontMetrics {
        FontMetrics::new(
            &DesignMetrics {
                units_per_em: 1000,
                ascent: 800.0,
                descent: -200.0,
                underline: None,
            },
            20,
            BitDepth::Four,
        )
        .unwrap()
    }

    fn two_glyph_font(kerning: Kerning) -> CompiledFont {
        let mut records = vec![
            GlyphRecord::new(0, 0, 0, Bitmap::default()),
            GlyphRecord::new(0x41, 0x41, 0, Bitmap::from_pixels(2, 1, vec![0xF, 0x1]).unwrap()),
        ];
        records[1].glyph_index = 1;
        records[1].packed = vec![0xF1];
        records[1].bearing_y = 3;
        records[1].advance = 2.0;
        let cmap = CharacterMap::from_mappings([(0, 0), (0x41, 1)]).unwrap();
        CompiledFont::assemble(
            "two",
            metrics(),
            &records,
            cmap,
            kerning,
            true,
            CompressionOptions::default(),
        )
    }

    #[test]
    fn golden_bytes() {
        let bytes = to_bytes(&two_glyph_font(Kerning::default()));
        // cmap: one sparse tiny subtable with two offsets
        let cmap_len = CMAP_RECORD_LEN + 4;
        let glyphs_len = 2 * GLYPH_DESCRIPTOR_LEN;
        assert_eq!(bytes.len(), HEADER_LEN + cmap_len + glyphs_len + 1);

        #[rustfmt::skip]
        let header: [u8; 32] = [
            b'L', b'V', b'F', b'B',
            1, 0,           // version
            64, 0,          // header length
            4,              // bpp
            flags::RESERVED_GLYPH,
            20, 0,          // pixel size
            16, 0,          // ascent
            4, 0,           // descent
            20, 0,          // line height
            16, 0,          // baseline offset
            0, 0, 0, 0,     // underline
            2, 0, 0, 0,     // glyph count
            1, 0,           // cmap count
            16, 0,          // kern scale
        ];
        assert_eq!(bytes[..32], header);

        let header = Header::read(&bytes).unwrap();
        assert_eq!(header.cmap, Section { offset: 64, len: cmap_len as u32 });
        assert_eq!(
            header.bitmap,
            Section {
                offset: (64 + cmap_len + glyphs_len) as u32,
                len: 1
            }
        );
        assert_eq!(header.kerning.len, 0);

        #[rustfmt::skip]
        let cmap: [u8; 20] = [
            0, 0, 0, 0,     // range start
            0x42, 0,        // range length
            0, 0,           // glyph id start
            2, 0,           // list length
            CmapFormat::SparseTiny as u8, 0,
            16, 0, 0, 0,    // list offset
            0, 0, 0x41, 0,  // unicode list
        ];
        assert_eq!(bytes[64..84], cmap);

        #[rustfmt::skip]
        let glyph: [u8; 20] = [
            0, 0, 0, 0,     // bitmap offset
            1, 0, 0, 0,     // bitmap length
            32, 0,          // advance
            2, 0, 1, 0,     // box
            0, 0, 2, 0,     // offsets
            0, 0,           // raw
        ];
        assert_eq!(bytes[104..124], glyph);
        assert_eq!(bytes[124], 0xF1);
    }

    #[test]
    fn reads_back() {
        let mut builder = KerningBuilder::new(2);
        builder.add(1, 1, -1.5);
        let font = two_glyph_font(builder.build());
        let bytes = to_bytes(&font);
        let header = Header::read(&bytes).unwrap();
        assert_eq!(header.flags, flags::RESERVED_GLYPH | flags::KERNING);

        let read = from_bytes(&bytes).unwrap();
        assert_eq!(read.metrics, font.metrics);
        assert_eq!(read.cmap, font.cmap);
        assert_eq!(read.bitmap, font.bitmap);
        assert_eq!(read.kerning, font.kerning);
        assert_eq!(read.kerning.adjust(1, 1), -1.5);
        assert!(read.has_reserved_glyph);
        for (read, written) in read.glyphs.iter().zip(&font.glyphs) {
            assert_eq!(
                GlyphDescriptor {
                    codepoint: written.codepoint,
                    ..read.clone()
                },
                *written
            );
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(from_bytes(b"LVF").unwrap_err(), ReadError::Truncated("header"));
        assert_eq!(
            from_bytes(&[0u8; 64]).unwrap_err(),
            ReadError::BadMagic
        );
        let mut bytes = to_bytes(&two_glyph_font(Kerning::default()));
        bytes[4] = 9;
        assert_eq!(
            from_bytes(&bytes).unwrap_err(),
            ReadError::UnsupportedVersion(9)
        );
        let bytes = to_bytes(&two_glyph_font(Kerning::default()));
        assert_eq!(
            from_bytes(&bytes[..100]).unwrap_err(),
            ReadError::Truncated("glyph descriptors")
        );
    }
}
