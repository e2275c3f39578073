//! LVGL C source output (`lv_font_fmt_txt`).

use std::fmt::Write;

use crate::{
    cmap::{CmapFormat, CmapSubtable},
    compress::BitmapEncoding,
    font::CompiledFont,
    kern::{KerningClasses, KerningPairs, KerningTable},
};

/// Bytes per line in the emitted bitmap arrays.
const BYTES_PER_LINE: usize = 16;

/// Settings that only affect the C output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceOptions {
    /// Header to include when `lvgl.h` isn't on the include path.
    pub lv_include: Option<String>,
    /// Name of an `lv_font_t` to fall back to for missing glyphs.
    pub fallback: Option<String>,
    /// Conversion settings, echoed in the file banner.
    pub command_line: Option<String>,
}

/// Renders `font` as a C source file.
pub fn to_c_source(font: &CompiledFont, options: &SourceOptions) -> String {
    let unified;
    let font = match font.uniform_encoding() {
        Some(_) => font,
        None => {
            let encoding = if font.compression.prefilter {
                BitmapEncoding::RlePrefiltered
            } else {
                BitmapEncoding::Rle
            };
            log::debug!("storing every glyph as {encoding:?} for LVGL");
            match font.with_encoding(encoding) {
                Some(font) => {
                    unified = font;
                    &unified
                }
                None => {
                    log::warn!("failed to re-encode glyphs, bitmap format will be inconsistent");
                    font
                }
            }
        }
    };
    if !font.has_reserved_glyph && !font.glyphs.is_empty() {
        log::warn!("LVGL never draws glyph id 0, U+{:04X} will be unreachable", font.glyphs[0].codepoint);
    }

    let mut out = String::new();
    write_source(&mut out, font, options).expect("formatting into a String cannot fail");
    out
}

fn write_source(out: &mut String, font: &CompiledFont, options: &SourceOptions) -> std::fmt::Result {
    let guard = font.name.to_uppercase();
    write_banner(out, font, options)?;
    writeln!(out)?;
    writeln!(out, "#ifndef {guard}")?;
    writeln!(out, "#define {guard} 1")?;
    writeln!(out, "#endif")?;
    writeln!(out)?;
    writeln!(out, "#if {guard}")?;
    writeln!(out)?;
    write_bitmaps(out, font)?;
    write_glyph_dsc(out, font)?;
    write_cmaps(out, font)?;
    match &font.kerning.table {
        Some(KerningTable::Pairs(pairs)) => write_kern_pairs(out, pairs, font.glyph_count())?,
        Some(KerningTable::Classes(classes)) => write_kern_classes(out, classes)?,
        None => (),
    }
    write_font_dsc(out, font)?;
    write_public_font(out, font, options)?;
    writeln!(out)?;
    writeln!(out, "#endif /*#if {guard}*/")
}

fn write_banner(out: &mut String, font: &CompiledFont, options: &SourceOptions) -> std::fmt::Result {
    let metrics = &font.metrics;
    writeln!(out, "/*******************************************************************************")?;
    writeln!(out, " * Size: {} px", metrics.pixel_size)?;
    writeln!(out, " * Bpp: {}", metrics.bit_depth.bits())?;
    if let Some(command_line) = &options.command_line {
        writeln!(out, " * Opts: {command_line}")?;
    }
    writeln!(out, " ******************************************************************************/")?;
    writeln!(out)?;
    let lv_include = options.lv_include.as_deref().unwrap_or("lvgl/lvgl.h");
    write!(
        out,
        r#"#ifdef __has_include
    #if __has_include("lvgl.h")
        #ifndef LV_LVGL_H_INCLUDE_SIMPLE
            #define LV_LVGL_H_INCLUDE_SIMPLE
        #endif
    #endif
#endif

#ifdef LV_LVGL_H_INCLUDE_SIMPLE
    #include "lvgl.h"
#else
    #include "{lv_include}"
#endif
"#
    )
}

fn section_comment(out: &mut String, title: &str) -> std::fmt::Result {
    writeln!(out, "/*-----------------")?;
    writeln!(out, " *    {title}")?;
    writeln!(out, " *----------------*/")?;
    writeln!(out)
}

fn glyph_comment(codepoint: u32) -> String {
    match char::from_u32(codepoint) {
        Some(ch) if !ch.is_control() && !ch.is_whitespace() => {
            format!("U+{codepoint:04X} \"{ch}\"")
        }
        _ => format!("U+{codepoint:04X}"),
    }
}

fn write_bytes(
    out: &mut String,
    values: impl IntoIterator<Item = String>,
    per_line: usize,
) -> std::fmt::Result {
    let values: Vec<String> = values.into_iter().collect();
    for line in values.chunks(per_line) {
        writeln!(out, "    {},", line.join(", "))?;
    }
    Ok(())
}

fn write_bitmaps(out: &mut String, font: &CompiledFont) -> std::fmt::Result {
    section_comment(out, "BITMAPS")?;
    writeln!(out, "/*Store the image of the glyphs*/")?;
    writeln!(out, "static LV_ATTRIBUTE_LARGE_CONST const uint8_t glyph_bitmap[] = {{")?;
    for (index, glyph) in font.glyphs.iter().enumerate() {
        let Some(data) = font.glyph_data(index as u16).filter(|data| !data.is_empty()) else {
            continue;
        };
        if index == 0 && font.has_reserved_glyph {
            writeln!(out, "    /* missing glyph */")?;
        } else {
            writeln!(out, "    /* {} */", glyph_comment(glyph.codepoint))?;
        }
        write_bytes(out, data.iter().map(|byte| format!("0x{byte:02x}")), BYTES_PER_LINE)?;
        writeln!(out)?;
    }
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_glyph_dsc(out: &mut String, font: &CompiledFont) -> std::fmt::Result {
    section_comment(out, "GLYPH DESCRIPTION")?;
    writeln!(out, "static const lv_font_fmt_txt_glyph_dsc_t glyph_dsc[] = {{")?;
    let last = font.glyphs.len().saturating_sub(1);
    for (index, glyph) in font.glyphs.iter().enumerate() {
        let separator = if index == last { "" } else { "," };
        let comment = if index == 0 && font.has_reserved_glyph {
            "id = 0 reserved".to_string()
        } else {
            glyph_comment(glyph.codepoint)
        };
        writeln!(
            out,
            "    {{.bitmap_index = {}, .adv_w = {}, .box_w = {}, .box_h = {}, .ofs_x = {}, .ofs_y = {}}}{separator} /* {comment} */",
            glyph.bitmap_offset,
            glyph.advance,
            glyph.box_width,
            glyph.box_height,
            glyph.offset_x,
            glyph.offset_y,
        )?;
    }
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_cmap_lists(out: &mut String, index: usize, subtable: &CmapSubtable) -> std::fmt::Result {
    if subtable.format.is_sparse() {
        writeln!(out, "static const uint16_t unicode_list_{index}[] = {{")?;
        write_bytes(
            out,
            subtable.unicode_list.iter().map(|offset| format!("0x{offset:x}")),
            8,
        )?;
        writeln!(out, "}};")?;
        writeln!(out)?;
    }
    if subtable.format.has_glyph_offsets() {
        let ty = match subtable.format {
            CmapFormat::Format0Full => "uint8_t",
            _ => "uint16_t",
        };
        writeln!(out, "static const {ty} glyph_id_ofs_list_{index}[] = {{")?;
        write_bytes(
            out,
            subtable.glyph_id_ofs_list.iter().map(|offset| offset.to_string()),
            16,
        )?;
        writeln!(out, "}};")?;
        writeln!(out)?;
    }
    Ok(())
}

fn write_cmaps(out: &mut String, font: &CompiledFont) -> std::fmt::Result {
    section_comment(out, "CHARACTER MAPPING")?;
    for (index, subtable) in font.cmap.subtables().iter().enumerate() {
        write_cmap_lists(out, index, subtable)?;
    }
    writeln!(out, "/*Collect the unicode lists and glyph_id offsets*/")?;
    writeln!(out, "static const lv_font_fmt_txt_cmap_t cmaps[] =")?;
    writeln!(out, "{{")?;
    let subtables = font.cmap.subtables();
    for (index, subtable) in subtables.iter().enumerate() {
        let unicode_list = if subtable.format.is_sparse() {
            format!("unicode_list_{index}")
        } else {
            "NULL".to_string()
        };
        let glyph_id_ofs_list = if subtable.format.has_glyph_offsets() {
            format!("glyph_id_ofs_list_{index}")
        } else {
            "NULL".to_string()
        };
        let list_length = if subtable.format.is_sparse() || subtable.format.has_glyph_offsets() {
            subtable.list_length()
        } else {
            0
        };
        writeln!(out, "    {{")?;
        writeln!(
            out,
            "        .range_start = {}, .range_length = {}, .glyph_id_start = {},",
            subtable.range_start, subtable.range_length, subtable.glyph_id_start
        )?;
        writeln!(
            out,
            "        .unicode_list = {unicode_list}, .glyph_id_ofs_list = {glyph_id_ofs_list}, .list_length = {list_length}, .type = {}",
            subtable.format.lvgl_name()
        )?;
        let separator = if index + 1 == subtables.len() { "" } else { "," };
        writeln!(out, "    }}{separator}")?;
    }
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_kern_pairs(out: &mut String, pairs: &KerningPairs, glyph_count: usize) -> std::fmt::Result {
    let (id_type, ids_size) = if glyph_count <= 256 {
        ("uint8_t", 0)
    } else {
        ("uint16_t", 1)
    };
    section_comment(out, "KERNING")?;
    writeln!(out, "/*Pair left and right glyphs for kerning*/")?;
    writeln!(out, "static const {id_type} kern_pair_glyph_ids[] =")?;
    writeln!(out, "{{")?;
    write_bytes(
        out,
        pairs
            .pairs
            .iter()
            .map(|pair| format!("{}, {}", pair.left, pair.right)),
        6,
    )?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "/* Kerning between the respective left and right glyphs")?;
    writeln!(out, " * 4.4 format which needs to scaled with `kern_scale`*/")?;
    writeln!(out, "static const int8_t kern_pair_values[] =")?;
    writeln!(out, "{{")?;
    write_bytes(out, pairs.pairs.iter().map(|pair| pair.value.to_string()), 16)?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "/*Collect the kern pair's data in one place*/")?;
    writeln!(out, "static const lv_font_fmt_txt_kern_pair_t kern_pairs =")?;
    writeln!(out, "{{")?;
    writeln!(out, "    .glyph_ids = kern_pair_glyph_ids,")?;
    writeln!(out, "    .values = kern_pair_values,")?;
    writeln!(out, "    .pair_cnt = {},", pairs.pairs.len())?;
    writeln!(out, "    .glyph_ids_size = {ids_size}")?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_kern_classes(out: &mut String, classes: &KerningClasses) -> std::fmt::Result {
    section_comment(out, "KERNING")?;
    writeln!(out, "/*Map glyph_ids to kern left classes*/")?;
    writeln!(out, "static const uint8_t kern_left_class_mapping[] =")?;
    writeln!(out, "{{")?;
    write_bytes(out, classes.left_mapping.iter().map(u8::to_string), 16)?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "/*Map glyph_ids to kern right classes*/")?;
    writeln!(out, "static const uint8_t kern_right_class_mapping[] =")?;
    writeln!(out, "{{")?;
    write_bytes(out, classes.right_mapping.iter().map(u8::to_string), 16)?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "/*Kern values between classes*/")?;
    writeln!(out, "static const int8_t kern_class_values[] =")?;
    writeln!(out, "{{")?;
    write_bytes(
        out,
        classes.values.iter().map(i8::to_string),
        classes.right_count.max(1) as usize,
    )?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out, "/*Collect the kern class' data in one place*/")?;
    writeln!(out, "static const lv_font_fmt_txt_kern_classes_t kern_classes =")?;
    writeln!(out, "{{")?;
    writeln!(out, "    .class_pair_values   = kern_class_values,")?;
    writeln!(out, "    .left_class_mapping  = kern_left_class_mapping,")?;
    writeln!(out, "    .right_class_mapping = kern_right_class_mapping,")?;
    writeln!(out, "    .left_class_cnt      = {},", classes.left_count)?;
    writeln!(out, "    .right_class_cnt     = {},", classes.right_count)?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_font_dsc(out: &mut String, font: &CompiledFont) -> std::fmt::Result {
    let (kern_dsc, kern_classes) = match &font.kerning.table {
        Some(KerningTable::Pairs(_)) => ("&kern_pairs", 0),
        Some(KerningTable::Classes(_)) => ("&kern_classes", 1),
        None => ("NULL", 0),
    };
    let kern_scale = if font.kerning.is_empty() {
        0
    } else {
        font.kerning.scale
    };
    let bitmap_format = font.uniform_encoding().unwrap_or_default();

    writeln!(out, "/*--------------------")?;
    writeln!(out, " *  ALL CUSTOM DATA")?;
    writeln!(out, " *--------------------*/")?;
    writeln!(out)?;
    writeln!(out, "#if LVGL_VERSION_MAJOR == 8")?;
    writeln!(out, "/*Store all the custom data of the font*/")?;
    writeln!(out, "static  lv_font_fmt_txt_glyph_cache_t cache;")?;
    writeln!(out, "#endif")?;
    writeln!(out)?;
    writeln!(out, "#if LVGL_VERSION_MAJOR >= 8")?;
    writeln!(out, "static const lv_font_fmt_txt_dsc_t font_dsc = {{")?;
    writeln!(out, "#else")?;
    writeln!(out, "static lv_font_fmt_txt_dsc_t font_dsc = {{")?;
    writeln!(out, "#endif")?;
    writeln!(out, "    .glyph_bitmap = glyph_bitmap,")?;
    writeln!(out, "    .glyph_dsc = glyph_dsc,")?;
    writeln!(out, "    .cmaps = cmaps,")?;
    writeln!(out, "    .kern_dsc = {kern_dsc},")?;
    writeln!(out, "    .kern_scale = {kern_scale},")?;
    writeln!(out, "    .cmap_num = {},", font.cmap.len())?;
    writeln!(out, "    .bpp = {},", font.bit_depth().bits())?;
    writeln!(out, "    .kern_classes = {kern_classes},")?;
    writeln!(out, "    .bitmap_format = {},", bitmap_format as u8)?;
    writeln!(out, "#if LVGL_VERSION_MAJOR == 8")?;
    writeln!(out, "    .cache = &cache")?;
    writeln!(out, "#endif")?;
    writeln!(out, "}};")?;
    writeln!(out)?;
    writeln!(out)
}

fn write_public_font(out: &mut String, font: &CompiledFont, options: &SourceOptions) -> std::fmt::Result {
    let metrics = &font.metrics;
    let fallback = match &options.fallback {
        Some(name) => {
            writeln!(out, "extern const lv_font_t {name};")?;
            writeln!(out)?;
            format!("&{name}")
        }
        None => "NULL".to_string(),
    };
    section_comment(out, "PUBLIC FONT")?;
    writeln!(out, "/*Initialize a public general font descriptor*/")?;
    writeln!(out, "#if LVGL_VERSION_MAJOR >= 8")?;
    writeln!(out, "const lv_font_t {} = {{", font.name)?;
    writeln!(out, "#else")?;
    writeln!(out, "lv_font_t {} = {{", font.name)?;
    writeln!(out, "#endif")?;
    writeln!(out, "    .get_glyph_dsc = lv_font_get_glyph_dsc_fmt_txt,    /*Function pointer to get glyph's data*/")?;
    writeln!(out, "    .get_glyph_bitmap = lv_font_get_bitmap_fmt_txt,    /*Function pointer to get glyph's bitmap*/")?;
    writeln!(out, "    .line_height = {},          /*The maximum line height required by the font*/", metrics.line_height)?;
    writeln!(out, "    .base_line = {},             /*Baseline measured from the bottom of the line*/", metrics.base_line())?;
    writeln!(out, "#if !(LVGL_VERSION_MAJOR == 6 && LVGL_VERSION_MINOR == 0)")?;
    writeln!(out, "    .subpx = LV_FONT_SUBPX_NONE,")?;
    writeln!(out, "#endif")?;
    writeln!(out, "#if LV_VERSION_CHECK(7, 4, 0) || LVGL_VERSION_MAJOR >= 8")?;
    writeln!(out, "    .underline_position = {},", metrics.underline_position)?;
    writeln!(out, "    .underline_thickness = {},", metrics.underline_thickness)?;
    writeln!(out, "#endif")?;
    writeln!(out, "    .dsc = &font_dsc,          /*The custom font data. Will be accessed by `get_glyph_bitmap/dsc` */")?;
    writeln!(out, "#if LV_VERSION_CHECK(8, 2, 0) || LVGL_VERSION_MAJOR >= 9")?;
    writeln!(out, "    .fallback = {fallback},")?;
    writeln!(out, "#endif")?;
    writeln!(out, "    .user_data = NULL,")?;
    writeln!(out, "}};")
}
