//! End to end tests against a small font assembled from raw tables.

use std::collections::BTreeMap;

use lvfont_conv::{convert, SkrifaSource};
use lvfont_tables::{
    write::binary, BitDepth, CancellationToken, FontSourceConfig, GlyphSource, JobConfig,
    OutputFormat, SkipReason,
};

const UPEM: u16 = 1000;
const ASCENT: i16 = 800;
const DESCENT: i16 = -200;

/// `(codepoint, advance, outline box as (x_min, y_min, x_max, y_max))`
const GLYPHS: &[(Option<char>, u16, Option<[i16; 4]>)] = &[
    (None, 600, Some([100, 0, 500, 700])),
    (Some(' '), 250, None),
    (Some('A'), 600, Some([50, 0, 550, 700])),
    (Some('V'), 600, Some([0, 0, 600, 700])),
    (Some('g'), 500, Some([50, -200, 450, 500])),
];

/// Kerning between `A` and `V`, in design units.
const KERN_AV: i16 = -100;

fn push_u16(data: &mut Vec<u8>, values: &[u16]) {
    for value in values {
        data.extend(value.to_be_bytes());
    }
}

fn push_i16(data: &mut Vec<u8>, values: &[i16]) {
    for value in values {
        data.extend(value.to_be_bytes());
    }
}

fn push_u32(data: &mut Vec<u8>, values: &[u32]) {
    for value in values {
        data.extend(value.to_be_bytes());
    }
}

fn head() -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, &[1, 0]);
    push_u32(&mut data, &[0x0001_0000, 0, 0x5F0F_3CF5]);
    push_u16(&mut data, &[0, UPEM]);
    data.extend([0u8; 16]);
    push_i16(&mut data, &[0, DESCENT, 600, ASCENT]);
    push_u16(&mut data, &[0, 8]);
    // direction hint, long loca offsets, glyph data format
    push_i16(&mut data, &[2, 1, 0]);
    assert_eq!(data.len(), 54);
    data
}

fn hhea() -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, &[1, 0]);
    push_i16(&mut data, &[ASCENT, DESCENT, 0]);
    push_u16(&mut data, &[600]);
    push_i16(&mut data, &[0, 0, 600, 1, 0, 0, 0, 0, 0, 0, 0]);
    push_u16(&mut data, &[GLYPHS.len() as u16]);
    assert_eq!(data.len(), 36);
    data
}

fn maxp() -> Vec<u8> {
    let mut data = Vec::new();
    push_u32(&mut data, &[0x0001_0000]);
    push_u16(&mut data, &[GLYPHS.len() as u16, 4, 1, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
    assert_eq!(data.len(), 32);
    data
}

fn cmap() -> Vec<u8> {
    let groups: Vec<(u32, u32)> = GLYPHS
        .iter()
        .enumerate()
        .filter_map(|(gid, (ch, ..))| ch.map(|ch| (ch as u32, gid as u32)))
        .collect();
    let mut data = Vec::new();
    push_u16(&mut data, &[0, 1, 3, 10]);
    push_u32(&mut data, &[12]);
    push_u16(&mut data, &[12, 0]);
    push_u32(&mut data, &[16 + 12 * groups.len() as u32, 0, groups.len() as u32]);
    for (codepoint, gid) in groups {
        push_u32(&mut data, &[codepoint, codepoint, gid]);
    }
    data
}

fn hmtx() -> Vec<u8> {
    let mut data = Vec::new();
    for (_, advance, outline) in GLYPHS {
        push_u16(&mut data, &[*advance]);
        push_i16(&mut data, &[outline.map_or(0, |[x_min, ..]| x_min)]);
    }
    data
}

/// A single rectangular contour.
fn rectangle([x_min, y_min, x_max, y_max]: [i16; 4]) -> Vec<u8> {
    let mut data = Vec::new();
    push_i16(&mut data, &[1, x_min, y_min, x_max, y_max]);
    push_u16(&mut data, &[3, 0]);
    data.extend([0x01; 4]);
    push_i16(&mut data, &[x_min, 0, x_max - x_min, 0]);
    push_i16(&mut data, &[y_min, y_max - y_min, 0, y_min - y_max]);
    data
}

fn glyf_and_loca() -> (Vec<u8>, Vec<u8>) {
    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    for (_, _, outline) in GLYPHS {
        push_u32(&mut loca, &[glyf.len() as u32]);
        if let Some(outline) = outline {
            glyf.extend(rectangle(*outline));
        }
    }
    push_u32(&mut loca, &[glyf.len() as u32]);
    (glyf, loca)
}

fn kern() -> Vec<u8> {
    let mut data = Vec::new();
    push_u16(&mut data, &[0, 1]);
    // subtable: version, length, horizontal format 0 coverage
    push_u16(&mut data, &[0, 6 + 8 + 6, 0x0001]);
    push_u16(&mut data, &[1, 6, 0, 0]);
    push_u16(&mut data, &[2, 3]);
    push_i16(&mut data, &[KERN_AV]);
    data
}

fn test_font() -> Vec<u8> {
    let (glyf, loca) = glyf_and_loca();
    let tables: BTreeMap<&[u8; 4], Vec<u8>> = [
        (b"cmap", cmap()),
        (b"glyf", glyf),
        (b"head", head()),
        (b"hhea", hhea()),
        (b"hmtx", hmtx()),
        (b"kern", kern()),
        (b"loca", loca),
        (b"maxp", maxp()),
    ]
    .into_iter()
    .collect();

    let directory_len = 12 + 16 * tables.len();
    let mut directory = Vec::new();
    let mut bodies = Vec::new();
    push_u32(&mut directory, &[0x0001_0000]);
    push_u16(&mut directory, &[tables.len() as u16, 0, 0, 0]);
    for (tag, table) in &tables {
        directory.extend(*tag);
        push_u32(
            &mut directory,
            &[0, (directory_len + bodies.len()) as u32, table.len() as u32],
        );
        bodies.extend(table);
        bodies.resize(bodies.len().next_multiple_of(4), 0);
    }
    directory.extend(bodies);
    directory
}

fn source() -> SkrifaSource {
    SkrifaSource::from_bytes("test.ttf", test_font(), 0).unwrap()
}

fn assert_near(actual: i32, expected: i32) {
    assert!(
        (actual - expected).abs() <= 1,
        "expected {expected} ± 1, got {actual}"
    );
}

#[test]
fn design_metrics() {
    let metrics = source().font_metrics();
    assert_eq!(metrics.units_per_em, UPEM);
    assert_eq!(metrics.ascent, ASCENT as f32);
    assert_eq!(metrics.descent, DESCENT as f32);
}

#[test]
fn renders_outlines() {
    let source = source();
    let glyph = source.render('A' as u32, 20, BitDepth::Four).unwrap().unwrap();
    assert_eq!(glyph.advance, 12.0);
    assert_near(glyph.bitmap.width() as i32, 10);
    assert_near(glyph.bitmap.height() as i32, 14);
    assert_near(glyph.bearing_x as i32, 1);
    assert_near(glyph.bearing_y as i32, 14);
    let center = glyph.bitmap.get(glyph.bitmap.width() / 2, glyph.bitmap.height() / 2);
    assert_eq!(center, Some(15));
    assert!(glyph.bitmap.find_out_of_range(BitDepth::Four).is_none());

    let descender = source.render('g' as u32, 20, BitDepth::One).unwrap().unwrap();
    assert_near(descender.bearing_y as i32, 10);
    assert_near(descender.bearing_y as i32 - descender.bitmap.height() as i32, -4);
    assert!(descender.bitmap.pixels().all(|value| value <= 1));
}

#[test]
fn blank_and_absent_glyphs() {
    let source = source();
    let space = source.render(' ' as u32, 20, BitDepth::Four).unwrap().unwrap();
    assert!(space.bitmap.is_empty());
    assert_eq!(space.advance, 5.0);
    assert_eq!(source.render('Z' as u32, 20, BitDepth::Four).unwrap(), None);

    let missing = source.missing_glyph(20, BitDepth::Four).unwrap();
    assert_near(missing.bitmap.width() as i32, 8);
    assert_eq!(missing.advance, 12.0);
}

#[test]
fn character_map() {
    let source = source();
    for ch in [' ', 'A', 'V', 'g'] {
        assert!(source.contains(ch as u32), "{ch:?}");
    }
    assert!(!source.contains('Z' as u32));
    assert!(!source.contains(0));
}

#[test]
fn kerning_from_kern_table() {
    let source = source();
    assert_eq!(source.kerning('A' as u32, 'V' as u32, 20), -2.0);
    assert_eq!(source.kerning('V' as u32, 'A' as u32, 20), 0.0);
    assert_eq!(source.kerning('A' as u32, 'Z' as u32, 20), 0.0);
}

fn config(dir: &tempfile::TempDir, output: &str, format: OutputFormat) -> JobConfig {
    let font_path = dir.path().join("test.ttf");
    std::fs::write(&font_path, test_font()).unwrap();
    JobConfig {
        fonts: vec![FontSourceConfig {
            path: font_path,
            ranges: vec!["0x20,0x41,0x56".into()],
            symbols: "gZ".into(),
        }],
        pixel_size: 20,
        format,
        output: dir.path().join(output),
        ..Default::default()
    }
}

#[test]
fn convert_to_binary() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, "test_20.bin", OutputFormat::Binary);
    let output = config.output.clone();
    let report = convert(config, &CancellationToken::new()).unwrap();
    assert_eq!(report.glyph_count, 5);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].codepoint, 'Z' as u32);
    assert_eq!(report.skipped[0].reason, SkipReason::MissingGlyph);

    let font = binary::from_bytes(&std::fs::read(output).unwrap()).unwrap();
    assert_eq!(font.glyph_count(), 5);
    assert_eq!(font.metrics.line_height, 20);
    assert_eq!(font.metrics.base_line(), 4);
    assert_eq!(font.cmap.lookup(' ' as u32), Some(1));
    assert_eq!(font.cmap.lookup('A' as u32), Some(2));
    assert_eq!(font.cmap.lookup('g' as u32), Some(4));
    assert_eq!(font.cmap.lookup('Z' as u32), None);
    assert_eq!(font.kerning.adjust(2, 3), -2.0);
    assert_eq!(font.kerning.adjust(3, 2), 0.0);
    let a = font.decode_glyph(2).unwrap();
    assert_eq!(a.get(a.width() / 2, a.height() / 2), Some(15));
}

#[test]
fn convert_to_c_source() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(&dir, "lv_font_test_20.c", OutputFormat::CSource);
    let output = config.output.clone();
    convert(config, &CancellationToken::new()).unwrap();
    let source = std::fs::read_to_string(output).unwrap();
    assert!(source.contains("const lv_font_t lv_font_test_20 = {"));
    assert!(source.contains("/* U+0041 \"A\" */"));
    assert!(source.contains(".kern_dsc = &kern_pairs,"));
    assert!(source.contains(".line_height = 20,"));
}

#[test]
fn unreadable_fonts() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config(&dir, "out.c", OutputFormat::CSource);
    config.fonts[0].path = dir.path().join("missing.ttf");
    let result = convert(config, &CancellationToken::new());
    assert!(matches!(result, Err(lvfont_tables::Error::FontLoad { .. })));
    assert!(!dir.path().join("out.c").exists());
}
