use std::collections::{HashMap, HashSet};

use lvfont_tables::{
    cmap::CmapFormat,
    compress::BitmapEncoding,
    kern::KerningTable,
    write::binary,
    BitDepth, Bitmap, CancellationToken, ConversionJob, DesignMetrics, Error, FontSourceConfig,
    GlyphSource, JobConfig, MissingGlyphPolicy, OutputFormat, RasterGlyph, RenderError,
    SkipReason, Warning,
};
use pretty_assertions::assert_eq;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A font made of solid blocks.
#[derive(Default)]
struct BlockFont {
    glyphs: HashMap<u32, RasterGlyph>,
    kerning: HashMap<(u32, u32), f32>,
    failing: HashSet<u32>,
}

impl BlockFont {
    fn with_chars(chars: impl IntoIterator<Item = char>) -> Self {
        let mut font = BlockFont::default();
        for ch in chars {
            font.glyphs.insert(ch as u32, block(6, 8, 8, 15));
        }
        font
    }
}

fn block(width: u16, height: u16, bearing_y: i16, value: u8) -> RasterGlyph {
    RasterGlyph {
        bitmap: Bitmap::from_pixels(width, height, vec![value; width as usize * height as usize])
            .unwrap(),
        bearing_x: 1,
        bearing_y,
        advance: 8.0,
    }
}

impl GlyphSource for BlockFont {
    fn font_metrics(&self) -> DesignMetrics {
        DesignMetrics {
            units_per_em: 1000,
            ascent: 800.0,
            descent: -200.0,
            underline: None,
        }
    }

    fn render(
        &self,
        codepoint: u32,
        _pixel_size: u16,
        _depth: BitDepth,
    ) -> Result<Option<RasterGlyph>, RenderError> {
        if self.failing.contains(&codepoint) {
            return Err(RenderError::new("broken outline"));
        }
        Ok(self.glyphs.get(&codepoint).cloned())
    }

    fn missing_glyph(&self, _pixel_size: u16, _depth: BitDepth) -> Result<RasterGlyph, RenderError> {
        let mut bitmap = Bitmap::new(6, 8);
        for x in 0..6 {
            bitmap.set(x, 0, 15);
            bitmap.set(x, 7, 15);
        }
        Ok(RasterGlyph {
            bitmap,
            bearing_x: 1,
            bearing_y: 8,
            advance: 8.0,
        })
    }

    fn kerning(&self, left: u32, right: u32, _pixel_size: u16) -> f32 {
        self.kerning.get(&(left, right)).copied().unwrap_or_default()
    }
}

fn config(ranges: &str) -> JobConfig {
    JobConfig {
        fonts: vec![FontSourceConfig {
            path: "block.ttf".into(),
            ranges: vec![ranges.into()],
            symbols: String::new(),
        }],
        threads: Some(2),
        ..Default::default()
    }
}

#[test]
fn digits_with_reserved_glyph() {
    init_logging();
    let source = BlockFont::with_chars('0'..='9');
    let job = ConversionJob::new(config("0x30-0x39")).unwrap();
    let compilation = job.compile(&[source], &CancellationToken::new()).unwrap();
    let font = &compilation.font;

    assert_eq!(font.glyph_count(), 11);
    assert_eq!(compilation.report.glyph_count, 11);
    assert!(compilation.report.skipped.is_empty());
    assert!(font.has_reserved_glyph);
    assert_eq!(font.cmap.lookup(0), Some(0));
    for (index, ch) in ('0'..='9').enumerate() {
        assert_eq!(font.cmap.lookup(ch as u32), Some(index as u16 + 1));
    }
    assert_eq!(font.cmap.lookup('a' as u32), None);

    let zero = font.lookup('0' as u32).unwrap();
    assert_eq!((zero.box_width, zero.box_height), (6, 8));
    assert_eq!((zero.offset_x, zero.offset_y), (1, 0));
    assert_eq!(zero.advance, 128);
    assert_eq!(font.metrics.line_height, 16);
    assert_eq!(font.metrics.base_line(), 3);

    let decoded = font.decode_glyph(3).unwrap();
    assert!(decoded.pixels().all(|value| value == 15));
    // the reserved glyph keeps the font's own missing glyph image
    let missing = font.decode_glyph(0).unwrap();
    assert_eq!(missing.get(0, 0), Some(15));
    assert_eq!(missing.get(0, 3), Some(0));
}

#[test]
fn solid_blocks_compress() {
    let source = BlockFont::with_chars('0'..='9');
    let job = ConversionJob::new(config("0x30-0x39")).unwrap();
    let report = job
        .compile(&[source], &CancellationToken::new())
        .unwrap()
        .report;
    assert_eq!(report.raw_bitmap_bytes, 11 * 24);
    assert!(report.compressed_glyphs >= 10);
    assert!(report.bitmap_bytes < report.raw_bitmap_bytes);
    assert!(report.compression_ratio() < 1.0);
}

#[test]
fn disabled_compression_stores_raw() {
    let source = BlockFont::with_chars('0'..='9');
    let job = ConversionJob::new(JobConfig {
        compress: false,
        ..config("0x30-0x39")
    })
    .unwrap();
    let compilation = job.compile(&[source], &CancellationToken::new()).unwrap();
    assert!(compilation
        .font
        .glyphs
        .iter()
        .all(|glyph| glyph.encoding == BitmapEncoding::Raw));
    assert_eq!(compilation.report.compressed_glyphs, 0);
    assert_eq!(
        compilation.report.bitmap_bytes,
        compilation.report.raw_bitmap_bytes
    );
}

#[test]
fn ranges_with_gaps() {
    let source = BlockFont::with_chars(['A', 'B', 'C', 'a', 'b', 'c']);
    let job = ConversionJob::new(config("0x41-0x43, 0x61-0x63")).unwrap();
    let font = job
        .compile(&[source], &CancellationToken::new())
        .unwrap()
        .font;
    let formats: Vec<_> = font
        .cmap
        .subtables()
        .iter()
        .map(|subtable| subtable.format)
        .collect();
    assert_eq!(formats, [CmapFormat::Format0Tiny; 3]);
    let mappings: Vec<_> = font.cmap.iter().collect();
    assert_eq!(
        mappings,
        [(0, 0), (0x41, 1), (0x42, 2), (0x43, 3), (0x61, 4), (0x62, 5), (0x63, 6)]
    );
    assert_eq!(font.cmap.lookup(0x44), None);
}

#[test]
fn glyphs_are_ordered_by_codepoint() {
    let chars = ['A', 'B', 'C', 'a', 'b', 'c'];
    let ranges = ConversionJob::new(config("0x61-0x63,0x41-0x43")).unwrap();
    let symbols = ConversionJob::new(JobConfig {
        fonts: vec![FontSourceConfig {
            path: "block.ttf".into(),
            ranges: vec![],
            symbols: "cbaCBA".into(),
        }],
        ..config("")
    })
    .unwrap();
    for job in [ranges, symbols] {
        let font = job
            .compile(&[BlockFont::with_chars(chars)], &CancellationToken::new())
            .unwrap()
            .font;
        let indices: Vec<_> = chars
            .iter()
            .map(|&ch| font.cmap.lookup(ch as u32).unwrap())
            .collect();
        assert_eq!(indices, [1, 2, 3, 4, 5, 6]);
        let codepoints: Vec<_> = font.glyphs[1..].iter().map(|glyph| glyph.codepoint).collect();
        assert_eq!(codepoints, chars.map(|ch| ch as u32));
    }
}

#[test]
fn overlapping_ranges_are_reported() {
    let job = ConversionJob::new(config("0x41-0x43,0x42")).unwrap();
    let compilation = job
        .compile(&[BlockFont::with_chars('A'..='C')], &CancellationToken::new())
        .unwrap();
    assert_eq!(compilation.font.glyph_count(), 4);
    assert!(compilation.report.skipped.is_empty());
    assert_eq!(
        compilation.report.warnings,
        [Warning::OverlappingRanges {
            font_index: 0,
            repeated: 1
        }]
    );
}

#[test]
fn presets_are_expanded() {
    let job = ConversionJob::new(config("DIGITS")).unwrap();
    let compilation = job
        .compile(&[BlockFont::with_chars('0'..='9')], &CancellationToken::new())
        .unwrap();
    assert_eq!(compilation.font.glyph_count(), 11);
    assert!(compilation.report.warnings.is_empty());
}

#[test]
fn missing_glyphs_are_reported_or_substituted() {
    let skip = ConversionJob::new(config("0x41-0x43")).unwrap();
    let compilation = skip
        .compile(
            &[BlockFont::with_chars(['A', 'C'])],
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(compilation.font.cmap.lookup(0x42), None);
    assert_eq!(compilation.report.skipped.len(), 1);
    assert_eq!(compilation.report.skipped[0].codepoint, 0x42);
    assert_eq!(
        compilation.report.skipped[0].reason,
        SkipReason::MissingGlyph
    );

    let substitute = ConversionJob::new(JobConfig {
        missing_glyphs: MissingGlyphPolicy::Substitute,
        ..config("0x41-0x43")
    })
    .unwrap();
    let compilation = substitute
        .compile(
            &[BlockFont::with_chars(['A', 'C'])],
            &CancellationToken::new(),
        )
        .unwrap();
    let font = &compilation.font;
    assert_eq!(font.glyph_count(), 3);
    assert_eq!(font.cmap.lookup(0x42), Some(0));
    assert_eq!(font.cmap.lookup(0x41), Some(1));
    assert_eq!(font.cmap.lookup(0x43), Some(2));
    assert_eq!(compilation.report.skipped.len(), 1);
}

#[test]
fn render_failures_are_skipped() {
    let mut source = BlockFont::with_chars('A'..='C');
    source.failing.insert('B' as u32);
    let job = ConversionJob::new(config("0x41-0x43")).unwrap();
    let compilation = job.compile(&[source], &CancellationToken::new()).unwrap();
    assert_eq!(compilation.font.glyph_count(), 3);
    assert_eq!(compilation.report.skipped.len(), 1);
    assert_eq!(
        compilation.report.skipped[0].reason,
        SkipReason::RenderFailed("broken outline".into())
    );
}

#[test]
fn render_failures_covered_by_a_later_font() {
    let mut first = BlockFont::with_chars(['A', 'B']);
    first.failing.insert('B' as u32);
    let mut second = BlockFont::default();
    second.glyphs.insert('B' as u32, block(3, 3, 3, 7));
    let font_config = |path: &str| FontSourceConfig {
        path: path.into(),
        ranges: vec!["0x41-0x42".into()],
        symbols: String::new(),
    };
    let job = ConversionJob::new(JobConfig {
        fonts: vec![font_config("first.ttf"), font_config("second.ttf")],
        ..Default::default()
    })
    .unwrap();
    let compilation = job
        .compile(&[first, second], &CancellationToken::new())
        .unwrap();
    assert_eq!(compilation.font.glyph_count(), 3);
    assert_eq!(compilation.font.lookup('B' as u32).unwrap().box_width, 3);
    assert!(compilation.report.skipped.is_empty());
}

#[test]
fn nothing_rendered() {
    let job = ConversionJob::new(config("0x41-0x43")).unwrap();
    let result = job.compile(&[BlockFont::default()], &CancellationToken::new());
    assert!(matches!(result, Err(Error::NoGlyphs)));
}

#[test]
fn out_of_range_pixels_are_fatal() {
    let mut source = BlockFont::with_chars(['A']);
    source.glyphs.insert('B' as u32, block(2, 2, 2, 16));
    let job = ConversionJob::new(config("0x41-0x42")).unwrap();
    let result = job.compile(&[source], &CancellationToken::new());
    assert!(matches!(
        result,
        Err(Error::PixelOutOfRange {
            codepoint: 0x42,
            value: 16,
            depth: BitDepth::Four
        })
    ));
}

#[test]
fn earlier_fonts_win() {
    let first = BlockFont::with_chars(['A', 'B']);
    let mut second = BlockFont::with_chars(['B', 'C']);
    second.glyphs.insert('B' as u32, block(3, 3, 3, 7));
    let font_config = |path: &str| FontSourceConfig {
        path: path.into(),
        ranges: vec!["0x41-0x43".into()],
        symbols: String::new(),
    };
    let job = ConversionJob::new(JobConfig {
        fonts: vec![font_config("first.ttf"), font_config("second.ttf")],
        ..Default::default()
    })
    .unwrap();
    let compilation = job
        .compile(&[first, second], &CancellationToken::new())
        .unwrap();
    let font = &compilation.font;
    assert_eq!(font.glyph_count(), 4);
    assert_eq!(font.lookup('B' as u32).unwrap().box_width, 6);
    assert!(font.lookup('C' as u32).is_some());
    assert_eq!(compilation.report.skipped.len(), 1);
    assert_eq!(compilation.report.skipped[0].codepoint, 'B' as u32);
    assert_eq!(
        compilation.report.skipped[0].reason,
        SkipReason::Duplicate { font_index: 0 }
    );
}

#[test]
fn kerning_within_one_font() {
    let mut first = BlockFont::with_chars(['A', 'V']);
    first.kerning.insert(('A' as u32, 'V' as u32), -1.5);
    let mut second = BlockFont::with_chars(['W']);
    second.kerning.insert(('W' as u32, 'A' as u32), -3.0);
    let job = ConversionJob::new(JobConfig {
        fonts: vec![
            FontSourceConfig {
                path: "first.ttf".into(),
                ranges: vec!["0x41,0x56".into()],
                symbols: String::new(),
            },
            FontSourceConfig {
                path: "second.ttf".into(),
                ranges: vec![],
                symbols: "W".into(),
            },
        ],
        ..Default::default()
    })
    .unwrap();
    let font = job
        .compile(&[first, second], &CancellationToken::new())
        .unwrap()
        .font;
    let a = font.cmap.lookup('A' as u32).unwrap();
    let v = font.cmap.lookup('V' as u32).unwrap();
    let w = font.cmap.lookup('W' as u32).unwrap();
    assert!(matches!(font.kerning.table, Some(KerningTable::Pairs(_))));
    assert_eq!(font.kerning.adjust(a, v), -1.5);
    assert_eq!(font.kerning.adjust(v, a), 0.0);
    assert_eq!(font.kerning.adjust(w, a), 0.0);

    let unkerned = ConversionJob::new(JobConfig {
        kerning: false,
        ..config("0x41,0x56")
    })
    .unwrap();
    let mut source = BlockFont::with_chars(['A', 'V']);
    source.kerning.insert(('A' as u32, 'V' as u32), -1.5);
    let font = unkerned
        .compile(&[source], &CancellationToken::new())
        .unwrap()
        .font;
    assert!(font.kerning.is_empty());
}

#[test]
fn clipped_glyphs_are_reported() {
    let mut source = BlockFont::with_chars(['A']);
    // 13px ascent, 3px descent
    source.glyphs.insert('g' as u32, block(4, 10, 4, 15));
    let job = ConversionJob::new(config("0x41,0x67")).unwrap();
    let report = job
        .compile(&[source], &CancellationToken::new())
        .unwrap()
        .report;
    assert_eq!(report.warnings.len(), 1);
    let Warning::Clipped {
        codepoint,
        clipping,
    } = &report.warnings[0]
    else {
        panic!("unexpected warning {:?}", report.warnings[0]);
    };
    assert_eq!(*codepoint, 'g' as u32);
    assert_eq!((clipping.above, clipping.below), (0, 3));
}

#[test]
fn oversized_glyphs_are_reported_for_c_source() {
    let wide = || {
        let mut source = BlockFont::with_chars(['A']);
        let mut glyph = block(300, 10, 8, 15);
        glyph.advance = 300.0;
        source.glyphs.insert('W' as u32, glyph);
        source
    };
    let job = ConversionJob::new(config("0x41,0x57")).unwrap();
    let report = job
        .compile(&[wide()], &CancellationToken::new())
        .unwrap()
        .report;
    assert_eq!(
        report.warnings,
        [Warning::OversizedGlyph {
            codepoint: 'W' as u32,
            advance: 4800,
            width: 300,
            height: 10
        }]
    );

    let binary = ConversionJob::new(JobConfig {
        format: OutputFormat::Binary,
        ..config("0x41,0x57")
    })
    .unwrap();
    let report = binary
        .compile(&[wide()], &CancellationToken::new())
        .unwrap()
        .report;
    assert!(report.warnings.is_empty());
}

#[test]
fn without_reserved_glyph() {
    let job = ConversionJob::new(JobConfig {
        reserve_missing_glyph: false,
        ..config("0x41-0x43")
    })
    .unwrap();
    let compilation = job
        .compile(&[BlockFont::with_chars('A'..='C')], &CancellationToken::new())
        .unwrap();
    assert_eq!(compilation.font.glyph_count(), 3);
    assert_eq!(compilation.font.cmap.lookup('A' as u32), Some(0));
    assert_eq!(
        compilation.report.warnings,
        [Warning::UnreachableFirstGlyph { codepoint: 0x41 }]
    );
}

#[test]
fn cancelled_jobs_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("font.c");
    let job = ConversionJob::new(JobConfig {
        output: output.clone(),
        ..config("0x30-0x39")
    })
    .unwrap();
    let token = CancellationToken::new();
    token.cancel();
    let result = job.run(&[BlockFont::with_chars('0'..='9')], &token);
    assert!(matches!(result, Err(Error::Cancelled)));
    assert!(!output.exists());
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn writes_c_source() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("lv_font_digits_16.c");
    let job = ConversionJob::new(JobConfig {
        output: output.clone(),
        fallback: Some("lv_font_montserrat_16".into()),
        ..config("0x30-0x39")
    })
    .unwrap();
    let report = job
        .run(&[BlockFont::with_chars('0'..='9')], &CancellationToken::new())
        .unwrap();
    assert_eq!(report.glyph_count, 11);
    let source = std::fs::read_to_string(&output).unwrap();
    for needle in [
        " * Opts: --bpp 4 --size 16 --font block.ttf -r 0x30-0x39 --format c",
        "glyph_bitmap[] = {",
        "glyph_dsc[] = {",
        "static const lv_font_fmt_txt_cmap_t cmaps[] =",
        ".cmap_num = 2,",
        ".bpp = 4,",
        ".fallback = &lv_font_montserrat_16,",
        "const lv_font_t lv_font_digits_16 = {",
    ] {
        assert!(source.contains(needle), "missing '{needle}'");
    }
    // compressed glyphs are stored with one of the RLE formats
    assert!(source.contains(".bitmap_format = "));
    assert!(!source.contains(".bitmap_format = 0,"));
}

#[test]
fn writes_binary() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("digits.bin");
    let config = JobConfig {
        output: output.clone(),
        format: OutputFormat::Binary,
        ..config("0x30-0x39")
    };
    let mut source = BlockFont::with_chars('0'..='9');
    source.kerning.insert(('1' as u32, '7' as u32), -1.0);
    let job = ConversionJob::new(config).unwrap();
    let compilation = job.compile(&[&source], &CancellationToken::new()).unwrap();
    job.run(&[&source], &CancellationToken::new()).unwrap();

    let data = std::fs::read(&output).unwrap();
    assert_eq!(&data[..4], binary::MAGIC.as_slice());
    let font = binary::from_bytes(&data).unwrap();
    let expected = &compilation.font;
    assert_eq!(font.metrics, expected.metrics);
    assert_eq!(font.cmap, expected.cmap);
    assert_eq!(font.bitmap, expected.bitmap);
    assert_eq!(font.kerning, expected.kerning);
    assert_eq!(font.glyph_count(), 11);
    assert!(font.has_reserved_glyph);
    for index in 0..11 {
        assert_eq!(font.decode_glyph(index), expected.decode_glyph(index));
    }
}
