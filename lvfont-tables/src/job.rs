//! Running a conversion from configuration to output file.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    io::Write as _,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use rayon::prelude::*;

use crate::{
    bitmap::BitDepth,
    cmap::CharacterMap,
    compress::{BitmapEncoding, CompressionOptions},
    error::{Error, SkipReason},
    font::CompiledFont,
    glyph::{GlyphRecord, RasterGlyph},
    kern::{Kerning, KerningBuilder},
    metrics::{Clipping, FontMetrics, MetricsError},
    ranges::{self, RangeIssue},
    source::GlyphSource,
    write::{
        binary,
        source::{self as c_source, SourceOptions},
        OutputFormat,
    },
};

/// One font file and the characters to take from it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FontSourceConfig {
    pub path: PathBuf,
    /// Range specs, see [`ranges::expand`].
    pub ranges: Vec<String>,
    /// Literal characters to include.
    pub symbols: String,
}

/// What happens to codepoints none of the fonts have a glyph for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MissingGlyphPolicy {
    /// Leave them out of the character map.
    #[default]
    Skip,
    /// Map them to the reserved missing glyph.
    Substitute,
}

impl FromStr for MissingGlyphPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(MissingGlyphPolicy::Skip),
            "substitute" => Ok(MissingGlyphPolicy::Substitute),
            _ => Err(format!(
                "unknown missing glyph policy '{s}', expected 'skip' or 'substitute'"
            )),
        }
    }
}

/// Settings for one conversion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobConfig {
    /// Earlier fonts win when several provide the same codepoint.
    pub fonts: Vec<FontSourceConfig>,
    pub pixel_size: u16,
    pub bit_depth: u8,
    pub format: OutputFormat,
    pub compress: bool,
    pub prefilter: bool,
    pub kerning: bool,
    pub missing_glyphs: MissingGlyphPolicy,
    /// Store the font's missing glyph image as glyph 0.
    pub reserve_missing_glyph: bool,
    /// Worker threads; `None` uses every core.
    pub threads: Option<usize>,
    pub output: PathBuf,
    /// Name of the generated font; derived from `output` if not set.
    pub name: Option<String>,
    pub lv_include: Option<String>,
    pub fallback: Option<String>,
}

impl Default for JobConfig {
    fn default() -> Self {
        JobConfig {
            fonts: Vec::new(),
            pixel_size: 16,
            bit_depth: 4,
            format: OutputFormat::CSource,
            compress: true,
            prefilter: true,
            kerning: true,
            missing_glyphs: MissingGlyphPolicy::Skip,
            reserve_missing_glyph: true,
            threads: None,
            output: PathBuf::from("font.c"),
            name: None,
            lv_include: None,
            fallback: None,
        }
    }
}

impl JobConfig {
    /// The settings as command line options, for output banners.
    pub fn describe(&self) -> String {
        let mut parts = vec![
            format!("--bpp {}", self.bit_depth),
            format!("--size {}", self.pixel_size),
        ];
        for font in &self.fonts {
            parts.push(format!("--font {}", font.path.display()));
            parts.extend(font.ranges.iter().map(|range| format!("-r {range}")));
            if !font.symbols.is_empty() {
                parts.push(format!("--symbols {}", font.symbols));
            }
        }
        parts.push(
            match self.format {
                OutputFormat::CSource => "--format c",
                OutputFormat::Binary => "--format bin",
            }
            .to_string(),
        );
        if !self.compress {
            parts.push("--no-compress".into());
        } else if !self.prefilter {
            parts.push("--no-prefilter".into());
        }
        if !self.kerning {
            parts.push("--no-kerning".into());
        }
        if self.missing_glyphs == MissingGlyphPolicy::Substitute {
            parts.push("--missing substitute".into());
        }
        if !self.reserve_missing_glyph {
            parts.push("--no-reserved-glyph".into());
        }
        parts.join(" ")
    }

    fn compression(&self) -> CompressionOptions {
        CompressionOptions {
            enabled: self.compress,
            prefilter: self.prefilter,
        }
    }
}

/// A flag that stops a running job.
///
/// Clones share the flag, so one can be handed to another thread.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<(), Error> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// A requested codepoint that is not in the compiled font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Skipped {
    pub codepoint: u32,
    pub reason: SkipReason,
}

/// Something about the compiled font worth a look.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Warning {
    /// The glyph reaches outside the line box and will be cut off.
    Clipped { codepoint: u32, clipping: Clipping },
    /// The font's missing glyph could not be rendered; glyph 0 is blank.
    MissingGlyphFailed(String),
    /// Glyph 0 is a real character, which LVGL treats as missing.
    UnreachableFirstGlyph { codepoint: u32 },
    /// The ranges and symbols of one font name some codepoints more than once.
    OverlappingRanges { font_index: usize, repeated: usize },
    /// One font is asked for more than [`ranges::LARGE_SET`] characters.
    LargeCharacterSet { font_index: usize, count: usize },
    /// The glyph does not fit the bit fields of LVGL's compact glyph
    /// descriptor: 12 bits of 12.4 advance, 8 bits per box dimension.
    OversizedGlyph {
        codepoint: u32,
        advance: u16,
        width: u16,
        height: u16,
    },
}

/// Largest `adv_w` in a compact glyph descriptor.
pub const MAX_DESCRIPTOR_ADVANCE: u16 = 0x0FFF;
/// Largest `box_w` or `box_h` in a compact glyph descriptor.
pub const MAX_DESCRIPTOR_BOX: u16 = 0xFF;

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::Clipped { codepoint, clipping } => write!(
                f,
                "U+{codepoint:04X} is clipped by {}px above and {}px below the line",
                clipping.above, clipping.below
            ),
            Warning::MissingGlyphFailed(reason) => {
                write!(f, "failed to render the missing glyph: {reason}")
            }
            Warning::UnreachableFirstGlyph { codepoint } => write!(
                f,
                "U+{codepoint:04X} is glyph 0 and will be treated as missing"
            ),
            Warning::OverlappingRanges {
                font_index,
                repeated,
            } => write!(
                f,
                "ranges of font #{font_index} overlap, {repeated} codepoints requested twice"
            ),
            Warning::LargeCharacterSet { font_index, count } => write!(
                f,
                "font #{font_index} requests {count} characters, the output may be very large"
            ),
            Warning::OversizedGlyph {
                codepoint,
                advance,
                width,
                height,
            } => write!(
                f,
                "U+{codepoint:04X} overflows the glyph descriptor (adv_w {advance}, box {width}x{height})"
            ),
        }
    }
}

/// The outcome of a successful job.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct JobReport {
    pub glyph_count: usize,
    /// Size of the bitmap blob as stored.
    pub bitmap_bytes: usize,
    /// Size the bitmap blob would have without compression.
    pub raw_bitmap_bytes: usize,
    pub compressed_glyphs: usize,
    pub skipped: Vec<Skipped>,
    pub warnings: Vec<Warning>,
}

impl JobReport {
    /// Stored size over raw size; 1.0 for an empty blob.
    pub fn compression_ratio(&self) -> f64 {
        if self.raw_bitmap_bytes == 0 {
            1.0
        } else {
            self.bitmap_bytes as f64 / self.raw_bitmap_bytes as f64
        }
    }
}

impl fmt::Display for JobReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} glyphs, {} bitmap bytes ({:.1}% of {} raw, {} glyphs compressed), {} skipped, {} warnings",
            self.glyph_count,
            self.bitmap_bytes,
            self.compression_ratio() * 100.0,
            self.raw_bitmap_bytes,
            self.compressed_glyphs,
            self.skipped.len(),
            self.warnings.len(),
        )
    }
}

/// A compiled font and what happened while compiling it.
#[derive(Clone, Debug)]
pub struct Compilation {
    pub font: CompiledFont,
    pub report: JobReport,
}

/// A validated job, ready to run against a set of glyph sources.
#[derive(Clone, Debug)]
pub struct ConversionJob {
    config: JobConfig,
    bit_depth: BitDepth,
    name: String,
    /// `(source, mapped)` codepoints per font.
    plan: Vec<Vec<(u32, u32)>>,
    /// Found while expanding ranges, reported with every compilation.
    range_warnings: Vec<Warning>,
}

enum Outcome {
    Rendered(GlyphRecord),
    Missing,
    Failed(String),
}

impl ConversionJob {
    /// Validates `config` and expands its codepoint ranges.
    pub fn new(config: JobConfig) -> Result<Self, Error> {
        let bit_depth = BitDepth::new(config.bit_depth)?;
        if config.pixel_size == 0 {
            return Err(MetricsError::InvalidPixelSize.into());
        }
        if config.fonts.is_empty() {
            return Err(Error::InvalidConfig("no fonts given".into()));
        }
        if config.missing_glyphs == MissingGlyphPolicy::Substitute && !config.reserve_missing_glyph
        {
            return Err(Error::InvalidConfig(
                "substituting missing glyphs requires a reserved missing glyph".into(),
            ));
        }
        if config.threads == Some(0) {
            return Err(Error::InvalidConfig("thread count must be positive".into()));
        }
        let mut range_warnings = Vec::new();
        let plan = config
            .fonts
            .iter()
            .enumerate()
            .map(|(font_index, font)| {
                let mut pairs = Vec::new();
                for range in &font.ranges {
                    pairs.extend(ranges::expand(range)?);
                }
                pairs.extend(ranges::symbols(&font.symbols));
                for issue in ranges::check(&pairs) {
                    log::warn!("{}: {issue}", font.path.display());
                    range_warnings.push(match issue {
                        RangeIssue::Overlapping { repeated } => Warning::OverlappingRanges {
                            font_index,
                            repeated,
                        },
                        RangeIssue::Large { count } => {
                            Warning::LargeCharacterSet { font_index, count }
                        }
                    });
                }
                Ok(ranges::dedupe(pairs))
            })
            .collect::<Result<Vec<_>, Error>>()?;
        if plan.iter().all(Vec::is_empty) {
            return Err(Error::InvalidConfig("no codepoints requested".into()));
        }
        let name = font_name(&config);
        Ok(ConversionJob {
            config,
            bit_depth,
            name,
            plan,
            range_warnings,
        })
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    /// The C identifier of the compiled font.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bit_depth(&self) -> BitDepth {
        self.bit_depth
    }

    /// Compiles the font; `sources` correspond to the configured fonts.
    pub fn compile<S: GlyphSource + Sync>(
        &self,
        sources: &[S],
        cancel: &CancellationToken,
    ) -> Result<Compilation, Error> {
        if sources.len() != self.plan.len() {
            return Err(Error::InvalidConfig(format!(
                "{} fonts configured but {} sources given",
                self.plan.len(),
                sources.len()
            )));
        }
        let pixel_size = self.config.pixel_size;
        let depth = self.bit_depth;
        let compression = self.config.compression();
        let metrics = FontMetrics::new(&sources[0].font_metrics(), pixel_size, depth)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()?;

        let tasks: Vec<(usize, u32, u32)> = self
            .plan
            .iter()
            .enumerate()
            .flat_map(|(font_index, pairs)| {
                pairs
                    .iter()
                    .map(move |&(source, mapped)| (font_index, source, mapped))
            })
            .collect();
        log::info!(
            "rendering {} codepoints from {} fonts at {pixel_size}px, {depth}",
            tasks.len(),
            sources.len()
        );

        let outcomes = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(font_index, source, mapped)| {
                    cancel.check()?;
                    render_one(
                        &sources[font_index],
                        font_index,
                        source,
                        mapped,
                        pixel_size,
                        depth,
                        compression,
                    )
                })
                .collect::<Result<Vec<_>, Error>>()
        })?;

        let mut report = JobReport {
            warnings: self.range_warnings.clone(),
            ..Default::default()
        };
        let mut records = Vec::new();
        let mut claimed = HashMap::new();
        if self.config.reserve_missing_glyph {
            let raster = match sources[0].missing_glyph(pixel_size, depth) {
                Ok(raster) => raster,
                Err(err) => {
                    log::warn!("failed to render the missing glyph: {err}");
                    report.warnings.push(Warning::MissingGlyphFailed(err.0));
                    RasterGlyph::default()
                }
            };
            check_pixels(&raster, 0, depth)?;
            records.push(GlyphRecord::from_raster(0, 0, 0, raster, depth, compression));
            claimed.insert(0, 0);
        }

        let mut unresolved = BTreeSet::new();
        let mut failures = Vec::new();
        for (&(font_index, source, mapped), outcome) in tasks.iter().zip(outcomes) {
            match outcome {
                Outcome::Rendered(record) => match claimed.get(&mapped) {
                    Some(&owner) => {
                        log::debug!(
                            "U+{source:04X} from font #{font_index} is already provided by font #{owner}"
                        );
                        report.skipped.push(Skipped {
                            codepoint: source,
                            reason: SkipReason::Duplicate { font_index: owner },
                        });
                    }
                    None => {
                        claimed.insert(mapped, font_index);
                        records.push(record);
                    }
                },
                Outcome::Missing => {
                    if !claimed.contains_key(&mapped) {
                        unresolved.insert((mapped, source));
                    }
                }
                Outcome::Failed(reason) => failures.push((mapped, source, reason)),
            }
        }
        // failures another font made up for are not reported
        for (mapped, source, reason) in failures {
            if claimed.contains_key(&mapped) {
                log::debug!("U+{source:04X} failed in one font but another provides it");
                continue;
            }
            log::warn!("failed to render U+{source:04X}: {reason}");
            report.skipped.push(Skipped {
                codepoint: source,
                reason: SkipReason::RenderFailed(reason),
            });
            unresolved.insert((mapped, source));
        }
        // a later font may have provided what an earlier one lacked
        unresolved.retain(|(mapped, _)| !claimed.contains_key(mapped));
        let mut missing = Vec::new();
        for &(mapped, source) in &unresolved {
            if missing.last() == Some(&mapped) {
                continue;
            }
            missing.push(mapped);
            if !report
                .skipped
                .iter()
                .any(|skipped| skipped.codepoint == source)
            {
                log::debug!("no glyph for U+{source:04X}");
                report.skipped.push(Skipped {
                    codepoint: source,
                    reason: SkipReason::MissingGlyph,
                });
            }
        }

        let reserved = usize::from(self.config.reserve_missing_glyph);
        if records.len() == reserved {
            return Err(Error::NoGlyphs);
        }
        if records.len() > u16::MAX as usize {
            return Err(Error::TooManyGlyphs(records.len()));
        }
        records.sort_by_key(|record| record.mapped_codepoint);
        for (index, record) in records.iter_mut().enumerate() {
            record.glyph_index = index as u16;
        }

        let substitutes = match self.config.missing_glyphs {
            MissingGlyphPolicy::Substitute => missing.as_slice(),
            MissingGlyphPolicy::Skip => &[],
        };
        let cmap = CharacterMap::from_mappings(
            records
                .iter()
                .map(|record| (record.mapped_codepoint, record.glyph_index))
                .chain(substitutes.iter().map(|&codepoint| (codepoint, 0))),
        )?;

        cancel.check()?;
        let kerning = if self.config.kerning {
            pool.install(|| self.kerning(sources, &records, reserved, cancel))?
        } else {
            Kerning::default()
        };

        for record in &records[reserved..] {
            if let Some(clipping) = metrics.clipping(record) {
                log::warn!(
                    "U+{:04X} is clipped: {}px above, {}px below",
                    record.source_codepoint,
                    clipping.above,
                    clipping.below
                );
                report.warnings.push(Warning::Clipped {
                    codepoint: record.source_codepoint,
                    clipping,
                });
            }
        }
        if self.config.format == OutputFormat::CSource {
            report
                .warnings
                .extend(records.iter().filter_map(oversized_glyph));
        }
        if reserved == 0 {
            report.warnings.push(Warning::UnreachableFirstGlyph {
                codepoint: records[0].mapped_codepoint,
            });
        }

        let font = CompiledFont::assemble(
            self.name.clone(),
            metrics,
            &records,
            cmap,
            kerning,
            self.config.reserve_missing_glyph,
            compression,
        );
        report.glyph_count = font.glyph_count();
        report.bitmap_bytes = font.bitmap.len();
        report.raw_bitmap_bytes = records.iter().map(|record| record.packed.len()).sum();
        report.compressed_glyphs = font
            .glyphs
            .iter()
            .filter(|glyph| glyph.encoding != BitmapEncoding::Raw)
            .count();
        log::info!("compiled {}: {report}", self.name);
        Ok(Compilation { font, report })
    }

    fn kerning<S: GlyphSource + Sync>(
        &self,
        sources: &[S],
        records: &[GlyphRecord],
        reserved: usize,
        cancel: &CancellationToken,
    ) -> Result<Kerning, Error> {
        let pixel_size = self.config.pixel_size;
        let glyphs = &records[reserved..];
        let adjustments = glyphs
            .par_iter()
            .map(|left| {
                cancel.check()?;
                let source = &sources[left.font_index];
                Ok(glyphs
                    .iter()
                    .filter(|right| right.font_index == left.font_index)
                    .filter_map(|right| {
                        let adjust =
                            source.kerning(left.source_codepoint, right.source_codepoint, pixel_size);
                        (adjust != 0.0).then_some((left.glyph_index, right.glyph_index, adjust))
                    })
                    .collect::<Vec<_>>())
            })
            .collect::<Result<Vec<_>, Error>>()?;
        let mut builder = KerningBuilder::new(records.len() as u16);
        for (left, right, adjust) in adjustments.into_iter().flatten() {
            builder.add(left, right, adjust);
        }
        Ok(builder.build())
    }

    /// Serializes `font` in the configured format and writes it out.
    ///
    /// The file is written next to its destination and moved into place, so
    /// a failed or cancelled write leaves nothing behind.
    pub fn write(&self, font: &CompiledFont, cancel: &CancellationToken) -> Result<(), Error> {
        cancel.check()?;
        let bytes = match self.config.format {
            OutputFormat::CSource => c_source::to_c_source(
                font,
                &SourceOptions {
                    lv_include: self.config.lv_include.clone(),
                    fallback: self.config.fallback.clone(),
                    command_line: Some(self.config.describe()),
                },
            )
            .into_bytes(),
            OutputFormat::Binary => binary::to_bytes(font),
        };
        let output = &self.config.output;
        let dir = output
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        cancel.check()?;
        file.persist(output).map_err(|err| err.error)?;
        log::info!("wrote {} bytes to {}", bytes.len(), output.display());
        Ok(())
    }

    /// Compiles and writes the font.
    pub fn run<S: GlyphSource + Sync>(
        &self,
        sources: &[S],
        cancel: &CancellationToken,
    ) -> Result<JobReport, Error> {
        let Compilation { font, report } = self.compile(sources, cancel)?;
        self.write(&font, cancel)?;
        Ok(report)
    }
}

fn render_one<S: GlyphSource>(
    source: &S,
    font_index: usize,
    codepoint: u32,
    mapped: u32,
    pixel_size: u16,
    depth: BitDepth,
    compression: CompressionOptions,
) -> Result<Outcome, Error> {
    match source.render(codepoint, pixel_size, depth) {
        Ok(Some(raster)) => {
            check_pixels(&raster, codepoint, depth)?;
            Ok(Outcome::Rendered(GlyphRecord::from_raster(
                codepoint,
                mapped,
                font_index,
                raster,
                depth,
                compression,
            )))
        }
        Ok(None) => Ok(Outcome::Missing),
        Err(err) => Ok(Outcome::Failed(err.0)),
    }
}

fn oversized_glyph(record: &GlyphRecord) -> Option<Warning> {
    let advance = record.advance_fp();
    let width = record.bitmap.width();
    let height = record.bitmap.height();
    let fits = advance <= MAX_DESCRIPTOR_ADVANCE
        && width <= MAX_DESCRIPTOR_BOX
        && height <= MAX_DESCRIPTOR_BOX;
    if fits {
        return None;
    }
    log::warn!(
        "U+{:04X} is too large for a glyph descriptor: adv_w {advance}, box {width}x{height}",
        record.source_codepoint
    );
    Some(Warning::OversizedGlyph {
        codepoint: record.source_codepoint,
        advance,
        width,
        height,
    })
}

fn check_pixels(raster: &RasterGlyph, codepoint: u32, depth: BitDepth) -> Result<(), Error> {
    match raster.bitmap.find_out_of_range(depth) {
        Some(value) => Err(Error::PixelOutOfRange {
            codepoint,
            value,
            depth,
        }),
        None => Ok(()),
    }
}

/// A C identifier for the font, from the configured name or the output file.
fn font_name(config: &JobConfig) -> String {
    let raw = match &config.name {
        Some(name) => name.clone(),
        None => config
            .output
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };
    let mut name: String = raw
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch } else { '_' })
        .collect();
    if name.is_empty() {
        name.push_str("font");
    }
    if name.starts_with(|ch: char| ch.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}
