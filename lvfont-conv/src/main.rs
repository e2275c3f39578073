//! Command line font converter
//!
//! Renders the requested characters of one or more fonts and writes them as
//! an LVGL font, either C source or a binary container.
//!
//! Ranges and symbols apply to the most recent `--font`:
//!
//! ```text
//! lvfont-conv --size 16 --bpp 4 \
//!     --font Roboto-Regular.ttf -r 0x20-0x7F \
//!     --font FontAwesome.ttf -r 0xF000-0xF0FF --symbols "°" \
//!     -o lv_font_roboto_16.c
//! ```

use std::path::PathBuf;

use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser};
use lvfont_tables::{
    CancellationToken, FontSourceConfig, JobConfig, MissingGlyphPolicy, OutputFormat,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// A font file; the ranges and symbols that follow are taken from it
    #[arg(long, required = true)]
    font: Vec<PathBuf>,

    /// Codepoint ranges, e.g. `0x20-0x7F,0x401`, `0xF005=>0x100` or a preset such as `CYRILLIC`
    #[arg(short, long = "range")]
    ranges: Vec<String>,

    /// Literal characters to include
    #[arg(long)]
    symbols: Vec<String>,

    /// Font size in pixels
    #[arg(long)]
    size: u16,

    /// Bits per pixel: 1, 2, 3, 4 or 8
    #[arg(long, default_value_t = 4)]
    bpp: u8,

    /// Output format: `c` or `bin`
    #[arg(long, default_value = "c")]
    format: OutputFormat,

    /// Store every bitmap uncompressed
    #[arg(long)]
    no_compress: bool,

    /// Don't try the XOR row prefilter when compressing
    #[arg(long)]
    no_prefilter: bool,

    /// Drop kerning information
    #[arg(long)]
    no_kerning: bool,

    /// What to do with characters no font has: `skip` or `substitute`
    #[arg(long, default_value = "skip")]
    missing: MissingGlyphPolicy,

    /// Don't store the font's missing glyph as glyph 0
    #[arg(long)]
    no_reserved_glyph: bool,

    /// Number of worker threads; defaults to one per core
    #[arg(long)]
    threads: Option<usize>,

    /// Name of the generated font variable; defaults to the output file name
    #[arg(long)]
    name: Option<String>,

    /// Header to include instead of `lvgl/lvgl.h`
    #[arg(long)]
    lv_include: Option<String>,

    /// Font to use for characters this font lacks
    #[arg(long)]
    lv_fallback: Option<String>,

    /// The output file
    #[arg(short, long)]
    output: PathBuf,
}

impl Args {
    /// Assigns each `-r` and `--symbols` to the `--font` before it.
    fn font_sources(&self, matches: &ArgMatches) -> Result<Vec<FontSourceConfig>, String> {
        let font_positions: Vec<usize> = matches
            .indices_of("font")
            .map(Iterator::collect)
            .unwrap_or_default();
        let owner = |position: usize| {
            font_positions
                .iter()
                .rposition(|font| *font < position)
        };
        let mut fonts: Vec<_> = self
            .font
            .iter()
            .map(|path| FontSourceConfig {
                path: path.clone(),
                ..Default::default()
            })
            .collect();
        let range_positions = matches.indices_of("ranges").into_iter().flatten();
        for (range, position) in self.ranges.iter().zip(range_positions) {
            let font = owner(position).ok_or_else(|| format!("range '{range}' precedes --font"))?;
            fonts[font].ranges.push(range.clone());
        }
        let symbol_positions = matches.indices_of("symbols").into_iter().flatten();
        for (symbols, position) in self.symbols.iter().zip(symbol_positions) {
            let font =
                owner(position).ok_or_else(|| format!("symbols '{symbols}' precede --font"))?;
            fonts[font].symbols.push_str(symbols);
        }
        Ok(fonts)
    }

    fn into_config(self, fonts: Vec<FontSourceConfig>) -> JobConfig {
        JobConfig {
            fonts,
            pixel_size: self.size,
            bit_depth: self.bpp,
            format: self.format,
            compress: !self.no_compress,
            prefilter: !self.no_prefilter,
            kerning: !self.no_kerning,
            missing_glyphs: self.missing,
            reserve_missing_glyph: !self.no_reserved_glyph,
            threads: self.threads,
            output: self.output,
            name: self.name,
            lv_include: self.lv_include,
            fallback: self.lv_fallback,
        }
    }
}

fn parse(matches: &ArgMatches) -> Result<JobConfig, String> {
    let args = Args::from_arg_matches(matches).map_err(|e| e.to_string())?;
    let fonts = args.font_sources(matches)?;
    Ok(args.into_config(fonts))
}

fn main() {
    env_logger::init();
    let matches = Args::command().get_matches();
    let config = match parse(&matches) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    match lvfont_conv::convert(config, &CancellationToken::new()) {
        Ok(report) => {
            for skipped in &report.skipped {
                log::warn!("skipped U+{:04X}: {}", skipped.codepoint, skipped.reason);
            }
            for warning in &report.warnings {
                log::warn!("{warning}");
            }
            println!("{report}");
        }
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn config(args: &[&str]) -> Result<JobConfig, String> {
        let matches = Args::command()
            .try_get_matches_from(std::iter::once("lvfont-conv").chain(args.iter().copied()))
            .map_err(|e| e.to_string())?;
        parse(&matches)
    }

    #[test]
    fn ranges_follow_their_font() {
        let config = config(&[
            "--size", "16", "--font", "a.ttf", "-r", "0x20-0x7F", "--range", "0x401",
            "--font", "b.ttf", "--symbols", "°±", "-r", "0xF000", "-o", "out.c",
        ])
        .unwrap();
        assert_eq!(
            config.fonts,
            [
                FontSourceConfig {
                    path: "a.ttf".into(),
                    ranges: vec!["0x20-0x7F".into(), "0x401".into()],
                    symbols: String::new(),
                },
                FontSourceConfig {
                    path: "b.ttf".into(),
                    ranges: vec!["0xF000".into()],
                    symbols: "°±".into(),
                },
            ]
        );
        assert_eq!(config.pixel_size, 16);
        assert_eq!(config.bit_depth, 4);
        assert_eq!(config.format, OutputFormat::CSource);
        assert!(config.compress && config.prefilter && config.kerning);
        assert!(config.reserve_missing_glyph);
    }

    #[test]
    fn flags() {
        let config = config(&[
            "--size", "24", "--bpp", "2", "--font", "a.ttf", "-r", "0x41", "--format", "bin",
            "--no-compress", "--no-kerning", "--no-reserved-glyph", "--threads", "3",
            "--name", "big", "--lv-include", "lvgl.h", "--lv-fallback", "lv_font_small",
            "-o", "out.bin",
        ])
        .unwrap();
        assert_eq!(config.bit_depth, 2);
        assert_eq!(config.format, OutputFormat::Binary);
        assert!(!config.compress);
        assert!(!config.kerning);
        assert!(!config.reserve_missing_glyph);
        assert_eq!(config.threads, Some(3));
        assert_eq!(config.name.as_deref(), Some("big"));
        assert_eq!(config.lv_include.as_deref(), Some("lvgl.h"));
        assert_eq!(config.fallback.as_deref(), Some("lv_font_small"));
        assert_eq!(config.output, PathBuf::from("out.bin"));
    }

    #[test]
    fn missing_policy() {
        let config = config(&[
            "--size", "16", "--font", "a.ttf", "-r", "0x41", "--missing", "substitute", "-o",
            "out.c",
        ])
        .unwrap();
        assert_eq!(config.missing_glyphs, MissingGlyphPolicy::Substitute);
    }

    #[rstest]
    #[case::no_font(&["--size", "16", "-r", "0x41", "-o", "out.c"])]
    #[case::unknown_format(&["--size", "16", "--font", "a.ttf", "--format", "svg", "-o", "out.c"])]
    #[case::range_before_font(&["-r", "0x41", "--size", "16", "--font", "a.ttf", "-o", "out.c"])]
    #[case::unknown_policy(&["--size", "16", "--font", "a.ttf", "--missing", "tofu", "-o", "out.c"])]
    #[case::no_output(&["--size", "16", "--font", "a.ttf"])]
    fn rejects_bad_input(#[case] args: &[&str]) {
        assert!(config(args).is_err());
    }

    #[test]
    fn verify_cli() {
        Args::command().debug_assert();
    }
}
