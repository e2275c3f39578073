//! Compiling glyph bitmaps into LVGL font tables.
//!
//! This crate turns rendered glyphs into the data structures of LVGL's
//! `lv_font_fmt_txt` font format: packed (and optionally compressed) glyph
//! bitmaps, glyph descriptors, a character map and a kerning table. Glyphs
//! come from a [`GlyphSource`]; the `lvfont-conv` crate provides one backed
//! by real font files.
//!
//! A conversion is described by a [`JobConfig`] and run by a
//! [`ConversionJob`]:
//!
//! ```no_run
//! # use lvfont_tables::{CancellationToken, ConversionJob, FontSourceConfig, GlyphSource, JobConfig};
//! # fn convert(source: impl GlyphSource + Sync) -> Result<(), lvfont_tables::Error> {
//! let config = JobConfig {
//!     fonts: vec![FontSourceConfig {
//!         path: "Roboto-Regular.ttf".into(),
//!         ranges: vec!["0x20-0x7F".into()],
//!         symbols: String::new(),
//!     }],
//!     output: "lv_font_roboto_16.c".into(),
//!     ..Default::default()
//! };
//! let job = ConversionJob::new(config)?;
//! let report = job.run(&[source], &CancellationToken::new())?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod bitmap;
pub mod cmap;
pub mod compress;
mod error;
pub mod font;
pub mod glyph;
pub mod job;
pub mod kern;
pub mod metrics;
pub mod pack;
pub mod ranges;
mod source;
pub mod write;

pub use bitmap::{BitDepth, Bitmap};
pub use error::{Error, RenderError, SkipReason};
pub use font::CompiledFont;
pub use glyph::RasterGlyph;
pub use job::{
    CancellationToken, Compilation, ConversionJob, FontSourceConfig, JobConfig, JobReport,
    MissingGlyphPolicy, Skipped, Warning,
};
pub use metrics::DesignMetrics;
pub use source::GlyphSource;
pub use write::OutputFormat;
