//! Converting TrueType and OpenType fonts into LVGL bitmap fonts.
//!
//! Glyphs are rasterized by [`SkrifaSource`] and compiled with
//! [`lvfont_tables`].

mod kern;
mod source;

pub use lvfont_tables as tables;
pub use source::SkrifaSource;

use lvfont_tables::{CancellationToken, ConversionJob, Error, JobConfig, JobReport};

/// Loads the fonts named in `config`, in order.
pub fn load_sources(config: &JobConfig) -> Result<Vec<SkrifaSource>, Error> {
    config
        .fonts
        .iter()
        .map(|font| SkrifaSource::load(&font.path))
        .collect()
}

/// Runs a complete conversion: validates `config`, loads its fonts, and
/// writes the compiled font to `config.output`.
pub fn convert(config: JobConfig, cancel: &CancellationToken) -> Result<JobReport, Error> {
    let job = ConversionJob::new(config)?;
    let sources = load_sources(job.config())?;
    job.run(&sources, cancel)
}
