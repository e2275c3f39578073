//! Errors that occur while compiling a font

use std::path::PathBuf;

use thiserror::Error;

use crate::{bitmap::BitDepth, cmap::CmapConflict, metrics::MetricsError, ranges::RangeSyntaxError};

/// An error that aborts a conversion job.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Error loading font '{}': {reason}", path.display())]
    FontLoad { path: PathBuf, reason: String },

    #[error("Unsupported bit depth {0}, expected one of 1, 2, 3, 4 or 8")]
    UnsupportedBitDepth(u8),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    RangeSyntax(#[from] RangeSyntaxError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Glyph for U+{codepoint:04X} has pixel value {value}, which does not fit in {depth}")]
    PixelOutOfRange {
        codepoint: u32,
        value: u8,
        depth: BitDepth,
    },

    #[error("No glyphs were rendered for the requested ranges")]
    NoGlyphs,

    #[error("Font has {0} glyphs, at most 65535 are supported")]
    TooManyGlyphs(usize),

    #[error(transparent)]
    Cmap(#[from] CmapConflict),

    #[error("Conversion was cancelled")]
    Cancelled,

    #[error("Failed to create worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An error reported by a [`GlyphSource`](crate::GlyphSource) for a single glyph.
///
/// These are recoverable: the codepoint is skipped and listed in the job report.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct RenderError(pub String);

impl RenderError {
    pub fn new(message: impl Into<String>) -> Self {
        RenderError(message.into())
    }
}

/// Why a requested codepoint is absent from the compiled font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SkipReason {
    /// The font has no glyph for this codepoint.
    MissingGlyph,
    /// The glyph source failed to render the glyph.
    RenderFailed(String),
    /// Another font source (or the reserved glyph) already claimed the mapped codepoint.
    Duplicate { font_index: usize },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingGlyph => f.write_str("glyph not found"),
            SkipReason::RenderFailed(reason) => write!(f, "rendering failed: {reason}"),
            SkipReason::Duplicate { font_index } => {
                write!(f, "already provided by font #{font_index}")
            }
        }
    }
}
