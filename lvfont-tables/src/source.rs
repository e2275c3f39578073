//! The interface to whatever renders glyphs.

use crate::{bitmap::BitDepth, error::RenderError, glyph::RasterGlyph, metrics::DesignMetrics};

/// Provides metrics, glyph images and kerning for one font.
///
/// Implementations must be usable from several threads at once; glyphs of a
/// job are rendered in parallel.
pub trait GlyphSource {
    /// Font-wide metrics in design units.
    fn font_metrics(&self) -> DesignMetrics;

    /// Renders the glyph for `codepoint`.
    ///
    /// Returns `Ok(None)` if the font has no glyph for the codepoint. Pixel
    /// values of the returned bitmap must already be quantized to `depth`.
    fn render(
        &self,
        codepoint: u32,
        pixel_size: u16,
        depth: BitDepth,
    ) -> Result<Option<RasterGlyph>, RenderError>;

    /// Renders the image the font uses for missing characters.
    fn missing_glyph(&self, pixel_size: u16, depth: BitDepth) -> Result<RasterGlyph, RenderError> {
        let _ = (pixel_size, depth);
        Ok(RasterGlyph::default())
    }

    /// The horizontal adjustment in pixels between two characters.
    fn kerning(&self, left: u32, right: u32, pixel_size: u16) -> f32 {
        let _ = (left, right, pixel_size);
        0.0
    }
}

impl<T: GlyphSource + ?Sized> GlyphSource for &T {
    fn font_metrics(&self) -> DesignMetrics {
        (**self).font_metrics()
    }

    fn render(
        &self,
        codepoint: u32,
        pixel_size: u16,
        depth: BitDepth,
    ) -> Result<Option<RasterGlyph>, RenderError> {
        (**self).render(codepoint, pixel_size, depth)
    }

    fn missing_glyph(&self, pixel_size: u16, depth: BitDepth) -> Result<RasterGlyph, RenderError> {
        (**self).missing_glyph(pixel_size, depth)
    }

    fn kerning(&self, left: u32, right: u32, pixel_size: u16) -> f32 {
        (**self).kerning(left, right, pixel_size)
    }
}

impl<T: GlyphSource + ?Sized> GlyphSource for Box<T> {
    fn font_metrics(&self) -> DesignMetrics {
        (**self).font_metrics()
    }

    fn render(
        &self,
        codepoint: u32,
        pixel_size: u16,
        depth: BitDepth,
    ) -> Result<Option<RasterGlyph>, RenderError> {
        (**self).render(codepoint, pixel_size, depth)
    }

    fn missing_glyph(&self, pixel_size: u16, depth: BitDepth) -> Result<RasterGlyph, RenderError> {
        (**self).missing_glyph(pixel_size, depth)
    }

    fn kerning(&self, left: u32, right: u32, pixel_size: u16) -> f32 {
        (**self).kerning(left, right, pixel_size)
    }
}
