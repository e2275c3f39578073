//! Font-wide metrics in pixels.

use thiserror::Error;

use crate::{bitmap::BitDepth, glyph::GlyphRecord};

/// Font metrics in design units, as reported by a glyph source.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DesignMetrics {
    pub units_per_em: u16,
    /// Distance from the baseline to the top of the line, positive up.
    pub ascent: f32,
    /// Distance from the baseline to the bottom of the line. Fonts usually
    /// store this as a negative number; only the magnitude is used.
    pub descent: f32,
    pub underline: Option<Decoration>,
}

/// Position and thickness of a text decoration line.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Decoration {
    /// Offset of the line from the baseline, positive up.
    pub position: f32,
    pub thickness: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MetricsError {
    #[error("Font reports zero units per em")]
    ZeroUnitsPerEm,
    #[error("Pixel size must be positive")]
    InvalidPixelSize,
}

/// Metrics shared by every glyph in a compiled font.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FontMetrics {
    pub bit_depth: BitDepth,
    pub pixel_size: u16,
    pub ascent: u16,
    /// Magnitude of the descent.
    pub descent: u16,
    /// `ascent + descent`
    pub line_height: u16,
    /// Distance from the top of the line box to the baseline.
    pub baseline_offset: u16,
    pub underline_position: i16,
    pub underline_thickness: u16,
}

impl FontMetrics {
    /// Scales design metrics to `pixel_size`.
    pub fn new(
        design: &DesignMetrics,
        pixel_size: u16,
        bit_depth: BitDepth,
    ) -> Result<Self, MetricsError> {
        if pixel_size == 0 {
            return Err(MetricsError::InvalidPixelSize);
        }
        if design.units_per_em == 0 {
            return Err(MetricsError::ZeroUnitsPerEm);
        }
        let scale = pixel_size as f32 / design.units_per_em as f32;
        let ascent = scale_unsigned(design.ascent, scale);
        let descent = scale_unsigned(design.descent.abs(), scale);
        let (underline_position, underline_thickness) = design
            .underline
            .map(|line| {
                (
                    (line.position * scale).round() as i16,
                    scale_unsigned(line.thickness, scale),
                )
            })
            .unwrap_or_default();
        Ok(FontMetrics {
            bit_depth,
            pixel_size,
            ascent,
            descent,
            line_height: ascent.saturating_add(descent),
            baseline_offset: ascent,
            underline_position,
            underline_thickness,
        })
    }

    /// The baseline measured from the bottom of the line box, as LVGL's
    /// `base_line` field expects.
    pub fn base_line(&self) -> u16 {
        self.descent
    }

    /// Reports how far a glyph sticks out of the line box, if at all.
    pub fn clipping(&self, glyph: &GlyphRecord) -> Option<Clipping> {
        if glyph.bitmap.is_empty() {
            return None;
        }
        let top = glyph.bearing_y as i32;
        let bottom = glyph.offset_y() as i32;
        let above = (top - self.ascent as i32).max(0) as u16;
        let below = (-bottom - self.descent as i32).max(0) as u16;
        (above > 0 || below > 0).then_some(Clipping { above, below })
    }
}

fn scale_unsigned(value: f32, scale: f32) -> u16 {
    (value * scale).round().clamp(0.0, u16::MAX as f32) as u16
}

/// Pixels of a glyph outside the line box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Clipping {
    pub above: u16,
    pub below: u16,
}
