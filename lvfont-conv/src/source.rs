//! A glyph source backed by a font file.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use lvfont_tables::{
    metrics::Decoration, BitDepth, Bitmap, DesignMetrics, Error, GlyphSource, RasterGlyph,
    RenderError,
};
use skrifa::{
    instance::{LocationRef, Size},
    outline::{DrawSettings, OutlinePen},
    raw::{FontRef, TableProvider},
    GlyphId, MetadataProvider, Tag,
};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Transform};

use crate::kern::KernPairs;

const KERN: Tag = Tag::new(b"kern");

/// A TrueType or OpenType font, rendered with `skrifa` and `tiny-skia`.
#[derive(Clone, Debug)]
pub struct SkrifaSource {
    path: PathBuf,
    data: Vec<u8>,
    index: u32,
    metrics: DesignMetrics,
    /// Every codepoint the character map assigns a real glyph to.
    glyphs: HashMap<u32, GlyphId>,
    kerning: KernPairs,
}

impl SkrifaSource {
    /// Loads the first font in the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|err| Error::FontLoad {
            path: path.to_owned(),
            reason: err.to_string(),
        })?;
        Self::from_bytes(path, data, 0)
    }

    /// Parses font data; `path` is only used in messages.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>, index: u32) -> Result<Self, Error> {
        let path = path.into();
        let load_error = |reason: String| Error::FontLoad {
            path: path.clone(),
            reason,
        };
        let font = FontRef::from_index(&data, index).map_err(|err| load_error(err.to_string()))?;
        let head = font.head().map_err(|err| load_error(format!("head table: {err}")))?;
        if head.units_per_em() == 0 {
            return Err(load_error("units per em is zero".into()));
        }
        let metrics = font.metrics(Size::unscaled(), LocationRef::default());
        let metrics = DesignMetrics {
            units_per_em: metrics.units_per_em,
            ascent: metrics.ascent,
            descent: metrics.descent,
            underline: metrics.underline.map(|line| Decoration {
                position: line.offset,
                thickness: line.thickness,
            }),
        };
        let glyphs: HashMap<u32, GlyphId> = font
            .charmap()
            .mappings()
            .filter(|(_, gid)| *gid != GlyphId::NOTDEF)
            .collect();
        log::debug!("{}: {} mapped codepoints", path.display(), glyphs.len());
        let kerning = match font.table_data(KERN) {
            Some(table) => KernPairs::parse(table).unwrap_or_else(|err| {
                log::warn!("{}: ignoring malformed kern table: {err}", path.display());
                KernPairs::default()
            }),
            None => KernPairs::default(),
        };
        if !kerning.is_empty() {
            log::debug!("{}: {} kerning pairs", path.display(), kerning.len());
        }
        Ok(SkrifaSource {
            path,
            data,
            index,
            metrics,
            glyphs,
            kerning,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn font(&self) -> Result<FontRef<'_>, RenderError> {
        FontRef::from_index(&self.data, self.index).map_err(|err| RenderError::new(err.to_string()))
    }

    /// Whether the character map has a glyph for `codepoint`.
    pub fn contains(&self, codepoint: u32) -> bool {
        self.glyphs.contains_key(&codepoint)
    }

    fn glyph_id(&self, codepoint: u32) -> Option<GlyphId> {
        self.glyphs.get(&codepoint).copied()
    }

    fn rasterize(
        &self,
        font: &FontRef,
        gid: GlyphId,
        pixel_size: u16,
        depth: BitDepth,
    ) -> Result<RasterGlyph, RenderError> {
        let size = Size::new(pixel_size as f32);
        let advance = font
            .glyph_metrics(size, LocationRef::default())
            .advance_width(gid)
            .unwrap_or_default();
        let outline = font
            .outline_glyphs()
            .get(gid)
            .ok_or_else(|| RenderError::new(format!("no outline for glyph {}", gid.to_u32())))?;
        let mut pen = PathPen::new();
        outline
            .draw(DrawSettings::unhinted(size, LocationRef::default()), &mut pen)
            .map_err(|err| RenderError::new(err.to_string()))?;
        let Some(path) = pen.builder.finish() else {
            // blank glyphs such as the space
            return Ok(RasterGlyph {
                advance,
                ..Default::default()
            });
        };

        let bounds = path.bounds();
        let left = bounds.left().floor();
        let top = bounds.top().floor();
        let width = (bounds.right().ceil() - left) as u32;
        let height = (bounds.bottom().ceil() - top) as u32;
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(RenderError::new(format!("glyph is too large: {width}x{height}")));
        }
        let Some(mut pixmap) = Pixmap::new(width, height) else {
            return Ok(RasterGlyph {
                advance,
                ..Default::default()
            });
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(0, 0, 0, 255);
        paint.anti_alias = true;
        pixmap.fill_path(
            &path,
            &paint,
            FillRule::Winding,
            Transform::from_translate(-left, -top),
            None,
        );

        let coverage = pixmap
            .pixels()
            .iter()
            .map(|pixel| depth.quantize(pixel.alpha()))
            .collect();
        let bitmap = Bitmap::from_pixels(width as u16, height as u16, coverage)
            .ok_or_else(|| RenderError::new("coverage does not match the pixmap size"))?;
        let (bitmap, dx, dy) = trim(&bitmap);
        Ok(RasterGlyph {
            bitmap,
            bearing_x: left as i16 + dx as i16,
            // pen coordinates are flipped, so `-top` is the distance above the baseline
            bearing_y: -(top as i16) - dy as i16,
            advance,
        })
    }
}

impl GlyphSource for SkrifaSource {
    fn font_metrics(&self) -> DesignMetrics {
        self.metrics
    }

    fn render(
        &self,
        codepoint: u32,
        pixel_size: u16,
        depth: BitDepth,
    ) -> Result<Option<RasterGlyph>, RenderError> {
        let Some(gid) = self.glyph_id(codepoint) else {
            return Ok(None);
        };
        let font = self.font()?;
        self.rasterize(&font, gid, pixel_size, depth).map(Some)
    }

    fn missing_glyph(&self, pixel_size: u16, depth: BitDepth) -> Result<RasterGlyph, RenderError> {
        let font = self.font()?;
        self.rasterize(&font, GlyphId::NOTDEF, pixel_size, depth)
    }

    fn kerning(&self, left: u32, right: u32, pixel_size: u16) -> f32 {
        if self.kerning.is_empty() {
            return 0.0;
        }
        let glyph = |codepoint| {
            self.glyph_id(codepoint)
                .and_then(|gid| u16::try_from(gid.to_u32()).ok())
        };
        let (Some(left), Some(right)) = (glyph(left), glyph(right)) else {
            return 0.0;
        };
        self.kerning.get(left, right) as f32 * pixel_size as f32
            / self.metrics.units_per_em as f32
    }
}

/// Collects outline commands into a `tiny-skia` path with y pointing down.
struct PathPen {
    builder: PathBuilder,
}

impl PathPen {
    fn new() -> Self {
        PathPen {
            builder: PathBuilder::new(),
        }
    }
}

impl OutlinePen for PathPen {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(x, -y);
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(x, -y);
    }

    fn quad_to(&mut self, cx0: f32, cy0: f32, x: f32, y: f32) {
        self.builder.quad_to(cx0, -cy0, x, -y);
    }

    fn curve_to(&mut self, cx0: f32, cy0: f32, cx1: f32, cy1: f32, x: f32, y: f32) {
        self.builder.cubic_to(cx0, -cy0, cx1, -cy1, x, -y);
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

/// Drops blank rows and columns from the edges of a bitmap.
///
/// Returns the trimmed bitmap and how many columns and rows were removed
/// from the left and top.
fn trim(bitmap: &Bitmap) -> (Bitmap, u16, u16) {
    let width = bitmap.width();
    let height = bitmap.height();
    let row_used = |y: u16| bitmap.row(y).is_some_and(|row| row.iter().any(|px| *px != 0));
    let column_used = |x: u16| (0..height).any(|y| bitmap.get(x, y).unwrap_or(0) != 0);
    let Some(top) = (0..height).find(|y| row_used(*y)) else {
        return (Bitmap::default(), 0, 0);
    };
    let bottom = (0..height).rev().find(|y| row_used(*y)).unwrap_or(top);
    let left = (0..width).find(|x| column_used(*x)).unwrap_or(0);
    let right = (0..width).rev().find(|x| column_used(*x)).unwrap_or(left);

    let mut trimmed = Bitmap::new(right - left + 1, bottom - top + 1);
    for y in top..=bottom {
        for x in left..=right {
            trimmed.set(x - left, y - top, bitmap.get(x, y).unwrap_or(0));
        }
    }
    (trimmed, left, top)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_blank_edges() {
        #[rustfmt::skip]
        let pixels = vec![
            0, 0, 0, 0,
            0, 3, 0, 0,
            0, 1, 2, 0,
            0, 0, 0, 0,
        ];
        let bitmap = Bitmap::from_pixels(4, 4, pixels).unwrap();
        let (trimmed, dx, dy) = trim(&bitmap);
        assert_eq!((dx, dy), (1, 1));
        assert_eq!((trimmed.width(), trimmed.height()), (2, 2));
        assert_eq!(trimmed.pixels().collect::<Vec<_>>(), [3, 0, 1, 2]);
    }

    #[test]
    fn blank_bitmaps_trim_to_nothing() {
        let (trimmed, dx, dy) = trim(&Bitmap::new(3, 5));
        assert!(trimmed.is_empty());
        assert_eq!((dx, dy), (0, 0));
    }

    #[test]
    fn pen_flips_y() {
        let mut pen = PathPen::new();
        pen.move_to(0.0, 0.0);
        pen.line_to(4.0, 0.0);
        pen.line_to(4.0, 6.0);
        pen.close();
        let path = pen.builder.finish().unwrap();
        let bounds = path.bounds();
        assert_eq!(bounds.top(), -6.0);
        assert_eq!(bounds.bottom(), 0.0);
        assert_eq!(bounds.right(), 4.0);
    }

    #[test]
    fn load_failures() {
        let missing = SkrifaSource::load("does/not/exist.ttf");
        assert!(matches!(missing, Err(Error::FontLoad { .. })));
        let garbage = SkrifaSource::from_bytes("garbage.ttf", vec![0; 12], 0);
        assert!(matches!(garbage, Err(Error::FontLoad { .. })));
    }
}
