//! Building LVGL character maps
//!
//! LVGL resolves a codepoint to a glyph index through a list of subtables,
//! each covering a span of codepoints starting at `range_start`. There are
//! four kinds, distinguished by whether they store a list of codepoint
//! offsets (sparse) and whether they store glyph offsets (full):
//!
//! | kind           | codepoints          | glyph ids               |
//! |----------------|---------------------|-------------------------|
//! | `Format0Tiny`  | contiguous          | consecutive             |
//! | `Format0Full`  | contiguous          | `u8` offset per entry   |
//! | `SparseTiny`   | `u16` offset list   | consecutive             |
//! | `SparseFull`   | `u16` offset list   | `u16` offset per entry  |

use std::ops::Range;

/// Runs of consecutive codepoints with consecutive glyph ids at least this
/// long get a range subtable of their own.
pub const MIN_RANGE_RUN: usize = 3;

/// The longest span a single subtable can cover.
const MAX_SPAN: u32 = u16::MAX as u32;

/// The kind of a cmap subtable.
///
/// The discriminants match LVGL's `lv_font_fmt_txt_cmap_type_t`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum CmapFormat {
    Format0Full = 0,
    SparseFull = 1,
    Format0Tiny = 2,
    SparseTiny = 3,
}

impl CmapFormat {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CmapFormat::Format0Full),
            1 => Some(CmapFormat::SparseFull),
            2 => Some(CmapFormat::Format0Tiny),
            3 => Some(CmapFormat::SparseTiny),
            _ => None,
        }
    }

    pub fn lvgl_name(self) -> &'static str {
        match self {
            CmapFormat::Format0Full => "LV_FONT_FMT_TXT_CMAP_FORMAT0_FULL",
            CmapFormat::SparseFull => "LV_FONT_FMT_TXT_CMAP_SPARSE_FULL",
            CmapFormat::Format0Tiny => "LV_FONT_FMT_TXT_CMAP_FORMAT0_TINY",
            CmapFormat::SparseTiny => "LV_FONT_FMT_TXT_CMAP_SPARSE_TINY",
        }
    }

    pub fn is_sparse(self) -> bool {
        matches!(self, CmapFormat::SparseFull | CmapFormat::SparseTiny)
    }

    pub fn has_glyph_offsets(self) -> bool {
        matches!(self, CmapFormat::Format0Full | CmapFormat::SparseFull)
    }
}

/// One compiled cmap subtable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CmapSubtable {
    pub range_start: u32,
    /// Number of codepoints spanned, from `range_start` to the last covered
    /// codepoint inclusive.
    pub range_length: u16,
    pub glyph_id_start: u16,
    pub format: CmapFormat,
    /// Offsets from `range_start`; sparse formats only.
    pub unicode_list: Vec<u16>,
    /// Offsets from `glyph_id_start`; full formats only. Values fit in `u8`
    /// for `Format0Full`.
    pub glyph_id_ofs_list: Vec<u16>,
}

impl CmapSubtable {
    /// The number of entries in the per-codepoint lists.
    pub fn list_length(&self) -> usize {
        if self.format.is_sparse() {
            self.unicode_list.len()
        } else {
            self.glyph_id_ofs_list.len()
        }
    }

    pub fn lookup(&self, codepoint: u32) -> Option<u16> {
        let offset = codepoint.checked_sub(self.range_start)?;
        if offset >= self.range_length as u32 {
            return None;
        }
        let entry = match self.format {
            CmapFormat::Format0Tiny => return Some(self.glyph_id_start + offset as u16),
            CmapFormat::Format0Full => offset as usize,
            CmapFormat::SparseTiny | CmapFormat::SparseFull => {
                self.unicode_list.binary_search(&(offset as u16)).ok()?
            }
        };
        let glyph_offset = match self.format {
            CmapFormat::SparseTiny => entry as u16,
            _ => *self.glyph_id_ofs_list.get(entry)?,
        };
        Some(self.glyph_id_start + glyph_offset)
    }

    /// Codepoint to glyph index pairs covered by this subtable.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        let codepoints: Box<dyn Iterator<Item = u32> + '_> = if self.format.is_sparse() {
            Box::new(
                self.unicode_list
                    .iter()
                    .map(|offset| self.range_start + *offset as u32),
            )
        } else {
            Box::new(self.range_start..self.range_start + self.range_length as u32)
        };
        codepoints.filter_map(|cp| self.lookup(cp).map(|gid| (cp, gid)))
    }

    fn range(mappings: &[(u32, u16)]) -> Self {
        let (first_cp, first_gid) = mappings[0];
        CmapSubtable {
            range_start: first_cp,
            range_length: mappings.len() as u16,
            glyph_id_start: first_gid,
            format: CmapFormat::Format0Tiny,
            unicode_list: Vec::new(),
            glyph_id_ofs_list: Vec::new(),
        }
    }

    fn sparse_block(mappings: &[(u32, u16)]) -> Self {
        if run_len(mappings) == mappings.len() {
            return CmapSubtable::range(mappings);
        }
        let first_cp = mappings[0].0;
        let last_cp = mappings[mappings.len() - 1].0;
        let min_gid = mappings.iter().map(|(_, gid)| *gid).min().unwrap_or_default();
        let max_gid = mappings.iter().map(|(_, gid)| *gid).max().unwrap_or_default();
        let range_length = (last_cp - first_cp + 1) as u16;
        let contiguous = range_length as usize == mappings.len();

        if contiguous && max_gid - min_gid <= u8::MAX as u16 {
            return CmapSubtable {
                range_start: first_cp,
                range_length,
                glyph_id_start: min_gid,
                format: CmapFormat::Format0Full,
                unicode_list: Vec::new(),
                glyph_id_ofs_list: mappings.iter().map(|(_, gid)| gid - min_gid).collect(),
            };
        }

        let unicode_list = mappings
            .iter()
            .map(|(cp, _)| (cp - first_cp) as u16)
            .collect();
        let consecutive_ids = mappings
            .windows(2)
            .all(|w| w[0].1.checked_add(1) == Some(w[1].1));
        if consecutive_ids {
            CmapSubtable {
                range_start: first_cp,
                range_length,
                glyph_id_start: mappings[0].1,
                format: CmapFormat::SparseTiny,
                unicode_list,
                glyph_id_ofs_list: Vec::new(),
            }
        } else {
            CmapSubtable {
                range_start: first_cp,
                range_length,
                glyph_id_start: min_gid,
                format: CmapFormat::SparseFull,
                unicode_list,
                glyph_id_ofs_list: mappings.iter().map(|(_, gid)| gid - min_gid).collect(),
            }
        }
    }
}

/// A conflicting cmap definition: one codepoint is mapped to two glyphs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmapConflict {
    pub codepoint: u32,
    pub gid1: u16,
    pub gid2: u16,
}

impl std::fmt::Display for CmapConflict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cannot map U+{:04X} to two different glyph ids: {} and {}",
            self.codepoint, self.gid1, self.gid2
        )
    }
}

impl std::error::Error for CmapConflict {}

/// The compiled character map of a font.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharacterMap {
    subtables: Vec<CmapSubtable>,
}

impl CharacterMap {
    /// Builds the subtables for a set of `(codepoint, glyph index)` pairs.
    ///
    /// Maximal runs of consecutive codepoints with consecutive glyph ids that
    /// are at least [`MIN_RANGE_RUN`] long become `Format0Tiny` subtables;
    /// everything between them is collected into sparse blocks and stored in
    /// whichever format fits them best.
    pub fn from_mappings(
        mappings: impl IntoIterator<Item = (u32, u16)>,
    ) -> Result<Self, CmapConflict> {
        let mut mappings: Vec<_> = mappings.into_iter().collect();
        mappings.sort();
        mappings.dedup();
        if let Some(conflict) = mappings.windows(2).find_map(|w| {
            (w[0].0 == w[1].0).then_some(CmapConflict {
                codepoint: w[0].0,
                gid1: w[0].1,
                gid2: w[1].1,
            })
        }) {
            return Err(conflict);
        }

        let mut subtables = Vec::new();
        let mut pending: Option<Range<usize>> = None;
        let mut start = 0;
        while start < mappings.len() {
            let len = run_len(&mappings[start..]);
            let run = start..start + len;
            if len >= MIN_RANGE_RUN {
                if let Some(block) = pending.take() {
                    push_sparse(&mut subtables, &mappings[block]);
                }
                subtables.push(CmapSubtable::range(&mappings[run.clone()]));
            } else {
                pending = Some(match pending {
                    Some(block) => block.start..run.end,
                    None => run.clone(),
                });
            }
            start = run.end;
        }
        if let Some(block) = pending {
            push_sparse(&mut subtables, &mappings[block]);
        }

        log::debug!(
            "cmap: {} mappings in {} subtables",
            mappings.len(),
            subtables.len()
        );
        Ok(CharacterMap { subtables })
    }

    pub fn subtables(&self) -> &[CmapSubtable] {
        &self.subtables
    }

    /// The glyph index for `codepoint`, if the font covers it.
    pub fn lookup(&self, codepoint: u32) -> Option<u16> {
        self.subtables
            .iter()
            .find_map(|subtable| subtable.lookup(codepoint))
    }

    /// Like [`lookup`](Self::lookup) but resolves misses to `missing_glyph`.
    pub fn lookup_or(&self, codepoint: u32, missing_glyph: Option<u16>) -> Option<u16> {
        self.lookup(codepoint).or(missing_glyph)
    }

    /// All mappings, in subtable order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.subtables.iter().flat_map(CmapSubtable::iter)
    }

    pub fn len(&self) -> usize {
        self.subtables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subtables.is_empty()
    }
}

impl FromIterator<CmapSubtable> for CharacterMap {
    fn from_iter<T: IntoIterator<Item = CmapSubtable>>(iter: T) -> Self {
        CharacterMap {
            subtables: iter.into_iter().collect(),
        }
    }
}

/// Length of the unit-slope run at the start of `mappings`, capped so that a
/// range subtable can hold it.
fn run_len(mappings: &[(u32, u16)]) -> usize {
    let Some(&(first_cp, _)) = mappings.first() else {
        return 0;
    };
    1 + mappings
        .windows(2)
        .take_while(|w| {
            w[1].0 == w[0].0 + 1
                && w[0].1.checked_add(1) == Some(w[1].1)
                && w[1].0 - first_cp < MAX_SPAN
        })
        .count()
}

/// Splits a sparse block into pieces whose span fits in a `u16` offset.
fn push_sparse(subtables: &mut Vec<CmapSubtable>, mappings: &[(u32, u16)]) {
    let mut rest = mappings;
    while let Some(&(first_cp, _)) = rest.first() {
        let len = rest
            .iter()
            .take_while(|(cp, _)| cp - first_cp < MAX_SPAN)
            .count();
        let (block, tail) = rest.split_at(len);
        subtables.push(CmapSubtable::sparse_block(block));
        rest = tail;
    }
}
