//! Building kerning tables
//!
//! LVGL stores kerning values as signed bytes that are multiplied by a font
//! wide `kern_scale` (12.4 fixed point) to get a 4.4 fixed point pixel
//! adjustment. Two layouts exist: a sorted list of glyph pairs, and a class
//! table where glyphs with identical kerning behaviour share a class.

use std::collections::BTreeMap;

/// A `kern_scale` of 1.0 in 12.4 fixed point.
const UNIT_SCALE: u16 = 16;

/// The most classes one side of a class table can have; class 0 is reserved
/// for "no kerning".
pub const MAX_CLASSES: usize = u8::MAX as usize;

/// Serialized size of one pair: two `u16` glyph ids and a value.
const PAIR_RECORD_LEN: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct KerningPair {
    pub left: u16,
    pub right: u16,
    pub value: i8,
}

/// Glyph pairs sorted by `(left, right)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KerningPairs {
    pub pairs: Vec<KerningPair>,
}

impl KerningPairs {
    pub fn value(&self, left: u16, right: u16) -> i8 {
        self.pairs
            .binary_search_by(|pair| (pair.left, pair.right).cmp(&(left, right)))
            .map(|idx| self.pairs[idx].value)
            .unwrap_or(0)
    }
}

/// A class based kerning table.
///
/// Classes are numbered from 1; the value for classes `l` and `r` is
/// `values[(l - 1) * right_count + (r - 1)]`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KerningClasses {
    /// Class of every glyph when it is on the left side.
    pub left_mapping: Vec<u8>,
    /// Class of every glyph when it is on the right side.
    pub right_mapping: Vec<u8>,
    pub left_count: u8,
    pub right_count: u8,
    pub values: Vec<i8>,
}

impl KerningClasses {
    pub fn value(&self, left: u16, right: u16) -> i8 {
        let left_class = self.left_mapping.get(left as usize).copied().unwrap_or(0);
        let right_class = self.right_mapping.get(right as usize).copied().unwrap_or(0);
        if left_class == 0 || right_class == 0 {
            return 0;
        }
        let idx = (left_class as usize - 1) * self.right_count as usize + right_class as usize - 1;
        self.values.get(idx).copied().unwrap_or(0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum KerningTable {
    Pairs(KerningPairs),
    Classes(KerningClasses),
}

impl KerningTable {
    pub fn value(&self, left: u16, right: u16) -> i8 {
        match self {
            KerningTable::Pairs(pairs) => pairs.value(left, right),
            KerningTable::Classes(classes) => classes.value(left, right),
        }
    }
}

/// The compiled kerning of a font.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Kerning {
    /// Multiplier for stored values, 12.4 fixed point.
    pub scale: u16,
    pub table: Option<KerningTable>,
}

impl Default for Kerning {
    fn default() -> Self {
        Kerning {
            scale: UNIT_SCALE,
            table: None,
        }
    }
}

impl Kerning {
    pub fn is_empty(&self) -> bool {
        self.table.is_none()
    }

    /// The stored value for a glyph pair, 0 if the pair isn't kerned.
    pub fn value(&self, left: u16, right: u16) -> i8 {
        self.table
            .as_ref()
            .map_or(0, |table| table.value(left, right))
    }

    /// The adjustment in pixels LVGL applies between two glyphs.
    pub fn adjust(&self, left: u16, right: u16) -> f32 {
        self.value(left, right) as f32 * self.scale as f32 / 256.0
    }
}

/// Collects pixel adjustments for glyph pairs and compiles them.
#[derive(Clone, Debug)]
pub struct KerningBuilder {
    glyph_count: u16,
    adjustments: BTreeMap<(u16, u16), f32>,
}

impl KerningBuilder {
    pub fn new(glyph_count: u16) -> Self {
        KerningBuilder {
            glyph_count,
            adjustments: BTreeMap::new(),
        }
    }

    /// Records the adjustment in pixels for a glyph pair. Zero is ignored.
    pub fn add(&mut self, left: u16, right: u16, adjust: f32) {
        if adjust != 0.0 && adjust.is_finite() {
            self.adjustments.insert((left, right), adjust);
        }
    }

    pub fn build(self) -> Kerning {
        let max_fp4 = self
            .adjustments
            .values()
            .map(|adjust| (adjust * 16.0).abs())
            .fold(0.0f32, f32::max);
        let scale = ((max_fp4 * UNIT_SCALE as f32 / i8::MAX as f32).ceil() as u16).max(UNIT_SCALE);

        let pairs: Vec<KerningPair> = self
            .adjustments
            .iter()
            .filter_map(|(&(left, right), adjust)| {
                let value = (adjust * 16.0 * UNIT_SCALE as f32 / scale as f32)
                    .round()
                    .clamp(-(i8::MAX as f32), i8::MAX as f32) as i8;
                (value != 0).then_some(KerningPair { left, right, value })
            })
            .collect();
        if pairs.is_empty() {
            return Kerning::default();
        }

        let pairs_len = pairs.len() * PAIR_RECORD_LEN;
        let table = match build_classes(&pairs, self.glyph_count) {
            Some(classes)
                if 2 * self.glyph_count as usize + classes.values.len() < pairs_len =>
            {
                log::debug!(
                    "kern: {} pairs as {}x{} classes",
                    pairs.len(),
                    classes.left_count,
                    classes.right_count
                );
                KerningTable::Classes(classes)
            }
            _ => {
                log::debug!("kern: {} pairs", pairs.len());
                KerningTable::Pairs(KerningPairs { pairs })
            }
        };
        Kerning {
            scale,
            table: Some(table),
        }
    }
}

/// Groups glyphs with identical rows (left side) or columns (right side).
///
/// Returns `None` if either side needs more than [`MAX_CLASSES`] classes.
fn build_classes(pairs: &[KerningPair], glyph_count: u16) -> Option<KerningClasses> {
    let mut rows: BTreeMap<u16, Vec<(u16, i8)>> = BTreeMap::new();
    let mut columns: BTreeMap<u16, Vec<(u16, i8)>> = BTreeMap::new();
    for pair in pairs {
        rows.entry(pair.left).or_default().push((pair.right, pair.value));
        columns.entry(pair.right).or_default().push((pair.left, pair.value));
    }
    let (left_mapping, left_count) = assign_classes(&rows, glyph_count)?;
    let (right_mapping, right_count) = assign_classes(&columns, glyph_count)?;

    let mut values = vec![0i8; left_count as usize * right_count as usize];
    for pair in pairs {
        let left = left_mapping[pair.left as usize] as usize - 1;
        let right = right_mapping[pair.right as usize] as usize - 1;
        values[left * right_count as usize + right] = pair.value;
    }
    Some(KerningClasses {
        left_mapping,
        right_mapping,
        left_count,
        right_count,
        values,
    })
}

fn assign_classes(
    vectors: &BTreeMap<u16, Vec<(u16, i8)>>,
    glyph_count: u16,
) -> Option<(Vec<u8>, u8)> {
    let mut mapping = vec![0u8; glyph_count as usize];
    let mut classes: BTreeMap<&[(u16, i8)], u8> = BTreeMap::new();
    for (glyph, vector) in vectors {
        let next = classes.len() + 1;
        let class = match classes.get(vector.as_slice()) {
            Some(class) => *class,
            None if next <= MAX_CLASSES => {
                classes.insert(vector.as_slice(), next as u8);
                next as u8
            }
            None => return None,
        };
        *mapping.get_mut(*glyph as usize)? = class;
    }
    Some((mapping, classes.len() as u8))
}
