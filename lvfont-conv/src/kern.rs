//! Pair adjustments from the legacy `kern` table.
//!
//! The table is read with `read-fonts`, which understands both the OpenType
//! and the Apple headers. Only horizontal format 0 subtables contribute;
//! their values are summed per glyph pair.

use std::collections::HashMap;

use skrifa::raw::{
    tables::kern::{Kern, SubtableKind},
    FontData, FontRead, ReadError,
};

/// Kerning values in design units, keyed by glyph id pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct KernPairs {
    pairs: HashMap<(u16, u16), i16>,
}

impl KernPairs {
    pub(crate) fn parse(data: FontData) -> Result<Self, ReadError> {
        let kern = Kern::read(data)?;
        let mut pairs = HashMap::new();
        for subtable in kern.subtables() {
            let subtable = subtable?;
            if !subtable.is_horizontal() || subtable.is_cross_stream() || subtable.is_variable() {
                continue;
            }
            match subtable.kind() {
                Ok(SubtableKind::Format0(format0)) => {
                    for pair in format0.pairs() {
                        let entry = pairs
                            .entry((pair.left().to_u16(), pair.right().to_u16()))
                            .or_insert(0i16);
                        *entry = entry.saturating_add(pair.value());
                    }
                }
                Ok(_) => log::debug!("skipping kern subtable that is not format 0"),
                Err(err) => log::warn!("skipping unreadable kern subtable: {err}"),
            }
        }
        Ok(KernPairs { pairs })
    }

    pub(crate) fn get(&self, left: u16, right: u16) -> i16 {
        self.pairs.get(&(left, right)).copied().unwrap_or_default()
    }

    pub(crate) fn len(&self) -> usize {
        self.pairs.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OT_SUBTABLE_HEADER_LEN: usize = 6;
    const AAT_SUBTABLE_HEADER_LEN: usize = 8;

    fn format0(pairs: &[(u16, u16, i16)]) -> Vec<u8> {
        let count = pairs.len() as u16;
        let search_range = if count == 0 {
            0
        } else {
            (1u16 << count.ilog2()) * 6
        };
        let mut body = Vec::new();
        body.extend(count.to_be_bytes());
        body.extend(search_range.to_be_bytes());
        body.extend((count.max(1).ilog2() as u16).to_be_bytes());
        body.extend((count * 6).saturating_sub(search_range).to_be_bytes());
        for (left, right, value) in pairs {
            body.extend(left.to_be_bytes());
            body.extend(right.to_be_bytes());
            body.extend(value.to_be_bytes());
        }
        body
    }

    fn ot_kern(subtables: &[(u16, Vec<u8>)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend(0u16.to_be_bytes());
        data.extend((subtables.len() as u16).to_be_bytes());
        for (coverage, body) in subtables {
            data.extend(0u16.to_be_bytes());
            data.extend(((body.len() + OT_SUBTABLE_HEADER_LEN) as u16).to_be_bytes());
            data.extend(coverage.to_be_bytes());
            data.extend(body);
        }
        data
    }

    #[test]
    fn opentype_format0() {
        let data = ot_kern(&[(0x0001, format0(&[(3, 4, -50), (3, 7, 20), (9, 3, -120)]))]);
        let kern = KernPairs::parse(FontData::new(&data)).unwrap();
        assert_eq!(kern.len(), 3);
        assert_eq!(kern.get(3, 4), -50);
        assert_eq!(kern.get(3, 7), 20);
        assert_eq!(kern.get(9, 3), -120);
        assert_eq!(kern.get(4, 3), 0);
    }

    #[test]
    fn subtables_accumulate() {
        let data = ot_kern(&[
            (0x0001, format0(&[(1, 2, -10), (5, 6, 30)])),
            (0x0001, format0(&[(1, 2, -5)])),
        ]);
        let kern = KernPairs::parse(FontData::new(&data)).unwrap();
        assert_eq!(kern.get(1, 2), -15);
        assert_eq!(kern.get(5, 6), 30);
    }

    #[test]
    fn skips_vertical_and_cross_stream() {
        let data = ot_kern(&[
            (0x0000, format0(&[(1, 2, -10)])),
            (0x0005, format0(&[(1, 2, -20)])),
            (0x0001, format0(&[(2, 1, 40)])),
        ]);
        let kern = KernPairs::parse(FontData::new(&data)).unwrap();
        assert_eq!(kern.get(1, 2), 0);
        assert_eq!(kern.get(2, 1), 40);
        assert_eq!(kern.len(), 1);
    }

    #[test]
    fn apple_header() {
        let body = format0(&[(10, 11, -64)]);
        let mut data = Vec::new();
        data.extend(0x0001_0000u32.to_be_bytes());
        data.extend(2u32.to_be_bytes());
        // vertical subtable first
        data.extend(((body.len() + AAT_SUBTABLE_HEADER_LEN) as u32).to_be_bytes());
        data.extend(0x8000u16.to_be_bytes());
        data.extend(0u16.to_be_bytes());
        data.extend(&body);
        data.extend(((body.len() + AAT_SUBTABLE_HEADER_LEN) as u32).to_be_bytes());
        data.extend(0x0000u16.to_be_bytes());
        data.extend(0u16.to_be_bytes());
        data.extend(&body);
        let kern = KernPairs::parse(FontData::new(&data)).unwrap();
        assert_eq!(kern.len(), 1);
        assert_eq!(kern.get(10, 11), -64);
    }

    #[test]
    fn truncated() {
        let mut data = ot_kern(&[(0x0001, format0(&[(3, 4, -50), (3, 7, 20)]))]);
        data.truncate(data.len() - 3);
        // a damaged subtable is either rejected or dropped, never half read
        let kern = KernPairs::parse(FontData::new(&data));
        assert!(kern.map_or(true, |kern| kern.is_empty()));
        assert!(KernPairs::parse(FontData::new(&[0, 0])).is_err());
    }

    #[test]
    fn unknown_version_yields_nothing() {
        let kern = KernPairs::parse(FontData::new(&[0, 2, 0, 0]));
        assert!(kern.map_or(true, |kern| kern.is_empty()));
    }
}
