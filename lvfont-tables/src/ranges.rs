//! Parsing codepoint range specifications.
//!
//! A range spec is a comma separated list of items:
//!
//! * a single codepoint, hex or decimal: `0x41`, `65`
//! * an inclusive range: `0x20-0x7F`
//! * either of the above remapped to another start codepoint:
//!   `0x1F450=>0xF005`, `0x20-0x7F=>0x100`
//! * the name of a preset such as `ASCII` or `CYRILLIC`, see [`PRESETS`]

use std::{collections::HashSet, sync::OnceLock};

use regex::Regex;
use thiserror::Error;

/// The largest Unicode scalar value.
pub const MAX_CODEPOINT: u32 = 0x10FFFF;

/// Requests with more distinct characters than this are reported by [`check`].
pub const LARGE_SET: usize = 10_000;

/// Named character sets that can be used as range items.
///
/// Names are matched ignoring ASCII case.
pub const PRESETS: &[(&str, &str)] = &[
    ("ASCII", "0x20-0x7F"),
    ("ASCII_PRINTABLE", "0x21-0x7E"),
    ("DIGITS", "0x30-0x39"),
    ("UPPERCASE", "0x41-0x5A"),
    ("LOWERCASE", "0x61-0x7A"),
    // 0123456789.,+-*/=()[]{}
    (
        "NUMBERS_PUNCTUATION",
        "0x30-0x39,0x2E,0x2C,0x2B,0x2D,0x2A,0x2F,0x3D,0x28,0x29,0x5B,0x5D,0x7B,0x7D",
    ),
    ("LATIN_EXTENDED_A", "0x100-0x17F"),
    ("LATIN_EXTENDED_B", "0x180-0x24F"),
    ("CYRILLIC", "0x400-0x4FF"),
    ("GREEK", "0x370-0x3FF"),
    ("CJK_UNIFIED_COMMON", "0x4E00-0x9FFF"),
];

/// The ranges behind a preset name.
pub fn preset(name: &str) -> Option<&'static str> {
    PRESETS
        .iter()
        .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
        .map(|(_, ranges)| *ranges)
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RangeSyntaxError {
    #[error("Invalid range item '{0}'")]
    InvalidItem(String),

    #[error("Invalid codepoint '{0}'")]
    InvalidCodepoint(String),

    #[error("Codepoint 0x{0:X} is beyond 0x10FFFF")]
    OutOfRange(u32),

    #[error("Invalid codepoint range 0x{start:X}-0x{end:X}")]
    Reversed { start: u32, end: u32 },
}

fn item_regex() -> &'static Regex {
    static ITEM: OnceLock<Regex> = OnceLock::new();
    ITEM.get_or_init(|| {
        Regex::new(
            r"^(?P<start>0[xX][[:xdigit:]]+|[0-9]+)(?:\s*-\s*(?P<end>0[xX][[:xdigit:]]+|[0-9]+))?(?:\s*=>\s*(?P<map>0[xX][[:xdigit:]]+|[0-9]+))?$",
        )
        .expect("range item pattern is valid")
    })
}

fn parse_codepoint(text: &str) -> Result<u32, RangeSyntaxError> {
    let value = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => text.parse::<u32>(),
    }
    .map_err(|_| RangeSyntaxError::InvalidCodepoint(text.to_owned()))?;
    if value > MAX_CODEPOINT {
        return Err(RangeSyntaxError::OutOfRange(value));
    }
    Ok(value)
}

/// Expands a range spec into `(source, mapped)` codepoint pairs, in order.
///
/// Duplicates are kept; see [`dedupe`].
pub fn expand(spec: &str) -> Result<Vec<(u32, u32)>, RangeSyntaxError> {
    let mut result = Vec::new();
    for item in spec.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        if let Some(ranges) = preset(item) {
            result.extend(expand(ranges)?);
            continue;
        }
        let captures = item_regex()
            .captures(item)
            .ok_or_else(|| RangeSyntaxError::InvalidItem(item.to_owned()))?;
        let start = parse_codepoint(&captures["start"])?;
        let end = match captures.name("end") {
            Some(end) => parse_codepoint(end.as_str())?,
            None => start,
        };
        if start > end {
            return Err(RangeSyntaxError::Reversed { start, end });
        }
        let mapped_start = match captures.name("map") {
            Some(map) => parse_codepoint(map.as_str())?,
            None => start,
        };
        let mapped_end = mapped_start + (end - start);
        if mapped_end > MAX_CODEPOINT {
            return Err(RangeSyntaxError::OutOfRange(mapped_end));
        }
        result.extend((start..=end).zip(mapped_start..=mapped_end));
    }
    log::trace!("expanded '{spec}' to {} codepoints", result.len());
    Ok(result)
}

/// The codepoints of every character in `text`, each mapped to itself.
pub fn symbols(text: &str) -> Vec<(u32, u32)> {
    text.chars().map(|ch| (ch as u32, ch as u32)).collect()
}

/// Removes repeated source or mapped codepoints; the first occurrence wins.
pub fn dedupe(pairs: impl IntoIterator<Item = (u32, u32)>) -> Vec<(u32, u32)> {
    let mut sources = HashSet::new();
    let mut targets = HashSet::new();
    pairs
        .into_iter()
        .filter(|(source, mapped)| {
            let keep = !sources.contains(source) && !targets.contains(mapped);
            if keep {
                sources.insert(*source);
                targets.insert(*mapped);
            } else {
                log::debug!("dropping duplicate codepoint U+{source:04X}");
            }
            keep
        })
        .collect()
}

/// Something odd about a request that still expands fine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RangeIssue {
    /// Ranges or symbols name the same source codepoint more than once.
    Overlapping { repeated: usize },
    /// More than [`LARGE_SET`] distinct codepoints.
    Large { count: usize },
}

impl std::fmt::Display for RangeIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RangeIssue::Overlapping { repeated } => {
                write!(f, "overlapping ranges repeat {repeated} codepoints")
            }
            RangeIssue::Large { count } => write!(f, "large character set ({count} characters)"),
        }
    }
}

/// Looks for overlapping ranges and very large requests in expanded,
/// not yet deduplicated pairs.
pub fn check(pairs: &[(u32, u32)]) -> Vec<RangeIssue> {
    let distinct = pairs
        .iter()
        .map(|(source, _)| *source)
        .collect::<HashSet<_>>()
        .len();
    let mut issues = Vec::new();
    if distinct < pairs.len() {
        issues.push(RangeIssue::Overlapping {
            repeated: pairs.len() - distinct,
        });
    }
    if distinct > LARGE_SET {
        issues.push(RangeIssue::Large { count: distinct });
    }
    issues
}
