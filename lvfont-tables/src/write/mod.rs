//! Serializing compiled fonts.

pub mod binary;
pub mod source;

/// An output format for a compiled font.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    /// LVGL `lv_font_fmt_txt` C source.
    #[default]
    CSource,
    /// Packed little-endian binary container.
    Binary,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" | "lvgl" => Ok(OutputFormat::CSource),
            "bin" | "binary" => Ok(OutputFormat::Binary),
            _ => Err(format!("unknown output format '{s}', expected 'c' or 'bin'")),
        }
    }
}

/// Little-endian byte sink.
#[derive(Debug, Default)]
pub(crate) struct TableWriter {
    data: Vec<u8>,
}

impl TableWriter {
    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.data.push(value);
    }

    pub(crate) fn write_i8(&mut self, value: i8) {
        self.data.push(value as u8);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_i16(&mut self, value: i16) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.data.extend_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn write_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Overwrites a previously written `u32`.
    pub(crate) fn patch_u32(&mut self, pos: usize, value: u32) {
        self.data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

/// Little-endian byte cursor; every read is bounds checked.
#[derive(Clone, Debug)]
pub(crate) struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    pub(crate) fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|[byte]| byte)
    }

    pub(crate) fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|byte| byte as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    pub(crate) fn read_i16(&mut self) -> Option<i16> {
        self.read_array().map(i16::from_le_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        self.pos += len;
        Some(bytes)
    }
}
