//! Ole10Native / OLE Package record decoding.
//!
//! Layout (little-endian):
//!
//! ```text
//! u32  declared record size
//! u16  type marker, always 2
//! ...  label, NUL-terminated (the short file name)
//! ...  source path, NUL-terminated
//! u32  reserved (usually 0x00030000)
//! u32  temp path length, NUL included
//! ...  temp path
//! u32  payload length
//! ...  payload
//! ```
//!
//! Some writers drop the temp path and put the payload length straight after
//! the reserved word. That compact form is only assumed when the word does
//! not lead to a temp path followed by a payload length, and the payload it
//! announces fits the buffer exactly.

use encoding_rs::WINDOWS_1252;

/// Shortest buffer that can hold a record (empty names, empty payload).
pub const MIN_RECORD_LEN: usize = 16;

const TYPE_MARKER: u16 = 2;
/// Upper bound on any name field; longer means garbage
const MAX_NAME_LEN: usize = 4096;

/// Which record layout a stream was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeLayout {
    /// Label, source path, temp path, payload
    Package,
    /// Label, source path, payload (no temp path)
    Compact,
}

/// A decoded Ole10Native record, borrowing its payload from the stream data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ole10NativeRecord<'a> {
    /// Size from the first four bytes; not used for bounds
    pub declared_size: u32,
    /// Short file name
    pub label: String,
    /// Full path of the source file
    pub source_path: String,
    /// Temp path the object was packaged from (empty in the compact layout)
    pub temp_path: String,
    /// Declared payload length
    pub payload_len: u32,
    /// Payload bytes, cut to what the buffer holds
    pub payload: &'a [u8],
    /// Layout the record was decoded with
    pub layout: NativeLayout,
}

impl Ole10NativeRecord<'_> {
    /// The three candidate file names: label, source path, temp path.
    pub fn names(&self) -> [&str; 3] {
        [&self.label, &self.source_path, &self.temp_path]
    }

    /// Whether the payload is shorter than the record declares.
    pub fn is_truncated(&self) -> bool {
        (self.payload.len() as u64) < u64::from(self.payload_len)
    }
}

/// Quick check whether a stream starts like an Ole10Native record.
pub fn header_present(data: &[u8]) -> bool {
    let mut cursor = Cursor::new(data);
    let (Some(declared), Some(marker)) = (cursor.u32(), cursor.u16()) else {
        return false;
    };
    marker == TYPE_MARKER && declared as usize >= MIN_RECORD_LEN - 4
}

/// Decode an Ole10Native record, or `None` if `data` is not one.
///
/// Structural problems give `None` rather than a partial record. The only
/// tolerated shortfall is a payload cut off by the end of the buffer.
pub fn detect_and_extract(data: &[u8]) -> Option<Ole10NativeRecord<'_>> {
    if data.len() < MIN_RECORD_LEN || !header_present(data) {
        return None;
    }

    let mut cursor = Cursor::new(data);
    let declared_size = cursor.u32()?;
    cursor.u16()?;
    let label = decode_name(cursor.c_str()?);
    let source_path = decode_name(cursor.c_str()?);
    cursor.u32()?; // reserved

    let word = cursor.u32()?;
    if let Some(temp) = cursor.peek_temp_path(word as usize) {
        let mut rest = cursor.clone();
        rest.skip(temp.len());
        // No length word after the path: maybe a compact payload that looks like one
        if let Some(payload_len) = rest.u32() {
            let payload = rest.take_up_to(payload_len as usize);
            return Some(Ole10NativeRecord {
                declared_size,
                label,
                source_path,
                temp_path: decode_name(&temp[..temp.len().saturating_sub(1)]),
                payload_len,
                payload,
                layout: NativeLayout::Package,
            });
        }
    }

    if word as usize != cursor.remaining() {
        return None;
    }
    Some(Ole10NativeRecord {
        declared_size,
        label,
        source_path,
        temp_path: String::new(),
        payload_len: word,
        payload: cursor.take_up_to(word as usize),
        layout: NativeLayout::Compact,
    })
}

fn decode_name(bytes: &[u8]) -> String {
    WINDOWS_1252
        .decode_without_bom_handling(bytes)
        .0
        .into_owned()
}

#[derive(Clone)]
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Cursor { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(len)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn skip(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.data.len());
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// NUL-terminated string within the scan window, terminator consumed.
    fn c_str(&mut self) -> Option<&'a [u8]> {
        let window = &self.data[self.pos..];
        let window = &window[..window.len().min(MAX_NAME_LEN)];
        let nul = window.iter().position(|&b| b == 0)?;
        let name = &window[..nul];
        self.pos += nul + 1;
        Some(name)
    }

    /// The next `len` bytes if they read as a NUL-terminated path.
    fn peek_temp_path(&self, len: usize) -> Option<&'a [u8]> {
        if len == 0 || len > MAX_NAME_LEN {
            return None;
        }
        let bytes = self.data.get(self.pos..self.pos.checked_add(len)?)?;
        let (last, text) = bytes.split_last()?;
        let printable = text.iter().all(|&b| b >= 0x20 && b != 0x7F);
        (*last == 0 && printable).then_some(bytes)
    }

    fn take_up_to(&mut self, len: usize) -> &'a [u8] {
        let len = len.min(self.remaining());
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        slice
    }
}
