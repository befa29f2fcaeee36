//! Fixtures shared by the integration tests.
//!
//! Well-formed compound files are written with the `cfb` crate. Layouts that
//! no writer produces on purpose (orphans, cycles, absurd nesting) come from
//! [`RawCfb`], which lays out a version 3 file by hand.

#![allow(dead_code)]

use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::CompressionMethod;

pub const NOSTREAM: u32 = 0xFFFF_FFFF;
pub const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;
const FATSECT: u32 = 0xFFFF_FFFD;
const SECTOR: usize = 512;

pub const OLE10NATIVE: &str = "\u{1}Ole10Native";

/// Ole10Native record in the usual layout (temp path present).
pub fn package_record(label: &str, source: &str, temp: &str, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&2u16.to_le_bytes());
    body.extend_from_slice(label.as_bytes());
    body.push(0);
    body.extend_from_slice(source.as_bytes());
    body.push(0);
    body.extend_from_slice(&0x0003_0000u32.to_le_bytes());
    body.extend_from_slice(&(temp.len() as u32 + 1).to_le_bytes());
    body.extend_from_slice(temp.as_bytes());
    body.push(0);
    body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    body.extend_from_slice(payload);

    let mut record = (body.len() as u32).to_le_bytes().to_vec();
    record.extend_from_slice(&body);
    record
}

/// Build a compound file with the `cfb` crate.
///
/// `streams` maps slash paths to contents; parent storages are created on
/// the way. `v3` selects 512-byte sectors, otherwise 4096.
pub fn cfb_file(streams: &[(&str, &[u8])], v3: bool) -> Vec<u8> {
    let cursor = Cursor::new(Vec::new());
    let mut comp = if v3 {
        cfb::CompoundFile::create_with_version(cfb::Version::V3, cursor).unwrap()
    } else {
        cfb::CompoundFile::create(cursor).unwrap()
    };

    for (path, data) in streams {
        let segments: Vec<&str> = path.split('/').collect();
        let mut storage = String::new();
        for segment in &segments[..segments.len() - 1] {
            storage.push('/');
            storage.push_str(segment);
            if !comp.exists(&storage) {
                comp.create_storage(&storage).unwrap();
            }
        }

        let mut stream = comp.create_stream(format!("/{}", path)).unwrap();
        stream.write_all(data).unwrap();
        stream.flush().unwrap();
    }

    comp.flush().unwrap();
    comp.into_inner().into_inner()
}

/// Write a single-object document the way Word stores embedded packages.
pub fn write_embedding_doc(path: &Path, label: &str, source: &str, payload: &[u8]) {
    let record = package_record(label, source, source, payload);
    let data = cfb_file(
        &[
            ("WordDocument", &b"not really a word document"[..]),
            (&format!("ObjectPool/_1/{}", OLE10NATIVE), &record[..]),
        ],
        true,
    );
    std::fs::write(path, data).unwrap();
}

/// Write a compound file without any embedded object.
pub fn write_clean_doc(path: &Path) {
    let data = cfb_file(
        &[
            ("WordDocument", &b"plain text body"[..]),
            ("\u{5}SummaryInformation", &[0u8; 48][..]),
        ],
        true,
    );
    std::fs::write(path, data).unwrap();
}

/// Write a zip archive with the given entries, stored uncompressed.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Set the "encrypted" flag on one zip entry without encrypting anything.
///
/// Readers then refuse the entry for lack of a password, which is all the
/// tests need.
pub fn mark_zip_entry_encrypted(path: &Path, entry: &str) {
    let mut data = std::fs::read(path).unwrap();
    let name = entry.as_bytes();

    // Local file headers: PK\x03\x04, flags at +6, name length at +26, name at +30
    let mut patched_local = false;
    for offset in find_all(&data, b"PK\x03\x04") {
        let name_len = u16::from_le_bytes([data[offset + 26], data[offset + 27]]) as usize;
        if data.get(offset + 30..offset + 30 + name_len) == Some(name) {
            data[offset + 6] |= 1;
            patched_local = true;
        }
    }

    // Central directory headers: PK\x01\x02, flags at +8, name length at +28, name at +46
    let mut patched_central = false;
    for offset in find_all(&data, b"PK\x01\x02") {
        let name_len = u16::from_le_bytes([data[offset + 28], data[offset + 29]]) as usize;
        if data.get(offset + 46..offset + 46 + name_len) == Some(name) {
            data[offset + 8] |= 1;
            patched_central = true;
        }
    }

    assert!(patched_local && patched_central, "entry {} not found", entry);
    std::fs::write(path, data).unwrap();
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    haystack
        .windows(needle.len())
        .enumerate()
        .filter(|(_, window)| *window == needle)
        .map(|(offset, _)| offset)
        .collect()
}

/// One directory slot for [`RawCfb`].
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub name: String,
    /// 1 storage, 2 stream, 5 root
    pub kind: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub data: Vec<u8>,
}

impl RawEntry {
    pub fn root(child: u32) -> Self {
        Self::new("Root Entry", 5).child(child)
    }

    pub fn storage(name: &str, child: u32) -> Self {
        Self::new(name, 1).child(child)
    }

    pub fn stream(name: &str, data: &[u8]) -> Self {
        let mut entry = Self::new(name, 2);
        entry.data = data.to_vec();
        entry
    }

    fn new(name: &str, kind: u8) -> Self {
        Self {
            name: name.to_string(),
            kind,
            left: NOSTREAM,
            right: NOSTREAM,
            child: NOSTREAM,
            data: Vec::new(),
        }
    }

    pub fn child(mut self, child: u32) -> Self {
        self.child = child;
        self
    }

    pub fn left(mut self, left: u32) -> Self {
        self.left = left;
        self
    }

    pub fn right(mut self, right: u32) -> Self {
        self.right = right;
        self
    }
}

/// Hand-laid version 3 compound file.
///
/// Sector 0 holds the FAT, the directory follows from sector 1, stream data
/// comes last. The mini stream cutoff is zero so every stream lives in
/// regular sectors. Links are taken verbatim from the entries, so anything
/// from orphans to cycles can be expressed. Header words and FAT slots can
/// be overridden to describe broken allocation tables.
#[derive(Debug, Default)]
pub struct RawCfb {
    pub entries: Vec<RawEntry>,
    header_words: Vec<(usize, u32)>,
    fat_links: Vec<(usize, u32)>,
    extra_sectors: Vec<Vec<u8>>,
}

impl RawCfb {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self {
            entries,
            ..Self::default()
        }
    }

    /// Overwrite the little-endian u32 at `offset` in the header.
    pub fn header_word(mut self, offset: usize, value: u32) -> Self {
        self.header_words.push((offset, value));
        self
    }

    /// Overwrite one FAT slot after the layout is computed.
    pub fn fat_link(mut self, sector: usize, value: u32) -> Self {
        self.fat_links.push((sector, value));
        self
    }

    /// Append a raw sector of u32 slots after the stream data. Unlisted
    /// slots are FREESECT.
    pub fn extra_sector(mut self, slots: &[(usize, u32)]) -> Self {
        let mut words = vec![FREESECT; SECTOR / 4];
        for &(slot, value) in slots {
            words[slot] = value;
        }
        self.extra_sectors
            .push(words.iter().flat_map(|v| v.to_le_bytes()).collect());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let per_sector = SECTOR / 128;
        let dir_sectors = self.entries.len().div_ceil(per_sector).max(1);

        let mut fat = vec![FREESECT; SECTOR / 4];
        fat[0] = FATSECT;
        for sector in 1..=dir_sectors {
            fat[sector] = if sector == dir_sectors {
                ENDOFCHAIN
            } else {
                sector as u32 + 1
            };
        }

        // Data sector chains, one per non-empty stream
        let mut next_sector = dir_sectors + 1;
        let mut starts = Vec::with_capacity(self.entries.len());
        let mut data_sectors = Vec::new();
        for entry in &self.entries {
            if entry.kind != 2 || entry.data.is_empty() {
                starts.push(ENDOFCHAIN);
                continue;
            }
            starts.push(next_sector as u32);
            let chunks: Vec<&[u8]> = entry.data.chunks(SECTOR).collect();
            for (i, chunk) in chunks.iter().enumerate() {
                let sector = next_sector + i;
                fat[sector] = if i + 1 == chunks.len() {
                    ENDOFCHAIN
                } else {
                    sector as u32 + 1
                };
                let mut padded = chunk.to_vec();
                padded.resize(SECTOR, 0);
                data_sectors.push(padded);
            }
            next_sector += chunks.len();
        }
        assert!(next_sector <= fat.len(), "fixture too large for one FAT sector");

        for &(sector, value) in &self.fat_links {
            fat[sector] = value;
        }

        let mut out = header();
        for &(offset, value) in &self.header_words {
            out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        out.extend(fat.iter().flat_map(|v| v.to_le_bytes()));

        let mut directory = Vec::with_capacity(dir_sectors * SECTOR);
        for (entry, start) in self.entries.iter().zip(&starts) {
            directory.extend(dir_entry(entry, *start));
        }
        while directory.len() < dir_sectors * SECTOR {
            directory.extend(dir_entry(&RawEntry::new("", 0), ENDOFCHAIN));
        }
        out.extend(directory);

        for sector in data_sectors.into_iter().chain(self.extra_sectors.iter().cloned()) {
            out.extend(sector);
        }
        out
    }
}

fn header() -> Vec<u8> {
    let mut h = vec![0u8; SECTOR];
    h[..8].copy_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
    h[24..26].copy_from_slice(&0x003Eu16.to_le_bytes());
    h[26..28].copy_from_slice(&3u16.to_le_bytes());
    h[28..30].copy_from_slice(&0xFFFEu16.to_le_bytes());
    h[30..32].copy_from_slice(&9u16.to_le_bytes());
    h[32..34].copy_from_slice(&6u16.to_le_bytes());
    h[44..48].copy_from_slice(&1u32.to_le_bytes()); // FAT sectors
    h[48..52].copy_from_slice(&1u32.to_le_bytes()); // first directory sector
    h[56..60].copy_from_slice(&0u32.to_le_bytes()); // mini stream cutoff
    h[60..64].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    h[68..72].copy_from_slice(&ENDOFCHAIN.to_le_bytes());
    for slot in 0..109 {
        let value = if slot == 0 { 0 } else { FREESECT };
        h[76 + slot * 4..80 + slot * 4].copy_from_slice(&value.to_le_bytes());
    }
    h
}

fn dir_entry(entry: &RawEntry, start: u32) -> Vec<u8> {
    let mut d = vec![0u8; 128];
    let units: Vec<u16> = entry.name.encode_utf16().collect();
    assert!(units.len() < 32, "name too long: {}", entry.name);
    for (i, unit) in units.iter().enumerate() {
        d[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
    }
    let name_len = if units.is_empty() { 0 } else { (units.len() + 1) * 2 };
    d[64..66].copy_from_slice(&(name_len as u16).to_le_bytes());
    d[66] = entry.kind;
    d[67] = 1; // black
    d[68..72].copy_from_slice(&entry.left.to_le_bytes());
    d[72..76].copy_from_slice(&entry.right.to_le_bytes());
    d[76..80].copy_from_slice(&entry.child.to_le_bytes());
    d[116..120].copy_from_slice(&start.to_le_bytes());
    d[120..128].copy_from_slice(&(entry.data.len() as u64).to_le_bytes());
    d
}
