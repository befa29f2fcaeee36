//! Compound File Binary (OLE2) reader.
//!
//! Just enough of [MS-CFB] to enumerate a file's directory and read stream
//! bytes: header, FAT (including DIFAT chains), MiniFAT and mini stream, and
//! the raw directory table. The table is exposed slot by slot so callers can
//! find entries that are no longer linked under the root.

use crate::error::CompoundError;
use std::collections::HashSet;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use zerocopy::{FromBytes, LE, U16, U32, U64};
use zerocopy_derive::FromBytes as DeriveFromBytes;

/// Compound file signature (`D0 CF 11 E0 A1 B1 1A E1`).
pub const MAGIC: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

/// Directory link value meaning "no entry".
pub const NOSTREAM: u32 = 0xFFFF_FFFF;

const HEADER_LEN: usize = 512;
const DIRENTRY_LEN: usize = 128;
const HEADER_DIFAT_SLOTS: usize = 109;

const MAXREGSECT: u32 = 0xFFFF_FFFA;
const ENDOFCHAIN: u32 = 0xFFFF_FFFE;
const FREESECT: u32 = 0xFFFF_FFFF;

/// On-disk header layout (first 512 bytes of the file).
#[allow(dead_code)]
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawHeader {
    signature: [u8; 8],
    clsid: [u8; 16],
    minor_version: U16<LE>,
    major_version: U16<LE>,
    byte_order: U16<LE>,
    sector_shift: U16<LE>,
    mini_sector_shift: U16<LE>,
    reserved: [u8; 6],
    num_dir_sectors: U32<LE>,
    num_fat_sectors: U32<LE>,
    first_dir_sector: U32<LE>,
    transaction_signature: U32<LE>,
    mini_stream_cutoff: U32<LE>,
    first_minifat_sector: U32<LE>,
    num_minifat_sectors: U32<LE>,
    first_difat_sector: U32<LE>,
    num_difat_sectors: U32<LE>,
    difat: [U32<LE>; HEADER_DIFAT_SLOTS],
}

/// On-disk directory entry layout (128 bytes).
#[allow(dead_code)]
#[derive(Debug, Clone, DeriveFromBytes)]
#[repr(C)]
struct RawDirEntry {
    /// UTF-16LE, NUL padded
    name: [u8; 64],
    /// Name length in bytes, terminator included
    name_len: U16<LE>,
    entry_type: u8,
    node_color: u8,
    sid_left: U32<LE>,
    sid_right: U32<LE>,
    sid_child: U32<LE>,
    clsid: [u8; 16],
    state_bits: U32<LE>,
    creation_time: U64<LE>,
    modified_time: U64<LE>,
    start_sector: U32<LE>,
    stream_size: U64<LE>,
}

/// Type of a directory slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Unused slot
    Empty,
    /// Directory-like node
    Storage,
    /// File-like leaf
    Stream,
    /// Legacy type 3, never produced by current writers
    LockBytes,
    /// Legacy type 4, never produced by current writers
    Property,
    /// The root storage (slot 0)
    Root,
    /// Anything else found in the type byte
    Unknown(u8),
}

impl From<u8> for EntryKind {
    fn from(value: u8) -> Self {
        match value {
            0 => EntryKind::Empty,
            1 => EntryKind::Storage,
            2 => EntryKind::Stream,
            3 => EntryKind::LockBytes,
            4 => EntryKind::Property,
            5 => EntryKind::Root,
            other => EntryKind::Unknown(other),
        }
    }
}

/// One slot of the directory table.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Slot index in the directory table
    pub id: u32,
    /// Decoded entry name
    pub name: String,
    /// Slot type
    pub kind: EntryKind,
    /// Left sibling in the red-black tree
    pub left: u32,
    /// Right sibling in the red-black tree
    pub right: u32,
    /// Root of the children tree (storages only)
    pub child: u32,
    /// First sector of the stream data
    pub start_sector: u32,
    /// Stream size in bytes
    pub size: u64,
}

impl DirEntry {
    /// Handle for reading this entry's bytes.
    pub fn handle(&self) -> StreamHandle {
        StreamHandle {
            id: self.id,
            start_sector: self.start_sector,
            size: self.size,
        }
    }
}

/// Bounded view of one stream, read through [`CompoundFile::read_stream`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    /// Directory slot the stream belongs to
    pub id: u32,
    start_sector: u32,
    size: u64,
}

impl StreamHandle {
    /// Declared stream size in bytes.
    pub fn len(&self) -> u64 {
        self.size
    }

    /// Whether the stream is declared empty.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }
}

/// An opened compound file.
#[derive(Debug)]
pub struct CompoundFile<R: Read + Seek> {
    reader: R,
    len: u64,
    sector_size: usize,
    mini_sector_size: usize,
    mini_stream_cutoff: u32,
    fat: Vec<u32>,
    minifat: Vec<u32>,
    entries: Vec<DirEntry>,
    /// Loaded on first mini stream read
    ministream: Option<Vec<u8>>,
}

impl<R: Read + Seek> CompoundFile<R> {
    /// Parse header, FAT, directory and MiniFAT from a reader.
    pub fn open(mut reader: R) -> Result<Self, CompoundError> {
        let len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        if len < HEADER_LEN as u64 {
            return Err(CompoundError::NotCompoundFile);
        }

        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes)?;
        let header = RawHeader::read_from_bytes(&bytes[..])
            .map_err(|_| CompoundError::InvalidHeader("short header".to_string()))?;

        if header.signature != MAGIC {
            return Err(CompoundError::NotCompoundFile);
        }
        if header.byte_order.get() != 0xFFFE {
            return Err(CompoundError::InvalidHeader(format!(
                "byte order mark {:#06x}",
                header.byte_order.get()
            )));
        }

        let sector_shift = header.sector_shift.get();
        if sector_shift != 9 && sector_shift != 12 {
            return Err(CompoundError::InvalidHeader(format!(
                "sector shift {}",
                sector_shift
            )));
        }
        let mini_sector_shift = header.mini_sector_shift.get();
        if mini_sector_shift == 0 || mini_sector_shift >= sector_shift {
            return Err(CompoundError::InvalidHeader(format!(
                "mini sector shift {}",
                mini_sector_shift
            )));
        }

        let mut file = CompoundFile {
            reader,
            len,
            sector_size: 1usize << sector_shift,
            mini_sector_size: 1usize << mini_sector_shift,
            mini_stream_cutoff: header.mini_stream_cutoff.get(),
            fat: Vec::new(),
            minifat: Vec::new(),
            entries: Vec::new(),
            ministream: None,
        };

        file.load_fat(&header)?;
        file.load_directory(header.first_dir_sector.get())?;

        let first_minifat = header.first_minifat_sector.get();
        if header.num_minifat_sectors.get() > 0 && first_minifat != ENDOFCHAIN {
            file.load_minifat(first_minifat)?;
        }

        Ok(file)
    }

    /// Sector size in bytes (512 for version 3, 4096 for version 4).
    pub fn sector_size(&self) -> usize {
        self.sector_size
    }

    /// The raw directory table, one element per slot, unused slots included.
    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Directory slot by index.
    pub fn entry(&self, id: u32) -> Option<&DirEntry> {
        self.entries.get(id as usize)
    }

    /// The root storage entry.
    pub fn root(&self) -> &DirEntry {
        // load_directory rejects tables without a root slot
        &self.entries[0]
    }

    /// Children of a storage, in sibling-tree order.
    ///
    /// Fails when a sibling link points outside the table or loops back.
    pub fn children(&self, id: u32) -> Result<Vec<u32>, CompoundError> {
        let parent = self.entry(id).ok_or_else(|| {
            CompoundError::Corrupted(format!("directory entry {} does not exist", id))
        })?;

        let mut children = Vec::new();
        let mut stack: Vec<&DirEntry> = Vec::new();
        let mut seen = HashSet::new();
        let mut node = parent.child;

        loop {
            while node != NOSTREAM {
                let entry = self.entry(node).ok_or_else(|| {
                    CompoundError::Corrupted(format!(
                        "link to entry {} under {:?} is out of range",
                        node, parent.name
                    ))
                })?;
                if !seen.insert(node) {
                    return Err(CompoundError::Corrupted(format!(
                        "sibling links under {:?} form a cycle",
                        parent.name
                    )));
                }
                stack.push(entry);
                node = entry.left;
            }

            let Some(entry) = stack.pop() else {
                break;
            };
            children.push(entry.id);
            node = entry.right;
        }

        Ok(children)
    }

    /// Read up to `limit` bytes of a stream.
    ///
    /// Streams below the header's mini stream cutoff live in the mini stream;
    /// everything else is read sector by sector through the FAT.
    pub fn read_stream(
        &mut self,
        handle: StreamHandle,
        limit: u64,
    ) -> Result<Vec<u8>, CompoundError> {
        let wanted = handle.size.min(limit);
        if wanted == 0 {
            return Ok(Vec::new());
        }

        let mut data = if handle.size < u64::from(self.mini_stream_cutoff) {
            self.read_mini_chain(handle.start_sector, wanted)?
        } else {
            self.read_chain(handle.start_sector, wanted)?
        };

        if (data.len() as u64) < wanted {
            return Err(CompoundError::Corrupted(format!(
                "stream {} ends after {} of {} bytes",
                handle.id,
                data.len(),
                wanted
            )));
        }

        Ok(data)
    }

    /// Build the FAT from the header DIFAT slots and the DIFAT chain.
    ///
    /// Collects at most `num_fat_sectors` ids, each of them once, and visits
    /// no DIFAT sector twice.
    fn load_fat(&mut self, header: &RawHeader) -> Result<(), CompoundError> {
        let num_fat = header.num_fat_sectors.get() as usize;
        if num_fat as u64 > self.sector_count() {
            return Err(CompoundError::InvalidHeader(format!(
                "{} FAT sectors in a file of {} sectors",
                num_fat,
                self.sector_count()
            )));
        }

        let mut fat_sectors: Vec<u32> = header
            .difat
            .iter()
            .map(|v| v.get())
            .filter(|&sector| sector <= MAXREGSECT)
            .take(num_fat)
            .collect();

        let per_sector = self.sector_size / 4 - 1; // last slot links the next DIFAT sector
        let mut difat_sector = header.first_difat_sector.get();
        let mut remaining = u64::from(header.num_difat_sectors.get()).min(self.sector_count());
        let mut visited = HashSet::new();

        while fat_sectors.len() < num_fat
            && remaining > 0
            && difat_sector != ENDOFCHAIN
            && difat_sector != FREESECT
        {
            if !visited.insert(difat_sector) {
                return Err(CompoundError::Corrupted(format!(
                    "DIFAT chain revisits sector {}",
                    difat_sector
                )));
            }
            remaining -= 1;

            let data = self.read_sector(difat_sector)?;
            let ids: Vec<u32> = le_u32s(&data).collect();
            let wanted = num_fat - fat_sectors.len();
            fat_sectors.extend(
                ids.iter()
                    .take(per_sector)
                    .copied()
                    .filter(|&sector| sector <= MAXREGSECT)
                    .take(wanted),
            );
            difat_sector = ids.get(per_sector).copied().unwrap_or(ENDOFCHAIN);
        }

        let mut seen = HashSet::new();
        if let Some(&repeated) = fat_sectors.iter().find(|&&sector| !seen.insert(sector)) {
            return Err(CompoundError::Corrupted(format!(
                "FAT sector {} is listed twice",
                repeated
            )));
        }

        let mut fat = Vec::with_capacity(fat_sectors.len() * (self.sector_size / 4));
        for sector in fat_sectors {
            let data = self.read_sector(sector)?;
            fat.extend(le_u32s(&data));
        }
        self.fat = fat;

        Ok(())
    }

    fn load_minifat(&mut self, first_sector: u32) -> Result<(), CompoundError> {
        let data = self.read_chain(first_sector, u64::MAX)?;
        self.minifat = le_u32s(&data).collect();
        Ok(())
    }

    /// Parse every slot of the directory stream.
    fn load_directory(&mut self, first_sector: u32) -> Result<(), CompoundError> {
        let data = self.read_chain(first_sector, u64::MAX)?;

        let mut entries = Vec::with_capacity(data.len() / DIRENTRY_LEN);
        for (id, chunk) in data.chunks_exact(DIRENTRY_LEN).enumerate() {
            entries.push(self.parse_entry(id as u32, chunk)?);
        }

        match entries.first() {
            Some(root) if root.kind == EntryKind::Root => {}
            _ => {
                return Err(CompoundError::Corrupted(
                    "first directory entry is not the root".to_string(),
                ))
            }
        }

        self.entries = entries;
        Ok(())
    }

    fn parse_entry(&self, id: u32, data: &[u8]) -> Result<DirEntry, CompoundError> {
        let raw = RawDirEntry::read_from_bytes(data).map_err(|_| {
            CompoundError::Corrupted(format!("directory entry {} is truncated", id))
        })?;

        let name_len = usize::from(raw.name_len.get())
            .min(raw.name.len())
            .saturating_sub(2);
        let name = decode_utf16le(&raw.name[..name_len]);

        // Version 3 files only define the low 32 bits
        let size = if self.sector_size == 512 {
            raw.stream_size.get() & 0xFFFF_FFFF
        } else {
            raw.stream_size.get()
        };

        Ok(DirEntry {
            id,
            name,
            kind: EntryKind::from(raw.entry_type),
            left: raw.sid_left.get(),
            right: raw.sid_right.get(),
            child: raw.sid_child.get(),
            start_sector: raw.start_sector.get(),
            size,
        })
    }

    /// Upper bound on the number of sectors after the header.
    fn sector_count(&self) -> u64 {
        self.len / self.sector_size as u64
    }

    fn read_sector(&mut self, sector: u32) -> Result<Vec<u8>, CompoundError> {
        if sector > MAXREGSECT {
            return Err(CompoundError::Corrupted(format!(
                "sector id {:#x} is a reserved marker",
                sector
            )));
        }

        // Sector 0 starts right after the header-sized block
        let offset = (u64::from(sector) + 1) * self.sector_size as u64;
        if offset >= self.len {
            return Err(CompoundError::Corrupted(format!(
                "sector {} lies beyond the end of the file",
                sector
            )));
        }

        self.reader.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(self.sector_size);
        (&mut self.reader)
            .take(self.sector_size as u64)
            .read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Follow a FAT chain, stopping once `limit` bytes are collected.
    fn read_chain(&mut self, start: u32, limit: u64) -> Result<Vec<u8>, CompoundError> {
        let mut data = Vec::new();
        let mut sector = start;
        let mut steps = 0usize;

        while sector != ENDOFCHAIN && (data.len() as u64) < limit {
            if steps as u64 >= self.sector_count() {
                return Err(CompoundError::Corrupted(format!(
                    "sector chain starting at {} loops",
                    start
                )));
            }
            steps += 1;

            let next = *self.fat.get(sector as usize).ok_or_else(|| {
                CompoundError::Corrupted(format!("sector {} is outside the FAT", sector))
            })?;
            let chunk = self.read_sector(sector)?;
            data.extend_from_slice(&chunk);
            sector = next;
        }

        if (data.len() as u64) > limit {
            data.truncate(limit as usize);
        }
        Ok(data)
    }

    /// Follow a MiniFAT chain through the mini stream.
    fn read_mini_chain(&mut self, start: u32, limit: u64) -> Result<Vec<u8>, CompoundError> {
        if self.ministream.is_none() {
            let root = self.root();
            let (root_start, root_size) = (root.start_sector, root.size);
            self.ministream = Some(self.read_chain(root_start, root_size)?);
        }
        let ministream = self.ministream.as_deref().unwrap_or(&[]);

        let max_steps = self
            .minifat
            .len()
            .min(ministream.len().div_ceil(self.mini_sector_size));

        let mut data = Vec::new();
        let mut sector = start;
        let mut steps = 0usize;

        while sector != ENDOFCHAIN && (data.len() as u64) < limit {
            if steps >= max_steps {
                return Err(CompoundError::Corrupted(format!(
                    "mini sector chain starting at {} loops",
                    start
                )));
            }
            steps += 1;

            let next = *self.minifat.get(sector as usize).ok_or_else(|| {
                CompoundError::Corrupted(format!("mini sector {} is outside the MiniFAT", sector))
            })?;

            let offset = sector as usize * self.mini_sector_size;
            if offset >= ministream.len() {
                return Err(CompoundError::Corrupted(format!(
                    "mini sector {} lies beyond the mini stream",
                    sector
                )));
            }
            let end = (offset + self.mini_sector_size).min(ministream.len());
            data.extend_from_slice(&ministream[offset..end]);
            sector = next;
        }

        if (data.len() as u64) > limit {
            data.truncate(limit as usize);
        }
        Ok(data)
    }
}

impl CompoundFile<File> {
    /// Open a compound file from disk.
    pub fn open_path(path: &Path) -> Result<Self, CompoundError> {
        Self::open(File::open(path)?)
    }
}

impl CompoundFile<Cursor<Vec<u8>>> {
    /// Open a compound file held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, CompoundError> {
        Self::open(Cursor::new(data))
    }
}

/// Check whether leading bytes carry the compound file signature.
pub fn is_compound_file(head: &[u8]) -> bool {
    head.len() >= MAGIC.len() && head[..MAGIC.len()] == MAGIC
}

fn le_u32s(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4).map(|chunk| {
        U32::<LE>::read_from_bytes(chunk)
            .map(|v| v.get())
            .unwrap_or(FREESECT)
    })
}

fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    String::from_utf16_lossy(&units)
        .trim_end_matches('\0')
        .to_string()
}
