//! Container classification: which compound files does an input hold?
//!
//! An input is either a compound file itself, a zip archive whose entries
//! may be compound files (Office Open XML keeps embedded objects that way),
//! or unsupported. [`open_containers`] turns a path into a lazy sequence of
//! opened compound files, with `Err` items standing in for anything that
//! could not be opened.

use crate::compound::{is_compound_file, CompoundFile, MAGIC};
use crate::error::ExtractError;
use crate::types::ExtractOptions;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

/// Any seekable byte source a compound file can be read from.
pub trait ReadSeek: Read + Seek {}

impl<T: Read + Seek> ReadSeek for T {}

/// Kind of container an input file is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    /// OLE compound file
    Compound,
    /// Zip archive, possibly holding compound files
    Zip,
    /// Neither
    Unsupported,
}

/// A compound file ready for stream enumeration.
pub struct Container {
    /// Input path, or `archive!entry` for compound files inside a zip
    pub origin: String,
    /// The opened file
    pub compound: CompoundFile<Box<dyn ReadSeek>>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("origin", &self.origin)
            .field("entries", &self.compound.entries().len())
            .finish()
    }
}

/// Determine the container kind of a file on disk.
///
/// # Errors
///
/// Returns an error if the file does not exist or cannot be read.
pub fn probe_container(path: &Path) -> Result<ContainerKind, ExtractError> {
    match classify(path) {
        Ok(Classified::Compound(_)) => Ok(ContainerKind::Compound),
        Ok(Classified::Zip(_)) => Ok(ContainerKind::Zip),
        Err(ExtractError::UnsupportedFormat(_)) => Ok(ContainerKind::Unsupported),
        Err(e) => Err(e),
    }
}

/// Open every compound file held by `path`.
///
/// Never fails outright: problems come back as `Err` items and the
/// iterator carries on with the remaining archive entries.
pub fn open_containers(path: &Path, options: &ExtractOptions) -> Containers {
    let state = match classify(path) {
        Ok(Classified::Compound(file)) => {
            info!(path = %path.display(), "Is ole file");
            let opened = CompoundFile::open(Box::new(file) as Box<dyn ReadSeek>)
                .map(|compound| Container {
                    origin: path.display().to_string(),
                    compound,
                })
                .map_err(|source| ExtractError::Compound {
                    origin: path.display().to_string(),
                    source,
                });
            State::Single(Some(opened))
        }
        Ok(Classified::Zip(archive)) => {
            info!(path = %path.display(), "Is zip file");
            State::Zip(ZipEntries {
                archive,
                next: 0,
                source: path.to_path_buf(),
                max_entry_size: options.max_entry_size,
            })
        }
        Err(e) => State::Single(Some(Err(e))),
    };

    Containers { state }
}

enum Classified {
    Compound(File),
    Zip(ZipArchive<File>),
}

fn classify(path: &Path) -> Result<Classified, ExtractError> {
    if !path.exists() {
        return Err(ExtractError::NotFound(path.to_path_buf()));
    }

    let mut file = File::open(path)?;
    if is_compound_file(&read_head(&mut file)?) {
        file.seek(SeekFrom::Start(0))?;
        return Ok(Classified::Compound(file));
    }

    file.seek(SeekFrom::Start(0))?;
    match ZipArchive::new(file) {
        Ok(archive) => Ok(Classified::Zip(archive)),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Not a zip archive");
            Err(ExtractError::UnsupportedFormat(path.to_path_buf()))
        }
    }
}

fn read_head<R: Read>(reader: &mut R) -> std::io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(MAGIC.len());
    reader.take(MAGIC.len() as u64).read_to_end(&mut head)?;
    Ok(head)
}

/// Lazy sequence of compound files found in one input.
pub struct Containers {
    state: State,
}

enum State {
    Single(Option<Result<Container, ExtractError>>),
    Zip(ZipEntries),
}

impl Iterator for Containers {
    type Item = Result<Container, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.state {
            State::Single(item) => item.take(),
            State::Zip(entries) => entries.next_container(),
        }
    }
}

struct ZipEntries {
    archive: ZipArchive<File>,
    next: usize,
    source: PathBuf,
    max_entry_size: u64,
}

impl ZipEntries {
    fn next_container(&mut self) -> Option<Result<Container, ExtractError>> {
        while self.next < self.archive.len() {
            let index = self.next;
            self.next += 1;

            let name = self
                .archive
                .name_for_index(index)
                .map_or_else(|| format!("#{}", index), str::to_string);
            match self.open_entry(index, &name) {
                Ok(Some(container)) => return Some(Ok(container)),
                Ok(None) => debug!(entry = %name, "Unzip skip"),
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }

    /// Open one archive entry as a compound file, `None` if it is not one.
    fn open_entry(&mut self, index: usize, name: &str) -> Result<Option<Container>, ExtractError> {
        let archive = &mut self.archive;
        let source = self.source.as_path();

        let head = {
            let mut entry = archive
                .by_index(index)
                .map_err(|e| entry_error(source, name, e))?;
            if entry.is_dir() {
                return Ok(None);
            }
            read_head(&mut entry).map_err(|e| entry_error(source, name, ZipError::Io(e)))?
        };
        if !is_compound_file(&head) {
            return Ok(None);
        }

        info!(entry = %name, "Unzipping ole");
        let mut data = Vec::new();
        {
            let entry = archive
                .by_index(index)
                .map_err(|e| entry_error(source, name, e))?;
            let declared = entry.size();
            entry
                .take(self.max_entry_size)
                .read_to_end(&mut data)
                .map_err(|e| entry_error(source, name, ZipError::Io(e)))?;
            if declared > self.max_entry_size {
                warn!(
                    entry = %name,
                    size = declared,
                    limit = self.max_entry_size,
                    "Archive entry truncated at size limit"
                );
            }
        }

        let origin = format!("{}!{}", source.display(), name);
        let compound = CompoundFile::open(Box::new(Cursor::new(data)) as Box<dyn ReadSeek>)
            .map_err(|e| ExtractError::Compound {
                origin: origin.clone(),
                source: e,
            })?;

        Ok(Some(Container { origin, compound }))
    }
}

fn entry_error(archive: &Path, name: &str, e: ZipError) -> ExtractError {
    match e {
        ZipError::UnsupportedArchive(msg) if msg == ZipError::PASSWORD_REQUIRED => {
            ExtractError::PasswordRequired {
                archive: archive.to_path_buf(),
                entry: name.to_string(),
            }
        }
        other => ExtractError::EntryUnreadable {
            archive: archive.to_path_buf(),
            entry: name.to_string(),
            reason: other.to_string(),
        },
    }
}
