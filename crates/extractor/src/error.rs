//! Error types for embedded object extraction.

use crate::compound::EntryKind;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for extraction operations.
///
/// None of these abort a run on their own: the driver records them against
/// the input, archive entry or stream they occurred in and moves on.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Input file not found at the specified path.
    #[error("Input not found: {0}")]
    NotFound(PathBuf),

    /// The input is neither a compound file nor a zip archive.
    #[error("Unsupported format (neither OLE nor zip): {0}")]
    UnsupportedFormat(PathBuf),

    /// An archive entry is encrypted and cannot be read without a password.
    #[error("Password required for {entry} in {archive}")]
    PasswordRequired {
        /// Archive holding the entry
        archive: PathBuf,
        /// Name of the entry within the archive
        entry: String,
    },

    /// An archive entry could not be decompressed or read.
    #[error("Cannot read {entry} in {archive}: {reason}")]
    EntryUnreadable {
        /// Archive holding the entry
        archive: PathBuf,
        /// Name of the entry within the archive
        entry: String,
        /// What went wrong
        reason: String,
    },

    /// A compound file could not be opened or one of its streams read.
    #[error("Compound file {origin}: {source}")]
    Compound {
        /// Input path, or `archive!entry` for compound files inside a zip
        origin: String,
        /// Underlying reader error
        #[source]
        source: CompoundError,
    },

    /// An extracted payload could not be written.
    #[error("Cannot write {path}: {source}")]
    Write {
        /// Output file that failed
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The zip layer rejected the archive.
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while decoding a compound file or walking its directory.
#[derive(Debug, Error)]
pub enum CompoundError {
    /// The data does not start with the compound file signature.
    #[error("Not a compound file")]
    NotCompoundFile,

    /// The 512-byte header is inconsistent.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Sector chains or directory links point somewhere they cannot.
    #[error("Corrupted: {0}")]
    Corrupted(String),

    /// Storage nesting went past the recursion limit.
    #[error("Storage nesting exceeds {limit} levels at {path}")]
    TooDeep {
        /// Slash-joined path of the storage that was not entered
        path: String,
        /// Configured limit
        limit: usize,
    },

    /// A directory entry was reached a second time through the tree.
    #[error("Directory entry {id} is linked more than once ({path})")]
    Cycle {
        /// Directory slot index
        id: u32,
        /// Slash-joined path at which it was reached again
        path: String,
    },

    /// The tree contains an entry that is neither stream nor storage.
    #[error("Unexpected {kind:?} entry at {path}")]
    UnexpectedEntry {
        /// Slash-joined path of the entry
        path: String,
        /// Type found in the directory slot
        kind: EntryKind,
    },

    /// An I/O error occurred while reading sectors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
