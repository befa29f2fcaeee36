//! Type definitions for embedded object extraction.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on bytes read per stream and per archive entry (100 MB).
pub const DEFAULT_MAX_SIZE: u64 = 100 * 1024 * 1024;

/// Options for an extraction run.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Maximum number of bytes read from a single stream
    pub max_stream_size: u64,

    /// Maximum number of bytes buffered from a single archive entry
    pub max_entry_size: u64,

    /// Rewrite `c:\dir\name` style candidate names to `c/dir/name`
    pub forward_slash_names: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            max_stream_size: DEFAULT_MAX_SIZE,
            max_entry_size: DEFAULT_MAX_SIZE,
            forward_slash_names: std::path::MAIN_SEPARATOR == '/',
        }
    }
}

/// Failure classes that degrade the exit status, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// An input (or archive entry) could not be opened as OLE
    OpenFailure,
    /// A stream inside an opened compound file could not be enumerated or read
    StreamFailure,
}

/// Process exit status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    /// Nothing extracted, nothing failed
    Clean,
    /// At least one file extracted, whatever else happened
    Extracted,
    /// Bad command line
    ArgumentError,
    /// An input could not be opened or classified
    OpenFailure,
    /// A stream could not be read
    StreamFailure,
}

impl ExitStatus {
    /// Numeric process exit code.
    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Clean => 0,
            ExitStatus::Extracted => 1,
            ExitStatus::ArgumentError => 2,
            ExitStatus::OpenFailure => 3,
            ExitStatus::StreamFailure => 4,
        }
    }
}

impl From<ErrorClass> for ExitStatus {
    fn from(class: ErrorClass) -> Self {
        match class {
            ErrorClass::OpenFailure => ExitStatus::OpenFailure,
            ErrorClass::StreamFailure => ExitStatus::StreamFailure,
        }
    }
}

/// One payload written to disk.
#[derive(Debug, Clone, Serialize)]
pub struct DumpedFile {
    /// Where the payload was written
    pub output: PathBuf,

    /// Input path, or `archive!entry` for compound files inside a zip
    pub container: String,

    /// Slash-joined stream path inside the compound file
    pub stream: String,

    /// Whether the stream was only found by the orphan scan
    pub orphan: bool,

    /// Candidate names from the record: label, source path, temp path
    pub names: [String; 3],

    /// Bytes written
    pub size: u64,

    /// Whether the record announced more payload than the stream held
    pub truncated: bool,
}

/// Outcome of an extraction run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// Number of files written
    pub files_extracted: u64,

    /// Total bytes written to disk
    pub bytes_written: u64,

    /// Inputs or archive entries that could not be opened
    pub open_failures: u64,

    /// Streams that could not be enumerated, read or dumped
    pub stream_failures: u64,

    /// Every file written, in counter order
    pub dumped: Vec<DumpedFile>,

    /// Duration of the run (in seconds)
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl ExtractionReport {
    /// Count a failure of the given class.
    pub fn record_failure(&mut self, class: ErrorClass) {
        match class {
            ErrorClass::OpenFailure => self.open_failures += 1,
            ErrorClass::StreamFailure => self.stream_failures += 1,
        }
    }

    /// Count a written file.
    pub fn record_dump(&mut self, dumped: DumpedFile) {
        self.files_extracted += 1;
        self.bytes_written += dumped.size;
        self.dumped.push(dumped);
    }

    /// Most severe failure class seen, if any.
    pub fn worst_error(&self) -> Option<ErrorClass> {
        if self.stream_failures > 0 {
            Some(ErrorClass::StreamFailure)
        } else if self.open_failures > 0 {
            Some(ErrorClass::OpenFailure)
        } else {
            None
        }
    }

    /// Combine the outcome: extracted beats any error, errors beat clean.
    pub fn exit_status(&self) -> ExitStatus {
        if self.files_extracted > 0 {
            ExitStatus::Extracted
        } else {
            self.worst_error()
                .map_or(ExitStatus::Clean, ExitStatus::from)
        }
    }
}

// Helper module for Duration serialization
mod duration_serde {
    use serde::{Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }
}
