//! # Extractor
//!
//! Dumps files embedded as OLE Package objects (`\x01Ole10Native` streams)
//! out of OLE compound files and zip archives holding compound files.
//!
//! Every stream of every compound file is checked, including streams that
//! are still in the directory table but no longer linked from the root.
//! Each embedded payload is written as `oledump<N><ext>`, where `N` counts
//! up across the whole run and `<ext>` comes from the names stored with the
//! object.
//!
//! ## Supported Inputs
//!
//! - OLE compound files (`.doc`, `.xls`, `.ppt`, `.msg`, bare `.bin` objects)
//! - Zip archives (Office Open XML documents among them), whose entries are
//!   probed for the compound file signature
//!
//! ## Example
//!
//! ```rust,no_run
//! use extractor::{extract, probe, ContainerKind, ExtractOptions};
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = Path::new("report.docx");
//! if probe(input)? == ContainerKind::Unsupported {
//!     return Ok(());
//! }
//!
//! let report = extract(&[input], Path::new("dumped"), &ExtractOptions::default())?;
//! for dumped in &report.dumped {
//!     println!("{} <- {}", dumped.output.display(), dumped.names[0]);
//! }
//! std::process::exit(report.exit_status().code());
//! # }
//! ```

pub mod compound;
pub mod error;
pub mod extract;
pub mod naming;
pub mod native;
pub mod probe;
pub mod streams;
pub mod types;

// Re-export main types
pub use compound::{CompoundFile, EntryKind, StreamHandle};
pub use error::{CompoundError, ExtractError};
pub use extract::Extractor;
pub use native::{NativeLayout, Ole10NativeRecord};
pub use probe::ContainerKind;
pub use streams::StreamEntry;
pub use types::{DumpedFile, ErrorClass, ExitStatus, ExtractOptions, ExtractionReport};

use std::path::Path;

/// Determine what kind of container a file is without extracting anything.
///
/// # Errors
///
/// Returns an error if the file does not exist or cannot be read.
pub fn probe(path: &Path) -> Result<ContainerKind, ExtractError> {
    probe::probe_container(path)
}

/// Extract every embedded object from `inputs` into `target_dir`.
///
/// # Arguments
///
/// * `inputs` - Compound files and zip archives, processed in order
/// * `target_dir` - Directory receiving `oledump<N><ext>` files, created if missing
/// * `options` - Size limits and name handling
///
/// # Returns
///
/// Returns an `ExtractionReport` listing the files written and counting the
/// inputs and streams that failed. Its [`ExtractionReport::exit_status`] is
/// the outcome of the run.
///
/// # Errors
///
/// Returns an error only if `target_dir` cannot be created. Failures on
/// individual inputs, archive entries or streams end up in the report.
pub fn extract<P: AsRef<Path>>(
    inputs: &[P],
    target_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    extract::extract_all(inputs, target_dir, options)
}
