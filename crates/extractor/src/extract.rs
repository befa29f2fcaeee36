//! Extraction driver: inputs in, `oledump<N><ext>` files out.

use crate::compound::CompoundFile;
use crate::error::ExtractError;
use crate::naming::{output_file_name, resolve_extension, to_forward_slashes};
use crate::native::{detect_and_extract, header_present};
use crate::probe::{open_containers, Container};
use crate::streams::StreamEntry;
use crate::types::{DumpedFile, ErrorClass, ExtractOptions, ExtractionReport};
use std::fs;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Extracts embedded objects from any number of inputs into one directory.
///
/// Owns the output counter and the running report, so numbering continues
/// across inputs and containers for as long as the extractor lives.
#[derive(Debug)]
pub struct Extractor {
    target_dir: PathBuf,
    options: ExtractOptions,
    next_index: u64,
    report: ExtractionReport,
    started: Instant,
}

impl Extractor {
    /// Create an extractor writing into `target_dir`.
    pub fn new(target_dir: &Path, options: ExtractOptions) -> Self {
        Self {
            target_dir: target_dir.to_path_buf(),
            options,
            next_index: 0,
            report: ExtractionReport::default(),
            started: Instant::now(),
        }
    }

    /// Process every input in order.
    pub fn run<P: AsRef<Path>>(&mut self, inputs: &[P]) {
        for input in inputs {
            self.process_input(input.as_ref());
        }
    }

    /// Process one input file and every compound file inside it.
    pub fn process_input(&mut self, path: &Path) {
        for opened in open_containers(path, &self.options) {
            match opened {
                Ok(mut container) => self.process_container(&mut container),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Open failed");
                    self.report.record_failure(ErrorClass::OpenFailure);
                }
            }
        }
    }

    /// Check every stream of an opened compound file.
    pub fn process_container(&mut self, container: &mut Container) {
        let Container { origin, compound } = container;
        let origin = origin.as_str();

        // Directory walk first, reads after: the walk borrows the file
        let streams: Vec<_> = compound.streams().collect();

        for item in streams {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(container = %origin, error = %e, "Failed to recurse into storage");
                    self.report.record_failure(ErrorClass::StreamFailure);
                    continue;
                }
            };

            info!(
                stream = %entry.display_path(),
                orphan = entry.orphan,
                "Checking stream"
            );

            match self.dump_stream(compound, &entry, origin) {
                Ok(Some(dumped)) => self.report.record_dump(dumped),
                Ok(None) => {}
                Err(e) => {
                    warn!(stream = %entry.display_path(), error = %e, "Failed to dump stream");
                    self.report.record_failure(ErrorClass::StreamFailure);
                }
            }
        }
    }

    /// Dump one stream if it carries an embedded object.
    fn dump_stream<R: Read + Seek>(
        &mut self,
        compound: &mut CompoundFile<R>,
        entry: &StreamEntry,
        origin: &str,
    ) -> Result<Option<DumpedFile>, ExtractError> {
        let data = compound
            .read_stream(entry.handle, self.options.max_stream_size)
            .map_err(|source| ExtractError::Compound {
                origin: origin.to_string(),
                source,
            })?;

        if !header_present(&data) {
            return Ok(None);
        }
        let Some(record) = detect_and_extract(&data) else {
            debug!(stream = %entry.display_path(), "Ole10Native header present but record malformed");
            return Ok(None);
        };

        let names = record.names().map(|name| {
            if self.options.forward_slash_names {
                to_forward_slashes(name)
            } else {
                name.to_string()
            }
        });
        info!(?names, "Filenames");

        if record.is_truncated() {
            warn!(
                stream = %entry.display_path(),
                declared = record.payload_len,
                available = record.payload.len(),
                "Embedded payload truncated"
            );
        }

        let extension = resolve_extension(&names);
        let output = self
            .target_dir
            .join(output_file_name(self.next_index, &extension));
        info!(path = %output.display(), "Dumping to");

        fs::write(&output, record.payload).map_err(|source| ExtractError::Write {
            path: output.clone(),
            source,
        })?;
        self.next_index += 1;

        Ok(Some(DumpedFile {
            output,
            container: origin.to_string(),
            stream: entry.display_path(),
            orphan: entry.orphan,
            names,
            size: record.payload.len() as u64,
            truncated: record.is_truncated(),
        }))
    }

    /// The report so far.
    pub fn report(&self) -> &ExtractionReport {
        &self.report
    }

    /// Finish the run and hand back the report.
    pub fn finish(mut self) -> ExtractionReport {
        self.report.duration = self.started.elapsed();
        self.report
    }
}

/// Extract embedded objects from all inputs into `target_dir`.
///
/// Creates `target_dir` when missing. Every other failure is recorded in the
/// report instead of being returned.
pub fn extract_all<P: AsRef<Path>>(
    inputs: &[P],
    target_dir: &Path,
    options: &ExtractOptions,
) -> Result<ExtractionReport, ExtractError> {
    fs::create_dir_all(target_dir)?;

    let mut extractor = Extractor::new(target_dir, options.clone());
    extractor.run(inputs);
    Ok(extractor.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ExitStatus;
    use tempfile::TempDir;

    #[test]
    fn test_unsupported_input_counts_open_failure() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("plain.txt");
        fs::write(&input, b"hello").unwrap();

        let mut extractor = Extractor::new(temp_dir.path(), ExtractOptions::default());
        extractor.process_input(&input);

        assert_eq!(extractor.report().open_failures, 1);
        assert_eq!(extractor.report().exit_status(), ExitStatus::OpenFailure);
    }

    #[test]
    fn test_missing_input_counts_open_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut extractor = Extractor::new(temp_dir.path(), ExtractOptions::default());
        extractor.run(&[temp_dir.path().join("missing.doc")]);

        let report = extractor.finish();
        assert_eq!(report.open_failures, 1);
        assert_eq!(report.files_extracted, 0);
    }

    #[test]
    fn test_extract_all_creates_target_dir() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("nested").join("out");
        let inputs: [&Path; 0] = [];

        let report = extract_all(&inputs, &target, &ExtractOptions::default()).unwrap();
        assert!(target.is_dir());
        assert_eq!(report.exit_status(), ExitStatus::Clean);
    }
}
