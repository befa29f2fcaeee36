//! Command-line interface for dumping embedded OLE objects.
//!
//! Every OLE Package object found in the inputs is written to the target
//! directory as `oledump<N><ext>`. The exit code summarises the run:
//! 0 nothing found, 1 something extracted, 2 bad arguments, 3 an input could
//! not be opened, 4 a stream could not be read.

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use extractor::{ExitStatus, ExtractOptions};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "oledump-all")]
#[command(
    version,
    about = "Extract files embedded as OLE Package objects in Office documents",
    long_about = None
)]
struct Cli {
    /// Input files: OLE compound files or zip archives holding them
    #[arg(value_parser = existing_file)]
    files: Vec<PathBuf>,

    /// Additional input file (may be repeated)
    #[arg(short = 'i', long = "more-input", value_name = "FILE", value_parser = existing_file)]
    more_input: Vec<PathBuf>,

    /// Directory to write dumped files into
    #[arg(short = 'd', long, value_name = "DIR", default_value = ".")]
    target_dir: PathBuf,

    /// Per-stream and per-archive-entry read cap in bytes
    #[arg(long, value_name = "BYTES")]
    max_size: Option<u64>,

    /// Print the extraction report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn inputs(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .chain(&self.more_input)
            .cloned()
            .collect()
    }

    fn options(&self) -> ExtractOptions {
        let mut options = ExtractOptions::default();
        if let Some(limit) = self.max_size {
            options.max_stream_size = limit;
            options.max_entry_size = limit;
        }
        options
    }
}

fn existing_file(value: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(value);
    if path.is_file() {
        Ok(path)
    } else {
        Err(format!("{} is not an existing file", value))
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let inputs = cli.inputs();
    if inputs.is_empty() {
        Cli::command()
            .error(
                ErrorKind::MissingRequiredArgument,
                "at least one input file is required (positional or -i)",
            )
            .exit();
    }

    let report = match extractor::extract(&inputs, &cli.target_dir, &cli.options()) {
        Ok(report) => report,
        Err(e) => {
            error!(target_dir = %cli.target_dir.display(), error = %e, "Cannot use target directory");
            process::exit(ExitStatus::ArgumentError.code());
        }
    };

    info!(
        files = report.files_extracted,
        bytes = report.bytes_written,
        open_failures = report.open_failures,
        stream_failures = report.stream_failures,
        "Done"
    );

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => error!(error = %e, "Cannot serialize report"),
        }
    }

    process::exit(report.exit_status().code());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_missing_file_rejected() {
        let result = Cli::try_parse_from(["oledump-all", "/definitely/not/here.doc"]);
        let err = result.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ValueValidation);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_inputs_and_options() {
        let file = std::env::current_exe().unwrap();
        let file = file.to_str().unwrap();
        let cli = Cli::try_parse_from([
            "oledump-all",
            file,
            "-i",
            file,
            "-d",
            "out",
            "--max-size",
            "1024",
        ])
        .unwrap();

        assert_eq!(cli.inputs().len(), 2);
        assert_eq!(cli.target_dir, PathBuf::from("out"));
        assert_eq!(cli.options().max_stream_size, 1024);
        assert_eq!(cli.options().max_entry_size, 1024);
    }

    #[test]
    fn test_target_dir_defaults_to_current() {
        let cli = Cli::try_parse_from(["oledump-all"]).unwrap();
        assert!(cli.inputs().is_empty());
        assert_eq!(cli.target_dir, PathBuf::from("."));
    }
}
