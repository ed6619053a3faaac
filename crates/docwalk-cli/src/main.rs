//! `docwalk` - recursive text and metadata extraction from the command line
//!
//! ```bash
//! # Extract a document and everything embedded in it
//! docwalk extract report.docx
//!
//! # JSON output, capped at 500 characters per document
//! docwalk extract bundle.zip --format json --max-length 500
//!
//! # Show the detected format
//! docwalk detect unknown.bin
//! ```
//!
//! Defaults for `extract` can be set in `./.docwalk.toml` or
//! `~/.docwalk.toml` under an `[extract]` table.

mod config;
mod output;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use config::{Config, OutputFormat};
use docwalk_backend::{Extractor, InputFormat};
use docwalk_core::ExtractError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(
    name = "docwalk",
    about = "Extract text and metadata from documents and everything embedded in them",
    long_about = "Extract text and metadata from a document and, recursively, from every\n\
                  document embedded in it: archive entries, office attachments, PDF\n\
                  attachments, e-book images.",
    version
)]
struct Args {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Extract a document and all embedded documents
    #[command(long_about = "Extract a document and all embedded documents.\n\
                      \n\
                      Documents are printed in depth-first order, the container first.\n\
                      \n\
                      Defaults can be set via .docwalk.toml configuration file.")]
    Extract {
        /// Input file path
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Maximum characters kept per document
        #[arg(long, value_name = "N")]
        max_length: Option<usize>,

        /// Wrap each document in XHTML
        #[arg(long)]
        xml: bool,

        /// Record failing embedded documents instead of aborting
        #[arg(long)]
        catch_embedded_errors: bool,

        /// Deepest nesting level visited (the container is depth 0)
        #[arg(long, value_name = "N")]
        max_depth: Option<usize>,

        /// Output format (default: text, or from config)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,
    },

    /// Print the detected format of a file
    Detect {
        /// Input file path
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .target(env_logger::Target::Stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ExtractError>() {
                Some(extract) => eprintln!(
                    "{} [{}] {}",
                    "Error:".red().bold(),
                    extract.kind(),
                    extract
                ),
                None => eprintln!("{} {:#}", "Error:".red().bold(), e),
            }
            ExitCode::FAILURE
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Extract {
            input,
            max_length,
            xml,
            catch_embedded_errors,
            max_depth,
            format,
        } => {
            // CLI flags override config defaults
            let defaults = Config::discover().extract_defaults();
            let mut extractor = Extractor::new().set_catch_embedded_errors(
                catch_embedded_errors || defaults.catch_embedded_errors.unwrap_or(false),
            );
            if let Some(depth) = max_depth.or(defaults.max_depth) {
                extractor = extractor.set_max_embedded_depth(depth);
            }
            let format = format.or(defaults.format).unwrap_or_default();
            let as_xml = xml || defaults.xml.unwrap_or(false);

            extract(
                &extractor,
                &input,
                max_length.or(defaults.max_length),
                as_xml,
                format,
            )
        }
        Commands::Detect { input } => detect(&input),
    }
}

fn extract(
    extractor: &Extractor,
    input: &Path,
    max_length: Option<usize>,
    as_xml: bool,
    format: OutputFormat,
) -> Result<()> {
    log::info!("Extracting {}", input.display());
    let result = extractor.extract_file_recursive_opt(input, max_length, Some(as_xml))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    output::write_result(&mut out, &result, format)?;
    out.flush()?;
    Ok(())
}

fn detect(input: &Path) -> Result<()> {
    let bytes =
        fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let name = input.file_name().and_then(|n| n.to_str());
    let format = InputFormat::detect(name, &bytes);
    println!("{format}\t{}", format.mime_type());
    Ok(())
}
