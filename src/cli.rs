use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about = "Ingest race result files into per-event podiums", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Parse a results file, resolve its categories and replace the event's stored podiums
    Ingest(IngestArgs),
    /// List the results currently stored for an event
    Results(ResultsArgs),
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Results file uploaded by the organizer
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Event whose category catalog and stored results are used
    #[arg(short = 'e', long = "event")]
    pub event: String,
    /// JSON store file holding catalogs, people, clubs and results
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
    /// Input format (csv or tsv)
    #[arg(long, default_value = "csv")]
    pub format: String,
    /// Finishers kept per category
    #[arg(short = 'n', long, default_value_t = 5, value_parser = clap::value_parser!(u16).range(1..))]
    pub limit: u16,
    /// Field delimiter (sniffed from the header when omitted; supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (utf-8 with windows-1252 fallback when omitted)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Compute and print the results without writing to the store
    #[arg(long = "dry-run")]
    pub dry_run: bool,
    /// Print the report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ResultsArgs {
    /// Event to list
    #[arg(short = 'e', long = "event")]
    pub event: String,
    /// JSON store file
    #[arg(short = 's', long = "store")]
    pub store: PathBuf,
    /// Print results as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() || first == '"' {
                return Err("Delimiter must be an ASCII character other than '\"'".to_string());
            }
            Ok(first as u8)
        }
    }
}
