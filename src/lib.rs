pub mod cli;
pub mod columns;
pub mod enrich;
pub mod error;
pub mod grouping;
pub mod io_utils;
pub mod json_store;
pub mod parser;
pub mod pipeline;
pub mod report;
pub mod resolve;
pub mod store;
pub mod topn;
pub mod writer;

use std::{env, fs, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    json_store::JsonFileStore,
    parser::InputFormat,
    pipeline::{PipelineOptions, ResultPipeline},
    store::Datastore,
};

pub use crate::{
    error::{IngestError, StoreError},
    pipeline::process_result_file,
    topn::ProcessedResult,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("results_ingest", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Ingest(args) => handle_ingest(&args),
        Commands::Results(args) => handle_results(&args),
    }
}

fn handle_ingest(args: &cli::IngestArgs) -> Result<()> {
    let format: InputFormat = args.format.parse()?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let bytes =
        fs::read(&args.input).with_context(|| format!("Reading results file {:?}", args.input))?;
    info!(
        "Ingesting '{}' ({} bytes, {format}) for event '{}'",
        args.input.display(),
        bytes.len(),
        args.event
    );
    if let Some(delimiter) = args.delimiter {
        debug!("Delimiter override '{}'", printable_delimiter(delimiter));
    }
    let store = JsonFileStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;
    let pipeline = ResultPipeline::new(&store).with_options(PipelineOptions {
        limit: usize::from(args.limit),
        delimiter: args.delimiter,
        encoding,
    });
    let report = if args.dry_run {
        pipeline.preview(&bytes, format, &args.event)
    } else {
        pipeline.run(&bytes, format, &args.event)
    }
    .with_context(|| format!("Processing {:?} for event '{}'", args.input, args.event))?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Serializing report")?
        );
    } else {
        print!("{}", report::render_results(&report.results));
        print!("{}", report::render_diagnostics(&report));
    }
    Ok(())
}

fn handle_results(args: &cli::ResultsArgs) -> Result<()> {
    let store = JsonFileStore::open(&args.store)
        .with_context(|| format!("Opening store {:?}", args.store))?;
    let results = store
        .top_results_for_event(&args.event)
        .with_context(|| format!("Reading results for event '{}'", args.event))?;
    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&results).context("Serializing results")?
        );
    } else if results.is_empty() {
        info!("No results stored for event '{}'", args.event);
    } else {
        print!("{}", report::render_results(&results));
    }
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
