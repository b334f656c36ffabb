//! End-to-end processing of one uploaded results file.
//!
//! Stages run strictly in sequence, each consuming the full output of the
//! previous one:
//!
//! 1. [`parser::parse_table`] turns bytes into header-keyed rows.
//! 2. [`columns::normalize_rows`] maps organizer columns onto result fields.
//! 3. [`grouping::group_by_category`] buckets rows by exact category label.
//! 4. [`resolve::resolve_groups`] binds labels to the event's catalog.
//! 5. [`topn::extract_top`] merges labels bound to the same catalog id and
//!    keeps the first `limit` rows per category.
//! 6. [`enrich::enrich_results`] links athletes and clubs by name.
//! 7. [`writer::write_results`] replaces the event's stored results.
//!
//! Fatal problems abort the run as an [`IngestError`] before step 7 mutates
//! anything. Everything else lands in [`RunDiagnostics`].

use encoding_rs::Encoding;
use log::{debug, info};
use serde::Serialize;

use crate::{
    columns::{self, ResultField},
    enrich::{self, EnrichmentStats},
    error::IngestResult,
    grouping,
    parser::{self, InputFormat, ParseOptions},
    resolve::{self, CategoryIndex, MatchKind, UnresolvedCategory},
    store::Datastore,
    topn::{self, DEFAULT_TOP_LIMIT, ProcessedResult},
    writer,
};

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub limit: usize,
    pub delimiter: Option<u8>,
    pub encoding: Option<&'static Encoding>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_TOP_LIMIT,
            delimiter: None,
            encoding: None,
        }
    }
}

impl PipelineOptions {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            delimiter: self.delimiter,
            encoding: self.encoding,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategorySummary {
    pub label: String,
    pub category_id: String,
    pub containment_match: bool,
    pub source_rows: usize,
    pub kept_rows: usize,
}

/// Non-fatal findings of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDiagnostics {
    pub rows_read: usize,
    pub unmapped_fields: Vec<String>,
    pub categories: Vec<CategorySummary>,
    pub unresolved: Vec<UnresolvedCategory>,
    pub enrichment: EnrichmentStats,
    pub replaced: usize,
    pub dropped_stale_category: usize,
    pub failed_inserts: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub event_id: String,
    /// Persisted rows, or the would-be rows for a preview.
    pub results: Vec<ProcessedResult>,
    pub diagnostics: RunDiagnostics,
    pub dry_run: bool,
}

pub struct ResultPipeline<'a> {
    store: &'a dyn Datastore,
    options: PipelineOptions,
}

impl<'a> ResultPipeline<'a> {
    pub fn new(store: &'a dyn Datastore) -> Self {
        Self {
            store,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.options.limit = limit;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Runs the whole pipeline and returns the stored rows.
    pub fn process_result_file(
        &self,
        bytes: &[u8],
        format: InputFormat,
        event_id: &str,
    ) -> IngestResult<Vec<ProcessedResult>> {
        self.run(bytes, format, event_id).map(|report| report.results)
    }

    /// Runs the whole pipeline, replacing the event's stored results.
    pub fn run(
        &self,
        bytes: &[u8],
        format: InputFormat,
        event_id: &str,
    ) -> IngestResult<IngestReport> {
        let (results, mut diagnostics) = self.prepare(bytes, format, event_id)?;
        let outcome = writer::write_results(self.store, event_id, results)?;
        diagnostics.replaced = outcome.replaced;
        diagnostics.dropped_stale_category = outcome.dropped_stale_category;
        diagnostics.failed_inserts = outcome.failed_inserts;
        info!(
            "Event '{event_id}': {} row(s) read, {} result(s) stored, {} unresolved categor(ies)",
            diagnostics.rows_read,
            outcome.persisted.len(),
            diagnostics.unresolved.len()
        );
        Ok(IngestReport {
            event_id: event_id.to_string(),
            results: outcome.persisted,
            diagnostics,
            dry_run: false,
        })
    }

    /// Computes what [`run`](Self::run) would store without writing anything.
    pub fn preview(
        &self,
        bytes: &[u8],
        format: InputFormat,
        event_id: &str,
    ) -> IngestResult<IngestReport> {
        let (results, diagnostics) = self.prepare(bytes, format, event_id)?;
        Ok(IngestReport {
            event_id: event_id.to_string(),
            results,
            diagnostics,
            dry_run: true,
        })
    }

    fn prepare(
        &self,
        bytes: &[u8],
        format: InputFormat,
        event_id: &str,
    ) -> IngestResult<(Vec<ProcessedResult>, RunDiagnostics)> {
        let table = parser::parse_table(bytes, format, &self.options.parse_options())?;
        let mut diagnostics = RunDiagnostics {
            rows_read: table.rows.len(),
            ..RunDiagnostics::default()
        };

        let (mapping, rows) = columns::normalize_rows(&table.rows);
        let missing = mapping.missing_fields();
        if !missing.is_empty() {
            debug!("No column found for field(s): {missing:?}");
        }
        diagnostics.unmapped_fields = missing.iter().map(ResultField::to_string).collect();

        let groups = grouping::group_by_category(rows);
        debug!("Grouped rows into {} category label(s)", groups.len());

        let catalog = self.store.categories_for_event(event_id)?;
        let index = CategoryIndex::from_catalog(&catalog);
        let resolution = resolve::resolve_groups(groups, &index);
        diagnostics.unresolved = resolution.unresolved;

        let mut results = topn::extract_top(&resolution.resolved, event_id, self.options.limit);
        diagnostics.categories = resolution
            .resolved
            .iter()
            .map(|category| CategorySummary {
                label: category.group.label.clone(),
                category_id: category.category_id.clone(),
                containment_match: category.kind == MatchKind::Containment,
                source_rows: category.group.rows.len(),
                kept_rows: results
                    .iter()
                    .filter(|r| {
                        r.category_id == category.category_id
                            && r.category_name == category.group.label
                    })
                    .count(),
            })
            .collect();

        diagnostics.enrichment = enrich::enrich_results(&mut results, self.store)?;
        Ok((results, diagnostics))
    }
}

/// Runs the pipeline once with default parsing options.
pub fn process_result_file(
    store: &dyn Datastore,
    bytes: &[u8],
    format: InputFormat,
    event_id: &str,
    limit: usize,
) -> IngestResult<Vec<ProcessedResult>> {
    ResultPipeline::new(store)
        .with_limit(limit)
        .process_result_file(bytes, format, event_id)
}
