use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::PathBuf;

use crate::core::config::{Config, FieldSchema};
use crate::core::types::{DocumentSource, IndexRecord, Manifest, ManifestSource, Period};
use crate::extract::{extract_fields, extract_group, Document, FieldSpecifier, GroupSpec, Namespace};
use crate::irs::ReturnType;
use crate::table::{assemble, AnyPopulated, Assembly, RecordFilter, Table};
use crate::utils::progress::ProgressTracker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Full,
    Schedule(String),
    Recipients,
}

impl Mode {
    pub fn output_file(&self, period: Period) -> String {
        match self {
            Mode::Full => format!("{}_csv_index.csv", period),
            Mode::Schedule(letter) => {
                format!("schedule_{}_{}.csv", letter.trim().to_lowercase(), period)
            }
            Mode::Recipients => format!("recipient_table_{}.csv", period),
        }
    }

    pub fn default_output(&self, config: &Config, period: Period) -> PathBuf {
        config.result_path(period, &self.output_file(period))
    }

    pub fn label(&self) -> String {
        match self {
            Mode::Full => "all fields".to_string(),
            Mode::Schedule(letter) => format!("Schedule {}", letter.trim().to_uppercase()),
            Mode::Recipients => "recipient table".to_string(),
        }
    }

    pub fn requires_form_990(&self) -> bool {
        !matches!(self, Mode::Full)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedRecord {
    pub object_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub written: usize,
    pub filtered: Vec<String>,
    pub failed: Vec<SkippedRecord>,
    pub output: Option<PathBuf>,
}

async fn fetch_or_skip<S>(
    source: &S,
    record: &IndexRecord,
    summary: &mut RunSummary,
    progress: &ProgressTracker,
) -> Option<Document>
where
    S: DocumentSource + ?Sized,
{
    summary.processed += 1;
    progress.update_message(&record.object_id);
    let fetched = source
        .fetch_document(&record.object_id, record.batch_id.as_deref(), record.period)
        .await;
    progress.increment(1);

    match fetched {
        Ok(document) => Some(document),
        Err(e) => {
            log::error!("Skipping OBJECT_ID {}: {}", record.object_id, e);
            summary.failed.push(SkippedRecord {
                object_id: record.object_id.clone(),
                reason: e.to_string(),
            });
            None
        }
    }
}

fn field_schema(manifest: &Manifest, specifiers: &[FieldSpecifier]) -> Vec<String> {
    let mut columns = manifest.columns.clone();
    for specifier in specifiers {
        if !columns.iter().any(|c| c == specifier.as_str()) {
            columns.push(specifier.to_string());
        }
    }
    columns
}

pub async fn extract_table<S>(
    source: &S,
    manifest: &Manifest,
    specifiers: &[FieldSpecifier],
    filter: Option<&dyn RecordFilter>,
    namespace: &Namespace,
    progress: &ProgressTracker,
) -> (Table, RunSummary)
where
    S: DocumentSource + ?Sized,
{
    let mut table =
        Table::new(&namespace.qualifier()).with_schema(field_schema(manifest, specifiers));
    let mut summary = RunSummary::default();

    for record in &manifest.records {
        let Some(document) = fetch_or_skip(source, record, &mut summary, progress).await else {
            continue;
        };
        let fields = extract_fields(&document, specifiers, namespace);
        match assemble(record, fields, filter) {
            Assembly::Record(row) => table.push(row),
            Assembly::Skipped { object_id } => summary.filtered.push(object_id),
        }
    }

    summary.written = table.len();
    (table, summary)
}

pub async fn extract_filtered_table<S>(
    source: &S,
    manifest: &Manifest,
    schedule: &str,
    specifiers: &[FieldSpecifier],
    namespace: &Namespace,
    progress: &ProgressTracker,
) -> (Table, RunSummary)
where
    S: DocumentSource + ?Sized,
{
    let filter = AnyPopulated::new(specifiers);
    let (table, summary) =
        extract_table(source, manifest, specifiers, Some(&filter), namespace, progress).await;

    for object_id in &summary.filtered {
        log::warn!(
            "Skipping OBJECT_ID {} due to empty Schedule {} fields.",
            object_id,
            schedule.trim().to_uppercase()
        );
    }
    (table, summary)
}

pub async fn extract_group_table<S>(
    source: &S,
    manifest: &Manifest,
    group: &GroupSpec,
    namespace: &Namespace,
    progress: &ProgressTracker,
) -> (Table, RunSummary)
where
    S: DocumentSource + ?Sized,
{
    let mut schema = vec![group.key_column.clone()];
    schema.extend(group.fields.iter().map(FieldSpecifier::to_string));
    let mut table = Table::new(&namespace.qualifier()).with_schema(schema);
    let mut summary = RunSummary::default();

    for record in &manifest.records {
        let Some(document) = fetch_or_skip(source, record, &mut summary, progress).await else {
            continue;
        };
        let rows = extract_group(&document, group, &record.object_id, namespace);
        log::debug!("{} {} entries in {}", rows.len(), group.tag, record.object_id);
        for row in rows {
            table.push(row);
        }
    }

    summary.written = table.len();
    (table, summary)
}

#[derive(Debug, Clone)]
pub struct Request {
    pub period: Period,
    pub return_type: ReturnType,
    pub mode: Mode,
    pub output: PathBuf,
    pub show_progress: bool,
}

impl Request {
    pub fn new(config: &Config, period: Period, return_type: ReturnType, mode: Mode) -> Self {
        let output = mode.default_output(config, period);
        Self {
            period,
            return_type,
            mode,
            output,
            show_progress: true,
        }
    }

    pub fn with_output(mut self, output: PathBuf) -> Self {
        self.output = output;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    fn validate<'a>(&self, schema: &'a FieldSchema) -> Result<&'a [FieldSpecifier]> {
        if self.mode.requires_form_990() && self.return_type != ReturnType::Form990 {
            return Err(anyhow!(
                "The {} table is only available for form 990, not {}",
                self.mode.label(),
                self.return_type
            ));
        }

        let specifiers = match &self.mode {
            Mode::Full => schema.all.as_slice(),
            Mode::Schedule(letter) => schema
                .schedule(letter)
                .ok_or_else(|| anyhow!("No variables file for Schedule {}", letter.trim().to_uppercase()))?,
            Mode::Recipients => schema.recipient.as_slice(),
        };
        if specifiers.is_empty() {
            return Err(anyhow!("No variables loaded for {}", self.mode.label()));
        }
        Ok(specifiers)
    }
}

// Fetches the manifest, builds the requested table and writes it.
// A manifest failure ends the run. Documents that cannot be fetched are
// reported in the summary.
pub async fn run<S>(
    source: &S,
    schema: &FieldSchema,
    request: &Request,
    namespace: &Namespace,
) -> Result<RunSummary>
where
    S: ManifestSource + DocumentSource + ?Sized,
{
    let specifiers = request.validate(schema)?;

    log::info!(
        "Building {} for {} returns filed in {}",
        request.mode.label(),
        request.return_type,
        request.period
    );
    let manifest = source
        .fetch_manifest(request.period, &request.return_type)
        .await?;
    log::info!("Manifest for {} has {} filings", request.period, manifest.len());

    if let Err(e) = source.prepare(&manifest).await {
        log::warn!("Continuing with a partial download: {:#}", e);
    }

    let progress = if request.show_progress && !manifest.is_empty() {
        ProgressTracker::new(manifest.len() as u64, &request.mode.label())
    } else {
        ProgressTracker::hidden()
    };

    let (table, mut summary) = match &request.mode {
        Mode::Full => extract_table(source, &manifest, specifiers, None, namespace, &progress).await,
        Mode::Schedule(letter) => {
            extract_filtered_table(source, &manifest, letter, specifiers, namespace, &progress).await
        }
        Mode::Recipients => {
            let group = GroupSpec::recipients(specifiers.to_vec());
            extract_group_table(source, &manifest, &group, namespace, &progress).await
        }
    };
    progress.finish();

    table.write(&request.output)?;
    summary.output = Some(request.output.clone());

    log::info!(
        "Wrote {} rows to {:?} ({} filings, {} filtered, {} failed)",
        summary.written,
        request.output,
        summary.processed,
        summary.filtered.len(),
        summary.failed.len()
    );
    Ok(summary)
}
