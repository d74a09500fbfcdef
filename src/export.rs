//! Zip export of feeds and statistics
//!
//! Data is gathered page by page through the same components the API uses,
//! serialized as one JSON document and deflated into `output_dir`. The
//! archive is then served by the plain `/download/:file_name` route.
//!
//! Row exports may be split into numbered volumes, each its own archive,
//! by capping the uncompressed JSON size of every volume.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::activity::{LogFilter, LogUnifier, PageRequest};
use crate::blob::LocalBlobStore;
use crate::error::{AppError, AppResult};
use crate::statistics::StatisticsAggregator;
use crate::utils::time::DateWindow;

pub const DEFAULT_EXPORT_PAGE_SIZE: i64 = 1000;
pub const DEFAULT_COMPRESSION_LEVEL: u8 = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    OperationLogs,
    GenerationHistory,
    Statistics,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::OperationLogs => "operation_logs",
            ExportKind::GenerationHistory => "generation_history",
            ExportKind::Statistics => "statistics",
        }
    }
}

impl std::str::FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "operation_logs" => Ok(ExportKind::OperationLogs),
            "generation_history" => Ok(ExportKind::GenerationHistory),
            "statistics" => Ok(ExportKind::Statistics),
            other => Err(format!("unsupported export type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub kind: ExportKind,
    pub window: DateWindow,
    /// Rows fetched per page while collecting, 100..=10000
    pub page_size: i64,
    /// Deflate level, 1..=9
    pub compression_level: u8,
    /// Uncompressed bytes per volume; `None` writes a single archive
    pub split_bytes: Option<u64>,
}

impl ExportRequest {
    pub fn new(kind: ExportKind, window: DateWindow) -> Self {
        Self {
            kind,
            window,
            page_size: DEFAULT_EXPORT_PAGE_SIZE,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            split_bytes: None,
        }
    }

    fn validate(&self) -> AppResult<()> {
        if !(100..=10_000).contains(&self.page_size) {
            return Err(AppError::invalid(format!(
                "page_size must be between 100 and 10000, got {}",
                self.page_size
            )));
        }
        if !(1..=9).contains(&self.compression_level) {
            return Err(AppError::invalid(format!(
                "compression_level must be between 1 and 9, got {}",
                self.compression_level
            )));
        }
        if self.split_bytes == Some(0) {
            return Err(AppError::invalid("split size must be positive"));
        }
        Ok(())
    }
}

/// One archive written by an export
#[derive(Debug, Clone, Serialize)]
pub struct ExportVolume {
    pub file_name: String,
    pub record_count: usize,
    pub download_url: String,
}

/// Result of a finished export. `file_name` and `download_url` name the
/// first volume; `record_count` covers all of them.
#[derive(Debug, Clone, Serialize)]
pub struct ExportArtifact {
    pub file_name: String,
    pub record_count: usize,
    pub download_url: String,
    pub volumes: Vec<ExportVolume>,
}

enum Collected {
    Rows(Vec<Value>),
    Summary(Value),
}

impl Collected {
    fn record_count(&self) -> usize {
        match self {
            Collected::Rows(rows) => rows.len(),
            Collected::Summary(_) => 1,
        }
    }

    fn into_document(self) -> Value {
        match self {
            Collected::Rows(rows) => Value::Array(rows),
            Collected::Summary(summary) => summary,
        }
    }
}

/// Greedily pack rows into volumes of at most `limit` serialized bytes.
/// A row larger than the limit gets a volume of its own. Always returns
/// at least one volume.
fn split_rows(rows: Vec<Value>, limit: u64) -> AppResult<Vec<Vec<Value>>> {
    let mut volumes = Vec::new();
    let mut current = Vec::new();
    let mut current_bytes: u64 = 0;
    for row in rows {
        // Separator included
        let row_bytes = serde_json::to_vec(&row)?.len() as u64 + 1;
        if !current.is_empty() && current_bytes + row_bytes > limit {
            volumes.push(std::mem::take(&mut current));
            current_bytes = 0;
        }
        current_bytes += row_bytes;
        current.push(row);
    }
    if !current.is_empty() || volumes.is_empty() {
        volumes.push(current);
    }
    Ok(volumes)
}

fn download_url(file_name: &str) -> String {
    format!("/download/{}", urlencoding::encode(file_name))
}

#[derive(Clone)]
pub struct Exporter {
    unifier: LogUnifier,
    aggregator: StatisticsAggregator,
    outputs: LocalBlobStore,
}

impl Exporter {
    pub fn new(
        unifier: LogUnifier,
        aggregator: StatisticsAggregator,
        outputs: LocalBlobStore,
    ) -> Self {
        Self {
            unifier,
            aggregator,
            outputs,
        }
    }

    pub async fn export(&self, request: &ExportRequest, now: DateTime<Utc>) -> AppResult<ExportArtifact> {
        request.validate()?;

        let collected = self.collect(request).await?;
        let record_count = collected.record_count();
        let stamp = now
            .with_timezone(&self.aggregator.offset())
            .format("%Y%m%d_%H%M%S");
        let base = format!("{}_{}", request.kind.as_str(), stamp);

        let parts: Vec<(String, usize, Value)> = match (collected, request.split_bytes) {
            (Collected::Rows(rows), Some(limit)) => split_rows(rows, limit)?
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| (format!("{}_vol{}", base, i + 1), chunk.len(), Value::Array(chunk)))
                .collect(),
            (collected, _) => vec![(base, record_count, collected.into_document())],
        };

        self.outputs.ensure_root().await?;
        let mut volumes = Vec::with_capacity(parts.len());
        for (stem, count, document) in parts {
            let file_name = self.write_archive(&stem, &document, request.compression_level).await?;
            volumes.push(ExportVolume {
                download_url: download_url(&file_name),
                file_name,
                record_count: count,
            });
        }

        let first = volumes
            .first()
            .cloned()
            .ok_or_else(|| AppError::Internal("export produced no archive".to_string()))?;
        tracing::info!(
            kind = request.kind.as_str(),
            record_count,
            volumes = volumes.len(),
            file_name = %first.file_name,
            "export written"
        );

        Ok(ExportArtifact {
            file_name: first.file_name,
            record_count,
            download_url: first.download_url,
            volumes,
        })
    }

    /// Deflate `document` into `{stem}.zip` holding `{stem}.json`
    async fn write_archive(&self, stem: &str, document: &Value, level: u8) -> AppResult<String> {
        let file_name = format!("{}.zip", stem);
        let entry_name = format!("{}.json", stem);
        let path = self.outputs.resolve(&file_name)?;
        let bytes = serde_json::to_vec_pretty(document)?;

        tokio::task::spawn_blocking(move || -> AppResult<()> {
            let file = std::fs::File::create(&path)?;
            let mut zip = ZipWriter::new(file);
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .compression_level(Some(i64::from(level)));
            zip.start_file(entry_name, options)?;
            zip.write_all(&bytes)?;
            zip.finish()?;
            Ok(())
        })
        .await??;

        Ok(file_name)
    }

    async fn collect(&self, request: &ExportRequest) -> AppResult<Collected> {
        match request.kind {
            ExportKind::OperationLogs => {
                let filter = LogFilter::within(request.window);
                let mut all = Vec::new();
                let mut page_no = 1;
                loop {
                    let page = PageRequest::new(page_no, request.page_size)?;
                    let result = self.unifier.query(&filter, &page).await?;
                    if result.entries.is_empty() {
                        break;
                    }
                    for entry in result.entries {
                        all.push(serde_json::to_value(entry)?);
                    }
                    page_no += 1;
                }
                Ok(Collected::Rows(all))
            }
            ExportKind::GenerationHistory => {
                let mut all = Vec::new();
                let mut page_no = 1;
                loop {
                    let page = PageRequest::new(page_no, request.page_size)?;
                    let result = self
                        .unifier
                        .generation_history(None, &request.window, &page)
                        .await?;
                    if result.entries.is_empty() {
                        break;
                    }
                    for entry in result.entries {
                        all.push(serde_json::to_value(entry)?);
                    }
                    page_no += 1;
                }
                Ok(Collected::Rows(all))
            }
            ExportKind::Statistics => {
                let summary = self.aggregator.summary(&request.window).await?;
                Ok(Collected::Summary(serde_json::to_value(summary)?))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::store::Store;
    use crate::types::{NewOperation, Role, UserStatus};
    use crate::utils::time::utc_offset;
    use chrono::{Duration, TimeZone};
    use std::io::Read;
    use tempfile::TempDir;

    async fn exporter_with_rows(dir: &TempDir, rows: i64) -> (Exporter, LocalBlobStore, DateTime<Utc>) {
        let store = Store::open(&DatabaseConfig::new(dir.path().join("export.db")))
            .await
            .unwrap();
        let user = store
            .create_user("erin", "x", Role::Admin, UserStatus::Active)
            .await
            .unwrap();
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        for i in 0..rows {
            store
                .record_operation(
                    &NewOperation::succeeded(user, "login", "ok").at(base + Duration::minutes(i)),
                )
                .await
                .unwrap();
        }

        let outputs = LocalBlobStore::new(dir.path().join("output"));
        let exporter = Exporter::new(
            LogUnifier::new(store.clone()),
            StatisticsAggregator::new(store, utc_offset()),
            outputs.clone(),
        );
        (exporter, outputs, base + Duration::days(1))
    }

    fn read_rows(outputs: &LocalBlobStore, file_name: &str, entry_name: &str) -> Vec<serde_json::Value> {
        let file = std::fs::File::open(outputs.resolve(file_name).unwrap()).unwrap();
        let mut archive = zip::ZipArchive::new(file).unwrap();
        let mut entry = archive.by_name(entry_name).unwrap();
        let mut json = String::new();
        entry.read_to_string(&mut json).unwrap();
        serde_json::from_str(&json).unwrap()
    }

    #[tokio::test]
    async fn test_operation_log_export_contains_every_row() {
        let dir = TempDir::new().unwrap();
        let (exporter, outputs, now) = exporter_with_rows(&dir, 250).await;

        let mut request = ExportRequest::new(ExportKind::OperationLogs, DateWindow::all_time(now));
        request.page_size = 100;
        let artifact = exporter.export(&request, now).await.unwrap();

        assert_eq!(artifact.record_count, 250);
        assert_eq!(artifact.file_name, "operation_logs_20240502_000000.zip");
        assert!(artifact.download_url.starts_with("/download/"));
        assert_eq!(artifact.volumes.len(), 1);

        let rows = read_rows(&outputs, &artifact.file_name, "operation_logs_20240502_000000.json");
        assert_eq!(rows.len(), 250);
    }

    #[tokio::test]
    async fn test_split_export_writes_numbered_volumes() {
        let dir = TempDir::new().unwrap();
        let (exporter, outputs, now) = exporter_with_rows(&dir, 250).await;

        let mut request = ExportRequest::new(ExportKind::OperationLogs, DateWindow::all_time(now));
        request.split_bytes = Some(8 * 1024);
        let artifact = exporter.export(&request, now).await.unwrap();

        assert!(artifact.volumes.len() > 1);
        assert_eq!(artifact.record_count, 250);
        assert_eq!(artifact.file_name, "operation_logs_20240502_000000_vol1.zip");
        assert_eq!(artifact.download_url, artifact.volumes[0].download_url);

        let mut total = 0;
        for (i, volume) in artifact.volumes.iter().enumerate() {
            let stem = format!("operation_logs_20240502_000000_vol{}", i + 1);
            assert_eq!(volume.file_name, format!("{}.zip", stem));
            let rows = read_rows(&outputs, &volume.file_name, &format!("{}.json", stem));
            assert_eq!(rows.len(), volume.record_count);
            assert!(volume.record_count > 0);
            total += rows.len();
        }
        assert_eq!(total, 250);
    }

    #[test]
    fn test_split_rows_packs_greedily() {
        let rows: Vec<Value> = (0..5).map(|i| serde_json::json!({"n": i})).collect();
        // Each row serializes to 7 bytes plus a separator
        let volumes = split_rows(rows.clone(), 16).unwrap();
        assert_eq!(volumes.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2, 1]);

        // Oversized rows still get a volume each
        let volumes = split_rows(rows, 1).unwrap();
        assert_eq!(volumes.len(), 5);

        let volumes = split_rows(Vec::new(), 16).unwrap();
        assert_eq!(volumes, vec![Vec::<Value>::new()]);
    }

    #[test]
    fn test_request_bounds() {
        let window = DateWindow::all_time(Utc::now());
        let mut request = ExportRequest::new(ExportKind::Statistics, window);
        assert!(request.validate().is_ok());

        request.page_size = 50;
        assert!(request.validate().is_err());

        request.page_size = 1000;
        request.compression_level = 0;
        assert!(request.validate().is_err());

        request.compression_level = 6;
        request.split_bytes = Some(0);
        assert!(request.validate().is_err());
    }
}
