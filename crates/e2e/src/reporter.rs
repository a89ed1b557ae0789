//! Run-scoped outcome collection and report generation
//!
//! The reporter is created once per run, shared by reference with every
//! scenario executor, and consumed by [`OutcomeReporter::flush`] after the
//! last executor has finished.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::E2eResult;
use crate::tabular::Table;

/// One recorded event: caller payload plus `timestamp` and `testId`
pub type OutcomeRecord = Map<String, Value>;

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total_tests: usize,
    pub generated_at: String,
}

/// Record report as written to `test-report-<ms>.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub summary: ReportSummary,
    pub test: Vec<OutcomeRecord>,
}

#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub json: PathBuf,
    /// Absent when nothing was recorded
    pub csv: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FlushedReport {
    pub report: Report,
    pub files: ReportFiles,
}

/// Append-only collector of outcome records
#[derive(Debug)]
pub struct OutcomeReporter {
    output_dir: PathBuf,
    records: Mutex<Vec<OutcomeRecord>>,
}

impl OutcomeReporter {
    /// Nothing is written until [`flush`](Self::flush).
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            records: Mutex::new(Vec::new()),
        }
    }

    /// Append an event.
    ///
    /// Never fails: a payload that cannot be serialized is logged and
    /// dropped, and a payload that is not a JSON object is stored under
    /// an `event` key.
    pub fn record<T: Serialize + ?Sized>(&self, event: &T) {
        let mut record = match serde_json::to_value(event) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert("event".to_string(), other);
                map
            }
            Err(e) => {
                warn!("Dropping outcome that could not be serialized: {}", e);
                return;
            }
        };

        let now = Utc::now();
        record.insert(
            "timestamp".to_string(),
            Value::String(now.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.insert(
            "testId".to_string(),
            Value::String(generate_test_id(now.timestamp_millis())),
        );

        self.records.lock().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Write the record report and, if anything was recorded, the tabular
    /// report. Consumes the reporter, so it can only happen once.
    pub fn flush(self) -> E2eResult<FlushedReport> {
        let records = self.records.into_inner();

        let report = Report {
            summary: ReportSummary {
                total_tests: records.len(),
                generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            },
            test: records,
        };

        std::fs::create_dir_all(&self.output_dir)?;

        let table = Table::from_records(&report.test);
        let stem = format!("test-report-{}", Utc::now().timestamp_millis());
        let reserved = reserve_report_files(&self.output_dir, &stem, table.is_some())?;

        let mut out = BufWriter::new(reserved.json);
        serde_json::to_writer_pretty(&mut out, &report)?;
        out.flush()?;

        if let (Some(table), Some(file)) = (&table, reserved.csv) {
            table.write_to(BufWriter::new(file))?;
        }

        let json_path = reserved.json_path;
        let csv_path = reserved.csv_path;

        info!(
            "Report written: {} record(s) to {}",
            report.summary.total_tests,
            json_path.display()
        );
        if let Some(path) = &csv_path {
            info!("Tabular report written to {}", path.display());
        }

        Ok(FlushedReport {
            report,
            files: ReportFiles {
                json: json_path,
                csv: csv_path,
            },
        })
    }
}

/// `test_<unix-ms>_<7 base-36 chars>`
fn generate_test_id(unix_ms: i64) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ID_SUFFIX_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect();
    format!("test_{}_{}", unix_ms, suffix)
}

/// Report files opened exclusively for this flush
struct ReservedFiles {
    json_path: PathBuf,
    json: File,
    csv_path: Option<PathBuf>,
    csv: Option<File>,
}

/// Claim `<stem>[-n].json` (and `<stem>[-n].csv` when `with_csv`) under
/// names no other process holds.
///
/// Both files are created exclusively. If either name is taken, anything
/// already created for that attempt is removed and the next numeric suffix
/// is tried.
fn reserve_report_files(dir: &Path, stem: &str, with_csv: bool) -> E2eResult<ReservedFiles> {
    let mut attempt = 0u32;

    loop {
        let name = if attempt == 0 {
            stem.to_string()
        } else {
            format!("{}-{}", stem, attempt)
        };
        attempt += 1;

        let json_path = dir.join(format!("{}.json", name));
        let csv_path = json_path.with_extension("csv");

        if !with_csv && csv_path.exists() {
            continue;
        }
        let json = match create_new(&json_path)? {
            Some(file) => file,
            None => continue,
        };

        if !with_csv {
            return Ok(ReservedFiles {
                json_path,
                json,
                csv_path: None,
                csv: None,
            });
        }

        match create_new(&csv_path) {
            Ok(Some(csv)) => {
                return Ok(ReservedFiles {
                    json_path,
                    json,
                    csv_path: Some(csv_path),
                    csv: Some(csv),
                })
            }
            Ok(None) => {
                drop(json);
                std::fs::remove_file(&json_path)?;
            }
            Err(e) => {
                drop(json);
                let _ = std::fs::remove_file(&json_path);
                return Err(e);
            }
        }
    }
}

/// `None` when the file already exists.
fn create_new(path: &Path) -> E2eResult<Option<File>> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_record_adds_timestamp_and_id_after_payload() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = OutcomeReporter::new(dir.path());
        reporter.record(&json!({ "user": "Jo", "status": "started" }));

        let flushed = reporter.flush().unwrap();
        let record = &flushed.report.test[0];
        let keys: Vec<&str> = record.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["user", "status", "timestamp", "testId"]);

        let id = record["testId"].as_str().unwrap();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "test");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), ID_SUFFIX_LEN);
    }

    #[test]
    fn test_non_object_payload_is_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = OutcomeReporter::new(dir.path());
        reporter.record("plain");
        let flushed = reporter.flush().unwrap();
        assert_eq!(flushed.report.test[0]["event"], json!("plain"));
    }

    #[test]
    fn test_total_matches_recorded_count() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = OutcomeReporter::new(dir.path().join("results"));
        for i in 0..5 {
            reporter.record(&json!({ "user": format!("u{}", i), "status": "started" }));
        }
        assert_eq!(reporter.len(), 5);

        let flushed = reporter.flush().unwrap();
        assert_eq!(flushed.report.summary.total_tests, 5);

        let written: Report =
            serde_json::from_str(&std::fs::read_to_string(&flushed.files.json).unwrap()).unwrap();
        assert_eq!(written.summary.total_tests, 5);
        assert_eq!(written.test.len(), 5);

        let csv = std::fs::read_to_string(flushed.files.csv.unwrap()).unwrap();
        assert_eq!(csv.lines().count(), 6);
        assert!(csv.starts_with("user,status,timestamp,testId\n"));
    }

    #[test]
    fn test_empty_flush_skips_tabular_report() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = OutcomeReporter::new(dir.path());
        assert!(reporter.is_empty());

        let flushed = reporter.flush().unwrap();
        assert!(flushed.files.csv.is_none());

        let json: Value =
            serde_json::from_str(&std::fs::read_to_string(&flushed.files.json).unwrap()).unwrap();
        assert_eq!(json["summary"]["totalTests"], json!(0));
        assert_eq!(json["test"], json!([]));

        let csv_files = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().map(|x| x == "csv").unwrap_or(false))
            .count();
        assert_eq!(csv_files, 0);
    }

    #[test]
    fn test_flushes_in_same_directory_do_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = HashSet::new();
        for _ in 0..3 {
            let reporter = OutcomeReporter::new(dir.path());
            reporter.record(&json!({ "status": "started" }));
            let flushed = reporter.flush().unwrap();
            assert!(paths.insert(flushed.files.json.clone()));
            assert!(paths.insert(flushed.files.csv.unwrap()));
        }
    }

    #[test]
    fn test_existing_tabular_report_is_never_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let foreign_csv = dir.path().join("test-report-42.csv");
        std::fs::write(&foreign_csv, "status\nkept\n").unwrap();
        std::fs::write(dir.path().join("test-report-42-1.json"), "{}").unwrap();

        let reserved = reserve_report_files(dir.path(), "test-report-42", true).unwrap();
        assert_eq!(reserved.json_path, dir.path().join("test-report-42-2.json"));
        assert_eq!(reserved.csv_path, Some(dir.path().join("test-report-42-2.csv")));
        assert!(!dir.path().join("test-report-42.json").exists());
        assert_eq!(std::fs::read_to_string(&foreign_csv).unwrap(), "status\nkept\n");
        assert_eq!(std::fs::read_to_string(dir.path().join("test-report-42-1.json")).unwrap(), "{}");
    }

    #[test]
    fn test_record_report_alone_skips_names_with_tabular_sibling() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test-report-7.csv"), "x").unwrap();

        let reserved = reserve_report_files(dir.path(), "test-report-7", false).unwrap();
        assert_eq!(reserved.json_path, dir.path().join("test-report-7-1.json"));
        assert!(reserved.csv.is_none());
        assert!(!dir.path().join("test-report-7-1.csv").exists());
    }

    #[test]
    fn test_concurrent_records_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let reporter = Arc::new(OutcomeReporter::new(dir.path()));

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reporter = Arc::clone(&reporter);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        reporter.record(&json!({ "thread": t, "i": i }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reporter = Arc::try_unwrap(reporter).unwrap();
        let flushed = reporter.flush().unwrap();
        assert_eq!(flushed.report.summary.total_tests, 400);

        let ids: HashSet<&str> = flushed
            .report
            .test
            .iter()
            .map(|r| r["testId"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 400);
    }
}
