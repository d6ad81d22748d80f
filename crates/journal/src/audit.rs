use crate::error::{ErrorKind, Result};
use derive_more::Display;
use exn::ResultExt;
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tsm_storage::ContentDigest;

/// Kind of attempt an [`AuditRecord`] describes.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum AuditAction {
    #[display("validate")]
    Validate,
    #[display("process")]
    Process,
    #[display("error")]
    Error,
}

/// One row of the audit log. The timestamp and pipeline version are filled
/// in by [`AuditLog::append`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub source: PathBuf,
    pub package_id: String,
    pub result: String,
    pub digest: Option<ContentDigest>,
    pub primary_target: Option<PathBuf>,
    pub mirror_target: Option<PathBuf>,
    pub notes: String,
}

impl AuditRecord {
    pub fn new(action: AuditAction, source: impl Into<PathBuf>, package_id: impl Into<String>) -> Self {
        Self {
            action,
            source: source.into(),
            package_id: package_id.into(),
            result: String::new(),
            digest: None,
            primary_target: None,
            mirror_target: None,
            notes: String::new(),
        }
    }

    pub fn with_result(mut self, result: impl ToString) -> Self {
        self.result = result.to_string();
        self
    }

    pub fn with_digest(mut self, digest: Option<ContentDigest>) -> Self {
        self.digest = digest;
        self
    }

    pub fn with_targets(mut self, primary: impl Into<PathBuf>, mirror: impl Into<PathBuf>) -> Self {
        self.primary_target = Some(primary.into());
        self.mirror_target = Some(mirror.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }
}

// Field order is the column order.
#[derive(Serialize)]
struct Row<'a> {
    timestamp: String,
    version: &'a str,
    action: String,
    src_zip: String,
    appid: &'a str,
    result: &'a str,
    zip_md5: &'a str,
    clean_target: String,
    drive_target: String,
    notes: &'a str,
}

fn display_path(path: Option<&PathBuf>) -> String {
    path.map(|p| p.display().to_string()).unwrap_or_default()
}

/// Append-only CSV record of every attempt.
#[derive(Debug)]
pub struct AuditLog {
    path: PathBuf,
    version: String,
    guard: Mutex<()>,
}

impl AuditLog {
    /// Nothing is touched on disk until the first [`append`](Self::append).
    pub fn open(path: impl Into<PathBuf>, version: impl Into<String>) -> Self {
        Self { path: path.into(), version: version.into(), guard: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one row, preceded by the header row if the file is new or empty.
    pub fn append(&self, record: &AuditRecord) -> Result<()> {
        let _guard = self.guard.lock().unwrap_or_else(PoisonError::into_inner);
        self.write(record).or_raise(|| ErrorKind::Audit(self.path.clone()))?;
        tracing::trace!(action = %record.action, package = %record.package_id, result = %record.result, "Audit row written");
        Ok(())
    }

    fn write(&self, record: &AuditRecord) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let fresh = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(fresh).from_writer(file);
        let timestamp = OffsetDateTime::now_utc()
            .replace_nanosecond(0)
            .map_err(io::Error::other)?
            .format(&Rfc3339)
            .map_err(io::Error::other)?;
        writer.serialize(Row {
            timestamp,
            version: &self.version,
            action: record.action.to_string(),
            src_zip: record.source.display().to_string(),
            appid: &record.package_id,
            result: &record.result,
            zip_md5: record.digest.as_ref().map(ContentDigest::as_str).unwrap_or_default(),
            clean_target: display_path(record.primary_target.as_ref()),
            drive_target: display_path(record.mirror_target.as_ref()),
            notes: &record.notes,
        })?;
        let mut file = writer.into_inner().map_err(|e| e.into_error())?;
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;

    const HEADER: &str = "timestamp,version,action,src_zip,appid,result,zip_md5,clean_target,drive_target,notes";

    fn rows(path: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::ReaderBuilder::new().has_headers(false).from_path(path).unwrap();
        reader.records().map(|r| r.unwrap()).collect()
    }

    #[rstest]
    #[case(AuditAction::Validate, "validate")]
    #[case(AuditAction::Process, "process")]
    #[case(AuditAction::Error, "error")]
    fn action_column_values(#[case] action: AuditAction, #[case] expected: &str) {
        assert_eq!(action.to_string(), expected);
    }

    #[test]
    fn header_is_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("tsmanager_log.csv");
        let log = AuditLog::open(&path, "1.2.3");
        let record = AuditRecord::new(AuditAction::Validate, "/in/a.zip", "a").with_result("skip_invalid");
        log.append(&record).unwrap();
        log.append(&record).unwrap();

        let rows = rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].iter().collect::<Vec<_>>().join(","), HEADER);
        assert_eq!(&rows[1][1], "1.2.3");
        assert_eq!(&rows[1][2], "validate");
        assert_eq!(&rows[1][5], "skip_invalid");
        assert!(rows[1].iter().skip(1).eq(rows[2].iter().skip(1)));
    }

    #[test]
    fn existing_log_gets_no_second_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsmanager_log.csv");
        AuditLog::open(&path, "1").append(&AuditRecord::new(AuditAction::Error, "x.zip", "x")).unwrap();
        AuditLog::open(&path, "1").append(&AuditRecord::new(AuditAction::Error, "y.zip", "y")).unwrap();
        let rows = rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[2][4], "y");
    }

    #[test]
    fn all_columns_are_populated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsmanager_log.csv");
        let digest = ContentDigest::of(b"pkg");
        let record = AuditRecord::new(AuditAction::Process, "/in/game123.zip", "game123")
            .with_result("copied")
            .with_digest(Some(digest.clone()))
            .with_targets("/clean/game123.zip", "/drive/game123.zip")
            .with_notes("note, with comma");
        AuditLog::open(&path, "2.0").append(&record).unwrap();

        let row = &rows(&path)[1];
        let timestamp = time::OffsetDateTime::parse(&row[0], &Rfc3339).unwrap();
        assert_eq!(timestamp.nanosecond(), 0);
        assert_eq!(&row[2], "process");
        assert_eq!(&row[3], "/in/game123.zip");
        assert_eq!(&row[4], "game123");
        assert_eq!(&row[5], "copied");
        assert_eq!(&row[6], digest.as_str());
        assert_eq!(&row[7], "/clean/game123.zip");
        assert_eq!(&row[8], "/drive/game123.zip");
        assert_eq!(&row[9], "note, with comma");
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path(), "1");
        let err = log.append(&AuditRecord::new(AuditAction::Error, "x.zip", "x")).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Audit(_)));
    }

    #[test]
    fn concurrent_appends_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tsmanager_log.csv");
        let log = Arc::new(AuditLog::open(&path, "1"));
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let log = Arc::clone(&log);
                std::thread::spawn(move || {
                    let record = AuditRecord::new(AuditAction::Process, format!("{i}.zip"), i.to_string())
                        .with_notes("x".repeat(4096));
                    log.append(&record).unwrap();
                })
            })
            .collect();
        handles.into_iter().for_each(|h| h.join().unwrap());

        let rows = rows(&path);
        assert_eq!(rows.len(), 17);
        assert!(rows[1..].iter().all(|r| r.len() == 10 && r[9].len() == 4096));
    }
}
