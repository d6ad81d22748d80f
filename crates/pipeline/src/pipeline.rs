use crate::Outcome;
use crate::error::{ErrorKind, Result};
use crate::locks::KeyedLocks;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::instrument;
use tsm_journal::{AUDIT_FILE_NAME, AuditAction, AuditLog, AuditRecord, LEDGER_FILE_NAME, Ledger};
use tsm_package::{
    ARCHIVE_EXTENSION, CleanReport, CleanedArtifact, PackageRules, clean, is_manifest_package, package_id,
};
use tsm_storage::{ContentDigest, SyncStatus, hash_file, sync_file};

const INVALID_NOTE: &str = "no script/manifest entries";

/// The two directories every cleaned package is delivered to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Destinations {
    pub primary: PathBuf,
    pub mirror: PathBuf,
}

impl Destinations {
    pub fn new(primary: impl Into<PathBuf>, mirror: impl Into<PathBuf>) -> Self {
        Self { primary: primary.into(), mirror: mirror.into() }
    }

    /// Where a package lands in each destination. Packages are keyed by
    /// identifier only, so two archives sharing a file name share targets.
    pub fn targets(&self, package_id: &str) -> (PathBuf, PathBuf) {
        let file_name = format!("{package_id}.{ARCHIVE_EXTENSION}");
        (self.primary.join(&file_name), self.mirror.join(file_name))
    }
}

#[derive(Debug)]
struct Inner {
    destinations: Destinations,
    rules: PackageRules,
    ledger: Ledger,
    audit: AuditLog,
    locks: KeyedLocks,
}

/// Validates, cleans and delivers single archives, keeping the ledger and
/// audit log up to date.
///
/// Cheap to clone; clones share the ledger, the audit log and the
/// per-package destination locks, so a batch run and a watcher may process
/// through the same pipeline at once.
///
/// All processing methods do blocking I/O. From async code, call them inside
/// [`spawn_blocking`](tokio::task::spawn_blocking).
#[derive(Clone, Debug)]
pub struct Pipeline {
    inner: Arc<Inner>,
}

impl Pipeline {
    pub fn new(destinations: Destinations, rules: PackageRules, ledger: Ledger, audit: AuditLog) -> Self {
        Self { inner: Arc::new(Inner { destinations, rules, ledger, audit, locks: KeyedLocks::default() }) }
    }

    /// Open the ledger and audit log kept in `state_dir`, tagging audit rows
    /// with `version`.
    pub fn open(
        destinations: Destinations,
        rules: PackageRules,
        state_dir: &Path,
        version: impl Into<String>,
    ) -> Result<Self> {
        let ledger = Ledger::open(state_dir.join(LEDGER_FILE_NAME)).or_raise(|| ErrorKind::Journal)?;
        let audit = AuditLog::open(state_dir.join(AUDIT_FILE_NAME), version);
        Ok(Self::new(destinations, rules, ledger, audit))
    }

    pub fn destinations(&self) -> &Destinations {
        &self.inner.destinations
    }

    pub fn rules(&self) -> &PackageRules {
        &self.inner.rules
    }

    pub fn ledger(&self) -> &Ledger {
        &self.inner.ledger
    }

    pub fn audit(&self) -> &AuditLog {
        &self.inner.audit
    }

    pub fn validate(&self, source: &Path) -> bool {
        is_manifest_package(source, &self.inner.rules)
    }

    /// Digest of the input, or `None` when it can't be read. Digests are
    /// advisory: an unreadable input is still validated and cleaned.
    pub fn digest(&self, source: &Path) -> Option<ContentDigest> {
        match hash_file(source) {
            Ok(digest) => Some(digest),
            Err(e) => {
                tracing::debug!(path = %source.display(), error = ?e, "Input digest unavailable");
                None
            },
        }
    }

    /// Run one archive through every step: validate, digest, clean, deliver
    /// to both destinations, record. Never fails; problems become the
    /// returned [`Outcome`] and an audit row.
    #[instrument(level = "debug", skip_all, fields(source = %source.display()))]
    pub fn process(&self, source: &Path) -> Outcome {
        if !self.validate(source) {
            let digest = self.digest(source);
            self.reject(source, digest);
            return Outcome::SkipInvalid;
        }
        let digest = self.digest(source);
        self.process_valid(source, digest)
    }

    /// Record that `source` is not a manifest package.
    pub fn reject(&self, source: &Path, digest: Option<ContentDigest>) {
        tracing::info!(path = %source.display(), "Skipping: not a manifest package");
        let record = AuditRecord::new(AuditAction::Validate, source, package_id(source))
            .with_result(Outcome::SkipInvalid.audit_result())
            .with_digest(digest)
            .with_notes(INVALID_NOTE);
        self.record(&record);
    }

    /// Clean, deliver and record an archive the caller has already
    /// validated. `digest` is the input digest, if known; it is what the
    /// ledger remembers.
    pub fn process_valid(&self, source: &Path, digest: Option<ContentDigest>) -> Outcome {
        let package = package_id(source);
        let artifact = match clean(source, &self.inner.rules) {
            Ok(artifact) => artifact,
            Err(e) => {
                let reason = (*e).to_string();
                tracing::error!(path = %source.display(), package = %package, error = ?e, "Cleaning failed");
                let outcome = Outcome::Error(reason.clone());
                let record = AuditRecord::new(AuditAction::Error, source, &package)
                    .with_result(outcome.audit_result())
                    .with_digest(digest)
                    .with_notes(reason);
                self.record(&record);
                return outcome;
            },
        };
        self.deliver(source, digest, artifact)
    }

    /// Copy a cleaned artifact to both destinations, record the attempt and
    /// remove the artifact's workspace.
    fn deliver(&self, source: &Path, digest: Option<ContentDigest>, artifact: CleanedArtifact) -> Outcome {
        let package = artifact.package_id().to_string();
        let mut notes = report_notes(artifact.report());
        let (primary, mirror) = self.inner.destinations.targets(&package);

        let outcome = self.inner.locks.with(&package, || {
            match sync_file(artifact.path(), &primary) {
                Ok(status) => tracing::debug!(target_path = %primary.display(), ?status, "Primary copy synced"),
                Err(e) => {
                    tracing::warn!(target_path = %primary.display(), error = ?e, "Primary copy failed");
                    notes.push(format!("primary copy failed: {}", *e));
                },
            }
            // The mirror is fed from the primary copy, whatever state the
            // previous step left it in.
            match sync_file(&primary, &mirror) {
                Ok(SyncStatus::Copied) => Outcome::Copied,
                Ok(SyncStatus::Identical) => Outcome::ExistsIdentical,
                Err(e) => {
                    tracing::warn!(target_path = %mirror.display(), error = ?e, "Mirror copy failed");
                    Outcome::CopyFailed((*e).to_string())
                },
            }
        });

        let record = AuditRecord::new(AuditAction::Process, source, &package)
            .with_result(outcome.audit_result())
            .with_digest(digest.clone())
            .with_targets(&primary, &mirror)
            .with_notes(notes.join("; "));
        self.record(&record);
        if let Some(digest) = &digest {
            if let Err(e) = self.inner.ledger.insert(digest) {
                tracing::warn!(%digest, error = ?e, "Could not record digest in ledger");
            }
        }
        if let Err(e) = artifact.close() {
            tracing::warn!(package = %package, error = ?e, "Could not remove cleaning workspace");
        }

        if outcome.is_success() {
            tracing::info!(path = %source.display(), package = %package, %outcome, "Package delivered");
        } else {
            tracing::warn!(path = %source.display(), package = %package, %outcome, "Package not delivered");
        }
        outcome
    }

    fn record(&self, record: &AuditRecord) {
        if let Err(e) = self.inner.audit.append(record) {
            tracing::warn!(package = %record.package_id, error = ?e, "Could not write audit row");
        }
    }
}

fn report_notes(report: &CleanReport) -> Vec<String> {
    report
        .failures()
        .map(|(path, reason)| {
            tracing::warn!(path = %path.display(), %reason, "File kept uncleaned");
            format!("uncleaned {}: {reason}", path.display())
        })
        .collect()
}
