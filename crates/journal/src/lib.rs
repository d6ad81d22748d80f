//! Durable records of what has been processed.
//!
//! Two append-only files make up the journal:
//! - The **ledger** ([`Ledger`]): one content digest per line, for every
//!   package that was processed. It is the only deduplication state that
//!   survives a restart.
//! - The **audit log** ([`AuditLog`]): a CSV file with one row per
//!   validation rejection, processing run or failure.
//!
//! Both are safe to share between threads. Neither is ever rewritten.

mod audit;
pub mod error;
mod ledger;

pub use crate::audit::{AuditAction, AuditLog, AuditRecord};
pub use crate::ledger::Ledger;

/// File name of the ledger inside the state directory.
pub const LEDGER_FILE_NAME: &str = "processed_md5.txt";
/// Path of the audit log relative to the state directory.
pub const AUDIT_FILE_NAME: &str = "logs/tsmanager_log.csv";
