//! Getting manifest packages from an inbox into their destinations.
//!
//! A [`Pipeline`] takes one archive at a time through validation, cleaning
//! and delivery into two destination directories (primary, then mirror fed
//! from the primary copy), recording every attempt in the audit log and every
//! processed input digest in the ledger. Whatever goes wrong with an archive
//! ends up as an [`Outcome`], never as an error.
//!
//! Two drivers sit on top:
//! - [`batch`] works through a finite list of paths.
//! - [`watch`] polls a directory until told to stop, skipping anything it has
//!   seen this session or that the ledger already knows about.
//!
//! Both are streams of progress events and run the blocking pipeline work on
//! tokio's blocking thread pool, one archive at a time.

mod batch;
pub mod error;
mod locks;
mod outcome;
mod pipeline;
mod watch;

pub use crate::batch::{BatchEvent, BatchInput, SkipReason, batch, normalize_inputs};
pub use crate::outcome::Outcome;
pub use crate::pipeline::{Destinations, Pipeline};
pub use crate::watch::{WatchEvent, watch};

use std::time::Duration;

/// Default pause between two directory scans.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
