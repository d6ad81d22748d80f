use crate::{Outcome, Pipeline};
use async_stream::stream;
use derive_more::Display;
use futures::Stream;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tsm_package::ARCHIVE_EXTENSION;

/// Why a batch entry was not processed.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum SkipReason {
    #[display("not a .zip file")]
    NotAnArchive,
    #[display("file not found")]
    NotFound,
}

/// One batch entry after normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchInput {
    /// An existing archive, by absolute path.
    Archive(PathBuf),
    /// Rejected before reaching the pipeline. Not audited.
    Skipped { input: String, reason: SkipReason },
}

/// Progress events emitted by [`batch`].
///
/// `Started` and `Discovered` come first, then one `Skipped` or `Processed`
/// per normalized entry in input order, then `Complete`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchEvent {
    Started,
    /// Number of entries left after normalization.
    Discovered(u64),
    Skipped { input: String, reason: SkipReason, done: u64, total: u64 },
    Processed { path: PathBuf, outcome: Outcome, done: u64, total: u64 },
    Complete,
}

/// Tidy a list of user-supplied paths.
///
/// Each entry is trimmed of whitespace, then of surrounding braces and quotes
/// (as left behind by drag-and-drop shells). Entries that don't name a `.zip`
/// file, or name one that doesn't exist, become [`BatchInput::Skipped`].
/// Repeated archives are dropped, comparing absolute paths; the first
/// occurrence keeps its place.
pub fn normalize_inputs<I, S>(inputs: I) -> Vec<BatchInput>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let suffix = format!(".{ARCHIVE_EXTENSION}");
    let mut seen = HashSet::new();
    let mut normalized = Vec::new();
    for raw in inputs {
        let input = raw.as_ref().trim().trim_matches(['{', '}']).trim_matches('"');
        if !input.to_lowercase().ends_with(&suffix) {
            normalized.push(BatchInput::Skipped { input: input.to_string(), reason: SkipReason::NotAnArchive });
            continue;
        }
        let path = Path::new(input);
        if !path.is_file() {
            normalized.push(BatchInput::Skipped { input: input.to_string(), reason: SkipReason::NotFound });
            continue;
        }
        let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        if seen.insert(absolute.clone()) {
            normalized.push(BatchInput::Archive(absolute));
        }
    }
    normalized
}

/// Process a finite list of archives one after another, streaming
/// [`BatchEvent`]s.
///
/// Each archive runs on the blocking thread pool; the next one only starts
/// once the previous has finished. A per-archive failure is just another
/// outcome and never ends the stream early.
pub fn batch<I, S>(pipeline: Pipeline, inputs: I) -> impl Stream<Item = BatchEvent>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let inputs = normalize_inputs(inputs);
    stream!({
        yield BatchEvent::Started;
        let total = u64::try_from(inputs.len()).unwrap_or(u64::MAX);
        yield BatchEvent::Discovered(total);

        let mut done = 0;
        for input in inputs {
            done += 1;
            match input {
                BatchInput::Skipped { input, reason } => {
                    tracing::info!(%input, %reason, "Skipping batch entry");
                    yield BatchEvent::Skipped { input, reason, done, total };
                },
                BatchInput::Archive(path) => {
                    let worker = pipeline.clone();
                    let source = path.clone();
                    let outcome = tokio::task::spawn_blocking(move || worker.process(&source))
                        .await
                        .unwrap_or_else(|e| Outcome::Error(e.to_string()));
                    yield BatchEvent::Processed { path, outcome, done, total };
                },
            }
        }

        yield BatchEvent::Complete;
    })
}
