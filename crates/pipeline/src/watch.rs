use crate::{Outcome, Pipeline};
use async_stream::stream;
use futures::Stream;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::watch::Receiver;
use tokio::time::Instant;
use tsm_package::ARCHIVE_EXTENSION;
use tsm_storage::{ContentDigest, Fingerprint, list_files};

/// Events emitted by [`watch`].
///
/// `Started` comes first and `Stopped` last; in between, one event per
/// candidate looked at, plus `ScanFailed` whenever listing the directory
/// fails.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatchEvent {
    Started { dir: PathBuf },
    /// Same content as an archive processed before (this session or any
    /// earlier one).
    AlreadyProcessed { path: PathBuf, digest: ContentDigest },
    Invalid { path: PathBuf },
    Processed { path: PathBuf, outcome: Outcome },
    ScanFailed { reason: String },
    Stopped,
}

/// What this watcher run has already looked at. Never persisted.
#[derive(Debug, Default)]
struct Session {
    seen: HashSet<Fingerprint>,
    digests: HashSet<ContentDigest>,
}

impl Session {
    fn knows(&self, pipeline: &Pipeline, digest: &ContentDigest) -> bool {
        self.digests.contains(digest) || pipeline.ledger().contains(digest)
    }
}

enum Verdict {
    Invalid,
    Processed(Outcome),
}

fn stop_requested(shutdown: &Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

/// Sleep for `interval`, waking early when a stop is requested. Returns
/// whether the watcher should stop.
async fn pause(shutdown: &mut Receiver<bool>, interval: Duration) -> bool {
    let deadline = Instant::now() + interval;
    loop {
        if stop_requested(shutdown) {
            return true;
        }
        tokio::select! {
            () = tokio::time::sleep_until(deadline) => return stop_requested(shutdown),
            changed = shutdown.changed() => {
                if changed.is_err() {
                    return true;
                }
            },
        }
    }
}

/// Poll `dir` every `interval` for new archives and feed them to the
/// pipeline until `shutdown` reads `true` (or its sender is dropped).
///
/// Each cycle lists the `.zip` files directly inside `dir`. A file whose
/// path, size and modification time were already seen this session is
/// ignored without being read. Otherwise it is digested: content already in
/// the ledger (or processed earlier this session) is skipped, anything else
/// is validated and, if valid, processed. Every candidate gets exactly one
/// attempt per session; it is only looked at again once it changes on disk.
///
/// A failed listing is reported and retried after one interval; the watcher
/// never ends on its own. Stop requests are honoured between candidates and
/// during the pause, but never interrupt an archive mid-processing.
pub fn watch(
    pipeline: Pipeline,
    dir: PathBuf,
    interval: Duration,
    mut shutdown: Receiver<bool>,
) -> impl Stream<Item = WatchEvent> {
    stream!({
        tracing::info!(dir = %dir.display(), interval_secs = interval.as_secs_f64(), "Watching for packages");
        yield WatchEvent::Started { dir: dir.clone() };
        let mut session = Session::default();

        'watch: loop {
            if stop_requested(&shutdown) {
                break;
            }
            match list_files(&dir, ARCHIVE_EXTENSION).await {
                Err(e) => {
                    let reason = (*e).to_string();
                    tracing::warn!(dir = %dir.display(), error = ?e, "Scan failed, retrying after the poll interval");
                    yield WatchEvent::ScanFailed { reason };
                },
                Ok(files) => {
                    for file in files {
                        if stop_requested(&shutdown) {
                            break 'watch;
                        }
                        let fingerprint = file.fingerprint();
                        if session.seen.contains(&fingerprint) {
                            continue;
                        }
                        let path = file.path;

                        let hasher = pipeline.clone();
                        let source = path.clone();
                        let digest = tokio::task::spawn_blocking(move || hasher.digest(&source)).await.ok().flatten();
                        if let Some(digest) = digest.clone().filter(|d| session.knows(&pipeline, d)) {
                            tracing::info!(path = %path.display(), %digest, "Already processed, skipping");
                            session.seen.insert(fingerprint);
                            yield WatchEvent::AlreadyProcessed { path, digest };
                            continue;
                        }

                        let worker = pipeline.clone();
                        let source = path.clone();
                        let known = digest.clone();
                        let verdict = tokio::task::spawn_blocking(move || {
                            if !worker.validate(&source) {
                                worker.reject(&source, known);
                                return Verdict::Invalid;
                            }
                            tracing::info!(path = %source.display(), "Processing new package");
                            Verdict::Processed(worker.process_valid(&source, known))
                        })
                        .await
                        .unwrap_or_else(|e| Verdict::Processed(Outcome::Error(e.to_string())));

                        session.seen.insert(fingerprint);
                        match verdict {
                            Verdict::Invalid => {
                                yield WatchEvent::Invalid { path };
                            },
                            Verdict::Processed(outcome) => {
                                if let Some(digest) = digest {
                                    session.digests.insert(digest);
                                }
                                yield WatchEvent::Processed { path, outcome };
                            },
                        }
                    }
                },
            }
            if pause(&mut shutdown, interval).await {
                break;
            }
        }

        tracing::info!(dir = %dir.display(), "Watcher stopped");
        yield WatchEvent::Stopped;
    })
}
