//! Matching and verification engine.
//!
//! For every card file the resolver looks up disk candidates by (name,
//! size), classifies the cheap cases immediately (no candidate at all, or a
//! card file more than an hour newer than its candidate) and hands the rest
//! to a fixed pool of worker threads for bounded-prefix content comparison.
//! Digests are cached in the index records under a single tree mutex; the
//! report sink has its own mutex; neither lock is held across a file read
//! and the two are never held together.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
        mpsc,
    },
    thread,
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::{
    config::VerifyConfig,
    copy,
    digest::{DigestError, prefix_digest},
    index::{CardIndex, DiskIndex, FileKey},
    report::{Reason, ReportSink, Unmatched},
};

/// A card file counts as unbacked when it is this much newer than its disk
/// candidate. The slack absorbs summer/winter time and clock skew between
/// card and disk.
pub const STALE_TOLERANCE: Duration = Duration::from_secs(60 * 60);

/// Bound on queued-but-unclaimed comparison jobs; the dispatch loop blocks
/// once the queue is full.
const JOB_QUEUE_CAPACITY: usize = 32;

/// One content comparison: a card key against one of its disk candidates.
#[derive(Debug, Clone)]
struct Job {
    key: FileKey,
    candidate: usize,
}

/// Both indices behind the single tree lock workers use for digest caching.
#[derive(Debug)]
struct TreeState {
    card: CardIndex,
    disk: DiskIndex,
}

/// First hashing failure wins; workers drain remaining jobs without work.
#[derive(Debug, Default)]
struct FailureLatch {
    tripped: AtomicBool,
    error: Mutex<Option<DigestError>>,
}

impl FailureLatch {
    fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::Relaxed)
    }

    fn trip(&self, err: DigestError) {
        let mut slot = lock(&self.error);
        if slot.is_none() {
            *slot = Some(err);
        }
        self.tripped.store(true, Ordering::Relaxed);
    }

    fn take(&self) -> Option<DigestError> {
        lock(&self.error).take()
    }
}

/// Check every card file against the disk index and return the unmatched
/// entries, sorted by basename.
///
/// The first digest failure aborts the run: a report with an unfinished
/// comparison is not trustworthy.
pub fn verify(
    card: CardIndex,
    disk: DiskIndex,
    config: &VerifyConfig,
) -> Result<Vec<Unmatched>, DigestError> {
    info!("Comparing card and disk");
    let sink = Arc::new(ReportSink::default());
    let copy_dir = config.copy_dir.clone();
    let mut jobs = Vec::new();

    for (key, card_record) in card.iter() {
        match disk.candidates(key) {
            None => {
                info!("No backup (name): {}", card_record.path.display());
                sink.push(Unmatched::new(card_record.path.clone(), Reason::NoNameMatch));
                copy_unmatched(copy_dir.as_deref(), &card_record.path);
            }
            Some(candidates) => {
                for (idx, candidate) in candidates.iter().enumerate() {
                    if is_stale(card_record.modified, candidate.modified) {
                        info!(
                            "No backup (date): {} is newer than {}",
                            card_record.path.display(),
                            candidate.path.display()
                        );
                        sink.push(Unmatched::new(
                            card_record.path.clone(),
                            Reason::StaleOnCard,
                        ));
                        copy_unmatched(copy_dir.as_deref(), &card_record.path);
                    } else {
                        jobs.push(Job {
                            key: key.clone(),
                            candidate: idx,
                        });
                    }
                }
            }
        }
    }

    let trees = Arc::new(Mutex::new(TreeState { card, disk }));
    let failure = Arc::new(FailureLatch::default());
    let (job_tx, job_rx) = mpsc::sync_channel::<Job>(JOB_QUEUE_CAPACITY);
    let job_rx = Arc::new(Mutex::new(job_rx));
    let (done_tx, done_rx) = mpsc::channel::<()>();

    let worker_count = config.workers.max(1);
    let mut handles = Vec::with_capacity(worker_count);
    for worker in 0..worker_count {
        let job_rx = Arc::clone(&job_rx);
        let trees = Arc::clone(&trees);
        let sink = Arc::clone(&sink);
        let failure = Arc::clone(&failure);
        let copy_dir = copy_dir.clone();
        let done_tx = done_tx.clone();
        handles.push(thread::spawn(move || {
            run_worker(worker, job_rx, trees, sink, failure, copy_dir, done_tx);
        }));
    }
    drop(done_tx);

    for job in jobs {
        if failure.is_tripped() {
            break;
        }
        if job_tx.send(job).is_err() {
            break;
        }
    }
    drop(job_tx);

    // one done-signal per worker, then join
    for _ in 0..worker_count {
        let _ = done_rx.recv();
    }
    for handle in handles {
        let _ = handle.join();
    }

    if let Some(err) = failure.take() {
        return Err(err);
    }
    Ok(sink.drain_sorted())
}

/// Whether a card file is newer than its disk candidate by more than the
/// tolerance. A newer disk copy is never stale.
pub(crate) fn is_stale(card_modified: SystemTime, disk_modified: SystemTime) -> bool {
    match card_modified.duration_since(disk_modified) {
        Ok(delta) => delta > STALE_TOLERANCE,
        Err(_) => false,
    }
}

fn run_worker(
    worker: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Job>>>,
    trees: Arc<Mutex<TreeState>>,
    sink: Arc<ReportSink>,
    failure: Arc<FailureLatch>,
    copy_dir: Option<PathBuf>,
    done: mpsc::Sender<()>,
) {
    loop {
        let received = {
            let guard = lock(&jobs);
            guard.recv()
        };
        let Ok(job) = received else { break };
        if failure.is_tripped() {
            // drain the queue without touching the filesystem
            continue;
        }
        debug!(
            worker,
            name = %job.key.name,
            candidate = job.candidate,
            "Comparing content"
        );
        if let Err(err) = process_job(&job, &trees, &sink, copy_dir.as_deref()) {
            failure.trip(err);
        }
    }
    debug!(worker, "Worker exiting");
    let _ = done.send(());
}

fn process_job(
    job: &Job,
    trees: &Mutex<TreeState>,
    sink: &ReportSink,
    copy_dir: Option<&Path>,
) -> Result<(), DigestError> {
    let (card_path, disk_path, cached_disk) = {
        let guard = lock(trees);
        let Some(card_record) = guard.card.record(&job.key) else {
            return Ok(());
        };
        let Some(disk_record) = guard.disk.record(&job.key, job.candidate) else {
            return Ok(());
        };
        (
            card_record.path.clone(),
            disk_record.path.clone(),
            disk_record.digest,
        )
    };

    let disk_digest = match cached_disk {
        Some(digest) => {
            debug!(path = %disk_path.display(), "Reusing cached digest");
            digest
        }
        None => {
            let digest = prefix_digest(&disk_path)?;
            let mut guard = lock(trees);
            match guard.disk.record_mut(&job.key, job.candidate) {
                // first writer wins; later computations reuse the stored value
                Some(record) => *record.digest.get_or_insert(digest),
                None => digest,
            }
        }
    };

    let cached_card = {
        let guard = lock(trees);
        guard.card.record(&job.key).and_then(|record| record.digest)
    };
    let card_digest = match cached_card {
        Some(digest) => {
            debug!(path = %card_path.display(), "Reusing cached digest");
            digest
        }
        None => {
            let digest = prefix_digest(&card_path)?;
            let mut guard = lock(trees);
            match guard.card.record_mut(&job.key) {
                Some(record) => *record.digest.get_or_insert(digest),
                None => digest,
            }
        }
    };

    if card_digest != disk_digest {
        info!(
            "No backup (content): {} differs from {}",
            card_path.display(),
            disk_path.display()
        );
        sink.push(Unmatched::new(card_path.clone(), Reason::ContentMismatch));
        copy_unmatched(copy_dir, &card_path);
    } else {
        debug!(
            "Same content: {} and {}",
            card_path.display(),
            disk_path.display()
        );
    }
    Ok(())
}

fn copy_unmatched(copy_dir: Option<&Path>, src: &Path) {
    let Some(dir) = copy_dir else { return };
    info!("Copying {} to {}", src.display(), dir.display());
    match copy::copy_into(src, dir) {
        Ok(dest) => debug!("Copied to {}", dest.display()),
        Err(err) => warn!("Copy failed: {err}"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|err| err.into_inner())
}
