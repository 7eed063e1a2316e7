use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use taskgate_domain::AuditRecord;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::AuditRepository;

const AUDIT_TARGET: &str = "taskgate::audit";

/// Recorder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditRecorderConfig {
    /// Pending records held in memory before the oldest one is dropped. The
    /// writer additionally holds the single record it is persisting.
    pub capacity: usize,
}

impl Default for AuditRecorderConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// Counters describing recorder throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditRecorderStats {
    /// Records handed to the recorder.
    pub enqueued: u64,
    /// Records discarded because the queue was full or closed.
    pub dropped: u64,
    /// Records the repository stored.
    pub written: u64,
    /// Records the repository rejected or whose write panicked.
    pub failed: u64,
}

/// Pending records and the closed flag share one lock so a record is either
/// queued before the final drain or counted as dropped.
struct RecorderQueue {
    records: VecDeque<AuditRecord>,
    closed: bool,
}

enum NextRecord {
    Write(AuditRecord),
    Wait,
    Stop,
}

struct RecorderShared {
    queue: Mutex<RecorderQueue>,
    capacity: usize,
    notify: Notify,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

impl RecorderShared {
    fn stats(&self) -> AuditRecorderStats {
        AuditRecorderStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, RecorderQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_record(&self) -> NextRecord {
        let mut queue = self.lock_queue();
        match queue.records.pop_front() {
            Some(record) => NextRecord::Write(record),
            None if queue.closed => NextRecord::Stop,
            None => NextRecord::Wait,
        }
    }
}

/// Fire-and-forget sink for audit records.
///
/// `record` never blocks and never fails. A single writer task drains the
/// queue; when the queue is full the oldest pending record is dropped.
#[derive(Clone)]
pub struct AuditRecorder {
    shared: Arc<RecorderShared>,
}

impl AuditRecorder {
    /// Creates a recorder with an empty queue. Records queue up until a writer starts.
    #[must_use]
    pub fn new(config: AuditRecorderConfig) -> Self {
        Self {
            shared: Arc::new(RecorderShared {
                queue: Mutex::new(RecorderQueue {
                    records: VecDeque::with_capacity(config.capacity.min(4096)),
                    closed: false,
                }),
                capacity: config.capacity.max(1),
                notify: Notify::new(),
                enqueued: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                written: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Spawns the writer task draining into `repository`.
    #[must_use]
    pub fn start(&self, repository: Arc<dyn AuditRepository>) -> AuditWriterHandle {
        let shared = self.shared.clone();
        let join = tokio::spawn(run_writer(shared.clone(), repository));

        AuditWriterHandle { shared, join }
    }

    /// Queues a record for persistence.
    pub fn record(&self, record: AuditRecord) {
        let shared = &self.shared;
        shared.enqueued.fetch_add(1, Ordering::Relaxed);

        let evicted = {
            let mut queue = shared.lock_queue();
            if queue.closed {
                drop(queue);
                shared.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: AUDIT_TARGET, action = %record.action.as_str(), "audit recorder closed, record dropped");
                return;
            }

            let evicted = if queue.records.len() >= shared.capacity {
                queue.records.pop_front()
            } else {
                None
            };
            queue.records.push_back(record);
            evicted
        };

        if let Some(evicted) = evicted {
            shared.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                target: AUDIT_TARGET,
                record_id = %evicted.record_id,
                action = %evicted.action.as_str(),
                "audit queue full, oldest record dropped"
            );
        }

        shared.notify.notify_one();
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> AuditRecorderStats {
        self.shared.stats()
    }
}

/// Handle owning the writer task.
pub struct AuditWriterHandle {
    shared: Arc<RecorderShared>,
    join: JoinHandle<()>,
}

impl AuditWriterHandle {
    /// Stops accepting records, drains what is pending and waits for the writer.
    pub async fn shutdown(self) -> AuditRecorderStats {
        self.shared.lock_queue().closed = true;
        self.shared.notify.notify_one();

        if let Err(join_error) = self.join.await {
            error!(target: AUDIT_TARGET, error = %join_error, "audit writer task ended abnormally");
        }

        self.shared.stats()
    }
}

async fn run_writer(shared: Arc<RecorderShared>, repository: Arc<dyn AuditRepository>) {
    loop {
        match shared.next_record() {
            NextRecord::Write(record) => persist(&shared, repository.clone(), record).await,
            NextRecord::Wait => shared.notify.notified().await,
            NextRecord::Stop => break,
        }
    }

    debug!(target: AUDIT_TARGET, "audit writer stopped");
}

/// Each write runs in its own task so a panicking repository cannot take the writer down.
async fn persist(shared: &RecorderShared, repository: Arc<dyn AuditRepository>, record: AuditRecord) {
    let record_id = record.record_id;
    let outcome = tokio::spawn(async move { repository.append_record(record).await }).await;

    match outcome {
        Ok(Ok(())) => {
            shared.written.fetch_add(1, Ordering::Relaxed);
        }
        Ok(Err(app_error)) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            warn!(target: AUDIT_TARGET, %record_id, error = %app_error, "failed to persist audit record");
        }
        Err(join_error) => {
            shared.failed.fetch_add(1, Ordering::Relaxed);
            error!(target: AUDIT_TARGET, %record_id, error = %join_error, "audit write panicked");
        }
    }
}
