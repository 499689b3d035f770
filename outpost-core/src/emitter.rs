//! Generic batching engine behind every outbound channel.
//!
//! A [`BatchEmitter`] owns one worker thread.  Producers only talk to the
//! worker through a bounded channel; the pending batch and the flush timer
//! live on the worker.  A batch is handed to the flush callback when it
//! reaches the configured size, when the batch timeout elapses, when a flush
//! is requested, and once more on shutdown.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// How long the drop of an emitter waits for the final flush.
const DROP_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);
/// Poll interval while waiting for room in a full queue.
const QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Lower bound for the batch timeout.
const MIN_BATCH_TIMEOUT: Duration = Duration::from_millis(1);
/// Stand-in for deadlines that do not fit into an [`Instant`].
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

/// The instant `timeout` from now.
///
/// Timeouts too large to represent, such as [`Duration::MAX`], saturate to
/// a deadline decades away.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// What a producer does when the emitter queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Wait until the worker makes room.
    #[default]
    Block,
    /// Discard the new item and count it as dropped.
    DropNewest,
}

/// The callback receiving every flushed batch.
pub type FlushCallback<T> = Box<dyn FnMut(Vec<T>) + Send>;

/// Configuration of a [`BatchEmitter`].
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Names the worker thread and diagnostics.
    pub name: &'static str,
    /// Items per batch; also the channel capacity.
    pub batch_size: usize,
    /// Maximum time a partial batch waits.
    pub batch_timeout: Duration,
    /// Behavior on a full channel.
    pub queue_full_policy: QueueFullPolicy,
}

enum Task<T> {
    Item(T),
    Flush(SyncSender<()>),
    Shutdown(SyncSender<()>),
}

enum Worker<T> {
    NotStarted(Receiver<Task<T>>, FlushCallback<T>),
    Running(JoinHandle<()>),
    Stopped,
}

/// A single-worker batching queue.
///
/// Items are delivered in enqueue order.  After [`BatchEmitter::shutdown`]
/// every enqueue is rejected.
pub struct BatchEmitter<T: Send + 'static> {
    config: BatchConfig,
    sender: SyncSender<Task<T>>,
    accepting: AtomicBool,
    started: AtomicBool,
    dropped: AtomicU64,
    worker: Mutex<Worker<T>>,
}

impl<T: Send + 'static> fmt::Debug for BatchEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchEmitter")
            .field("config", &self.config)
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .field("dropped", &self.dropped.load(Ordering::Relaxed))
            .finish()
    }
}

impl<T: Send + 'static> BatchEmitter<T> {
    /// Creates a new emitter handing full batches to `flush`.
    ///
    /// The worker is spawned on [`start`](Self::start), or on first use.
    pub fn new<F>(mut config: BatchConfig, flush: F) -> Self
    where
        F: FnMut(Vec<T>) + Send + 'static,
    {
        config.batch_size = config.batch_size.max(1);
        config.batch_timeout = config.batch_timeout.max(MIN_BATCH_TIMEOUT);
        let (sender, receiver) = sync_channel(config.batch_size);
        BatchEmitter {
            config,
            sender,
            accepting: AtomicBool::new(true),
            started: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            worker: Mutex::new(Worker::NotStarted(receiver, Box::new(flush))),
        }
    }

    /// Spawns the worker thread.
    ///
    /// Calling this more than once, or after shutdown, does nothing.
    pub fn start(&self) {
        if self.started.load(Ordering::Acquire) {
            return;
        }
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if !matches!(*worker, Worker::NotStarted(..)) {
            return;
        }
        let Worker::NotStarted(receiver, callback) =
            std::mem::replace(&mut *worker, Worker::Stopped)
        else {
            return;
        };

        let config = self.config.clone();
        let spawned = thread::Builder::new()
            .name(format!("outpost-{}-emitter", config.name))
            .spawn(move || run_worker(receiver, callback, config));
        match spawned {
            Ok(handle) => *worker = Worker::Running(handle),
            Err(err) => {
                tracing::warn!(
                    target: "outpost",
                    "[Emitter({})] Failed to spawn worker: {}",
                    self.config.name,
                    err
                );
                self.accepting.store(false, Ordering::SeqCst);
            }
        }
        self.started.store(true, Ordering::Release);
    }

    /// Enqueues an item.
    ///
    /// Returns `false` if the item was rejected, either because the emitter is
    /// shut down or because the queue was full under
    /// [`QueueFullPolicy::DropNewest`].
    pub fn enqueue(&self, item: T) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            outpost_debug!(
                "[Emitter({})] Rejected item, emitter is shut down",
                self.config.name
            );
            return false;
        }
        self.start();

        match self.config.queue_full_policy {
            QueueFullPolicy::Block => self.sender.send(Task::Item(item)).is_ok(),
            QueueFullPolicy::DropNewest => match self.sender.try_send(Task::Item(item)) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                    outpost_debug!(
                        "[Emitter({})] Queue full, dropped item ({} dropped so far)",
                        self.config.name,
                        dropped
                    );
                    false
                }
                Err(TrySendError::Disconnected(_)) => false,
            },
        }
    }

    /// The number of items discarded because the queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Whether the emitter still accepts items.
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Flushes everything enqueued so far, waiting at most `timeout`.
    pub fn flush(&self, timeout: Duration) -> bool {
        self.flush_until(deadline_after(timeout))
    }

    /// Flushes everything enqueued so far, waiting until `deadline`.
    ///
    /// Returns `true` once the worker has handed all earlier items to the
    /// flush callback.  A shut down emitter has nothing left to flush.
    pub fn flush_until(&self, deadline: Instant) -> bool {
        if !self.accepting.load(Ordering::SeqCst) {
            return true;
        }
        self.start();
        let (ack, done) = sync_channel(1);
        if !self.send_control(Task::Flush(ack), deadline) {
            return false;
        }
        done.recv_timeout(deadline.saturating_duration_since(Instant::now()))
            .is_ok()
    }

    /// Stops accepting items, flushes the pending batch and stops the worker.
    ///
    /// Only the first call does any work; later calls return `true`.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        if !self.accepting.swap(false, Ordering::SeqCst) {
            return true;
        }
        let deadline = deadline_after(timeout);
        let worker = {
            let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
            std::mem::replace(&mut *worker, Worker::Stopped)
        };
        self.started.store(true, Ordering::Release);

        match worker {
            Worker::NotStarted(receiver, mut callback) => {
                let mut pending = Vec::new();
                while let Ok(task) = receiver.try_recv() {
                    if let Task::Item(item) = task {
                        pending.push(item);
                    }
                }
                flush_batch(self.config.name, &mut callback, &mut pending);
                true
            }
            Worker::Running(handle) => {
                let (ack, done) = sync_channel(1);
                if !self.send_control(Task::Shutdown(ack), deadline) {
                    return false;
                }
                let finished = done
                    .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                    .is_ok();
                if finished {
                    handle.join().ok();
                } else {
                    outpost_debug!(
                        "[Emitter({})] Shutdown timed out, detaching worker",
                        self.config.name
                    );
                }
                finished
            }
            Worker::Stopped => true,
        }
    }

    fn send_control(&self, mut task: Task<T>, deadline: Instant) -> bool {
        loop {
            match self.sender.try_send(task) {
                Ok(()) => return true,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        return false;
                    }
                    task = returned;
                    thread::sleep(QUEUE_POLL_INTERVAL);
                }
                Err(TrySendError::Disconnected(_)) => return false,
            }
        }
    }
}

impl<T: Send + 'static> Drop for BatchEmitter<T> {
    fn drop(&mut self) {
        self.shutdown(DROP_SHUTDOWN_TIMEOUT);
    }
}

fn run_worker<T>(
    receiver: Receiver<Task<T>>,
    mut callback: FlushCallback<T>,
    config: BatchConfig,
) {
    let name = config.name;
    let mut pending = Vec::with_capacity(config.batch_size);
    let mut deadline = deadline_after(config.batch_timeout);

    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        let task = match receiver.recv_timeout(wait) {
            Ok(task) => task,
            Err(RecvTimeoutError::Timeout) => {
                flush_batch(name, &mut callback, &mut pending);
                deadline = deadline_after(config.batch_timeout);
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                flush_batch(name, &mut callback, &mut pending);
                return;
            }
        };

        match task {
            Task::Item(item) => {
                pending.push(item);
                if pending.len() >= config.batch_size {
                    flush_batch(name, &mut callback, &mut pending);
                    deadline = deadline_after(config.batch_timeout);
                }
            }
            Task::Flush(ack) => {
                let drained = drain(&receiver, &mut pending, &mut callback, &config);
                flush_batch(name, &mut callback, &mut pending);
                deadline = deadline_after(config.batch_timeout);
                ack.send(()).ok();
                for ack in drained.acks {
                    ack.send(()).ok();
                }
                if let Some(ack) = drained.shutdown {
                    ack.send(()).ok();
                    return;
                }
            }
            Task::Shutdown(ack) => {
                let drained = drain(&receiver, &mut pending, &mut callback, &config);
                flush_batch(name, &mut callback, &mut pending);
                for ack in drained.acks {
                    ack.send(()).ok();
                }
                ack.send(()).ok();
                outpost_debug!("[Emitter({})] Worker stopped", name);
                return;
            }
        }
    }
}

#[derive(Default)]
struct Drained {
    acks: Vec<SyncSender<()>>,
    shutdown: Option<SyncSender<()>>,
}

/// Takes whatever is already queued without waiting.
///
/// Bounded by the channel capacity so producers cannot keep the worker here.
fn drain<T>(
    receiver: &Receiver<Task<T>>,
    pending: &mut Vec<T>,
    callback: &mut FlushCallback<T>,
    config: &BatchConfig,
) -> Drained {
    let mut drained = Drained::default();
    for _ in 0..config.batch_size {
        match receiver.try_recv() {
            Ok(Task::Item(item)) => {
                pending.push(item);
                if pending.len() >= config.batch_size {
                    flush_batch(config.name, callback, pending);
                }
            }
            Ok(Task::Flush(ack)) => drained.acks.push(ack),
            Ok(Task::Shutdown(ack)) => drained.shutdown = Some(ack),
            Err(_) => break,
        }
    }
    drained
}

fn flush_batch<T>(name: &str, callback: &mut FlushCallback<T>, pending: &mut Vec<T>) {
    if pending.is_empty() {
        return;
    }
    let batch = std::mem::take(pending);
    outpost_debug!("[Emitter({})] Flushing {} items", name, batch.len());
    if panic::catch_unwind(AssertUnwindSafe(|| callback(batch))).is_err() {
        tracing::warn!(target: "outpost", "[Emitter({})] Flush callback panicked", name);
    }
}
