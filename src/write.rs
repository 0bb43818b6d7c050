//! Background batching write pipeline.
//!
//! [`WriteApi`] accepts points and raw lines from any number of foreground
//! tasks, groups them per destination, and hands full batches to a worker
//! task that delivers them over HTTP with retries. A batch is dispatched
//! when it reaches the configured line count or byte size, when its oldest
//! line reaches the flush interval, or on explicit [`flush`](WriteApi::flush)
//! and [`close`](WriteApi::close).
//!
//! Delivery outcomes never surface as `Result`s on the submitting call;
//! register [`WriteCallbacks`] to observe successes, retries and terminal
//! failures.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::error::{Error, Result};
use crate::point::{Point, WritePrecision};
use crate::retry::RetryPolicy;

/// Upper bound on queued submissions between foreground tasks and the worker.
const WORKER_QUEUE_CAPACITY: usize = 1024;

const DEFAULT_BATCH_SIZE: usize = 1000;
const DEFAULT_MAX_BATCH_BYTES: usize = 10 * 1024 * 1024;

/// Tuning knobs for the write pipeline.
///
/// The defaults match the batching behavior most InfluxDB clients ship:
/// batches of 1000 lines flushed after at most one second, retried up to
/// five times with exponential backoff.
#[derive(Clone, Debug)]
pub struct WriteOptions {
    /// Lines per batch before it is dispatched.
    pub batch_size: usize,
    /// Payload bytes per batch before it is dispatched.
    pub max_batch_bytes: usize,
    /// Maximum age of a buffered line before its batch is dispatched.
    pub flush_interval: Duration,
    /// Random delay added before each dispatch to spread load spikes.
    pub jitter_interval: Duration,
    /// Base delay before the first retry.
    pub retry_interval: Duration,
    /// Maximum retries per batch; 0 disables retrying.
    pub max_retries: u32,
    /// Upper bound on a single backoff delay.
    pub max_retry_delay: Duration,
    /// Upper bound on the total time spent retrying one batch.
    pub max_retry_time: Duration,
    /// Multiplier applied for each successive retry.
    pub exponential_base: u32,
    /// Batches allowed in flight concurrently.
    pub max_in_flight: usize,
    /// Timestamp precision applied to all written points.
    pub write_precision: WritePrecision,
    /// How long [`WriteApi::close`] waits for in-flight batches.
    pub close_timeout: Duration,
    /// Whether batches caught mid-backoff at shutdown get one final attempt.
    pub retry_on_close: bool,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_batch_bytes: DEFAULT_MAX_BATCH_BYTES,
            flush_interval: Duration::from_secs(1),
            jitter_interval: Duration::ZERO,
            retry_interval: Duration::from_secs(5),
            max_retries: 5,
            max_retry_delay: Duration::from_secs(125),
            max_retry_time: Duration::from_secs(180),
            exponential_base: 2,
            max_in_flight: 1,
            write_precision: WritePrecision::Ns,
            close_timeout: Duration::from_secs(10),
            retry_on_close: true,
        }
    }
}

impl WriteOptions {
    /// Set the number of lines per batch.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the payload byte limit per batch.
    pub fn with_max_batch_bytes(mut self, max_batch_bytes: usize) -> Self {
        self.max_batch_bytes = max_batch_bytes;
        self
    }

    /// Set the maximum age of buffered lines.
    pub fn with_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval;
        self
    }

    /// Set the random pre-dispatch delay width.
    pub fn with_jitter_interval(mut self, jitter_interval: Duration) -> Self {
        self.jitter_interval = jitter_interval;
        self
    }

    /// Set the base retry delay.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    /// Set the maximum number of retries per batch; 0 disables retrying.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the upper bound on a single backoff delay.
    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> Self {
        self.max_retry_delay = max_retry_delay;
        self
    }

    /// Set the upper bound on total retry time per batch.
    pub fn with_max_retry_time(mut self, max_retry_time: Duration) -> Self {
        self.max_retry_time = max_retry_time;
        self
    }

    /// Set the backoff multiplier.
    pub fn with_exponential_base(mut self, exponential_base: u32) -> Self {
        self.exponential_base = exponential_base;
        self
    }

    /// Set how many batches may be in flight concurrently.
    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Set the timestamp precision for written points.
    pub fn with_write_precision(mut self, write_precision: WritePrecision) -> Self {
        self.write_precision = write_precision;
        self
    }

    /// Set how long `close` waits for in-flight batches.
    pub fn with_close_timeout(mut self, close_timeout: Duration) -> Self {
        self.close_timeout = close_timeout;
        self
    }

    /// Set whether shutdown grants mid-backoff batches one final attempt.
    pub fn with_retry_on_close(mut self, retry_on_close: bool) -> Self {
        self.retry_on_close = retry_on_close;
        self
    }

    /// The retry schedule derived from these options.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_interval: self.retry_interval,
            max_retries: self.max_retries,
            max_retry_delay: self.max_retry_delay,
            max_retry_time: self.max_retry_time,
            exponential_base: self.exponential_base,
            jitter_interval: self.jitter_interval,
        }
    }
}

/// Where a batch goes: bucket, organization and timestamp precision.
///
/// Lines are only batched together when all three match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct WriteDestination {
    bucket: String,
    org: String,
    precision: WritePrecision,
}

impl WriteDestination {
    /// Create a destination.
    pub fn new(
        bucket: impl Into<String>,
        org: impl Into<String>,
        precision: WritePrecision,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            org: org.into(),
            precision,
        }
    }

    /// Target bucket name.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Target organization name.
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Timestamp precision of the payload.
    pub fn precision(&self) -> WritePrecision {
        self.precision
    }
}

impl fmt::Display for WriteDestination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "bucket '{}' in org '{}' ({})",
            self.bucket, self.org, self.precision
        )
    }
}

/// Called after a batch is accepted by the server.
pub type OnWriteSuccess = dyn Fn(&WriteDestination, &str) + Send + Sync;
/// Called before each retry, with the error that triggered it.
pub type OnWriteRetry = dyn Fn(&WriteDestination, &str, &Error) + Send + Sync;
/// Called when a batch is given up on, with the final error.
pub type OnWriteError = dyn Fn(&WriteDestination, &str, &Error) + Send + Sync;

/// Observers for background delivery outcomes.
///
/// Each callback receives the destination and the line protocol payload of
/// the batch. Callbacks run on the dispatch task; keep them quick.
#[derive(Clone, Default)]
pub struct WriteCallbacks {
    success: Option<Arc<OnWriteSuccess>>,
    retry: Option<Arc<OnWriteRetry>>,
    error: Option<Arc<OnWriteError>>,
}

impl WriteCallbacks {
    /// Create an empty callback set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe accepted batches.
    pub fn on_success(
        mut self,
        callback: impl Fn(&WriteDestination, &str) + Send + Sync + 'static,
    ) -> Self {
        self.success = Some(Arc::new(callback));
        self
    }

    /// Observe retried batches.
    pub fn on_retry(
        mut self,
        callback: impl Fn(&WriteDestination, &str, &Error) + Send + Sync + 'static,
    ) -> Self {
        self.retry = Some(Arc::new(callback));
        self
    }

    /// Observe abandoned batches.
    pub fn on_error(
        mut self,
        callback: impl Fn(&WriteDestination, &str, &Error) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for WriteCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WriteCallbacks")
            .field("success", &self.success.is_some())
            .field("retry", &self.retry.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// A detached group of lines bound for one destination.
#[derive(Debug)]
struct Batch {
    destination: WriteDestination,
    lines: Vec<String>,
}

struct PendingBatch {
    lines: Vec<String>,
    bytes: usize,
    since: Instant,
}

/// Per-destination accumulation of lines, with size and age triggers.
struct BatchBuffer {
    batch_size: usize,
    max_batch_bytes: usize,
    flush_interval: Duration,
    pending: HashMap<WriteDestination, PendingBatch>,
}

impl BatchBuffer {
    fn new(options: &WriteOptions) -> Self {
        Self {
            batch_size: options.batch_size.max(1),
            max_batch_bytes: options.max_batch_bytes.max(1),
            flush_interval: options.flush_interval,
            pending: HashMap::new(),
        }
    }

    /// Append one line; returns a detached batch when a threshold is hit.
    fn push(&mut self, destination: &WriteDestination, line: String, now: Instant) -> Option<Batch> {
        let slot = self
            .pending
            .entry(destination.clone())
            .or_insert_with(|| PendingBatch {
                lines: Vec::new(),
                bytes: 0,
                since: now,
            });
        // Account for the newline joining this line to the previous one.
        slot.bytes += line.len() + usize::from(!slot.lines.is_empty());
        slot.lines.push(line);

        if slot.lines.len() >= self.batch_size || slot.bytes >= self.max_batch_bytes {
            return self.take(destination);
        }
        None
    }

    fn take(&mut self, destination: &WriteDestination) -> Option<Batch> {
        self.pending.remove(destination).map(|pending| Batch {
            destination: destination.clone(),
            lines: pending.lines,
        })
    }

    /// Detach every batch whose oldest line has reached the flush interval.
    fn take_expired(&mut self, now: Instant) -> Vec<Batch> {
        let mut expired: Vec<(Instant, WriteDestination)> = self
            .pending
            .iter()
            .filter(|(_, p)| now.saturating_duration_since(p.since) >= self.flush_interval)
            .map(|(destination, p)| (p.since, destination.clone()))
            .collect();
        expired.sort_by_key(|(since, _)| *since);
        expired
            .into_iter()
            .filter_map(|(_, destination)| self.take(&destination))
            .collect()
    }

    /// Detach everything, oldest batch first.
    fn drain_all(&mut self) -> Vec<Batch> {
        let mut all: Vec<(Instant, Batch)> = self
            .pending
            .drain()
            .map(|(destination, p)| {
                (
                    p.since,
                    Batch {
                        destination,
                        lines: p.lines,
                    },
                )
            })
            .collect();
        all.sort_by_key(|(since, _)| *since);
        all.into_iter().map(|(_, batch)| batch).collect()
    }

    /// Instant at which the oldest buffered line expires, if any.
    fn next_deadline(&self) -> Option<Instant> {
        self.pending
            .values()
            .filter_map(|p| p.since.checked_add(self.flush_interval))
            .min()
    }

    fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

enum WorkerMessage {
    Lines {
        destination: WriteDestination,
        lines: Vec<String>,
    },
    Flush {
        done: oneshot::Sender<()>,
    },
    Close {
        done: oneshot::Sender<()>,
    },
}

/// Shared state of the delivery side: transport, policy and callbacks.
struct Dispatcher {
    client: Client,
    policy: RetryPolicy,
    jitter_interval: Duration,
    retry_on_close: bool,
    callbacks: WriteCallbacks,
    in_flight: Semaphore,
    cancel: CancellationToken,
}

impl Dispatcher {
    /// Deliver one batch, retrying per policy. Outcomes go to the callbacks;
    /// this function itself never fails.
    async fn dispatch(self: Arc<Self>, batch: Batch) {
        let Ok(_permit) = self.in_flight.acquire().await else {
            return; // the semaphore is never closed
        };

        if !self.jitter_interval.is_zero() {
            tokio::time::sleep(self.jitter_interval.mul_f64(rand::random::<f64>())).await;
        }

        let destination = &batch.destination;
        let body = batch.lines.join("\n");
        debug!(
            "dispatching {} lines ({} bytes) to {}",
            batch.lines.len(),
            body.len(),
            destination
        );

        let started = Instant::now();
        let mut retries: u32 = 0;
        loop {
            let err = match self.client.post_line_protocol(destination, body.clone()).await {
                Ok(()) => {
                    debug!("delivered {} lines to {}", batch.lines.len(), destination);
                    if let Some(cb) = &self.callbacks.success {
                        cb(destination, &body);
                    }
                    return;
                }
                Err(err) => err,
            };

            let may_retry = err.is_retryable() && retries < self.policy.max_retries;
            let delay = self.policy.delay_for(retries + 1, err.retry_after());
            if !may_retry || started.elapsed() + delay >= self.policy.max_retry_time {
                error!(
                    "write to {} failed terminally after {} retries: {}",
                    destination, retries, err
                );
                if let Some(cb) = &self.callbacks.error {
                    cb(destination, &body, &err);
                }
                return;
            }

            retries += 1;
            warn!(
                "write to {} failed, retry {}/{} in {:?}: {}",
                destination, retries, self.policy.max_retries, delay, err
            );
            if let Some(cb) = &self.callbacks.retry {
                cb(destination, &body, &err);
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    if self.retry_on_close {
                        // Shutdown grants one forced attempt instead of
                        // waiting out the backoff.
                        match self.client.post_line_protocol(destination, body.clone()).await {
                            Ok(()) => {
                                debug!("delivered {} lines to {} at shutdown", batch.lines.len(), destination);
                                if let Some(cb) = &self.callbacks.success {
                                    cb(destination, &body);
                                }
                            }
                            Err(final_err) => {
                                error!("write to {} abandoned at shutdown: {}", destination, final_err);
                                if let Some(cb) = &self.callbacks.error {
                                    cb(destination, &body, &final_err);
                                }
                            }
                        }
                    } else {
                        error!("write to {} abandoned at shutdown: {}", destination, err);
                        if let Some(cb) = &self.callbacks.error {
                            cb(destination, &body, &err);
                        }
                    }
                    return;
                }
            }
        }
    }
}

async fn flush_timer(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending::<()>().await,
    }
}

/// The single background task owning the buffer and spawning dispatches.
struct WriteWorker {
    rx: mpsc::Receiver<WorkerMessage>,
    buffer: BatchBuffer,
    dispatcher: Arc<Dispatcher>,
    tasks: JoinSet<()>,
    close_timeout: Duration,
}

impl WriteWorker {
    async fn run(mut self) {
        debug!("write worker started");
        loop {
            let deadline = self.buffer.next_deadline();
            tokio::select! {
                msg = self.rx.recv() => match msg {
                    Some(WorkerMessage::Lines { destination, lines }) => {
                        let now = Instant::now();
                        for line in lines {
                            if let Some(batch) = self.buffer.push(&destination, line, now) {
                                self.spawn_dispatch(batch);
                            }
                        }
                    }
                    Some(WorkerMessage::Flush { done }) => {
                        self.flush_buffered();
                        self.drain_in_flight().await;
                        let _ = done.send(());
                    }
                    Some(WorkerMessage::Close { done }) => {
                        self.shutdown(Some(done)).await;
                        return;
                    }
                    // All senders dropped: flush and stop.
                    None => {
                        self.shutdown(None).await;
                        return;
                    }
                },
                _ = flush_timer(deadline) => {
                    for batch in self.buffer.take_expired(Instant::now()) {
                        self.spawn_dispatch(batch);
                    }
                }
                // Reap finished dispatches so the join set stays small.
                Some(_) = self.tasks.join_next(), if !self.tasks.is_empty() => {}
            }
        }
    }

    fn spawn_dispatch(&mut self, batch: Batch) {
        let dispatcher = self.dispatcher.clone();
        self.tasks.spawn(dispatcher.dispatch(batch));
    }

    fn flush_buffered(&mut self) {
        for batch in self.buffer.drain_all() {
            self.spawn_dispatch(batch);
        }
    }

    async fn drain_in_flight(&mut self) {
        while self.tasks.join_next().await.is_some() {}
    }

    async fn shutdown(&mut self, done: Option<oneshot::Sender<()>>) {
        self.flush_buffered();
        // Wake sleeping retries; each makes a final attempt or reports the
        // batch as abandoned, depending on retry_on_close.
        self.dispatcher.cancel.cancel();
        if tokio::time::timeout(self.close_timeout, self.drain_in_flight())
            .await
            .is_err()
        {
            warn!(
                "write worker shutdown timed out after {:?}, aborting {} dispatches",
                self.close_timeout,
                self.tasks.len()
            );
            self.tasks.abort_all();
        }
        debug!("write worker stopped");
        if let Some(done) = done {
            let _ = done.send(());
        }
    }
}

/// Handle to the background write pipeline.
///
/// Created by [`Client::write_api`](crate::Client::write_api). Submissions
/// return as soon as the lines are accepted into the pipeline; delivery
/// happens in the background. The handle can be shared behind an `Arc` or
/// used from one task.
///
/// Dropping the handle without calling [`close`](WriteApi::close) still
/// flushes: the worker drains everything buffered when the channel closes,
/// but nothing waits for that delivery to finish. Call `close` to wait.
///
/// # Example
///
/// ```ignore
/// use influxdb2_client::{Client, Point};
///
/// let client = Client::new("http://localhost:8086", "my-org", "my-token");
/// let write_api = client.write_api();
/// write_api.write_point("sensors", "my-org", Point::new("m").field("f", 1i64)).await?;
/// write_api.close().await?;
/// ```
pub struct WriteApi {
    tx: mpsc::Sender<WorkerMessage>,
    worker: JoinHandle<()>,
    precision: WritePrecision,
}

impl WriteApi {
    pub(crate) fn new(client: Client, options: WriteOptions, callbacks: WriteCallbacks) -> Self {
        let (tx, rx) = mpsc::channel(WORKER_QUEUE_CAPACITY);
        let precision = options.write_precision;
        let dispatcher = Arc::new(Dispatcher {
            client,
            policy: options.retry_policy(),
            jitter_interval: options.jitter_interval,
            retry_on_close: options.retry_on_close,
            callbacks,
            in_flight: Semaphore::new(options.max_in_flight.max(1)),
            cancel: CancellationToken::new(),
        });
        let worker = WriteWorker {
            rx,
            buffer: BatchBuffer::new(&options),
            dispatcher,
            tasks: JoinSet::new(),
            close_timeout: options.close_timeout,
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            worker: handle,
            precision,
        }
    }

    /// Queue one point for batched delivery.
    ///
    /// Fails fast with [`Error::Validation`] when the point cannot be
    /// encoded; delivery failures are reported through the callbacks, not
    /// here. Blocks only when the pipeline queue is full.
    pub async fn write_point(&self, bucket: &str, org: &str, point: Point) -> Result<()> {
        self.write_points(bucket, org, [point]).await
    }

    /// Queue several points for batched delivery.
    ///
    /// All points are validated before any of them is queued.
    pub async fn write_points(
        &self,
        bucket: &str,
        org: &str,
        points: impl IntoIterator<Item = Point>,
    ) -> Result<()> {
        let mut lines = Vec::new();
        for point in points {
            lines.push(point.to_line_protocol(self.precision)?);
        }
        self.submit(bucket, org, lines).await
    }

    /// Queue one pre-encoded line protocol record.
    pub async fn write_line(
        &self,
        bucket: &str,
        org: &str,
        line: impl Into<String>,
    ) -> Result<()> {
        self.write_lines(bucket, org, [line]).await
    }

    /// Queue several pre-encoded line protocol records. Empty strings are
    /// skipped.
    pub async fn write_lines(
        &self,
        bucket: &str,
        org: &str,
        lines: impl IntoIterator<Item = impl Into<String>>,
    ) -> Result<()> {
        let lines: Vec<String> = lines
            .into_iter()
            .map(Into::into)
            .filter(|line| !line.is_empty())
            .collect();
        self.submit(bucket, org, lines).await
    }

    async fn submit(&self, bucket: &str, org: &str, lines: Vec<String>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }
        let destination = WriteDestination::new(bucket, org, self.precision);
        self.tx
            .send(WorkerMessage::Lines { destination, lines })
            .await
            .map_err(|_| Error::Shutdown)
    }

    /// Dispatch everything buffered and wait until all in-flight batches
    /// have been delivered or given up on.
    pub async fn flush(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(WorkerMessage::Flush { done: done_tx })
            .await
            .map_err(|_| Error::Shutdown)?;
        done_rx.await.map_err(|_| Error::Shutdown)
    }

    /// Flush and shut the pipeline down, waiting up to the configured close
    /// timeout for in-flight batches.
    pub async fn close(self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        if self
            .tx
            .send(WorkerMessage::Close { done: done_tx })
            .await
            .is_ok()
        {
            let _ = done_rx.await;
        }
        let _ = self.worker.await;
        Ok(())
    }
}

/// Deliver one payload with foreground retries, returning the last error
/// once the policy is exhausted.
pub(crate) async fn deliver_with_retry(
    client: &Client,
    destination: &WriteDestination,
    body: &str,
    policy: &RetryPolicy,
) -> Result<()> {
    let started = Instant::now();
    let mut retries: u32 = 0;
    loop {
        let err = match client.post_line_protocol(destination, body.to_owned()).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if !err.is_retryable() || retries >= policy.max_retries {
            return Err(err);
        }
        let delay = policy.delay_for(retries + 1, err.retry_after());
        if started.elapsed() + delay >= policy.max_retry_time {
            return Err(err);
        }
        retries += 1;
        warn!(
            "write to {} failed, retry {}/{} in {:?}: {}",
            destination, retries, policy.max_retries, delay, err
        );
        tokio::time::sleep(delay).await;
    }
}
