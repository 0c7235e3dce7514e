//! Background relay from the outbox to the message bus.
//!
//! Each poll fetches the oldest unpublished records and delivers them in
//! order. A delivery failure is recorded on the record and retried on a
//! later poll; later records of the same aggregate are held back for the rest
//! of the batch so one aggregate's events are never delivered out of order.
//! A record that keeps failing is parked once it reaches the attempt limit,
//! and its aggregate stops taking part in polls.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};
use wms_core::bus::MessageBus;
use wms_core::clock::Clock;
use wms_core::error::{DeliveryError, DomainError};
use wms_core::outbox::{OutboxRecord, OutboxStore};

/// Publisher tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublisherConfig {
    /// Delay between polls.
    pub poll_interval: Duration,
    /// Maximum records fetched per poll.
    pub batch_size: usize,
    /// Upper bound on one delivery attempt.
    pub delivery_timeout: Duration,
    /// Failed attempts after which a record is parked.
    pub max_attempts: i32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 100,
            delivery_timeout: Duration::from_secs(5),
            max_attempts: 10,
        }
    }
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl PublisherConfig {
    /// Raises zero or negative settings to the smallest usable value.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_INTERVAL),
            batch_size: self.batch_size.max(1),
            delivery_timeout: self.delivery_timeout.max(MIN_INTERVAL),
            max_attempts: self.max_attempts.max(1),
        }
    }
}

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Records fetched.
    pub fetched: usize,
    /// Records acknowledged by the bus and marked published.
    pub published: usize,
    /// Records acknowledged by the bus that could not be marked; they will
    /// be delivered again.
    pub unmarked: usize,
    /// Records whose delivery failed.
    pub failed: usize,
    /// Failed records that reached the attempt limit in this batch.
    pub parked: usize,
    /// Records held back behind an earlier failure of the same aggregate.
    pub skipped: usize,
}

/// Running totals shared between the publisher task and observers.
#[derive(Debug, Default)]
pub struct PublisherStats {
    published: AtomicU64,
    unmarked: AtomicU64,
    failed: AtomicU64,
    parked: AtomicU64,
    skipped: AtomicU64,
    batches: AtomicU64,
    fetch_errors: AtomicU64,
}

/// Point-in-time copy of [`PublisherStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    /// Records delivered and marked published.
    pub published: u64,
    /// Deliveries whose mark failed; each is redelivered later.
    pub unmarked: u64,
    /// Failed delivery attempts.
    pub failed: u64,
    /// Records parked at the attempt limit.
    pub parked: u64,
    /// Records held back behind a failure of the same aggregate.
    pub skipped: u64,
    /// Completed polls.
    pub batches: u64,
    /// Polls that could not fetch a batch.
    pub fetch_errors: u64,
}

impl PublisherStats {
    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            published: self.published.load(Ordering::Relaxed),
            unmarked: self.unmarked.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            parked: self.parked.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
        }
    }

    fn absorb(&self, report: &BatchReport) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.published
            .fetch_add(report.published as u64, Ordering::Relaxed);
        self.unmarked
            .fetch_add(report.unmarked as u64, Ordering::Relaxed);
        self.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        self.parked.fetch_add(report.parked as u64, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped as u64, Ordering::Relaxed);
    }
}

/// Polls the outbox and delivers unpublished records to the bus.
pub struct OutboxPublisher {
    store: Arc<dyn OutboxStore>,
    bus: Arc<dyn MessageBus>,
    clock: Arc<dyn Clock>,
    config: PublisherConfig,
    stats: Arc<PublisherStats>,
}

impl fmt::Debug for OutboxPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboxPublisher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl OutboxPublisher {
    /// Creates a publisher. Nothing runs until [`Self::start`] or
    /// [`Self::poll_once`]. Unusable settings in `config` are raised to
    /// their minimum (see [`PublisherConfig::normalized`]).
    #[must_use]
    pub fn new(
        store: Arc<dyn OutboxStore>,
        bus: Arc<dyn MessageBus>,
        clock: Arc<dyn Clock>,
        config: PublisherConfig,
    ) -> Self {
        let normalized = config.normalized();
        if normalized != config {
            warn!(requested = ?config, effective = ?normalized, "publisher config raised to minimums");
        }
        let config = normalized;
        Self {
            store,
            bus,
            clock,
            config,
            stats: Arc::new(PublisherStats::default()),
        }
    }

    /// Effective configuration.
    #[must_use]
    pub fn config(&self) -> PublisherConfig {
        self.config
    }

    /// Shared handle to the running totals.
    #[must_use]
    pub fn stats(&self) -> Arc<PublisherStats> {
        Arc::clone(&self.stats)
    }

    /// Runs one batch: fetch, deliver in order, mark or record failure.
    ///
    /// # Errors
    ///
    /// Returns the store error if the batch could not be fetched. Failures of
    /// individual records are reported in the [`BatchReport`] instead.
    #[instrument(skip(self), fields(batch_size = self.config.batch_size))]
    pub async fn poll_once(&self) -> Result<BatchReport, DomainError> {
        let records = match self
            .store
            .find_unpublished(self.config.batch_size, self.config.max_attempts)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                self.stats.fetch_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        let mut report = BatchReport {
            fetched: records.len(),
            ..BatchReport::default()
        };
        let mut blocked: HashSet<(String, String)> = HashSet::new();

        for record in &records {
            let key = (record.aggregate_type.clone(), record.aggregate_id.clone());
            if blocked.contains(&key) {
                debug!(event_id = %record.id, aggregate_id = %record.aggregate_id, "held behind earlier failure");
                report.skipped += 1;
                continue;
            }

            match self.deliver(record).await {
                Ok(()) => match self.store.mark_published(record.id, self.clock.now()).await {
                    Ok(()) => report.published += 1,
                    Err(e) => {
                        error!(
                            event_id = %record.id,
                            error = %e,
                            "delivered but not marked published; will be redelivered"
                        );
                        report.unmarked += 1;
                        // Redelivery of this record must precede the rest.
                        blocked.insert(key);
                    }
                },
                Err(e) => {
                    warn!(
                        event_id = %record.id,
                        event_type = %record.event_type,
                        destination = %record.destination,
                        attempts = record.attempts + 1,
                        error = %e,
                        "outbox delivery failed"
                    );
                    report.failed += 1;
                    blocked.insert(key);
                    if let Err(store_err) = self.store.record_failure(record.id, &e.to_string()).await {
                        error!(event_id = %record.id, error = %store_err, "failed to record delivery failure");
                    } else if record.attempts + 1 >= self.config.max_attempts {
                        error!(
                            event_id = %record.id,
                            aggregate_id = %record.aggregate_id,
                            max_attempts = self.config.max_attempts,
                            "outbox record parked at attempt limit"
                        );
                        report.parked += 1;
                    }
                }
            }
        }

        self.stats.absorb(&report);
        if report.fetched > 0 {
            info!(
                fetched = report.fetched,
                published = report.published,
                unmarked = report.unmarked,
                failed = report.failed,
                parked = report.parked,
                skipped = report.skipped,
                "outbox batch processed"
            );
        }
        Ok(report)
    }

    async fn deliver(&self, record: &OutboxRecord) -> Result<(), DeliveryError> {
        let envelope = record
            .decode_envelope()
            .map_err(|e| DeliveryError::Encoding(e.to_string()))?;
        let attempt = self
            .bus
            .publish(&record.destination, &record.aggregate_id, &envelope);
        match tokio::time::timeout(self.config.delivery_timeout, attempt).await {
            Ok(result) => result,
            Err(_) => Err(DeliveryError::Timeout(self.config.delivery_timeout)),
        }
    }

    /// Spawns the polling loop on the current tokio runtime.
    #[must_use]
    pub fn start(self) -> PublisherHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats();
        let task = tokio::spawn(self.run(shutdown_rx));
        PublisherHandle {
            shutdown: shutdown_tx,
            task,
            stats,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = u64::try_from(self.config.poll_interval.as_millis()).unwrap_or(u64::MAX),
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "outbox publisher started"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        error!(error = %e, "outbox poll failed");
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("outbox publisher stopped");
    }
}

/// Control handle for a running publisher.
///
/// Dropping the handle also stops the loop.
#[derive(Debug)]
pub struct PublisherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    stats: Arc<PublisherStats>,
}

impl PublisherHandle {
    /// Reads the running totals.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Returns `true` until the loop has exited.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops polling and waits for the loop to exit. A batch already in
    /// flight runs to completion first.
    pub async fn stop(self) {
        // A send error only means the loop already exited.
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "outbox publisher task ended abnormally");
        }
    }
}
