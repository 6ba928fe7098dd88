//! Best-effort delivery of analytics events.
//!
//! Callers push events into a bounded queue without blocking; a background thread drains it on a
//! timer and sends batches to the collector. A full queue drops events, failed batches are not
//! retried.
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{Receiver, SyncSender, TrySendError},
        Arc,
    },
    time::{Duration, Instant},
};

use reqwest::Url;

use crate::{background::BackgroundThread, events::Event, DiagnosticHook, Result};

pub(crate) const ANALYTICS_ENDPOINT: &str = "/analytics";

const MIN_BATCH_SIZE: usize = 1;
const MAX_BATCH_SIZE: usize = 10_000;

/// Destination of event batches.
pub(crate) trait EventCollector: Send + 'static {
    fn send_batch(&self, events: &[Event]) -> Result<()>;
}

/// Posts event batches as a JSON array.
pub(crate) struct HttpEventCollector {
    pub client: reqwest::blocking::Client,
    pub url: Url,
    pub api_key: String,
    pub request_timeout: Duration,
}

impl EventCollector for HttpEventCollector {
    fn send_batch(&self, events: &[Event]) -> Result<()> {
        self.client
            .post(self.url.clone())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .json(events)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EventDispatcherConfig {
    /// Maximum number of queued events. Events recorded while the queue is full are dropped.
    pub capacity: usize,
    pub flush_interval: Duration,
    pub batch_size: usize,
    /// Deadline for the final flush on shutdown. Whatever is left afterwards is discarded.
    pub final_flush_timeout: Duration,
}

/// Delivery counters of an event dispatcher.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventStats {
    /// Events accepted into the queue.
    pub recorded: u64,
    /// Events discarded: queue full, dispatcher stopped, or left over after the final flush.
    pub dropped: u64,
    /// Events in batches the collector accepted.
    pub delivered: u64,
    /// Batches the collector rejected or that failed to send.
    pub failed_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    recorded: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    failed_batches: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }

    fn snapshot(&self) -> EventStats {
        EventStats {
            recorded: self.recorded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of the event queue. Cheap to clone, never blocks.
#[derive(Clone)]
pub(crate) struct EventRecorder {
    sender: SyncSender<Event>,
    counters: Arc<Counters>,
}

impl EventRecorder {
    pub fn record(&self, event: impl Into<Event>) {
        match self.sender.try_send(event.into()) {
            Ok(()) => Counters::add(&self.counters.recorded, 1),
            Err(TrySendError::Full(event)) => {
                log::debug!(target: "molasses", feature_key = event.feature_key(); "event queue is full, dropping event");
                Counters::add(&self.counters.dropped, 1);
            }
            Err(TrySendError::Disconnected(_)) => {
                Counters::add(&self.counters.dropped, 1);
            }
        }
    }

    pub fn stats(&self) -> EventStats {
        self.counters.snapshot()
    }
}

pub(crate) struct EventDispatcher {
    thread: BackgroundThread,
    recorder: EventRecorder,
}

impl EventDispatcher {
    pub fn start(
        collector: impl EventCollector,
        config: EventDispatcherConfig,
        diagnostics: Arc<dyn DiagnosticHook + Send + Sync>,
    ) -> std::io::Result<EventDispatcher> {
        let (sender, receiver) = std::sync::mpsc::sync_channel(config.capacity.max(1));
        let counters = Arc::new(Counters::default());

        let thread = {
            let counters = counters.clone();
            BackgroundThread::spawn("molasses-events", move |stop| {
                let flusher = Flusher {
                    collector,
                    receiver,
                    counters,
                    diagnostics,
                    batch_size: config.batch_size.clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE),
                };
                loop {
                    if stop.wait(config.flush_interval) {
                        log::debug!(target: "molasses", "event dispatcher received stop command");
                        // No deadline if the timeout does not fit into an `Instant`.
                        flusher.flush(Instant::now().checked_add(config.final_flush_timeout));
                        flusher.discard_remaining();
                        return;
                    }
                    flusher.flush(None);
                }
            })?
        };

        Ok(EventDispatcher {
            thread,
            recorder: EventRecorder { sender, counters },
        })
    }

    pub fn recorder(&self) -> EventRecorder {
        self.recorder.clone()
    }

    /// Stop the dispatcher after a final flush. Waits up to `timeout` for it to finish.
    pub fn shutdown(self, timeout: Duration) -> Result<()> {
        self.thread.shutdown(timeout)
    }
}

/// Consumer side of the event queue, owned by the dispatcher thread.
struct Flusher<C> {
    collector: C,
    receiver: Receiver<Event>,
    counters: Arc<Counters>,
    diagnostics: Arc<dyn DiagnosticHook + Send + Sync>,
    batch_size: usize,
}

impl<C: EventCollector> Flusher<C> {
    /// Drain the queue and send it in batches. With a `deadline`, batches that cannot be started
    /// before it are discarded.
    fn flush(&self, deadline: Option<Instant>) {
        let pending: Vec<Event> = self.receiver.try_iter().collect();
        if pending.is_empty() {
            return;
        }
        log::debug!(target: "molasses", events = pending.len(); "flushing events");

        let mut batches = pending.chunks(self.batch_size);
        while let Some(batch) = batches.next() {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                let discarded = batch.len() + batches.map(<[Event]>::len).sum::<usize>();
                log::warn!(target: "molasses", events = discarded; "final flush timed out, discarding events");
                Counters::add(&self.counters.dropped, discarded);
                return;
            }
            self.send(batch);
        }
    }

    /// Count events that arrived after the final flush as dropped.
    fn discard_remaining(&self) {
        let discarded = self.receiver.try_iter().count();
        if discarded > 0 {
            log::warn!(target: "molasses", events = discarded; "events recorded during shutdown, discarding");
            Counters::add(&self.counters.dropped, discarded);
        }
    }

    fn send(&self, batch: &[Event]) {
        match self.collector.send_batch(batch) {
            Ok(()) => Counters::add(&self.counters.delivered, batch.len()),
            Err(err) => {
                log::warn!(target: "molasses", events = batch.len(); "failed to deliver events: {}", err);
                Counters::add(&self.counters.failed_batches, 1);
                self.diagnostics.on_error(&err);
            }
        }
    }
}
