//! A background poller thread that periodically requests the feature catalog from the server and
//! stores it in a configuration store.
use std::{
    sync::{Arc, Condvar, Mutex},
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{
    background::BackgroundThread, configuration_fetcher::Fetcher,
    configuration_store::ConfigurationStore, DiagnosticHook, Error, Result,
};

#[derive(Debug, Clone)]
pub(crate) struct PollerThreadConfig {
    /// Interval to wait between requests for the catalog.
    pub interval: Duration,
    /// Randomized duration subtracted from `interval`, so that many processes started together do
    /// not poll in lockstep.
    pub jitter: Duration,
}

/// Outcome of the most recent fetch, shared between the poller thread and its observers.
#[derive(Clone)]
pub(crate) struct FetchStatus(Arc<(Mutex<Option<Result<()>>>, Condvar)>);

impl FetchStatus {
    pub fn new() -> FetchStatus {
        FetchStatus(Arc::new((Mutex::new(None), Condvar::new())))
    }

    /// Record a fetch outcome and wake up waiters. With `only_if_empty`, an outcome recorded
    /// earlier is kept.
    fn update(&self, value: Result<()>, only_if_empty: bool) {
        let (slot, condvar) = &*self.0;
        let Ok(mut slot) = slot.lock() else {
            return;
        };
        if !only_if_empty || slot.is_none() {
            *slot = Some(value);
        }
        condvar.notify_all();
    }

    /// Returns `true` once the first fetch attempt has completed, successfully or not.
    pub fn has_fetched(&self) -> bool {
        let (slot, _) = &*self.0;
        slot.lock().map_or(true, |slot| slot.is_some())
    }

    /// Block until the first fetch attempt completes and return the latest fetch outcome.
    ///
    /// Returns [`Error::Stopped`] if the poller was stopped before any fetch completed.
    pub fn wait(&self) -> Result<()> {
        let (slot, condvar) = &*self.0;
        let mut lock = slot.lock().map_err(|_| Error::BackgroundThreadPanicked)?;
        loop {
            match &*lock {
                Some(result) => return result.clone(),
                None => {
                    // Block waiting for the first fetch to complete.
                    lock = condvar
                        .wait(lock)
                        .map_err(|_| Error::BackgroundThreadPanicked)?;
                }
            }
        }
    }
}

/// A catalog poller thread.
///
/// Fetches immediately on start, then every `interval`. A failed fetch leaves the current catalog
/// in place and is retried on the next tick. Once stopped, it never replaces the catalog again.
pub(crate) struct PollerThread {
    thread: BackgroundThread,
    status: FetchStatus,
}

impl PollerThread {
    pub fn start(
        mut fetcher: impl Fetcher,
        store: Arc<ConfigurationStore>,
        config: PollerThreadConfig,
        diagnostics: Arc<dyn DiagnosticHook + Send + Sync>,
    ) -> std::io::Result<PollerThread> {
        let status = FetchStatus::new();

        let thread = {
            let status = status.clone();
            BackgroundThread::spawn("molasses-poller", move |stop| {
                let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| loop {
                    let fetched = fetcher.fetch_catalog();

                    // A stop command may have arrived while the request was in flight.
                    if stop.is_stopped() {
                        log::debug!(target: "molasses", "poller thread received stop command");
                        return;
                    }

                    match fetched {
                        Ok(catalog) => {
                            store.set_catalog(catalog);
                            status.update(Ok(()), false);
                        }
                        Err(err) => {
                            log::warn!(target: "molasses", "error while fetching feature catalog, keeping the last one: {}", err);
                            diagnostics.on_error(&err);
                            status.update(Err(err), false);
                        }
                    }

                    if stop.wait(jitter(config.interval, config.jitter)) {
                        log::debug!(target: "molasses", "poller thread received stop command");
                        return;
                    }
                }));

                match result {
                    Ok(()) => status.update(Err(Error::Stopped), true),
                    Err(_panic) => status.update(Err(Error::BackgroundThreadPanicked), false),
                }
            })?
        };

        Ok(PollerThread { thread, status })
    }

    pub fn status(&self) -> FetchStatus {
        self.status.clone()
    }

    /// Stop polling and wait up to `timeout` for the thread to exit.
    pub fn shutdown(self, timeout: Duration) -> Result<()> {
        self.thread.shutdown(timeout)
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
