use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::Utc;

use crate::{
    configuration_fetcher::{ConfigurationFetcher, ConfigurationFetcherConfig, FEATURES_ENDPOINT},
    configuration_store::ConfigurationStore,
    event_dispatcher::{
        EventDispatcher, EventDispatcherConfig, EventRecorder, HttpEventCollector,
        ANALYTICS_ENDPOINT,
    },
    events::{EvaluationEvent, ExperimentSuccessEvent},
    poller::{FetchStatus, PollerThread, PollerThreadConfig},
    ClientConfig, EventStats, FeatureCatalog, Result, User,
};

/// A client for the Molasses API.
///
/// The client keeps a local copy of the feature catalog that a background thread refreshes
/// periodically, so evaluation never waits on the network. Evaluation and experiment success
/// events are queued and sent in the background.
///
/// Multiple clients are fully independent of each other.
///
/// ```no_run
/// # use molasses::{ClientConfig, User};
/// let client = ClientConfig::from_api_key("api-key").init().unwrap();
///
/// let user = User::new("user-1").with_param("plan", "pro");
/// if client.is_active("NEW_CHECKOUT", Some(&user)) {
///     // ...
/// }
///
/// client.stop();
/// ```
pub struct Client {
    store: Arc<ConfigurationStore>,
    fetch_status: FetchStatus,
    poller: Mutex<Option<PollerThread>>,
    dispatcher: Mutex<Option<EventDispatcher>>,
    /// `None` if sending events is disabled.
    recorder: Option<EventRecorder>,
    stopped: AtomicBool,
    shutdown_timeout: Duration,
}

impl Client {
    /// Validate `config`, then start the poller thread and, if enabled, the event dispatcher.
    ///
    /// Unless [`ClientConfig::wait_for_initial_fetch`] is disabled, this blocks until the first
    /// fetch attempt completes. A failed first fetch is not an error: features evaluate as
    /// inactive until a later fetch succeeds.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingApiKey`][crate::Error::MissingApiKey] if the API key is empty.
    /// - [`Error::InvalidBaseUrl`][crate::Error::InvalidBaseUrl] if the base URL cannot be parsed.
    /// - [`Error::Io`][crate::Error::Io] if a background thread cannot be spawned.
    pub fn init(config: ClientConfig) -> Result<Client> {
        config.validate()?;

        let http_client = config.build_http_client();
        let store = Arc::new(ConfigurationStore::new());

        let dispatcher = if config.send_events {
            let collector = HttpEventCollector {
                client: http_client.clone(),
                url: config.endpoint(ANALYTICS_ENDPOINT)?,
                api_key: config.api_key.clone(),
                request_timeout: config.request_timeout,
            };
            Some(EventDispatcher::start(
                collector,
                EventDispatcherConfig {
                    capacity: config.event_queue_capacity,
                    flush_interval: config.event_flush_interval,
                    batch_size: config.event_batch_size,
                    final_flush_timeout: config.shutdown_timeout,
                },
                config.diagnostics.clone(),
            )?)
        } else {
            None
        };

        let fetcher = ConfigurationFetcher::new(ConfigurationFetcherConfig {
            url: config.endpoint(FEATURES_ENDPOINT)?,
            api_key: config.api_key.clone(),
            http_client,
            request_timeout: config.request_timeout,
        });
        let poller = PollerThread::start(
            fetcher,
            store.clone(),
            PollerThreadConfig {
                interval: config.poll_interval,
                jitter: config.poll_jitter,
            },
            config.diagnostics.clone(),
        )?;

        let client = Client {
            store,
            fetch_status: poller.status(),
            recorder: dispatcher.as_ref().map(EventDispatcher::recorder),
            poller: Mutex::new(Some(poller)),
            dispatcher: Mutex::new(dispatcher),
            stopped: AtomicBool::new(false),
            shutdown_timeout: config.shutdown_timeout,
        };

        if config.wait_for_initial_fetch {
            if let Err(err) = client.wait_for_initial_fetch() {
                log::warn!(target: "molasses", "initial feature fetch failed, features are inactive until a fetch succeeds: {}", err);
            }
        }

        Ok(client)
    }

    #[cfg(test)]
    fn new_with_configuration_store(
        store: Arc<ConfigurationStore>,
        dispatcher: Option<EventDispatcher>,
    ) -> Self {
        Client {
            store,
            fetch_status: FetchStatus::new(),
            recorder: dispatcher.as_ref().map(EventDispatcher::recorder),
            poller: Mutex::new(None),
            dispatcher: Mutex::new(dispatcher),
            stopped: AtomicBool::new(false),
            shutdown_timeout: ClientConfig::DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Returns `true` once the first fetch attempt has completed and until the client is stopped.
    pub fn is_initiated(&self) -> bool {
        !self.stopped.load(Ordering::Acquire) && self.fetch_status.has_fetched()
    }

    /// Block until the first fetch attempt completes, returning the latest fetch outcome.
    ///
    /// Only needed when [`ClientConfig::wait_for_initial_fetch`] is disabled.
    pub fn wait_for_initial_fetch(&self) -> Result<()> {
        self.fetch_status.wait()
    }

    /// Decide whether `feature_key` is active for `user`.
    ///
    /// Without a user, evaluates for an anonymous user: only segments without user constraints
    /// can match, and percentage rollouts always admit it. Unknown features, and all features
    /// before the first successful fetch, are inactive.
    pub fn is_active(&self, feature_key: &str, user: Option<&User>) -> bool {
        let anonymous;
        let user = match user {
            Some(user) => user,
            None => {
                anonymous = User::anonymous();
                &anonymous
            }
        };

        let Some(catalog) = self.store.get_catalog() else {
            log::warn!(target: "molasses", feature_key; "evaluating a feature before the feature catalog has been fetched");
            return false;
        };

        let active = catalog.is_active(feature_key, user);
        log::trace!(target: "molasses",
                    feature_key,
                    user_id:display = user.id,
                    active;
                    "evaluated a feature");

        if let Some(recorder) = &self.recorder {
            recorder.record(EvaluationEvent {
                feature_id: feature_id(&catalog, feature_key),
                feature_key: feature_key.to_owned(),
                user_id: user.id.clone(),
                active,
                tags: user.params.clone(),
                timestamp: Utc::now(),
            });
        }

        active
    }

    /// Record that `user` reached the goal of the experiment behind `feature_key`.
    ///
    /// This is a measurement signal only and does not affect evaluation. `metadata` is sent along
    /// with the user params.
    pub fn experiment_success(
        &self,
        feature_key: &str,
        user: &User,
        metadata: HashMap<String, String>,
    ) {
        let Some(recorder) = &self.recorder else {
            return;
        };

        let catalog = self.store.get_catalog();
        let (feature_id, active) = match &catalog {
            Some(catalog) => (
                feature_id(catalog, feature_key),
                catalog.is_active(feature_key, user),
            ),
            None => (String::new(), false),
        };

        let mut tags = user.params.clone();
        tags.extend(metadata);

        recorder.record(ExperimentSuccessEvent {
            feature_id,
            feature_key: feature_key.to_owned(),
            user_id: user.id.clone(),
            active,
            tags,
            timestamp: Utc::now(),
        });
    }

    /// Current feature catalog, if one has been fetched.
    pub fn catalog(&self) -> Option<Arc<FeatureCatalog>> {
        self.store.get_catalog()
    }

    /// Event delivery counters. All zero if sending events is disabled.
    pub fn event_stats(&self) -> EventStats {
        self.recorder
            .as_ref()
            .map(EventRecorder::stats)
            .unwrap_or_default()
    }

    /// Stop polling, flush pending events, and wait for the background threads to exit.
    ///
    /// Safe to call multiple times and concurrently with evaluation, which keeps using the last
    /// fetched catalog. Each background thread is awaited for at most the configured shutdown
    /// timeout.
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!(target: "molasses", "stopping client");

        let poller = self.poller.lock().ok().and_then(|mut poller| poller.take());
        if let Some(poller) = poller {
            if let Err(err) = poller.shutdown(self.shutdown_timeout) {
                log::warn!(target: "molasses", "error while stopping poller thread: {}", err);
            }
        }

        let dispatcher = self
            .dispatcher
            .lock()
            .ok()
            .and_then(|mut dispatcher| dispatcher.take());
        if let Some(dispatcher) = dispatcher {
            if let Err(err) = dispatcher.shutdown(self.shutdown_timeout) {
                log::warn!(target: "molasses", "error while stopping event dispatcher: {}", err);
            }
        }
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop();
    }
}

fn feature_id(catalog: &FeatureCatalog, feature_key: &str) -> String {
    catalog
        .get_feature(feature_key)
        .map(|feature| feature.id.clone())
        .unwrap_or_default()
}
