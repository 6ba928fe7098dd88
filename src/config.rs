use std::{sync::Arc, time::Duration};

use reqwest::Url;

use crate::{diagnostics::NoopDiagnosticHook, Client, DiagnosticHook, Error, Result};

/// Configuration for [`Client`].
///
/// ```
/// # use std::time::Duration;
/// # use molasses::ClientConfig;
/// let config = ClientConfig::from_api_key("api-key")
///     .poll_interval(Duration::from_secs(30))
///     .send_events(false);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) base_url: String,
    pub(crate) http_client: Option<reqwest::blocking::Client>,
    pub(crate) send_events: bool,
    pub(crate) poll_interval: Duration,
    pub(crate) poll_jitter: Duration,
    pub(crate) wait_for_initial_fetch: bool,
    pub(crate) request_timeout: Duration,
    pub(crate) event_queue_capacity: usize,
    pub(crate) event_flush_interval: Duration,
    pub(crate) event_batch_size: usize,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) diagnostics: Arc<dyn DiagnosticHook + Send + Sync>,
}

impl ClientConfig {
    /// Default base URL for API calls.
    pub const DEFAULT_BASE_URL: &'static str = "https://sdk.molasses.app/v1";
    /// Default interval between feature catalog fetches.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);
    /// Default random jitter subtracted from the poll interval.
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(1);
    /// Default timeout for each HTTP request.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
    /// Default maximum number of queued events.
    pub const DEFAULT_EVENT_QUEUE_CAPACITY: usize = 1_000;
    /// Default interval between event flushes.
    pub const DEFAULT_EVENT_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
    /// Default maximum number of events per request.
    pub const DEFAULT_EVENT_BATCH_SIZE: usize = 100;
    /// Default wait for each background thread on stop.
    pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

    /// Create a default configuration using the specified API key.
    pub fn from_api_key(api_key: impl Into<String>) -> Self {
        ClientConfig {
            api_key: api_key.into(),
            base_url: ClientConfig::DEFAULT_BASE_URL.to_owned(),
            http_client: None,
            send_events: true,
            poll_interval: ClientConfig::DEFAULT_POLL_INTERVAL,
            poll_jitter: ClientConfig::DEFAULT_POLL_JITTER,
            wait_for_initial_fetch: true,
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            event_queue_capacity: ClientConfig::DEFAULT_EVENT_QUEUE_CAPACITY,
            event_flush_interval: ClientConfig::DEFAULT_EVENT_FLUSH_INTERVAL,
            event_batch_size: ClientConfig::DEFAULT_EVENT_BATCH_SIZE,
            shutdown_timeout: ClientConfig::DEFAULT_SHUTDOWN_TIMEOUT,
            diagnostics: Arc::new(NoopDiagnosticHook),
        }
    }

    /// Override base URL for API calls. Clients should use the default setting in most cases.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use a custom HTTP client, e.g. to configure proxies or TLS.
    pub fn http_client(mut self, http_client: reqwest::blocking::Client) -> Self {
        self.http_client = Some(http_client);
        self
    }

    /// Whether to send evaluation and experiment success events. Enabled by default.
    pub fn send_events(mut self, send_events: bool) -> Self {
        self.send_events = send_events;
        self
    }

    /// Interval between feature catalog fetches.
    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Randomized duration subtracted from each poll interval. Helps to avoid many processes
    /// polling in lockstep.
    pub fn poll_jitter(mut self, poll_jitter: Duration) -> Self {
        self.poll_jitter = poll_jitter;
        self
    }

    /// Whether [`Client::init`] blocks until the first fetch attempt completes. Enabled by
    /// default. When disabled, use [`Client::wait_for_initial_fetch`] to wait later.
    pub fn wait_for_initial_fetch(mut self, wait: bool) -> Self {
        self.wait_for_initial_fetch = wait;
        self
    }

    /// Timeout applied to every HTTP request.
    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    /// Maximum number of events waiting to be sent. Events recorded while the queue is full are
    /// dropped.
    pub fn event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Interval between event flushes.
    pub fn event_flush_interval(mut self, flush_interval: Duration) -> Self {
        self.event_flush_interval = flush_interval;
        self
    }

    /// Maximum number of events per request. Clamped to `1..=10_000`.
    pub fn event_batch_size(mut self, batch_size: usize) -> Self {
        self.event_batch_size = batch_size;
        self
    }

    /// How long [`Client::stop`] waits for each background thread, including the final event
    /// flush.
    pub fn shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Receive background errors (failed fetches and event deliveries).
    pub fn diagnostics(mut self, hook: impl DiagnosticHook + Send + Sync + 'static) -> Self {
        self.diagnostics = Arc::new(hook);
        self
    }

    /// Create and start a new [`Client`] using this configuration.
    ///
    /// ```no_run
    /// # use molasses::ClientConfig;
    /// let client = ClientConfig::from_api_key("api-key").init().unwrap();
    /// ```
    pub fn init(self) -> Result<Client> {
        Client::init(self)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(Error::MissingApiKey);
        }
        self.endpoint("")?;
        Ok(())
    }

    pub(crate) fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}{}", self.base_url.trim_end_matches('/'), path))
            .map_err(Error::InvalidBaseUrl)
    }

    pub(crate) fn build_http_client(&self) -> reqwest::blocking::Client {
        self.http_client
            .clone()
            .unwrap_or_else(reqwest::blocking::Client::new)
    }
}
