//! An HTTP client that fetches the feature catalog from the server.
use std::time::Duration;

use reqwest::{StatusCode, Url};

use crate::{catalog::FeaturesResponse, Error, FeatureCatalog, Result};

pub(crate) const FEATURES_ENDPOINT: &str = "/get-features";

/// Source of feature catalogs for the poller.
pub(crate) trait Fetcher: Send + 'static {
    fn fetch_catalog(&mut self) -> Result<FeatureCatalog>;
}

pub(crate) struct ConfigurationFetcherConfig {
    pub url: Url,
    pub api_key: String,
    pub http_client: reqwest::blocking::Client,
    pub request_timeout: Duration,
}

/// A client that fetches the feature catalog from the server.
pub(crate) struct ConfigurationFetcher {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::blocking::Client,
    url: Url,
    api_key: String,
    request_timeout: Duration,
}

impl ConfigurationFetcher {
    pub fn new(config: ConfigurationFetcherConfig) -> ConfigurationFetcher {
        ConfigurationFetcher {
            client: config.http_client,
            url: config.url,
            api_key: config.api_key,
            request_timeout: config.request_timeout,
        }
    }
}

impl Fetcher for ConfigurationFetcher {
    fn fetch_catalog(&mut self) -> Result<FeatureCatalog> {
        log::debug!(target: "molasses", "fetching feature catalog");
        let response = self
            .client
            .get(self.url.clone())
            .bearer_auth(&self.api_key)
            .timeout(self.request_timeout)
            .send()?;

        let response = response.error_for_status().map_err(|err| {
            if matches!(
                err.status(),
                Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
            ) {
                log::warn!(target: "molasses", "client is not authorized. Check your API key");
                Error::Unauthorized
            } else {
                log::warn!(target: "molasses", "received non-200 response while fetching feature catalog: {:?}", err);
                Error::from(err)
            }
        })?;

        let body = response.bytes()?;
        let FeaturesResponse { data: catalog } = serde_json::from_slice(&body)?;

        log::debug!(target: "molasses",
                    environment:display = catalog.name(),
                    features = catalog.len();
                    "successfully fetched feature catalog");

        Ok(catalog)
    }
}
