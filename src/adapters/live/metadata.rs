//! Live metadata providers over HTTP.

use std::time::Duration;

use reqwest::{header, Client, Response};
use serde_json::Value;

use crate::config::Settings;
use crate::ports::{LookupFuture, MetadataProvider};
use crate::projection::ProviderKind;

/// Calls one provider's HTTP API.
///
/// Each attempt, body included, is bounded by the configured timeout.
/// Timeouts are retried after a fixed delay, whether they hit while
/// connecting or while reading the body; when every attempt times out the
/// lookup yields `None`. Any other transport failure is an error.
pub struct HttpMetadataProvider {
    kind: ProviderKind,
    client: Client,
    url: String,
    user_agent: Option<String>,
    timeout: Duration,
    attempts: u32,
    retry_delay: Duration,
}

impl HttpMetadataProvider {
    /// Creates the provider for `kind` from the settings.
    #[must_use]
    pub fn new(kind: ProviderKind, settings: &Settings) -> Self {
        let network = &settings.network;
        Self {
            kind,
            client: Client::new(),
            url: settings.providers.rules(kind).url.clone(),
            user_agent: settings.providers.polite.as_ref().map(|p| p.user_agent()),
            timeout: Duration::from_secs(network.timeout_secs),
            attempts: network.retries.max(1),
            retry_delay: Duration::from_secs(network.retry_delay_secs),
        }
    }

    /// One provider per [`ProviderKind`].
    #[must_use]
    pub fn all(settings: &Settings) -> Vec<Box<dyn MetadataProvider>> {
        ProviderKind::ALL
            .into_iter()
            .map(|kind| Box::new(Self::new(kind, settings)) as Box<dyn MetadataProvider>)
            .collect()
    }

    /// Overrides the request URL prefix.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Overrides the per-attempt timeout, attempt count and retry delay.
    #[must_use]
    pub fn with_timing(mut self, timeout: Duration, attempts: u32, retry_delay: Duration) -> Self {
        self.timeout = timeout;
        self.attempts = attempts.max(1);
        self.retry_delay = retry_delay;
        self
    }

    async fn read(&self, response: Response, identifier: &str) -> reqwest::Result<Option<Value>> {
        let status = response.status();
        if !status.is_success() {
            tracing::info!(provider = %self.kind, identifier, status = status.as_u16(), "no match");
            return Ok(None);
        }
        let body: Value = response.json().await?;
        let accepted = self.kind.accept(body);
        if accepted.is_none() {
            tracing::info!(provider = %self.kind, identifier, "no single confident match");
        }
        Ok(accepted)
    }
}

impl MetadataProvider for HttpMetadataProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn lookup(&self, identifier: &str) -> LookupFuture<'_> {
        let identifier = identifier.trim().to_string();
        Box::pin(async move {
            if identifier.is_empty() {
                tracing::debug!(provider = %self.kind, "empty identifier, skipping");
                return Ok(None);
            }
            let url = format!("{}{identifier}", self.url);
            for attempt in 1..=self.attempts {
                tracing::debug!(provider = %self.kind, identifier = %identifier, attempt, "requesting");
                let mut request = self.client.get(&url).timeout(self.timeout);
                if let Some(agent) = &self.user_agent {
                    request = request.header(header::USER_AGENT, agent);
                }
                let outcome = match request.send().await {
                    Ok(response) => self.read(response, &identifier).await,
                    Err(err) => Err(err),
                };
                match outcome {
                    Ok(found) => return Ok(found),
                    Err(err) if err.is_timeout() => {
                        if attempt < self.attempts {
                            tracing::debug!(provider = %self.kind, identifier = %identifier, delay = ?self.retry_delay, "timed out, retrying");
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                    Err(err) if err.is_decode() => {
                        return Err(format!("{} returned an unreadable response: {err}", self.kind).into());
                    }
                    Err(err) => return Err(format!("{} request failed: {err}", self.kind).into()),
                }
            }
            tracing::warn!(provider = %self.kind, identifier = %identifier, attempts = self.attempts, "timed out, moving on");
            Ok(None)
        })
    }
}
