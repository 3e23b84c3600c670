use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{redirect, Client, Url};
use std::time::Duration;
use tracing::trace;

use super::ReadinessError;

/// Waits for a freshly started service to accept requests.
#[async_trait]
pub trait ReadinessWaiter: Send + Sync {
    async fn wait_ready(&self, url: &Url, deadline: Duration) -> Result<(), ReadinessError>;
}

/// Polls the URL with plain GETs at a fixed interval. Any HTTP response,
/// whatever its status, means the service is up.
#[derive(Debug, Clone)]
pub struct HttpReadinessWaiter {
    client: Client,
    poll_interval: Duration,
}

impl HttpReadinessWaiter {
    pub fn new(poll_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(Duration::from_secs(1))
            .timeout(Duration::from_secs(5))
            .build()
            .context("Failed to build readiness HTTP client")?;

        Ok(Self { client, poll_interval })
    }
}

#[async_trait]
impl ReadinessWaiter for HttpReadinessWaiter {
    async fn wait_ready(&self, url: &Url, deadline: Duration) -> Result<(), ReadinessError> {
        let mut attempts = 0u32;
        let mut last_error = None;

        let poll = async {
            loop {
                attempts += 1;
                match self.client.get(url.clone()).send().await {
                    Ok(response) => {
                        trace!("{} answered with {}", url, response.status());
                        return;
                    }
                    Err(e) => {
                        trace!("{} not ready yet: {}", url, e);
                        last_error = Some(e.to_string());
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
            }
        };

        let outcome = tokio::time::timeout(deadline, poll).await;
        match outcome {
            Ok(()) => Ok(()),
            Err(_) => Err(ReadinessError::Timeout {
                url: url.to_string(),
                deadline,
                attempts,
                last_error,
            }),
        }
    }
}
