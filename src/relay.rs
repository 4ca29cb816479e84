//! Aggregator upload and keepalive registration
//!
//! Both are single-shot, best-effort POSTs: the run's outcome never depends
//! on an external service accepting them.

use crate::config::Config;
use crate::error::LaunchError;
use crate::identity::ConnectionDescriptor;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Timeout for each relay/keepalive POST
const RELAY_TIMEOUT: Duration = Duration::from_secs(10);

/// Fixed endpoint of the external keepalive service
const KEEPALIVE_URL: &str = "https://oooo.serv00.net/add-url";

#[derive(Debug, Serialize)]
struct SubscriptionUpload {
    subscription: Vec<String>,
}

#[derive(Debug, Serialize)]
struct NodeUpload {
    nodes: Vec<String>,
}

#[derive(Debug, Serialize)]
struct KeepaliveRequest {
    url: String,
}

/// Forwards this instance's identity to the configured aggregator.
///
/// When a project URL is configured the aggregator receives a pointer to the
/// local subscription route; otherwise it receives the raw connection link.
/// Exactly one POST is sent per run, or none at all without an aggregator.
pub struct UploadRelay {
    client: reqwest::Client,
    upload_url: Option<String>,
    project_url: Option<String>,
    sub_path: String,
}

impl UploadRelay {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            upload_url: config.upload_url.clone(),
            project_url: config.project_url.clone(),
            sub_path: config.sub_path.clone(),
        }
    }

    /// Send at most one POST describing this instance
    pub async fn upload(&self, descriptor: &ConnectionDescriptor) -> Result<(), LaunchError> {
        let Some(upload_url) = &self.upload_url else {
            debug!("No aggregator configured, skipping upload");
            return Ok(());
        };

        if let Some(project_url) = &self.project_url {
            let url = format!("{}/api/add-subscriptions", upload_url.trim_end_matches('/'));
            let subscription_url = format!(
                "{}/{}",
                project_url.trim_end_matches('/'),
                self.sub_path.trim_start_matches('/')
            );
            let body = SubscriptionUpload {
                subscription: vec![subscription_url],
            };
            self.post(&url, &body).await?;
            info!("Subscription uploaded to aggregator");
        } else {
            let url = format!("{}/api/add-nodes", upload_url.trim_end_matches('/'));
            let body = NodeUpload {
                nodes: vec![descriptor.as_str().to_string()],
            };
            self.post(&url, &body).await?;
            info!("Node uploaded to aggregator");
        }

        Ok(())
    }

    async fn post<T: Serialize>(&self, url: &str, body: &T) -> Result<(), LaunchError> {
        let relay_err = |reason: String| LaunchError::Relay {
            url: url.to_string(),
            reason,
        };

        let response = self
            .client
            .post(url)
            .timeout(RELAY_TIMEOUT)
            .json(body)
            .send()
            .await
            .map_err(|e| relay_err(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST {
            // The aggregator answers 400 when this entry is already registered
            debug!(url, "Aggregator reported duplicate registration");
            return Ok(());
        }
        if !status.is_success() {
            return Err(relay_err(format!("HTTP status {status}")));
        }

        Ok(())
    }
}

/// Registers the project URL with the external keepalive service.
///
/// Fires once, only when both the auto-access flag and the project URL are
/// configured; anything missing is a silent no-op.
pub struct KeepalivePinger {
    client: reqwest::Client,
    endpoint: String,
    auto_access: bool,
    project_url: Option<String>,
}

impl KeepalivePinger {
    pub fn new(client: reqwest::Client, config: &Config) -> Self {
        Self {
            client,
            endpoint: KEEPALIVE_URL.to_string(),
            auto_access: config.auto_access,
            project_url: config.project_url.clone(),
        }
    }

    /// Override the keepalive endpoint (tests point this at a local mock)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Fire the keepalive registration once
    pub async fn ping(&self) -> Result<(), LaunchError> {
        if !self.auto_access {
            debug!("Auto access disabled, skipping keepalive registration");
            return Ok(());
        }
        let Some(project_url) = &self.project_url else {
            debug!("No project URL configured, skipping keepalive registration");
            return Ok(());
        };

        let keepalive_err = |reason: String| LaunchError::Keepalive {
            url: self.endpoint.clone(),
            reason,
        };

        let body = KeepaliveRequest {
            url: project_url.clone(),
        };
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(RELAY_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| keepalive_err(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(keepalive_err(format!("HTTP status {status}")));
        }

        info!("Keepalive registration added");
        Ok(())
    }
}
