//! Public identity discovery and the connection descriptor
//!
//! Both lookups are best effort with their own short timeouts; a run never
//! aborts because the outside world would not say who we are. Failures fall
//! back to loopback / `unknown-ISP`.

use crate::config::WorkerSettings;
use crate::error::LaunchError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Timeout for each identity lookup
const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Substituted when no public IP could be discovered
pub const FALLBACK_IP: &str = "127.0.0.1";

/// Substituted when no ISP label could be discovered
pub const FALLBACK_ISP: &str = "unknown-ISP";

/// Endpoints used to discover the host's public identity
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    /// Connection metadata endpoint (ISP and location)
    pub meta_url: String,
    /// Plain-text public IP endpoints, tried in order
    pub ip_urls: Vec<String>,
}

impl Default for IdentityResolver {
    fn default() -> Self {
        Self {
            meta_url: "https://speed.cloudflare.com/meta".to_string(),
            ip_urls: vec![
                "http://icanhazip.com".to_string(),
                "http://ifconfig.me".to_string(),
            ],
        }
    }
}

/// The subset of the metadata response we label nodes with
#[derive(Debug, Deserialize)]
struct MetaResponse {
    country: Option<String>,
    #[serde(rename = "asOrganization")]
    as_organization: Option<String>,
}

impl IdentityResolver {
    /// Discover the externally visible IP, trying each source in order
    pub async fn public_ip(&self, client: &reqwest::Client) -> String {
        for url in &self.ip_urls {
            match fetch_text(client, url).await {
                Ok(body) => {
                    let ip = body.trim();
                    if !ip.is_empty() {
                        return ip.to_string();
                    }
                    warn!(url, "Empty public IP response");
                }
                Err(e) => warn!(url, error = %e, "Public IP lookup failed"),
            }
        }
        warn!(fallback = FALLBACK_IP, "Using fallback public IP");
        FALLBACK_IP.to_string()
    }

    /// Discover the ISP/location label
    pub async fn isp_label(&self, client: &reqwest::Client) -> String {
        match self.fetch_meta(client).await {
            Ok(label) if !label.is_empty() => label,
            Ok(_) => {
                warn!(url = %self.meta_url, "Metadata response carried no usable label");
                FALLBACK_ISP.to_string()
            }
            Err(e) => {
                warn!(error = %e, "ISP lookup failed");
                FALLBACK_ISP.to_string()
            }
        }
    }

    async fn fetch_meta(&self, client: &reqwest::Client) -> Result<String, LaunchError> {
        let lookup_err = |reason: String| LaunchError::IdentityLookup {
            url: self.meta_url.clone(),
            reason,
        };

        let response = client
            .get(&self.meta_url)
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| lookup_err(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(lookup_err(format!("HTTP status {status}")));
        }
        let meta: MetaResponse = response.json().await.map_err(|e| lookup_err(e.to_string()))?;

        Ok(meta_label(&meta))
    }
}

async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, LaunchError> {
    let lookup_err = |reason: String| LaunchError::IdentityLookup {
        url: url.to_string(),
        reason,
    };

    let response = client
        .get(url)
        .timeout(LOOKUP_TIMEOUT)
        .send()
        .await
        .map_err(|e| lookup_err(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(lookup_err(format!("HTTP status {status}")));
    }
    response.text().await.map_err(|e| lookup_err(e.to_string()))
}

/// Join country and carrier into the node label, spaces flattened to
/// underscores so the label survives inside a URL fragment
fn meta_label(meta: &MetaResponse) -> String {
    let parts: Vec<&str> = [meta.country.as_deref(), meta.as_organization.as_deref()]
        .into_iter()
        .flatten()
        .filter(|p| !p.is_empty())
        .collect();
    parts.join("-").replace(' ', "_")
}

/// How a client reaches the running worker.
///
/// Immutable once composed; one descriptor per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    link: String,
}

impl ConnectionDescriptor {
    /// Compose `socks5://user:pass@ip:port#name-isp`
    pub fn socks5(settings: &WorkerSettings, ip: &str, isp: &str) -> Self {
        Self {
            link: format!(
                "socks5://{}:{}@{}:{}#{}-{}",
                settings.user, settings.pass, ip, settings.port, settings.name, isp
            ),
        }
    }

    /// The raw connection link
    pub fn as_str(&self) -> &str {
        &self.link
    }

    /// The base64 form served over the subscription route
    pub fn encoded(&self) -> String {
        BASE64.encode(self.link.as_bytes())
    }

    /// Write the encoded descriptor to `path`
    pub fn persist(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.encoded())?;
        info!(path = %path.display(), "Subscription file saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> WorkerSettings {
        WorkerSettings {
            port: 25658,
            user: "u".to_string(),
            pass: "p".to_string(),
            name: "Test".to_string(),
        }
    }

    #[test]
    fn test_descriptor_format() {
        let descriptor = ConnectionDescriptor::socks5(&settings(), "1.2.3.4", "X-Y");
        assert_eq!(descriptor.as_str(), "socks5://u:p@1.2.3.4:25658#Test-X-Y");
    }

    #[test]
    fn test_encoded_form_round_trips_to_the_exact_link() {
        let descriptor = ConnectionDescriptor::socks5(&settings(), "1.2.3.4", "X-Y");
        let decoded = BASE64.decode(descriptor.encoded()).unwrap();
        assert_eq!(decoded, b"socks5://u:p@1.2.3.4:25658#Test-X-Y");
    }

    #[test]
    fn test_descriptor_with_fallback_identity() {
        let descriptor = ConnectionDescriptor::socks5(&settings(), FALLBACK_IP, FALLBACK_ISP);
        assert_eq!(
            descriptor.as_str(),
            "socks5://u:p@127.0.0.1:25658#Test-unknown-ISP"
        );
    }

    #[test]
    fn test_persist_writes_the_encoded_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub.txt");
        let descriptor = ConnectionDescriptor::socks5(&settings(), "1.2.3.4", "X-Y");

        descriptor.persist(&path).unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), descriptor.encoded());
    }

    #[test]
    fn test_meta_label_joins_country_and_carrier() {
        let meta = MetaResponse {
            country: Some("US".to_string()),
            as_organization: Some("Acme Fiber Co".to_string()),
        };
        assert_eq!(meta_label(&meta), "US-Acme_Fiber_Co");
    }

    #[test]
    fn test_meta_label_tolerates_missing_fields() {
        let meta = MetaResponse {
            country: None,
            as_organization: Some("Acme".to_string()),
        };
        assert_eq!(meta_label(&meta), "Acme");

        let meta = MetaResponse {
            country: None,
            as_organization: None,
        };
        assert_eq!(meta_label(&meta), "");
    }
}
