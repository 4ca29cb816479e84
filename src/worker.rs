//! Configuration file consumed by the worker process
//!
//! The worker reads a JSON document via `-c <path>`; the field names and
//! nesting here must match its schema exactly (`streamSettings`,
//! `destOverride`, `metadataOnly` are camelCase on the wire).

use crate::config::WorkerSettings;
use crate::error::LaunchError;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::info;

/// Top-level worker configuration
#[derive(Debug, Clone, Serialize)]
pub struct WorkerConfig {
    pub log: LogSection,
    pub inbounds: Vec<Inbound>,
    pub dns: DnsSection,
    pub outbounds: Vec<Outbound>,
}

/// Worker logging is fully discarded
#[derive(Debug, Clone, Serialize)]
pub struct LogSection {
    pub access: String,
    pub error: String,
    pub loglevel: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbound {
    pub port: u16,
    pub listen: String,
    pub protocol: String,
    pub settings: InboundSettings,
    pub stream_settings: StreamSettings,
    pub sniffing: Sniffing,
}

#[derive(Debug, Clone, Serialize)]
pub struct InboundSettings {
    pub auth: String,
    pub accounts: Vec<Account>,
    pub udp: bool,
    pub ip: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub user: String,
    pub pass: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StreamSettings {
    pub network: String,
    pub security: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Sniffing {
    pub enabled: bool,
    pub dest_override: Vec<String>,
    pub metadata_only: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct DnsSection {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Outbound {
    pub protocol: String,
    pub tag: String,
}

impl WorkerConfig {
    /// Build the standard configuration: one authenticated SOCKS inbound on
    /// all interfaces, UDP allowed, sniffing on, direct routing with a
    /// blackhole outbound available for blocking.
    pub fn socks5(settings: &WorkerSettings) -> Self {
        Self {
            log: LogSection {
                access: "/dev/null".to_string(),
                error: "/dev/null".to_string(),
                loglevel: "none".to_string(),
            },
            inbounds: vec![Inbound {
                port: settings.port,
                listen: "0.0.0.0".to_string(),
                protocol: "socks".to_string(),
                settings: InboundSettings {
                    auth: "password".to_string(),
                    accounts: vec![Account {
                        user: settings.user.clone(),
                        pass: settings.pass.clone(),
                    }],
                    udp: true,
                    ip: "127.0.0.1".to_string(),
                },
                stream_settings: StreamSettings {
                    network: "tcp".to_string(),
                    security: "none".to_string(),
                },
                sniffing: Sniffing {
                    enabled: true,
                    dest_override: vec![
                        "http".to_string(),
                        "tls".to_string(),
                        "quic".to_string(),
                    ],
                    metadata_only: false,
                },
            }],
            dns: DnsSection {
                servers: vec!["https+local://8.8.8.8/dns-query".to_string()],
            },
            outbounds: vec![
                Outbound {
                    protocol: "freedom".to_string(),
                    tag: "direct".to_string(),
                },
                Outbound {
                    protocol: "blackhole".to_string(),
                    tag: "block".to_string(),
                },
            ],
        }
    }

    /// Atomically write the configuration as pretty JSON at `path`.
    ///
    /// Serializes into a temp file in the same directory and renames it into
    /// place, so the worker can never observe a half-written file.
    pub fn write(&self, path: &Path) -> Result<(), LaunchError> {
        let write_err = |reason: String| LaunchError::ConfigWrite {
            path: path.to_path_buf(),
            reason,
        };

        let json = serde_json::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = NamedTempFile::new_in(dir.unwrap_or_else(|| Path::new(".")))
            .map_err(|e| write_err(e.to_string()))?;
        tmp.write_all(json.as_bytes())
            .map_err(|e| write_err(e.to_string()))?;
        tmp.persist(path).map_err(|e| write_err(e.to_string()))?;

        info!(path = %path.display(), "Worker configuration written");
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
    fn test_json_matches_worker_schema() {
        let config = WorkerConfig::socks5(&settings());
        let value: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();

        assert_eq!(value["log"]["loglevel"], "none");
        assert_eq!(value["log"]["access"], "/dev/null");

        let inbound = &value["inbounds"][0];
        assert_eq!(inbound["port"], 25658);
        assert_eq!(inbound["listen"], "0.0.0.0");
        assert_eq!(inbound["protocol"], "socks");
        assert_eq!(inbound["settings"]["auth"], "password");
        assert_eq!(inbound["settings"]["accounts"][0]["user"], "u");
        assert_eq!(inbound["settings"]["accounts"][0]["pass"], "p");
        assert_eq!(inbound["settings"]["udp"], true);
        assert_eq!(inbound["settings"]["ip"], "127.0.0.1");

        // camelCase wire names the worker expects
        assert_eq!(inbound["streamSettings"]["network"], "tcp");
        assert_eq!(inbound["streamSettings"]["security"], "none");
        assert_eq!(inbound["sniffing"]["enabled"], true);
        assert_eq!(
            inbound["sniffing"]["destOverride"],
            serde_json::json!(["http", "tls", "quic"])
        );
        assert_eq!(inbound["sniffing"]["metadataOnly"], false);

        assert_eq!(
            value["dns"]["servers"],
            serde_json::json!(["https+local://8.8.8.8/dns-query"])
        );
        assert_eq!(value["outbounds"][0]["protocol"], "freedom");
        assert_eq!(value["outbounds"][0]["tag"], "direct");
        assert_eq!(value["outbounds"][1]["protocol"], "blackhole");
        assert_eq!(value["outbounds"][1]["tag"], "block");
    }

    #[test]
    fn test_write_persists_parseable_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        WorkerConfig::socks5(&settings()).write(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["inbounds"][0]["port"], 25658);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "stale contents").unwrap();

        WorkerConfig::socks5(&settings()).write(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with('{'), "stale file not replaced: {raw}");
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("config.json");

        let err = WorkerConfig::socks5(&settings()).write(&path).unwrap_err();
        assert!(matches!(err, LaunchError::ConfigWrite { .. }), "{err}");
        assert!(err.is_fatal());
    }
}
