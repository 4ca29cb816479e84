use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

/// Runtime settings for one launcher run.
///
/// Everything is sourced from the environment with a default per variable,
/// so the binary runs unconfigured. Unparsable numeric values fall back to
/// the default with a warning rather than aborting; the HTTP front must come
/// up regardless of how broken the environment is.
#[derive(Debug, Clone)]
pub struct Config {
    /// Aggregator base URL; uploads are skipped entirely when unset
    pub upload_url: Option<String>,

    /// Base URL assigned to this deployment; combined with the subscription
    /// segment to build the pointer sent to the aggregator
    pub project_url: Option<String>,

    /// Register the project URL with the external keepalive service
    pub auto_access: bool,

    /// Working directory holding the fetched binary and its files
    pub work_dir: PathBuf,

    /// Path segment the subscription is served under
    pub sub_path: String,

    /// HTTP listen port for the subscription server
    pub http_port: u16,

    /// Settings passed through to the worker process
    pub worker: WorkerSettings,
}

/// Listen and authentication settings for the worker process
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// SOCKS listen port
    pub port: u16,

    /// Authentication username
    pub user: String,

    /// Authentication password
    pub pass: String,

    /// Display name prefixed to the node label
    pub name: String,
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./tmp")
}

fn default_sub_path() -> String {
    "ccc".to_string()
}

fn default_http_port() -> u16 {
    3000
}

fn default_worker_port() -> u16 {
    25658
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            port: default_worker_port(),
            user: "ddckuser".to_string(),
            pass: "ddckpass".to_string(),
            name: "DDCK".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upload_url: None,
            project_url: None,
            auto_access: false,
            work_dir: default_work_dir(),
            sub_path: default_sub_path(),
            http_port: default_http_port(),
            worker: WorkerSettings::default(),
        }
    }
}

impl Config {
    /// Load settings from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();
        let worker_defaults = WorkerSettings::default();

        // SERVER_PORT takes precedence over the platform-provided PORT
        let http_port = lookup("SERVER_PORT")
            .or_else(|| lookup("PORT"))
            .map(|v| parse_port("SERVER_PORT", &v, defaults.http_port))
            .unwrap_or(defaults.http_port);

        let worker_port = lookup("DDCK_PORT")
            .map(|v| parse_port("DDCK_PORT", &v, worker_defaults.port))
            .unwrap_or(worker_defaults.port);

        Self {
            upload_url: lookup("UPLOAD_URL").filter(|v| !v.is_empty()),
            project_url: lookup("PROJECT_URL").filter(|v| !v.is_empty()),
            auto_access: lookup("AUTO_ACCESS")
                .map(|v| parse_truthy(&v))
                .unwrap_or(false),
            work_dir: lookup("FILE_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            sub_path: lookup("SUB_PATH")
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.sub_path),
            http_port,
            worker: WorkerSettings {
                port: worker_port,
                user: lookup("DDCK_USER")
                    .filter(|v| !v.is_empty())
                    .unwrap_or(worker_defaults.user),
                pass: lookup("DDCK_PASS")
                    .filter(|v| !v.is_empty())
                    .unwrap_or(worker_defaults.pass),
                name: lookup("NAME")
                    .filter(|v| !v.is_empty())
                    .unwrap_or(worker_defaults.name),
            },
        }
    }

    /// Load settings from a map (test helper)
    pub fn from_map(vars: &HashMap<String, String>) -> Self {
        Self::from_lookup(|key| vars.get(key).cloned())
    }

    /// Path of the fetched worker binary
    pub fn binary_path(&self) -> PathBuf {
        self.work_dir.join("web")
    }

    /// Path of the worker configuration file
    pub fn worker_config_path(&self) -> PathBuf {
        self.work_dir.join("config.json")
    }

    /// Path of the persisted encoded connection descriptor
    pub fn sub_file_path(&self) -> PathBuf {
        self.work_dir.join("sub.txt")
    }

    /// Reserved path next to the subscription file; nothing writes it today
    pub fn list_file_path(&self) -> PathBuf {
        self.work_dir.join("list.txt")
    }

    /// The HTTP route the subscription is served under, e.g. `/ccc`
    pub fn subscription_route(&self) -> String {
        format!("/{}", self.sub_path.trim_start_matches('/'))
    }
}

fn parse_port(key: &str, value: &str, fallback: u16) -> u16 {
    match value.trim().parse::<u16>() {
        Ok(port) if port > 0 => port,
        _ => {
            warn!(key, value, fallback, "Ignoring unparsable port value");
            fallback
        }
    }
}

/// Flag parsing for `AUTO_ACCESS`: `1`, `true`, `yes`, `on` (any case) enable it
fn parse_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_map(&vars)
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = config_from(&[]);

        assert_eq!(config.upload_url, None);
        assert_eq!(config.project_url, None);
        assert!(!config.auto_access);
        assert_eq!(config.work_dir, PathBuf::from("./tmp"));
        assert_eq!(config.sub_path, "ccc");
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.worker.port, 25658);
        assert_eq!(config.worker.user, "ddckuser");
        assert_eq!(config.worker.pass, "ddckpass");
        assert_eq!(config.worker.name, "DDCK");
    }

    #[test]
    fn test_all_variables_override_defaults() {
        let config = config_from(&[
            ("UPLOAD_URL", "https://agg.example.com"),
            ("PROJECT_URL", "https://node.example.com"),
            ("AUTO_ACCESS", "true"),
            ("FILE_PATH", "/var/lib/subgate"),
            ("SUB_PATH", "secret-segment"),
            ("SERVER_PORT", "8080"),
            ("DDCK_PORT", "1080"),
            ("DDCK_USER", "alice"),
            ("DDCK_PASS", "hunter2"),
            ("NAME", "Edge"),
        ]);

        assert_eq!(config.upload_url.as_deref(), Some("https://agg.example.com"));
        assert_eq!(config.project_url.as_deref(), Some("https://node.example.com"));
        assert!(config.auto_access);
        assert_eq!(config.work_dir, PathBuf::from("/var/lib/subgate"));
        assert_eq!(config.sub_path, "secret-segment");
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.worker.port, 1080);
        assert_eq!(config.worker.user, "alice");
        assert_eq!(config.worker.pass, "hunter2");
        assert_eq!(config.worker.name, "Edge");
    }

    #[test]
    fn test_server_port_takes_precedence_over_port() {
        let config = config_from(&[("SERVER_PORT", "8080"), ("PORT", "9090")]);
        assert_eq!(config.http_port, 8080);

        let config = config_from(&[("PORT", "9090")]);
        assert_eq!(config.http_port, 9090);
    }

    #[test]
    fn test_empty_strings_are_treated_as_unset() {
        let config = config_from(&[
            ("UPLOAD_URL", ""),
            ("PROJECT_URL", ""),
            ("SUB_PATH", ""),
            ("DDCK_USER", ""),
        ]);

        assert_eq!(config.upload_url, None);
        assert_eq!(config.project_url, None);
        assert_eq!(config.sub_path, "ccc");
        assert_eq!(config.worker.user, "ddckuser");
    }

    #[test]
    fn test_unparsable_ports_fall_back() {
        let config = config_from(&[("SERVER_PORT", "not-a-port"), ("DDCK_PORT", "0")]);
        assert_eq!(config.http_port, 3000);
        assert_eq!(config.worker.port, 25658);
    }

    #[test]
    fn test_truthy_parsing() {
        for value in ["1", "true", "TRUE", "yes", "Yes", "on", " on "] {
            assert!(parse_truthy(value), "expected truthy: {value:?}");
        }
        for value in ["", "0", "false", "no", "off", "enabled", "2"] {
            assert!(!parse_truthy(value), "expected falsy: {value:?}");
        }
    }

    #[test]
    fn test_work_dir_file_layout() {
        let config = config_from(&[("FILE_PATH", "/data")]);

        assert_eq!(config.binary_path(), PathBuf::from("/data/web"));
        assert_eq!(config.worker_config_path(), PathBuf::from("/data/config.json"));
        assert_eq!(config.sub_file_path(), PathBuf::from("/data/sub.txt"));
        assert_eq!(config.list_file_path(), PathBuf::from("/data/list.txt"));
    }

    #[test]
    fn test_subscription_route_normalizes_leading_slash() {
        let config = config_from(&[("SUB_PATH", "ccc")]);
        assert_eq!(config.subscription_route(), "/ccc");

        let config = config_from(&[("SUB_PATH", "/nested")]);
        assert_eq!(config.subscription_route(), "/nested");
    }
}
