//! Configuration Module
//!
//! Handles configuration loading from files, environment variables, and command-line arguments.
//! The resulting `Config` is built once at startup and shared read-only (`Arc<Config>`) with
//! every component; nothing re-initializes it at runtime.

use crate::{ProxyError, Result};
use clap::{Arg, ArgMatches, Command};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

/// Custom deserializer for Duration from string format like "30s", "5m", "250ms"
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("Empty duration string".to_string());
        }

        let num_end = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());

        if num_end == 0 {
            return Err(format!("No number found in duration string: {}", s));
        }

        let num_str = &s[..num_end];
        let unit = s[num_end..].trim();

        let value: f64 = num_str
            .parse()
            .map_err(|e| format!("Failed to parse number '{}': {}", num_str, e))?;

        let duration = match unit {
            "ms" | "millis" | "milliseconds" => Duration::from_secs_f64(value / 1000.0),
            "s" | "sec" | "secs" | "seconds" | "" => Duration::from_secs_f64(value),
            "m" | "min" | "mins" | "minutes" => Duration::from_secs_f64(value * 60.0),
            "h" | "hr" | "hrs" | "hours" => Duration::from_secs_f64(value * 3600.0),
            _ => return Err(format!("Unknown duration unit: {}", unit)),
        };

        Ok(duration)
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub origin: OriginConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub purge: PurgeConfig,
}

/// Inbound server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Smoothed event-loop lag above which the process reports itself busy
    #[serde(
        default = "default_busy_lag_threshold",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub busy_lag_threshold: Duration,
    #[serde(
        default = "default_lag_sample_interval",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub lag_sample_interval: Duration,
    #[serde(
        default = "default_shutdown_timeout",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub shutdown_timeout: Duration,
}

fn default_http_port() -> u16 {
    8080
}

fn default_busy_lag_threshold() -> Duration {
    Duration::from_millis(70)
}

fn default_lag_sample_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            busy_lag_threshold: default_busy_lag_threshold(),
            lag_sample_interval: default_lag_sample_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Upstream origin configuration
///
/// `routes` maps a path prefix to the origin base URL serving it. Requests whose
/// path matches no route go to `url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OriginConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub request_timeout: Duration,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            routes: BTreeMap::new(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// S3-compatible object store configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key_id: String,
    #[serde(default)]
    pub secret_access_key: String,
    /// Prepended to every stored key, e.g. "/v2"
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_acl")]
    pub acl: String,
    #[serde(default = "default_storage_class")]
    pub storage_class: String,
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub request_timeout: Duration,
}

fn default_store_endpoint() -> String {
    "http://s3.amazonaws.com".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_acl() -> String {
    "public-read".to_string()
}

fn default_storage_class() -> String {
    "REDUCED_REDUNDANCY".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_store_endpoint(),
            bucket: String::new(),
            region: default_region(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            key_prefix: None,
            acl: default_acl(),
            storage_class: default_storage_class(),
            request_timeout: default_request_timeout(),
        }
    }
}

// Credentials stay out of debug logs.
impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("key_prefix", &self.key_prefix)
            .field("acl", &self.acl)
            .field("storage_class", &self.storage_class)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Cacheability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache every 200 response regardless of its Cache-Control header
    #[serde(default)]
    pub cache_everything: bool,
    /// Cache-Control synthesized for forced caching when the origin sent none
    #[serde(default = "default_cache_control")]
    pub default_cache_control: String,
}

fn default_cache_control() -> String {
    crate::cache_policy::DEFAULT_CACHE_CONTROL.to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_everything: false,
            default_cache_control: default_cache_control(),
        }
    }
}

/// Outbound connection pool configuration, shared by the origin and store clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionPoolConfig {
    /// Upper bound on concurrent in-flight requests per client
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_max_idle_per_host")]
    pub max_idle_per_host: usize,
    #[serde(
        default = "default_idle_timeout",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub idle_timeout: Duration,
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub connect_timeout: Duration,
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_idle_per_host() -> usize {
    256
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(90)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            max_idle_per_host: default_max_idle_per_host(),
            idle_timeout: default_idle_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl ConnectionPoolConfig {
    /// Validate the configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be at least 1".to_string());
        }
        if self.max_idle_per_host > self.max_connections {
            return Err(format!(
                "max_idle_per_host ({}) cannot exceed max_connections ({})",
                self.max_idle_per_host, self.max_connections
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Application logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Directory for daily rolling log files; stdout only when unset
    #[serde(default)]
    pub app_log_dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            app_log_dir: None,
        }
    }
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    /// JSON metrics endpoint port; no endpoint when unset
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(
        default = "default_metrics_log_interval",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub log_interval: Duration,
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_log_interval() -> Duration {
    Duration::from_secs(60)
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: None,
            log_interval: default_metrics_log_interval(),
        }
    }
}

/// Purge job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurgeConfig {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(
        default = "default_progress_interval",
        deserialize_with = "duration_serde::deserialize"
    )]
    pub progress_interval: Duration,
}

fn default_page_size() -> usize {
    1000
}

fn default_progress_interval() -> Duration {
    Duration::from_secs(5)
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            prefix: None,
            page_size: default_page_size(),
            progress_interval: default_progress_interval(),
        }
    }
}

impl Config {
    /// Load configuration for the proxy server
    pub fn load() -> Result<Self> {
        let matches = Self::build_cli().get_matches();
        let config = Self::from_matches(&matches)?;
        config.validate_server()?;
        Ok(config)
    }

    /// Load configuration for the purge job
    pub fn load_purge() -> Result<Self> {
        let matches = Self::build_purge_cli().get_matches();
        let mut config = Self::from_matches(&matches)?;

        if let Some(prefix) = matches.get_one::<String>("prefix") {
            config.purge.prefix = Some(prefix.clone());
        }
        if let Some(page_size) = matches.get_one::<String>("page-size") {
            config.purge.page_size = page_size.parse().map_err(|e| {
                ProxyError::ConfigError(format!("Invalid --page-size '{}': {}", page_size, e))
            })?;
        }

        config.validate_store()?;
        if config.purge.page_size == 0 || config.purge.page_size > 1000 {
            return Err(ProxyError::ConfigError(format!(
                "purge page_size must be between 1 and 1000, got {}",
                config.purge.page_size
            )));
        }
        Ok(config)
    }

    /// Defaults, then file, then environment, then CLI flags
    fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        config.apply_env_overrides();
        config.apply_cli_overrides(matches);
        Ok(config)
    }

    fn common_args(command: Command) -> Command {
        command
            .version(env!("CARGO_PKG_VERSION"))
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path (YAML)"),
            )
            .arg(
                Arg::new("bucket")
                    .long("bucket")
                    .value_name("NAME")
                    .help("S3 bucket holding cached objects"),
            )
            .arg(
                Arg::new("s3-url")
                    .long("s3-url")
                    .value_name("URL")
                    .help("S3 endpoint (default: http://s3.amazonaws.com)"),
            )
            .arg(
                Arg::new("log-level")
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level filter (default: info)"),
            )
    }

    fn build_cli() -> Command {
        Self::common_args(Command::new("siphon"))
            .about("Caching reverse proxy with write-behind to S3")
            .arg(
                Arg::new("origin")
                    .long("origin")
                    .value_name("URL")
                    .help("Default origin base URL"),
            )
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .value_name("PORT")
                    .help("HTTP port (default: 8080)"),
            )
            .arg(
                Arg::new("cache-everything")
                    .long("cache-everything")
                    .action(clap::ArgAction::SetTrue)
                    .help("Cache every 200 response regardless of Cache-Control"),
            )
            .arg(
                Arg::new("metrics-port")
                    .long("metrics-port")
                    .value_name("PORT")
                    .help("Serve JSON metrics on this port"),
            )
    }

    fn build_purge_cli() -> Command {
        Self::common_args(Command::new("siphon-purge"))
            .about("Delete cached objects from the S3 bucket")
            .arg(
                Arg::new("prefix")
                    .long("prefix")
                    .value_name("PREFIX")
                    .help("Only delete keys starting with this prefix"),
            )
            .arg(
                Arg::new("page-size")
                    .long("page-size")
                    .value_name("COUNT")
                    .help("Keys per listing page and delete call (max 1000)"),
            )
    }

    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::ConfigError(format!("Failed to read config file {}: {}", path, e))
        })?;

        let config = Self::from_yaml(&content).map_err(|e| {
            ProxyError::ConfigError(format!("Failed to parse config file {}: {}", path, e))
        })?;

        info!("Configuration loaded from file: {}", path);
        Ok(config)
    }

    /// Parse a YAML document into a configuration
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable source. Split out from
    /// `apply_env_overrides` so tests need not mutate the process environment.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup("ORIGIN") {
            self.origin.url = origin;
        }

        if let Some(port) = lookup("PORT").and_then(|p| p.parse().ok()) {
            self.server.http_port = port;
        }

        if let Some(key) = lookup("AWS_ACCESS_KEY_ID") {
            self.store.access_key_id = key;
        }

        if let Some(secret) = lookup("AWS_SECRET_ACCESS_KEY") {
            self.store.secret_access_key = secret;
        }

        if let Some(bucket) = lookup("S3_BUCKET") {
            self.store.bucket = bucket;
        }

        if let Some(url) = lookup("S3_URL") {
            self.store.endpoint = url;
        }

        if let Some(region) = lookup("S3_REGION") {
            self.store.region = region;
        }

        // Any non-empty value turns forced caching on
        if let Some(flag) = lookup("CACHE_EVERYTHING") {
            self.cache.cache_everything = !flag.is_empty() && flag != "0" && flag != "false";
        }

        if lookup("DISABLE_METRICS").is_some() {
            self.metrics.enabled = false;
        }

        if lookup("ENABLE_METRICS").is_some() {
            self.metrics.enabled = true;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            self.logging.log_level = level;
        }
    }

    fn apply_cli_overrides(&mut self, matches: &ArgMatches) {
        let get = |name: &str| -> Option<String> {
            matches
                .try_get_one::<String>(name)
                .ok()
                .flatten()
                .cloned()
        };

        if let Some(bucket) = get("bucket") {
            self.store.bucket = bucket;
        }
        if let Some(url) = get("s3-url") {
            self.store.endpoint = url;
        }
        if let Some(level) = get("log-level") {
            self.logging.log_level = level;
        }
        if let Some(origin) = get("origin") {
            self.origin.url = origin;
        }
        if let Some(port) = get("port").and_then(|p| p.parse().ok()) {
            self.server.http_port = port;
        }
        if let Some(port) = get("metrics-port").and_then(|p| p.parse().ok()) {
            self.metrics.port = Some(port);
        }
        if matches
            .try_get_one::<bool>("cache-everything")
            .ok()
            .flatten()
            .copied()
            .unwrap_or(false)
        {
            self.cache.cache_everything = true;
        }
    }

    /// Validate settings required by the object store client
    pub fn validate_store(&self) -> Result<()> {
        if self.store.bucket.is_empty() {
            return Err(ProxyError::ConfigError(
                "S3_BUCKET must be set".to_string(),
            ));
        }
        if self.store.access_key_id.is_empty() {
            return Err(ProxyError::ConfigError(
                "AWS_ACCESS_KEY_ID must be set".to_string(),
            ));
        }
        if self.store.secret_access_key.is_empty() {
            return Err(ProxyError::ConfigError(
                "AWS_SECRET_ACCESS_KEY must be set".to_string(),
            ));
        }
        if self.store.endpoint.parse::<hyper::Uri>().is_err() {
            return Err(ProxyError::ConfigError(format!(
                "Invalid S3 endpoint: {}",
                self.store.endpoint
            )));
        }
        Ok(())
    }

    /// Validate settings required by the proxy server
    pub fn validate_server(&self) -> Result<()> {
        if self.origin.url.is_empty() {
            return Err(ProxyError::ConfigError("ORIGIN must be set".to_string()));
        }
        for (prefix, origin) in &self.origin.routes {
            if !prefix.starts_with('/') {
                return Err(ProxyError::ConfigError(format!(
                    "Route prefix must start with '/': {}",
                    prefix
                )));
            }
            if origin.parse::<hyper::Uri>().is_err() {
                return Err(ProxyError::ConfigError(format!(
                    "Invalid origin for route {}: {}",
                    prefix, origin
                )));
            }
        }
        self.connection_pool.validate().map_err(|e| {
            ProxyError::ConfigError(format!("Invalid connection pool configuration: {}", e))
        })?;
        self.validate_store()
    }

    /// Log the effective settings; call once logging is initialized
    pub fn log_summary(&self) {
        info!(
            "Origin: {} ({} additional routes)",
            self.origin.url,
            self.origin.routes.len()
        );
        info!(
            "Store: {}/{} (region={}, storage_class={})",
            self.store.endpoint, self.store.bucket, self.store.region, self.store.storage_class
        );
        info!("Cache everything: {}", self.cache.cache_everything);
        debug!("Connection pool: {:?}", self.connection_pool);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_parse_duration_units() {
        use duration_serde::parse_duration;
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("2").unwrap(), Duration::from_secs(2));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("fast").is_err());
        assert!(parse_duration("10y").is_err());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.store.endpoint, "http://s3.amazonaws.com");
        assert_eq!(config.store.acl, "public-read");
        assert_eq!(config.store.storage_class, "REDUCED_REDUNDANCY");
        assert_eq!(config.cache.default_cache_control, "public,max-age=300");
        assert!(!config.cache.cache_everything);
        assert_eq!(config.connection_pool.max_connections, 1024);
        assert_eq!(config.purge.page_size, 1000);
    }

    #[test]
    fn test_yaml_parsing_with_routes() {
        let yaml = r#"
origin:
  url: "http://tiles.internal:8000"
  routes:
    /osm: "http://osm.internal"
    /terrain: "http://terrain.internal"
  request_timeout: "5s"
store:
  bucket: "tile-cache"
  key_prefix: "/v2"
cache:
  cache_everything: true
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.origin.url, "http://tiles.internal:8000");
        assert_eq!(config.origin.routes.len(), 2);
        assert_eq!(config.origin.routes["/osm"], "http://osm.internal");
        assert_eq!(config.origin.request_timeout, Duration::from_secs(5));
        assert_eq!(config.store.bucket, "tile-cache");
        assert_eq!(config.store.key_prefix.as_deref(), Some("/v2"));
        assert!(config.cache.cache_everything);
        // Unspecified sections keep their defaults
        assert_eq!(config.server.http_port, 8080);
    }

    #[test]
    fn test_env_overrides() {
        let env = vars(&[
            ("ORIGIN", "http://origin"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("S3_BUCKET", "bucket"),
            ("S3_URL", "http://localhost:9000"),
            ("CACHE_EVERYTHING", "1"),
            ("PORT", "9999"),
            ("DISABLE_METRICS", "true"),
        ]);
        let mut config = Config::default();
        config.apply_overrides_from(|name| env.get(name).cloned());

        assert_eq!(config.origin.url, "http://origin");
        assert_eq!(config.store.access_key_id, "AKID");
        assert_eq!(config.store.bucket, "bucket");
        assert_eq!(config.store.endpoint, "http://localhost:9000");
        assert!(config.cache.cache_everything);
        assert_eq!(config.server.http_port, 9999);
        assert!(!config.metrics.enabled);
        assert!(config.validate_server().is_ok());
    }

    #[test]
    fn test_cache_everything_false_values() {
        for value in ["", "0", "false"] {
            let env = vars(&[("CACHE_EVERYTHING", value)]);
            let mut config = Config::default();
            config.cache.cache_everything = true;
            config.apply_overrides_from(|name| env.get(name).cloned());
            assert!(!config.cache.cache_everything, "value {:?}", value);
        }
    }

    #[test]
    fn test_validate_requires_origin_and_credentials() {
        let mut config = Config::default();
        assert!(config.validate_server().is_err());

        config.origin.url = "http://origin".to_string();
        let err = config.validate_server().unwrap_err();
        assert!(err.to_string().contains("S3_BUCKET"));

        config.store.bucket = "b".to_string();
        config.store.access_key_id = "k".to_string();
        config.store.secret_access_key = "s".to_string();
        assert!(config.validate_server().is_ok());

        config
            .origin
            .routes
            .insert("osm".to_string(), "http://osm".to_string());
        assert!(config.validate_server().is_err());
    }

    #[test]
    fn test_connection_pool_validation() {
        let mut pool = ConnectionPoolConfig::default();
        assert!(pool.validate().is_ok());
        pool.max_idle_per_host = pool.max_connections + 1;
        assert!(pool.validate().is_err());
        pool.max_connections = 0;
        assert!(pool.validate().is_err());
    }

    #[test]
    fn test_store_config_debug_redacts_secret() {
        let mut store = StoreConfig::default();
        store.secret_access_key = "hunter2".to_string();
        let rendered = format!("{:?}", store);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
