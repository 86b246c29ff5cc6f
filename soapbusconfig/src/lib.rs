//! # SoapBus Configuration Module
//!
//! This module provides configuration management for SoapBus:
//! - Loading configuration from YAML files
//! - Merging with the embedded default configuration
//! - Environment variable overrides
//! - Typed getters and setters for configuration values
//! - Endpoint declarations
//!
//! ## Usage
//!
//! ```no_run
//! use soapbusconfig::Config;
//!
//! let config = Config::load_config("")?;
//! let port = config.get_http_port();
//! let endpoints = config.get_endpoints()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! The configuration is passed explicitly to the components that need it, there
//! is no process wide singleton.

use anyhow::{anyhow, Result};
use dirs::home_dir;
use parking_lot::Mutex;
use serde_yaml::{Mapping, Number, Value};
use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::info;

mod endpoint;

pub use endpoint::{EndpointConfig, EndpointRole, DEFAULT_MEP};

// Configuration par défaut intégrée
const DEFAULT_CONFIG: &str = include_str!("soapbus.yaml");

const ENV_CONFIG_DIR: &str = "SOAPBUS_CONFIG";
const ENV_PREFIX: &str = "SOAPBUS_CONFIG__";
const CONFIG_DIR_NAME: &str = ".soapbus";

// Default values for configuration
const DEFAULT_HTTP_PORT: u16 = 8192;
const DEFAULT_HTTP_BIND: &str = "0.0.0.0";
const DEFAULT_STREAMING_ENABLED: bool = false;
const DEFAULT_RETRY_COUNT: usize = 3;
const DEFAULT_CONSUMER_SUSPEND_TIME_MS: u64 = 60_000;
const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 60_000;
const DEFAULT_WANT_HEADERS_FROM_HTTP: bool = false;
const DEFAULT_LOG_MIN_LEVEL: &str = "INFO";

/// Macro to generate getter/setter for usize values with default
macro_rules! impl_usize_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<usize> {
            match self.get_value($path) {
                Ok(Value::Number(n)) => Ok(n.as_u64().map(|v| v as usize).unwrap_or($default)),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, size: usize) -> Result<()> {
            let n = Number::from(size);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for millisecond durations with default
macro_rules! impl_millis_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<Duration> {
            let millis = match self.get_value($path) {
                Ok(Value::Number(n)) => n.as_u64().unwrap_or($default),
                Ok(Value::String(s)) => s.trim().parse::<u64>().unwrap_or($default),
                _ => $default,
            };
            Ok(Duration::from_millis(millis))
        }

        pub fn $setter(&self, value: Duration) -> Result<()> {
            let n = Number::from(value.as_millis() as u64);
            self.set_value($path, Value::Number(n))
        }
    };
}

/// Macro to generate getter/setter for bool values with default
macro_rules! impl_bool_config {
    ($getter:ident, $setter:ident, $path:expr, $default:expr) => {
        pub fn $getter(&self) -> Result<bool> {
            match self.get_value($path) {
                Ok(Value::Bool(b)) => Ok(b),
                _ => Ok($default),
            }
        }

        pub fn $setter(&self, value: bool) -> Result<()> {
            self.set_value($path, Value::Bool(value))
        }
    };
}

/// What to do with a reply that arrives after its HTTP request gave up waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LateResponseStrategy {
    /// Fail the exchange with an error.
    #[default]
    Error,
    /// Log a warning and close the exchange normally.
    Warning,
}

impl std::str::FromStr for LateResponseStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warning" => Ok(Self::Warning),
            other => Err(anyhow!("Unknown late response strategy '{}'", other)),
        }
    }
}

/// Snapshot of the `http:` section handed to the HTTP processors.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpSettings {
    pub streaming_enabled: bool,
    pub retry_count: usize,
    pub consumer_suspend_time: Duration,
    pub client_timeout: Duration,
    pub want_headers_from_http: bool,
    pub late_response_strategy: LateResponseStrategy,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            streaming_enabled: DEFAULT_STREAMING_ENABLED,
            retry_count: DEFAULT_RETRY_COUNT,
            consumer_suspend_time: Duration::from_millis(DEFAULT_CONSUMER_SUSPEND_TIME_MS),
            client_timeout: Duration::from_millis(DEFAULT_CLIENT_TIMEOUT_MS),
            want_headers_from_http: DEFAULT_WANT_HEADERS_FROM_HTTP,
            late_response_strategy: LateResponseStrategy::Error,
        }
    }
}

/// Configuration manager for SoapBus
///
/// Holds the merged YAML tree (embedded defaults, `config.yaml`, environment
/// overrides) and exposes typed accessors over it.
#[derive(Debug)]
pub struct Config {
    config_dir: String,
    path: String,
    data: Mutex<Value>,
}

impl Clone for Config {
    fn clone(&self) -> Self {
        Self {
            config_dir: self.config_dir.clone(),
            path: self.path.clone(),
            data: Mutex::new(self.data.lock().clone()),
        }
    }
}

impl Config {
    /// Finds a config directory by trying different locations in order
    fn find_config_dir(directory: &str) -> String {
        // 1. Try provided directory
        if !directory.is_empty() {
            return directory.to_string();
        }

        // 2. Try environment variable
        if let Ok(env_path) = env::var(ENV_CONFIG_DIR) {
            info!(env_var=ENV_CONFIG_DIR, path=%env_path, "Trying to load config from env");
            return env_path;
        }

        // 3. Try current directory
        if Path::new(CONFIG_DIR_NAME).exists() {
            return CONFIG_DIR_NAME.to_string();
        }

        // 4. Try home directory
        if let Some(home) = home_dir() {
            let home_config = home.join(CONFIG_DIR_NAME);
            if home_config.exists() {
                return home_config.to_string_lossy().to_string();
            }
        }

        CONFIG_DIR_NAME.to_string()
    }

    /// Validates and prepares a config directory
    fn validate_config_dir(path: &Path) -> Result<()> {
        if !path.exists() {
            fs::create_dir_all(path)?;
        }

        if !path.is_dir() {
            return Err(anyhow!(
                "Config path {} is not a directory",
                path.display()
            ));
        }

        // Test read permission
        fs::read_dir(path)?;

        Ok(())
    }

    /// Determines and validates the configuration directory
    ///
    /// The directory is searched in the following order:
    /// 1. The provided `directory` parameter if not empty
    /// 2. The `SOAPBUS_CONFIG` environment variable
    /// 3. `.soapbus` in the current directory
    /// 4. `.soapbus` in the user's home directory
    pub fn prepare_config_dir(directory: &str) -> Result<String> {
        let dir_path = Self::find_config_dir(directory);
        Self::validate_config_dir(Path::new(&dir_path))?;
        Ok(dir_path)
    }

    /// Loads the configuration from the specified directory
    ///
    /// This method:
    /// 1. Determines the configuration directory
    /// 2. Loads the default embedded configuration
    /// 3. Merges it with the external config.yaml file if present
    /// 4. Applies environment variable overrides
    pub fn load_config(directory: &str) -> Result<Self> {
        let config_dir = Self::prepare_config_dir(directory)?;
        info!(config_dir=%config_dir, "Using config directory");

        let config_file_path = Path::new(&config_dir).join("config.yaml");
        let path = config_file_path.to_string_lossy().to_string();

        let yaml = match fs::read_to_string(&path) {
            Ok(data) => {
                info!(config_file=%path, "Loaded config file");
                Some(data)
            }
            Err(_) => {
                info!(config_file=%path, "Config file not found, using default embedded config");
                None
            }
        };

        let config_value = Self::build_tree(yaml.as_deref())?;

        Ok(Config {
            config_dir,
            path,
            data: Mutex::new(config_value),
        })
    }

    /// Builds an in-memory configuration from a YAML document.
    ///
    /// The document is merged over the embedded defaults and environment overrides
    /// are applied, exactly like [`Config::load_config`]. Relative paths resolve
    /// against `config_dir`, and [`Config::save`] is a no-op.
    pub fn from_yaml(yaml: &str, config_dir: &str) -> Result<Self> {
        Ok(Config {
            config_dir: config_dir.to_string(),
            path: String::new(),
            data: Mutex::new(Self::build_tree(Some(yaml))?),
        })
    }

    fn build_tree(external: Option<&str>) -> Result<Value> {
        let mut default_value: Value = serde_yaml::from_str(DEFAULT_CONFIG)?;
        if let Some(yaml) = external {
            let external_value: Value = serde_yaml::from_str(yaml)?;
            merge_yaml(&mut default_value, &external_value);
        }
        let mut config_value = Self::lower_keys_value(default_value);
        Self::apply_env_overrides(&mut config_value);
        Ok(config_value)
    }

    /// Saves the current configuration to the config.yaml file
    pub fn save(&self) -> Result<()> {
        if self.path.is_empty() {
            return Ok(());
        }
        let yaml = serde_yaml::to_string(&*self.data.lock())?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }

    /// Directory the configuration was loaded from.
    pub fn get_config_dir(&self) -> &str {
        &self.config_dir
    }

    /// Sets a configuration value at the specified path and saves it
    ///
    /// # Arguments
    ///
    /// * `path` - Array of keys representing the path (e.g., `&["http", "retry_count"]`)
    /// * `value` - The YAML value to set
    pub fn set_value(&self, path: &[&str], value: Value) -> Result<()> {
        {
            let mut data = self.data.lock();
            Self::set_value_internal(&mut data, path, value)?;
        }
        self.save()
    }

    fn set_value_internal(data: &mut Value, path: &[&str], value: Value) -> Result<()> {
        if path.is_empty() {
            *data = value;
            return Ok(());
        }
        if let Value::Mapping(map) = data {
            let key_value = Value::String(path[0].to_lowercase());
            if path.len() == 1 {
                map.insert(key_value, value);
            } else {
                let entry = map
                    .entry(key_value)
                    .or_insert(Value::Mapping(Mapping::new()));
                Self::set_value_internal(entry, &path[1..], value)?;
            }
            Ok(())
        } else {
            Err(anyhow!("Current node is not a map"))
        }
    }

    /// Gets a configuration value at the specified path
    ///
    /// Returns an error if the path doesn't exist.
    pub fn get_value(&self, path: &[&str]) -> Result<Value> {
        let data = self.data.lock();
        Self::get_value_internal(&data, path)
    }

    fn get_value_internal(data: &Value, path: &[&str]) -> Result<Value> {
        let mut current = data;
        for (i, key) in path.iter().enumerate() {
            if let Value::Mapping(map) = current {
                match map.get(Value::String(key.to_lowercase())) {
                    Some(next) => current = next,
                    None => {
                        return Err(anyhow!("Path {} does not exist", path[..=i].join(".")));
                    }
                }
            } else {
                return Err(anyhow!("Path {} is not a Config", path[..i].join(".")));
            }
        }
        Ok(current.clone())
    }

    fn apply_env_overrides(config: &mut Value) {
        for (key, value) in env::vars() {
            if let Some(rest) = key.strip_prefix(ENV_PREFIX) {
                let key_path = rest.split("__").collect::<Vec<_>>();
                let yaml_value = Self::convert_env_value(&value);
                if let Err(err) = Self::set_value_internal(config, &key_path, yaml_value) {
                    tracing::warn!(env_var=%key, "Ignoring environment override: {}", err);
                }
            }
        }
    }

    fn convert_env_value(value: &str) -> Value {
        serde_yaml::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.to_string()))
    }

    fn lower_keys_value(value: Value) -> Value {
        match value {
            Value::Mapping(map) => {
                let mut new_map = Mapping::new();
                for (k, v) in map {
                    let new_key = match k {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    new_map.insert(new_key, Self::lower_keys_value(v));
                }
                Value::Mapping(new_map)
            }
            Value::Sequence(seq) => {
                Value::Sequence(seq.into_iter().map(Self::lower_keys_value).collect())
            }
            _ => value,
        }
    }

    /// Resolves a path relative to the configuration directory.
    pub fn resolve_path(&self, file: &str) -> PathBuf {
        let path = Path::new(file);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.config_dir).join(path)
        }
    }

    /// Gets the HTTP port from configuration
    ///
    /// Returns the configured HTTP port, or the default port (8192) if not
    /// configured or invalid.
    pub fn get_http_port(&self) -> u16 {
        match self.get_value(&["host", "http_port"]) {
            Ok(Value::Number(n)) => match n.as_u64().and_then(|p| u16::try_from(p).ok()) {
                Some(port) => port,
                None => {
                    tracing::warn!("Invalid HTTP port {}, using default {}", n, DEFAULT_HTTP_PORT);
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(Value::String(s)) => match s.parse::<u16>() {
                Ok(port) => port,
                Err(_) => {
                    tracing::warn!(
                        "Invalid HTTP port '{}', using default {}",
                        s,
                        DEFAULT_HTTP_PORT
                    );
                    DEFAULT_HTTP_PORT
                }
            },
            Ok(_) => {
                tracing::warn!(
                    "HTTP port not a number or string, using default {}",
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to get HTTP port: {}, using default {}",
                    err,
                    DEFAULT_HTTP_PORT
                );
                DEFAULT_HTTP_PORT
            }
        }
    }

    /// Sets the HTTP port in configuration
    pub fn set_http_port(&self, port: u16) -> Result<()> {
        self.set_value(&["host", "http_port"], Value::Number(Number::from(port)))
    }

    /// Address the HTTP server binds to.
    pub fn get_http_bind(&self) -> String {
        match self.get_value(&["host", "bind"]) {
            Ok(Value::String(s)) if !s.trim().is_empty() => s,
            _ => DEFAULT_HTTP_BIND.to_string(),
        }
    }

    impl_bool_config!(
        get_streaming_enabled,
        set_streaming_enabled,
        &["http", "streaming_enabled"],
        DEFAULT_STREAMING_ENABLED
    );

    impl_usize_config!(
        get_retry_count,
        set_retry_count,
        &["http", "retry_count"],
        DEFAULT_RETRY_COUNT
    );

    impl_millis_config!(
        get_consumer_suspend_time,
        set_consumer_suspend_time,
        &["http", "consumer_suspend_time_ms"],
        DEFAULT_CONSUMER_SUSPEND_TIME_MS
    );

    impl_millis_config!(
        get_client_timeout,
        set_client_timeout,
        &["http", "client_timeout_ms"],
        DEFAULT_CLIENT_TIMEOUT_MS
    );

    impl_bool_config!(
        get_want_headers_from_http,
        set_want_headers_from_http,
        &["http", "want_headers_from_http"],
        DEFAULT_WANT_HEADERS_FROM_HTTP
    );

    /// Strategy for replies that arrive after the consumer timeout.
    pub fn get_late_response_strategy(&self) -> Result<LateResponseStrategy> {
        match self.get_value(&["http", "late_response_strategy"]) {
            Ok(Value::String(s)) => s.parse(),
            _ => Ok(LateResponseStrategy::default()),
        }
    }

    /// Collects the whole `http:` section.
    pub fn http_settings(&self) -> Result<HttpSettings> {
        Ok(HttpSettings {
            streaming_enabled: self.get_streaming_enabled()?,
            retry_count: self.get_retry_count()?,
            consumer_suspend_time: self.get_consumer_suspend_time()?,
            client_timeout: self.get_client_timeout()?,
            want_headers_from_http: self.get_want_headers_from_http()?,
            late_response_strategy: self.get_late_response_strategy()?,
        })
    }

    /// Endpoint declarations, in file order.
    pub fn get_endpoints(&self) -> Result<Vec<EndpointConfig>> {
        match self.get_value(&["endpoints"]) {
            Ok(Value::Null) | Err(_) => Ok(Vec::new()),
            Ok(value) => {
                let endpoints: Vec<EndpointConfig> = serde_yaml::from_value(value)?;
                for (i, ep) in endpoints.iter().enumerate() {
                    if ep.name.trim().is_empty() {
                        return Err(anyhow!("Endpoint #{} has no name", i));
                    }
                    if ep.wsdl.trim().is_empty() {
                        return Err(anyhow!("Endpoint '{}' has no wsdl", ep.name));
                    }
                }
                Ok(endpoints)
            }
        }
    }

    /// Récupère le niveau de log minimum depuis la configuration
    pub fn get_log_min_level(&self) -> Result<String> {
        match self.get_value(&["host", "logger", "min_level"]) {
            Ok(Value::String(s)) => Ok(s),
            _ => Ok(DEFAULT_LOG_MIN_LEVEL.to_string()),
        }
    }

    /// Définit le niveau de log minimum dans la configuration
    pub fn set_log_min_level(&self, level: String) -> Result<()> {
        self.set_value(&["host", "logger", "min_level"], Value::String(level))
    }
}

/// Merges external YAML configuration into default configuration
///
/// - For mappings, keys from `external` are merged into `default`
/// - Scalars and sequences from `external` replace the default value
fn merge_yaml(default: &mut Value, external: &Value) {
    match (default, external) {
        (Value::Mapping(dmap), Value::Mapping(emap)) => {
            for (k, v) in emap {
                match dmap.get_mut(k) {
                    Some(dv) => merge_yaml(dv, v),
                    None => {
                        dmap.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (d, e) => *d = e.clone(), // pour les scalaires ou séquences, on remplace
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_defaults() {
        let config = Config::from_yaml("{}", ".").unwrap();
        assert_eq!(config.get_http_port(), 8192);
        assert_eq!(config.get_retry_count().unwrap(), 3);
        assert_eq!(
            config.get_consumer_suspend_time().unwrap(),
            Duration::from_secs(60)
        );
        assert!(!config.get_streaming_enabled().unwrap());
        assert_eq!(
            config.get_late_response_strategy().unwrap(),
            LateResponseStrategy::Error
        );
        assert!(config.get_endpoints().unwrap().is_empty());
    }

    #[test]
    fn test_merge_keeps_unspecified_defaults() {
        let config = Config::from_yaml("http:\n  retry_count: 7\n", ".").unwrap();
        assert_eq!(config.get_retry_count().unwrap(), 7);
        assert_eq!(
            config.get_client_timeout().unwrap(),
            Duration::from_millis(60_000)
        );
    }

    #[test]
    fn test_keys_are_case_insensitive() {
        let config = Config::from_yaml("HTTP:\n  Streaming_Enabled: true\n", ".").unwrap();
        assert!(config.get_streaming_enabled().unwrap());
    }

    #[test]
    fn test_late_response_strategy_parse() {
        assert_eq!(
            "Warning".parse::<LateResponseStrategy>().unwrap(),
            LateResponseStrategy::Warning
        );
        assert!("ignore".parse::<LateResponseStrategy>().is_err());
    }

    #[test]
    fn test_endpoint_without_wsdl_is_rejected() {
        let config = Config::from_yaml("endpoints:\n  - name: broken\n", ".").unwrap();
        assert!(config.get_endpoints().is_err());
    }

    #[test]
    fn test_resolve_path() {
        let config = Config::from_yaml("{}", "/etc/soapbus").unwrap();
        assert_eq!(
            config.resolve_path("wsdl/a.wsdl"),
            PathBuf::from("/etc/soapbus/wsdl/a.wsdl")
        );
        assert_eq!(config.resolve_path("/tmp/b.wsdl"), PathBuf::from("/tmp/b.wsdl"));
    }
}
