//! Configuration management for the component runtime.
//!
//! Runtime settings are read from ordered configuration sources
//! (environment variables, JSON documents, in-memory maps) and resolved
//! into a [`RuntimeConfig`].

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{ControlError, ControlResult};
use crate::policy::{ActivationPolicy, CollectionPolicy, Priority};

/// Configuration provider resolving keys across ordered sources
pub struct ConfigProvider {
    /// Configuration sources in priority order
    sources: Vec<Box<dyn ConfigSource>>,
    /// Cached configuration values
    cache: RwLock<HashMap<String, ConfigValue>>,
}

impl std::fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigProvider")
            .field("sources", &self.sources)
            .field("cached", &self.cache.read().len())
            .finish()
    }
}

/// A configuration value that can be various types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Try to convert to string
    pub fn as_string(&self) -> ControlResult<&str> {
        match self {
            ConfigValue::String(s) => Ok(s),
            other => Err(ControlError::Config(format!("{:?} is not a string", other))),
        }
    }

    /// Try to convert to integer
    pub fn as_i64(&self) -> ControlResult<i64> {
        match self {
            ConfigValue::Integer(i) => Ok(*i),
            ConfigValue::String(s) => s
                .parse()
                .map_err(|_| ControlError::Config(format!("[{}] is not an integer", s))),
            other => Err(ControlError::Config(format!("{:?} is not an integer", other))),
        }
    }

    /// Try to convert to boolean
    pub fn as_bool(&self) -> ControlResult<bool> {
        match self {
            ConfigValue::Boolean(b) => Ok(*b),
            ConfigValue::String(s) => s
                .parse()
                .map_err(|_| ControlError::Config(format!("[{}] is not a boolean", s))),
            other => Err(ControlError::Config(format!("{:?} is not a boolean", other))),
        }
    }

    /// Try to convert to duration from milliseconds
    pub fn as_duration_ms(&self) -> ControlResult<Duration> {
        let ms = self.as_i64()?;
        if ms < 0 {
            return Err(ControlError::Config(format!("duration {}ms cannot be negative", ms)));
        }
        Ok(Duration::from_millis(ms as u64))
    }
}

fn parse_scalar(value: String) -> ConfigValue {
    if let Ok(int_val) = value.parse::<i64>() {
        ConfigValue::Integer(int_val)
    } else if let Ok(float_val) = value.parse::<f64>() {
        ConfigValue::Float(float_val)
    } else if let Ok(bool_val) = value.parse::<bool>() {
        ConfigValue::Boolean(bool_val)
    } else {
        ConfigValue::String(value)
    }
}

/// Trait for configuration sources
pub trait ConfigSource: Send + Sync + std::fmt::Debug {
    /// Get a configuration value by key
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// List all available keys
    fn keys(&self) -> Vec<String>;
}

/// Environment variable configuration source
///
/// Dotted keys map to upper-case variable names with `.` replaced by `_`,
/// so `commission.timeout_ms` under prefix `METRO` reads
/// `METRO_COMMISSION_TIMEOUT_MS`.
#[derive(Debug, Default)]
pub struct EnvironmentConfigSource {
    /// Prefix to filter environment variables
    prefix: Option<String>,
}

impl EnvironmentConfigSource {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    fn variable(&self, key: &str) -> String {
        let key = key.to_uppercase().replace('.', "_");
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix.to_uppercase(), key),
            None => key,
        }
    }
}

impl ConfigSource for EnvironmentConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        env::var(self.variable(key)).ok().map(parse_scalar)
    }

    fn keys(&self) -> Vec<String> {
        env::vars()
            .filter_map(|(key, _)| match &self.prefix {
                Some(prefix) => {
                    let prefix_upper = format!("{}_", prefix.to_uppercase());
                    key.strip_prefix(&prefix_upper).map(|rest| rest.to_lowercase())
                }
                None => Some(key.to_lowercase()),
            })
            .collect()
    }
}

/// JSON file configuration source
///
/// Nested objects are flattened into dotted keys.
#[derive(Debug)]
pub struct JsonConfigSource {
    /// File path to JSON configuration
    file_path: PathBuf,
    /// Cached parsed configuration
    config: RwLock<Option<HashMap<String, ConfigValue>>>,
}

impl JsonConfigSource {
    pub fn new(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            config: RwLock::new(None),
        }
    }

    /// Builds a source from an in-memory JSON document.
    pub fn from_document(document: &str) -> ControlResult<Self> {
        let source = Self::new(PathBuf::new());
        *source.config.write() = Some(flatten_document(document)?);
        Ok(source)
    }

    /// Reload configuration from file
    pub fn reload(&self) -> ControlResult<()> {
        let content = std::fs::read_to_string(&self.file_path)?;
        *self.config.write() = Some(flatten_document(&content)?);
        Ok(())
    }
}

fn flatten_document(document: &str) -> ControlResult<HashMap<String, ConfigValue>> {
    let parsed: HashMap<String, ConfigValue> = serde_json::from_str(document)?;
    let mut flat = HashMap::new();
    for (key, value) in parsed {
        flatten_into(&mut flat, key, value);
    }
    Ok(flat)
}

fn flatten_into(flat: &mut HashMap<String, ConfigValue>, key: String, value: ConfigValue) {
    match value {
        ConfigValue::Object(entries) => {
            for (child, value) in entries {
                flatten_into(flat, format!("{}.{}", key, child), value);
            }
        }
        other => {
            flat.insert(key, other);
        }
    }
}

impl ConfigSource for JsonConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        if self.config.read().is_none() {
            if let Err(error) = self.reload() {
                tracing::warn!(path = %self.file_path.display(), %error, "unable to load configuration");
                return None;
            }
        }
        self.config.read().as_ref()?.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.config
            .read()
            .as_ref()
            .map(|cfg| cfg.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// In-memory configuration source
#[derive(Debug, Default)]
pub struct MapConfigSource {
    values: HashMap<String, ConfigValue>,
}

impl MapConfigSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: ConfigValue) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.values.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.values.keys().cloned().collect()
    }
}

impl ConfigProvider {
    /// Create a new configuration provider
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Add a configuration source (higher priority sources should be added first)
    pub fn add_source(&mut self, source: Box<dyn ConfigSource>) {
        self.sources.push(source);
        self.cache.write().clear();
    }

    /// Get a configuration value, checking sources in priority order
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        if let Some(value) = self.cache.read().get(key) {
            return Some(value.clone());
        }

        let value = self.sources.iter().find_map(|source| source.get(key))?;
        self.cache.write().insert(key.to_string(), value.clone());
        Some(value)
    }

    /// Get a string configuration value
    pub fn get_string(&self, key: &str) -> ControlResult<String> {
        self.require(key)?.as_string().map(|s| s.to_string())
    }

    /// Get a string configuration value with default
    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|_| default.to_string())
    }

    /// Get an integer configuration value
    pub fn get_i64(&self, key: &str) -> ControlResult<i64> {
        self.require(key)?.as_i64()
    }

    /// Get a boolean configuration value
    pub fn get_bool(&self, key: &str) -> ControlResult<bool> {
        self.require(key)?.as_bool()
    }

    /// Get a boolean configuration value with default
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// Get a duration configuration value (from milliseconds)
    pub fn get_duration_ms(&self, key: &str) -> ControlResult<Duration> {
        self.require(key)?.as_duration_ms()
    }

    /// Get an optional duration; absent keys yield `None`, malformed ones an error
    pub fn get_optional_duration_ms(&self, key: &str) -> ControlResult<Option<Duration>> {
        self.get(key).map(|v| v.as_duration_ms()).transpose()
    }

    /// Parses a string value with `FromStr`, using `default` when absent
    pub fn get_parsed_or<T>(&self, key: &str, default: T) -> ControlResult<T>
    where
        T: std::str::FromStr<Err = String>,
    {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.as_string()?.parse().map_err(ControlError::Config),
        }
    }

    fn require(&self, key: &str) -> ControlResult<ConfigValue> {
        self.get(key)
            .ok_or_else(|| ControlError::Config(format!("configuration key [{}] not found", key)))
    }

    /// Clear the configuration cache (forces reload from sources)
    pub fn invalidate_cache(&self) {
        self.cache.write().clear();
    }

    /// Get all configuration keys from all sources
    pub fn all_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sources.iter().flat_map(|s| s.keys()).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl Default for ConfigProvider {
    fn default() -> Self {
        let mut provider = Self::new();
        provider.add_source(Box::new(EnvironmentConfigSource::with_prefix("METRO")));
        provider
    }
}

/// Resolved runtime settings
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Partition root for top-level component paths
    pub partition: String,
    /// Value of the `${work}` symbol
    pub work_dir: PathBuf,
    /// Value of the `${temp}` symbol
    pub temp_dir: PathBuf,
    /// What `ActivationPolicy::System` resolves to
    pub default_activation: ActivationPolicy,
    /// What `CollectionPolicy::System` resolves to for root components
    pub root_collection: CollectionPolicy,
    /// What `CollectionPolicy::System` resolves to for nested components
    pub nested_collection: CollectionPolicy,
    /// Per-part commissioning timeout; `None` commissions inline
    pub commission_timeout: Option<Duration>,
    /// Grace period after cancelling a timed-out commission
    pub commission_grace: Duration,
    /// Escalate commissioning timeouts and failures
    pub fail_fast: bool,
    /// Idle time after which soft singletons become reclaimable
    pub soft_reference_ttl: Option<Duration>,
    /// Level for categories without an explicit directive
    pub log_level: Priority,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            partition: "/".to_string(),
            work_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            temp_dir: env::temp_dir(),
            default_activation: ActivationPolicy::Demand,
            root_collection: CollectionPolicy::Hard,
            nested_collection: CollectionPolicy::Soft,
            commission_timeout: None,
            commission_grace: Duration::from_millis(250),
            fail_fast: true,
            soft_reference_ttl: None,
            log_level: Priority::Info,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a config provider
    pub fn load(config: &ConfigProvider) -> ControlResult<Self> {
        let defaults = RuntimeConfig::default();
        let mut partition = config.get_string_or("partition", &defaults.partition);
        if !partition.ends_with('/') {
            partition.push('/');
        }
        Ok(Self {
            partition,
            work_dir: config
                .get_string("work_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            temp_dir: config
                .get_string("temp_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.temp_dir),
            default_activation: config.get_parsed_or("activation.default", defaults.default_activation)?,
            root_collection: config.get_parsed_or("collection.root", defaults.root_collection)?,
            nested_collection: config.get_parsed_or("collection.nested", defaults.nested_collection)?,
            commission_timeout: config.get_optional_duration_ms("commission.timeout_ms")?,
            commission_grace: config
                .get_optional_duration_ms("commission.grace_ms")?
                .unwrap_or(defaults.commission_grace),
            fail_fast: config.get_bool_or("commission.fail_fast", defaults.fail_fast),
            soft_reference_ttl: config.get_optional_duration_ms("collection.soft_ttl_ms")?,
            log_level: config.get_parsed_or("logging.level", defaults.log_level)?,
        })
    }

    /// Loads from the `METRO_*` environment.
    pub fn from_env() -> ControlResult<Self> {
        Self::load(&ConfigProvider::default())
    }
}
