//! Configuration for the gaze sample agent.

use crate::core::{ManagerConfig, DEFAULT_MAX_CHUNK_SIZE};
use crate::sample::{validate_uuided, Identity, IdentityField, NamedEntity};
use crate::uploader::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Destination for every uploaded chunk
    pub upload_endpoint: String,

    /// Upper bound for one chunk, in bytes
    pub max_chunk_size: usize,

    /// Buffer occupancy that triggers a flush (default: two batches)
    pub auto_flush_threshold: Option<usize>,

    /// Denominator of the reported buffer utilization
    pub capacity_hint: Option<usize>,

    /// Buffer occupancy at which new samples are refused
    pub hard_capacity: Option<usize>,

    /// Samples older than this many seconds are discarded
    pub retention_secs: u64,

    /// How often the capture loop flushes complete batches
    #[serde(rename = "flush_interval_ms", with = "duration_ms_serde")]
    pub flush_interval: Duration,

    /// Width of the flush window ending at the current time
    #[serde(rename = "window_ms", with = "duration_ms_serde")]
    pub window: Duration,

    /// Upload retry behaviour
    pub retry: RetryConfig,

    /// Entities the captured samples are attributed to
    pub identity: IdentityConfig,

    /// Path for storing state and transparency logs
    pub data_path: PathBuf,

    /// Whether collection is currently paused
    pub paused: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaze-sample-agent");

        Self {
            upload_endpoint: "http://localhost:8080/samples".to_string(),
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            auto_flush_threshold: None,
            capacity_hint: None,
            hard_capacity: None,
            retention_secs: 300, // 5 minutes
            flush_interval: Duration::from_millis(1000),
            window: Duration::from_millis(60_000),
            retry: RetryConfig::default(),
            identity: IdentityConfig::default(),
            data_path: data_dir,
            paused: false,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults when the
    /// file does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&content).map_err(ConfigError::Parse)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gaze-sample-agent")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)?;
        Ok(())
    }

    /// Path of the persisted transparency counters.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Manager settings derived from this configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        let mut config = ManagerConfig::new(self.upload_endpoint.clone())
            .with_max_chunk_size(self.max_chunk_size)
            .with_retention(Duration::from_secs(self.retention_secs));
        config.auto_flush_threshold = self.auto_flush_threshold;
        config.capacity_hint = self.capacity_hint;
        config.hard_capacity = self.hard_capacity;
        config
    }

    /// Upload retry policy derived from this configuration.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            forbidden_delay: Duration::from_millis(self.retry.forbidden_delay_ms),
            max_requeues: self.retry.max_requeues,
        }
    }
}

/// Upload retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub forbidden_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub max_requeues: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            forbidden_delay_ms: 60_000,
            request_timeout_secs: 10,
            max_requeues: None,
        }
    }
}

impl RetryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// The named entities samples are attributed to.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user: Option<NamedEntity>,
    pub place: Option<NamedEntity>,
    pub screen: Option<NamedEntity>,
    pub camera: Option<NamedEntity>,
    pub monitor: Option<NamedEntity>,
}

impl IdentityConfig {
    /// Fresh entities with generated uuids.
    pub fn generate() -> Self {
        Self {
            user: Some(NamedEntity::generate("user")),
            place: Some(NamedEntity::generate("place")),
            screen: Some(NamedEntity::generate("screen")),
            camera: Some(NamedEntity::generate("camera")),
            monitor: Some(NamedEntity::generate("monitor")),
        }
    }

    pub fn entity(&self, field: IdentityField) -> Option<&NamedEntity> {
        match field {
            IdentityField::User => self.user.as_ref(),
            IdentityField::Place => self.place.as_ref(),
            IdentityField::Screen => self.screen.as_ref(),
            IdentityField::Camera => self.camera.as_ref(),
            IdentityField::Monitor => self.monitor.as_ref(),
        }
    }

    /// Identity fields whose entity is missing, unnamed or has no uuid.
    pub fn missing(&self) -> Vec<IdentityField> {
        IdentityField::ALL
            .into_iter()
            .filter(|f| !validate_uuided(self.entity(*f)))
            .collect()
    }

    /// Generate an entity for every unusable slot. Returns the fields that
    /// were replaced.
    pub fn fill_missing(&mut self) -> Vec<IdentityField> {
        let missing = self.missing();
        for field in &missing {
            let entity = Some(NamedEntity::generate(field.name().trim_end_matches("_id")));
            match field {
                IdentityField::User => self.user = entity,
                IdentityField::Place => self.place = entity,
                IdentityField::Screen => self.screen = entity,
                IdentityField::Camera => self.camera = entity,
                IdentityField::Monitor => self.monitor = entity,
            }
        }
        missing
    }

    /// Build the identity tuple. Fails on the first unusable entity.
    pub fn to_identity(&self) -> Result<Identity, ConfigError> {
        if let Some(field) = self.missing().into_iter().next() {
            return Err(ConfigError::MissingEntity(field));
        }

        let uuid = |field| {
            self.entity(field)
                .map(|e| e.uuid.clone())
                .unwrap_or_default()
        };
        Ok(Identity::new(
            uuid(IdentityField::User),
            uuid(IdentityField::Place),
            uuid(IdentityField::Screen),
            uuid(IdentityField::Camera),
            uuid(IdentityField::Monitor),
        ))
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("No usable {0} entity configured")]
    MissingEntity(IdentityField),
}

/// Serde support for Duration as milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
