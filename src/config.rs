//! Configuration management for gesturelink
//!
//! Provides settings storage with schema versioning and migrations.
//! Configuration is stored in `~/.gesturelink/config.json`. It is read once
//! at startup and treated as read-only for the lifetime of the process.

use crate::gesture::{CommandMap, DEFAULT_COOLDOWN_MS, DEFAULT_EXTENSION_MARGIN};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current config schema version
const CURRENT_VERSION: u32 = 1;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Unknown config version: {0}")]
    UnknownVersion(u32),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Schema version for migrations (files without one are version 0)
    #[serde(default = "unversioned")]
    pub version: u32,
    /// Hand-landmark detector sidecar settings
    pub detector: DetectorConfig,
    /// Classification and debouncing settings
    pub gestures: GestureConfig,
    /// Gesture to command mapping
    pub commands: CommandMap,
    /// Command injection settings
    pub injector: InjectorConfig,
    /// Browser (CDP) connection settings
    pub browser: BrowserConfig,
    /// Control panel settings
    pub panel: PanelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            detector: DetectorConfig::default(),
            gestures: GestureConfig::default(),
            commands: CommandMap::default(),
            injector: InjectorConfig::default(),
            browser: BrowserConfig::default(),
            panel: PanelConfig::default(),
        }
    }
}

fn unversioned() -> u32 {
    0
}

/// Detector sidecar configuration
///
/// The sidecar owns the camera and the landmark model and streams
/// detections as JSON lines on stdout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Program to spawn
    pub command: String,
    /// Extra arguments passed before the generated detector options
    pub args: Vec<String>,
    /// Minimum detection confidence (0.0 - 1.0)
    pub min_detection_confidence: f32,
    /// Minimum tracking confidence (0.0 - 1.0)
    pub min_tracking_confidence: f32,
    /// Maximum number of hands to detect
    pub max_hands: u32,
    /// Landmark model complexity (0 or 1)
    pub model_complexity: u32,
    /// Capture width in pixels
    pub frame_width: u32,
    /// Capture height in pixels
    pub frame_height: u32,
    /// How long to wait for the camera to start (0 = wait forever)
    pub startup_timeout_ms: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            command: "gesturelink-hands".to_string(),
            args: Vec::new(),
            min_detection_confidence: 0.85,
            min_tracking_confidence: 0.85,
            max_hands: 1,
            model_complexity: 1,
            frame_width: 640,
            frame_height: 480,
            startup_timeout_ms: 15_000,
        }
    }
}

impl DetectorConfig {
    pub fn startup_timeout(&self) -> Option<Duration> {
        (self.startup_timeout_ms > 0).then(|| Duration::from_millis(self.startup_timeout_ms))
    }
}

/// Gesture classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    /// Minimum time between two committed commands in milliseconds
    pub cooldown_ms: u64,
    /// Finger flex margin in normalised units
    pub extension_margin: f32,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            cooldown_ms: DEFAULT_COOLDOWN_MS,
            extension_margin: DEFAULT_EXTENSION_MARGIN,
        }
    }
}

impl GestureConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// How the injector submits a command once the text is in place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubmitStrategy {
    /// Press Enter and click the send button, always
    #[default]
    Redundant,
    /// Press Enter; click the send button only if the input still holds the text
    Single,
}

/// Command injection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectorConfig {
    /// Delay between filling the input and submitting, in milliseconds
    pub submit_delay_ms: u64,
    /// Submission strategy
    pub submit_strategy: SubmitStrategy,
    /// Selectors tried before the built-in input selectors
    pub extra_input_selectors: Vec<String>,
    /// Selectors tried before the built-in submit selectors
    pub extra_submit_selectors: Vec<String>,
    /// How long on-page notifications stay visible, in milliseconds
    pub notification_ms: u64,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            submit_delay_ms: 100,
            submit_strategy: SubmitStrategy::default(),
            extra_input_selectors: Vec::new(),
            extra_submit_selectors: Vec::new(),
            notification_ms: 2000,
        }
    }
}

/// Browser connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Chrome remote debugging endpoint
    pub cdp_endpoint: String,
    /// Match pattern for pages the agent may attach to (`*` wildcards)
    pub page_match: String,
    /// How often to rescan open tabs, in milliseconds
    pub scan_interval_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            cdp_endpoint: "http://127.0.0.1:9222".to_string(),
            page_match: "http://127.0.0.1:50080/*".to_string(),
            scan_interval_ms: 2000,
        }
    }
}

/// Control panel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PanelConfig {
    /// Status poll interval in milliseconds
    pub poll_interval_ms: u64,
    /// IPC socket path (None for `~/.gesturelink/gesturelink.sock`)
    pub socket_path: Option<PathBuf>,
}

impl Default for PanelConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            socket_path: None,
        }
    }
}

impl PanelConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn socket_path(&self) -> PathBuf {
        self.socket_path
            .clone()
            .unwrap_or_else(|| get_config_dir().join("gesturelink.sock"))
    }
}

/// Get the path to the config file (~/.gesturelink/config.json)
pub fn get_config_path() -> PathBuf {
    get_config_dir().join("config.json")
}

/// Get the path to the config directory (~/.gesturelink)
pub fn get_config_dir() -> PathBuf {
    home_dir_or_fallback().join(".gesturelink")
}

/// Get the home directory, falling back to /tmp if unavailable
fn home_dir_or_fallback() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        tracing::error!("Could not determine home directory, using /tmp");
        PathBuf::from("/tmp")
    })
}

/// Load configuration from disk
///
/// A missing file yields the defaults. Older schema versions are migrated
/// and written back.
pub fn load_from_path(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::info!("Config file not found at {}, using defaults", path.display());
        return Ok(Config::default());
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = serde_json::from_str(&contents)?;

    let original_version = config.version;
    let migrated = migrate_config(config)?;
    if migrated.version != original_version {
        save_to_path(&migrated, path)?;
    }

    Ok(migrated)
}

/// Save configuration to disk, creating the parent directory if needed
pub fn save_to_path(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }

    let contents = serde_json::to_string_pretty(config)?;
    fs::write(path, contents).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    tracing::info!("Config saved to {}", path.display());
    Ok(())
}

/// Load the configuration once at startup
///
/// Falls back to defaults (and logs) when the file cannot be used, so a
/// broken config never keeps the daemon from starting.
pub fn load_or_default(path: Option<&Path>) -> Config {
    let path = path.map(Path::to_path_buf).unwrap_or_else(get_config_path);
    match load_from_path(&path) {
        Ok(config) => {
            tracing::info!(
                "Config loaded: cooldown={}ms, page_match={}",
                config.gestures.cooldown_ms,
                config.browser.page_match
            );
            config
        }
        Err(e) => {
            tracing::error!("Failed to load config, using defaults: {}", e);
            Config::default()
        }
    }
}

/// Migrate configuration from older schema versions
fn migrate_config(mut config: Config) -> Result<Config, ConfigError> {
    let original_version = config.version;

    // Apply migrations sequentially
    while config.version < CURRENT_VERSION {
        config = apply_migration(config)?;
    }

    if config.version > CURRENT_VERSION {
        return Err(ConfigError::UnknownVersion(config.version));
    }

    if config.version != original_version {
        tracing::info!(
            "Migrated config from version {} to {}",
            original_version,
            config.version
        );
    }

    Ok(config)
}

/// Apply a single migration step
fn apply_migration(config: Config) -> Result<Config, ConfigError> {
    match config.version {
        // Version 0 -> 1: files written before the schema field existed.
        // The sections are unchanged, only the version is stamped.
        0 => {
            let mut migrated = config;
            migrated.version = 1;
            Ok(migrated)
        }
        v => Err(ConfigError::UnknownVersion(v)),
    }
}
