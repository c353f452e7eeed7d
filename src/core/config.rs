// Configuration module for Alliance Dashboard Player

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use super::error::ConfigError;
use super::fields::{alliance_fields, apply_overrides, FieldDescriptor, FieldOverride};
use super::locator::Selector;

/// Default configuration shipped inside the script
const EMBEDDED_CONFIG: &str = include_str!("../../dashboard.toml");

// =============================================================================
// CONFIGURATION STRUCTURES
// =============================================================================

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default filter directive when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write logs to stderr (native) or the browser console (web)
    #[serde(default = "default_console")]
    pub console: bool,
    /// Log file path, native only. Empty = no file logging.
    #[serde(default)]
    pub log_file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_console() -> bool {
    true
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: default_console(),
            log_file: String::new(),
        }
    }
}

/// Host page watching: container probe, settle timing, polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherSettings {
    /// Host container selectors, tried in order (`a || b`)
    #[serde(default = "default_container")]
    pub container: String,
    /// Quiet period after the last host mutation before the page counts as settled
    #[serde(default = "default_quiet_ms")]
    pub quiet_ms: u64,
    /// Upper bound on one debounce window, so a mutation storm still settles
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
    /// Periodic re-extraction interval (0 = disabled)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Tick interval of the web layer's timer
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_probe_initial_ms")]
    pub probe_initial_ms: u64,
    #[serde(default = "default_probe_max_delay_ms")]
    pub probe_max_delay_ms: u64,
    /// Container probes before the host is declared incompatible
    #[serde(default = "default_probe_max_attempts")]
    pub probe_max_attempts: u32,
}

fn default_container() -> String {
    "#game-root || [data-game-root] || main".to_string()
}
fn default_quiet_ms() -> u64 {
    400
}
fn default_max_wait_ms() -> u64 {
    3_000
}
fn default_poll_interval_ms() -> u64 {
    30_000
}
fn default_tick_ms() -> u64 {
    100
}
fn default_probe_initial_ms() -> u64 {
    250
}
fn default_probe_max_delay_ms() -> u64 {
    4_000
}
fn default_probe_max_attempts() -> u32 {
    10
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self {
            container: default_container(),
            quiet_ms: default_quiet_ms(),
            max_wait_ms: default_max_wait_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            tick_ms: default_tick_ms(),
            probe_initial_ms: default_probe_initial_ms(),
            probe_max_delay_ms: default_probe_max_delay_ms(),
            probe_max_attempts: default_probe_max_attempts(),
        }
    }
}

impl WatcherSettings {
    /// Container selector strings in fallback order
    pub fn container_selectors(&self) -> Vec<String> {
        self.container
            .split("||")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Screen corner the overlay is pinned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Corner {
    #[default]
    TopRight,
    TopLeft,
    BottomRight,
    BottomLeft,
}

/// Overlay display settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlaySettings {
    /// Background color as hex string "#RRGGBB"
    #[serde(default = "default_bg_color")]
    pub background_color: String,

    /// Background opacity (0.0 = transparent, 1.0 = opaque)
    #[serde(default = "default_bg_opacity")]
    pub background_opacity: f32,

    /// Main text color "#RRGGBB"
    #[serde(default = "default_text_color")]
    pub text_color: String,

    /// Secondary text color "#RRGGBB"
    #[serde(default = "default_muted_color")]
    pub muted_color: String,

    /// Badge color when data is stale "#RRGGBB"
    #[serde(default = "default_stale_color")]
    pub stale_color: String,

    #[serde(default)]
    pub corner: Corner,

    /// Margin from the pinned corner in pixels
    #[serde(default = "default_offset_px")]
    pub offset_px: u32,

    /// Header template
    /// Variables: {alliance}, {tag}, {members}, {resources}, {power}
    /// Markers: $n = newline
    #[serde(default = "default_status_template")]
    pub status_template: String,

    /// Age after which the data is flagged stale
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Roster rows shown before collapsing into "+ N more"
    #[serde(default = "default_max_roster_rows")]
    pub max_roster_rows: usize,

    #[serde(default = "default_mount_retry_initial_ms")]
    pub mount_retry_initial_ms: u64,
    #[serde(default = "default_mount_retry_max_ms")]
    pub mount_retry_max_ms: u64,
}

fn default_bg_color() -> String {
    "#141414".to_string()
}
fn default_bg_opacity() -> f32 {
    0.85
}
fn default_text_color() -> String {
    "#FFFFFF".to_string()
}
fn default_muted_color() -> String {
    "#9A9A9A".to_string()
}
fn default_stale_color() -> String {
    "#E0A030".to_string()
}
fn default_offset_px() -> u32 {
    16
}
fn default_status_template() -> String {
    "{alliance} [{tag}]$n{members} members".to_string()
}
fn default_stale_after_secs() -> u64 {
    120
}
fn default_max_roster_rows() -> usize {
    15
}
fn default_mount_retry_initial_ms() -> u64 {
    200
}
fn default_mount_retry_max_ms() -> u64 {
    5_000
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            background_color: default_bg_color(),
            background_opacity: default_bg_opacity(),
            text_color: default_text_color(),
            muted_color: default_muted_color(),
            stale_color: default_stale_color(),
            corner: Corner::default(),
            offset_px: default_offset_px(),
            status_template: default_status_template(),
            stale_after_secs: default_stale_after_secs(),
            max_roster_rows: default_max_roster_rows(),
            mount_retry_initial_ms: default_mount_retry_initial_ms(),
            mount_retry_max_ms: default_mount_retry_max_ms(),
        }
    }
}

/// Userscript packaging metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackagingSettings {
    #[serde(default = "default_script_name")]
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_description")]
    pub description: String,
    /// Page URL patterns (`*` wildcards) the script runs on
    #[serde(default = "default_matches")]
    pub matches: Vec<String>,
}

fn default_script_name() -> String {
    "Alliance Dashboard Player".to_string()
}
fn default_namespace() -> String {
    "https://github.com/wospins/alliance-dashboard-player".to_string()
}
fn default_description() -> String {
    "Live alliance dashboard overlay".to_string()
}
fn default_matches() -> Vec<String> {
    vec!["https://*.example/*".to_string()]
}

impl Default for PackagingSettings {
    fn default() -> Self {
        Self {
            name: default_script_name(),
            namespace: default_namespace(),
            description: default_description(),
            matches: default_matches(),
        }
    }
}

/// An in-page global whose JSON value is captured as a payload channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadSource {
    pub channel: String,
    /// Dotted path from `window`, e.g. `game.state.alliance`
    pub global: String,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub watcher: WatcherSettings,
    #[serde(default)]
    pub overlay: OverlaySettings,
    #[serde(default)]
    pub packaging: PackagingSettings,
    #[serde(default)]
    pub payloads: Vec<PayloadSource>,
    /// Per-field locator/requiredness overrides
    #[serde(default)]
    pub fields: Vec<FieldOverride>,
}

// =============================================================================
// CONFIG LOADING
// =============================================================================

impl Config {
    pub const CONFIG_FILENAME: &'static str = "dashboard.toml";

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration compiled into the script
    pub fn embedded() -> Result<Self, ConfigError> {
        Self::from_toml_str(EMBEDDED_CONFIG)
    }

    /// Load a configuration file from disk
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "[config] Loading");
        let contents = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!(
            path = %path.display(),
            overrides = config.fields.len(),
            "[config] Loaded config"
        );
        Ok(config)
    }

    /// The default field table with this configuration's overrides applied
    pub fn field_table(&self) -> Result<Vec<FieldDescriptor>, ConfigError> {
        let defaults = alliance_fields().map_err(|source| ConfigError::Locator {
            field: "<defaults>".to_string(),
            source,
        })?;
        apply_overrides(defaults, &self.fields)
    }

    /// Reject configurations that would only fail later, at extraction time
    pub fn validate(&self) -> Result<(), ConfigError> {
        for selector in self.watcher.container_selectors() {
            Selector::parse(&selector).map_err(|source| ConfigError::Locator {
                field: "watcher.container".to_string(),
                source,
            })?;
        }
        self.field_table().map(|_| ())
    }
}
