// Configuration loading and parsing (league.toml, model.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::feeds::cache::DEFAULT_MAX_AGE_HOURS;
use crate::feeds::sleeper::DEFAULT_BASE_URL;
use crate::valuation::linear::LinearModelOptions;
use crate::valuation::pwrb::PwrbWeights;

/// File name of the store when no explicit path is configured.
pub const DEFAULT_DB_FILE: &str = "dynasty-assistant.db";

const DEFAULT_KTC_URL: &str = "https://keeptradecut.com/dynasty-rankings";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub model: ModelConfig,
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    /// Empty disables the standings reports.
    #[serde(default)]
    pub league_id: String,
    /// Empty disables draft polling.
    #[serde(default)]
    pub draft_id: String,
    pub league_size: u32,
    pub poll_interval_secs: u64,
    #[serde(default)]
    pub rookie_pick_mode: bool,
    /// Year used in rookie pick placeholders; next calendar year when unset.
    #[serde(default)]
    pub rookie_year: Option<i32>,
    #[serde(default)]
    pub my_user_ids: Vec<String>,
    #[serde(default)]
    pub rankings_path: Option<String>,
    /// Empty places the store in the platform data directory.
    #[serde(default)]
    pub db_path: String,
}

impl LeagueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Configured rookie year, or the year after `current_year`.
    pub fn rookie_year_or(&self, current_year: i32) -> i32 {
        self.rookie_year.unwrap_or(current_year + 1)
    }
}

// ---------------------------------------------------------------------------
// model.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub pwrb: PwrbWeights,
    #[serde(default)]
    pub pwopr: LinearModelOptions,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub feeds: FeedsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_age_hours: i64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age_hours: DEFAULT_MAX_AGE_HOURS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedsConfig {
    pub sleeper_base_url: String,
    pub ktc_url: String,
    /// Receiver tracking metrics endpoint. Unset or empty disables the RTM
    /// component.
    pub rtm_url: Option<String>,
}

impl Default for FeedsConfig {
    fn default() -> Self {
        Self {
            sleeper_base_url: DEFAULT_BASE_URL.to_string(),
            ktc_url: DEFAULT_KTC_URL.to_string(),
            rtm_url: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/model.toml`, relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    // --- model.toml (required) ---
    let model_path = config_dir.join("model.toml");
    let model_text = read_file(&model_path)?;
    let model: ModelConfig = toml::from_str(&model_text).map_err(|e| ConfigError::ParseError {
        path: model_path.clone(),
        source: e,
    })?;

    let config = Config {
        league: league_file.league,
        model,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

/// Where the key-value store lives: the configured path, or
/// `<platform data dir>/dynasty-assistant.db`, or the working directory when
/// no home directory can be determined.
pub fn resolve_db_path(league: &LeagueConfig) -> PathBuf {
    if !league.db_path.trim().is_empty() {
        return PathBuf::from(league.db_path.trim());
    }
    directories::ProjectDirs::from("", "", "dynasty-assistant")
        .map(|dirs| dirs.data_dir().join(DEFAULT_DB_FILE))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: String) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message,
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;
    if league.league_size == 0 {
        return Err(invalid("league.league_size", "must be greater than 0".into()));
    }
    if league.poll_interval_secs == 0 {
        return Err(invalid("league.poll_interval_secs", "must be greater than 0".into()));
    }

    // PWRB weights must be non-negative, and the four blend weights cannot
    // all be zero.
    let w = &config.model.pwrb;
    let weight_fields: &[(&str, f64)] = &[
        ("pwrb.wor", w.wor),
        ("pwrb.cei", w.cei),
        ("pwrb.rwo", w.rwo),
        ("pwrb.stability", w.stability),
        ("pwrb.rush_share_weight", w.rush_share_weight),
        ("pwrb.target_share_weight", w.target_share_weight),
        ("pwrb.cei_yards_created", w.cei_yards_created),
        ("pwrb.cei_missed_tackles_per_touch", w.cei_missed_tackles_per_touch),
        ("pwrb.cei_breakaway_rate", w.cei_breakaway_rate),
        ("pwrb.cei_success_rate", w.cei_success_rate),
        ("pwrb.rwo_per_target", w.rwo_per_target),
        ("pwrb.age_penalty_per_year_over_25", w.age_penalty_per_year_over_25),
    ];
    for (name, val) in weight_fields {
        if !val.is_finite() || *val < 0.0 {
            return Err(invalid(name, format!("must be >= 0, got {val}")));
        }
    }
    if w.wor + w.cei + w.rwo + w.stability <= 0.0 {
        return Err(invalid(
            "pwrb",
            "at least one of wor, cei, rwo, stability must be > 0".into(),
        ));
    }

    let p = &config.model.pwopr;
    if p.min_by_pos_samples == 0 {
        return Err(invalid("pwopr.min_by_pos_samples", "must be > 0".into()));
    }
    if p.r2_tolerance < 0.0 {
        return Err(invalid(
            "pwopr.r2_tolerance",
            format!("must be >= 0, got {}", p.r2_tolerance),
        ));
    }
    if p.clamp_min >= p.clamp_max {
        return Err(invalid(
            "pwopr.clamp_min",
            format!("must be below clamp_max ({}), got {}", p.clamp_max, p.clamp_min),
        ));
    }
    if p.weak_threshold <= 0.0 || p.strong_threshold < p.weak_threshold {
        return Err(invalid(
            "pwopr.strong_threshold",
            format!(
                "need 0 < weak_threshold <= strong_threshold, got {} / {}",
                p.weak_threshold, p.strong_threshold
            ),
        ));
    }

    if config.model.cache.max_age_hours <= 0 {
        return Err(invalid(
            "cache.max_age_hours",
            format!("must be > 0, got {}", config.model.cache.max_age_hours),
        ));
    }

    let feeds = &config.model.feeds;
    if feeds.sleeper_base_url.trim().is_empty() {
        return Err(invalid("feeds.sleeper_base_url", "must not be empty".into()));
    }
    if feeds.ktc_url.trim().is_empty() {
        return Err(invalid("feeds.ktc_url", "must not be empty".into()));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
