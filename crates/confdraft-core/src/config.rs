// Configuration loading and parsing (config/draft.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::draft::UserId;

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
    pub rules: DraftRules,
    pub server: ServerConfig,
    pub db_path: String,
    pub busy_timeout: Duration,
    pub catalog_path: PathBuf,
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// draft.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire draft.toml file.
#[derive(Debug, Clone, Deserialize)]
struct DraftFile {
    #[serde(default)]
    draft: DraftRules,
    server: ServerConfig,
    database: DatabaseSection,
    catalog: CatalogSection,
    logging: LoggingConfig,
}

/// The numeric rules a draft is run under.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DraftRules {
    /// Main-stage picks each participant may make. Claims don't count.
    pub default_pick_limit: u32,
    /// Members a single group may hold within one draft.
    pub group_capacity: u32,
    /// Smallest roster `start_draft` accepts.
    pub min_participants: usize,
    /// Number of picks included in a status report.
    pub status_pick_window: u32,
}

impl Default for DraftRules {
    fn default() -> Self {
        DraftRules {
            default_pick_limit: 7,
            group_capacity: 2,
            min_participants: 2,
            status_pick_window: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Users allowed to start and end drafts. Empty means anyone may.
    #[serde(default)]
    pub admin_user_ids: Vec<UserId>,
}

impl ServerConfig {
    pub fn is_admin(&self, user: UserId) -> bool {
        self.admin_user_ids.is_empty() || self.admin_user_ids.contains(&user)
    }
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
    busy_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogSection {
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Directory the log file is written to, relative to the working dir.
    pub directory: String,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub filter: String,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/draft.toml` relative to the
/// given `base_dir`. Relative catalog paths resolve against `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join("draft.toml");
    let text = read_file(&path)?;
    let file: DraftFile = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;

    let config = Config {
        rules: file.draft,
        server: file.server,
        db_path: file.database.path,
        busy_timeout: Duration::from_millis(file.database.busy_timeout_ms),
        catalog_path: base_dir.join(file.catalog.path),
        logging: file.logging,
    };

    validate(&config)?;

    Ok(config)
}

/// Seed `config/` with any `.toml` file from `defaults/` it lacks and return
/// the paths written. Existing files are never overwritten. The catalog JSON
/// is read straight from `defaults/` and is not copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");
    let fail = |message: String| ConfigError::DefaultsCopyError { message };

    if !defaults_dir.exists() {
        return if config_dir.exists() {
            Ok(vec![])
        } else {
            Err(fail(format!(
                "no defaults/ or config/ directory in {}",
                base_dir.display()
            )))
        };
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| fail(format!("cannot create {}: {e}", config_dir.display())))?;
    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| fail(format!("cannot read {}: {e}", defaults_dir.display())))?;

    let mut copied = Vec::new();
    for entry in entries {
        let source = entry.map_err(|e| fail(e.to_string()))?.path();
        if !source.is_file() || source.extension().map_or(true, |ext| ext != "toml") {
            continue;
        }
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }
        std::fs::copy(&source, &target).map_err(|e| {
            fail(format!(
                "cannot copy {} to {}: {e}",
                source.display(),
                target.display()
            ))
        })?;
        copied.push(target);
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

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let rules = &config.rules;
    let positive: &[(&str, u32)] = &[
        ("draft.default_pick_limit", rules.default_pick_limit),
        ("draft.group_capacity", rules.group_capacity),
        ("draft.status_pick_window", rules.status_pick_window),
    ];
    for (name, val) in positive {
        if *val == 0 {
            return Err(ConfigError::ValidationError {
                field: name.to_string(),
                message: "must be > 0".into(),
            });
        }
    }

    if rules.min_participants == 0 {
        return Err(ConfigError::ValidationError {
            field: "draft.min_participants".into(),
            message: "must be at least 1".into(),
        });
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.port".into(),
            message: "must be greater than 0".into(),
        });
    }

    if config.db_path.trim().is_empty() {
        return Err(ConfigError::ValidationError {
            field: "database.path".into(),
            message: "must not be empty".into(),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
