//! Runtime configuration.
//!
//! Settings come from an optional TOML file and are then overridden by
//! environment variables, so a scheduler can configure an invocation with
//! env alone. A missing file yields `Config::default()`. Unknown keys are
//! accepted but logged as likely typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// An environment override could not be parsed.
    #[error("Invalid value {value:?} for {var}")]
    Env { var: &'static str, value: String },

    /// Settings are individually valid but unusable together.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Struct
// ============================================================================

/// Top-level configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// The Debug impl masks `smtp_password` and `reader_api_key`.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retention window: entries older than this many days are never ingested.
    pub days_to_retrieve: u32,

    /// SQLite file backing the record store.
    pub database_path: String,

    /// Directory backing the snapshot blob store.
    pub snapshot_dir: PathBuf,

    /// Whether to mail a notification for every newly ingested post.
    pub send_emails: bool,
    pub to_email: Option<String>,
    pub from_email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,

    /// Base URL of an article reader service. When unset, article pages are
    /// fetched directly from their own hosts.
    pub reader_base_url: Option<String>,
    pub reader_api_key: Option<String>,

    /// Entity detection endpoint. When unset every post is tagged `none`.
    pub tagger_url: Option<String>,

    /// Language code passed to the entity tagger.
    pub language_code: String,

    /// Maximum posts requested per record-store page.
    pub page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            days_to_retrieve: 30,
            database_path: "feedsync.db".to_string(),
            snapshot_dir: PathBuf::from("snapshots"),
            send_emails: false,
            to_email: None,
            from_email: None,
            smtp_host: None,
            smtp_username: None,
            smtp_password: None,
            reader_base_url: None,
            reader_api_key: None,
            tagger_url: None,
            language_code: "en".to_string(),
            page_size: 100,
        }
    }
}

fn redacted(secret: &Option<String>) -> Option<&'static str> {
    secret.as_ref().map(|_| "[REDACTED]")
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("days_to_retrieve", &self.days_to_retrieve)
            .field("database_path", &self.database_path)
            .field("snapshot_dir", &self.snapshot_dir)
            .field("send_emails", &self.send_emails)
            .field("to_email", &self.to_email)
            .field("from_email", &self.from_email)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &redacted(&self.smtp_password))
            .field("reader_base_url", &self.reader_base_url)
            .field("reader_api_key", &redacted(&self.reader_api_key))
            .field("tagger_url", &self.tagger_url)
            .field("language_code", &self.language_code)
            .field("page_size", &self.page_size)
            .finish()
    }
}

const KNOWN_KEYS: &[&str] = &[
    "days_to_retrieve",
    "database_path",
    "snapshot_dir",
    "send_emails",
    "to_email",
    "from_email",
    "smtp_host",
    "smtp_username",
    "smtp_password",
    "reader_base_url",
    "reader_api_key",
    "tagger_url",
    "language_code",
    "page_size",
];

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" | "true" | "1" => Some(true),
        "n" | "no" | "false" | "0" | "" => Some(false),
        _ => None,
    }
}

fn parse_number(var: &'static str, value: String) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Env { var, value })
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        tracing::info!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Overrides settings from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_from(|var| std::env::var(var).ok())
    }

    /// Overrides settings from `lookup`, which maps an env var name to its
    /// value. Env values win over file values.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DAYS_TO_RETRIEVE") {
            self.days_to_retrieve = parse_number("DAYS_TO_RETRIEVE", v)?;
        }
        if let Some(v) = lookup("PAGE_SIZE") {
            self.page_size = parse_number("PAGE_SIZE", v)?;
        }
        if let Some(v) = lookup("SEND_EMAILS") {
            self.send_emails = parse_flag(&v).ok_or(ConfigError::Env {
                var: "SEND_EMAILS",
                value: v,
            })?;
        }
        if let Some(v) = lookup("DATABASE_PATH") {
            self.database_path = v;
        }
        if let Some(v) = lookup("SNAPSHOT_DIR") {
            self.snapshot_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("LANGUAGE_CODE") {
            self.language_code = v;
        }

        let optional: [(&str, &mut Option<String>); 8] = [
            ("TO_EMAIL", &mut self.to_email),
            ("FROM_EMAIL", &mut self.from_email),
            ("SMTP_HOST", &mut self.smtp_host),
            ("SMTP_USERNAME", &mut self.smtp_username),
            ("SMTP_PASSWORD", &mut self.smtp_password),
            ("READER_BASE_URL", &mut self.reader_base_url),
            ("READER_API_KEY", &mut self.reader_api_key),
            ("TAGGER_URL", &mut self.tagger_url),
        ];
        for (var, slot) in optional {
            if let Some(v) = lookup(var).filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }
        // Legacy name for the reader key
        if self.reader_api_key.is_none() {
            self.reader_api_key = lookup("JINA_API_KEY").filter(|v| !v.trim().is_empty());
        }

        Ok(())
    }

    /// Checks settings that only make sense together.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.days_to_retrieve == 0 {
            return Err(ConfigError::Invalid(
                "days_to_retrieve must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Invalid(
                "page_size must be at least 1".to_string(),
            ));
        }
        if self.send_emails {
            let missing: Vec<&str> = [
                ("to_email", &self.to_email),
                ("from_email", &self.from_email),
                ("smtp_host", &self.smtp_host),
            ]
            .into_iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| name)
            .collect();
            if !missing.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "send_emails is on but {} not set",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
