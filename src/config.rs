use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "jeongwonbot.json";

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// Failed to read the config file.
    ReadFile { path: PathBuf, source: std::io::Error },
    /// Failed to parse JSON.
    ParseJson { path: PathBuf, source: serde_json::Error },
    /// An environment variable holds something that is not a Discord id.
    InvalidId { key: String, value: String },
    /// Validation error.
    Validation(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFile { path, source } => {
                write!(f, "failed to read config file '{}': {}", path.display(), source)
            }
            Self::ParseJson { path, source } => {
                write!(f, "failed to parse config file '{}': {}", path.display(), source)
            }
            Self::InvalidId { key, value } => {
                write!(f, "{} contains an invalid id: '{}'", key, value)
            }
            Self::Validation(msg) => write!(f, "config validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ReadFile { source, .. } => Some(source),
            Self::ParseJson { source, .. } => Some(source),
            Self::InvalidId { .. } | Self::Validation(_) => None,
        }
    }
}

#[derive(Deserialize, Default)]
struct ConfigFile {
    discord_bot_token: Option<String>,
    gemini_api_key: Option<String>,
    /// Forum channels whose threads the bot answers in.
    forum_ids: Option<Vec<u64>>,
    /// Threads carrying this tag get no automatic comment. `0` disables it.
    exclusion_tag_id: Option<u64>,
    light_model: Option<String>,
    capable_model: Option<String>,
    starter_fetch_attempts: Option<u32>,
    starter_fetch_delay_ms: Option<u64>,
    new_thread_window_secs: Option<u64>,
    log_channel_id: Option<u64>,
    /// Directory for log files. Defaults to current directory.
    data_dir: Option<String>,
}

const DEFAULT_FORUM_IDS: [u64; 2] = [1133385697454206986, 1429846734884044830];
const DEFAULT_EXCLUSION_TAG_ID: u64 = 1429845877484163082;
const DEFAULT_LIGHT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_CAPABLE_MODEL: &str = "gemini-2.5-pro";

/// Gemini model names for the two generation tiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTiers {
    /// Text-only posts.
    pub light: String,
    /// Posts with images or links, and every mention.
    pub capable: String,
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of tries, including the first one.
    pub attempts: u32,
    /// Sleep before the second try; doubled for each further try.
    pub initial_delay: Duration,
}

impl RetryPolicy {
    pub const ONCE: RetryPolicy = RetryPolicy {
        attempts: 1,
        initial_delay: Duration::ZERO,
    };
}

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_bot_token: String,
    pub gemini_api_key: String,
    pub forum_ids: Vec<u64>,
    pub exclusion_tag_id: Option<u64>,
    pub models: ModelTiers,
    /// Policy for fetching a freshly created thread's starter message.
    pub starter_fetch: RetryPolicy,
    /// Threads older than this on `thread_create` are treated as backfill.
    pub new_thread_window: Duration,
    /// Discord channel receiving a copy of the logs.
    pub log_channel_id: Option<u64>,
    pub data_dir: PathBuf,
}

impl Config {
    /// Load from an optional JSON file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    pub fn load_with_env<E>(path: Option<&Path>, env: E) -> Result<Self, ConfigError>
    where
        E: Fn(&str) -> Option<String>,
    {
        let file = match path {
            Some(path) => {
                let config_path = path.to_path_buf();
                let content = std::fs::read_to_string(&config_path)
                    .map_err(|e| ConfigError::ReadFile { path: config_path.clone(), source: e })?;
                serde_json::from_str(&content)
                    .map_err(|e| ConfigError::ParseJson { path: config_path, source: e })?
            }
            None => ConfigFile::default(),
        };

        let lookup = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let discord_bot_token = lookup("DISCORD_BOT_TOKEN")
            .or(file.discord_bot_token)
            .unwrap_or_default();
        let gemini_api_key = lookup("GEMINI_API_KEY")
            .or(file.gemini_api_key)
            .unwrap_or_default();

        let forum_ids = match lookup("TARGET_FORUM_IDS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse_id("TARGET_FORUM_IDS", s))
                .collect::<Result<Vec<_>, _>>()?,
            None => file.forum_ids.unwrap_or_else(|| DEFAULT_FORUM_IDS.to_vec()),
        };

        let exclusion_tag_id = match lookup("EXCLUSION_TAG_ID") {
            Some(raw) => parse_id("EXCLUSION_TAG_ID", &raw)?,
            None => file.exclusion_tag_id.unwrap_or(DEFAULT_EXCLUSION_TAG_ID),
        };
        // Snowflakes are never 0, so it is free to mean "no exclusion tag".
        let exclusion_tag_id = (exclusion_tag_id != 0).then_some(exclusion_tag_id);

        let log_channel_id = match lookup("LOG_CHANNEL_ID") {
            Some(raw) => Some(parse_id("LOG_CHANNEL_ID", &raw)?),
            None => file.log_channel_id,
        };

        let models = ModelTiers {
            light: lookup("GEMINI_LIGHT_MODEL")
                .or(file.light_model)
                .unwrap_or_else(|| DEFAULT_LIGHT_MODEL.to_string()),
            capable: lookup("GEMINI_CAPABLE_MODEL")
                .or(file.capable_model)
                .unwrap_or_else(|| DEFAULT_CAPABLE_MODEL.to_string()),
        };

        if discord_bot_token.is_empty() {
            return Err(ConfigError::Validation("discord_bot_token is required (DISCORD_BOT_TOKEN)".into()));
        }
        if gemini_api_key.is_empty() {
            return Err(ConfigError::Validation("gemini_api_key is required (GEMINI_API_KEY)".into()));
        }
        if forum_ids.is_empty() {
            return Err(ConfigError::Validation("forum_ids must contain at least one forum id".into()));
        }

        let attempts = file.starter_fetch_attempts.unwrap_or(4);
        if attempts == 0 {
            return Err(ConfigError::Validation("starter_fetch_attempts must be at least 1".into()));
        }
        let starter_fetch = RetryPolicy {
            attempts,
            initial_delay: Duration::from_millis(file.starter_fetch_delay_ms.unwrap_or(1000)),
        };

        let data_dir = file
            .data_dir
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            discord_bot_token,
            gemini_api_key,
            forum_ids,
            exclusion_tag_id,
            models,
            starter_fetch,
            new_thread_window: Duration::from_secs(file.new_thread_window_secs.unwrap_or(300)),
            log_channel_id,
            data_dir,
        })
    }

    pub fn is_target_forum(&self, parent_id: Option<u64>) -> bool {
        parent_id.is_some_and(|id| self.forum_ids.contains(&id))
    }

    pub fn is_excluded(&self, applied_tags: &[u64]) -> bool {
        self.exclusion_tag_id
            .is_some_and(|tag| applied_tags.contains(&tag))
    }
}

fn parse_id(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidId {
        key: key.to_string(),
        value: value.to_string(),
    })
}
