//! Application configuration module
//! This module handles the application configuration including loading,
//! validating and saving configuration settings.
//! Credentials never live in the configuration file; see [`Credentials`].

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::ConfigError;
use crate::providers::SamplingParams;
use crate::translation::filter::FilterCategories;
use crate::translation::rotation::RotationPlan;

pub const OPENROUTER_API_KEY: &str = "OPENROUTER_API_KEY";
pub const CUSTOM_ENDPOINT_KEY: &str = "CUSTOM_ENDPOINT_KEY";
pub const CUSTOM_ENDPOINT_URL: &str = "CUSTOM_ENDPOINT_URL";

/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    // @field: Model identifier on OpenRouter
    pub model: String,

    // @field: Token budget per chunk
    pub chunk_tokens: usize,

    // @field: Tokenizer encoding used for chunk budgets
    pub token_encoding: String,

    pub temperature: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub top_p: f32,

    // @field: 0 disables top_k
    pub top_k: u32,

    // @field: Per-attempt timeout in seconds
    pub timeout: f64,

    // @field: OpenRouter providers in rotation order
    pub selected_providers: Vec<String>,

    pub retries_per_provider: u32,

    // @field: Send and update characters, places and terms
    pub context_mode: bool,

    // @field: Send and update translation notes
    pub notes_mode: bool,

    // @field: Put instructions in the last user message
    pub power_steering: bool,

    pub send_previous: bool,
    pub previous_chapters: usize,
    pub send_previous_chunks: bool,
    pub concurrent_workers: usize,

    pub context_filter_enabled: bool,
    pub context_filter_characters: bool,
    pub context_filter_places: bool,
    pub context_filter_terms: bool,

    pub use_custom_endpoint: bool,
    pub custom_endpoint_url: String,
    pub custom_endpoint_model: String,

    pub target_language: String,

    // @field: Optional JSON file overriding prompt templates
    pub prompts_file: Option<PathBuf>,

    pub chapter_selection: ChapterSelection,

    pub log_level: LogLevel,
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// How chapters are selected
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Range,
    Csv,
}

/// Chapter selection, either an inclusive range or a list like `1,3,5-7`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ChapterSelection {
    pub mode: SelectionMode,
    pub start: u32,
    // @field: None selects through the last chapter
    pub end: Option<u32>,
    pub csv: String,
}

impl Default for ChapterSelection {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Range,
            start: 1,
            end: None,
            csv: String::new(),
        }
    }
}

impl ChapterSelection {
    pub fn range(start: u32, end: Option<u32>) -> Self {
        Self {
            mode: SelectionMode::Range,
            start,
            end,
            csv: String::new(),
        }
    }

    pub fn csv(list: impl Into<String>) -> Self {
        Self {
            mode: SelectionMode::Csv,
            csv: list.into(),
            ..Self::default()
        }
    }

    /// Resolve to sorted 1-based chapter numbers for a document with `total` chapters
    pub fn resolve(&self, total: usize) -> Result<Vec<u32>, ConfigError> {
        let chapters = match self.mode {
            SelectionMode::Range => {
                let end = self.end.unwrap_or(total as u32);
                if self.start == 0 || self.start > end {
                    return Err(ConfigError::InvalidChapterSelection {
                        input: format!("{}-{}", self.start, end),
                        message: "range must satisfy 1 <= start <= end".to_string(),
                    });
                }
                (self.start..=end).collect()
            }
            SelectionMode::Csv => parse_chapter_list(&self.csv)?,
        };

        if let Some(&chapter) = chapters.iter().find(|&&c| c as usize > total) {
            return Err(ConfigError::ChapterOutOfRange { chapter, total });
        }
        Ok(chapters)
    }
}

/// Parse `"1,3,5-7"` into sorted, de-duplicated chapter numbers
pub fn parse_chapter_list(input: &str) -> Result<Vec<u32>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidChapterSelection {
        input: input.to_string(),
        message,
    };
    let number = |part: &str| -> Result<u32, ConfigError> {
        match part.trim().parse::<u32>() {
            Ok(0) => Err(invalid("chapter numbers start at 1".to_string())),
            Ok(n) => Ok(n),
            Err(_) => Err(invalid(format!("'{}' is not a chapter number", part.trim()))),
        }
    };

    let mut chapters = BTreeSet::new();
    for part in input.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let (start, end) = (number(start)?, number(end)?);
                if start > end {
                    return Err(invalid(format!("range '{}' is reversed", part)));
                }
                chapters.extend(start..=end);
            }
            None => {
                chapters.insert(number(part)?);
            }
        }
    }

    if chapters.is_empty() {
        return Err(invalid("no chapters selected".to_string()));
    }
    Ok(chapters.into_iter().collect())
}

/// Secrets read from the environment and an optional `.env` file
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub openrouter_api_key: Option<String>,
    pub custom_endpoint_key: Option<String>,
    pub custom_endpoint_url: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<set>");
        f.debug_struct("Credentials")
            .field("openrouter_api_key", &redact(&self.openrouter_api_key))
            .field("custom_endpoint_key", &redact(&self.custom_endpoint_key))
            .field("custom_endpoint_url", &self.custom_endpoint_url)
            .finish()
    }
}

impl Credentials {
    /// Build from a variable lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            openrouter_api_key: get(OPENROUTER_API_KEY),
            custom_endpoint_key: get(CUSTOM_ENDPOINT_KEY),
            custom_endpoint_url: get(CUSTOM_ENDPOINT_URL),
        }
    }

    /// Process environment only
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Variables from the dotenv file `env_file` take precedence over the process environment
    pub fn from_env_file(env_file: &Path) -> Self {
        let file_vars = read_env_file(env_file);
        Self::from_lookup(|name| file_vars.get(name).cloned().or_else(|| std::env::var(name).ok()))
    }
}

/// Parse a dotenv file without touching the process environment
fn read_env_file(env_file: &Path) -> HashMap<String, String> {
    let entries = match dotenvy::from_path_iter(env_file) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("No env file loaded from {:?}: {}", env_file, e);
            return HashMap::new();
        }
    };

    let mut vars = HashMap::new();
    for entry in entries {
        match entry {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(e) => warn!("Skipping unreadable line in {:?}: {}", env_file, e),
        }
    }
    vars
}

fn default_providers() -> Vec<String> {
    ["novita/fp8", "siliconflow/fp8", "deepinfra/fp4", "gmicloud/fp8"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Self {
            model: "deepseek/deepseek-v3.2-exp".to_string(),
            chunk_tokens: 7000,
            token_encoding: crate::translation::chunker::DEFAULT_ENCODING.to_string(),
            temperature: 0.9,
            max_tokens: 12000,
            frequency_penalty: 0.0,
            top_p: 0.95,
            top_k: 0,
            timeout: 10.0,
            selected_providers: default_providers(),
            retries_per_provider: 2,
            context_mode: true,
            notes_mode: false,
            power_steering: false,
            send_previous: false,
            previous_chapters: 1,
            send_previous_chunks: false,
            concurrent_workers: 1,
            context_filter_enabled: false,
            context_filter_characters: false,
            context_filter_places: true,
            context_filter_terms: true,
            use_custom_endpoint: false,
            custom_endpoint_url: "https://llm.chutes.ai/v1".to_string(),
            custom_endpoint_model: "deepseek-ai/DeepSeek-V3.2-Exp".to_string(),
            target_language: "English".to_string(),
            prompts_file: None,
            chapter_selection: ChapterSelection::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load from a JSON file; missing keys take defaults, unknown keys are ignored
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;
        let content =
            fs::read_to_string(path).with_context(|| format!("Failed to open config file: {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Write as pretty JSON. Credentials are not part of `Config`, so nothing secret is saved.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        use anyhow::Context;
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config to JSON")?;
        crate::file_utils::FileManager::write_to_file(path, &json)
    }

    /// Repair values that have a sensible fallback
    pub fn normalize(&mut self) {
        if self.selected_providers.iter().all(|p| p.trim().is_empty()) {
            warn!("No providers selected, using the default provider list");
            self.selected_providers = default_providers();
        } else {
            self.selected_providers.retain(|p| !p.trim().is_empty());
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self, credentials: &Credentials) -> Result<(), ConfigError> {
        self.validate_settings()?;

        if self.use_custom_endpoint {
            if credentials.custom_endpoint_key.is_none() {
                return Err(ConfigError::MissingCredential(CUSTOM_ENDPOINT_KEY.to_string()));
            }
            if self.endpoint_url(credentials).trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "customEndpointUrl".to_string(),
                    message: "must not be empty".to_string(),
                });
            }
        } else if credentials.openrouter_api_key.is_none() {
            return Err(ConfigError::MissingCredential(OPENROUTER_API_KEY.to_string()));
        }

        Ok(())
    }

    /// Checks that do not depend on credentials
    pub fn validate_settings(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, message: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.to_string(),
        };

        if self.chunk_tokens == 0 {
            return Err(invalid("chunkTokens", "must be greater than 0"));
        }
        if self.retries_per_provider == 0 {
            return Err(invalid("retriesPerProvider", "must be greater than 0"));
        }
        if self.concurrent_workers == 0 {
            return Err(invalid("concurrentWorkers", "must be greater than 0"));
        }
        if !(self.timeout.is_finite() && self.timeout > 0.0) {
            return Err(invalid("timeout", "must be a positive number of seconds"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(invalid("temperature", "must be between 0 and 2"));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(invalid("topP", "must be between 0 and 1"));
        }
        Ok(())
    }

    /// Custom endpoint URL, with the environment override applied
    pub fn endpoint_url(&self, credentials: &Credentials) -> String {
        credentials
            .custom_endpoint_url
            .clone()
            .unwrap_or_else(|| self.custom_endpoint_url.clone())
    }

    /// Model actually sent to the endpoint
    pub fn active_model(&self) -> &str {
        if self.use_custom_endpoint {
            &self.custom_endpoint_model
        } else {
            &self.model
        }
    }

    pub fn timeout_duration(&self) -> Duration {
        if self.timeout.is_finite() && self.timeout > 0.0 {
            Duration::from_secs_f64(self.timeout)
        } else {
            Duration::from_secs(10)
        }
    }

    /// Providers and retries the rotation walks through
    pub fn rotation_plan(&self) -> RotationPlan {
        if self.use_custom_endpoint {
            RotationPlan::single_endpoint(self.retries_per_provider)
        } else {
            RotationPlan::routed(self.selected_providers.iter().cloned(), self.retries_per_provider)
        }
    }

    pub fn sampling_params(&self) -> SamplingParams {
        SamplingParams {
            model: self.active_model().to_string(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            frequency_penalty: self.frequency_penalty,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }

    pub fn filter_categories(&self) -> FilterCategories {
        FilterCategories {
            characters: self.context_filter_characters,
            places: self.context_filter_places,
            terms: self.context_filter_terms,
        }
    }

    /// Worker count clamped to the number of jobs
    pub fn effective_workers(&self, jobs: usize) -> usize {
        self.concurrent_workers.clamp(1, jobs.max(1))
    }
}
