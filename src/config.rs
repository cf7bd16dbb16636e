use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::engine::llm_client::{ModelParams, DEFAULT_BASE_URL};
use crate::error::ConfigError;

pub const AVAILABLE_MODELS: &[&str] = &[
    "gemini-1.0-pro",
    "gemini-1.5-pro-latest",
    "gemini-1.5-flash-latest",
    "gemini-2.0-flash",
    "gemini-2.5-flash-preview-04-17",
];

/// What happens to an edited effect's descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegenerationPolicy {
    /// Keep descendants and append a stale marker to their text.
    #[default]
    MarkStale,
    /// Regrow the subtree from the edited text.
    Regenerate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model_name: String,
    pub available_models: Vec<String>,

    /// Effects generated per parent at every level.
    pub num_effects: usize,
    pub max_depth: usize,

    pub max_parallel_calls: usize,
    pub enable_caching: bool,
    /// Seconds.
    pub cache_ttl: u64,

    pub temperature: f64,
    pub top_p: f64,
    pub top_k: u32,

    pub cache_dir: PathBuf,
    pub saved_dir: PathBuf,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub regeneration: RegenerationPolicy,

    /// Set when `GEMINI_MODEL` or the command line chose the model; such
    /// models may lie outside `available_models`.
    #[serde(skip)]
    pub model_from_env: bool,
}

impl Default for Config {
    fn default() -> Self {
        let home = futurecast_home();
        Self {
            api_key: String::new(),
            model_name: AVAILABLE_MODELS[0].to_string(),
            available_models: AVAILABLE_MODELS.iter().map(|m| m.to_string()).collect(),
            num_effects: 5,
            max_depth: 3,
            max_parallel_calls: 5,
            enable_caching: true,
            cache_ttl: 3600,
            temperature: 0.7,
            top_p: 0.95,
            top_k: 40,
            cache_dir: home.join("cache"),
            saved_dir: home.join("saved"),
            api_base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 120,
            regeneration: RegenerationPolicy::default(),
            model_from_env: false,
        }
    }
}

fn futurecast_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".futurecast")
}

/// Location of the optional JSON settings file.
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("futurecast");
    path.push("settings.json");
    path
}

impl Config {
    /// Defaults, then the settings file (if present), then the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file(&settings_path())?.unwrap_or_default();
        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Writes the settings file. The API key is never written.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(io_err)
    }

    /// Overlays environment variables read through `lookup`.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(key) = lookup("GEMINI_API_KEY") {
            self.api_key = key;
        }
        if let Some(model) = lookup("GEMINI_MODEL").filter(|m| !m.trim().is_empty()) {
            self.model_name = model;
            self.model_from_env = true;
        }

        set_parsed(&lookup, "NUM_EFFECTS", &mut self.num_effects)?;
        set_parsed(&lookup, "MAX_DEPTH", &mut self.max_depth)?;
        set_parsed(&lookup, "MAX_PARALLEL_CALLS", &mut self.max_parallel_calls)?;
        set_parsed(&lookup, "CACHE_TTL", &mut self.cache_ttl)?;
        set_parsed(&lookup, "TEMPERATURE", &mut self.temperature)?;
        set_parsed(&lookup, "TOP_P", &mut self.top_p)?;
        set_parsed(&lookup, "TOP_K", &mut self.top_k)?;

        if let Some(raw) = lookup("ENABLE_CACHING") {
            self.enable_caching = raw.trim().eq_ignore_ascii_case("true");
        }

        Ok(())
    }

    /// Rejects missing credentials and out-of-range values. Must pass before
    /// any generation call is made.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if self.api_key.trim().is_empty() {
            return invalid("API key is required; set GEMINI_API_KEY");
        }
        if self.available_models.is_empty() {
            return invalid("available models list cannot be empty");
        }
        if !self.model_from_env && !self.available_models.contains(&self.model_name) {
            return Err(ConfigError::Invalid(format!(
                "model '{}' is not one of: {}",
                self.model_name,
                self.available_models.join(", ")
            )));
        }
        if self.num_effects == 0 {
            return invalid("number of effects must be positive");
        }
        if self.max_depth == 0 {
            return invalid("maximum depth must be positive");
        }
        if self.max_parallel_calls == 0 {
            return invalid("max parallel calls must be positive");
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return invalid("temperature must be between 0 and 1");
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return invalid("top-p must be between 0 and 1");
        }
        if self.top_k == 0 {
            return invalid("top-k must be positive");
        }
        if self.request_timeout_secs == 0 {
            return invalid("request timeout must be positive");
        }

        Ok(())
    }

    pub fn model_params(&self) -> ModelParams {
        ModelParams {
            model: self.model_name.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }
}

fn set_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) -> Result<(), ConfigError> {
    if let Some(raw) = lookup(key) {
        *target = raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("{key} has an invalid value '{raw}'")))?;
    }
    Ok(())
}
