use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::directory::{ContactDirectory, OverlapPolicy};
use crate::error::DirectoryError;
use crate::gateway::{DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL};
use crate::geolocation::{DEFAULT_NOMINATIM_URL, DEFAULT_USER_AGENT};
use crate::resolver::DEFAULT_VIACEP_URL;

/// Runtime configuration, read once from the environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub viacep_base_url: String,
    pub nominatim_base_url: String,
    /// Client identifier header required by the reverse-geocoding service
    pub nominatim_user_agent: String,
    pub assistant_url: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub llm_api_key: Option<String>,
    /// Applied to every outbound HTTP call
    pub http_timeout: Duration,
    /// Replaces the embedded contact directory when set
    pub directory_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            viacep_base_url: DEFAULT_VIACEP_URL.to_string(),
            nominatim_base_url: DEFAULT_NOMINATIM_URL.to_string(),
            nominatim_user_agent: DEFAULT_USER_AGENT.to_string(),
            assistant_url: "http://localhost:3000/chat-ai".to_string(),
            llm_base_url: DEFAULT_LLM_BASE_URL.to_string(),
            llm_model: DEFAULT_LLM_MODEL.to_string(),
            llm_api_key: None,
            http_timeout: Duration::from_secs(15),
            directory_path: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            port: get("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            viacep_base_url: get("VIACEP_BASE_URL").unwrap_or(defaults.viacep_base_url),
            nominatim_base_url: get("NOMINATIM_BASE_URL").unwrap_or(defaults.nominatim_base_url),
            nominatim_user_agent: get("NOMINATIM_USER_AGENT")
                .unwrap_or(defaults.nominatim_user_agent),
            assistant_url: get("ASSISTANT_URL").unwrap_or(defaults.assistant_url),
            llm_base_url: get("LLM_BASE_URL").unwrap_or(defaults.llm_base_url),
            llm_model: get("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_api_key: get("LLM_API_KEY"),
            http_timeout: get("HTTP_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            directory_path: get("DIRECTORY_PATH").map(PathBuf::from),
        }
    }

    /// Contact directory from `directory_path`, or the embedded one
    pub fn load_directory(&self) -> Result<ContactDirectory, DirectoryError> {
        match &self.directory_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading contact directory");
                ContactDirectory::from_path(path, OverlapPolicy::Warn)
            }
            None => ContactDirectory::embedded(),
        }
    }
}
