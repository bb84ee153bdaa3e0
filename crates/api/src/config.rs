use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use faq_ml::{CannedTextGenerator, Fallback};

/// Input cap of the chat box; longer questions are rejected before matching.
pub const DEFAULT_MAX_QUERY_CHARS: usize = 200;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind: String,
    pub api_key: String,
    pub catalog_path: Option<PathBuf>,
    pub database_url: Option<String>,
    pub fallback: Fallback,
    pub max_query_chars: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_max: usize,
    pub allowed_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            api_key: "dev-faq-key".to_string(),
            catalog_path: None,
            database_url: None,
            fallback: Fallback::Canned(CannedTextGenerator::default()),
            max_query_chars: DEFAULT_MAX_QUERY_CHARS,
            rate_limit_window: Duration::from_secs(60),
            rate_limit_max: 60,
            allowed_origins: default_origins(),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        Ok(Self {
            bind: env::var("FAQ_BIND").unwrap_or(defaults.bind),
            api_key: env::var("FAQ_API_KEY").unwrap_or(defaults.api_key),
            catalog_path: non_empty_var("FAQ_CATALOG_PATH").map(PathBuf::from),
            database_url: non_empty_var("FAQ_DATABASE_URL"),
            fallback: Fallback::load_default().context("failed to configure generative fallback")?,
            max_query_chars: parsed_var("FAQ_MAX_QUERY_CHARS").unwrap_or(defaults.max_query_chars),
            rate_limit_window: parsed_var("FAQ_RATE_LIMIT_WINDOW_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit_window),
            rate_limit_max: parsed_var("FAQ_RATE_LIMIT_MAX").unwrap_or(defaults.rate_limit_max),
            allowed_origins: non_empty_var("FAQ_ALLOWED_ORIGINS")
                .map(|value| parse_origins(&value))
                .unwrap_or(defaults.allowed_origins),
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|value| value.trim().parse::<T>().ok())
}

fn default_origins() -> Vec<String> {
    ["http://localhost:8501", "http://127.0.0.1:8501", "http://localhost:3000"]
        .iter()
        .map(ToString::to_string)
        .collect()
}

pub(crate) fn parse_origins(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origins_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            parse_origins(" https://egresados.unfv.edu.pe/ , ,http://localhost:3000"),
            vec![
                "https://egresados.unfv.edu.pe".to_string(),
                "http://localhost:3000".to_string()
            ]
        );
    }

    #[test]
    fn defaults_match_chat_box_limits() {
        let config = ApiConfig::default();
        assert_eq!(config.max_query_chars, 200);
        assert_eq!(config.api_key, "dev-faq-key");
        assert!(config.fallback.is_enabled());
    }
}
