use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::llm_client::DEFAULT_BASE_URL;
use crate::retry::DEFAULT_MAX_ATTEMPTS;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    /// No fallback key: a missing key is a startup error.
    pub gemini_api_key: String,
    pub gemini_base_url: String,
    /// Attempt budget for every AI call (>= 1).
    pub ai_max_attempts: u32,
    /// Overall deadline for one AI request, retries included.
    pub ai_request_timeout: Duration,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let ai_max_attempts = parse_or(
            "AI_MAX_ATTEMPTS",
            std::env::var("AI_MAX_ATTEMPTS").ok(),
            DEFAULT_MAX_ATTEMPTS,
        )?;
        if ai_max_attempts == 0 {
            bail!("AI_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Config {
            gemini_api_key: require_env("GEMINI_API_KEY")?,
            gemini_base_url: std::env::var("GEMINI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            ai_max_attempts,
            ai_request_timeout: Duration::from_secs(parse_or(
                "AI_REQUEST_TIMEOUT_SECS",
                std::env::var("AI_REQUEST_TIMEOUT_SECS").ok(),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            port: parse_or("PORT", std::env::var("PORT").ok(), DEFAULT_PORT)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

/// Parses an optional variable, using `default` when it is unset.
fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{value}'")),
        None => Ok(default),
    }
}
