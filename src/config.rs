use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// Server configuration, read from the environment (and `.env`) at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_host: String,
    pub port: u16,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
    pub template_glob: String,
    pub api_key: String,
    pub api_base_url: String,
    pub model: String,
    pub max_tokens: u32,
    /// Number of trailing conversation entries forwarded upstream.
    pub context_window: usize,
    /// Scheme used for upload URLs when `X-Forwarded-Proto` is absent.
    pub default_scheme: String,
    /// Overrides the request's `Host` header when building upload URLs.
    pub public_host: Option<String>,
    pub max_upload_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 8080,
            upload_dir: PathBuf::from("uploads"),
            static_dir: PathBuf::from("static"),
            template_glob: "templates/**/*".to_string(),
            api_key: String::new(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 300,
            context_window: 2,
            default_scheme: "http".to_string(),
            public_host: None,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let api_key = env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| anyhow!("OPENAI_API_KEY must be set"))?;

        let context_window = parse_or("CONTEXT_WINDOW", defaults.context_window)?;
        if context_window == 0 {
            return Err(anyhow!("CONTEXT_WINDOW must be at least 1"));
        }

        let max_upload_mb: usize = parse_or("MAX_UPLOAD_MB", 20)?;
        let max_upload_bytes = upload_limit_bytes(max_upload_mb)?;

        Ok(Self {
            bind_host: env::var("BIND_HOST").unwrap_or(defaults.bind_host),
            port: parse_or("PORT", defaults.port)?,
            upload_dir: env::var("UPLOAD_DIR").map(PathBuf::from).unwrap_or(defaults.upload_dir),
            static_dir: env::var("STATIC_DIR").map(PathBuf::from).unwrap_or(defaults.static_dir),
            template_glob: env::var("TEMPLATE_GLOB").unwrap_or(defaults.template_glob),
            api_key,
            api_base_url: env::var("OPENAI_BASE_URL").unwrap_or(defaults.api_base_url),
            model: env::var("OPENAI_MODEL").unwrap_or(defaults.model),
            max_tokens: parse_or("MAX_TOKENS", defaults.max_tokens)?,
            context_window,
            default_scheme: env::var("DEFAULT_SCHEME").unwrap_or(defaults.default_scheme),
            public_host: env::var("PUBLIC_HOST").ok().filter(|host| !host.is_empty()),
            max_upload_bytes,
        })
    }
}

fn upload_limit_bytes(megabytes: usize) -> Result<usize> {
    megabytes
        .checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow!("MAX_UPLOAD_MB is too large: {}", megabytes))
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}
