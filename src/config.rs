use std::{env, net::SocketAddr, str::FromStr};
use thiserror::Error;

use crate::matching::MatchingConfig;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid environment variable format for {0}: {1}")]
    InvalidVar(String, String),
    #[error(transparent)]
    DotEnvError(#[from] dotenvy::Error),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub meme_bucket_name: String,
    pub aws_region: String,
    // Optional endpoint for LocalStack
    pub localstack_endpoint: Option<String>,
    pub templates_table: String,
    pub generated_memes_table: String,
    /// Prefix used when handing out URLs for images kept in our bucket.
    pub public_base_url: String,
    pub gemini: GeminiConfig,
    pub matching: MatchingConfig,
    pub imgflip_url: String,
}

#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

// Keep the key out of logs.
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignores errors, relies on env vars otherwise)
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(key.into()))
        };

        let bind_address_str = or_default("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = SocketAddr::from_str(&bind_address_str)
            .map_err(|e| ConfigError::InvalidVar("BIND_ADDRESS".into(), e.to_string()))?;

        let meme_bucket_name = required("MEME_BUCKET_NAME")?;
        let aws_region = or_default("AWS_DEFAULT_REGION", "ca-central-1");
        let localstack_endpoint = lookup("AWS_ENDPOINT_URL");

        let gemini = GeminiConfig {
            api_key: required("GEMINI_API_KEY")?,
            model: or_default("GEMINI_MODEL", "gemini-2.5-flash"),
            base_url: or_default("GEMINI_BASE_URL", "https://generativelanguage.googleapis.com"),
        };

        let defaults = MatchingConfig::default();
        let matching = MatchingConfig {
            tag_weight: parse_or("MATCH_TAG_WEIGHT", lookup("MATCH_TAG_WEIGHT"), defaults.tag_weight)?,
            description_word_weight: parse_or(
                "MATCH_DESCRIPTION_WORD_WEIGHT",
                lookup("MATCH_DESCRIPTION_WORD_WEIGHT"),
                defaults.description_word_weight,
            )?,
            max_results: parse_or("MATCH_MAX_RESULTS", lookup("MATCH_MAX_RESULTS"), defaults.max_results)?,
        };
        if matching.max_results == 0 {
            return Err(ConfigError::InvalidVar(
                "MATCH_MAX_RESULTS".into(),
                "must be at least 1".into(),
            ));
        }

        Ok(Config {
            bind_address,
            meme_bucket_name,
            aws_region,
            localstack_endpoint,
            templates_table: or_default("TEMPLATES_TABLE", "meme_templates"),
            generated_memes_table: or_default("GENERATED_MEMES_TABLE", "generated_memes"),
            public_base_url: or_default("PUBLIC_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            gemini,
            matching,
            imgflip_url: or_default("IMGFLIP_URL", "https://api.imgflip.com/get_memes"),
        })
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::InvalidVar(key.into(), e.to_string())),
        None => Ok(default),
    }
}
