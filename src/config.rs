// Runtime configuration
//
// Defaults come from constants.rs. Each field can be overridden with a
// BROLL_* environment variable, the same way tools.rs resolves binaries.

use std::env;
use std::str::FromStr;
use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_CHAT_MODEL, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_INFERENCE_RETRIES, DEFAULT_INFERENCE_TIMEOUT_SECS, DEFAULT_NUM_KEYFRAMES,
    DEFAULT_OLLAMA_URL, DEFAULT_VISION_MODEL,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub ollama_url: String,
    pub vision_model: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub embedding_dimensions: usize,
    pub inference_timeout_secs: u64,
    pub inference_retries: u32,
    pub num_keyframes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            inference_timeout_secs: DEFAULT_INFERENCE_TIMEOUT_SECS,
            inference_retries: DEFAULT_INFERENCE_RETRIES,
            num_keyframes: DEFAULT_NUM_KEYFRAMES,
        }
    }
}

impl Config {
    /// Build a config from defaults plus any BROLL_* overrides.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            ollama_url: env_string("BROLL_OLLAMA_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.ollama_url),
            vision_model: env_string("BROLL_VISION_MODEL").unwrap_or(defaults.vision_model),
            embedding_model: env_string("BROLL_EMBEDDING_MODEL").unwrap_or(defaults.embedding_model),
            chat_model: env_string("BROLL_CHAT_MODEL").unwrap_or(defaults.chat_model),
            embedding_dimensions: env_parse("BROLL_EMBEDDING_DIMENSIONS", defaults.embedding_dimensions),
            inference_timeout_secs: env_parse("BROLL_INFERENCE_TIMEOUT_SECS", defaults.inference_timeout_secs),
            // Zero retries is valid and turns retrying off
            inference_retries: env_parse_with("BROLL_INFERENCE_RETRIES", defaults.inference_retries, |_| true),
            num_keyframes: env_parse("BROLL_NUM_KEYFRAMES", defaults.num_keyframes),
        }
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs.max(1))
    }
}

fn env_string(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a numeric override that must be positive. Garbage and zero values
/// keep the default.
fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr + PartialEq + Default + Copy,
{
    env_parse_with(key, default, |v| *v != T::default())
}

fn env_parse_with<T, F>(key: &str, default: T, accept: F) -> T
where
    T: FromStr + Copy,
    F: Fn(&T) -> bool,
{
    match env_string(key) {
        Some(raw) => match raw.parse::<T>() {
            Ok(v) if accept(&v) => v,
            _ => {
                log::warn!("Ignoring invalid value for {}: {:?}", key, raw);
                default
            }
        },
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.embedding_dimensions, 768);
        assert_eq!(config.vision_model, "minicpm-v");
        assert_eq!(config.inference_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_env_parse_ignores_garbage() {
        std::env::set_var("BROLL_TEST_PARSE_GARBAGE", "lots");
        assert_eq!(env_parse("BROLL_TEST_PARSE_GARBAGE", 4usize), 4);

        std::env::set_var("BROLL_TEST_PARSE_GARBAGE", "0");
        assert_eq!(env_parse("BROLL_TEST_PARSE_GARBAGE", 4usize), 4);

        std::env::set_var("BROLL_TEST_PARSE_GARBAGE", " 8 ");
        assert_eq!(env_parse("BROLL_TEST_PARSE_GARBAGE", 4usize), 8);

        std::env::remove_var("BROLL_TEST_PARSE_GARBAGE");
        assert_eq!(env_parse("BROLL_TEST_PARSE_GARBAGE", 4usize), 4);
    }

    #[test]
    fn test_zero_retries_disables_retrying() {
        std::env::set_var("BROLL_INFERENCE_RETRIES", "0");
        std::env::set_var("BROLL_INFERENCE_TIMEOUT_SECS", "0");
        let config = Config::from_env();
        std::env::remove_var("BROLL_INFERENCE_RETRIES");
        std::env::remove_var("BROLL_INFERENCE_TIMEOUT_SECS");

        assert_eq!(config.inference_retries, 0);
        // A zero timeout is still rejected
        assert_eq!(config.inference_timeout_secs, DEFAULT_INFERENCE_TIMEOUT_SECS);
    }
}
