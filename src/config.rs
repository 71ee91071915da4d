//! Service configuration
//!
//! Read from the process environment (and a `.env` file when present).
//! Parsing goes through [`Config::from_lookup`] so it can be exercised
//! without mutating the environment.

use crate::compress::{
    CompressionSettings, DEFAULT_INITIAL_QUALITY, DEFAULT_MAX_SIZE_KB, DEFAULT_QUALITY_FLOOR,
    DEFAULT_QUALITY_STEP,
};
use crate::store::S3Settings;
use crate::{Error, Result};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_CONTAINER: &str = "image-files";
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    S3,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "s3" => Ok(StoreBackend::S3),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(Error::Config(format!(
                "STORE_BACKEND must be 's3' or 'memory', got '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreBackend::S3 => write!(f, "s3"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub store_backend: StoreBackend,
    pub container: String,
    pub s3: S3Settings,
    pub compression: CompressionSettings,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let bind_address = parse_or(
            "BIND_ADDRESS",
            var("BIND_ADDRESS"),
            DEFAULT_BIND_ADDRESS.parse::<SocketAddr>().map_err(|e| {
                Error::Config(format!("invalid default bind address: {}", e))
            })?,
        )?;
        let store_backend = match var("STORE_BACKEND") {
            Some(value) => value.parse()?,
            None => StoreBackend::S3,
        };
        let container = var("CONTAINER_NAME").unwrap_or_else(|| DEFAULT_CONTAINER.to_string());

        let access_key_id = var("S3_ACCESS_KEY_ID");
        let secret_access_key = var("S3_SECRET_ACCESS_KEY");
        if access_key_id.is_some() != secret_access_key.is_some() {
            return Err(Error::Config(
                "S3_ACCESS_KEY_ID and S3_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }
        let s3 = S3Settings {
            endpoint: var("S3_ENDPOINT"),
            region: var("S3_REGION").unwrap_or_else(|| S3Settings::default().region),
            access_key_id,
            secret_access_key,
            force_path_style: parse_or("S3_FORCE_PATH_STYLE", var("S3_FORCE_PATH_STYLE"), false)?,
        };

        let compression = CompressionSettings {
            max_size_kb: parse_or("MAX_SIZE_KB", var("MAX_SIZE_KB"), DEFAULT_MAX_SIZE_KB)?,
            initial_quality: parse_or(
                "INITIAL_QUALITY",
                var("INITIAL_QUALITY"),
                DEFAULT_INITIAL_QUALITY,
            )?,
            quality_step: parse_or("QUALITY_STEP", var("QUALITY_STEP"), DEFAULT_QUALITY_STEP)?,
            quality_floor: parse_or("QUALITY_FLOOR", var("QUALITY_FLOOR"), DEFAULT_QUALITY_FLOOR)?,
        };
        compression
            .validate()
            .map_err(|e| Error::Config(e.to_string()))?;

        let max_upload_bytes = parse_or(
            "MAX_UPLOAD_BYTES",
            var("MAX_UPLOAD_BYTES"),
            DEFAULT_MAX_UPLOAD_BYTES,
        )?;
        if max_upload_bytes == 0 {
            return Err(Error::Config("MAX_UPLOAD_BYTES must be positive".to_string()));
        }

        Ok(Self {
            bind_address,
            store_backend,
            container,
            s3,
            compression,
            max_upload_bytes,
        })
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("{} has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8080");
        assert_eq!(config.store_backend, StoreBackend::S3);
        assert_eq!(config.container, "image-files");
        assert_eq!(config.s3, S3Settings::default());
        assert_eq!(config.compression, CompressionSettings::default());
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("STORE_BACKEND", "memory"),
            ("CONTAINER_NAME", "thumbs"),
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("S3_REGION", "eu-west-1"),
            ("S3_ACCESS_KEY_ID", "key"),
            ("S3_SECRET_ACCESS_KEY", "secret"),
            ("S3_FORCE_PATH_STYLE", "true"),
            ("MAX_SIZE_KB", "20"),
            ("INITIAL_QUALITY", "90"),
            ("QUALITY_STEP", "10"),
            ("QUALITY_FLOOR", "20"),
            ("MAX_UPLOAD_BYTES", "1024"),
        ])
        .unwrap();

        assert_eq!(config.bind_address.port(), 9000);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.container, "thumbs");
        assert_eq!(
            config.s3,
            S3Settings {
                endpoint: Some("http://localhost:9000".to_string()),
                region: "eu-west-1".to_string(),
                access_key_id: Some("key".to_string()),
                secret_access_key: Some("secret".to_string()),
                force_path_style: true,
            }
        );
        assert_eq!(
            config.compression,
            CompressionSettings {
                max_size_kb: 20.0,
                initial_quality: 90,
                quality_step: 10,
                quality_floor: 20,
            }
        );
        assert_eq!(config.max_upload_bytes, 1024);
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = config_from(&[("CONTAINER_NAME", "  "), ("MAX_SIZE_KB", "")]).unwrap();
        assert_eq!(config.container, "image-files");
        assert_eq!(config.compression.max_size_kb, DEFAULT_MAX_SIZE_KB);
    }

    #[test]
    fn test_malformed_values_are_config_errors() {
        for pairs in [
            [("BIND_ADDRESS", "not-an-address")],
            [("STORE_BACKEND", "azure")],
            [("MAX_SIZE_KB", "lots")],
            [("INITIAL_QUALITY", "300")],
            [("S3_FORCE_PATH_STYLE", "maybe")],
            [("MAX_UPLOAD_BYTES", "0")],
            [("S3_ACCESS_KEY_ID", "key-without-secret")],
        ] {
            let result = config_from(&pairs);
            assert!(
                matches!(result, Err(Error::Config(_))),
                "{:?} should be rejected",
                pairs
            );
        }
    }

    #[test]
    fn test_inconsistent_quality_settings_are_rejected() {
        let result = config_from(&[("INITIAL_QUALITY", "30"), ("QUALITY_FLOOR", "40")]);
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("floor")));
    }
}
