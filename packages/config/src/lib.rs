#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Settings for the bird targets pipeline.
//!
//! Values are read from an optional `bird_targets.toml` at the project
//! root (or the file named by `BIRD_TARGETS_CONFIG`) and then overridden by
//! environment variables, so secrets such as the eBird API key and the S3
//! credentials never have to be written to disk.

pub mod paths;
pub mod release;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

pub use paths::OutputPaths;
pub use release::{DatasetFiles, DatasetPaths, Release, pack_version_from_db};

/// Default config file name, resolved against the project root.
pub const CONFIG_FILE_NAME: &str = "bird_targets.toml";

/// Environment variable naming an alternative config file.
pub const CONFIG_PATH_ENV: &str = "BIRD_TARGETS_CONFIG";

/// Default `DuckDB` memory limit in gigabytes.
pub const DEFAULT_MEMORY_LIMIT_GB: u32 = 24;

/// Default `DuckDB` worker threads.
pub const DEFAULT_THREADS: usize = 8;

/// Errors from loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`Settings`].
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },

    /// An environment variable holds an unusable value.
    #[error("Invalid value for {name}: {value:?}")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Raw value.
        value: String,
    },

    /// A setting parsed but is outside its allowed range.
    #[error("Invalid {name}: {value} ({expected})")]
    OutOfRange {
        /// Setting name.
        name: &'static str,
        /// Rejected value.
        value: String,
        /// What the setting accepts.
        expected: &'static str,
    },

    /// Required settings are absent.
    #[error("Missing settings: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// S3-compatible storage credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Access key ID (`S3_KEY_ID`).
    pub key_id: Option<String>,
    /// Secret access key (`S3_SECRET`).
    pub secret: Option<String>,
    /// Bucket name (`S3_BUCKET`).
    pub bucket: Option<String>,
    /// Endpoint URL (`S3_ENDPOINT`).
    pub endpoint: Option<String>,
}

impl S3Settings {
    /// Names of the environment variables whose values are missing.
    #[must_use]
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("S3_KEY_ID", &self.key_id),
            ("S3_SECRET", &self.secret),
            ("S3_BUCKET", &self.bucket),
            ("S3_ENDPOINT", &self.endpoint),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(str::is_empty))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Pipeline settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// eBird API key (`EBIRD_API_KEY`).
    pub ebird_api_key: Option<String>,
    /// Base directory for datasets and outputs (`OUTPUT_PATH`), relative to
    /// the project root unless absolute.
    pub output_path: Option<PathBuf>,
    /// `DuckDB` memory limit in gigabytes (`MEMORY_LIMIT`).
    pub memory_limit_gb: u32,
    /// `DuckDB` worker threads (`THREADS`).
    pub threads: usize,
    /// Wilson score z (`WILSON_SCORE_Z_INDEX`).
    pub wilson_z: f64,
    /// ntfy.sh topic for completion notices (`NTFY_NOTIFICATION_TOPIC`).
    pub ntfy_topic: Option<String>,
    /// Pack definitions file; defaults to `packs.json` at the project root.
    pub packs_file: Option<PathBuf>,
    /// Upload credentials.
    pub s3: S3Settings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ebird_api_key: None,
            output_path: None,
            memory_limit_gb: DEFAULT_MEMORY_LIMIT_GB,
            threads: DEFAULT_THREADS,
            wilson_z: 1.96,
            ntfy_topic: None,
            packs_file: None,
            s3: S3Settings::default(),
        }
    }
}

impl Settings {
    /// Loads the config file (if any) and applies environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or
    /// parsed, or if an override is malformed.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV)
            .map_or_else(|| paths::project_root().join(CONFIG_FILE_NAME), PathBuf::from);

        let mut settings = if path.exists() {
            log::debug!("Loading settings from {}", path.display());
            Self::from_file(&path)?
        } else {
            Self::default()
        };

        settings.apply_env(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that parse but cannot be used.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::OutOfRange`] if `wilson_z` is not a finite
    /// number above 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.wilson_z.is_finite() && self.wilson_z > 0.0) {
            return Err(ConfigError::OutOfRange {
                name: "wilson_z",
                value: self.wilson_z.to_string(),
                expected: "a finite number greater than 0",
            });
        }
        Ok(())
    }

    /// Parses settings from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] or [`ConfigError::Parse`].
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Overrides fields from environment variables.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if a numeric variable does not
    /// parse.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("EBIRD_API_KEY") {
            self.ebird_api_key = Some(v);
        }
        if let Some(v) = get("OUTPUT_PATH") {
            self.output_path = Some(PathBuf::from(v));
        }
        if let Some(v) = get("MEMORY_LIMIT") {
            // "24" and "24GB" both mean gigabytes
            let digits = v.trim().trim_end_matches(['G', 'B', 'g', 'b']);
            self.memory_limit_gb = digits.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "MEMORY_LIMIT",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("THREADS") {
            self.threads = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "THREADS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("WILSON_SCORE_Z_INDEX") {
            self.wilson_z = v.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                name: "WILSON_SCORE_Z_INDEX",
                value: v.clone(),
            })?;
        }
        if let Some(v) = get("NTFY_NOTIFICATION_TOPIC") {
            self.ntfy_topic = Some(v);
        }
        if let Some(v) = get("S3_KEY_ID") {
            self.s3.key_id = Some(v);
        }
        if let Some(v) = get("S3_SECRET") {
            self.s3.secret = Some(v);
        }
        if let Some(v) = get("S3_BUCKET") {
            self.s3.bucket = Some(v);
        }
        if let Some(v) = get("S3_ENDPOINT") {
            self.s3.endpoint = Some(v);
        }

        Ok(())
    }

    /// Returns the eBird API key.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] if no key is configured.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.ebird_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Missing(vec!["EBIRD_API_KEY"]))
    }

    /// `DuckDB` memory limit string (e.g. `24GB`).
    #[must_use]
    pub fn memory_limit(&self) -> String {
        format!("{}GB", self.memory_limit_gb)
    }

    /// Dataset, output, and pack directories.
    #[must_use]
    pub fn output_paths(&self) -> OutputPaths {
        let root = paths::project_root();
        let base = self
            .output_path
            .as_ref()
            .map_or_else(|| root.clone(), |p| root.join(p));
        OutputPaths::from_base(&base)
    }

    /// Path of the pack definitions file.
    #[must_use]
    pub fn packs_file(&self) -> PathBuf {
        self.packs_file
            .clone()
            .unwrap_or_else(|| paths::project_root().join("packs.json"))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let settings = Settings::default();
        assert_eq!(settings.memory_limit_gb, 24);
        assert_eq!(settings.threads, 8);
        assert!((settings.wilson_z - 1.96).abs() < f64::EPSILON);
        assert_eq!(settings.memory_limit(), "24GB");
    }

    #[test]
    fn parses_partial_toml() {
        let settings: Settings = toml::from_str(
            r#"
            threads = 4
            output_path = "data"

            [s3]
            bucket = "packs"
            "#,
        )
        .unwrap();
        assert_eq!(settings.threads, 4);
        assert_eq!(settings.memory_limit_gb, 24);
        assert_eq!(settings.output_path, Some(PathBuf::from("data")));
        assert_eq!(settings.s3.bucket.as_deref(), Some("packs"));
        assert_eq!(settings.s3.missing(), vec!["S3_KEY_ID", "S3_SECRET", "S3_ENDPOINT"]);
    }

    #[test]
    fn environment_overrides_file() {
        let mut settings = Settings {
            threads: 2,
            ..Settings::default()
        };
        settings
            .apply_env(env(&[
                ("THREADS", "16"),
                ("MEMORY_LIMIT", "32GB"),
                ("WILSON_SCORE_Z_INDEX", "2.58"),
                ("EBIRD_API_KEY", "abc123"),
                ("NTFY_NOTIFICATION_TOPIC", ""),
            ]))
            .unwrap();
        assert_eq!(settings.threads, 16);
        assert_eq!(settings.memory_limit_gb, 32);
        assert!((settings.wilson_z - 2.58).abs() < f64::EPSILON);
        assert_eq!(settings.require_api_key().unwrap(), "abc123");
        assert_eq!(settings.ntfy_topic, None);
    }

    #[test]
    fn bad_numeric_env_is_rejected() {
        let mut settings = Settings::default();
        let err = settings.apply_env(env(&[("THREADS", "many")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { name: "THREADS", .. }));
    }

    #[test]
    fn unusable_wilson_z_is_rejected() {
        for raw in ["0", "-1", "NaN", "inf"] {
            let mut settings = Settings::default();
            settings
                .apply_env(env(&[("WILSON_SCORE_Z_INDEX", raw)]))
                .unwrap();
            let err = settings.validate().unwrap_err();
            assert!(
                matches!(err, ConfigError::OutOfRange { name: "wilson_z", .. }),
                "{raw} was accepted"
            );
        }
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn missing_api_key() {
        let err = Settings::default().require_api_key().unwrap_err();
        assert_eq!(err.to_string(), "Missing settings: EBIRD_API_KEY");
    }

    #[test]
    fn complete_s3_settings() {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                ("S3_KEY_ID", "id"),
                ("S3_SECRET", "secret"),
                ("S3_BUCKET", "bucket"),
                ("S3_ENDPOINT", "https://example.com"),
            ]))
            .unwrap();
        assert!(settings.s3.missing().is_empty());
    }
}
