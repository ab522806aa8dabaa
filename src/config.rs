//! Layered configuration: CLI flags override a TOML config file, which
//! overrides built-in defaults. Not part of the core — a convenience for
//! the `brokerd` binary.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::channel::{validate_max_segment_size, DEFAULT_MAX_SEGMENT_SIZE};
use crate::{Error, Result};

fn default_bind_addr() -> String {
    "127.0.0.1:7878".to_string()
}

fn default_max_segment_size() -> u64 {
    DEFAULT_MAX_SEGMENT_SIZE
}

fn default_fetch_batch_size() -> u32 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: PathBuf,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_segment_size")]
    pub max_segment_size: u64,
    /// Upper bound applied to a fetch request's `batch` parameter when
    /// none (or too large a one) is supplied.
    #[serde(default = "default_fetch_batch_size")]
    pub default_batch_size: u32,
}

impl Config {
    pub fn new(data_dir: PathBuf) -> Self {
        Self {
            data_dir,
            bind_addr: default_bind_addr(),
            max_segment_size: default_max_segment_size(),
            default_batch_size: default_fetch_batch_size(),
        }
    }

    /// Loads a TOML config file, then applies any CLI overrides that are
    /// `Some`.
    pub fn load(
        config_path: Option<&Path>,
        data_dir_override: Option<PathBuf>,
        bind_addr_override: Option<String>,
    ) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::new(data_dir_override.clone().ok_or_else(|| {
                Error::arg("--data-dir is required when no config file is given")
            })?),
        };
        if let Some(data_dir) = data_dir_override {
            config.data_dir = data_dir;
        }
        if let Some(bind_addr) = bind_addr_override {
            config.bind_addr = bind_addr;
        }
        validate_max_segment_size(config.max_segment_size)?;
        Ok(config)
    }

    fn from_toml_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|err| Error::arg(format!("invalid config file {}: {err}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_applies_defaults() {
        let config = Config::new(PathBuf::from("/tmp/data"));
        assert_eq!(config.bind_addr, "127.0.0.1:7878");
        assert_eq!(config.max_segment_size, DEFAULT_MAX_SEGMENT_SIZE);
        assert_eq!(config.default_batch_size, 100);
    }

    #[test]
    fn load_without_file_requires_data_dir_override() {
        let err = Config::load(None, None, None).expect_err("missing data dir");
        assert!(err.is_arg());
    }

    #[test]
    fn cli_override_wins_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("brokerd.toml");
        std::fs::write(&config_path, "data_dir = \"/from/file\"\nbind_addr = \"0.0.0.0:1\"\n")
            .expect("write config");
        let config = Config::load(
            Some(&config_path),
            None,
            Some("127.0.0.1:9999".to_string()),
        )
        .expect("load");
        assert_eq!(config.data_dir, PathBuf::from("/from/file"));
        assert_eq!(config.bind_addr, "127.0.0.1:9999");
    }

    #[test]
    fn load_rejects_max_segment_size_too_small_for_header_and_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config_path = dir.path().join("brokerd.toml");
        std::fs::write(
            &config_path,
            "data_dir = \"/from/file\"\nmax_segment_size = 10\n",
        )
        .expect("write config");
        let err = Config::load(Some(&config_path), None, None).expect_err("too small");
        assert!(err.is_arg());
    }
}
