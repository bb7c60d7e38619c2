//! kiln Configuration Module
//!
//! Execution settings for one orchestrator run: where task outputs go,
//! which runner executes container tasks, and failure/concurrency policy.
//! Config is stored in `~/.config/kiln/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (applied by the caller)
//! 2. Environment variables (`KILN_PIPELINE_ROOT`, `KILN_PARALLELISM`, `KILN_FAIL_FAST`)
//! 3. Config file (`--config` or `~/.config/kiln/config.toml`)
//! 4. Defaults
//!
//! There is no global instance: the config is passed to `Orchestrator::new`.

use std::fs;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{KilnError, Result};
use crate::util::{DEFAULT_CONTAINER_CLI, DEFAULT_PIPELINE_ROOT};

/// Settings for one orchestrator run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionConfig {
    /// Root directory for task outputs
    #[serde(default = "default_pipeline_root")]
    pub pipeline_root: Utf8PathBuf,

    /// Stop dispatching new tasks after the first failure
    #[serde(default = "default_true")]
    pub fail_fast: bool,

    /// Max concurrently running leaf tasks
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Remove the run's task roots after success
    #[serde(default)]
    pub cleanup: bool,

    /// Runner for container tasks
    #[serde(default)]
    pub runner: RunnerConfig,
}

/// Which runner executes container tasks
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunnerConfig {
    /// Host process; `interpreter` replaces a leading `python3`
    Subprocess {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interpreter: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_secs: Option<u64>,
    },
    /// `docker run` (or a compatible CLI)
    Container {
        #[serde(default = "default_container_cli")]
        cli: String,
    },
    /// Managed job service
    RemoteJob {
        project: String,
        location: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        endpoint: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        poll_interval_secs: Option<u64>,
    },
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self::Subprocess {
            interpreter: None,
            timeout_secs: None,
        }
    }
}

impl RunnerConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Subprocess { .. } => "subprocess",
            Self::Container { .. } => "container",
            Self::RemoteJob { .. } => "remote_job",
        }
    }

    /// Container runner with the default CLI
    pub fn container() -> Self {
        Self::Container {
            cli: default_container_cli(),
        }
    }
}

fn default_pipeline_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_PIPELINE_ROOT)
}

fn default_true() -> bool {
    true
}

fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_container_cli() -> String {
    DEFAULT_CONTAINER_CLI.to_string()
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            pipeline_root: default_pipeline_root(),
            fail_fast: true,
            parallelism: default_parallelism(),
            cleanup: false,
            runner: RunnerConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// Get the config directory path
    ///
    /// Returns `~/.config/kiln/` on Unix, `%APPDATA%/kiln/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kiln")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load from the default config path
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| KilnError::ConfigError {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| KilnError::ConfigError {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save configuration to a file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).map_err(|e| KilnError::ConfigError {
                    reason: format!("Failed to create config directory: {}", e),
                })?;
            }
        }

        let content = toml::to_string_pretty(self).map_err(|e| KilnError::ConfigError {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| KilnError::ConfigError {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Merge with environment variables
    ///
    /// Empty or unparsable values are ignored.
    pub fn with_env(mut self) -> Self {
        if let Ok(root) = std::env::var("KILN_PIPELINE_ROOT") {
            if !root.is_empty() {
                self.pipeline_root = Utf8PathBuf::from(root);
            }
        }

        if let Ok(raw) = std::env::var("KILN_PARALLELISM") {
            match raw.trim().parse::<usize>() {
                Ok(n) => self.parallelism = n,
                Err(_) if raw.is_empty() => {}
                Err(_) => warn!(value = %raw, "Ignoring invalid KILN_PARALLELISM"),
            }
        }

        if let Ok(raw) = std::env::var("KILN_FAIL_FAST") {
            match parse_bool(&raw) {
                Some(flag) => self.fail_fast = flag,
                None if raw.is_empty() => {}
                None => warn!(value = %raw, "Ignoring invalid KILN_FAIL_FAST"),
            }
        }

        self
    }

    /// Reject settings no run could use
    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(KilnError::InvalidConfig {
                message: "parallelism must be at least 1".to_string(),
            });
        }
        if self.pipeline_root.as_str().is_empty() {
            return Err(KilnError::InvalidConfig {
                message: "pipeline_root must not be empty".to_string(),
            });
        }
        match &self.runner {
            RunnerConfig::Container { cli } if cli.trim().is_empty() => {
                Err(KilnError::InvalidConfig {
                    message: "container runner needs a cli".to_string(),
                })
            }
            RunnerConfig::RemoteJob {
                project, location, ..
            } if project.trim().is_empty() || location.trim().is_empty() => {
                Err(KilnError::InvalidConfig {
                    message: "remote_job runner needs both project and location".to_string(),
                })
            }
            RunnerConfig::RemoteJob {
                poll_interval_secs: Some(0),
                ..
            } => Err(KilnError::InvalidConfig {
                message: "poll_interval_secs must be at least 1".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    #[test]
    fn test_config_path_contains_kiln() {
        let path = ExecutionConfig::config_path();
        assert!(path.to_string_lossy().contains("kiln"));
        assert!(path.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn test_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.pipeline_root.as_str(), "./local_outputs");
        assert!(config.fail_fast);
        assert!(config.parallelism >= 1);
        assert!(!config.cleanup);
        assert_eq!(config.runner.kind(), "subprocess");
        config.validate().unwrap();
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("config.toml");

        let config = ExecutionConfig {
            pipeline_root: "/data/runs".into(),
            fail_fast: false,
            parallelism: 3,
            cleanup: true,
            runner: RunnerConfig::RemoteJob {
                project: "proj".into(),
                location: "us-central1".into(),
                endpoint: None,
                poll_interval_secs: Some(2),
            },
        };
        config.save_to(&path).unwrap();

        assert_eq!(ExecutionConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        fs::write(&path, "parallelism = 2\n\n[runner]\nkind = \"container\"\n").unwrap();

        let config = ExecutionConfig::load_from(&path).unwrap();
        assert_eq!(config.parallelism, 2);
        assert!(config.fail_fast);
        assert_eq!(config.runner, RunnerConfig::container());
    }

    #[test]
    fn test_missing_file_is_default_and_malformed_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.toml");
        assert_eq!(
            ExecutionConfig::load_from(&missing).unwrap(),
            ExecutionConfig::default()
        );

        let bad = temp_dir.path().join("bad.toml");
        fs::write(&bad, "parallelism = \"many\"").unwrap();
        let err = ExecutionConfig::load_from(&bad).unwrap_err();
        assert_eq!(err.code(), "KILN-034");
    }

    #[test]
    #[serial]
    fn test_env_overrides_config() {
        env::set_var("KILN_PIPELINE_ROOT", "/from/env");
        env::set_var("KILN_PARALLELISM", "7");
        env::set_var("KILN_FAIL_FAST", "false");

        let config = ExecutionConfig::default().with_env();
        assert_eq!(config.pipeline_root.as_str(), "/from/env");
        assert_eq!(config.parallelism, 7);
        assert!(!config.fail_fast);

        env::remove_var("KILN_PIPELINE_ROOT");
        env::remove_var("KILN_PARALLELISM");
        env::remove_var("KILN_FAIL_FAST");
    }

    #[test]
    #[serial]
    fn test_invalid_env_is_ignored() {
        env::set_var("KILN_PARALLELISM", "lots");
        env::set_var("KILN_FAIL_FAST", "");

        let config = ExecutionConfig {
            parallelism: 4,
            ..Default::default()
        }
        .with_env();
        assert_eq!(config.parallelism, 4);
        assert!(config.fail_fast);

        env::remove_var("KILN_PARALLELISM");
        env::remove_var("KILN_FAIL_FAST");
    }

    #[test]
    fn test_validate_rejects_unusable_settings() {
        let zero = ExecutionConfig {
            parallelism: 0,
            ..Default::default()
        };
        assert_eq!(zero.validate().unwrap_err().code(), "KILN-033");

        let remote = ExecutionConfig {
            runner: RunnerConfig::RemoteJob {
                project: "".into(),
                location: "eu".into(),
                endpoint: None,
                poll_interval_secs: None,
            },
            ..Default::default()
        };
        assert!(remote.validate().is_err());
    }

    #[test]
    fn test_toml_format() {
        let config = ExecutionConfig {
            runner: RunnerConfig::Subprocess {
                interpreter: Some(".venv/bin/python".into()),
                timeout_secs: None,
            },
            ..Default::default()
        };
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[runner]"));
        assert!(toml_str.contains("kind = \"subprocess\""));
        assert!(toml_str.contains("interpreter = \".venv/bin/python\""));
        assert!(!toml_str.contains("timeout_secs"));
    }
}
