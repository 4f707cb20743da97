//! Configuration loading and validation.
//!
//! Every recognized option is a field on [`Config`] with its own default.
//! Files are YAML with environment variable interpolation; unknown keys are
//! rejected so a typo never silently falls back to a default.

mod arn;
mod vars;

pub use arn::QueueArn;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;
use std::path::{Path, PathBuf};

use crate::error::{
    ConfigError, EmptyOptionSnafu, EnvInterpolationSnafu, InvalidWaitTimeSnafu, ReadFileSnafu,
    YamlParseSnafu, YamlRenderSnafu,
};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "processor.yaml";

/// Longest long-poll wait SQS accepts.
pub const MAX_WAIT_TIME_SECS: u64 = 20;

/// Main configuration structure for the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// ARN of the queue to consume.
    pub queue_identifier: String,
    /// Echo the resolved configuration at startup.
    pub print_config: bool,
    /// DDFS master endpoint handed to every chunk push.
    pub distributed_store_master: String,
    /// String prepended to every chunk tag.
    pub tag_prefix: String,
    /// Path of the `ddfs` executable.
    pub ddfs_binary: PathBuf,
    /// Directory holding downloaded blobs and their partitions.
    pub work_dir: PathBuf,
    /// Long-poll wait in seconds (1..=20).
    pub wait_time_secs: u64,
    /// Object storage options.
    pub storage: StorageConfig,
    /// Metrics configuration.
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_identifier: "arn:aws:sqs:us-east-1:0123456789012:mozilla-tiles-queue".to_string(),
            print_config: false,
            distributed_store_master: "disco://localhost".to_string(),
            tag_prefix: "incoming:".to_string(),
            ddfs_binary: PathBuf::from("/usr/bin/ddfs"),
            work_dir: PathBuf::from("/tmp"),
            wait_time_secs: MAX_WAIT_TIME_SECS,
            storage: StorageConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Object storage configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Region for S3 clients. Falls back to the AWS environment when unset.
    pub region: Option<String>,
    /// Serve buckets from sub-directories of this path instead of S3.
    pub local_root: Option<PathBuf>,
}

/// Metrics configuration for Prometheus endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Whether the Prometheus endpoint is started (default: false).
    pub enabled: bool,
    /// Address to bind the metrics HTTP server (default: "0.0.0.0:9090").
    pub address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            address: default_metrics_address(),
        }
    }
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).context(ReadFileSnafu { path })?;
        Self::from_yaml(&content)
    }

    /// Load the given file, or `processor.yaml` if present, or the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(DEFAULT_CONFIG_FILE)
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Parse configuration from YAML text, interpolating environment variables.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let result = vars::interpolate(content);
        if !result.is_ok() {
            return EnvInterpolationSnafu {
                message: result.errors.join("\n"),
            }
            .fail();
        }

        let value: serde_yaml::Value = serde_yaml::from_str(&result.text).context(YamlParseSnafu)?;
        let config = if value.is_null() {
            Config::default()
        } else {
            serde_yaml::from_value(value).context(YamlParseSnafu)?
        };

        config.validate()?;
        Ok(config)
    }

    /// Parse the queue identifier as an SQS ARN.
    pub fn queue_arn(&self) -> Result<QueueArn, ConfigError> {
        self.queue_identifier.parse()
    }

    /// Render the resolved configuration as YAML.
    pub fn render(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).context(YamlRenderSnafu)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            !self.queue_identifier.is_empty(),
            EmptyOptionSnafu {
                option: "queue_identifier"
            }
        );
        ensure!(
            !self.distributed_store_master.is_empty(),
            EmptyOptionSnafu {
                option: "distributed_store_master"
            }
        );
        ensure!(
            !self.ddfs_binary.as_os_str().is_empty(),
            EmptyOptionSnafu {
                option: "ddfs_binary"
            }
        );
        ensure!(
            !self.work_dir.as_os_str().is_empty(),
            EmptyOptionSnafu { option: "work_dir" }
        );
        ensure!(
            (1..=MAX_WAIT_TIME_SECS).contains(&self.wait_time_secs),
            InvalidWaitTimeSnafu {
                value: self.wait_time_secs
            }
        );
        self.queue_arn()?;
        Ok(())
    }
}
