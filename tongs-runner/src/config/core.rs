// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{PoolingStrategy, RetryQuota};
use crate::errors::{ConfigReadError, ConfigReadErrorKind};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, ConfigBuilder, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::time::Duration;

/// Overall configuration for tongs.
///
/// This is the root data structure for the tongs configuration. It is read from an optional
/// repository file and layered on top of [`Self::DEFAULT_CONFIG`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TongsConfig {
    run: RunConfig,
    #[serde(default)]
    pooling: PoolingStrategy,
    #[serde(default)]
    devices: Vec<DeviceConfig>,
    #[serde(default)]
    executor: ExecutorConfig,
    #[serde(default)]
    reports: ReportsConfig,
}

impl TongsConfig {
    /// The location of the repository config relative to the root directory.
    pub const CONFIG_PATH: &'static str = ".config/tongs.toml";

    /// Contains the default config as a TOML file.
    ///
    /// Repository-specific configuration is layered on top of the default config.
    pub const DEFAULT_CONFIG: &'static str = include_str!("../../default-config.toml");

    /// Reads the config from `config_file`, or if not specified from [`Self::CONFIG_PATH`] under
    /// `root` if that exists. Falls back to the default config otherwise.
    pub fn from_sources(
        config_file: Option<&Utf8Path>,
        root: &Utf8Path,
    ) -> Result<Self, ConfigReadError> {
        let (config_file, required) = match config_file {
            Some(file) => (file.to_owned(), true),
            None => (root.join(Self::CONFIG_PATH), false),
        };
        let source = File::new(config_file.as_str(), FileFormat::Toml).required(required);
        let builder = Self::make_default_config().add_source(source);
        Self::build_and_validate(builder, Some(config_file))
    }

    /// Parses a config from a TOML string, layered on top of the defaults.
    pub fn from_toml_str(toml: &str) -> Result<Self, ConfigReadError> {
        let builder =
            Self::make_default_config().add_source(File::from_str(toml, FileFormat::Toml));
        Self::build_and_validate(builder, None)
    }

    /// Returns the default config.
    pub fn default_config() -> Self {
        Self::build_and_validate(Self::make_default_config(), None)
            .unwrap_or_else(|err| panic!("default config is valid: {err}"))
    }

    /// Returns run-level scheduling settings.
    pub fn run(&self) -> &RunConfig {
        &self.run
    }

    /// Returns the retry quota.
    pub fn retry_quota(&self) -> RetryQuota {
        RetryQuota::new(
            self.run.retry_per_test_case_quota,
            self.run.total_allowed_retry_quota,
        )
    }

    /// Returns the pooling strategy.
    pub fn pooling(&self) -> &PoolingStrategy {
        &self.pooling
    }

    /// Returns the configured device inventory.
    pub fn devices(&self) -> &[DeviceConfig] {
        &self.devices
    }

    /// Returns executor settings.
    pub fn executor(&self) -> &ExecutorConfig {
        &self.executor
    }

    /// Returns report settings.
    pub fn reports(&self) -> &ReportsConfig {
        &self.reports
    }

    // ---
    // Helper methods
    // ---

    fn make_default_config() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(Self::DEFAULT_CONFIG, FileFormat::Toml))
    }

    fn build_and_validate(
        builder: ConfigBuilder<DefaultState>,
        config_file: Option<Utf8PathBuf>,
    ) -> Result<Self, ConfigReadError> {
        let config: Self = builder
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| ConfigReadError::new(config_file.clone(), err.into()))?;
        config
            .validate()
            .map_err(|kind| ConfigReadError::new(config_file, kind))?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigReadErrorKind> {
        let timeouts = [
            ("run.poll-timeout", self.run.poll_timeout),
            ("run.test-output-timeout", self.run.test_output_timeout),
            ("run.listener-settle-timeout", self.run.listener_settle_timeout),
        ];
        for (key, timeout) in timeouts {
            if timeout.is_zero() {
                return Err(ConfigReadErrorKind::InvalidValue {
                    key,
                    message: "timeout must be greater than zero".to_owned(),
                });
            }
        }

        if let PoolingStrategy::Manual { pools } = &self.pooling {
            if pools.is_empty() {
                return Err(ConfigReadErrorKind::InvalidValue {
                    key: "pooling.pools",
                    message: "manual pooling requires at least one pool".to_owned(),
                });
            }
            if let Some((name, _)) = pools.iter().find(|(_, serials)| serials.is_empty()) {
                return Err(ConfigReadErrorKind::InvalidValue {
                    key: "pooling.pools",
                    message: format!("pool `{name}` lists no devices"),
                });
            }
        }

        if let Some(command) = &self.executor.command {
            if command.trim().is_empty() {
                return Err(ConfigReadErrorKind::InvalidValue {
                    key: "executor.command",
                    message: "command must not be empty".to_owned(),
                });
            }
        }

        Ok(())
    }
}

/// Run-level scheduling settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunConfig {
    retry_per_test_case_quota: usize,
    total_allowed_retry_quota: usize,
    #[serde(with = "humantime_serde")]
    poll_timeout: Duration,
    #[serde(with = "humantime_serde")]
    test_output_timeout: Duration,
    #[serde(with = "humantime_serde")]
    listener_settle_timeout: Duration,
    #[serde(default)]
    retry_on_other_device: bool,
}

impl RunConfig {
    /// How long an idle device waits for work before re-checking whether it can stop.
    pub fn poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    /// The output timeout handed to the executor for each attempt.
    pub fn test_output_timeout(&self) -> Duration {
        self.test_output_timeout
    }

    /// Extra time to wait for an attempt's result on top of the output timeout.
    pub fn listener_settle_timeout(&self) -> Duration {
        self.listener_settle_timeout
    }

    /// Whether retries avoid the device the test case just failed on.
    pub fn retry_on_other_device(&self) -> bool {
        self.retry_on_other_device
    }
}

/// A statically configured device.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct DeviceConfig {
    /// The device serial.
    pub serial: String,

    /// The API level of the device.
    pub api_level: u32,

    /// The device model, if known.
    #[serde(default)]
    pub model: Option<String>,

    /// Whether screen capture diagnostics are supported.
    #[serde(default)]
    pub supports_diagnostics: bool,
}

/// Settings for the command executor.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ExecutorConfig {
    /// The command template used to run a single test.
    #[serde(default)]
    pub command: Option<String>,
}

/// Where reports are written.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ReportsConfig {
    /// The path to write a JUnit XML report to.
    #[serde(default)]
    pub junit: Option<Utf8PathBuf>,

    /// The path to write a JSON summary to.
    #[serde(default)]
    pub summary_json: Option<Utf8PathBuf>,
}
