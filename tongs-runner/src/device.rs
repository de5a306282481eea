// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Devices that tests run on, and the providers that enumerate them.

use crate::{config::DeviceConfig, errors::DeviceProviderError};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// The stable, unique handle of a device: its serial.
///
/// Queue exclusions, in-flight bookkeeping and the worker termination check all key off this.
#[derive(Clone, Debug, Deserialize, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct DeviceId(Arc<str>);

impl DeviceId {
    /// Creates a new device ID from a serial.
    pub fn new(serial: impl AsRef<str>) -> Self {
        Self(serial.as_ref().into())
    }

    /// Returns the serial as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(serial: &str) -> Self {
        Self::new(serial)
    }
}

/// A device connection that tests can be executed on.
///
/// Capability data is used for auxiliary behavior (pooling by API level, diagnostics capture) and
/// never for scheduling correctness.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Device {
    id: DeviceId,
    api_level: u32,
    model: Option<String>,
    diagnostics: Diagnostics,
}

impl Device {
    /// Creates a new device.
    pub fn new(id: impl Into<DeviceId>, api_level: u32) -> Self {
        Self {
            id: id.into(),
            api_level,
            model: None,
            diagnostics: Diagnostics::None,
        }
    }

    /// Sets the model name for this device.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Sets the diagnostics capability of this device.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Returns the ID of this device.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// Returns the serial of this device.
    pub fn serial(&self) -> &str {
        self.id.as_str()
    }

    /// Returns the API level reported by this device.
    pub fn api_level(&self) -> u32 {
        self.api_level
    }

    /// Returns the model of this device, if known.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Returns the diagnostics supported by this device.
    pub fn diagnostics(&self) -> Diagnostics {
        self.diagnostics
    }

    /// A human-readable name for log lines: the model if known, followed by the serial.
    pub fn long_name(&self) -> String {
        match &self.model {
            Some(model) => format!("{model} ({})", self.id),
            None => self.id.to_string(),
        }
    }
}

impl From<&DeviceConfig> for Device {
    fn from(config: &DeviceConfig) -> Self {
        let diagnostics = if !config.supports_diagnostics {
            Diagnostics::None
        } else if config.api_level >= Diagnostics::SCREENRECORD_MIN_API_LEVEL {
            Diagnostics::Video
        } else {
            Diagnostics::Screenshots
        };
        let device =
            Device::new(config.serial.as_str(), config.api_level).with_diagnostics(diagnostics);
        match &config.model {
            Some(model) => device.with_model(model.clone()),
            None => device,
        }
    }
}

/// The screen capture strategy a device supports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Diagnostics {
    /// Screen recording is available.
    Video,
    /// Only periodic screenshots are available.
    Screenshots,
    /// No capture is available.
    None,
}

impl Diagnostics {
    /// The minimum API level at which screen recording is available.
    pub const SCREENRECORD_MIN_API_LEVEL: u32 = 19;
}

/// Enumerates the devices available for pool construction.
pub trait DeviceProvider {
    /// Returns the devices currently available.
    fn devices(&self) -> Result<Vec<Device>, DeviceProviderError>;
}

/// A [`DeviceProvider`] backed by the static device inventory in the configuration.
#[derive(Clone, Debug)]
pub struct ConfiguredDeviceProvider {
    devices: Vec<DeviceConfig>,
}

impl ConfiguredDeviceProvider {
    /// Creates a new provider from configured devices.
    pub fn new(devices: impl IntoIterator<Item = DeviceConfig>) -> Self {
        Self {
            devices: devices.into_iter().collect(),
        }
    }
}

impl DeviceProvider for ConfiguredDeviceProvider {
    fn devices(&self) -> Result<Vec<Device>, DeviceProviderError> {
        let mut seen = std::collections::HashSet::new();
        self.devices
            .iter()
            .map(|config| {
                if !seen.insert(config.serial.as_str()) {
                    return Err(DeviceProviderError::DuplicateSerial {
                        serial: config.serial.clone(),
                    });
                }
                Ok(Device::from(config))
            })
            .collect()
    }
}
