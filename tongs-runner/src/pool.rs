// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pools: named groups of devices that share a queue of test cases.

use crate::{
    config::PoolingStrategy,
    device::{Device, DeviceId, DeviceProvider},
    errors::PoolLoadError,
};
use indexmap::IndexMap;
use itertools::Itertools;
use std::{collections::HashMap, fmt, sync::Arc};

/// The name of a pool.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PoolName(Arc<str>);

impl PoolName {
    /// Creates a new pool name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().into())
    }

    /// Returns the name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, non-empty, ordered group of devices.
#[derive(Clone, Debug)]
pub struct Pool {
    name: PoolName,
    devices: Vec<Device>,
}

impl Pool {
    /// The name of the pool created by [`PoolingStrategy::Single`].
    pub const DEFAULT_NAME: &'static str = "default";

    /// Creates a new pool. Returns an error if `devices` is empty.
    pub fn new(name: PoolName, devices: Vec<Device>) -> Result<Self, PoolLoadError> {
        if devices.is_empty() {
            return Err(PoolLoadError::EmptyPool { pool: name });
        }
        Ok(Self { name, devices })
    }

    /// Returns the name of this pool.
    pub fn name(&self) -> &PoolName {
        &self.name
    }

    /// Returns the devices in this pool, in order.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Iterates over the IDs of the devices in this pool.
    pub fn device_ids(&self) -> impl Iterator<Item = &DeviceId> + '_ {
        self.devices.iter().map(Device::id)
    }

    /// Returns the number of devices in this pool. Always at least 1.
    pub fn size(&self) -> usize {
        self.devices.len()
    }
}

/// Groups devices into pools according to a [`PoolingStrategy`].
#[derive(Clone, Debug)]
pub struct PoolLoader {
    strategy: PoolingStrategy,
}

impl PoolLoader {
    /// Creates a new loader for `strategy`.
    pub fn new(strategy: PoolingStrategy) -> Self {
        Self { strategy }
    }

    /// Fetches devices from `provider` and groups them into pools.
    pub fn load_from(&self, provider: &dyn DeviceProvider) -> Result<Vec<Pool>, PoolLoadError> {
        let devices = provider.devices()?;
        self.load(devices)
    }

    /// Groups `devices` into pools.
    ///
    /// Fails if there are no devices, if a serial appears twice, if no pools result, or if
    /// any pool would be empty.
    pub fn load(&self, devices: Vec<Device>) -> Result<Vec<Pool>, PoolLoadError> {
        if devices.is_empty() {
            return Err(PoolLoadError::NoDevicesFound);
        }
        if let Some(device) = devices.iter().map(Device::id).duplicates().next() {
            return Err(PoolLoadError::DuplicateDevice {
                device: device.clone(),
            });
        }

        let pools = match &self.strategy {
            PoolingStrategy::Single => {
                vec![Pool::new(PoolName::new(Pool::DEFAULT_NAME), devices)?]
            }
            PoolingStrategy::EachDevice => devices
                .into_iter()
                .map(|device| Pool::new(PoolName::new(device.serial()), vec![device]))
                .collect::<Result<_, _>>()?,
            PoolingStrategy::ApiLevel => {
                let mut by_level: IndexMap<u32, Vec<Device>> = IndexMap::new();
                for device in devices {
                    by_level.entry(device.api_level()).or_default().push(device);
                }
                by_level.sort_keys();
                by_level
                    .into_iter()
                    .map(|(level, devices)| {
                        Pool::new(PoolName::new(format!("api-{level}")), devices)
                    })
                    .collect::<Result<_, _>>()?
            }
            PoolingStrategy::Manual { pools } => Self::load_manual(pools, devices)?,
        };

        if pools.is_empty() {
            return Err(PoolLoadError::NoPools);
        }
        for pool in &pools {
            tracing::debug!(
                "pool {} has {} device(s): {}",
                pool.name(),
                pool.size(),
                pool.device_ids().join(", ")
            );
        }
        Ok(pools)
    }

    fn load_manual(
        pools: &IndexMap<String, Vec<String>>,
        devices: Vec<Device>,
    ) -> Result<Vec<Pool>, PoolLoadError> {
        let known: Vec<DeviceId> = devices.iter().map(|device| device.id().clone()).collect();
        let mut by_serial: HashMap<DeviceId, Device> = devices
            .into_iter()
            .map(|device| (device.id().clone(), device))
            .collect();
        let mut assigned: HashMap<DeviceId, PoolName> = HashMap::new();

        let mut out = Vec::with_capacity(pools.len());
        for (name, serials) in pools {
            let name = PoolName::new(name);
            let mut pool_devices = Vec::with_capacity(serials.len());
            for serial in serials {
                let id = DeviceId::new(serial);
                if let Some(first) = assigned.get(&id) {
                    return Err(PoolLoadError::DeviceInMultiplePools {
                        device: id,
                        first: first.clone(),
                        second: name,
                    });
                }
                let device = by_serial
                    .remove(&id)
                    .ok_or_else(|| PoolLoadError::UnknownDevice {
                        pool: name.clone(),
                        serial: serial.clone(),
                        known: known.clone(),
                    })?;
                assigned.insert(id, name.clone());
                pool_devices.push(device);
            }
            out.push(Pool::new(name, pool_devices)?);
        }

        for unassigned in by_serial.keys() {
            tracing::warn!("device {unassigned} is not part of any pool and will not run tests");
        }

        Ok(out)
    }
}
