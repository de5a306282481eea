// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use indexmap::IndexMap;
use serde::Deserialize;

/// How devices are grouped into pools.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(tag = "strategy", rename_all = "kebab-case", deny_unknown_fields)]
pub enum PoolingStrategy {
    /// A single pool named `default` containing every device.
    #[default]
    Single,

    /// One pool per device, named after the device's serial.
    EachDevice,

    /// One pool per API level, named `api-<level>`.
    ApiLevel,

    /// Explicitly named pools, each listing the serials it contains.
    Manual {
        /// Pool name to serials, in declaration order.
        pools: IndexMap<String, Vec<String>>,
    },
}
