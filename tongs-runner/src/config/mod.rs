// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration support for tongs.
//!
//! The configuration is a TOML file layered on top of the built-in defaults. See
//! [`TongsConfig::DEFAULT_CONFIG`] for the keys and their default values.

mod core;
mod pooling;
mod retry_quota;

pub use self::core::*;
pub use pooling::*;
pub use retry_quota::*;
