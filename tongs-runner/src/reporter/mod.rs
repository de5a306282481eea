// Copyright (c) The tongs Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recording, summarizing and reporting test results.

mod displayer;
mod events;
mod junit;
mod sink;
mod summary;

pub use displayer::*;
pub use events::*;
pub use junit::*;
pub use sink::*;
pub use summary::*;
