// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

pub mod cfg;
pub mod cmd;

pub use cfg::*;
pub use cmd::*;

/// The overall version of the API. Anytime an API is added, removed,
/// or modified, this number should increment. Currently we attach no
/// semantic meaning to the number other than as a means to verify
/// that the driver and engine are compiled for the same API. A u64 is
/// used to give future wiggle room to play bit games if neeeded.
pub const API_VERSION: u64 = 1;

/// Major version of the manifold package.
pub const MAJOR_VERSION: u64 = 0;

/// A gate index: one numbered input or output port on a module.
pub type GateIdx = u16;

/// The maximum number of gates a module may declare, input or output.
pub const MAX_GATES: usize = 100;
