// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The manifold engine: batches, gates, and the modules that process
//! them.

pub mod batch;
pub mod flow;
pub mod gate;
pub mod hash;
pub mod histogram;
pub mod lb;
pub mod measure;
pub mod module;
pub mod packet;
pub mod sequencer;

pub use manifold_api::GateIdx;
pub use manifold_api::MAX_GATES;

/// The number of nanoseconds in a second.
pub const NANOS: u64 = 1_000_000_000;
