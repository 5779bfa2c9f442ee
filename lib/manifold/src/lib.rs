// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Manifold: a single-core packet-pipeline engine.
//!
//! A pipeline is a graph of modules. Each module consumes a bounded
//! batch of packets, transforms or classifies them, and forwards them
//! through numbered output gates. The driver that owns the topology
//! pushes batches into a module's input gate; the module's process
//! step runs to completion and stages zero or more sub-batches on its
//! output gates for delivery downstream.

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[macro_use]
extern crate alloc;

// This is needed so that the stat-macro (`#[derive(StatProvider)]`)
// can use fully-qualified type paths.
extern crate self as manifold;

pub mod engine;
pub mod provider;
pub mod stat;

pub use manifold_api as api;

use alloc::boxed::Box;
use provider::LogProvider;

/// Shared execution context handed to modules at construction.
///
/// Carries the injected services a module may use outside of batch
/// processing proper, such as logging. Modules hold an `Arc` to it;
/// nothing here is touched per packet.
pub struct ExecCtx {
    pub log: Box<dyn LogProvider>,
}
