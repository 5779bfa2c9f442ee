// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Module configuration values.
//!
//! These are the typed forms the external configuration parser
//! deserializes into before handing them to a module constructor. All
//! range and consistency checking happens in the constructor, not
//! here.

use super::GateIdx;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// A byte window into the packet data, used as hash input.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FlowWindow {
    /// Byte offset from the start of the packet data.
    pub offset: u16,
    /// Number of bytes in the window.
    pub length: u16,
}

/// How a load balancer maps a packet's flow window to a gate.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum PolicyCfg {
    /// Read the window as a big-endian unsigned integer, optionally
    /// mask it, and divide the value space evenly across the gates.
    Modulo { mask: Option<u64> },

    /// Byte-order sensitive mixing hash. Forward and reverse
    /// directions of a conversation generally land on different
    /// gates.
    Directional,

    /// Commutative byte-sum hash. Swapping source/destination fields
    /// within the window yields the same gate, giving session
    /// affinity across both traffic directions.
    Symmetric,

    /// Consistent hashing over `buckets` virtual points per gate.
    /// Changing the gate count remaps only about `1/n` of flows.
    Consistent { buckets: u16 },
}

/// One contiguous range of output gates assigned to an input gate.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SplitRangeCfg {
    pub igate: GateIdx,
    pub base: GateIdx,
    pub count: u16,
}

/// The gate mapping of a load balancer.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum GateMapCfg {
    /// The first `n` output gates, in order.
    Count(u16),

    /// An explicit list: policy result `i` forwards to `list[i]`.
    List(Vec<GateIdx>),

    /// Per-input-gate contiguous ranges: policy result `i` on input
    /// gate `g` forwards to `base(g) + i`.
    Split(Vec<SplitRangeCfg>),
}

/// Load-balancer construction arguments.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LoadBalancerCfg {
    pub window: FlowWindow,
    pub policy: PolicyCfg,
    pub gates: GateMapCfg,

    /// Where packets land when they cannot be classified (window out
    /// of bounds) or when a computed gate is out of range. `None`
    /// releases such packets back to the pool.
    pub default_gate: Option<GateIdx>,
}

/// Latency-measurer construction arguments.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MeasureCfg {
    /// Seconds to wait after the first batch before recording.
    pub warmup_secs: u64,

    /// Byte offset of the marker + send-timestamp block written by
    /// the peer stamping stage. Defaults to the Ethernet + IPv4 + TCP
    /// header span when absent.
    pub ts_offset: Option<u16>,
}

/// One sequenced field of a [`SequencerCfg`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FieldVarCfg {
    pub offset: u16,
    /// Field width in bytes: 1, 2, or 4.
    pub size: u8,
    pub min: u32,
    pub max: u32,
}

/// Field-sequencer construction arguments.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct SequencerCfg {
    pub vars: Vec<FieldVarCfg>,
}
