// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Administrative command types and the shared error enum.
//!
//! Command argument and response bodies travel as serialized bytes;
//! the engine's command plumbing decides the wire format. Each type
//! here is the payload of exactly one named command.

use super::GateIdx;
use super::cfg::FieldVarCfg;
use super::cfg::GateMapCfg;
use super::cfg::LoadBalancerCfg;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::Debug;
use serde::Deserialize;
use serde::Serialize;

/// Load balancer: replace the gate mapping. Not safe to run
/// concurrently with the data path.
pub const CMD_SET_GATES: &str = "set_gates";
/// Load balancer: fetch the active configuration.
pub const CMD_GET_CONFIG: &str = "get_config";
/// Measurer: fetch packet/byte/latency totals.
pub const CMD_GET_SUMMARY: &str = "get_summary";
/// Measurer: zero the live histogram. Sequencer: drop all sequenced
/// fields.
pub const CMD_CLEAR: &str = "clear";
/// Measurer: deep-copy the live histogram into a snapshot slot.
pub const CMD_SAVE_SNAPSHOT: &str = "save_snapshot";
/// Measurer: differential percentiles against a saved snapshot.
pub const CMD_GET_PTILE: &str = "get_ptile";
/// Sequencer: append sequenced fields.
pub const CMD_ADD: &str = "add";

/// An error returned from module construction or an administrative
/// command. Nothing in the hot path returns one of these; per-packet
/// problems are counted and skipped instead.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ModuleError {
    /// A configuration or argument field is missing, out of range, or
    /// contradictory. Names the offending field.
    InvalidArgument { field: String, msg: String },

    /// Allocation of an owned resource failed at construction or in a
    /// command.
    ResourceExhausted { what: String },

    /// A command referenced something that was never populated, such
    /// as an empty snapshot slot.
    NotFound { what: String },

    /// The named command does not exist on this module.
    Unsupported { what: String },

    /// The command argument bytes did not decode.
    DeserCmdReq(String),

    /// The command response failed to serialize.
    SerCmdResp(String),
}

/// A marker trait indicating a success response type that is returned
/// from a command and may be passed across the admin-channel boundary.
pub trait CmdOk: Debug + Serialize {}

impl CmdOk for () {}

/// Indicates no meaningful response value on success.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NoResp {
    pub unused: u64,
}

impl CmdOk for NoResp {}

/// Argument to [`CMD_SET_GATES`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SetGatesReq {
    pub gates: GateMapCfg,
    pub default_gate: Option<GateIdx>,
}

// The response to `get_config` is the configuration itself.
impl CmdOk for LoadBalancerCfg {}

/// The response to [`CMD_GET_SUMMARY`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetSummaryResp {
    /// Packets seen since construction, warmup included.
    pub packets: u64,
    /// Wire bits for measured packets, including per-packet framing
    /// overhead.
    pub bits: u64,
    /// Sum of all recorded latencies.
    pub total_latency_ns: u64,
}

impl CmdOk for GetSummaryResp {}

/// Argument to [`CMD_SAVE_SNAPSHOT`].
#[derive(Clone, Copy, Debug, Deserialize, Serialize)]
pub struct SaveSnapshotReq {
    pub index: u32,
}

/// Argument to [`CMD_GET_PTILE`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetPtileReq {
    /// Snapshot slot to difference against.
    pub index: u32,
    /// Requested percentiles, each in `[0, 100]`.
    pub percentiles: Vec<f64>,
}

/// The response to [`CMD_GET_PTILE`]: one latency bound per requested
/// percentile, in nanoseconds.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct GetPtileResp {
    pub latencies_ns: Vec<f64>,
}

impl CmdOk for GetPtileResp {}

/// Argument to [`CMD_ADD`].
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AddVarsReq {
    pub vars: Vec<FieldVarCfg>,
}
