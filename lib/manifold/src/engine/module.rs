// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The module runtime contract.
//!
//! Every pipeline stage implements [`Module`]: constructed from a
//! validated config, driven one batch at a time by a single worker,
//! queried over an administrative channel, and torn down by drop.
//! The process step is run-to-completion; it must not block and must
//! not allocate on the common path.

use super::batch::PacketBatch;
use super::gate::GateSet;
use super::packet::PacketPool;
use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::CmdOk;
use manifold_api::GateIdx;
use manifold_api::ModuleError;
use serde::Deserialize;

pub type Result<T> = core::result::Result<T, ModuleError>;

/// Whether a command may run while batches are in flight on the same
/// instance.
///
/// The engine itself never serializes commands against the data
/// path; this flag is the contract the driver enforces. A command
/// marked [`CmdSafety::RequiresPause`] must not be invoked until
/// batch delivery to the instance is paused.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CmdSafety {
    DataPathSafe,
    RequiresPause,
}

/// One administrative command a module class answers to.
#[derive(Clone, Copy, Debug)]
pub struct CommandDesc {
    pub name: &'static str,
    pub safety: CmdSafety,
}

/// Static description of a module class: its name, gate counts, and
/// command table.
#[derive(Clone, Copy, Debug)]
pub struct ModuleSpec {
    pub name: &'static str,
    pub igates: u16,
    pub ogates: u16,
    pub commands: &'static [CommandDesc],
}

/// Per-call context the driver hands to [`Module::process_batch`].
pub struct ProcCtx<'a> {
    /// The worker's current timestamp, taken once per scheduling
    /// round.
    pub now_ns: u64,
    pub pool: &'a mut PacketPool,
    pub gates: &'a mut GateSet,
}

impl ProcCtx<'_> {
    /// Route each packet of `batch` to the gate named by the parallel
    /// `ogates` array, preserving relative order within each gate.
    ///
    /// A destination at or past the output-gate count is clamped to
    /// `default_gate`; packets with no valid destination are released
    /// back to the pool. Gate indices are never used to index storage
    /// without this check.
    pub fn route(
        &mut self,
        batch: PacketBatch,
        ogates: &[GateIdx],
        default_gate: Option<GateIdx>,
    ) {
        let ngates = self.gates.ogates();
        let default_gate =
            default_gate.filter(|g| (*g as usize) < ngates);

        for (i, pkt) in batch.into_iter().enumerate() {
            let wanted = ogates.get(i).copied().unwrap_or(GateIdx::MAX);
            let dest = if (wanted as usize) < ngates {
                Some(wanted)
            } else {
                default_gate
            };

            match dest {
                Some(g) => {
                    if let Err(pkt) = self.gates.push(g, pkt) {
                        self.pool.free(pkt);
                    }
                }
                None => self.pool.free(pkt),
            }
        }
    }

    /// Forward a whole batch to one gate, releasing it if the gate is
    /// out of range or overflows.
    pub fn forward(&mut self, gate: GateIdx, batch: PacketBatch) {
        for pkt in batch {
            if let Err(pkt) = self.gates.push(gate, pkt) {
                self.pool.free(pkt);
            }
        }
    }

    /// Release every packet of `batch` back to the pool.
    pub fn release(&mut self, batch: PacketBatch) {
        for pkt in batch {
            self.pool.free(pkt);
        }
    }
}

/// A pipeline stage.
///
/// One thread drives `process_batch` per instance; implementations
/// keep no internal hot-path locking and share no mutable state
/// across instances. Owned resources are released on drop.
pub trait Module {
    fn spec(&self) -> &'static ModuleSpec;

    /// Consume `batch` from input gate `igate`, staging zero or more
    /// sub-batches on the context's output gates. Malformed packets
    /// are skipped individually; the call never fails.
    fn process_batch(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        igate: GateIdx,
        batch: PacketBatch,
    );

    /// Run the named administrative command. Argument and response
    /// bodies are postcard-serialized; see the request/response types
    /// in `manifold_api`.
    fn command(&mut self, name: &str, arg: &[u8]) -> Result<Vec<u8>>;

    /// The declared safety of `name`, or `None` for an unknown
    /// command.
    fn command_safety(&self, name: &str) -> Option<CmdSafety> {
        self.spec()
            .commands
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.safety)
    }
}

/// Decode a command argument body.
pub fn decode_req<'a, T: Deserialize<'a>>(bytes: &'a [u8]) -> Result<T> {
    postcard::from_bytes(bytes)
        .map_err(|e| ModuleError::DeserCmdReq(e.to_string()))
}

/// Encode a command response body.
pub fn encode_resp<T: CmdOk>(resp: &T) -> Result<Vec<u8>> {
    postcard::to_allocvec(resp)
        .map_err(|e| ModuleError::SerCmdResp(e.to_string()))
}

/// The error for a command name a module does not implement.
pub fn unsupported(module: &'static str, name: &str) -> ModuleError {
    ModuleError::Unsupported { what: format!("{}: {}", module, name) }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::lb::LoadBalancer;
    use manifold_api::FlowWindow;
    use manifold_api::GateMapCfg;
    use manifold_api::GetPtileReq;
    use manifold_api::LoadBalancerCfg;
    use manifold_api::NoResp;
    use manifold_api::PolicyCfg;
    use manifold_api::CMD_GET_CONFIG;
    use manifold_api::CMD_SET_GATES;

    #[test]
    fn req_resp_roundtrip() {
        let req = GetPtileReq { index: 3, percentiles: vec![50.0, 99.0] };
        let bytes = postcard::to_allocvec(&req).unwrap();
        let back: GetPtileReq = decode_req(&bytes).unwrap();
        assert_eq!(back.index, 3);
        assert_eq!(back.percentiles, vec![50.0, 99.0]);

        let resp = encode_resp(&NoResp::default()).unwrap();
        assert!(!resp.is_empty());
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            decode_req::<GetPtileReq>(&[0xff]),
            Err(ModuleError::DeserCmdReq(_))
        ));
    }

    #[test]
    fn route_clamps_out_of_range() {
        let mut pool = PacketPool::new(4, 32).unwrap();
        let mut gates = GateSet::new(2);

        let mut batch = PacketBatch::new();
        for _ in 0..3 {
            batch.push(pool.alloc().unwrap()).unwrap();
        }
        let mut ctx =
            ProcCtx { now_ns: 0, pool: &mut pool, gates: &mut gates };
        // Gate 5 does not exist; it clamps to the default gate.
        ctx.route(batch, &[0, 5, 1], Some(1));
        assert_eq!(gates.staged(0), 1);
        assert_eq!(gates.staged(1), 2);

        // With no default gate the stray packet is released instead.
        let mut batch = PacketBatch::new();
        batch.push(pool.alloc().unwrap()).unwrap();
        assert_eq!(pool.available(), 0);
        let mut ctx =
            ProcCtx { now_ns: 0, pool: &mut pool, gates: &mut gates };
        ctx.route(batch, &[9], None);
        assert_eq!(pool.available(), 1);
    }

    #[test]
    fn command_safety_flags() {
        let lb = LoadBalancer::new(
            "lb0",
            LoadBalancerCfg {
                window: FlowWindow { offset: 0, length: 4 },
                policy: PolicyCfg::Directional,
                gates: GateMapCfg::Count(2),
                default_gate: None,
            },
        )
        .unwrap();

        let m: &dyn Module = &lb;
        assert_eq!(m.spec().name, "LoadBalancer");
        assert_eq!(
            m.command_safety(CMD_SET_GATES),
            Some(CmdSafety::RequiresPause)
        );
        assert_eq!(
            m.command_safety(CMD_GET_CONFIG),
            Some(CmdSafety::DataPathSafe)
        );
        assert_eq!(m.command_safety("bogus"), None);
    }
}
