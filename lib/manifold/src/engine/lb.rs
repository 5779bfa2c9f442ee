// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The load balancer: hashes each packet's flow window and splits
//! the batch across output gates.
//!
//! The policy is selected once at construction from the validated
//! configuration and dispatched as a variant, never re-resolved per
//! packet. Every computed gate index passes through the bounds check
//! in [`ProcCtx::route`] before it touches gate storage.

use super::batch::MAX_BURST;
use super::batch::PacketBatch;
use super::flow;
use super::gate::SplitTable;
use super::hash;
use super::hash::ConsistentRing;
use super::module::CmdSafety;
use super::module::CommandDesc;
use super::module::Module;
use super::module::ModuleSpec;
use super::module::ProcCtx;
use super::module::Result;
use super::module::decode_req;
use super::module::encode_resp;
use super::module::unsupported;
use crate::stat::StatNamed;
use crate::stat::StatProvider;
use crate::stat::StatU64;
use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::CMD_GET_CONFIG;
use manifold_api::CMD_SET_GATES;
use manifold_api::FlowWindow;
use manifold_api::GateIdx;
use manifold_api::GateMapCfg;
use manifold_api::LoadBalancerCfg;
use manifold_api::MAX_GATES;
use manifold_api::ModuleError;
use manifold_api::NoResp;
use manifold_api::PolicyCfg;
use manifold_api::SetGatesReq;
use stat_macro::StatProvider;

static SPEC: ModuleSpec = ModuleSpec {
    name: "LoadBalancer",
    igates: MAX_GATES as u16,
    ogates: MAX_GATES as u16,
    commands: &[
        CommandDesc { name: CMD_SET_GATES, safety: CmdSafety::RequiresPause },
        CommandDesc { name: CMD_GET_CONFIG, safety: CmdSafety::DataPathSafe },
    ],
};

#[derive(StatProvider)]
struct LbStats {
    /// Packets taken off input gates.
    in_pkts: StatU64,
    /// Packets whose window lay outside the packet bounds.
    malformed: StatU64,
    /// Packets released because their input gate had no assigned
    /// output range.
    dropped: StatU64,
}

/// The validated gate mapping, ready for per-packet use.
enum Mapping {
    /// One flat list: policy result `i` forwards to `gates[i]`.
    List { gates: Vec<GateIdx>, ring: Option<ConsistentRing> },
    /// Per-input-gate ranges: result `i` forwards to `base + i`.
    /// Rings are per input gate, aligned with the table.
    Split { table: SplitTable, rings: Vec<Option<ConsistentRing>> },
}

pub struct LoadBalancer {
    stats: StatNamed<LbStats>,
    cfg: LoadBalancerCfg,
    mapping: Mapping,
}

impl LoadBalancer {
    pub fn new(name: &str, cfg: LoadBalancerCfg) -> Result<Self> {
        flow::validate(&cfg.window)?;
        validate_policy(&cfg.policy, &cfg.window)?;
        if let Some(g) = cfg.default_gate {
            if g as usize >= MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "default_gate".to_string(),
                    msg: format!("no more than {} gates", MAX_GATES),
                });
            }
        }
        let mapping = build_mapping(&cfg.policy, &cfg.gates)?;

        let stats = StatNamed::new("manifold", name, LbStats::new()).map_err(
            |e| ModuleError::InvalidArgument {
                field: "name".to_string(),
                msg: e.to_string(),
            },
        )?;

        Ok(Self { stats, cfg, mapping })
    }

    fn set_gates(&mut self, req: SetGatesReq) -> Result<()> {
        if let Some(g) = req.default_gate {
            if g as usize >= MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "default_gate".to_string(),
                    msg: format!("no more than {} gates", MAX_GATES),
                });
            }
        }
        self.mapping = build_mapping(&self.cfg.policy, &req.gates)?;
        self.cfg.gates = req.gates;
        self.cfg.default_gate = req.default_gate;
        Ok(())
    }

    /// The policy result for one window over `n` gates.
    fn classify(&self, win: &[u8], n: u16, ring: Option<&ConsistentRing>) -> u16 {
        match self.cfg.policy {
            PolicyCfg::Modulo { mask } => hash::modulo(win, mask, n),
            PolicyCfg::Directional => {
                (hash::directional(win) % n as u32) as u16
            }
            PolicyCfg::Symmetric => (hash::symmetric(win) % n as u32) as u16,
            PolicyCfg::Consistent { .. } => match ring {
                Some(r) => r.gate(ConsistentRing::hash_window(win)),
                None => 0,
            },
        }
    }
}

fn validate_policy(
    policy: &PolicyCfg,
    window: &FlowWindow,
) -> Result<()> {
    match policy {
        PolicyCfg::Modulo { .. } => {
            if window.length as usize > hash::MODULO_WINDOW_MAX {
                return Err(ModuleError::InvalidArgument {
                    field: "window.length".to_string(),
                    msg: format!(
                        "modulo policy reads at most {} bytes",
                        hash::MODULO_WINDOW_MAX
                    ),
                });
            }
        }
        PolicyCfg::Consistent { buckets } => {
            if *buckets == 0 {
                return Err(ModuleError::InvalidArgument {
                    field: "policy.buckets".to_string(),
                    msg: "must be at least 1".to_string(),
                });
            }
        }
        PolicyCfg::Directional | PolicyCfg::Symmetric => (),
    }
    Ok(())
}

fn ring_for(policy: &PolicyCfg, n: u16) -> Result<Option<ConsistentRing>> {
    match policy {
        PolicyCfg::Consistent { buckets } if n > 0 => {
            Ok(Some(ConsistentRing::new(n, *buckets)?))
        }
        _ => Ok(None),
    }
}

fn build_mapping(policy: &PolicyCfg, cfg: &GateMapCfg) -> Result<Mapping> {
    match cfg {
        GateMapCfg::Count(n) => {
            if *n as usize > MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "gates".to_string(),
                    msg: format!("no more than {} gates", MAX_GATES),
                });
            }
            let gates = (0..*n).collect();
            Ok(Mapping::List { gates, ring: ring_for(policy, *n)? })
        }

        GateMapCfg::List(list) => {
            if list.len() > MAX_GATES {
                return Err(ModuleError::InvalidArgument {
                    field: "gates".to_string(),
                    msg: format!("no more than {} gates", MAX_GATES),
                });
            }
            for g in list {
                if *g as usize >= MAX_GATES {
                    return Err(ModuleError::InvalidArgument {
                        field: "gates".to_string(),
                        msg: format!("invalid gate {}", g),
                    });
                }
            }
            let ring = ring_for(policy, list.len() as u16)?;
            Ok(Mapping::List { gates: list.clone(), ring })
        }

        GateMapCfg::Split(ranges) => {
            let table = SplitTable::new(ranges)?;
            let mut rings = Vec::with_capacity(table.igates());
            for igate in 0..table.igates() {
                let n = table
                    .range(igate as GateIdx)
                    .map(|r| r.count)
                    .unwrap_or(0);
                rings.push(ring_for(policy, n)?);
            }
            Ok(Mapping::Split { table, rings })
        }
    }
}

impl Module for LoadBalancer {
    fn spec(&self) -> &'static ModuleSpec {
        &SPEC
    }

    fn process_batch(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        igate: GateIdx,
        batch: PacketBatch,
    ) {
        // Resolve the active range for this input gate.
        let (base, n, ring) = match &self.mapping {
            Mapping::List { gates, ring } => {
                (None, gates.len() as u16, ring.as_ref())
            }
            Mapping::Split { table, rings } => match table.range(igate) {
                Some(r) => (
                    Some(r.base),
                    r.count,
                    rings.get(igate as usize).and_then(Option::as_ref),
                ),
                None => {
                    self.stats.vals.dropped += batch.len() as u64;
                    ctx.release(batch);
                    return;
                }
            },
        };

        // An empty range forwards nothing: drop the batch, and never
        // let a zero reach the policy arithmetic.
        if n == 0 {
            self.stats.vals.dropped += batch.len() as u64;
            ctx.release(batch);
            return;
        }

        self.stats.vals.in_pkts += batch.len() as u64;

        let mut ogates: heapless::Vec<GateIdx, MAX_BURST> = heapless::Vec::new();
        for pkt in batch.iter() {
            let gate = match flow::window(pkt, &self.cfg.window) {
                Some(win) => {
                    let r = self.classify(win, n, ring);
                    match (&self.mapping, base) {
                        (Mapping::List { gates, .. }, _) => gates[r as usize],
                        (_, Some(b)) => b + r,
                        _ => r,
                    }
                }
                // Malformed: let route() clamp to the default gate.
                None => {
                    self.stats.vals.malformed += 1;
                    GateIdx::MAX
                }
            };
            let _ = ogates.push(gate);
        }

        ctx.route(batch, &ogates, self.cfg.default_gate);
    }

    fn command(&mut self, name: &str, arg: &[u8]) -> Result<Vec<u8>> {
        match name {
            CMD_SET_GATES => {
                let req: SetGatesReq = decode_req(arg)?;
                self.set_gates(req)?;
                encode_resp(&NoResp::default())
            }
            CMD_GET_CONFIG => encode_resp(&self.cfg),
            _ => Err(unsupported(SPEC.name, name)),
        }
    }
}
