// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The field sequencer: steps configured packet fields through a
//! value range, one increment per processed batch.
//!
//! Useful ahead of a load balancer under test: a sequenced field
//! walks the balancer through its whole gate range deterministically.

use super::batch::PacketBatch;
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
use heapless::Vec as FVec;
use manifold_api::AddVarsReq;
use manifold_api::CMD_ADD;
use manifold_api::CMD_CLEAR;
use manifold_api::FieldVarCfg;
use manifold_api::GateIdx;
use manifold_api::ModuleError;
use manifold_api::NoResp;
use manifold_api::SequencerCfg;
use stat_macro::StatProvider;

/// Most fields one instance may sequence.
pub const MAX_VARS: usize = 16;

static SPEC: ModuleSpec = ModuleSpec {
    name: "FieldSequencer",
    igates: 1,
    ogates: 1,
    commands: &[
        CommandDesc { name: CMD_ADD, safety: CmdSafety::RequiresPause },
        CommandDesc { name: CMD_CLEAR, safety: CmdSafety::RequiresPause },
    ],
};

#[derive(StatProvider)]
struct SeqStats {
    pkts: StatU64,
    /// Packets too short for a configured field.
    skipped: StatU64,
}

#[derive(Clone, Copy, Debug)]
struct SeqVar {
    offset: usize,
    size: u8,
    min: u32,
    /// max - min + 1; zero never occurs (the full-width wrap is
    /// capped below it).
    range: u32,
    idx: u32,
}

pub struct FieldSequencer {
    stats: StatNamed<SeqStats>,
    vars: FVec<SeqVar, MAX_VARS>,
}

impl FieldSequencer {
    pub fn new(name: &str, cfg: SequencerCfg) -> Result<Self> {
        let stats = StatNamed::new("manifold", name, SeqStats::new()).map_err(
            |e| ModuleError::InvalidArgument {
                field: "name".to_string(),
                msg: e.to_string(),
            },
        )?;

        let mut seq = Self { stats, vars: FVec::new() };
        seq.add_vars(&cfg.vars)?;
        Ok(seq)
    }

    fn add_vars(&mut self, vars: &[FieldVarCfg]) -> Result<()> {
        if self.vars.len() + vars.len() > MAX_VARS {
            return Err(ModuleError::InvalidArgument {
                field: "vars".to_string(),
                msg: format!("max {} variables can be specified", MAX_VARS),
            });
        }

        for v in vars {
            let limit: u32 = match v.size {
                1 => 0xff,
                2 => 0xffff,
                4 => u32::MAX,
                _ => {
                    return Err(ModuleError::InvalidArgument {
                        field: "vars.size".to_string(),
                        msg: format!("must be 1, 2, or 4, got {}", v.size),
                    });
                }
            };

            let min = v.min.min(limit);
            let max = v.max.min(limit);
            if min > max {
                return Err(ModuleError::InvalidArgument {
                    field: "vars.min".to_string(),
                    msg: "must not be greater than max".to_string(),
                });
            }

            let range = max.wrapping_sub(min).wrapping_add(1);
            let range = if range == 0 { u32::MAX } else { range };

            // Capacity was checked up front.
            let _ = self.vars.push(SeqVar {
                offset: v.offset as usize,
                size: v.size,
                min,
                range,
                idx: 0,
            });
        }
        Ok(())
    }
}

impl Module for FieldSequencer {
    fn spec(&self) -> &'static ModuleSpec {
        &SPEC
    }

    fn process_batch(
        &mut self,
        ctx: &mut ProcCtx<'_>,
        _igate: GateIdx,
        mut batch: PacketBatch,
    ) {
        for var in self.vars.iter_mut() {
            let val = var.min.wrapping_add(var.idx);

            for pkt in batch.iter_mut() {
                let end = var.offset + var.size as usize;
                let Some(field) = pkt.data_mut().get_mut(var.offset..end)
                else {
                    self.stats.vals.skipped += 1;
                    continue;
                };

                match var.size {
                    1 => field[0] = val as u8,
                    2 => field.copy_from_slice(&(val as u16).to_be_bytes()),
                    _ => field.copy_from_slice(&val.to_be_bytes()),
                }
            }

            var.idx += 1;
            if var.idx == var.range {
                var.idx = 0;
            }
        }

        self.stats.vals.pkts += batch.len() as u64;
        ctx.forward(0, batch);
    }

    fn command(&mut self, name: &str, arg: &[u8]) -> Result<Vec<u8>> {
        match name {
            CMD_ADD => {
                let req: AddVarsReq = decode_req(arg)?;
                self.add_vars(&req.vars)?;
                encode_resp(&NoResp::default())
            }
            CMD_CLEAR => {
                self.vars.clear();
                encode_resp(&NoResp::default())
            }
            _ => Err(unsupported(SPEC.name, name)),
        }
    }
}
