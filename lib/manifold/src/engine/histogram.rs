// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The latency histogram: a two-level logarithmic bucket table for
//! lock-free, allocation-free online percentile estimation.
//!
//! Latencies from 100 ns to 10 s are covered by eight decades of
//! 1000 linearly spaced buckets each — three significant digits of
//! resolution. Recording is O(1) integer arithmetic; queries walk
//! the table and are meant for the administrative path.

use alloc::string::ToString;
use alloc::vec::Vec;
use manifold_api::ModuleError;

/// The smallest representable unit: one bucket of decade zero.
pub const BASE_UNIT_NS: u64 = 100;
/// Decades covered, 10^2 ns through 10^10 ns.
pub const DECADES: usize = 8;
/// Linear buckets per decade.
pub const BUCKETS: usize = 1000;

const POW10: [u64; DECADES] =
    [1, 10, 100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000];

/// The outcome of recording one sample.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Record {
    /// Counted in a bucket.
    Counted,
    /// Beyond the last decade; counted in the overflow cell.
    AboveThreshold,
    /// Indices fell outside the table; the sample was dropped.
    OutOfRange,
}

/// A latency frequency table. Cells only grow until [`clear`].
///
/// [`clear`]: Histogram::clear
#[derive(Debug)]
pub struct Histogram {
    cells: Vec<u64>,
    above_threshold: u64,
}

impl Histogram {
    /// Allocate the backing storage. This is the only allocation the
    /// histogram ever performs.
    pub fn new() -> Result<Histogram, ModuleError> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(DECADES * BUCKETS).map_err(|_| {
            ModuleError::ResourceExhausted { what: "histogram".to_string() }
        })?;
        cells.resize(DECADES * BUCKETS, 0);
        Ok(Self { cells, above_threshold: 0 })
    }

    /// Record one latency sample.
    pub fn record(&mut self, latency_ns: u64) -> Record {
        let base = latency_ns / BASE_UNIT_NS;

        let (decade, bucket) = if base == 0 {
            (0, latency_ns as usize)
        } else {
            let decade = base.ilog10() as usize;
            if decade >= DECADES {
                self.above_threshold += 1;
                return Record::AboveThreshold;
            }
            (decade, (latency_ns / POW10[decade]) as usize)
        };

        if bucket >= BUCKETS {
            return Record::OutOfRange;
        }

        self.cells[decade * BUCKETS + bucket] += 1;
        Record::Counted
    }

    /// Zero every cell and the overflow counter.
    pub fn clear(&mut self) {
        self.cells.fill(0);
        self.above_threshold = 0;
    }

    /// A deep, independently owned copy of the current contents.
    pub fn snapshot(&self) -> Result<Histogram, ModuleError> {
        let mut cells = Vec::new();
        cells.try_reserve_exact(self.cells.len()).map_err(|_| {
            ModuleError::ResourceExhausted {
                what: "histogram snapshot".to_string(),
            }
        })?;
        cells.extend_from_slice(&self.cells);
        Ok(Self { cells, above_threshold: self.above_threshold })
    }

    /// The count in one bucket.
    pub fn count(&self, decade: usize, bucket: usize) -> u64 {
        self.cells[decade * BUCKETS + bucket]
    }

    /// Samples beyond the last decade.
    pub fn above_threshold(&self) -> u64 {
        self.above_threshold
    }

    /// Samples across all buckets, overflow excluded.
    pub fn total(&self) -> u64 {
        self.cells.iter().sum()
    }

    /// For each requested percentile, the smallest bucket upper edge
    /// (in nanoseconds) whose cumulative count reaches
    /// `total * p / 100`. An empty histogram reports all zeros.
    pub fn percentiles(&self, ps: &[f64]) -> Vec<f64> {
        ptile_over(|i| self.cells[i], ps)
    }

    /// The same statistic over the bucket-wise difference between
    /// this (live) histogram and an earlier snapshot: only samples
    /// recorded since the snapshot count. A live cell smaller than
    /// its snapshot counterpart (possible after a clear) contributes
    /// zero.
    pub fn diff_percentiles(&self, snap: &Histogram, ps: &[f64]) -> Vec<f64> {
        ptile_over(|i| self.cells[i].saturating_sub(snap.cells[i]), ps)
    }
}

fn ptile_over(cell: impl Fn(usize) -> u64, ps: &[f64]) -> Vec<f64> {
    let total: u64 = (0..DECADES * BUCKETS).map(&cell).sum();
    let mut out = vec![0.0; ps.len()];
    if total == 0 {
        return out;
    }

    let thresholds: Vec<f64> =
        ps.iter().map(|p| total as f64 * p / 100.0).collect();
    let mut pending = ps.len();
    let mut cum = 0u64;

    for d in 0..DECADES {
        for b in 0..BUCKETS {
            let c = cell(d * BUCKETS + b);
            if c == 0 {
                continue;
            }
            cum += c;

            let edge = ((b + 1) as u64 * POW10[d]) as f64;
            for (k, thr) in thresholds.iter().enumerate() {
                if out[k] == 0.0 && cum as f64 >= *thr {
                    out[k] = edge;
                    pending -= 1;
                }
            }
            if pending == 0 {
                return out;
            }
        }
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decade_placement() {
        let mut hist = Histogram::new().unwrap();
        assert_eq!(hist.record(150), Record::Counted);
        assert_eq!(hist.record(1_500), Record::Counted);
        assert_eq!(hist.record(15_000), Record::Counted);

        assert_eq!(hist.count(0, 150), 1);
        assert_eq!(hist.count(1, 150), 1);
        assert_eq!(hist.count(2, 150), 1);
        assert_eq!(hist.above_threshold(), 0);
        assert_eq!(hist.total(), 3);
    }

    #[test]
    fn sub_base_unit_lands_in_decade_zero() {
        let mut hist = Histogram::new().unwrap();
        assert_eq!(hist.record(42), Record::Counted);
        assert_eq!(hist.count(0, 42), 1);
    }

    #[test]
    fn overflow_counts_above_threshold() {
        let mut hist = Histogram::new().unwrap();
        // 10 seconds: past the last decade.
        assert_eq!(hist.record(10_000_000_000), Record::AboveThreshold);
        assert_eq!(hist.above_threshold(), 1);
        assert_eq!(hist.total(), 0);
    }

    #[test]
    fn empty_percentiles_are_zero() {
        let hist = Histogram::new().unwrap();
        assert_eq!(hist.percentiles(&[50.0, 99.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn p100_bounds_inserted_latency() {
        let mut hist = Histogram::new().unwrap();
        for _ in 0..5 {
            hist.record(1_500);
        }
        let p = hist.percentiles(&[100.0]);
        // 1500 ns lives in decade 1, bucket 150: upper edge 1510,
        // next bucket boundary 1520.
        assert_eq!(p, vec![1_510.0]);
        assert!(p[0] >= 1_500.0 && p[0] < 1_520.0);
    }

    #[test]
    fn diff_matches_fresh_histogram() {
        let mut live = Histogram::new().unwrap();
        for _ in 0..1000 {
            live.record(300);
        }
        let snap = live.snapshot().unwrap();

        let mut fresh = Histogram::new().unwrap();
        for lat in [5_000, 5_000, 70_000] {
            live.record(lat);
            fresh.record(lat);
        }

        let ps = [50.0, 99.0, 100.0];
        assert_eq!(live.diff_percentiles(&snap, &ps), fresh.percentiles(&ps));
    }

    #[test]
    fn diff_saturates_after_clear() {
        let mut live = Histogram::new().unwrap();
        for _ in 0..10 {
            live.record(2_000);
        }
        let snap = live.snapshot().unwrap();
        live.clear();

        // Live counts fell below the snapshot; the difference is
        // zero, not an underflowed large count.
        assert_eq!(live.diff_percentiles(&snap, &[99.0]), vec![0.0]);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut live = Histogram::new().unwrap();
        live.record(500);
        let snap = live.snapshot().unwrap();
        live.record(500);
        assert_eq!(snap.count(0, 500), 1);
        assert_eq!(live.count(0, 500), 2);
    }
}
