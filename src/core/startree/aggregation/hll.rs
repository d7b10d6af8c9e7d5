// Copyright 2019 Zhizhesihai (Beijing) Technology Limited.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use xxhash_rust::xxh64::xxh64;

use crate::error::ErrorKind::{CorruptIndex, InvalidConfig, SketchMerge};
use crate::error::Result;

pub const DEFAULT_LOG2M: u8 = 8;
pub const MIN_LOG2M: u8 = 4;
pub const MAX_LOG2M: u8 = 16;

/// Dense HyperLogLog sketch over 64-bit xxhash values.
///
/// Register `i` keeps the largest rank seen for hashes whose top `log2m`
/// bits equal `i`. Two sketches merge by register-wise max, which is
/// associative and commutative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HyperLogLog {
    log2m: u8,
    registers: Vec<u8>,
}

impl HyperLogLog {
    pub fn new(log2m: u8) -> Result<HyperLogLog> {
        if log2m < MIN_LOG2M || log2m > MAX_LOG2M {
            bail!(InvalidConfig(format!(
                "log2m must be within [{}, {}], got {}",
                MIN_LOG2M, MAX_LOG2M, log2m
            )));
        }
        Ok(HyperLogLog {
            log2m,
            registers: vec![0u8; 1 << log2m],
        })
    }

    pub fn log2m(&self) -> u8 {
        self.log2m
    }

    /// Size of `serialize()` output for a given precision.
    pub fn serialized_size(log2m: u8) -> usize {
        1 + (1usize << log2m)
    }

    pub fn offer(&mut self, bytes: &[u8]) {
        self.offer_hash(xxh64(bytes, 0));
    }

    pub fn offer_hash(&mut self, hash: u64) {
        let p = u32::from(self.log2m);
        let index = (hash >> (64 - p)) as usize;
        // the guard bit caps the rank at 64 - p + 1
        let w = (hash << p) | (1u64 << (p - 1));
        let rank = w.leading_zeros() as u8 + 1;
        if rank > self.registers[index] {
            self.registers[index] = rank;
        }
    }

    pub fn merge(&mut self, other: &HyperLogLog) -> Result<()> {
        if self.log2m != other.log2m {
            bail!(SketchMerge(format!(
                "cannot merge HyperLogLog with log2m {} into log2m {}",
                other.log2m, self.log2m
            )));
        }
        for (mine, theirs) in self.registers.iter_mut().zip(other.registers.iter()) {
            if *theirs > *mine {
                *mine = *theirs;
            }
        }
        Ok(())
    }

    pub fn cardinality(&self) -> u64 {
        let m = self.registers.len() as f64;
        let alpha = match self.registers.len() {
            16 => 0.673,
            32 => 0.697,
            64 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / m),
        };
        let mut sum = 0.0f64;
        let mut zeros = 0usize;
        for r in &self.registers {
            sum += 2f64.powi(-i32::from(*r));
            if *r == 0 {
                zeros += 1;
            }
        }
        let estimate = alpha * m * m / sum;
        if estimate <= 2.5 * m && zeros > 0 {
            // small range correction: linear counting
            (m * (m / zeros as f64).ln()).round() as u64
        } else {
            estimate.round() as u64
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::serialized_size(self.log2m));
        bytes.push(self.log2m);
        bytes.extend_from_slice(&self.registers);
        bytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<HyperLogLog> {
        if bytes.is_empty() {
            bail!(CorruptIndex("empty HyperLogLog bytes".into()));
        }
        let log2m = bytes[0];
        if log2m < MIN_LOG2M
            || log2m > MAX_LOG2M
            || bytes.len() != Self::serialized_size(log2m)
        {
            bail!(CorruptIndex(format!(
                "malformed HyperLogLog: log2m {}, {} bytes",
                log2m,
                bytes.len()
            )));
        }
        Ok(HyperLogLog {
            log2m,
            registers: bytes[1..].to_vec(),
        })
    }
}
