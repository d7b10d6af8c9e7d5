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

use std::cmp::Ordering;

use crate::core::store::io::{DataInput, DataOutput};
use crate::error::ErrorKind::{CorruptIndex, InvalidConfig};
use crate::error::Result;

pub const DEFAULT_COMPRESSION: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub mean: f64,
    pub weight: f64,
}

/// Merging t-digest: a sorted list of weighted centroids whose sizes are
/// bounded by `4 * N * q * (1 - q) / compression`, so quantiles near the tails
/// stay accurate.
#[derive(Debug, Clone, PartialEq)]
pub struct TDigest {
    compression: f64,
    centroids: Vec<Centroid>,
    total_weight: f64,
    min: f64,
    max: f64,
}

impl TDigest {
    pub fn new(compression: f64) -> Result<TDigest> {
        if !(compression >= 1.0) || !compression.is_finite() {
            bail!(InvalidConfig(format!(
                "t-digest compression must be a finite value >= 1, got {}",
                compression
            )));
        }
        Ok(TDigest {
            compression,
            centroids: Vec::new(),
            total_weight: 0.0,
            min: ::std::f64::INFINITY,
            max: ::std::f64::NEG_INFINITY,
        })
    }

    pub fn compression(&self) -> f64 {
        self.compression
    }

    pub fn centroids(&self) -> &[Centroid] {
        &self.centroids
    }

    /// Number of values folded in so far.
    pub fn size(&self) -> u64 {
        self.total_weight as u64
    }

    pub fn is_empty(&self) -> bool {
        self.centroids.is_empty()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn add(&mut self, value: f64) {
        self.merge_centroids(&[Centroid {
            mean: value,
            weight: 1.0,
        }]);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(&mut self, other: &TDigest) {
        if other.is_empty() {
            return;
        }
        self.merge_centroids(&other.centroids);
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    fn merge_centroids(&mut self, incoming: &[Centroid]) {
        let mut all = Vec::with_capacity(self.centroids.len() + incoming.len());
        all.extend_from_slice(&self.centroids);
        all.extend_from_slice(incoming);
        all.sort_by(|a, b| {
            a.mean
                .partial_cmp(&b.mean)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.weight.partial_cmp(&b.weight).unwrap_or(Ordering::Equal))
        });

        let total: f64 = all.iter().map(|c| c.weight).sum();
        let mut compressed: Vec<Centroid> = Vec::with_capacity(all.len());
        let mut weight_so_far = 0.0;
        let mut iter = all.into_iter();
        if let Some(mut current) = iter.next() {
            for next in iter {
                let proposed = current.weight + next.weight;
                let q = (weight_so_far + proposed / 2.0) / total;
                let limit = (4.0 * total * q * (1.0 - q) / self.compression).max(1.0);
                if proposed <= limit {
                    current.mean += (next.mean - current.mean) * next.weight / proposed;
                    current.weight = proposed;
                } else {
                    weight_so_far += current.weight;
                    compressed.push(current);
                    current = next;
                }
            }
            compressed.push(current);
        }
        self.centroids = compressed;
        self.total_weight = total;
    }

    /// Estimated value at quantile `q` in `[0, 1]`, `NaN` when empty.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.centroids.is_empty() {
            return ::std::f64::NAN;
        }
        if self.centroids.len() == 1 {
            return self.centroids[0].mean;
        }
        let q = q.max(0.0).min(1.0);
        let target = q * self.total_weight;

        let first = &self.centroids[0];
        if target <= first.weight / 2.0 {
            return self.min + (first.mean - self.min) * target / (first.weight / 2.0);
        }

        let mut cumulative = first.weight / 2.0;
        for pair in self.centroids.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            let step = (left.weight + right.weight) / 2.0;
            if target <= cumulative + step {
                let fraction = (target - cumulative) / step;
                return left.mean + (right.mean - left.mean) * fraction;
            }
            cumulative += step;
        }

        let last = &self.centroids[self.centroids.len() - 1];
        let remaining = (target - cumulative).min(last.weight / 2.0);
        last.mean + (self.max - last.mean) * remaining / (last.weight / 2.0)
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut out: Vec<u8> = Vec::with_capacity(32 + self.centroids.len() * 16);
        out.write_long(self.compression.to_bits() as i64)?;
        out.write_long(self.min.to_bits() as i64)?;
        out.write_long(self.max.to_bits() as i64)?;
        out.write_int(self.centroids.len() as i32)?;
        for c in &self.centroids {
            out.write_long(c.mean.to_bits() as i64)?;
            out.write_long(c.weight.to_bits() as i64)?;
        }
        Ok(out)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TDigest> {
        let mut input = bytes;
        let read_f64 = |input: &mut &[u8]| -> Result<f64> {
            Ok(f64::from_bits(input.read_long()? as u64))
        };
        let compression = read_f64(&mut input)?;
        let mut digest = TDigest::new(compression)
            .map_err(|e| CorruptIndex(format!("malformed t-digest: {}", e)))?;
        digest.min = read_f64(&mut input)?;
        digest.max = read_f64(&mut input)?;
        let count = input.read_int()?;
        if count < 0 || input.len() != count as usize * 16 {
            bail!(CorruptIndex(format!(
                "malformed t-digest: {} centroids in {} bytes",
                count,
                input.len()
            )));
        }
        let mut total = 0.0;
        for _ in 0..count {
            let mean = read_f64(&mut input)?;
            let weight = read_f64(&mut input)?;
            total += weight;
            digest.centroids.push(Centroid { mean, weight });
        }
        digest.total_weight = total;
        Ok(digest)
    }
}
