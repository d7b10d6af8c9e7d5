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

use crate::core::startree::aggregation::{AggregatedValue, AggregationFunction};
use crate::core::startree::STAR_VALUE;
use crate::error::ErrorKind::IllegalState;
use crate::error::Result;

/// A build-time row: one dimension value per configured dimension
/// (a dictionary id or `STAR_VALUE`) plus one value per aggregation pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub dimensions: Vec<i32>,
    pub metrics: Vec<AggregatedValue>,
}

impl Record {
    pub fn new(dimensions: Vec<i32>, metrics: Vec<AggregatedValue>) -> Record {
        Record {
            dimensions,
            metrics,
        }
    }

    /// Aggregated document of a node: star everywhere but the node's own split.
    pub fn aggregated(
        num_dimensions: usize,
        dimension_id: i32,
        dimension_value: i32,
        metrics: Vec<AggregatedValue>,
    ) -> Record {
        let mut dimensions = vec![STAR_VALUE; num_dimensions];
        if dimension_id != STAR_VALUE {
            dimensions[dimension_id as usize] = dimension_value;
        }
        Record::new(dimensions, metrics)
    }

    pub fn dimension_equal(&self, other: &Record) -> bool {
        self.dimensions == other.dimensions
    }

    /// Folds `other`'s metrics into this record.
    pub fn merge(
        &mut self,
        other: &[AggregatedValue],
        functions: &[AggregationFunction],
    ) -> Result<()> {
        if other.len() != self.metrics.len() || functions.len() != self.metrics.len() {
            bail!(IllegalState(format!(
                "cannot merge {} metrics into {} with {} functions",
                other.len(),
                self.metrics.len(),
                functions.len()
            )));
        }
        let metrics = self.metrics.drain(..).collect::<Vec<_>>();
        for ((left, right), function) in metrics.into_iter().zip(other).zip(functions) {
            self.metrics.push(function.aggregate(left, right)?);
        }
        Ok(())
    }
}

/// Lexicographic order of dimension vectors, following `order`.
pub fn compare_dimensions(left: &[i32], right: &[i32], order: &[usize]) -> Ordering {
    for &d in order {
        match left[d].cmp(&right[d]) {
            Ordering::Equal => {}
            other => return other,
        }
    }
    Ordering::Equal
}
