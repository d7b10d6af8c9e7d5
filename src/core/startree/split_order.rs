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

use std::collections::HashSet;

use crate::core::startree::config::StarTreeV2Config;
use crate::error::ErrorKind::InvalidConfig;
use crate::error::Result;

/// Recursion order and star-node suppression, as dimension ids.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOrder {
    pub dimensions_split_order: Vec<usize>,
    pub dimensions_without_star_node: HashSet<usize>,
}

impl SplitOrder {
    /// `cardinalities[i]` belongs to `config.dimensions[i]`.
    pub fn plan(config: &StarTreeV2Config, cardinalities: &[usize]) -> Result<SplitOrder> {
        if cardinalities.len() != config.dimensions.len() {
            bail!(InvalidConfig(format!(
                "{} cardinalities for {} dimensions",
                cardinalities.len(),
                config.dimensions.len()
            )));
        }
        let dimensions_split_order = if config.dimensions_split_order.is_empty() {
            default_split_order(cardinalities)
        } else {
            let order = enumerate_dimensions(&config.dimensions, &config.dimensions_split_order)?;
            if order.len() != config.dimensions.len() {
                let missing: Vec<&str> = config
                    .dimensions
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !order.contains(i))
                    .map(|(_, d)| d.as_str())
                    .collect();
                bail!(InvalidConfig(format!(
                    "split order misses dimensions {:?}",
                    missing
                )));
            }
            order
        };
        let dimensions_without_star_node =
            enumerate_dimensions(&config.dimensions, &config.dimensions_without_star_node)?
                .into_iter()
                .collect();
        Ok(SplitOrder {
            dimensions_split_order,
            dimensions_without_star_node,
        })
    }

    pub fn len(&self) -> usize {
        self.dimensions_split_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions_split_order.is_empty()
    }

    /// Dimension split at `level`.
    pub fn dimension_at(&self, level: usize) -> usize {
        self.dimensions_split_order[level]
    }

    pub fn creates_star_node(&self, dimension_id: usize) -> bool {
        !self.dimensions_without_star_node.contains(&dimension_id)
    }

    pub fn names<'a>(&self, dimensions: &'a [String]) -> Vec<&'a str> {
        self.dimensions_split_order
            .iter()
            .map(|&i| dimensions[i].as_str())
            .collect()
    }
}

/// Maps names to their ids in `dimensions`, unknown and repeated names are errors.
pub fn enumerate_dimensions(dimensions: &[String], names: &[String]) -> Result<Vec<usize>> {
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        let id = match dimensions.iter().position(|d| d == name) {
            Some(id) => id,
            None => bail!(InvalidConfig(format!("unknown dimension '{}'", name))),
        };
        if ids.contains(&id) {
            bail!(InvalidConfig(format!("dimension '{}' listed twice", name)));
        }
        ids.push(id);
    }
    Ok(ids)
}

/// Dimension ids by descending cardinality, ties keep configured order.
pub fn default_split_order(cardinalities: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..cardinalities.len()).collect();
    order.sort_by(|&a, &b| cardinalities[b].cmp(&cardinalities[a]));
    order
}
