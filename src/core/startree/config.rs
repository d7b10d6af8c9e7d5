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
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::startree::aggregation::{AggregationFunctionColumnPair, AggregationFunctionType};
use crate::core::startree::TREE_INDEX_MAP_NAME;
use crate::error::ErrorKind::InvalidConfig;
use crate::error::{Result, ResultExt};

pub const DEFAULT_MAX_NUM_LEAF_RECORDS: usize = 10_000;

fn default_max_num_leaf_records() -> usize {
    DEFAULT_MAX_NUM_LEAF_RECORDS
}

/// Where build-time records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStrategy {
    /// A vector of records on the heap.
    OnHeap,
    /// Serialized records in a growable memory-mapped file under `out_dir`.
    OffHeap,
}

impl Default for BufferStrategy {
    fn default() -> Self {
        BufferStrategy::OnHeap
    }
}

/// One configured aggregate, `function_type` is a function name such as `sum`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricAggFuncPair {
    pub function_type: String,
    pub column: String,
    #[serde(default)]
    pub arguments: Vec<String>,
}

impl MetricAggFuncPair {
    pub fn new(function_type: &str, column: &str) -> MetricAggFuncPair {
        MetricAggFuncPair {
            function_type: function_type.to_string(),
            column: column.to_string(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: &[&str]) -> MetricAggFuncPair {
        self.arguments = arguments.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Resolves the function name and checks its arguments.
    pub fn resolve(&self) -> Result<AggregationFunctionColumnPair> {
        let function_type = AggregationFunctionType::from_name(&self.function_type)?;
        let pair = AggregationFunctionColumnPair::new(function_type, &self.column)
            .with_arguments(self.arguments.clone());
        pair.function()?;
        Ok(pair)
    }
}

/// Options of one star-tree build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarTreeV2Config {
    /// Dimension names, a dimension's id is its position here.
    pub dimensions: Vec<String>,
    /// Explicit split order, computed from cardinalities when empty.
    #[serde(default)]
    pub dimensions_split_order: Vec<String>,
    #[serde(default)]
    pub dimensions_without_star_node: Vec<String>,
    pub metric_agg_func_pairs: Vec<MetricAggFuncPair>,
    #[serde(default = "default_max_num_leaf_records")]
    pub max_num_leaf_records: usize,
    #[serde(default)]
    pub buffer: BufferStrategy,
    /// The segment directory: build output, consolidated file and index map go here.
    pub out_dir: PathBuf,
}

impl StarTreeV2Config {
    pub fn new<P: AsRef<Path>>(
        dimensions: &[&str],
        metric_agg_func_pairs: Vec<MetricAggFuncPair>,
        out_dir: P,
    ) -> StarTreeV2Config {
        StarTreeV2Config {
            dimensions: dimensions.iter().map(|s| s.to_string()).collect(),
            dimensions_split_order: Vec::new(),
            dimensions_without_star_node: Vec::new(),
            metric_agg_func_pairs,
            max_num_leaf_records: DEFAULT_MAX_NUM_LEAF_RECORDS,
            buffer: BufferStrategy::default(),
            out_dir: out_dir.as_ref().to_path_buf(),
        }
    }

    pub fn with_split_order(mut self, split_order: &[&str]) -> Self {
        self.dimensions_split_order = split_order.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_dimensions_without_star_node(mut self, dimensions: &[&str]) -> Self {
        self.dimensions_without_star_node = dimensions.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_max_num_leaf_records(mut self, max_num_leaf_records: usize) -> Self {
        self.max_num_leaf_records = max_num_leaf_records;
        self
    }

    pub fn with_buffer(mut self, buffer: BufferStrategy) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn from_json(json: &str) -> Result<StarTreeV2Config> {
        let config: StarTreeV2Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<StarTreeV2Config> {
        let json = fs::read_to_string(path.as_ref())
            .chain_err(|| format!("failed to read {}", path.as_ref().display()))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks everything that can be checked without the segment.
    pub fn validate(&self) -> Result<()> {
        if self.dimensions.is_empty() {
            bail!(InvalidConfig("star-tree needs at least one dimension".into()));
        }
        let mut seen = HashSet::with_capacity(self.dimensions.len());
        for dimension in &self.dimensions {
            if dimension.is_empty() || dimension.contains(',') || dimension == TREE_INDEX_MAP_NAME {
                bail!(InvalidConfig(format!(
                    "illegal dimension name '{}'",
                    dimension
                )));
            }
            if !seen.insert(dimension.as_str()) {
                bail!(InvalidConfig(format!("duplicate dimension '{}'", dimension)));
            }
        }
        if self.max_num_leaf_records == 0 {
            bail!(InvalidConfig("max_num_leaf_records must be positive".into()));
        }
        if self.metric_agg_func_pairs.is_empty() {
            bail!(InvalidConfig(
                "star-tree needs at least one aggregation pair".into()
            ));
        }
        // dimensions and aggregate columns share the index map namespace
        for pair in self.resolve_pairs()? {
            let column = pair.to_column_name();
            if seen.contains(column.as_str()) {
                bail!(InvalidConfig(format!(
                    "dimension '{}' clashes with an aggregation column",
                    column
                )));
            }
        }
        Ok(())
    }

    /// Resolved pairs in configured order, duplicates rejected.
    pub fn resolve_pairs(&self) -> Result<Vec<AggregationFunctionColumnPair>> {
        let mut pairs: Vec<AggregationFunctionColumnPair> =
            Vec::with_capacity(self.metric_agg_func_pairs.len());
        for configured in &self.metric_agg_func_pairs {
            let pair = configured.resolve()?;
            if pairs.iter().any(|p| p.to_column_name() == pair.to_column_name()) {
                bail!(InvalidConfig(format!(
                    "duplicate aggregation pair {}",
                    pair
                )));
            }
            pairs.push(pair);
        }
        Ok(pairs)
    }
}
