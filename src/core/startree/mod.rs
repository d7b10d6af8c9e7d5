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

//! Star-tree pre-aggregation index.
//!
//! A star-tree is built over an immutable segment: raw rows are sorted and
//! condensed, then recursively split dimension by dimension. Every split may
//! add a *star* child that holds the rows aggregated over all values of the
//! split dimension. Each node gets one aggregated document with its full
//! roll-up, so a query can be answered from a handful of pre-aggregated
//! records instead of scanning raw rows.
//!
//! The builder writes one forward index per dimension, one per aggregation
//! pair and the tree itself; `converter` packs them into a single file that
//! `loader` maps back into data sources.

pub mod aggregation;
pub mod builder;
pub mod config;
pub mod converter;
pub mod data_source;
pub mod index;
pub mod loader;
pub mod metadata;
pub mod node;
pub mod record;
pub mod split_order;

#[cfg(test)]
pub mod test_util;

pub use self::builder::{BuiltStarTree, StarTreeBuilder};
pub use self::config::{BufferStrategy, MetricAggFuncPair, StarTreeV2Config};
pub use self::converter::StarTreeIndexesConverter;
pub use self::data_source::{DimensionDataSource, MetricDataSource};
pub use self::loader::{IndexMap, StarTreeV2, StarTreeV2Loader};
pub use self::metadata::StarTreeV2Metadata;
pub use self::node::{OffHeapStarTree, StarTreeNode};
pub use self::record::Record;

/// The one sentinel of the star-tree, `-1`.
///
/// It carries two meanings that never meet in the same field:
/// - in a record's dimension vector (and a node's dimension value) it is the
///   wildcard: the row is aggregated over every value of that dimension, the
///   node is a star node;
/// - as a node's dimension id it marks the root, which has no incoming split.
pub const STAR_VALUE: i32 = -1;

/// Child index of a leaf node in the serialized tree.
pub const INVALID_INDEX: i32 = -1;

/// Stored in dimension forward indexes in place of `STAR_VALUE`.
pub const VALID_INDEX_VALUE: i32 = 0;

pub const STAR_TREE: &str = "startree";
pub const STAR_TREE_V2_COUNT: &str = "startreeV2.count";
pub const STAR_TREE_V2_COLUMN_FILE: &str = "startreev2.column.psf";
pub const STAR_TREE_V2_INDEX_MAP_FILE: &str = "startreev2.index.map";
pub const STAR_TREE_V2_LOCK_FILE: &str = "startreev2.lock";

pub const DIMENSION_FWD_INDEX_SUFFIX: &str = ".sv.unsorted.fwd";
pub const RAW_FWD_INDEX_SUFFIX: &str = ".sv.raw.fwd";

/// Index map name of the tree binary.
pub const TREE_INDEX_MAP_NAME: &str = "root";

/// Per-tree metadata keys, each stored as `startree_<id>_<key>`.
pub mod metadata_keys {
    pub const DOCS_COUNT: &str = "docs.count";
    pub const SPLIT_ORDER: &str = "split.order";
    pub const MET2FUNC_MAP: &str = "met2func.map";
    pub const MAX_LEAF_RECORDS: &str = "max.leaf.records";
    pub const SKIP_STAR_NODE_CREATION_FOR_DIMENSIONS: &str =
        "skip.star.node.creation.for.dimensions";
}

/// `startree_<id>`, the file name of a tree binary before consolidation.
pub fn star_tree_name(star_tree_id: usize) -> String {
    format!("{}_{}", STAR_TREE, star_tree_id)
}

pub fn metadata_key(star_tree_id: usize, key: &str) -> String {
    format!("{}_{}", star_tree_name(star_tree_id), key)
}

pub fn dimension_index_file_name(star_tree_id: usize, dimension: &str) -> String {
    format!(
        "{}.{}{}",
        star_tree_name(star_tree_id),
        dimension,
        DIMENSION_FWD_INDEX_SUFFIX
    )
}

/// `pair_column` is `AggregationFunctionColumnPair::to_column_name()`.
pub fn raw_index_file_name(star_tree_id: usize, pair_column: &str) -> String {
    format!(
        "{}.{}{}",
        star_tree_name(star_tree_id),
        pair_column,
        RAW_FWD_INDEX_SUFFIX
    )
}
