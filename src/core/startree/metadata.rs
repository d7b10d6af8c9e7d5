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

use std::str::FromStr;

use crate::core::segment::MetadataStore;
use crate::core::startree::aggregation::AggregationFunctionColumnPair;
use crate::core::startree::{metadata_key, metadata_keys, STAR_TREE_V2_COUNT};
use crate::error::ErrorKind::CorruptIndex;
use crate::error::Result;

/// What a segment's metadata store records about one star-tree.
#[derive(Debug, Clone, PartialEq)]
pub struct StarTreeV2Metadata {
    pub star_tree_id: usize,
    /// Records in the buffer, which is the row count of every forward index.
    pub num_docs: usize,
    pub dimensions_split_order: Vec<String>,
    pub function_column_pairs: Vec<AggregationFunctionColumnPair>,
    pub max_num_leaf_records: usize,
    pub skip_star_node_creation_for_dimensions: Vec<String>,
}

/// Number of star-trees of the segment, zero when none was built.
pub fn star_tree_count<M: MetadataStore + ?Sized>(store: &M) -> Result<usize> {
    match store.get(STAR_TREE_V2_COUNT) {
        Some(count) => parse_number(STAR_TREE_V2_COUNT, count),
        None => Ok(0),
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Ok(v),
        Err(_) => bail!(CorruptIndex(format!(
            "malformed metadata {} = '{}'",
            key, value
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn required<'a, M: MetadataStore + ?Sized>(
    store: &'a M,
    star_tree_id: usize,
    key: &str,
) -> Result<(String, &'a str)> {
    let full_key = metadata_key(star_tree_id, key);
    match store.get(&full_key) {
        Some(value) => Ok((full_key, value)),
        None => bail!(CorruptIndex(format!(
            "missing star-tree metadata {}",
            full_key
        ))),
    }
}

impl StarTreeV2Metadata {
    /// Stages every key of this tree, the caller saves the store.
    pub fn write_to<M: MetadataStore + ?Sized>(&self, store: &mut M) {
        let id = self.star_tree_id;
        store.set(
            &metadata_key(id, metadata_keys::DOCS_COUNT),
            self.num_docs.to_string(),
        );
        store.set(
            &metadata_key(id, metadata_keys::SPLIT_ORDER),
            self.dimensions_split_order.join(","),
        );
        let pairs: Vec<String> = self
            .function_column_pairs
            .iter()
            .map(AggregationFunctionColumnPair::to_persisted)
            .collect();
        store.set(&metadata_key(id, metadata_keys::MET2FUNC_MAP), pairs.join(","));
        store.set(
            &metadata_key(id, metadata_keys::MAX_LEAF_RECORDS),
            self.max_num_leaf_records.to_string(),
        );
        store.set(
            &metadata_key(id, metadata_keys::SKIP_STAR_NODE_CREATION_FOR_DIMENSIONS),
            self.skip_star_node_creation_for_dimensions.join(","),
        );
    }

    pub fn read_from<M: MetadataStore + ?Sized>(
        store: &M,
        star_tree_id: usize,
    ) -> Result<StarTreeV2Metadata> {
        let (key, value) = required(store, star_tree_id, metadata_keys::DOCS_COUNT)?;
        let num_docs = parse_number(&key, value)?;

        let (key, value) = required(store, star_tree_id, metadata_keys::SPLIT_ORDER)?;
        let dimensions_split_order = split_list(value);
        if dimensions_split_order.is_empty() {
            bail!(CorruptIndex(format!("empty split order in {}", key)));
        }

        let (key, value) = required(store, star_tree_id, metadata_keys::MET2FUNC_MAP)?;
        let mut function_column_pairs = Vec::new();
        for persisted in split_list(value) {
            match AggregationFunctionColumnPair::from_persisted(&persisted) {
                Ok(pair) => function_column_pairs.push(pair),
                Err(e) => bail!(CorruptIndex(format!(
                    "malformed aggregation pair '{}' in {}: {}",
                    persisted, key, e
                ))),
            }
        }

        let (key, value) = required(store, star_tree_id, metadata_keys::MAX_LEAF_RECORDS)?;
        let max_num_leaf_records = parse_number(&key, value)?;

        let (_, value) = required(
            store,
            star_tree_id,
            metadata_keys::SKIP_STAR_NODE_CREATION_FOR_DIMENSIONS,
        )?;
        let skip_star_node_creation_for_dimensions = split_list(value);

        Ok(StarTreeV2Metadata {
            star_tree_id,
            num_docs,
            dimensions_split_order,
            function_column_pairs,
            max_num_leaf_records,
            skip_star_node_creation_for_dimensions,
        })
    }

    /// Metadata of every star-tree of the segment, by id.
    pub fn read_all<M: MetadataStore + ?Sized>(store: &M) -> Result<Vec<StarTreeV2Metadata>> {
        let count = star_tree_count(store)?;
        (0..count).map(|id| Self::read_from(store, id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::startree::aggregation::AggregationFunctionType;
    use std::collections::HashMap;

    fn sample(id: usize) -> StarTreeV2Metadata {
        StarTreeV2Metadata {
            star_tree_id: id,
            num_docs: 42,
            dimensions_split_order: vec!["Country".into(), "Name".into()],
            function_column_pairs: vec![
                AggregationFunctionColumnPair::count(),
                AggregationFunctionColumnPair::new(AggregationFunctionType::SumPrecision, "salary")
                    .with_arguments(vec!["10".into(), "2".into()]),
            ],
            max_num_leaf_records: 1,
            skip_star_node_creation_for_dimensions: vec![],
        }
    }

    #[test]
    fn test_write_and_read() {
        let mut store: HashMap<String, String> = HashMap::new();
        assert_eq!(star_tree_count(&store).unwrap(), 0);
        sample(0).write_to(&mut store);
        sample(1).write_to(&mut store);
        MetadataStore::set(&mut store, STAR_TREE_V2_COUNT, "2".to_string());

        assert_eq!(
            MetadataStore::get(&store, "startree_0_met2func.map"),
            Some("count__*,sumPrecision__salary__10__2")
        );
        assert_eq!(
            MetadataStore::get(&store, "startree_1_split.order"),
            Some("Country,Name")
        );
        assert_eq!(
            MetadataStore::get(&store, "startree_1_skip.star.node.creation.for.dimensions"),
            Some("")
        );
        let all = StarTreeV2Metadata::read_all(&store).unwrap();
        assert_eq!(all, vec![sample(0), sample(1)]);
    }

    #[test]
    fn test_reports_missing_and_malformed_keys() {
        let mut store: HashMap<String, String> = HashMap::new();
        sample(0).write_to(&mut store);
        store.remove("startree_0_max.leaf.records");
        let err = StarTreeV2Metadata::read_from(&store, 0).unwrap_err();
        assert!(err.to_string().contains("startree_0_max.leaf.records"));

        sample(0).write_to(&mut store);
        store.insert("startree_0_docs.count".into(), "many".into());
        assert!(StarTreeV2Metadata::read_from(&store, 0).is_err());

        sample(0).write_to(&mut store);
        store.insert("startree_0_met2func.map".into(), "avg__salary".into());
        assert!(StarTreeV2Metadata::read_from(&store, 0).is_err());

        store.insert(STAR_TREE_V2_COUNT.into(), "x".into());
        assert!(star_tree_count(&store).is_err());
    }
}
