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

//! Star-tree construction.
//!
//! `StarTreeBuilder::build` reads the segment and produces the tree plus its
//! record buffer in memory; `serialize` writes the forward indexes and the
//! tree binary, consolidates them and records the metadata.

mod buffer;
mod offheap_buffer;
mod tree_node;

pub use self::buffer::{HeapRecordBuffer, RecordBuffer};
pub use self::offheap_buffer::OffHeapRecordBuffer;
pub use self::tree_node::TreeNode;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use crate::core::segment::{ColumnReader, MetadataStore, RawValue, Segment};
use crate::core::startree::aggregation::{
    AggregatedValue, AggregationFunction, AggregationFunctionColumnPair,
};
use crate::core::startree::config::{BufferStrategy, StarTreeV2Config};
use crate::core::startree::converter::StarTreeIndexesConverter;
use crate::core::startree::index::{write_dimension_index, write_raw_index};
use crate::core::startree::metadata::{star_tree_count, StarTreeV2Metadata};
use crate::core::startree::node::write_tree;
use crate::core::startree::record::{compare_dimensions, Record};
use crate::core::startree::split_order::SplitOrder;
use crate::core::startree::{
    dimension_index_file_name, raw_index_file_name, star_tree_name, STAR_TREE_V2_COUNT,
    STAR_TREE_V2_LOCK_FILE, STAR_VALUE, VALID_INDEX_VALUE,
};
use crate::core::store::{Directory, FSDirectory, IO_CONTEXT_DEFAULT};
use crate::error::ErrorKind::IllegalState;
use crate::error::{Result, ResultExt};

/// Builds star-trees for one configuration.
pub struct StarTreeBuilder {
    config: StarTreeV2Config,
    pairs: Vec<AggregationFunctionColumnPair>,
    functions: Vec<AggregationFunction>,
}

/// A star-tree built in memory, not yet written.
pub struct BuiltStarTree {
    /// Configured dimensions, a dimension id indexes this list.
    pub dimensions: Vec<String>,
    pub cardinalities: Vec<usize>,
    pub split_order: SplitOrder,
    pub pairs: Vec<AggregationFunctionColumnPair>,
    pub functions: Vec<AggregationFunction>,
    pub root: TreeNode,
    pub num_nodes: usize,
    /// Documents of the segment the tree was built from.
    pub num_raw_docs: usize,
    pub max_num_leaf_records: usize,
    buffer: Box<dyn RecordBuffer>,
}

impl BuiltStarTree {
    /// Records of the final buffer, the row count of every forward index.
    pub fn num_docs(&self) -> usize {
        self.buffer.len()
    }

    pub fn record(&self, doc_id: usize) -> Result<Cow<'_, Record>> {
        self.buffer.record(doc_id)
    }

    pub fn buffer(&self) -> &dyn RecordBuffer {
        self.buffer.as_ref()
    }
}

impl StarTreeBuilder {
    /// Fails on configuration errors before any data is read.
    pub fn new(config: StarTreeV2Config) -> Result<StarTreeBuilder> {
        config.validate()?;
        let pairs = config.resolve_pairs()?;
        let functions = pairs
            .iter()
            .map(AggregationFunctionColumnPair::function)
            .collect::<Result<Vec<_>>>()?;
        Ok(StarTreeBuilder {
            config,
            pairs,
            functions,
        })
    }

    pub fn config(&self) -> &StarTreeV2Config {
        &self.config
    }

    fn new_buffer(&self) -> Result<Box<dyn RecordBuffer>> {
        Ok(match self.config.buffer {
            BufferStrategy::OnHeap => Box::new(HeapRecordBuffer::new()),
            BufferStrategy::OffHeap => Box::new(OffHeapRecordBuffer::new(
                &self.config.out_dir,
                self.config.dimensions.len(),
                self.functions.clone(),
            )?),
        })
    }

    /// Reads every document of `segment` and builds the tree with its
    /// aggregated documents.
    pub fn build<S: Segment + ?Sized>(&self, segment: &S) -> Result<BuiltStarTree> {
        if self.config.buffer == BufferStrategy::OffHeap {
            fs::create_dir_all(&self.config.out_dir).chain_err(|| {
                format!("failed to create {}", self.config.out_dir.display())
            })?;
        }
        let num_dimensions = self.config.dimensions.len();

        let mut cardinalities = Vec::with_capacity(num_dimensions);
        let mut dimension_readers: Vec<Box<dyn ColumnReader + '_>> =
            Vec::with_capacity(num_dimensions);
        for dimension in &self.config.dimensions {
            cardinalities.push(segment.dictionary(dimension)?.cardinality());
            dimension_readers.push(segment.column_reader(dimension)?);
        }
        let split_order = SplitOrder::plan(&self.config, &cardinalities)?;
        debug!(
            "split order {:?}, no star node for {:?}",
            split_order.names(&self.config.dimensions),
            self.config.dimensions_without_star_node
        );

        let mut metric_readers = Vec::with_capacity(self.pairs.len());
        for (pair, function) in self.pairs.iter().zip(&self.functions) {
            if function.reads_column() {
                metric_readers.push(Some(segment.column_reader(&pair.column)?));
            } else {
                metric_readers.push(None);
            }
        }
        let count_input = RawValue::Long(1);

        // Phase 1: raw records, converted on read.
        let num_raw_docs = segment.num_docs();
        let mut raw = self.new_buffer()?;
        let mut keys = Vec::with_capacity(num_raw_docs);
        for doc_id in 0..num_raw_docs {
            let mut dimensions = Vec::with_capacity(num_dimensions);
            for reader in &dimension_readers {
                dimensions.push(reader.dictionary_id_at(doc_id)?);
            }
            let mut metrics = Vec::with_capacity(self.functions.len());
            for (function, reader) in self.functions.iter().zip(&metric_readers) {
                let value = match reader {
                    Some(reader) => function.convert(&reader.raw_value_at(doc_id)?)?,
                    None => function.convert(&count_input)?,
                };
                metrics.push(value);
            }
            keys.push(dimensions.clone());
            raw.push(Record::new(dimensions, metrics))?;
        }
        info!("read {} raw documents", num_raw_docs);

        // Phase 2: sort by the split order and fold duplicates.
        let mut doc_ids: Vec<usize> = (0..num_raw_docs).collect();
        let order = &split_order.dimensions_split_order;
        doc_ids.sort_by(|&a, &b| compare_dimensions(&keys[a], &keys[b], order));
        drop(keys);

        let mut buffer = self.new_buffer()?;
        {
            let raw = raw.as_ref();
            let records = doc_ids
                .iter()
                .map(|&doc_id| raw.record(doc_id).map(Cow::into_owned));
            condense(records, &self.functions, |record| buffer.push(record))?;
        }
        drop(raw);
        info!(
            "condensed {} raw documents into {} records",
            num_raw_docs,
            buffer.len()
        );

        // Phase 3 and 4: split recursively, then roll up bottom-up.
        let mut root = TreeNode::root(buffer.len());
        let mut context = BuildContext {
            buffer,
            functions: &self.functions,
            split_order: &split_order,
            num_dimensions,
            max_num_leaf_records: self.config.max_num_leaf_records,
            num_nodes: 1,
        };
        context.construct_star_tree(&mut root, 0)?;
        let num_records = context.buffer.len();
        context.create_aggregated_docs(&mut root)?;
        let num_nodes = context.num_nodes;
        let buffer = context.buffer;
        info!(
            "built star-tree with {} nodes, {} records, {} aggregated documents",
            num_nodes,
            num_records,
            buffer.len() - num_records
        );

        Ok(BuiltStarTree {
            dimensions: self.config.dimensions.clone(),
            cardinalities,
            split_order,
            pairs: self.pairs.clone(),
            functions: self.functions.clone(),
            root,
            num_nodes,
            num_raw_docs,
            max_num_leaf_records: self.config.max_num_leaf_records,
            buffer,
        })
    }

    /// Writes `tree` under the next free star-tree id of the segment,
    /// consolidates it and saves the metadata.
    ///
    /// Id allocation, writing and consolidation all happen under
    /// `startreev2.lock`, so writers that do not share a metadata store
    /// still get distinct ids. The store is only touched once consolidation
    /// succeeded, so a failed build leaves the segment's metadata as it was.
    pub fn serialize<M: MetadataStore + ?Sized>(
        &self,
        tree: &BuiltStarTree,
        store: &mut M,
    ) -> Result<StarTreeV2Metadata> {
        let directory = FSDirectory::new(&self.config.out_dir)?;
        let lock = directory.obtain_lock(STAR_TREE_V2_LOCK_FILE)?;
        let result = self.serialize_locked(&directory, tree, store);
        let closed = lock.close();
        let metadata = result?;
        closed?;
        Ok(metadata)
    }

    fn serialize_locked<M: MetadataStore + ?Sized>(
        &self,
        directory: &FSDirectory,
        tree: &BuiltStarTree,
        store: &mut M,
    ) -> Result<StarTreeV2Metadata> {
        let converter = StarTreeIndexesConverter::new(directory);
        let star_tree_id = star_tree_count(store)?.max(converter.next_star_tree_id()?);
        let num_docs = tree.num_docs();

        // Phase 5: forward indexes.
        for (dimension_id, dimension) in tree.dimensions.iter().enumerate() {
            let name = dimension_index_file_name(star_tree_id, dimension);
            write_dimension_index(
                directory,
                &name,
                num_docs,
                tree.cardinalities[dimension_id],
                |doc_id| {
                    let value = tree.buffer.dimension(doc_id, dimension_id)?;
                    Ok(if value == STAR_VALUE {
                        VALID_INDEX_VALUE
                    } else {
                        value
                    })
                },
            )?;
            debug!("wrote {}", name);
        }
        for (metric_id, (pair, function)) in tree.pairs.iter().zip(&tree.functions).enumerate() {
            let name = raw_index_file_name(star_tree_id, &pair.to_column_name());
            write_raw_index(
                directory,
                &name,
                function.result_data_type(),
                num_docs,
                |doc_id| {
                    let value = tree.buffer.metric(doc_id, metric_id)?;
                    function.serialize(&value)
                },
            )?;
            debug!("wrote {}", name);
        }

        // Phase 6: the tree binary.
        let tree_name = star_tree_name(star_tree_id);
        let written = {
            let mut output = directory.create_output(&tree_name, &IO_CONTEXT_DEFAULT)?;
            let written = write_tree(&mut output, &tree.dimensions, &tree.root, tree.num_nodes)?;
            output.flush()?;
            written
        };
        let file_length = directory.file_length(&tree_name)?;
        if file_length != written as i64 {
            bail!(IllegalState(format!(
                "{} has {} bytes, expected {}",
                tree_name, file_length, written
            )));
        }

        let metadata = StarTreeV2Metadata {
            star_tree_id,
            num_docs,
            dimensions_split_order: tree
                .split_order
                .names(&tree.dimensions)
                .into_iter()
                .map(str::to_string)
                .collect(),
            function_column_pairs: tree.pairs.clone(),
            max_num_leaf_records: tree.max_num_leaf_records,
            skip_star_node_creation_for_dimensions: self
                .config
                .dimensions_without_star_node
                .clone(),
        };
        converter.consolidate(&metadata)?;

        metadata.write_to(store);
        store.set(STAR_TREE_V2_COUNT, (star_tree_id + 1).to_string());
        store.save()?;
        info!(
            "star-tree {} written to {}, {} records",
            star_tree_id, directory, num_docs
        );
        Ok(metadata)
    }

    /// `build` followed by `serialize`.
    pub fn run<S, M>(&self, segment: &S, store: &mut M) -> Result<StarTreeV2Metadata>
    where
        S: Segment + ?Sized,
        M: MetadataStore + ?Sized,
    {
        let tree = self.build(segment)?;
        self.serialize(&tree, store)
    }
}

/// Mutable state of one build, threaded through the recursion.
struct BuildContext<'a> {
    buffer: Box<dyn RecordBuffer>,
    functions: &'a [AggregationFunction],
    split_order: &'a SplitOrder,
    num_dimensions: usize,
    max_num_leaf_records: usize,
    num_nodes: usize,
}

impl<'a> BuildContext<'a> {
    fn construct_star_tree(&mut self, node: &mut TreeNode, level: usize) -> Result<()> {
        if level == self.split_order.len() {
            return Ok(());
        }
        let dimension_id = self.split_order.dimension_at(level);
        let mut children =
            self.group_on_dimension(node.start_doc_id, node.end_doc_id, dimension_id)?;
        if children.is_empty() {
            return Ok(());
        }
        self.num_nodes += children.len();
        trace!(
            "node [{}, {}) split on dimension {} into {} children",
            node.start_doc_id,
            node.end_doc_id,
            dimension_id,
            children.len()
        );

        for child in children.values_mut() {
            if child.num_docs() > self.max_num_leaf_records {
                self.construct_star_tree(child, level + 1)?;
            }
        }

        if self.split_order.creates_star_node(dimension_id) && children.len() > 1 {
            let mut star_child =
                self.construct_star_node(node.start_doc_id, node.end_doc_id, dimension_id, level)?;
            self.num_nodes += 1;
            if star_child.num_docs() > self.max_num_leaf_records {
                self.construct_star_tree(&mut star_child, level + 1)?;
            }
            children.insert(STAR_VALUE, star_child);
        }

        node.child_dimension_id = dimension_id as i32;
        node.children = Some(children);
        Ok(())
    }

    /// One child per distinct value of `dimension_id` in `[start, end)`, whose
    /// equal values are contiguous.
    fn group_on_dimension(
        &self,
        start: usize,
        end: usize,
        dimension_id: usize,
    ) -> Result<BTreeMap<i32, TreeNode>> {
        let mut children = BTreeMap::new();
        let mut group_start = start;
        let mut current = None;
        for doc_id in start..end {
            let value = self.buffer.dimension(doc_id, dimension_id)?;
            match current {
                Some(v) if v == value => {}
                Some(v) => {
                    self.add_child(&mut children, dimension_id, v, group_start, doc_id)?;
                    group_start = doc_id;
                    current = Some(value);
                }
                None => current = Some(value),
            }
        }
        if let Some(v) = current {
            self.add_child(&mut children, dimension_id, v, group_start, end)?;
        }
        Ok(children)
    }

    fn add_child(
        &self,
        children: &mut BTreeMap<i32, TreeNode>,
        dimension_id: usize,
        value: i32,
        start: usize,
        end: usize,
    ) -> Result<()> {
        let child = TreeNode::new(dimension_id as i32, value, start, end);
        if children.insert(value, child).is_some() {
            bail!(IllegalState(format!(
                "value {} of dimension {} is not contiguous in [{}, {})",
                value, dimension_id, start, end
            )));
        }
        Ok(())
    }

    /// Copies `[start, end)` with `dimension_id` set to star, re-sorts and
    /// condenses the copy, and appends it to the buffer.
    fn construct_star_node(
        &mut self,
        start: usize,
        end: usize,
        dimension_id: usize,
        level: usize,
    ) -> Result<TreeNode> {
        let mut records = Vec::with_capacity(end - start);
        for doc_id in start..end {
            let mut record = self.buffer.record(doc_id)?.into_owned();
            record.dimensions[dimension_id] = STAR_VALUE;
            records.push(record);
        }
        let remaining = &self.split_order.dimensions_split_order[level + 1..];
        records.sort_by(|a, b| compare_dimensions(&a.dimensions, &b.dimensions, remaining));

        let star_start = self.buffer.len();
        let buffer = &mut self.buffer;
        condense(records.into_iter().map(Ok), self.functions, |record| {
            buffer.push(record)
        })?;
        let star_end = self.buffer.len();
        debug!(
            "star node on dimension {}: [{}, {}) condensed into [{}, {})",
            dimension_id, start, end, star_start, star_end
        );
        Ok(TreeNode::new(
            dimension_id as i32,
            STAR_VALUE,
            star_start,
            star_end,
        ))
    }

    /// Post-order: every node gets the id of the record holding its roll-up.
    fn create_aggregated_docs(&mut self, node: &mut TreeNode) -> Result<()> {
        if let Some(children) = node.children.as_mut() {
            for child in children.values_mut() {
                self.create_aggregated_docs(child)?;
            }
        }

        // the star child already aggregates every other child
        if let Some(agg_doc_id) = node.star_child().and_then(|star| star.agg_doc_id) {
            node.agg_doc_id = Some(agg_doc_id);
            return Ok(());
        }

        let metrics = if node.is_leaf() {
            self.merge_documents(node.start_doc_id..node.end_doc_id)?
        } else {
            let mut agg_doc_ids = Vec::new();
            for child in node.children() {
                match child.agg_doc_id {
                    Some(id) => agg_doc_ids.push(id),
                    None => bail!(IllegalState(format!(
                        "child {} of dimension {} has no aggregated document",
                        child.dimension_value, child.dimension_id
                    ))),
                }
            }
            self.merge_documents(agg_doc_ids)?
        };
        let record = Record::aggregated(
            self.num_dimensions,
            node.dimension_id,
            node.dimension_value,
            metrics,
        );
        node.agg_doc_id = Some(self.buffer.len());
        self.buffer.push(record)
    }

    fn merge_documents<I: IntoIterator<Item = usize>>(
        &self,
        doc_ids: I,
    ) -> Result<Vec<AggregatedValue>> {
        let mut merged: Option<Record> = None;
        for doc_id in doc_ids {
            let record = self.buffer.record(doc_id)?;
            if let Some(m) = merged.as_mut() {
                m.merge(&record.metrics, self.functions)?;
                continue;
            }
            merged = Some(record.into_owned());
        }
        match merged {
            Some(record) => Ok(record.metrics),
            None => self
                .functions
                .iter()
                .map(AggregationFunction::default_value)
                .collect(),
        }
    }
}

/// Folds runs of dimension-equal records of a sorted sequence into one
/// record each and hands them to `sink`. Returns the number of records
/// emitted.
fn condense<I, F>(records: I, functions: &[AggregationFunction], mut sink: F) -> Result<usize>
where
    I: IntoIterator<Item = Result<Record>>,
    F: FnMut(Record) -> Result<()>,
{
    let mut emitted = 0;
    let mut current: Option<Record> = None;
    for record in records {
        let record = record?;
        if let Some(c) = current.as_mut() {
            if c.dimension_equal(&record) {
                c.merge(&record.metrics, functions)?;
                continue;
            }
        }
        if let Some(c) = current.replace(record) {
            sink(c)?;
            emitted += 1;
        }
    }
    if let Some(c) = current {
        sink(c)?;
        emitted += 1;
    }
    Ok(emitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::segment::{DataType, Dictionary, MemorySegmentBuilder};
    use crate::core::startree::config::MetricAggFuncPair;
    use crate::core::startree::test_util::{random_segment, sample_config, sample_segment};
    use std::collections::HashMap;

    fn assert_star_adoption(node: &TreeNode) {
        if let Some(star) = node.star_child() {
            assert_eq!(node.agg_doc_id, star.agg_doc_id);
        }
        for child in node.children() {
            assert_star_adoption(child);
        }
    }

    #[test]
    fn test_build_sample_segment() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path()).with_max_num_leaf_records(1);
        let builder = StarTreeBuilder::new(config).unwrap();
        let tree = builder.build(&sample_segment()).unwrap();

        assert_eq!(tree.num_raw_docs, 6);
        assert_eq!(tree.num_nodes, tree.root.subtree_size());
        assert_star_adoption(&tree.root);

        // count__* and sum__salary over every row
        let root_doc = tree.record(tree.root.agg_doc_id.unwrap()).unwrap();
        assert!(root_doc.dimensions.iter().all(|&d| d == STAR_VALUE));
        assert_eq!(root_doc.metrics[0], AggregatedValue::Long(6));
        assert_eq!(root_doc.metrics[1], AggregatedValue::Double(28.0));

        // a synthesized document keeps the node's own split, an adopted one
        // is the star child's
        for child in tree.root.children() {
            if child.star_child().is_some() {
                continue;
            }
            let doc = tree.record(child.agg_doc_id.unwrap()).unwrap();
            let dimension_id = child.dimension_id as usize;
            assert_eq!(doc.dimensions[dimension_id], child.dimension_value);
        }
    }

    #[test]
    fn test_condense() {
        let functions = [AggregationFunction::Count, AggregationFunction::Sum];
        let record = |dims: Vec<i32>, count: i64, sum: f64| {
            Record::new(
                dims,
                vec![AggregatedValue::Long(count), AggregatedValue::Double(sum)],
            )
        };
        let distinct = vec![
            record(vec![0, 0], 1, 1.0),
            record(vec![0, 1], 2, 3.0),
            record(vec![1, STAR_VALUE], 1, 2.0),
        ];
        let mut out = Vec::new();
        let emitted = condense(distinct.clone().into_iter().map(Ok), &functions, |r| {
            out.push(r);
            Ok(())
        })
        .unwrap();
        assert_eq!(emitted, 3);
        assert_eq!(out, distinct);

        let sorted = vec![
            record(vec![0, 0], 1, 1.0),
            record(vec![0, 0], 1, 4.0),
            record(vec![0, 1], 1, 2.0),
            record(vec![0, 1], 3, 2.5),
        ];
        let mut out = Vec::new();
        condense(sorted.into_iter().map(Ok), &functions, |r| {
            out.push(r);
            Ok(())
        })
        .unwrap();
        assert_eq!(
            out,
            vec![record(vec![0, 0], 2, 5.0), record(vec![0, 1], 4, 4.5)]
        );

        let empty: Vec<Result<Record>> = Vec::new();
        assert_eq!(condense(empty, &functions, |_| Ok(())).unwrap(), 0);
    }

    #[test]
    fn test_leaf_threshold_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        // condensed: Subbu has 1 record, Sunita 2 (CA/Kor, CH/Hin), Zackie 2
        let config = sample_config(dir.path())
            .with_split_order(&["Name", "Country", "Language"])
            .with_max_num_leaf_records(2);
        let builder = StarTreeBuilder::new(config).unwrap();
        let tree = builder.build(&sample_segment()).unwrap();

        let names = sample_segment().dictionary("Name").unwrap();
        let id_of = |name: &str| names.index_of(&RawValue::from(name)).unwrap();
        let sunita = tree.root.child(id_of("Sunita")).unwrap();
        let zackie = tree.root.child(id_of("Zackie")).unwrap();
        assert_eq!(sunita.num_docs(), 2);
        assert!(sunita.is_leaf());
        assert_eq!(zackie.num_docs(), 2);
        assert!(zackie.is_leaf());
        // five distinct (Country, Language) pairs under the star node
        let star = tree.root.star_child().unwrap();
        assert_eq!(star.num_docs(), 5);
        assert!(!star.is_leaf());
    }

    #[test]
    fn test_star_node_suppression() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config(dir.path())
            .with_split_order(&["Country", "Name", "Language"])
            .with_dimensions_without_star_node(&["Country"])
            .with_max_num_leaf_records(1);
        let builder = StarTreeBuilder::new(config).unwrap();
        let tree = builder.build(&sample_segment()).unwrap();

        assert!(tree.root.star_child().is_none());
        assert_eq!(tree.root.children().count(), 3);
        assert_eq!(tree.root.child_dimension_id, 1);
        assert_star_adoption(&tree.root);
        // the root has no star child, its roll-up merges the country children
        let root_doc = tree.record(tree.root.agg_doc_id.unwrap()).unwrap();
        assert_eq!(root_doc.metrics[0], AggregatedValue::Long(6));
    }

    #[test]
    fn test_no_star_node_for_single_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = MemorySegmentBuilder::new(&[
            ("Country", DataType::String),
            ("Language", DataType::String),
            ("salary", DataType::Int),
        ]);
        for (language, salary) in &[("Eng", 1), ("Hin", 2), ("Eng", 3)] {
            builder
                .add_row(vec![
                    RawValue::from("CH"),
                    RawValue::from(*language),
                    RawValue::Int(*salary),
                ])
                .unwrap();
        }
        let segment = builder.build().unwrap();
        let config = StarTreeV2Config::new(
            &["Country", "Language"],
            vec![MetricAggFuncPair::new("sum", "salary")],
            dir.path(),
        )
        .with_split_order(&["Country", "Language"])
        .with_max_num_leaf_records(1);
        let tree = StarTreeBuilder::new(config).unwrap().build(&segment).unwrap();

        assert!(tree.root.star_child().is_none());
        let ch = tree.root.child(0).unwrap();
        assert!(ch.star_child().is_some());
        assert_ne!(tree.root.agg_doc_id, ch.agg_doc_id);
        let root_doc = tree.record(tree.root.agg_doc_id.unwrap()).unwrap();
        assert_eq!(root_doc.metrics[0], AggregatedValue::Double(6.0));
    }

    #[test]
    fn test_buffer_strategies_agree() {
        let segment = random_segment(2_000, 11);
        let heap_dir = tempfile::tempdir().unwrap();
        let off_heap_dir = tempfile::tempdir().unwrap();

        let heap_config = sample_config(heap_dir.path()).with_max_num_leaf_records(10);
        let heap = StarTreeBuilder::new(heap_config)
            .unwrap()
            .build(&segment)
            .unwrap();
        let off_heap = StarTreeBuilder::new(
            sample_config(off_heap_dir.path())
                .with_max_num_leaf_records(10)
                .with_buffer(BufferStrategy::OffHeap),
        )
        .unwrap()
        .build(&segment)
        .unwrap();

        assert_eq!(heap.root, off_heap.root);
        assert_eq!(heap.num_nodes, off_heap.num_nodes);
        assert_eq!(heap.num_docs(), off_heap.num_docs());
        for doc_id in 0..heap.num_docs() {
            assert_eq!(heap.record(doc_id).unwrap(), off_heap.record(doc_id).unwrap());
        }
    }

    #[test]
    fn test_serialize_assigns_ids() {
        let dir = tempfile::tempdir().unwrap();
        let segment = sample_segment();
        let mut store: HashMap<String, String> = HashMap::new();

        let builder = StarTreeBuilder::new(sample_config(dir.path())).unwrap();
        let first = builder.run(&segment, &mut store).unwrap();
        assert_eq!(first.star_tree_id, 0);
        let second = builder.run(&segment, &mut store).unwrap();
        assert_eq!(second.star_tree_id, 1);
        assert_eq!(store.get(STAR_TREE_V2_COUNT).map(String::as_str), Some("2"));
        assert_eq!(StarTreeV2Metadata::read_all(&store).unwrap(), vec![first, second]);

        let directory = FSDirectory::new(dir.path()).unwrap();
        assert!(directory.file_exists(crate::core::startree::STAR_TREE_V2_COLUMN_FILE));
        assert!(directory.file_exists(crate::core::startree::STAR_TREE_V2_INDEX_MAP_FILE));
        assert!(!directory.file_exists(&star_tree_name(0)));
        assert!(!directory.file_exists(&dimension_index_file_name(1, "Name")));
    }

    #[test]
    fn test_writers_with_separate_stores() {
        use crate::core::startree::loader::{IndexMap, StarTreeV2Loader};
        use std::sync::Arc;
        use std::thread;

        let dir = tempfile::tempdir().unwrap();
        let out_dir = Arc::new(dir.path().to_path_buf());
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let out_dir = Arc::clone(&out_dir);
                thread::spawn(move || {
                    let mut store: HashMap<String, String> = HashMap::new();
                    let metadata = StarTreeBuilder::new(sample_config(out_dir.as_path()))
                        .unwrap()
                        .run(&sample_segment(), &mut store)
                        .unwrap();
                    (metadata.star_tree_id, store)
                })
            })
            .collect();
        let mut ids = Vec::new();
        let mut merged: HashMap<String, String> = HashMap::new();
        for handle in handles {
            let (id, store) = handle.join().unwrap();
            ids.push(id);
            for (key, value) in store {
                if key == STAR_TREE_V2_COUNT && merged.contains_key(&key) {
                    let current: usize = merged[&key].parse().unwrap();
                    let value = current.max(value.parse().unwrap());
                    merged.insert(key, value.to_string());
                } else {
                    merged.insert(key, value);
                }
            }
        }
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);

        let directory = FSDirectory::new(dir.path()).unwrap();
        // 3 dimensions, 2 aggregates and the tree, per star-tree
        assert_eq!(IndexMap::read_from(&directory).unwrap().len(), 18);
        let trees = StarTreeV2Loader::new(&directory).load(&merged).unwrap();
        assert_eq!(trees.len(), 3);
        for tree in &trees {
            assert_eq!(tree.metadata().num_docs, trees[0].metadata().num_docs);
        }
    }

    #[test]
    fn test_unknown_column() {
        let dir = tempfile::tempdir().unwrap();
        let config = StarTreeV2Config::new(
            &["Name", "Planet"],
            vec![MetricAggFuncPair::new("count", "*")],
            dir.path(),
        );
        let builder = StarTreeBuilder::new(config).unwrap();
        assert!(builder.build(&sample_segment()).is_err());

        let config = StarTreeV2Config::new(
            &["Name", "Country"],
            vec![MetricAggFuncPair::new("avg", "salary")],
            dir.path(),
        );
        assert!(StarTreeBuilder::new(config).is_err());
    }
}
