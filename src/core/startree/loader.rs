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

//! Loading consolidated star-trees back from a segment directory.

use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::core::segment::{MetadataStore, Segment};
use crate::core::startree::data_source::{DimensionDataSource, MetricDataSource};
use crate::core::startree::index::{DimensionIndexReader, RawIndexReader};
use crate::core::startree::metadata::StarTreeV2Metadata;
use crate::core::startree::node::{OffHeapStarTree, StarTreeNode};
use crate::core::startree::{
    STAR_TREE, STAR_TREE_V2_COLUMN_FILE, STAR_TREE_V2_INDEX_MAP_FILE, STAR_VALUE,
    TREE_INDEX_MAP_NAME,
};
use crate::core::store::io::{DataInput, IndexInput};
use crate::core::store::{Directory, IO_CONTEXT_READ, IO_CONTEXT_READONCE};
use crate::error::ErrorKind::{CorruptIndex, MissingIndexFile};
use crate::error::Result;

const START_SUFFIX: &str = "start";
const SIZE_SUFFIX: &str = "size";

/// Location of one consolidated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMapEntry {
    pub star_tree_id: usize,
    /// Dimension, aggregate column name or `root` for the tree.
    pub name: String,
    pub start: u64,
    pub size: u64,
}

impl IndexMapEntry {
    fn key(&self, suffix: &str) -> String {
        format!("{}{}.{}.{}", STAR_TREE, self.star_tree_id, self.name, suffix)
    }

    /// The `.start` and `.size` lines of this entry.
    pub fn to_lines(&self) -> String {
        format!(
            "{}:{}\n{}:{}\n",
            self.key(START_SUFFIX),
            self.start,
            self.key(SIZE_SUFFIX),
            self.size
        )
    }
}

/// Parsed `startreev2.index.map`.
#[derive(Debug, Default)]
pub struct IndexMap {
    entries: HashMap<(usize, String), (u64, u64)>,
}

impl IndexMap {
    /// Parses `startree<N>.<name>.<start|size>:<value>` lines, a later line
    /// wins over an earlier one for the same key.
    pub fn parse(text: &str) -> Result<IndexMap> {
        let mut partial: HashMap<(usize, String), (Option<u64>, Option<u64>)> = HashMap::new();
        for (line_number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let malformed = || {
                CorruptIndex(format!(
                    "malformed index map line {}: '{}'",
                    line_number + 1,
                    line
                ))
            };
            let colon = line.rfind(':').ok_or_else(malformed)?;
            let (key, value) = (&line[..colon], &line[colon + 1..]);
            let value: u64 = value.trim().parse().map_err(|_| malformed())?;

            let key = key.trim();
            if !key.starts_with(STAR_TREE) {
                return Err(malformed().into());
            }
            let key = &key[STAR_TREE.len()..];
            let first_dot = key.find('.').ok_or_else(malformed)?;
            let last_dot = key.rfind('.').ok_or_else(malformed)?;
            if last_dot <= first_dot + 1 {
                return Err(malformed().into());
            }
            let star_tree_id: usize = key[..first_dot].parse().map_err(|_| malformed())?;
            let name = key[first_dot + 1..last_dot].to_string();
            let slot = partial.entry((star_tree_id, name)).or_default();
            match &key[last_dot + 1..] {
                START_SUFFIX => slot.0 = Some(value),
                SIZE_SUFFIX => slot.1 = Some(value),
                _ => return Err(malformed().into()),
            }
        }

        let mut entries = HashMap::with_capacity(partial.len());
        for ((star_tree_id, name), slot) in partial {
            match slot {
                (Some(start), Some(size)) => {
                    entries.insert((star_tree_id, name), (start, size));
                }
                _ => bail!(CorruptIndex(format!(
                    "index map entry {}{}.{} lacks its start or size",
                    STAR_TREE, star_tree_id, name
                ))),
            }
        }
        Ok(IndexMap { entries })
    }

    pub fn read_from<D: Directory + ?Sized>(directory: &D) -> Result<IndexMap> {
        if !directory.file_exists(STAR_TREE_V2_INDEX_MAP_FILE) {
            bail!(MissingIndexFile(format!(
                "{} in {}",
                STAR_TREE_V2_INDEX_MAP_FILE, directory
            )));
        }
        let mut input = directory.open_input(STAR_TREE_V2_INDEX_MAP_FILE, &IO_CONTEXT_READONCE)?;
        let len = input.len() as usize;
        let mut bytes = vec![0u8; len];
        input.read_bytes(&mut bytes, 0, len)?;
        IndexMap::parse(&String::from_utf8(bytes)?)
    }

    /// `(start, size)` of `name` in tree `star_tree_id`.
    pub fn get(&self, star_tree_id: usize, name: &str) -> Option<(u64, u64)> {
        self.entries
            .get(&(star_tree_id, name.to_string()))
            .cloned()
    }

    /// One past the highest star-tree id with an entry, 0 for an empty map.
    pub fn next_star_tree_id(&self) -> usize {
        self.entries
            .keys()
            .map(|&(star_tree_id, _)| star_tree_id + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One loaded star-tree: the tree itself plus a data source per dimension
/// and per aggregation pair.
pub struct StarTreeV2 {
    metadata: StarTreeV2Metadata,
    star_tree: OffHeapStarTree,
    dimensions: Vec<DimensionDataSource>,
    metrics: Vec<MetricDataSource>,
}

impl StarTreeV2 {
    pub fn metadata(&self) -> &StarTreeV2Metadata {
        &self.metadata
    }

    pub fn star_tree(&self) -> &OffHeapStarTree {
        &self.star_tree
    }

    /// Dimension names by dimension id.
    pub fn dimension_names(&self) -> &[String] {
        self.star_tree.dimension_names()
    }

    pub fn dimension_data_source(&self, name: &str) -> Option<&DimensionDataSource> {
        self.dimensions.iter().find(|d| d.name() == name)
    }

    pub fn dimension_data_source_by_id(&self, dimension_id: usize) -> Option<&DimensionDataSource> {
        self.dimensions.get(dimension_id)
    }

    /// Looked up by `<functionType>__<column>`.
    pub fn metric_data_source(&self, column_name: &str) -> Option<&MetricDataSource> {
        self.metrics.iter().find(|m| m.column_name() == column_name)
    }

    pub fn metric_data_sources(&self) -> &[MetricDataSource] {
        &self.metrics
    }

    /// Writes one line per node, children indented by two more spaces.
    pub fn dump<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        let root = self.star_tree.root()?;
        self.dump_node(out, &root, 0)
    }

    fn dump_node<W: Write + ?Sized>(
        &self,
        out: &mut W,
        node: &StarTreeNode,
        depth: usize,
    ) -> Result<()> {
        let dimension = if node.dimension_id == STAR_VALUE {
            "*"
        } else {
            self.dimension_names()
                .get(node.dimension_id as usize)
                .map(String::as_str)
                .unwrap_or("?")
        };
        let value = if node.dimension_value == STAR_VALUE {
            "*".to_string()
        } else {
            node.dimension_value.to_string()
        };
        writeln!(
            out,
            "{:indent$}dimension={}({}) value={} docs=[{},{}) agg={} children={}",
            "",
            dimension,
            node.dimension_id,
            value,
            node.start_doc_id,
            node.end_doc_id,
            node.agg_doc_id,
            node.num_children(),
            indent = depth * 2
        )?;
        for child in self.star_tree.children(node)? {
            self.dump_node(out, &child, depth + 1)?;
        }
        Ok(())
    }
}

/// Opens every star-tree a segment's metadata lists.
pub struct StarTreeV2Loader<'a, D: Directory + ?Sized> {
    directory: &'a D,
    segment: Option<&'a dyn Segment>,
}

impl<'a, D: Directory + ?Sized> StarTreeV2Loader<'a, D> {
    pub fn new(directory: &'a D) -> StarTreeV2Loader<'a, D> {
        StarTreeV2Loader {
            directory,
            segment: None,
        }
    }

    /// Dimension data sources then resolve values through `segment`'s dictionaries.
    pub fn with_segment(mut self, segment: &'a dyn Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Star-trees by id, empty when the segment has none.
    pub fn load<M: MetadataStore + ?Sized>(&self, store: &M) -> Result<Vec<StarTreeV2>> {
        let all_metadata = StarTreeV2Metadata::read_all(store)?;
        if all_metadata.is_empty() {
            return Ok(Vec::new());
        }
        let index_map = IndexMap::read_from(self.directory)?;
        if !self.directory.file_exists(STAR_TREE_V2_COLUMN_FILE) {
            bail!(MissingIndexFile(format!(
                "{} in {}",
                STAR_TREE_V2_COLUMN_FILE, self.directory
            )));
        }
        let column_file = self
            .directory
            .open_input(STAR_TREE_V2_COLUMN_FILE, &IO_CONTEXT_READ)?;

        let mut star_trees = Vec::with_capacity(all_metadata.len());
        for metadata in all_metadata {
            let star_tree = self.load_one(column_file.as_ref(), &index_map, metadata)?;
            info!(
                "loaded star-tree {} with {} nodes and {} records",
                star_tree.metadata.star_tree_id,
                star_tree.star_tree.num_nodes(),
                star_tree.metadata.num_docs
            );
            star_trees.push(star_tree);
        }
        Ok(star_trees)
    }

    fn slice(
        column_file: &dyn IndexInput,
        index_map: &IndexMap,
        star_tree_id: usize,
        name: &str,
    ) -> Result<Box<dyn IndexInput>> {
        let (start, size) = match index_map.get(star_tree_id, name) {
            Some(entry) => entry,
            None => bail!(CorruptIndex(format!(
                "star-tree {} has no {} in the index map",
                star_tree_id, name
            ))),
        };
        match start.checked_add(size) {
            Some(end) if end <= column_file.len() => {}
            _ => bail!(CorruptIndex(format!(
                "{} of star-tree {} at {} (+{} bytes) is past the end of {}",
                name, star_tree_id, start, size, STAR_TREE_V2_COLUMN_FILE
            ))),
        }
        let description = format!("{}{}.{}", STAR_TREE, star_tree_id, name);
        column_file.slice(&description, start as i64, size as i64)
    }

    fn load_one(
        &self,
        column_file: &dyn IndexInput,
        index_map: &IndexMap,
        metadata: StarTreeV2Metadata,
    ) -> Result<StarTreeV2> {
        let id = metadata.star_tree_id;
        let tree_input = Self::slice(column_file, index_map, id, TREE_INDEX_MAP_NAME)?;
        let star_tree = OffHeapStarTree::open(tree_input.as_ref())?;

        let names: HashSet<&String> = star_tree.dimension_names().iter().collect();
        let split_order: HashSet<&String> = metadata.dimensions_split_order.iter().collect();
        if names != split_order {
            bail!(CorruptIndex(format!(
                "star-tree {} dimensions {:?} do not match split order {:?}",
                id,
                star_tree.dimension_names(),
                metadata.dimensions_split_order
            )));
        }

        let mut dimensions = Vec::with_capacity(star_tree.dimension_names().len());
        for (dimension_id, name) in star_tree.dimension_names().iter().enumerate() {
            let input = Self::slice(column_file, index_map, id, name)?;
            let reader = DimensionIndexReader::open(input.as_ref())?;
            check_num_docs(&metadata, name, reader.num_docs())?;
            let dictionary = match self.segment {
                Some(segment) => Some(segment.dictionary(name)?),
                None => None,
            };
            dimensions.push(DimensionDataSource::new(
                name,
                dimension_id,
                reader,
                dictionary,
            ));
        }

        let mut metrics = Vec::with_capacity(metadata.function_column_pairs.len());
        for pair in &metadata.function_column_pairs {
            let function = pair.function()?;
            let column = pair.to_column_name();
            let input = Self::slice(column_file, index_map, id, &column)?;
            let reader = RawIndexReader::open(input.as_ref())?;
            check_num_docs(&metadata, &column, reader.num_docs())?;
            if reader.data_type() != function.result_data_type() {
                bail!(CorruptIndex(format!(
                    "{} of star-tree {} stores {}, expected {}",
                    column,
                    id,
                    reader.data_type(),
                    function.result_data_type()
                )));
            }
            metrics.push(MetricDataSource::new(pair.clone(), function, reader));
        }

        Ok(StarTreeV2 {
            metadata,
            star_tree,
            dimensions,
            metrics,
        })
    }
}

fn check_num_docs(metadata: &StarTreeV2Metadata, name: &str, num_docs: usize) -> Result<()> {
    if num_docs != metadata.num_docs {
        bail!(CorruptIndex(format!(
            "{} of star-tree {} has {} docs, metadata says {}",
            name, metadata.star_tree_id, num_docs, metadata.num_docs
        )));
    }
    Ok(())
}
