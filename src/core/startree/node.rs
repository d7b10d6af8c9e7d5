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

//! Serialized star-tree.
//!
//! Header: magic (long), version (int), header size (int), dimension count
//! (int), then per dimension its id (int), name length (int) and UTF-8 name,
//! then the node count (int). Nodes follow in breadth-first order, seven ints
//! each:
//!
//! | field | meaning |
//! |-------|---------|
//! | dimension id | dimension the parent split on, `-1` for the root |
//! | dimension value | dictionary id, `-1` for star nodes and the root |
//! | start doc id, end doc id | record range of the node |
//! | aggregated doc id | record holding the node's roll-up |
//! | first child index, last child index | inclusive range in the node array, `-1` for leaves |
//!
//! Children of a node are contiguous and sorted by dimension value, so the
//! star child is always the first one.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::core::startree::builder::TreeNode;
use crate::core::startree::{INVALID_INDEX, STAR_VALUE};
use crate::core::store::io::{DataInput, DataOutput, IndexInput, RandomAccessInput};
use crate::error::ErrorKind::{CorruptIndex, IllegalState};
use crate::error::Result;

pub const MAGIC_MARKER: i64 = 0xBADD_A55B_00DA_D00E_u64 as i64;
pub const VERSION: i32 = 1;
pub const NODE_SIZE_IN_BYTES: usize = 7 * 4;

pub fn header_size_in_bytes(dimension_names: &[String]) -> usize {
    let names: usize = dimension_names.iter().map(|n| 8 + n.len()).sum();
    8 + 4 + 4 + 4 + names + 4
}

/// Writes the header and all nodes of the tree rooted at `root`.
///
/// Returns the number of bytes written, always
/// `header_size_in_bytes(dimension_names) + num_nodes * NODE_SIZE_IN_BYTES`.
pub fn write_tree<O: DataOutput + ?Sized>(
    output: &mut O,
    dimension_names: &[String],
    root: &TreeNode,
    num_nodes: usize,
) -> Result<usize> {
    let header_size = header_size_in_bytes(dimension_names);
    output.write_long(MAGIC_MARKER)?;
    output.write_int(VERSION)?;
    output.write_int(header_size as i32)?;
    output.write_int(dimension_names.len() as i32)?;
    for (id, name) in dimension_names.iter().enumerate() {
        output.write_int(id as i32)?;
        output.write_int(name.len() as i32)?;
        output.write_bytes(name.as_bytes(), 0, name.len())?;
    }
    output.write_int(num_nodes as i32)?;

    let mut written = 0;
    let mut next_child_index = 1;
    let mut queue = VecDeque::new();
    queue.push_back(root);
    while let Some(node) = queue.pop_front() {
        let (first_child, last_child) = match node.children {
            Some(ref children) if !children.is_empty() => {
                let first = next_child_index;
                next_child_index += children.len();
                queue.extend(children.values());
                (first as i32, (next_child_index - 1) as i32)
            }
            _ => (INVALID_INDEX, INVALID_INDEX),
        };
        let agg_doc_id = match node.agg_doc_id {
            Some(id) => id,
            None => bail!(IllegalState(format!(
                "node {}={} has no aggregated document",
                node.dimension_id, node.dimension_value
            ))),
        };
        output.write_int(node.dimension_id)?;
        output.write_int(node.dimension_value)?;
        output.write_int(node.start_doc_id as i32)?;
        output.write_int(node.end_doc_id as i32)?;
        output.write_int(agg_doc_id as i32)?;
        output.write_int(first_child)?;
        output.write_int(last_child)?;
        written += 1;
    }
    if written != num_nodes {
        bail!(IllegalState(format!(
            "tree has {} nodes but {} were counted",
            written, num_nodes
        )));
    }
    Ok(header_size + num_nodes * NODE_SIZE_IN_BYTES)
}

/// One decoded node of a serialized tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StarTreeNode {
    pub index: usize,
    pub dimension_id: i32,
    pub dimension_value: i32,
    pub start_doc_id: i32,
    pub end_doc_id: i32,
    pub agg_doc_id: i32,
    pub first_child_index: i32,
    pub last_child_index: i32,
}

impl StarTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.first_child_index == INVALID_INDEX
    }

    pub fn is_star_node(&self) -> bool {
        self.dimension_id != STAR_VALUE && self.dimension_value == STAR_VALUE
    }

    pub fn num_children(&self) -> usize {
        if self.is_leaf() {
            0
        } else {
            (self.last_child_index - self.first_child_index + 1) as usize
        }
    }
}

/// A serialized tree read in place, nodes are decoded on demand.
pub struct OffHeapStarTree {
    input: Arc<dyn RandomAccessInput>,
    dimension_names: Vec<String>,
    num_nodes: usize,
    header_size: usize,
}

impl OffHeapStarTree {
    /// `input` spans exactly the tree.
    pub fn open(input: &dyn IndexInput) -> Result<OffHeapStarTree> {
        let mut header = input.clone()?;
        header.seek(0)?;
        let magic = header.read_long()?;
        if magic != MAGIC_MARKER {
            bail!(CorruptIndex(format!(
                "star-tree magic mismatch in {}: 0x{:X}",
                input.name(),
                magic
            )));
        }
        let version = header.read_int()?;
        if version != VERSION {
            bail!(CorruptIndex(format!(
                "unsupported star-tree version {} in {}",
                version,
                input.name()
            )));
        }
        let header_size = header.read_int()?;
        let num_dimensions = header.read_int()?;
        if header_size < 0 || num_dimensions < 0 || header_size as u64 > input.len() {
            bail!(CorruptIndex(format!(
                "bad star-tree header in {}: size {}, {} dimensions",
                input.name(),
                header_size,
                num_dimensions
            )));
        }
        let mut dimension_names = Vec::with_capacity(num_dimensions as usize);
        for i in 0..num_dimensions {
            let id = header.read_int()?;
            let len = header.read_int()?;
            if id != i || len < 0 || len > header_size {
                bail!(CorruptIndex(format!(
                    "bad dimension entry {} in {}",
                    i,
                    input.name()
                )));
            }
            let mut name = vec![0u8; len as usize];
            header.read_bytes(&mut name, 0, len as usize)?;
            dimension_names.push(String::from_utf8(name)?);
        }
        let num_nodes = header.read_int()?;
        let header_size = header_size as usize;
        if num_nodes < 1 || header.file_pointer() as usize != header_size {
            bail!(CorruptIndex(format!(
                "bad star-tree header in {}: {} nodes, header ends at {} not {}",
                input.name(),
                num_nodes,
                header.file_pointer(),
                header_size
            )));
        }
        let num_nodes = num_nodes as usize;
        let expected = (header_size + num_nodes * NODE_SIZE_IN_BYTES) as u64;
        if input.len() != expected {
            bail!(CorruptIndex(format!(
                "star-tree {} should be {} bytes, got {}",
                input.name(),
                expected,
                input.len()
            )));
        }
        let input: Arc<dyn RandomAccessInput> =
            Arc::from(input.random_access_slice(0, expected as i64)?);
        Ok(OffHeapStarTree {
            input,
            dimension_names,
            num_nodes,
            header_size,
        })
    }

    /// Dimension names by dimension id.
    pub fn dimension_names(&self) -> &[String] {
        &self.dimension_names
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn root(&self) -> Result<StarTreeNode> {
        self.node(0)
    }

    fn node_offset(&self, index: usize) -> u64 {
        (self.header_size + index * NODE_SIZE_IN_BYTES) as u64
    }

    pub fn node(&self, index: usize) -> Result<StarTreeNode> {
        if index >= self.num_nodes {
            bail!(CorruptIndex(format!(
                "node index {} out of [0, {})",
                index, self.num_nodes
            )));
        }
        let offset = self.node_offset(index);
        let field = |i: u64| self.input.read_int(offset + i * 4);
        Ok(StarTreeNode {
            index,
            dimension_id: field(0)?,
            dimension_value: field(1)?,
            start_doc_id: field(2)?,
            end_doc_id: field(3)?,
            agg_doc_id: field(4)?,
            first_child_index: field(5)?,
            last_child_index: field(6)?,
        })
    }

    pub fn children(&self, node: &StarTreeNode) -> Result<Vec<StarTreeNode>> {
        if node.is_leaf() {
            return Ok(Vec::new());
        }
        let mut children = Vec::with_capacity(node.num_children());
        for index in node.first_child_index..=node.last_child_index {
            children.push(self.node(index as usize)?);
        }
        Ok(children)
    }

    /// Binary search over the children's dimension values.
    pub fn child_for_dimension_value(
        &self,
        node: &StarTreeNode,
        dimension_value: i32,
    ) -> Result<Option<StarTreeNode>> {
        if node.is_leaf() {
            return Ok(None);
        }
        let (mut low, mut high) = (node.first_child_index, node.last_child_index);
        while low <= high {
            let mid = low + (high - low) / 2;
            let value = self.input.read_int(self.node_offset(mid as usize) + 4)?;
            if value == dimension_value {
                return self.node(mid as usize).map(Some);
            } else if value < dimension_value {
                low = mid + 1;
            } else {
                high = mid - 1;
            }
        }
        Ok(None)
    }

    pub fn star_child(&self, node: &StarTreeNode) -> Result<Option<StarTreeNode>> {
        self.child_for_dimension_value(node, STAR_VALUE)
    }

    /// Dimension the children of `node` split on, `None` for leaves.
    pub fn child_dimension_id(&self, node: &StarTreeNode) -> Result<Option<usize>> {
        if node.is_leaf() {
            return Ok(None);
        }
        let child = self.node(node.first_child_index as usize)?;
        Ok(Some(child.dimension_id as usize))
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;
    use crate::core::store::{Directory, MmapDirectory, IO_CONTEXT_DEFAULT, IO_CONTEXT_READ};
    use std::collections::BTreeMap;
    use std::io::Write;

    fn sample_tree() -> TreeNode {
        let mut root = TreeNode::root(6);
        root.agg_doc_id = Some(20);
        root.child_dimension_id = 1;
        let mut children = BTreeMap::new();
        for (value, start, end, agg) in &[(STAR_VALUE, 6, 9, 13), (0, 0, 2, 10), (4, 2, 6, 12)] {
            let mut child = TreeNode::new(1, *value, *start, *end);
            child.agg_doc_id = Some(*agg);
            children.insert(*value, child);
        }
        let mut grand_children = BTreeMap::new();
        let mut grand_child = TreeNode::new(0, 3, 2, 6);
        grand_child.agg_doc_id = Some(11);
        grand_children.insert(3, grand_child);
        children.get_mut(&4).unwrap().children = Some(grand_children);
        root.children = Some(children);
        root
    }

    #[test]
    fn test_write_and_traverse() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = MmapDirectory::new(temp_dir.path()).unwrap();
        let names = vec!["Country".to_string(), "Name".to_string()];
        let root = sample_tree();
        {
            let mut out = dir.create_output("startree_0", &IO_CONTEXT_DEFAULT).unwrap();
            let size = write_tree(&mut out, &names, &root, 5).unwrap();
            out.flush().unwrap();
            assert_eq!(size, header_size_in_bytes(&names) + 5 * NODE_SIZE_IN_BYTES);
        }
        assert_eq!(
            dir.file_length("startree_0").unwrap() as usize,
            header_size_in_bytes(&names) + 5 * NODE_SIZE_IN_BYTES
        );

        let input = dir.open_input("startree_0", &IO_CONTEXT_READ).unwrap();
        let tree = OffHeapStarTree::open(input.as_ref()).unwrap();
        assert_eq!(tree.dimension_names(), &names[..]);
        assert_eq!(tree.num_nodes(), 5);

        let root = tree.root().unwrap();
        assert_eq!(root.dimension_id, STAR_VALUE);
        assert_eq!(root.agg_doc_id, 20);
        assert_eq!(root.num_children(), 3);
        assert_eq!(tree.child_dimension_id(&root).unwrap(), Some(1));

        let children = tree.children(&root).unwrap();
        let values: Vec<i32> = children.iter().map(|c| c.dimension_value).collect();
        assert_eq!(values, vec![STAR_VALUE, 0, 4]);
        assert!(children[0].is_star_node());
        assert_eq!(tree.star_child(&root).unwrap(), Some(children[0]));

        let four = tree.child_for_dimension_value(&root, 4).unwrap().unwrap();
        assert_eq!((four.start_doc_id, four.end_doc_id, four.agg_doc_id), (2, 6, 12));
        assert!(tree.child_for_dimension_value(&root, 2).unwrap().is_none());
        assert!(tree.child_for_dimension_value(&root, 9).unwrap().is_none());

        let grand_child = tree.child_for_dimension_value(&four, 3).unwrap().unwrap();
        assert_eq!(grand_child.dimension_id, 0);
        assert!(grand_child.is_leaf());
        assert!(tree.children(&grand_child).unwrap().is_empty());
        assert!(tree.node(5).is_err());
    }

    #[test]
    fn test_rejects_bad_trees() {
        let names = vec!["d".to_string()];
        let root = sample_tree();
        let mut bytes: Vec<u8> = Vec::new();
        assert!(write_tree(&mut bytes, &names, &root, 4).is_err());

        let mut unaggregated = TreeNode::root(1);
        unaggregated.agg_doc_id = None;
        assert!(write_tree(&mut Vec::<u8>::new(), &names, &unaggregated, 1).is_err());

        let temp_dir = tempfile::tempdir().unwrap();
        let dir = MmapDirectory::new(temp_dir.path()).unwrap();
        {
            let mut out = dir.create_output("t", &IO_CONTEXT_DEFAULT).unwrap();
            write_tree(&mut out, &names, &root, 5).unwrap();
            out.write_int(0).unwrap();
            out.flush().unwrap();
        }
        let input = dir.open_input("t", &IO_CONTEXT_READ).unwrap();
        assert!(OffHeapStarTree::open(input.as_ref()).is_err());
        let exact = input
            .slice("exact", 0, input.len() as i64 - 4)
            .unwrap();
        assert!(OffHeapStarTree::open(exact.as_ref()).is_ok());
    }
}
