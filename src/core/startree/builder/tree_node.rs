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

use std::collections::BTreeMap;

use crate::core::startree::STAR_VALUE;

/// A node of the tree under construction.
///
/// `start_doc_id..end_doc_id` is the node's range in the record buffer,
/// `children` is keyed by dimension value, so the star child (`STAR_VALUE`)
/// always comes first.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeNode {
    /// Dimension the parent split on, `STAR_VALUE` for the root.
    pub dimension_id: i32,
    /// Value of `dimension_id` leading here, `STAR_VALUE` for star nodes and the root.
    pub dimension_value: i32,
    pub start_doc_id: usize,
    pub end_doc_id: usize,
    /// Dimension the children split on, `STAR_VALUE` for leaves.
    pub child_dimension_id: i32,
    pub children: Option<BTreeMap<i32, TreeNode>>,
    pub agg_doc_id: Option<usize>,
}

impl TreeNode {
    pub fn root(num_docs: usize) -> TreeNode {
        TreeNode::new(STAR_VALUE, STAR_VALUE, 0, num_docs)
    }

    pub fn new(
        dimension_id: i32,
        dimension_value: i32,
        start_doc_id: usize,
        end_doc_id: usize,
    ) -> TreeNode {
        TreeNode {
            dimension_id,
            dimension_value,
            start_doc_id,
            end_doc_id,
            child_dimension_id: STAR_VALUE,
            children: None,
            agg_doc_id: None,
        }
    }

    pub fn num_docs(&self) -> usize {
        self.end_doc_id - self.start_doc_id
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn is_star_node(&self) -> bool {
        self.dimension_id != STAR_VALUE && self.dimension_value == STAR_VALUE
    }

    pub fn star_child(&self) -> Option<&TreeNode> {
        self.children.as_ref().and_then(|c| c.get(&STAR_VALUE))
    }

    pub fn child(&self, dimension_value: i32) -> Option<&TreeNode> {
        self.children.as_ref().and_then(|c| c.get(&dimension_value))
    }

    /// Children in dimension value order, empty for leaves.
    pub fn children(&self) -> impl Iterator<Item = &TreeNode> {
        self.children.iter().flat_map(|c| c.values())
    }

    /// Number of nodes in this subtree, this node included.
    pub fn subtree_size(&self) -> usize {
        1 + self.children().map(TreeNode::subtree_size).sum::<usize>()
    }
}
