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

extern crate startree;

use std::env;
use std::io::{self, Write};
use std::process;

use startree::core::segment::PropertiesMetadataStore;
use startree::core::startree::StarTreeV2Loader;
use startree::core::store::MmapDirectory;
use startree::error::Result;

/// Prints the metadata and the node layout of every star-tree in a segment.
fn dump(segment_dir: &str) -> Result<()> {
    let directory = MmapDirectory::new(segment_dir)?;
    let store = PropertiesMetadataStore::open_in_dir(segment_dir)?;
    let trees = StarTreeV2Loader::new(&directory).load(&store)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if trees.is_empty() {
        writeln!(out, "no star-tree in {}", segment_dir)?;
        return Ok(());
    }
    for tree in &trees {
        let metadata = tree.metadata();
        writeln!(
            out,
            "star-tree {}: {} docs, {} nodes",
            metadata.star_tree_id,
            metadata.num_docs,
            tree.star_tree().num_nodes()
        )?;
        writeln!(out, "  split order: {}", metadata.dimensions_split_order.join(", "))?;
        writeln!(
            out,
            "  without star node: {}",
            metadata.skip_star_node_creation_for_dimensions.join(", ")
        )?;
        let pairs: Vec<String> = metadata
            .function_column_pairs
            .iter()
            .map(|p| p.to_column_name())
            .collect();
        writeln!(out, "  metrics: {}", pairs.join(", "))?;
        writeln!(out, "  max leaf records: {}", metadata.max_num_leaf_records)?;
        tree.dump(&mut out)?;
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("usage: {} <segment-dir>", args[0]);
        process::exit(2);
    }
    if let Err(e) = dump(&args[1]) {
        eprintln!("{}", e);
        process::exit(1);
    }
}
