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
use std::io::Write;

use crate::core::codec::codec_util;
use crate::core::startree::loader::{IndexMap, IndexMapEntry};
use crate::core::startree::metadata::StarTreeV2Metadata;
use crate::core::startree::{
    dimension_index_file_name, raw_index_file_name, star_tree_name, STAR_TREE_V2_COLUMN_FILE,
    STAR_TREE_V2_INDEX_MAP_FILE, STAR_TREE_V2_LOCK_FILE, TREE_INDEX_MAP_NAME,
};
use crate::core::store::io::{DataOutput, IndexInput, IndexOutput};
use crate::core::store::{Directory, IO_CONTEXT_DEFAULT, IO_CONTEXT_READONCE};
use crate::error::ErrorKind::MissingIndexFile;
use crate::error::Result;

/// A file written by the builder and the name it gets in the index map.
struct Source {
    file_name: String,
    name: String,
    has_footer: bool,
}

/// Packs the per-tree files of a build into the segment's consolidated
/// star-tree file and records where each one landed in the index map.
///
/// Consolidation holds `startreev2.lock`, so trees of one segment may be
/// converted from several threads or processes.
pub struct StarTreeIndexesConverter<'a, D: Directory + ?Sized> {
    directory: &'a D,
}

impl<'a, D: Directory + ?Sized> StarTreeIndexesConverter<'a, D> {
    pub fn new(directory: &'a D) -> StarTreeIndexesConverter<'a, D> {
        StarTreeIndexesConverter { directory }
    }

    /// Appends every file of the tree `metadata` describes, then deletes the
    /// sources. Nothing is appended when a source is missing or corrupt.
    pub fn convert(&self, metadata: &StarTreeV2Metadata) -> Result<Vec<IndexMapEntry>> {
        let lock = self.directory.obtain_lock(STAR_TREE_V2_LOCK_FILE)?;
        let result = self.consolidate(metadata);
        let closed = lock.close();
        let entries = result?;
        closed?;
        Ok(entries)
    }

    /// The id a new tree of this directory gets: one past the highest id
    /// already consolidated. Only stable while `startreev2.lock` is held.
    pub fn next_star_tree_id(&self) -> Result<usize> {
        if self.directory.file_exists(STAR_TREE_V2_INDEX_MAP_FILE) {
            Ok(IndexMap::read_from(self.directory)?.next_star_tree_id())
        } else {
            Ok(0)
        }
    }

    fn sources(metadata: &StarTreeV2Metadata) -> Vec<Source> {
        let id = metadata.star_tree_id;
        let mut sources = Vec::new();
        for dimension in &metadata.dimensions_split_order {
            sources.push(Source {
                file_name: dimension_index_file_name(id, dimension),
                name: dimension.clone(),
                has_footer: true,
            });
        }
        for pair in &metadata.function_column_pairs {
            let column = pair.to_column_name();
            sources.push(Source {
                file_name: raw_index_file_name(id, &column),
                name: column,
                has_footer: true,
            });
        }
        sources.push(Source {
            file_name: star_tree_name(id),
            name: TREE_INDEX_MAP_NAME.to_string(),
            has_footer: false,
        });
        sources
    }

    /// `convert` for a caller that already holds `startreev2.lock`.
    pub fn consolidate(&self, metadata: &StarTreeV2Metadata) -> Result<Vec<IndexMapEntry>> {
        let sources = Self::sources(metadata);
        for source in &sources {
            if !self.directory.file_exists(&source.file_name) {
                bail!(MissingIndexFile(format!(
                    "{} of star-tree {} in {}",
                    source.file_name, metadata.star_tree_id, self.directory
                )));
            }
        }
        for source in sources.iter().filter(|s| s.has_footer) {
            codec_util::checksum_entire_file(self.directory, &source.file_name)?;
        }

        let mut entries = Vec::with_capacity(sources.len());
        {
            let mut output = self
                .directory
                .append_output(STAR_TREE_V2_COLUMN_FILE, &IO_CONTEXT_DEFAULT)?;
            for source in &sources {
                let mut input = self
                    .directory
                    .open_input(&source.file_name, &IO_CONTEXT_READONCE)?;
                let start = output.file_pointer() as u64;
                let size = input.len();
                output.copy_bytes(input.as_mut(), size as usize)?;
                debug!(
                    "appended {} at {} ({} bytes) to {}",
                    source.file_name, start, size, STAR_TREE_V2_COLUMN_FILE
                );
                entries.push(IndexMapEntry {
                    star_tree_id: metadata.star_tree_id,
                    name: source.name.clone(),
                    start,
                    size,
                });
            }
            output.flush()?;
        }
        {
            let mut output = self
                .directory
                .append_output(STAR_TREE_V2_INDEX_MAP_FILE, &IO_CONTEXT_DEFAULT)?;
            for entry in &entries {
                output.write_all(entry.to_lines().as_bytes())?;
            }
            output.flush()?;
        }

        let mut synced = HashSet::with_capacity(2);
        synced.insert(STAR_TREE_V2_COLUMN_FILE.to_string());
        synced.insert(STAR_TREE_V2_INDEX_MAP_FILE.to_string());
        self.directory.sync(&synced)?;
        for source in &sources {
            self.directory.delete_file(&source.file_name)?;
        }
        self.directory.sync_meta_data()?;
        Ok(entries)
    }
}
