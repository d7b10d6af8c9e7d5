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
use std::fmt;
use std::path::PathBuf;

use crate::core::store::io::{BufferedChecksumIndexInput, IndexInput, IndexOutput};
use crate::core::store::{IOContext, Lock};
use crate::error::Result;

/// A Directory is a flat list of files.
///
/// Files are written once, either by `create_output` or by successive
/// `append_output` calls, and are only opened for read after that.
pub trait Directory: fmt::Display + Send + Sync {
    type IndexOutput: IndexOutput;

    /// Returns the names of all entries in the directory, sorted.
    fn list_all(&self) -> Result<Vec<String>>;

    /// Returns the length of a file in the directory.
    fn file_length(&self, name: &str) -> Result<i64>;

    fn file_exists(&self, name: &str) -> bool {
        self.resolve(name).is_file()
    }

    /// Creates a new, empty file in the directory with the given name.
    /// Returns a stream writing this file.
    fn create_output(&self, name: &str, context: &IOContext) -> Result<Self::IndexOutput>;

    /// Opens a stream positioned at the end of `name`, creating the file if needed.
    fn append_output(&self, name: &str, context: &IOContext) -> Result<Self::IndexOutput>;

    fn open_input(&self, name: &str, ctx: &IOContext) -> Result<Box<dyn IndexInput>>;

    fn open_checksum_input(
        &self,
        name: &str,
        ctx: &IOContext,
    ) -> Result<BufferedChecksumIndexInput> {
        let input = self.open_input(name, ctx)?;
        Ok(BufferedChecksumIndexInput::new(input))
    }

    /// Returns an obtained `Lock`, waiting while another holder keeps it.
    fn obtain_lock(&self, name: &str) -> Result<Box<dyn Lock>>;

    fn delete_file(&self, name: &str) -> Result<()>;

    /// Ensure that any writes to these files are moved to stable storage.
    fn sync(&self, names: &HashSet<String>) -> Result<()>;

    /// Ensure that directory metadata, such as recent file renames, are made durable.
    fn sync_meta_data(&self) -> Result<()>;

    fn rename(&self, source: &str, dest: &str) -> Result<()>;

    fn resolve(&self, name: &str) -> PathBuf;
}
