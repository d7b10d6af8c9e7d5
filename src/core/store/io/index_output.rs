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

use crate::core::store::io::DataOutput;

use crate::error::Result;

/// Trait for output to a file in a Directory.
pub trait IndexOutput: DataOutput {
    fn name(&self) -> &str;
    /// Absolute position in the underlying file, including bytes that were
    /// present before an append-mode output was opened.
    fn file_pointer(&self) -> i64;
    /// CRC32 of the bytes written through this output.
    fn checksum(&self) -> Result<i64>;
}
