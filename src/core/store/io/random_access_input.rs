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

use crate::error::Result;

/// Random Access Index API.
///
/// Unlike `IndexInput`, this has no concept of file position, all reads
/// are absolute. Implementations never mutate, so one instance may be read
/// from many query threads at once.
pub trait RandomAccessInput: Send + Sync {
    fn len(&self) -> u64;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn read_byte(&self, pos: u64) -> Result<u8>;
    fn read_short(&self, pos: u64) -> Result<i16>;
    fn read_int(&self, pos: u64) -> Result<i32>;
    fn read_long(&self, pos: u64) -> Result<i64>;
    /// Copies `buf.len()` bytes starting at `pos`.
    fn read_bytes(&self, pos: u64, buf: &mut [u8]) -> Result<()>;
}
