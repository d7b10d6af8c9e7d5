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

use std::io::{self, Read};

use flate2::CrcReader;

use crate::core::store::io::{ChecksumIndexInput, DataInput, IndexInput, RandomAccessInput};
use crate::error::ErrorKind::{IllegalArgument, UnsupportedOperation};
use crate::error::Result;

/// Sequential reader that folds every byte it hands out into a CRC-32.
///
/// Only forward reads are possible: seeking ahead reads (and checksums) the
/// skipped bytes, so `checksum()` always covers `[0, file_pointer())`.
pub struct BufferedChecksumIndexInput {
    reader: CrcReader<Box<dyn IndexInput>>,
    name: String,
}

impl BufferedChecksumIndexInput {
    pub fn new(input: Box<dyn IndexInput>) -> BufferedChecksumIndexInput {
        let name = format!("checksum({})", input.name());
        BufferedChecksumIndexInput {
            reader: CrcReader::new(input),
            name,
        }
    }

    fn inner(&self) -> &dyn IndexInput {
        self.reader.get_ref().as_ref()
    }
}

impl ChecksumIndexInput for BufferedChecksumIndexInput {
    fn checksum(&self) -> i64 {
        i64::from(self.reader.crc().sum())
    }
}

impl Read for BufferedChecksumIndexInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl DataInput for BufferedChecksumIndexInput {}

impl IndexInput for BufferedChecksumIndexInput {
    fn clone(&self) -> Result<Box<dyn IndexInput>> {
        bail!(UnsupportedOperation("clone a checksum input".into()))
    }

    fn file_pointer(&self) -> i64 {
        self.inner().file_pointer()
    }

    fn seek(&mut self, pos: i64) -> Result<()> {
        let current = self.file_pointer();
        if pos < current {
            bail!(IllegalArgument(format!(
                "{} cannot seek backwards from {} to {}",
                self.name, current, pos
            )));
        }
        self.skip_bytes((pos - current) as usize)
    }

    fn len(&self) -> u64 {
        self.inner().len()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn random_access_slice(
        &self,
        _offset: i64,
        _length: i64,
    ) -> Result<Box<dyn RandomAccessInput>> {
        bail!(UnsupportedOperation(
            "random access slice of a checksum input".into()
        ))
    }

    fn slice(&self, _description: &str, _offset: i64, _length: i64) -> Result<Box<dyn IndexInput>> {
        bail!(UnsupportedOperation("slice a checksum input".into()))
    }
}
