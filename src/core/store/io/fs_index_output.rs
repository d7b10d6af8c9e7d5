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

use crate::core::store::io::{DataOutput, IndexOutput};

use crate::error::Result;

use std::fs::{File, OpenOptions};
use std::io::BufWriter;
use std::io::Write;
use std::path::Path;

use flate2::CrcWriter;

const CHUNK_SIZE: usize = 8192;

/// `IndexOutput` implement for `FSDirectory`
pub struct FSIndexOutput {
    name: String,
    writer: CrcWriter<BufWriter<File>>,
    start_offset: u64,
    bytes_written: usize,
}

impl FSIndexOutput {
    /// Creates the file, truncating anything that was there before.
    pub fn new<P: AsRef<Path>>(name: String, path: P) -> Result<FSIndexOutput> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::with_file(name, file, 0))
    }

    /// Opens the file for appending, `file_pointer` starts at the current length.
    pub fn append<P: AsRef<Path>>(name: String, path: P) -> Result<FSIndexOutput> {
        let file = OpenOptions::new().append(true).create(true).open(path)?;
        let start_offset = file.metadata()?.len();
        Ok(Self::with_file(name, file, start_offset))
    }

    fn with_file(name: String, file: File, start_offset: u64) -> FSIndexOutput {
        FSIndexOutput {
            name,
            writer: CrcWriter::new(BufWriter::with_capacity(CHUNK_SIZE, file)),
            start_offset,
            bytes_written: 0,
        }
    }
}

impl Drop for FSIndexOutput {
    fn drop(&mut self) {
        if let Err(ref desc) = self.writer.flush() {
            error!("Oops, failed to flush {}, errmsg: {}", self.name, desc);
        }
        self.bytes_written = 0;
    }
}

impl DataOutput for FSIndexOutput {}

impl Write for FSIndexOutput {
    fn write(&mut self, buf: &[u8]) -> ::std::io::Result<usize> {
        let count = self.writer.write(buf)?;
        self.bytes_written += count;
        Ok(count)
    }

    fn flush(&mut self) -> ::std::io::Result<()> {
        self.writer.flush()
    }
}

impl IndexOutput for FSIndexOutput {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_pointer(&self) -> i64 {
        (self.start_offset + self.bytes_written as u64) as i64
    }

    fn checksum(&self) -> Result<i64> {
        Ok((self.writer.crc().sum() as i64) & 0xffff_ffffi64)
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;

    #[test]
    fn test_write_byte() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hello.txt");
        let mut fsout = FSIndexOutput::new("hello.txt".to_string(), &path).unwrap();
        fsout.write_byte(b'a').unwrap();
        assert_eq!(fsout.file_pointer(), 1);
    }

    #[test]
    fn test_append_continues_file_pointer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined");
        {
            let mut out = FSIndexOutput::new("combined".to_string(), &path).unwrap();
            out.write_int(7).unwrap();
        }
        let mut out = FSIndexOutput::append("combined".to_string(), &path).unwrap();
        assert_eq!(out.file_pointer(), 4);
        out.write_long(9).unwrap();
        assert_eq!(out.file_pointer(), 12);
        drop(out);
        assert_eq!(::std::fs::metadata(&path).unwrap().len(), 12);
    }
}
