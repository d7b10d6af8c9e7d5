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

use crate::error::ErrorKind::{IllegalArgument, IllegalState, UnexpectedEOF};
use crate::error::Result;

use byteorder::{BigEndian, ReadBytesExt};
use std::io::Read;

/// Abstract base for performing read operations of the index files.
///
/// Multi-byte values are big-endian, variable-length ints use the
/// 7-bits-per-byte encoding with the high bit as continuation flag.
pub trait DataInput: Read {
    fn read_byte(&mut self) -> Result<u8> {
        let mut buffer = [0u8; 1];
        if self.read(&mut buffer)? != 1 {
            bail!(UnexpectedEOF(
                "Reached EOF when a single byte is expected".to_owned()
            ))
        } else {
            Ok(buffer[0])
        }
    }

    fn read_bytes(&mut self, b: &mut [u8], offset: usize, length: usize) -> Result<()> {
        let end = offset + length;
        if b.len() < end {
            let msg = format!(
                "Buffer too small: writing [{}, {}) to [0, {})",
                offset,
                end,
                b.len(),
            );
            bail!(IllegalArgument(msg));
        }

        if let Err(e) = self.read_exact(&mut b[offset..end]) {
            bail!(UnexpectedEOF(format!(
                "Reached EOF when {} bytes are expected: {}",
                length, e
            )))
        }
        Ok(())
    }

    fn read_int(&mut self) -> Result<i32> {
        Ok(self.read_i32::<BigEndian>()?)
    }

    fn read_long(&mut self) -> Result<i64> {
        Ok(self.read_i64::<BigEndian>()?)
    }

    fn read_vint(&mut self) -> Result<i32> {
        let mut result = 0i32;
        let mut shift = 0;
        loop {
            let b = self.read_byte()?;
            if shift == 28 {
                if b & 0xf0 != 0 {
                    bail!(IllegalState("Invalid vInt detected".to_owned()));
                }
                return Ok(result | (i32::from(b) << 28));
            }
            result |= (i32::from(b) & 0x7f) << shift;
            if b & 0x80 == 0 {
                return Ok(result);
            }
            shift += 7;
        }
    }

    fn read_string(&mut self) -> Result<String> {
        let length = self.read_vint()?;
        if length < 0 {
            bail!(IllegalState(format!("Invalid string length: {}", length)));
        }
        let mut buffer = vec![0u8; length as usize];
        self.read_bytes(&mut buffer, 0, length as usize)?;
        Ok(String::from_utf8(buffer)?)
    }

    fn skip_bytes(&mut self, count: usize) -> Result<()> {
        const SKIP_BUFFER_SIZE: usize = 1024;
        let mut skip_buffer = [0u8; SKIP_BUFFER_SIZE];
        let mut skipped = 0;
        while skipped < count {
            let step = ::std::cmp::min(SKIP_BUFFER_SIZE, count - skipped);
            self.read_bytes(&mut skip_buffer, 0, step)?;
            skipped += step;
        }
        Ok(())
    }
}

impl<'a> DataInput for &'a [u8] {}
