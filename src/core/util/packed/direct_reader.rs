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

use std::sync::Arc;

use crate::core::store::io::RandomAccessInput;
use crate::core::util::LongValues;
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

/// Retrieves an instance previously written by `DirectWriter`
pub struct DirectReader;

impl DirectReader {
    pub fn get_instance(
        slice: Arc<dyn RandomAccessInput>,
        bits_per_value: i32,
        offset: u64,
    ) -> Result<Box<dyn LongValues>> {
        let reader: Box<dyn LongValues> = match bits_per_value {
            1 | 2 | 4 | 12 | 20 | 28 => {
                Box::new(DirectPackedReader::new(slice, bits_per_value, offset))
            }
            8 | 16 | 24 | 32 | 40 | 48 | 56 | 64 => Box::new(DirectAlignedReader::new(
                slice,
                (bits_per_value / 8) as u64,
                offset,
            )),
            _ => {
                bail!(IllegalArgument(format!(
                    "unsupported bits_per_value: {}",
                    bits_per_value
                )));
            }
        };
        Ok(reader)
    }
}

fn check_index(index: i64) -> Result<u64> {
    if index < 0 {
        bail!(IllegalArgument(format!(
            "negative index encountered: {}",
            index
        )));
    }
    Ok(index as u64)
}

// values that start and end on byte boundaries
struct DirectAlignedReader {
    input: Arc<dyn RandomAccessInput>,
    bytes_per_value: u64,
    offset: u64,
}

impl DirectAlignedReader {
    fn new(input: Arc<dyn RandomAccessInput>, bytes_per_value: u64, offset: u64) -> Self {
        DirectAlignedReader {
            input,
            bytes_per_value,
            offset,
        }
    }
}

impl LongValues for DirectAlignedReader {
    fn get64(&self, index: i64) -> Result<i64> {
        let pos = self.offset + check_index(index)? * self.bytes_per_value;
        match self.bytes_per_value {
            1 => Ok(i64::from(self.input.read_byte(pos)?)),
            2 => Ok(i64::from(self.input.read_short(pos)? as u16)),
            4 => Ok(i64::from(self.input.read_int(pos)? as u32)),
            8 => self.input.read_long(pos),
            n => {
                let mut buf = [0u8; 8];
                self.input.read_bytes(pos, &mut buf[..n as usize])?;
                let mut v = 0u64;
                for b in &buf[..n as usize] {
                    v = (v << 8) | u64::from(*b);
                }
                Ok(v as i64)
            }
        }
    }
}

// values that may straddle byte boundaries, at most 28 bits wide
struct DirectPackedReader {
    input: Arc<dyn RandomAccessInput>,
    bits_per_value: u64,
    mask: u64,
    offset: u64,
}

impl DirectPackedReader {
    fn new(input: Arc<dyn RandomAccessInput>, bits_per_value: i32, offset: u64) -> Self {
        DirectPackedReader {
            input,
            bits_per_value: bits_per_value as u64,
            mask: (1u64 << bits_per_value) - 1,
            offset,
        }
    }
}

impl LongValues for DirectPackedReader {
    fn get64(&self, index: i64) -> Result<i64> {
        let bit_pos = check_index(index)? * self.bits_per_value;
        let shift = bit_pos & 0x7;
        let num_bytes = (shift + self.bits_per_value + 7) >> 3;
        let mut buf = [0u8; 8];
        self.input.read_bytes(
            self.offset + (bit_pos >> 3),
            &mut buf[..num_bytes as usize],
        )?;
        let mut word = 0u64;
        for b in &buf[..num_bytes as usize] {
            word = (word << 8) | u64::from(*b);
        }
        let trailing = num_bytes * 8 - shift - self.bits_per_value;
        Ok(((word >> trailing) & self.mask) as i64)
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;
    use crate::core::store::io::{IndexInput, MmapIndexInput};
    use crate::core::util::packed::DirectWriter;

    fn round_trip(values: &[i64], bits_per_value: i32) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("packed");
        let mut out: Vec<u8> = vec![0xEE; 5];
        {
            let mut writer =
                DirectWriter::get_instance(&mut out, values.len(), bits_per_value).unwrap();
            for v in values {
                writer.add(*v).unwrap();
            }
            writer.finish().unwrap();
        }
        ::std::fs::write(&path, &out).unwrap();

        let input = MmapIndexInput::open(&path).unwrap();
        let slice: Arc<dyn RandomAccessInput> = Arc::from(
            input
                .random_access_slice(0, IndexInput::len(&input) as i64)
                .unwrap(),
        );
        let reader = DirectReader::get_instance(slice, bits_per_value, 5).unwrap();
        for (i, v) in values.iter().enumerate() {
            assert_eq!(reader.get64(i as i64).unwrap(), *v, "bpv {} at {}", bits_per_value, i);
        }
        assert!(reader.get64(-1).is_err());
    }

    #[test]
    fn test_every_supported_width() {
        use crate::core::util::packed::{max_value, SUPPORTED_BITS_PER_VALUE};
        for &bpv in SUPPORTED_BITS_PER_VALUE {
            let max = max_value(bpv);
            let values: Vec<i64> = (0..37i64)
                .map(|i| if i % 5 == 0 { max } else { (i * 7919) & max })
                .collect();
            round_trip(&values, bpv);
        }
    }
}
