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
use crate::core::util::bit_util::BitsRequired;
use crate::error::ErrorKind::{IllegalArgument, IllegalState};
use crate::error::Result;

pub const SUPPORTED_BITS_PER_VALUE: &[i32] = &[1, 2, 4, 8, 12, 16, 20, 24, 28, 32, 40, 48, 56, 64];

/// Number of zero bytes appended by `finish`.
pub const PADDING_BYTES: usize = 3;

/// Returns the largest value representable with `bits_per_value` bits.
pub fn max_value(bits_per_value: i32) -> i64 {
    debug_assert!(bits_per_value > 0 && bits_per_value <= 64);
    if bits_per_value == 64 {
        i64::max_value()
    } else {
        (1i64 << bits_per_value) - 1
    }
}

/// Class for writing packed integers to be directly read from a `RandomAccessInput`.
///
/// Values are laid out as one big-endian bit stream, value `i` occupying bits
/// `[i * bpv, (i + 1) * bpv)`. Unlike the other packed writers, the number of values
/// must be known up front.
pub struct DirectWriter<'a, O: DataOutput + ?Sized> {
    bits_per_value: i32,
    num_values: usize,
    output: &'a mut O,
    count: usize,
    finished: bool,
    // pending bits not yet flushed as whole bytes, right aligned
    pending: u128,
    pending_bits: u32,
}

impl<'a, O: DataOutput + ?Sized> DirectWriter<'a, O> {
    fn new(output: &'a mut O, num_values: usize, bits_per_value: i32) -> DirectWriter<'a, O> {
        DirectWriter {
            bits_per_value,
            num_values,
            output,
            count: 0,
            finished: false,
            pending: 0,
            pending_bits: 0,
        }
    }

    /// Returns an instance suitable for encoding `num_values` using `bits_per_value`
    pub fn get_instance(
        output: &'a mut O,
        num_values: usize,
        bits_per_value: i32,
    ) -> Result<DirectWriter<'a, O>> {
        if SUPPORTED_BITS_PER_VALUE.binary_search(&bits_per_value).is_err() {
            bail!(IllegalArgument(format!(
                "Unsupported bitsPerValue {}. Did you use bits_required?",
                bits_per_value
            )))
        }
        Ok(Self::new(output, num_values, bits_per_value))
    }

    pub fn add(&mut self, l: i64) -> Result<()> {
        debug_assert!(!self.finished);
        if self.bits_per_value != 64 && (l < 0 || l > max_value(self.bits_per_value)) {
            bail!(IllegalArgument(format!(
                "value {} does not fit in {} bits",
                l, self.bits_per_value
            )));
        }
        if self.count >= self.num_values {
            bail!(IllegalState(format!(
                "Writing past end of stream, num values: {}, current count: {}",
                self.num_values, self.count
            )));
        }

        let bpv = self.bits_per_value as u32;
        self.pending = (self.pending << bpv) | u128::from(l as u64);
        self.pending_bits += bpv;
        while self.pending_bits >= 8 {
            self.pending_bits -= 8;
            self.output
                .write_byte((self.pending >> self.pending_bits) as u8)?;
        }
        self.pending &= (1u128 << self.pending_bits) - 1;

        self.count += 1;
        Ok(())
    }

    pub fn finish(&mut self) -> Result<()> {
        if self.count != self.num_values {
            bail!(IllegalState(format!(
                "Wrong number of values added, expected: {}, got: {}",
                self.num_values, self.count
            )));
        }

        debug_assert!(!self.finished);
        if self.pending_bits > 0 {
            let last = (self.pending << (8 - self.pending_bits)) as u8;
            self.output.write_byte(last)?;
            self.pending = 0;
            self.pending_bits = 0;
        }
        // pad for fast io: readers never look past the last value, but it's just 3 bytes...
        for _ in 0..PADDING_BYTES {
            self.output.write_byte(0u8)?;
        }

        self.finished = true;
        Ok(())
    }

    /// Number of bytes `finish` leaves behind for `num_values` values, padding included.
    pub fn bytes_written(num_values: usize, bits_per_value: i32) -> usize {
        let bits = num_values as u64 * bits_per_value as u64;
        ((bits + 7) / 8) as usize + PADDING_BYTES
    }

    /// Returns how many bits are required to hold values up to and including max_value
    pub fn bits_required(max_value: i64) -> i32 {
        debug_assert!(max_value >= 0);
        Self::round_bits(max_value.bits_required() as i32)
    }

    /// Round a number of bits per value to the next amount of bits per value that is supported
    /// by this writer.
    pub fn round_bits(bits_required: i32) -> i32 {
        match SUPPORTED_BITS_PER_VALUE.binary_search(&bits_required) {
            Ok(_) => bits_required,
            Err(index) => SUPPORTED_BITS_PER_VALUE[index],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_bits() {
        assert_eq!(DirectWriter::<Vec<u8>>::bits_required(0), 1);
        assert_eq!(DirectWriter::<Vec<u8>>::bits_required(5), 4);
        assert_eq!(DirectWriter::<Vec<u8>>::bits_required(99), 8);
        assert_eq!(DirectWriter::<Vec<u8>>::bits_required(4096), 16);
        assert_eq!(DirectWriter::<Vec<u8>>::round_bits(33), 40);
    }

    #[test]
    fn test_bit_layout() {
        let mut out: Vec<u8> = Vec::new();
        {
            let mut writer = DirectWriter::get_instance(&mut out, 3, 4).unwrap();
            writer.add(0xA).unwrap();
            writer.add(0x3).unwrap();
            writer.add(0xF).unwrap();
            assert!(writer.add(1).is_err());
            writer.finish().unwrap();
        }
        assert_eq!(out, vec![0xA3, 0xF0, 0, 0, 0]);
        assert_eq!(DirectWriter::<Vec<u8>>::bytes_written(3, 4), out.len());
    }

    #[test]
    fn test_wrong_count() {
        let mut out: Vec<u8> = Vec::new();
        let mut writer = DirectWriter::get_instance(&mut out, 2, 8).unwrap();
        writer.add(1).unwrap();
        assert!(writer.finish().is_err());
        assert!(DirectWriter::get_instance(&mut out, 2, 3).is_err());
    }
}
