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

//! Utility functions for reading and writing versioned headers.
//!
//! Writing codec headers is useful to ensure that a file is in
//! the format you think it is.

use crate::core::store::io::{ChecksumIndexInput, DataInput, DataOutput, IndexInput, IndexOutput};
use crate::core::store::{Directory, IO_CONTEXT_READONCE};

use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;

pub const CODEC_MAGIC: i32 = 0x3FD7_6C17;
pub const FOOTER_MAGIC: i32 = !CODEC_MAGIC;

/// Writes a codec header: magic, codec name and version.
pub fn write_header<T: DataOutput + ?Sized>(out: &mut T, codec: &str, version: i32) -> Result<()> {
    let clen = codec.len();
    if clen >= 128 || !codec.is_ascii() {
        bail!(IllegalArgument(format!(
            "codec must be simple ASCII less than 128 characters, got {}[length={}]",
            codec, clen,
        )));
    }
    out.write_int(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_int(version)
}

pub fn header_length(codec: &str) -> usize {
    9 + codec.len()
}

pub fn check_header<T: DataInput + ?Sized>(
    data_input: &mut T,
    codec: &str,
    min_ver: i32,
    max_ver: i32,
) -> Result<i32> {
    let actual_header = data_input.read_int()?;
    if actual_header != CODEC_MAGIC {
        bail!(CorruptIndex(format!(
            "codec header mismatch: actual=0x{:X}, expected=0x{:X}",
            actual_header, CODEC_MAGIC
        )));
    }
    let actual_codec = data_input.read_string()?;
    if actual_codec != codec {
        bail!(CorruptIndex(format!(
            "codec mismatch: actual={}, expected={}",
            actual_codec, codec
        )));
    }
    let actual_ver = data_input.read_int()?;
    if actual_ver < min_ver || actual_ver > max_ver {
        bail!(CorruptIndex(format!(
            "index format either too new or too old: {} <= {} <= {} doesn't hold",
            min_ver, actual_ver, max_ver
        )));
    }
    Ok(actual_ver)
}

/// Writes the footer: magic, algorithm id (always 0) and the CRC32 of
/// everything written before the checksum itself.
pub fn write_footer<T: IndexOutput + ?Sized>(output: &mut T) -> Result<()> {
    output.write_int(FOOTER_MAGIC)?;
    output.write_int(0)?;
    let value = output.checksum()?;
    if (value as u64 & 0xFFFF_FFFF_0000_0000) != 0 {
        bail!(IllegalArgument(format!("Illegal CRC-32 checksum: {}", value)));
    }
    output.write_long(value)
}

#[inline(always)]
pub fn footer_length() -> usize {
    16
}

pub fn validate_footer<T: IndexInput + ?Sized>(input: &mut T) -> Result<()> {
    let remaining = input.len() as i64 - input.file_pointer();
    let expected = footer_length() as i64;

    if remaining < expected {
        bail!(CorruptIndex(format!(
            "misplaced codec footer (file truncated?): remaining={}, expected={}",
            remaining, expected
        )))
    } else if remaining > expected {
        bail!(CorruptIndex(format!(
            "misplaced codec footer (file extended?): remaining={}, expected={}",
            remaining, expected
        )))
    } else {
        let magic = input.read_int()?;
        if magic != FOOTER_MAGIC {
            bail!(CorruptIndex(format!(
                "codec footer mismatch: actual={} vs expected={}",
                magic, FOOTER_MAGIC
            )));
        }
        let algorithm_id = input.read_int()?;
        if algorithm_id != 0 {
            bail!(CorruptIndex(format!(
                "codec footer mismatch: unknown algorithm_id: {}",
                algorithm_id
            )));
        }
        Ok(())
    }
}

/// Validates the codec footer previously written by `write_footer`.
pub fn check_footer<T: ChecksumIndexInput + ?Sized>(input: &mut T) -> Result<i64> {
    validate_footer(input)?;
    let actual_checksum = input.checksum();
    let expected_checksum = input.read_long()?;
    if (expected_checksum as u64 & 0xFFFF_FFFF_0000_0000) != 0 {
        bail!(CorruptIndex(format!(
            "Illegal CRC-32 checksum: {}",
            expected_checksum
        )));
    }
    if actual_checksum != expected_checksum {
        bail!(CorruptIndex(format!(
            "checksum failed (hardware problems?): expected=0x{:X}, actual=0x{:X}",
            expected_checksum, actual_checksum
        )));
    }
    Ok(actual_checksum)
}

/// Reads the whole file through a checksum input and verifies its footer.
pub fn checksum_entire_file<D: Directory + ?Sized>(dir: &D, name: &str) -> Result<i64> {
    let mut input = dir.open_checksum_input(name, &IO_CONTEXT_READONCE)?;
    if (input.len() as usize) < footer_length() {
        bail!(CorruptIndex(format!(
            "file {} is too small to carry a footer: {} bytes",
            name,
            input.len()
        )));
    }
    let footer_start = input.len() as i64 - footer_length() as i64;
    input.seek(footer_start)?;
    check_footer(&mut input)
}
