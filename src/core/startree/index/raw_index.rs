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

use std::io::Write;
use std::sync::Arc;

use crate::core::codec::codec_util;
use crate::core::segment::DataType;
use crate::core::store::io::{DataInput, DataOutput, IndexInput, RandomAccessInput};
use crate::core::store::{Directory, IO_CONTEXT_DEFAULT};
use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;

pub const RAW_INDEX_CODEC: &str = "StarTreeRawFwd";
pub const RAW_INDEX_VERSION_START: i32 = 1;
pub const RAW_INDEX_VERSION_CURRENT: i32 = RAW_INDEX_VERSION_START;

/// Writes one serialized value per document.
///
/// Layout: codec header, num docs (int), data type (byte), then either the
/// fixed-size values back to back or, for variable sized types, `num_docs + 1`
/// offsets (long) followed by the concatenated values; codec footer.
pub fn write_raw_index<D, F>(
    directory: &D,
    name: &str,
    data_type: DataType,
    num_docs: usize,
    mut value_at: F,
) -> Result<()>
where
    D: Directory + ?Sized,
    F: FnMut(usize) -> Result<Vec<u8>>,
{
    let mut output = directory.create_output(name, &IO_CONTEXT_DEFAULT)?;
    codec_util::write_header(&mut output, RAW_INDEX_CODEC, RAW_INDEX_VERSION_CURRENT)?;
    output.write_int(num_docs as i32)?;
    output.write_byte(data_type.as_byte())?;

    match data_type.fixed_size() {
        Some(size) => {
            for doc_id in 0..num_docs {
                let bytes = value_at(doc_id)?;
                if bytes.len() != size {
                    bail!(IllegalArgument(format!(
                        "{} value of doc {} in {} has {} bytes, expected {}",
                        data_type,
                        doc_id,
                        name,
                        bytes.len(),
                        size
                    )));
                }
                output.write_bytes(&bytes, 0, size)?;
            }
        }
        None => {
            let mut offsets = Vec::with_capacity(num_docs + 1);
            let mut data = Vec::new();
            offsets.push(0i64);
            for doc_id in 0..num_docs {
                data.extend_from_slice(&value_at(doc_id)?);
                offsets.push(data.len() as i64);
            }
            for offset in offsets {
                output.write_long(offset)?;
            }
            output.write_bytes(&data, 0, data.len())?;
        }
    }
    codec_util::write_footer(&mut output)?;
    output.flush()?;
    Ok(())
}

/// Random access to a raw forward index.
pub struct RawIndexReader {
    num_docs: usize,
    data_type: DataType,
    fixed_size: Option<usize>,
    data: Arc<dyn RandomAccessInput>,
}

impl RawIndexReader {
    /// `input` spans exactly one index.
    pub fn open(input: &dyn IndexInput) -> Result<RawIndexReader> {
        let mut input = input.clone()?;
        input.seek(0)?;
        codec_util::check_header(
            input.as_mut(),
            RAW_INDEX_CODEC,
            RAW_INDEX_VERSION_START,
            RAW_INDEX_VERSION_CURRENT,
        )?;
        let num_docs = input.read_int()?;
        if num_docs < 0 {
            bail!(CorruptIndex(format!(
                "negative doc count {} in {}",
                num_docs,
                input.name()
            )));
        }
        let num_docs = num_docs as usize;
        let data_type = DataType::from_byte(input.read_byte()?)?;
        let data_offset = input.file_pointer() as u64;
        let footer = codec_util::footer_length() as u64;
        if input.len() < data_offset + footer {
            bail!(CorruptIndex(format!("raw index {} is truncated", input.name())));
        }
        let data_len = input.len() - data_offset - footer;
        input.seek((data_offset + data_len) as i64)?;
        codec_util::validate_footer(input.as_mut())?;

        let data: Arc<dyn RandomAccessInput> =
            Arc::from(input.random_access_slice(data_offset as i64, data_len as i64)?);
        let fixed_size = data_type.fixed_size();
        match fixed_size {
            Some(size) => {
                if data_len != (num_docs * size) as u64 {
                    bail!(CorruptIndex(format!(
                        "raw index {} holds {} bytes for {} {} values",
                        input.name(),
                        data_len,
                        num_docs,
                        data_type
                    )));
                }
            }
            None => {
                let offsets_len = (num_docs as u64 + 1) * 8;
                if data_len < offsets_len
                    || data.read_long(offsets_len - 8)? as u64 + offsets_len != data_len
                {
                    bail!(CorruptIndex(format!(
                        "raw index {} has inconsistent offsets",
                        input.name()
                    )));
                }
            }
        }
        Ok(RawIndexReader {
            num_docs,
            data_type,
            fixed_size,
            data,
        })
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Serialized value of `doc_id`.
    pub fn get(&self, doc_id: usize) -> Result<Vec<u8>> {
        if doc_id >= self.num_docs {
            bail!(IllegalArgument(format!(
                "doc id {} out of [0, {})",
                doc_id, self.num_docs
            )));
        }
        let (start, len) = match self.fixed_size {
            Some(size) => ((doc_id * size) as u64, size),
            None => {
                let offsets_len = (self.num_docs as u64 + 1) * 8;
                let start = self.data.read_long(doc_id as u64 * 8)?;
                let end = self.data.read_long(doc_id as u64 * 8 + 8)?;
                if start < 0 || end < start {
                    bail!(CorruptIndex(format!(
                        "bad offsets [{}, {}) for doc {}",
                        start, end, doc_id
                    )));
                }
                (offsets_len + start as u64, (end - start) as usize)
            }
        };
        let mut bytes = vec![0u8; len];
        self.data.read_bytes(start, &mut bytes)?;
        Ok(bytes)
    }

    pub fn get_long(&self, doc_id: usize) -> Result<i64> {
        match self.data_type {
            DataType::Long => self.data.read_long(doc_id_checked(doc_id, self.num_docs)? * 8),
            other => bail!(IllegalArgument(format!("{} index has no long values", other))),
        }
    }

    pub fn get_double(&self, doc_id: usize) -> Result<f64> {
        match self.data_type {
            DataType::Double => {
                let bits = self.data.read_long(doc_id_checked(doc_id, self.num_docs)? * 8)?;
                Ok(f64::from_bits(bits as u64))
            }
            other => bail!(IllegalArgument(format!("{} index has no double values", other))),
        }
    }
}

fn doc_id_checked(doc_id: usize, num_docs: usize) -> Result<u64> {
    if doc_id >= num_docs {
        bail!(IllegalArgument(format!(
            "doc id {} out of [0, {})",
            doc_id, num_docs
        )));
    }
    Ok(doc_id as u64)
}
