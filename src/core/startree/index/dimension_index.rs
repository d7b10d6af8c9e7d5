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
use crate::core::store::io::{DataInput, DataOutput, IndexInput, RandomAccessInput};
use crate::core::store::{Directory, IO_CONTEXT_DEFAULT};
use crate::core::util::packed::{DirectReader, DirectWriter};
use crate::core::util::LongValues;
use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;

pub const DIMENSION_INDEX_CODEC: &str = "StarTreeDimensionFwd";
pub const DIMENSION_INDEX_VERSION_START: i32 = 1;
pub const DIMENSION_INDEX_VERSION_CURRENT: i32 = DIMENSION_INDEX_VERSION_START;

/// Writes a fixed-bit-width dictionary id per document.
///
/// Layout: codec header, num docs (int), bits per value (byte), the
/// `DirectWriter` packed ids, codec footer. `value_at(doc)` must return an
/// id in `[0, cardinality)`.
pub fn write_dimension_index<D, F>(
    directory: &D,
    name: &str,
    num_docs: usize,
    cardinality: usize,
    mut value_at: F,
) -> Result<()>
where
    D: Directory + ?Sized,
    F: FnMut(usize) -> Result<i32>,
{
    let max_value = cardinality.saturating_sub(1) as i64;
    let bits_per_value = DirectWriter::<D::IndexOutput>::bits_required(max_value);

    let mut output = directory.create_output(name, &IO_CONTEXT_DEFAULT)?;
    codec_util::write_header(&mut output, DIMENSION_INDEX_CODEC, DIMENSION_INDEX_VERSION_CURRENT)?;
    output.write_int(num_docs as i32)?;
    output.write_byte(bits_per_value as u8)?;
    {
        let mut writer = DirectWriter::get_instance(&mut output, num_docs, bits_per_value)?;
        for doc_id in 0..num_docs {
            let value = value_at(doc_id)?;
            if value < 0 || i64::from(value) > max_value {
                bail!(IllegalArgument(format!(
                    "dictionary id {} of doc {} out of [0, {}) in {}",
                    value, doc_id, cardinality, name
                )));
            }
            writer.add(i64::from(value))?;
        }
        writer.finish()?;
    }
    codec_util::write_footer(&mut output)?;
    output.flush()?;
    Ok(())
}

/// Random access to a dimension forward index.
pub struct DimensionIndexReader {
    num_docs: usize,
    bits_per_value: i32,
    values: Box<dyn LongValues>,
}

impl DimensionIndexReader {
    /// `input` spans exactly one index, for example a slice of the consolidated file.
    pub fn open(input: &dyn IndexInput) -> Result<DimensionIndexReader> {
        let mut input = input.clone()?;
        input.seek(0)?;
        codec_util::check_header(
            input.as_mut(),
            DIMENSION_INDEX_CODEC,
            DIMENSION_INDEX_VERSION_START,
            DIMENSION_INDEX_VERSION_CURRENT,
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
        let bits_per_value = i32::from(input.read_byte()?);
        let data_offset = input.file_pointer() as u64;
        let data_len = DirectWriter::<Vec<u8>>::bytes_written(num_docs, bits_per_value) as u64;
        let expected = data_offset + data_len + codec_util::footer_length() as u64;
        if expected != input.len() {
            bail!(CorruptIndex(format!(
                "dimension index {} should be {} bytes, got {}",
                input.name(),
                expected,
                input.len()
            )));
        }
        input.seek((data_offset + data_len) as i64)?;
        codec_util::validate_footer(input.as_mut())?;

        let slice: Arc<dyn RandomAccessInput> =
            Arc::from(input.random_access_slice(data_offset as i64, data_len as i64)?);
        let values = DirectReader::get_instance(slice, bits_per_value, 0)?;
        Ok(DimensionIndexReader {
            num_docs,
            bits_per_value,
            values,
        })
    }

    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    pub fn bits_per_value(&self) -> i32 {
        self.bits_per_value
    }

    pub fn get(&self, doc_id: usize) -> Result<i32> {
        if doc_id >= self.num_docs {
            bail!(IllegalArgument(format!(
                "doc id {} out of [0, {})",
                doc_id, self.num_docs
            )));
        }
        Ok(self.values.get64(doc_id as i64)? as i32)
    }
}
