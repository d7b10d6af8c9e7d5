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

use std::borrow::Cow;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use byteorder::{ByteOrder, LittleEndian};
use memmap::MmapMut;

use crate::core::startree::aggregation::{AggregatedValue, AggregationFunction};
use crate::core::startree::builder::buffer::{check_doc_id, RecordBuffer};
use crate::core::startree::record::Record;
use crate::error::ErrorKind::{CorruptIndex, IllegalArgument};
use crate::error::Result;

const INITIAL_CAPACITY: usize = 1 << 20;

static BUFFER_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Records serialized into a growable memory-mapped scratch file.
///
/// A record is laid out as its dimensions (`i32` each) followed by one
/// `u32` length and the serialized bytes per metric, all little-endian. The
/// scratch file is removed on drop.
pub struct OffHeapRecordBuffer {
    path: PathBuf,
    file: File,
    mmap: MmapMut,
    capacity: usize,
    used: usize,
    offsets: Vec<usize>,
    num_dimensions: usize,
    functions: Vec<AggregationFunction>,
}

impl OffHeapRecordBuffer {
    pub fn new<P: AsRef<Path>>(
        dir: P,
        num_dimensions: usize,
        functions: Vec<AggregationFunction>,
    ) -> Result<OffHeapRecordBuffer> {
        let path = dir.as_ref().join(format!(
            ".startree.{}.{}.buffer",
            ::std::process::id(),
            BUFFER_COUNTER.fetch_add(1, Ordering::SeqCst)
        ));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(INITIAL_CAPACITY as u64)?;
        let mmap = unsafe { MmapMut::map_mut(&file)? };
        debug!("created off-heap record buffer {}", path.display());
        Ok(OffHeapRecordBuffer {
            path,
            file,
            mmap,
            capacity: INITIAL_CAPACITY,
            used: 0,
            offsets: Vec::new(),
            num_dimensions,
            functions,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_capacity(&mut self, additional: usize) -> Result<()> {
        let required = self.used + additional;
        if required <= self.capacity {
            return Ok(());
        }
        let mut capacity = self.capacity * 2;
        while capacity < required {
            capacity *= 2;
        }
        self.file.set_len(capacity as u64)?;
        self.mmap = unsafe { MmapMut::map_mut(&self.file)? };
        self.capacity = capacity;
        trace!(
            "grew off-heap record buffer {} to {} bytes",
            self.path.display(),
            capacity
        );
        Ok(())
    }

    fn record_bytes(&self, doc_id: usize) -> Result<&[u8]> {
        check_doc_id(doc_id, self.offsets.len())?;
        let start = self.offsets[doc_id];
        let end = if doc_id + 1 < self.offsets.len() {
            self.offsets[doc_id + 1]
        } else {
            self.used
        };
        Ok(&self.mmap[start..end])
    }

    /// Serialized metric `metric_id` of a record.
    fn metric_bytes<'a>(&self, bytes: &'a [u8], metric_id: usize) -> Result<&'a [u8]> {
        if metric_id >= self.functions.len() {
            bail!(IllegalArgument(format!(
                "metric {} out of record with {} metrics",
                metric_id,
                self.functions.len()
            )));
        }
        let mut pos = self.num_dimensions * 4;
        let mut i = 0;
        loop {
            if pos + 4 > bytes.len() {
                bail!(CorruptIndex("truncated record in off-heap buffer".into()));
            }
            let len = LittleEndian::read_u32(&bytes[pos..pos + 4]) as usize;
            pos += 4;
            if pos + len > bytes.len() {
                bail!(CorruptIndex("truncated metric in off-heap buffer".into()));
            }
            if i == metric_id {
                return Ok(&bytes[pos..pos + len]);
            }
            pos += len;
            i += 1;
        }
    }
}

impl RecordBuffer for OffHeapRecordBuffer {
    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn record(&self, doc_id: usize) -> Result<Cow<'_, Record>> {
        let bytes = self.record_bytes(doc_id)?;
        let mut dimensions = Vec::with_capacity(self.num_dimensions);
        for d in 0..self.num_dimensions {
            dimensions.push(LittleEndian::read_i32(&bytes[d * 4..d * 4 + 4]));
        }
        let mut metrics = Vec::with_capacity(self.functions.len());
        for (i, function) in self.functions.iter().enumerate() {
            metrics.push(function.deserialize(self.metric_bytes(bytes, i)?)?);
        }
        Ok(Cow::Owned(Record::new(dimensions, metrics)))
    }

    fn dimension(&self, doc_id: usize, dimension_id: usize) -> Result<i32> {
        if dimension_id >= self.num_dimensions {
            bail!(IllegalArgument(format!(
                "dimension {} out of record with {} dimensions",
                dimension_id, self.num_dimensions
            )));
        }
        let bytes = self.record_bytes(doc_id)?;
        let pos = dimension_id * 4;
        Ok(LittleEndian::read_i32(&bytes[pos..pos + 4]))
    }

    fn metric(&self, doc_id: usize, metric_id: usize) -> Result<Cow<'_, AggregatedValue>> {
        let bytes = self.metric_bytes(self.record_bytes(doc_id)?, metric_id)?;
        Ok(Cow::Owned(self.functions[metric_id].deserialize(bytes)?))
    }

    fn push(&mut self, record: Record) -> Result<()> {
        if record.dimensions.len() != self.num_dimensions
            || record.metrics.len() != self.functions.len()
        {
            bail!(IllegalArgument(format!(
                "record with {} dimensions and {} metrics, expected {} and {}",
                record.dimensions.len(),
                record.metrics.len(),
                self.num_dimensions,
                self.functions.len()
            )));
        }
        let mut serialized = Vec::with_capacity(self.functions.len());
        let mut size = self.num_dimensions * 4;
        for (function, value) in self.functions.iter().zip(&record.metrics) {
            let bytes = function.serialize(value)?;
            size += 4 + bytes.len();
            serialized.push(bytes);
        }
        self.ensure_capacity(size)?;

        let start = self.used;
        let mut pos = start;
        for v in &record.dimensions {
            LittleEndian::write_i32(&mut self.mmap[pos..pos + 4], *v);
            pos += 4;
        }
        for bytes in &serialized {
            LittleEndian::write_u32(&mut self.mmap[pos..pos + 4], bytes.len() as u32);
            pos += 4;
            self.mmap[pos..pos + bytes.len()].copy_from_slice(bytes);
            pos += bytes.len();
        }
        self.offsets.push(start);
        self.used = pos;
        Ok(())
    }
}

impl Drop for OffHeapRecordBuffer {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            error!(
                "failed to remove off-heap record buffer {}: {}",
                self.path.display(),
                e
            );
        }
    }
}
