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

use crate::core::startree::aggregation::AggregatedValue;
use crate::core::startree::record::Record;
use crate::error::ErrorKind::IllegalArgument;
use crate::error::Result;

/// The growable record arena of a build. Records are addressed by position
/// and never change once pushed.
pub trait RecordBuffer {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn record(&self, doc_id: usize) -> Result<Cow<'_, Record>>;

    fn dimension(&self, doc_id: usize, dimension_id: usize) -> Result<i32>;

    fn metric(&self, doc_id: usize, metric_id: usize) -> Result<Cow<'_, AggregatedValue>>;

    fn push(&mut self, record: Record) -> Result<()>;
}

pub(crate) fn check_doc_id(doc_id: usize, len: usize) -> Result<()> {
    if doc_id >= len {
        bail!(IllegalArgument(format!(
            "doc id {} out of record buffer [0, {})",
            doc_id, len
        )));
    }
    Ok(())
}

/// Records kept in a `Vec`.
#[derive(Default)]
pub struct HeapRecordBuffer {
    records: Vec<Record>,
}

impl HeapRecordBuffer {
    pub fn new() -> HeapRecordBuffer {
        HeapRecordBuffer::default()
    }

    pub fn with_capacity(capacity: usize) -> HeapRecordBuffer {
        HeapRecordBuffer {
            records: Vec::with_capacity(capacity),
        }
    }
}

impl RecordBuffer for HeapRecordBuffer {
    fn len(&self) -> usize {
        self.records.len()
    }

    fn record(&self, doc_id: usize) -> Result<Cow<'_, Record>> {
        check_doc_id(doc_id, self.records.len())?;
        Ok(Cow::Borrowed(&self.records[doc_id]))
    }

    fn dimension(&self, doc_id: usize, dimension_id: usize) -> Result<i32> {
        check_doc_id(doc_id, self.records.len())?;
        match self.records[doc_id].dimensions.get(dimension_id) {
            Some(v) => Ok(*v),
            None => bail!(IllegalArgument(format!(
                "dimension {} out of record with {} dimensions",
                dimension_id,
                self.records[doc_id].dimensions.len()
            ))),
        }
    }

    fn metric(&self, doc_id: usize, metric_id: usize) -> Result<Cow<'_, AggregatedValue>> {
        check_doc_id(doc_id, self.records.len())?;
        match self.records[doc_id].metrics.get(metric_id) {
            Some(v) => Ok(Cow::Borrowed(v)),
            None => bail!(IllegalArgument(format!(
                "metric {} out of record with {} metrics",
                metric_id,
                self.records[doc_id].metrics.len()
            ))),
        }
    }

    fn push(&mut self, record: Record) -> Result<()> {
        self.records.push(record);
        Ok(())
    }
}
