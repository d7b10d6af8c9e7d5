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

use std::collections::HashMap;
use std::sync::Arc;

use crate::core::segment::{ColumnReader, DataType, Dictionary, RawValue, Segment};
use crate::error::ErrorKind::{IllegalArgument, UnexpectedDataType};
use crate::error::Result;

/// Sorted, de-duplicated values of one column.
pub struct SortedDictionary {
    data_type: DataType,
    values: Vec<RawValue>,
}

impl SortedDictionary {
    pub fn new(data_type: DataType, mut values: Vec<RawValue>) -> SortedDictionary {
        values.sort_by(|a, b| a.compare(b));
        values.dedup_by(|a, b| a.compare(b) == ::std::cmp::Ordering::Equal);
        SortedDictionary { data_type, values }
    }
}

impl Dictionary for SortedDictionary {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn cardinality(&self) -> usize {
        self.values.len()
    }

    fn value_at(&self, dict_id: i32) -> Result<RawValue> {
        if dict_id < 0 || dict_id as usize >= self.values.len() {
            bail!(IllegalArgument(format!(
                "dictionary id {} out of [0, {})",
                dict_id,
                self.values.len()
            )));
        }
        Ok(self.values[dict_id as usize].clone())
    }

    fn index_of(&self, value: &RawValue) -> Option<i32> {
        self.values
            .binary_search_by(|v| v.compare(value))
            .ok()
            .map(|i| i as i32)
    }
}

struct MemoryColumn {
    data_type: DataType,
    dictionary: Arc<SortedDictionary>,
    dict_ids: Vec<i32>,
}

impl ColumnReader for MemoryColumn {
    fn dictionary_id_at(&self, doc_id: usize) -> Result<i32> {
        match self.dict_ids.get(doc_id) {
            Some(id) => Ok(*id),
            None => bail!(IllegalArgument(format!(
                "doc id {} out of [0, {})",
                doc_id,
                self.dict_ids.len()
            ))),
        }
    }

    fn raw_value_at(&self, doc_id: usize) -> Result<RawValue> {
        let dict_id = self.dictionary_id_at(doc_id)?;
        self.dictionary.value_at(dict_id)
    }
}

/// A fully dictionary-encoded segment held in memory.
pub struct MemorySegment {
    num_docs: usize,
    columns: HashMap<String, MemoryColumn>,
}

impl MemorySegment {
    fn column(&self, column: &str) -> Result<&MemoryColumn> {
        match self.columns.get(column) {
            Some(c) => Ok(c),
            None => bail!(IllegalArgument(format!("unknown column: {}", column))),
        }
    }
}

impl Segment for MemorySegment {
    fn num_docs(&self) -> usize {
        self.num_docs
    }

    fn data_type(&self, column: &str) -> Result<DataType> {
        Ok(self.column(column)?.data_type)
    }

    fn dictionary(&self, column: &str) -> Result<Arc<dyn Dictionary>> {
        let dictionary: Arc<dyn Dictionary> = self.column(column)?.dictionary.clone();
        Ok(dictionary)
    }

    fn column_reader(&self, column: &str) -> Result<Box<dyn ColumnReader + '_>> {
        Ok(Box::new(ColumnRef(self.column(column)?)))
    }
}

struct ColumnRef<'a>(&'a MemoryColumn);

impl<'a> ColumnReader for ColumnRef<'a> {
    fn dictionary_id_at(&self, doc_id: usize) -> Result<i32> {
        self.0.dictionary_id_at(doc_id)
    }

    fn raw_value_at(&self, doc_id: usize) -> Result<RawValue> {
        self.0.raw_value_at(doc_id)
    }
}

/// Collects rows, then dictionary-encodes every column.
pub struct MemorySegmentBuilder {
    columns: Vec<(String, DataType)>,
    rows: Vec<Vec<RawValue>>,
}

impl MemorySegmentBuilder {
    pub fn new(columns: &[(&str, DataType)]) -> MemorySegmentBuilder {
        MemorySegmentBuilder {
            columns: columns
                .iter()
                .map(|(name, data_type)| (name.to_string(), *data_type))
                .collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_row(&mut self, row: Vec<RawValue>) -> Result<()> {
        if row.len() != self.columns.len() {
            bail!(IllegalArgument(format!(
                "row has {} values, expected {}",
                row.len(),
                self.columns.len()
            )));
        }
        for (value, (name, data_type)) in row.iter().zip(self.columns.iter()) {
            if value.data_type() != *data_type {
                bail!(UnexpectedDataType(format!(
                    "column {} is {}, got {}",
                    name,
                    data_type,
                    value.data_type()
                )));
            }
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn build(self) -> Result<MemorySegment> {
        let num_docs = self.rows.len();
        let mut columns = HashMap::with_capacity(self.columns.len());
        for (i, (name, data_type)) in self.columns.into_iter().enumerate() {
            let values: Vec<RawValue> = self.rows.iter().map(|r| r[i].clone()).collect();
            let dictionary = Arc::new(SortedDictionary::new(data_type, values.clone()));
            let mut dict_ids = Vec::with_capacity(num_docs);
            for value in &values {
                match dictionary.index_of(value) {
                    Some(id) => dict_ids.push(id),
                    None => bail!(IllegalArgument(format!(
                        "value {} missing from dictionary of {}",
                        value, name
                    ))),
                }
            }
            columns.insert(
                name,
                MemoryColumn {
                    data_type,
                    dictionary,
                    dict_ids,
                },
            );
        }
        debug!(
            "built in-memory segment with {} docs, {} columns",
            num_docs,
            columns.len()
        );
        Ok(MemorySegment { num_docs, columns })
    }
}
