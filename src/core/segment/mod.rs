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

//! The read-only view of an immutable columnar segment that star-trees are built over.
//!
//! The columnar format itself lives outside this crate; builders and loaders only
//! talk to it through `Segment`, `Dictionary`, `ColumnReader` and `MetadataStore`.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ErrorKind::{CorruptIndex, UnexpectedDataType};
use crate::error::Result;

mod memory;

pub use self::memory::*;

mod properties;

pub use self::properties::*;

/// Stored type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    Int,
    Long,
    Float,
    Double,
    String,
    Bytes,
}

impl DataType {
    pub fn is_numeric(self) -> bool {
        match self {
            DataType::Int | DataType::Long | DataType::Float | DataType::Double => true,
            DataType::String | DataType::Bytes => false,
        }
    }

    /// Width of one stored value, `None` for variable length types.
    pub fn fixed_size(self) -> Option<usize> {
        match self {
            DataType::Int | DataType::Float => Some(4),
            DataType::Long | DataType::Double => Some(8),
            DataType::String | DataType::Bytes => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            DataType::Int => 0,
            DataType::Long => 1,
            DataType::Float => 2,
            DataType::Double => 3,
            DataType::String => 4,
            DataType::Bytes => 5,
        }
    }

    pub fn from_byte(b: u8) -> Result<DataType> {
        Ok(match b {
            0 => DataType::Int,
            1 => DataType::Long,
            2 => DataType::Float,
            3 => DataType::Double,
            4 => DataType::String,
            5 => DataType::Bytes,
            _ => bail!(CorruptIndex(format!("unknown data type id: {}", b))),
        })
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            DataType::Int => "INT",
            DataType::Long => "LONG",
            DataType::Float => "FLOAT",
            DataType::Double => "DOUBLE",
            DataType::String => "STRING",
            DataType::Bytes => "BYTES",
        };
        f.write_str(name)
    }
}

/// A single column value as stored in the segment.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Bytes(Vec<u8>),
}

impl RawValue {
    pub fn data_type(&self) -> DataType {
        match self {
            RawValue::Int(_) => DataType::Int,
            RawValue::Long(_) => DataType::Long,
            RawValue::Float(_) => DataType::Float,
            RawValue::Double(_) => DataType::Double,
            RawValue::String(_) => DataType::String,
            RawValue::Bytes(_) => DataType::Bytes,
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            RawValue::Int(v) => Ok(f64::from(*v)),
            RawValue::Long(v) => Ok(*v as f64),
            RawValue::Float(v) => Ok(f64::from(*v)),
            RawValue::Double(v) => Ok(*v),
            _ => bail!(UnexpectedDataType(format!(
                "expected a numeric value, got {}",
                self.data_type()
            ))),
        }
    }

    /// Stable byte representation, used when a value has to be hashed.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            RawValue::Int(v) => v.to_be_bytes().to_vec(),
            RawValue::Long(v) => v.to_be_bytes().to_vec(),
            RawValue::Float(v) => v.to_bits().to_be_bytes().to_vec(),
            RawValue::Double(v) => v.to_bits().to_be_bytes().to_vec(),
            RawValue::String(v) => v.as_bytes().to_vec(),
            RawValue::Bytes(v) => v.clone(),
        }
    }

    /// Total order within one data type. Values of different types compare by type id.
    pub fn compare(&self, other: &RawValue) -> Ordering {
        match (self, other) {
            (RawValue::Int(a), RawValue::Int(b)) => a.cmp(b),
            (RawValue::Long(a), RawValue::Long(b)) => a.cmp(b),
            (RawValue::Float(a), RawValue::Float(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
            }
            (RawValue::Double(a), RawValue::Double(b)) => {
                a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
            }
            (RawValue::String(a), RawValue::String(b)) => a.cmp(b),
            (RawValue::Bytes(a), RawValue::Bytes(b)) => a.cmp(b),
            _ => self.data_type().as_byte().cmp(&other.data_type().as_byte()),
        }
    }
}

impl fmt::Display for RawValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RawValue::Int(v) => write!(f, "{}", v),
            RawValue::Long(v) => write!(f, "{}", v),
            RawValue::Float(v) => write!(f, "{}", v),
            RawValue::Double(v) => write!(f, "{}", v),
            RawValue::String(v) => f.write_str(v),
            RawValue::Bytes(v) => {
                for b in v {
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

impl<'a> From<&'a str> for RawValue {
    fn from(v: &'a str) -> Self {
        RawValue::String(v.to_string())
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v)
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Long(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Double(v)
    }
}

/// Dictionary encoding of one column: dictionary ids are `0..cardinality`.
pub trait Dictionary: Send + Sync {
    fn data_type(&self) -> DataType;
    fn cardinality(&self) -> usize;
    fn value_at(&self, dict_id: i32) -> Result<RawValue>;
    fn index_of(&self, value: &RawValue) -> Option<i32>;
}

/// Per-document access to a single-value column.
pub trait ColumnReader {
    fn dictionary_id_at(&self, doc_id: usize) -> Result<i32>;
    fn raw_value_at(&self, doc_id: usize) -> Result<RawValue>;
}

/// An immutable, fully built segment.
pub trait Segment {
    /// Number of raw (not pre-aggregated) documents.
    fn num_docs(&self) -> usize;
    fn data_type(&self, column: &str) -> Result<DataType>;
    fn dictionary(&self, column: &str) -> Result<Arc<dyn Dictionary>>;
    fn column_reader(&self, column: &str) -> Result<Box<dyn ColumnReader + '_>>;
}

/// String key-value metadata persisted next to a segment.
pub trait MetadataStore {
    fn get(&self, key: &str) -> Option<&str>;
    fn set(&mut self, key: &str, value: String);
    /// Makes every `set` so far durable.
    fn save(&mut self) -> Result<()>;
}

impl MetadataStore for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(|v| v.as_str())
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }

    fn save(&mut self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_value_order_and_conversion() {
        assert_eq!(RawValue::Int(3).compare(&RawValue::Int(10)), Ordering::Less);
        assert_eq!(
            RawValue::from("IN").compare(&RawValue::from("CH")),
            Ordering::Greater
        );
        assert_eq!(RawValue::Long(7).as_f64().unwrap(), 7.0);
        assert!(RawValue::from("x").as_f64().is_err());
        assert_eq!(RawValue::Bytes(vec![1, 255]).to_string(), "01ff");
    }

    #[test]
    fn test_data_type_byte_round_trip() {
        for t in &[
            DataType::Int,
            DataType::Long,
            DataType::Float,
            DataType::Double,
            DataType::String,
            DataType::Bytes,
        ] {
            assert_eq!(DataType::from_byte(t.as_byte()).unwrap(), *t);
        }
        assert!(DataType::from_byte(17).is_err());
    }
}
