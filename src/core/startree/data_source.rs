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

//! Read access to the forward indexes of a loaded star-tree.

use std::sync::Arc;

use crate::core::segment::{DataType, Dictionary, RawValue};
use crate::core::startree::aggregation::{
    AggregatedValue, AggregationFunction, AggregationFunctionColumnPair,
};
use crate::core::startree::index::{DimensionIndexReader, RawIndexReader};
use crate::error::Result;

/// Dictionary ids of one dimension for every star-tree record.
///
/// Records aggregated over the dimension carry id 0, the tree tells them
/// apart from real values.
pub struct DimensionDataSource {
    name: String,
    dimension_id: usize,
    reader: DimensionIndexReader,
    dictionary: Option<Arc<dyn Dictionary>>,
}

impl DimensionDataSource {
    pub fn new(
        name: &str,
        dimension_id: usize,
        reader: DimensionIndexReader,
        dictionary: Option<Arc<dyn Dictionary>>,
    ) -> DimensionDataSource {
        DimensionDataSource {
            name: name.to_string(),
            dimension_id,
            reader,
            dictionary,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dimension_id(&self) -> usize {
        self.dimension_id
    }

    pub fn num_docs(&self) -> usize {
        self.reader.num_docs()
    }

    pub fn bits_per_value(&self) -> i32 {
        self.reader.bits_per_value()
    }

    pub fn dictionary_id(&self, doc_id: usize) -> Result<i32> {
        self.reader.get(doc_id)
    }

    /// The segment's dictionary, when the loader was given the segment.
    pub fn dictionary(&self) -> Option<&Arc<dyn Dictionary>> {
        self.dictionary.as_ref()
    }

    pub fn value(&self, doc_id: usize) -> Result<Option<RawValue>> {
        match self.dictionary {
            Some(ref dictionary) => dictionary.value_at(self.reader.get(doc_id)?).map(Some),
            None => Ok(None),
        }
    }
}

/// Pre-aggregated values of one aggregation pair.
pub struct MetricDataSource {
    pair: AggregationFunctionColumnPair,
    function: AggregationFunction,
    reader: RawIndexReader,
}

impl MetricDataSource {
    pub fn new(
        pair: AggregationFunctionColumnPair,
        function: AggregationFunction,
        reader: RawIndexReader,
    ) -> MetricDataSource {
        MetricDataSource {
            pair,
            function,
            reader,
        }
    }

    pub fn pair(&self) -> &AggregationFunctionColumnPair {
        &self.pair
    }

    pub fn function(&self) -> &AggregationFunction {
        &self.function
    }

    /// `<functionType>__<column>`.
    pub fn column_name(&self) -> String {
        self.pair.to_column_name()
    }

    pub fn data_type(&self) -> DataType {
        self.reader.data_type()
    }

    pub fn num_docs(&self) -> usize {
        self.reader.num_docs()
    }

    pub fn value(&self, doc_id: usize) -> Result<AggregatedValue> {
        match self.reader.data_type() {
            DataType::Long => Ok(AggregatedValue::Long(self.reader.get_long(doc_id)?)),
            DataType::Double => Ok(AggregatedValue::Double(self.reader.get_double(doc_id)?)),
            _ => self.function.deserialize(&self.reader.get(doc_id)?),
        }
    }

    /// See `AggregationFunction::extract_final_result`.
    pub fn final_value(&self, doc_id: usize, argument: Option<f64>) -> Result<f64> {
        self.function
            .extract_final_result(&self.value(doc_id)?, argument)
    }
}

#[cfg(test)]
mod tests {
    extern crate tempfile;

    use super::*;
    use crate::core::segment::SortedDictionary;
    use crate::core::startree::aggregation::hll::HyperLogLog;
    use crate::core::startree::aggregation::AggregationFunctionType;
    use crate::core::startree::index::{write_dimension_index, write_raw_index};
    use crate::core::store::{Directory, FSDirectory, IO_CONTEXT_READ};

    #[test]
    fn test_dimension_data_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = FSDirectory::new(temp_dir.path()).unwrap();
        write_dimension_index(&directory, "country.fwd", 4, 3, |doc_id| {
            Ok((doc_id % 3) as i32)
        })
        .unwrap();
        let input = directory.open_input("country.fwd", &IO_CONTEXT_READ).unwrap();
        let dictionary: Arc<dyn Dictionary> = Arc::new(SortedDictionary::new(
            DataType::String,
            vec!["IN".into(), "CA".into(), "CH".into()],
        ));

        let source = DimensionDataSource::new(
            "Country",
            1,
            DimensionIndexReader::open(input.as_ref()).unwrap(),
            Some(dictionary),
        );
        assert_eq!(source.name(), "Country");
        assert_eq!(source.dimension_id(), 1);
        assert_eq!(source.num_docs(), 4);
        assert_eq!(source.dictionary_id(3).unwrap(), 0);
        assert_eq!(source.value(2).unwrap(), Some(RawValue::from("IN")));
        assert!(source.dictionary_id(4).is_err());

        let bare = DimensionDataSource::new(
            "Country",
            1,
            DimensionIndexReader::open(input.as_ref()).unwrap(),
            None,
        );
        assert_eq!(bare.value(0).unwrap(), None);
    }

    #[test]
    fn test_metric_data_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let directory = FSDirectory::new(temp_dir.path()).unwrap();
        let function = AggregationFunction::DistinctCountHll { log2m: 8 };
        let sketches: Vec<HyperLogLog> = (0..3)
            .map(|n| {
                let mut hll = HyperLogLog::new(8).unwrap();
                for i in 0..n {
                    hll.offer(&RawValue::Int(i).to_bytes());
                }
                hll
            })
            .collect();
        write_raw_index(&directory, "hll.fwd", DataType::Bytes, 3, |doc_id| {
            Ok(sketches[doc_id].serialize())
        })
        .unwrap();
        let input = directory.open_input("hll.fwd", &IO_CONTEXT_READ).unwrap();
        let pair = AggregationFunctionColumnPair::new(
            AggregationFunctionType::DistinctCountHll,
            "Name",
        );

        let source = MetricDataSource::new(
            pair,
            function,
            RawIndexReader::open(input.as_ref()).unwrap(),
        );
        assert_eq!(source.column_name(), "distinctCountHLL__Name");
        assert_eq!(source.data_type(), DataType::Bytes);
        assert_eq!(source.num_docs(), 3);
        assert_eq!(
            source.value(1).unwrap(),
            AggregatedValue::Hll(sketches[1].clone())
        );
        assert_eq!(source.final_value(0, None).unwrap(), 0.0);
        let estimate = source.final_value(2, None).unwrap();
        assert!(estimate >= 1.0 && estimate <= 2.0);
    }
}
