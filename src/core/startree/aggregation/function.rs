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

use std::str::FromStr;

use bigdecimal::BigDecimal;
use num_traits::{ToPrimitive, Zero};

use crate::core::segment::{DataType, RawValue};
use crate::core::startree::aggregation::decimal::{
    deserialize_decimal, round_to_precision, round_to_scale, serialize_decimal,
};
use crate::core::startree::aggregation::hll::{self, HyperLogLog};
use crate::core::startree::aggregation::tdigest::{self, TDigest};
use crate::core::startree::aggregation::{AggregatedValue, AggregationFunctionType};
use crate::error::ErrorKind::{
    CorruptIndex, IllegalArgument, IllegalState, InvalidConfig, UnexpectedDataType,
};
use crate::error::Result;

/// An aggregation function together with its configuration.
///
/// `aggregate` is associative and commutative for every variant, so records
/// may be folded in any order and grouping while the tree is built.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationFunction {
    Count,
    Min,
    Max,
    Sum,
    SumPrecision {
        precision: Option<u64>,
        scale: Option<i64>,
    },
    DistinctCountHll {
        log2m: u8,
    },
    PercentileTDigest {
        compression: f64,
    },
}

fn parse_argument<T: FromStr>(
    function_type: AggregationFunctionType,
    name: &str,
    value: &str,
) -> Result<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Ok(v),
        Err(_) => bail!(InvalidConfig(format!(
            "malformed {} argument of {}: '{}'",
            name, function_type, value
        ))),
    }
}

impl AggregationFunction {
    /// Builds the function from its type and the arguments after the column name.
    pub fn create(
        function_type: AggregationFunctionType,
        arguments: &[String],
    ) -> Result<AggregationFunction> {
        let max_arguments = match function_type {
            AggregationFunctionType::SumPrecision => 2,
            AggregationFunctionType::DistinctCountHll
            | AggregationFunctionType::PercentileTDigest => 1,
            _ => 0,
        };
        if arguments.len() > max_arguments {
            bail!(InvalidConfig(format!(
                "{} takes at most {} extra arguments, got {:?}",
                function_type, max_arguments, arguments
            )));
        }

        let function = match function_type {
            AggregationFunctionType::Count => AggregationFunction::Count,
            AggregationFunctionType::Min => AggregationFunction::Min,
            AggregationFunctionType::Max => AggregationFunction::Max,
            AggregationFunctionType::Sum => AggregationFunction::Sum,
            AggregationFunctionType::SumPrecision => {
                let precision = match arguments.get(0) {
                    Some(p) => {
                        let p: u64 = parse_argument(function_type, "precision", p)?;
                        if p == 0 {
                            bail!(InvalidConfig(
                                "sumPrecision precision must be positive".into()
                            ));
                        }
                        Some(p)
                    }
                    None => None,
                };
                let scale = match arguments.get(1) {
                    Some(s) => Some(parse_argument(function_type, "scale", s)?),
                    None => None,
                };
                AggregationFunction::SumPrecision { precision, scale }
            }
            AggregationFunctionType::DistinctCountHll => {
                let log2m = match arguments.get(0) {
                    Some(l) => parse_argument(function_type, "log2m", l)?,
                    None => hll::DEFAULT_LOG2M,
                };
                HyperLogLog::new(log2m)?;
                AggregationFunction::DistinctCountHll { log2m }
            }
            AggregationFunctionType::PercentileTDigest => {
                let compression = match arguments.get(0) {
                    Some(c) => parse_argument(function_type, "compression", c)?,
                    None => tdigest::DEFAULT_COMPRESSION,
                };
                TDigest::new(compression)?;
                AggregationFunction::PercentileTDigest { compression }
            }
        };
        Ok(function)
    }

    pub fn function_type(&self) -> AggregationFunctionType {
        match self {
            AggregationFunction::Count => AggregationFunctionType::Count,
            AggregationFunction::Min => AggregationFunctionType::Min,
            AggregationFunction::Max => AggregationFunctionType::Max,
            AggregationFunction::Sum => AggregationFunctionType::Sum,
            AggregationFunction::SumPrecision { .. } => AggregationFunctionType::SumPrecision,
            AggregationFunction::DistinctCountHll { .. } => {
                AggregationFunctionType::DistinctCountHll
            }
            AggregationFunction::PercentileTDigest { .. } => {
                AggregationFunctionType::PercentileTDigest
            }
        }
    }

    /// COUNT never reads its column.
    pub fn reads_column(&self) -> bool {
        *self != AggregationFunction::Count
    }

    /// Stored type of the aggregate forward index.
    pub fn result_data_type(&self) -> DataType {
        match self {
            AggregationFunction::Count => DataType::Long,
            AggregationFunction::Min | AggregationFunction::Max | AggregationFunction::Sum => {
                DataType::Double
            }
            _ => DataType::Bytes,
        }
    }

    /// Upper bound of a stored value; an estimate for t-digests and unbounded decimals.
    pub fn result_max_byte_size(&self) -> usize {
        match self {
            AggregationFunction::Count
            | AggregationFunction::Min
            | AggregationFunction::Max
            | AggregationFunction::Sum => 8,
            AggregationFunction::SumPrecision { precision, .. } => match precision {
                Some(p) => 5 + (*p as f64 * ::std::f64::consts::LOG2_10 / 8.0).ceil() as usize,
                None => 20,
            },
            AggregationFunction::DistinctCountHll { log2m } => {
                HyperLogLog::serialized_size(*log2m)
            }
            AggregationFunction::PercentileTDigest { compression } => {
                28 + 16 * (2.0 * compression).ceil() as usize
            }
        }
    }

    /// Value of an aggregate that has seen no data.
    pub fn default_value(&self) -> Result<AggregatedValue> {
        Ok(match self {
            AggregationFunction::Count => AggregatedValue::Long(0),
            AggregationFunction::Sum => AggregatedValue::Double(0.0),
            AggregationFunction::Min => AggregatedValue::Double(::std::f64::INFINITY),
            AggregationFunction::Max => AggregatedValue::Double(::std::f64::NEG_INFINITY),
            AggregationFunction::SumPrecision { scale, .. } => {
                let zero = BigDecimal::zero();
                AggregatedValue::Decimal(match scale {
                    Some(s) => round_to_scale(&zero, *s),
                    None => zero,
                })
            }
            AggregationFunction::DistinctCountHll { log2m } => {
                AggregatedValue::Hll(HyperLogLog::new(*log2m)?)
            }
            AggregationFunction::PercentileTDigest { compression } => {
                AggregatedValue::TDigest(TDigest::new(*compression)?)
            }
        })
    }

    fn round_decimal(&self, value: BigDecimal) -> BigDecimal {
        match self {
            AggregationFunction::SumPrecision { precision, scale } => {
                let value = match precision {
                    Some(p) => round_to_precision(value, *p),
                    None => value,
                };
                match scale {
                    Some(s) => round_to_scale(&value, *s),
                    None => value,
                }
            }
            _ => value,
        }
    }

    /// Maps a raw column value to the internal accumulator type.
    pub fn convert(&self, raw: &RawValue) -> Result<AggregatedValue> {
        Ok(match self {
            AggregationFunction::Count => AggregatedValue::Long(1),
            AggregationFunction::Min | AggregationFunction::Max | AggregationFunction::Sum => {
                AggregatedValue::Double(raw.as_f64()?)
            }
            AggregationFunction::SumPrecision { .. } => {
                let value = match raw {
                    RawValue::Int(v) => BigDecimal::from(i64::from(*v)),
                    RawValue::Long(v) => BigDecimal::from(*v),
                    RawValue::Float(v) => BigDecimal::from_str(&v.to_string())?,
                    RawValue::Double(v) => BigDecimal::from_str(&v.to_string())?,
                    RawValue::String(v) => BigDecimal::from_str(v.trim())?,
                    RawValue::Bytes(v) => deserialize_decimal(v)?,
                };
                AggregatedValue::Decimal(self.round_decimal(value))
            }
            AggregationFunction::DistinctCountHll { log2m } => {
                let sketch = match raw {
                    // already a sketch
                    RawValue::Bytes(bytes) => HyperLogLog::deserialize(bytes)?,
                    other => {
                        let mut sketch = HyperLogLog::new(*log2m)?;
                        sketch.offer(&other.to_bytes());
                        sketch
                    }
                };
                AggregatedValue::Hll(sketch)
            }
            AggregationFunction::PercentileTDigest { compression } => {
                let digest = match raw {
                    RawValue::Bytes(bytes) => TDigest::deserialize(bytes)?,
                    other => {
                        let mut digest = TDigest::new(*compression)?;
                        digest.add(other.as_f64()?);
                        digest
                    }
                };
                AggregatedValue::TDigest(digest)
            }
        })
    }

    /// Merges `right` into `left`.
    pub fn aggregate(
        &self,
        left: AggregatedValue,
        right: &AggregatedValue,
    ) -> Result<AggregatedValue> {
        let merged = match (self, left, right) {
            (AggregationFunction::Count, AggregatedValue::Long(a), AggregatedValue::Long(b)) => {
                AggregatedValue::Long(a + *b)
            }
            (AggregationFunction::Sum, AggregatedValue::Double(a), AggregatedValue::Double(b)) => {
                AggregatedValue::Double(a + *b)
            }
            (AggregationFunction::Min, AggregatedValue::Double(a), AggregatedValue::Double(b)) => {
                AggregatedValue::Double(a.min(*b))
            }
            (AggregationFunction::Max, AggregatedValue::Double(a), AggregatedValue::Double(b)) => {
                AggregatedValue::Double(a.max(*b))
            }
            (
                AggregationFunction::SumPrecision { .. },
                AggregatedValue::Decimal(a),
                AggregatedValue::Decimal(b),
            ) => AggregatedValue::Decimal(self.round_decimal(a + b)),
            (
                AggregationFunction::DistinctCountHll { .. },
                AggregatedValue::Hll(mut a),
                AggregatedValue::Hll(b),
            ) => {
                a.merge(b)?;
                AggregatedValue::Hll(a)
            }
            (
                AggregationFunction::PercentileTDigest { .. },
                AggregatedValue::TDigest(mut a),
                AggregatedValue::TDigest(b),
            ) => {
                a.merge(b);
                AggregatedValue::TDigest(a)
            }
            (function, left, right) => bail!(UnexpectedDataType(format!(
                "{} cannot aggregate {} with {}",
                function.function_type(),
                left.kind(),
                right.kind()
            ))),
        };
        Ok(merged)
    }

    pub fn serialize(&self, value: &AggregatedValue) -> Result<Vec<u8>> {
        Ok(match value {
            AggregatedValue::Long(v) => v.to_be_bytes().to_vec(),
            AggregatedValue::Double(v) => v.to_bits().to_be_bytes().to_vec(),
            AggregatedValue::Decimal(v) => serialize_decimal(v)?,
            AggregatedValue::Hll(v) => v.serialize(),
            AggregatedValue::TDigest(v) => v.serialize()?,
        })
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<AggregatedValue> {
        let fixed = |bytes: &[u8]| -> Result<[u8; 8]> {
            if bytes.len() != 8 {
                bail!(CorruptIndex(format!(
                    "expected 8 bytes for {}, got {}",
                    self.function_type(),
                    bytes.len()
                )));
            }
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Ok(buf)
        };
        Ok(match self {
            AggregationFunction::Count => AggregatedValue::Long(i64::from_be_bytes(fixed(bytes)?)),
            AggregationFunction::Min | AggregationFunction::Max | AggregationFunction::Sum => {
                AggregatedValue::Double(f64::from_bits(u64::from_be_bytes(fixed(bytes)?)))
            }
            AggregationFunction::SumPrecision { .. } => {
                AggregatedValue::Decimal(deserialize_decimal(bytes)?)
            }
            AggregationFunction::DistinctCountHll { .. } => {
                AggregatedValue::Hll(HyperLogLog::deserialize(bytes)?)
            }
            AggregationFunction::PercentileTDigest { .. } => {
                AggregatedValue::TDigest(TDigest::deserialize(bytes)?)
            }
        })
    }

    /// Final query result of an aggregate. `argument` is the percentile (0 to 100)
    /// for t-digests and ignored otherwise.
    pub fn extract_final_result(
        &self,
        value: &AggregatedValue,
        argument: Option<f64>,
    ) -> Result<f64> {
        Ok(match (self, value) {
            (AggregationFunction::Count, AggregatedValue::Long(v)) => *v as f64,
            (_, AggregatedValue::Double(v)) => *v,
            (AggregationFunction::DistinctCountHll { .. }, AggregatedValue::Hll(v)) => {
                v.cardinality() as f64
            }
            (AggregationFunction::PercentileTDigest { .. }, AggregatedValue::TDigest(v)) => {
                let percentile = match argument {
                    Some(p) if p >= 0.0 && p <= 100.0 => p,
                    other => bail!(IllegalArgument(format!(
                        "percentile must be within [0, 100], got {:?}",
                        other
                    ))),
                };
                v.quantile(percentile / 100.0)
            }
            (AggregationFunction::SumPrecision { .. }, AggregatedValue::Decimal(v)) => {
                match self.round_decimal(v.clone()).to_f64() {
                    Some(f) => f,
                    None => bail!(IllegalState(format!("decimal {} overflows f64", v))),
                }
            }
            (function, value) => bail!(UnexpectedDataType(format!(
                "{} has no final result for {}",
                function.function_type(),
                value.kind()
            ))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::startree::aggregation::AggregationFunctionColumnPair;

    fn all_functions() -> Vec<AggregationFunction> {
        vec![
            AggregationFunction::Count,
            AggregationFunction::Min,
            AggregationFunction::Max,
            AggregationFunction::Sum,
            AggregationFunction::create(
                AggregationFunctionType::SumPrecision,
                &["30".to_string(), "3".to_string()],
            )
            .unwrap(),
            AggregationFunction::create(AggregationFunctionType::DistinctCountHll, &[]).unwrap(),
            AggregationFunction::create(AggregationFunctionType::PercentileTDigest, &[]).unwrap(),
        ]
    }

    fn fold(function: &AggregationFunction, values: &[i32]) -> AggregatedValue {
        let mut acc: Option<AggregatedValue> = None;
        for v in values {
            let converted = function.convert(&RawValue::Int(*v)).unwrap();
            acc = Some(match acc {
                None => converted,
                Some(a) => function.aggregate(a, &converted).unwrap(),
            });
        }
        acc.unwrap()
    }

    #[test]
    fn test_create_rejects_malformed_arguments() {
        let t = AggregationFunctionType::SumPrecision;
        assert!(AggregationFunction::create(t, &["x".to_string()]).is_err());
        assert!(AggregationFunction::create(t, &["0".to_string()]).is_err());
        assert!(AggregationFunction::create(t, &["10".to_string(), "2.5".to_string()]).is_err());
        assert!(AggregationFunction::create(
            t,
            &["10".to_string(), "2".to_string(), "1".to_string()]
        )
        .is_err());
        assert!(AggregationFunction::create(AggregationFunctionType::Sum, &["1".to_string()])
            .is_err());
        assert!(AggregationFunction::create(
            AggregationFunctionType::DistinctCountHll,
            &["40".to_string()]
        )
        .is_err());
        assert_eq!(
            AggregationFunction::create(t, &["10".to_string(), "2".to_string()]).unwrap(),
            AggregationFunction::SumPrecision {
                precision: Some(10),
                scale: Some(2)
            }
        );
    }

    #[test]
    fn test_count_ignores_input() {
        let count = AggregationFunction::Count;
        assert_eq!(
            count.convert(&RawValue::from("anything")).unwrap(),
            AggregatedValue::Long(1)
        );
        assert_eq!(fold(&count, &[5, 9, 100]), AggregatedValue::Long(3));
        assert!(!count.reads_column());
    }

    #[test]
    fn test_numeric_functions() {
        let values = [2, 2, 3, 8, 8, 5];
        assert_eq!(fold(&AggregationFunction::Sum, &values), AggregatedValue::Double(28.0));
        assert_eq!(fold(&AggregationFunction::Min, &values), AggregatedValue::Double(2.0));
        assert_eq!(fold(&AggregationFunction::Max, &values), AggregatedValue::Double(8.0));
        assert!(AggregationFunction::Sum
            .convert(&RawValue::from("CH"))
            .is_err());
    }

    #[test]
    fn test_associative_and_commutative() {
        for function in all_functions() {
            let a = fold(&function, &[1, 2, 3]);
            let b = fold(&function, &[40, 50]);
            let c = fold(&function, &[600, 2, 7]);

            let ab_c = function
                .aggregate(function.aggregate(a.clone(), &b).unwrap(), &c)
                .unwrap();
            let a_bc = function
                .aggregate(a.clone(), &function.aggregate(b.clone(), &c).unwrap())
                .unwrap();
            let ba = function.aggregate(b.clone(), &a).unwrap();
            let ab = function.aggregate(a.clone(), &b).unwrap();

            let final_of = |v: &AggregatedValue| {
                function.extract_final_result(v, Some(50.0)).unwrap()
            };
            assert!((final_of(&ab_c) - final_of(&a_bc)).abs() < 1e-9, "{:?}", function);
            assert!((final_of(&ab) - final_of(&ba)).abs() < 1e-9, "{:?}", function);
            match function {
                AggregationFunction::PercentileTDigest { .. } => {}
                _ => {
                    assert_eq!(ab_c, a_bc);
                    assert_eq!(ab, ba);
                }
            }
        }
    }

    #[test]
    fn test_serialize_every_function() {
        for function in all_functions() {
            let value = fold(&function, &[3, 1, 4, 1, 5]);
            let bytes = function.serialize(&value).unwrap();
            if let Some(size) = function.result_data_type().fixed_size() {
                assert_eq!(bytes.len(), size);
            }
            assert_eq!(function.deserialize(&bytes).unwrap(), value);
        }
        assert!(AggregationFunction::Count.deserialize(&[1, 2]).is_err());
    }

    #[test]
    fn test_sum_precision_rounds_half_even() {
        let pair = AggregationFunctionColumnPair::new(AggregationFunctionType::SumPrecision, "p")
            .with_arguments(vec!["20".to_string(), "1".to_string()]);
        let function = pair.function().unwrap();
        let a = function.convert(&RawValue::from("1.25")).unwrap();
        assert_eq!(
            a,
            AggregatedValue::Decimal(BigDecimal::from_str("1.2").unwrap())
        );
        let b = function.convert(&RawValue::Double(0.25)).unwrap();
        let sum = function.aggregate(a, &b).unwrap();
        assert_eq!(
            sum,
            AggregatedValue::Decimal(BigDecimal::from_str("1.4").unwrap())
        );
        assert_eq!(
            function.default_value().unwrap(),
            AggregatedValue::Decimal(BigDecimal::from_str("0.0").unwrap())
        );
        assert!((function.extract_final_result(&sum, None).unwrap() - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_sketch_functions() {
        let hll = AggregationFunction::create(AggregationFunctionType::DistinctCountHll, &[])
            .unwrap();
        let value = fold(&hll, &[1, 2, 3, 3, 2, 1, 4]);
        let estimate = hll.extract_final_result(&value, None).unwrap();
        assert!(estimate >= 3.0 && estimate <= 4.0);
        let other = AggregationFunction::DistinctCountHll { log2m: 10 }
            .convert(&RawValue::Int(1))
            .unwrap();
        assert!(hll.aggregate(value.clone(), &other).is_err());
        assert!(hll.aggregate(value, &AggregatedValue::Long(1)).is_err());

        let digest = AggregationFunction::create(AggregationFunctionType::PercentileTDigest, &[])
            .unwrap();
        let value = fold(&digest, &(1..=101).collect::<Vec<i32>>());
        let median = digest.extract_final_result(&value, Some(50.0)).unwrap();
        assert!((median - 51.0).abs() <= 1.0);
        assert!(digest.extract_final_result(&value, None).is_err());
        assert!(digest.extract_final_result(&value, Some(101.0)).is_err());

        let bytes = digest.serialize(&value).unwrap();
        assert_eq!(digest.convert(&RawValue::Bytes(bytes)).unwrap(), value);
    }
}
