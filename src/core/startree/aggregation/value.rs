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

use std::fmt;

use bigdecimal::BigDecimal;

use crate::core::startree::aggregation::hll::HyperLogLog;
use crate::core::startree::aggregation::tdigest::TDigest;

/// Internal accumulator of an aggregation function.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregatedValue {
    Long(i64),
    Double(f64),
    Decimal(BigDecimal),
    Hll(HyperLogLog),
    TDigest(TDigest),
}

impl AggregatedValue {
    pub fn kind(&self) -> &'static str {
        match self {
            AggregatedValue::Long(_) => "long",
            AggregatedValue::Double(_) => "double",
            AggregatedValue::Decimal(_) => "decimal",
            AggregatedValue::Hll(_) => "hll",
            AggregatedValue::TDigest(_) => "tdigest",
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            AggregatedValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            AggregatedValue::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for AggregatedValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AggregatedValue::Long(v) => write!(f, "{}", v),
            AggregatedValue::Double(v) => write!(f, "{}", v),
            AggregatedValue::Decimal(v) => write!(f, "{}", v),
            AggregatedValue::Hll(v) => write!(f, "hll(~{})", v.cardinality()),
            AggregatedValue::TDigest(v) => write!(f, "tdigest(n={})", v.size()),
        }
    }
}
