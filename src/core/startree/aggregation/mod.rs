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

//! Aggregation functions a star-tree can pre-aggregate.

use std::fmt;
use std::str::FromStr;

use crate::error::ErrorKind::{InvalidConfig, UnknownAggregationFunction};
use crate::error::Result;

pub mod decimal;
pub mod hll;
pub mod tdigest;

mod function;

pub use self::function::*;

mod value;

pub use self::value::*;

/// Separator between function name, column and extra arguments in column names.
pub const COLUMN_NAME_SEPARATOR: &str = "__";

/// Pseudo column `COUNT` aggregates over.
pub const STAR_COLUMN: &str = "*";

/// Names accepted by query configurations but not pre-aggregated by star-trees yet.
const UNSUPPORTED_FUNCTION_NAMES: &[&str] = &["percentileest", "distinctcount"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationFunctionType {
    Count,
    Min,
    Max,
    Sum,
    SumPrecision,
    DistinctCountHll,
    PercentileTDigest,
}

impl AggregationFunctionType {
    pub fn name(self) -> &'static str {
        match self {
            AggregationFunctionType::Count => "count",
            AggregationFunctionType::Min => "min",
            AggregationFunctionType::Max => "max",
            AggregationFunctionType::Sum => "sum",
            AggregationFunctionType::SumPrecision => "sumPrecision",
            AggregationFunctionType::DistinctCountHll => "distinctCountHLL",
            AggregationFunctionType::PercentileTDigest => "percentileTDigest",
        }
    }

    /// Case-insensitive lookup of a function name.
    pub fn from_name(name: &str) -> Result<AggregationFunctionType> {
        let lower = name.to_ascii_lowercase();
        let function_type = match lower.as_str() {
            "count" => AggregationFunctionType::Count,
            "min" => AggregationFunctionType::Min,
            "max" => AggregationFunctionType::Max,
            "sum" => AggregationFunctionType::Sum,
            "sumprecision" => AggregationFunctionType::SumPrecision,
            "distinctcounthll" => AggregationFunctionType::DistinctCountHll,
            "percentiletdigest" => AggregationFunctionType::PercentileTDigest,
            _ if UNSUPPORTED_FUNCTION_NAMES.contains(&lower.as_str()) => {
                bail!(UnknownAggregationFunction(format!(
                    "{} (not supported by star-tree pre-aggregation)",
                    name
                )))
            }
            _ => bail!(UnknownAggregationFunction(name.to_string())),
        };
        Ok(function_type)
    }
}

impl fmt::Display for AggregationFunctionType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationFunctionType {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> Result<Self> {
        AggregationFunctionType::from_name(s)
    }
}

/// One pre-aggregated column: a function over a source column plus the
/// function's extra arguments (precision/scale, log2m, compression).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AggregationFunctionColumnPair {
    pub function_type: AggregationFunctionType,
    pub column: String,
    pub arguments: Vec<String>,
}

impl AggregationFunctionColumnPair {
    pub fn new(function_type: AggregationFunctionType, column: &str) -> Self {
        let column = if function_type == AggregationFunctionType::Count {
            STAR_COLUMN
        } else {
            column
        };
        AggregationFunctionColumnPair {
            function_type,
            column: column.to_string(),
            arguments: Vec::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Vec<String>) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn count() -> Self {
        Self::new(AggregationFunctionType::Count, STAR_COLUMN)
    }

    /// `<functionType>__<column>`, the name of the aggregate's forward index.
    pub fn to_column_name(&self) -> String {
        format!(
            "{}{}{}",
            self.function_type.name(),
            COLUMN_NAME_SEPARATOR,
            self.column
        )
    }

    /// The column name followed by `__<argument>` for every extra argument.
    pub fn to_persisted(&self) -> String {
        let mut persisted = self.to_column_name();
        for argument in &self.arguments {
            persisted.push_str(COLUMN_NAME_SEPARATOR);
            persisted.push_str(argument);
        }
        persisted
    }

    /// Parses the `to_persisted` form.
    pub fn from_persisted(persisted: &str) -> Result<Self> {
        let mut parts = persisted.split(COLUMN_NAME_SEPARATOR);
        let function_type = AggregationFunctionType::from_name(parts.next().unwrap_or(""))?;
        let column = match parts.next() {
            Some(column) if !column.is_empty() => column,
            _ => bail!(InvalidConfig(format!(
                "missing column in aggregation pair '{}'",
                persisted
            ))),
        };
        let arguments = parts.map(|s| s.to_string()).collect();
        Ok(Self::new(function_type, column).with_arguments(arguments))
    }

    /// Instantiates the function this pair names.
    pub fn function(&self) -> Result<AggregationFunction> {
        AggregationFunction::create(self.function_type, &self.arguments)
    }
}

impl fmt::Display for AggregationFunctionColumnPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_column_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_names() {
        assert_eq!(
            AggregationFunctionType::from_name("DISTINCTCOUNTHLL").unwrap(),
            AggregationFunctionType::DistinctCountHll
        );
        assert_eq!(
            "percentileTDigest".parse::<AggregationFunctionType>().unwrap(),
            AggregationFunctionType::PercentileTDigest
        );
        assert!(AggregationFunctionType::from_name("avg").is_err());
        assert!(AggregationFunctionType::from_name("percentileEst").is_err());
        assert!(AggregationFunctionType::from_name("distinctCount").is_err());
    }

    #[test]
    fn test_column_names() {
        let count = AggregationFunctionColumnPair::new(AggregationFunctionType::Count, "salary");
        assert_eq!(count.to_column_name(), "count__*");

        let pair =
            AggregationFunctionColumnPair::new(AggregationFunctionType::SumPrecision, "price")
                .with_arguments(vec!["20".to_string(), "2".to_string()]);
        assert_eq!(pair.to_column_name(), "sumPrecision__price");
        assert_eq!(pair.to_persisted(), "sumPrecision__price__20__2");
        assert_eq!(
            AggregationFunctionColumnPair::from_persisted(&pair.to_persisted()).unwrap(),
            pair
        );
        assert!(AggregationFunctionColumnPair::from_persisted("sum").is_err());
        assert!(AggregationFunctionColumnPair::from_persisted("avg__salary").is_err());
    }
}
