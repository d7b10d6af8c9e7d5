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

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, RoundingMode};

use crate::core::store::io::{DataInput, DataOutput};
use crate::error::ErrorKind::CorruptIndex;
use crate::error::Result;

/// Rounds half-even to at most `precision` significant digits.
pub fn round_to_precision(value: BigDecimal, precision: u64) -> BigDecimal {
    let digits = value.digits();
    if digits <= precision {
        return value;
    }
    let (_, scale) = value.as_bigint_and_exponent();
    value.with_scale_round(scale - (digits - precision) as i64, RoundingMode::HalfEven)
}

/// Rounds half-even to exactly `scale` fractional digits.
pub fn round_to_scale(value: &BigDecimal, scale: i64) -> BigDecimal {
    value.with_scale_round(scale, RoundingMode::HalfEven)
}

/// Scale as a big-endian int, then the unscaled value as two's-complement big-endian bytes.
pub fn serialize_decimal(value: &BigDecimal) -> Result<Vec<u8>> {
    let (unscaled, scale) = value.as_bigint_and_exponent();
    let unscaled = unscaled.to_signed_bytes_be();
    let mut out: Vec<u8> = Vec::with_capacity(4 + unscaled.len());
    out.write_int(scale as i32)?;
    out.extend_from_slice(&unscaled);
    Ok(out)
}

pub fn deserialize_decimal(bytes: &[u8]) -> Result<BigDecimal> {
    if bytes.len() < 5 {
        bail!(CorruptIndex(format!(
            "decimal needs at least 5 bytes, got {}",
            bytes.len()
        )));
    }
    let mut input = bytes;
    let scale = input.read_int()?;
    let unscaled = BigInt::from_signed_bytes_be(input);
    Ok(BigDecimal::new(unscaled, i64::from(scale)))
}
