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

use std::mem::size_of;

pub trait BitsRequired {
    fn bits_required(&self) -> u32;
}

macro_rules! impl_bits_required {
    ($type:ty, $width: expr) => {
        impl BitsRequired for $type {
            #[inline]
            fn bits_required(&self) -> u32 {
                1.max($width - (*self).leading_zeros())
            }
        }
    };
}

impl_bits_required!(i32, 32);
impl_bits_required!(u32, 32);
impl_bits_required!(i64, 64);
impl_bits_required!(u64, 64);
impl_bits_required!(usize, (size_of::<usize>() * 8) as u32);
