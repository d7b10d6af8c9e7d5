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

#![recursion_limit = "1024"]
#![cfg_attr(not(feature = "clippy"), allow(unknown_lints))]
#![allow(clippy::cast_lossless)]

//! Star-tree pre-aggregation indexes for immutable columnar segments.
//!
//! A star-tree is built once over a finished segment by
//! [`StarTreeBuilder`](core/startree/builder/struct.StarTreeBuilder.html), consolidated into the
//! segment directory, and loaded back at query time through
//! [`StarTreeV2Loader`](core/startree/loader/struct.StarTreeV2Loader.html).

#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;
#[macro_use]
extern crate serde_derive;

pub mod core;
pub mod error;
