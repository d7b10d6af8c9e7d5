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

pub mod directory;
pub mod io;

mod lock;

pub use self::directory::*;
pub use self::lock::*;

/// Hints how a file is going to be used.
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum IOContext {
    Read(bool),
    Default,
    Flush,
}

pub const IO_CONTEXT_READONCE: IOContext = IOContext::Read(true);
pub const IO_CONTEXT_READ: IOContext = IOContext::Read(false);
pub const IO_CONTEXT_DEFAULT: IOContext = IOContext::Default;
