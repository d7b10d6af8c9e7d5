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

use std::borrow::Cow;
use std::sync::PoisonError;

error_chain! {
    types {
        Error, ErrorKind, ResultExt, Result;
    }

    errors {
        Poisoned {
            description("a thread holding the lock panicked and poisoned it")
        }

        IllegalState(desc: String) {
            description(desc)
            display("Illegal state: {}", desc)
        }

        IllegalArgument(desc: String) {
            description(desc)
            display("Illegal argument: {}", desc)
        }

        UnexpectedEOF(errmsg: String) {
            description(errmsg)
            display("Unexpected EOF: {}", errmsg)
        }

        CorruptIndex(errmsg: String) {
            description(errmsg)
            display("Corrupt Index: {}", errmsg)
        }

        UnsupportedOperation(errmsg: Cow<'static, str>) {
            description(errmsg),
            display("Unsupported Operation: {}", errmsg)
        }

        InvalidConfig(errmsg: String) {
            description(errmsg)
            display("Invalid star-tree config: {}", errmsg)
        }

        UnknownAggregationFunction(name: String) {
            description(name)
            display("Unknown aggregation function: {}", name)
        }

        MissingIndexFile(name: String) {
            description(name)
            display("Missing star-tree index file: {}", name)
        }

        SketchMerge(errmsg: String) {
            description(errmsg)
            display("Sketch merge failed: {}", errmsg)
        }

        UnexpectedDataType(errmsg: String) {
            description(errmsg)
            display("Unexpected data type: {}", errmsg)
        }

        LockObtainFailed(errmsg: String) {
            description(errmsg)
            display("Lock obtain failed: {}", errmsg)
        }

        AlreadyClosed(errmsg: String) {
            description(errmsg)
            display("Already closed: {}", errmsg)
        }
    }

    foreign_links {
        FmtError(::std::fmt::Error);
        IoError(::std::io::Error);
        FromUtf8Err(::std::string::FromUtf8Error);
        Utf8Error(::std::str::Utf8Error);
        NumError(::std::num::ParseIntError);
        ParseFloatError(::std::num::ParseFloatError);
        SerdeJsonError(::serde_json::Error);
        ParseDecimalError(::bigdecimal::ParseBigDecimalError);
    }
}

impl<Guard> From<PoisonError<Guard>> for Error {
    fn from(_: PoisonError<Guard>) -> Error {
        ErrorKind::Poisoned.into()
    }
}
