// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Utility library for Skiff.
//!
//! Logging setup, time helpers, random bytes, exponential backoff, and
//! process inspection.

pub mod backoff;
pub mod logging;
pub mod process;
pub mod random;
pub mod time;
