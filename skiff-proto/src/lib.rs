// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Wire message types for Skiff.
//!
//! Hand-maintained prost structs for every message that crosses a process
//! boundary: task specs, object payloads, and the request/reply pairs of the
//! core worker, raylet, and GCS surfaces. Field tags are stable; additions
//! must use fresh tags.

mod common;
mod core_worker;
mod gcs;
mod raylet;

pub use common::*;
pub use core_worker::*;
pub use gcs::*;
pub use raylet::*;
