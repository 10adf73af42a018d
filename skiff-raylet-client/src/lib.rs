// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Client interface to the local scheduler (raylet).
//!
//! The raylet itself is an external collaborator; the core worker consumes it
//! only through the [`RayletClient`] trait. `FakeRayletClient` provides a
//! recording in-process implementation for tests.

mod fake;
mod traits;

pub use fake::FakeRayletClient;
pub use traits::RayletClient;
