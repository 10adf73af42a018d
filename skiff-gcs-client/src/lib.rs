// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Client interface to the global metadata service (GCS).
//!
//! The core worker consumes the GCS through the [`GcsClient`] trait:
//! task-table writes, error reporting, and actor-table subscriptions whose
//! notifications drive per-actor connection state. `FakeGcsClient` lets tests
//! publish actor transitions by hand.

mod fake;
mod traits;

pub use fake::FakeGcsClient;
pub use traits::{ActorNotificationCallback, GcsClient};
