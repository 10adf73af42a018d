// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! RPC client framework for Skiff.
//!
//! The service client crates wrap their transport stubs in
//! [`client::RetryableClient`] to get uniform transient-failure retry,
//! exponential backoff, pending-bytes throttling, and connection-state
//! tracking.

pub mod client;
