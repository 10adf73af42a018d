// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared constants.

/// Length of Skiff full-length UniqueIDs in bytes.
pub const UNIQUE_ID_SIZE: usize = 28;

/// Skiff version string.
pub const SKIFF_VERSION: &str = "0.1.0";

/// Environment variable carrying the job ID for spawned workers.
pub const ENV_VAR_KEY_JOB_ID: &str = "SKIFF_JOB_ID";

/// Environment variable prefix for configuration overrides.
pub const CONFIG_ENV_PREFIX: &str = "SKIFF_";
