// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Skiff configuration.
//!
//! A plain struct of named knobs with defaults; constructed once at startup
//! and handed to the core worker inside its options. Environment variables
//! of the form `SKIFF_<UPPER_SNAKE_CASE_NAME>` override individual fields.

use std::env;

/// Configuration parameters for a Skiff worker process.
#[derive(Debug, Clone)]
pub struct SkiffConfig {
    /// Direct-call task returns below this size are carried inline in the
    /// RPC reply instead of going through the plasma store.
    pub max_direct_call_object_size: usize,
    /// Delay before a failed task with remaining retries is resubmitted.
    pub task_retry_delay_ms: u64,
    /// Period of the internal book-keeping heartbeat.
    pub internal_heartbeat_ms: u64,
    /// Period of the raylet-death watchdog check.
    pub raylet_death_check_interval_ms: u64,
    /// How long a granted worker lease may sit idle before being returned.
    pub worker_lease_timeout_ms: u64,
    /// Minimum retry budget for actor creation tasks.
    pub actor_creation_min_retries: u32,
    /// How often blocking waits poll the signal-check hook.
    pub signal_check_interval_ms: u64,
}

impl Default for SkiffConfig {
    fn default() -> Self {
        Self {
            max_direct_call_object_size: 100 * 1024,
            task_retry_delay_ms: 5_000,
            internal_heartbeat_ms: 1_000,
            raylet_death_check_interval_ms: 1_000,
            worker_lease_timeout_ms: 500,
            actor_creation_min_retries: 3,
            signal_check_interval_ms: 100,
        }
    }
}

impl SkiffConfig {
    /// Defaults, with `SKIFF_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env("SKIFF_MAX_DIRECT_CALL_OBJECT_SIZE", &mut config.max_direct_call_object_size);
        apply_env("SKIFF_TASK_RETRY_DELAY_MS", &mut config.task_retry_delay_ms);
        apply_env("SKIFF_INTERNAL_HEARTBEAT_MS", &mut config.internal_heartbeat_ms);
        apply_env(
            "SKIFF_RAYLET_DEATH_CHECK_INTERVAL_MS",
            &mut config.raylet_death_check_interval_ms,
        );
        apply_env("SKIFF_WORKER_LEASE_TIMEOUT_MS", &mut config.worker_lease_timeout_ms);
        apply_env("SKIFF_ACTOR_CREATION_MIN_RETRIES", &mut config.actor_creation_min_retries);
        apply_env("SKIFF_SIGNAL_CHECK_INTERVAL_MS", &mut config.signal_check_interval_ms);
        config
    }
}

fn apply_env<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(raw) = env::var(key) {
        match raw.parse() {
            Ok(value) => *slot = value,
            Err(_) => tracing::warn!(key, raw, "ignoring unparseable config override"),
        }
    }
}
