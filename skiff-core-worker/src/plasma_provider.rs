// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Provider over the shared plasma-style object store.
//!
//! Thin wrapper adding the signal-check hook to every blocking operation:
//! long waits are sliced into bounded batches, and the hook is polled between
//! batches so a pending signal aborts the wait with its error.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use skiff_common::id::ObjectID;
use skiff_store_client::{MutableBuffer, ObjectStoreClient};

use crate::error::CoreWorkerResult;
use crate::memory_store::SignalCheck;
use crate::object::StoreObject;

pub struct PlasmaStoreProvider {
    store_client: Arc<dyn ObjectStoreClient>,
    check_signals: Option<SignalCheck>,
    signal_check_interval: Duration,
}

impl PlasmaStoreProvider {
    pub fn new(
        store_client: Arc<dyn ObjectStoreClient>,
        check_signals: Option<SignalCheck>,
        signal_check_interval: Duration,
    ) -> Self {
        Self {
            store_client,
            check_signals,
            signal_check_interval,
        }
    }

    /// Store a complete object. Re-puts of an existing object are ignored
    /// (retries store the same value).
    pub async fn put(&self, object: &StoreObject, object_id: ObjectID) -> CoreWorkerResult<()> {
        let (data, metadata) = object.to_store_parts();
        match self.store_client.put(object_id, data, metadata).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_object_exists() => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Allocate a writable buffer for `object_id`. `None` means the object
    /// already exists and must not be re-owned.
    pub async fn create(
        &self,
        object_id: ObjectID,
        metadata: Bytes,
        data_size: usize,
    ) -> CoreWorkerResult<Option<MutableBuffer>> {
        Ok(self.store_client.create(object_id, metadata, data_size).await?)
    }

    pub async fn seal(&self, object_id: ObjectID) -> CoreWorkerResult<()> {
        Ok(self.store_client.seal(object_id).await?)
    }

    /// Fetch `ids` into `results`, waiting up to `timeout_ms` (−1 =
    /// unbounded). Sets `got_exception` and returns early when a fetched
    /// object carries an error marker.
    pub async fn get(
        &self,
        ids: &HashSet<ObjectID>,
        timeout_ms: i64,
        results: &mut HashMap<ObjectID, StoreObject>,
        got_exception: &mut bool,
    ) -> CoreWorkerResult<()> {
        let mut remaining: Vec<ObjectID> = ids.iter().copied().collect();
        if remaining.is_empty() {
            return Ok(());
        }
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            if let Some(check) = &self.check_signals {
                check()?;
            }
            let slice = self.slice_timeout(deadline);
            let entries = self.store_client.get(&remaining, slice).await?;

            let mut still_missing = Vec::new();
            for (id, entry) in remaining.iter().zip(entries) {
                match entry {
                    Some(entry) => {
                        let obj = StoreObject::from_store_entry(entry);
                        if obj.is_exception() {
                            *got_exception = true;
                        }
                        results.insert(*id, obj);
                    }
                    None => still_missing.push(*id),
                }
            }
            remaining = still_missing;

            if remaining.is_empty() || *got_exception {
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(());
                }
            }
        }
    }

    pub async fn contains(&self, object_id: ObjectID) -> CoreWorkerResult<bool> {
        Ok(self.store_client.contains(object_id).await?)
    }

    /// Wait for up to `num_objects` of `ids`, unioning into `ready`.
    pub async fn wait(
        &self,
        ids: &HashSet<ObjectID>,
        num_objects: usize,
        timeout_ms: i64,
        ready: &mut HashSet<ObjectID>,
    ) -> CoreWorkerResult<()> {
        let candidates: Vec<ObjectID> = ids.iter().copied().collect();
        if candidates.is_empty() || num_objects == 0 {
            return Ok(());
        }
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            if let Some(check) = &self.check_signals {
                check()?;
            }
            let slice = self.slice_timeout(deadline);
            let newly_ready = self
                .store_client
                .wait(&candidates, num_objects, slice)
                .await?;
            let done = newly_ready.len() >= num_objects;
            ready.extend(newly_ready);
            if done {
                return Ok(());
            }
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(());
                }
            }
        }
    }

    pub async fn delete(
        &self,
        ids: &HashSet<ObjectID>,
        local_only: bool,
        delete_creating_tasks: bool,
    ) -> CoreWorkerResult<()> {
        let ids: Vec<ObjectID> = ids.iter().copied().collect();
        Ok(self
            .store_client
            .delete(&ids, local_only, delete_creating_tasks)
            .await?)
    }

    pub async fn set_client_options(&self, name: String, limit_bytes: i64) -> CoreWorkerResult<()> {
        Ok(self.store_client.set_client_options(name, limit_bytes).await?)
    }

    pub async fn memory_usage_string(&self) -> String {
        self.store_client.memory_usage_string().await
    }

    /// Bound one store call so the signal hook is polled at least every
    /// `signal_check_interval`, without overshooting the caller's deadline.
    fn slice_timeout(&self, deadline: Option<tokio::time::Instant>) -> i64 {
        let slice = self.signal_check_interval;
        let bounded = match deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                slice.min(remaining)
            }
            None => slice,
        };
        bounded.as_millis() as i64
    }
}

fn deadline_from_timeout_ms(timeout_ms: i64) -> Option<tokio::time::Instant> {
    if timeout_ms < 0 {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_millis(timeout_ms as u64))
    }
}
