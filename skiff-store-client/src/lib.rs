// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Client interface to the shared plasma-style object store.
//!
//! The store daemon holds large and promoted objects in shared memory; the
//! core worker reaches it only through the [`ObjectStoreClient`] trait.
//! [`LocalStoreClient`] is a fully functional in-process implementation used
//! by tests and by single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use skiff_common::id::ObjectID;
use skiff_common::status::{SkiffError, SkiffResult};

/// A sealed object as held by the store: data plus metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub data: Bytes,
    pub metadata: Bytes,
}

/// A writable buffer handed out by `create` and published by `seal`.
#[derive(Clone)]
pub struct MutableBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl MutableBuffer {
    /// A zeroed writable buffer of `data_size` bytes. Also used by the core
    /// worker for small direct-call returns that never touch the store.
    pub fn new(data_size: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(vec![0u8; data_size])),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// A snapshot of the current contents.
    pub fn to_bytes(&self) -> Bytes {
        self.freeze()
    }

    /// Overwrite the buffer contents starting at offset 0.
    pub fn copy_from_slice(&self, data: &[u8]) {
        let mut inner = self.inner.lock();
        assert!(
            data.len() <= inner.len(),
            "write of {} bytes exceeds buffer of {}",
            data.len(),
            inner.len()
        );
        inner[..data.len()].copy_from_slice(data);
    }

    fn freeze(&self) -> Bytes {
        Bytes::from(self.inner.lock().clone())
    }
}

/// Async trait for the object store operations the core worker consumes.
#[async_trait::async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Allocate a writable buffer for `object_id`. Returns `None` when the
    /// object already exists (the caller must not re-own it).
    async fn create(
        &self,
        object_id: ObjectID,
        metadata: Bytes,
        data_size: usize,
    ) -> SkiffResult<Option<MutableBuffer>>;

    /// Publish a previously created buffer, waking any waiters.
    async fn seal(&self, object_id: ObjectID) -> SkiffResult<()>;

    /// Insert a complete object in one step.
    async fn put(&self, object_id: ObjectID, data: Bytes, metadata: Bytes) -> SkiffResult<()>;

    /// Fetch objects, waiting up to `timeout_ms` (−1 = unbounded) for each to
    /// appear. Results align with `ids`; missing objects are `None`.
    async fn get(&self, ids: &[ObjectID], timeout_ms: i64)
        -> SkiffResult<Vec<Option<StoreEntry>>>;

    async fn contains(&self, object_id: ObjectID) -> SkiffResult<bool>;

    /// Wait until at least `num_objects` of `ids` are present or the timeout
    /// expires; returns the ready subset.
    async fn wait(
        &self,
        ids: &[ObjectID],
        num_objects: usize,
        timeout_ms: i64,
    ) -> SkiffResult<HashSet<ObjectID>>;

    async fn delete(
        &self,
        ids: &[ObjectID],
        local_only: bool,
        delete_creating_tasks: bool,
    ) -> SkiffResult<()>;

    async fn set_client_options(&self, name: String, limit_bytes: i64) -> SkiffResult<()>;

    async fn memory_usage_string(&self) -> String;
}

// ─── Local in-process implementation ────────────────────────────────────────

struct LocalStoreState {
    sealed: HashMap<ObjectID, StoreEntry>,
    pending: HashMap<ObjectID, (MutableBuffer, Bytes)>,
    client_name: String,
    limit_bytes: i64,
}

/// In-process store speaking the full client surface.
pub struct LocalStoreClient {
    state: Mutex<LocalStoreState>,
    notify: Notify,
}

impl LocalStoreClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LocalStoreState {
                sealed: HashMap::new(),
                pending: HashMap::new(),
                client_name: String::new(),
                limit_bytes: -1,
            }),
            notify: Notify::new(),
        }
    }

    /// Number of sealed objects held.
    pub fn num_objects(&self) -> usize {
        self.state.lock().sealed.len()
    }

    fn used_bytes(&self) -> usize {
        self.state
            .lock()
            .sealed
            .values()
            .map(|e| e.data.len() + e.metadata.len())
            .sum()
    }

    fn lookup(&self, id: &ObjectID) -> Option<StoreEntry> {
        self.state.lock().sealed.get(id).cloned()
    }

    async fn wait_for_notification(&self, remaining: Option<Duration>) -> bool {
        match remaining {
            Some(timeout) => tokio::time::timeout(timeout, self.notify.notified())
                .await
                .is_ok(),
            None => {
                self.notify.notified().await;
                true
            }
        }
    }
}

impl Default for LocalStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

fn deadline_from_timeout_ms(timeout_ms: i64) -> Option<tokio::time::Instant> {
    if timeout_ms < 0 {
        None
    } else {
        Some(tokio::time::Instant::now() + Duration::from_millis(timeout_ms as u64))
    }
}

fn remaining_until(deadline: Option<tokio::time::Instant>) -> Option<Duration> {
    deadline.map(|d| d.saturating_duration_since(tokio::time::Instant::now()))
}

#[async_trait::async_trait]
impl ObjectStoreClient for LocalStoreClient {
    async fn create(
        &self,
        object_id: ObjectID,
        metadata: Bytes,
        data_size: usize,
    ) -> SkiffResult<Option<MutableBuffer>> {
        let mut state = self.state.lock();
        if state.sealed.contains_key(&object_id) || state.pending.contains_key(&object_id) {
            return Ok(None);
        }
        let buffer = MutableBuffer::new(data_size);
        state.pending.insert(object_id, (buffer.clone(), metadata));
        Ok(Some(buffer))
    }

    async fn seal(&self, object_id: ObjectID) -> SkiffResult<()> {
        let mut state = self.state.lock();
        let (buffer, metadata) = state.pending.remove(&object_id).ok_or_else(|| {
            SkiffError::object_not_found(format!("seal of uncreated object {}", object_id.hex()))
        })?;
        state.sealed.insert(
            object_id,
            StoreEntry {
                data: buffer.freeze(),
                metadata,
            },
        );
        drop(state);
        self.notify.notify_waiters();
        Ok(())
    }

    async fn put(&self, object_id: ObjectID, data: Bytes, metadata: Bytes) -> SkiffResult<()> {
        {
            let mut state = self.state.lock();
            if state.sealed.contains_key(&object_id) {
                return Err(SkiffError::object_exists(object_id.hex()));
            }
            state.sealed.insert(object_id, StoreEntry { data, metadata });
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn get(
        &self,
        ids: &[ObjectID],
        timeout_ms: i64,
    ) -> SkiffResult<Vec<Option<StoreEntry>>> {
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            let mut results = Vec::with_capacity(ids.len());
            let mut missing = 0usize;
            for id in ids {
                match self.lookup(id) {
                    Some(entry) => results.push(Some(entry)),
                    None => {
                        missing += 1;
                        results.push(None);
                    }
                }
            }
            if missing == 0 {
                return Ok(results);
            }
            let remaining = remaining_until(deadline);
            if remaining == Some(Duration::ZERO) {
                return Ok(results);
            }
            if !self.wait_for_notification(remaining).await {
                // Timed out: return whatever is present now.
                let results = ids.iter().map(|id| self.lookup(id)).collect();
                return Ok(results);
            }
        }
    }

    async fn contains(&self, object_id: ObjectID) -> SkiffResult<bool> {
        Ok(self.state.lock().sealed.contains_key(&object_id))
    }

    async fn wait(
        &self,
        ids: &[ObjectID],
        num_objects: usize,
        timeout_ms: i64,
    ) -> SkiffResult<HashSet<ObjectID>> {
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            let ready: HashSet<ObjectID> = {
                let state = self.state.lock();
                ids.iter()
                    .filter(|id| state.sealed.contains_key(id))
                    .copied()
                    .take(num_objects)
                    .collect()
            };
            if ready.len() >= num_objects {
                return Ok(ready);
            }
            let remaining = remaining_until(deadline);
            if remaining == Some(Duration::ZERO) {
                return Ok(ready);
            }
            if !self.wait_for_notification(remaining).await {
                let state = self.state.lock();
                return Ok(ids
                    .iter()
                    .filter(|id| state.sealed.contains_key(id))
                    .copied()
                    .take(num_objects)
                    .collect());
            }
        }
    }

    async fn delete(
        &self,
        ids: &[ObjectID],
        _local_only: bool,
        _delete_creating_tasks: bool,
    ) -> SkiffResult<()> {
        let mut state = self.state.lock();
        for id in ids {
            state.sealed.remove(id);
            state.pending.remove(id);
        }
        Ok(())
    }

    async fn set_client_options(&self, name: String, limit_bytes: i64) -> SkiffResult<()> {
        let mut state = self.state.lock();
        state.client_name = name;
        state.limit_bytes = limit_bytes;
        Ok(())
    }

    async fn memory_usage_string(&self) -> String {
        format!(
            "{} objects, {} bytes used",
            self.num_objects(),
            self.used_bytes()
        )
    }
}
