// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-process object store for the core worker.
//!
//! Holds direct-call objects until they are promoted to plasma. Blocking
//! gets/waits are serviced by a store-wide notification; async waiters are
//! fulfilled exactly once when their object arrives.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};

use skiff_common::id::ObjectID;

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::object::{ObjectPayload, StoreObject};

/// Hook polled during blocking waits; an error aborts the wait and surfaces
/// to user code (e.g. a pending signal).
pub type SignalCheck = std::sync::Arc<dyn Fn() -> CoreWorkerResult<()> + Send + Sync>;

/// Memory-store statistics for stats reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    pub num_local_objects: usize,
    pub used_object_store_memory: usize,
}

/// Thread-safe in-process store mapping ObjectID to [`StoreObject`].
pub struct CoreWorkerMemoryStore {
    objects: Mutex<HashMap<ObjectID, StoreObject>>,
    async_waiters: Mutex<HashMap<ObjectID, Vec<oneshot::Sender<StoreObject>>>>,
    notify: Notify,
    check_signals: Option<SignalCheck>,
    signal_check_interval: Duration,
}

impl CoreWorkerMemoryStore {
    pub fn new() -> Self {
        Self::with_signal_check(None, Duration::from_millis(100))
    }

    pub fn with_signal_check(
        check_signals: Option<SignalCheck>,
        signal_check_interval: Duration,
    ) -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            async_waiters: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            check_signals,
            signal_check_interval,
        }
    }

    /// Insert an object, waking every waiter on its ID.
    ///
    /// Idempotent for identical payloads (a retried task stores the same
    /// value twice); conflicting payloads are an error.
    pub fn put(&self, object_id: ObjectID, object: StoreObject) -> CoreWorkerResult<()> {
        {
            let mut objects = self.objects.lock();
            if let Some(existing) = objects.get(&object_id) {
                if *existing == object {
                    return Ok(());
                }
                return Err(CoreWorkerError::ObjectAlreadyExists(object_id.hex()));
            }
            objects.insert(object_id, object.clone());
        }
        let waiters = self.async_waiters.lock().remove(&object_id);
        if let Some(waiters) = waiters {
            for tx in waiters {
                let _ = tx.send(object.clone());
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Snapshot lookup without waiting.
    pub fn get_if_exists(&self, object_id: &ObjectID) -> Option<StoreObject> {
        self.objects.lock().get(object_id).cloned()
    }

    /// Wait until at least `num_objects` of `ids` are present, the timeout
    /// expires (−1 = unbounded), or any present object is an error sentinel.
    /// Returns whatever subset is present at return time.
    pub async fn get(
        &self,
        ids: &HashSet<ObjectID>,
        num_objects: usize,
        timeout_ms: i64,
    ) -> CoreWorkerResult<HashMap<ObjectID, StoreObject>> {
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            let (found, got_exception) = {
                let objects = self.objects.lock();
                let mut found = HashMap::new();
                let mut got_exception = false;
                for id in ids {
                    if let Some(obj) = objects.get(id) {
                        if obj.is_exception() {
                            got_exception = true;
                        }
                        found.insert(*id, obj.clone());
                    }
                }
                (found, got_exception)
            };
            // Error sentinels short-circuit: the caller will surface the
            // exception rather than wait out the rest of the set.
            if found.len() >= num_objects || got_exception {
                return Ok(found);
            }
            if !self.block_until_notified(deadline).await? {
                // Timed out; return the subset present now.
                let objects = self.objects.lock();
                return Ok(ids
                    .iter()
                    .filter_map(|id| objects.get(id).map(|o| (*id, o.clone())))
                    .collect());
            }
        }
    }

    /// Wait until `num_objects` of `ids` are present or timeout; returns the
    /// ready subset (error sentinels count as ready).
    pub async fn wait(
        &self,
        ids: &HashSet<ObjectID>,
        num_objects: usize,
        timeout_ms: i64,
    ) -> CoreWorkerResult<HashSet<ObjectID>> {
        let deadline = deadline_from_timeout_ms(timeout_ms);
        loop {
            let ready: HashSet<ObjectID> = {
                let objects = self.objects.lock();
                ids.iter()
                    .filter(|id| objects.contains_key(id))
                    .copied()
                    .take(num_objects)
                    .collect()
            };
            if ready.len() >= num_objects {
                return Ok(ready);
            }
            if !self.block_until_notified(deadline).await? {
                return Ok(ready);
            }
        }
    }

    /// Register a oneshot fulfilled exactly once when `object_id` arrives
    /// (immediately if it is already present).
    pub fn get_async(&self, object_id: ObjectID, sender: oneshot::Sender<StoreObject>) {
        if let Some(obj) = self.get_if_exists(&object_id) {
            let _ = sender.send(obj);
            return;
        }
        let mut waiters = self.async_waiters.lock();
        // Check again under the waiter lock: the object may have arrived
        // between the lookup and the registration.
        if let Some(obj) = self.get_if_exists(&object_id) {
            let _ = sender.send(obj);
            return;
        }
        waiters.entry(object_id).or_default().push(sender);
    }

    /// Atomically swap a present value for the in-plasma sentinel, returning
    /// the former payload so the caller can push it into plasma. A marker is
    /// left behind even when the object was absent, so later gets route to
    /// plasma.
    pub fn get_or_promote_to_plasma(&self, object_id: ObjectID) -> Option<ObjectPayload> {
        let mut objects = self.objects.lock();
        match objects.get(&object_id) {
            Some(StoreObject::InPlasma) => None,
            Some(StoreObject::Error(_)) => None,
            Some(StoreObject::Value(_)) => {
                let Some(StoreObject::Value(payload)) =
                    objects.insert(object_id, StoreObject::InPlasma)
                else {
                    unreachable!()
                };
                Some(payload)
            }
            None => {
                objects.insert(object_id, StoreObject::InPlasma);
                None
            }
        }
    }

    /// Presence check: (present, carries the in-plasma sentinel).
    pub fn contains(&self, object_id: &ObjectID) -> (bool, bool) {
        match self.objects.lock().get(object_id) {
            Some(StoreObject::InPlasma) => (true, true),
            Some(_) => (true, false),
            None => (false, false),
        }
    }

    /// Delete entries. IDs holding the in-plasma sentinel are appended to
    /// `plasma_ids` so the caller forwards the delete to the shared store.
    pub fn delete(&self, ids: &HashSet<ObjectID>, plasma_ids: &mut HashSet<ObjectID>) {
        let mut objects = self.objects.lock();
        for id in ids {
            if let Some(obj) = objects.remove(id) {
                if obj.is_in_plasma() {
                    plasma_ids.insert(*id);
                }
            }
        }
    }

    pub fn stats(&self) -> MemoryStoreStats {
        let objects = self.objects.lock();
        MemoryStoreStats {
            num_local_objects: objects.len(),
            used_object_store_memory: objects.values().map(|o| o.data_size()).sum(),
        }
    }

    /// Wait for the next store mutation. Returns false on timeout; errors if
    /// the signal hook reports one.
    async fn block_until_notified(
        &self,
        deadline: Option<tokio::time::Instant>,
    ) -> CoreWorkerResult<bool> {
        loop {
            if let Some(check) = &self.check_signals {
                check()?;
            }
            let mut slice = self.signal_check_interval;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                if remaining.is_zero() {
                    return Ok(false);
                }
                slice = slice.min(remaining);
            }
            if tokio::time::timeout(slice, self.notify.notified()).await.is_ok() {
                return Ok(true);
            }
            // Slice elapsed: re-check signals and the deadline, then keep
            // waiting.
            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(false);
                }
            }
        }
    }
}

impl Default for CoreWorkerMemoryStore {
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
