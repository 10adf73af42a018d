// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Object reference counting.
//!
//! Tracks owned and borrowed objects, their owners, local and
//! submitted-task reference counts, and deletion callbacks. A row is dropped
//! when its total count reaches zero; the registered delete callback (used by
//! the raylet's eviction protocol) fires at that point, outside the table
//! lock.

use std::collections::HashMap;

use parking_lot::Mutex;

use skiff_common::id::{ObjectID, TaskID};
use skiff_proto::Address;

/// Callback invoked exactly once when an object's refcount reaches zero.
pub type DeleteCallback = Box<dyn FnOnce(&ObjectID) + Send>;

/// Ownership and reference information for a single object.
struct Reference {
    local_ref_count: u64,
    submitted_task_ref_count: u64,
    owner: Option<(TaskID, Address)>,
    owned_by_us: bool,
    /// Object IDs serialized inside this object's value.
    contains: Vec<ObjectID>,
    delete_callback: Option<DeleteCallback>,
}

impl Reference {
    fn new() -> Self {
        Self {
            local_ref_count: 0,
            submitted_task_ref_count: 0,
            owner: None,
            owned_by_us: false,
            contains: Vec::new(),
            delete_callback: None,
        }
    }

    fn total_ref_count(&self) -> u64 {
        self.local_ref_count + self.submitted_task_ref_count
    }
}

/// Tracks reference counts for objects known to this worker.
pub struct ReferenceCounter {
    refs: Mutex<HashMap<ObjectID, Reference>>,
}

impl ReferenceCounter {
    pub fn new() -> Self {
        Self {
            refs: Mutex::new(HashMap::new()),
        }
    }

    /// Register an object created by this worker (Put/Create or task return).
    /// The row starts with one local reference and records which object IDs
    /// the value contains. Panics if the object is already owned; an
    /// ObjectID is created by exactly one owner.
    pub fn add_owned_object(
        &self,
        object_id: ObjectID,
        owner_id: TaskID,
        owner_address: Address,
        contained_ids: Vec<ObjectID>,
    ) {
        let mut refs = self.refs.lock();
        let entry = refs.entry(object_id).or_insert_with(Reference::new);
        assert!(
            !entry.owned_by_us,
            "object {} already owned by this worker",
            object_id.hex()
        );
        entry.owned_by_us = true;
        entry.owner = Some((owner_id, owner_address));
        entry.contains = contained_ids;
        entry.local_ref_count += 1;
    }

    /// Object IDs recorded as contained in the given object's value.
    pub fn get_contained_ids(&self, object_id: &ObjectID) -> Vec<ObjectID> {
        self.refs
            .lock()
            .get(object_id)
            .map(|r| r.contains.clone())
            .unwrap_or_default()
    }

    /// Record the owner of an object deserialized from another process.
    pub fn add_borrowed_object(
        &self,
        object_id: ObjectID,
        owner_id: TaskID,
        owner_address: Address,
    ) {
        let mut refs = self.refs.lock();
        let entry = refs.entry(object_id).or_insert_with(Reference::new);
        if entry.owner.is_none() {
            entry.owner = Some((owner_id, owner_address));
        }
    }

    /// Add a local reference. Creates the row if absent.
    pub fn add_local_reference(&self, object_id: ObjectID) {
        let mut refs = self.refs.lock();
        let entry = refs.entry(object_id).or_insert_with(Reference::new);
        entry.local_ref_count += 1;
    }

    /// Remove a local reference. Returns the freed object IDs; their delete
    /// callbacks have been invoked.
    pub fn remove_local_reference(&self, object_id: &ObjectID) -> Vec<ObjectID> {
        let mut freed = Vec::new();
        let callback = {
            let mut refs = self.refs.lock();
            let Some(entry) = refs.get_mut(object_id) else {
                return freed;
            };
            entry.local_ref_count = entry.local_ref_count.saturating_sub(1);
            if entry.total_ref_count() > 0 {
                return freed;
            }
            let entry = refs.remove(object_id).unwrap();
            freed.push(*object_id);
            entry.delete_callback
        };
        if let Some(cb) = callback {
            cb(object_id);
        }
        freed
    }

    /// Pin argument objects for the lifetime of a submitted task.
    pub fn update_submitted_task_references(&self, object_ids: &[ObjectID]) {
        let mut refs = self.refs.lock();
        for id in object_ids {
            let entry = refs.entry(*id).or_insert_with(Reference::new);
            entry.submitted_task_ref_count += 1;
        }
    }

    /// Release argument pins after a task resolved. Returns freed IDs.
    pub fn update_finished_task_references(&self, object_ids: &[ObjectID]) -> Vec<ObjectID> {
        let mut freed = Vec::new();
        let mut callbacks = Vec::new();
        {
            let mut refs = self.refs.lock();
            for id in object_ids {
                if let Some(entry) = refs.get_mut(id) {
                    entry.submitted_task_ref_count =
                        entry.submitted_task_ref_count.saturating_sub(1);
                    if entry.total_ref_count() == 0 {
                        let entry = refs.remove(id).unwrap();
                        freed.push(*id);
                        if let Some(cb) = entry.delete_callback {
                            callbacks.push((*id, cb));
                        }
                    }
                }
            }
        }
        for (id, cb) in callbacks {
            cb(&id);
        }
        freed
    }

    /// Drop rows outright (explicit Delete). Fires delete callbacks so the
    /// raylet unpins deleted objects.
    pub fn delete_references(&self, object_ids: &[ObjectID]) {
        let mut callbacks = Vec::new();
        {
            let mut refs = self.refs.lock();
            for id in object_ids {
                if let Some(entry) = refs.remove(id) {
                    if let Some(cb) = entry.delete_callback {
                        callbacks.push((*id, cb));
                    }
                }
            }
        }
        for (id, cb) in callbacks {
            cb(&id);
        }
    }

    /// The owner of an object, or `None` for IDs not created through a
    /// known-task path (random or reconstructed from binary).
    pub fn get_owner(&self, object_id: &ObjectID) -> Option<(TaskID, Address)> {
        self.refs
            .lock()
            .get(object_id)
            .and_then(|r| r.owner.clone())
    }

    /// Check if this worker owns the object.
    pub fn owned_by_us(&self, object_id: &ObjectID) -> bool {
        self.refs
            .lock()
            .get(object_id)
            .is_some_and(|r| r.owned_by_us)
    }

    /// Register a callback to fire when the object's refcount reaches zero.
    /// Returns false if the row no longer exists; the caller must then run
    /// the callback itself.
    pub fn set_delete_callback(&self, object_id: &ObjectID, callback: DeleteCallback) -> bool {
        let mut refs = self.refs.lock();
        match refs.get_mut(object_id) {
            Some(entry) => {
                entry.delete_callback = Some(callback);
                true
            }
            None => false,
        }
    }

    pub fn has_reference(&self, object_id: &ObjectID) -> bool {
        self.refs.lock().contains_key(object_id)
    }

    /// Number of object IDs with live rows. Diagnostic.
    pub fn num_object_ids_in_scope(&self) -> usize {
        self.refs.lock().len()
    }
}

impl Default for ReferenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn make_address() -> Address {
        Address {
            raylet_id: vec![0u8; 28],
            ip_address: "127.0.0.1".to_string(),
            port: 1234,
            worker_id: vec![0u8; 28],
        }
    }

    fn make_oid() -> ObjectID {
        ObjectID::from_random()
    }

    #[test]
    fn test_owned_object_starts_with_one_reference() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_owned_object(oid, TaskID::from_random(), make_address(), vec![]);
        assert!(rc.owned_by_us(&oid));
        assert_eq!(rc.num_object_ids_in_scope(), 1);
        let freed = rc.remove_local_reference(&oid);
        assert_eq!(freed, vec![oid]);
        assert_eq!(rc.num_object_ids_in_scope(), 0);
    }

    #[test]
    #[should_panic(expected = "already owned")]
    fn test_double_ownership_panics() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_owned_object(oid, TaskID::from_random(), make_address(), vec![]);
        rc.add_owned_object(oid, TaskID::from_random(), make_address(), vec![]);
    }

    #[test]
    fn test_borrowed_object_records_owner() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        let owner_id = TaskID::from_random();
        rc.add_borrowed_object(oid, owner_id, make_address());
        assert!(!rc.owned_by_us(&oid));
        let (got_id, got_addr) = rc.get_owner(&oid).unwrap();
        assert_eq!(got_id, owner_id);
        assert_eq!(got_addr.ip_address, "127.0.0.1");
    }

    #[test]
    fn test_unknown_owner() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_local_reference(oid);
        assert!(rc.get_owner(&oid).is_none());
    }

    #[test]
    fn test_local_reference_lifecycle() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_local_reference(oid);
        rc.add_local_reference(oid);
        assert!(rc.remove_local_reference(&oid).is_empty());
        assert!(rc.has_reference(&oid));
        assert_eq!(rc.remove_local_reference(&oid), vec![oid]);
        assert!(!rc.has_reference(&oid));
        // Further removes are no-ops.
        assert!(rc.remove_local_reference(&oid).is_empty());
    }

    #[test]
    fn test_delete_callback_fires_at_zero() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_local_reference(oid);

        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        assert!(rc.set_delete_callback(
            &oid,
            Box::new(move |_| {
                fired2.fetch_add(1, Ordering::Relaxed);
            })
        ));
        assert_eq!(fired.load(Ordering::Relaxed), 0);
        rc.remove_local_reference(&oid);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_set_delete_callback_on_missing_row() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        assert!(!rc.set_delete_callback(&oid, Box::new(|_| {})));
    }

    #[test]
    fn test_submitted_task_references_pin() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.add_local_reference(oid);
        rc.update_submitted_task_references(&[oid]);
        // Dropping the local ref does not free while a task pins it.
        assert!(rc.remove_local_reference(&oid).is_empty());
        assert!(rc.has_reference(&oid));
        let freed = rc.update_finished_task_references(&[oid]);
        assert_eq!(freed, vec![oid]);
    }

    #[test]
    fn test_finished_references_fire_delete_callback() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        rc.update_submitted_task_references(&[oid]);
        let fired = Arc::new(AtomicU32::new(0));
        let fired2 = fired.clone();
        rc.set_delete_callback(
            &oid,
            Box::new(move |_| {
                fired2.fetch_add(1, Ordering::Relaxed);
            }),
        );
        rc.update_finished_task_references(&[oid]);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_delete_references_drops_rows() {
        let rc = ReferenceCounter::new();
        let a = make_oid();
        let b = make_oid();
        rc.add_local_reference(a);
        rc.add_local_reference(b);
        rc.delete_references(&[a]);
        assert!(!rc.has_reference(&a));
        assert!(rc.has_reference(&b));
    }

    #[test]
    fn test_no_object_both_owned_and_borrowed() {
        let rc = ReferenceCounter::new();
        let oid = make_oid();
        let owner_id = TaskID::from_random();
        rc.add_owned_object(oid, owner_id, make_address(), vec![]);
        // A later borrow registration must not displace ownership.
        rc.add_borrowed_object(oid, TaskID::from_random(), make_address());
        assert!(rc.owned_by_us(&oid));
        assert_eq!(rc.get_owner(&oid).unwrap().0, owner_id);
    }
}
