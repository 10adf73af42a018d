// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Actor handle registry.
//!
//! At most one handle per actor exists in a process. Handles are retained
//! after death so further submissions get a clear error.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use skiff_common::id::ActorID;

use crate::actor_handle::ActorHandle;

pub struct ActorManager {
    handles: RwLock<HashMap<ActorID, Arc<ActorHandle>>>,
}

impl ActorManager {
    pub fn new() -> Self {
        Self {
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handle. Returns false (dropping the handle) if one already
    /// exists for the actor.
    pub fn register_actor_handle(&self, handle: Arc<ActorHandle>) -> bool {
        let mut handles = self.handles.write();
        match handles.entry(handle.actor_id()) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(handle);
                true
            }
        }
    }

    pub fn get_actor_handle(&self, actor_id: &ActorID) -> Option<Arc<ActorHandle>> {
        self.handles.read().get(actor_id).cloned()
    }

    pub fn actor_ids(&self) -> Vec<ActorID> {
        self.handles.read().keys().copied().collect()
    }

    pub fn num_handles(&self) -> usize {
        self.handles.read().len()
    }
}

impl Default for ActorManager {
    fn default() -> Self {
        Self::new()
    }
}
