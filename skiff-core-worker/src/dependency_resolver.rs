// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Local dependency resolution before direct dispatch.
//!
//! A direct task can only be pushed once its by-reference direct-call
//! arguments exist. The resolver waits for each one in the memory store and
//! promotes it into plasma so the callee's argument fetch finds it there.

use std::sync::Arc;

use tokio::sync::oneshot;

use skiff_common::id::ObjectID;
use skiff_proto::TaskSpec;

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::memory_store::CoreWorkerMemoryStore;
use crate::plasma_provider::PlasmaStoreProvider;
use crate::task_spec_builder::task_arg_ids;

pub struct LocalDependencyResolver {
    memory_store: Arc<CoreWorkerMemoryStore>,
    plasma: Arc<PlasmaStoreProvider>,
}

impl LocalDependencyResolver {
    pub fn new(memory_store: Arc<CoreWorkerMemoryStore>, plasma: Arc<PlasmaStoreProvider>) -> Self {
        Self {
            memory_store,
            plasma,
        }
    }

    /// Wait until every by-reference direct-call argument of `spec` is local,
    /// then promote each into plasma. Raylet-transport arguments are already
    /// in plasma and are skipped.
    pub async fn resolve_dependencies(&self, spec: &TaskSpec) -> CoreWorkerResult<()> {
        let direct_args: Vec<ObjectID> = task_arg_ids(spec)
            .into_iter()
            .filter(|id| id.is_direct_call_type())
            .collect();

        for object_id in direct_args {
            let (present, in_plasma) = self.memory_store.contains(&object_id);
            if in_plasma {
                // Already promoted by an earlier submission.
                continue;
            }
            if !present {
                let (tx, rx) = oneshot::channel();
                self.memory_store.get_async(object_id, tx);
                rx.await.map_err(|_| {
                    CoreWorkerError::Internal("dependency waiter channel closed".into())
                })?;
            }
            self.promote(object_id).await?;
        }
        Ok(())
    }

    async fn promote(&self, object_id: ObjectID) -> CoreWorkerResult<()> {
        if let Some(payload) = self.memory_store.get_or_promote_to_plasma(object_id) {
            self.plasma
                .put(&crate::object::StoreObject::Value(payload), object_id)
                .await?;
            tracing::debug!(object_id = %object_id.hex(), "promoted argument to plasma");
        }
        Ok(())
    }
}
