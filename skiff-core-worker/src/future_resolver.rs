// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Resolution of borrowed objects through their owner.
//!
//! A deserialized ObjectID may not be local yet. The resolver asks the
//! owner's worker for the object's status; the owner replies once the object
//! exists, at which point an in-plasma sentinel is written locally so the
//! next get falls through to the shared store. An unreachable owner is
//! given up on silently (the caller's get will time out).

use std::sync::Arc;

use skiff_common::id::{ObjectID, TaskID};
use skiff_proto as proto;

use crate::memory_store::CoreWorkerMemoryStore;
use crate::object::StoreObject;
use crate::worker_client::ClientFactory;

pub struct FutureResolver {
    memory_store: Arc<CoreWorkerMemoryStore>,
    client_factory: ClientFactory,
    own_worker_id: Vec<u8>,
}

impl FutureResolver {
    pub fn new(
        memory_store: Arc<CoreWorkerMemoryStore>,
        client_factory: ClientFactory,
        own_worker_id: Vec<u8>,
    ) -> Self {
        Self {
            memory_store,
            client_factory,
            own_worker_id,
        }
    }

    /// Ask the owner about `object_id` in the background.
    pub fn resolve_future_async(
        &self,
        object_id: ObjectID,
        owner_id: TaskID,
        owner_address: proto::Address,
    ) {
        if owner_address.worker_id == self.own_worker_id {
            // We own this object; it will appear locally on its own.
            return;
        }
        let client = (self.client_factory)(&owner_address);
        let memory_store = Arc::clone(&self.memory_store);
        tokio::spawn(async move {
            let req = proto::GetObjectStatusRequest {
                object_id: object_id.binary(),
                owner_id: owner_id.binary(),
            };
            match client.get_object_status(req).await {
                Ok(reply) if reply.status == proto::ObjectStatus::Created as i32 => {
                    // The owner has the object; route local gets to plasma.
                    if let Err(e) = memory_store.put(object_id, StoreObject::InPlasma) {
                        tracing::debug!(
                            object_id = %object_id.hex(),
                            error = %e,
                            "object arrived before future resolution"
                        );
                    }
                }
                Ok(reply) => {
                    tracing::debug!(
                        object_id = %object_id.hex(),
                        status = reply.status,
                        "object out of scope at its owner"
                    );
                }
                Err(status) => {
                    tracing::debug!(
                        object_id = %object_id.hex(),
                        error = %status,
                        "owner unreachable, giving up on future"
                    );
                }
            }
        });
    }
}
