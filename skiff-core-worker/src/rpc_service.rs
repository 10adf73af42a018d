// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! The inbound RPC surface of a core worker.
//!
//! Every handler validates the intended recipient. PushTask/AssignTask go
//! through the task receiver onto the execution loop; GetObjectStatus and
//! WaitForObjectEviction implement the owner-side protocols the borrowers
//! and the raylet depend on.

use std::sync::Arc;

use tokio::sync::oneshot;
use tonic::Status;

use skiff_common::id::{ActorID, ObjectID, WorkerID};
use skiff_proto as proto;

use crate::core_worker::CoreWorker;
use crate::error::CoreWorkerError;
use crate::worker_client::CoreWorkerClient;

/// Service implementation delegating to the CoreWorker.
pub struct CoreWorkerService {
    core_worker: Arc<CoreWorker>,
}

impl CoreWorkerService {
    pub fn new(core_worker: Arc<CoreWorker>) -> Self {
        Self { core_worker }
    }

    /// Worker→worker task push (direct path).
    pub async fn handle_push_task(
        &self,
        request: proto::PushTaskRequest,
    ) -> Result<proto::PushTaskReply, Status> {
        tracing::debug!(seq = request.sequence_number, "PushTask received");
        self.core_worker
            .task_receiver()
            .handle_push_task(request)
            .await
            .map_err(to_status)
    }

    /// Raylet→worker task assignment (indirect path).
    pub async fn handle_assign_task(
        &self,
        request: proto::AssignTaskRequest,
    ) -> Result<proto::AssignTaskReply, Status> {
        self.core_worker
            .task_receiver()
            .handle_assign_task(request)
            .await
            .map_err(to_status)
    }

    pub async fn handle_arg_wait_complete(
        &self,
        request: proto::ArgWaitCompleteRequest,
    ) -> Result<proto::ArgWaitCompleteReply, Status> {
        self.core_worker
            .task_receiver()
            .handle_arg_wait_complete(request)
            .map_err(to_status)
    }

    /// Borrower→owner object query. While the producing task is pending the
    /// object is pinned with a temporary local reference, and the reply is
    /// deferred until the object is created.
    pub async fn handle_get_object_status(
        &self,
        request: proto::GetObjectStatusRequest,
    ) -> Result<proto::GetObjectStatusReply, Status> {
        let object_id = ObjectID::from_binary(&request.object_id);
        let task_id = object_id.task_id();
        tracing::debug!(object_id = %object_id.hex(), "GetObjectStatus");

        let task_manager = self.core_worker.task_manager();
        if task_manager.is_task_pending(&task_id) {
            // Pin so the object cannot be freed out from under the reply.
            self.core_worker.reference_counter().add_local_reference(object_id);
            if task_manager.is_task_pending(&task_id) {
                let (tx, rx) = oneshot::channel();
                self.core_worker.memory_store().get_async(object_id, tx);
                self.core_worker
                    .reference_counter()
                    .remove_local_reference(&object_id);
                let _ = rx.await;
            } else {
                // Lost the race; the task finished already.
                self.core_worker
                    .reference_counter()
                    .remove_local_reference(&object_id);
            }
        }

        let status = if self.core_worker.reference_counter().has_reference(&object_id)
            || self.core_worker.memory_store().contains(&object_id).0
        {
            proto::ObjectStatus::Created
        } else {
            proto::ObjectStatus::OutOfScope
        };
        Ok(proto::GetObjectStatusReply {
            status: status as i32,
        })
    }

    /// Raylet→owner eviction watch: reply once the object's refcount hits
    /// zero so the raylet may unpin it. Replies immediately when the
    /// reference is already gone.
    pub async fn handle_wait_for_object_eviction(
        &self,
        request: proto::WaitForObjectEvictionRequest,
    ) -> Result<proto::WaitForObjectEvictionReply, Status> {
        self.validate_recipient(&request.intended_worker_id)?;
        let object_id = ObjectID::from_binary(&request.object_id);

        let (tx, rx) = oneshot::channel();
        let registered = self.core_worker.reference_counter().set_delete_callback(
            &object_id,
            Box::new(move |id| {
                tracing::debug!(object_id = %id.hex(), "object out of scope, replying to eviction wait");
                let _ = tx.send(());
            }),
        );
        if registered {
            let _ = rx.await;
        } else {
            tracing::debug!(object_id = %object_id.hex(), "reference already gone");
        }
        Ok(proto::WaitForObjectEvictionReply::default())
    }

    /// Kill this worker's actor. A mismatched actor ID (a previous
    /// incarnation's kill) is rejected.
    pub async fn handle_kill_actor(
        &self,
        request: proto::KillActorRequest,
    ) -> Result<proto::KillActorReply, Status> {
        let intended = ActorID::from_binary(&request.intended_actor_id);
        let current = self.core_worker.current_actor_id();
        if intended != current {
            let message = format!(
                "mismatched actor ID: ignoring KillActor for previous actor {}, current actor is {}",
                intended.hex(),
                current.hex()
            );
            tracing::error!("{message}");
            return Err(Status::invalid_argument(message));
        }
        tracing::info!("got KillActor, exiting immediately");
        self.core_worker.trigger_exit();
        Ok(proto::KillActorReply::default())
    }

    pub fn handle_get_core_worker_stats(
        &self,
        _request: proto::GetCoreWorkerStatsRequest,
    ) -> Result<proto::GetCoreWorkerStatsReply, Status> {
        Ok(proto::GetCoreWorkerStatsReply {
            core_worker_stats: Some(self.core_worker.stats()),
        })
    }

    fn validate_recipient(&self, intended_worker_id: &[u8]) -> Result<(), Status> {
        if intended_worker_id.is_empty() {
            return Ok(());
        }
        if intended_worker_id.len() != WorkerID::SIZE {
            return Err(Status::invalid_argument("malformed intended worker ID"));
        }
        let intended = WorkerID::from_binary(intended_worker_id);
        if !intended.is_nil() && intended != self.core_worker.worker_id() {
            return Err(Status::invalid_argument(format!(
                "request intended for worker {} but received by {}",
                intended.hex(),
                self.core_worker.worker_id().hex()
            )));
        }
        Ok(())
    }
}

fn to_status(error: CoreWorkerError) -> Status {
    match error {
        CoreWorkerError::InvalidArgument(message) => Status::invalid_argument(message),
        CoreWorkerError::TimedOut(message) => Status::deadline_exceeded(message),
        CoreWorkerError::Io(message) => Status::unavailable(message),
        other => Status::internal(other.to_string()),
    }
}

/// In-process transport: a [`CoreWorkerClient`] delivering straight into a
/// peer's service. Used by tests and single-process deployments.
pub struct LocalWorkerClient {
    service: Arc<CoreWorkerService>,
}

impl LocalWorkerClient {
    pub fn new(core_worker: Arc<CoreWorker>) -> Self {
        Self {
            service: Arc::new(CoreWorkerService::new(core_worker)),
        }
    }
}

#[async_trait::async_trait]
impl CoreWorkerClient for LocalWorkerClient {
    async fn push_task(
        &self,
        req: proto::PushTaskRequest,
    ) -> Result<proto::PushTaskReply, Status> {
        self.service.handle_push_task(req).await
    }

    async fn get_object_status(
        &self,
        req: proto::GetObjectStatusRequest,
    ) -> Result<proto::GetObjectStatusReply, Status> {
        self.service.handle_get_object_status(req).await
    }

    async fn kill_actor(
        &self,
        req: proto::KillActorRequest,
    ) -> Result<proto::KillActorReply, Status> {
        self.service.handle_kill_actor(req).await
    }
}
