// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async trait for raylet client operations.

use skiff_proto as proto;
use tonic::Status;

/// Async trait for the raylet RPC operations the core worker consumes.
#[async_trait::async_trait]
pub trait RayletClient: Send + Sync {
    // ── Task submission (indirect path) ───────────────────────────
    async fn submit_task(
        &self,
        req: proto::SubmitTaskRequest,
    ) -> Result<proto::SubmitTaskReply, Status>;

    // ── Lease management ──────────────────────────────────────────
    async fn request_worker_lease(
        &self,
        req: proto::RequestWorkerLeaseRequest,
    ) -> Result<proto::RequestWorkerLeaseReply, Status>;
    async fn return_worker_lease(
        &self,
        req: proto::ReturnWorkerLeaseRequest,
    ) -> Result<proto::ReturnWorkerLeaseReply, Status>;

    // ── Objects ───────────────────────────────────────────────────
    async fn pin_object_ids(
        &self,
        req: proto::PinObjectIdsRequest,
    ) -> Result<proto::PinObjectIdsReply, Status>;

    // ── Blocking & actors ─────────────────────────────────────────
    async fn notify_direct_call_task_blocked(
        &self,
        req: proto::NotifyDirectCallTaskBlockedRequest,
    ) -> Result<proto::NotifyDirectCallTaskBlockedReply, Status>;
    async fn prepare_actor_checkpoint(
        &self,
        req: proto::PrepareActorCheckpointRequest,
    ) -> Result<proto::PrepareActorCheckpointReply, Status>;
    async fn notify_actor_resumed_from_checkpoint(
        &self,
        req: proto::NotifyActorResumedFromCheckpointRequest,
    ) -> Result<proto::NotifyActorResumedFromCheckpointReply, Status>;

    // ── Resources & errors ────────────────────────────────────────
    async fn set_resource(
        &self,
        req: proto::SetResourceRequest,
    ) -> Result<proto::SetResourceReply, Status>;
    async fn push_error(
        &self,
        req: proto::PushErrorRequest,
    ) -> Result<proto::PushErrorReply, Status>;

    // ── Lifecycle ─────────────────────────────────────────────────
    async fn disconnect(
        &self,
        req: proto::DisconnectRequest,
    ) -> Result<proto::DisconnectReply, Status>;
}
