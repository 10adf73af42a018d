// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Client trait for worker-to-worker RPCs.
//!
//! The direct submitters, the future resolver, and KillActor all reach peer
//! workers through this trait; the factory hides how a client is built for an
//! address (real transport in production, in-process wiring in tests).

use std::sync::Arc;

use tonic::Status;

use skiff_proto as proto;

/// Async trait for the core-worker RPCs one worker invokes on another.
#[async_trait::async_trait]
pub trait CoreWorkerClient: Send + Sync {
    async fn push_task(
        &self,
        req: proto::PushTaskRequest,
    ) -> Result<proto::PushTaskReply, Status>;

    async fn get_object_status(
        &self,
        req: proto::GetObjectStatusRequest,
    ) -> Result<proto::GetObjectStatusReply, Status>;

    async fn kill_actor(
        &self,
        req: proto::KillActorRequest,
    ) -> Result<proto::KillActorReply, Status>;
}

/// Builds (or reuses) a client for a peer worker's address.
pub type ClientFactory = Arc<dyn Fn(&proto::Address) -> Arc<dyn CoreWorkerClient> + Send + Sync>;

/// A client for an unreachable peer; every call fails with `unavailable`.
/// The default factory when no transport is wired.
pub struct DisconnectedWorkerClient;

#[async_trait::async_trait]
impl CoreWorkerClient for DisconnectedWorkerClient {
    async fn push_task(
        &self,
        _req: proto::PushTaskRequest,
    ) -> Result<proto::PushTaskReply, Status> {
        Err(Status::unavailable("no worker transport configured"))
    }

    async fn get_object_status(
        &self,
        _req: proto::GetObjectStatusRequest,
    ) -> Result<proto::GetObjectStatusReply, Status> {
        Err(Status::unavailable("no worker transport configured"))
    }

    async fn kill_actor(
        &self,
        _req: proto::KillActorRequest,
    ) -> Result<proto::KillActorReply, Status> {
        Err(Status::unavailable("no worker transport configured"))
    }
}

/// Factory returning [`DisconnectedWorkerClient`] for every address.
pub fn disconnected_client_factory() -> ClientFactory {
    Arc::new(|_addr| Arc::new(DisconnectedWorkerClient))
}
