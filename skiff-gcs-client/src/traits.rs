// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async trait for GCS client operations.

use std::sync::Arc;

use skiff_proto as proto;
use tonic::Status;

/// Invoked on the subscriber for every published update of a watched actor.
pub type ActorNotificationCallback = Arc<dyn Fn(proto::ActorTableData) + Send + Sync>;

/// Async trait for the GCS operations the core worker consumes.
#[async_trait::async_trait]
pub trait GcsClient: Send + Sync {
    /// Add a row to the task table (driver task registration).
    async fn add_task(&self, req: proto::AddTaskRequest) -> Result<proto::AddTaskReply, Status>;

    /// Report a job-scoped error.
    async fn report_error(
        &self,
        req: proto::ReportErrorRequest,
    ) -> Result<proto::ReportErrorReply, Status>;

    /// Subscribe to state transitions of one actor. The callback fires on
    /// every published update until `unsubscribe_actor`.
    async fn subscribe_actor(
        &self,
        actor_id: Vec<u8>,
        callback: ActorNotificationCallback,
    ) -> Result<(), Status>;

    /// Stop watching an actor.
    async fn unsubscribe_actor(&self, actor_id: &[u8]) -> Result<(), Status>;
}
