// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Recording fake raylet client for tests.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tonic::Status;

use skiff_proto as proto;

use crate::traits::RayletClient;

/// Records all requests by method name and returns configurable replies.
///
/// Lease replies are popped from a queue so tests can script a sequence of
/// grants/spillbacks/rejections; when the queue is empty the default reply
/// (empty, neither granted nor rejected) is returned.
pub struct FakeRayletClient {
    requests: Mutex<VecDeque<String>>,
    lease_replies: Mutex<VecDeque<proto::RequestWorkerLeaseReply>>,
    submitted_tasks: Mutex<Vec<proto::TaskSpec>>,
    pinned_object_ids: Mutex<Vec<Vec<u8>>>,
}

impl FakeRayletClient {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(VecDeque::new()),
            lease_replies: Mutex::new(VecDeque::new()),
            submitted_tasks: Mutex::new(Vec::new()),
            pinned_object_ids: Mutex::new(Vec::new()),
        }
    }

    /// Queue a reply for the next `request_worker_lease` call.
    pub fn queue_lease_reply(&self, reply: proto::RequestWorkerLeaseReply) {
        self.lease_replies.lock().push_back(reply);
    }

    /// Convenience: queue a granted lease for `worker_address`.
    pub fn queue_lease_granted(&self, worker_address: proto::Address) {
        self.queue_lease_reply(proto::RequestWorkerLeaseReply {
            worker_address: Some(worker_address),
            ..Default::default()
        });
    }

    pub fn num_requests(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn pop_request(&self) -> Option<String> {
        self.requests.lock().pop_front()
    }

    /// Count of recorded calls to the named method.
    pub fn count(&self, method: &str) -> usize {
        self.requests.lock().iter().filter(|m| *m == method).count()
    }

    /// Task specs received via the indirect `submit_task` path.
    pub fn submitted_tasks(&self) -> Vec<proto::TaskSpec> {
        self.submitted_tasks.lock().clone()
    }

    /// Object IDs pinned via `pin_object_ids`, in call order.
    pub fn pinned_object_ids(&self) -> Vec<Vec<u8>> {
        self.pinned_object_ids.lock().clone()
    }

    fn record(&self, name: &str) {
        self.requests.lock().push_back(name.to_string());
    }
}

impl Default for FakeRayletClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RayletClient for FakeRayletClient {
    async fn submit_task(
        &self,
        req: proto::SubmitTaskRequest,
    ) -> Result<proto::SubmitTaskReply, Status> {
        self.record("submit_task");
        if let Some(spec) = req.task_spec {
            self.submitted_tasks.lock().push(spec);
        }
        Ok(proto::SubmitTaskReply::default())
    }

    async fn request_worker_lease(
        &self,
        _req: proto::RequestWorkerLeaseRequest,
    ) -> Result<proto::RequestWorkerLeaseReply, Status> {
        self.record("request_worker_lease");
        Ok(self.lease_replies.lock().pop_front().unwrap_or_default())
    }

    async fn return_worker_lease(
        &self,
        _req: proto::ReturnWorkerLeaseRequest,
    ) -> Result<proto::ReturnWorkerLeaseReply, Status> {
        self.record("return_worker_lease");
        Ok(proto::ReturnWorkerLeaseReply::default())
    }

    async fn pin_object_ids(
        &self,
        req: proto::PinObjectIdsRequest,
    ) -> Result<proto::PinObjectIdsReply, Status> {
        self.record("pin_object_ids");
        let mut pinned = self.pinned_object_ids.lock();
        let successes = req.object_ids.iter().map(|_| true).collect();
        pinned.extend(req.object_ids);
        Ok(proto::PinObjectIdsReply { successes })
    }

    async fn notify_direct_call_task_blocked(
        &self,
        _req: proto::NotifyDirectCallTaskBlockedRequest,
    ) -> Result<proto::NotifyDirectCallTaskBlockedReply, Status> {
        self.record("notify_direct_call_task_blocked");
        Ok(proto::NotifyDirectCallTaskBlockedReply::default())
    }

    async fn prepare_actor_checkpoint(
        &self,
        _req: proto::PrepareActorCheckpointRequest,
    ) -> Result<proto::PrepareActorCheckpointReply, Status> {
        self.record("prepare_actor_checkpoint");
        Ok(proto::PrepareActorCheckpointReply::default())
    }

    async fn notify_actor_resumed_from_checkpoint(
        &self,
        _req: proto::NotifyActorResumedFromCheckpointRequest,
    ) -> Result<proto::NotifyActorResumedFromCheckpointReply, Status> {
        self.record("notify_actor_resumed_from_checkpoint");
        Ok(proto::NotifyActorResumedFromCheckpointReply::default())
    }

    async fn set_resource(
        &self,
        _req: proto::SetResourceRequest,
    ) -> Result<proto::SetResourceReply, Status> {
        self.record("set_resource");
        Ok(proto::SetResourceReply::default())
    }

    async fn push_error(
        &self,
        _req: proto::PushErrorRequest,
    ) -> Result<proto::PushErrorReply, Status> {
        self.record("push_error");
        Ok(proto::PushErrorReply::default())
    }

    async fn disconnect(
        &self,
        _req: proto::DisconnectRequest,
    ) -> Result<proto::DisconnectReply, Status> {
        self.record("disconnect");
        Ok(proto::DisconnectReply::default())
    }
}
