// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! In-process fake GCS client for tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use tonic::Status;

use skiff_proto as proto;

use crate::traits::{ActorNotificationCallback, GcsClient};

/// Fake GCS that records task-table writes and lets tests publish actor
/// state transitions to subscribers by hand.
pub struct FakeGcsClient {
    added_tasks: Mutex<Vec<proto::TaskTableData>>,
    reported_errors: Mutex<Vec<proto::ReportErrorRequest>>,
    subscriptions: Mutex<HashMap<Vec<u8>, Vec<ActorNotificationCallback>>>,
}

impl FakeGcsClient {
    pub fn new() -> Self {
        Self {
            added_tasks: Mutex::new(Vec::new()),
            reported_errors: Mutex::new(Vec::new()),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Task-table rows added so far.
    pub fn added_tasks(&self) -> Vec<proto::TaskTableData> {
        self.added_tasks.lock().clone()
    }

    pub fn reported_errors(&self) -> Vec<proto::ReportErrorRequest> {
        self.reported_errors.lock().clone()
    }

    pub fn num_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Deliver an actor-table update to every subscriber of that actor.
    pub fn publish_actor_update(&self, data: proto::ActorTableData) {
        let callbacks: Vec<ActorNotificationCallback> = self
            .subscriptions
            .lock()
            .get(&data.actor_id)
            .cloned()
            .unwrap_or_default();
        for cb in callbacks {
            cb(data.clone());
        }
    }
}

impl Default for FakeGcsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GcsClient for FakeGcsClient {
    async fn add_task(&self, req: proto::AddTaskRequest) -> Result<proto::AddTaskReply, Status> {
        if let Some(data) = req.task_data {
            self.added_tasks.lock().push(data);
        }
        Ok(proto::AddTaskReply::default())
    }

    async fn report_error(
        &self,
        req: proto::ReportErrorRequest,
    ) -> Result<proto::ReportErrorReply, Status> {
        self.reported_errors.lock().push(req);
        Ok(proto::ReportErrorReply::default())
    }

    async fn subscribe_actor(
        &self,
        actor_id: Vec<u8>,
        callback: ActorNotificationCallback,
    ) -> Result<(), Status> {
        self.subscriptions
            .lock()
            .entry(actor_id)
            .or_default()
            .push(callback);
        Ok(())
    }

    async fn unsubscribe_actor(&self, actor_id: &[u8]) -> Result<(), Status> {
        self.subscriptions.lock().remove(actor_id);
        Ok(())
    }
}
