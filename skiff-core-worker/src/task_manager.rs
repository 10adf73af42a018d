// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Pending-task bookkeeping on the submitting side.
//!
//! Tracks every in-flight task with its spec and retry budget, writes return
//! objects into the memory store on completion, and on failure either
//! consumes a retry (worker death) or materializes error markers for every
//! return ID so a later Get surfaces the failure.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use skiff_common::id::{ObjectID, TaskID};
use skiff_proto::{self as proto, ErrorType};

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::memory_store::CoreWorkerMemoryStore;
use crate::object::StoreObject;
use crate::reference_counter::ReferenceCounter;
use crate::task_spec_builder::{task_arg_ids, task_id_of, task_return_ids};

/// Invoked to requeue a task whose failure consumed a retry. The facade
/// defers the resubmission through the internal heartbeat.
pub type RetryCallback = Arc<dyn Fn(proto::TaskSpec) + Send + Sync>;

struct PendingTask {
    spec: proto::TaskSpec,
    retries_left: u32,
    caller_address: proto::Address,
}

/// Tracks pending tasks keyed by TaskID.
pub struct TaskManager {
    memory_store: Arc<CoreWorkerMemoryStore>,
    reference_counter: Arc<ReferenceCounter>,
    retry_callback: RetryCallback,
    pending: Mutex<HashMap<TaskID, PendingTask>>,
    shutdown_hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// Only worker death is worth a retry: the same spec can run elsewhere. An
/// actor death is terminal for its queued calls, and application errors
/// would fail again.
pub fn is_retryable_error(error_type: ErrorType) -> bool {
    matches!(error_type, ErrorType::WorkerDied)
}

impl TaskManager {
    pub fn new(
        memory_store: Arc<CoreWorkerMemoryStore>,
        reference_counter: Arc<ReferenceCounter>,
        retry_callback: RetryCallback,
    ) -> Self {
        Self {
            memory_store,
            reference_counter,
            retry_callback,
            pending: Mutex::new(HashMap::new()),
            shutdown_hook: Mutex::new(None),
        }
    }

    /// Record a task before submission. Pins argument objects and registers
    /// the pending entry so this process can answer GetObjectStatus queries
    /// for the task's returns.
    pub fn add_pending_task(
        &self,
        caller_address: proto::Address,
        spec: &proto::TaskSpec,
        max_retries: u32,
    ) -> CoreWorkerResult<()> {
        if self.shutdown_hook.lock().is_some() {
            return Err(CoreWorkerError::TaskSubmissionFailed(
                "task manager is draining for shutdown".into(),
            ));
        }
        self.reference_counter
            .update_submitted_task_references(&task_arg_ids(spec));
        let task_id = task_id_of(spec);
        self.pending.lock().insert(
            task_id,
            PendingTask {
                spec: spec.clone(),
                retries_left: max_retries,
                caller_address,
            },
        );
        Ok(())
    }

    /// Record a successful reply: write each returned object into the memory
    /// store (inline payloads as values, plasma-resident returns as the
    /// in-plasma sentinel), then release the pending entry.
    pub fn complete_pending_task(&self, task_id: TaskID, reply: &proto::PushTaskReply) {
        let Some(entry) = self.pending.lock().remove(&task_id) else {
            tracing::debug!(task_id = %task_id.hex(), "completion for unknown task");
            return;
        };

        for ret in &reply.return_objects {
            let object_id = ObjectID::from_binary(&ret.object_id);
            let object = if ret.in_plasma {
                StoreObject::InPlasma
            } else {
                StoreObject::from_wire(proto::Object {
                    data: ret.data.clone(),
                    metadata: ret.metadata.clone(),
                    nested_refs: Vec::new(),
                })
            };
            // Duplicate puts happen when a retried task completes twice.
            if let Err(e) = self.memory_store.put(object_id, object) {
                tracing::debug!(object_id = %object_id.hex(), error = %e, "return object already stored");
            }
        }

        self.finish_task(&entry.spec);
    }

    /// Record a failed task. If the error is retryable and the task has
    /// budget left, consume one retry and hand the spec to the retry
    /// callback; otherwise write the error marker to every return ID.
    pub fn pending_task_failed(&self, task_id: TaskID, error_type: ErrorType) {
        let retry_spec = {
            let mut pending = self.pending.lock();
            let Some(entry) = pending.get_mut(&task_id) else {
                tracing::debug!(task_id = %task_id.hex(), "failure for unknown task");
                return;
            };
            if is_retryable_error(error_type) && entry.retries_left > 0 {
                entry.retries_left -= 1;
                tracing::error!(
                    task_id = %task_id.hex(),
                    retries_left = entry.retries_left,
                    ?error_type,
                    "task failed, will resubmit"
                );
                Some(entry.spec.clone())
            } else {
                None
            }
        };

        if let Some(spec) = retry_spec {
            (self.retry_callback)(spec);
            return;
        }

        let Some(entry) = self.pending.lock().remove(&task_id) else {
            return;
        };
        tracing::warn!(task_id = %task_id.hex(), ?error_type, "task failed permanently");
        for return_id in task_return_ids(&entry.spec) {
            if let Err(e) = self
                .memory_store
                .put(return_id, StoreObject::Error(error_type))
            {
                tracing::debug!(object_id = %return_id.hex(), error = %e, "error marker already stored");
            }
        }
        self.finish_task(&entry.spec);
    }

    /// Whether the task still has a pending entry. Consulted when answering
    /// GetObjectStatus for one of its returns.
    pub fn is_task_pending(&self, task_id: &TaskID) -> bool {
        self.pending.lock().contains_key(task_id)
    }

    /// The caller address recorded for a pending task.
    pub fn caller_address(&self, task_id: &TaskID) -> Option<proto::Address> {
        self.pending
            .lock()
            .get(task_id)
            .map(|entry| entry.caller_address.clone())
    }

    pub fn num_pending_tasks(&self) -> usize {
        self.pending.lock().len()
    }

    /// Stop accepting new work; run `on_idle` once no tasks are pending
    /// (immediately if already idle).
    pub fn drain_and_shutdown(&self, on_idle: Box<dyn FnOnce() + Send>) {
        let idle = self.pending.lock().is_empty();
        if idle {
            on_idle();
        } else {
            *self.shutdown_hook.lock() = Some(on_idle);
        }
    }

    fn finish_task(&self, spec: &proto::TaskSpec) {
        self.reference_counter
            .update_finished_task_references(&task_arg_ids(spec));
        if self.pending.lock().is_empty() {
            if let Some(hook) = self.shutdown_hook.lock().take() {
                hook();
            }
        }
    }
}

/// Build the inline reply entry for a return object.
pub fn inline_return_object(
    object_id: &ObjectID,
    object: &StoreObject,
) -> proto::ReturnObject {
    let wire = object.to_wire();
    proto::ReturnObject {
        object_id: object_id.binary(),
        size: wire.data.len() as u64,
        data: wire.data,
        metadata: wire.metadata,
        in_plasma: false,
    }
}

/// Build the plasma-resident reply entry for a return object.
pub fn plasma_return_object(
    object_id: &ObjectID,
    size: u64,
) -> proto::ReturnObject {
    proto::ReturnObject {
        object_id: object_id.binary(),
        data: Vec::new(),
        metadata: Vec::new(),
        in_plasma: true,
        size,
    }
}

/// The marker entry used when execution itself failed.
pub fn error_return_object(
    object_id: &ObjectID,
    error_type: ErrorType,
) -> proto::ReturnObject {
    inline_return_object(object_id, &StoreObject::Error(error_type))
}
