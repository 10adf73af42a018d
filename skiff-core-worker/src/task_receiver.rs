// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Inbound task requests.
//!
//! Both the direct (PushTask) and the raylet (AssignTask) variants validate
//! the intended recipient, then post the execution closure onto the
//! execution loop and reply with its result. The direct variant additionally
//! delivers concurrent requests for one actor in sender sequence order,
//! holding later requests until the earlier ones arrive.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use skiff_common::id::{ActorID, WorkerID};
use skiff_proto as proto;

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::execution::ExecutionLoop;

/// The facade's ExecuteTask, injected to break the ownership cycle.
pub type ExecuteTaskFn = Arc<
    dyn Fn(proto::TaskSpec) -> Pin<Box<dyn Future<Output = proto::PushTaskReply> + Send>>
        + Send
        + Sync,
>;

#[derive(Default)]
struct SequenceState {
    next_seq: i64,
    parked: BTreeMap<i64, Vec<oneshot::Sender<()>>>,
}

pub struct TaskReceiver {
    worker_id: WorkerID,
    execution_loop: Arc<ExecutionLoop>,
    execute_fn: ExecuteTaskFn,
    actor_sequences: Mutex<HashMap<ActorID, SequenceState>>,
    is_exiting: AtomicBool,
    total_executed: AtomicUsize,
}

impl TaskReceiver {
    pub fn new(
        worker_id: WorkerID,
        execution_loop: Arc<ExecutionLoop>,
        execute_fn: ExecuteTaskFn,
    ) -> Self {
        Self {
            worker_id,
            execution_loop,
            execute_fn,
            actor_sequences: Mutex::new(HashMap::new()),
            is_exiting: AtomicBool::new(false),
            total_executed: AtomicUsize::new(0),
        }
    }

    /// Handle a worker-to-worker task push (direct path).
    pub async fn handle_push_task(
        &self,
        request: proto::PushTaskRequest,
    ) -> CoreWorkerResult<proto::PushTaskReply> {
        if self.is_exiting.load(Ordering::Relaxed) {
            return Ok(proto::PushTaskReply {
                worker_exiting: true,
                ..Default::default()
            });
        }
        self.validate_recipient(&request.intended_worker_id)?;
        let spec = request.task_spec.ok_or_else(|| {
            CoreWorkerError::InvalidArgument("PushTask missing task_spec".into())
        })?;

        // Actor calls carry the sender's per-handle sequence number; deliver
        // them in that order even when the RPCs race.
        let ordered = spec
            .actor_task_spec
            .as_ref()
            .filter(|_| request.sequence_number >= 0)
            .map(|actor_spec| {
                (
                    ActorID::from_binary(&actor_spec.actor_id),
                    request.sequence_number,
                )
            });
        if let Some((actor_id, seq)) = ordered {
            self.wait_for_turn(actor_id, seq).await;
            let reply = self.execute_on_loop(spec).await;
            self.advance_sequence(actor_id, seq);
            return reply;
        }

        self.execute_on_loop(spec).await
    }

    /// Handle a task assignment from the raylet (indirect path).
    pub async fn handle_assign_task(
        &self,
        request: proto::AssignTaskRequest,
    ) -> CoreWorkerResult<proto::AssignTaskReply> {
        self.validate_recipient(&request.intended_worker_id)?;
        let spec = request.task_spec.ok_or_else(|| {
            CoreWorkerError::InvalidArgument("AssignTask missing task_spec".into())
        })?;
        // Returns travel through plasma on this path; the reply is an ack.
        self.execute_on_loop(spec).await?;
        Ok(proto::AssignTaskReply::default())
    }

    /// Notification that by-reference arguments finished fetching on the
    /// callee side.
    pub fn handle_arg_wait_complete(
        &self,
        request: proto::ArgWaitCompleteRequest,
    ) -> CoreWorkerResult<proto::ArgWaitCompleteReply> {
        self.validate_recipient(&request.intended_worker_id)?;
        tracing::debug!(tag = request.tag, "argument wait complete");
        Ok(proto::ArgWaitCompleteReply::default())
    }

    async fn execute_on_loop(
        &self,
        spec: proto::TaskSpec,
    ) -> CoreWorkerResult<proto::PushTaskReply> {
        let (tx, rx) = oneshot::channel();
        let execute = Arc::clone(&self.execute_fn);
        let posted = self.execution_loop.post(async move {
            let reply = execute(spec).await;
            let _ = tx.send(reply);
        });
        if !posted {
            return Err(CoreWorkerError::Internal("execution loop stopped".into()));
        }
        let reply = rx
            .await
            .map_err(|_| CoreWorkerError::Internal("execution dropped its reply".into()))?;
        self.total_executed.fetch_add(1, Ordering::Relaxed);
        Ok(reply)
    }

    fn validate_recipient(&self, intended_worker_id: &[u8]) -> CoreWorkerResult<()> {
        if intended_worker_id.is_empty() {
            return Ok(());
        }
        if intended_worker_id.len() != WorkerID::SIZE {
            return Err(CoreWorkerError::InvalidArgument(
                "malformed intended worker ID".into(),
            ));
        }
        let intended = WorkerID::from_binary(intended_worker_id);
        if !intended.is_nil() && intended != self.worker_id {
            return Err(CoreWorkerError::InvalidArgument(format!(
                "task intended for worker {} but received by {}",
                intended.hex(),
                self.worker_id.hex()
            )));
        }
        Ok(())
    }

    async fn wait_for_turn(&self, actor_id: ActorID, seq: i64) {
        loop {
            let waiter = {
                let mut sequences = self.actor_sequences.lock();
                let state = sequences.entry(actor_id).or_default();
                if seq <= state.next_seq {
                    None
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.parked.entry(seq).or_default().push(tx);
                    Some(rx)
                }
            };
            match waiter {
                None => return,
                Some(rx) => {
                    let _ = rx.await;
                }
            }
        }
    }

    fn advance_sequence(&self, actor_id: ActorID, seq: i64) {
        let mut sequences = self.actor_sequences.lock();
        let Some(state) = sequences.get_mut(&actor_id) else {
            return;
        };
        if seq != state.next_seq {
            // A stale duplicate finished; the stream position is unchanged.
            return;
        }
        state.next_seq += 1;
        if let Some(waiters) = state.parked.remove(&state.next_seq) {
            for tx in waiters {
                let _ = tx.send(());
            }
        }
    }

    /// Stop accepting tasks; subsequent pushes reply `worker_exiting`.
    pub fn set_exiting(&self) {
        self.is_exiting.store(true, Ordering::Relaxed);
    }

    pub fn is_exiting(&self) -> bool {
        self.is_exiting.load(Ordering::Relaxed)
    }

    pub fn total_executed(&self) -> usize {
        self.total_executed.load(Ordering::Relaxed)
    }

    /// Tasks posted to the execution loop but not yet started.
    pub fn task_queue_length(&self) -> usize {
        self.execution_loop.queue_length()
    }
}
