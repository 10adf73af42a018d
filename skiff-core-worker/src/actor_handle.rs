// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! A handle to a remote actor.
//!
//! Carries the actor's identity, creator function, liveness, the cursor
//! threading a happens-before chain across calls on this handle, and the
//! next call sequence number. Serializes to a compact blob sufficient to
//! rebuild the handle in another process.

use parking_lot::Mutex;
use prost::Message;

use skiff_common::id::{ActorID, JobID, ObjectID, TaskID, TransportType};
use skiff_proto::{ActorHandleData, FunctionDescriptor};

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::task_spec_builder::TaskSpecBuilder;

/// Liveness as last reported by the GCS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorLiveness {
    Alive,
    Reconstructing,
    Dead,
}

struct HandleState {
    cursor: ObjectID,
    task_counter: u64,
    liveness: ActorLiveness,
}

pub struct ActorHandle {
    actor_id: ActorID,
    creation_job_id: JobID,
    language: i32,
    creation_function: FunctionDescriptor,
    is_direct_call: bool,
    initial_cursor: ObjectID,
    state: Mutex<HandleState>,
}

impl ActorHandle {
    pub fn new(
        actor_id: ActorID,
        creation_job_id: JobID,
        cursor: ObjectID,
        language: i32,
        creation_function: FunctionDescriptor,
        is_direct_call: bool,
    ) -> Self {
        Self {
            actor_id,
            creation_job_id,
            language,
            creation_function,
            is_direct_call,
            initial_cursor: cursor,
            state: Mutex::new(HandleState {
                cursor,
                task_counter: 0,
                liveness: ActorLiveness::Alive,
            }),
        }
    }

    pub fn actor_id(&self) -> ActorID {
        self.actor_id
    }

    pub fn creation_job_id(&self) -> JobID {
        self.creation_job_id
    }

    pub fn language(&self) -> i32 {
        self.language
    }

    pub fn creation_function(&self) -> &FunctionDescriptor {
        &self.creation_function
    }

    pub fn is_direct_call(&self) -> bool {
        self.is_direct_call
    }

    pub fn transport_type(&self) -> TransportType {
        if self.is_direct_call {
            TransportType::Direct
        } else {
            TransportType::Raylet
        }
    }

    pub fn liveness(&self) -> ActorLiveness {
        self.state.lock().liveness
    }

    pub fn is_dead(&self) -> bool {
        self.liveness() == ActorLiveness::Dead
    }

    /// Dead is sticky: the handle stays registered so later submissions get
    /// a clear error.
    pub fn mark_dead(&self) {
        self.state.lock().liveness = ActorLiveness::Dead;
    }

    pub fn mark_reconstructing(&self) {
        let mut state = self.state.lock();
        if state.liveness != ActorLiveness::Dead {
            state.liveness = ActorLiveness::Reconstructing;
        }
    }

    pub fn mark_alive(&self) {
        let mut state = self.state.lock();
        if state.liveness != ActorLiveness::Dead {
            state.liveness = ActorLiveness::Alive;
        }
    }

    /// The restarted actor has no memory of this handle's sequence, so the
    /// chain starts over from the creation cursor.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.task_counter = 0;
        state.cursor = self.initial_cursor;
    }

    pub fn current_cursor(&self) -> ObjectID {
        self.state.lock().cursor
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.state.lock().task_counter
    }

    /// Fill the actor-task fields of a spec under construction: the current
    /// cursor and sequence number go into the spec, the chain advances to
    /// `new_cursor`.
    pub fn set_actor_task_spec(&self, builder: &mut TaskSpecBuilder, new_cursor: ObjectID) {
        let mut state = self.state.lock();
        builder.set_actor_task_spec(&self.actor_id, &state.cursor, state.task_counter);
        state.task_counter += 1;
        state.cursor = new_cursor;
    }

    /// Serialize to a blob sufficient to rebuild the handle elsewhere. The
    /// sequence counter is not carried; a deserialized handle starts its own
    /// call stream.
    pub fn serialize(&self) -> Vec<u8> {
        let state = self.state.lock();
        ActorHandleData {
            actor_id: self.actor_id.binary(),
            creation_job_id: self.creation_job_id.binary(),
            language: self.language,
            creation_function: Some(self.creation_function.clone()),
            cursor: state.cursor.binary(),
            is_direct_call: self.is_direct_call,
        }
        .encode_to_vec()
    }

    pub fn deserialize(data: &[u8]) -> CoreWorkerResult<Self> {
        let proto = ActorHandleData::decode(data).map_err(|e| {
            CoreWorkerError::InvalidArgument(format!("failed to decode actor handle: {e}"))
        })?;
        Ok(Self::new(
            ActorID::from_binary(&proto.actor_id),
            JobID::from_binary(&proto.creation_job_id),
            ObjectID::from_binary(&proto.cursor),
            proto.language,
            proto.creation_function.unwrap_or_default(),
            proto.is_direct_call,
        ))
    }
}

/// The initial cursor of an actor: the single return of its creation task.
pub fn creation_cursor(actor_id: &ActorID, transport: TransportType) -> ObjectID {
    let creation_task_id = TaskID::for_actor_creation_task(actor_id);
    ObjectID::for_task_return(&creation_task_id, 1, transport)
}
