// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Request/reply pairs of the core worker service.

use std::collections::HashMap;

use crate::common::TaskSpec;

/// Worker→worker task push (direct path).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushTaskRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_worker_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub task_spec: Option<TaskSpec>,
    /// Per-actor-handle sequence number; receivers deliver in order.
    #[prost(int64, tag = "3")]
    pub sequence_number: i64,
}

/// A task return carried in a PushTask reply. Small direct-call returns are
/// inline (`data`/`metadata`); large ones set `in_plasma` and the caller
/// fetches from the shared store.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReturnObject {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub metadata: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub in_plasma: bool,
    #[prost(uint64, tag = "5")]
    pub size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushTaskReply {
    #[prost(message, repeated, tag = "1")]
    pub return_objects: Vec<ReturnObject>,
    #[prost(bool, tag = "2")]
    pub worker_exiting: bool,
    #[prost(bool, tag = "3")]
    pub is_retryable_error: bool,
    #[prost(bool, tag = "4")]
    pub is_application_error: bool,
    #[prost(string, tag = "5")]
    pub task_execution_error: String,
}

/// Raylet→worker task assignment (indirect path).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssignTaskRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_worker_id: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub task_spec: Option<TaskSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AssignTaskReply {}

/// Notifies a callee that its by-reference arguments have been fetched.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArgWaitCompleteRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_worker_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub tag: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArgWaitCompleteReply {}

/// Borrower→owner query; the owner replies once the object exists.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectStatusRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub owner_id: Vec<u8>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ObjectStatus {
    Created = 0,
    OutOfScope = 1,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectStatusReply {
    #[prost(enumeration = "ObjectStatus", tag = "1")]
    pub status: i32,
}

/// Raylet→owner: reply when the object's refcount reaches zero so the raylet
/// may unpin it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaitForObjectEvictionRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_worker_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub object_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaitForObjectEvictionReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KillActorRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub intended_actor_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub force_kill: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KillActorReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCoreWorkerStatsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CoreWorkerStats {
    #[prost(int64, tag = "1")]
    pub num_pending_tasks: i64,
    #[prost(int64, tag = "2")]
    pub task_queue_length: i64,
    #[prost(int64, tag = "3")]
    pub num_executed_tasks: i64,
    #[prost(int64, tag = "4")]
    pub num_object_ids_in_scope: i64,
    #[prost(string, tag = "5")]
    pub current_task_desc: String,
    #[prost(string, tag = "6")]
    pub ip_address: String,
    #[prost(int32, tag = "7")]
    pub port: i32,
    #[prost(bytes = "vec", tag = "8")]
    pub actor_id: Vec<u8>,
    #[prost(string, tag = "9")]
    pub actor_title: String,
    #[prost(map = "string, string", tag = "10")]
    pub webui_display: HashMap<String, String>,
    #[prost(int64, tag = "11")]
    pub num_local_objects: i64,
    #[prost(int64, tag = "12")]
    pub used_object_store_memory: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetCoreWorkerStatsReply {
    #[prost(message, optional, tag = "1")]
    pub core_worker_stats: Option<CoreWorkerStats>,
}
