// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Core wire structures shared by every service surface.

use std::collections::HashMap;

/// The language hosting the task's user code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum Language {
    Python = 0,
    Java = 1,
    Cpp = 2,
    Rust = 3,
}

/// The kind of task a TaskSpec describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum TaskType {
    NormalTask = 0,
    ActorCreationTask = 1,
    ActorTask = 2,
    DriverTask = 3,
}

/// Failure kinds carried inside object metadata markers. Language bindings
/// raise these as exceptions at Get time. `ObjectInPlasma` is a control
/// marker, not an error: it redirects a direct-call get to the plasma store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorType {
    TaskExecutionException = 0,
    WorkerDied = 1,
    ActorDied = 2,
    ObjectUnreconstructable = 3,
    ObjectInPlasma = 4,
}

/// Actor liveness states published by the GCS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActorState {
    Pending = 0,
    Alive = 1,
    Reconstructing = 2,
    Dead = 3,
}

/// The network address of a worker, including its raylet and worker IDs.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(bytes = "vec", tag = "1")]
    pub raylet_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub ip_address: String,
    #[prost(int32, tag = "3")]
    pub port: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub worker_id: Vec<u8>,
}

/// Identifies the user function a task invokes.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionDescriptor {
    #[prost(enumeration = "Language", tag = "1")]
    pub language: i32,
    /// Language-specific descriptor parts (e.g. module, class, function).
    #[prost(string, repeated, tag = "2")]
    pub parts: Vec<String>,
}

/// A reference to an object together with its ownership provenance.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectReference {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub owner_id: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub owner_address: Option<Address>,
}

/// A task argument: either a reference to an object or an inline value.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskArg {
    #[prost(message, optional, tag = "1")]
    pub object_ref: Option<ObjectReference>,
    #[prost(bytes = "vec", tag = "2")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub metadata: Vec<u8>,
}

/// An object payload on the wire: data, metadata, and any object IDs the
/// payload transitively references.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Object {
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub metadata: Vec<u8>,
    #[prost(message, repeated, tag = "3")]
    pub nested_refs: Vec<ObjectReference>,
}

/// Extra fields present only on actor creation tasks.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorCreationTaskSpec {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(uint64, tag = "2")]
    pub max_reconstructions: u64,
    #[prost(int32, tag = "3")]
    pub max_concurrency: i32,
    #[prost(bool, tag = "4")]
    pub is_detached: bool,
    #[prost(bool, tag = "5")]
    pub is_asyncio: bool,
    #[prost(string, tag = "6")]
    pub name: String,
}

/// Extra fields present only on actor tasks. `previous_cursor` threads the
/// happens-before chain across calls on one handle.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorTaskSpec {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub previous_cursor: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub sequence_number: u64,
}

/// The full specification of a task, sufficient for any worker to execute it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskSpec {
    #[prost(enumeration = "TaskType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bytes = "vec", tag = "3")]
    pub job_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "4")]
    pub task_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "5")]
    pub parent_task_id: Vec<u8>,
    #[prost(uint64, tag = "6")]
    pub parent_counter: u64,
    #[prost(bytes = "vec", tag = "7")]
    pub caller_id: Vec<u8>,
    #[prost(message, optional, tag = "8")]
    pub caller_address: Option<Address>,
    #[prost(message, optional, tag = "9")]
    pub function: Option<FunctionDescriptor>,
    #[prost(message, repeated, tag = "10")]
    pub args: Vec<TaskArg>,
    #[prost(uint64, tag = "11")]
    pub num_returns: u64,
    #[prost(map = "string, double", tag = "12")]
    pub required_resources: HashMap<String, f64>,
    #[prost(bool, tag = "13")]
    pub is_direct_call: bool,
    #[prost(uint32, tag = "14")]
    pub max_retries: u32,
    #[prost(message, optional, tag = "15")]
    pub actor_creation_task_spec: Option<ActorCreationTaskSpec>,
    #[prost(message, optional, tag = "16")]
    pub actor_task_spec: Option<ActorTaskSpec>,
}

/// The serialized form of an actor handle, sufficient to rebuild it in
/// another process.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorHandleData {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub creation_job_id: Vec<u8>,
    #[prost(enumeration = "Language", tag = "3")]
    pub language: i32,
    #[prost(message, optional, tag = "4")]
    pub creation_function: Option<FunctionDescriptor>,
    #[prost(bytes = "vec", tag = "5")]
    pub cursor: Vec<u8>,
    #[prost(bool, tag = "6")]
    pub is_direct_call: bool,
}

/// One actor's row in the GCS actor table, as published to subscribers.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorTableData {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(enumeration = "ActorState", tag = "2")]
    pub state: i32,
    #[prost(message, optional, tag = "3")]
    pub address: Option<Address>,
}

/// One task's row in the GCS task table.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskTableData {
    #[prost(message, optional, tag = "1")]
    pub task_spec: Option<TaskSpec>,
}
