// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Request/reply pairs of the local scheduler (raylet) surface consumed by
//! the core worker.

use std::collections::HashMap;

use crate::common::{Address, TaskSpec};

/// Submit a task through the raylet (indirect path).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubmitTaskRequest {
    #[prost(message, optional, tag = "1")]
    pub task_spec: Option<TaskSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubmitTaskReply {}

/// Request a worker lease for a resource shape.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestWorkerLeaseRequest {
    #[prost(map = "string, double", tag = "1")]
    pub required_resources: HashMap<String, f64>,
    #[prost(message, optional, tag = "2")]
    pub caller_address: Option<Address>,
    #[prost(bytes = "vec", tag = "3")]
    pub lease_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestWorkerLeaseReply {
    /// Set when the lease is granted.
    #[prost(message, optional, tag = "1")]
    pub worker_address: Option<Address>,
    /// Set when the request spilled back to another node's raylet.
    #[prost(message, optional, tag = "2")]
    pub retry_at_raylet_address: Option<Address>,
    #[prost(bool, tag = "3")]
    pub rejected: bool,
    #[prost(bool, tag = "4")]
    pub canceled: bool,
    #[prost(string, tag = "5")]
    pub scheduling_failure_message: String,
}

/// Return a leased worker to the raylet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReturnWorkerLeaseRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub worker_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub disconnect_worker: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReturnWorkerLeaseReply {}

/// Ask the raylet to pin objects owned by `owner_address` against eviction.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinObjectIdsRequest {
    #[prost(message, optional, tag = "1")]
    pub owner_address: Option<Address>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub object_ids: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinObjectIdsReply {
    #[prost(bool, repeated, tag = "1")]
    pub successes: Vec<bool>,
}

/// Tell the raylet a direct-call task is blocked in a get/wait so its
/// resources can be released early.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotifyDirectCallTaskBlockedRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotifyDirectCallTaskBlockedReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareActorCheckpointRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareActorCheckpointReply {
    #[prost(bytes = "vec", tag = "1")]
    pub checkpoint_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotifyActorResumedFromCheckpointRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub checkpoint_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NotifyActorResumedFromCheckpointReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetResourceRequest {
    #[prost(string, tag = "1")]
    pub resource_name: String,
    #[prost(double, tag = "2")]
    pub capacity: f64,
    #[prost(bytes = "vec", tag = "3")]
    pub node_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SetResourceReply {}

/// Report an error back to the driver via the raylet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushErrorRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub job_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub error_type: String,
    #[prost(string, tag = "3")]
    pub error_message: String,
    #[prost(double, tag = "4")]
    pub timestamp: f64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PushErrorReply {}

/// Worker-initiated disconnect from its raylet.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DisconnectRequest {
    #[prost(bool, tag = "1")]
    pub intentional: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DisconnectReply {}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_lease_reply_roundtrip() {
        let reply = RequestWorkerLeaseReply {
            worker_address: Some(Address {
                raylet_id: vec![1; 28],
                ip_address: "10.0.0.1".to_string(),
                port: 5000,
                worker_id: vec![2; 28],
            }),
            ..Default::default()
        };
        let bytes = reply.encode_to_vec();
        assert_eq!(
            RequestWorkerLeaseReply::decode(bytes.as_slice()).unwrap(),
            reply
        );
    }
}
