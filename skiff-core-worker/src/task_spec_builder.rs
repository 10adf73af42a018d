// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Builder for `TaskSpec` messages, plus helpers derived from a spec.

use std::collections::HashMap;

use bytes::Bytes;

use skiff_common::id::{ActorID, JobID, ObjectID, TaskID, TransportType};
use skiff_proto::{
    self as proto, ActorCreationTaskSpec, ActorTaskSpec, Address, FunctionDescriptor, TaskSpec,
    TaskType,
};

/// Builder for constructing a `TaskSpec` message.
pub struct TaskSpecBuilder {
    spec: TaskSpec,
}

impl TaskSpecBuilder {
    pub fn new() -> Self {
        Self {
            spec: TaskSpec::default(),
        }
    }

    /// Set common fields shared by all task types.
    #[allow(clippy::too_many_arguments)]
    pub fn set_common_task_spec(
        &mut self,
        task_id: &TaskID,
        name: String,
        function: FunctionDescriptor,
        job_id: &JobID,
        parent_task_id: &TaskID,
        parent_counter: u64,
        caller_id: &TaskID,
        caller_address: Address,
        num_returns: u64,
        required_resources: HashMap<String, f64>,
        is_direct_call: bool,
    ) -> &mut Self {
        self.spec.task_id = task_id.binary();
        self.spec.name = name;
        self.spec.function = Some(function);
        self.spec.job_id = job_id.binary();
        self.spec.parent_task_id = parent_task_id.binary();
        self.spec.parent_counter = parent_counter;
        self.spec.caller_id = caller_id.binary();
        self.spec.caller_address = Some(caller_address);
        self.spec.num_returns = num_returns;
        self.spec.required_resources = required_resources;
        self.spec.is_direct_call = is_direct_call;
        self
    }

    pub fn set_normal_task_spec(&mut self) -> &mut Self {
        self.spec.r#type = TaskType::NormalTask as i32;
        self
    }

    #[allow(clippy::too_many_arguments)]
    pub fn set_actor_creation_task_spec(
        &mut self,
        actor_id: &ActorID,
        max_reconstructions: u64,
        max_concurrency: i32,
        is_detached: bool,
        is_asyncio: bool,
        name: String,
    ) -> &mut Self {
        self.spec.r#type = TaskType::ActorCreationTask as i32;
        self.spec.actor_creation_task_spec = Some(ActorCreationTaskSpec {
            actor_id: actor_id.binary(),
            max_reconstructions,
            max_concurrency,
            is_detached,
            is_asyncio,
            name,
        });
        self
    }

    pub fn set_actor_task_spec(
        &mut self,
        actor_id: &ActorID,
        previous_cursor: &ObjectID,
        sequence_number: u64,
    ) -> &mut Self {
        self.spec.r#type = TaskType::ActorTask as i32;
        self.spec.actor_task_spec = Some(ActorTaskSpec {
            actor_id: actor_id.binary(),
            previous_cursor: previous_cursor.binary(),
            sequence_number,
        });
        self
    }

    pub fn add_arg(&mut self, arg: proto::TaskArg) -> &mut Self {
        self.spec.args.push(arg);
        self
    }

    pub fn add_by_ref_arg(&mut self, object_id: &ObjectID) -> &mut Self {
        self.spec.args.push(by_ref_arg(object_id));
        self
    }

    pub fn add_by_value_arg(&mut self, data: Bytes, metadata: Bytes) -> &mut Self {
        self.spec.args.push(by_value_arg(data, metadata));
        self
    }

    pub fn set_max_retries(&mut self, max_retries: u32) -> &mut Self {
        self.spec.max_retries = max_retries;
        self
    }

    pub fn build(self) -> TaskSpec {
        self.spec
    }
}

impl Default for TaskSpecBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A by-reference task argument.
pub fn by_ref_arg(object_id: &ObjectID) -> proto::TaskArg {
    proto::TaskArg {
        object_ref: Some(proto::ObjectReference {
            object_id: object_id.binary(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A by-value task argument.
pub fn by_value_arg(data: Bytes, metadata: Bytes) -> proto::TaskArg {
    proto::TaskArg {
        object_ref: None,
        data: data.to_vec(),
        metadata: metadata.to_vec(),
    }
}

// ─── Helpers derived from a spec ────────────────────────────────────────────

/// The transport the spec's return objects travel by.
pub fn task_transport(spec: &TaskSpec) -> TransportType {
    if spec.is_direct_call {
        TransportType::Direct
    } else {
        TransportType::Raylet
    }
}

pub fn task_id_of(spec: &TaskSpec) -> TaskID {
    TaskID::from_binary(&spec.task_id)
}

/// Return object IDs of a task: deterministic given its TaskID, return
/// count, and transport.
pub fn task_return_ids(spec: &TaskSpec) -> Vec<ObjectID> {
    let task_id = task_id_of(spec);
    let transport = task_transport(spec);
    (1..=spec.num_returns)
        .map(|i| ObjectID::for_task_return(&task_id, i as u32, transport))
        .collect()
}

/// ObjectIDs of all by-reference arguments, in argument order.
pub fn task_arg_ids(spec: &TaskSpec) -> Vec<ObjectID> {
    spec.args
        .iter()
        .filter_map(|arg| {
            arg.object_ref
                .as_ref()
                .map(|r| ObjectID::from_binary(&r.object_id))
        })
        .collect()
}

/// Canonical string key for a task's resource shape; tasks of the same shape
/// share worker leases.
pub fn scheduling_class_of(resources: &HashMap<String, f64>) -> String {
    let mut entries: Vec<(&String, &f64)> = resources.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .iter()
        .map(|(name, amount)| format!("{name}:{amount}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_normal_task() {
        let tid = TaskID::from_random();
        let jid = JobID::from_int(1);
        let parent = TaskID::from_random();
        let mut builder = TaskSpecBuilder::new();
        builder
            .set_common_task_spec(
                &tid,
                "my_func".into(),
                FunctionDescriptor::default(),
                &jid,
                &parent,
                0,
                &parent,
                Address::default(),
                2,
                HashMap::new(),
                true,
            )
            .set_normal_task_spec();
        let spec = builder.build();

        assert_eq!(spec.task_id, tid.binary());
        assert_eq!(spec.name, "my_func");
        assert_eq!(spec.r#type, TaskType::NormalTask as i32);
        assert_eq!(spec.num_returns, 2);
        assert!(spec.is_direct_call);

        let return_ids = task_return_ids(&spec);
        assert_eq!(return_ids.len(), 2);
        assert_eq!(return_ids[0].object_index(), 1);
        assert_eq!(return_ids[1].object_index(), 2);
        assert!(return_ids.iter().all(|id| id.is_direct_call_type()));
        assert!(return_ids.iter().all(|id| id.task_id() == tid));
    }

    #[test]
    fn test_build_actor_task_carries_cursor() {
        let aid = ActorID::from_random();
        let cursor = ObjectID::from_random();
        let mut builder = TaskSpecBuilder::new();
        builder.set_actor_task_spec(&aid, &cursor, 7);
        let spec = builder.build();
        let actor_spec = spec.actor_task_spec.unwrap();
        assert_eq!(actor_spec.previous_cursor, cursor.binary());
        assert_eq!(actor_spec.sequence_number, 7);
    }

    #[test]
    fn test_args_partition() {
        let by_ref = ObjectID::from_random();
        let mut builder = TaskSpecBuilder::new();
        builder
            .add_by_ref_arg(&by_ref)
            .add_by_value_arg(Bytes::from("inline"), Bytes::new());
        let spec = builder.build();
        assert_eq!(spec.args.len(), 2);
        assert_eq!(task_arg_ids(&spec), vec![by_ref]);
    }

    #[test]
    fn test_scheduling_class_canonical() {
        let a = HashMap::from([("GPU".to_string(), 1.0), ("CPU".to_string(), 2.0)]);
        let b = HashMap::from([("CPU".to_string(), 2.0), ("GPU".to_string(), 1.0)]);
        assert_eq!(scheduling_class_of(&a), scheduling_class_of(&b));
        assert_eq!(scheduling_class_of(&a), "CPU:2,GPU:1");
    }
}
