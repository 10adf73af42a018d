// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Core worker configuration options.

use std::collections::HashMap;

use skiff_common::config::SkiffConfig;
use skiff_common::id::{JobID, NodeID, WorkerID};
use skiff_proto::Language;

/// The type of worker process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerType {
    Worker,
    Driver,
}

/// Options for initializing a CoreWorker.
#[derive(Debug, Clone)]
pub struct CoreWorkerOptions {
    pub worker_type: WorkerType,
    pub language: Language,
    pub store_socket: String,
    pub raylet_socket: String,
    pub job_id: JobID,
    pub gcs_address: String,
    pub node_ip_address: String,
    pub worker_id: WorkerID,
    pub node_id: NodeID,
    pub session_name: String,
    /// Concurrent task slots on the execution loop. 1 gives the strict
    /// sequential loop; async actors are started with their declared
    /// concurrency.
    pub max_task_concurrency: usize,
    pub config: SkiffConfig,
}

impl Default for CoreWorkerOptions {
    fn default() -> Self {
        Self {
            worker_type: WorkerType::Worker,
            language: Language::Rust,
            store_socket: String::new(),
            raylet_socket: String::new(),
            job_id: JobID::nil(),
            gcs_address: String::new(),
            node_ip_address: "127.0.0.1".to_string(),
            worker_id: WorkerID::from_random(),
            node_id: NodeID::nil(),
            session_name: String::new(),
            max_task_concurrency: 1,
            config: SkiffConfig::default(),
        }
    }
}

/// Per-call options for submitting a normal or actor task.
#[derive(Debug, Clone)]
pub struct TaskOptions {
    pub name: String,
    pub num_returns: u64,
    pub resources: HashMap<String, f64>,
    pub is_direct_call: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            num_returns: 1,
            resources: HashMap::new(),
            is_direct_call: true,
        }
    }
}

/// Options for creating an actor.
#[derive(Debug, Clone)]
pub struct ActorCreationOptions {
    pub name: String,
    pub max_reconstructions: u64,
    pub max_concurrency: i32,
    pub is_detached: bool,
    pub is_asyncio: bool,
    pub resources: HashMap<String, f64>,
    pub is_direct_call: bool,
}

impl Default for ActorCreationOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            max_reconstructions: 0,
            max_concurrency: 1,
            is_detached: false,
            is_asyncio: false,
            resources: HashMap::new(),
            is_direct_call: true,
        }
    }
}
