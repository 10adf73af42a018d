// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! The per-process Skiff runtime.
//!
//! Every participant in a cluster — driver or worker — embeds one
//! [`core_worker::CoreWorker`]: a two-tier object store with promotion and
//! ownership tracking, direct and raylet task submission, the task execution
//! loop, and the actor handle lifecycle. The raylet, the GCS, and the shared
//! object store are external collaborators reached through their client
//! traits.

pub mod actor_handle;
pub mod actor_manager;
pub mod context;
pub mod core_worker;
pub mod dependency_resolver;
pub mod direct_actor_submitter;
pub mod direct_task_submitter;
pub mod error;
pub mod execution;
pub mod future_resolver;
pub mod memory_store;
pub mod object;
pub mod options;
pub mod plasma_provider;
pub mod reference_counter;
pub mod rpc_service;
pub mod task_manager;
pub mod task_receiver;
pub mod task_spec_builder;
pub mod worker_client;
