// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Per-worker context: current task/actor/job IDs and index counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use skiff_common::id::{ActorID, JobID, TaskID, WorkerID};

use crate::options::WorkerType;

/// Per-worker mutable context tracking the current task, actor, and job.
pub struct WorkerContext {
    worker_type: WorkerType,
    worker_id: WorkerID,
    current_job_id: Mutex<JobID>,
    current_task_id: Mutex<TaskID>,
    current_actor_id: Mutex<ActorID>,
    task_index: AtomicU64,
    put_index: AtomicU64,
    current_task_is_direct_call: AtomicBool,
    current_actor_is_asyncio: AtomicBool,
}

impl WorkerContext {
    pub fn new(worker_type: WorkerType, worker_id: WorkerID, job_id: JobID) -> Self {
        Self {
            worker_type,
            worker_id,
            current_job_id: Mutex::new(job_id),
            current_task_id: Mutex::new(TaskID::nil()),
            current_actor_id: Mutex::new(ActorID::nil()),
            task_index: AtomicU64::new(0),
            put_index: AtomicU64::new(0),
            current_task_is_direct_call: AtomicBool::new(false),
            current_actor_is_asyncio: AtomicBool::new(false),
        }
    }

    pub fn worker_type(&self) -> WorkerType {
        self.worker_type
    }

    pub fn worker_id(&self) -> WorkerID {
        self.worker_id
    }

    pub fn current_job_id(&self) -> JobID {
        *self.current_job_id.lock()
    }

    pub fn set_current_job_id(&self, job_id: JobID) {
        *self.current_job_id.lock() = job_id;
    }

    pub fn current_task_id(&self) -> TaskID {
        *self.current_task_id.lock()
    }

    /// Set the current task. Task and put indices restart per task so that
    /// the IDs a task produces are deterministic across retries.
    pub fn set_current_task_id(&self, task_id: TaskID) {
        *self.current_task_id.lock() = task_id;
        self.task_index.store(0, Ordering::Relaxed);
        self.put_index.store(0, Ordering::Relaxed);
    }

    pub fn current_actor_id(&self) -> ActorID {
        *self.current_actor_id.lock()
    }

    pub fn set_current_actor_id(&self, actor_id: ActorID) {
        *self.current_actor_id.lock() = actor_id;
    }

    pub fn current_task_is_direct_call(&self) -> bool {
        self.current_task_is_direct_call.load(Ordering::Relaxed)
    }

    pub fn set_current_task_is_direct_call(&self, value: bool) {
        self.current_task_is_direct_call
            .store(value, Ordering::Relaxed);
    }

    pub fn current_actor_is_asyncio(&self) -> bool {
        self.current_actor_is_asyncio.load(Ordering::Relaxed)
    }

    pub fn set_current_actor_is_asyncio(&self, value: bool) {
        self.current_actor_is_asyncio.store(value, Ordering::Relaxed);
    }

    /// Get the next task index (atomically incremented).
    pub fn get_next_task_index(&self) -> u64 {
        self.task_index.fetch_add(1, Ordering::Relaxed)
    }

    /// Get the next put index (atomically incremented).
    pub fn get_next_put_index(&self) -> u64 {
        self.put_index.fetch_add(1, Ordering::Relaxed)
    }
}
