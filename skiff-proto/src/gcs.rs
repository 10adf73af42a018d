// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Request/reply pairs of the global metadata service (GCS) surface consumed
//! by the core worker.

use crate::common::TaskTableData;

/// Add a row to the GCS task table. The driver registers its own driver task
/// at startup so later errors can be correlated back to it.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddTaskRequest {
    #[prost(message, optional, tag = "1")]
    pub task_data: Option<TaskTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddTaskReply {}

/// Report a job-scoped error into the GCS error log.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportErrorRequest {
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
pub struct ReportErrorReply {}
