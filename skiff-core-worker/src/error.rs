// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Core worker error types.

use skiff_common::status::SkiffError;

/// Errors specific to the core worker.
#[derive(Debug, thiserror::Error)]
pub enum CoreWorkerError {
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("object already exists: {0}")]
    ObjectAlreadyExists(String),

    #[error("actor not found: {0}")]
    ActorNotFound(String),

    #[error("task submission failed: {0}")]
    TaskSubmissionFailed(String),

    #[error("core worker not initialized")]
    NotInitialized,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("operation timed out: {0}")]
    TimedOut(String),

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("status error: {0}")]
    Status(#[from] SkiffError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreWorkerError {
    /// Map a transport-level failure into the core taxonomy.
    pub fn from_rpc_status(status: tonic::Status) -> Self {
        CoreWorkerError::Io(format!("{}: {}", status.code(), status.message()))
    }
}

/// Result type alias for core worker operations.
pub type CoreWorkerResult<T> = Result<T, CoreWorkerError>;
