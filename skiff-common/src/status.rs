// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Skiff status/error types.
//!
//! Operations return `Result<T, SkiffError>`; the status code classifies the
//! failure for callers that dispatch on it (timeouts, store-full, signals).

use std::fmt;

/// Status codes for Skiff operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i8)]
pub enum StatusCode {
    OK = 0,
    Invalid = 1,
    InvalidArgument = 2,
    IOError = 3,
    TimedOut = 4,
    Interrupted = 5,
    NotFound = 6,
    Disconnected = 7,
    ObjectExists = 8,
    ObjectNotFound = 9,
    ObjectStoreFull = 10,
    RpcError = 11,
    UnknownError = 12,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OK => "OK",
            Self::Invalid => "Invalid",
            Self::InvalidArgument => "InvalidArgument",
            Self::IOError => "IOError",
            Self::TimedOut => "TimedOut",
            Self::Interrupted => "Interrupted",
            Self::NotFound => "NotFound",
            Self::Disconnected => "Disconnected",
            Self::ObjectExists => "ObjectExists",
            Self::ObjectNotFound => "ObjectNotFound",
            Self::ObjectStoreFull => "ObjectStoreFull",
            Self::RpcError => "RpcError",
            Self::UnknownError => "UnknownError",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The primary error type for Skiff operations.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SkiffError {
    pub code: StatusCode,
    pub message: String,
    /// For RpcError, the transport-level status code.
    pub rpc_code: Option<i32>,
}

impl SkiffError {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            rpc_code: None,
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::Invalid, msg)
    }
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::InvalidArgument, msg)
    }
    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::IOError, msg)
    }
    pub fn timed_out(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::TimedOut, msg)
    }
    pub fn interrupted(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::Interrupted, msg)
    }
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NotFound, msg)
    }
    pub fn disconnected(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::Disconnected, msg)
    }
    pub fn object_exists(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::ObjectExists, msg)
    }
    pub fn object_not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::ObjectNotFound, msg)
    }
    pub fn object_store_full(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::ObjectStoreFull, msg)
    }
    pub fn rpc_error(msg: impl Into<String>, rpc_code: i32) -> Self {
        Self {
            code: StatusCode::RpcError,
            message: msg.into(),
            rpc_code: Some(rpc_code),
        }
    }

    pub fn is_timed_out(&self) -> bool {
        self.code == StatusCode::TimedOut
    }
    pub fn is_interrupted(&self) -> bool {
        self.code == StatusCode::Interrupted
    }
    pub fn is_object_exists(&self) -> bool {
        self.code == StatusCode::ObjectExists
    }
    pub fn is_object_store_full(&self) -> bool {
        self.code == StatusCode::ObjectStoreFull
    }
    pub fn is_rpc_error(&self) -> bool {
        self.code == StatusCode::RpcError
    }
    pub fn is_disconnected(&self) -> bool {
        self.code == StatusCode::Disconnected
    }
}

/// Convenience alias for `Result<T, SkiffError>`.
pub type SkiffResult<T> = Result<T, SkiffError>;
