// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Retryable RPC call wrapper.
//!
//! Transport-agnostic: the caller supplies a closure performing one attempt
//! of the RPC; this wrapper classifies failures, retries transient ones with
//! exponential backoff, throttles by in-flight request bytes, and tracks the
//! believed connection state of the peer.

use std::future::Future;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tonic::{Code, Status};

/// Connection state of the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connected = 0,
    Disconnected = 1,
    Reconnecting = 2,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Connected,
            1 => Self::Disconnected,
            2 => Self::Reconnecting,
            _ => Self::Disconnected,
        }
    }
}

/// Configuration for retry behavior on RPC calls.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    pub max_retries: u32,
    /// Initial retry delay.
    pub initial_delay: Duration,
    /// Maximum retry delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
    /// How long to wait before declaring the server unavailable.
    pub server_unavailable_timeout: Duration,
    /// Maximum bytes of in-flight requests before rejecting new ones.
    pub max_pending_bytes: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
            server_unavailable_timeout: Duration::from_secs(60),
            max_pending_bytes: 100 * 1024 * 1024,
        }
    }
}

/// An RPC call wrapper with retry support.
///
/// Use [`call_with_retry`](Self::call_with_retry) to execute an RPC attempt
/// closure with automatic retries on transient failures.
#[derive(Clone)]
pub struct RetryableClient {
    retry_config: RetryConfig,
    connection_state: Arc<AtomicU8>,
    pending_bytes: Arc<AtomicUsize>,
}

impl RetryableClient {
    pub fn new(retry_config: RetryConfig) -> Self {
        Self {
            retry_config,
            connection_state: Arc::new(AtomicU8::new(ConnectionState::Connected as u8)),
            pending_bytes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry_config
    }

    /// Current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection_state.load(Ordering::Relaxed))
    }

    /// Current pending request bytes.
    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes.load(Ordering::Relaxed)
    }

    /// Whether the client believes the server is reachable.
    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// Execute an RPC call with automatic retry on transient failures.
    ///
    /// `request_size` is used for pending-bytes throttling; pass 0 to skip.
    /// `timeout` overrides the default server_unavailable_timeout. `rpc_fn`
    /// performs one attempt and is re-invoked on transient failure.
    pub async fn call_with_retry<F, Fut, T>(
        &self,
        request_size: usize,
        timeout: Option<Duration>,
        rpc_fn: F,
    ) -> Result<T, Status>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let prev = self.pending_bytes.fetch_add(request_size, Ordering::Relaxed);
        if request_size > 0 && prev + request_size > self.retry_config.max_pending_bytes {
            self.pending_bytes
                .fetch_sub(request_size, Ordering::Relaxed);
            return Err(Status::resource_exhausted(
                "max pending request bytes exceeded",
            ));
        }

        let result = self.retry_loop(timeout, &rpc_fn).await;

        self.pending_bytes
            .fetch_sub(request_size, Ordering::Relaxed);
        result
    }

    async fn retry_loop<F, Fut, T>(
        &self,
        timeout: Option<Duration>,
        rpc_fn: &F,
    ) -> Result<T, Status>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, Status>>,
    {
        let timeout_duration = timeout.unwrap_or(self.retry_config.server_unavailable_timeout);
        let deadline = tokio::time::Instant::now() + timeout_duration;
        let mut delay = self.retry_config.initial_delay;
        let mut attempts = 0u32;

        loop {
            let result = rpc_fn().await;

            match &result {
                Ok(_) => {
                    self.connection_state
                        .store(ConnectionState::Connected as u8, Ordering::Relaxed);
                    return result;
                }
                Err(status) => {
                    if !is_transient(status.code()) {
                        return result;
                    }

                    attempts += 1;
                    if attempts > self.retry_config.max_retries {
                        self.connection_state
                            .store(ConnectionState::Disconnected as u8, Ordering::Relaxed);
                        return result;
                    }

                    if tokio::time::Instant::now() + delay > deadline {
                        self.connection_state
                            .store(ConnectionState::Disconnected as u8, Ordering::Relaxed);
                        return Err(Status::deadline_exceeded(format!(
                            "server unavailable after {timeout_duration:?}"
                        )));
                    }

                    self.connection_state
                        .store(ConnectionState::Reconnecting as u8, Ordering::Relaxed);

                    tracing::debug!(
                        attempts,
                        code = ?status.code(),
                        delay_ms = delay.as_millis() as u64,
                        "retrying RPC"
                    );

                    tokio::time::sleep(delay).await;

                    delay = std::cmp::min(
                        Duration::from_secs_f64(
                            delay.as_secs_f64() * self.retry_config.multiplier,
                        ),
                        self.retry_config.max_delay,
                    );
                }
            }
        }
    }
}

impl Default for RetryableClient {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

/// Whether a status code represents a transient error worth retrying.
pub fn is_transient(code: Code) -> bool {
    matches!(
        code,
        Code::Unavailable | Code::DeadlineExceeded | Code::ResourceExhausted | Code::Aborted
    )
}
