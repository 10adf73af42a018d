// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! The execution loop and the async-actor suspension primitive.
//!
//! Task receivers post closures here; the loop sequences user-code
//! invocations. Regular workers and actors run strictly one at a time. An
//! async actor's loop admits up to `max_concurrency` jobs at once; a job
//! that awaits a [`FiberEvent`] suspends cooperatively without blocking the
//! loop.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Sequencer of user-code invocations.
pub struct ExecutionLoop {
    tx: mpsc::UnboundedSender<Job>,
    queue_length: Arc<AtomicUsize>,
    handle: Mutex<Option<JoinHandle<()>>>,
    stopped: AtomicBool,
}

impl ExecutionLoop {
    /// Start the loop. `max_concurrency` of 1 gives the strict sequential
    /// loop of regular workers; async actors pass their declared concurrency.
    pub fn start(max_concurrency: usize) -> Arc<Self> {
        assert!(max_concurrency >= 1, "max_concurrency must be at least 1");
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let queue_length = Arc::new(AtomicUsize::new(0));
        let queue_length2 = Arc::clone(&queue_length);

        let handle = tokio::spawn(async move {
            if max_concurrency == 1 {
                while let Some(job) = rx.recv().await {
                    queue_length2.fetch_sub(1, Ordering::Relaxed);
                    job.await;
                }
            } else {
                let semaphore = Arc::new(Semaphore::new(max_concurrency));
                while let Some(job) = rx.recv().await {
                    queue_length2.fetch_sub(1, Ordering::Relaxed);
                    let permit = Arc::clone(&semaphore)
                        .acquire_owned()
                        .await
                        .expect("semaphore closed");
                    tokio::spawn(async move {
                        job.await;
                        drop(permit);
                    });
                }
            }
        });

        Arc::new(Self {
            tx,
            queue_length,
            handle: Mutex::new(Some(handle)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Post a job. Returns false after the loop has stopped.
    pub fn post<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.stopped.load(Ordering::Relaxed) {
            return false;
        }
        self.queue_length.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(Box::pin(job)).is_err() {
            self.queue_length.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    /// Jobs posted but not yet started.
    pub fn queue_length(&self) -> usize {
        self.queue_length.load(Ordering::Relaxed)
    }

    /// Stop accepting work and abort the loop task.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.lock().take() {
            handle.abort();
        }
    }
}

/// A one-shot event an async-actor task suspends on.
///
/// The task yields by awaiting [`wait`](Self::wait); an I/O-side callback
/// signals [`notify`](Self::notify) to resume it. Signal-before-wait is
/// remembered.
pub struct FiberEvent {
    notify: Notify,
    set: AtomicBool,
}

impl FiberEvent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            notify: Notify::new(),
            set: AtomicBool::new(false),
        })
    }

    /// Suspend until the event is signalled.
    pub async fn wait(&self) {
        while !self.set.load(Ordering::Acquire) {
            self.notify.notified().await;
        }
    }

    /// Signal the event, resuming every waiter.
    pub fn notify(&self) {
        self.set.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }
}
