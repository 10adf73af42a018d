// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Direct (peer-to-peer) submission of normal tasks.
//!
//! Tasks queue per scheduling class. The submitter leases workers from the
//! local raylet, pushes queued specs to leased workers over worker-to-worker
//! RPC, and keeps an idle leased worker around for further same-class work
//! until its lease expires. Push failures are classified as worker death and
//! routed to the TaskManager, which owns the retry budget.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use skiff_proto as proto;
use skiff_raylet_client::RayletClient;
use skiff_rpc::client::{RetryConfig, RetryableClient};

use crate::dependency_resolver::LocalDependencyResolver;
use crate::error::CoreWorkerResult;
use crate::task_manager::TaskManager;
use crate::task_spec_builder::{scheduling_class_of, task_id_of};
use crate::worker_client::ClientFactory;

struct LeasedWorker {
    address: proto::Address,
    expires_at: tokio::time::Instant,
}

#[derive(Default)]
struct SubmitterState {
    queues: HashMap<String, VecDeque<proto::TaskSpec>>,
    idle_workers: HashMap<String, Vec<LeasedWorker>>,
    lease_request_in_flight: HashSet<String>,
}

pub struct DirectTaskSubmitter {
    rpc_address: proto::Address,
    raylet_client: Arc<dyn RayletClient>,
    /// Retry wrapper for lease traffic; raylet hiccups are transient.
    lease_retry: RetryableClient,
    client_factory: ClientFactory,
    task_manager: Arc<TaskManager>,
    resolver: LocalDependencyResolver,
    lease_timeout: Duration,
    state: Mutex<SubmitterState>,
}

impl DirectTaskSubmitter {
    pub fn new(
        rpc_address: proto::Address,
        raylet_client: Arc<dyn RayletClient>,
        client_factory: ClientFactory,
        task_manager: Arc<TaskManager>,
        resolver: LocalDependencyResolver,
        lease_timeout: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            rpc_address,
            raylet_client,
            lease_retry: RetryableClient::new(RetryConfig::default()),
            client_factory,
            task_manager,
            resolver,
            lease_timeout,
            state: Mutex::new(SubmitterState::default()),
        })
    }

    /// Submit a task. The pending entry must already be recorded with the
    /// TaskManager. Dependencies are resolved (and promoted to plasma)
    /// before the spec becomes eligible for dispatch.
    pub async fn submit_task(self: Arc<Self>, spec: proto::TaskSpec) -> CoreWorkerResult<()> {
        self.resolver.resolve_dependencies(&spec).await?;
        let class = scheduling_class_of(&spec.required_resources);
        self.state
            .lock()
            .queues
            .entry(class.clone())
            .or_default()
            .push_back(spec);
        Self::maybe_dispatch(&self, class);
        Ok(())
    }

    /// Pump the queue of one scheduling class: hand queued specs to idle
    /// leased workers, request a lease when work outnumbers workers.
    fn maybe_dispatch(this: &Arc<Self>, class: String) {
        loop {
            let mut state = this.state.lock();

            // Expired idle leases go back to the raylet.
            let now = tokio::time::Instant::now();
            if let Some(workers) = state.idle_workers.get_mut(&class) {
                let mut kept = Vec::new();
                for worker in workers.drain(..) {
                    if worker.expires_at <= now {
                        Self::spawn_return_lease(this, worker.address, false);
                    } else {
                        kept.push(worker);
                    }
                }
                *workers = kept;
            }

            let queue_empty = state
                .queues
                .get(&class)
                .map(|q| q.is_empty())
                .unwrap_or(true);
            if queue_empty {
                return;
            }

            if let Some(worker) = state
                .idle_workers
                .get_mut(&class)
                .and_then(|workers| workers.pop())
            {
                let spec = state
                    .queues
                    .get_mut(&class)
                    .and_then(|q| q.pop_front())
                    .expect("queue checked non-empty");
                drop(state);
                let this2 = Arc::clone(this);
                let class2 = class.clone();
                tokio::spawn(async move {
                    Self::push_task_to_worker(&this2, spec, worker, class2).await;
                });
                continue;
            }

            if !state.lease_request_in_flight.contains(&class) {
                state.lease_request_in_flight.insert(class.clone());
                let resources = state
                    .queues
                    .get(&class)
                    .and_then(|q| q.front())
                    .map(|spec| spec.required_resources.clone())
                    .unwrap_or_default();
                drop(state);
                let this2 = Arc::clone(this);
                tokio::spawn(async move {
                    Self::request_lease(&this2, class, resources).await;
                });
            }
            return;
        }
    }

    async fn request_lease(this: &Arc<Self>, class: String, resources: HashMap<String, f64>) {
        let req = proto::RequestWorkerLeaseRequest {
            required_resources: resources,
            caller_address: Some(this.rpc_address.clone()),
            lease_id: Vec::new(),
        };
        let raylet = Arc::clone(&this.raylet_client);
        let result = this
            .lease_retry
            .call_with_retry(0, None, || {
                let raylet = Arc::clone(&raylet);
                let req = req.clone();
                async move { raylet.request_worker_lease(req).await }
            })
            .await;
        this.state.lock().lease_request_in_flight.remove(&class);

        match result {
            Ok(reply) if reply.rejected => {
                tracing::warn!(
                    class,
                    reason = %reply.scheduling_failure_message,
                    "worker lease rejected, failing queued tasks"
                );
                Self::fail_queued_tasks(this, &class, proto::ErrorType::TaskExecutionException);
            }
            Ok(reply) => {
                if let Some(address) = reply.worker_address {
                    tracing::debug!(
                        class,
                        worker_ip = %address.ip_address,
                        worker_port = address.port,
                        "worker lease granted"
                    );
                    this.state
                        .lock()
                        .idle_workers
                        .entry(class.clone())
                        .or_default()
                        .push(LeasedWorker {
                            address,
                            expires_at: tokio::time::Instant::now() + this.lease_timeout,
                        });
                    Self::maybe_dispatch(this, class);
                } else if let Some(remote) = reply.retry_at_raylet_address {
                    tracing::info!(
                        class,
                        remote_ip = %remote.ip_address,
                        "lease spilled back, re-requesting"
                    );
                    Self::maybe_dispatch(this, class);
                } else {
                    tracing::debug!(class, "lease request returned no worker");
                }
            }
            Err(status) => {
                tracing::error!(class, error = %status, "worker lease request failed");
            }
        }
    }

    async fn push_task_to_worker(
        this: &Arc<Self>,
        spec: proto::TaskSpec,
        worker: LeasedWorker,
        class: String,
    ) {
        let task_id = task_id_of(&spec);
        let client = (this.client_factory)(&worker.address);
        let req = proto::PushTaskRequest {
            intended_worker_id: worker.address.worker_id.clone(),
            task_spec: Some(spec),
            sequence_number: -1,
        };

        match client.push_task(req).await {
            Ok(reply) if reply.worker_exiting => {
                tracing::info!(task_id = %task_id.hex(), "leased worker exiting, retrying task");
                this.task_manager
                    .pending_task_failed(task_id, proto::ErrorType::WorkerDied);
                Self::spawn_return_lease(this, worker.address, true);
            }
            Ok(reply) => {
                this.task_manager.complete_pending_task(task_id, &reply);
                this.state
                    .lock()
                    .idle_workers
                    .entry(class.clone())
                    .or_default()
                    .push(worker);
                Self::maybe_dispatch(this, class);
            }
            Err(status) => {
                tracing::warn!(
                    task_id = %task_id.hex(),
                    error = %status,
                    "push to leased worker failed"
                );
                this.task_manager
                    .pending_task_failed(task_id, proto::ErrorType::WorkerDied);
                Self::spawn_return_lease(this, worker.address, true);
            }
        }
    }

    fn fail_queued_tasks(this: &Arc<Self>, class: &str, error_type: proto::ErrorType) {
        let drained: Vec<proto::TaskSpec> = this
            .state
            .lock()
            .queues
            .get_mut(class)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default();
        for spec in drained {
            this.task_manager
                .pending_task_failed(task_id_of(&spec), error_type);
        }
    }

    fn spawn_return_lease(this: &Arc<Self>, address: proto::Address, disconnect_worker: bool) {
        let raylet = Arc::clone(&this.raylet_client);
        tokio::spawn(async move {
            let req = proto::ReturnWorkerLeaseRequest {
                worker_id: address.worker_id,
                disconnect_worker,
            };
            if let Err(e) = raylet.return_worker_lease(req).await {
                tracing::debug!(error = %e, "returning worker lease failed");
            }
        });
    }

    /// Number of tasks waiting for dispatch across all classes. Diagnostic.
    pub fn num_queued_tasks(&self) -> usize {
        self.state.lock().queues.values().map(|q| q.len()).sum()
    }

    /// Number of idle leased workers held. Diagnostic.
    pub fn num_leased_workers(&self) -> usize {
        self.state.lock().idle_workers.values().map(|w| w.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::CoreWorkerMemoryStore;
    use crate::object::StoreObject;
    use crate::plasma_provider::PlasmaStoreProvider;
    use crate::reference_counter::ReferenceCounter;
    use crate::task_manager::inline_return_object;
    use crate::task_spec_builder::task_return_ids;
    use crate::worker_client::CoreWorkerClient;
    use bytes::Bytes;
    use skiff_common::id::TaskID;
    use skiff_raylet_client::FakeRayletClient;
    use skiff_store_client::LocalStoreClient;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tonic::Status;

    /// Worker client echoing a single 3-byte return for every pushed task,
    /// or failing if `fail` is set.
    struct ScriptedWorkerClient {
        fail: bool,
        pushes: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl CoreWorkerClient for ScriptedWorkerClient {
        async fn push_task(
            &self,
            req: proto::PushTaskRequest,
        ) -> Result<proto::PushTaskReply, Status> {
            self.pushes.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(Status::unavailable("worker died"));
            }
            let spec = req.task_spec.unwrap();
            let return_id = task_return_ids(&spec)[0];
            Ok(proto::PushTaskReply {
                return_objects: vec![inline_return_object(
                    &return_id,
                    &StoreObject::from_data(Bytes::from_static(b"out")),
                )],
                ..Default::default()
            })
        }

        async fn get_object_status(
            &self,
            _req: proto::GetObjectStatusRequest,
        ) -> Result<proto::GetObjectStatusReply, Status> {
            Ok(proto::GetObjectStatusReply::default())
        }

        async fn kill_actor(
            &self,
            _req: proto::KillActorRequest,
        ) -> Result<proto::KillActorReply, Status> {
            Ok(proto::KillActorReply::default())
        }
    }

    struct Fixture {
        submitter: Arc<DirectTaskSubmitter>,
        task_manager: Arc<TaskManager>,
        memory_store: Arc<CoreWorkerMemoryStore>,
        raylet: Arc<FakeRayletClient>,
        pushes: Arc<AtomicU32>,
        retries: Arc<Mutex<Vec<proto::TaskSpec>>>,
    }

    fn make_fixture(fail_pushes: bool) -> Fixture {
        let memory_store = Arc::new(CoreWorkerMemoryStore::new());
        let reference_counter = Arc::new(ReferenceCounter::new());
        let retries = Arc::new(Mutex::new(Vec::new()));
        let retries2 = retries.clone();
        let task_manager = Arc::new(TaskManager::new(
            memory_store.clone(),
            reference_counter,
            Arc::new(move |spec| retries2.lock().push(spec)),
        ));
        let raylet = Arc::new(FakeRayletClient::new());
        let pushes = Arc::new(AtomicU32::new(0));
        let pushes2 = pushes.clone();
        let factory: ClientFactory = Arc::new(move |_addr| {
            Arc::new(ScriptedWorkerClient {
                fail: fail_pushes,
                pushes: pushes2.clone(),
            })
        });
        let plasma = Arc::new(PlasmaStoreProvider::new(
            Arc::new(LocalStoreClient::new()),
            None,
            Duration::from_millis(10),
        ));
        let resolver = LocalDependencyResolver::new(memory_store.clone(), plasma);
        let submitter = DirectTaskSubmitter::new(
            proto::Address::default(),
            raylet.clone(),
            factory,
            task_manager.clone(),
            resolver,
            Duration::from_secs(5),
        );
        Fixture {
            submitter,
            task_manager,
            memory_store,
            raylet,
            pushes,
            retries,
        }
    }

    fn make_spec() -> proto::TaskSpec {
        proto::TaskSpec {
            task_id: TaskID::from_random().binary(),
            num_returns: 1,
            is_direct_call: true,
            ..Default::default()
        }
    }

    fn worker_address(port: i32) -> proto::Address {
        proto::Address {
            ip_address: "10.0.0.1".to_string(),
            port,
            worker_id: vec![7; 28],
            raylet_id: vec![0; 28],
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_submit_requests_lease_and_pushes() {
        let f = make_fixture(false);
        f.raylet.queue_lease_granted(worker_address(4000));

        let spec = make_spec();
        let task_id = task_id_of(&spec);
        let return_id = task_return_ids(&spec)[0];
        f.task_manager
            .add_pending_task(proto::Address::default(), &spec, 0)
            .unwrap();
        f.submitter.clone().submit_task(spec).await.unwrap();
        settle().await;

        assert_eq!(f.raylet.count("request_worker_lease"), 1);
        assert_eq!(f.pushes.load(Ordering::Relaxed), 1);
        assert!(!f.task_manager.is_task_pending(&task_id));
        // The caller-side store now holds the inline return.
        let stored = f.memory_store.get_if_exists(&return_id).unwrap();
        assert_eq!(stored.payload().unwrap().data.as_ref(), b"out");
        // The worker sits in the idle lease pool.
        assert_eq!(f.submitter.num_leased_workers(), 1);
    }

    #[tokio::test]
    async fn test_lease_reused_for_same_class() {
        let f = make_fixture(false);
        f.raylet.queue_lease_granted(worker_address(4000));

        for _ in 0..2 {
            let spec = make_spec();
            f.task_manager
                .add_pending_task(proto::Address::default(), &spec, 0)
                .unwrap();
            f.submitter.clone().submit_task(spec).await.unwrap();
        }
        settle().await;

        assert_eq!(f.pushes.load(Ordering::Relaxed), 2);
        // One lease serves both tasks. At most one extra request may have
        // been issued while the first push was in flight; it was not granted.
        assert_eq!(f.submitter.num_queued_tasks(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_routes_to_task_manager() {
        let f = make_fixture(true);
        f.raylet.queue_lease_granted(worker_address(4000));

        let spec = make_spec();
        f.task_manager
            .add_pending_task(proto::Address::default(), &spec, 2)
            .unwrap();
        f.submitter.clone().submit_task(spec).await.unwrap();
        settle().await;

        // Push failed: retry callback got the spec, lease was returned with
        // disconnect.
        assert_eq!(f.retries.lock().len(), 1);
        assert_eq!(f.raylet.count("return_worker_lease"), 1);
        assert_eq!(f.submitter.num_leased_workers(), 0);
    }

    #[tokio::test]
    async fn test_lease_rejection_fails_queued_tasks() {
        let f = make_fixture(false);
        f.raylet.queue_lease_reply(proto::RequestWorkerLeaseReply {
            rejected: true,
            scheduling_failure_message: "infeasible".to_string(),
            ..Default::default()
        });

        let spec = make_spec();
        let task_id = task_id_of(&spec);
        let return_id = task_return_ids(&spec)[0];
        f.task_manager
            .add_pending_task(proto::Address::default(), &spec, 0)
            .unwrap();
        f.submitter.clone().submit_task(spec).await.unwrap();
        settle().await;

        assert!(!f.task_manager.is_task_pending(&task_id));
        assert!(f.memory_store.get_if_exists(&return_id).unwrap().is_exception());
    }

    #[tokio::test]
    async fn test_no_grant_leaves_task_queued() {
        let f = make_fixture(false);
        // Default fake reply: no worker, not rejected.
        let spec = make_spec();
        f.task_manager
            .add_pending_task(proto::Address::default(), &spec, 0)
            .unwrap();
        f.submitter.clone().submit_task(spec).await.unwrap();
        settle().await;

        assert_eq!(f.submitter.num_queued_tasks(), 1);
        assert_eq!(f.pushes.load(Ordering::Relaxed), 0);
    }
}
