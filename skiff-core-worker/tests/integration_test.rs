// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Cross-component scenarios: several core workers wired together through
//! in-process transports, a shared plasma store, and fake raylet/GCS
//! collaborators.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use skiff_common::config::SkiffConfig;
use skiff_common::id::{JobID, ObjectID, TaskID, TransportType};
use skiff_core_worker::actor_handle::creation_cursor;
use skiff_core_worker::core_worker::{CoreWorker, TaskExecutionCallback};
use skiff_core_worker::error::CoreWorkerError;
use skiff_core_worker::object::StoreObject;
use skiff_core_worker::options::{
    ActorCreationOptions, CoreWorkerOptions, TaskOptions, WorkerType,
};
use skiff_core_worker::rpc_service::{CoreWorkerService, LocalWorkerClient};
use skiff_core_worker::worker_client::{
    ClientFactory, CoreWorkerClient, DisconnectedWorkerClient,
};
use skiff_gcs_client::FakeGcsClient;
use skiff_proto as proto;
use skiff_raylet_client::FakeRayletClient;
use skiff_store_client::{LocalStoreClient, ObjectStoreClient};

/// A single-node cluster: a shared plasma store, one fake raylet and GCS,
/// and an address registry standing in for the network.
struct Cluster {
    registry: Arc<Mutex<HashMap<Vec<u8>, Arc<dyn CoreWorkerClient>>>>,
    store: Arc<LocalStoreClient>,
    raylet: Arc<FakeRayletClient>,
    gcs: Arc<FakeGcsClient>,
}

impl Cluster {
    fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            store: Arc::new(LocalStoreClient::new()),
            raylet: Arc::new(FakeRayletClient::new()),
            gcs: Arc::new(FakeGcsClient::new()),
        }
    }

    fn client_factory(&self) -> ClientFactory {
        let registry = Arc::clone(&self.registry);
        Arc::new(move |address: &proto::Address| {
            registry
                .lock()
                .get(&address.worker_id)
                .cloned()
                .unwrap_or_else(|| Arc::new(DisconnectedWorkerClient))
        })
    }

    fn spawn(&self, worker_type: WorkerType, config: SkiffConfig) -> Arc<CoreWorker> {
        let options = CoreWorkerOptions {
            worker_type,
            job_id: JobID::from_int(1),
            config,
            ..Default::default()
        };
        let worker = CoreWorker::new(
            options,
            self.raylet.clone(),
            self.gcs.clone(),
            self.store.clone(),
            self.client_factory(),
            None,
        );
        self.registry.lock().insert(
            worker.worker_id().binary(),
            Arc::new(LocalWorkerClient::new(Arc::clone(&worker))),
        );
        worker
    }

    /// Make a worker unreachable, as if its process died.
    fn kill(&self, worker: &Arc<CoreWorker>) {
        self.registry.lock().remove(&worker.worker_id().binary());
    }
}

/// Executor producing one fixed payload per return slot.
fn bytes_callback(payload: Vec<u8>) -> TaskExecutionCallback {
    let data = Bytes::from(payload);
    Arc::new(move |request| {
        let data = data.clone();
        Box::pin(async move {
            Ok(request
                .return_ids
                .iter()
                .map(|_| Some(StoreObject::from_data(data.clone())))
                .collect())
        })
    })
}

/// Executor recording the invoked function name before echoing it back.
fn recording_callback(log: Arc<Mutex<Vec<String>>>) -> TaskExecutionCallback {
    Arc::new(move |request| {
        let log = Arc::clone(&log);
        Box::pin(async move {
            let name = request
                .function
                .parts
                .first()
                .cloned()
                .unwrap_or_default();
            log.lock().push(name.clone());
            Ok(request
                .return_ids
                .iter()
                .map(|_| Some(StoreObject::from_data(Bytes::from(name.clone().into_bytes()))))
                .collect())
        })
    })
}

fn function(name: &str) -> proto::FunctionDescriptor {
    proto::FunctionDescriptor {
        language: proto::Language::Rust as i32,
        parts: vec![name.to_string()],
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(80)).await;
}

// ─── Scenario: direct small return ──────────────────────────────────────────

#[tokio::test]
async fn test_direct_small_return_stays_inline() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    worker.set_task_execution_callback(bytes_callback(vec![7u8; 100]));

    cluster.raylet.queue_lease_granted(worker.rpc_address().clone());

    let return_ids = driver
        .submit_task(function("hundred_bytes"), vec![], TaskOptions::default(), 0)
        .await
        .unwrap();
    assert_eq!(return_ids.len(), 1);
    assert!(return_ids[0].is_direct_call_type());

    let results = driver.get_objects(&return_ids, 2_000).await.unwrap();
    let payload = results[0].as_ref().unwrap().payload().unwrap();
    assert_eq!(payload.data.len(), 100);
    assert_eq!(payload.data[0], 7);

    // The 100-byte return rode the reply; plasma saw no traffic.
    assert_eq!(cluster.store.num_objects(), 0);
    assert_eq!(driver.task_manager().num_pending_tasks(), 0);
}

// ─── Scenario: large return promotion ───────────────────────────────────────

#[tokio::test]
async fn test_large_return_promoted_to_plasma() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    worker.set_task_execution_callback(bytes_callback(vec![3u8; 10 * 1024 * 1024]));

    cluster.raylet.queue_lease_granted(worker.rpc_address().clone());

    let return_ids = driver
        .submit_task(function("ten_mebibytes"), vec![], TaskOptions::default(), 0)
        .await
        .unwrap();

    let results = driver.get_objects(&return_ids, 5_000).await.unwrap();
    let payload = results[0].as_ref().unwrap().payload().unwrap();
    assert_eq!(payload.data.len(), 10 * 1024 * 1024);

    // The callee allocated in the shared store; the caller-side entry is the
    // promotion sentinel.
    assert_eq!(cluster.store.num_objects(), 1);
    let (present, in_plasma) = driver.memory_store().contains(&return_ids[0]);
    assert!(present && in_plasma);
}

// ─── Scenario: retry on worker death ────────────────────────────────────────

#[tokio::test]
async fn test_retry_after_worker_death_succeeds() {
    let cluster = Cluster::new();
    let fast_retry = SkiffConfig {
        task_retry_delay_ms: 50,
        internal_heartbeat_ms: 20,
        ..Default::default()
    };
    let driver = cluster.spawn(WorkerType::Driver, fast_retry);
    driver.start().await.unwrap();

    let doomed = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    doomed.set_task_execution_callback(bytes_callback(b"never".to_vec()));
    let healthy = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    healthy.set_task_execution_callback(bytes_callback(b"recovered".to_vec()));

    // First lease goes to a worker that dies before replying; the second to
    // a healthy one.
    cluster.kill(&doomed);
    cluster.raylet.queue_lease_granted(doomed.rpc_address().clone());
    cluster.raylet.queue_lease_granted(healthy.rpc_address().clone());

    let return_ids = driver
        .submit_task(function("flaky"), vec![], TaskOptions::default(), 2)
        .await
        .unwrap();

    let results = driver.get_objects(&return_ids, 5_000).await.unwrap();
    let payload = results[0].as_ref().unwrap().payload().unwrap();
    assert_eq!(payload.data.as_ref(), b"recovered");
    // Two leases were requested: the original dispatch and the retry.
    assert_eq!(cluster.raylet.count("request_worker_lease"), 2);
}

#[tokio::test]
async fn test_retry_budget_exhaustion_surfaces_worker_died() {
    let cluster = Cluster::new();
    let fast_retry = SkiffConfig {
        task_retry_delay_ms: 20,
        internal_heartbeat_ms: 10,
        ..Default::default()
    };
    let driver = cluster.spawn(WorkerType::Driver, fast_retry);
    driver.start().await.unwrap();

    let doomed = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    cluster.kill(&doomed);
    // Every lease lands on the dead worker.
    for _ in 0..3 {
        cluster.raylet.queue_lease_granted(doomed.rpc_address().clone());
    }

    let return_ids = driver
        .submit_task(function("hopeless"), vec![], TaskOptions::default(), 2)
        .await
        .unwrap();

    let results = driver.get_objects(&return_ids, 5_000).await.unwrap();
    let error = results[0].as_ref().unwrap();
    assert_eq!(error.error_type(), Some(proto::ErrorType::WorkerDied));
}

// ─── Scenario: actor death in flight ────────────────────────────────────────

#[tokio::test]
async fn test_actor_tasks_fail_uniformly_on_death() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let actor_worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    actor_worker.set_task_execution_callback(bytes_callback(b"actor".to_vec()));

    cluster
        .raylet
        .queue_lease_granted(actor_worker.rpc_address().clone());
    let actor_id = driver
        .create_actor(function("Counter"), vec![], ActorCreationOptions::default())
        .await
        .unwrap();
    settle().await;

    // Submit three calls while the actor has not connected yet; they queue.
    let mut queued_return_ids = Vec::new();
    for i in 0..3 {
        let ids = driver
            .submit_actor_task(
                actor_id,
                function(&format!("call_{i}")),
                vec![],
                TaskOptions::default(),
            )
            .await
            .unwrap();
        queued_return_ids.push(ids[0]);
    }
    assert_eq!(
        driver.direct_actor_submitter().num_pending_tasks(&actor_id),
        3
    );

    // The actor dies before connecting: every queued call fails uniformly.
    cluster.gcs.publish_actor_update(proto::ActorTableData {
        actor_id: actor_id.binary(),
        state: proto::ActorState::Dead as i32,
        address: None,
    });
    settle().await;

    let results = driver.get_objects(&queued_return_ids, 1_000).await.unwrap();
    for result in &results {
        assert_eq!(
            result.as_ref().unwrap().error_type(),
            Some(proto::ErrorType::ActorDied)
        );
    }

    // A further submission on the same handle fails immediately.
    let err = driver
        .submit_actor_task(actor_id, function("late"), vec![], TaskOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreWorkerError::Io(_)));
    // The handle survives for exactly this diagnostic.
    assert!(driver
        .actor_manager()
        .get_actor_handle(&actor_id)
        .unwrap()
        .is_dead());
}

// ─── Scenario: actor happy path ─────────────────────────────────────────────

#[tokio::test]
async fn test_actor_calls_execute_in_order_and_thread_cursor() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let actor_worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    let log = Arc::new(Mutex::new(Vec::new()));
    actor_worker.set_task_execution_callback(recording_callback(Arc::clone(&log)));

    cluster
        .raylet
        .queue_lease_granted(actor_worker.rpc_address().clone());
    let actor_id = driver
        .create_actor(function("Counter"), vec![], ActorCreationOptions::default())
        .await
        .unwrap();
    settle().await;

    // The GCS reports the actor alive at its worker's address.
    cluster.gcs.publish_actor_update(proto::ActorTableData {
        actor_id: actor_id.binary(),
        state: proto::ActorState::Alive as i32,
        address: Some(actor_worker.rpc_address().clone()),
    });

    let handle = driver.actor_manager().get_actor_handle(&actor_id).unwrap();
    assert_eq!(
        handle.current_cursor(),
        creation_cursor(&actor_id, TransportType::Direct)
    );

    let mut all_return_ids = Vec::new();
    for i in 0..3 {
        let ids = driver
            .submit_actor_task(
                actor_id,
                function(&format!("incr_{i}")),
                vec![],
                TaskOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(ids.len(), 1, "the cursor return is stripped");
        all_return_ids.extend(ids);
    }
    settle().await;

    // Delivered in submission order (the creation task ran first).
    assert_eq!(*log.lock(), vec!["Counter", "incr_0", "incr_1", "incr_2"]);

    // The cursor chain advanced once per submission: it now points at the
    // cursor return of the last call.
    let last_task_id = all_return_ids[2].task_id();
    assert_eq!(
        handle.current_cursor(),
        ObjectID::for_task_return(&last_task_id, 2, TransportType::Direct)
    );

    // All results are visible to the caller.
    let results = driver.get_objects(&all_return_ids, 2_000).await.unwrap();
    assert_eq!(
        results[2].as_ref().unwrap().payload().unwrap().data.as_ref(),
        b"incr_2"
    );
}

#[tokio::test]
async fn test_actor_handle_serialization_roundtrip_across_workers() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let borrower = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    let actor_worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    actor_worker.set_task_execution_callback(bytes_callback(b"ok".to_vec()));

    cluster
        .raylet
        .queue_lease_granted(actor_worker.rpc_address().clone());
    let actor_id = driver
        .create_actor(function("Shared"), vec![], ActorCreationOptions::default())
        .await
        .unwrap();
    settle().await;

    let blob = driver.serialize_actor_handle(&actor_id).unwrap();
    let restored_id = borrower
        .deserialize_and_register_actor_handle(&blob)
        .await
        .unwrap();
    assert_eq!(restored_id, actor_id);
    // Re-serializing yields the same bytes.
    assert_eq!(borrower.serialize_actor_handle(&actor_id).unwrap(), blob);
    // The borrower subscribed: a Dead notification reaches its handle.
    cluster.gcs.publish_actor_update(proto::ActorTableData {
        actor_id: actor_id.binary(),
        state: proto::ActorState::Dead as i32,
        address: None,
    });
    settle().await;
    assert!(borrower
        .actor_manager()
        .get_actor_handle(&actor_id)
        .unwrap()
        .is_dead());
}

#[tokio::test]
async fn test_kill_actor_reaches_the_actor_worker() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let actor_worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    actor_worker.set_task_execution_callback(bytes_callback(b"alive".to_vec()));

    let exited = Arc::new(AtomicBool::new(false));
    let exited2 = Arc::clone(&exited);
    actor_worker.set_exit_handler(Box::new(move || {
        exited2.store(true, Ordering::Relaxed);
    }));

    cluster
        .raylet
        .queue_lease_granted(actor_worker.rpc_address().clone());
    let actor_id = driver
        .create_actor(function("Doomed"), vec![], ActorCreationOptions::default())
        .await
        .unwrap();
    settle().await;
    cluster.gcs.publish_actor_update(proto::ActorTableData {
        actor_id: actor_id.binary(),
        state: proto::ActorState::Alive as i32,
        address: Some(actor_worker.rpc_address().clone()),
    });

    driver.kill_actor(actor_id).await.unwrap();
    assert!(exited.load(Ordering::Relaxed));
}

// ─── Scenario: wait with mixed transports ───────────────────────────────────

#[tokio::test]
async fn test_wait_mixed_transports() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());

    let d1 = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let d2 = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let r1 = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Raylet);

    // d1: ready in the memory store.
    driver
        .memory_store()
        .put(d1, StoreObject::from_data(Bytes::from("ready")))
        .unwrap();
    // d2: promoted — sentinel in memory, value in plasma.
    driver.memory_store().put(d2, StoreObject::InPlasma).unwrap();
    cluster
        .store
        .put(d2, Bytes::from("promoted"), Bytes::new())
        .await
        .unwrap();
    // r1: never arrives.

    let ready = driver.wait_objects(&[d1, d2, r1], 2, 100).await.unwrap();
    assert_eq!(ready, vec![true, true, false]);
}

#[tokio::test]
async fn test_wait_rejects_duplicates_and_bad_counts() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let id = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);

    let err = driver.wait_objects(&[id, id], 2, 0).await.unwrap_err();
    assert!(matches!(err, CoreWorkerError::InvalidArgument(_)));

    let err = driver.wait_objects(&[id], 2, 0).await.unwrap_err();
    assert!(matches!(err, CoreWorkerError::InvalidArgument(_)));
}

// ─── Scenario: borrower resolves via owner ──────────────────────────────────

#[tokio::test]
async fn test_borrower_resolves_through_owner() {
    let cluster = Cluster::new();
    let owner = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let borrower = cluster.spawn(WorkerType::Worker, SkiffConfig::default());

    // The owner holds a direct-call object in its memory store.
    let object_id =
        ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    owner
        .memory_store()
        .put(object_id, StoreObject::from_data(Bytes::from("shared value")))
        .unwrap();
    owner.reference_counter().add_owned_object(
        object_id,
        owner.get_caller_id(),
        owner.rpc_address().clone(),
        vec![],
    );

    // Serialization boundary: promote and capture ownership info.
    let (owner_id, owner_address) = owner
        .promote_to_plasma_and_get_ownership_info(object_id)
        .await
        .unwrap();
    assert_eq!(owner_address.worker_id, owner.worker_id().binary());

    // The borrower registers the provenance and resolves via the owner.
    borrower.register_ownership_info_and_resolve_future(object_id, owner_id, owner_address);

    let results = borrower.get_objects(&[object_id], 2_000).await.unwrap();
    assert_eq!(
        results[0].as_ref().unwrap().payload().unwrap().data.as_ref(),
        b"shared value"
    );
}

#[tokio::test]
async fn test_borrower_get_times_out_when_owner_dead() {
    let cluster = Cluster::new();
    let owner = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let borrower = cluster.spawn(WorkerType::Worker, SkiffConfig::default());

    let object_id =
        ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let owner_id = owner.get_caller_id();
    let owner_address = owner.rpc_address().clone();
    cluster.kill(&owner);

    borrower.register_ownership_info_and_resolve_future(object_id, owner_id, owner_address);
    let results = borrower.get_objects(&[object_id], 200).await.unwrap();
    assert!(results[0].is_none());
}

#[tokio::test]
async fn test_unknown_owner_cannot_be_serialized() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    // A random ID has no known creating task.
    let object_id = ObjectID::from_random();
    let direct_id = ObjectID::for_task_return(
        &object_id.task_id(),
        1,
        TransportType::Direct,
    );
    let err = driver
        .promote_to_plasma_and_get_ownership_info(direct_id)
        .await
        .unwrap_err();
    assert!(matches!(err, CoreWorkerError::InvalidArgument(_)));
}

// ─── Owner-side protocols ───────────────────────────────────────────────────

#[tokio::test]
async fn test_get_object_status_defers_until_task_completes() {
    let cluster = Cluster::new();
    let owner = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let service = Arc::new(CoreWorkerService::new(Arc::clone(&owner)));

    // A pending task that will produce the object.
    let spec = proto::TaskSpec {
        task_id: TaskID::from_random().binary(),
        num_returns: 1,
        is_direct_call: true,
        ..Default::default()
    };
    owner
        .task_manager()
        .add_pending_task(owner.rpc_address().clone(), &spec, 0)
        .unwrap();
    let return_id = ObjectID::for_task_return(
        &TaskID::from_binary(&spec.task_id),
        1,
        TransportType::Direct,
    );

    let service2 = Arc::clone(&service);
    let request = proto::GetObjectStatusRequest {
        object_id: return_id.binary(),
        owner_id: spec.task_id.clone(),
    };
    let query = tokio::spawn(async move { service2.handle_get_object_status(request).await });

    // The reply is deferred while the task is pending.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!query.is_finished());

    // Completion materializes the return and releases the reply.
    owner
        .memory_store()
        .put(return_id, StoreObject::from_data(Bytes::from("produced")))
        .unwrap();
    let reply = tokio::time::timeout(Duration::from_secs(2), query)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(reply.status, proto::ObjectStatus::Created as i32);
}

#[tokio::test]
async fn test_wait_for_object_eviction_replies_at_zero_refcount() {
    let cluster = Cluster::new();
    let owner = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let service = Arc::new(CoreWorkerService::new(Arc::clone(&owner)));

    let object_id = ObjectID::from_random();
    owner.add_local_reference(object_id);

    let service2 = Arc::clone(&service);
    let request = proto::WaitForObjectEvictionRequest {
        intended_worker_id: owner.worker_id().binary(),
        object_id: object_id.binary(),
    };
    let watch = tokio::spawn(async move { service2.handle_wait_for_object_eviction(request).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!watch.is_finished());

    owner.remove_local_reference(&object_id);
    tokio::time::timeout(Duration::from_secs(2), watch)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    // A watch for an already-gone reference replies immediately.
    let request = proto::WaitForObjectEvictionRequest {
        intended_worker_id: owner.worker_id().binary(),
        object_id: ObjectID::from_random().binary(),
    };
    tokio::time::timeout(
        Duration::from_millis(200),
        service.handle_wait_for_object_eviction(request),
    )
    .await
    .unwrap()
    .unwrap();
}

// ─── Put / Get / Delete round trips ─────────────────────────────────────────

#[tokio::test]
async fn test_put_get_delete_roundtrip() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());

    let payload = skiff_core_worker::object::ObjectPayload {
        data: Bytes::from("round trip"),
        metadata: Bytes::from("meta"),
        nested_refs: vec![],
    };
    let object_id = driver.put_object(payload.clone(), vec![]).await.unwrap();
    assert_eq!(object_id.transport_type(), TransportType::Raylet);
    // Put pins the object at the raylet.
    assert_eq!(cluster.raylet.pinned_object_ids(), vec![object_id.binary()]);
    assert!(driver.reference_counter().owned_by_us(&object_id));

    let results = driver.get_objects(&[object_id], 1_000).await.unwrap();
    let fetched = results[0].as_ref().unwrap().payload().unwrap();
    assert_eq!(fetched.data, payload.data);
    assert_eq!(fetched.metadata, payload.metadata);

    driver.delete_objects(&[object_id], true, false).await.unwrap();
    assert!(!driver.contains_object(object_id).await.unwrap());
    assert!(!driver.reference_counter().has_reference(&object_id));
}

#[tokio::test]
async fn test_get_preserves_order_and_duplicates() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());

    let a = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let b = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    driver
        .memory_store()
        .put(a, StoreObject::from_data(Bytes::from("a")))
        .unwrap();
    driver
        .memory_store()
        .put(b, StoreObject::from_data(Bytes::from("b")))
        .unwrap();

    let results = driver.get_objects(&[b, a, b], 100).await.unwrap();
    let data: Vec<&[u8]> = results
        .iter()
        .map(|r| r.as_ref().unwrap().payload().unwrap().data.as_ref())
        .collect();
    assert_eq!(data, vec![b"b" as &[u8], b"a", b"b"]);
}

#[tokio::test]
async fn test_create_seal_then_get() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());

    let (object_id, buffer) = driver
        .create_object(Bytes::new(), 4, vec![])
        .await
        .unwrap();
    let buffer = buffer.expect("fresh object allocates");
    buffer.copy_from_slice(b"grow");
    driver.seal_object(object_id, true).await.unwrap();

    let results = driver.get_objects(&[object_id], 1_000).await.unwrap();
    assert_eq!(
        results[0].as_ref().unwrap().payload().unwrap().data.as_ref(),
        b"grow"
    );
    // Sealing with pin asked the raylet to pin.
    assert_eq!(cluster.raylet.count("pin_object_ids"), 1);
}

#[tokio::test]
async fn test_allocate_return_objects_split_by_size() {
    let cluster = Cluster::new();
    let worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());
    worker.worker_context().set_current_task_is_direct_call(true);

    let small = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let large = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    let allocations = worker
        .allocate_return_objects(
            &[small, large],
            &[16, 200 * 1024],
            &[Bytes::new(), Bytes::new()],
            &[vec![], vec![]],
        )
        .await
        .unwrap();

    // Small direct return: local buffer for the inline reply.
    assert!(!allocations[0].in_plasma);
    assert!(allocations[0].buffer.is_some());
    // Large return: allocated in the shared store.
    assert!(allocations[1].in_plasma);
    let buffer = allocations[1].buffer.as_ref().expect("fresh allocation");
    buffer.copy_from_slice(&[9u8; 32]);
    worker.seal_object(large, false).await.unwrap();
    assert!(cluster.store.contains(large).await.unwrap());

    // Re-allocating an existing object yields no buffer.
    let again = worker
        .allocate_return_objects(&[large], &[200 * 1024], &[Bytes::new()], &[vec![]])
        .await
        .unwrap();
    assert!(again[0].buffer.is_none());
}

#[tokio::test]
async fn test_get_object_async_fulfilled_on_put() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let object_id = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);

    let receiver = driver.get_object_async(object_id);
    driver
        .memory_store()
        .put(object_id, StoreObject::from_data(Bytes::from("async")))
        .unwrap();
    let object = tokio::time::timeout(Duration::from_secs(1), receiver)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(object.payload().unwrap().data.as_ref(), b"async");
}

// ─── Driver registration & stats ────────────────────────────────────────────

#[tokio::test]
async fn test_driver_registers_its_task_on_start() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    driver.start().await.unwrap();

    let added = cluster.gcs.added_tasks();
    assert_eq!(added.len(), 1);
    let spec = added[0].task_spec.as_ref().unwrap();
    assert_eq!(spec.r#type, proto::TaskType::DriverTask as i32);
    assert_eq!(
        driver.current_task_id(),
        TaskID::for_driver_task(&driver.current_job_id())
    );
}

#[tokio::test]
async fn test_raylet_passthroughs() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());

    driver
        .push_error(
            driver.current_job_id(),
            "task_error".into(),
            "something broke".into(),
        )
        .await
        .unwrap();
    let actor_id = skiff_common::id::ActorID::from_random();
    let checkpoint_id = driver.prepare_actor_checkpoint(actor_id).await.unwrap();
    driver
        .notify_actor_resumed_from_checkpoint(actor_id, checkpoint_id)
        .await
        .unwrap();
    driver
        .set_resource("CPU".into(), 8.0, &skiff_common::id::NodeID::from_random())
        .await
        .unwrap();

    assert_eq!(cluster.raylet.count("push_error"), 1);
    assert_eq!(cluster.raylet.count("prepare_actor_checkpoint"), 1);
    assert_eq!(cluster.raylet.count("notify_actor_resumed_from_checkpoint"), 1);
    assert_eq!(cluster.raylet.count("set_resource"), 1);
}

#[tokio::test]
async fn test_stats_snapshot_reflects_activity() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    driver.set_webui_display("status".into(), "running".into());

    let object_id = ObjectID::from_random();
    driver.add_local_reference(object_id);

    let stats = driver.stats();
    assert_eq!(stats.num_object_ids_in_scope, 1);
    assert_eq!(stats.webui_display.get("status").unwrap(), "running");
    assert_eq!(stats.num_pending_tasks, 0);
}

// ─── Argument passing ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_by_ref_argument_promoted_and_fetched_by_callee() {
    let cluster = Cluster::new();
    let driver = cluster.spawn(WorkerType::Driver, SkiffConfig::default());
    let worker = cluster.spawn(WorkerType::Worker, SkiffConfig::default());

    // The callee doubles its single by-ref argument.
    worker.set_task_execution_callback(Arc::new(move |request| {
        Box::pin(async move {
            let arg = request.args[0].payload().unwrap().data.clone();
            let mut doubled = arg.to_vec();
            doubled.extend_from_slice(&arg);
            Ok(vec![Some(StoreObject::from_data(Bytes::from(doubled)))])
        })
    }));

    // The argument lives in the driver's memory store as a direct object.
    let arg_id = ObjectID::for_task_return(&TaskID::from_random(), 1, TransportType::Direct);
    driver
        .memory_store()
        .put(arg_id, StoreObject::from_data(Bytes::from("ab")))
        .unwrap();

    cluster.raylet.queue_lease_granted(worker.rpc_address().clone());
    let return_ids = driver
        .submit_task(
            function("double"),
            vec![skiff_core_worker::task_spec_builder::by_ref_arg(&arg_id)],
            TaskOptions::default(),
            0,
        )
        .await
        .unwrap();

    let results = driver.get_objects(&return_ids, 2_000).await.unwrap();
    assert_eq!(
        results[0].as_ref().unwrap().payload().unwrap().data.as_ref(),
        b"abab"
    );
    // Submission promoted the argument into the shared store.
    assert!(cluster.store.contains(arg_id).await.unwrap());
}
