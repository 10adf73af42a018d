// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! The CoreWorker facade.
//!
//! One instance per process, driver or worker. Wires the two object stores,
//! the reference counter, the task manager, the submitters, the receiver,
//! and the execution loop, and exposes the public object/task/actor surface.

use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use skiff_common::config::SkiffConfig;
use skiff_common::id::{ActorID, JobID, ObjectID, TaskID, TransportType, WorkerID};
use skiff_gcs_client::{ActorNotificationCallback, GcsClient};
use skiff_proto::{self as proto, ActorState, ErrorType, TaskType};
use skiff_raylet_client::RayletClient;
use skiff_store_client::{MutableBuffer, ObjectStoreClient};
use skiff_util::time::current_time_ms;

use crate::actor_handle::ActorHandle;
use crate::actor_manager::ActorManager;
use crate::context::WorkerContext;
use crate::dependency_resolver::LocalDependencyResolver;
use crate::direct_actor_submitter::DirectActorSubmitter;
use crate::direct_task_submitter::DirectTaskSubmitter;
use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::execution::ExecutionLoop;
use crate::future_resolver::FutureResolver;
use crate::memory_store::{CoreWorkerMemoryStore, SignalCheck};
use crate::object::{ObjectPayload, StoreObject};
use crate::options::{ActorCreationOptions, CoreWorkerOptions, TaskOptions, WorkerType};
use crate::plasma_provider::PlasmaStoreProvider;
use crate::reference_counter::ReferenceCounter;
use crate::task_manager::{
    error_return_object, inline_return_object, plasma_return_object, TaskManager,
};
use crate::task_receiver::TaskReceiver;
use crate::task_spec_builder::{task_id_of, task_return_ids, TaskSpecBuilder};
use crate::worker_client::ClientFactory;

/// Everything the language-side executor needs to run one task.
pub struct TaskExecutionRequest {
    pub task_type: TaskType,
    pub function: proto::FunctionDescriptor,
    pub required_resources: HashMap<String, f64>,
    pub args: Vec<StoreObject>,
    pub arg_reference_ids: Vec<ObjectID>,
    pub return_ids: Vec<ObjectID>,
}

/// The language-supplied callback running user code for one task.
///
/// Returns one entry per return ID: `Some(object)` for a value produced
/// in-process, `None` when the executor pre-allocated the return in plasma
/// (the core seals it) or intentionally produced nothing.
pub type TaskExecutionCallback = Arc<
    dyn Fn(
            TaskExecutionRequest,
        )
            -> Pin<Box<dyn Future<Output = CoreWorkerResult<Vec<Option<StoreObject>>>> + Send>>
        + Send
        + Sync,
>;

/// One pre-allocated return slot handed back to the executor.
pub struct AllocatedReturn {
    pub object_id: ObjectID,
    /// `None` when the object already exists and must not be re-owned.
    pub buffer: Option<MutableBuffer>,
    pub in_plasma: bool,
}

type ExitHandler = Box<dyn Fn() + Send + Sync>;

struct FacadeState {
    current_task: Option<proto::TaskSpec>,
    actor_id: ActorID,
    actor_title: String,
    webui_display: HashMap<String, String>,
    num_executed_tasks: u64,
}

pub struct CoreWorker {
    worker_type: WorkerType,
    language: i32,
    config: SkiffConfig,
    context: WorkerContext,
    rpc_address: proto::Address,
    memory_store: Arc<CoreWorkerMemoryStore>,
    plasma: Arc<PlasmaStoreProvider>,
    reference_counter: Arc<ReferenceCounter>,
    task_manager: Arc<TaskManager>,
    raylet_client: Arc<dyn RayletClient>,
    gcs_client: Arc<dyn GcsClient>,
    direct_task_submitter: Arc<DirectTaskSubmitter>,
    direct_actor_submitter: Arc<DirectActorSubmitter>,
    future_resolver: FutureResolver,
    actor_manager: Arc<ActorManager>,
    task_receiver: Arc<TaskReceiver>,
    execution_loop: Arc<ExecutionLoop>,
    task_execution_callback: Mutex<Option<TaskExecutionCallback>>,
    to_resubmit: Arc<Mutex<VecDeque<(u64, proto::TaskSpec)>>>,
    state: Mutex<FacadeState>,
    main_thread_task_id: Mutex<TaskID>,
    exit_handler: Mutex<Option<ExitHandler>>,
    background_tasks: Mutex<Vec<JoinHandle<()>>>,
    shut_down: AtomicBool,
    weak_self: Weak<CoreWorker>,
}

impl CoreWorker {
    /// Wire a core worker from its options and external collaborators.
    /// [`start`](Self::start) launches the periodic machinery.
    pub fn new(
        options: CoreWorkerOptions,
        raylet_client: Arc<dyn RayletClient>,
        gcs_client: Arc<dyn GcsClient>,
        store_client: Arc<dyn ObjectStoreClient>,
        client_factory: ClientFactory,
        check_signals: Option<SignalCheck>,
    ) -> Arc<Self> {
        let config = options.config.clone();
        let signal_interval = Duration::from_millis(config.signal_check_interval_ms);
        let context = WorkerContext::new(options.worker_type, options.worker_id, options.job_id);
        let rpc_address = proto::Address {
            raylet_id: options.node_id.binary(),
            ip_address: options.node_ip_address.clone(),
            port: 0,
            worker_id: options.worker_id.binary(),
        };

        let memory_store = Arc::new(CoreWorkerMemoryStore::with_signal_check(
            check_signals.clone(),
            signal_interval,
        ));
        let plasma = Arc::new(PlasmaStoreProvider::new(
            store_client,
            check_signals,
            signal_interval,
        ));
        let reference_counter = Arc::new(ReferenceCounter::new());

        let to_resubmit: Arc<Mutex<VecDeque<(u64, proto::TaskSpec)>>> =
            Arc::new(Mutex::new(VecDeque::new()));
        let retry_queue = Arc::clone(&to_resubmit);
        let retry_delay_ms = config.task_retry_delay_ms;
        let task_manager = Arc::new(TaskManager::new(
            Arc::clone(&memory_store),
            Arc::clone(&reference_counter),
            Arc::new(move |spec: proto::TaskSpec| {
                tracing::error!(
                    task_id = %hex::encode(&spec.task_id),
                    delay_ms = retry_delay_ms,
                    "will resubmit task after delay"
                );
                retry_queue
                    .lock()
                    .push_back((current_time_ms() + retry_delay_ms, spec));
            }),
        ));

        let resolver =
            LocalDependencyResolver::new(Arc::clone(&memory_store), Arc::clone(&plasma));
        let direct_task_submitter = DirectTaskSubmitter::new(
            rpc_address.clone(),
            Arc::clone(&raylet_client),
            Arc::clone(&client_factory),
            Arc::clone(&task_manager),
            resolver,
            Duration::from_millis(config.worker_lease_timeout_ms),
        );
        let direct_actor_submitter =
            DirectActorSubmitter::new(Arc::clone(&client_factory), Arc::clone(&task_manager));
        let future_resolver = FutureResolver::new(
            Arc::clone(&memory_store),
            Arc::clone(&client_factory),
            options.worker_id.binary(),
        );

        let execution_loop = ExecutionLoop::start(options.max_task_concurrency.max(1));

        Arc::new_cyclic(|weak: &Weak<CoreWorker>| {
            let execute_weak = weak.clone();
            let execute_fn: crate::task_receiver::ExecuteTaskFn = Arc::new(move |spec| {
                let weak = execute_weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(core_worker) => core_worker.execute_task(spec).await,
                        None => proto::PushTaskReply {
                            worker_exiting: true,
                            ..Default::default()
                        },
                    }
                })
            });
            let task_receiver = Arc::new(TaskReceiver::new(
                options.worker_id,
                Arc::clone(&execution_loop),
                execute_fn,
            ));

            CoreWorker {
                worker_type: options.worker_type,
                language: options.language as i32,
                config,
                context,
                rpc_address,
                memory_store,
                plasma,
                reference_counter,
                task_manager,
                raylet_client,
                gcs_client,
                direct_task_submitter,
                direct_actor_submitter,
                future_resolver,
                actor_manager: Arc::new(ActorManager::new()),
                task_receiver,
                execution_loop,
                task_execution_callback: Mutex::new(None),
                to_resubmit,
                state: Mutex::new(FacadeState {
                    current_task: None,
                    actor_id: ActorID::nil(),
                    actor_title: String::new(),
                    webui_display: HashMap::new(),
                    num_executed_tasks: 0,
                }),
                main_thread_task_id: Mutex::new(TaskID::nil()),
                exit_handler: Mutex::new(None),
                background_tasks: Mutex::new(Vec::new()),
                shut_down: AtomicBool::new(false),
                weak_self: weak.clone(),
            }
        })
    }

    /// Launch the periodic machinery: the internal heartbeat draining the
    /// resubmit queue, the raylet-death watchdog, and (for drivers) the
    /// driver-task registration with the GCS.
    pub async fn start(&self) -> CoreWorkerResult<()> {
        if self.worker_type == WorkerType::Driver {
            self.register_driver_task().await?;
        }

        let heartbeat_period = Duration::from_millis(self.config.internal_heartbeat_ms);
        let weak = self.weak_self.clone();
        let heartbeat = tokio::spawn(async move {
            let mut interval = tokio::time::interval(heartbeat_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(core_worker) = weak.upgrade() else {
                    break;
                };
                if core_worker.shut_down.load(Ordering::Relaxed) {
                    break;
                }
                core_worker.internal_heartbeat().await;
            }
        });

        let death_period = Duration::from_millis(self.config.raylet_death_check_interval_ms);
        let weak = self.weak_self.clone();
        let death_check = tokio::spawn(async move {
            let mut interval = tokio::time::interval(death_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(core_worker) = weak.upgrade() else {
                    break;
                };
                if core_worker.shut_down.load(Ordering::Relaxed) {
                    break;
                }
                if skiff_util::process::parent_is_init() {
                    tracing::error!("raylet died, shutting down");
                    core_worker.shutdown();
                    break;
                }
            }
        });

        let mut tasks = self.background_tasks.lock();
        tasks.push(heartbeat);
        tasks.push(death_check);
        Ok(())
    }

    /// Register the language-side executor invoked once per task.
    pub fn set_task_execution_callback(&self, callback: TaskExecutionCallback) {
        *self.task_execution_callback.lock() = Some(callback);
    }

    /// Override the process-exit action taken when this worker's actor is
    /// killed. Defaults to exiting the process.
    pub fn set_exit_handler(&self, handler: ExitHandler) {
        *self.exit_handler.lock() = Some(handler);
    }

    /// Stop both loops and the periodic machinery. Further work is refused.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!(worker_id = %self.context.worker_id().hex(), "core worker shutting down");
        self.task_receiver.set_exiting();
        self.execution_loop.stop();
        for task in self.background_tasks.lock().drain(..) {
            task.abort();
        }
    }

    /// Graceful worker exit: stop accepting tasks, release resources at the
    /// raylet, and shut down once the task manager quiesces.
    pub fn exit_worker(&self, intentional: bool) {
        self.task_receiver.set_exiting();
        let raylet = Arc::clone(&self.raylet_client);
        tokio::spawn(async move {
            let _ = raylet
                .notify_direct_call_task_blocked(proto::NotifyDirectCallTaskBlockedRequest {})
                .await;
        });
        let weak = self.weak_self.clone();
        self.task_manager.drain_and_shutdown(Box::new(move || {
            let Some(core_worker) = weak.upgrade() else {
                return;
            };
            if intentional {
                let raylet = Arc::clone(&core_worker.raylet_client);
                tokio::spawn(async move {
                    let _ = raylet
                        .disconnect(proto::DisconnectRequest { intentional: true })
                        .await;
                });
            }
            core_worker.shutdown();
        }));
    }

    pub(crate) fn trigger_exit(&self) {
        let handler = self.exit_handler.lock().take();
        match handler {
            Some(handler) => handler(),
            None => std::process::exit(1),
        }
    }

    // ─── Object API ──────────────────────────────────────────────────

    /// Store an object owned by this worker. Allocates the next put ID under
    /// the current task, records ownership, writes to plasma, and asks the
    /// raylet to pin the object.
    pub async fn put_object(
        &self,
        payload: ObjectPayload,
        contained_ids: Vec<ObjectID>,
    ) -> CoreWorkerResult<ObjectID> {
        let object_id = ObjectID::for_put(
            &self.context.current_task_id(),
            self.context.get_next_put_index() as u32,
            TransportType::Raylet,
        );
        self.reference_counter.add_owned_object(
            object_id,
            self.get_caller_id(),
            self.rpc_address.clone(),
            contained_ids,
        );
        self.put_object_with_id(payload, object_id).await?;
        self.pin_objects(&[object_id]).await?;
        Ok(object_id)
    }

    /// Store an object under a pre-assigned raylet-transport ID.
    pub async fn put_object_with_id(
        &self,
        payload: ObjectPayload,
        object_id: ObjectID,
    ) -> CoreWorkerResult<()> {
        if object_id.transport_type() != TransportType::Raylet {
            return Err(CoreWorkerError::InvalidArgument(format!(
                "put requires a raylet-transport object ID, got {}",
                object_id.hex()
            )));
        }
        self.plasma.put(&StoreObject::Value(payload), object_id).await
    }

    /// Allocate a plasma buffer for the caller to fill, to be sealed later.
    /// The buffer is `None` when the object already exists.
    pub async fn create_object(
        &self,
        metadata: Bytes,
        data_size: usize,
        contained_ids: Vec<ObjectID>,
    ) -> CoreWorkerResult<(ObjectID, Option<MutableBuffer>)> {
        let object_id = ObjectID::for_put(
            &self.context.current_task_id(),
            self.context.get_next_put_index() as u32,
            TransportType::Raylet,
        );
        let buffer = self.plasma.create(object_id, metadata, data_size).await?;
        if buffer.is_some() {
            self.reference_counter.add_owned_object(
                object_id,
                self.get_caller_id(),
                self.rpc_address.clone(),
                contained_ids,
            );
        }
        Ok((object_id, buffer))
    }

    /// Publish a created buffer; optionally pin it at the raylet.
    pub async fn seal_object(&self, object_id: ObjectID, pin_object: bool) -> CoreWorkerResult<()> {
        self.plasma.seal(object_id).await?;
        if pin_object {
            self.pin_objects(&[object_id]).await?;
        }
        Ok(())
    }

    /// Fetch objects, preserving input order and duplicates. `None` entries
    /// mean the timeout expired first. Timeout −1 is unbounded.
    pub async fn get_objects(
        &self,
        ids: &[ObjectID],
        timeout_ms: i64,
    ) -> CoreWorkerResult<Vec<Option<StoreObject>>> {
        let (mut plasma_ids, memory_ids) = group_by_store(ids);
        let mut result_map: HashMap<ObjectID, StoreObject> = HashMap::new();
        let mut got_exception = false;
        let start = current_time_ms();

        if !memory_ids.is_empty() {
            let found = self
                .memory_store
                .get(&memory_ids, memory_ids.len(), timeout_ms)
                .await?;
            got_exception = found.values().any(|o| o.is_exception());
            result_map.extend(found);
        }

        if !got_exception {
            // Promoted objects came back as sentinels: retry them at plasma
            // with whatever timeout budget remains.
            for (id, obj) in &result_map {
                if obj.is_in_plasma() {
                    plasma_ids.insert(*id);
                }
            }
            let local_timeout_ms = residual_timeout(timeout_ms, start);
            tracing::debug!(timeout_ms = local_timeout_ms, "plasma get");
            self.plasma
                .get(&plasma_ids, local_timeout_ms, &mut result_map, &mut got_exception)
                .await?;
        }

        let mut missing_result = false;
        let mut will_throw_exception = false;
        let results = ids
            .iter()
            .map(|id| match result_map.get(id) {
                Some(obj) if !obj.is_in_plasma() => {
                    if obj.is_exception() {
                        will_throw_exception = true;
                    }
                    Some(obj.clone())
                }
                _ => {
                    missing_result = true;
                    None
                }
            })
            .collect();

        // An unbounded get may only come back incomplete when an error
        // object will surface to the caller anyway.
        if timeout_ms < 0 && missing_result && !will_throw_exception {
            return Err(CoreWorkerError::Internal(
                "unbounded get returned an incomplete result".into(),
            ));
        }
        Ok(results)
    }

    /// Presence check dispatched by the ID's transport tag, with the
    /// in-plasma fallthrough.
    pub async fn contains_object(&self, object_id: ObjectID) -> CoreWorkerResult<bool> {
        match object_id.transport_type() {
            TransportType::Direct => {
                let (found, in_plasma) = self.memory_store.contains(&object_id);
                if in_plasma {
                    self.plasma.contains(object_id).await
                } else {
                    Ok(found)
                }
            }
            TransportType::Raylet => self.plasma.contains(object_id).await,
        }
    }

    /// Wait until at least `num_objects` of `ids` are ready or the timeout
    /// expires; returns one flag per input.
    ///
    /// Both stores are probed with timeout 0 first so a full budget is never
    /// spent on one store while the other already has enough objects ready.
    pub async fn wait_objects(
        &self,
        ids: &[ObjectID],
        num_objects: usize,
        timeout_ms: i64,
    ) -> CoreWorkerResult<Vec<bool>> {
        if num_objects == 0 || num_objects > ids.len() {
            return Err(CoreWorkerError::InvalidArgument(
                "number of objects to wait for must be between 1 and the number of ids".into(),
            ));
        }
        let (mut plasma_ids, mut memory_ids) = group_by_store(ids);
        if plasma_ids.len() + memory_ids.len() != ids.len() {
            return Err(CoreWorkerError::InvalidArgument(
                "duplicate object IDs not supported in wait".into(),
            ));
        }

        let mut ready: HashSet<ObjectID> = HashSet::new();

        // Pass A: harvest whatever is already ready.
        if !memory_ids.is_empty() {
            let memory_ready = self
                .memory_store
                .wait(&memory_ids, memory_ids.len().min(num_objects), 0)
                .await?;
            ready.extend(memory_ready);
            self.reclassify_in_plasma(&mut memory_ids, &mut plasma_ids, &mut ready);
        }
        if ready.len() < num_objects && !plasma_ids.is_empty() {
            let wanted = plasma_ids.len().min(num_objects - ready.len());
            self.plasma.wait(&plasma_ids, wanted, 0, &mut ready).await?;
        }

        // Pass B: block for the remainder of the budget.
        if timeout_ms != 0 && ready.len() < num_objects {
            ready.clear();
            let start = current_time_ms();
            if !memory_ids.is_empty() {
                let memory_ready = self
                    .memory_store
                    .wait(&memory_ids, memory_ids.len().min(num_objects), timeout_ms)
                    .await?;
                ready.extend(memory_ready);
                self.reclassify_in_plasma(&mut memory_ids, &mut plasma_ids, &mut ready);
            }
            if ready.len() < num_objects && !plasma_ids.is_empty() {
                let wanted = plasma_ids.len().min(num_objects - ready.len());
                let remaining = residual_timeout(timeout_ms, start);
                self.plasma
                    .wait(&plasma_ids, wanted, remaining, &mut ready)
                    .await?;
            }
        }

        Ok(ids.iter().map(|id| ready.contains(id)).collect())
    }

    /// Drop objects from both stores and the reference table.
    pub async fn delete_objects(
        &self,
        ids: &[ObjectID],
        local_only: bool,
        delete_creating_tasks: bool,
    ) -> CoreWorkerResult<()> {
        let (mut plasma_ids, memory_ids) = group_by_store(ids);
        self.reference_counter.delete_references(ids);
        self.memory_store.delete(&memory_ids, &mut plasma_ids);
        self.plasma
            .delete(&plasma_ids, local_only, delete_creating_tasks)
            .await
    }

    /// Fulfilled once the object is in the memory store. Direct-call IDs
    /// only; a fulfilled in-plasma sentinel means "fetch from plasma".
    pub fn get_object_async(&self, object_id: ObjectID) -> oneshot::Receiver<StoreObject> {
        debug_assert!(object_id.is_direct_call_type());
        let (tx, rx) = oneshot::channel();
        self.memory_store.get_async(object_id, tx);
        rx
    }

    pub async fn memory_usage_string(&self) -> String {
        self.plasma.memory_usage_string().await
    }

    pub async fn set_client_options(&self, name: String, limit_bytes: i64) -> CoreWorkerResult<()> {
        self.plasma.set_client_options(name, limit_bytes).await
    }

    // ─── Ownership & borrowing ───────────────────────────────────────

    /// Ensure a direct-call object lives in plasma and report its owner, for
    /// serializing the ID to another process. IDs with no known owner were
    /// created out-of-band and cannot be shared.
    pub async fn promote_to_plasma_and_get_ownership_info(
        &self,
        object_id: ObjectID,
    ) -> CoreWorkerResult<(TaskID, proto::Address)> {
        if !object_id.is_direct_call_type() {
            return Err(CoreWorkerError::InvalidArgument(
                "only direct-call objects are promoted for serialization".into(),
            ));
        }
        if let Some(payload) = self.memory_store.get_or_promote_to_plasma(object_id) {
            self.plasma
                .put(&StoreObject::Value(payload), object_id)
                .await?;
        }
        self.reference_counter.get_owner(&object_id).ok_or_else(|| {
            CoreWorkerError::InvalidArgument(format!(
                "object {} has no known owner. IDs generated randomly or \
                 reconstructed from binary cannot be serialized because no \
                 task is known to create them",
                object_id.hex()
            ))
        })
    }

    /// Register a deserialized ObjectID's owner and start resolving the
    /// value through that owner.
    pub fn register_ownership_info_and_resolve_future(
        &self,
        object_id: ObjectID,
        owner_id: TaskID,
        owner_address: proto::Address,
    ) {
        self.reference_counter
            .add_borrowed_object(object_id, owner_id, owner_address.clone());
        self.future_resolver
            .resolve_future_async(object_id, owner_id, owner_address);
    }

    pub fn add_local_reference(&self, object_id: ObjectID) {
        self.reference_counter.add_local_reference(object_id);
    }

    pub fn remove_local_reference(&self, object_id: &ObjectID) -> Vec<ObjectID> {
        self.reference_counter.remove_local_reference(object_id)
    }

    // ─── Task submission ─────────────────────────────────────────────

    /// Submit a normal task; returns its future return IDs.
    pub async fn submit_task(
        &self,
        function: proto::FunctionDescriptor,
        args: Vec<proto::TaskArg>,
        task_options: TaskOptions,
        max_retries: u32,
    ) -> CoreWorkerResult<Vec<ObjectID>> {
        let task_index = self.context.get_next_task_index();
        let task_id = TaskID::for_normal_task(
            &self.context.current_job_id(),
            &self.context.current_task_id(),
            task_index,
        );
        let mut builder = TaskSpecBuilder::new();
        builder
            .set_common_task_spec(
                &task_id,
                task_options.name.clone(),
                function,
                &self.context.current_job_id(),
                &self.context.current_task_id(),
                task_index,
                &self.get_caller_id(),
                self.rpc_address.clone(),
                task_options.num_returns,
                task_options.resources.clone(),
                task_options.is_direct_call,
            )
            .set_normal_task_spec()
            .set_max_retries(max_retries);
        for arg in args {
            builder.add_arg(arg);
        }
        let spec = builder.build();
        let return_ids = task_return_ids(&spec);

        if task_options.is_direct_call {
            self.task_manager
                .add_pending_task(self.rpc_address.clone(), &spec, max_retries)?;
            Arc::clone(&self.direct_task_submitter).submit_task(spec).await?;
        } else {
            self.raylet_client
                .submit_task(proto::SubmitTaskRequest {
                    task_spec: Some(spec),
                })
                .await
                .map_err(CoreWorkerError::from_rpc_status)?;
        }
        Ok(return_ids)
    }

    /// Create an actor: register its handle locally, subscribe to its state,
    /// and submit the creation task. The creation task's single return is
    /// the actor's initial cursor.
    pub async fn create_actor(
        &self,
        function: proto::FunctionDescriptor,
        args: Vec<proto::TaskArg>,
        creation_options: ActorCreationOptions,
    ) -> CoreWorkerResult<ActorID> {
        let task_index = self.context.get_next_task_index();
        let actor_id = ActorID::of(
            &self.context.current_job_id(),
            &self.context.current_task_id(),
            task_index,
        );
        let creation_task_id = TaskID::for_actor_creation_task(&actor_id);

        let mut builder = TaskSpecBuilder::new();
        builder
            .set_common_task_spec(
                &creation_task_id,
                creation_options.name.clone(),
                function.clone(),
                &self.context.current_job_id(),
                &self.context.current_task_id(),
                task_index,
                &self.get_caller_id(),
                self.rpc_address.clone(),
                1,
                creation_options.resources.clone(),
                creation_options.is_direct_call,
            )
            .set_actor_creation_task_spec(
                &actor_id,
                creation_options.max_reconstructions,
                creation_options.max_concurrency,
                creation_options.is_detached,
                creation_options.is_asyncio,
                creation_options.name.clone(),
            );
        for arg in args {
            builder.add_arg(arg);
        }
        let spec = builder.build();
        let cursor = task_return_ids(&spec)[0];

        let handle = Arc::new(ActorHandle::new(
            actor_id,
            self.context.current_job_id(),
            cursor,
            self.language,
            function,
            creation_options.is_direct_call,
        ));
        if !self.add_actor_handle(handle).await {
            return Err(CoreWorkerError::InvalidArgument(format!(
                "actor {} already exists",
                actor_id.hex()
            )));
        }

        if creation_options.is_direct_call {
            let max_retries = self
                .config
                .actor_creation_min_retries
                .max(creation_options.max_reconstructions as u32);
            self.task_manager
                .add_pending_task(self.rpc_address.clone(), &spec, max_retries)?;
            Arc::clone(&self.direct_task_submitter).submit_task(spec).await?;
        } else {
            self.raylet_client
                .submit_task(proto::SubmitTaskRequest {
                    task_spec: Some(spec),
                })
                .await
                .map_err(CoreWorkerError::from_rpc_status)?;
        }
        Ok(actor_id)
    }

    /// Submit a task to an actor. Returns the caller-visible return IDs;
    /// the extra cursor return is stripped.
    pub async fn submit_actor_task(
        &self,
        actor_id: ActorID,
        function: proto::FunctionDescriptor,
        args: Vec<proto::TaskArg>,
        task_options: TaskOptions,
    ) -> CoreWorkerResult<Vec<ObjectID>> {
        let handle = self
            .actor_manager
            .get_actor_handle(&actor_id)
            .ok_or_else(|| CoreWorkerError::ActorNotFound(actor_id.hex()))?;

        // One extra return threads the cursor chain.
        let num_returns = task_options.num_returns + 1;
        let is_direct_call = handle.is_direct_call();

        let task_index = self.context.get_next_task_index();
        let task_id = TaskID::for_actor_task(
            &self.context.current_job_id(),
            &self.context.current_task_id(),
            task_index,
            &actor_id,
        );
        let mut builder = TaskSpecBuilder::new();
        builder.set_common_task_spec(
            &task_id,
            task_options.name.clone(),
            function,
            &handle.creation_job_id(),
            &self.context.current_task_id(),
            task_index,
            &self.get_caller_id(),
            self.rpc_address.clone(),
            num_returns,
            task_options.resources.clone(),
            is_direct_call,
        );
        for arg in args {
            builder.add_arg(arg);
        }

        // The spec records the previous cursor; the last return becomes the
        // new one.
        let transport = if is_direct_call {
            TransportType::Direct
        } else {
            TransportType::Raylet
        };
        let mut return_ids: Vec<ObjectID> = (1..=num_returns)
            .map(|i| ObjectID::for_task_return(&task_id, i as u32, transport))
            .collect();
        let new_cursor = *return_ids.last().expect("num_returns >= 1");
        handle.set_actor_task_spec(&mut builder, new_cursor);
        return_ids.pop();

        let spec = builder.build();
        if is_direct_call {
            self.task_manager
                .add_pending_task(self.rpc_address.clone(), &spec, 0)?;
            if handle.is_dead() {
                self.task_manager
                    .pending_task_failed(task_id, ErrorType::ActorDied);
                return Err(CoreWorkerError::Io("sent task to dead actor".into()));
            }
            self.direct_actor_submitter.submit_task(actor_id, spec)?;
        } else {
            self.raylet_client
                .submit_task(proto::SubmitTaskRequest {
                    task_spec: Some(spec),
                })
                .await
                .map_err(CoreWorkerError::from_rpc_status)?;
        }
        Ok(return_ids)
    }

    /// Kill an actor via its current connection.
    pub async fn kill_actor(&self, actor_id: ActorID) -> CoreWorkerResult<()> {
        let handle = self
            .actor_manager
            .get_actor_handle(&actor_id)
            .ok_or_else(|| CoreWorkerError::ActorNotFound(actor_id.hex()))?;
        if !handle.is_direct_call() {
            return Err(CoreWorkerError::InvalidArgument(
                "kill is only supported for direct-call actors".into(),
            ));
        }
        self.direct_actor_submitter.kill_actor(actor_id).await
    }

    // ─── Actor handles ───────────────────────────────────────────────

    /// Serialize the handle for transport to another process.
    pub fn serialize_actor_handle(&self, actor_id: &ActorID) -> CoreWorkerResult<Vec<u8>> {
        let handle = self
            .actor_manager
            .get_actor_handle(actor_id)
            .ok_or_else(|| CoreWorkerError::ActorNotFound(actor_id.hex()))?;
        Ok(handle.serialize())
    }

    /// Rebuild a handle from its serialized form, register it locally, and
    /// subscribe to the actor's state.
    pub async fn deserialize_and_register_actor_handle(
        &self,
        serialized: &[u8],
    ) -> CoreWorkerResult<ActorID> {
        let handle = Arc::new(ActorHandle::deserialize(serialized)?);
        let actor_id = handle.actor_id();
        self.add_actor_handle(handle).await;
        Ok(actor_id)
    }

    /// Register a handle and subscribe to its actor's state transitions.
    /// Returns false (keeping the existing registration) on a duplicate.
    pub async fn add_actor_handle(&self, handle: Arc<ActorHandle>) -> bool {
        let actor_id = handle.actor_id();
        let inserted = self.actor_manager.register_actor_handle(handle);
        if !inserted {
            return false;
        }
        self.direct_actor_submitter.add_actor(actor_id);

        let weak = self.weak_self.clone();
        let callback: ActorNotificationCallback = Arc::new(move |data: proto::ActorTableData| {
            if let Some(core_worker) = weak.upgrade() {
                core_worker.handle_actor_notification(data);
            }
        });
        if let Err(e) = self
            .gcs_client
            .subscribe_actor(actor_id.binary(), callback)
            .await
        {
            tracing::warn!(actor_id = %actor_id.hex(), error = %e, "actor subscription failed");
        }
        true
    }

    fn handle_actor_notification(&self, data: proto::ActorTableData) {
        let actor_id = ActorID::from_binary(&data.actor_id);
        let state = ActorState::try_from(data.state).unwrap_or(ActorState::Pending);
        tracing::info!(
            actor_id = %actor_id.hex(),
            ?state,
            ip = data.address.as_ref().map(|a| a.ip_address.clone()).unwrap_or_default(),
            "actor state notification"
        );
        let handle = self.actor_manager.get_actor_handle(&actor_id);
        match state {
            ActorState::Alive => {
                if let Some(handle) = &handle {
                    handle.mark_alive();
                }
                if let Some(address) = data.address {
                    self.direct_actor_submitter.connect_actor(actor_id, address);
                }
            }
            ActorState::Reconstructing => {
                if let Some(handle) = &handle {
                    handle.mark_reconstructing();
                    if handle.is_direct_call() {
                        // The restarted actor will not remember the sequence
                        // numbers already sent.
                        handle.reset();
                    }
                }
                self.direct_actor_submitter.disconnect_actor(actor_id, false);
            }
            ActorState::Dead => {
                self.direct_actor_submitter.disconnect_actor(actor_id, true);
                if let Some(handle) = handle {
                    // Kept registered: later submissions get a clear error.
                    handle.mark_dead();
                }
            }
            ActorState::Pending => {}
        }
    }

    // ─── Execution ───────────────────────────────────────────────────

    /// Run one assigned task. Invoked on the execution loop by the task
    /// receiver; never fails outright — failures are encoded in the reply.
    pub async fn execute_task(&self, spec: proto::TaskSpec) -> proto::PushTaskReply {
        let task_id = task_id_of(&spec);
        {
            let mut state = self.state.lock();
            state.num_executed_tasks += 1;
            state.current_task = Some(spec.clone());
        }
        self.context.set_current_task_id(task_id);
        self.context
            .set_current_task_is_direct_call(spec.is_direct_call);
        *self.main_thread_task_id.lock() = task_id;

        let task_type = TaskType::try_from(spec.r#type).unwrap_or(TaskType::NormalTask);
        let mut return_ids = task_return_ids(&spec);
        match task_type {
            TaskType::ActorCreationTask => {
                if let Some(creation) = &spec.actor_creation_task_spec {
                    let actor_id = ActorID::from_binary(&creation.actor_id);
                    tracing::info!(actor_id = %actor_id.hex(), "creating actor");
                    self.set_actor_id(actor_id);
                    self.context.set_current_actor_id(actor_id);
                    self.context.set_current_actor_is_asyncio(creation.is_asyncio);
                }
                // The last return is the cursor; the executor never sees it.
                return_ids.pop();
            }
            TaskType::ActorTask => {
                return_ids.pop();
            }
            _ => {}
        }

        let reply = self.run_executor(&spec, task_type, return_ids).await;

        if task_type == TaskType::NormalTask {
            let in_scope = self.reference_counter.num_object_ids_in_scope();
            if in_scope != 0 {
                tracing::debug!(
                    task_id = %task_id.hex(),
                    in_scope,
                    "object IDs still in scope after a normal task; this may \
                     indicate references kept in user state"
                );
            }
        }

        self.context.set_current_task_id(TaskID::nil());
        *self.main_thread_task_id.lock() = TaskID::nil();
        self.state.lock().current_task = None;
        reply
    }

    async fn run_executor(
        &self,
        spec: &proto::TaskSpec,
        task_type: TaskType,
        return_ids: Vec<ObjectID>,
    ) -> proto::PushTaskReply {
        let (args, arg_reference_ids) = match self.build_args_for_executor(spec).await {
            Ok(parts) => parts,
            Err(e) => {
                tracing::warn!(error = %e, "failed to materialize task arguments");
                return proto::PushTaskReply {
                    is_retryable_error: true,
                    task_execution_error: e.to_string(),
                    ..Default::default()
                };
            }
        };

        let Some(callback) = self.task_execution_callback.lock().clone() else {
            return proto::PushTaskReply {
                is_retryable_error: true,
                task_execution_error: "task execution callback not set".into(),
                ..Default::default()
            };
        };

        let request = TaskExecutionRequest {
            task_type,
            function: spec.function.clone().unwrap_or_default(),
            required_resources: spec.required_resources.clone(),
            args,
            arg_reference_ids,
            return_ids: return_ids.clone(),
        };

        match callback(request).await {
            Ok(returns) => self.store_task_returns(spec, &return_ids, returns).await,
            Err(e) => {
                tracing::warn!(error = %e, "task raised an application error");
                proto::PushTaskReply {
                    return_objects: return_ids
                        .iter()
                        .map(|id| error_return_object(id, ErrorType::TaskExecutionException))
                        .collect(),
                    is_application_error: true,
                    task_execution_error: e.to_string(),
                    ..Default::default()
                }
            }
        }
    }

    /// Materialize task arguments: inline values are copied out of the spec;
    /// by-reference arguments are fetched from plasma in one batch, after
    /// seeding the memory store with in-plasma sentinels for direct IDs so a
    /// user-level Get inside the task routes correctly.
    async fn build_args_for_executor(
        &self,
        spec: &proto::TaskSpec,
    ) -> CoreWorkerResult<(Vec<StoreObject>, Vec<ObjectID>)> {
        let num_args = spec.args.len();
        let mut args: Vec<Option<StoreObject>> = (0..num_args).map(|_| None).collect();
        let mut arg_reference_ids = vec![ObjectID::nil(); num_args];

        let mut by_ref_ids: HashSet<ObjectID> = HashSet::new();
        let mut by_ref_indices: HashMap<ObjectID, Vec<usize>> = HashMap::new();

        for (i, arg) in spec.args.iter().enumerate() {
            match &arg.object_ref {
                Some(object_ref) => {
                    let object_id = ObjectID::from_binary(&object_ref.object_id);
                    if object_id.is_direct_call_type() {
                        // Direct objects that were not inlined were promoted
                        // to plasma by the caller.
                        let _ = self.memory_store.put(object_id, StoreObject::InPlasma);
                    }
                    by_ref_ids.insert(object_id);
                    by_ref_indices.entry(object_id).or_default().push(i);
                    arg_reference_ids[i] = object_id;
                }
                None => {
                    args[i] = Some(StoreObject::value(
                        Bytes::from(arg.data.clone()),
                        Bytes::from(arg.metadata.clone()),
                        Vec::new(),
                    ));
                }
            }
        }

        let mut fetched = HashMap::new();
        let mut got_exception = false;
        self.plasma
            .get(&by_ref_ids, -1, &mut fetched, &mut got_exception)
            .await?;
        for (object_id, object) in fetched {
            for &i in &by_ref_indices[&object_id] {
                args[i] = Some(object.clone());
            }
        }

        let args = args
            .into_iter()
            .map(|arg| {
                arg.ok_or_else(|| CoreWorkerError::Internal("task argument not fetched".into()))
            })
            .collect::<CoreWorkerResult<Vec<_>>>()?;
        Ok((args, arg_reference_ids))
    }

    /// Route produced return objects: small direct-call values ride the
    /// reply inline; everything else goes to plasma. `None` entries were
    /// pre-allocated in plasma by the executor and only need sealing.
    async fn store_task_returns(
        &self,
        spec: &proto::TaskSpec,
        return_ids: &[ObjectID],
        mut returns: Vec<Option<StoreObject>>,
    ) -> proto::PushTaskReply {
        returns.resize(return_ids.len(), None);
        let mut return_objects = Vec::with_capacity(return_ids.len());

        for (object_id, produced) in return_ids.iter().zip(returns) {
            match produced {
                None => match self.plasma.seal(*object_id).await {
                    Ok(()) => return_objects.push(plasma_return_object(object_id, 0)),
                    Err(e) => {
                        // Nothing was allocated: the executor intentionally
                        // produced no value for this slot.
                        tracing::debug!(object_id = %object_id.hex(), error = %e, "no return object");
                    }
                },
                Some(object) => {
                    let inline_eligible = spec.is_direct_call
                        && object.data_size() <= self.config.max_direct_call_object_size
                        && object
                            .payload()
                            .map(|p| p.nested_refs.is_empty())
                            .unwrap_or(true);
                    if inline_eligible {
                        return_objects.push(inline_return_object(object_id, &object));
                    } else {
                        let size = object.data_size() as u64;
                        if let Err(e) = self.plasma.put(&object, *object_id).await {
                            tracing::error!(
                                object_id = %object_id.hex(),
                                error = %e,
                                "failed to store return object"
                            );
                            return_objects
                                .push(error_return_object(object_id, ErrorType::WorkerDied));
                            continue;
                        }
                        return_objects.push(plasma_return_object(object_id, size));
                    }
                }
            }
        }

        proto::PushTaskReply {
            return_objects,
            ..Default::default()
        }
    }

    /// Pre-allocate return buffers for the executor. Small direct-call
    /// returns with no contained IDs get local buffers (carried inline in
    /// the reply); the rest are allocated in plasma.
    pub async fn allocate_return_objects(
        &self,
        object_ids: &[ObjectID],
        data_sizes: &[usize],
        metadatas: &[Bytes],
        contained_ids: &[Vec<ObjectID>],
    ) -> CoreWorkerResult<Vec<AllocatedReturn>> {
        assert_eq!(object_ids.len(), data_sizes.len());
        assert_eq!(object_ids.len(), metadatas.len());
        assert_eq!(object_ids.len(), contained_ids.len());

        let mut allocations = Vec::with_capacity(object_ids.len());
        for i in 0..object_ids.len() {
            let allocation = if data_sizes[i] == 0 {
                AllocatedReturn {
                    object_id: object_ids[i],
                    buffer: None,
                    in_plasma: false,
                }
            } else if self.context.current_task_is_direct_call()
                && data_sizes[i] < self.config.max_direct_call_object_size
                && contained_ids[i].is_empty()
            {
                AllocatedReturn {
                    object_id: object_ids[i],
                    buffer: Some(MutableBuffer::new(data_sizes[i])),
                    in_plasma: false,
                }
            } else {
                let buffer = self
                    .plasma
                    .create(object_ids[i], metadatas[i].clone(), data_sizes[i])
                    .await?;
                // A missing buffer means the object already exists and must
                // not be re-owned.
                AllocatedReturn {
                    object_id: object_ids[i],
                    buffer,
                    in_plasma: true,
                }
            };
            allocations.push(allocation);
        }
        Ok(allocations)
    }

    // ─── Periodic machinery ──────────────────────────────────────────

    async fn internal_heartbeat(&self) {
        let due: Vec<proto::TaskSpec> = {
            let mut queue = self.to_resubmit.lock();
            let now = current_time_ms();
            let mut due = Vec::new();
            while queue.front().is_some_and(|(deadline, _)| *deadline <= now) {
                due.push(queue.pop_front().expect("front checked").1);
            }
            due
        };
        for spec in due {
            tracing::info!(task_id = %hex::encode(&spec.task_id), "resubmitting task");
            if let Err(e) = Arc::clone(&self.direct_task_submitter).submit_task(spec).await {
                tracing::error!(error = %e, "resubmission failed");
            }
        }
    }

    async fn register_driver_task(&self) -> CoreWorkerResult<()> {
        let driver_task_id = TaskID::for_driver_task(&self.context.current_job_id());
        let mut builder = TaskSpecBuilder::new();
        builder.set_common_task_spec(
            &driver_task_id,
            "driver".to_string(),
            proto::FunctionDescriptor {
                language: self.language,
                parts: Vec::new(),
            },
            &self.context.current_job_id(),
            &TaskID::nil(),
            0,
            &driver_task_id,
            self.rpc_address.clone(),
            0,
            HashMap::new(),
            false,
        );
        let mut spec = builder.build();
        spec.r#type = TaskType::DriverTask as i32;

        self.gcs_client
            .add_task(proto::AddTaskRequest {
                task_data: Some(proto::TaskTableData {
                    task_spec: Some(spec),
                }),
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;

        self.context.set_current_task_id(driver_task_id);
        *self.main_thread_task_id.lock() = driver_task_id;
        Ok(())
    }

    /// Report an error back to the driver through the raylet.
    pub async fn push_error(
        &self,
        job_id: JobID,
        error_type: String,
        error_message: String,
    ) -> CoreWorkerResult<()> {
        self.raylet_client
            .push_error(proto::PushErrorRequest {
                job_id: job_id.binary(),
                error_type,
                error_message,
                timestamp: skiff_util::time::current_sys_time_seconds(),
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(())
    }

    /// Ask the raylet to snapshot an actor's state; returns the checkpoint ID.
    pub async fn prepare_actor_checkpoint(&self, actor_id: ActorID) -> CoreWorkerResult<Vec<u8>> {
        let reply = self
            .raylet_client
            .prepare_actor_checkpoint(proto::PrepareActorCheckpointRequest {
                actor_id: actor_id.binary(),
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(reply.checkpoint_id)
    }

    /// Tell the raylet an actor resumed from a checkpoint.
    pub async fn notify_actor_resumed_from_checkpoint(
        &self,
        actor_id: ActorID,
        checkpoint_id: Vec<u8>,
    ) -> CoreWorkerResult<()> {
        self.raylet_client
            .notify_actor_resumed_from_checkpoint(proto::NotifyActorResumedFromCheckpointRequest {
                actor_id: actor_id.binary(),
                checkpoint_id,
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(())
    }

    /// Adjust a node resource capacity through the raylet.
    pub async fn set_resource(
        &self,
        resource_name: String,
        capacity: f64,
        node_id: &skiff_common::id::NodeID,
    ) -> CoreWorkerResult<()> {
        self.raylet_client
            .set_resource(proto::SetResourceRequest {
                resource_name,
                capacity,
                node_id: node_id.binary(),
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(())
    }

    async fn pin_objects(&self, object_ids: &[ObjectID]) -> CoreWorkerResult<()> {
        self.raylet_client
            .pin_object_ids(proto::PinObjectIdsRequest {
                owner_address: Some(self.rpc_address.clone()),
                object_ids: object_ids.iter().map(|id| id.binary()).collect(),
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(())
    }

    fn reclassify_in_plasma(
        &self,
        memory_ids: &mut HashSet<ObjectID>,
        plasma_ids: &mut HashSet<ObjectID>,
        ready: &mut HashSet<ObjectID>,
    ) {
        let promoted: Vec<ObjectID> = memory_ids
            .iter()
            .filter(|id| ready.contains(*id) && self.memory_store.contains(id).1)
            .copied()
            .collect();
        for object_id in promoted {
            memory_ids.remove(&object_id);
            ready.remove(&object_id);
            plasma_ids.insert(object_id);
        }
    }

    // ─── Identity & stats ────────────────────────────────────────────

    /// The caller ID used in specs this worker submits: the actor creation
    /// task for actors, the main-thread task otherwise.
    pub fn get_caller_id(&self) -> TaskID {
        let actor_id = self.current_actor_id();
        if !actor_id.is_nil() {
            TaskID::for_actor_creation_task(&actor_id)
        } else {
            *self.main_thread_task_id.lock()
        }
    }

    fn set_actor_id(&self, actor_id: ActorID) {
        let mut state = self.state.lock();
        debug_assert!(state.actor_id.is_nil(), "actor ID assigned twice");
        state.actor_id = actor_id;
    }

    pub fn current_actor_id(&self) -> ActorID {
        self.state.lock().actor_id
    }

    pub fn set_actor_title(&self, title: String) {
        self.state.lock().actor_title = title;
    }

    pub fn set_webui_display(&self, key: String, message: String) {
        self.state.lock().webui_display.insert(key, message);
    }

    /// Snapshot of this worker's state for GetCoreWorkerStats.
    pub fn stats(&self) -> proto::CoreWorkerStats {
        let state = self.state.lock();
        let store_stats = self.memory_store.stats();
        proto::CoreWorkerStats {
            num_pending_tasks: self.task_manager.num_pending_tasks() as i64,
            task_queue_length: self.task_receiver.task_queue_length() as i64,
            num_executed_tasks: state.num_executed_tasks as i64,
            num_object_ids_in_scope: self.reference_counter.num_object_ids_in_scope() as i64,
            current_task_desc: state
                .current_task
                .as_ref()
                .map(|spec| format!("{}:{}", spec.name, hex::encode(&spec.task_id)))
                .unwrap_or_default(),
            ip_address: self.rpc_address.ip_address.clone(),
            port: self.rpc_address.port,
            actor_id: state.actor_id.binary(),
            actor_title: state.actor_title.clone(),
            webui_display: state.webui_display.clone(),
            num_local_objects: store_stats.num_local_objects as i64,
            used_object_store_memory: store_stats.used_object_store_memory as i64,
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────

    pub fn worker_context(&self) -> &WorkerContext {
        &self.context
    }

    pub fn worker_id(&self) -> WorkerID {
        self.context.worker_id()
    }

    pub fn current_job_id(&self) -> JobID {
        self.context.current_job_id()
    }

    pub fn current_task_id(&self) -> TaskID {
        self.context.current_task_id()
    }

    pub fn rpc_address(&self) -> &proto::Address {
        &self.rpc_address
    }

    pub fn memory_store(&self) -> &Arc<CoreWorkerMemoryStore> {
        &self.memory_store
    }

    pub fn reference_counter(&self) -> &Arc<ReferenceCounter> {
        &self.reference_counter
    }

    pub fn task_manager(&self) -> &Arc<TaskManager> {
        &self.task_manager
    }

    pub fn actor_manager(&self) -> &Arc<ActorManager> {
        &self.actor_manager
    }

    pub fn task_receiver(&self) -> &Arc<TaskReceiver> {
        &self.task_receiver
    }

    pub fn direct_task_submitter(&self) -> &Arc<DirectTaskSubmitter> {
        &self.direct_task_submitter
    }

    pub fn direct_actor_submitter(&self) -> &Arc<DirectActorSubmitter> {
        &self.direct_actor_submitter
    }

    /// Entries currently queued for delayed resubmission. Diagnostic.
    pub fn num_tasks_awaiting_resubmit(&self) -> usize {
        self.to_resubmit.lock().len()
    }
}

impl Drop for CoreWorker {
    fn drop(&mut self) {
        self.execution_loop.stop();
        for task in self.background_tasks.lock().drain(..) {
            task.abort();
        }
    }
}

/// Partition ids by the transport tag: (plasma set, memory set).
fn group_by_store(ids: &[ObjectID]) -> (HashSet<ObjectID>, HashSet<ObjectID>) {
    let mut plasma_ids = HashSet::new();
    let mut memory_ids = HashSet::new();
    for id in ids {
        match id.transport_type() {
            TransportType::Direct => {
                memory_ids.insert(*id);
            }
            TransportType::Raylet => {
                plasma_ids.insert(*id);
            }
        }
    }
    (plasma_ids, memory_ids)
}

/// Remaining budget after `start`, preserving unbounded (−1) timeouts.
fn residual_timeout(timeout_ms: i64, start_ms: u64) -> i64 {
    if timeout_ms < 0 {
        -1
    } else {
        (timeout_ms - (current_time_ms().saturating_sub(start_ms)) as i64).max(0)
    }
}
