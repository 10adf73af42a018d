// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Direct submission of actor tasks.
//!
//! Per actor, the submitter holds a connection state, a pending queue, and
//! the RPC client for the actor's current address. Calls submitted on one
//! handle are delivered in submission order: a single flush loop per actor
//! sends queued specs one at a time. Transient disconnects hold the queue
//! for the reconnect; a dead actor fails everything with ACTOR_DIED.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use skiff_common::id::ActorID;
use skiff_proto::{self as proto, ErrorType};

use crate::error::{CoreWorkerError, CoreWorkerResult};
use crate::task_manager::TaskManager;
use crate::task_spec_builder::task_id_of;
use crate::worker_client::{ClientFactory, CoreWorkerClient};

/// Connection state of one actor as seen by this submitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorConnectionState {
    /// Registered, address not yet known.
    PendingConnect,
    Connected,
    /// Being restarted by the scheduler; queued calls are held.
    Reconstructing,
    Dead,
}

struct ActorQueue {
    state: ActorConnectionState,
    pending: VecDeque<proto::TaskSpec>,
    client: Option<Arc<dyn CoreWorkerClient>>,
    address: Option<proto::Address>,
    flushing: bool,
    num_sent: u64,
}

impl ActorQueue {
    fn new() -> Self {
        Self {
            state: ActorConnectionState::PendingConnect,
            pending: VecDeque::new(),
            client: None,
            address: None,
            flushing: false,
            num_sent: 0,
        }
    }
}

pub struct DirectActorSubmitter {
    client_factory: ClientFactory,
    task_manager: Arc<TaskManager>,
    queues: Mutex<HashMap<ActorID, ActorQueue>>,
    weak_self: Weak<DirectActorSubmitter>,
}

impl DirectActorSubmitter {
    pub fn new(client_factory: ClientFactory, task_manager: Arc<TaskManager>) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            client_factory,
            task_manager,
            queues: Mutex::new(HashMap::new()),
            weak_self: weak.clone(),
        })
    }

    /// Register an actor so tasks can queue for it before it connects.
    pub fn add_actor(&self, actor_id: ActorID) {
        self.queues.lock().entry(actor_id).or_insert_with(ActorQueue::new);
    }

    /// Queue a task for the actor; flushes immediately when connected.
    pub fn submit_task(&self, actor_id: ActorID, spec: proto::TaskSpec) -> CoreWorkerResult<()> {
        {
            let mut queues = self.queues.lock();
            let queue = queues
                .get_mut(&actor_id)
                .ok_or_else(|| CoreWorkerError::ActorNotFound(actor_id.hex()))?;
            if queue.state == ActorConnectionState::Dead {
                drop(queues);
                self.task_manager
                    .pending_task_failed(task_id_of(&spec), ErrorType::ActorDied);
                return Err(CoreWorkerError::Io("sent task to dead actor".into()));
            }
            queue.pending.push_back(spec);
        }
        self.maybe_flush(actor_id);
        Ok(())
    }

    /// The actor is alive at `address`: open a client and drain the queue.
    pub fn connect_actor(&self, actor_id: ActorID, address: proto::Address) {
        {
            let mut queues = self.queues.lock();
            let queue = queues.entry(actor_id).or_insert_with(ActorQueue::new);
            if queue.state == ActorConnectionState::Dead {
                tracing::warn!(actor_id = %actor_id.hex(), "ignoring connect for dead actor");
                return;
            }
            queue.client = Some((self.client_factory)(&address));
            queue.address = Some(address);
            queue.state = ActorConnectionState::Connected;
        }
        tracing::info!(actor_id = %actor_id.hex(), "actor connected");
        self.maybe_flush(actor_id);
    }

    /// The actor went away. `dead` distinguishes a permanent death (fail
    /// every queued call) from reconstruction (hold the queue).
    pub fn disconnect_actor(&self, actor_id: ActorID, dead: bool) {
        let failed: Vec<proto::TaskSpec> = {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&actor_id) else {
                return;
            };
            queue.client = None;
            queue.address = None;
            if dead {
                queue.state = ActorConnectionState::Dead;
                queue.pending.drain(..).collect()
            } else {
                queue.state = ActorConnectionState::Reconstructing;
                Vec::new()
            }
        };
        if dead {
            tracing::info!(
                actor_id = %actor_id.hex(),
                num_failed = failed.len(),
                "actor died, failing queued tasks"
            );
            for spec in failed {
                self.task_manager
                    .pending_task_failed(task_id_of(&spec), ErrorType::ActorDied);
            }
        } else {
            tracing::info!(actor_id = %actor_id.hex(), "actor reconstructing, holding queue");
        }
    }

    /// Send a KillActor RPC to the actor's current address.
    pub async fn kill_actor(&self, actor_id: ActorID) -> CoreWorkerResult<()> {
        let client = {
            let queues = self.queues.lock();
            queues.get(&actor_id).and_then(|q| q.client.clone())
        };
        let client = client.ok_or_else(|| {
            CoreWorkerError::Io(format!("no connection to actor {}", actor_id.hex()))
        })?;
        client
            .kill_actor(proto::KillActorRequest {
                intended_actor_id: actor_id.binary(),
                force_kill: false,
            })
            .await
            .map_err(CoreWorkerError::from_rpc_status)?;
        Ok(())
    }

    /// Start the per-actor flush loop unless one is already running. The
    /// single loop awaiting each push preserves submission order.
    fn maybe_flush(&self, actor_id: ActorID) {
        {
            let mut queues = self.queues.lock();
            let Some(queue) = queues.get_mut(&actor_id) else {
                return;
            };
            if queue.flushing
                || queue.state != ActorConnectionState::Connected
                || queue.pending.is_empty()
            {
                return;
            }
            queue.flushing = true;
        }
        let Some(this) = self.weak_self.upgrade() else {
            return;
        };
        tokio::spawn(async move {
            Self::flush_loop(&this, actor_id).await;
        });
    }

    async fn flush_loop(this: &Arc<Self>, actor_id: ActorID) {
        loop {
            let (spec, client, worker_id) = {
                let mut queues = this.queues.lock();
                let Some(queue) = queues.get_mut(&actor_id) else {
                    return;
                };
                if queue.state != ActorConnectionState::Connected || queue.pending.is_empty() {
                    queue.flushing = false;
                    return;
                }
                let spec = queue.pending.pop_front().expect("checked non-empty");
                let client = queue.client.clone().expect("connected actor has a client");
                let worker_id = queue
                    .address
                    .as_ref()
                    .map(|a| a.worker_id.clone())
                    .unwrap_or_default();
                (spec, client, worker_id)
            };

            let task_id = task_id_of(&spec);
            let sequence_number = spec
                .actor_task_spec
                .as_ref()
                .map(|s| s.sequence_number as i64)
                .unwrap_or(-1);
            let req = proto::PushTaskRequest {
                intended_worker_id: worker_id,
                task_spec: Some(spec.clone()),
                sequence_number,
            };

            match client.push_task(req).await {
                Ok(reply) => {
                    this.task_manager.complete_pending_task(task_id, &reply);
                    let mut queues = this.queues.lock();
                    if let Some(queue) = queues.get_mut(&actor_id) {
                        queue.num_sent += 1;
                    }
                }
                Err(status) => {
                    tracing::warn!(
                        actor_id = %actor_id.hex(),
                        task_id = %task_id.hex(),
                        error = %status,
                        "actor push failed"
                    );
                    let mut queues = this.queues.lock();
                    let Some(queue) = queues.get_mut(&actor_id) else {
                        return;
                    };
                    if queue.state == ActorConnectionState::Dead {
                        drop(queues);
                        this.task_manager
                            .pending_task_failed(task_id, ErrorType::ActorDied);
                    } else {
                        // Keep the call for the next incarnation, in order.
                        queue.pending.push_front(spec);
                        queue.state = ActorConnectionState::Reconstructing;
                        queue.client = None;
                        queue.flushing = false;
                    }
                    return;
                }
            }
        }
    }

    pub fn connection_state(&self, actor_id: &ActorID) -> Option<ActorConnectionState> {
        self.queues.lock().get(actor_id).map(|q| q.state)
    }

    pub fn num_pending_tasks(&self, actor_id: &ActorID) -> usize {
        self.queues
            .lock()
            .get(actor_id)
            .map_or(0, |q| q.pending.len())
    }

    pub fn num_tasks_sent(&self, actor_id: &ActorID) -> u64 {
        self.queues.lock().get(actor_id).map_or(0, |q| q.num_sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::CoreWorkerMemoryStore;
    use crate::reference_counter::ReferenceCounter;
    use crate::task_spec_builder::task_return_ids;
    use skiff_common::id::TaskID;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tonic::Status;

    struct RecordingWorkerClient {
        sent_names: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    #[async_trait::async_trait]
    impl CoreWorkerClient for RecordingWorkerClient {
        async fn push_task(
            &self,
            req: proto::PushTaskRequest,
        ) -> Result<proto::PushTaskReply, Status> {
            if self.fail.load(Ordering::Relaxed) {
                return Err(Status::unavailable("actor unreachable"));
            }
            self.sent_names
                .lock()
                .push(req.task_spec.unwrap().name.clone());
            Ok(proto::PushTaskReply::default())
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
            self.sent_names.lock().push("KillActor".to_string());
            Ok(proto::KillActorReply::default())
        }
    }

    struct Fixture {
        submitter: Arc<DirectActorSubmitter>,
        task_manager: Arc<TaskManager>,
        memory_store: Arc<CoreWorkerMemoryStore>,
        sent_names: Arc<Mutex<Vec<String>>>,
        fail: Arc<AtomicBool>,
    }

    fn make_fixture() -> Fixture {
        let memory_store = Arc::new(CoreWorkerMemoryStore::new());
        let task_manager = Arc::new(TaskManager::new(
            memory_store.clone(),
            Arc::new(ReferenceCounter::new()),
            Arc::new(|_spec| {}),
        ));
        let sent_names = Arc::new(Mutex::new(Vec::new()));
        let fail = Arc::new(AtomicBool::new(false));
        let sent2 = sent_names.clone();
        let fail2 = fail.clone();
        let factory: ClientFactory = Arc::new(move |_addr| {
            Arc::new(RecordingWorkerClient {
                sent_names: sent2.clone(),
                fail: fail2.clone(),
            })
        });
        let submitter = DirectActorSubmitter::new(factory, task_manager.clone());
        Fixture {
            submitter,
            task_manager,
            memory_store,
            sent_names,
            fail,
        }
    }

    fn make_actor_spec(name: &str, seq: u64) -> proto::TaskSpec {
        proto::TaskSpec {
            task_id: TaskID::from_random().binary(),
            name: name.to_string(),
            num_returns: 1,
            is_direct_call: true,
            actor_task_spec: Some(proto::ActorTaskSpec {
                sequence_number: seq,
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    #[tokio::test]
    async fn test_unknown_actor_rejected() {
        let f = make_fixture();
        let err = f
            .submitter
            .submit_task(ActorID::from_random(), make_actor_spec("t", 0))
            .unwrap_err();
        assert!(matches!(err, CoreWorkerError::ActorNotFound(_)));
    }

    #[tokio::test]
    async fn test_queued_until_connected_then_in_order() {
        let f = make_fixture();
        let actor_id = ActorID::from_random();
        f.submitter.add_actor(actor_id);

        for i in 0..3 {
            f.submitter
                .submit_task(actor_id, make_actor_spec(&format!("call_{i}"), i))
                .unwrap();
        }
        assert_eq!(f.submitter.num_pending_tasks(&actor_id), 3);
        assert!(f.sent_names.lock().is_empty());

        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        settle().await;

        assert_eq!(
            *f.sent_names.lock(),
            vec!["call_0", "call_1", "call_2"]
        );
        assert_eq!(f.submitter.num_pending_tasks(&actor_id), 0);
        assert_eq!(f.submitter.num_tasks_sent(&actor_id), 3);
    }

    #[tokio::test]
    async fn test_dead_actor_fails_queue_and_later_submissions() {
        let f = make_fixture();
        let actor_id = ActorID::from_random();
        f.submitter.add_actor(actor_id);

        let spec = make_actor_spec("queued", 0);
        let return_id = task_return_ids(&spec)[0];
        f.task_manager
            .add_pending_task(proto::Address::default(), &spec, 0)
            .unwrap();
        f.submitter.submit_task(actor_id, spec).unwrap();

        f.submitter.disconnect_actor(actor_id, true);
        assert_eq!(
            f.submitter.connection_state(&actor_id),
            Some(ActorConnectionState::Dead)
        );
        // The queued call failed with the actor-died marker.
        assert_eq!(
            f.memory_store.get_if_exists(&return_id).unwrap().error_type(),
            Some(skiff_proto::ErrorType::ActorDied)
        );

        // A later submission fails immediately.
        let late = make_actor_spec("late", 1);
        f.task_manager
            .add_pending_task(proto::Address::default(), &late, 0)
            .unwrap();
        let err = f.submitter.submit_task(actor_id, late).unwrap_err();
        assert!(matches!(err, CoreWorkerError::Io(_)));
    }

    #[tokio::test]
    async fn test_transient_disconnect_holds_queue() {
        let f = make_fixture();
        let actor_id = ActorID::from_random();
        f.submitter.add_actor(actor_id);
        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        settle().await;

        f.submitter.disconnect_actor(actor_id, false);
        f.submitter
            .submit_task(actor_id, make_actor_spec("held", 0))
            .unwrap();
        settle().await;
        assert_eq!(f.submitter.num_pending_tasks(&actor_id), 1);
        assert!(f.sent_names.lock().is_empty());

        // Reconnect drains the held call.
        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        settle().await;
        assert_eq!(*f.sent_names.lock(), vec!["held"]);
    }

    #[tokio::test]
    async fn test_push_failure_requeues_and_marks_reconstructing() {
        let f = make_fixture();
        let actor_id = ActorID::from_random();
        f.submitter.add_actor(actor_id);
        f.fail.store(true, Ordering::Relaxed);
        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        f.submitter
            .submit_task(actor_id, make_actor_spec("flaky", 0))
            .unwrap();
        settle().await;

        assert_eq!(
            f.submitter.connection_state(&actor_id),
            Some(ActorConnectionState::Reconstructing)
        );
        assert_eq!(f.submitter.num_pending_tasks(&actor_id), 1);

        // Recovery: reconnect and the held call goes through.
        f.fail.store(false, Ordering::Relaxed);
        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        settle().await;
        assert_eq!(*f.sent_names.lock(), vec!["flaky"]);
    }

    #[tokio::test]
    async fn test_kill_actor_requires_connection() {
        let f = make_fixture();
        let actor_id = ActorID::from_random();
        f.submitter.add_actor(actor_id);
        assert!(f.submitter.kill_actor(actor_id).await.is_err());

        f.submitter
            .connect_actor(actor_id, proto::Address::default());
        f.submitter.kill_actor(actor_id).await.unwrap();
        assert!(f.sent_names.lock().contains(&"KillActor".to_string()));
    }
}
