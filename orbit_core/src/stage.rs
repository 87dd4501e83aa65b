/*
 * Copyright © 2024, United States Government, as represented by the Administrator of
 * the National Aeronautics and Space Administration. All rights reserved.
 *
 * The “ODIN” software is licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License. You may obtain a copy
 * of the License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software distributed under
 * the License is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND,
 * either express or implied. See the License for the specific language governing permissions
 * and limitations under the License.
 */

// §4.6: composes every subsystem and owns start/stop plus the tick loop. The tick loop itself
// mirrors the teacher's ActorSystem start/stop vocabulary (start_all/terminate_and_wait,
// tokio_rt.rs) built over a cancellation token instead of a request channel, since Stage has
// no need for the teacher's runtime actor-spawn-request protocol.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::capabilities::CapabilityRegistry;
use crate::clock::{Clock, SystemClock};
use crate::config::StageConfig;
use crate::directory::AddressableDirectory;
use crate::errors::OrbitError;
use crate::execution::ExecutionSystem;
use crate::model::{AddressableInterfaceDefinition, AddressableInvocation, Completion, Message, NodeIdentity, NodeInfo, NodeMode, NodeStatus};
use crate::net_system::{NetSystem, Transport};
use crate::pipeline::{Pipeline, PipelineWorker};
use crate::pools::{default_error_handler, ErrorHandler, Pools};
use crate::response_tracker::ResponseTrackingSystem;
use crate::router::{ClusterView, Router};

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
#[repr(u8)]
enum StageState { Stopped = 0, Starting = 1, Running = 2, Stopping = 3 }

/// builds a `Stage` from its external collaborators (§6) plus config. Mirrors the two-phase
/// registration the teacher uses for `ActorSystem` (instances first, late-bound lookups during
/// `start()`) so cyclic references between Stage and its subsystems never need owning back-pointers.
pub struct StageBuilder {
    config: StageConfig,
    directory: Arc<dyn AddressableDirectory>,
    transport: Arc<dyn Transport>,
    cluster_view: Arc<dyn ClusterView>,
    registry: CapabilityRegistry,
    definitions: HashMap<String, AddressableInterfaceDefinition>,
    clock: Arc<dyn Clock>,
    error_handler: ErrorHandler,
}

impl StageBuilder {
    pub fn new (config: StageConfig, directory: Arc<dyn AddressableDirectory>, transport: Arc<dyn Transport>, cluster_view: Arc<dyn ClusterView>)->Self {
        StageBuilder {
            config, directory, transport, cluster_view,
            registry: CapabilityRegistry::new(),
            definitions: HashMap::new(),
            clock: Arc::new(SystemClock),
            error_handler: default_error_handler(),
        }
    }

    pub fn with_clock (mut self, clock: Arc<dyn Clock>)->Self { self.clock = clock; self }
    pub fn with_error_handler (mut self, handler: ErrorHandler)->Self { self.error_handler = handler; self }

    /// `definition.timeout_millis == 0` means "use the stage's configured default"
    /// (`StageConfig::message_timeout_millis`), resolved once in [`build`].
    pub fn register_addressable (mut self, definition: AddressableInterfaceDefinition, factory: crate::capabilities::AddressableFactory)->Self {
        self.registry.register( definition.interface_id.clone(), factory);
        self.definitions.insert( definition.interface_id.clone(), definition);
        self
    }

    pub fn build (mut self)->Stage {
        for definition in self.definitions.values_mut() {
            if definition.timeout_millis == 0 {
                definition.timeout_millis = self.config.message_timeout_millis;
            }
        }

        let capabilities: BTreeSet<String> = self.registry.interface_ids().cloned().collect();
        let node_identity = NodeIdentity::new(self.config.node_identity.clone());

        let net_system = Arc::new(NetSystem::new(NodeInfo {
            cluster_name: self.config.cluster_name.clone(),
            node_identity: node_identity.clone(),
            mode: NodeMode::from(self.config.node_mode),
            status: NodeStatus::Stopped,
            capabilities,
        }));

        let definitions = Arc::new(self.definitions);
        let registry = Arc::new(self.registry);
        let pools = Arc::new(Pools::new(self.error_handler.clone()));

        let execution = Arc::new(ExecutionSystem::new(
            registry, definitions.clone(), self.directory.clone(), self.clock.clone(),
            node_identity, self.config.mailbox_capacity,
        ));

        let response_tracker = Arc::new(ResponseTrackingSystem::new(self.clock.clone()));
        let router = Arc::new(Router::new(self.directory.clone(), net_system.clone(), self.cluster_view));

        let (pipeline, pipeline_worker) = Pipeline::new(
            self.config.pipeline_buffer_count, router, response_tracker.clone(), execution.clone(),
            net_system.clone(), self.transport.clone(),
        );

        Stage {
            config: self.config,
            net_system,
            execution,
            response_tracker,
            pipeline: Arc::new(pipeline),
            pipeline_worker: Mutex::new(Some(pipeline_worker)),
            transport: self.transport,
            definitions,
            pools,
            clock: self.clock,
            state: AtomicU8::new(StageState::Stopped as u8),
            tick_task: Mutex::new(None),
            error_handler: self.error_handler,
        }
    }
}

/// §4.6: the composition root. `start()`/`stop()` drive the node lifecycle; the background
/// tick task drives `ResponseTrackingSystem::on_tick` then `ExecutionSystem::on_tick` (§9: in
/// that order, so timeouts are visible before deactivation decisions within the same tick).
pub struct Stage {
    config: StageConfig,
    net_system: Arc<NetSystem>,
    execution: Arc<ExecutionSystem>,
    response_tracker: Arc<ResponseTrackingSystem>,
    pipeline: Arc<Pipeline>,
    pipeline_worker: Mutex<Option<PipelineWorker>>,
    transport: Arc<dyn Transport>,
    definitions: Arc<HashMap<String, AddressableInterfaceDefinition>>,
    pools: Arc<Pools>,
    clock: Arc<dyn Clock>,
    state: AtomicU8,
    tick_task: Mutex<Option<JoinHandle<()>>>,
    error_handler: ErrorHandler,
}

impl Stage {
    pub async fn start (&self)->Result<(), OrbitError> {
        self.state.store(StageState::Starting as u8, Ordering::Release);
        tracing::info!( cluster = %self.config.cluster_name, node = %self.config.node_identity, "stage starting");

        let worker = self.pipeline_worker.lock().unwrap().take()
            .ok_or_else(|| OrbitError::OpFailed("stage already started".to_string()))?;
        self.pools.spawn_cpu("pipeline-worker", worker.run());

        self.net_system.set_status( NodeStatus::Running);
        self.state.store(StageState::Running as u8, Ordering::Release);

        let tick_rate = Duration::from_millis(self.config.tick_rate_millis);
        let time_to_live = Duration::from_millis(self.config.time_to_live_millis);
        let response_tracker = self.response_tracker.clone();
        let execution = self.execution.clone();
        let error_handler = self.error_handler.clone();

        let handle = tokio::spawn( tick_loop(tick_rate, time_to_live, response_tracker, execution, error_handler));
        *self.tick_task.lock().unwrap() = Some(handle);

        tracing::info!("stage running");
        Ok(())
    }

    pub async fn stop (&self)->Result<(), OrbitError> {
        self.state.store(StageState::Stopping as u8, Ordering::Release);
        self.net_system.set_status( NodeStatus::Stopping);
        tracing::info!("stage stopping");

        if let Some(handle) = self.tick_task.lock().unwrap().take() {
            handle.abort();
        }

        self.pools.shutdown().await;
        self.net_system.set_status( NodeStatus::Stopped);
        self.state.store(StageState::Stopped as u8, Ordering::Release);
        tracing::info!("stage stopped");
        Ok(())
    }

    /// client-facing entry point (§6 `ActorProxyFactory`): submit an invocation and await
    /// its correlated response through the full outbound/inbound pipeline.
    pub async fn invoke (&self, invocation: AddressableInvocation)->Result<Vec<u8>, OrbitError> {
        let definition = self.definitions.get(&invocation.reference.interface_id)
            .cloned()
            .ok_or_else(|| OrbitError::NoActiveAddressable(invocation.reference.clone()))?;

        let (completion, handle) = Completion::<Vec<u8>>::new();
        self.pipeline.submit( definition, invocation, completion, None)?;
        handle.wait().await
    }

    /// feeds an inbound message from the embedding application's transport hook. Request
    /// invocations run locally and their outcome flows back as a Response through the inverse
    /// pipeline (§2); response messages settle the local tracker directly.
    pub async fn on_inbound (&self, message: Message) {
        match message {
            Message::RequestInvocation { id, invocation, source, target: _ } => {
                let (completion, handle) = Completion::<Vec<u8>>::new();
                self.execution.handle_invocation(invocation, completion).await;
                let result = handle.wait().await;

                let Some(source) = source else {
                    tracing::warn!( ?id, "inbound request carried no source, cannot send reply");
                    return;
                };

                let reply = match result {
                    Ok(value) => Message::ResponseValue { id, value },
                    Err(cause) => Message::ResponseError { id, error: cause.to_string() },
                };

                if let Err(e) = self.transport.send(&source, reply).await {
                    tracing::warn!( ?id, %source, %e, "failed to send response back to caller");
                }
            }
            Message::ResponseValue { id, value } => self.response_tracker.settle(id, value),
            Message::ResponseError { id, error } => self.response_tracker.settle_err(id, OrbitError::OpFailed(error)),
        }
    }

    pub fn node_info (&self)->NodeInfo { self.net_system.snapshot() }
    pub fn active_addressable_count (&self)->usize { self.execution.active_count() }
    pub fn now_millis (&self)->u64 { self.clock.now_millis() }
}

async fn tick_loop (tick_rate: Duration, time_to_live: Duration, response_tracker: Arc<ResponseTrackingSystem>, execution: Arc<ExecutionSystem>, error_handler: ErrorHandler) {
    let mut interval = tokio::time::interval(tick_rate);
    interval.set_missed_tick_behavior( tokio::time::MissedTickBehavior::Skip);

    loop {
        interval.tick().await;
        let started = std::time::Instant::now();

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            response_tracker.on_tick();
            execution.on_tick(time_to_live);
        }));
        if let Err(cause) = outcome {
            let msg = cause.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "tick panicked".to_string());
            (error_handler)("tick-loop", msg);
        }

        let elapsed = started.elapsed();
        if elapsed > tick_rate {
            tracing::warn!( ?elapsed, ?tick_rate, "slow tick, not catching up backlog");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::{Addressable, CapabilityRegistry};
    use crate::clock::test_support::FakeClock;
    use crate::directory::InMemoryDirectory;
    use crate::model::NetTarget;
    use crate::router::StaticClusterView;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    struct Echo;
    #[async_trait]
    impl Addressable for Echo {
        async fn invoke (&mut self, _method_id: &str, args: &[u8])->Result<Vec<u8>, String> { Ok(args.to_vec()) }
    }

    struct RecordingTransport { sent: Arc<StdMutex<Vec<(NodeIdentity, Message)>>> }
    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send (&self, target: &NodeIdentity, message: Message)->Result<(), OrbitError> {
            self.sent.lock().unwrap().push((target.clone(), message));
            Ok(())
        }
    }

    fn definition (timeout_millis: u64)->AddressableInterfaceDefinition {
        AddressableInterfaceDefinition {
            interface_id: "Echo".to_string(), auto_activate: true, auto_deactivate: true,
            persistent: false, prefer_local: true, timeout_millis,
        }
    }

    #[tokio::test]
    async fn on_inbound_request_replies_with_a_response_value() {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = Arc::new(RecordingTransport { sent: sent.clone() });
        let config = StageConfig { cluster_name: "t".to_string(), node_identity: "n1".to_string(), ..StageConfig::default() };

        let stage = StageBuilder::new(config, Arc::new(InMemoryDirectory::default()), transport, Arc::new(StaticClusterView::new()))
            .with_clock( Arc::new(FakeClock::new(0)))
            .register_addressable( definition(5000), Arc::new(|| Box::new(Echo) as Box<dyn Addressable>))
            .build();

        let invocation = AddressableInvocation {
            reference: crate::model::AddressableReference::new("Echo", "k1"),
            method_id: "echo".to_string(), args: vec![4,2], headers: vec![],
        };
        stage.on_inbound( Message::RequestInvocation {
            id: crate::model::MessageId(1),
            invocation,
            source: Some(NodeIdentity::new("caller")),
            target: NetTarget::Unicast( NodeIdentity::new("n1")),
        }).await;

        let sent = sent.lock().unwrap();
        assert_eq!( sent.len(), 1);
        assert_eq!( sent[0].0, NodeIdentity::new("caller"));
        match &sent[0].1 {
            Message::ResponseValue { id, value } => { assert_eq!( *id, crate::model::MessageId(1)); assert_eq!( *value, vec![4,2]); }
            other => panic!("expected ResponseValue, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn on_inbound_request_replies_with_a_response_error_on_failure() {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let transport = Arc::new(RecordingTransport { sent: sent.clone() });
        let config = StageConfig { cluster_name: "t".to_string(), node_identity: "n1".to_string(), ..StageConfig::default() };

        let stage = StageBuilder::new(config, Arc::new(InMemoryDirectory::default()), transport, Arc::new(StaticClusterView::new()))
            .with_clock( Arc::new(FakeClock::new(0)))
            .build();

        let invocation = AddressableInvocation {
            reference: crate::model::AddressableReference::new("NoSuchInterface", "k1"),
            method_id: "x".to_string(), args: vec![], headers: vec![],
        };
        stage.on_inbound( Message::RequestInvocation {
            id: crate::model::MessageId(7),
            invocation,
            source: Some(NodeIdentity::new("caller")),
            target: NetTarget::Unicast( NodeIdentity::new("n1")),
        }).await;

        let sent = sent.lock().unwrap();
        assert_eq!( sent.len(), 1);
        assert!( matches!( &sent[0].1, Message::ResponseError { id, .. } if *id == crate::model::MessageId(7)));
    }

    #[test]
    fn zero_timeout_definition_falls_back_to_configured_default() {
        let config = StageConfig { cluster_name: "t".to_string(), node_identity: "n1".to_string(), message_timeout_millis: 42_000, ..StageConfig::default() };
        let builder = StageBuilder::new(config, Arc::new(InMemoryDirectory::default()), Arc::new(RecordingTransport { sent: Arc::new(StdMutex::new(Vec::new())) }), Arc::new(StaticClusterView::new()))
            .register_addressable( definition(0), Arc::new(|| Box::new(Echo) as Box<dyn Addressable>));

        assert_eq!( builder.definitions.get("Echo").unwrap().timeout_millis, 0);
        let stage = builder.build();
        assert_eq!( stage.definitions.get("Echo").unwrap().timeout_millis, 42_000);
    }
}
