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

// §4.3: the fixed outbound chain Identity -> ResponseTracking -> Routing -> LocalDispatch ->
// Serialization -> Transport. §9 models steps as data (a plain struct with a bounded admission
// queue) rather than a chain of trait objects, since the step sequence never varies at runtime.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::channel::{create_mpsc_sender_receiver, recv, try_send, MpscReceiver, MpscSender};
use crate::directory::AddressableDirectory;
use crate::errors::OrbitError;
use crate::execution::ExecutionSystem;
use crate::model::{AddressableInterfaceDefinition, AddressableInvocation, Completion, Message, MessageId, NetTarget};
use crate::net_system::{NetSystem, Transport};
use crate::response_tracker::ResponseTrackingSystem;
use crate::router::Router;

struct Outbound {
    definition: AddressableInterfaceDefinition,
    invocation: AddressableInvocation,
    completion: Completion<Vec<u8>>,
    explicit_target: Option<NetTarget>,
}

/// §4.3: owns the bounded admission queue and runs messages through the fixed step chain.
/// One instance per node. `submit` is the client-facing entry point (step 1: Identity).
pub struct Pipeline {
    tx: MpscSender<Outbound>,
    id_gen: Arc<AtomicU64>,
}

pub struct PipelineWorker {
    rx: MpscReceiver<Outbound>,
    router: Arc<Router>,
    response_tracker: Arc<ResponseTrackingSystem>,
    execution: Arc<ExecutionSystem>,
    net_system: Arc<NetSystem>,
    transport: Arc<dyn Transport>,
    id_gen: Arc<AtomicU64>,
}

impl Pipeline {
    pub fn new (
        buffer_count: usize,
        router: Arc<Router>,
        response_tracker: Arc<ResponseTrackingSystem>,
        execution: Arc<ExecutionSystem>,
        net_system: Arc<NetSystem>,
        transport: Arc<dyn Transport>,
    )->(Pipeline, PipelineWorker) {
        let (tx, rx) = create_mpsc_sender_receiver::<Outbound>(buffer_count);
        let id_gen = Arc::new(AtomicU64::new(1));

        let pipeline = Pipeline { tx, id_gen: id_gen.clone() };
        let worker = PipelineWorker { rx, router, response_tracker, execution, net_system, transport, id_gen };
        (pipeline, worker)
    }

    /// step 1 (Identity): stamp and admit. Returns `CapacityExceededError` if the bounded
    /// queue is full, without touching routing or the response tracker.
    pub fn submit (&self, definition: AddressableInterfaceDefinition, invocation: AddressableInvocation, completion: Completion<Vec<u8>>, explicit_target: Option<NetTarget>)->Result<(), OrbitError> {
        try_send(&self.tx, Outbound { definition, invocation, completion, explicit_target })
    }
}

impl PipelineWorker {
    /// drains the admission queue; intended to be spawned once onto `cpuPool` by Stage.
    pub async fn run (mut self) {
        while let Ok(outbound) = recv(&self.rx).await {
            self.process(outbound).await;
        }
        tracing::debug!("pipeline worker stopped, admission channel closed");
    }

    async fn process (&self, outbound: Outbound) {
        let Outbound { definition, invocation, completion, explicit_target } = outbound;
        let id = MessageId(self.id_gen.fetch_add(1, Ordering::Relaxed));

        // step 2: ResponseTracking
        if let Err(e) = self.response_tracker.track(id, completion, Duration::from_millis(definition.timeout_millis)) {
            tracing::warn!( ?id, %e, "failed to track outbound invocation");
            return;
        }

        // step 3: Routing
        let target = match self.router.route(&invocation.reference, explicit_target, &definition).await {
            Ok(t) => t,
            Err(e) => { self.response_tracker.settle_err(id, e); return; }
        };

        // step 4: LocalDispatch
        let is_local = target.as_unicast().map(|n| *n == self.net_system.local_identity()).unwrap_or(false);
        if is_local {
            let (local_completion, local_handle) = Completion::<Vec<u8>>::new();
            self.execution.handle_invocation(invocation, local_completion).await;
            let tracker = self.response_tracker.clone();
            tokio::spawn(async move {
                match local_handle.wait().await {
                    Ok(value) => tracker.settle(id, value),
                    Err(e) => tracker.settle_err(id, e),
                }
            });
            return;
        }

        // steps 5-6: Serialization + Transport. No codec is normative here (§6); the
        // invocation's already-encoded `args`/`headers` travel as-is inside the envelope.
        let message = Message::RequestInvocation {
            id,
            invocation,
            source: Some(self.net_system.local_identity()),
            target: target.clone(),
        };

        let node = match target.as_unicast() {
            Some(n) => n.clone(),
            None => { self.response_tracker.settle_err(id, OrbitError::Transport("cannot transport to a non-unicast target".to_string())); return; }
        };

        if let Err(e) = self.transport.send(&node, message).await {
            self.response_tracker.settle_err(id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;
    use crate::directory::InMemoryDirectory;
    use crate::model::{AddressableReference, NodeIdentity, NodeInfo, NodeMode, NodeStatus};
    use crate::router::StaticClusterView;
    use crate::capabilities::{Addressable, CapabilityRegistry};
    use async_trait::async_trait;
    use std::collections::{BTreeSet, HashMap};

    struct Echo;
    #[async_trait]
    impl Addressable for Echo {
        async fn invoke (&mut self, _method_id: &str, args: &[u8])->Result<Vec<u8>, String> { Ok(args.to_vec()) }
    }

    struct NoopTransport;
    #[async_trait]
    impl Transport for NoopTransport {
        async fn send (&self, _target: &NodeIdentity, _message: Message)->Result<(), OrbitError> { Ok(()) }
    }

    fn definition ()->AddressableInterfaceDefinition {
        AddressableInterfaceDefinition {
            interface_id: "Echo".to_string(), auto_activate: true, auto_deactivate: true,
            persistent: false, prefer_local: true, timeout_millis: 5000,
        }
    }

    #[tokio::test]
    async fn local_dispatch_round_trips_without_transport() {
        let net_system = Arc::new(NetSystem::new(NodeInfo {
            cluster_name: "t".to_string(), node_identity: NodeIdentity::new("local"),
            mode: NodeMode::Host, status: NodeStatus::Running,
            capabilities: BTreeSet::from(["Echo".to_string()]),
        }));
        let directory: Arc<dyn AddressableDirectory> = Arc::new(InMemoryDirectory::default());
        let router = Arc::new(Router::new(directory.clone(), net_system.clone(), Arc::new(StaticClusterView::new())));
        let response_tracker = Arc::new(ResponseTrackingSystem::new(Arc::new(FakeClock::new(0))));

        let mut registry = CapabilityRegistry::new();
        registry.register("Echo", Arc::new(|| Box::new(Echo) as Box<dyn Addressable>));
        let mut defs = HashMap::new();
        defs.insert("Echo".to_string(), definition());
        let execution = Arc::new(ExecutionSystem::new(Arc::new(registry), Arc::new(defs), directory, Arc::new(FakeClock::new(0)), NodeIdentity::new("local"), 16));

        let (pipeline, worker) = Pipeline::new(16, router, response_tracker, execution, net_system, Arc::new(NoopTransport));
        tokio::spawn(worker.run());

        let (completion, handle) = Completion::<Vec<u8>>::new();
        let invocation = AddressableInvocation {
            reference: AddressableReference::new("Echo", "k1"),
            method_id: "echo".to_string(), args: vec![1,2,3], headers: vec![],
        };
        pipeline.submit( definition(), invocation, completion, None).unwrap();

        let value = handle.wait().await.unwrap();
        assert_eq!( value, vec![1,2,3]);
    }
}
