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

// §4.5, the hardest subsystem: owns the local actor lifecycle. One serialized worker loop
// per active addressable, generalized from the teacher's `run_actor` loop (tokio_rt.rs) from
// a macro-generated message enum down to the plain `HandlerMsg` below.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::capabilities::{Addressable, CapabilityRegistry};
use crate::channel::{create_mpsc_sender_receiver, recv, MpscSender};
use crate::clock::Clock;
use crate::directory::AddressableDirectory;
use crate::errors::OrbitError;
use crate::model::{AddressableInterfaceDefinition, AddressableInvocation, AddressableReference, Completion, NetTarget};

#[derive(Clone,Copy,Debug,PartialEq,Eq)]
#[repr(u8)]
pub enum HandlerState { Created = 0, Activating = 1, Active = 2, Invoking = 3, Deactivating = 4, Dead = 5 }

enum HandlerMsg {
    Invoke { invocation: AddressableInvocation, completion: Completion<Vec<u8>> },
    Deactivate,
}

struct HandlerHandle {
    mailbox: MpscSender<HandlerMsg>,
    state: Arc<AtomicU8>,
    last_activity_millis: Arc<AtomicU64>,
}

/// §4.5: the local-node actor lifecycle manager. `active` tracks one [`HandlerHandle`] per
/// currently-activated addressable on this node.
pub struct ExecutionSystem {
    registry: Arc<CapabilityRegistry>,
    definitions: Arc<HashMap<String, AddressableInterfaceDefinition>>,
    directory: Arc<dyn AddressableDirectory>,
    clock: Arc<dyn Clock>,
    local: crate::model::NodeIdentity,
    mailbox_capacity: usize,
    active: Arc<Mutex<HashMap<AddressableReference, HandlerHandle>>>,
}

impl ExecutionSystem {
    pub fn new (
        registry: Arc<CapabilityRegistry>,
        definitions: Arc<HashMap<String, AddressableInterfaceDefinition>>,
        directory: Arc<dyn AddressableDirectory>,
        clock: Arc<dyn Clock>,
        local: crate::model::NodeIdentity,
        mailbox_capacity: usize,
    )->Self {
        ExecutionSystem { registry, definitions, directory, clock, local, mailbox_capacity, active: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// §4.5 step 1-3: resolve/activate a handler and enqueue the invocation on its mailbox.
    pub async fn handle_invocation (&self, invocation: AddressableInvocation, completion: Completion<Vec<u8>>) {
        let reference = invocation.reference.clone();
        let definition = match self.definitions.get(&reference.interface_id) {
            Some(d) => d.clone(),
            None => {
                completion.settle_err( OrbitError::NoActiveAddressable(reference));
                return;
            }
        };

        let mailbox = {
            let mut active = self.active.lock().unwrap();
            if let Some(handle) = active.get(&reference) {
                if handle.state.load(Ordering::Acquire) >= HandlerState::Deactivating as u8 {
                    completion.settle_err( OrbitError::Deactivating(reference));
                    return;
                }
                handle.mailbox.clone()
            } else if definition.auto_activate {
                match self.registry.create(&reference.interface_id) {
                    Some(instance) => {
                        let handle = self.spawn_handler(reference.clone(), definition.clone(), instance);
                        let mailbox = handle.mailbox.clone();
                        active.insert(reference.clone(), handle);
                        mailbox
                    }
                    None => {
                        completion.settle_err( OrbitError::NoActiveAddressable(reference));
                        return;
                    }
                }
            } else {
                completion.settle_err( OrbitError::NoActiveAddressable(reference));
                return;
            }
        };

        // non-blocking per Scenario 6: a full mailbox fails the caller immediately rather
        // than back-pressuring them into an await.
        match mailbox.try_send(HandlerMsg::Invoke { invocation, completion }) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(HandlerMsg::Invoke { completion, .. })) => {
                completion.settle_err( OrbitError::CapacityExceeded("handler mailbox full".to_string()));
            }
            Err(flume::TrySendError::Disconnected(HandlerMsg::Invoke { completion, .. })) => {
                completion.settle_err( OrbitError::Deactivating(reference));
            }
            Err(flume::TrySendError::Full(HandlerMsg::Deactivate)) | Err(flume::TrySendError::Disconnected(HandlerMsg::Deactivate)) => unreachable!("only Invoke is sent here"),
        }
    }

    fn spawn_handler (&self, reference: AddressableReference, definition: AddressableInterfaceDefinition, instance: Box<dyn Addressable>)->HandlerHandle {
        let (tx, rx) = create_mpsc_sender_receiver::<HandlerMsg>(self.mailbox_capacity);
        let state = Arc::new(AtomicU8::new(HandlerState::Created as u8));
        let last_activity_millis = Arc::new(AtomicU64::new(self.clock.now_millis()));

        let directory = self.directory.clone();
        let clock = self.clock.clone();
        let local = self.local.clone();
        let state2 = state.clone();
        let last_activity2 = last_activity_millis.clone();
        let active = self.active.clone();

        tokio::task::Builder::new()
            .name("orbit-handler")
            .spawn( run_handler(reference, definition, instance, rx, directory, clock, local, state2, last_activity2, active))
            .expect("failed to spawn handler task");

        HandlerHandle { mailbox: tx, state, last_activity_millis }
    }

    /// §4.5 onTick: deactivate handlers idle past their TTL. §9 fixes response-tracker-first
    /// ordering within a tick; this is always called after `ResponseTrackingSystem::on_tick`.
    pub fn on_tick (&self, time_to_live: Duration) {
        let now = self.clock.now_millis();
        let ttl_millis = time_to_live.as_millis() as u64;

        let to_deactivate: Vec<(AddressableReference, MpscSender<HandlerMsg>)> = {
            let active = self.active.lock().unwrap();
            active.iter()
                .filter(|(reference, handle)| {
                    self.definitions.get(&reference.interface_id).map(|d| d.auto_deactivate).unwrap_or(false)
                        && handle.state.load(Ordering::Acquire) == HandlerState::Active as u8
                        && now.saturating_sub(handle.last_activity_millis.load(Ordering::Acquire)) > ttl_millis
                })
                .map(|(reference, handle)| (reference.clone(), handle.mailbox.clone()))
                .collect()
        };

        for (reference, mailbox) in to_deactivate {
            if let Err(_) = mailbox.try_send(HandlerMsg::Deactivate) {
                tracing::debug!( ?reference, "could not signal deactivation, mailbox busy or closed");
            }
        }
    }

    pub fn active_count (&self)->usize {
        self.active.lock().unwrap().len()
    }
}

async fn run_handler (
    reference: AddressableReference,
    definition: AddressableInterfaceDefinition,
    mut instance: Box<dyn Addressable>,
    rx: crate::channel::MpscReceiver<HandlerMsg>,
    directory: Arc<dyn AddressableDirectory>,
    clock: Arc<dyn Clock>,
    local: crate::model::NodeIdentity,
    state: Arc<AtomicU8>,
    last_activity_millis: Arc<AtomicU64>,
    active: Arc<Mutex<HashMap<AddressableReference, HandlerHandle>>>,
) {
    tracing::debug!( ?reference, "activating handler");
    state.store(HandlerState::Activating as u8, Ordering::Release);

    if let Err(cause) = instance.on_activate().await {
        tracing::warn!( ?reference, %cause, "activation failed");
        state.store(HandlerState::Dead as u8, Ordering::Release);
        drain_failing(rx, OrbitError::ActivationFailed { reference: reference.clone(), cause }).await;
        let _ = directory.remove_if(&reference, &NetTarget::Unicast(local)).await;
        active.lock().unwrap().remove(&reference);
        return;
    }

    state.store(HandlerState::Active as u8, Ordering::Release);
    tracing::debug!( ?reference, "handler active");

    loop {
        match recv(&rx).await {
            Ok(HandlerMsg::Invoke { invocation, completion }) => {
                state.store(HandlerState::Invoking as u8, Ordering::Release);
                let result = instance.invoke(&invocation.method_id, &invocation.args).await;
                last_activity_millis.store(clock.now_millis(), Ordering::Release);
                state.store(HandlerState::Active as u8, Ordering::Release);

                match result {
                    Ok(value) => completion.settle(value),
                    Err(cause) => completion.settle_err( OrbitError::OpFailed(cause)),
                }
            }
            Ok(HandlerMsg::Deactivate) | Err(_) => break,
        }
    }

    tracing::debug!( ?reference, "deactivating handler");
    state.store(HandlerState::Deactivating as u8, Ordering::Release);
    drain_failing(rx, OrbitError::Deactivating(reference.clone())).await;

    if let Err(cause) = instance.on_deactivate().await {
        tracing::warn!( ?reference, %cause, "deactivation hook failed, proceeding anyway");
    }

    state.store(HandlerState::Dead as u8, Ordering::Release);
    if let Err(e) = directory.remove_if(&reference, &NetTarget::Unicast(local)).await {
        tracing::warn!( ?reference, %e, "failed to clear directory entry on deactivation");
    }
    active.lock().unwrap().remove(&reference);
}

async fn drain_failing (rx: crate::channel::MpscReceiver<HandlerMsg>, err_template: OrbitError) {
    while let Ok(msg) = rx.try_recv() {
        if let HandlerMsg::Invoke { completion, .. } = msg {
            completion.settle_err( clone_err(&err_template));
        }
    }
}

fn clone_err (err: &OrbitError)->OrbitError {
    match err {
        OrbitError::ActivationFailed { reference, cause } => OrbitError::ActivationFailed { reference: reference.clone(), cause: cause.clone() },
        OrbitError::Deactivating(r) => OrbitError::Deactivating(r.clone()),
        other => OrbitError::OpFailed(other.to_string()),
    }
}
