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

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use serde::{Deserialize, Serialize};

use crate::errors::OrbitError;

pub type InterfaceId = String;

/// identity + lookup key of a logical addressable. Immutable once constructed.
#[derive(Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash,Serialize,Deserialize)]
pub struct AddressableReference {
    pub interface_id: InterfaceId,
    pub key: String,
}
impl AddressableReference {
    pub fn new (interface_id: impl Into<InterfaceId>, key: impl Into<String>)->Self {
        AddressableReference { interface_id: interface_id.into(), key: key.into() }
    }
}

/// opaque name of a node within a cluster.
#[derive(Clone,Debug,PartialEq,Eq,PartialOrd,Ord,Hash,Serialize,Deserialize)]
pub struct NodeIdentity(pub String);
impl NodeIdentity {
    pub fn new (s: impl Into<String>)->Self { NodeIdentity(s.into()) }
}
impl std::fmt::Display for NodeIdentity {
    fn fmt (&self, f: &mut std::fmt::Formatter<'_>)->std::fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Clone,Debug,PartialEq,Eq)]
pub enum NetTarget {
    Unicast(NodeIdentity),
    Multicast(BTreeSet<NodeIdentity>),
    Any,
}
impl NetTarget {
    pub fn as_unicast (&self)->Option<&NodeIdentity> {
        match self { NetTarget::Unicast(n) => Some(n), _ => None }
    }
}

#[derive(Clone,Copy,Debug,PartialEq,Eq,Serialize,Deserialize)]
pub enum NodeStatus { Idle, Starting, Running, Stopping, Stopped }

#[derive(Clone,Copy,Debug,PartialEq,Eq,Serialize,Deserialize)]
pub enum NodeMode { Host, Client }

#[derive(Clone,Debug)]
pub struct NodeInfo {
    pub cluster_name: String,
    pub node_identity: NodeIdentity,
    pub mode: NodeMode,
    pub status: NodeStatus,
    pub capabilities: BTreeSet<InterfaceId>,
}

/// static metadata for an interface, derived once from the capability scan (§4.9) and
/// immutable thereafter.
#[derive(Clone,Debug)]
pub struct AddressableInterfaceDefinition {
    pub interface_id: InterfaceId,
    pub auto_activate: bool,
    pub auto_deactivate: bool,
    pub persistent: bool,
    pub prefer_local: bool,
    /// `0` means "use the stage's configured default" (see `StageConfig::message_timeout_millis`).
    pub timeout_millis: u64,
}

#[derive(Clone,Debug)]
pub struct AddressableInvocation {
    pub reference: AddressableReference,
    pub method_id: String,
    pub args: Vec<u8>,
    pub headers: Vec<(String,String)>,
}

/// monotonic per-node message identifier.
#[derive(Clone,Copy,Debug,PartialEq,Eq,PartialOrd,Ord,Hash,Serialize,Deserialize)]
pub struct MessageId(pub u64);

#[derive(Default)]
pub struct MessageIdGenerator(AtomicU64);
impl MessageIdGenerator {
    pub fn next (&self)->MessageId {
        MessageId(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// a one-shot settable cell: exactly one of `settle`/`settle_err` may ever run.
/// built directly on `tokio::sync::oneshot` since tokio is already the core's runtime.
pub struct Completion<T> {
    tx: Option<tokio::sync::oneshot::Sender<Result<T, OrbitError>>>,
}
pub struct CompletionHandle<T>(tokio::sync::oneshot::Receiver<Result<T, OrbitError>>);

impl<T> Completion<T> {
    pub fn new ()->(Completion<T>, CompletionHandle<T>) {
        let (tx,rx) = tokio::sync::oneshot::channel();
        (Completion{ tx: Some(tx) }, CompletionHandle(rx))
    }

    pub fn settle (mut self, value: T) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Ok(value));
        }
    }

    pub fn settle_err (mut self, err: OrbitError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(err));
        }
    }
}

impl<T> CompletionHandle<T> {
    pub async fn wait (self)->Result<T, OrbitError> {
        self.0.await.map_err(|_| OrbitError::Cancelled)?
    }
}

#[derive(Debug)]
pub enum Message {
    RequestInvocation { id: MessageId, invocation: AddressableInvocation, source: Option<NodeIdentity>, target: NetTarget },
    ResponseValue { id: MessageId, value: Vec<u8> },
    ResponseError { id: MessageId, error: String },
}
impl Message {
    pub fn id (&self)->MessageId {
        match self {
            Message::RequestInvocation { id, .. } => *id,
            Message::ResponseValue { id, .. } => *id,
            Message::ResponseError { id, .. } => *id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_id_generator_is_monotonic() {
        let gen = MessageIdGenerator::default();
        let a = gen.next();
        let b = gen.next();
        assert!( b.0 > a.0);
    }

    #[tokio::test]
    async fn completion_settles_once() {
        let (completion, handle) = Completion::<u32>::new();
        completion.settle(7);
        assert_eq!( handle.wait().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn completion_settles_err() {
        let (completion, handle) = Completion::<u32>::new();
        completion.settle_err( OrbitError::Cancelled);
        assert!( handle.wait().await.is_err());
    }
}
