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

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::directory::AddressableDirectory;
use crate::errors::OrbitError;
use crate::model::{AddressableInterfaceDefinition, AddressableReference, NetTarget, NodeIdentity};
use crate::net_system::NetSystem;

/// a cluster membership view the router consults for "who else can host this interface".
/// kept separate from `AddressableDirectory` (which only ever maps references, never
/// capabilities) so a real deployment can back it with its own gossip/membership protocol.
pub trait ClusterView: Send + Sync {
    /// nodes (other than local) known to implement `interface_id`, in a stable order so the
    /// lexicographic tie-break in step 4 is deterministic across nodes observing the same view.
    fn capable_nodes (&self, interface_id: &str)->Vec<NodeIdentity>;
}

#[derive(Default,Clone)]
pub struct StaticClusterView {
    by_interface: BTreeMap<String, Vec<NodeIdentity>>,
}
impl StaticClusterView {
    pub fn new ()->Self { Self::default() }
    pub fn add (&mut self, interface_id: impl Into<String>, node: NodeIdentity) {
        self.by_interface.entry(interface_id.into()).or_default().push(node);
    }
}
impl ClusterView for StaticClusterView {
    fn capable_nodes (&self, interface_id: &str)->Vec<NodeIdentity> {
        let mut nodes = self.by_interface.get(interface_id).cloned().unwrap_or_default();
        nodes.sort();
        nodes
    }
}

pub struct Router {
    directory: Arc<dyn AddressableDirectory>,
    net_system: Arc<NetSystem>,
    cluster_view: Arc<dyn ClusterView>,
    next_candidate: std::sync::atomic::AtomicUsize,
}

impl Router {
    pub fn new (directory: Arc<dyn AddressableDirectory>, net_system: Arc<NetSystem>, cluster_view: Arc<dyn ClusterView>)->Self {
        Router { directory, net_system, cluster_view, next_candidate: std::sync::atomic::AtomicUsize::new(0) }
    }

    /// §4.2: resolve the NetTarget for an outbound message given its reference. Pure with
    /// respect to instance state — no activation happens here, only placement bookkeeping.
    pub async fn route (&self, reference: &AddressableReference, explicit: Option<NetTarget>, definition: &AddressableInterfaceDefinition)->Result<NetTarget, OrbitError> {
        if let Some(target) = explicit {
            return Ok(target);
        }

        if let Some(target) = self.directory.get(reference).await? {
            return Ok(target);
        }

        if definition.prefer_local && self.net_system.implements(&reference.interface_id) {
            let local = self.net_system.local_identity();
            self.directory.put(reference, NetTarget::Unicast(local.clone())).await?;
            return Ok(NetTarget::Unicast(local));
        }

        let candidates = self.cluster_view.capable_nodes(&reference.interface_id);
        if candidates.is_empty() {
            return Err(OrbitError::NoAvailableNode(reference.clone()));
        }

        let idx = self.next_candidate.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % candidates.len();
        let candidate = candidates[idx].clone();
        let placed = self.directory.get_or_put(reference, NetTarget::Unicast(candidate)).await?;
        Ok(placed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::model::{NodeInfo, NodeMode, NodeStatus};
    use std::collections::BTreeSet;

    fn definition (prefer_local: bool)->AddressableInterfaceDefinition {
        AddressableInterfaceDefinition {
            interface_id: "Greeter".to_string(),
            auto_activate: true, auto_deactivate: true,
            persistent: false, prefer_local,
            timeout_millis: 10_000,
        }
    }

    fn net_system (caps: &[&str])->Arc<NetSystem> {
        Arc::new(NetSystem::new(NodeInfo {
            cluster_name: "test".to_string(),
            node_identity: NodeIdentity::new("local"),
            mode: NodeMode::Host,
            status: NodeStatus::Running,
            capabilities: caps.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }))
    }

    #[tokio::test]
    async fn routes_local_when_preferred_and_capable() {
        let router = Router::new(
            Arc::new(InMemoryDirectory::default()),
            net_system(&["Greeter"]),
            Arc::new(StaticClusterView::new()),
        );
        let r = AddressableReference::new("Greeter", "k1");
        let target = router.route(&r, None, &definition(true)).await.unwrap();
        assert_eq!( target, NetTarget::Unicast(NodeIdentity::new("local")));
    }

    #[tokio::test]
    async fn routes_to_remote_capable_node_when_not_local() {
        let mut view = StaticClusterView::new();
        view.add("Greeter", NodeIdentity::new("n2"));

        let router = Router::new(
            Arc::new(InMemoryDirectory::default()),
            net_system(&[]),
            Arc::new(view),
        );
        let r = AddressableReference::new("Greeter", "k1");
        let target = router.route(&r, None, &definition(true)).await.unwrap();
        assert_eq!( target, NetTarget::Unicast(NodeIdentity::new("n2")));
    }

    #[tokio::test]
    async fn fails_with_no_available_node() {
        let router = Router::new(
            Arc::new(InMemoryDirectory::default()),
            net_system(&[]),
            Arc::new(StaticClusterView::new()),
        );
        let r = AddressableReference::new("Greeter", "k1");
        let err = router.route(&r, None, &definition(false)).await.unwrap_err();
        assert!( matches!(err, OrbitError::NoAvailableNode(_)));
    }

    #[tokio::test]
    async fn existing_directory_entry_wins_the_race() {
        let dir = Arc::new(InMemoryDirectory::default());
        let mut view = StaticClusterView::new();
        view.add("Greeter", NodeIdentity::new("n1"));
        view.add("Greeter", NodeIdentity::new("n2"));

        let router1 = Router::new(dir.clone(), net_system(&[]), Arc::new(view.clone()));
        let router2 = Router::new(dir.clone(), net_system(&[]), Arc::new(view));

        let r = AddressableReference::new("Greeter", "k1");
        let t1 = router1.route(&r, None, &definition(false)).await.unwrap();
        let t2 = router2.route(&r, None, &definition(false)).await.unwrap();
        assert_eq!( t1, t2);
    }
}
