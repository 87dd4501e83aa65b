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

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::errors::OrbitError;
use crate::model::{AddressableReference, NetTarget};

/// the shared cluster-wide placement index. The backend is an external collaborator (§6)
/// this crate only talks to through this trait; a real deployment backs it with whatever
/// distributed key/value store the cluster already runs (etcd, a gossiped CRDT map, ...).
#[async_trait]
pub trait AddressableDirectory: Send + Sync {
    async fn get (&self, reference: &AddressableReference)->Result<Option<NetTarget>, OrbitError>;

    /// atomic get-or-put: returns the already-placed target if one exists, otherwise
    /// writes and returns `proposed`. All callers across the cluster agree on the winner.
    async fn get_or_put (&self, reference: &AddressableReference, proposed: NetTarget)->Result<NetTarget, OrbitError>;

    async fn put (&self, reference: &AddressableReference, target: NetTarget)->Result<(), OrbitError>;

    /// conditional delete: only removes when the current value equals `expected`.
    async fn remove_if (&self, reference: &AddressableReference, expected: &NetTarget)->Result<bool, OrbitError>;
}

/// an in-process directory used by tests and single-node deployments. Not a deployment
/// target in its own right — there is no cross-process visibility here.
#[derive(Default)]
pub struct InMemoryDirectory {
    entries: Mutex<HashMap<AddressableReference, NetTarget>>,
}

#[async_trait]
impl AddressableDirectory for InMemoryDirectory {
    async fn get (&self, reference: &AddressableReference)->Result<Option<NetTarget>, OrbitError> {
        let entries = self.entries.lock().map_err(|e| crate::errors::poisoned_lock(e.to_string()))?;
        Ok(entries.get(reference).cloned())
    }

    async fn get_or_put (&self, reference: &AddressableReference, proposed: NetTarget)->Result<NetTarget, OrbitError> {
        let mut entries = self.entries.lock().map_err(|e| crate::errors::poisoned_lock(e.to_string()))?;
        if let Some(existing) = entries.get(reference) {
            Ok(existing.clone())
        } else {
            entries.insert(reference.clone(), proposed.clone());
            Ok(proposed)
        }
    }

    async fn put (&self, reference: &AddressableReference, target: NetTarget)->Result<(), OrbitError> {
        let mut entries = self.entries.lock().map_err(|e| crate::errors::poisoned_lock(e.to_string()))?;
        entries.insert(reference.clone(), target);
        Ok(())
    }

    async fn remove_if (&self, reference: &AddressableReference, expected: &NetTarget)->Result<bool, OrbitError> {
        let mut entries = self.entries.lock().map_err(|e| crate::errors::poisoned_lock(e.to_string()))?;
        match entries.get(reference) {
            Some(current) if current == expected => { entries.remove(reference); Ok(true) }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeIdentity;

    #[tokio::test]
    async fn get_or_put_picks_a_single_winner() {
        let dir = InMemoryDirectory::default();
        let r = AddressableReference::new("Greeter", "k1");
        let n1 = NetTarget::Unicast(NodeIdentity::new("n1"));
        let n2 = NetTarget::Unicast(NodeIdentity::new("n2"));

        let a = dir.get_or_put(&r, n1.clone()).await.unwrap();
        let b = dir.get_or_put(&r, n2.clone()).await.unwrap();
        assert_eq!( a, b);
        assert_eq!( a, n1);
    }

    #[tokio::test]
    async fn remove_if_is_conditional() {
        let dir = InMemoryDirectory::default();
        let r = AddressableReference::new("Greeter", "k1");
        let n1 = NetTarget::Unicast(NodeIdentity::new("n1"));
        let n2 = NetTarget::Unicast(NodeIdentity::new("n2"));

        dir.put(&r, n1.clone()).await.unwrap();
        assert!( !dir.remove_if(&r, &n2).await.unwrap());
        assert!( dir.remove_if(&r, &n1).await.unwrap());
        assert_eq!( dir.get(&r).await.unwrap(), None);
    }
}
