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
use std::sync::RwLock;

use crate::errors::OrbitError;
use crate::model::{Message, NodeInfo, NodeStatus};

/// this node's own identity/status/capabilities, read by Router and Directory. Status is
/// driven exclusively by Stage — actors never flip it themselves.
pub struct NetSystem {
    info: RwLock<NodeInfo>,
}

impl NetSystem {
    pub fn new (info: NodeInfo)->Self {
        NetSystem { info: RwLock::new(info) }
    }

    pub fn local_identity (&self)->crate::model::NodeIdentity {
        self.info.read().unwrap().node_identity.clone()
    }

    pub fn snapshot (&self)->NodeInfo {
        self.info.read().unwrap().clone()
    }

    pub fn set_status (&self, status: NodeStatus) {
        self.info.write().unwrap().status = status;
    }

    pub fn implements (&self, interface_id: &str)->bool {
        self.info.read().unwrap().capabilities.contains(interface_id)
    }
}

/// the on-wire carrier (§6, external collaborator). The pipeline's Transport step hands
/// outbound messages here and the implementation feeds inbound ones back through whatever
/// inbound hook the embedding application wires up — no codec or framing is normative.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send (&self, target: &crate::model::NodeIdentity, message: Message)->Result<(), OrbitError>;
}
