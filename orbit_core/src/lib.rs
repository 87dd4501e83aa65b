/*
 * Copyright (c) 2024, United States Government, as represented by the
 * Administrator of the National Aeronautics and Space Administration.
 * All rights reserved.
 *
 * The ODIN - Open Data Integration Framework is licensed under the
 * Apache License, Version 2.0 (the "License"); you may not use this file
 * except in compliance with the License. You may obtain a copy of the
 * License at http://www.apache.org/licenses/LICENSE-2.0.
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! orbit_core is the per-node virtual-actor runtime: placement (directory/router), the
//! outbound/inbound message pipeline, response correlation, and the activation/invocation/
//! deactivation lifecycle, composed by [`stage::Stage`].

pub mod errors;
pub mod clock;
pub mod channel;
pub mod retry;
pub mod model;
pub mod directory;
pub mod router;
pub mod net_system;
pub mod capabilities;
pub mod pools;
pub mod response_tracker;
pub mod execution;
pub mod pipeline;
pub mod config;
pub mod stage;
pub mod proxy;

pub mod prelude {
    pub use crate::capabilities::{Addressable, AddressableFactory, CapabilityRegistry};
    pub use crate::clock::{Clock, SystemClock};
    pub use crate::config::{NodeModeConfig, StageConfig};
    pub use crate::directory::{AddressableDirectory, InMemoryDirectory};
    pub use crate::errors::{OrbitError, Result};
    pub use crate::model::{
        AddressableInterfaceDefinition, AddressableInvocation, AddressableReference,
        Completion, CompletionHandle, Message, MessageId, NetTarget, NodeIdentity, NodeInfo,
        NodeMode, NodeStatus,
    };
    pub use crate::net_system::{NetSystem, Transport};
    pub use crate::proxy::{ActorProxy, ActorProxyFactory};
    pub use crate::router::{ClusterView, Router, StaticClusterView};
    pub use crate::stage::{Stage, StageBuilder};
}
