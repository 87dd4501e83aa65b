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

// §6 exposed interface: a thin client handle over a Stage. Real call sites are generated by
// an external proxy-source-generator (out of scope, §1) from an interface definition; this is
// the runtime counterpart every generated proxy method bottoms out in.

use std::sync::Arc;

use crate::errors::OrbitError;
use crate::model::{AddressableInvocation, AddressableReference};
use crate::stage::Stage;

#[derive(Clone)]
pub struct ActorProxy {
    stage: Arc<Stage>,
    reference: AddressableReference,
}

impl ActorProxy {
    pub async fn invoke (&self, method_id: &str, args: Vec<u8>)->Result<Vec<u8>, OrbitError> {
        let invocation = AddressableInvocation {
            reference: self.reference.clone(),
            method_id: method_id.to_string(),
            args,
            headers: Vec::new(),
        };
        self.stage.invoke(invocation).await
    }

    pub fn reference (&self)->&AddressableReference { &self.reference }
}

pub struct ActorProxyFactory {
    stage: Arc<Stage>,
}

impl ActorProxyFactory {
    pub fn new (stage: Arc<Stage>)->Self { ActorProxyFactory { stage } }

    pub fn get_reference (&self, interface_id: impl Into<String>, key: impl Into<String>)->ActorProxy {
        ActorProxy { stage: self.stage.clone(), reference: AddressableReference::new(interface_id, key) }
    }
}
