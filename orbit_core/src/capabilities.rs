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

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::InterfaceId;

/// an addressable instance as seen by the execution system: it may react to activation and
/// deactivation, and it dispatches invocations by method id. Implementors own their state.
#[async_trait::async_trait]
pub trait Addressable: Send {
    async fn on_activate (&mut self)->Result<(), String> { Ok(()) }
    async fn on_deactivate (&mut self)->Result<(), String> { Ok(()) }
    async fn invoke (&mut self, method_id: &str, args: &[u8])->Result<Vec<u8>, String>;
}

pub type AddressableFactory = Arc<dyn Fn() -> Box<dyn Addressable> + Send + Sync>;

/// produced once by a capability scan and held immutably afterward (§4.9, §9): no runtime
/// reflection, just a registration map from interface id to a plain factory closure.
#[derive(Default,Clone)]
pub struct CapabilityRegistry {
    factories: HashMap<InterfaceId, AddressableFactory>,
}

impl CapabilityRegistry {
    pub fn new ()->Self { Self::default() }

    pub fn register (&mut self, interface_id: impl Into<InterfaceId>, factory: AddressableFactory) {
        self.factories.insert(interface_id.into(), factory);
    }

    pub fn interface_ids (&self)->impl Iterator<Item = &InterfaceId> {
        self.factories.keys()
    }

    pub fn create (&self, interface_id: &str)->Option<Box<dyn Addressable>> {
        self.factories.get(interface_id).map(|f| f())
    }

    pub fn implements (&self, interface_id: &str)->bool {
        self.factories.contains_key(interface_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;
    #[async_trait::async_trait]
    impl Addressable for Echo {
        async fn invoke (&mut self, _method_id: &str, args: &[u8])->Result<Vec<u8>, String> {
            Ok(args.to_vec())
        }
    }

    #[test]
    fn registry_creates_registered_factories() {
        let mut reg = CapabilityRegistry::new();
        reg.register("Echo", Arc::new(|| Box::new(Echo) as Box<dyn Addressable>));

        assert!( reg.implements("Echo"));
        assert!( !reg.implements("Other"));
        assert!( reg.create("Echo").is_some());
        assert!( reg.create("Other").is_none());
    }
}
