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

// §6 configuration, loaded the way the teacher's odin_build::configs loads RON files
// (ron::de::from_bytes) but without its compiled-in asset embedding, which has no
// counterpart here — there is no bundled UI for orbit_core to serve.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::errors::OrbitError;
use crate::model::NodeMode;

#[derive(Clone,Debug,Serialize,Deserialize)]
pub struct StageConfig {
    pub cluster_name: String,
    pub node_identity: String,
    pub node_mode: NodeModeConfig,

    #[serde(default = "default_tick_rate_millis")]
    pub tick_rate_millis: u64,

    #[serde(default = "default_time_to_live_millis")]
    pub time_to_live_millis: u64,

    /// default response timeout for a registered interface whose
    /// `AddressableInterfaceDefinition::timeout_millis` is left at `0` (resolved once by
    /// `StageBuilder::build`).
    #[serde(default = "default_message_timeout_millis")]
    pub message_timeout_millis: u64,

    #[serde(default = "default_pipeline_buffer_count")]
    pub pipeline_buffer_count: usize,

    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

#[derive(Clone,Copy,Debug,PartialEq,Eq,Serialize,Deserialize)]
pub enum NodeModeConfig { Host, Client }
impl From<NodeModeConfig> for NodeMode {
    fn from (m: NodeModeConfig)->NodeMode {
        match m { NodeModeConfig::Host => NodeMode::Host, NodeModeConfig::Client => NodeMode::Client }
    }
}

fn default_tick_rate_millis()->u64 { 1000 }
fn default_time_to_live_millis()->u64 { 600_000 }
fn default_message_timeout_millis()->u64 { 10_000 }
fn default_pipeline_buffer_count()->usize { 10_000 }
fn default_mailbox_capacity()->usize { 128 }

impl Default for StageConfig {
    fn default ()->Self {
        StageConfig {
            cluster_name: "default".to_string(),
            node_identity: "node-1".to_string(),
            node_mode: NodeModeConfig::Host,
            tick_rate_millis: default_tick_rate_millis(),
            time_to_live_millis: default_time_to_live_millis(),
            message_timeout_millis: default_message_timeout_millis(),
            pipeline_buffer_count: default_pipeline_buffer_count(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

impl StageConfig {
    pub fn from_ron_str (s: &str)->Result<Self, OrbitError> {
        ron::de::from_str(s).map_err(|e| OrbitError::ConfigParseError(e.to_string()))
    }

    pub fn from_ron_file (path: impl AsRef<Path>)->Result<Self, OrbitError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    pub fn to_ron_string (&self)->Result<String, OrbitError> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| OrbitError::ConfigParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_documented_constants() {
        let cfg = StageConfig::default();
        assert_eq!( cfg.tick_rate_millis, 1000);
        assert_eq!( cfg.time_to_live_millis, 600_000);
        assert_eq!( cfg.message_timeout_millis, 10_000);
        assert_eq!( cfg.pipeline_buffer_count, 10_000);
        assert_eq!( cfg.mailbox_capacity, 128);
    }

    #[test]
    fn round_trips_through_ron() {
        let cfg = StageConfig {
            cluster_name: "prod".to_string(),
            node_identity: "node-7".to_string(),
            ..StageConfig::default()
        };
        let s = cfg.to_ron_string().unwrap();
        let parsed = StageConfig::from_ron_str(&s).unwrap();
        assert_eq!( parsed.cluster_name, "prod");
        assert_eq!( parsed.node_identity, "node-7");
        assert_eq!( parsed.tick_rate_millis, cfg.tick_rate_millis);
    }

    #[test]
    fn missing_optional_fields_fall_back_to_defaults() {
        let s = r#"(cluster_name: "c", node_identity: "n", node_mode: Host)"#;
        let cfg = StageConfig::from_ron_str(s).unwrap();
        assert_eq!( cfg.tick_rate_millis, default_tick_rate_millis());
    }
}
