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

use thiserror::Error;
use std::time::Duration;

use crate::model::AddressableReference;

pub type Result<T> = std::result::Result<T, OrbitError>;

#[derive(Error,Debug)]
pub enum OrbitError {

    #[error("no available node hosts interface for {0:?}")]
    NoAvailableNode(AddressableReference),

    #[error("no active addressable for {0:?}")]
    NoActiveAddressable(AddressableReference),

    #[error("activation failed for {reference:?}: {cause}")]
    ActivationFailed { reference: AddressableReference, cause: String },

    #[error("deactivation failed for {reference:?}: {cause}")]
    DeactivationFailed { reference: AddressableReference, cause: String },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("addressable {0:?} is deactivating")]
    Deactivating(AddressableReference),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("directory error: {0}")]
    Directory(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("oneshot consumed")]
    OneshotConsumed,

    #[error("receiver closed")]
    ReceiverClosed,

    #[error("receiver queue full")]
    ReceiverFull,

    #[error("senders dropped")]
    SendersDropped,

    #[error("IO error {0}")]
    IOError( #[from] std::io::Error),

    #[error("config parse error {0}")]
    ConfigParseError(String),

    #[error("poisoned lock error {0}")]
    PoisonedLockError(String),

    #[error("failed to join task")]
    JoinError,

    #[error("job error {0}")]
    JobError( #[from] orbit_job::OrbitJobError),

    #[error("operation failed {0}")]
    OpFailed(String)
}

pub fn poisoned_lock <T: ToString> (op: T)->OrbitError {
    OrbitError::PoisonedLockError(op.to_string())
}

pub fn op_failed (msg: impl ToString)->OrbitError {
    OrbitError::OpFailed(msg.to_string())
}
