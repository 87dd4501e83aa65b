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
use std::sync::Mutex;
use std::time::Duration;
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::OrbitError;
use crate::model::{Completion, MessageId};

struct Pending {
    completion: Completion<Vec<u8>>,
    deadline_millis: u64,
}

/// §4.4: correlates outstanding requests with their eventual response. One instance per node.
pub struct ResponseTrackingSystem {
    clock: Arc<dyn Clock>,
    pending: Mutex<HashMap<MessageId, Pending>>,
}

impl ResponseTrackingSystem {
    pub fn new (clock: Arc<dyn Clock>)->Self {
        ResponseTrackingSystem { clock, pending: Mutex::new(HashMap::new()) }
    }

    pub fn track (&self, id: MessageId, completion: Completion<Vec<u8>>, timeout: Duration)->Result<(), OrbitError> {
        let deadline_millis = self.clock.now_millis() + timeout.as_millis() as u64;
        let mut pending = self.pending.lock().map_err(|e| crate::errors::poisoned_lock(e.to_string()))?;
        if pending.contains_key(&id) {
            return Err(OrbitError::OpFailed(format!("duplicate tracking for message {:?}", id)));
        }
        pending.insert(id, Pending { completion, deadline_millis });
        Ok(())
    }

    /// settle a tracked id with a value. A settle for an unknown (already-timed-out or
    /// never-tracked) id is silently ignored — a late response after timeout.
    pub fn settle (&self, id: MessageId, value: Vec<u8>) {
        let entry = { self.pending.lock().unwrap().remove(&id) };
        if let Some(p) = entry {
            p.completion.settle(value);
        } else {
            tracing::debug!( ?id, "settle for untracked/expired message, dropping");
        }
    }

    pub fn settle_err (&self, id: MessageId, err: OrbitError) {
        let entry = { self.pending.lock().unwrap().remove(&id) };
        if let Some(p) = entry {
            p.completion.settle_err(err);
        } else {
            tracing::debug!( ?id, "error settle for untracked/expired message, dropping");
        }
    }

    /// §4.4 / §4.6: sweep everything past its deadline, settling each with Timeout. Called
    /// first in the tick loop so timeouts are visible before execution's own deactivation pass (§9).
    pub fn on_tick (&self) {
        let now = self.clock.now_millis();
        let expired: Vec<(MessageId, Pending)> = {
            let mut pending = self.pending.lock().unwrap();
            let expired_ids: Vec<MessageId> = pending.iter()
                .filter(|(_, p)| p.deadline_millis <= now)
                .map(|(id, _)| *id)
                .collect();
            expired_ids.into_iter().filter_map(|id| pending.remove(&id).map(|p| (id, p))).collect()
        };

        for (id, p) in expired {
            tracing::warn!( ?id, "response timed out");
            p.completion.settle_err( OrbitError::Timeout( Duration::from_millis(now.saturating_sub(p.deadline_millis))));
        }
    }

    pub fn pending_count (&self)->usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::test_support::FakeClock;

    #[tokio::test]
    async fn settle_resolves_completion() {
        let tracker = ResponseTrackingSystem::new(Arc::new(FakeClock::new(0)));
        let (completion, handle) = Completion::<Vec<u8>>::new();
        tracker.track(MessageId(1), completion, Duration::from_secs(10)).unwrap();
        tracker.settle(MessageId(1), vec![1,2,3]);
        assert_eq!( handle.wait().await.unwrap(), vec![1,2,3]);
    }

    #[tokio::test]
    async fn late_settle_on_unknown_id_is_ignored() {
        let tracker = ResponseTrackingSystem::new(Arc::new(FakeClock::new(0)));
        tracker.settle(MessageId(99), vec![]); // must not panic
        assert_eq!( tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn on_tick_times_out_expired_entries() {
        let clock = Arc::new(FakeClock::new(0));
        let tracker = ResponseTrackingSystem::new(clock.clone());
        let (completion, handle) = Completion::<Vec<u8>>::new();
        tracker.track(MessageId(1), completion, Duration::from_millis(100)).unwrap();

        clock.advance(200);
        tracker.on_tick();

        assert!( handle.wait().await.is_err());
        assert_eq!( tracker.pending_count(), 0);
    }

    #[tokio::test]
    async fn on_tick_leaves_unexpired_entries_pending() {
        let clock = Arc::new(FakeClock::new(0));
        let tracker = ResponseTrackingSystem::new(clock.clone());
        let (completion, _handle) = Completion::<Vec<u8>>::new();
        tracker.track(MessageId(1), completion, Duration::from_millis(1000)).unwrap();

        clock.advance(10);
        tracker.on_tick();

        assert_eq!( tracker.pending_count(), 1);
    }
}
