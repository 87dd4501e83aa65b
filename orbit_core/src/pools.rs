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

// §4.7/§5: two named worker groups, both supervising roots in the teacher's sense (tokio_rt.rs
// `ActorSystem::join_set`/`wait_all`/`abort_all`) so one task's failure never cancels its
// siblings. `cpuPool` carries invocation dispatch, `ioPool` carries directory/transport calls.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::task::{JoinError, JoinSet};

/// installed once at stage construction (§9: "a single process-wide function ... no ambient
/// singleton") and handed explicitly to anything that can produce orphan task failures.
pub type ErrorHandler = Arc<dyn Fn(&str, String) + Send + Sync>;

pub fn default_error_handler ()->ErrorHandler {
    Arc::new(|pool, cause| tracing::error!( pool, cause, "unhandled task failure"))
}

struct Pool {
    name: &'static str,
    join_set: Mutex<JoinSet<()>>,
    task_names: Mutex<HashMap<tokio::task::Id, String>>,
    error_handler: ErrorHandler,
}

impl Pool {
    fn new (name: &'static str, error_handler: ErrorHandler)->Self {
        Pool { name, join_set: Mutex::new(JoinSet::new()), task_names: Mutex::new(HashMap::new()), error_handler }
    }

    fn spawn<F> (&self, task_name: &str, fut: F)
    where F: Future<Output = ()> + Send + 'static
    {
        let mut join_set = self.join_set.lock().unwrap();
        match join_set.build_task().name(task_name).spawn(fut) {
            Ok(abort_handle) => { self.task_names.lock().unwrap().insert(abort_handle.id(), task_name.to_string()); }
            Err(e) => (self.error_handler)(self.name, format!("failed to spawn task '{task_name}': {e}")),
        }
        // opportunistically reap finished tasks so the set doesn't grow unbounded over a long run,
        // reporting panics to the installed error handler along the way (§5: "unhandled failures
        // are reported to errorHandler").
        while let Some(result) = join_set.try_join_next_with_id() {
            self.report( result.map(|(id, ())| id));
        }
    }

    /// reports a task's outcome; `Ok` is a normal exit, `Err` carries the `JoinError`.
    fn report (&self, result: Result<tokio::task::Id, JoinError>) {
        let (id, error) = match result {
            Ok(_) => return,
            Err(e) => (e.id(), e),
        };
        let name = self.task_names.lock().unwrap().remove(&id).unwrap_or_else(|| "<unknown>".to_string());
        if error.is_panic() {
            let cause = error.into_panic();
            let msg = cause.downcast_ref::<&str>().map(|s| s.to_string())
                .or_else(|| cause.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            (self.error_handler)(self.name, format!("task '{name}' panicked: {msg}"));
        } else {
            tracing::debug!( pool = self.name, task = %name, "task cancelled");
        }
    }

    async fn shutdown (&self) {
        let mut join_set = self.join_set.lock().unwrap();
        join_set.abort_all();
        while let Some(result) = join_set.try_join_next_with_id() {
            self.report( result.map(|(id, ())| id));
        }
        drop(join_set);

        // the set may still hold tasks that hadn't yielded to the abort signal yet; park here
        // until every one of them has actually unwound, reporting any panics along the way
        // (an `AbortError` cancellation is expected during shutdown and isn't reported).
        loop {
            let next = { self.join_set.lock().unwrap().try_join_next_with_id() };
            match next {
                Some(result) => self.report( result.map(|(id, ())| id)),
                None => {
                    if self.join_set.lock().unwrap().is_empty() { break; }
                    tokio::task::yield_now().await;
                }
            }
        }
    }
}

/// `cpuPool` (bounded — one worker slot per invocation, scheduled by tokio's own executor)
/// and `ioPool` (elastic) as two independently-supervised roots.
pub struct Pools {
    cpu: Pool,
    io: Pool,
}

impl Pools {
    pub fn new (error_handler: ErrorHandler)->Self {
        Pools {
            cpu: Pool::new("cpu-pool", error_handler.clone()),
            io: Pool::new("io-pool", error_handler),
        }
    }

    pub fn spawn_cpu<F> (&self, task_name: &str, fut: F) where F: Future<Output = ()> + Send + 'static {
        self.cpu.spawn(task_name, fut);
    }

    pub fn spawn_io<F> (&self, task_name: &str, fut: F) where F: Future<Output = ()> + Send + 'static {
        self.io.spawn(task_name, fut);
    }

    pub async fn shutdown (&self) {
        self.cpu.shutdown().await;
        self.io.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn spawned_task_runs() {
        let pools = Pools::new( default_error_handler());
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        pools.spawn_cpu("test-task", async move { ran2.store(true, Ordering::SeqCst); });

        tokio::time::sleep( std::time::Duration::from_millis(20)).await;
        assert!( ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn one_task_failure_does_not_abort_siblings() {
        let handled = Arc::new(AtomicBool::new(false));
        let handled2 = handled.clone();
        let error_handler: ErrorHandler = Arc::new(move |_pool, _cause| handled2.store(true, Ordering::SeqCst));

        let pools = Pools::new( error_handler);
        let sibling_ran = Arc::new(AtomicBool::new(false));
        let sibling_ran2 = sibling_ran.clone();

        pools.spawn_cpu("panicking", async move { panic!("boom"); });
        pools.spawn_cpu("sibling", async move { sibling_ran2.store(true, Ordering::SeqCst); });

        tokio::time::sleep( std::time::Duration::from_millis(20)).await;
        assert!( sibling_ran.load(Ordering::SeqCst));

        // the panic isn't reported until the pool next reaps; nudge it with another spawn.
        pools.spawn_cpu("nudge", async {});
        tokio::time::sleep( std::time::Duration::from_millis(20)).await;
        assert!( handled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn shutdown_aborts_pending_tasks() {
        let pools = Pools::new( default_error_handler());
        pools.spawn_io("long-running", async { tokio::time::sleep( std::time::Duration::from_secs(60)).await; });
        pools.shutdown().await; // must return promptly, not after 60s
    }
}
