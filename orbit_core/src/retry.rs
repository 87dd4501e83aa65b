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

use std::future::Future;
use std::time::Duration;
use std::cmp::min;

/// exponential backoff retry helper used by directory/transport clients. Runs `body` up to
/// `max_attempts` times, sleeping `current_delay` between failures and growing it by `factor`
/// (capped at `max_delay`) each time. The last attempt's error (if any) is returned verbatim.
pub async fn attempt<T, E, F, Fut> (
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    factor: f64,
    mut body: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    debug_assert!( max_attempts >= 1);

    let mut delay = initial_delay;
    let mut last_err = None;

    for attempt_no in 1..=max_attempts {
        match body().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt_no < max_attempts {
                    tracing::debug!( attempt_no, %e, ?delay, "attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    let next = (delay.as_secs_f64() * factor).min(max_delay.as_secs_f64());
                    delay = Duration::from_secs_f64( next.max(0.0));
                }
                last_err = Some(e);
            }
        }
    }

    Err(last_err.expect("max_attempts >= 1 guarantees at least one error"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_eventually() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = attempt(5, Duration::from_millis(1), Duration::from_millis(10), 2.0, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 { Err("not yet") } else { Ok(n) }
        }).await;

        assert_eq!( result, Ok(3));
        assert_eq!( calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn propagates_final_error() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, &str> = attempt(3, Duration::from_millis(1), Duration::from_millis(5), 2.0, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("always fails")
        }).await;

        assert_eq!( result, Err("always fails"));
        assert_eq!( calls.load(Ordering::SeqCst), 3);
    }
}
