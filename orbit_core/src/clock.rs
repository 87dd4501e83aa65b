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

/// monotonic-enough wall clock used for `lastActivity`, tick deadlines and response timeouts.
/// a trait (rather than a bare fn) so tests can substitute a fake clock without sleeping.
pub trait Clock: Send + Sync + 'static {
    fn now_millis (&self)->u64;
}

#[derive(Clone,Copy,Debug,Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis (&self)->u64 {
        orbit_job::now_epoch_millis()
    }
}

#[cfg(test)]
pub mod test_support {
    use super::Clock;
    use std::sync::atomic::{AtomicU64, Ordering};

    /// a clock an operator can advance deterministically from test code.
    #[derive(Debug,Default)]
    pub struct FakeClock(AtomicU64);

    impl FakeClock {
        pub fn new (start_millis: u64)->Self { Self(AtomicU64::new(start_millis)) }
        pub fn advance (&self, delta_millis: u64) { self.0.fetch_add(delta_millis, Ordering::SeqCst); }
    }

    impl Clock for FakeClock {
        fn now_millis (&self)->u64 { self.0.load(Ordering::SeqCst) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_ish() {
        let clock = SystemClock;
        let a = clock.now_millis();
        let b = clock.now_millis();
        assert!( b >= a);
    }

    #[test]
    fn fake_clock_advances() {
        let clock = test_support::FakeClock::new(1000);
        assert_eq!( clock.now_millis(), 1000);
        clock.advance(50);
        assert_eq!( clock.now_millis(), 1050);
    }
}
