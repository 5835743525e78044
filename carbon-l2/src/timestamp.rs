use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Number of low bits reserved for the per-millisecond counter
const COUNTER_BITS: u32 = 12;

/// Largest duration in milliseconds that converts without saturating
pub const MAX_TIMESTAMP_MILLIS: u64 = u64::MAX >> COUNTER_BITS;

/// Convert a duration in milliseconds into timestamp units, saturating at `u64::MAX`
pub fn millis_to_timestamp_units(ms: u64) -> u64 {
    ms.saturating_mul(1 << COUNTER_BITS)
}

/// Current wall clock in milliseconds since the Unix epoch
pub fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Hands out strictly increasing timestamps of the form `(millis << 12) + n`.
/// One instance is shared by every region built by a factory.
#[derive(Debug, Default)]
pub struct Timestamper {
    last: AtomicU64,
}

impl Timestamper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> u64 {
        let now = millis_to_timestamp_units(now_millis());
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last + 1);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return candidate,
                Err(actual) => last = actual,
            }
        }
    }
}
