//! Monotonic tick source
//!
//! Real wall-clock and tick-interrupt hardware are architecture concerns the
//! core does not own (spec.md §1). This module stands in for that hardware
//! with a monotonic counter so the log service and the `__time` syscall have
//! something to read; a platform integration is expected to call
//! [`advance_ms`] from its timer interrupt handler.

use core::sync::atomic::{AtomicU64, Ordering};

static TICKS_MS: AtomicU64 = AtomicU64::new(0);

/// Milliseconds elapsed since boot, as observed by the last timer tick.
pub fn ticks_ms() -> u64 {
    TICKS_MS.load(Ordering::Relaxed)
}

/// Advance the tick counter. Called from the platform's timer interrupt.
pub fn advance_ms(delta: u64) {
    TICKS_MS.fetch_add(delta, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticks_advance_monotonically() {
        let before = ticks_ms();
        advance_ms(10);
        assert_eq!(ticks_ms(), before + 10);
    }
}
