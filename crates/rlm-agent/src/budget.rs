//! Per-invocation ceiling on sub-query calls.

use std::sync::atomic::{AtomicU32, Ordering};

/// Monotonic call counter shared by every sub-query of one invocation.
///
/// Lock-free so the batched worker pool can draw from it concurrently.
#[derive(Debug)]
pub struct CallBudget {
    ceiling: u32,
    high_water_fraction: f64,
    used: AtomicU32,
}

impl CallBudget {
    pub fn new(ceiling: u32, high_water_fraction: f64) -> Self {
        Self {
            ceiling,
            high_water_fraction,
            used: AtomicU32::new(0),
        }
    }

    /// Reserve one call. Returns the 1-based call number, or `None` once
    /// the ceiling is reached.
    pub fn try_acquire(&self) -> Option<u32> {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.ceiling).then_some(n + 1)
            })
            .ok()
            .map(|previous| previous + 1)
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.ceiling.saturating_sub(self.used())
    }

    pub fn ceiling(&self) -> u32 {
        self.ceiling
    }

    /// Whether call number `n` is at or past the high-water mark.
    pub fn is_past_high_water(&self, n: u32) -> bool {
        f64::from(n) >= self.high_water_fraction * f64::from(self.ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquires_up_to_ceiling() {
        let budget = CallBudget::new(3, 0.8);
        assert_eq!(budget.try_acquire(), Some(1));
        assert_eq!(budget.try_acquire(), Some(2));
        assert_eq!(budget.try_acquire(), Some(3));
        assert_eq!(budget.try_acquire(), None);
        assert_eq!(budget.try_acquire(), None);
        assert_eq!(budget.used(), 3);
        assert_eq!(budget.remaining(), 0);
    }

    #[test]
    fn zero_ceiling_never_acquires() {
        let budget = CallBudget::new(0, 0.8);
        assert_eq!(budget.try_acquire(), None);
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn high_water_mark() {
        let budget = CallBudget::new(10, 0.8);
        assert!(!budget.is_past_high_water(7));
        assert!(budget.is_past_high_water(8));
        assert!(budget.is_past_high_water(10));
    }

    #[test]
    fn concurrent_acquire_never_exceeds_ceiling() {
        let budget = Arc::new(CallBudget::new(50, 0.8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = budget.clone();
                std::thread::spawn(move || {
                    let mut granted = 0;
                    for _ in 0..20 {
                        if budget.try_acquire().is_some() {
                            granted += 1;
                        }
                    }
                    granted
                })
            })
            .collect();
        let granted: u32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(budget.used(), 50);
    }
}
