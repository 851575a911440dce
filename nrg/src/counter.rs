/// Per-counter wraparound state: `prev` is the last observed raw value,
/// `carry` the accumulated wraps already folded in. The reported value
/// is always non-decreasing across the lifetime of the reader.
#[derive(Debug, Clone, Default)]
pub struct WrappingCounter {
    max: u64,
    prev: Option<u64>,
    carry: u64,
}

impl WrappingCounter {
    pub fn new(max: u64) -> Self {
        WrappingCounter {
            max,
            prev: None,
            carry: 0,
        }
    }

    /// Folds in a freshly read raw counter value and returns the
    /// unwrapped, monotonic total.
    pub fn observe(&mut self, raw: u64) -> u64 {
        if let Some(prev) = self.prev {
            if raw < prev {
                self.carry += self.max;
            }
        }
        self.prev = Some(raw);
        raw + self.carry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_without_wrap() {
        let mut c = WrappingCounter::new(1000);
        assert_eq!(c.observe(10), 10);
        assert_eq!(c.observe(20), 20);
        assert_eq!(c.observe(20), 20);
    }

    #[test]
    fn single_wraparound_is_corrected() {
        // counter at max-1, then wraps to 0: delta should read as +1.
        let mut c = WrappingCounter::new(1000);
        assert_eq!(c.observe(999), 999);
        assert_eq!(c.observe(0), 1000);
        assert_eq!(c.observe(0) - 999, 1);
    }

    #[test]
    fn multiple_reads_after_wrap_stay_monotonic() {
        let mut c = WrappingCounter::new(100);
        let mut last = c.observe(90);
        for raw in [95, 99, 2, 5, 50, 1, 3] {
            let reported = c.observe(raw);
            assert!(reported >= last, "reported={reported} last={last}");
            last = reported;
        }
    }
}
