use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Source of request sequence numbers.
///
/// Clones share the same counter, so engines built from one counter never
/// hand out the same number twice. Numbers start at 1 and skip 0 when the
/// counter wraps.
#[derive(Debug, Clone, Default)]
pub struct SequenceCounter(Arc<AtomicU32>);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A counter whose next number is `last + 1`.
    pub fn starting_after(last: u32) -> Self {
        SequenceCounter(Arc::new(AtomicU32::new(last)))
    }

    /// Allocate the next sequence number.
    pub fn next(&self) -> u32 {
        loop {
            let seq = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if seq != 0 {
                return seq;
            }
        }
    }

    /// The most recently allocated number (0 before the first).
    pub fn last(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::thread;

    use super::*;

    #[test]
    fn starts_at_one() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.last(), 0);
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.last(), 2);
    }

    #[test]
    fn wrap_skips_zero() {
        let counter = SequenceCounter::starting_after(u32::MAX - 1);
        assert_eq!(counter.next(), u32::MAX);
        assert_eq!(counter.next(), 1);
    }

    #[test]
    fn clones_share_numbers() {
        let counter = SequenceCounter::new();
        let shared = counter.clone();
        assert_eq!(counter.next(), 1);
        assert_eq!(shared.next(), 2);
    }

    #[test]
    fn unique_across_threads() {
        let counter = SequenceCounter::new();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || (0..1000).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for seq in handle.join().unwrap() {
                assert!(seen.insert(seq), "sequence {seq} issued twice");
            }
        }
        assert_eq!(seen.len(), 4000);
    }
}
