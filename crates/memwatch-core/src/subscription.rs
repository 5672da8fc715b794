//! Per-session memory subscriptions.
//!
//! Each subscription remembers the full value it last reported. Polling
//! compares the current value against that snapshot, so a subscription emits
//! at most one notification per poll no matter how often the guest wrote to
//! the address in between.

use crate::host::{GuestMemory, Width};
use crate::protocol::Reply;

/// Watch on one fixed-width value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalarSubscription {
    pub addr: u32,
    pub width: Width,
    pub last: u32,
}

/// Watch on a run of consecutive bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSubscription {
    pub addr: u32,
    pub last: Vec<u8>,
}

impl RangeSubscription {
    pub fn len(&self) -> usize {
        self.last.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last.is_empty()
    }
}

/// Scalar and range subscriptions of one session, in subscription order.
///
/// Both kinds are keyed by address independently of each other.
#[derive(Debug, Default)]
pub struct SubscriptionStore {
    scalars: Vec<ScalarSubscription>,
    ranges: Vec<RangeSubscription>,
}

impl SubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scalar subscription. Returns `false` if `addr` is already watched.
    ///
    /// The initial snapshot is zero, so a non-zero value is reported on the
    /// next poll.
    pub fn subscribe(&mut self, addr: u32, width: Width) -> bool {
        if self.scalars.iter().any(|s| s.addr == addr) {
            return false;
        }
        self.scalars.push(ScalarSubscription {
            addr,
            width,
            last: 0,
        });
        true
    }

    /// Add a range subscription over `len` bytes. Returns `false` if `addr`
    /// is already watched.
    pub fn subscribe_range(&mut self, addr: u32, len: usize) -> bool {
        if self.ranges.iter().any(|s| s.addr == addr) {
            return false;
        }
        self.ranges.push(RangeSubscription {
            addr,
            last: vec![0; len],
        });
        true
    }

    /// Remove the scalar subscription at `addr`. Returns whether one existed.
    pub fn unsubscribe(&mut self, addr: u32) -> bool {
        let before = self.scalars.len();
        self.scalars.retain(|s| s.addr != addr);
        self.scalars.len() != before
    }

    /// Remove the range subscription at `addr`. Returns whether one existed.
    pub fn unsubscribe_range(&mut self, addr: u32) -> bool {
        let before = self.ranges.len();
        self.ranges.retain(|s| s.addr != addr);
        self.ranges.len() != before
    }

    pub fn scalars(&self) -> &[ScalarSubscription] {
        &self.scalars
    }

    pub fn ranges(&self) -> &[RangeSubscription] {
        &self.ranges
    }

    pub fn is_empty(&self) -> bool {
        self.scalars.is_empty() && self.ranges.is_empty()
    }

    /// Re-read every watched value and return a notification for each one
    /// that changed since the last poll. Scalars come before ranges.
    pub fn poll<M: GuestMemory + ?Sized>(&mut self, memory: &M) -> Vec<Reply> {
        let mut changes = Vec::new();

        for sub in &mut self.scalars {
            let value = memory.read(sub.width, sub.addr);
            if value != sub.last {
                sub.last = value;
                changes.push(Reply::Mem {
                    addr: sub.addr,
                    value,
                });
            }
        }

        for sub in &mut self.ranges {
            let current: Vec<u8> = (0..sub.last.len() as u32)
                .map(|i| memory.read(Width::W8, sub.addr.wrapping_add(i)) as u8)
                .collect();
            if current != sub.last {
                sub.last = current.clone();
                changes.push(Reply::MemMulti {
                    addr: sub.addr,
                    values: current,
                });
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::SimulatedHost;

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut store = SubscriptionStore::new();
        assert!(store.subscribe(1000, Width::W32));
        assert!(!store.subscribe(1000, Width::W8));
        assert_eq!(store.scalars().len(), 1);
        assert_eq!(store.scalars()[0].width, Width::W32);
    }

    #[test]
    fn test_scalar_and_range_are_independent() {
        let mut store = SubscriptionStore::new();
        assert!(store.subscribe(64, Width::W8));
        assert!(store.subscribe_range(64, 4));
        assert!(store.unsubscribe(64));
        assert_eq!(store.ranges().len(), 1);
        assert!(!store.unsubscribe(64));
        assert!(store.unsubscribe_range(64));
        assert!(store.is_empty());
    }

    #[test]
    fn test_poll_reports_only_changes() {
        let host = SimulatedHost::new(0, 2048);
        let mut store = SubscriptionStore::new();
        store.subscribe(1000, Width::W32);

        // Zero matches the initial snapshot.
        assert!(store.poll(&host).is_empty());

        host.write(Width::W32, 1000, 42);
        assert_eq!(store.poll(&host), vec![Reply::Mem { addr: 1000, value: 42 }]);

        host.write(Width::W32, 1000, 42);
        assert!(store.poll(&host).is_empty());
    }

    #[test]
    fn test_intra_tick_writes_collapse() {
        let host = SimulatedHost::new(0, 16);
        let mut store = SubscriptionStore::new();
        store.subscribe(0, Width::W8);

        host.write(Width::W8, 0, 1);
        host.write(Width::W8, 0, 2);
        host.write(Width::W8, 0, 3);
        assert_eq!(store.poll(&host), vec![Reply::Mem { addr: 0, value: 3 }]);

        // Changed and changed back between polls: nothing to report.
        host.write(Width::W8, 0, 9);
        host.write(Width::W8, 0, 3);
        assert!(store.poll(&host).is_empty());
    }

    #[test]
    fn test_range_poll() {
        let host = SimulatedHost::new(0, 16);
        let mut store = SubscriptionStore::new();
        store.subscribe_range(4, 3);

        host.write(Width::W8, 5, 7);
        assert_eq!(
            store.poll(&host),
            vec![Reply::MemMulti {
                addr: 4,
                values: vec![0, 7, 0]
            }]
        );
        assert!(store.poll(&host).is_empty());

        // Bytes outside the range do not count.
        host.write(Width::W8, 7, 1);
        assert!(store.poll(&host).is_empty());
    }
}
