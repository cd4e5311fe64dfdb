use flux_utils::safe_assert;

use crate::{error::CaptureError, timestamp::PacketTimestamp};

/// Immutable once appended. `data_offset` points into the sibling data pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct PacketDescriptor {
    pub ts: PacketTimestamp,
    pub caplen: u32,
    pub wirelen: u32,
    pub data_offset: u32,
}

/// Hot-path counters, updated only while the fast lock is held.
#[derive(Clone, Copy, Debug, Default)]
pub struct StatCounters {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub dropped_packets: u64,
    pub oldest_ts: PacketTimestamp,
    pub newest_ts: PacketTimestamp,
    pub current_memory: u64,
}

/// The descriptor ring and its backing data pool.
///
/// This is everything guarded by the fast (spin) lock: ring indices, the
/// data pool, the hot-path counters, and the two config knobs the store
/// path needs (`duration_sec`, `max_memory_bytes`). Those two are cached
/// copies of the authoritative values in `CaptureConfig` (guarded by the
/// slow lock) so that `store` never has to cross lock tiers — `reconfigure`
/// writes both copies while already holding the slow lock, taking the fast
/// lock second, per the slow-before-fast acquisition order.
///
/// There is no interior reclamation in the data pool: a single contiguous
/// append cursor (`data_write_pos`) that resets to 0 only once the whole
/// ring has been evicted. This bounds fragmentation at the cost of up to
/// one full ring flush per wrap; do not "fix" this with a free list, it
/// would change which packets `dropped_packets` counts.
pub struct RingPool {
    descriptors: Box<[PacketDescriptor]>,
    data: Box<[u8]>,
    entry_capacity: usize,
    data_pool_size: usize,
    write_idx: usize,
    read_idx: usize,
    entry_count: usize,
    data_write_pos: usize,
    pub duration_sec: u32,
    pub max_memory_bytes: u64,
    pub stats: StatCounters,
}

impl RingPool {
    pub fn new(entry_capacity: usize, data_pool_size: usize, duration_sec: u32, max_memory_bytes: u64) -> Self {
        Self {
            descriptors: vec![PacketDescriptor::default(); entry_capacity].into_boxed_slice(),
            data: vec![0u8; data_pool_size].into_boxed_slice(),
            entry_capacity,
            data_pool_size,
            write_idx: 0,
            read_idx: 0,
            entry_count: 0,
            data_write_pos: 0,
            duration_sec,
            max_memory_bytes,
            stats: StatCounters::default(),
        }
    }

    #[inline]
    pub fn entry_capacity(&self) -> usize {
        self.entry_capacity
    }

    #[inline]
    pub fn data_pool_size(&self) -> usize {
        self.data_pool_size
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Evict the oldest descriptor. `forced` is true for budget/descriptor
    /// capacity evictions (increments `dropped_packets`), false for
    /// time-window expiry (does not).
    fn evict_one(&mut self, forced: bool) {
        safe_assert!(self.entry_count > 0, "evict_one called on empty ring");
        let desc = self.descriptors[self.read_idx];
        self.read_idx = (self.read_idx + 1) % self.entry_capacity;
        self.entry_count -= 1;

        self.stats.total_bytes = self.stats.total_bytes.saturating_sub(u64::from(desc.caplen));
        self.stats.current_memory = self.stats.current_memory.saturating_sub(u64::from(desc.caplen));
        self.stats.total_packets = self.stats.total_packets.saturating_sub(1);
        if forced {
            self.stats.dropped_packets += 1;
        }

        if self.entry_count == 0 {
            // Open question (preserved from source): a budget eviction that
            // empties the ring resets oldest_ts_sec to 0. A time-window
            // eviction that empties the ring leaves both timestamps as-is;
            // the subsequent store() into an empty ring re-derives oldest_ts
            // from the new packet regardless, so this has no externally
            // visible effect beyond `get_stats()` called in the gap.
            if forced {
                self.stats.oldest_ts = PacketTimestamp::ZERO;
            }
        } else {
            self.stats.oldest_ts = self.descriptors[self.read_idx].ts;
        }
    }

    /// Enumerate descriptors in ring order (oldest to newest) without
    /// mutating anything. Used by the snapshot writer while it holds the
    /// fast lock.
    pub fn iter_in_order(&self) -> impl Iterator<Item = &PacketDescriptor> {
        let cap = self.entry_capacity;
        (0..self.entry_count).map(move |i| &self.descriptors[(self.read_idx + i) % cap])
    }

    #[inline]
    pub fn packet_data(&self, desc: &PacketDescriptor) -> &[u8] {
        let start = desc.data_offset as usize;
        &self.data[start..start + desc.caplen as usize]
    }

    /// The hot-path ingest algorithm (spec.md §4.2, steps 2-7). Caller is
    /// responsible for state checks (step 1) and the null-pointer-shaped
    /// argument validation, neither of which this type can express.
    pub fn store_packet(
        &mut self,
        ts: PacketTimestamp,
        wirelen: u32,
        data: &[u8],
    ) -> Result<(), CaptureError> {
        let caplen = data.len() as u32;

        // 2. Time eviction: drop anything older than the packet's own
        // timestamp minus the rolling window. Not forced: does not bump
        // dropped_packets.
        while self.entry_count > 0 {
            let head = self.descriptors[self.read_idx].ts;
            if head.secs < ts.saturating_sub_secs(self.duration_sec) {
                self.evict_one(false);
            } else {
                break;
            }
        }

        // 3. Byte-budget eviction: forced.
        while self.entry_count > 0
            && self.stats.current_memory + u64::from(caplen) > self.max_memory_bytes
        {
            self.evict_one(true);
        }

        // 4. Descriptor-capacity eviction: forced.
        if self.entry_count == self.entry_capacity {
            self.evict_one(true);
        }

        // 5. Data-pool placement: evict-to-empty-and-reset on tail shortfall.
        if self.data_pool_size - self.data_write_pos < caplen as usize {
            while self.entry_count > 0 {
                self.evict_one(true);
            }
            self.data_write_pos = 0;

            if caplen as usize > self.data_pool_size {
                self.stats.dropped_packets += 1;
                return Err(CaptureError::PacketTooLarge {
                    caplen,
                    pool_size: self.data_pool_size as u32,
                });
            }
        }

        let was_empty = self.entry_count == 0;

        // 6. Copy payload, write descriptor, advance cursors.
        let offset = self.data_write_pos;
        self.data[offset..offset + caplen as usize].copy_from_slice(data);
        self.descriptors[self.write_idx] =
            PacketDescriptor { ts, caplen, wirelen, data_offset: offset as u32 };
        self.data_write_pos += caplen as usize;
        self.write_idx = (self.write_idx + 1) % self.entry_capacity;
        self.entry_count += 1;

        // 7. Stats.
        self.stats.total_packets += 1;
        self.stats.total_bytes += u64::from(caplen);
        self.stats.current_memory += u64::from(caplen);
        self.stats.newest_ts = ts;
        if was_empty {
            self.stats.oldest_ts = ts;
        }

        Ok(())
    }

    /// Reset counters, indices and timestamps. Does not touch `duration_sec`
    /// / `max_memory_bytes` (those are config, not stats) and does not
    /// resize the ring.
    pub fn clear(&mut self) {
        self.write_idx = 0;
        self.read_idx = 0;
        self.entry_count = 0;
        self.data_write_pos = 0;
        self.stats = StatCounters::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u32) -> PacketTimestamp {
        PacketTimestamp::new(secs, 0)
    }

    #[test]
    fn basic_single_packet() {
        let mut ring = RingPool::new(1000, 64 * 1024, 30, 256 * 1024 * 1024);
        ring.store_packet(ts(1000), 100, &[0u8; 100]).unwrap();
        assert_eq!(ring.stats.total_packets, 1);
        assert_eq!(ring.stats.total_bytes, 100);
        assert_eq!(ring.stats.dropped_packets, 0);
        assert_eq!(ring.entry_count(), 1);
    }

    #[test]
    fn time_expiry_evicts_without_dropping() {
        let mut ring = RingPool::new(1000, 1024 * 1024, 10, 256 * 1024 * 1024);
        for t in [980u32, 981, 982, 983, 984] {
            ring.store_packet(ts(t), 100, &[0u8; 100]).unwrap();
        }
        ring.store_packet(ts(1000), 100, &[0u8; 100]).unwrap();
        assert_eq!(ring.entry_count(), 1);
        assert_eq!(ring.stats.total_packets, 1);
        assert_eq!(ring.stats.dropped_packets, 0);
        assert_eq!(ring.stats.oldest_ts, ts(1000));
    }

    #[test]
    fn budget_eviction_bounds_memory_and_drops() {
        let mut ring = RingPool::new(1000, 64 * 1024, 30, 65536);
        for i in 0..200u32 {
            let _ = ring.store_packet(ts(1000 + i), 1024, &[0u8; 1024]);
        }
        assert!(ring.stats.current_memory <= 65536);
        assert!(ring.stats.dropped_packets >= 1);
    }

    #[test]
    fn packet_too_large_is_rejected_and_dropped() {
        let mut ring = RingPool::new(1000, 128, 30, 256 * 1024 * 1024);
        let err = ring.store_packet(ts(1), 0, &[0u8; 256]).unwrap_err();
        assert!(matches!(err, CaptureError::PacketTooLarge { .. }));
        assert_eq!(ring.stats.dropped_packets, 1);
    }

    #[test]
    fn zero_caplen_packet_is_retained() {
        let mut ring = RingPool::new(1000, 1024, 30, 256 * 1024 * 1024);
        ring.store_packet(ts(1), 0, &[]).unwrap();
        assert_eq!(ring.stats.total_packets, 1);
        assert_eq!(ring.stats.total_bytes, 0);
    }

    #[test]
    fn data_pool_wraps_by_full_flush() {
        // Pool only fits 2 packets of 100 bytes at a time; the third insert
        // should flush the whole ring and reset the cursor rather than
        // compact in place.
        let mut ring = RingPool::new(1000, 250, 30, 256 * 1024 * 1024);
        ring.store_packet(ts(1), 100, &[1u8; 100]).unwrap();
        ring.store_packet(ts(2), 100, &[2u8; 100]).unwrap();
        assert_eq!(ring.entry_count(), 2);
        ring.store_packet(ts(3), 100, &[3u8; 100]).unwrap();
        // Both prior packets were flushed to make room; only the newest
        // survives, and it was dropped-as-forced on neither (the shortfall
        // eviction forces the flush, so dropped_packets increments for the
        // two flushed packets).
        assert_eq!(ring.entry_count(), 1);
        assert_eq!(ring.stats.dropped_packets, 2);
    }

    #[test]
    fn invariants_hold_after_each_store() {
        let mut ring = RingPool::new(64, 16 * 1024, 30, 1024 * 1024);
        for i in 0..500u32 {
            let _ = ring.store_packet(ts(1000 + i), 64, &[7u8; 64]);
            assert!(ring.entry_count() <= ring.entry_capacity());
            assert!(ring.stats.current_memory <= ring.max_memory_bytes);
            assert_eq!(ring.stats.total_packets, ring.entry_count() as u64);
            if ring.entry_count() > 0 {
                assert_eq!(ring.stats.oldest_ts, ring.descriptors[ring.read_idx].ts);
            }
        }
    }
}
