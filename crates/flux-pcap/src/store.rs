use crate::{error::CaptureError, ring::RingPool, timestamp::PacketTimestamp};

/// Per-packet metadata handed to [`crate::Capture::store`] alongside the
/// payload slice. `wirelen` may exceed `data.len()` for a packet captured
/// with a snaplen shorter than its wire length; `caplen` is always
/// `data.len()`, never a separately-claimed value.
#[derive(Clone, Copy, Debug)]
pub struct PacketHeader {
    pub ts: PacketTimestamp,
    pub wirelen: u32,
}

/// Argument validation plus the ring handoff (spec.md §4.2 step 1 is the
/// caller's job: `Capture::store` checks state before calling this). The
/// C-shaped "null header pointer" / "caplen > 0 with null data pointer"
/// failure modes don't exist here — `data: &[u8]` ties length and bytes
/// together, so the only remaining invalid-argument case is a slice too
/// long to fit the descriptor's `u32` `caplen` field.
pub fn ingest(ring: &mut RingPool, header: PacketHeader, data: &[u8]) -> Result<(), CaptureError> {
    if data.len() > u32::MAX as usize {
        return Err(CaptureError::InvalidArgument("caplen exceeds u32::MAX"));
    }
    ring.store_packet(header.ts, header.wirelen, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ingest_delegates_to_ring() {
        let mut ring = RingPool::new(1000, 1024, 30, 1024 * 1024);
        let header = PacketHeader { ts: PacketTimestamp::new(1, 0), wirelen: 4 };
        ingest(&mut ring, header, &[1, 2, 3, 4]).unwrap();
        assert_eq!(ring.entry_count(), 1);
        assert_eq!(ring.stats.total_bytes, 4);
    }
}
