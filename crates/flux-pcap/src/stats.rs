use crate::{ring::StatCounters, state::CaptureState};

/// Point-in-time readout of the capture buffer.
#[derive(Clone, Copy, Debug, Default)]
pub struct CaptureStats {
    pub total_packets: u64,
    pub total_bytes: u64,
    pub dropped_packets: u64,
    pub oldest_ts_sec: u32,
    pub newest_ts_sec: u32,
    pub current_memory: u64,
    /// Clamped to `[0, 100]`.
    pub buffer_percent: u8,
    pub state: CaptureState,
}

impl CaptureStats {
    pub fn from_counters(counters: &StatCounters, duration_sec: u32, state: CaptureState) -> Self {
        Self {
            total_packets: counters.total_packets,
            total_bytes: counters.total_bytes,
            dropped_packets: counters.dropped_packets,
            oldest_ts_sec: counters.oldest_ts.secs,
            newest_ts_sec: counters.newest_ts.secs,
            current_memory: counters.current_memory,
            buffer_percent: buffer_percent(counters, duration_sec),
            state,
        }
    }
}

/// `min(100, 100 * (newest - oldest) / duration_sec)`.
///
/// Division by `duration_sec == 0` is undefined in the source this was
/// ported from; we guard it and return 0, but flag it here rather than
/// pretend it was ever meaningfully specified: a zero-length rolling window
/// makes "percent full relative to the window" an ill-posed question.
fn buffer_percent(counters: &StatCounters, duration_sec: u32) -> u8 {
    if duration_sec == 0 {
        return 0;
    }
    let span = counters.newest_ts.saturating_sub_secs(counters.oldest_ts.secs);
    let pct = (100u64 * u64::from(span)) / u64::from(duration_sec);
    pct.min(100) as u8
}
