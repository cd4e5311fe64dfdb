use std::{mem::size_of, path::PathBuf};

use tracing::warn;

use crate::ring::PacketDescriptor;

pub const DURATION_SEC: u32 = 30;
pub const PRE_TRIGGER_SEC: u32 = 25;
pub const POST_TRIGGER_SEC: u32 = 5;
pub const MAX_MEM_MB: u64 = 256;
pub const MIN_MEM_MB: u64 = 16;
/// libpcap's historical `BUFSIZ` default capture length on Linux.
pub const DEFAULT_SNAPLEN: u32 = 65535;
/// `DLT_EN10MB` — Ethernet, the pcap datalink default.
pub const DATALINK_ETHERNET: u32 = 1;

const MIN_ENTRY_CAPACITY: usize = 1000;
const BYTES_PER_ENTRY_SLOT: u64 = 64;

/// Mutable-in-place config fields (everything but `max_memory_bytes`, which
/// requires a full teardown+reinit because it changes ring/pool sizing).
#[derive(Clone, Copy, Debug)]
pub struct CaptureConfig {
    pub max_memory_bytes: u64,
    pub duration_sec: u32,
    pub pre_trigger_sec: u32,
    pub post_trigger_sec: u32,
    pub datalink_type: u32,
    pub snaplen: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_memory_bytes: MAX_MEM_MB * 1024 * 1024,
            duration_sec: DURATION_SEC,
            pre_trigger_sec: PRE_TRIGGER_SEC,
            post_trigger_sec: POST_TRIGGER_SEC,
            datalink_type: DATALINK_ETHERNET,
            snaplen: DEFAULT_SNAPLEN,
        }
    }
}

impl CaptureConfig {
    /// `entry_capacity = max(1000, max_memory_bytes / 64)`.
    pub fn entry_capacity(&self) -> usize {
        (self.max_memory_bytes / BYTES_PER_ENTRY_SLOT).max(MIN_ENTRY_CAPACITY as u64) as usize
    }

    /// What's left of the budget once descriptors are accounted for.
    pub fn data_pool_size(&self) -> usize {
        let descriptor_bytes = self.entry_capacity() as u64 * size_of::<PacketDescriptor>() as u64;
        self.max_memory_bytes.saturating_sub(descriptor_bytes) as usize
    }

    /// Build a default config sized off a fraction of available system
    /// memory, clamped to `[MIN_MEM_MB, MAX_MEM_MB]`.
    pub fn from_available_memory() -> Self {
        let available = available_memory_bytes();
        let budget_mb = (available / (1024 * 1024) / 10).clamp(MIN_MEM_MB, MAX_MEM_MB);
        Self { max_memory_bytes: budget_mb * 1024 * 1024, ..Self::default() }
    }
}

/// `MemAvailable` from `/proc/meminfo`, falling back to a libc `sysconf`
/// based estimate of available physical memory when `/proc` isn't mounted
/// (e.g. non-Linux, containers without procfs).
pub fn available_memory_bytes() -> u64 {
    match read_mem_available_from_proc() {
        Some(bytes) => bytes,
        None => {
            warn!("/proc/meminfo unavailable, falling back to sysconf(_SC_AVPHYS_PAGES)");
            available_memory_via_sysconf()
        }
    }
}

fn read_mem_available_from_proc() -> Option<u64> {
    let contents = std::fs::read_to_string("/proc/meminfo").ok()?;
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            let kb: u64 = rest.trim().trim_end_matches(" kB").trim().parse().ok()?;
            return Some(kb * 1024);
        }
    }
    None
}

fn available_memory_via_sysconf() -> u64 {
    #[cfg(unix)]
    unsafe {
        let pages = libc::sysconf(libc::_SC_AVPHYS_PAGES);
        let page_size = libc::sysconf(libc::_SC_PAGESIZE);
        if pages > 0 && page_size > 0 {
            return pages as u64 * page_size as u64;
        }
    }
    MAX_MEM_MB * 1024 * 1024
}

/// `1.2 * duration * (bitrate/8/avg_pkt_size) * (avg_pkt_size + overhead)`,
/// saturated to `u32::MAX`.
pub fn optimal_size_bytes(duration_sec: u32, avg_pkt_size: u32, bitrate_bps: u64) -> u32 {
    if avg_pkt_size == 0 {
        return 0;
    }
    let overhead = size_of::<PacketDescriptor>() as f64;
    let packets_per_sec = (bitrate_bps as f64 / 8.0) / f64::from(avg_pkt_size);
    let estimate = 1.2 * f64::from(duration_sec) * packets_per_sec * (f64::from(avg_pkt_size) + overhead);
    if estimate.is_sign_negative() || estimate.is_nan() {
        return 0;
    }
    if estimate >= f64::from(u32::MAX) {
        u32::MAX
    } else {
        estimate as u32
    }
}

/// `/tmp/<app_name>/pcap`, mirroring the shape of `flux_utils::directories`
/// but pinned to `/tmp` rather than an XDG base dir, per spec.
pub fn pcap_dir(app_name: &str) -> PathBuf {
    pcap_dir_with_base(PathBuf::from("/tmp"), app_name)
}

pub fn pcap_dir_with_base(base: PathBuf, app_name: &str) -> PathBuf {
    base.join(app_name).join("pcap")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_capacity_has_a_floor() {
        let cfg = CaptureConfig { max_memory_bytes: 1024, ..Default::default() };
        assert_eq!(cfg.entry_capacity(), MIN_ENTRY_CAPACITY);
    }

    #[test]
    fn entry_capacity_scales_with_budget() {
        let cfg = CaptureConfig { max_memory_bytes: 64 * 1024 * 1024, ..Default::default() };
        assert_eq!(cfg.entry_capacity(), 1024 * 1024);
    }

    #[test]
    fn optimal_size_is_saturating() {
        let huge = optimal_size_bytes(u32::MAX, 1, u64::MAX);
        assert_eq!(huge, u32::MAX);
    }

    #[test]
    fn optimal_size_zero_avg_pkt_size_is_zero() {
        assert_eq!(optimal_size_bytes(30, 0, 1_000_000), 0);
    }

    #[test]
    fn pcap_dir_shape() {
        let dir = pcap_dir_with_base(PathBuf::from("/base"), "myapp");
        assert_eq!(dir, PathBuf::from("/base/myapp/pcap"));
    }
}
