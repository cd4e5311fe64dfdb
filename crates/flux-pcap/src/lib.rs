pub mod config;
pub mod error;
mod pcapfile;
pub mod ring;
pub mod stats;
pub mod state;
mod store;
pub mod timestamp;
mod trigger;
mod writer;

use std::{
    path::PathBuf,
    sync::{Arc, Mutex as StdMutex},
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::OnceCell;
use spin::Mutex as SpinMutex;
use tracing::{info, warn};

pub use config::CaptureConfig;
pub use error::CaptureError;
pub use ring::RingPool;
pub use state::CaptureState;
pub use stats::CaptureStats;
pub use store::PacketHeader;
pub use trigger::WriteResult;

use state::StateCell;
use trigger::TriggerRecord;

struct SlowState {
    config: CaptureConfig,
    trigger: Option<TriggerRecord>,
    pcap_dir: PathBuf,
}

/// The capture core: a descriptor ring plus data pool behind a spin lock for
/// the hot path, and config/trigger bookkeeping behind a std mutex for
/// everything else. Callers acquire the slow lock before the fast lock,
/// never the reverse, so the two can never deadlock against each other.
///
/// A process normally reaches this through the free functions below, which
/// hold a single process-wide instance; tests construct it directly.
pub struct Capture {
    fast: SpinMutex<RingPool>,
    state: StateCell,
    slow: StdMutex<SlowState>,
}

impl Capture {
    pub fn new(config: CaptureConfig, pcap_dir: PathBuf) -> std::io::Result<Self> {
        std::fs::create_dir_all(&pcap_dir)?;

        let ring = RingPool::new(
            config.entry_capacity(),
            config.data_pool_size(),
            config.duration_sec,
            config.max_memory_bytes,
        );

        Ok(Self {
            fast: SpinMutex::new(ring),
            state: StateCell::new(CaptureState::Disabled),
            slow: StdMutex::new(SlowState { config, trigger: None, pcap_dir }),
        })
    }

    /// Disabled -> Recording. A no-op success from Recording itself; any
    /// other state is a conflict (the caller must `disable()` or finish the
    /// in-flight trigger/write cycle first).
    pub fn enable(&self) -> Result<(), CaptureError> {
        match self.state.load() {
            CaptureState::Disabled => {
                self.state.store(CaptureState::Recording);
                Ok(())
            }
            CaptureState::Recording => Ok(()),
            other => Err(CaptureError::StateConflict(other)),
        }
    }

    /// Unconditional: always succeeds, from any state.
    pub fn disable(&self) {
        self.state.store(CaptureState::Disabled);
    }

    /// Recording -> Triggered. Records `reason` and the post-trigger
    /// deadline under the slow lock; the store path never sees this lock.
    pub fn trigger(&self, reason: &str) -> Result<(), CaptureError> {
        let mut slow = self.slow.lock().unwrap();
        if !self.state.transition(CaptureState::Recording, CaptureState::Triggered) {
            return Err(CaptureError::StateConflict(self.state.load()));
        }
        let trigger_time_sec = now_unix_secs();
        slow.trigger = Some(TriggerRecord {
            trigger_time_sec,
            post_trigger_deadline_sec: trigger_time_sec.saturating_add(slow.config.post_trigger_sec),
            reason: flux_utils::ArrayStr::from_str_truncate(reason),
        });
        info!(trigger_time_sec, reason, "capture triggered");
        Ok(())
    }

    /// True once the post-trigger grace window has elapsed (or there's
    /// nothing to wait on). A pure observer: the fast path never blocks on
    /// it, and this never blocks the fast path either.
    pub fn post_trigger_complete(&self) -> bool {
        if self.state.load() != CaptureState::Triggered {
            return true;
        }
        let slow = self.slow.lock().unwrap();
        match slow.trigger {
            Some(t) => t.post_trigger_deadline_sec <= t.trigger_time_sec || now_unix_secs() >= t.post_trigger_deadline_sec,
            None => true,
        }
    }

    /// The hot path. A no-op success when not `Recording`/`Triggered`, so
    /// callers on a live capture loop never need to branch on state
    /// themselves.
    pub fn store(&self, header: PacketHeader, data: &[u8]) -> Result<(), CaptureError> {
        if !matches!(self.state.load(), CaptureState::Recording | CaptureState::Triggered) {
            return Ok(());
        }
        let mut fast = self.fast.lock();
        store::ingest(&mut fast, header, data)
    }

    /// Triggered -> Writing -> Recording. Snapshots `[trigger - pre_trigger,
    /// trigger + post_trigger]` to a pcap file under the fast lock, then
    /// does the actual file I/O after releasing it. A write failure is
    /// reported via `WriteResult::success == false`, not an `Err` — the
    /// capture always returns to `Recording` either way.
    pub fn write_file(&self) -> Result<WriteResult, CaptureError> {
        let slow = self.slow.lock().unwrap();
        if !self.state.transition(CaptureState::Triggered, CaptureState::Writing) {
            return Err(CaptureError::StateConflict(self.state.load()));
        }
        let trigger = slow.trigger.expect("Triggered state implies a trigger record was recorded");
        let lo = trigger.trigger_time_sec.saturating_sub(slow.config.pre_trigger_sec);
        let hi = trigger.trigger_time_sec.saturating_add(slow.config.post_trigger_sec);

        let buffered = {
            let fast = self.fast.lock();
            writer::collect_window(&fast, lo, hi)
        };

        let filename = format!("capture_{}.pcap", trigger.trigger_time_sec);
        let path = slow.pcap_dir.join(&filename);

        let result = match writer::write_pcap_file(&path, slow.config.datalink_type, slow.config.snaplen, &buffered) {
            Ok((packet_count, file_size)) => {
                info!(path = %path.display(), packet_count, file_size, "wrote capture snapshot");
                WriteResult {
                    filepath: flux_utils::ArrayStr::from_str_truncate(&path.to_string_lossy()),
                    file_size,
                    packet_count,
                    duration_sec: slow.config.pre_trigger_sec + slow.config.post_trigger_sec,
                    success: true,
                }
            }
            Err(err) => {
                warn!(path = %path.display(), %err, "failed to write capture snapshot");
                WriteResult::failure()
            }
        };

        self.state.store(CaptureState::Recording);
        Ok(result)
    }

    /// Apply a new config. A change to `max_memory_bytes` tears down and
    /// reallocates the ring and data pool; every other field is updated in
    /// place. Takes the slow lock first, the fast lock second.
    pub fn set_config(&self, new_config: CaptureConfig) {
        let mut slow = self.slow.lock().unwrap();
        let mem_changed = new_config.max_memory_bytes != slow.config.max_memory_bytes;
        slow.config = new_config;

        let mut fast = self.fast.lock();
        if mem_changed {
            *fast = RingPool::new(
                new_config.entry_capacity(),
                new_config.data_pool_size(),
                new_config.duration_sec,
                new_config.max_memory_bytes,
            );
        } else {
            fast.duration_sec = new_config.duration_sec;
            fast.max_memory_bytes = new_config.max_memory_bytes;
        }
    }

    pub fn get_config(&self) -> CaptureConfig {
        self.slow.lock().unwrap().config
    }

    pub fn set_datalink(&self, datalink_type: u32) {
        self.slow.lock().unwrap().config.datalink_type = datalink_type;
    }

    pub fn get_stats(&self) -> CaptureStats {
        let fast = self.fast.lock();
        CaptureStats::from_counters(&fast.stats, fast.duration_sec, self.state.load())
    }

    pub fn get_state(&self) -> CaptureState {
        self.state.load()
    }

    /// Wipes the ring and data pool but keeps the current state and config.
    pub fn clear(&self) {
        self.fast.lock().clear();
    }
}

fn now_unix_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as u32).unwrap_or(0)
}

static INSTANCE: OnceCell<StdMutex<Option<Arc<Capture>>>> = OnceCell::new();

fn instance() -> &'static StdMutex<Option<Arc<Capture>>> {
    INSTANCE.get_or_init(|| StdMutex::new(None))
}

/// Build the process-wide capture instance for `app_name`, replacing
/// whatever was there before. Defaults the config to a fraction of
/// available system memory when `config` is `None`.
pub fn init(app_name: &str, config: Option<CaptureConfig>) -> Result<(), CaptureError> {
    let config = config.unwrap_or_else(CaptureConfig::from_available_memory);
    let pcap_dir = config::pcap_dir(app_name);
    let capture = Capture::new(config, pcap_dir)?;
    *instance().lock().unwrap() = Some(Arc::new(capture));
    Ok(())
}

/// Tear down the process-wide instance. Idempotent.
pub fn destroy() {
    *instance().lock().unwrap() = None;
}

/// Clones the `Arc` and releases the instance lock immediately, so a
/// long-running call (`write_file`'s file I/O, in particular) never blocks
/// unrelated callers behind this outer lock — only `Capture`'s own fast and
/// slow locks do that, by design.
fn with_capture<R>(f: impl FnOnce(&Capture) -> R) -> Result<R, CaptureError> {
    let capture = instance().lock().unwrap().clone().ok_or(CaptureError::NotInitialised)?;
    Ok(f(&capture))
}

pub fn enable() -> Result<(), CaptureError> {
    with_capture(Capture::enable)?
}

pub fn disable() -> Result<(), CaptureError> {
    with_capture(Capture::disable)
}

pub fn trigger(reason: &str) -> Result<(), CaptureError> {
    with_capture(|c| c.trigger(reason))?
}

pub fn post_trigger_complete() -> Result<bool, CaptureError> {
    with_capture(Capture::post_trigger_complete)
}

pub fn store(header: PacketHeader, data: &[u8]) -> Result<(), CaptureError> {
    with_capture(|c| c.store(header, data))?
}

pub fn write_file() -> Result<WriteResult, CaptureError> {
    with_capture(Capture::write_file)?
}

pub fn set_config(config: CaptureConfig) -> Result<(), CaptureError> {
    with_capture(|c| c.set_config(config))
}

pub fn get_config() -> Result<CaptureConfig, CaptureError> {
    with_capture(Capture::get_config)
}

pub fn set_datalink(datalink_type: u32) -> Result<(), CaptureError> {
    with_capture(|c| c.set_datalink(datalink_type))
}

pub fn get_stats() -> Result<CaptureStats, CaptureError> {
    with_capture(Capture::get_stats)
}

/// Safe even before `init()`: reports `Disabled` rather than erroring.
pub fn get_state() -> CaptureState {
    match instance().lock().unwrap().clone() {
        Some(c) => c.get_state(),
        None => CaptureState::Disabled,
    }
}

pub fn clear() -> Result<(), CaptureError> {
    with_capture(Capture::clear)
}
