use flux_utils::ArrayStr;

pub const REASON_CAP: usize = 256;
pub const FILEPATH_CAP: usize = 256;

/// Set on the Recording -> Triggered transition, consulted by the writer.
#[derive(Clone, Copy, Debug)]
pub struct TriggerRecord {
    pub trigger_time_sec: u32,
    pub post_trigger_deadline_sec: u32,
    pub reason: ArrayStr<REASON_CAP>,
}

/// Result of a successful (or failed) `write_file()` call.
#[derive(Clone, Copy, Debug)]
pub struct WriteResult {
    pub filepath: ArrayStr<FILEPATH_CAP>,
    pub file_size: u64,
    pub packet_count: u32,
    pub duration_sec: u32,
    pub success: bool,
}

impl WriteResult {
    pub fn failure() -> Self {
        Self {
            filepath: ArrayStr::new(),
            file_size: 0,
            packet_count: 0,
            duration_sec: 0,
            success: false,
        }
    }
}
