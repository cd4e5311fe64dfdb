use thiserror::Error;

/// Every fallible operation on [`crate::Capture`] returns this.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture core not initialised")]
    NotInitialised,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("packet caplen {caplen} exceeds data pool size {pool_size}")]
    PacketTooLarge { caplen: u32, pool_size: u32 },

    #[error("operation not valid in state {0:?}")]
    StateConflict(crate::state::CaptureState),

    #[error("allocation failed: {0}")]
    AllocationFailure(&'static str),

    #[error("I/O failure: {0}")]
    IoFailure(#[from] std::io::Error),
}
