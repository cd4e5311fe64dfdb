use std::sync::atomic::{AtomicU8, Ordering};

/// The four-state capture lifecycle.
///
/// ```text
/// Disabled --enable--> Recording --trigger--> Triggered --write_file--> Writing --done--> Recording
///    ^                     |                      |
///    '-----disable---------'                      '-- post_trigger_complete? (observer only)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CaptureState {
    Disabled = 0,
    Recording = 1,
    Triggered = 2,
    Writing = 3,
}

impl Default for CaptureState {
    fn default() -> Self {
        Self::Disabled
    }
}

impl CaptureState {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Disabled,
            1 => Self::Recording,
            2 => Self::Triggered,
            3 => Self::Writing,
            _ => unreachable!("invalid CaptureState discriminant {v}"),
        }
    }
}

/// Atomic holder for [`CaptureState`].
///
/// Readers that only need the current state (e.g. `get_state`) load this
/// directly and never touch the fast or slow lock. Transitions that also
/// need to update other bookkeeping (trigger record, config) still happen
/// under the slow lock; the store into this atomic happens last, as the
/// visible "it is now true" signal.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(initial: CaptureState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    #[inline]
    pub fn load(&self) -> CaptureState {
        CaptureState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: CaptureState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Compare-and-swap helper used by transitions that must only fire from
    /// one specific source state.
    #[inline]
    pub fn transition(&self, from: CaptureState, to: CaptureState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_only_from_expected_source() {
        let cell = StateCell::new(CaptureState::Disabled);
        assert!(!cell.transition(CaptureState::Recording, CaptureState::Triggered));
        assert_eq!(cell.load(), CaptureState::Disabled);

        assert!(cell.transition(CaptureState::Disabled, CaptureState::Recording));
        assert_eq!(cell.load(), CaptureState::Recording);
    }

    #[test]
    fn get_state_safe_default() {
        let cell = StateCell::default();
        assert_eq!(cell.load(), CaptureState::Disabled);
    }
}
