//! Polling state machine: `Idle -> Polling -> Idle`.

/// Whether a poll/fusion cycle is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PollingState {
    /// No poll in flight; `start_polling` may begin one.
    #[default]
    Idle,
    /// A worker is polling or a fusion pass is running for `generation`.
    Polling { generation: u64 },
}

impl PollingState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Generation of the in-flight poll, if any.
    pub fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Polling { generation } => Some(*generation),
        }
    }
}
