use super::error::LoopbackError;

/// Loopback engine state machine.
///
/// State transitions:
/// ```text
/// starting → running → stopping
///    ↓          ↓
///    └───────→ faulted
/// ```
/// `Stopping` and `Faulted` are terminal and both imply a completed teardown.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Starting,
    Running,
    Stopping,
    Faulted(LoopbackError),
}

impl EngineState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopping | Self::Faulted(_))
    }

    /// The fault that ended the engine, if any.
    pub fn fault(&self) -> Option<&LoopbackError> {
        match self {
            Self::Faulted(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!EngineState::Starting.is_terminal());
        assert!(!EngineState::Running.is_terminal());
        assert!(EngineState::Stopping.is_terminal());

        let faulted = EngineState::Faulted(LoopbackError::BufferReleaseFailed("gone".into()));
        assert!(faulted.is_terminal());
        assert!(!faulted.is_running());
        assert_eq!(
            faulted.fault(),
            Some(&LoopbackError::BufferReleaseFailed("gone".into()))
        );
        assert_eq!(EngineState::Running.fault(), None);
    }
}
