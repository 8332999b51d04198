//! Review session phases and their legal transitions

use common::{ReviewError, SessionPhase};

/// Explicit session state machine.
///
/// `Idle -> Loading -> ReadyPaused <-> ReadyPlaying`, back to `Idle` when the
/// streams are detached and back to `Loading` when a source is replaced.
#[derive(Debug, Clone, Copy)]
pub struct SessionMachine {
    phase: SessionPhase,
}

impl Default for SessionMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionMachine {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.phase == SessionPhase::ReadyPlaying
    }

    /// Streams were (re)attached; wait for the load gate unless nothing loads
    pub fn begin_loading(&mut self, streams_to_load: usize) {
        self.phase = if streams_to_load == 0 {
            SessionPhase::Idle
        } else {
            SessionPhase::Loading
        };
    }

    /// Load gate satisfied. Returns `true` on the `Loading -> ReadyPaused` edge.
    pub fn gate_cleared(&mut self) -> bool {
        if self.phase == SessionPhase::Loading {
            self.phase = SessionPhase::ReadyPaused;
            return true;
        }
        false
    }

    /// Check whether a play command may start playback.
    ///
    /// `Ok(false)` means there is nothing to do (idle or already playing).
    pub fn can_play(&self) -> Result<bool, ReviewError> {
        match self.phase {
            SessionPhase::Loading => Err(ReviewError::NotReady(
                "streams are still loading".to_string(),
            )),
            SessionPhase::Idle | SessionPhase::ReadyPlaying => Ok(false),
            SessionPhase::ReadyPaused => Ok(true),
        }
    }

    pub fn playing(&mut self) {
        if self.phase == SessionPhase::ReadyPaused {
            self.phase = SessionPhase::ReadyPlaying;
        }
    }

    pub fn paused(&mut self) {
        if self.phase == SessionPhase::ReadyPlaying {
            self.phase = SessionPhase::ReadyPaused;
        }
    }

    pub fn detached(&mut self) {
        self.phase = SessionPhase::Idle;
    }
}
