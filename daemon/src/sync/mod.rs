//! Multi-stream playback synchronization
//!
//! - `controller`: owns the adapters and the authoritative playback clock
//! - `state`: explicit session phase machine
//! - `focus`: expanded stream vs. grid view

mod controller;
mod focus;
mod state;

pub use controller::SyncController;

use std::time::Duration;

use crate::config::PlaybackSettings;

/// Transport tuning used by the controller
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub frame_rate: f64,
    pub seek_step: f64,
    pub seek_settle: Duration,
    pub ready_timeout: Duration,
    pub load_timeout: Duration,
}

impl From<&PlaybackSettings> for SyncSettings {
    fn from(playback: &PlaybackSettings) -> Self {
        Self {
            frame_rate: playback.frame_rate,
            seek_step: playback.seek_step,
            seek_settle: playback.seek_settle(),
            ready_timeout: playback.ready_timeout(),
            load_timeout: playback.load_timeout(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&PlaybackSettings::default())
    }
}
