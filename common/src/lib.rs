//! Common types and utilities for Camsync.
//!
//! This crate defines the shared data model and IPC protocol used for
//! communication between the synchronization daemon (`camsyncd`) and the
//! control client (`camctl`).
//!
//! # IPC Protocol
//!
//! Communication happens over a Unix domain socket using newline-delimited
//! JSON messages. The client sends [`Command`] variants and receives
//! [`Response`] variants.
//!
//! # Examples
//!
//! ```no_run
//! use common::Command;
//!
//! // Jump to the middle of the recording on every camera
//! let cmd = Command::SeekFraction { fraction: 0.5 };
//!
//! // Serialize for sending over IPC
//! let json = serde_json::to_string(&cmd).unwrap();
//! ```

mod stream;

pub use stream::{
    CameraMount, SessionManifest, SessionStream, SourceKind, StreamDescriptor, StreamId,
    apply_overrides,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Common error types shared between client and daemon.
///
/// All errors are serializable for transmission over IPC.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ReviewError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("IPC error: {0}")]
    Ipc(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not ready: {0}")]
    NotReady(String),
}

impl From<std::io::Error> for ReviewError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for ReviewError {
    fn from(e: serde_json::Error) -> Self {
        Self::Ipc(e.to_string())
    }
}

/// Direction of a transport step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    pub fn sign(&self) -> f64 {
        match self {
            Self::Forward => 1.0,
            Self::Backward => -1.0,
        }
    }
}

/// Commands sent from client to daemon via IPC.
///
/// Transport commands fan out to every attached camera stream; positions are
/// in seconds.
///
/// # Examples
///
/// ```
/// use common::{Command, Direction};
///
/// // Step one frame back on all cameras
/// let cmd = Command::FrameStep { direction: Direction::Backward };
/// ```
#[derive(Debug, Serialize, Deserialize)]
pub enum Command {
    /// Start synchronized playback on every stream
    Play,
    /// Pause every stream
    Pause,
    /// Play when paused, pause when playing
    TogglePlay,
    /// Move the shared position by `delta` seconds (clamped to the recording)
    SeekRelative { delta: f64 },
    /// Move the shared position to `position` seconds (clamped to the recording)
    SeekAbsolute { position: f64 },
    /// Move to a fraction (0.0-1.0) of the recording duration
    SeekFraction { fraction: f64 },
    /// Progress bar click: `offset` pixels into a bar `width` pixels wide
    ProgressClick { offset: f64, width: f64 },
    /// Skip by the configured step (10s by default)
    Skip { direction: Direction },
    /// Step a single frame
    FrameStep { direction: Direction },
    /// Show one camera enlarged; it becomes the time reference
    Expand { id: StreamId },
    /// Return to the grid view
    Collapse,
    /// Tile click: expand the camera, or collapse if it is already expanded
    ToggleExpand { id: StreamId },
    /// Replace the source of one camera (local file path or URL)
    SetSource { id: StreamId, src: String },
    /// Replace the whole session from a session manifest JSON file
    LoadSession {
        /// Path to the manifest (must be absolute)
        path: String,
    },
    /// Query playback status
    Status,
    /// List the cameras of the current session
    ListStreams,
    /// Ping the daemon
    Ping,
    /// Kill the daemon
    Kill,
}

/// Response from daemon to client
#[derive(Debug, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Pong,
    Error(ReviewError),
    Status(PlaybackSnapshot),
    Streams(Vec<StreamDescriptor>),
}

/// Phase of the review session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// No sources attached
    Idle,
    /// Sources attached, waiting for every stream to report ready or failed
    Loading,
    ReadyPaused,
    ReadyPlaying,
}

impl SessionPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::ReadyPaused => "paused",
            Self::ReadyPlaying => "playing",
        }
    }
}

/// Load state of a single stream as shown on its tile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StreamHealth {
    /// No source, nothing attached
    Unattached,
    /// Attached and loading
    Pending,
    Ready,
    /// Failed to load; the tile shows a placeholder
    Failed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamStatus {
    pub id: StreamId,
    pub title: String,
    pub src: String,
    pub health: StreamHealth,
    pub last_position: Option<f64>,
}

/// Playback state exposed to presentation clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaybackSnapshot {
    pub phase: SessionPhase,
    pub current_position: f64,
    pub duration: f64,
    pub is_playing: bool,
    pub expanded: Option<StreamId>,
    pub loaded_count: usize,
    pub total_to_load: usize,
    pub all_loaded: bool,
    pub streams: Vec<StreamStatus>,
}

/// Format seconds as `m:ss` for display
pub fn format_time(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "0:00".to_string();
    }
    let total = seconds.floor() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// IPC socket path helper
pub fn get_socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));

    std::path::PathBuf::from(runtime_dir).join("camsync.sock")
}
