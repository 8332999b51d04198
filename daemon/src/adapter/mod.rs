//! Stream adapters: one playable camera source behind a uniform handle.
//!
//! The synchronization controller never talks to a media framework directly.
//! It drives [`StreamAdapter`] handles created by a [`MediaBackend`] and
//! listens to the notifications adapters raise through [`StreamCallbacks`].
//!
//! - `recovery`: adaptive-streaming fault classification and recovery budget
//! - `gst`: GStreamer `playbin` backend (`video` feature)
//!
//! Without the `video` feature an unavailable backend is used: every attach
//! fails, which the controller treats like any other load failure.

// Event producers and fault handling are only driven by the GStreamer backend
#![cfg_attr(not(feature = "video"), allow(dead_code))]

pub mod recovery;

#[cfg(feature = "video")]
mod gst;

#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use common::{StreamDescriptor, StreamId};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::Config;

/// Errors raised by a single stream adapter
#[derive(Error, Debug, Clone)]
pub enum AdapterError {
    #[error("playback rejected: {0}")]
    PlayRejected(String),

    #[error("unsupported source: {0}")]
    Unsupported(String),

    #[error("media backend error: {0}")]
    Backend(String),

    #[error("adapter is not attached")]
    Detached,
}

/// Notification raised by an adapter
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    /// The source started loading (fresh attach or reload)
    LoadStarted,
    /// Current playback position in seconds
    PositionChanged(f64),
    /// First valid metadata. The duration may be non-finite for live sources.
    Ready { duration: f64 },
    /// Unrecoverable load or playback failure
    Error(String),
    /// Buffering stall
    Stalled,
    /// End of media reached
    Ended,
}

/// An [`AdapterEvent`] tagged with the stream that raised it
#[derive(Debug, Clone)]
pub struct StreamEvent {
    pub id: StreamId,
    /// Attachment generation the event was raised under
    pub epoch: u64,
    pub event: AdapterEvent,
}

/// Event sink for one stream.
///
/// Created once per stream id and reused across re-attachments. Detaching a
/// stream advances the epoch so events still queued from the previous
/// attachment can be told apart.
#[derive(Debug, Clone)]
pub struct StreamCallbacks {
    id: StreamId,
    epoch: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<StreamEvent>,
}

impl StreamCallbacks {
    pub fn new(id: StreamId, tx: mpsc::UnboundedSender<StreamEvent>) -> Self {
        Self {
            id,
            epoch: Arc::new(AtomicU64::new(0)),
            tx,
        }
    }

    pub fn id(&self) -> &StreamId {
        &self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Invalidate every event raised so far
    pub fn advance_epoch(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    pub fn load_started(&self) {
        self.emit(AdapterEvent::LoadStarted);
    }

    pub fn position_changed(&self, position: f64) {
        self.emit(AdapterEvent::PositionChanged(position));
    }

    pub fn ready(&self, duration: f64) {
        self.emit(AdapterEvent::Ready { duration });
    }

    pub fn error(&self, info: impl Into<String>) {
        self.emit(AdapterEvent::Error(info.into()));
    }

    pub fn stalled(&self) {
        self.emit(AdapterEvent::Stalled);
    }

    pub fn ended(&self) {
        self.emit(AdapterEvent::Ended);
    }

    fn emit(&self, event: AdapterEvent) {
        let event = StreamEvent {
            id: self.id.clone(),
            epoch: self.epoch(),
            event,
        };
        if self.tx.send(event).is_err() {
            log::trace!("[{}] Controller gone, dropping adapter event", self.id);
        }
    }
}

/// Uniform handle over one playable media source.
///
/// All methods take `&self`; implementations synchronize internally so the
/// controller can fan commands out from a shared `Arc`.
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    /// Bind to the source and start loading it. Network activity starts immediately.
    fn attach(
        &self,
        descriptor: &StreamDescriptor,
        callbacks: StreamCallbacks,
    ) -> Result<(), AdapterError>;

    /// Release the media binding and any adaptive-streaming session. Idempotent.
    fn detach(&self);

    /// Start playback. Rejections are non-fatal for the session.
    async fn play(&self) -> Result<(), AdapterError>;

    fn pause(&self);

    /// Jump to `position` seconds. Callers clamp to the known duration.
    fn seek(&self, position: f64);

    fn position(&self) -> f64;

    fn duration(&self) -> Option<f64>;

    fn is_paused(&self) -> bool;

    fn is_ended(&self) -> bool;

    /// Wait until enough media is buffered to start playing.
    ///
    /// Returns `false` when `timeout` elapsed first.
    async fn wait_playable(&self, timeout: Duration) -> bool;
}

/// Factory for stream adapters
pub trait MediaBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, descriptor: &StreamDescriptor) -> Arc<dyn StreamAdapter>;
}

/// Pick the media backend compiled into this binary
#[cfg(feature = "video")]
pub fn default_backend(config: &Config) -> Arc<dyn MediaBackend> {
    if config.general.backend == "none" {
        log::warn!("Media backend disabled in config, every stream will fail to load");
        return Arc::new(UnavailableBackend);
    }
    Arc::new(gst::GstBackend::new(config.adaptive.max_recoveries))
}

/// Pick the media backend compiled into this binary
#[cfg(not(feature = "video"))]
pub fn default_backend(_config: &Config) -> Arc<dyn MediaBackend> {
    log::warn!("Video support not compiled (build with --features video to enable)");
    Arc::new(UnavailableBackend)
}

/// Backend used when no media framework is available
pub struct UnavailableBackend;

impl MediaBackend for UnavailableBackend {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    fn create(&self, _descriptor: &StreamDescriptor) -> Arc<dyn StreamAdapter> {
        Arc::new(UnavailableAdapter)
    }
}

struct UnavailableAdapter;

#[async_trait]
impl StreamAdapter for UnavailableAdapter {
    fn attach(
        &self,
        _descriptor: &StreamDescriptor,
        _callbacks: StreamCallbacks,
    ) -> Result<(), AdapterError> {
        Err(AdapterError::Unsupported(
            "video support not compiled in".to_string(),
        ))
    }

    fn detach(&self) {}

    async fn play(&self) -> Result<(), AdapterError> {
        Err(AdapterError::Detached)
    }

    fn pause(&self) {}

    fn seek(&self, _position: f64) {}

    fn position(&self) -> f64 {
        0.0
    }

    fn duration(&self) -> Option<f64> {
        None
    }

    fn is_paused(&self) -> bool {
        true
    }

    fn is_ended(&self) -> bool {
        false
    }

    async fn wait_playable(&self, _timeout: Duration) -> bool {
        false
    }
}
