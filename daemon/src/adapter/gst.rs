//! GStreamer `playbin` backend
//!
//! Each adapter owns one `playbin` with synchronized fake sinks: decoding and
//! clocking happen in GStreamer, the daemon only steers transport. A watcher
//! thread drains the pipeline bus and turns messages into adapter events.

use async_trait::async_trait;
use common::StreamDescriptor;
use gstreamer as gst;
use gstreamer::prelude::*;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::watch;

use super::recovery::{AdaptiveSession, FaultKind, RecoveryTarget, StreamFault};
use super::{AdapterError, MediaBackend, StreamAdapter, StreamCallbacks};

const BUS_POLL: Duration = Duration::from_millis(100);
const POSITION_POLL: Duration = Duration::from_millis(250);

/// Initialize GStreamer once per process
fn initialize_gstreamer() -> Result<(), AdapterError> {
    static INIT: OnceLock<Result<(), String>> = OnceLock::new();

    INIT.get_or_init(|| {
        gst::init().map_err(|e| e.to_string())?;
        log::info!("GStreamer initialized");
        Ok(())
    })
    .clone()
    .map_err(AdapterError::Backend)
}

/// First registered HLS demuxer, if any
fn find_adaptive_demuxer() -> Option<&'static str> {
    ["hlsdemux2", "hlsdemux"]
        .into_iter()
        .find(|name| gst::ElementFactory::find(name).is_some())
}

pub struct GstBackend {
    max_recoveries: u32,
    adaptive_demuxer: Option<&'static str>,
}

impl GstBackend {
    pub fn new(max_recoveries: u32) -> Self {
        let adaptive_demuxer = match initialize_gstreamer() {
            Ok(()) => find_adaptive_demuxer(),
            Err(e) => {
                log::error!("Failed to initialize GStreamer: {}", e);
                None
            }
        };

        match adaptive_demuxer {
            Some(name) => log::info!("Adaptive streaming via {}", name),
            None => log::warn!("No HLS demuxer registered, manifest sources will fail to load"),
        }

        Self {
            max_recoveries,
            adaptive_demuxer,
        }
    }
}

impl MediaBackend for GstBackend {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn create(&self, _descriptor: &StreamDescriptor) -> Arc<dyn StreamAdapter> {
        Arc::new(GstAdapter {
            max_recoveries: self.max_recoveries,
            adaptive_demuxer: self.adaptive_demuxer,
            attachment: Mutex::new(None),
        })
    }
}

/// State shared between an adapter and its bus watcher
struct Shared {
    pipeline: gst::Element,
    playable: watch::Sender<bool>,
    wants_play: AtomicBool,
    ended: AtomicBool,
    duration: Mutex<Option<f64>>,
    /// Seek requested before the pipeline prerolled
    pending_seek: Mutex<Option<f64>>,
}

impl Shared {
    fn position(&self) -> Option<f64> {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(clock_to_seconds)
    }

    fn seek_now(&self, position: f64) -> bool {
        let target = gst::ClockTime::from_nseconds((position.max(0.0) * 1e9) as u64);
        self.pipeline
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, target)
            .is_ok()
    }

    /// Element state, not the last request: a failed or reverted
    /// `Playing` transition reads as paused
    fn is_playing(&self) -> bool {
        self.pipeline.current_state() == gst::State::Playing
    }

    fn target_state(&self) -> gst::State {
        if self.wants_play.load(Ordering::Acquire) {
            gst::State::Playing
        } else {
            gst::State::Paused
        }
    }
}

impl RecoveryTarget for Shared {
    fn position(&self) -> Option<f64> {
        Shared::position(self)
    }

    fn reload(&self, resume_at: Option<f64>) -> bool {
        self.playable.send_replace(false);
        if let (Some(position), Ok(mut pending)) = (resume_at, self.pending_seek.lock()) {
            *pending = Some(position);
        }
        let _ = self.pipeline.set_state(gst::State::Ready);
        self.pipeline.set_state(self.target_state()).is_ok()
    }

    fn recover_in_place(&self, position: f64) -> bool {
        self.seek_now(position)
    }
}

struct Attachment {
    shared: Arc<Shared>,
    stop: Arc<AtomicBool>,
    watcher: Option<JoinHandle<()>>,
}

pub struct GstAdapter {
    max_recoveries: u32,
    adaptive_demuxer: Option<&'static str>,
    attachment: Mutex<Option<Attachment>>,
}

impl GstAdapter {
    fn shared(&self) -> Option<Arc<Shared>> {
        self.attachment
            .lock()
            .ok()?
            .as_ref()
            .map(|a| a.shared.clone())
    }
}

#[async_trait]
impl StreamAdapter for GstAdapter {
    fn attach(
        &self,
        descriptor: &StreamDescriptor,
        callbacks: StreamCallbacks,
    ) -> Result<(), AdapterError> {
        initialize_gstreamer()?;
        self.detach();

        let adaptive = if descriptor.source_kind().is_adaptive() {
            let demuxer = self.adaptive_demuxer.ok_or_else(|| {
                AdapterError::Unsupported("no HLS demuxer available".to_string())
            })?;
            Some(AdaptiveSession::new(demuxer, self.max_recoveries))
        } else {
            None
        };

        let uri = source_uri(&descriptor.src)?;
        log::info!("[{}] Attaching {}", descriptor.id, uri);

        let pipeline = build_playbin(&uri)?;
        let (playable, playable_rx) = watch::channel(false);
        drop(playable_rx);
        let shared = Arc::new(Shared {
            pipeline,
            playable,
            wants_play: AtomicBool::new(false),
            ended: AtomicBool::new(false),
            duration: Mutex::new(None),
            pending_seek: Mutex::new(None),
        });

        shared
            .pipeline
            .set_state(gst::State::Paused)
            .map_err(|e| AdapterError::Backend(format!("failed to start loading: {}", e)))?;
        callbacks.load_started();

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let shared = shared.clone();
            let stop = stop.clone();
            std::thread::Builder::new()
                .name(format!("bus-{}", descriptor.id))
                .spawn(move || watch_bus(shared, callbacks, adaptive, stop))
                .map_err(|e| AdapterError::Backend(e.to_string()))?
        };

        if let Ok(mut slot) = self.attachment.lock() {
            *slot = Some(Attachment {
                shared,
                stop,
                watcher: Some(watcher),
            });
        }
        Ok(())
    }

    fn detach(&self) {
        let attachment = match self.attachment.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        let Some(attachment) = attachment else {
            return;
        };

        attachment.stop.store(true, Ordering::Release);
        if let Some(bus) = attachment.shared.pipeline.bus() {
            bus.set_flushing(true);
        }

        // Joining the watcher can wait on a blocking state change
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(move || release(attachment));
            }
            Err(_) => release(attachment),
        }
    }

    async fn play(&self) -> Result<(), AdapterError> {
        let shared = self.shared().ok_or(AdapterError::Detached)?;
        shared.wants_play.store(true, Ordering::Release);
        shared
            .pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| AdapterError::PlayRejected(e.to_string()))?;
        Ok(())
    }

    fn pause(&self) {
        if let Some(shared) = self.shared() {
            shared.wants_play.store(false, Ordering::Release);
            let _ = shared.pipeline.set_state(gst::State::Paused);
        }
    }

    fn seek(&self, position: f64) {
        let Some(shared) = self.shared() else {
            return;
        };
        shared.ended.store(false, Ordering::Release);
        if *shared.playable.borrow() && shared.seek_now(position) {
            return;
        }
        if let Ok(mut pending) = shared.pending_seek.lock() {
            *pending = Some(position);
        }
    }

    fn position(&self) -> f64 {
        self.shared()
            .and_then(|shared| shared.position())
            .unwrap_or(0.0)
    }

    fn duration(&self) -> Option<f64> {
        let shared = self.shared()?;
        let duration = *shared.duration.lock().ok()?;
        duration
    }

    fn is_paused(&self) -> bool {
        self.shared().is_none_or(|shared| !shared.is_playing())
    }

    fn is_ended(&self) -> bool {
        self.shared()
            .map(|shared| shared.ended.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    async fn wait_playable(&self, timeout: Duration) -> bool {
        let Some(shared) = self.shared() else {
            return false;
        };
        let mut rx = shared.playable.subscribe();
        matches!(
            tokio::time::timeout(timeout, rx.wait_for(|playable| *playable)).await,
            Ok(Ok(_))
        )
    }
}

impl Drop for GstAdapter {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Stop the bus watcher and drop the pipeline to `Null`
fn release(mut attachment: Attachment) {
    if let Some(watcher) = attachment.watcher.take() {
        let _ = watcher.join();
    }
    if let Err(e) = attachment.shared.pipeline.set_state(gst::State::Null) {
        log::warn!("Failed to release pipeline: {}", e);
    }
    log::debug!("Pipeline released");
}

fn build_playbin(uri: &str) -> Result<gst::Element, AdapterError> {
    let backend_err = |e: gst::glib::BoolError| AdapterError::Backend(e.to_string());

    let video_sink = gst::ElementFactory::make("fakesink")
        .property("sync", true)
        .build()
        .map_err(backend_err)?;
    let audio_sink = gst::ElementFactory::make("fakesink")
        .property("sync", true)
        .build()
        .map_err(backend_err)?;

    gst::ElementFactory::make("playbin")
        .property("uri", uri)
        .property("video-sink", video_sink)
        .property("audio-sink", audio_sink)
        .property("mute", true)
        .build()
        .map_err(backend_err)
}

/// Turn a descriptor source into a URI `playbin` accepts
fn source_uri(src: &str) -> Result<String, AdapterError> {
    if src.contains("://") {
        return Ok(src.to_string());
    }

    let path = Path::new(src);
    let path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| AdapterError::Backend(e.to_string()))?
            .join(path)
    };
    if !path.exists() {
        return Err(AdapterError::Unsupported(format!(
            "file not found: {}",
            path.display()
        )));
    }

    gst::glib::filename_to_uri(&path, None)
        .map(|uri| uri.to_string())
        .map_err(|e| AdapterError::Unsupported(e.to_string()))
}

fn clock_to_seconds(time: gst::ClockTime) -> f64 {
    time.nseconds() as f64 / 1e9
}

fn classify_fault(error: &gst::glib::Error) -> FaultKind {
    if error.kind::<gst::ResourceError>().is_some() {
        return FaultKind::Network;
    }
    match error.kind::<gst::StreamError>() {
        Some(
            gst::StreamError::CodecNotFound
            | gst::StreamError::NotImplemented
            | gst::StreamError::TypeNotFound
            | gst::StreamError::WrongType,
        ) => FaultKind::Other,
        Some(_) => FaultKind::Media,
        None => FaultKind::Other,
    }
}

fn watch_bus(
    shared: Arc<Shared>,
    callbacks: StreamCallbacks,
    mut adaptive: Option<AdaptiveSession>,
    stop: Arc<AtomicBool>,
) {
    let Some(bus) = shared.pipeline.bus() else {
        callbacks.error("pipeline has no bus");
        return;
    };

    let mut ready_sent = false;
    let mut buffering = false;
    let mut last_poll = Instant::now();
    let mut last_position: Option<f64> = None;

    while !stop.load(Ordering::Acquire) {
        if let Some(msg) = bus.timed_pop(gst::ClockTime::from_nseconds(BUS_POLL.as_nanos() as u64)) {
            match msg.view() {
                gst::MessageView::AsyncDone(_) => {
                    shared.playable.send_replace(true);

                    let pending = shared.pending_seek.lock().ok().and_then(|mut p| p.take());
                    if let Some(position) = pending {
                        shared.seek_now(position);
                    }

                    if !ready_sent {
                        ready_sent = true;
                        let duration = shared
                            .pipeline
                            .query_duration::<gst::ClockTime>()
                            .map(clock_to_seconds)
                            .unwrap_or(f64::INFINITY);
                        if let Ok(mut slot) = shared.duration.lock() {
                            *slot = duration.is_finite().then_some(duration);
                        }
                        callbacks.ready(duration);
                    }
                }

                gst::MessageView::Buffering(b) => {
                    if b.percent() < 100 {
                        if !buffering && shared.wants_play.load(Ordering::Acquire) {
                            callbacks.stalled();
                        }
                        buffering = true;
                    } else {
                        buffering = false;
                    }
                }

                gst::MessageView::Eos(_) => {
                    shared.ended.store(true, Ordering::Release);
                    shared.wants_play.store(false, Ordering::Release);
                    callbacks.ended();
                }

                gst::MessageView::Error(err) => {
                    let detail = match err.debug() {
                        Some(debug) => format!("{} ({})", err.error(), debug),
                        None => err.error().to_string(),
                    };
                    match adaptive.as_mut() {
                        Some(session) => {
                            let fault = StreamFault::new(classify_fault(&err.error()), true, detail);
                            session.handle(fault, shared.as_ref(), &callbacks);
                        }
                        None => {
                            log::error!("[{}] GStreamer error: {}", callbacks.id(), detail);
                            callbacks.error(detail);
                        }
                    }
                }

                gst::MessageView::Warning(warning) => {
                    if let Some(session) = adaptive.as_mut() {
                        let fault = StreamFault::new(
                            classify_fault(&warning.error()),
                            false,
                            warning.error().to_string(),
                        );
                        session.handle(fault, shared.as_ref(), &callbacks);
                    } else {
                        log::debug!("[{}] GStreamer warning: {}", callbacks.id(), warning.error());
                    }
                }

                _ => {
                    // Drain other messages
                }
            }
        }

        if ready_sent && last_poll.elapsed() >= POSITION_POLL {
            last_poll = Instant::now();
            if let Some(position) = shared.position() {
                if last_position != Some(position) {
                    if last_position.is_some_and(|last| position > last) {
                        if let Some(session) = adaptive.as_mut() {
                            session.record_progress();
                        }
                    }
                    last_position = Some(position);
                    callbacks.position_changed(position);
                }
            }
        }
    }

    log::trace!("[{}] Bus watcher stopped", callbacks.id());
}
