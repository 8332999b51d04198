//! Synchronization controller
//!
//! Single authority for the playback clock of a review session. Transport
//! commands fan out to every attached adapter; per-stream failures are
//! logged and never stop the fan-out for the remaining streams.
//!
//! The reference stream drives `current_position`: the expanded stream when
//! one is expanded, otherwise the master (first configured stream that is
//! attached and healthy). Reports from every other stream only update their
//! own last-known position.

use common::{
    Direction, PlaybackSnapshot, ReviewError, SessionPhase, StreamDescriptor, StreamHealth,
    StreamId, StreamStatus,
};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::SyncSettings;
use super::focus::Focus;
use super::state::SessionMachine;
use crate::adapter::{AdapterEvent, MediaBackend, StreamAdapter, StreamCallbacks, StreamEvent};
use crate::load_tracker::LoadTracker;
use crate::warn_and_continue;

type Attached = (StreamId, Arc<dyn StreamAdapter>);

pub struct SyncController {
    settings: SyncSettings,
    backend: Arc<dyn MediaBackend>,
    events: mpsc::UnboundedSender<StreamEvent>,

    descriptors: Vec<StreamDescriptor>,
    adapters: HashMap<StreamId, Arc<dyn StreamAdapter>>,
    /// One sink per stream id, kept across re-attachments
    callbacks: HashMap<StreamId, StreamCallbacks>,
    health: HashMap<StreamId, StreamHealth>,

    tracker: LoadTracker,
    machine: SessionMachine,
    focus: Focus,

    current_position: f64,
    duration: Option<f64>,
    /// Stream whose report set `duration`
    duration_source: Option<StreamId>,
    last_positions: HashMap<StreamId, f64>,
    /// Saved position to apply once the expanded stream reports ready
    pending_restore: Option<(StreamId, f64)>,
}

impl SyncController {
    pub fn new(
        settings: SyncSettings,
        backend: Arc<dyn MediaBackend>,
        events: mpsc::UnboundedSender<StreamEvent>,
    ) -> Self {
        log::info!("Using {} media backend", backend.name());
        let tracker = LoadTracker::new(settings.load_timeout);
        Self {
            settings,
            backend,
            events,
            descriptors: Vec::new(),
            adapters: HashMap::new(),
            callbacks: HashMap::new(),
            health: HashMap::new(),
            tracker,
            machine: SessionMachine::new(),
            focus: Focus::Grid,
            current_position: 0.0,
            duration: None,
            duration_source: None,
            last_positions: HashMap::new(),
            pending_restore: None,
        }
    }

    // ---- session lifecycle ----

    /// Replace the whole session: detach everything, attach `descriptors`.
    ///
    /// The first descriptor is the master stream.
    pub fn load(&mut self, descriptors: Vec<StreamDescriptor>) -> Result<(), ReviewError> {
        {
            let mut seen = HashSet::new();
            if let Some(dup) = descriptors.iter().find(|d| !seen.insert(&d.id)) {
                return Err(ReviewError::Config(format!("duplicate stream id: {}", dup.id)));
            }
        }

        self.detach_all();
        self.current_position = 0.0;
        self.duration = None;
        self.duration_source = None;
        self.last_positions.clear();
        self.pending_restore = None;
        self.focus = Focus::Grid;
        self.health.clear();
        self.descriptors = descriptors;

        let expected: Vec<StreamId> = self
            .descriptors
            .iter()
            .filter(|d| d.has_source())
            .map(|d| d.id.clone())
            .collect();
        log::info!(
            "Loading session with {} streams ({} with a source)",
            self.descriptors.len(),
            expected.len()
        );

        self.tracker.reset(expected.iter().cloned(), Instant::now());
        self.machine.begin_loading(expected.len());

        for descriptor in self.descriptors.clone() {
            if descriptor.has_source() {
                self.attach(&descriptor);
            } else {
                self.health
                    .insert(descriptor.id.clone(), StreamHealth::Unattached);
            }
        }

        self.check_gate();
        Ok(())
    }

    /// Replace the source of one stream and re-attach only that stream.
    ///
    /// The load gate is reopened for the new source; streams that already
    /// reported ready or failed are credited again immediately.
    pub fn set_source(&mut self, id: &StreamId, src: &str) -> Result<(), ReviewError> {
        let index = self
            .descriptors
            .iter()
            .position(|d| &d.id == id)
            .ok_or_else(|| ReviewError::NotFound(id.to_string()))?;

        if self.machine.is_playing() {
            self.pause();
        }

        self.detach_stream(id);
        self.last_positions.remove(id);
        if self.pending_restore.as_ref().is_some_and(|(p, _)| p == id) {
            self.pending_restore = None;
        }

        let descriptor = self.descriptors[index].with_source(src.trim());
        self.descriptors[index] = descriptor.clone();
        log::info!("[{}] Source replaced with {}", id, descriptor.src);

        let expected: Vec<StreamId> = self
            .descriptors
            .iter()
            .filter(|d| d.has_source())
            .map(|d| d.id.clone())
            .collect();
        self.tracker.reset(expected.iter().cloned(), Instant::now());
        self.machine.begin_loading(expected.len());

        for other in &expected {
            if other == id {
                continue;
            }
            if matches!(
                self.health.get(other),
                Some(StreamHealth::Ready | StreamHealth::Failed(_))
            ) {
                self.tracker.mark_loaded(other);
            }
        }

        if descriptor.has_source() {
            self.attach(&descriptor);
        } else {
            self.health.insert(id.clone(), StreamHealth::Unattached);
        }

        self.check_gate();
        Ok(())
    }

    /// Detach every stream. Safe to call repeatedly.
    pub fn shutdown(&mut self) {
        self.detach_all();
        self.focus = Focus::Grid;
        self.pending_restore = None;
    }

    fn attach(&mut self, descriptor: &StreamDescriptor) {
        let id = descriptor.id.clone();
        let callbacks = self
            .callbacks
            .entry(id.clone())
            .or_insert_with(|| StreamCallbacks::new(id.clone(), self.events.clone()))
            .clone();

        let adapter = self.backend.create(descriptor);
        match adapter.attach(descriptor, callbacks) {
            Ok(()) => {
                log::debug!("[{}] Attached ({:?})", id, descriptor.source_kind());
                self.health.insert(id.clone(), StreamHealth::Pending);
                self.adapters.insert(id, adapter);
            }
            Err(e) => {
                log::warn!("[{}] Failed to attach source: {}", id, e);
                self.health
                    .insert(id.clone(), StreamHealth::Failed(e.to_string()));
                self.tracker.mark_errored(&id);
            }
        }
    }

    fn detach_stream(&mut self, id: &StreamId) {
        if let Some(callbacks) = self.callbacks.get(id) {
            callbacks.advance_epoch();
        }
        if let Some(adapter) = self.adapters.remove(id) {
            adapter.detach();
            log::debug!("[{}] Detached", id);
        }
    }

    fn detach_all(&mut self) {
        let ids: Vec<StreamId> = self.adapters.keys().cloned().collect();
        for id in &ids {
            self.detach_stream(id);
        }
        self.tracker.clear();
        self.machine.detached();
    }

    fn check_gate(&mut self) {
        if self.tracker.all_loaded() && self.machine.gate_cleared() {
            log::info!(
                "All streams accounted for ({}/{})",
                self.tracker.loaded_count(),
                self.tracker.total_to_load()
            );
        }
    }

    // ---- reference selection ----

    fn master_id(&self) -> Option<&StreamId> {
        self.descriptors
            .iter()
            .map(|d| &d.id)
            .find(|id| self.adapters.contains_key(*id) && !self.is_failed(id))
    }

    /// Stream that currently drives the playback clock
    pub fn reference_id(&self) -> Option<&StreamId> {
        match &self.focus {
            Focus::Expanded(id) => Some(id),
            Focus::Grid => self.master_id(),
        }
    }

    fn reference_adapter(&self) -> Option<Arc<dyn StreamAdapter>> {
        self.reference_id()
            .and_then(|id| self.adapters.get(id))
            .cloned()
    }

    fn is_failed(&self, id: &StreamId) -> bool {
        matches!(self.health.get(id), Some(StreamHealth::Failed(_)))
    }

    /// Attached adapters in configured order
    fn attached(&self) -> Vec<Attached> {
        self.descriptors
            .iter()
            .filter_map(|d| {
                self.adapters
                    .get(&d.id)
                    .map(|adapter| (d.id.clone(), adapter.clone()))
            })
            .collect()
    }

    fn clamp(&self, position: f64) -> f64 {
        position.clamp(0.0, self.duration.unwrap_or(0.0))
    }

    // ---- transport ----

    /// Start synchronized playback.
    ///
    /// Every adapter is moved to the reference position, given a bounded wait
    /// to become playable and then started. Individual rejections are warnings.
    pub async fn play(&mut self) -> Result<(), ReviewError> {
        if !self.machine.can_play()? {
            return Ok(());
        }

        let attached = self.attached();
        if attached.is_empty() {
            return Ok(());
        }

        let target = self
            .reference_adapter()
            .map(|adapter| adapter.position())
            .filter(|p| p.is_finite())
            .unwrap_or(self.current_position);
        let target = self.clamp(target);
        for (_, adapter) in &attached {
            adapter.seek(target);
        }
        self.current_position = target;

        let timeout = self.settings.ready_timeout;
        let waits = attached
            .iter()
            .filter(|(id, _)| !self.is_failed(id))
            .map(|(id, adapter)| async move { (id, adapter.wait_playable(timeout).await) });
        for (id, playable) in join_all(waits).await {
            if !playable {
                log::warn!(
                    "[{}] Not playable after {}ms, starting anyway",
                    id,
                    timeout.as_millis()
                );
            }
        }

        play_all(&attached).await;
        self.machine.playing();
        log::info!("Playing from {}", common::format_time(target));
        Ok(())
    }

    /// Pause every stream. Always succeeds.
    pub fn pause(&mut self) {
        for (_, adapter) in self.attached() {
            adapter.pause();
        }
        self.machine.paused();
    }

    pub async fn toggle_play(&mut self) -> Result<(), ReviewError> {
        if self.machine.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play().await
        }
    }

    /// Move every stream to `position` (clamped to the recording).
    ///
    /// While playing, streams are paused for the settle delay and resumed
    /// so they restart from the new position together.
    pub async fn seek_absolute(&mut self, position: f64) {
        if position.is_nan() {
            log::debug!("Ignoring seek to NaN");
            return;
        }

        let target = self.clamp(position);
        let attached = self.attached();
        for (_, adapter) in &attached {
            adapter.seek(target);
        }
        self.current_position = target;

        if self.machine.is_playing() {
            for (_, adapter) in &attached {
                adapter.pause();
            }
            tokio::time::sleep(self.settings.seek_settle).await;
            play_all(&attached).await;
        }
    }

    pub async fn seek_relative(&mut self, delta: f64) {
        self.seek_absolute(self.current_position + delta).await;
    }

    /// Seek to `fraction` of the duration. Ignored until a duration is known.
    pub async fn seek_fraction(&mut self, fraction: f64) {
        let Some(duration) = self.duration else {
            log::debug!("Ignoring fractional seek, duration unknown");
            return;
        };
        if fraction.is_nan() {
            return;
        }
        self.seek_absolute(fraction.clamp(0.0, 1.0) * duration).await;
    }

    /// Translate a click `offset` pixels into a progress bar `width` pixels wide
    pub async fn progress_click(&mut self, offset: f64, width: f64) {
        if !(width.is_finite() && width > 0.0) || !offset.is_finite() {
            return;
        }
        self.seek_fraction((offset / width).clamp(0.0, 1.0)).await;
    }

    pub async fn frame_step(&mut self, direction: Direction) {
        self.seek_relative(direction.sign() / self.settings.frame_rate)
            .await;
    }

    pub async fn skip(&mut self, direction: Direction) {
        self.seek_relative(direction.sign() * self.settings.seek_step)
            .await;
    }

    // ---- expansion ----

    /// Enlarge one stream and make it the reference. Always leaves playback paused.
    pub fn expand(&mut self, id: &StreamId) -> Result<(), ReviewError> {
        if !self.descriptors.iter().any(|d| &d.id == id) {
            return Err(ReviewError::NotFound(id.to_string()));
        }
        if self.focus.is_expanded(id) {
            return Ok(());
        }

        self.save_reference_position();
        self.pause();
        self.focus = Focus::Expanded(id.clone());
        log::info!("[{}] Expanded", id);

        match self.last_positions.get(id).copied() {
            Some(saved) => self.restore_position(id, saved),
            None => {
                if let Some(adapter) = self.adapters.get(id) {
                    self.current_position = self.clamp(adapter.position());
                }
            }
        }
        Ok(())
    }

    /// Back to the grid; the master drives the clock again
    pub fn collapse(&mut self) {
        if self.focus == Focus::Grid {
            return;
        }

        self.save_reference_position();
        self.pause();
        self.focus = Focus::Grid;
        self.pending_restore = None;
        log::info!("Collapsed to grid");

        if let Some(adapter) = self.reference_adapter() {
            self.current_position = self.clamp(adapter.position());
        }
    }

    /// Tile click: expand `id`, or collapse when it is already expanded
    pub fn toggle_expand(&mut self, id: &StreamId) -> Result<(), ReviewError> {
        if self.focus.is_expanded(id) {
            self.collapse();
            Ok(())
        } else {
            self.expand(id)
        }
    }

    fn save_reference_position(&mut self) {
        let Some(id) = self.reference_id().cloned() else {
            return;
        };
        if let Some(adapter) = self.adapters.get(&id) {
            let position = adapter.position();
            if position.is_finite() {
                self.last_positions.insert(id, position);
            }
        }
    }

    fn restore_position(&mut self, id: &StreamId, saved: f64) {
        let ready = matches!(self.health.get(id), Some(StreamHealth::Ready));
        match self.adapters.get(id) {
            Some(adapter) if ready => {
                adapter.seek(saved);
                self.current_position = self.clamp(saved);
                log::debug!("[{}] Restored position {:.2}s", id, saved);
            }
            _ => {
                self.pending_restore = Some((id.clone(), saved));
            }
        }
    }

    // ---- adapter events ----

    pub async fn handle_event(&mut self, event: StreamEvent) {
        let current = self
            .callbacks
            .get(&event.id)
            .is_some_and(|callbacks| callbacks.epoch() == event.epoch);
        if !current || !self.adapters.contains_key(&event.id) {
            log::trace!("[{}] Dropping stale {:?}", event.id, event.event);
            return;
        }

        let id = event.id;
        match event.event {
            AdapterEvent::LoadStarted => self.on_load_started(&id),
            AdapterEvent::PositionChanged(position) => self.on_position(&id, position),
            AdapterEvent::Ready { duration } => self.on_ready(&id, duration),
            AdapterEvent::Error(info) => self.on_error(&id, info),
            AdapterEvent::Stalled => self.on_stalled(&id).await,
            AdapterEvent::Ended => log::info!("[{}] Reached end of media", id),
        }
    }

    fn on_load_started(&mut self, id: &StreamId) {
        if let (Some(adapter), Some(saved)) = (self.adapters.get(id), self.last_positions.get(id)) {
            log::debug!("[{}] Load started, restoring {:.2}s", id, saved);
            adapter.seek(*saved);
        }
    }

    fn on_position(&mut self, id: &StreamId, position: f64) {
        if !position.is_finite() {
            return;
        }
        self.last_positions.insert(id.clone(), position);

        if self.reference_id() == Some(id) {
            self.current_position = match self.duration {
                Some(duration) => position.clamp(0.0, duration),
                None => position.max(0.0),
            };
        }
    }

    fn on_ready(&mut self, id: &StreamId, duration: f64) {
        self.health.insert(id.clone(), StreamHealth::Ready);
        self.adopt_duration(id, duration);

        if self.tracker.mark_loaded(id) {
            log::info!(
                "[{}] Ready ({}/{})",
                id,
                self.tracker.loaded_count(),
                self.tracker.total_to_load()
            );
        }

        if self.pending_restore.as_ref().is_some_and(|(p, _)| p == id) {
            if let Some((_, saved)) = self.pending_restore.take() {
                self.restore_position(id, saved);
            }
        }

        self.check_gate();
    }

    /// The first valid duration wins; the master may replace a follower's value
    fn adopt_duration(&mut self, id: &StreamId, duration: f64) {
        if !(duration.is_finite() && duration > 0.0) {
            log::debug!("[{}] No usable duration ({})", id, duration);
            return;
        }

        let is_master = self.descriptors.first().is_some_and(|d| &d.id == id);
        let master_already = self
            .duration_source
            .as_ref()
            .is_some_and(|source| self.descriptors.first().is_some_and(|d| &d.id == source));

        if self.duration.is_none() || (is_master && !master_already) {
            log::info!("[{}] Duration {}", id, common::format_time(duration));
            self.duration = Some(duration);
            self.duration_source = Some(id.clone());
            self.current_position = self.clamp(self.current_position);
        }
    }

    fn on_error(&mut self, id: &StreamId, info: String) {
        log::warn!("[{}] Stream failed: {}", id, info);
        self.health.insert(id.clone(), StreamHealth::Failed(info));
        self.tracker.mark_errored(id);
        if self.pending_restore.as_ref().is_some_and(|(p, _)| p == id) {
            self.pending_restore = None;
        }
        self.check_gate();
    }

    async fn on_stalled(&mut self, id: &StreamId) {
        if !self.machine.is_playing() {
            return;
        }
        if let Some(adapter) = self.adapters.get(id).cloned() {
            log::debug!("[{}] Stalled while playing, retrying", id);
            warn_and_continue!(adapter.play().await, id, "resume after stall");
        }
    }

    // ---- timers ----

    /// When the load failsafe should fire
    pub fn load_deadline(&self) -> Option<Instant> {
        self.tracker.deadline()
    }

    /// Load failsafe: count every stream still pending as loaded
    pub fn expire_loads(&mut self) {
        for id in self.tracker.expire() {
            log::warn!(
                "[{}] No load report within {}ms, counting as loaded",
                id,
                self.settings.load_timeout.as_millis()
            );
        }
        self.check_gate();
    }

    /// Playback watchdog: restart streams that stopped on their own
    pub async fn watchdog_tick(&mut self) {
        if !self.machine.is_playing() {
            return;
        }
        for (id, adapter) in self.attached() {
            if self.is_failed(&id) || !adapter.is_paused() || adapter.is_ended() {
                continue;
            }
            log::debug!("[{}] Paused during playback, resuming", id);
            warn_and_continue!(adapter.play().await, id, "resume playback");
        }
    }

    // ---- state ----

    pub fn phase(&self) -> SessionPhase {
        self.machine.phase()
    }

    pub fn is_playing(&self) -> bool {
        self.machine.is_playing()
    }

    pub fn current_position(&self) -> f64 {
        self.current_position
    }

    pub fn duration(&self) -> f64 {
        self.duration.unwrap_or(0.0)
    }

    #[cfg(test)]
    pub fn last_position(&self, id: &StreamId) -> Option<f64> {
        self.last_positions.get(id).copied()
    }

    pub fn descriptors(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub fn snapshot(&self) -> PlaybackSnapshot {
        let streams = self
            .descriptors
            .iter()
            .map(|d| StreamStatus {
                id: d.id.clone(),
                title: d.title.clone(),
                src: d.src.clone(),
                health: self
                    .health
                    .get(&d.id)
                    .cloned()
                    .unwrap_or(StreamHealth::Unattached),
                last_position: self.last_positions.get(&d.id).copied(),
            })
            .collect();

        PlaybackSnapshot {
            phase: self.phase(),
            current_position: self.current_position(),
            duration: self.duration(),
            is_playing: self.is_playing(),
            expanded: self.focus.expanded().cloned(),
            loaded_count: self.tracker.loaded_count(),
            total_to_load: self.tracker.total_to_load(),
            all_loaded: self.tracker.all_loaded(),
            streams,
        }
    }
}

async fn play_all(attached: &[Attached]) {
    let starts = attached
        .iter()
        .map(|(id, adapter)| async move { (id, adapter.play().await) });
    for (id, result) in join_all(starts).await {
        warn_and_continue!(result, id, "start playback");
    }
}
