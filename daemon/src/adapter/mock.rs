//! Scripted in-memory adapters for controller tests

use async_trait::async_trait;
use common::{StreamDescriptor, StreamId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{AdapterError, MediaBackend, StreamAdapter, StreamCallbacks};

#[derive(Debug, Default)]
pub struct MockState {
    pub attached: bool,
    pub teardowns: u32,
    pub position: f64,
    pub duration: Option<f64>,
    pub paused: bool,
    pub ended: bool,
    pub playable: bool,
    pub reject_play: bool,
    pub fail_attach: bool,
    pub play_calls: u32,
    pub pause_calls: u32,
    pub seeks: Vec<f64>,
    pub src: String,
    callbacks: Option<StreamCallbacks>,
}

pub struct MockAdapter {
    pub state: Mutex<MockState>,
}

impl MockAdapter {
    fn new(script: &MockScript) -> Self {
        Self {
            state: Mutex::new(MockState {
                paused: true,
                playable: script.playable,
                reject_play: script.reject_play,
                fail_attach: script.fail_attach,
                ..Default::default()
            }),
        }
    }

    fn callbacks(&self) -> StreamCallbacks {
        self.state
            .lock()
            .unwrap()
            .callbacks
            .clone()
            .expect("mock adapter is not attached")
    }

    pub fn emit_ready(&self, duration: f64) {
        self.state.lock().unwrap().duration = Some(duration);
        self.callbacks().ready(duration);
    }

    pub fn emit_error(&self, info: &str) {
        self.callbacks().error(info);
    }

    pub fn emit_stalled(&self) {
        self.callbacks().stalled();
    }

    pub fn emit_load_started(&self) {
        self.callbacks().load_started();
    }

    /// Move the element position and report it, as playback progress would
    pub fn advance_to(&self, position: f64) {
        self.state.lock().unwrap().position = position;
        self.callbacks().position_changed(position);
    }

    pub fn set_paused(&self, paused: bool) {
        self.state.lock().unwrap().paused = paused;
    }

    pub fn position_now(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    pub fn play_calls(&self) -> u32 {
        self.state.lock().unwrap().play_calls
    }

    pub fn pause_calls(&self) -> u32 {
        self.state.lock().unwrap().pause_calls
    }

    pub fn last_seek(&self) -> Option<f64> {
        self.state.lock().unwrap().seeks.last().copied()
    }
}

#[async_trait]
impl StreamAdapter for MockAdapter {
    fn attach(
        &self,
        descriptor: &StreamDescriptor,
        callbacks: StreamCallbacks,
    ) -> Result<(), AdapterError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_attach {
            return Err(AdapterError::Unsupported(descriptor.src.clone()));
        }
        state.attached = true;
        state.src = descriptor.src.clone();
        state.callbacks = Some(callbacks);
        Ok(())
    }

    fn detach(&self) {
        let mut state = self.state.lock().unwrap();
        if state.attached {
            state.attached = false;
            state.teardowns += 1;
            state.callbacks = None;
        }
    }

    async fn play(&self) -> Result<(), AdapterError> {
        let mut state = self.state.lock().unwrap();
        state.play_calls += 1;
        if state.reject_play {
            return Err(AdapterError::PlayRejected("autoplay blocked".to_string()));
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        state.pause_calls += 1;
        state.paused = true;
    }

    fn seek(&self, position: f64) {
        let mut state = self.state.lock().unwrap();
        state.position = position;
        state.seeks.push(position);
    }

    fn position(&self) -> f64 {
        self.state.lock().unwrap().position
    }

    fn duration(&self) -> Option<f64> {
        self.state.lock().unwrap().duration
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn is_ended(&self) -> bool {
        self.state.lock().unwrap().ended
    }

    async fn wait_playable(&self, timeout: Duration) -> bool {
        let playable = self.state.lock().unwrap().playable;
        if !playable {
            tokio::time::sleep(timeout).await;
        }
        playable
    }
}

/// How adapters for one stream id behave
#[derive(Debug, Clone)]
pub struct MockScript {
    pub playable: bool,
    pub reject_play: bool,
    pub fail_attach: bool,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            playable: true,
            reject_play: false,
            fail_attach: false,
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    scripts: Mutex<HashMap<StreamId, MockScript>>,
    created: Mutex<HashMap<StreamId, Vec<Arc<MockAdapter>>>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, id: &str, script: MockScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(StreamId::new(id), script);
    }

    /// Most recently created adapter for `id`
    pub fn adapter(&self, id: &str) -> Arc<MockAdapter> {
        self.created
            .lock()
            .unwrap()
            .get(id)
            .and_then(|all| all.last().cloned())
            .expect("no adapter created for stream")
    }

    pub fn created_count(&self, id: &str) -> usize {
        self.created
            .lock()
            .unwrap()
            .get(id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

impl MediaBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn create(&self, descriptor: &StreamDescriptor) -> Arc<dyn StreamAdapter> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .get(&descriptor.id)
            .cloned()
            .unwrap_or_default();
        let adapter = Arc::new(MockAdapter::new(&script));
        self.created
            .lock()
            .unwrap()
            .entry(descriptor.id.clone())
            .or_default()
            .push(adapter.clone());
        adapter
    }
}
