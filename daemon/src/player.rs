//! Player task: the single owner of the synchronization controller
//!
//! IPC requests, adapter events, the load failsafe and the playback watchdog
//! are all serialized through one `select!` loop, so controller operations
//! never run concurrently.

use common::{Command, ReviewError, Response, StreamDescriptor};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::adapter::{MediaBackend, StreamEvent};
use crate::config::Config;
use crate::session::{self, SourceResolver};
use crate::sync::{SyncController, SyncSettings};

/// A command from an IPC client together with its reply slot
pub struct PlayerRequest {
    pub command: Command,
    pub reply: oneshot::Sender<Response>,
}

pub struct Player {
    controller: SyncController,
    resolver: SourceResolver,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    watchdog: Option<Duration>,
}

impl Player {
    pub fn new(config: &Config, backend: Arc<dyn MediaBackend>, resolver: SourceResolver) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let settings = SyncSettings::from(&config.playback);
        let watchdog = config
            .playback
            .watchdog
            .then(|| config.playback.watchdog_interval());

        Self {
            controller: SyncController::new(settings, backend, events_tx),
            resolver,
            events,
            watchdog,
        }
    }

    pub fn load(&mut self, descriptors: Vec<StreamDescriptor>) -> Result<(), ReviewError> {
        self.controller.load(descriptors)
    }

    /// Serve until `shutdown` flips or every request sender is gone.
    /// All streams are detached on the way out.
    pub async fn run(
        mut self,
        mut requests: mpsc::Receiver<PlayerRequest>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut watchdog = self.watchdog.map(|period| {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        log::info!("Player started");

        loop {
            let deadline = self.controller.load_deadline();

            // Adapter events go before requests so replies see fresh state
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    break;
                }

                Some(event) = self.events.recv() => {
                    self.controller.handle_event(event).await;
                }

                request = requests.recv() => {
                    let Some(request) = request else {
                        break;
                    };
                    let response = self.execute(request.command).await;
                    if request.reply.send(response).is_err() {
                        log::debug!("Client went away before the reply");
                    }
                }

                _ = wait_deadline(deadline) => {
                    self.controller.expire_loads();
                }

                _ = tick(&mut watchdog) => {
                    self.controller.watchdog_tick().await;
                }
            }
        }

        self.controller.shutdown();
        log::info!("Player stopped");
    }

    pub async fn execute(&mut self, command: Command) -> Response {
        log::debug!("Handling command: {:?}", command);

        let result = match command {
            Command::Play => self.controller.play().await,
            Command::Pause => {
                self.controller.pause();
                Ok(())
            }
            Command::TogglePlay => self.controller.toggle_play().await,
            Command::SeekRelative { delta } => {
                self.controller.seek_relative(delta).await;
                Ok(())
            }
            Command::SeekAbsolute { position } => {
                self.controller.seek_absolute(position).await;
                Ok(())
            }
            Command::SeekFraction { fraction } => {
                self.controller.seek_fraction(fraction).await;
                Ok(())
            }
            Command::ProgressClick { offset, width } => {
                self.controller.progress_click(offset, width).await;
                Ok(())
            }
            Command::Skip { direction } => {
                self.controller.skip(direction).await;
                Ok(())
            }
            Command::FrameStep { direction } => {
                self.controller.frame_step(direction).await;
                Ok(())
            }
            Command::Expand { id } => self.controller.expand(&id),
            Command::Collapse => {
                self.controller.collapse();
                Ok(())
            }
            Command::ToggleExpand { id } => self.controller.toggle_expand(&id),
            Command::SetSource { id, src } => {
                let src = self.resolver.resolve(&src);
                self.controller.set_source(&id, &src)
            }
            Command::LoadSession { path } => self.load_session(&path).await,
            Command::Status => return Response::Status(self.controller.snapshot()),
            Command::ListStreams => {
                return Response::Streams(self.controller.descriptors().to_vec());
            }
            Command::Ping => return Response::Pong,
            // Handled by the IPC server
            Command::Kill => Ok(()),
        };

        match result {
            Ok(()) => Response::Ok,
            Err(e) => {
                log::warn!("Command failed: {}", e);
                Response::Error(e)
            }
        }
    }

    async fn load_session(&mut self, path: &str) -> Result<(), ReviewError> {
        let path = Path::new(path);
        if !path.is_absolute() {
            return Err(ReviewError::Config(format!(
                "session path must be absolute: {}",
                path.display()
            )));
        }

        let manifest = session::load_manifest(path)
            .await
            .map_err(|e| ReviewError::Io(format!("{:#}", e)))?;
        if manifest.streams.is_empty() {
            return Err(ReviewError::Stream(format!(
                "session {} has no streams",
                manifest.cohort_id
            )));
        }

        let descriptors = self.resolver.build(&manifest.descriptors());
        self.controller.load(descriptors)
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
