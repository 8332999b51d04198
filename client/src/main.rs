use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use common::{Command, Direction, PlaybackSnapshot, Response, StreamHealth, StreamId, format_time};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

#[derive(Parser)]
#[command(name = "camctl")]
#[command(about = "Synchronized multi-camera playback control", long_about = None)]
#[command(version)]
struct Cli {
    /// IPC socket path
    #[arg(long, global = true, env = "CAMSYNC_SOCKET")]
    socket: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start playback on every camera
    Play,

    /// Pause every camera
    Pause,

    /// Play when paused, pause when playing
    Toggle,

    /// Move the shared position by DELTA seconds (negative goes back)
    #[command(allow_negative_numbers = true)]
    Seek { delta: f64 },

    /// Jump to POSITION seconds
    SeekTo { position: f64 },

    /// Jump to a fraction (0.0-1.0) of the recording
    Progress { fraction: f64 },

    /// Simulate a progress bar click
    Click {
        /// Pixels from the left edge of the bar
        #[arg(long)]
        offset: f64,

        /// Width of the bar in pixels
        #[arg(long)]
        width: f64,
    },

    /// Skip by the configured step
    Skip {
        #[arg(value_enum)]
        direction: Step,
    },

    /// Step a single frame
    Step {
        #[arg(value_enum)]
        direction: Step,
    },

    /// Enlarge one camera
    Expand {
        /// Camera id, e.g. TCBSC_back
        id: String,
    },

    /// Return to the grid
    Collapse,

    /// Expand a camera, or collapse it if it is already expanded
    Focus { id: String },

    /// Replace the source of one camera
    Source {
        /// Camera id
        id: String,

        /// Local file path or URL
        src: String,
    },

    /// Load a session manifest JSON file
    Session { path: PathBuf },

    /// Show playback status and per-camera load state
    Status,

    /// List the cameras of the current session
    Streams,

    /// Ping the daemon to check if it's running
    Ping,

    /// Kill the running daemon
    Kill,
}

#[derive(Clone, Copy, ValueEnum)]
enum Step {
    Forward,
    Back,
}

impl From<Step> for Direction {
    fn from(step: Step) -> Self {
        match step {
            Step::Forward => Direction::Forward,
            Step::Back => Direction::Backward,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = match cli.command {
        Commands::Play => Command::Play,
        Commands::Pause => Command::Pause,
        Commands::Toggle => Command::TogglePlay,
        Commands::Seek { delta } => Command::SeekRelative { delta },
        Commands::SeekTo { position } => Command::SeekAbsolute { position },
        Commands::Progress { fraction } => Command::SeekFraction { fraction },
        Commands::Click { offset, width } => Command::ProgressClick { offset, width },
        Commands::Skip { direction } => Command::Skip {
            direction: direction.into(),
        },
        Commands::Step { direction } => Command::FrameStep {
            direction: direction.into(),
        },
        Commands::Expand { id } => Command::Expand {
            id: StreamId::new(id),
        },
        Commands::Collapse => Command::Collapse,
        Commands::Focus { id } => Command::ToggleExpand {
            id: StreamId::new(id),
        },
        Commands::Source { id, src } => Command::SetSource {
            id: StreamId::new(id),
            src: absolute_if_local(&src)?,
        },
        Commands::Session { path } => {
            // The daemon has its own working directory
            let path = std::path::absolute(&path)
                .with_context(|| format!("Invalid session path: {}", path.display()))?;
            Command::LoadSession {
                path: path.to_string_lossy().into_owned(),
            }
        }
        Commands::Status => Command::Status,
        Commands::Streams => Command::ListStreams,
        Commands::Ping => Command::Ping,
        Commands::Kill => Command::Kill,
    };

    let socket_path = cli.socket.unwrap_or_else(common::get_socket_path);

    match send_command(&socket_path, command).await {
        Ok(response) => {
            handle_response(response);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("\nIs the daemon running? Try starting it with: camsyncd");
            std::process::exit(1);
        }
    }
}

/// Relative file sources are resolved here; URLs are sent unchanged
fn absolute_if_local(src: &str) -> Result<String> {
    if src.contains("://") || src.starts_with('~') || !Path::new(src).exists() {
        return Ok(src.to_string());
    }
    let path = std::path::absolute(src).with_context(|| format!("Invalid source path: {}", src))?;
    Ok(path.to_string_lossy().into_owned())
}

async fn send_command(socket_path: &Path, command: Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("Failed to connect to {}", socket_path.display()))?;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    // Send command
    let command_json = serde_json::to_string(&command)?;
    writer.write_all(command_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;

    // Read response
    let mut response_line = String::new();
    reader.read_line(&mut response_line).await?;

    let response: Response = serde_json::from_str(&response_line)?;
    Ok(response)
}

fn handle_response(response: Response) {
    match response {
        Response::Ok => {
            println!("✓ Success");
        }
        Response::Error(e) => {
            eprintln!("✗ Error: {}", e);
            std::process::exit(1);
        }
        Response::Status(status) => print_status(&status),
        Response::Streams(streams) => {
            println!("Cameras:");
            for stream in streams {
                let src = if stream.has_source() {
                    stream.src.as_str()
                } else {
                    "(no source)"
                };
                println!(
                    "  {} - {} [{}] {}",
                    stream.id,
                    stream.title,
                    stream.mount.name(),
                    src
                );
            }
        }
        Response::Pong => {
            println!("✓ Daemon is running");
        }
    }
}

fn print_status(status: &PlaybackSnapshot) {
    println!("Playback Status:");
    println!("  State: {}", status.phase.name());
    println!(
        "  Position: {} / {}",
        format_time(status.current_position),
        format_time(status.duration)
    );
    println!(
        "  Loaded: {}/{}{}",
        status.loaded_count,
        status.total_to_load,
        if status.all_loaded { "" } else { " (loading)" }
    );
    match &status.expanded {
        Some(id) => println!("  Expanded: {}", id),
        None => println!("  View: grid"),
    }
    println!("  Cameras:");
    for stream in &status.streams {
        let health = match &stream.health {
            StreamHealth::Unattached => "no source".to_string(),
            StreamHealth::Pending => "loading".to_string(),
            StreamHealth::Ready => "ready".to_string(),
            StreamHealth::Failed(reason) => format!("failed: {}", reason),
        };
        match stream.last_position {
            Some(pos) => println!("    {} ({}) at {}", stream.id, health, format_time(pos)),
            None => println!("    {} ({})", stream.id, health),
        }
    }
}
