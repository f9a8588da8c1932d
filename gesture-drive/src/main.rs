//! Gesture drive service binary
//!
//! Reads pose landmark frames, turns them into drive commands and sends them
//! to the vehicle controller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gesture_drive::{
    init_logging, ClassifierConfig, Command, CommandDispatcher, DriveConfig, FrameSource,
    GestureClassifier, GesturePipeline, JsonLinesSource, OperatingMode, PipelineHandle,
    TurnSensitivity,
};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::io::BufReader;
use tokio::net::UdpSocket;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "gesture-drive")]
#[command(version, about = "Drive a vehicle with body-pose gestures", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the vehicle from a landmark frame stream
    Run {
        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Vehicle controller address (overrides config and environment)
        #[arg(short, long)]
        target: Option<SocketAddr>,

        /// Frame stream in JSON lines format ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,

        /// Pace frames by their capture timestamps (for recorded streams)
        #[arg(long)]
        replay: bool,
    },

    /// Print the command for each frame of a recording, without sending
    Classify {
        /// Operating mode to classify under
        #[arg(short, long, value_enum, default_value_t = ModeArg::Full)]
        mode: ModeArg,

        /// Turn sensitivity band
        #[arg(short, long, default_value = "medium")]
        sensitivity: TurnSensitivity,

        /// Frame stream in JSON lines format ("-" for stdin)
        #[arg(short, long, default_value = "-")]
        input: PathBuf,
    },

    /// Receive and log commands, standing in for the vehicle controller
    Listen {
        /// Address to listen on
        #[arg(short, long, default_value = "0.0.0.0:4210")]
        bind: SocketAddr,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Off,
    Full,
    MoveOnly,
}

impl From<ModeArg> for OperatingMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Off => OperatingMode::Off,
            ModeArg::Full => OperatingMode::Full,
            ModeArg::MoveOnly => OperatingMode::MoveOnly,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            target,
            input,
            replay,
        } => run(config, target, input, replay).await,
        Commands::Classify {
            mode,
            sensitivity,
            input,
        } => classify(mode.into(), sensitivity, input).await,
        Commands::Listen { bind } => listen(bind).await,
    }
}

async fn open_source(input: &Path) -> Result<Box<dyn FrameSource>> {
    if input.as_os_str() == "-" {
        info!("Reading frames from stdin");
        return Ok(Box::new(JsonLinesSource::new(BufReader::new(tokio::io::stdin()))));
    }

    let file = tokio::fs::File::open(input)
        .await
        .with_context(|| format!("Failed to open frame stream {}", input.display()))?;
    info!("Reading frames from {}", input.display());
    Ok(Box::new(JsonLinesSource::new(BufReader::new(file))))
}

async fn run(
    config_path: Option<PathBuf>,
    target: Option<SocketAddr>,
    input: PathBuf,
    replay: bool,
) -> Result<()> {
    info!("Starting gesture drive v{}", gesture_drive::VERSION);

    let mut config = match &config_path {
        Some(path) => DriveConfig::from_file(path)?,
        None => DriveConfig::default(),
    };
    config.apply_env()?;
    if let Some(target) = target {
        config.dispatcher.target = target;
    }
    config.validate().context("Invalid configuration")?;

    let grace = config.dispatcher.send_timeout();
    let dispatcher = CommandDispatcher::new(config.dispatcher.clone())?;
    let handle = PipelineHandle::spawn(GesturePipeline::new(
        config.toggle.clone(),
        config.classifier.clone(),
        dispatcher,
    ));

    let mut mode_rx = handle.subscribe_mode();
    tokio::spawn(async move {
        while mode_rx.changed().await.is_ok() {
            let mode = *mode_rx.borrow();
            info!("Operating mode: {}", mode);
        }
    });

    let mut source = open_source(&input).await?;

    loop {
        tokio::select! {
            next = source.next_frame() => {
                let Some(timed) = next? else {
                    info!("Frame stream ended");
                    break;
                };
                if replay {
                    tokio::time::sleep_until(timed.at.into()).await;
                }
                handle.submit(timed.frame, timed.at)?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    let stats = handle.shutdown().await?;

    // Give the last datagrams a chance to leave
    tokio::time::sleep(grace).await;

    info!(
        "Processed {} frames ({} skipped), sent {} commands, {} mode changes, final mode {}",
        stats.frames_processed,
        stats.frames_skipped,
        stats.commands_sent,
        stats.mode_changes,
        stats.mode
    );

    Ok(())
}

async fn classify(mode: OperatingMode, sensitivity: TurnSensitivity, input: PathBuf) -> Result<()> {
    let classifier = GestureClassifier::new(ClassifierConfig {
        turn_sensitivity: sensitivity,
        ..Default::default()
    });

    let mut source = open_source(&input).await?;
    let mut skipped = 0u64;

    while let Some(timed) = source.next_frame().await? {
        match classifier.classify(&timed.frame, mode) {
            Some(command) => println!("{}", command),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        info!("{} frames without landmarks skipped", skipped);
    }

    Ok(())
}

async fn listen(bind: SocketAddr) -> Result<()> {
    let socket = UdpSocket::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening for commands on udp://{}", socket.local_addr()?);

    let mut buf = [0u8; 512];

    loop {
        tokio::select! {
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = received?;
                let payload = String::from_utf8_lossy(&buf[..len]);

                match payload.parse::<Command>() {
                    Ok(command) => info!("{} -> {:?} ({})", peer, payload, describe(&command)),
                    Err(e) => warn!("{} -> {}", peer, e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Listener stopped");
                return Ok(());
            }
        }
    }
}

fn describe(command: &Command) -> &'static str {
    match command {
        Command::Stop => "stop",
        Command::Move(_) => "forward",
        Command::Turn(..) => "turn in place",
        Command::MoveTurn(..) => "forward and turn",
    }
}
