use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use posecheck_core::FacePolicy;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod replay;

#[zbus::proxy(
    interface = "org.freedesktop.PoseCheck1",
    default_service = "org.freedesktop.PoseCheck1",
    default_path = "/org/freedesktop/PoseCheck1"
)]
trait PoseCheck {
    fn start(&self) -> zbus::Result<u64>;
    fn stop(&self) -> zbus::Result<()>;
    fn observe(&self, yaw_angles: &[f64]) -> zbus::Result<bool>;
    fn progress(&self) -> zbus::Result<(bool, f64)>;
    fn status(&self) -> zbus::Result<String>;
}

#[derive(Parser)]
#[command(name = "posecheck", version, about = "Guided head-pose liveness check")]
struct Cli {
    /// Talk to a daemon on the session bus instead of the system bus.
    #[arg(
        long,
        global = true,
        env = "POSECHECK_SESSION_BUS",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    session: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a yaw script through an in-process session (no daemon needed)
    Replay {
        path: PathBuf,
        /// How frames with several faces are handled: single or first
        #[arg(long, default_value = "single")]
        policy: FacePolicy,
    },
    #[command(flatten)]
    Daemon(DaemonCommand),
}

/// Commands sent to a running posecheckd.
#[derive(Subcommand)]
enum DaemonCommand {
    /// Start a liveness session
    Start,
    /// Stop the current session (recording is discarded)
    Stop,
    /// Show daemon and session status
    Status,
    /// Show checkpoint progress
    Progress,
    /// Feed one frame: the yaw angle of each detected face
    Observe {
        #[arg(allow_negative_numbers = true)]
        yaw_angles: Vec<f64>,
    },
}

async fn connect(session: bool) -> Result<PoseCheckProxy<'static>> {
    let conn = if session {
        zbus::Connection::session().await
    } else {
        zbus::Connection::system().await
    }
    .context("failed to connect to D-Bus")?;
    PoseCheckProxy::new(&conn)
        .await
        .context("posecheckd is not reachable; is the daemon running?")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Replay { path, policy } => replay::run(&path, policy),
        Command::Daemon(command) => run_daemon_command(cli.session, command).await,
    }
}

async fn run_daemon_command(session: bool, command: DaemonCommand) -> Result<()> {
    let proxy = connect(session).await?;
    match command {
        DaemonCommand::Start => {
            let generation = proxy.start().await.context("start failed")?;
            println!("Session {generation} started. Turn your head: center, up, left, right.");
        }
        DaemonCommand::Stop => {
            proxy.stop().await.context("stop failed")?;
            println!("Session stopped.");
        }
        DaemonCommand::Status => {
            let raw = proxy.status().await.context("status failed")?;
            let value: serde_json::Value = serde_json::from_str(&raw)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        DaemonCommand::Progress => match proxy.progress().await.context("progress failed")? {
            (true, progress) => println!("{:.0}%", progress * 100.0),
            (false, _) => println!("idle"),
        },
        DaemonCommand::Observe { yaw_angles } => {
            let accepted = proxy
                .observe(&yaw_angles)
                .await
                .context("observe failed")?;
            if !accepted {
                println!("frame dropped (throttled)");
            }
        }
    }

    Ok(())
}
