//! Command-line front end
//!
//! `gcodelink stream <file>` streams a program, `send <command>` sends one
//! line or realtime character, `macro <name>` runs a configured macro and
//! `preview <file>` prints the toolpath without touching a machine.

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use gcodelink_communication::{SessionController, SimulatedTransport, TcpTransport, Transport};
use gcodelink_core::{ControllerEvent, Position};
use gcodelink_settings::{default_config_path, Config};
use gcodelink_visualizer::PathBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "gcodelink", version, about = "G-code sender for GRBL controllers")]
pub struct Cli {
    /// Controller address, host[:port]
    #[arg(short, long, global = true)]
    pub address: Option<String>,

    /// Talk to the built-in GRBL simulator
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Configuration file (.toml or .json)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Stream a G-code program
    Stream { file: PathBuf },
    /// Send one command line or realtime character
    Send {
        #[arg(required = true)]
        command: Vec<String>,
    },
    /// Run a macro from the configuration
    Macro { name: String },
    /// Print the toolpath of a G-code program
    Preview {
        file: PathBuf,
        /// Print the toolpath as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Execute a parsed command line
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    if let Commands::Preview { file, json } = &cli.command {
        return preview(file, *json);
    }

    let controller = connect(&cli, &config).await?;
    let result = match &cli.command {
        Commands::Stream { file } => stream(&controller, file).await,
        Commands::Send { command } => send(&controller, &command.join(" ")).await,
        Commands::Macro { name } => match config.machine.find_macro(name) {
            Some(m) => controller.run_macro(m).await.map_err(anyhow::Error::from),
            None => Err(anyhow!("no macro named '{}'", name)),
        },
        Commands::Preview { .. } => Ok(()),
    };
    controller.disconnect().await?;
    result
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from_file(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => match default_config_path() {
            Some(path) => Ok(Config::load_or_default(&path)?),
            None => Ok(Config::default()),
        },
    }
}

async fn connect(cli: &Cli, config: &Config) -> anyhow::Result<SessionController> {
    let simulate = cli.simulate || config.connection.simulate;
    let (transport, default_address): (Arc<dyn Transport>, String) = if simulate {
        (Arc::new(SimulatedTransport::default()), "simulator".to_string())
    } else {
        (Arc::new(TcpTransport::new()), config.connection.address())
    };
    let address = cli.address.clone().unwrap_or(default_address);

    let controller = SessionController::new(transport, config.session.clone());
    controller
        .connect(&address)
        .await
        .with_context(|| format!("connecting to {}", address))?;
    Ok(controller)
}

fn read_program(file: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("reading {}", file.display()))?;
    Ok(text.lines().map(str::to_string).collect())
}

fn preview(file: &Path, json: bool) -> anyhow::Result<()> {
    let lines = read_program(file)?;
    let path = PathBuilder::build(&lines, Position::ZERO);

    if json {
        println!("{}", serde_json::to_string_pretty(&path)?);
        return Ok(());
    }

    let b = path.bounds;
    println!("{} waypoints from {} lines", path.waypoints.len(), lines.len());
    println!("X {:.3} .. {:.3} ({:.3} mm)", b.min_x, b.max_x, b.width());
    println!("Y {:.3} .. {:.3} ({:.3} mm)", b.min_y, b.max_y, b.height());
    Ok(())
}

async fn stream(controller: &SessionController, file: &Path) -> anyhow::Result<()> {
    let lines = read_program(file)?;
    let mut events = controller.subscribe_events();
    let handle = controller.stream_program(lines).await?;

    let printer = tokio::spawn(async move {
        let mut next_decile = 0.0;
        loop {
            match events.recv().await {
                Ok(ControllerEvent::StreamProgress {
                    completed,
                    total,
                    percent,
                }) if percent >= next_decile => {
                    println!("{:>5.1}% ({}/{})", percent, completed, total);
                    next_decile = (percent / 10.0).floor() * 10.0 + 10.0;
                }
                Ok(ControllerEvent::Alarm(code, description)) => {
                    eprintln!("ALARM {}: {}", code, description);
                }
                Ok(ControllerEvent::StreamFinished(_)) | Err(RecvError::Closed) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(_)) => {}
            }
        }
    });

    let report = tokio::select! {
        report = handle.wait() => report,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, cancelling stream");
            handle.cancel();
            handle.wait().await
        }
    };
    let _ = printer.await;

    println!(
        "Stream {} ({}/{} lines, {:.1}%)",
        report.outcome,
        report.completed,
        report.total,
        report.progress()
    );
    if !report.outcome.is_completed() {
        bail!("stream {}", report.outcome);
    }
    info!("Final position {}", controller.current_status().wpos);
    Ok(())
}

async fn send(controller: &SessionController, command: &str) -> anyhow::Result<()> {
    let mut log = controller.subscribe_log();
    controller.send_command(command).await?;

    // Realtime queries are answered asynchronously
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Some(entry) = log.try_recv() {
        println!("{}", entry);
    }

    let status = controller.current_status();
    println!("{} {}", status.state, status.wpos);
    Ok(())
}
