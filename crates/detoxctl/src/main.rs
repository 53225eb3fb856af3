//! detoxctl - command-line client for detoxd

mod render;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use detox_api::{Command, ResponsePayload, RoutineRequest, UnblockOutcome, UnblockTarget};
use detox_ipc::IpcClient;
use detox_util::{AppName, BlockId, default_socket_path};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use crate::render::{
    countdown_line, render_event, render_outcome, render_processes, render_state, target_label,
};

/// detoxctl - Block apps and the internet through detoxd
#[derive(Parser, Debug)]
#[command(name = "detoxctl")]
#[command(about = "Block apps and the internet through detoxd", long_about = None)]
struct Cli {
    /// Socket path (or set DETOX_SOCKET env var)
    #[arg(short, long, env = "DETOX_SOCKET")]
    socket: Option<PathBuf>,

    /// Print raw JSON payloads instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Show blocks, routines and pending unblocks
    Status,

    /// List running processes
    Processes,

    /// Block an application
    BlockApp {
        name: String,
        #[arg(short, long)]
        minutes: u64,
    },

    /// Block the internet
    BlockInternet {
        #[arg(short, long)]
        minutes: u64,
    },

    /// Add time to the internet block
    ExtendInternet {
        #[arg(short, long)]
        minutes: u64,
    },

    /// Add a weekly routine
    AddRoutine {
        /// Comma-separated application names
        #[arg(long, value_delimiter = ',', required = true)]
        apps: Vec<String>,
        /// Start time, HH:MM
        #[arg(long)]
        start: String,
        /// End time, HH:MM (at or before start crosses midnight)
        #[arg(long)]
        end: String,
        /// Comma-separated days or presets (weekdays, weekends, all)
        #[arg(long, value_delimiter = ',', required = true)]
        days: Vec<String>,
    },

    /// Delete a routine
    RemoveRoutine { id: String },

    /// Ask for a block to be lifted after the cooling period
    Unblock {
        #[command(subcommand)]
        target: TargetArg,
        /// Follow the countdown; Ctrl-C cancels it
        #[arg(long, global = true)]
        wait: bool,
    },

    /// Cancel pending unblocks (all when no target is given)
    CancelUnblock {
        #[command(subcommand)]
        target: Option<TargetArg>,
    },

    /// Change the cooling period for future unblock requests
    SetCooling {
        #[arg(short, long)]
        minutes: u64,
    },

    /// Stream daemon events
    Watch,
}

#[derive(Subcommand, Debug, Clone)]
enum TargetArg {
    /// An application block
    App { name: String },
    /// The internet block
    Internet,
}

impl From<TargetArg> for UnblockTarget {
    fn from(target: TargetArg) -> Self {
        match target {
            TargetArg::App { name } => UnblockTarget::app(name),
            TargetArg::Internet => UnblockTarget::Internet,
        }
    }
}

fn minutes(m: u64) -> Duration {
    Duration::from_secs(m.saturating_mul(60))
}

fn print_json(payload: &ResponsePayload) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(payload)?);
    Ok(())
}

async fn call(client: &mut IpcClient, command: Command) -> Result<ResponsePayload> {
    client.call(command).await.context("Request failed")
}

async fn run(cli: Cli) -> Result<()> {
    let socket = cli.socket.unwrap_or_else(default_socket_path);
    let mut client = IpcClient::connect(&socket)
        .await
        .with_context(|| format!("Cannot connect to detoxd at {}", socket.display()))?;

    let command = match cli.command {
        Cmd::Status => Command::GetState,
        Cmd::Processes => Command::ListProcesses,
        Cmd::BlockApp { name, minutes: m } => Command::BlockApp {
            name: AppName::new(name),
            duration: minutes(m),
        },
        Cmd::BlockInternet { minutes: m } => Command::BlockInternet {
            duration: minutes(m),
        },
        Cmd::ExtendInternet { minutes: m } => Command::ExtendInternet {
            duration: minutes(m),
        },
        Cmd::AddRoutine {
            apps,
            start,
            end,
            days,
        } => Command::AddRoutine {
            routine: RoutineRequest {
                apps,
                start,
                end,
                days,
            },
        },
        Cmd::RemoveRoutine { id } => {
            let routine_id =
                BlockId::parse(&id).with_context(|| format!("Not a routine id: {}", id))?;
            Command::RemoveRoutine { routine_id }
        }
        Cmd::Unblock { target, wait } => {
            return unblock(client, target.into(), wait, cli.json).await;
        }
        Cmd::CancelUnblock { target } => Command::CancelUnblock {
            target: target.map(Into::into),
        },
        Cmd::SetCooling { minutes: m } => Command::SetCoolingPeriod {
            duration: minutes(m),
        },
        Cmd::Watch => return watch(client, cli.json).await,
    };

    let payload = call(&mut client, command).await?;
    if cli.json {
        return print_json(&payload);
    }

    match payload {
        ResponsePayload::State(state) => print!("{}", render_state(&state)),
        ResponsePayload::Processes { processes, .. } => print!("{}", render_processes(&processes)),
        ResponsePayload::AppBlocked { block } => println!(
            "{} blocked until {}",
            block.name,
            detox_util::format_datetime_full(&block.end_time)
        ),
        ResponsePayload::InternetBlocked { block } => println!(
            "Internet blocked until {}",
            detox_util::format_datetime_full(&block.end_time)
        ),
        ResponsePayload::RoutineAdded { routine } => {
            println!("Routine {} added", routine.routine_id)
        }
        ResponsePayload::RoutineRemoved { routine_id } => {
            println!("Routine {} removed", routine_id)
        }
        ResponsePayload::UnblockCancelled { targets } if targets.is_empty() => {
            println!("No pending unblocks")
        }
        ResponsePayload::UnblockCancelled { targets } => {
            let labels: Vec<String> = targets.iter().map(target_label).collect();
            println!("Cancelled: {}", labels.join(", "));
        }
        ResponsePayload::CoolingPeriodSet { cooling_period } => {
            println!("Cooling period set to {} min", cooling_period.as_secs() / 60)
        }
        other => print_json(&other)?,
    }

    Ok(())
}

async fn unblock(
    mut client: IpcClient,
    target: UnblockTarget,
    wait: bool,
    json: bool,
) -> Result<()> {
    let payload = call(
        &mut client,
        Command::RequestUnblock {
            target: target.clone(),
        },
    )
    .await?;

    let ResponsePayload::Unblock { outcome } = payload else {
        bail!("Unexpected reply: {:?}", payload);
    };

    if json {
        print_json(&ResponsePayload::Unblock {
            outcome: outcome.clone(),
        })?;
    } else {
        println!("{}", render_outcome(&outcome));
    }

    if wait && outcome.countdown().is_some() {
        follow_countdown(&mut client, target).await?;
    }
    Ok(())
}

/// Redraw the countdown every second until it commits; Ctrl-C cancels it
async fn follow_countdown(client: &mut IpcClient, target: UnblockTarget) -> Result<()> {
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                call(client, Command::CancelUnblock { target: Some(target.clone()) }).await?;
                println!();
                println!("Unblock of {} cancelled", target_label(&target));
                return Ok(());
            }
            _ = ticker.tick() => {}
        }

        let ResponsePayload::State(state) = call(client, Command::GetState).await? else {
            bail!("Unexpected reply to state request");
        };

        match state.countdown_for(&target) {
            Some(countdown) => {
                write!(stdout, "\r{}   ", countdown_line(countdown))?;
                stdout.flush()?;
            }
            None => {
                println!();
                let still_blocked = match &target {
                    UnblockTarget::Internet => state.internet_blocked(),
                    UnblockTarget::App { name } => state.app_blocks.iter().any(|b| &b.name == name),
                };
                if still_blocked {
                    println!("Countdown for {} was cancelled", target_label(&target));
                } else {
                    println!("{}", render_outcome(&UnblockOutcome::Committed { target }));
                }
                return Ok(());
            }
        }
    }
}

async fn watch(client: IpcClient, json: bool) -> Result<()> {
    let mut events = client.subscribe().await.context("Subscribe failed")?;
    loop {
        let event = events.next().await.context("Event stream ended")?;
        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            println!("{}", render_event(&event));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    run(Cli::parse()).await
}
