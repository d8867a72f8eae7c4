//! `queue-engine-demo`: a small CLI that drives the engine the way a host
//! page would, against an in-memory `SiteAdapter` stub instead of a real
//! browser tab.
//!
//! Scaffolding for exercising the library from a terminal, not a product
//! surface: a browser extension's actual UI lives outside this crate
//! entirely (see `site::SiteAdapter`).
//!
//! Commands:
//! - `run --prompt <t> [--prompt <t> ...] [--unit <min|sec>] [--amount <n>] [--randomize-percent <pct>]`
//!   - enqueue one or more prompts, start the scheduler, and print each
//!     dispatch as it happens, blocking until the queue finishes
//! - `status` - print a one-shot snapshot of the store's active profile

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use queue_engine::config::store::ConfigStore;
use queue_engine::config::{DelayUnit, Profile};
use queue_engine::queue::automation::NoopAutomation;
use queue_engine::queue::scheduler::{start_scheduler, DelayParams, SchedulerEvent};
use queue_engine::queue::QueueItem;
use queue_engine::site::{DispatchOutcome, SiteAdapter};

#[derive(Parser)]
#[command(name = "queue-engine-demo")]
#[command(about = "Drives the prompt queue & dispatch engine from the command line")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory the demo's ConfigStore persists its active profile under.
    #[arg(long, default_value = "./queue-engine-data", global = true)]
    data_dir: String,

    /// Verbose logging (-v, -vv for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the active profile's queue settings.
    Status,
    /// Run the scheduler against a handful of demo prompts and print each
    /// dispatch as it happens.
    Run {
        /// Prompts to enqueue, one per flag.
        #[arg(long = "prompt", required = true)]
        prompts: Vec<String>,

        /// Delay unit for the dispatch timer.
        #[arg(long, value_enum, default_value = "sec")]
        unit: UnitArg,

        /// Delay amount, in `unit`s.
        #[arg(long, default_value_t = 5)]
        amount: u32,

        /// Randomize percent (0 disables jitter).
        #[arg(long, default_value_t = 0)]
        randomize_percent: u32,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum UnitArg {
    Min,
    Sec,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let store = ConfigStore::open(&cli.data_dir)
        .await
        .context("opening queue-engine data directory")?;

    match cli.command {
        Commands::Status => {
            let profile = store.get_config().await?;
            print_status(&profile);
        }
        Commands::Run {
            prompts,
            unit,
            amount,
            randomize_percent,
        } => {
            let mut profile = store.get_config().await?;
            profile.queue_delay_unit = match unit {
                UnitArg::Min => DelayUnit::Min,
                UnitArg::Sec => DelayUnit::Sec,
            };
            match profile.queue_delay_unit {
                DelayUnit::Min => profile.queue_delay_minutes = amount,
                DelayUnit::Sec => profile.queue_delay_seconds = amount,
            }
            profile.queue_randomize_enabled = randomize_percent > 0;
            profile.queue_randomize_percent = randomize_percent;
            let profile = profile.normalized();

            let delay_params = DelayParams {
                base_ms: profile.base_delay_ms(),
                randomize_enabled: profile.queue_randomize_enabled,
                randomize_percent: profile.queue_randomize_percent,
            };

            let adapter: Arc<dyn SiteAdapter> = Arc::new(PrintingAdapter);
            let (handle, mut events) = start_scheduler(delay_params, adapter, Arc::new(NoopAutomation));

            for (i, text) in prompts.iter().enumerate() {
                let icon = if i == 0 { "✨" } else { "➡" };
                if let Err(e) = handle.enqueue(QueueItem::new(icon, text.clone(), true)).await {
                    println!("queue is full, dropping prompt {i}: {e}");
                }
            }
            info!("starting scheduler with {} item(s)", prompts.len());
            handle.start();

            loop {
                match events.recv().await {
                    Ok(SchedulerEvent::Dispatched { text, .. }) => println!("dispatched: {text}"),
                    Ok(SchedulerEvent::Toast(message)) => {
                        println!("error: {message}");
                        break;
                    }
                    Ok(SchedulerEvent::Finished) => {
                        println!("queue finished");
                        break;
                    }
                    Err(_) => break,
                }
            }
        }
    }

    Ok(())
}

fn print_status(profile: &Profile) {
    println!("active profile: {}", profile.name);
    println!("queue mode enabled: {}", profile.enable_queue_mode);
    println!(
        "delay: {} {:?}, randomize: {} ({}%)",
        match profile.queue_delay_unit {
            DelayUnit::Min => profile.queue_delay_minutes,
            DelayUnit::Sec => profile.queue_delay_seconds,
        },
        profile.queue_delay_unit,
        profile.queue_randomize_enabled,
        profile.queue_randomize_percent,
    );
}

/// A `SiteAdapter` that just prints what it would have sent, for a terminal
/// with no page to inject text into.
struct PrintingAdapter;

#[async_trait::async_trait]
impl SiteAdapter for PrintingAdapter {
    async fn send(&self, text: &str, auto_send: bool) -> DispatchOutcome {
        println!("[site adapter] send({text:?}, auto_send={auto_send})");
        DispatchOutcome::Sent
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new().filter_level(level).format_timestamp_millis().init();
}
