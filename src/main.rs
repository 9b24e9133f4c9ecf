use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use timetable_allocator::allocator::{self, AllocationRequest, AllocatorConfig, Strategy};
use timetable_allocator::model::PreferenceMode;
use timetable_allocator::server;

#[derive(Parser)]
#[command(name = "timetable-allocator", version, about = "Weekly class timetable allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the allocation API over HTTP
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        #[command(flatten)]
        defaults: ConfigArgs,
    },
    /// Run one allocation from a JSON request file and print the result
    Allocate {
        #[arg(long)]
        input: PathBuf,
        #[command(flatten)]
        defaults: ConfigArgs,
    },
}

/// Defaults applied to requests that carry no config of their own.
#[derive(Args)]
struct ConfigArgs {
    #[arg(long, value_enum, default_value_t = Strategy::ExactThenHeuristic)]
    strategy: Strategy,
    #[arg(long, value_enum, default_value_t = PreferenceMode::Soft)]
    preference_mode: PreferenceMode,
    /// Exact solver budget in seconds
    #[arg(long, default_value_t = 10.0)]
    time_limit: f64,
    #[arg(long)]
    no_morning_coverage: bool,
    #[arg(long)]
    no_first_period_rest: bool,
    #[arg(long)]
    no_post_process: bool,
}

impl From<ConfigArgs> for AllocatorConfig {
    fn from(args: ConfigArgs) -> Self {
        AllocatorConfig {
            strategy: args.strategy,
            preference_mode: args.preference_mode,
            time_limit_secs: args.time_limit,
            morning_coverage: !args.no_morning_coverage,
            first_period_rest: !args.no_first_period_rest,
            post_process: !args.no_post_process,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Cli::parse().command {
        Command::Serve { bind, defaults } => {
            let defaults = AllocatorConfig::from(defaults);
            defaults.time_limit().context("invalid --time-limit")?;
            server::run_server(bind, defaults).await
        }
        Command::Allocate { input, defaults } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let request: AllocationRequest = serde_json::from_str(&text)
                .with_context(|| format!("{} is not an allocation request", input.display()))?;
            let defaults = AllocatorConfig::from(defaults);
            let output = tokio::task::spawn_blocking(move || allocator::allocate(&request, &defaults))
                .await
                .context("allocation task failed")??;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}
