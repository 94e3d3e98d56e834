use clap::{Parser, Subcommand};
use norsim::LogConfig;
use norsim_cli::args::DeviceArgs;
use norsim_cli::commands::{info, init, run};
use norsim_cli::telemetry;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "norsim")]
#[command(about = "NOR flash simulator with configurable wear-out faults", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an erased flash image
    Init {
        /// Image file to create
        #[arg(long)]
        path: PathBuf,

        /// Image size in KiB
        #[arg(long, default_value_t = 64)]
        size_kb: u64,
    },
    /// Show the MTD descriptor of the configured device
    Info {
        #[command(flatten)]
        device: DeviceArgs,
    },
    /// Run an operation script against the configured device
    Run {
        script: PathBuf,

        /// Print outcomes and the final report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        device: DeviceArgs,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_telemetry(&LogConfig::from_env()?);

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, size_kb } => init::run(&path, size_kb),
        Commands::Info { device } => info::run(&device),
        Commands::Run {
            script,
            json,
            device,
        } => run::run(&script, &device, json).map(|_| ()),
    }
}
