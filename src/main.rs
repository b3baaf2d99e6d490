use anyhow::Context;
use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use vsim_devices::{IoSubsystem, SimError, SubsystemConfig, monitor, script};

/// Replay a register trace against the emulated device subsystem
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Grow the disk image with zeroes on reads past its end
    #[arg(long, action = clap::ArgAction::SetTrue)]
    auto_extend: bool,

    /// Backing file for the block device (created if missing)
    disk: PathBuf,

    /// Register trace to replay (defaults to stdin)
    script: Option<PathBuf>,
}

fn run(args: Args) -> Result<(), SimError> {
    env_logger::init();

    let trace = match &args.script {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?,
        None => {
            let mut trace = String::new();
            io::stdin()
                .read_to_string(&mut trace)
                .context("Failed to read script from stdin")?;
            trace
        }
    };
    let directives = script::parse_script(&trace)?;
    log::info!("Loaded {} directives", directives.len());

    let config = SubsystemConfig {
        auto_extend: args.auto_extend,
        ..Default::default()
    };
    let mut subsystem = IoSubsystem::new(config)?;
    subsystem.attach_block_device(&args.disk)?;

    script::run_script(&mut subsystem, &directives, &mut io::stdout())?;

    monitor::print_device_state(&subsystem);
    subsystem.detach_block_device();
    Ok(())
}

fn main() {
    match run(Args::parse()) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
