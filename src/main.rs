use clap::Parser;

use livedir::cli::commands::{init, run, simulate, types, watch};
use livedir::cli::{Cli, Commands};
use livedir::error::{AbortPolicy, EXIT_FAILURE, LiveResult};
use livedir::group::Standalone;
use livedir::{Settings, logging};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        eprintln!("Using default configuration.");
        Settings::default()
    });

    logging::init_with_config(&settings.logging);
    let policy = AbortPolicy::from_config(&settings.errors);

    match cli.command {
        Commands::Init { force } => init::run_init(force),
        Commands::Config => init::run_config(&settings),
        Commands::Types => conclude(&policy, types::run_types()),
        Commands::Run { case } => conclude(&policy, run::run_case(settings, &case)),
        Commands::Watch {
            case,
            interval_ms,
            ticks,
        } => {
            let result = watch::run_watch(settings, &case, interval_ms, ticks).await;
            conclude(&policy, result)
        }
        Commands::Simulate {
            ranks,
            fail_rank,
            case,
        } => {
            let status = conclude(
                &policy,
                simulate::run_simulate(&settings, ranks, fail_rank, case.as_deref()),
            )?;
            if status != 0 {
                std::process::exit(status);
            }
            Ok(())
        }
    }
}

/// Outermost error boundary. In unwind mode the record comes back here and
/// is reported once before exiting.
fn conclude<T>(policy: &AbortPolicy, result: LiveResult<T>) -> anyhow::Result<T> {
    match policy.conclude(result, &Standalone) {
        Ok(value) => Ok(value),
        Err(record) => {
            eprintln!("{}", record.report(true));
            std::process::exit(EXIT_FAILURE)
        }
    }
}
