mod cli;
mod report;
mod workload;

use anyhow::Result;
use clap::Parser;

fn initialize_tracing() {
    use tracing::Level;
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::EnvFilter;

    #[cfg(debug_assertions)]
    const MAX_LEVEL: Level = Level::INFO;
    #[cfg(not(debug_assertions))]
    const MAX_LEVEL: Level = Level::WARN;

    let _result = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::from_level(MAX_LEVEL).into())
                .from_env_lossy(),
        )
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let is_silent = args.silent;
    if !is_silent {
        initialize_tracing();
    }

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if e.is::<cli::Interrupted>() {
                // Conventional status for a run ended by SIGINT.
                std::process::exit(130);
            }
            if is_silent {
                println!("{}", e);
                std::process::exit(1);
            } else {
                Err(e)
            }
        }
    }
}
