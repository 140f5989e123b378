use anyhow::Result;
use clap::Parser;
use tracing::info;

use delayed_job::{QueueAdapter, RedisBackend};
use delayed_job_worker::{commands, logging, register_demo_jobs, signals, Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_tracing(&cli.log_level)?;

    let backend = RedisBackend::connect(&cli.server).await?;
    let adapter = QueueAdapter::with_config(backend, cli.command.worker_config());

    match cli.command {
        Command::Work { .. } => {
            let stop = signals::shutdown_signal()?;
            register_demo_jobs(&adapter).await?;
            info!("Connected to {}", cli.server);
            commands::work(&adapter, async move {
                let signal = stop.await;
                info!("Received {}, finishing running jobs", signal);
            })
            .await
        }
        command => {
            let mut stdout = std::io::stdout().lock();
            commands::execute(&adapter, command, &mut stdout).await
        }
    }
}
