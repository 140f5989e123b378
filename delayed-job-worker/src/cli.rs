use clap::{Parser, Subcommand};

use delayed_job::{CollectionKind, WorkerConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_QUEUE};

#[derive(Debug, Parser)]
#[command(name = "delayed-job", version, about = "Delayed job worker and queue tools")]
pub struct Cli {
    /// Redis server URL
    #[arg(short, long, global = true, env = "DELAYED_JOB_SERVER", default_value = "redis://127.0.0.1:6379")]
    pub server: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, env = "DELAYED_JOB_LOG", default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a worker until interrupted
    Work {
        /// Queue to consume
        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,

        /// Number of jobs run at the same time
        #[arg(long, default_value_t = DEFAULT_MAX_CONCURRENCY)]
        process: usize,

        /// Keep completed jobs in the success collection
        #[arg(long)]
        save: bool,
    },

    /// Put a job into a queue
    Enqueue {
        /// Job type, e.g. `echo`
        class: String,

        /// JSON payload
        #[arg(long, default_value = "{}")]
        data: String,

        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,

        /// Run this many seconds from now
        #[arg(long)]
        delay: Option<u64>,
    },

    /// Print the records of a collection as JSON lines, newest first
    List {
        /// queue, processing, failed or success
        kind: CollectionKind,

        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long, default_value_t = delayed_job::backend::DEFAULT_PAGE_SIZE)]
        limit: usize,
    },

    /// Show collection sizes
    Stats {
        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,
    },

    /// Remove every record of a collection
    Clear {
        kind: CollectionKind,

        #[arg(short, long, default_value = DEFAULT_QUEUE)]
        queue: String,
    },
}

impl Command {
    /// Worker settings for `work`, defaults for everything else
    pub fn worker_config(&self) -> WorkerConfig {
        match self {
            Command::Work { queue, process, save } => WorkerConfig::new(queue.clone())
                .with_max_concurrency(*process)
                .with_save_success(*save),
            _ => WorkerConfig::default(),
        }
    }
}
