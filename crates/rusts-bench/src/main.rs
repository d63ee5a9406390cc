//! CLI entry point for the load generator.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rusts_bench::{
    config::{Config, WorkloadMode},
    run_workload, HttpTransport, UseCase,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "rusts-bench")]
#[command(about = "Data generator and load tester for time series stores")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the dataset and write it (no queries)
    Write {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of write workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Points per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Gzip request bodies
        #[arg(long)]
        gzip: bool,
    },

    /// Run query templates against existing data (no writes)
    Query {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of query workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Stop after this many queries (0 = no limit)
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Combined workload (read + write)
    Benchmark {
        #[command(flatten)]
        common: CommonArgs,

        /// Number of write workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Number of query workers
        #[arg(long)]
        query_workers: Option<usize>,

        /// Points per batch
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Stop after this many queries (0 = follow the writers)
        #[arg(short, long)]
        limit: Option<u64>,

        /// Gzip request bodies
        #[arg(long)]
        gzip: bool,
    },
}

/// Flags shared by every subcommand. Each one overrides the config file.
#[derive(Args)]
struct CommonArgs {
    /// YAML configuration file
    #[arg(short, long, env = "RUSTS_BENCH_CONFIG")]
    config: Option<PathBuf>,

    /// Server URL
    #[arg(short, long)]
    server: Option<String>,

    /// Target database
    #[arg(long)]
    database: Option<String>,

    /// Use case to simulate (vehicle, air_quality, devops, device)
    #[arg(short, long)]
    use_case: Option<UseCase>,

    /// Number of entities to simulate
    #[arg(short, long)]
    entities: Option<u64>,

    /// Random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Wall-clock limit in seconds
    #[arg(short = 'D', long)]
    duration: Option<u64>,

    /// Output file for report (markdown)
    #[arg(short, long)]
    output: Option<String>,

    /// Also output JSON report
    #[arg(long)]
    json: bool,
}

impl CommonArgs {
    fn load(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(server) = &self.server {
            config.server_url = server.clone();
        }
        if let Some(database) = &self.database {
            config.database = database.clone();
        }
        if let Some(use_case) = self.use_case {
            if use_case != config.simulation.use_case {
                // Configured templates name the old use case's tags.
                config.simulation.queries.clear();
            }
            config.simulation.use_case = use_case;
        }
        if let Some(entities) = self.entities {
            config.simulation.entity_count = entities;
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(duration) = self.duration {
            config.duration_secs = duration;
        }
        if self.output.is_some() {
            config.output_file = self.output.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let cli = Cli::parse();

    let (config, mode, json) = match cli.command {
        Commands::Write {
            common,
            workers,
            batch_size,
            gzip,
        } => {
            let mut config = common.load()?;
            if let Some(workers) = workers {
                config.write.workers = workers;
            }
            if let Some(batch_size) = batch_size {
                config.write.batch_size = batch_size;
            }
            config.write.compression.enabled |= gzip;
            (config, WorkloadMode::WriteOnly, common.json)
        }

        Commands::Query {
            common,
            workers,
            limit,
        } => {
            let mut config = common.load()?;
            if let Some(workers) = workers {
                config.query.workers = workers;
            }
            if let Some(limit) = limit {
                config.query.limit = limit;
            }
            (config, WorkloadMode::QueryOnly, common.json)
        }

        Commands::Benchmark {
            common,
            workers,
            query_workers,
            batch_size,
            limit,
            gzip,
        } => {
            let mut config = common.load()?;
            if let Some(workers) = workers {
                config.write.workers = workers;
            }
            if let Some(query_workers) = query_workers {
                config.query.workers = query_workers;
            }
            if let Some(batch_size) = batch_size {
                config.write.batch_size = batch_size;
            }
            if let Some(limit) = limit {
                config.query.limit = limit;
            }
            config.write.compression.enabled |= gzip;
            (config, WorkloadMode::Benchmark, common.json)
        }
    };

    info!(
        "Target {} (database {}, {:?} queries)",
        config.server_url, config.database, config.query_api
    );
    let transport = Arc::new(HttpTransport::new(
        &config.server_url,
        &config.database,
        config.query_api,
        config.request_timeout(),
    )?);

    let report = run_workload(&config, mode, transport).await?;

    report.print_summary();

    if let Some(output_path) = &config.output_file {
        let (md_path, json_path) = report_paths(output_path);

        std::fs::write(&md_path, report.to_markdown())?;
        info!("Markdown report saved to: {}", md_path);

        if json {
            std::fs::write(&json_path, report.to_json())?;
            info!("JSON report saved to: {}", json_path);
        }
    } else if json {
        println!("{}", report.to_json());
    }

    Ok(())
}

/// Markdown and JSON report paths for an `--output` value, with or without `.md`.
fn report_paths(output: &str) -> (String, String) {
    let stem = output.strip_suffix(".md").unwrap_or(output);
    (format!("{}.md", stem), format!("{}.json", stem))
}
