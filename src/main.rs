use anyhow::Context;
use clap::{Parser, Subcommand};

mod config;
mod db;
mod envelope;
mod error;
mod job;
mod models;
mod queue;
mod report;
mod schedule;
mod telemetry;

use config::JobConfig;
use job::JobOutcome;

#[derive(Parser)]
#[command(name = "course-weekly-report")]
#[command(about = "Weekly per-course activity reports for teachers, delivered via queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one weekly report job (for an external cron/timer)
    Run {
        /// Trigger context echoed in the start log line
        #[arg(long, default_value = "manual")]
        trigger: String,
    },
    /// Stay resident and run the job on a cron schedule
    Schedule {
        #[arg(long, default_value = schedule::DEFAULT_SCHEDULE)]
        cron: String,
    },
    /// Print the envelopes a run would send, without enqueueing
    Preview,
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run {
        trigger: "manual".to_string(),
    });
    if let Commands::Run { trigger } = &command {
        job::announce(trigger);
    }
    let config = JobConfig::from_env().context("incomplete job configuration")?;

    match command {
        Commands::Run { .. } => {
            let outcome = job::run_weekly_job(&config)
                .await
                .context("weekly report job failed")?;
            if let JobOutcome::Completed(summary) = outcome {
                tracing::debug!(sent = summary.sent, "weekly report job finished");
            }
        }
        Commands::Schedule { cron } => {
            schedule::run_forever(&config, &cron).await?;
        }
        Commands::Preview => {
            let envelopes = job::preview(&config)
                .await
                .context("failed to compute weekly reports")?;
            print!("{}", report::render_preview(&envelopes)?);
        }
        Commands::InitDb => {
            let pool = job::connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = job::connect(&config).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
    }

    Ok(())
}
