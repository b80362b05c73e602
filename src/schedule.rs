//! In-process weekly trigger for hosts without an external scheduler.

use anyhow::Context;
use chrono::{DateTime, Utc};
use croner::Cron;

use crate::config::JobConfig;
use crate::job::{self, JobOutcome};

/// Sunday 08:00 UTC, seconds field included.
pub const DEFAULT_SCHEDULE: &str = "0 0 8 * * 0";

pub fn parse_schedule(expression: &str) -> anyhow::Result<Cron> {
    Cron::new(expression)
        .with_seconds_required()
        .parse()
        .with_context(|| format!("invalid cron expression: {expression}"))
}

pub fn next_fire(cron: &Cron, after: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    cron.find_next_occurrence(&after, false)
        .context("cron expression has no upcoming occurrence")
}

/// Runs the job on every tick of `expression` until ctrl-c.
///
/// A failed run is logged and the loop waits for the next tick; the queue
/// already holds whatever was sent before the failure.
pub async fn run_forever(config: &JobConfig, expression: &str) -> anyhow::Result<()> {
    let cron = parse_schedule(expression)?;

    loop {
        let now = Utc::now();
        let fire_at = next_fire(&cron, now)?;
        let wait = (fire_at - now).to_std().unwrap_or_default();
        tracing::info!(next_run = %fire_at, "waiting for next weekly report run");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown requested, stopping scheduler");
                return Ok(());
            }
        }

        job::announce(&format!("schedule={expression} scheduled_for={fire_at}"));
        match job::run_weekly_job(config).await {
            Ok(JobOutcome::Completed(summary)) => {
                tracing::debug!(sent = summary.sent, "weekly report run finished");
            }
            Ok(JobOutcome::Skipped) => {}
            Err(err) => tracing::error!(error = %err, "weekly report run failed"),
        }
    }
}
