//! Weekly report job: query, wrap, enqueue.

use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::config::JobConfig;
use crate::db::{self, JobLock, ReportSource};
use crate::envelope::{encode_message, NotificationEnvelope};
use crate::error::{JobError, JobResult};
use crate::models::{JobSummary, ReportWindow, WeeklyCourseReport};
use crate::queue::{AzureQueueClient, QueuePublisher};

/// What to do when a single report fails to publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishPolicy {
    /// Abort the run; reports already enqueued stay enqueued.
    #[default]
    StopOnFirstFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed(JobSummary),
    /// Another run held the job lock; nothing was sent.
    Skipped,
}

pub async fn connect(config: &JobConfig) -> JobResult<PgPool> {
    let options = config.database.connect_options()?;
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Start-of-run line carrying whatever context the trigger supplied.
pub fn announce(trigger: &str) {
    tracing::info!("Timer triggered: {}", trigger);
}

pub async fn run_weekly_job(config: &JobConfig) -> JobResult<JobOutcome> {
    let pool = connect(config).await?;
    let publisher = AzureQueueClient::new(&config.queue)?;
    let mut lock_conn = pool.acquire().await?;

    run_locked(&mut lock_conn, &pool, &publisher, Utc::now()).await
}

/// Holds `lock` for the whole run; a run that cannot take it sends nothing.
pub async fn run_locked(
    lock: &mut dyn JobLock,
    source: &dyn ReportSource,
    publisher: &dyn QueuePublisher,
    now: DateTime<Utc>,
) -> JobResult<JobOutcome> {
    if !lock.try_acquire().await? {
        tracing::warn!("another weekly report run holds the job lock, skipping");
        return Ok(JobOutcome::Skipped);
    }

    let result = query_and_publish(source, publisher, now).await;

    if let Err(err) = lock.release().await {
        tracing::warn!(error = %err, "failed to release weekly report job lock");
    }

    let summary = result?;
    tracing::info!("DONE.");
    Ok(JobOutcome::Completed(summary))
}

async fn query_and_publish(
    source: &dyn ReportSource,
    publisher: &dyn QueuePublisher,
    now: DateTime<Utc>,
) -> JobResult<JobSummary> {
    let window = ReportWindow::trailing_week(now);
    tracing::debug!(start = %window.start, end = %window.end, "querying weekly course activity");

    let reports = source.weekly_reports(&window).await?;
    tracing::debug!(count = reports.len(), "weekly reports computed");

    publish_reports(reports, publisher, PublishPolicy::default(), Utc::now).await
}

/// Envelopes the current window would produce, without enqueueing anything.
pub async fn preview(config: &JobConfig) -> JobResult<Vec<NotificationEnvelope>> {
    let pool = connect(config).await?;
    let window = ReportWindow::trailing_week(Utc::now());
    let reports = db::fetch_weekly_reports(&pool, &window).await?;
    Ok(reports
        .into_iter()
        .map(NotificationEnvelope::for_report)
        .collect())
}

/// Wraps and enqueues each report in order, one at a time.
pub async fn publish_reports(
    reports: Vec<WeeklyCourseReport>,
    publisher: &dyn QueuePublisher,
    policy: PublishPolicy,
    mut clock: impl FnMut() -> DateTime<Utc>,
) -> JobResult<JobSummary> {
    let mut summary = JobSummary::default();
    let mut last_timestamp: Option<DateTime<Utc>> = None;

    for report in reports {
        let course_id = report.course_id;
        let course_title = report.course_title.clone();

        // Wall clock may step backwards; keep timestamps ordered within a run.
        let stamped = match last_timestamp {
            Some(previous) => clock().max(previous),
            None => clock(),
        };
        last_timestamp = Some(stamped);
        let envelope = NotificationEnvelope::at(report, stamped);

        let message = encode_message(&envelope)?;
        match publisher.send_message(&message).await {
            Ok(()) => {
                summary.sent += 1;
                tracing::info!("Sent weekly report for course: {}", course_title);
            }
            Err(source) => match policy {
                PublishPolicy::StopOnFirstFailure => {
                    return Err(JobError::Publish { course_id, source });
                }
            },
        }
    }

    Ok(summary)
}
