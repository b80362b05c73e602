use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("environment variable {0} must be set")]
    Missing(&'static str),

    #[error("invalid database url: {0}")]
    InvalidDatabaseUrl(#[source] sqlx::Error),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("invalid queue connection string: {0}")]
    ConnectionString(String),

    #[error("failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to decode message: {0}")]
    Decode(String),

    #[error("queue request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("queue rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("failed to publish weekly report for course {course_id}: {source}")]
    Publish {
        course_id: Uuid,
        #[source]
        source: QueueError,
    },
}

pub type JobResult<T> = Result<T, JobError>;
