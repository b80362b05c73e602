use std::fmt;
use std::str::FromStr;

use sqlx::postgres::PgConnectOptions;

use crate::error::ConfigError;

pub const DB_URL: &str = "DB_URL";
pub const DB_USER: &str = "DB_USER";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const QUEUE_CONNECTION_STRING: &str = "QUEUE_CONNECTION_STRING";
pub const QUEUE_NAME: &str = "QUEUE_NAME";

/// Everything one job invocation needs, read once at process start.
#[derive(Clone, Debug)]
pub struct JobConfig {
    pub database: DatabaseConfig,
    pub queue: QueueConfig,
}

#[derive(Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub user: String,
    pub password: String,
}

#[derive(Clone)]
pub struct QueueConfig {
    pub connection_string: String,
    pub queue_name: String,
}

impl JobConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &'static str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        Ok(Self {
            database: DatabaseConfig {
                url: require(DB_URL)?,
                user: require(DB_USER)?,
                password: require(DB_PASSWORD)?,
            },
            queue: QueueConfig {
                connection_string: require(QUEUE_CONNECTION_STRING)?,
                queue_name: require(QUEUE_NAME)?,
            },
        })
    }
}

impl DatabaseConfig {
    /// Postgres URL with any JDBC prefix removed.
    pub fn postgres_url(&self) -> &str {
        self.url.strip_prefix("jdbc:").unwrap_or(&self.url)
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        let options = PgConnectOptions::from_str(self.postgres_url())
            .map_err(ConfigError::InvalidDatabaseUrl)?;
        Ok(options.username(&self.user).password(&self.password))
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl fmt::Debug for QueueConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueConfig")
            .field("connection_string", &"<redacted>")
            .field("queue_name", &self.queue_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        env(&[
            (DB_URL, "jdbc:postgresql://db.internal:5432/courses"),
            (DB_USER, "reporter"),
            (DB_PASSWORD, "s3cret"),
            (
                QUEUE_CONNECTION_STRING,
                "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5;EndpointSuffix=core.windows.net",
            ),
            (QUEUE_NAME, "weekly-reports"),
        ])
    }

    #[test]
    fn loads_every_variable() {
        let vars = full_env();
        let config = JobConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(config.database.user, "reporter");
        assert_eq!(config.queue.queue_name, "weekly-reports");
    }

    #[test]
    fn missing_variable_is_reported_by_name() {
        let mut vars = full_env();
        vars.remove(QUEUE_NAME);
        let err = JobConfig::from_lookup(|key| vars.get(key).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(QUEUE_NAME)));
    }

    #[test]
    fn blank_variable_counts_as_missing() {
        let mut vars = full_env();
        vars.insert(DB_PASSWORD.to_string(), "   ".to_string());
        let err = JobConfig::from_lookup(|key| vars.get(key).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(DB_PASSWORD)));
    }

    #[test]
    fn jdbc_prefix_is_stripped() {
        let vars = full_env();
        let config = JobConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        assert_eq!(
            config.database.postgres_url(),
            "postgresql://db.internal:5432/courses"
        );
        let options = config.database.connect_options().unwrap();
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_username(), "reporter");
        assert_eq!(options.get_database(), Some("courses"));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let vars = full_env();
        let config = JobConfig::from_lookup(|key| vars.get(key).cloned()).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("AccountKey"));
    }
}
