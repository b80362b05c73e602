//! Azure Storage Queue publisher.
//!
//! Talks to the queue REST endpoint directly: one `Put Message` request per
//! call, authorized with either the account SharedKey or a SAS token taken
//! from the storage connection string.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Url};
use sha2::Sha256;

use crate::config::QueueConfig;
use crate::error::QueueError;

type HmacSha256 = Hmac<Sha256>;

const STORAGE_API_VERSION: &str = "2021-12-02";
const XML_CONTENT_TYPE: &str = "application/xml";

const DEV_ACCOUNT_NAME: &str = "devstoreaccount1";
const DEV_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
const DEV_QUEUE_ENDPOINT: &str = "http://127.0.0.1:10001/devstoreaccount1";

#[async_trait]
pub trait QueuePublisher: Send + Sync {
    /// Enqueue `text` verbatim as a single message.
    async fn send_message(&self, text: &str) -> Result<(), QueueError>;
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    SharedKey { account: String, key: Vec<u8> },
    Sas(String),
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .finish_non_exhaustive(),
            Credential::Sas(_) => f.write_str("Sas(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConnectionString {
    pub queue_endpoint: String,
    pub credential: Credential,
}

impl StorageConnectionString {
    pub fn parse(raw: &str) -> Result<Self, QueueError> {
        let mut protocol = "https";
        let mut account_name = None;
        let mut account_key = None;
        let mut endpoint_suffix = "core.windows.net";
        let mut queue_endpoint = None;
        let mut sas = None;
        let mut development = false;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                QueueError::ConnectionString(format!("segment without '=': {part}"))
            })?;
            match key {
                "DefaultEndpointsProtocol" => protocol = value,
                "AccountName" => account_name = Some(value),
                "AccountKey" => account_key = Some(value),
                "EndpointSuffix" => endpoint_suffix = value,
                "QueueEndpoint" => queue_endpoint = Some(value.trim_end_matches('/').to_string()),
                "SharedAccessSignature" => sas = Some(value.trim_start_matches('?').to_string()),
                "UseDevelopmentStorage" => development = value.eq_ignore_ascii_case("true"),
                _ => {}
            }
        }

        if development {
            account_name = account_name.or(Some(DEV_ACCOUNT_NAME));
            account_key = account_key.or(Some(DEV_ACCOUNT_KEY));
            queue_endpoint = queue_endpoint.or_else(|| Some(DEV_QUEUE_ENDPOINT.to_string()));
        }

        let queue_endpoint = match (queue_endpoint, account_name) {
            (Some(endpoint), _) => endpoint,
            (None, Some(account)) => format!("{protocol}://{account}.queue.{endpoint_suffix}"),
            (None, None) => {
                return Err(QueueError::ConnectionString(
                    "either AccountName or QueueEndpoint is required".to_string(),
                ))
            }
        };

        let credential = match (account_name, account_key, sas) {
            (Some(account), Some(key), _) => Credential::SharedKey {
                account: account.to_string(),
                key: STANDARD.decode(key).map_err(|e| {
                    QueueError::ConnectionString(format!("AccountKey is not base64: {e}"))
                })?,
            },
            (_, _, Some(token)) => Credential::Sas(token),
            _ => {
                return Err(QueueError::ConnectionString(
                    "either AccountKey or SharedAccessSignature is required".to_string(),
                ))
            }
        };

        Ok(Self {
            queue_endpoint,
            credential,
        })
    }
}

pub struct AzureQueueClient {
    http: Client,
    messages_url: Url,
    credential: Credential,
}

impl AzureQueueClient {
    pub fn new(config: &QueueConfig) -> Result<Self, QueueError> {
        let connection = StorageConnectionString::parse(&config.connection_string)?;
        let mut messages_url = Url::parse(&format!(
            "{}/{}/messages",
            connection.queue_endpoint, config.queue_name
        ))
        .map_err(|e| QueueError::ConnectionString(format!("invalid queue endpoint: {e}")))?;

        if let Credential::Sas(token) = &connection.credential {
            messages_url.set_query(Some(token.as_str()));
        }

        Ok(Self {
            http: Client::builder().build()?,
            messages_url,
            credential: connection.credential,
        })
    }
}

#[async_trait]
impl QueuePublisher for AzureQueueClient {
    async fn send_message(&self, text: &str) -> Result<(), QueueError> {
        let body = format!(
            "<QueueMessage><MessageText>{}</MessageText></QueueMessage>",
            escape_xml(text)
        );
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();

        let mut request = self
            .http
            .post(self.messages_url.clone())
            .header(CONTENT_TYPE, XML_CONTENT_TYPE)
            .header("x-ms-date", &date)
            .header("x-ms-version", STORAGE_API_VERSION);

        if let Credential::SharedKey { account, key } = &self.credential {
            let canonical = string_to_sign(
                "POST",
                body.len(),
                XML_CONTENT_TYPE,
                &[("x-ms-date", date.as_str()), ("x-ms-version", STORAGE_API_VERSION)],
                &format!("/{}{}", account, self.messages_url.path()),
            );
            let signature = sign(key, &canonical)?;
            request = request.header(AUTHORIZATION, format!("SharedKey {account}:{signature}"));
        }

        let response = request.body(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(QueueError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(status = status.as_u16(), "queue accepted message");
        Ok(())
    }
}

/// SharedKey string-to-sign for a request with no conditional or range headers.
/// `ms_headers` must already be lowercase and sorted by name.
pub fn string_to_sign(
    method: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(&str, &str)],
    canonical_resource: &str,
) -> String {
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    let headers: String = ms_headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}\n"))
        .collect();

    format!(
        "{method}\n\n\n{length}\n\n{content_type}\n\n\n\n\n\n\n{headers}{canonical_resource}"
    )
}

pub fn sign(key: &[u8], string_to_sign: &str) -> Result<String, QueueError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| QueueError::ConnectionString(format!("unusable AccountKey: {e}")))?;
    mac.update(string_to_sign.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_account_key_connection_string() {
        let parsed = StorageConnectionString::parse(
            "DefaultEndpointsProtocol=https;AccountName=fiapreports;AccountKey=a2V5;EndpointSuffix=core.windows.net",
        )
        .unwrap();
        assert_eq!(
            parsed.queue_endpoint,
            "https://fiapreports.queue.core.windows.net"
        );
        assert_eq!(
            parsed.credential,
            Credential::SharedKey {
                account: "fiapreports".to_string(),
                key: b"key".to_vec(),
            }
        );
    }

    #[test]
    fn development_storage_points_at_azurite() {
        let parsed = StorageConnectionString::parse("UseDevelopmentStorage=true").unwrap();
        assert_eq!(parsed.queue_endpoint, DEV_QUEUE_ENDPOINT);
        assert!(matches!(
            parsed.credential,
            Credential::SharedKey { ref account, .. } if account == DEV_ACCOUNT_NAME
        ));
    }

    #[test]
    fn sas_connection_string_uses_explicit_endpoint() {
        let parsed = StorageConnectionString::parse(
            "QueueEndpoint=https://acct.queue.core.windows.net/;SharedAccessSignature=?sv=2021-12-02&sig=abc",
        )
        .unwrap();
        assert_eq!(parsed.queue_endpoint, "https://acct.queue.core.windows.net");
        assert_eq!(
            parsed.credential,
            Credential::Sas("sv=2021-12-02&sig=abc".to_string())
        );
    }

    #[test]
    fn rejects_connection_string_without_credentials() {
        let err = StorageConnectionString::parse("AccountName=acct").unwrap_err();
        assert!(matches!(err, QueueError::ConnectionString(_)));
    }

    #[test]
    fn sas_token_lands_in_message_url() {
        let client = AzureQueueClient::new(&QueueConfig {
            connection_string:
                "QueueEndpoint=https://acct.queue.core.windows.net;SharedAccessSignature=sv=1&sig=x"
                    .to_string(),
            queue_name: "weekly-reports".to_string(),
        })
        .unwrap();
        assert_eq!(
            client.messages_url.as_str(),
            "https://acct.queue.core.windows.net/weekly-reports/messages?sv=1&sig=x"
        );
    }

    #[test]
    fn shared_key_signature_matches_reference() {
        let canonical = string_to_sign(
            "POST",
            64,
            XML_CONTENT_TYPE,
            &[
                ("x-ms-date", "Sun, 18 Oct 2026 08:00:00 GMT"),
                ("x-ms-version", STORAGE_API_VERSION),
            ],
            "/devstoreaccount1/devstoreaccount1/weekly-reports/messages",
        );
        let key = STANDARD.decode(DEV_ACCOUNT_KEY).unwrap();
        assert_eq!(
            sign(&key, &canonical).unwrap(),
            "/e0dPwg7XSQXyDy6nceEmKmS8nM78DTZdq+aL4Oq+RY="
        );
    }

    #[test]
    fn empty_body_leaves_content_length_blank() {
        let canonical = string_to_sign("GET", 0, "", &[], "/acct/q");
        assert!(canonical.starts_with("GET\n\n\n\n\n\n"));
    }
}
