//! Notification envelope wrapping a weekly report for the delivery queue.
//!
//! On the wire a message is the envelope as JSON text, base64-encoded so the
//! queue only ever carries text-safe bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::QueueError;
use crate::models::WeeklyCourseReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    WeeklyReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEnvelope {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub recipient_email: String,
    pub payload: WeeklyCourseReport,
    pub timestamp: DateTime<Utc>,
}

impl NotificationEnvelope {
    /// Wraps `report`, stamped with the current wall-clock time.
    pub fn for_report(report: WeeklyCourseReport) -> Self {
        Self::at(report, Utc::now())
    }

    pub fn at(report: WeeklyCourseReport, timestamp: DateTime<Utc>) -> Self {
        Self {
            message_type: MessageType::WeeklyReport,
            recipient_email: report.teacher_email.clone(),
            payload: report,
            timestamp,
        }
    }
}

pub fn encode_message(envelope: &NotificationEnvelope) -> Result<String, QueueError> {
    let json = serde_json::to_string(envelope)?;
    Ok(STANDARD.encode(json.as_bytes()))
}

pub fn decode_message(text: &str) -> Result<NotificationEnvelope, QueueError> {
    let bytes = STANDARD
        .decode(text.trim())
        .map_err(|e| QueueError::Decode(e.to_string()))?;
    Ok(serde_json::from_slice(&bytes)?)
}
