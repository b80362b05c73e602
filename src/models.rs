use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyCourseReport {
    pub course_id: Uuid,
    pub course_title: String,
    pub teacher_name: String,
    pub teacher_email: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub new_enrollments: i64,
    pub completions: i64,
    pub active_students: i64,
    pub feedback_count: i64,
    pub urgent_feedback_count: i64,
    pub average_rating: Option<f64>,
}

/// Half-open activity window `[start, end)` the weekly query aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ReportWindow {
    pub const LENGTH_DAYS: i64 = 7;

    pub fn trailing_week(now: DateTime<Utc>) -> Self {
        Self {
            start: now - Duration::days(Self::LENGTH_DAYS),
            end: now,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobSummary {
    pub sent: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn trailing_week_spans_seven_days_ending_now() {
        let now = Utc.with_ymd_and_hms(2026, 10, 18, 8, 0, 0).unwrap();
        let window = ReportWindow::trailing_week(now);
        assert_eq!(window.end, now);
        assert_eq!(
            window.start,
            Utc.with_ymd_and_hms(2026, 10, 11, 8, 0, 0).unwrap()
        );
    }

    #[test]
    fn report_serializes_with_camel_case_fields() {
        let report = WeeklyCourseReport {
            course_id: Uuid::nil(),
            course_title: "Rust Basics".to_string(),
            teacher_name: "Marina Costa".to_string(),
            teacher_email: "marina@example.com".to_string(),
            period_start: NaiveDate::from_ymd_opt(2026, 10, 11).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            new_enrollments: 4,
            completions: 1,
            active_students: 12,
            feedback_count: 3,
            urgent_feedback_count: 0,
            average_rating: None,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["courseTitle"], "Rust Basics");
        assert_eq!(value["teacherEmail"], "marina@example.com");
        assert_eq!(value["periodStart"], "2026-10-11");
        assert_eq!(value["newEnrollments"], 4);
        assert!(value["averageRating"].is_null());
    }
}
