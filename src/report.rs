use std::fmt::Write;

use crate::envelope::NotificationEnvelope;

/// Human-readable dump of the envelopes a run would enqueue.
pub fn render_preview(envelopes: &[NotificationEnvelope]) -> Result<String, serde_json::Error> {
    let mut output = String::new();

    if envelopes.is_empty() {
        let _ = writeln!(output, "No courses with activity in this window.");
        return Ok(output);
    }

    for envelope in envelopes {
        let report = &envelope.payload;
        let _ = writeln!(
            output,
            "# {} -> {} ({} new, {} completed, {} active, {} feedback)",
            report.course_title,
            envelope.recipient_email,
            report.new_enrollments,
            report.completions,
            report.active_students,
            report.feedback_count
        );
        let _ = writeln!(output, "{}", serde_json::to_string_pretty(envelope)?);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WeeklyCourseReport;
    use chrono::NaiveDate;
    use uuid::Uuid;

    #[test]
    fn empty_preview_says_so() {
        let output = render_preview(&[]).unwrap();
        assert_eq!(output, "No courses with activity in this window.\n");
    }

    #[test]
    fn preview_lists_each_course_with_its_envelope() {
        let report = WeeklyCourseReport {
            course_id: Uuid::from_u128(7),
            course_title: "Rust Fundamentals".to_string(),
            teacher_name: "Marina Costa".to_string(),
            teacher_email: "marina@fiap.com.br".to_string(),
            period_start: NaiveDate::from_ymd_opt(2026, 10, 11).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2026, 10, 18).unwrap(),
            new_enrollments: 2,
            completions: 1,
            active_students: 5,
            feedback_count: 3,
            urgent_feedback_count: 1,
            average_rating: Some(6.0),
        };
        let output = render_preview(&[NotificationEnvelope::for_report(report)]).unwrap();

        assert!(output.starts_with(
            "# Rust Fundamentals -> marina@fiap.com.br (2 new, 1 completed, 5 active, 3 feedback)\n"
        ));
        assert!(output.contains("\"type\": \"WEEKLY_REPORT\""));
    }
}
