use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{PgConnection, PgPool, Postgres, Row};
use uuid::Uuid;

use crate::models::{ReportWindow, WeeklyCourseReport};

/// Advisory lock key held for the duration of one job run.
pub const JOB_LOCK_KEY: i64 = 0x7765_656b_6c79;

#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn weekly_reports(
        &self,
        window: &ReportWindow,
    ) -> Result<Vec<WeeklyCourseReport>, sqlx::Error>;
}

/// Mutual exclusion between overlapping job runs.
#[async_trait]
pub trait JobLock: Send {
    async fn try_acquire(&mut self) -> Result<bool, sqlx::Error>;
    async fn release(&mut self) -> Result<bool, sqlx::Error>;
}

#[async_trait]
impl ReportSource for PgPool {
    async fn weekly_reports(
        &self,
        window: &ReportWindow,
    ) -> Result<Vec<WeeklyCourseReport>, sqlx::Error> {
        fetch_weekly_reports(self, window).await
    }
}

#[async_trait]
impl JobLock for PoolConnection<Postgres> {
    async fn try_acquire(&mut self) -> Result<bool, sqlx::Error> {
        try_acquire_job_lock(self).await
    }

    async fn release(&mut self) -> Result<bool, sqlx::Error> {
        release_job_lock(self).await
    }
}

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let teachers = vec![
        (
            Uuid::parse_str("9b8e3c1a-6f2d-4c7e-a1b0-3d5f7e9a2c41")?,
            "Marina Costa",
            "marina.costa@fiap.com.br",
        ),
        (
            Uuid::parse_str("2f4a6c8e-0b1d-4e3f-9a5c-7b9d1f3e5a60")?,
            "Paulo Mendes",
            "paulo.mendes@fiap.com.br",
        ),
    ];

    for (id, name, email) in &teachers {
        sqlx::query(
            r#"
            INSERT INTO course_reports.teachers (id, full_name, email)
            VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET full_name = EXCLUDED.full_name
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        (
            Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000001")?,
            teachers[0].0,
            "RUST-101",
            "Rust Fundamentals",
            true,
        ),
        (
            Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000002")?,
            teachers[1].0,
            "ARCH-201",
            "Software Architecture",
            true,
        ),
        (
            Uuid::parse_str("1a2b3c4d-0000-4000-8000-000000000003")?,
            teachers[1].0,
            "LEG-001",
            "Legacy Systems (archived)",
            false,
        ),
    ];

    for (id, teacher_id, code, title, active) in &courses {
        sqlx::query(
            r#"
            INSERT INTO course_reports.courses (id, teacher_id, code, title, active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (code) DO UPDATE
            SET title = EXCLUDED.title, active = EXCLUDED.active
            "#,
        )
        .bind(id)
        .bind(teacher_id)
        .bind(code)
        .bind(title)
        .bind(active)
        .execute(pool)
        .await?;
    }

    let now = Utc::now();
    let enrollments = vec![
        (courses[0].0, "ana.lima@alunos.fiap.com.br", 3, None, Some(1)),
        (courses[0].0, "bruno.rocha@alunos.fiap.com.br", 20, Some(2), Some(2)),
        (courses[1].0, "carla.souza@alunos.fiap.com.br", 40, None, Some(4)),
        (courses[1].0, "diego.alves@alunos.fiap.com.br", 1, None, None),
        (courses[2].0, "eva.nunes@alunos.fiap.com.br", 2, None, Some(1)),
    ];

    for (course_id, student, enrolled_days_ago, completed_days_ago, active_days_ago) in enrollments
    {
        sqlx::query(
            r#"
            INSERT INTO course_reports.enrollments
            (id, course_id, student_email, enrolled_at, completed_at, last_activity_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (course_id, student_email) DO UPDATE
            SET enrolled_at = EXCLUDED.enrolled_at,
                completed_at = EXCLUDED.completed_at,
                last_activity_at = EXCLUDED.last_activity_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(student)
        .bind(now - Duration::days(enrolled_days_ago))
        .bind(completed_days_ago.map(|days: i64| now - Duration::days(days)))
        .bind(active_days_ago.map(|days: i64| now - Duration::days(days)))
        .execute(pool)
        .await?;
    }

    let feedback = vec![
        ("seed-fb-001", courses[0].0, 9_i16, false, "Great pacing on ownership"),
        ("seed-fb-002", courses[0].0, 7, false, "More exercises on lifetimes"),
        ("seed-fb-003", courses[1].0, 3, true, "Recorded lecture audio is broken"),
    ];

    for (source_key, course_id, rating, urgent, comment) in feedback {
        sqlx::query(
            r#"
            INSERT INTO course_reports.feedback
            (id, course_id, rating, urgent, comment, source_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (source_key) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(course_id)
        .bind(rating)
        .bind(urgent)
        .bind(comment)
        .bind(source_key)
        .bind(now - Duration::days(1))
        .execute(pool)
        .await?;
    }

    Ok(())
}

/// One row per active course with any enrollment, completion, student
/// activity or feedback inside `window`, ordered by course id.
pub async fn fetch_weekly_reports(
    pool: &PgPool,
    window: &ReportWindow,
) -> Result<Vec<WeeklyCourseReport>, sqlx::Error> {
    let records = sqlx::query(
        r#"
        WITH enrollment_stats AS (
            SELECT e.course_id,
                   COUNT(*) FILTER (WHERE e.enrolled_at >= $1 AND e.enrolled_at < $2) AS new_enrollments,
                   COUNT(*) FILTER (WHERE e.completed_at >= $1 AND e.completed_at < $2) AS completions,
                   COUNT(DISTINCT e.student_email)
                       FILTER (WHERE e.last_activity_at >= $1 AND e.last_activity_at < $2) AS active_students
            FROM course_reports.enrollments e
            GROUP BY e.course_id
        ),
        feedback_stats AS (
            SELECT f.course_id,
                   COUNT(*) AS feedback_count,
                   COUNT(*) FILTER (WHERE f.urgent) AS urgent_feedback_count,
                   AVG(f.rating)::float8 AS average_rating
            FROM course_reports.feedback f
            WHERE f.created_at >= $1 AND f.created_at < $2
            GROUP BY f.course_id
        )
        SELECT c.id AS course_id,
               c.title AS course_title,
               t.full_name AS teacher_name,
               t.email AS teacher_email,
               COALESCE(es.new_enrollments, 0) AS new_enrollments,
               COALESCE(es.completions, 0) AS completions,
               COALESCE(es.active_students, 0) AS active_students,
               COALESCE(fs.feedback_count, 0) AS feedback_count,
               COALESCE(fs.urgent_feedback_count, 0) AS urgent_feedback_count,
               fs.average_rating
        FROM course_reports.courses c
        JOIN course_reports.teachers t ON t.id = c.teacher_id
        LEFT JOIN enrollment_stats es ON es.course_id = c.id
        LEFT JOIN feedback_stats fs ON fs.course_id = c.id
        WHERE c.active
          AND COALESCE(es.new_enrollments, 0) + COALESCE(es.completions, 0)
              + COALESCE(es.active_students, 0) + COALESCE(fs.feedback_count, 0) > 0
        ORDER BY c.id
        "#,
    )
    .bind(window.start)
    .bind(window.end)
    .fetch_all(pool)
    .await?;

    let period_start = window.start.date_naive();
    let period_end = window.end.date_naive();
    let mut reports = Vec::with_capacity(records.len());

    for row in records {
        reports.push(WeeklyCourseReport {
            course_id: row.try_get("course_id")?,
            course_title: row.try_get("course_title")?,
            teacher_name: row.try_get("teacher_name")?,
            teacher_email: row.try_get("teacher_email")?,
            period_start,
            period_end,
            new_enrollments: row.try_get("new_enrollments")?,
            completions: row.try_get("completions")?,
            active_students: row.try_get("active_students")?,
            feedback_count: row.try_get("feedback_count")?,
            urgent_feedback_count: row.try_get("urgent_feedback_count")?,
            average_rating: row.try_get("average_rating")?,
        });
    }

    Ok(reports)
}

pub async fn try_acquire_job_lock(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
        .bind(JOB_LOCK_KEY)
        .fetch_one(conn)
        .await
}

pub async fn release_job_lock(conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
        .bind(JOB_LOCK_KEY)
        .fetch_one(conn)
        .await
}
