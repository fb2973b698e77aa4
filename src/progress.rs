use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{current_student, AuthHeader};
use crate::catalog::{fetch_course, load_course_view, CourseView};
use crate::err::{proceeds, violates_unique, Error, Payload};
use crate::models::{EnrollmentData, StudentData};

/// Completed/total lesson counts for one student in one course.
pub async fn lesson_counts(
    student: Uuid,
    course: Uuid,
    pg: &PgPool,
) -> Result<(i64, i64), Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lessons l \
         JOIN course_modules m ON l.module_id = m.uuid \
         WHERE m.course_id = $1",
    )
    .bind(course)
    .fetch_one(pg)
    .await?;

    let done: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM lesson_completions c \
         JOIN lessons l ON c.lesson_id = l.uuid \
         JOIN course_modules m ON l.module_id = m.uuid \
         WHERE m.course_id = $1 AND c.student_id = $2",
    )
    .bind(course)
    .bind(student)
    .fetch_one(pg)
    .await?;

    Ok((done, total))
}

/// Integer percentage, rounded to nearest; 0 when the course has no lessons.
pub fn percentage(done: i64, total: i64) -> i32 {
    if total <= 0 {
        return 0;
    }
    ((done as f64 / total as f64) * 100.0).round() as i32
}

/// Course progress for a student, as a 0-100 integer.
///
/// Lookup failures degrade to 0 instead of propagating so that enrollment
/// views always render; the underlying error is logged, and 0% therefore
/// does not distinguish "not started" from "could not compute".
pub async fn compute_progress(student: Uuid, course: Uuid, pg: &PgPool) -> i32 {
    match lesson_counts(student, course, pg).await {
        Ok((done, total)) => percentage(done, total),
        Err(err) => {
            log::warn!(
                "progress lookup failed for student {} in course {}: {:?}",
                student,
                course,
                err
            );
            0
        }
    }
}

/// Enrolls `caller` into a course; the (student, course) pair is unique, so a
/// second enrollment surfaces as a Duplicate error instead of a second row.
pub async fn enroll_student(
    caller: &StudentData,
    course_id: Uuid,
    pg: &PgPool,
) -> Result<EnrollmentData, Error> {
    fetch_course(course_id, pg).await?;

    let enrollment = EnrollmentData {
        uuid: Uuid::new_v4(),
        student_id: caller.uuid,
        course_id,
        enrolled_at: Utc::now(),
    };
    let inserted = sqlx::query(
        "INSERT INTO enrollments (uuid, student_id, course_id, enrolled_at)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(enrollment.uuid)
    .bind(enrollment.student_id)
    .bind(enrollment.course_id)
    .bind(enrollment.enrolled_at)
    .execute(pg)
    .await;

    if let Err(err) = inserted {
        if violates_unique(&err, "enrollments_student_course_key") {
            return Err(Error::duplicate(format!(
                "Already enrolled in course `{}`!",
                enrollment.course_id
            )));
        }
        return Err(Error::from(err));
    }

    Ok(enrollment)
}

pub async fn enroll(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateEnrollment>,
) -> Payload<EnrollmentData> {
    let caller = current_student(&auth, &pg).await?;
    proceeds(enroll_student(&caller, body.course_id, &pg).await?)
}

/// Enrollments with derived progress; admins see every student's, everyone
/// else only their own.
pub async fn list_enrollments(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<EnrollmentsList> {
    let caller = current_student(&auth, &pg).await?;
    let enrollments = if caller.role.is_staff() {
        sqlx::query_as::<_, EnrollmentData>("SELECT * FROM enrollments ORDER BY enrolled_at, uuid")
            .fetch_all(&pg)
            .await?
    } else {
        sqlx::query_as::<_, EnrollmentData>(
            "SELECT * FROM enrollments WHERE student_id = $1 ORDER BY enrolled_at, uuid",
        )
        .bind(caller.uuid)
        .fetch_all(&pg)
        .await?
    };

    let mut views = Vec::with_capacity(enrollments.len());
    for enrollment in enrollments {
        let progress_percentage =
            compute_progress(enrollment.student_id, enrollment.course_id, &pg).await;
        let course = fetch_course(enrollment.course_id, &pg).await?;
        views.push(EnrollmentView {
            uuid: enrollment.uuid,
            student_id: enrollment.student_id,
            enrolled_at: enrollment.enrolled_at,
            progress_percentage,
            course: load_course_view(course, &pg).await?,
        });
    }
    proceeds(EnrollmentsList { enrollments: views })
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentView {
    pub uuid: Uuid,
    pub student_id: Uuid,
    pub enrolled_at: chrono::DateTime<Utc>,
    pub progress_percentage: i32,
    pub course: CourseView,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentsList {
    pub enrollments: Vec<EnrollmentView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEnrollment {
    pub course_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_course_is_zero_percent() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(5, 0), 0);
    }

    #[test]
    fn rounds_to_nearest_integer() {
        assert_eq!(percentage(1, 2), 50);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
    }

    #[test]
    fn full_completion_is_exactly_100() {
        assert_eq!(percentage(1, 1), 100);
        assert_eq!(percentage(7, 7), 100);
    }

    #[test]
    fn monotonically_non_decreasing() {
        for total in 1..=20i64 {
            let mut last = 0;
            for done in 0..=total {
                let now = percentage(done, total);
                assert!(now >= last, "{}/{} regressed", done, total);
                last = now;
            }
            assert_eq!(last, 100);
        }
    }
}
