use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{current_student, AuthHeader};
use crate::catalog::fetch_lesson;
use crate::err::{proceeds, violates_unique, Error, Payload};
use crate::models::{CertificateData, CompletionData, StudentData};
use crate::progress::lesson_counts;

pub const CERTIFICATE_PREFIX: &str = "SLMS";

/// Retries on collision of the global certificate id. The suffix space is
/// 2^32, so more than one retry is already vanishingly unlikely.
const CERTIFICATE_ID_ATTEMPTS: usize = 4;

/// `SLMS-` followed by 8 uppercase hex characters from the OS entropy source.
/// The id is printed on certificate documents and must stay unguessable.
pub fn generate_certificate_id() -> String {
    let mut suffix = [0u8; 4];
    OsRng.fill_bytes(&mut suffix);
    format!("{}-{}", CERTIFICATE_PREFIX, hex::encode_upper(suffix))
}

/// Atomic get-or-create keyed on (student, course).
///
/// The insert relies on the unique (student_id, course_id) constraint, so two
/// concurrent issuers cannot both create a row: the loser's insert returns
/// nothing and the winner's certificate is fetched instead. A conflict on the
/// global certificate id means the fresh suffix collided with a certificate
/// of some other pair; that is transient and answered by regenerating.
pub async fn issue_certificate(
    student: Uuid,
    course: Uuid,
    pg: &PgPool,
) -> Result<CertificateData, Error> {
    for _ in 0..CERTIFICATE_ID_ATTEMPTS {
        let inserted = sqlx::query_as::<_, CertificateData>(
            "INSERT INTO certificates (uuid, student_id, course_id, certificate_id, issued_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (student_id, course_id) DO NOTHING
             RETURNING *",
        )
        .bind(Uuid::new_v4())
        .bind(student)
        .bind(course)
        .bind(generate_certificate_id())
        .bind(Utc::now())
        .fetch_optional(pg)
        .await;

        match inserted {
            Ok(Some(created)) => {
                log::info!(
                    "issued certificate {} to student {} for course {}",
                    created.certificate_id,
                    student,
                    course
                );
                return Ok(created);
            }
            Ok(None) => {
                // Lost the race: a certificate for this pair already exists.
                let existing = sqlx::query_as::<_, CertificateData>(
                    "SELECT * FROM certificates WHERE student_id = $1 AND course_id = $2 LIMIT 1",
                )
                .bind(student)
                .bind(course)
                .fetch_one(pg)
                .await?;
                return Ok(existing);
            }
            Err(err) if violates_unique(&err, "certificates_certificate_id_key") => {
                log::warn!(
                    "certificate id collision for student {} in course {}, regenerating",
                    student,
                    course
                );
            }
            Err(err) => return Err(Error::from(err)),
        }
    }
    Err(Error::InternalError {
        kind: "CertificateIdCollision",
        message: "Could not generate a unique certificate id!".to_string(),
    })
}

/// Records that `student` finished a lesson and, when that was the last
/// remaining lesson of the course, issues the course certificate.
///
/// Idempotent: a repeated completion returns the existing record untouched
/// and does not re-run the certificate check.
pub async fn record_completion(
    student: &StudentData,
    lesson_id: Uuid,
    pg: &PgPool,
) -> Result<CompletionData, Error> {
    let lesson = fetch_lesson(lesson_id, pg).await?;
    let course_id: Uuid = sqlx::query_scalar("SELECT course_id FROM course_modules WHERE uuid = $1")
        .bind(lesson.module_id)
        .fetch_one(pg)
        .await?;

    let inserted = sqlx::query_as::<_, CompletionData>(
        "INSERT INTO lesson_completions (uuid, student_id, lesson_id, completed_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (student_id, lesson_id) DO NOTHING
         RETURNING *",
    )
    .bind(Uuid::new_v4())
    .bind(student.uuid)
    .bind(lesson.uuid)
    .bind(Utc::now())
    .fetch_optional(pg)
    .await?;

    match inserted {
        Some(created) => {
            let (done, total) = lesson_counts(student.uuid, course_id, pg).await?;
            if total > 0 && done >= total {
                issue_certificate(student.uuid, course_id, pg).await?;
            }
            Ok(created)
        }
        None => {
            // Already recorded earlier; hand back the existing row as-is.
            let existing = sqlx::query_as::<_, CompletionData>(
                "SELECT * FROM lesson_completions WHERE student_id = $1 AND lesson_id = $2 LIMIT 1",
            )
            .bind(student.uuid)
            .bind(lesson.uuid)
            .fetch_one(pg)
            .await?;
            Ok(existing)
        }
    }
}

pub async fn mark_lesson_complete(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<MarkComplete>,
) -> Payload<CompletionData> {
    let caller = current_student(&auth, &pg).await?;
    let completion = record_completion(&caller, body.lesson_id, &pg).await?;
    proceeds(completion)
}

pub async fn list_completions(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<CompletionsList> {
    let caller = current_student(&auth, &pg).await?;
    let completions = sqlx::query_as::<_, CompletionData>(
        "SELECT * FROM lesson_completions WHERE student_id = $1 ORDER BY completed_at, uuid",
    )
    .bind(caller.uuid)
    .fetch_all(&pg)
    .await?;
    proceeds(CompletionsList { completions })
}

pub async fn list_certificates(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<CertificatesList> {
    let caller = current_student(&auth, &pg).await?;
    let certificates = sqlx::query_as::<_, CertificateView>(
        "SELECT c.uuid, c.course_id, c.certificate_id, co.title AS course_name, c.issued_at
         FROM certificates c
         JOIN courses co ON co.uuid = c.course_id
         WHERE c.student_id = $1
         ORDER BY c.issued_at, c.uuid",
    )
    .bind(caller.uuid)
    .fetch_all(&pg)
    .await?;
    proceeds(CertificatesList { certificates })
}

/// Certificate with the course title denormalized for display.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CertificateView {
    pub uuid: Uuid,
    pub course_id: Uuid,
    pub certificate_id: String,
    pub course_name: String,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CertificatesList {
    pub certificates: Vec<CertificateView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionsList {
    pub completions: Vec<CompletionData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarkComplete {
    pub lesson_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_valid_id(id: &str) {
        let suffix = id
            .strip_prefix("SLMS-")
            .unwrap_or_else(|| panic!("bad prefix: {}", id));
        assert_eq!(suffix.len(), 8, "bad suffix length: {}", id);
        assert!(
            suffix
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
            "non-uppercase-hex suffix: {}",
            id
        );
    }

    #[test]
    fn certificate_id_has_expected_format() {
        for _ in 0..100 {
            assert_valid_id(&generate_certificate_id());
        }
    }

    #[test]
    fn certificate_ids_vary() {
        let ids: std::collections::HashSet<String> =
            (0..64).map(|_| generate_certificate_id()).collect();
        // 64 draws from a 2^32 space; a full collapse would mean a broken RNG.
        assert!(ids.len() > 1);
    }
}
