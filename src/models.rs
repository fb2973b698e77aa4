use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Instructor,
    Admin,
}

impl UserRole {
    /// Admins play the "staff" role: they see all enrollments and may delete any course.
    pub fn is_staff(self) -> bool {
        matches!(self, UserRole::Admin)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentData {
    pub uuid: Uuid,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

/// Public view of a user, without the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct StudentProfile {
    pub uuid: Uuid,
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub role: UserRole,
    pub bio: String,
    pub created_at: DateTime<Utc>,
}

impl From<StudentData> for StudentProfile {
    fn from(data: StudentData) -> Self {
        Self {
            uuid: data.uuid,
            username: data.username,
            name: data.name,
            surname: data.surname,
            email: data.email,
            role: data.role,
            bio: data.bio,
            created_at: data.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StudentSession {
    pub ssid: String,
    pub belongs_to: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CourseData {
    pub uuid: Uuid,
    pub title: String,
    pub description: String,
    pub category: String,
    pub instructor: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ModuleData {
    pub uuid: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LessonData {
    pub uuid: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub position: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EnrollmentData {
    pub uuid: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub enrolled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AssignmentData {
    pub uuid: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubmissionData {
    pub uuid: Uuid,
    pub assignment_id: Uuid,
    pub student_id: Uuid,
    pub file_url: String,
    pub grade: Option<f64>,
    pub feedback: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizData {
    pub uuid: Uuid,
    pub module_id: Uuid,
    pub title: String,
    pub questions: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct QuizResultData {
    pub uuid: Uuid,
    pub quiz_id: Uuid,
    pub student_id: Uuid,
    pub score: f64,
    pub attempted_at: DateTime<Utc>,
}

/// Record that a student finished a lesson. Never mutated or deleted in
/// normal flow; unique per (student, lesson).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CompletionData {
    pub uuid: Uuid,
    pub student_id: Uuid,
    pub lesson_id: Uuid,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnnouncementData {
    pub uuid: Uuid,
    pub course_id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CommentData {
    pub uuid: Uuid,
    pub lesson_id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Immutable proof of course completion; at most one per (student, course).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CertificateData {
    pub uuid: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub certificate_id: String,
    pub issued_at: DateTime<Utc>,
}
