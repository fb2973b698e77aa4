use axum::extract::Path;
use axum::headers::authorization::Bearer;
use axum::headers::Authorization;
use axum::{Extension, Json, TypedHeader};
use chrono::{DateTime, Duration, Utc};
use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::Pbkdf2;
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::err::{proceeds, Error, Payload};
use crate::models::{StudentData, StudentProfile, StudentSession, UserRole};

/// Bearer session token, absent when the client sent no Authorization header.
pub type AuthHeader = Option<TypedHeader<Authorization<Bearer>>>;

/// Resolves the acting student from the bearer token. Core operations take
/// the result explicitly instead of reading any ambient request context.
pub async fn current_student(auth: &AuthHeader, pg: &PgPool) -> Result<StudentData, Error> {
    match auth {
        Some(TypedHeader(Authorization(bearer))) => authenticate(bearer.token(), pg).await,
        None => Err(Error::unauthenticated(
            "Missing `Authorization: Bearer` header!",
        )),
    }
}

pub async fn authenticate(ssid: &str, pg: &PgPool) -> Result<StudentData, Error> {
    if ssid.is_empty() {
        return Err(Error::unauthenticated("Empty session token!"));
    }
    let session =
        sqlx::query_as::<_, StudentSession>("SELECT * FROM user_sessions WHERE ssid = $1 LIMIT 1")
            .bind(ssid)
            .fetch_optional(pg)
            .await?;

    let session = if let Some(session) = session {
        session
    } else {
        return Err(Error::unauthenticated("Invalid session token!"));
    };

    if Utc::now().gt(&session.expires_at) {
        sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(ssid)
            .execute(pg)
            .await?;
        return Err(Error::unauthenticated("Session expired!"));
    }

    let user = sqlx::query_as::<_, StudentData>("SELECT * FROM users WHERE uuid = $1 LIMIT 1")
        .bind(session.belongs_to)
        .fetch_optional(pg)
        .await?;

    user.ok_or_else(|| Error::unauthenticated("Session refers to a deleted user!"))
}

pub async fn register_student(
    Extension(pg): Extension<PgPool>,
    Json(student): Json<CreateStudent>,
) -> Payload<StudentProfile> {
    if student.password.is_empty() {
        return Err(Error::validation("Provided password was empty!"));
    }
    if student.username.is_empty() || student.email.is_empty() {
        return Err(Error::validation(
            "`username` and `email` must not be empty!",
        ));
    }

    let existing = sqlx::query_as::<_, StudentData>(
        "SELECT * FROM users WHERE username = $1 OR email = $2 LIMIT 1",
    )
    .bind(&student.username)
    .bind(&student.email)
    .fetch_optional(&pg)
    .await?;
    if existing.is_some() {
        return Err(Error::duplicate(
            "User with provided email/username already exists!",
        ));
    }

    let user = StudentData {
        uuid: Uuid::new_v4(),
        username: student.username,
        name: student.name,
        surname: student.surname,
        email: student.email,
        password_hash: Pbkdf2
            .hash_password(
                student.password.as_bytes(),
                &SaltString::generate(&mut OsRng),
            )?
            .to_string(),
        role: student.role.unwrap_or(UserRole::Student),
        bio: student.bio.unwrap_or_default(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO users (uuid, username, name, surname, email, password_hash, role, bio, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(user.uuid)
    .bind(&user.username)
    .bind(&user.name)
    .bind(&user.surname)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(user.role)
    .bind(&user.bio)
    .bind(user.created_at)
    .execute(&pg)
    .await?;

    proceeds(StudentProfile::from(user))
}

pub async fn login_student(
    Extension(pg): Extension<PgPool>,
    Json(login): Json<LoginStudent>,
) -> Payload<LoggedInStudent> {
    if login.password.is_empty() {
        return Err(Error::validation("`password` parameter was empty"));
    }

    let user = sqlx::query_as::<_, StudentData>("SELECT * FROM users WHERE username = $1 LIMIT 1")
        .bind(&login.username)
        .fetch_optional(&pg)
        .await?;

    let student = if let Some(user) = user {
        user
    } else {
        return Err(Error::unauthenticated(format!(
            "User `{}` does not exist!",
            login.username
        )));
    };
    let hash = PasswordHash::new(&student.password_hash)?;
    let matches = Pbkdf2
        .verify_password(login.password.as_bytes(), &hash)
        .is_ok();
    if !matches {
        return Err(Error::unauthenticated("Passwords do not match!"));
    }

    let existing_session = sqlx::query_as::<_, StudentSession>(
        "SELECT * FROM user_sessions WHERE belongs_to = $1 LIMIT 1",
    )
    .bind(student.uuid)
    .fetch_optional(&pg)
    .await?;

    if let Some(existing) = existing_session {
        if Utc::now().lt(&existing.expires_at) {
            // already authenticated
            return proceeds(LoggedInStudent {
                session_id: existing.ssid,
                student_id: existing.belongs_to,
                expires_at: existing.expires_at,
            });
        }
        sqlx::query("DELETE FROM user_sessions WHERE ssid = $1")
            .bind(&existing.ssid)
            .execute(&pg)
            .await?;
    }

    let mut ssid_bytes = [0u8; 32];
    OsRng.fill_bytes(&mut ssid_bytes);

    let mut hasher: Sha256 = Digest::new();
    hasher.update(ssid_bytes);
    let ssid = hex::encode(hasher.finalize());

    let expires_at = Utc::now() + Duration::days(2);
    sqlx::query("INSERT INTO user_sessions (ssid, belongs_to, expires_at) VALUES ($1, $2, $3)")
        .bind(&ssid)
        .bind(student.uuid)
        .bind(expires_at)
        .execute(&pg)
        .await?;

    proceeds(LoggedInStudent {
        session_id: ssid,
        student_id: student.uuid,
        expires_at,
    })
}

pub async fn drop_session(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<SessionDropped> {
    let student = current_student(&auth, &pg).await?;
    let affected = sqlx::query("DELETE FROM user_sessions WHERE belongs_to = $1")
        .bind(student.uuid)
        .execute(&pg)
        .await?;

    proceeds(SessionDropped {
        student_id: student.uuid,
        drop_success: affected.rows_affected() >= 1,
    })
}

pub async fn me(auth: AuthHeader, Extension(pg): Extension<PgPool>) -> Payload<StudentProfile> {
    let student = current_student(&auth, &pg).await?;
    proceeds(StudentProfile::from(student))
}

pub async fn get_student(
    Path(user): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<StudentProfile> {
    current_student(&auth, &pg).await?;
    let found = sqlx::query_as::<_, StudentData>("SELECT * FROM users WHERE uuid = $1 LIMIT 1")
        .bind(user)
        .fetch_optional(&pg)
        .await?;
    match found {
        Some(data) => proceeds(StudentProfile::from(data)),
        None => Err(Error::not_found(format!(
            "User with uuid `{}` does not exist!",
            user
        ))),
    }
}

pub async fn list_students(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<StudentsList> {
    let caller = current_student(&auth, &pg).await?;
    if !caller.role.is_staff() {
        return Err(Error::forbidden("Only admins may list users!"));
    }
    let users = sqlx::query_as::<_, StudentData>("SELECT * FROM users ORDER BY created_at")
        .fetch_all(&pg)
        .await?;
    proceeds(StudentsList {
        users: users.into_iter().map(StudentProfile::from).collect(),
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentsList {
    pub users: Vec<StudentProfile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionDropped {
    pub student_id: Uuid,
    pub drop_success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggedInStudent {
    pub session_id: String,
    pub student_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginStudent {
    username: String,
    password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateStudent {
    pub username: String,
    pub name: String,
    pub surname: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub bio: Option<String>,
}
