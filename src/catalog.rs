use std::collections::HashMap;

use axum::extract::Path;
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{current_student, AuthHeader};
use crate::err::{proceeds, referenced_or_missing, Error, Payload};
use crate::models::{AnnouncementData, CommentData, CourseData, LessonData, ModuleData, StudentData};

pub const CATEGORIES: [&str; 5] = ["Programming", "Design", "Business", "DevOps", "Other"];

fn validate_category(category: &str) -> Result<(), Error> {
    if CATEGORIES.contains(&category) {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "Unknown category `{}`, expected one of {:?}",
            category, CATEGORIES
        )))
    }
}

/// Full nested course representation: modules in order, each with its lessons.
#[derive(Debug, Clone, Serialize)]
pub struct CourseView {
    #[serde(flatten)]
    pub course: CourseData,
    pub instructor_name: String,
    pub modules: Vec<ModuleView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleView {
    #[serde(flatten)]
    pub module: ModuleData,
    pub lessons: Vec<LessonData>,
}

pub async fn load_course_view(course: CourseData, pg: &PgPool) -> Result<CourseView, Error> {
    let instructor_name: String = sqlx::query_scalar("SELECT username FROM users WHERE uuid = $1")
        .bind(course.instructor)
        .fetch_one(pg)
        .await?;

    let modules = sqlx::query_as::<_, ModuleData>(
        "SELECT * FROM course_modules WHERE course_id = $1 ORDER BY position, uuid",
    )
    .bind(course.uuid)
    .fetch_all(pg)
    .await?;

    let lessons = sqlx::query_as::<_, LessonData>(
        "SELECT l.* FROM lessons l \
         JOIN course_modules m ON l.module_id = m.uuid \
         WHERE m.course_id = $1 ORDER BY l.position, l.uuid",
    )
    .bind(course.uuid)
    .fetch_all(pg)
    .await?;

    let mut by_module: HashMap<Uuid, Vec<LessonData>> = HashMap::new();
    for lesson in lessons {
        by_module.entry(lesson.module_id).or_default().push(lesson);
    }

    Ok(CourseView {
        instructor_name,
        modules: modules
            .into_iter()
            .map(|module| ModuleView {
                lessons: by_module.remove(&module.uuid).unwrap_or_default(),
                module,
            })
            .collect(),
        course,
    })
}

pub async fn fetch_course(course: Uuid, pg: &PgPool) -> Result<CourseData, Error> {
    sqlx::query_as::<_, CourseData>("SELECT * FROM courses WHERE uuid = $1 LIMIT 1")
        .bind(course)
        .fetch_optional(pg)
        .await?
        .ok_or_else(|| Error::not_found(format!("Course with uuid `{}` does not exist!", course)))
}

// ---- courses ----

pub async fn list_courses(Extension(pg): Extension<PgPool>) -> Payload<CoursesList> {
    let courses =
        sqlx::query_as::<_, CourseData>("SELECT * FROM courses ORDER BY created_at, uuid")
            .fetch_all(&pg)
            .await?;
    let mut views = Vec::with_capacity(courses.len());
    for course in courses {
        views.push(load_course_view(course, &pg).await?);
    }
    proceeds(CoursesList { courses: views })
}

pub async fn get_course(
    Path(course): Path<Uuid>,
    Extension(pg): Extension<PgPool>,
) -> Payload<CourseView> {
    let course = fetch_course(course, &pg).await?;
    proceeds(load_course_view(course, &pg).await?)
}

pub async fn create_course(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateCourse>,
) -> Payload<CourseView> {
    let caller = current_student(&auth, &pg).await?;
    let category = body.category.unwrap_or_else(|| "Other".to_string());
    validate_category(&category)?;

    let course = CourseData {
        uuid: Uuid::new_v4(),
        title: body.title,
        description: body.description,
        category,
        instructor: caller.uuid,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO courses (uuid, title, description, category, instructor, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(course.uuid)
    .bind(&course.title)
    .bind(&course.description)
    .bind(&course.category)
    .bind(course.instructor)
    .bind(course.created_at)
    .execute(&pg)
    .await?;

    proceeds(load_course_view(course, &pg).await?)
}

pub async fn update_course(
    Path(course): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateCourse>,
) -> Payload<CourseView> {
    current_student(&auth, &pg).await?;
    let mut existing = fetch_course(course, &pg).await?;
    let category = body.category.unwrap_or_else(|| existing.category.clone());
    validate_category(&category)?;

    existing.title = body.title;
    existing.description = body.description;
    existing.category = category;
    sqlx::query("UPDATE courses SET title = $2, description = $3, category = $4 WHERE uuid = $1")
        .bind(existing.uuid)
        .bind(&existing.title)
        .bind(&existing.description)
        .bind(&existing.category)
        .execute(&pg)
        .await?;

    proceeds(load_course_view(existing, &pg).await?)
}

/// Course deletion is ownership-checked: only the instructor who created the
/// course or an admin may remove it.
pub async fn delete_course_as(
    caller: &StudentData,
    course: Uuid,
    pg: &PgPool,
) -> Result<Deleted, Error> {
    let existing = fetch_course(course, pg).await?;
    if existing.instructor != caller.uuid && !caller.role.is_staff() {
        return Err(Error::forbidden(
            "Only the course instructor or an admin may delete a course!",
        ));
    }

    // Modules, lessons, assignments, quizzes, announcements etc. go with it.
    sqlx::query("DELETE FROM courses WHERE uuid = $1")
        .bind(existing.uuid)
        .execute(pg)
        .await?;

    Ok(Deleted {
        uuid: existing.uuid,
        deleted: true,
    })
}

pub async fn delete_course(
    Path(course): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    let caller = current_student(&auth, &pg).await?;
    proceeds(delete_course_as(&caller, course, &pg).await?)
}

// ---- modules ----

pub async fn list_modules(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<ModulesList> {
    current_student(&auth, &pg).await?;
    let modules = sqlx::query_as::<_, ModuleData>(
        "SELECT * FROM course_modules ORDER BY course_id, position, uuid",
    )
    .fetch_all(&pg)
    .await?;
    proceeds(ModulesList { modules })
}

pub async fn get_module(
    Path(module): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<ModuleData> {
    current_student(&auth, &pg).await?;
    fetch_module(module, &pg).await.and_then(proceeds)
}

pub async fn fetch_module(module: Uuid, pg: &PgPool) -> Result<ModuleData, Error> {
    sqlx::query_as::<_, ModuleData>("SELECT * FROM course_modules WHERE uuid = $1 LIMIT 1")
        .bind(module)
        .fetch_optional(pg)
        .await?
        .ok_or_else(|| Error::not_found(format!("Module with uuid `{}` does not exist!", module)))
}

pub async fn create_module(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateModule>,
) -> Payload<ModuleData> {
    current_student(&auth, &pg).await?;
    let module = ModuleData {
        uuid: Uuid::new_v4(),
        course_id: body.course_id,
        title: body.title,
        position: body.position.unwrap_or(0),
    };
    sqlx::query(
        "INSERT INTO course_modules (uuid, course_id, title, position) VALUES ($1, $2, $3, $4)",
    )
    .bind(module.uuid)
    .bind(module.course_id)
    .bind(&module.title)
    .bind(module.position)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "course"))?;
    proceeds(module)
}

pub async fn update_module(
    Path(module): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateModule>,
) -> Payload<ModuleData> {
    current_student(&auth, &pg).await?;
    let mut existing = fetch_module(module, &pg).await?;
    existing.course_id = body.course_id;
    existing.title = body.title;
    existing.position = body.position.unwrap_or(existing.position);
    sqlx::query("UPDATE course_modules SET course_id = $2, title = $3, position = $4 WHERE uuid = $1")
        .bind(existing.uuid)
        .bind(existing.course_id)
        .bind(&existing.title)
        .bind(existing.position)
        .execute(&pg)
        .await
        .map_err(|err| referenced_or_missing(err, "course"))?;
    proceeds(existing)
}

pub async fn delete_module(
    Path(module): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("course_modules", "module", module, &pg).await
}

// ---- lessons ----

pub async fn list_lessons(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<LessonsList> {
    current_student(&auth, &pg).await?;
    let lessons =
        sqlx::query_as::<_, LessonData>("SELECT * FROM lessons ORDER BY module_id, position, uuid")
            .fetch_all(&pg)
            .await?;
    proceeds(LessonsList { lessons })
}

pub async fn get_lesson(
    Path(lesson): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<LessonData> {
    current_student(&auth, &pg).await?;
    fetch_lesson(lesson, &pg).await.and_then(proceeds)
}

pub async fn fetch_lesson(lesson: Uuid, pg: &PgPool) -> Result<LessonData, Error> {
    sqlx::query_as::<_, LessonData>("SELECT * FROM lessons WHERE uuid = $1 LIMIT 1")
        .bind(lesson)
        .fetch_optional(pg)
        .await?
        .ok_or_else(|| Error::not_found(format!("Lesson with uuid `{}` does not exist!", lesson)))
}

pub async fn create_lesson(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateLesson>,
) -> Payload<LessonData> {
    current_student(&auth, &pg).await?;
    let lesson = LessonData {
        uuid: Uuid::new_v4(),
        module_id: body.module_id,
        title: body.title,
        content: body.content,
        video_url: body.video_url,
        position: body.position.unwrap_or(0),
    };
    sqlx::query(
        "INSERT INTO lessons (uuid, module_id, title, content, video_url, position)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(lesson.uuid)
    .bind(lesson.module_id)
    .bind(&lesson.title)
    .bind(&lesson.content)
    .bind(&lesson.video_url)
    .bind(lesson.position)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "module"))?;
    proceeds(lesson)
}

pub async fn update_lesson(
    Path(lesson): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateLesson>,
) -> Payload<LessonData> {
    current_student(&auth, &pg).await?;
    let mut existing = fetch_lesson(lesson, &pg).await?;
    existing.module_id = body.module_id;
    existing.title = body.title;
    existing.content = body.content;
    existing.video_url = body.video_url;
    existing.position = body.position.unwrap_or(existing.position);
    sqlx::query(
        "UPDATE lessons SET module_id = $2, title = $3, content = $4, video_url = $5, position = $6
         WHERE uuid = $1",
    )
    .bind(existing.uuid)
    .bind(existing.module_id)
    .bind(&existing.title)
    .bind(&existing.content)
    .bind(&existing.video_url)
    .bind(existing.position)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "module"))?;
    proceeds(existing)
}

pub async fn delete_lesson(
    Path(lesson): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("lessons", "lesson", lesson, &pg).await
}

// ---- announcements ----

pub async fn list_announcements(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<AnnouncementsList> {
    current_student(&auth, &pg).await?;
    let announcements = sqlx::query_as::<_, AnnouncementData>(
        "SELECT * FROM announcements ORDER BY created_at, uuid",
    )
    .fetch_all(&pg)
    .await?;
    proceeds(AnnouncementsList { announcements })
}

pub async fn create_announcement(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateAnnouncement>,
) -> Payload<AnnouncementData> {
    current_student(&auth, &pg).await?;
    let announcement = AnnouncementData {
        uuid: Uuid::new_v4(),
        course_id: body.course_id,
        title: body.title,
        content: body.content,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO announcements (uuid, course_id, title, content, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(announcement.uuid)
    .bind(announcement.course_id)
    .bind(&announcement.title)
    .bind(&announcement.content)
    .bind(announcement.created_at)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "course"))?;
    proceeds(announcement)
}

pub async fn get_announcement(
    Path(announcement): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<AnnouncementData> {
    current_student(&auth, &pg).await?;
    let found = sqlx::query_as::<_, AnnouncementData>(
        "SELECT * FROM announcements WHERE uuid = $1 LIMIT 1",
    )
    .bind(announcement)
    .fetch_optional(&pg)
    .await?;
    match found {
        Some(data) => proceeds(data),
        None => Err(Error::not_found(format!(
            "Announcement with uuid `{}` does not exist!",
            announcement
        ))),
    }
}

pub async fn update_announcement(
    Path(announcement): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateAnnouncement>,
) -> Payload<AnnouncementData> {
    current_student(&auth, &pg).await?;
    let updated = sqlx::query_as::<_, AnnouncementData>(
        "UPDATE announcements SET course_id = $2, title = $3, content = $4 WHERE uuid = $1
         RETURNING *",
    )
    .bind(announcement)
    .bind(body.course_id)
    .bind(&body.title)
    .bind(&body.content)
    .fetch_optional(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "course"))?;
    match updated {
        Some(data) => proceeds(data),
        None => Err(Error::not_found(format!(
            "Announcement with uuid `{}` does not exist!",
            announcement
        ))),
    }
}

pub async fn delete_announcement(
    Path(announcement): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("announcements", "announcement", announcement, &pg).await
}

// ---- comments ----

pub async fn list_comments(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<CommentsList> {
    current_student(&auth, &pg).await?;
    let comments =
        sqlx::query_as::<_, CommentData>("SELECT * FROM comments ORDER BY created_at, uuid")
            .fetch_all(&pg)
            .await?;
    proceeds(CommentsList { comments })
}

pub async fn create_comment(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateComment>,
) -> Payload<CommentData> {
    let caller = current_student(&auth, &pg).await?;
    if body.text.is_empty() {
        return Err(Error::validation("`text` parameter was empty"));
    }
    let comment = CommentData {
        uuid: Uuid::new_v4(),
        lesson_id: body.lesson_id,
        user_id: caller.uuid,
        text: body.text,
        created_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO comments (uuid, lesson_id, user_id, text, created_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(comment.uuid)
    .bind(comment.lesson_id)
    .bind(comment.user_id)
    .bind(&comment.text)
    .bind(comment.created_at)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "lesson"))?;
    proceeds(comment)
}

pub async fn get_comment(
    Path(comment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<CommentData> {
    current_student(&auth, &pg).await?;
    let found = sqlx::query_as::<_, CommentData>("SELECT * FROM comments WHERE uuid = $1 LIMIT 1")
        .bind(comment)
        .fetch_optional(&pg)
        .await?;
    match found {
        Some(data) => proceeds(data),
        None => Err(Error::not_found(format!(
            "Comment with uuid `{}` does not exist!",
            comment
        ))),
    }
}

/// Edits keep the original author; only the placement and text change.
pub async fn update_comment(
    Path(comment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateComment>,
) -> Payload<CommentData> {
    current_student(&auth, &pg).await?;
    if body.text.is_empty() {
        return Err(Error::validation("`text` parameter was empty"));
    }
    let updated = sqlx::query_as::<_, CommentData>(
        "UPDATE comments SET lesson_id = $2, text = $3 WHERE uuid = $1 RETURNING *",
    )
    .bind(comment)
    .bind(body.lesson_id)
    .bind(&body.text)
    .fetch_optional(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "lesson"))?;
    match updated {
        Some(data) => proceeds(data),
        None => Err(Error::not_found(format!(
            "Comment with uuid `{}` does not exist!",
            comment
        ))),
    }
}

pub async fn delete_comment(
    Path(comment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("comments", "comment", comment, &pg).await
}

pub async fn delete_by_uuid(
    table: &'static str,
    what: &'static str,
    uuid: Uuid,
    pg: &PgPool,
) -> Payload<Deleted> {
    let affected = sqlx::query(&format!("DELETE FROM {} WHERE uuid = $1", table))
        .bind(uuid)
        .execute(pg)
        .await?;
    if affected.rows_affected() < 1 {
        return Err(Error::not_found(format!(
            "{} with uuid `{}` does not exist!",
            what, uuid
        )));
    }
    proceeds(Deleted {
        uuid,
        deleted: true,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct Deleted {
    pub uuid: Uuid,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoursesList {
    pub courses: Vec<CourseView>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModulesList {
    pub modules: Vec<ModuleData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LessonsList {
    pub lessons: Vec<LessonData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnnouncementsList {
    pub announcements: Vec<AnnouncementData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentsList {
    pub comments: Vec<CommentData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateCourse {
    pub title: String,
    pub description: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateModule {
    pub course_id: Uuid,
    pub title: String,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLesson {
    pub module_id: Uuid,
    pub title: String,
    pub content: String,
    pub video_url: Option<String>,
    pub position: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAnnouncement {
    pub course_id: Uuid,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateComment {
    pub lesson_id: Uuid,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_categories_pass() {
        for category in CATEGORIES {
            assert!(validate_category(category).is_ok());
        }
    }

    #[test]
    fn unknown_category_is_rejected() {
        let err = validate_category("Cooking").unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
