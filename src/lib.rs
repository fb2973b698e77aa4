pub mod auth;
pub mod catalog;
pub mod completion;
pub mod coursework;
pub mod err;
pub mod models;
pub mod progress;

use axum::handler::Handler;
use axum::routing::{delete, get, post, put};
use axum::{Extension, Router};
use sqlx::PgPool;

pub use err::{proceeds, Error, Payload};

pub fn app(pg: PgPool) -> Router {
    Router::new()
        .route(
            "/users/",
            post(auth::register_student).get(auth::list_students),
        )
        .route("/users/me", get(auth::me))
        .route("/users/profile/:user", get(auth::get_student))
        .route(
            "/token/",
            post(auth::login_student).delete(auth::drop_session),
        )
        .route(
            "/courses/",
            get(catalog::list_courses).post(catalog::create_course),
        )
        .route(
            "/courses/:course",
            get(catalog::get_course)
                .put(catalog::update_course)
                .delete(catalog::delete_course),
        )
        .route(
            "/modules/",
            get(catalog::list_modules).post(catalog::create_module),
        )
        .route(
            "/modules/:module",
            get(catalog::get_module)
                .put(catalog::update_module)
                .delete(catalog::delete_module),
        )
        .route(
            "/lessons/",
            get(catalog::list_lessons).post(catalog::create_lesson),
        )
        .route(
            "/lessons/:lesson",
            get(catalog::get_lesson)
                .put(catalog::update_lesson)
                .delete(catalog::delete_lesson),
        )
        .route(
            "/announcements/",
            get(catalog::list_announcements).post(catalog::create_announcement),
        )
        .route(
            "/announcements/:announcement",
            get(catalog::get_announcement)
                .put(catalog::update_announcement)
                .delete(catalog::delete_announcement),
        )
        .route(
            "/comments/",
            get(catalog::list_comments).post(catalog::create_comment),
        )
        .route(
            "/comments/:comment",
            get(catalog::get_comment)
                .put(catalog::update_comment)
                .delete(catalog::delete_comment),
        )
        .route(
            "/assignments/",
            get(coursework::list_assignments).post(coursework::create_assignment),
        )
        .route(
            "/assignments/:assignment",
            get(coursework::get_assignment)
                .put(coursework::update_assignment)
                .delete(coursework::delete_assignment),
        )
        .route(
            "/submissions/",
            get(coursework::list_submissions).post(coursework::create_submission),
        )
        .route(
            "/submissions/:submission",
            get(coursework::get_submission)
                .put(coursework::grade_submission)
                .delete(coursework::delete_submission),
        )
        .route(
            "/quizzes/",
            get(coursework::list_quizzes).post(coursework::create_quiz),
        )
        .route(
            "/quizzes/:quiz",
            get(coursework::get_quiz)
                .put(coursework::update_quiz)
                .delete(coursework::delete_quiz),
        )
        .route(
            "/results/",
            get(coursework::list_results).post(coursework::create_result),
        )
        .route(
            "/results/:result",
            get(coursework::get_result)
                .put(coursework::update_result)
                .delete(coursework::delete_result),
        )
        .route(
            "/enrollments/",
            get(progress::list_enrollments).post(progress::enroll),
        )
        .route(
            "/lesson-completions/",
            post(completion::mark_lesson_complete).get(completion::list_completions),
        )
        .route("/certificates/", get(completion::list_certificates))
        .fallback(err::handler404.into_service())
        .layer(Extension(pg))
}
