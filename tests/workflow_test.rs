use chrono::Utc;
use slms_server::catalog::delete_course_as;
use slms_server::completion::{issue_certificate, record_completion};
use slms_server::models::{StudentData, UserRole};
use slms_server::progress::{compute_progress, enroll_student};
use sqlx::PgPool;
use uuid::Uuid;

async fn seed_student(pg: &PgPool, username: &str) -> StudentData {
    seed_user(pg, username, UserRole::Student).await
}

async fn seed_user(pg: &PgPool, username: &str, role: UserRole) -> StudentData {
    let user = StudentData {
        uuid: Uuid::new_v4(),
        username: username.to_string(),
        name: "Test".to_string(),
        surname: "Student".to_string(),
        email: format!("{}@example.com", username),
        password_hash: "unused".to_string(),
        role,
        bio: String::new(),
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
    .execute(pg)
    .await
    .unwrap();
    user
}

/// One course with a single module holding `lesson_count` lessons.
async fn seed_course(pg: &PgPool, instructor: Uuid, lesson_count: usize) -> (Uuid, Vec<Uuid>) {
    let course = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO courses (uuid, title, description, category, instructor, created_at)
         VALUES ($1, 'Rust 101', 'Intro course', 'Programming', $2, $3)",
    )
    .bind(course)
    .bind(instructor)
    .bind(Utc::now())
    .execute(pg)
    .await
    .unwrap();

    let module = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO course_modules (uuid, course_id, title, position) VALUES ($1, $2, 'Basics', 0)",
    )
    .bind(module)
    .bind(course)
    .execute(pg)
    .await
    .unwrap();

    let mut lessons = Vec::with_capacity(lesson_count);
    for position in 0..lesson_count {
        let lesson = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO lessons (uuid, module_id, title, content, position)
             VALUES ($1, $2, $3, 'lesson body', $4)",
        )
        .bind(lesson)
        .bind(module)
        .bind(format!("Lesson {}", position + 1))
        .bind(position as i32)
        .execute(pg)
        .await
        .unwrap();
        lessons.push(lesson);
    }
    (course, lessons)
}

async fn certificate_count(pg: &PgPool, student: Uuid, course: Uuid) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM certificates WHERE student_id = $1 AND course_id = $2")
        .bind(student)
        .bind(course)
        .fetch_one(pg)
        .await
        .unwrap()
}

fn assert_certificate_id_format(id: &str) {
    let suffix = id
        .strip_prefix("SLMS-")
        .unwrap_or_else(|| panic!("bad certificate id prefix: {}", id));
    assert_eq!(suffix.len(), 8, "bad certificate id: {}", id);
    assert!(
        suffix
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)),
        "bad certificate id: {}",
        id
    );
}

#[sqlx::test(migrations = "./migrations")]
async fn empty_course_reports_zero_progress(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher0").await;
    let student = seed_student(&pg, "student0").await;
    let (course, _) = seed_course(&pg, instructor.uuid, 0).await;

    assert_eq!(compute_progress(student.uuid, course, &pg).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn missing_course_degrades_to_zero(pg: PgPool) {
    let student = seed_student(&pg, "student1").await;
    // Nonexistent course: the calculator must not fail page rendering.
    assert_eq!(compute_progress(student.uuid, Uuid::new_v4(), &pg).await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn two_lesson_scenario_issues_exactly_one_certificate(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher2").await;
    let student = seed_student(&pg, "student2").await;
    let (course, lessons) = seed_course(&pg, instructor.uuid, 2).await;

    let first = record_completion(&student, lessons[0], &pg).await.unwrap();
    assert_eq!(compute_progress(student.uuid, course, &pg).await, 50);
    assert_eq!(certificate_count(&pg, student.uuid, course).await, 0);

    let second = record_completion(&student, lessons[1], &pg).await.unwrap();
    assert_eq!(compute_progress(student.uuid, course, &pg).await, 100);
    assert_eq!(certificate_count(&pg, student.uuid, course).await, 1);

    let certificate_id: String =
        sqlx::query_scalar("SELECT certificate_id FROM certificates WHERE student_id = $1")
            .bind(student.uuid)
            .fetch_one(&pg)
            .await
            .unwrap();
    assert_certificate_id_format(&certificate_id);

    // Resubmitting the last lesson is a no-op: same record, still one cert.
    let again = record_completion(&student, lessons[1], &pg).await.unwrap();
    assert_eq!(again.uuid, second.uuid);
    assert_eq!(certificate_count(&pg, student.uuid, course).await, 1);

    let completion_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM lesson_completions WHERE student_id = $1")
            .bind(student.uuid)
            .fetch_one(&pg)
            .await
            .unwrap();
    assert_eq!(completion_rows, 2);
    assert_ne!(first.uuid, second.uuid);
}

#[sqlx::test(migrations = "./migrations")]
async fn progress_is_monotonic_over_completions(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher3").await;
    let student = seed_student(&pg, "student3").await;
    let (course, lessons) = seed_course(&pg, instructor.uuid, 3).await;

    let mut last = 0;
    for lesson in &lessons {
        record_completion(&student, *lesson, &pg).await.unwrap();
        let now = compute_progress(student.uuid, course, &pg).await;
        assert!(now >= last);
        last = now;
    }
    assert_eq!(last, 100);
}

#[sqlx::test(migrations = "./migrations")]
async fn concurrent_final_completions_issue_one_certificate(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher4").await;
    let student = seed_student(&pg, "student4").await;
    let (course, lessons) = seed_course(&pg, instructor.uuid, 2).await;

    // Both remaining lessons complete at once; both requests may observe
    // done >= total, yet only one certificate row may come out of it.
    let (a, b) = tokio::join!(
        record_completion(&student, lessons[0], &pg),
        record_completion(&student, lessons[1], &pg),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(certificate_count(&pg, student.uuid, course).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn certificate_get_or_create_is_idempotent(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher5").await;
    let student = seed_student(&pg, "student5").await;
    let (course, _) = seed_course(&pg, instructor.uuid, 1).await;

    let first = issue_certificate(student.uuid, course, &pg).await.unwrap();
    let second = issue_certificate(student.uuid, course, &pg).await.unwrap();
    assert_eq!(first.uuid, second.uuid);
    assert_eq!(first.certificate_id, second.certificate_id);
    assert_eq!(certificate_count(&pg, student.uuid, course).await, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn course_deletion_is_limited_to_instructor_and_admin(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher7").await;
    let stranger = seed_student(&pg, "student7").await;
    let admin = seed_user(&pg, "admin7", UserRole::Admin).await;
    let (first_course, _) = seed_course(&pg, instructor.uuid, 1).await;
    let (second_course, _) = seed_course(&pg, instructor.uuid, 1).await;

    let err = delete_course_as(&stranger, first_course, &pg)
        .await
        .unwrap_err();
    assert!(matches!(err, slms_server::Error::Forbidden { .. }));

    let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE uuid = $1")
        .bind(first_course)
        .fetch_one(&pg)
        .await
        .unwrap();
    assert_eq!(remaining, 1);

    // The instructor may delete their own course, and an admin anyone's.
    let deleted = delete_course_as(&instructor, first_course, &pg)
        .await
        .unwrap();
    assert!(deleted.deleted);
    let deleted = delete_course_as(&admin, second_course, &pg).await.unwrap();
    assert!(deleted.deleted);
}

#[sqlx::test(migrations = "./migrations")]
async fn repeated_enrollment_is_a_duplicate(pg: PgPool) {
    let instructor = seed_student(&pg, "teacher8").await;
    let student = seed_student(&pg, "student8").await;
    let (course, _) = seed_course(&pg, instructor.uuid, 1).await;

    enroll_student(&student, course, &pg).await.unwrap();
    let err = enroll_student(&student, course, &pg).await.unwrap_err();
    assert!(matches!(err, slms_server::Error::Duplicate { .. }));

    let rows: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM enrollments WHERE student_id = $1 AND course_id = $2",
    )
    .bind(student.uuid)
    .bind(course)
    .fetch_one(&pg)
    .await
    .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = "./migrations")]
async fn completion_of_unknown_lesson_is_not_found(pg: PgPool) {
    let student = seed_student(&pg, "student6").await;
    let err = record_completion(&student, Uuid::new_v4(), &pg)
        .await
        .unwrap_err();
    assert!(matches!(err, slms_server::Error::NotFound { .. }));
}
