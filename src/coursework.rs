use axum::extract::Path;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{current_student, AuthHeader};
use crate::catalog::{delete_by_uuid, Deleted};
use crate::err::{proceeds, referenced_or_missing, Error, Payload};
use crate::models::{AssignmentData, QuizData, QuizResultData, SubmissionData};

// ---- assignments ----

pub async fn list_assignments(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<AssignmentsList> {
    current_student(&auth, &pg).await?;
    let assignments =
        sqlx::query_as::<_, AssignmentData>("SELECT * FROM assignments ORDER BY due_date, uuid")
            .fetch_all(&pg)
            .await?;
    proceeds(AssignmentsList { assignments })
}

pub async fn get_assignment(
    Path(assignment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<AssignmentData> {
    current_student(&auth, &pg).await?;
    let found =
        sqlx::query_as::<_, AssignmentData>("SELECT * FROM assignments WHERE uuid = $1 LIMIT 1")
            .bind(assignment)
            .fetch_optional(&pg)
            .await?;
    found.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Assignment with uuid `{}` does not exist!",
                assignment
            )))
        },
        proceeds,
    )
}

pub async fn create_assignment(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateAssignment>,
) -> Payload<AssignmentData> {
    current_student(&auth, &pg).await?;
    let assignment = AssignmentData {
        uuid: Uuid::new_v4(),
        module_id: body.module_id,
        title: body.title,
        description: body.description,
        due_date: body.due_date,
    };
    sqlx::query(
        "INSERT INTO assignments (uuid, module_id, title, description, due_date)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(assignment.uuid)
    .bind(assignment.module_id)
    .bind(&assignment.title)
    .bind(&assignment.description)
    .bind(assignment.due_date)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "module"))?;
    proceeds(assignment)
}

pub async fn update_assignment(
    Path(assignment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateAssignment>,
) -> Payload<AssignmentData> {
    current_student(&auth, &pg).await?;
    let updated = sqlx::query_as::<_, AssignmentData>(
        "UPDATE assignments SET module_id = $2, title = $3, description = $4, due_date = $5
         WHERE uuid = $1 RETURNING *",
    )
    .bind(assignment)
    .bind(body.module_id)
    .bind(&body.title)
    .bind(&body.description)
    .bind(body.due_date)
    .fetch_optional(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "module"))?;
    updated.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Assignment with uuid `{}` does not exist!",
                assignment
            )))
        },
        proceeds,
    )
}

pub async fn delete_assignment(
    Path(assignment): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("assignments", "assignment", assignment, &pg).await
}

// ---- submissions ----

pub async fn list_submissions(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<SubmissionsList> {
    current_student(&auth, &pg).await?;
    let submissions =
        sqlx::query_as::<_, SubmissionData>("SELECT * FROM submissions ORDER BY submitted_at, uuid")
            .fetch_all(&pg)
            .await?;
    proceeds(SubmissionsList { submissions })
}

pub async fn create_submission(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateSubmission>,
) -> Payload<SubmissionData> {
    let caller = current_student(&auth, &pg).await?;
    let submission = SubmissionData {
        uuid: Uuid::new_v4(),
        assignment_id: body.assignment_id,
        student_id: caller.uuid,
        file_url: body.file_url,
        grade: None,
        feedback: String::new(),
        submitted_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO submissions (uuid, assignment_id, student_id, file_url, grade, feedback, submitted_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(submission.uuid)
    .bind(submission.assignment_id)
    .bind(submission.student_id)
    .bind(&submission.file_url)
    .bind(submission.grade)
    .bind(&submission.feedback)
    .bind(submission.submitted_at)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "assignment"))?;
    proceeds(submission)
}

pub async fn get_submission(
    Path(submission): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<SubmissionData> {
    current_student(&auth, &pg).await?;
    let found =
        sqlx::query_as::<_, SubmissionData>("SELECT * FROM submissions WHERE uuid = $1 LIMIT 1")
            .bind(submission)
            .fetch_optional(&pg)
            .await?;
    found.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Submission with uuid `{}` does not exist!",
                submission
            )))
        },
        proceeds,
    )
}

pub async fn delete_submission(
    Path(submission): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("submissions", "submission", submission, &pg).await
}

pub async fn grade_submission(
    Path(submission): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<GradeSubmission>,
) -> Payload<SubmissionData> {
    current_student(&auth, &pg).await?;
    let updated = sqlx::query_as::<_, SubmissionData>(
        "UPDATE submissions SET grade = $2, feedback = $3 WHERE uuid = $1 RETURNING *",
    )
    .bind(submission)
    .bind(body.grade)
    .bind(body.feedback.unwrap_or_default())
    .fetch_optional(&pg)
    .await?;
    updated.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Submission with uuid `{}` does not exist!",
                submission
            )))
        },
        proceeds,
    )
}

// ---- quizzes ----

/// Quiz questions are stored as JSON; accepted shape is an array of
/// `{ "prompt": string, "options": [string, string, ...], "answer": index }`.
pub fn validate_questions(questions: &Value) -> Result<(), Error> {
    let items = questions
        .as_array()
        .ok_or_else(|| Error::validation("`questions` must be a JSON array"))?;
    for (index, item) in items.iter().enumerate() {
        let object = item
            .as_object()
            .ok_or_else(|| Error::validation(format!("question {} is not an object", index)))?;
        let prompt = object.get("prompt").and_then(Value::as_str);
        if prompt.map_or(true, str::is_empty) {
            return Err(Error::validation(format!(
                "question {} is missing a non-empty `prompt`",
                index
            )));
        }
        let options = object
            .get("options")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::validation(format!("question {} is missing an `options` array", index))
            })?;
        if options.len() < 2 || options.iter().any(|option| !option.is_string()) {
            return Err(Error::validation(format!(
                "question {} needs at least two string options",
                index
            )));
        }
        let answer = object.get("answer").and_then(Value::as_u64);
        match answer {
            Some(answer) if (answer as usize) < options.len() => {}
            _ => {
                return Err(Error::validation(format!(
                    "question {} needs an `answer` index within its options",
                    index
                )))
            }
        }
    }
    Ok(())
}

pub async fn list_quizzes(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<QuizzesList> {
    current_student(&auth, &pg).await?;
    let quizzes = sqlx::query_as::<_, QuizData>("SELECT * FROM quizzes ORDER BY uuid")
        .fetch_all(&pg)
        .await?;
    proceeds(QuizzesList { quizzes })
}

pub async fn get_quiz(
    Path(quiz): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<QuizData> {
    current_student(&auth, &pg).await?;
    let found = sqlx::query_as::<_, QuizData>("SELECT * FROM quizzes WHERE uuid = $1 LIMIT 1")
        .bind(quiz)
        .fetch_optional(&pg)
        .await?;
    found.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Quiz with uuid `{}` does not exist!",
                quiz
            )))
        },
        proceeds,
    )
}

pub async fn create_quiz(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateQuiz>,
) -> Payload<QuizData> {
    current_student(&auth, &pg).await?;
    let questions = body.questions.unwrap_or_else(|| Value::Array(Vec::new()));
    validate_questions(&questions)?;
    let quiz = QuizData {
        uuid: Uuid::new_v4(),
        module_id: body.module_id,
        title: body.title,
        questions,
    };
    sqlx::query("INSERT INTO quizzes (uuid, module_id, title, questions) VALUES ($1, $2, $3, $4)")
        .bind(quiz.uuid)
        .bind(quiz.module_id)
        .bind(&quiz.title)
        .bind(&quiz.questions)
        .execute(&pg)
        .await
        .map_err(|err| referenced_or_missing(err, "module"))?;
    proceeds(quiz)
}

pub async fn update_quiz(
    Path(quiz): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateQuiz>,
) -> Payload<QuizData> {
    current_student(&auth, &pg).await?;
    let questions = body.questions.unwrap_or_else(|| Value::Array(Vec::new()));
    validate_questions(&questions)?;
    let updated = sqlx::query_as::<_, QuizData>(
        "UPDATE quizzes SET module_id = $2, title = $3, questions = $4 WHERE uuid = $1 RETURNING *",
    )
    .bind(quiz)
    .bind(body.module_id)
    .bind(&body.title)
    .bind(&questions)
    .fetch_optional(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "module"))?;
    updated.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Quiz with uuid `{}` does not exist!",
                quiz
            )))
        },
        proceeds,
    )
}

pub async fn delete_quiz(
    Path(quiz): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("quizzes", "quiz", quiz, &pg).await
}

// ---- quiz results ----

pub async fn list_results(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<ResultsList> {
    current_student(&auth, &pg).await?;
    let results =
        sqlx::query_as::<_, QuizResultData>("SELECT * FROM quiz_results ORDER BY attempted_at, uuid")
            .fetch_all(&pg)
            .await?;
    proceeds(ResultsList { results })
}

pub async fn create_result(
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateResult>,
) -> Payload<QuizResultData> {
    let caller = current_student(&auth, &pg).await?;
    if !(0.0..=100.0).contains(&body.score) {
        return Err(Error::validation("`score` must be between 0 and 100"));
    }
    let result = QuizResultData {
        uuid: Uuid::new_v4(),
        quiz_id: body.quiz_id,
        student_id: caller.uuid,
        score: body.score,
        attempted_at: Utc::now(),
    };
    sqlx::query(
        "INSERT INTO quiz_results (uuid, quiz_id, student_id, score, attempted_at)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(result.uuid)
    .bind(result.quiz_id)
    .bind(result.student_id)
    .bind(result.score)
    .bind(result.attempted_at)
    .execute(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "quiz"))?;
    proceeds(result)
}

pub async fn get_result(
    Path(result): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<QuizResultData> {
    current_student(&auth, &pg).await?;
    let found =
        sqlx::query_as::<_, QuizResultData>("SELECT * FROM quiz_results WHERE uuid = $1 LIMIT 1")
            .bind(result)
            .fetch_optional(&pg)
            .await?;
    found.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Result with uuid `{}` does not exist!",
                result
            )))
        },
        proceeds,
    )
}

pub async fn update_result(
    Path(result): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
    Json(body): Json<CreateResult>,
) -> Payload<QuizResultData> {
    current_student(&auth, &pg).await?;
    if !(0.0..=100.0).contains(&body.score) {
        return Err(Error::validation("`score` must be between 0 and 100"));
    }
    let updated = sqlx::query_as::<_, QuizResultData>(
        "UPDATE quiz_results SET quiz_id = $2, score = $3 WHERE uuid = $1 RETURNING *",
    )
    .bind(result)
    .bind(body.quiz_id)
    .bind(body.score)
    .fetch_optional(&pg)
    .await
    .map_err(|err| referenced_or_missing(err, "quiz"))?;
    updated.map_or_else(
        || {
            Err(Error::not_found(format!(
                "Result with uuid `{}` does not exist!",
                result
            )))
        },
        proceeds,
    )
}

pub async fn delete_result(
    Path(result): Path<Uuid>,
    auth: AuthHeader,
    Extension(pg): Extension<PgPool>,
) -> Payload<Deleted> {
    current_student(&auth, &pg).await?;
    delete_by_uuid("quiz_results", "result", result, &pg).await
}

#[derive(Debug, Clone, Serialize)]
pub struct AssignmentsList {
    pub assignments: Vec<AssignmentData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionsList {
    pub submissions: Vec<SubmissionData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuizzesList {
    pub quizzes: Vec<QuizData>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResultsList {
    pub results: Vec<QuizResultData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateAssignment {
    pub module_id: Uuid,
    pub title: String,
    pub description: String,
    pub due_date: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSubmission {
    pub assignment_id: Uuid,
    pub file_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GradeSubmission {
    pub grade: Option<f64>,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateQuiz {
    pub module_id: Uuid,
    pub title: String,
    pub questions: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateResult {
    pub quiz_id: Uuid,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wellformed_questions_pass() {
        let questions = json!([
            {
                "prompt": "What does SQL stand for?",
                "options": ["Structured Query Language", "Simple Query List"],
                "answer": 0
            },
            {
                "prompt": "Which keyword filters rows?",
                "options": ["WHERE", "ORDER", "GROUP"],
                "answer": 0
            }
        ]);
        assert!(validate_questions(&questions).is_ok());
        assert!(validate_questions(&json!([])).is_ok());
    }

    #[test]
    fn non_array_questions_are_rejected() {
        assert!(validate_questions(&json!({"prompt": "x"})).is_err());
        assert!(validate_questions(&json!("nope")).is_err());
    }

    #[test]
    fn missing_prompt_is_rejected() {
        let questions = json!([{ "options": ["a", "b"], "answer": 0 }]);
        assert!(validate_questions(&questions).is_err());
        let empty_prompt = json!([{ "prompt": "", "options": ["a", "b"], "answer": 0 }]);
        assert!(validate_questions(&empty_prompt).is_err());
    }

    #[test]
    fn bad_options_are_rejected() {
        let single = json!([{ "prompt": "q", "options": ["a"], "answer": 0 }]);
        assert!(validate_questions(&single).is_err());
        let typed = json!([{ "prompt": "q", "options": ["a", 2], "answer": 0 }]);
        assert!(validate_questions(&typed).is_err());
    }

    #[test]
    fn answer_must_index_an_option() {
        let out_of_range = json!([{ "prompt": "q", "options": ["a", "b"], "answer": 2 }]);
        assert!(validate_questions(&out_of_range).is_err());
        let missing = json!([{ "prompt": "q", "options": ["a", "b"] }]);
        assert!(validate_questions(&missing).is_err());
        let negative = json!([{ "prompt": "q", "options": ["a", "b"], "answer": -1 }]);
        assert!(validate_questions(&negative).is_err());
    }
}
