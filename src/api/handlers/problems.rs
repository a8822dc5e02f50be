//! Problem-bank endpoints.
//!
//! Flow Overview:
//! 1) Authorize via the access guard; the tier depends on the operation.
//! 2) Students and parents only see published problems, and never the correct
//!    answer or solution; teachers and admins see everything.
//! 3) Deletion is soft (`is_deleted`), publication is a one-way flag flip.

use axum::{
    extract::{Extension, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::sync::Arc;
use tracing::Instrument;
use utoipa::{IntoParams, ToSchema};

use super::{bearer_token, ApiError, ErrorBody};
use crate::auth::{AuthState, Tier};
use crate::users::{Identity, PgIdentityStore, Role};

const DEFAULT_PAGE_SIZE: i64 = 100;

pub(crate) fn router() -> Router {
    Router::new()
        .route("/", get(list_problems).post(create_problem))
        .route(
            "/:id",
            get(get_problem).put(update_problem).delete(delete_problem),
        )
        .route("/:id/publish", post(publish_problem))
}

/// A stored problem row.
#[derive(Debug, Clone)]
struct Problem {
    id: i64,
    title: String,
    content: String,
    content_type: String,
    options: serde_json::Value,
    correct_answer: String,
    solution: Option<String>,
    difficulty: i32,
    source_type: Option<String>,
    source_year: Option<i32>,
    is_published: bool,
    created_by: i64,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProblemResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub content_type: String,
    pub options: serde_json::Value,
    /// Present only for teacher/admin viewers.
    pub correct_answer: Option<String>,
    /// Present only for teacher/admin viewers.
    pub solution: Option<String>,
    pub difficulty: i32,
    pub source_type: Option<String>,
    pub source_year: Option<i32>,
    pub is_published: bool,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ProblemResponse {
    /// Build the viewer-specific projection of a problem.
    fn for_viewer(problem: &Problem, staff: bool) -> Self {
        Self {
            id: problem.id,
            title: problem.title.clone(),
            content: problem.content.clone(),
            content_type: problem.content_type.clone(),
            options: problem.options.clone(),
            correct_answer: staff.then(|| problem.correct_answer.clone()),
            solution: if staff {
                problem.solution.clone()
            } else {
                None
            },
            difficulty: problem.difficulty,
            source_type: problem.source_type.clone(),
            source_year: problem.source_year,
            is_published: problem.is_published,
            created_by: problem.created_by,
            created_at: problem.created_at.to_rfc3339(),
            updated_at: problem.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListProblemsQuery {
    pub difficulty: Option<i32>,
    pub source_type: Option<String>,
    pub search: Option<String>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ProblemCreateRequest {
    pub title: String,
    pub content: String,
    pub content_type: Option<String>,
    pub options: serde_json::Value,
    pub correct_answer: String,
    pub solution: Option<String>,
    pub difficulty: Option<i32>,
    pub source_type: Option<String>,
    pub source_year: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ProblemUpdateRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    pub content_type: Option<String>,
    pub options: Option<serde_json::Value>,
    pub correct_answer: Option<String>,
    pub solution: Option<String>,
    pub difficulty: Option<i32>,
    pub source_type: Option<String>,
    pub source_year: Option<i32>,
}

/// Whether a viewer sees unpublished problems, answers, and solutions.
fn is_staff(identity: &Identity) -> bool {
    matches!(identity.role, Role::Teacher | Role::Admin)
}

fn valid_difficulty(difficulty: i32) -> bool {
    (1..=5).contains(&difficulty)
}

#[utoipa::path(
    get,
    path = "/api/v1/problems",
    params(ListProblemsQuery),
    responses(
        (status = 200, description = "List problems; students see published only", body = [ProblemResponse]),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn list_problems(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
    Query(query): Query<ListProblemsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = auth
        .guard()
        .require(&*store.0, bearer_token(&headers), Tier::Authenticated)
        .await?;
    let staff = is_staff(&caller);

    let problems = fetch_problems(
        &pool,
        &query,
        // Non-staff viewers are pinned to published problems.
        if staff { None } else { Some(true) },
    )
    .await?;
    let response: Vec<ProblemResponse> = problems
        .iter()
        .map(|problem| ProblemResponse::for_viewer(problem, staff))
        .collect();

    Ok(Json(response))
}

#[utoipa::path(
    get,
    path = "/api/v1/problems/{id}",
    params(("id" = i64, Path, description = "Problem id")),
    responses(
        (status = 200, description = "Problem detail", body = ProblemResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 404, description = "Problem not found", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn get_problem(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = auth
        .guard()
        .require(&*store.0, bearer_token(&headers), Tier::Authenticated)
        .await?;
    let staff = is_staff(&caller);

    let problem = fetch_problem(&pool, id).await?;
    match problem {
        // Unpublished problems do not exist for non-staff viewers.
        Some(problem) if problem.is_published || staff => {
            Ok(Json(ProblemResponse::for_viewer(&problem, staff)))
        }
        _ => Err(ApiError::NotFound("Problem not found")),
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/problems",
    request_body = ProblemCreateRequest,
    responses(
        (status = 201, description = "Problem created (teacher or admin)", body = ProblemResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn create_problem(
    headers: HeaderMap,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ProblemCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let caller = auth
        .guard()
        .require(&*store.0, bearer_token(&headers), Tier::TeacherOrAdmin)
        .await?;

    if payload.title.trim().is_empty() || payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Title and content are required".to_string(),
        ));
    }
    let difficulty = payload.difficulty.unwrap_or(3);
    if !valid_difficulty(difficulty) {
        return Err(ApiError::BadRequest(
            "Difficulty must be between 1 and 5".to_string(),
        ));
    }

    let problem = insert_problem(&pool, &payload, difficulty, caller.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(ProblemResponse::for_viewer(&problem, true)),
    ))
}

#[utoipa::path(
    put,
    path = "/api/v1/problems/{id}",
    params(("id" = i64, Path, description = "Problem id")),
    request_body = ProblemUpdateRequest,
    responses(
        (status = 200, description = "Problem updated (teacher or admin)", body = ProblemResponse),
        (status = 400, description = "Invalid input", body = ErrorBody),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Problem not found", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn update_problem(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
    Json(payload): Json<ProblemUpdateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    auth.guard()
        .require(&*store.0, bearer_token(&headers), Tier::TeacherOrAdmin)
        .await?;

    if let Some(difficulty) = payload.difficulty {
        if !valid_difficulty(difficulty) {
            return Err(ApiError::BadRequest(
                "Difficulty must be between 1 and 5".to_string(),
            ));
        }
    }

    match persist_problem_update(&pool, id, &payload).await? {
        Some(problem) => Ok(Json(ProblemResponse::for_viewer(&problem, true))),
        None => Err(ApiError::NotFound("Problem not found")),
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/problems/{id}",
    params(("id" = i64, Path, description = "Problem id")),
    responses(
        (status = 204, description = "Problem deleted (admin only)"),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Problem not found", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn delete_problem(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
) -> Result<impl IntoResponse, ApiError> {
    auth.guard()
        .require(&*store.0, bearer_token(&headers), Tier::Admin)
        .await?;

    if soft_delete_problem(&pool, id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Problem not found"))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/problems/{id}/publish",
    params(("id" = i64, Path, description = "Problem id")),
    responses(
        (status = 200, description = "Problem published (teacher or admin)", body = ProblemResponse),
        (status = 401, description = "Invalid credentials", body = ErrorBody),
        (status = 403, description = "Forbidden", body = ErrorBody),
        (status = 404, description = "Problem not found", body = ErrorBody),
    ),
    tag = "problems"
)]
pub async fn publish_problem(
    headers: HeaderMap,
    Path(id): Path<i64>,
    auth: Extension<Arc<AuthState>>,
    store: Extension<Arc<PgIdentityStore>>,
    pool: Extension<PgPool>,
) -> Result<impl IntoResponse, ApiError> {
    auth.guard()
        .require(&*store.0, bearer_token(&headers), Tier::TeacherOrAdmin)
        .await?;

    match mark_published(&pool, id).await? {
        Some(problem) => Ok(Json(ProblemResponse::for_viewer(&problem, true))),
        None => Err(ApiError::NotFound("Problem not found")),
    }
}

const PROBLEM_COLUMNS: &str = r"
    id, title, content, content_type, options, correct_answer, solution,
    difficulty, source_type, source_year, is_published, created_by,
    created_at, updated_at
";

async fn fetch_problems(
    pool: &PgPool,
    query: &ListProblemsQuery,
    published: Option<bool>,
) -> Result<Vec<Problem>, anyhow::Error> {
    use anyhow::Context;

    let sql = format!(
        r"
        SELECT {PROBLEM_COLUMNS}
        FROM problems
        WHERE is_deleted = FALSE
          AND ($1::integer IS NULL OR difficulty = $1)
          AND ($2::text IS NULL OR source_type = $2)
          AND ($3::text IS NULL OR title ILIKE '%' || $3 || '%' OR content ILIKE '%' || $3 || '%')
          AND ($4::boolean IS NULL OR is_published = $4)
        ORDER BY created_at DESC
        LIMIT $5 OFFSET $6
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = sql.as_str()
    );
    let rows = sqlx::query(&sql)
        .bind(query.difficulty)
        .bind(&query.source_type)
        .bind(&query.search)
        .bind(published)
        .bind(query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, 500))
        .bind(query.skip.unwrap_or(0).max(0))
        .fetch_all(pool)
        .instrument(span)
        .await
        .context("failed to list problems")?;

    rows.iter().map(problem_from_row).collect()
}

async fn fetch_problem(pool: &PgPool, id: i64) -> Result<Option<Problem>, anyhow::Error> {
    use anyhow::Context;

    let sql = format!(
        r"
        SELECT {PROBLEM_COLUMNS}
        FROM problems
        WHERE id = $1 AND is_deleted = FALSE
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = sql.as_str()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch problem")?;

    row.as_ref().map(problem_from_row).transpose()
}

async fn insert_problem(
    pool: &PgPool,
    payload: &ProblemCreateRequest,
    difficulty: i32,
    created_by: i64,
) -> Result<Problem, anyhow::Error> {
    use anyhow::Context;

    let sql = format!(
        r"
        INSERT INTO problems
            (title, content, content_type, options, correct_answer, solution,
             difficulty, source_type, source_year, created_by)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING {PROBLEM_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = sql.as_str()
    );
    let row = sqlx::query(&sql)
        .bind(&payload.title)
        .bind(&payload.content)
        .bind(payload.content_type.as_deref().unwrap_or("text"))
        .bind(&payload.options)
        .bind(&payload.correct_answer)
        .bind(&payload.solution)
        .bind(difficulty)
        .bind(&payload.source_type)
        .bind(payload.source_year)
        .bind(created_by)
        .fetch_one(pool)
        .instrument(span)
        .await
        .context("failed to insert problem")?;

    problem_from_row(&row)
}

async fn persist_problem_update(
    pool: &PgPool,
    id: i64,
    payload: &ProblemUpdateRequest,
) -> Result<Option<Problem>, anyhow::Error> {
    use anyhow::Context;

    let sql = format!(
        r"
        UPDATE problems
        SET
            title = COALESCE($1, title),
            content = COALESCE($2, content),
            content_type = COALESCE($3, content_type),
            options = COALESCE($4, options),
            correct_answer = COALESCE($5, correct_answer),
            solution = COALESCE($6, solution),
            difficulty = COALESCE($7, difficulty),
            source_type = COALESCE($8, source_type),
            source_year = COALESCE($9, source_year),
            updated_at = NOW()
        WHERE id = $10 AND is_deleted = FALSE
        RETURNING {PROBLEM_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = sql.as_str()
    );
    let row = sqlx::query(&sql)
        .bind(&payload.title)
        .bind(&payload.content)
        .bind(&payload.content_type)
        .bind(&payload.options)
        .bind(&payload.correct_answer)
        .bind(&payload.solution)
        .bind(payload.difficulty)
        .bind(&payload.source_type)
        .bind(payload.source_year)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update problem")?;

    row.as_ref().map(problem_from_row).transpose()
}

async fn soft_delete_problem(pool: &PgPool, id: i64) -> Result<bool, anyhow::Error> {
    use anyhow::Context;

    let query = r"
        UPDATE problems
        SET is_deleted = TRUE, updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(id)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete problem")?;

    Ok(result.rows_affected() > 0)
}

async fn mark_published(pool: &PgPool, id: i64) -> Result<Option<Problem>, anyhow::Error> {
    use anyhow::Context;

    let sql = format!(
        r"
        UPDATE problems
        SET is_published = TRUE, updated_at = NOW()
        WHERE id = $1 AND is_deleted = FALSE
        RETURNING {PROBLEM_COLUMNS}
        "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = sql.as_str()
    );
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to publish problem")?;

    row.as_ref().map(problem_from_row).transpose()
}

fn problem_from_row(row: &PgRow) -> Result<Problem, anyhow::Error> {
    Ok(Problem {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        content_type: row.get("content_type"),
        options: row.get("options"),
        correct_answer: row.get("correct_answer"),
        solution: row.get("solution"),
        difficulty: row.get("difficulty"),
        source_type: row.get("source_type"),
        source_year: row.get("source_year"),
        is_published: row.get("is_published"),
        created_by: row.get("created_by"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::store::testing::identity;

    #[test]
    fn staff_projection_controls_answer_visibility() {
        let problem = Problem {
            id: 1,
            title: "AMC8 warmup".to_string(),
            content: "What is 2 + 2?".to_string(),
            content_type: "text".to_string(),
            options: serde_json::json!({"A": "3", "B": "4"}),
            correct_answer: "B".to_string(),
            solution: Some("Count on your fingers.".to_string()),
            difficulty: 1,
            source_type: Some("AMC8".to_string()),
            source_year: Some(2020),
            is_published: true,
            created_by: 7,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        };

        let student_view = ProblemResponse::for_viewer(&problem, false);
        assert!(student_view.correct_answer.is_none());
        assert!(student_view.solution.is_none());

        let staff_view = ProblemResponse::for_viewer(&problem, true);
        assert_eq!(staff_view.correct_answer.as_deref(), Some("B"));
        assert_eq!(
            staff_view.solution.as_deref(),
            Some("Count on your fingers.")
        );
    }

    #[test]
    fn staff_is_teacher_or_admin() {
        assert!(is_staff(&identity(1, "t", Role::Teacher, "digest")));
        assert!(is_staff(&identity(2, "a", Role::Admin, "digest")));
        assert!(!is_staff(&identity(3, "s", Role::Student, "digest")));
        assert!(!is_staff(&identity(4, "p", Role::Parent, "digest")));
    }

    #[test]
    fn difficulty_bounds() {
        assert!(valid_difficulty(1));
        assert!(valid_difficulty(5));
        assert!(!valid_difficulty(0));
        assert!(!valid_difficulty(6));
    }
}
