use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState,
    modules::{parse_record_id, require_field},
    web::{ApiError, ApiMessage, SubjectRow, auth, error::is_unique_violation},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subjects/createSubject", post(create_subject))
        .route("/api/subjects/deleteSubject/:id", delete(delete_subject))
        .route("/api/subjects/updateSubject/:id", put(update_subject))
        .route("/api/subjects/getSubject/:id", get(get_subject))
        .route("/api/subjects/listSubjects", get(list_subjects))
        .route("/api/subjects/listAllSubjects", get(list_all_subjects))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubjectRequest {
    #[serde(default)]
    subject_code: String,
    #[serde(default)]
    subject_title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    semester: String,
    #[serde(default)]
    instructor_name: String,
}

#[derive(Debug)]
struct SubjectInput {
    subject_code: String,
    subject_title: String,
    description: String,
    department: String,
    semester: String,
    instructor_name: String,
}

impl CreateSubjectRequest {
    fn validate(&self) -> Result<SubjectInput, ApiError> {
        let subject_code = require_field(&self.subject_code, "All the fields are required")?;
        let subject_title = require_field(&self.subject_title, "All the fields are required")?;
        let department = require_field(&self.department, "All the fields are required")?;
        let semester = require_field(&self.semester, "All the fields are required")?;

        Ok(SubjectInput {
            subject_code: subject_code.to_owned(),
            subject_title: subject_title.to_owned(),
            description: self.description.trim().to_owned(),
            department: department.to_owned(),
            semester: semester.to_owned(),
            instructor_name: self.instructor_name.trim().to_owned(),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateSubjectRequest {
    subject_code: Option<String>,
    subject_title: Option<String>,
    description: Option<String>,
    department: Option<String>,
    semester: Option<String>,
    instructor_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectPayload {
    id: Uuid,
    subject_code: String,
    subject_title: String,
    description: String,
    department: String,
    semester: String,
    instructor_name: String,
    user_id: Uuid,
    created_at: String,
    updated_at: String,
}

impl From<SubjectRow> for SubjectPayload {
    fn from(row: SubjectRow) -> Self {
        Self {
            id: row.id,
            subject_code: row.subject_code,
            subject_title: row.subject_title,
            description: row.description,
            department: row.department,
            semester: row.semester,
            instructor_name: row.instructor_name,
            user_id: row.user_id,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct SubjectResponse {
    message: String,
    subject: SubjectPayload,
}

#[derive(Serialize)]
struct SubjectListResponse {
    message: String,
    subjects: Vec<SubjectPayload>,
}

async fn create_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<CreateSubjectRequest>,
) -> Result<(StatusCode, Json<SubjectResponse>), ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;
    let input = body.validate()?;

    let pool = state.pool();

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM subjects WHERE subject_code = $1")
            .bind(&input.subject_code)
            .fetch_optional(&pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("Subject already exists"));
    }

    let insert = sqlx::query_as::<_, SubjectRow>(
        "INSERT INTO subjects (id, subject_code, subject_title, description, department, semester, instructor_name, user_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&input.subject_code)
    .bind(&input.subject_title)
    .bind(&input.description)
    .bind(&input.department)
    .bind(&input.semester)
    .bind(&input.instructor_name)
    .bind(session.user_id)
    .fetch_one(&pool)
    .await;

    let subject = match insert {
        Ok(row) => row,
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::conflict("Subject already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(SubjectResponse {
            message: "Subject created successfully".to_string(),
            subject: subject.into(),
        }),
    ))
}

async fn delete_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;
    let subject_id = parse_record_id(&id)?;

    let pool = state.pool();

    let subject = fetch_subject(&pool, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject does not exist"))?;

    if subject.user_id != session.user_id {
        return Err(ApiError::forbidden("You do not own this subject"));
    }

    // Files referencing this subject keep their rows; there is no foreign
    // key and the denormalized label stays usable for display.
    sqlx::query("DELETE FROM subjects WHERE id = $1")
        .bind(subject_id)
        .execute(&pool)
        .await?;

    Ok(Json(ApiMessage::new("Subject deleted successfully")))
}

async fn update_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<UpdateSubjectRequest>,
) -> Result<Json<ApiMessage>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;
    let subject_id = parse_record_id(&id)?;

    let pool = state.pool();

    let subject = fetch_subject(&pool, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject does not exist"))?;

    if subject.user_id != session.user_id {
        return Err(ApiError::forbidden("You do not own this subject"));
    }

    let update = sqlx::query(
        "UPDATE subjects SET subject_code = COALESCE($2, subject_code), subject_title = COALESCE($3, subject_title), description = COALESCE($4, description), department = COALESCE($5, department), semester = COALESCE($6, semester), instructor_name = COALESCE($7, instructor_name), updated_at = NOW() WHERE id = $1",
    )
    .bind(subject_id)
    .bind(trimmed(body.subject_code))
    .bind(trimmed(body.subject_title))
    .bind(trimmed(body.description))
    .bind(trimmed(body.department))
    .bind(trimmed(body.semester))
    .bind(trimmed(body.instructor_name))
    .execute(&pool)
    .await;

    match update {
        Ok(_) => {}
        // Renaming onto an already-used subjectCode trips the unique index.
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::conflict("Subject already exists"));
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Json(ApiMessage::new("Subject updated successfully")))
}

async fn get_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<SubjectResponse>, ApiError> {
    auth::require_session(&jar, state.jwt())?;
    let subject_id = parse_record_id(&id)?;

    let pool = state.pool();

    let subject = fetch_subject(&pool, subject_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Subject does not exist"))?;

    Ok(Json(SubjectResponse {
        message: "Subject fetched successfully".to_string(),
        subject: subject.into(),
    }))
}

async fn list_subjects(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SubjectListResponse>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;

    let pool = state.pool();

    let subjects = sqlx::query_as::<_, SubjectRow>(
        "SELECT id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at FROM subjects WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(session.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(SubjectListResponse {
        message: "Subjects fetched successfully".to_string(),
        subjects: subjects.into_iter().map(Into::into).collect(),
    }))
}

async fn list_all_subjects(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<SubjectListResponse>, ApiError> {
    auth::require_session(&jar, state.jwt())?;

    let pool = state.pool();

    let subjects = sqlx::query_as::<_, SubjectRow>(
        "SELECT id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at FROM subjects ORDER BY created_at DESC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(SubjectListResponse {
        message: "Subjects fetched successfully".to_string(),
        subjects: subjects.into_iter().map(Into::into).collect(),
    }))
}

async fn fetch_subject(pool: &PgPool, subject_id: Uuid) -> sqlx::Result<Option<SubjectRow>> {
    sqlx::query_as::<_, SubjectRow>(
        "SELECT id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at FROM subjects WHERE id = $1",
    )
    .bind(subject_id)
    .fetch_optional(pool)
    .await
}

fn trimmed(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> CreateSubjectRequest {
        CreateSubjectRequest {
            subject_code: " CS101 ".to_string(),
            subject_title: "Intro to Programming".to_string(),
            description: String::new(),
            department: "Computer Engineering".to_string(),
            semester: "Semester 1".to_string(),
            instructor_name: String::new(),
        }
    }

    #[test]
    fn create_request_trims_and_defaults_optionals() {
        let input = full_request().validate().expect("valid request");

        assert_eq!(input.subject_code, "CS101");
        assert_eq!(input.subject_title, "Intro to Programming");
        assert_eq!(input.description, "");
        assert_eq!(input.instructor_name, "");
    }

    #[test]
    fn create_request_requires_core_fields() {
        let mut request = full_request();
        request.department = "   ".to_string();

        let err = request.validate().expect_err("blank department");
        assert!(
            matches!(err, ApiError::Validation(message) if message == "All the fields are required")
        );
    }

    #[test]
    fn update_fields_are_trimmed_only_when_supplied() {
        assert_eq!(trimmed(Some("  CS102  ".to_string())), Some("CS102".to_string()));
        assert_eq!(trimmed(None), None);
    }
}
