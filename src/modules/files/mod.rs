use axum::{
    Json, Router,
    extract::{Path as AxumPath, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    AppState,
    modules::{parse_record_id, require_field},
    web::{ApiError, ApiMessage, FileRow, SubjectRow, auth, error::is_unique_violation},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/files/createfile", post(create_file))
        .route("/api/files/deletefile/:id", delete(delete_file))
        .route("/api/files/findFileByUserId", get(find_files_by_user))
        .route("/api/files/findFileByFileId/:id", get(find_file_by_id))
        .route("/api/files/findFileBySubjectId/:id", get(find_files_by_subject))
        .route("/api/files/findAllFiles", get(find_all_files))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateFileRequest {
    #[serde(default)]
    file_unique_name: String,
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    file_title: String,
    #[serde(default)]
    file_type: String,
    #[serde(default)]
    file_url: String,
    file_path: Option<String>,
    #[serde(default)]
    file_size: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    instructor_name: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    semester: String,
    subject_id: Option<Uuid>,
    /// Legacy clients send a free-text label instead of `subjectId`; it is
    /// matched against the subject code at ingestion.
    subject: Option<String>,
}

#[derive(Debug)]
struct FileInput {
    file_unique_name: String,
    file_name: String,
    file_title: String,
    file_type: String,
    file_url: String,
    file_path: Option<String>,
    file_size: String,
    description: String,
    instructor_name: String,
    department: String,
    semester: String,
    subject: SubjectRef,
}

/// How an incoming file record points at its subject.
#[derive(Debug, PartialEq)]
enum SubjectRef {
    Id(Uuid),
    LegacyLabel(String),
}

impl CreateFileRequest {
    fn validate(&self) -> Result<FileInput, ApiError> {
        let file_unique_name = require_field(&self.file_unique_name, "All the fields are required")?;
        let file_name = require_field(&self.file_name, "All the fields are required")?;
        let file_title = require_field(&self.file_title, "All the fields are required")?;
        let file_type = require_field(&self.file_type, "All the fields are required")?;
        let file_url = require_field(&self.file_url, "All the fields are required")?;
        let file_size = require_field(&self.file_size, "All the fields are required")?;

        let subject = subject_reference(self.subject_id, self.subject.as_deref())?;

        let file_path = self
            .file_path
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        Ok(FileInput {
            file_unique_name: file_unique_name.to_owned(),
            file_name: file_name.to_owned(),
            file_title: file_title.to_owned(),
            file_type: file_type.to_owned(),
            file_url: file_url.to_owned(),
            file_path,
            file_size: file_size.to_owned(),
            description: self.description.trim().to_owned(),
            instructor_name: self.instructor_name.trim().to_owned(),
            department: self.department.trim().to_owned(),
            semester: self.semester.trim().to_owned(),
            subject,
        })
    }
}

fn subject_reference(subject_id: Option<Uuid>, label: Option<&str>) -> Result<SubjectRef, ApiError> {
    if let Some(id) = subject_id {
        return Ok(SubjectRef::Id(id));
    }

    match label.map(str::trim).filter(|value| !value.is_empty()) {
        Some(label) => Ok(SubjectRef::LegacyLabel(label.to_owned())),
        None => Err(ApiError::validation("All the fields are required")),
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FilePayload {
    id: Uuid,
    file_unique_name: String,
    file_name: String,
    file_title: String,
    file_type: String,
    file_url: String,
    file_path: Option<String>,
    file_size: String,
    description: String,
    instructor_name: String,
    department: String,
    semester: String,
    subject: String,
    subject_id: Uuid,
    user_id: Uuid,
    created_at: String,
    updated_at: String,
}

impl From<FileRow> for FilePayload {
    fn from(row: FileRow) -> Self {
        Self {
            id: row.id,
            file_unique_name: row.file_unique_name,
            file_name: row.file_name,
            file_title: row.file_title,
            file_type: row.file_type,
            file_url: row.file_url,
            file_path: row.file_path,
            file_size: row.file_size,
            description: row.description,
            instructor_name: row.instructor_name,
            department: row.department,
            semester: row.semester,
            subject: row.subject_label,
            subject_id: row.subject_id,
            user_id: row.user_id,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
struct FileResponse {
    message: String,
    file: FilePayload,
}

#[derive(Serialize)]
struct FileListResponse {
    message: String,
    files: Vec<FilePayload>,
}

async fn create_file(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<CreateFileRequest>,
) -> Result<(StatusCode, Json<FileResponse>), ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;
    let input = body.validate()?;

    let pool = state.pool();

    let subject = resolve_subject(&pool, &input.subject).await?;

    let existing: Option<Uuid> =
        sqlx::query_scalar("SELECT id FROM files WHERE file_unique_name = $1")
            .bind(&input.file_unique_name)
            .fetch_optional(&pool)
            .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("File already exists"));
    }

    let insert = sqlx::query_as::<_, FileRow>(
        "INSERT INTO files (id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) RETURNING id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&input.file_unique_name)
    .bind(&input.file_name)
    .bind(&input.file_title)
    .bind(&input.file_type)
    .bind(&input.file_url)
    .bind(&input.file_path)
    .bind(&input.file_size)
    .bind(&input.description)
    .bind(&input.instructor_name)
    .bind(&input.department)
    .bind(&input.semester)
    .bind(subject.id)
    .bind(&subject.subject_code)
    .bind(session.user_id)
    .fetch_one(&pool)
    .await;

    let file = match insert {
        Ok(row) => row,
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::conflict("File already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    Ok((
        StatusCode::CREATED,
        Json(FileResponse {
            message: "File created successfully".to_string(),
            file: file.into(),
        }),
    ))
}

/// Two stores hold a file: the metadata row here and the blob in object
/// storage. Deletion tries the blob first; when that fails the failure is
/// queued for the reconciliation sweep and the metadata delete proceeds
/// anyway, so the row never outlives the request.
async fn delete_file(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<ApiMessage>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;
    let file_id = parse_record_id(&id)?;

    let pool = state.pool();

    let file = fetch_file(&pool, file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("File does not exist"))?;

    if file.user_id != session.user_id {
        return Err(ApiError::forbidden("You do not own this file"));
    }

    if let Some(object_path) = file
        .file_path
        .as_deref()
        .map(str::trim)
        .filter(|path| !path.is_empty())
    {
        match state.storage().delete_object(object_path).await {
            Ok(()) => info!(file_id = %file.id, user = %session.email, "removed stored blob"),
            Err(err) => {
                warn!(?err, file_id = %file.id, object_path, "blob deletion failed, queueing reconciliation");
                if let Err(insert_err) =
                    record_reconciliation(&pool, &file, state.storage().bucket(), object_path, &err)
                        .await
                {
                    error!(?insert_err, file_id = %file.id, "failed to queue storage reconciliation");
                }
            }
        }
    }

    sqlx::query("DELETE FROM files WHERE id = $1")
        .bind(file.id)
        .execute(&pool)
        .await?;

    Ok(Json(ApiMessage::new("File deleted successfully")))
}

async fn find_files_by_user(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<FileListResponse>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;

    let pool = state.pool();

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id, created_at, updated_at FROM files WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(session.user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(FileListResponse {
        message: "Files fetched successfully".to_string(),
        files: files.into_iter().map(Into::into).collect(),
    }))
}

async fn find_file_by_id(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<FileResponse>, ApiError> {
    auth::require_session(&jar, state.jwt())?;
    let file_id = parse_record_id(&id)?;

    let pool = state.pool();

    let file = fetch_file(&pool, file_id)
        .await?
        .ok_or_else(|| ApiError::not_found("File does not exist"))?;

    Ok(Json(FileResponse {
        message: "File fetched successfully".to_string(),
        file: file.into(),
    }))
}

async fn find_files_by_subject(
    State(state): State<AppState>,
    jar: CookieJar,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<FileListResponse>, ApiError> {
    auth::require_session(&jar, state.jwt())?;
    let subject_id = parse_record_id(&id)?;

    let pool = state.pool();

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id, created_at, updated_at FROM files WHERE subject_id = $1 ORDER BY created_at DESC",
    )
    .bind(subject_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(FileListResponse {
        message: "Files fetched successfully".to_string(),
        files: files.into_iter().map(Into::into).collect(),
    }))
}

async fn find_all_files(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<FileListResponse>, ApiError> {
    auth::require_session(&jar, state.jwt())?;

    let pool = state.pool();

    let files = sqlx::query_as::<_, FileRow>(
        "SELECT id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id, created_at, updated_at FROM files ORDER BY created_at DESC",
    )
    .fetch_all(&pool)
    .await?;

    Ok(Json(FileListResponse {
        message: "Files fetched successfully".to_string(),
        files: files.into_iter().map(Into::into).collect(),
    }))
}

async fn resolve_subject(pool: &PgPool, reference: &SubjectRef) -> Result<SubjectRow, ApiError> {
    let subject = match reference {
        SubjectRef::Id(id) => {
            sqlx::query_as::<_, SubjectRow>(
                "SELECT id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at FROM subjects WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(pool)
            .await?
        }
        SubjectRef::LegacyLabel(label) => {
            sqlx::query_as::<_, SubjectRow>(
                "SELECT id, subject_code, subject_title, description, department, semester, instructor_name, user_id, created_at, updated_at FROM subjects WHERE subject_code = $1",
            )
            .bind(label)
            .fetch_optional(pool)
            .await?
        }
    };

    subject.ok_or_else(|| ApiError::not_found("Subject does not exist"))
}

async fn fetch_file(pool: &PgPool, file_id: Uuid) -> sqlx::Result<Option<FileRow>> {
    sqlx::query_as::<_, FileRow>(
        "SELECT id, file_unique_name, file_name, file_title, file_type, file_url, file_path, file_size, description, instructor_name, department, semester, subject_id, subject_label, user_id, created_at, updated_at FROM files WHERE id = $1",
    )
    .bind(file_id)
    .fetch_optional(pool)
    .await
}

async fn record_reconciliation(
    pool: &PgPool,
    file: &FileRow,
    bucket: &str,
    object_path: &str,
    cause: &anyhow::Error,
) -> sqlx::Result<()> {
    sqlx::query(
        "INSERT INTO storage_reconciliation (id, file_id, bucket, object_path, failure_reason) VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(Uuid::new_v4())
    .bind(file.id)
    .bind(bucket)
    .bind(object_path)
    .bind(format!("{cause:#}"))
    .execute(pool)
    .await
    .map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> CreateFileRequest {
        CreateFileRequest {
            file_unique_name: "1699999999-lecture1.pdf".to_string(),
            file_name: "lecture1.pdf".to_string(),
            file_title: "Lecture 1".to_string(),
            file_type: "application/pdf".to_string(),
            file_url: "https://store.example.com/FilesUOJ/lecture1.pdf".to_string(),
            file_path: Some(" notes/lecture1.pdf ".to_string()),
            file_size: "2.4 MB".to_string(),
            description: String::new(),
            instructor_name: String::new(),
            department: "Computer Engineering".to_string(),
            semester: "Semester 1".to_string(),
            subject_id: None,
            subject: Some(" CS101 ".to_string()),
        }
    }

    #[test]
    fn prefers_canonical_subject_id_over_legacy_label() {
        let id = Uuid::new_v4();

        let reference =
            subject_reference(Some(id), Some("CS101")).expect("canonical reference");
        assert_eq!(reference, SubjectRef::Id(id));
    }

    #[test]
    fn falls_back_to_trimmed_legacy_label() {
        let reference = subject_reference(None, Some(" CS101 ")).expect("legacy reference");
        assert_eq!(reference, SubjectRef::LegacyLabel("CS101".to_string()));
    }

    #[test]
    fn rejects_missing_subject_reference() {
        assert!(subject_reference(None, None).is_err());
        assert!(subject_reference(None, Some("   ")).is_err());
    }

    #[test]
    fn create_request_requires_core_fields() {
        let mut request = full_request();
        request.file_url = String::new();

        let err = request.validate().expect_err("blank url");
        assert!(
            matches!(err, ApiError::Validation(message) if message == "All the fields are required")
        );
    }

    #[test]
    fn create_request_normalizes_optional_path() {
        let input = full_request().validate().expect("valid request");
        assert_eq!(input.file_path.as_deref(), Some("notes/lecture1.pdf"));
        assert_eq!(input.subject, SubjectRef::LegacyLabel("CS101".to_string()));

        let mut request = full_request();
        request.file_path = Some("   ".to_string());
        let input = request.validate().expect("valid request");
        assert_eq!(input.file_path, None);
    }
}
