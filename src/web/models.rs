use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Clone, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub department: String,
    pub semester: String,
    pub otp_code: Option<String>,
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Account shape handed back to clients. Built from [`UserRow`] so the
/// password hash and OTP columns can never leak into a response body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub is_admin: bool,
    pub department: String,
    pub semester: String,
    pub is_verified: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRow> for UserProfile {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            is_admin: row.is_admin,
            department: row.department,
            semester: row.semester,
            is_verified: row.is_verified,
            created_at: row.created_at.to_rfc3339(),
            updated_at: row.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Clone, FromRow)]
pub struct SubjectRow {
    pub id: Uuid,
    pub subject_code: String,
    pub subject_title: String,
    pub description: String,
    pub department: String,
    pub semester: String,
    pub instructor_name: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, FromRow)]
pub struct FileRow {
    pub id: Uuid,
    pub file_unique_name: String,
    pub file_name: String,
    pub file_title: String,
    pub file_type: String,
    pub file_url: String,
    pub file_path: Option<String>,
    pub file_size: String,
    pub description: String,
    pub instructor_name: String,
    pub department: String,
    pub semester: String,
    pub subject_id: Uuid,
    pub subject_label: String,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
