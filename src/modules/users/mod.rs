use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
};
use axum_extra::extract::cookie::CookieJar;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    AppState, mail,
    modules::require_field,
    web::{ApiError, ApiMessage, UserProfile, UserRow, auth, error::is_unique_violation},
};

const OTP_TTL_MINUTES: i64 = 10;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users/login", post(login))
        .route("/api/users/logout", post(logout))
        .route("/api/users/sendotp", post(send_otp))
        .route("/api/users/verifyotp", post(verify_otp))
        .route("/api/users/forgotpassword", put(forgot_password))
        .route("/api/users/dashboard", get(dashboard))
}

#[derive(Deserialize)]
struct RegisterRequest {
    #[serde(default)]
    username: String,
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
    #[serde(default)]
    department: String,
    #[serde(default)]
    semester: String,
}

#[derive(Debug)]
struct RegisterInput {
    username: String,
    email: String,
    password: String,
    department: String,
    semester: String,
}

impl RegisterRequest {
    fn validate(&self) -> Result<RegisterInput, ApiError> {
        let username = require_field(&self.username, "All fields are required")?;
        let email = require_field(&self.email, "All fields are required")?;
        let password = require_field(&self.password, "All fields are required")?;
        let department = require_field(&self.department, "All fields are required")?;
        let semester = require_field(&self.semester, "All fields are required")?;

        Ok(RegisterInput {
            username: username.to_owned(),
            email: email.to_owned(),
            password: password.to_owned(),
            department: department.to_owned(),
            semester: semester.to_owned(),
        })
    }
}

#[derive(Deserialize)]
struct LoginRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Deserialize)]
struct SendOtpRequest {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
struct VerifyOtpRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    otp: String,
}

#[derive(Deserialize)]
struct ForgotPasswordRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Serialize)]
struct AuthResponse {
    message: String,
    user: UserProfile,
    token: String,
}

#[derive(Serialize)]
struct ProfileResponse {
    message: String,
    user: UserProfile,
}

async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, CookieJar, Json<AuthResponse>), ApiError> {
    let input = body.validate()?;

    let pool = state.pool();

    let existing: Option<Uuid> = sqlx::query_scalar("SELECT id FROM users WHERE email = $1")
        .bind(&input.email)
        .fetch_optional(&pool)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("User already exists"));
    }

    let password_hash = auth::hash_password(&input.password)
        .map_err(|err| ApiError::internal(anyhow::anyhow!("failed to hash password: {err}")))?;

    let insert = sqlx::query_as::<_, UserRow>(
        "INSERT INTO users (id, username, email, password_hash, department, semester) VALUES ($1, $2, $3, $4, $5, $6) RETURNING id, username, email, password_hash, is_admin, department, semester, otp_code, otp_expires_at, is_verified, created_at, updated_at",
    )
    .bind(Uuid::new_v4())
    .bind(&input.username)
    .bind(&input.email)
    .bind(&password_hash)
    .bind(&input.department)
    .bind(&input.semester)
    .fetch_one(&pool)
    .await;

    let user = match insert {
        Ok(row) => row,
        // Two concurrent registrations can both pass the existence check;
        // the unique index on email settles the race.
        Err(err) if is_unique_violation(&err) => {
            return Err(ApiError::conflict("User already exists"));
        }
        Err(err) => return Err(err.into()),
    };

    let token = state
        .jwt()
        .issue(user.id, &user.email)
        .map_err(|err| ApiError::internal(err.into()))?;
    let jar = jar.add(auth::session_cookie(token.clone(), state.cookie_secure()));

    Ok((
        StatusCode::CREATED,
        jar,
        Json(AuthResponse {
            message: "User registered successfully".to_string(),
            user: user.into(),
            token,
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<LoginRequest>,
) -> Result<(CookieJar, Json<AuthResponse>), ApiError> {
    let email = require_field(&body.email, "Email and password required")?;
    let password = require_field(&body.password, "Email and password required")?;

    let pool = state.pool();

    let user = fetch_user_by_email(&pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    if !auth::verify_password(password, &user.password_hash) {
        return Err(ApiError::auth("Invalid credentials"));
    }

    let token = state
        .jwt()
        .issue(user.id, &user.email)
        .map_err(|err| ApiError::internal(err.into()))?;
    let jar = jar.add(auth::session_cookie(token.clone(), state.cookie_secure()));

    Ok((
        jar,
        Json(AuthResponse {
            message: "User logged in successfully".to_string(),
            user: user.into(),
            token,
        }),
    ))
}

/// Sessions live entirely in the signed cookie, so logging out is just
/// telling the browser to drop it.
async fn logout(jar: CookieJar) -> (CookieJar, Json<ApiMessage>) {
    let jar = jar.remove(auth::removal_cookie());
    (jar, Json(ApiMessage::new("User logged out successfully")))
}

async fn send_otp(
    State(state): State<AppState>,
    Json(body): Json<SendOtpRequest>,
) -> Result<Json<ApiMessage>, ApiError> {
    let email = require_field(&body.email, "Email is required")?;

    let pool = state.pool();

    let user = fetch_user_by_email(&pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    let code = generate_otp();
    let mail = mail::password_reset_email(&user.username, &user.email, &code);

    // Deliver before persisting: if the relay rejects the message no code
    // is left dangling on the account.
    state.mailer().send(&mail).await.map_err(ApiError::internal)?;

    let expires_at = Utc::now() + ChronoDuration::minutes(OTP_TTL_MINUTES);
    sqlx::query(
        "UPDATE users SET otp_code = $2, otp_expires_at = $3, is_verified = FALSE, updated_at = NOW() WHERE id = $1",
    )
    .bind(user.id)
    .bind(&code)
    .bind(expires_at)
    .execute(&pool)
    .await?;

    Ok(Json(ApiMessage::new("OTP sent successfully")))
}

async fn verify_otp(
    State(state): State<AppState>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let email = require_field(&body.email, "Email and OTP are required")?;
    let otp = require_field(&body.otp, "Email and OTP are required")?;

    let pool = state.pool();

    let user = fetch_user_by_email(&pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    check_otp(user.otp_code.as_deref(), user.otp_expires_at, otp, Utc::now())?;

    let user = sqlx::query_as::<_, UserRow>(
        "UPDATE users SET is_verified = TRUE, otp_code = NULL, otp_expires_at = NULL, updated_at = NOW() WHERE id = $1 RETURNING id, username, email, password_hash, is_admin, department, semester, otp_code, otp_expires_at, is_verified, created_at, updated_at",
    )
    .bind(user.id)
    .fetch_one(&pool)
    .await?;

    Ok(Json(ProfileResponse {
        message: "OTP verified successfully".to_string(),
        user: user.into(),
    }))
}

async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiMessage>, ApiError> {
    let email = require_field(&body.email, "Email and new password are required")?;
    let password = require_field(&body.password, "Email and new password are required")?;

    let pool = state.pool();

    let user = fetch_user_by_email(&pool, email)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    ensure_verified(&user)?;

    let password_hash = auth::hash_password(password)
        .map_err(|err| ApiError::internal(anyhow::anyhow!("failed to hash password: {err}")))?;

    sqlx::query("UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(&password_hash)
        .execute(&pool)
        .await?;

    Ok(Json(ApiMessage::new("Password changed successfully")))
}

async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
) -> Result<Json<ProfileResponse>, ApiError> {
    let session = auth::require_session(&jar, state.jwt())?;

    let pool = state.pool();

    let user = fetch_user_by_id(&pool, session.user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User does not exist"))?;

    Ok(Json(ProfileResponse {
        message: "Welcome to the dashboard".to_string(),
        user: user.into(),
    }))
}

async fn fetch_user_by_email(pool: &PgPool, email: &str) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash, is_admin, department, semester, otp_code, otp_expires_at, is_verified, created_at, updated_at FROM users WHERE email = $1",
    )
    .bind(email)
    .fetch_optional(pool)
    .await
}

async fn fetch_user_by_id(pool: &PgPool, user_id: Uuid) -> sqlx::Result<Option<UserRow>> {
    sqlx::query_as::<_, UserRow>(
        "SELECT id, username, email, password_hash, is_admin, department, semester, otp_code, otp_expires_at, is_verified, created_at, updated_at FROM users WHERE id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

fn generate_otp() -> String {
    let code: u32 = OsRng.gen_range(100_000..=999_999);
    code.to_string()
}

/// Password resets only serve accounts that proved OTP ownership first.
fn ensure_verified(user: &UserRow) -> Result<(), ApiError> {
    if user.is_verified {
        Ok(())
    } else {
        Err(ApiError::auth("User is not verified"))
    }
}

/// Decide whether a submitted reset code is usable. Checked strictly in
/// order: a cleared or never-issued code reads as "No OTP requested" even
/// when the submitted value matches a previously consumed one.
fn check_otp(
    stored_code: Option<&str>,
    stored_expiry: Option<DateTime<Utc>>,
    submitted: &str,
    now: DateTime<Utc>,
) -> Result<(), ApiError> {
    let (code, expires_at) = match (stored_code, stored_expiry) {
        (Some(code), Some(expires_at)) => (code, expires_at),
        _ => return Err(ApiError::validation("No OTP requested")),
    };

    if code != submitted {
        return Err(ApiError::auth("Invalid OTP"));
    }

    if now > expires_at {
        return Err(ApiError::expired("OTP expired"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_request() -> RegisterRequest {
        RegisterRequest {
            username: "nilani".to_string(),
            email: "nilani@example.edu".to_string(),
            password: "correct horse".to_string(),
            department: "Computer Engineering".to_string(),
            semester: " Semester 1 ".to_string(),
        }
    }

    fn sample_user(is_verified: bool) -> UserRow {
        UserRow {
            id: Uuid::new_v4(),
            username: "nilani".to_string(),
            email: "nilani@example.edu".to_string(),
            password_hash: "unused".to_string(),
            is_admin: false,
            department: "Computer Engineering".to_string(),
            semester: "Semester 1".to_string(),
            otp_code: None,
            otp_expires_at: None,
            is_verified,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn register_request_trims_fields() {
        let input = full_request().validate().expect("valid request");

        assert_eq!(input.username, "nilani");
        assert_eq!(input.semester, "Semester 1");
    }

    #[test]
    fn register_request_requires_every_field() {
        let mut request = full_request();
        request.password = String::new();

        let err = request.validate().expect_err("blank password");
        assert!(matches!(err, ApiError::Validation(message) if message == "All fields are required"));
    }

    #[test]
    fn unverified_accounts_cannot_reset_passwords() {
        let err = ensure_verified(&sample_user(false)).expect_err("unverified account");
        assert!(matches!(err, ApiError::Auth(message) if message == "User is not verified"));

        assert!(ensure_verified(&sample_user(true)).is_ok());
    }

    #[test]
    fn otp_codes_are_six_digit_numbers() {
        for _ in 0..64 {
            let code = generate_otp();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().expect("numeric code");
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn accepts_matching_code_before_expiry() {
        let now = Utc::now();
        let expiry = now + ChronoDuration::minutes(OTP_TTL_MINUTES);

        assert!(check_otp(Some("123456"), Some(expiry), "123456", now).is_ok());
    }

    #[test]
    fn rejects_when_no_code_was_requested() {
        let now = Utc::now();

        let err = check_otp(None, None, "123456", now).expect_err("no code stored");
        assert!(matches!(err, ApiError::Validation(message) if message == "No OTP requested"));
    }

    #[test]
    fn rejects_mismatched_code() {
        let now = Utc::now();
        let expiry = now + ChronoDuration::minutes(OTP_TTL_MINUTES);

        let err = check_otp(Some("123456"), Some(expiry), "654321", now).expect_err("wrong code");
        assert!(matches!(err, ApiError::Auth(message) if message == "Invalid OTP"));
    }

    #[test]
    fn rejects_correct_code_after_expiry() {
        let now = Utc::now();
        let expiry = now - ChronoDuration::seconds(1);

        let err = check_otp(Some("123456"), Some(expiry), "123456", now).expect_err("stale code");
        assert!(matches!(err, ApiError::Expired(message) if message == "OTP expired"));
    }

    #[test]
    fn replaying_a_consumed_code_reads_as_never_requested() {
        // After a successful verification both columns are cleared, so a
        // replay of the same code must not look like a mismatch.
        let now = Utc::now();

        let err = check_otp(None, None, "123456", now).expect_err("cleared code");
        assert!(matches!(err, ApiError::Validation(message) if message == "No OTP requested"));
    }
}
