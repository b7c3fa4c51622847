use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{Duration as ChronoDuration, Utc};
use cookie::time::Duration as CookieDuration;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::web::error::ApiError;

pub const SESSION_COOKIE: &str = "token";
pub const SESSION_TTL_HOURS: i64 = 24;

/// Claims carried inside the session token. `sub` is the user id; `exp`
/// drives expiry checks so no session state lives in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Caller identity recovered from a valid session cookie.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: String,
}

#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn issue(&self, user_id: Uuid, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id,
            email: email.to_owned(),
            iat: now.timestamp(),
            exp: (now + ChronoDuration::hours(SESSION_TTL_HOURS)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    /// Decode and validate a token, returning `None` on any defect: bad
    /// signature, malformed payload or an `exp` in the past.
    pub fn verify(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .ok()
    }
}

pub fn session_cookie(token: String, secure: bool) -> Cookie<'static> {
    let mut cookie = Cookie::new(SESSION_COOKIE, token);
    cookie.set_path("/");
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_max_age(CookieDuration::hours(SESSION_TTL_HOURS));
    cookie.set_secure(secure);
    cookie
}

pub fn removal_cookie() -> Cookie<'static> {
    let mut removal = Cookie::new(SESSION_COOKIE, "");
    removal.set_path("/");
    removal.set_http_only(true);
    removal.set_same_site(SameSite::Strict);
    removal.set_max_age(CookieDuration::seconds(0));
    removal
}

/// Per-route session gate. Handlers behind authentication call this first
/// and bubble the `Unauthorized` rejection with `?`.
pub fn require_session(jar: &CookieJar, keys: &JwtKeys) -> Result<SessionUser, ApiError> {
    let cookie = jar.get(SESSION_COOKIE).ok_or(ApiError::Unauthorized)?;
    let claims = keys.verify(cookie.value()).ok_or(ApiError::Unauthorized)?;

    Ok(SessionUser {
        user_id: claims.sub,
        email: claims.email,
    })
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed = PasswordHash::new(password_hash);
    match parsed {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_and_verifies_passwords() {
        let hash = hash_password("correct horse").expect("hash password");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn rejects_garbage_password_hashes() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn issues_and_verifies_session_tokens() {
        let keys = JwtKeys::from_secret("unit-test-secret");
        let user_id = Uuid::new_v4();

        let token = keys.issue(user_id, "staff@example.edu").expect("issue token");
        let claims = keys.verify(&token).expect("verify token");

        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.email, "staff@example.edu");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rejects_tokens_signed_with_another_secret() {
        let keys = JwtKeys::from_secret("unit-test-secret");
        let other = JwtKeys::from_secret("different-secret");

        let token = keys.issue(Uuid::new_v4(), "staff@example.edu").expect("issue token");
        assert!(other.verify(&token).is_none());
    }

    #[test]
    fn rejects_expired_tokens() {
        let keys = JwtKeys::from_secret("unit-test-secret");
        let now = Utc::now();
        let claims = Claims {
            sub: Uuid::new_v4(),
            email: "staff@example.edu".to_string(),
            iat: (now - ChronoDuration::hours(2)).timestamp(),
            exp: (now - ChronoDuration::hours(1)).timestamp(),
        };

        let token = encode(&Header::default(), &claims, &keys.encoding).expect("encode token");
        assert!(keys.verify(&token).is_none());
    }

    #[test]
    fn recovers_the_session_from_a_cookie_jar() {
        let keys = JwtKeys::from_secret("unit-test-secret");
        let user_id = Uuid::new_v4();
        let token = keys.issue(user_id, "staff@example.edu").expect("issue token");

        let jar = CookieJar::new().add(session_cookie(token, false));
        let session = require_session(&jar, &keys).expect("valid session");

        assert_eq!(session.user_id, user_id);
        assert_eq!(session.email, "staff@example.edu");
    }

    #[test]
    fn missing_or_garbage_cookies_are_unauthorized() {
        let keys = JwtKeys::from_secret("unit-test-secret");

        assert!(matches!(
            require_session(&CookieJar::new(), &keys),
            Err(ApiError::Unauthorized)
        ));

        let forged = CookieJar::new().add(session_cookie("not-a-jwt".to_string(), false));
        assert!(matches!(
            require_session(&forged, &keys),
            Err(ApiError::Unauthorized)
        ));
    }

    #[test]
    fn session_cookie_carries_browser_protections() {
        let cookie = session_cookie("abc".to_string(), false);

        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(
            cookie.max_age(),
            Some(CookieDuration::hours(SESSION_TTL_HOURS))
        );

        let hardened = session_cookie("abc".to_string(), true);
        assert_eq!(hardened.secure(), Some(true));
    }

    #[test]
    fn removal_cookie_expires_immediately() {
        let removal = removal_cookie();

        assert_eq!(removal.name(), SESSION_COOKIE);
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(CookieDuration::seconds(0)));
    }
}
