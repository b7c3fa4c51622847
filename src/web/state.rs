use std::{env, sync::Arc};

use anyhow::{Context, Result, anyhow};
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;
use uuid::Uuid;

use crate::{mail::MailClient, storage::StorageClient, web::auth::JwtKeys};

const SEED_ADMIN_USERNAME: &str = "admin";
const SEED_ADMIN_EMAIL: &str = "admin@studyshare.local";
const SEED_ADMIN_PASSWORD: &str = "change-me";

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    jwt: Arc<JwtKeys>,
    mailer: MailClient,
    storage: StorageClient,
    cookie_secure: bool,
}

impl AppState {
    pub async fn new() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL env var is missing")?;
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET env var is missing")?;

        let mailer = MailClient::from_env().context("failed to initialize mail client")?;
        let storage = StorageClient::from_env().context("failed to initialize storage client")?;

        // Browsers drop Secure cookies on plain-http dev setups, so the flag
        // only goes on in production.
        let cookie_secure = env::var("APP_ENV")
            .map(|value| value == "production")
            .unwrap_or(false);

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run database migrations")?;

        Ok(Self {
            pool,
            jwt: Arc::new(JwtKeys::from_secret(&jwt_secret)),
            mailer,
            storage,
            cookie_secure,
        })
    }

    pub async fn ensure_seed_admin(&self) -> Result<()> {
        let has_admin: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE is_admin = TRUE)")
                .fetch_one(&self.pool)
                .await
                .context("failed to verify admin presence")?;

        if !has_admin {
            let email =
                env::var("SEED_ADMIN_EMAIL").unwrap_or_else(|_| SEED_ADMIN_EMAIL.to_string());
            let password =
                env::var("SEED_ADMIN_PASSWORD").unwrap_or_else(|_| SEED_ADMIN_PASSWORD.to_string());

            let password_hash = crate::web::auth::hash_password(&password)
                .map_err(|err| anyhow!("failed to hash seed admin password: {err}"))?;

            sqlx::query(
                "INSERT INTO users (id, username, email, password_hash, is_admin) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(Uuid::new_v4())
            .bind(SEED_ADMIN_USERNAME)
            .bind(&email)
            .bind(password_hash)
            .bind(true)
            .execute(&self.pool)
            .await
            .context("failed to insert seed admin user")?;

            info!(%email, "Seeded default admin account. Update its password promptly.");
        }

        Ok(())
    }

    pub fn pool(&self) -> PgPool {
        self.pool.clone()
    }

    pub fn pool_ref(&self) -> &PgPool {
        &self.pool
    }

    pub fn jwt(&self) -> &JwtKeys {
        &self.jwt
    }

    pub fn mailer(&self) -> &MailClient {
        &self.mailer
    }

    pub fn storage(&self) -> &StorageClient {
        &self.storage
    }

    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }
}
