//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, the concrete implementation of the
//! `PoemRepository` and `AuthService` ports from the core crate. It handles all
//! interactions with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use raven_core::domain::{AuthSession, Feedback, Poem, ResetTicket, User, UserCredentials};
use raven_core::ports::{
    AuthService, CloudStatus, PoemRepository, PortError, PortResult, ResetLinkError,
};
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::adapters::credentials::{
    check_token_shape, classify_reset, generate_reset_token, hash_password, hash_reset_token,
    verify_password, ResetRow,
};

/// Postgres error code for a missing relation.
const UNDEFINED_TABLE: &str = "42P01";
/// Postgres error code for a unique constraint violation.
const UNIQUE_VIOLATION: &str = "23505";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `PoemRepository` and `AuthService` ports.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
    session_ttl: Duration,
    reset_token_ttl: Duration,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool, session_ttl: Duration, reset_token_ttl: Duration) -> Self {
        Self {
            pool,
            session_ttl,
            reset_token_ttl,
        }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(normalize_email(email))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            _ => unexpected(e),
        })?;
        Ok(record.to_domain())
    }

    async fn find_reset(&self, token: &str) -> PortResult<Option<ResetRow>> {
        let record = sqlx::query_as::<_, ResetRecord>(
            "SELECT user_id, expires_at, used_at FROM password_resets WHERE token_hash = $1",
        )
        .bind(hash_reset_token(token))
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.map(ResetRecord::to_row))
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct SessionUserRecord {
    user_id: Uuid,
    email: String,
}

#[derive(FromRow)]
struct ResetRecord {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}
impl ResetRecord {
    fn to_row(self) -> ResetRow {
        ResetRow {
            user_id: self.user_id,
            expires_at: self.expires_at,
            used: self.used_at.is_some(),
        }
    }
}

/// A row of the poems table. `feedback` holds the critique as a JSON string.
#[derive(FromRow)]
pub(crate) struct PoemRecord {
    pub(crate) id: Uuid,
    pub(crate) title: String,
    pub(crate) content: String,
    pub(crate) theme: String,
    pub(crate) created_at: DateTime<Utc>,
    pub(crate) feedback: Option<String>,
}
impl PoemRecord {
    pub(crate) fn from_domain(poem: &Poem) -> PortResult<Self> {
        let feedback = poem
            .feedback
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| PortError::Unexpected(format!("Failed to serialize feedback: {e}")))?;
        Ok(Self {
            id: poem.id,
            title: poem.title.clone(),
            content: poem.content.clone(),
            theme: poem.theme.clone(),
            created_at: poem.created_at,
            feedback,
        })
    }

    /// Unreadable feedback is dropped with a warning rather than failing the
    /// whole listing.
    pub(crate) fn to_domain(self) -> Poem {
        let id = self.id;
        let feedback = self.feedback.and_then(|raw| {
            serde_json::from_str::<Feedback>(&raw)
                .map_err(|e| warn!(poem_id = %id, error = %e, "Discarding unreadable feedback"))
                .ok()
        });
        Poem {
            id,
            title: self.title,
            content: self.content,
            theme: self.theme,
            created_at: self.created_at,
            feedback,
        }
    }
}

//=========================================================================================
// `PoemRepository` Trait Implementation
//=========================================================================================

const UPSERT_POEM: &str = "INSERT INTO poems (id, user_id, title, content, theme, created_at, feedback) \
     VALUES ($1, $2, $3, $4, $5, $6, $7) \
     ON CONFLICT (id) DO UPDATE SET title = EXCLUDED.title, content = EXCLUDED.content, \
     theme = EXCLUDED.theme, created_at = EXCLUDED.created_at, feedback = EXCLUDED.feedback \
     WHERE poems.user_id = EXCLUDED.user_id";

#[async_trait]
impl PoemRepository for DbAdapter {
    async fn upsert_poem(&self, user_id: Uuid, poem: &Poem) -> PortResult<()> {
        let record = PoemRecord::from_domain(poem)?;
        sqlx::query(UPSERT_POEM)
            .bind(record.id)
            .bind(user_id)
            .bind(record.title)
            .bind(record.content)
            .bind(record.theme)
            .bind(record.created_at)
            .bind(record.feedback)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn upsert_poems(&self, user_id: Uuid, poems: &[Poem]) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        for poem in poems {
            let record = PoemRecord::from_domain(poem)?;
            sqlx::query(UPSERT_POEM)
                .bind(record.id)
                .bind(user_id)
                .bind(record.title)
                .bind(record.content)
                .bind(record.theme)
                .bind(record.created_at)
                .bind(record.feedback)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        Ok(())
    }

    async fn list_poems_for_user(&self, user_id: Uuid) -> PortResult<Vec<Poem>> {
        let records = sqlx::query_as::<_, PoemRecord>(
            "SELECT id, title, content, theme, created_at, feedback FROM poems \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn health(&self) -> CloudStatus {
        let probe = sqlx::query("SELECT id FROM poems LIMIT 1")
            .fetch_optional(&self.pool)
            .await;
        match probe {
            Ok(_) => CloudStatus::Connected,
            Err(e) => {
                let missing_table = e
                    .as_database_error()
                    .and_then(|d| d.code())
                    .is_some_and(|code| code == UNDEFINED_TABLE);
                if missing_table {
                    CloudStatus::SetupNeeded {
                        message: "Database tables need to be created. Please run the migration."
                            .to_string(),
                    }
                } else {
                    CloudStatus::Error {
                        message: format!("Database error: {e}"),
                    }
                }
            }
        }
    }
}

//=========================================================================================
// `AuthService` Trait Implementation
//=========================================================================================

#[async_trait]
impl AuthService for DbAdapter {
    async fn sign_up(&self, email: &str, password: &str) -> PortResult<User> {
        let password_hash = hash_password(password)?;
        let email = normalize_email(email);

        let record = sqlx::query_as::<_, SessionUserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email",
        )
        .bind(Uuid::new_v4())
        .bind(&email)
        .bind(password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            let duplicate = e
                .as_database_error()
                .and_then(|d| d.code())
                .is_some_and(|code| code == UNIQUE_VIOLATION);
            if duplicate {
                PortError::Conflict("An account with this email already exists".to_string())
            } else {
                unexpected(e)
            }
        })?;

        Ok(User {
            user_id: record.user_id,
            email: record.email,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> PortResult<(User, AuthSession)> {
        let creds = match self.get_user_by_email(email).await {
            Ok(creds) => creds,
            Err(PortError::NotFound(_)) => return Err(PortError::Unauthorized),
            Err(e) => return Err(e),
        };
        if !verify_password(password, &creds.hashed_password)? {
            return Err(PortError::Unauthorized);
        }

        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            user_id: creds.user_id,
            expires_at: Utc::now() + self.session_ttl,
        };
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&session.id)
            .bind(session.user_id)
            .bind(session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        let user = User {
            user_id: creds.user_id,
            email: creds.email,
        };
        Ok((user, session))
    }

    async fn sign_out(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> PortResult<User> {
        let record = sqlx::query_as::<_, SessionUserRecord>(
            "SELECT u.user_id, u.email FROM auth_sessions s \
             JOIN users u ON u.user_id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > now()",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::Unauthorized)?;

        Ok(User {
            user_id: record.user_id,
            email: record.email,
        })
    }

    async fn request_password_reset(&self, email: &str) -> PortResult<Option<ResetTicket>> {
        let creds = match self.get_user_by_email(email).await {
            Ok(creds) => creds,
            Err(PortError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let ticket = ResetTicket {
            token: generate_reset_token(),
            user_id: creds.user_id,
            expires_at: Utc::now() + self.reset_token_ttl,
        };
        sqlx::query(
            "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(hash_reset_token(&ticket.token))
        .bind(ticket.user_id)
        .bind(ticket.expires_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;

        info!(user_id = %ticket.user_id, "Issued password reset token");
        Ok(Some(ticket))
    }

    async fn verify_reset_token(&self, token: &str) -> PortResult<Result<Uuid, ResetLinkError>> {
        if let Err(e) = check_token_shape(token) {
            return Ok(Err(e));
        }
        let row = self.find_reset(token).await?;
        Ok(classify_reset(row.as_ref(), Utc::now()))
    }

    async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> PortResult<Result<(), ResetLinkError>> {
        if let Err(e) = check_token_shape(token) {
            return Ok(Err(e));
        }
        let token_hash = hash_reset_token(token);
        let mut tx = self.pool.begin().await.map_err(unexpected)?;

        let row = sqlx::query_as::<_, ResetRecord>(
            "SELECT user_id, expires_at, used_at FROM password_resets \
             WHERE token_hash = $1 FOR UPDATE",
        )
        .bind(&token_hash)
        .fetch_optional(&mut *tx)
        .await
        .map_err(unexpected)?
        .map(ResetRecord::to_row);

        let user_id = match classify_reset(row.as_ref(), Utc::now()) {
            Ok(user_id) => user_id,
            Err(e) => return Ok(Err(e)),
        };

        sqlx::query("UPDATE users SET hashed_password = $1 WHERE user_id = $2")
            .bind(hash_password(new_password)?)
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        sqlx::query("UPDATE password_resets SET used_at = now() WHERE token_hash = $1")
            .bind(&token_hash)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        // Existing sign-ins end with the old password.
        sqlx::query("DELETE FROM auth_sessions WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(unexpected)?;
        tx.commit().await.map_err(unexpected)?;

        info!(%user_id, "Password reset completed");
        Ok(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_poem(feedback: Option<Feedback>) -> Poem {
        Poem {
            id: Uuid::new_v4(),
            title: "Harbor".to_string(),
            content: "boats like sleeping gulls".to_string(),
            theme: "Freedom & Adventure".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 2, 29, 18, 45, 12).unwrap(),
            feedback,
        }
    }

    #[test]
    fn feedback_survives_the_text_column() {
        let poem = sample_poem(Some(Feedback {
            score: 9,
            strengths: vec!["Imagery".to_string(), "Rhythm".to_string()],
            suggestions: vec!["Trim the last line".to_string()],
            overall: "Strong".to_string(),
        }));
        let record = PoemRecord::from_domain(&poem).unwrap();
        assert!(record.feedback.as_deref().unwrap().contains("\"score\":9"));
        assert_eq!(record.to_domain(), poem);
    }

    #[test]
    fn missing_feedback_stays_null() {
        let poem = sample_poem(None);
        let record = PoemRecord::from_domain(&poem).unwrap();
        assert!(record.feedback.is_none());
        assert_eq!(record.to_domain(), poem);
    }

    #[test]
    fn corrupt_feedback_is_dropped() {
        let poem = sample_poem(None);
        let mut record = PoemRecord::from_domain(&poem).unwrap();
        record.feedback = Some("{not json".to_string());
        assert_eq!(record.to_domain().feedback, None);
    }

    #[test]
    fn emails_are_normalized() {
        assert_eq!(normalize_email("  Poet@Example.COM "), "poet@example.com");
    }
}
