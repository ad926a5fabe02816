use std::fmt::Display;

use super::User;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Alphanumeric characters in a token; 64 of them carry ~380 bits of entropy.
const SESSION_ID_LEN: usize = 64;

#[derive(sqlx::Type, Debug, Clone, PartialEq, Eq)]
#[sqlx(transparent)]
pub struct SessionId(pub String);

impl Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub enum Error {
    DoesNotExist,
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::DoesNotExist,
            _ => Error::DatabaseError(err),
        }
    }
}

fn random_string_session_id() -> SessionId {
    let mut rng = rand::thread_rng();
    SessionId(
        (0..SESSION_ID_LEN)
            .map(|_| rng.sample(Alphanumeric))
            .map(char::from)
            .collect::<String>(),
    )
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[derive(Clone)]
pub struct SessionManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> SessionManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

impl SessionManager<'_> {
    /// Resolves an unexpired session to its user.
    pub async fn get_user(&self, session_id: &SessionId) -> Result<User, Error> {
        Ok(sqlx::query_as::<_, User>(
            r#"
SELECT u.id, u.name, u.phone, u.email, u.password_hash, u.role
FROM users u
JOIN user_sessions s ON s.user_id = u.id
WHERE s.session_id = ? AND s.expires_at > ?
            "#,
        )
        .bind(session_id)
        .bind(now())
        .fetch_one(self.pool)
        .await?)
    }

    /// Issues a new token for `user` with a fixed expiry. Older tokens of the
    /// same user stay valid until they expire or are revoked.
    pub async fn generate_session_id_for(
        &self,
        user: &User,
        ttl_hours: i64,
    ) -> Result<SessionId, sqlx::Error> {
        let sid = random_string_session_id();
        let expires_at = now() + ttl_hours * 3600;
        sqlx::query("INSERT INTO user_sessions (session_id, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&sid)
            .bind(user.id)
            .bind(expires_at)
            .execute(self.pool)
            .await?;

        tracing::debug!(user_id = user.id, expires_at, "session issued");
        Ok(sid)
    }

    pub async fn revoke(&self, session_id: &SessionId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn purge_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM user_sessions WHERE expires_at <= ?")
            .bind(now())
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
