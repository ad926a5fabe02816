use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use super::User;

#[derive(Clone)]
pub struct LoginManager<'a> {
    pool: &'a sqlx::SqlitePool,
}

impl<'a> LoginManager<'a> {
    pub fn new(pool: &'a sqlx::SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug)]
pub enum Error {
    EmailTaken,
    WrongCredentials,
    InvalidRegistration(Vec<&'static str>),
    Hashing(String),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for Error {
    fn from(value: sqlx::Error) -> Self {
        Error::DatabaseError(value)
    }
}

pub struct NewUser<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .map_or(false, |(host, tld)| !host.is_empty() && !tld.is_empty())
}

/// Contact details a user may change after registering.
pub struct ProfileUpdate<'a> {
    pub name: &'a str,
    pub phone: &'a str,
    pub email: &'a str,
}

fn validate_contact(name: &str, phone: &str, email: &str) -> Vec<&'static str> {
    let mut problems = Vec::new();
    let name_len = name.trim().chars().count();
    if !(2..=50).contains(&name_len) {
        problems.push("Name must be between 2 and 50 characters");
    }
    if phone.trim().chars().count() < 11 {
        problems.push("Phone must contain at least 11 characters");
    }
    if !looks_like_email(email.trim()) {
        problems.push("Invalid email");
    }
    problems
}

fn validate(user: &NewUser<'_>) -> Vec<&'static str> {
    let mut problems = validate_contact(user.name, user.phone, user.email);
    if user.password.chars().count() < 8 {
        problems.push("Password must be at least 8 characters");
    }
    problems
}

fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Hashing(e.to_string()))
}

fn compare_password(hash: &str, password: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

impl LoginManager<'_> {
    pub async fn get_user(&self, email: &str, password: &str) -> Result<User, Error> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, phone, email, password_hash, role FROM users WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(self.pool)
        .await?
        .ok_or(Error::WrongCredentials)?;

        if compare_password(&user.password_hash, password) {
            Ok(user)
        } else {
            Err(Error::WrongCredentials)
        }
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, Error> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, name, phone, email, password_hash, role FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?)
    }

    /// Registers a customer account.
    pub async fn new_user(&self, new_user: NewUser<'_>) -> Result<User, Error> {
        let problems = validate(&new_user);
        if !problems.is_empty() {
            return Err(Error::InvalidRegistration(problems));
        }

        let email = new_user.email.trim().to_lowercase();
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT id FROM users WHERE email = ?)")
            .bind(&email)
            .fetch_one(self.pool)
            .await?;
        if exists {
            return Err(Error::EmailTaken);
        }

        let password_hash = hash_password(new_user.password)?;
        self.persist_new_user(new_user.name.trim(), new_user.phone.trim(), &email, &password_hash)
            .await
    }

    /// Replaces the contact details of `user_id`. The email stays unique
    /// across accounts, compared case-insensitively.
    pub async fn update_profile(
        &self,
        user_id: i64,
        update: ProfileUpdate<'_>,
    ) -> Result<User, Error> {
        let problems = validate_contact(update.name, update.phone, update.email);
        if !problems.is_empty() {
            return Err(Error::InvalidRegistration(problems));
        }

        let email = update.email.trim().to_lowercase();
        let taken: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT id FROM users WHERE email = ? AND id != ?)")
                .bind(&email)
                .bind(user_id)
                .fetch_one(self.pool)
                .await?;
        if taken {
            return Err(Error::EmailTaken);
        }

        let result = sqlx::query("UPDATE users SET name = ?, phone = ?, email = ? WHERE id = ?")
            .bind(update.name.trim())
            .bind(update.phone.trim())
            .bind(&email)
            .bind(user_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .map_or(false, |db| db.is_unique_violation());
                if duplicate {
                    Error::EmailTaken
                } else {
                    Error::DatabaseError(e)
                }
            })?;
        if result.rows_affected() == 0 {
            return Err(Error::DatabaseError(sqlx::Error::RowNotFound));
        }

        tracing::info!(user_id, "profile updated");
        self.get_by_id(user_id)
            .await?
            .ok_or(Error::DatabaseError(sqlx::Error::RowNotFound))
    }

    async fn persist_new_user(
        &self,
        name: &str,
        phone: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, Error> {
        let id = sqlx::query(
            "INSERT INTO users (name, phone, email, password_hash, role) VALUES (?, ?, ?, ?, 'customer')",
        )
        .bind(name)
        .bind(phone)
        .bind(email)
        .bind(password_hash)
        .execute(self.pool)
        .await?
        .last_insert_rowid();

        self.get_by_id(id)
            .await?
            .ok_or(Error::DatabaseError(sqlx::Error::RowNotFound))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::Role;

    fn carol() -> NewUser<'static> {
        NewUser {
            name: "Carol",
            phone: "79991234567",
            email: "Test123@Example.com ",
            password: "test12345",
        }
    }

    #[sqlx::test]
    async fn ok_create_new_user(pool: sqlx::SqlitePool) {
        let user = LoginManager::new(&pool).new_user(carol()).await.unwrap();
        assert_eq!(user.email, "test123@example.com");
        assert_eq!(user.role, Role::Customer);
        assert_ne!(user.password_hash, "test12345");
    }

    #[sqlx::test]
    async fn ok_get_user(pool: sqlx::SqlitePool) {
        let manager = LoginManager::new(&pool);
        manager.new_user(carol()).await.unwrap();

        assert!(manager
            .get_user("test123@example.com", "test12345")
            .await
            .is_ok());
        assert!(matches!(
            manager.get_user("test123@example.com", "wrong-password").await,
            Err(Error::WrongCredentials)
        ));
        assert!(matches!(
            manager.get_user("nobody@example.com", "test12345").await,
            Err(Error::WrongCredentials)
        ));
    }

    #[sqlx::test]
    async fn duplicate_email_is_rejected(pool: sqlx::SqlitePool) {
        let manager = LoginManager::new(&pool);
        manager.new_user(carol()).await.unwrap();

        assert!(matches!(
            manager.new_user(carol()).await,
            Err(Error::EmailTaken)
        ));
    }

    #[sqlx::test]
    async fn invalid_registration_lists_every_problem(pool: sqlx::SqlitePool) {
        let result = LoginManager::new(&pool)
            .new_user(NewUser {
                name: "C",
                phone: "123",
                email: "not-an-email",
                password: "short",
            })
            .await;

        match result {
            Err(Error::InvalidRegistration(problems)) => assert_eq!(problems.len(), 4),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[sqlx::test]
    async fn profile_update_replaces_contact_details(pool: sqlx::SqlitePool) {
        let manager = LoginManager::new(&pool);
        let user = manager.new_user(carol()).await.unwrap();

        let updated = manager
            .update_profile(
                user.id,
                ProfileUpdate {
                    name: " Carol B ",
                    phone: "79990000000",
                    email: "Carol.B@Example.com",
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Carol B");
        assert_eq!(updated.phone, "79990000000");
        assert_eq!(updated.email, "carol.b@example.com");
        assert!(manager.get_user("carol.b@example.com", "test12345").await.is_ok());

        // Keeping one's own address is not a conflict.
        assert!(manager
            .update_profile(
                user.id,
                ProfileUpdate {
                    name: "Carol B",
                    phone: "79990000000",
                    email: "CAROL.B@example.com",
                },
            )
            .await
            .is_ok());
    }

    #[sqlx::test]
    async fn profile_update_rejects_taken_email_and_bad_input(pool: sqlx::SqlitePool) {
        let manager = LoginManager::new(&pool);
        let carol = manager.new_user(carol()).await.unwrap();
        manager
            .new_user(NewUser {
                name: "Dave",
                phone: "79997654321",
                email: "dave@example.com",
                password: "test12345",
            })
            .await
            .unwrap();

        assert!(matches!(
            manager
                .update_profile(
                    carol.id,
                    ProfileUpdate {
                        name: "Carol",
                        phone: "79991234567",
                        email: "DAVE@example.com",
                    },
                )
                .await,
            Err(Error::EmailTaken)
        ));
        assert!(matches!(
            manager
                .update_profile(
                    carol.id,
                    ProfileUpdate {
                        name: "",
                        phone: "79991234567",
                        email: "",
                    },
                )
                .await,
            Err(Error::InvalidRegistration(problems)) if problems.len() == 2
        ));

        let unchanged = manager.get_by_id(carol.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "test123@example.com");
    }

    #[test]
    fn email_shape() {
        assert!(looks_like_email("a@b.co"));
        assert!(!looks_like_email("a@b"));
        assert!(!looks_like_email("@b.co"));
        assert!(!looks_like_email("a b@c.de"));
    }
}
