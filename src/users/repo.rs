use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::User;

/// An insert collided with an existing e-mail.
#[derive(Debug, thiserror::Error)]
#[error("email {0} is already registered")]
pub struct DuplicateEmail(pub String);

fn unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Persistence for credential records.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    /// Un-expired e-mail verification token digest.
    async fn find_by_verification_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    /// Un-expired password reset token digest.
    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;
    async fn insert(&self, user: &User) -> anyhow::Result<User>;
    async fn update(&self, user: &User) -> anyhow::Result<User>;
    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>>;
}

const USER_COLUMNS: &str = r#"
    id, email, password_hash, first_name, last_name, phone, date_of_birth,
    nationality, preferred_language, address, preferences, avatar, role,
    is_active, is_email_verified, email_verification_token,
    email_verification_expires, password_reset_token, password_reset_expires,
    login_attempts, lock_until, session_epoch, last_login, created_at, updated_at
"#;

#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn find_where(
        &self,
        predicate: &str,
        value: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE {predicate}");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(value)
            .bind(now)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await
            .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
        let user = sqlx::query_as::<_, User>(&sql)
            .bind(email)
            .fetch_optional(&self.db)
            .await
            .context("find user by email")?;
        Ok(user)
    }

    async fn find_by_verification_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        self.find_where(
            "email_verification_token = $1 AND email_verification_expires > $2",
            token_hash,
            now,
        )
        .await
        .context("find user by verification token")
    }

    async fn find_by_reset_token(
        &self,
        token_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        self.find_where(
            "password_reset_token = $1 AND password_reset_expires > $2 AND is_active",
            token_hash,
            now,
        )
        .await
        .context("find user by reset token")
    }

    async fn insert(&self, user: &User) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            INSERT INTO users (
                id, email, password_hash, first_name, last_name, phone, nationality,
                preferred_language, role, is_active, is_email_verified,
                email_verification_token, email_verification_expires,
                login_attempts, session_epoch, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(&user.nationality)
            .bind(&user.preferred_language)
            .bind(user.role)
            .bind(user.is_active)
            .bind(user.is_email_verified)
            .bind(&user.email_verification_token)
            .bind(user.email_verification_expires)
            .bind(user.login_attempts)
            .bind(user.session_epoch)
            .bind(user.created_at)
            .bind(user.updated_at)
            .fetch_one(&self.db)
            .await;
        match row {
            Ok(row) => Ok(row),
            Err(e) if unique_violation(&e) => Err(DuplicateEmail(user.email.clone()).into()),
            Err(e) => Err(anyhow::Error::new(e).context("insert user")),
        }
    }

    async fn update(&self, user: &User) -> anyhow::Result<User> {
        let sql = format!(
            r#"
            UPDATE users SET
                email = $2, password_hash = $3, first_name = $4, last_name = $5,
                phone = $6, date_of_birth = $7, nationality = $8,
                preferred_language = $9, address = $10, preferences = $11,
                avatar = $12, role = $13, is_active = $14, is_email_verified = $15,
                email_verification_token = $16, email_verification_expires = $17,
                password_reset_token = $18, password_reset_expires = $19,
                login_attempts = $20, lock_until = $21, session_epoch = $22,
                last_login = $23, updated_at = $24
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, User>(&sql)
            .bind(user.id)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(user.date_of_birth)
            .bind(&user.nationality)
            .bind(&user.preferred_language)
            .bind(&user.address)
            .bind(&user.preferences)
            .bind(&user.avatar)
            .bind(user.role)
            .bind(user.is_active)
            .bind(user.is_email_verified)
            .bind(&user.email_verification_token)
            .bind(user.email_verification_expires)
            .bind(&user.password_reset_token)
            .bind(user.password_reset_expires)
            .bind(user.login_attempts)
            .bind(user.lock_until)
            .bind(user.session_epoch)
            .bind(user.last_login)
            .bind(user.updated_at)
            .fetch_one(&self.db)
            .await
            .context("update user")?;
        Ok(row)
    }

    async fn list(&self, limit: i64, offset: i64) -> anyhow::Result<Vec<User>> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, User>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.db)
            .await
            .context("list users")?;
        Ok(rows)
    }
}
