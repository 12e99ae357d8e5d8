//! PostgreSQL user repository.

use sqlx::PgPool;

use crate::core_types::UserId;
use crate::models::User;

use super::PersistError;

const USER_COLUMNS: &str = "uid, account, password, name, created_at";

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        account: &str,
        password_hash: &str,
        name: &str,
    ) -> Result<User, PersistError> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (account, password, name, created_at)
            VALUES ($1, $2, $3, now())
            RETURNING {USER_COLUMNS}
            "#,
        ))
        .bind(account)
        .bind(password_hash)
        .bind(name)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn find_by_account(&self, account: &str) -> Result<User, PersistError> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE account = $1"
        ))
        .bind(account)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(PersistError::NotFound)
    }

    pub async fn find_by_id(&self, uid: UserId) -> Result<User, PersistError> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE uid = $1"))
            .bind(uid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(PersistError::NotFound)
    }
}
