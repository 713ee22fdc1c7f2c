use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use rideok_core::error::{CoreError, CoreResult};
use rideok_core::repository::UserRepository;
use rideok_core::user::User;

pub struct PostgresUserRepository {
    pub pool: PgPool,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    phone_number: Option<String>,
    location: Option<String>,
    created_at: DateTime<Utc>,
}

impl UserRow {
    fn into_user(self) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            password_hash: self.password_hash,
            phone_number: self.phone_number,
            location: self.location,
            created_at: self.created_at,
        }
    }
}

const SELECT_USER: &str =
    "SELECT id, name, email, password_hash, phone_number, location, created_at FROM users";

fn map_insert_error(err: sqlx::Error) -> CoreError {
    // Unique index on email carries the duplicate-account rule.
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            return CoreError::validation("User already exists");
        }
    }
    CoreError::unexpected(err)
}

impl PostgresUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PostgresUserRepository {
    async fn insert(&self, user: &User) -> CoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, name, email, password_hash, phone_number, location, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone_number)
        .bind(&user.location)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> CoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{} WHERE id = $1", SELECT_USER))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CoreError::unexpected)?;

        Ok(row.map(UserRow::into_user))
    }

    async fn find_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "{} WHERE LOWER(email) = LOWER($1)",
            SELECT_USER
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(CoreError::unexpected)?;

        Ok(row.map(UserRow::into_user))
    }

    async fn save(&self, user: &User) -> CoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET name = $2, email = $3, password_hash = $4, \
             phone_number = $5, location = $6 WHERE id = $1",
        )
        .bind(user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.phone_number)
        .bind(&user.location)
        .execute(&self.pool)
        .await
        .map_err(map_insert_error)?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("User"));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> CoreResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(CoreError::unexpected)?;

        Ok(result.rows_affected() > 0)
    }
}
