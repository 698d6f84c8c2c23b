//! Postgres-backed store (`sql/schema.sql`).

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    PgPool, Row,
};
use std::time::Duration;
use tracing::{info, Instrument};

use super::{
    Account, AccountId, AccountStore, AccountSummary, InventoryStore, LoginState, NewAccount,
    NewProduct, Product, ProductType, StoreError, TypeCount,
};
use crate::auth::Role;

const ACCOUNT_COLUMNS: &str = "id, email, name, password, role, must_change_pass, \
     failed_attempts, locked_until, created_at";

fn query_span(operation: &'static str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23503"),
        _ => false,
    }
}

fn parse_role(raw: &str) -> Result<Role, StoreError> {
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("unknown role {raw}")))
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let role: String = row.try_get("role")?;
    let failed_attempts: i16 = row.try_get("failed_attempts")?;
    Ok(Account {
        id: AccountId::new(row.try_get("id")?),
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        password_hash: row.try_get("password")?,
        role: parse_role(&role)?,
        must_change_password: row.try_get("must_change_pass")?,
        failed_attempts: u8::try_from(failed_attempts)
            .map_err(|_| StoreError::Corrupt(format!("failed_attempts {failed_attempts}")))?,
        locked_until: row.try_get("locked_until")?,
        created_at: row.try_get("created_at")?,
    })
}

fn product_from_row(row: &PgRow) -> Result<Product, StoreError> {
    let type_id: i64 = row.try_get("type_id")?;
    Ok(Product {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        expiration: row.try_get("expiration")?,
        type_id,
        created_at: row.try_get("created_at")?,
        product_type: ProductType {
            id: type_id,
            name: row.try_get("type_name")?,
        },
    })
}

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database.
    ///
    /// # Errors
    /// Returns an error if the pool cannot establish its first connection.
    pub async fn open(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await?;

        info!("Connected to database");

        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn update_password(
        &self,
        id: AccountId,
        password_hash: &str,
        must_change: bool,
    ) -> Result<bool, StoreError> {
        let query = "UPDATE users SET password = $1, must_change_pass = $2 WHERE id = $3";
        let result = sqlx::query(query)
            .bind(password_hash)
            .bind(must_change)
            .bind(id.get())
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id.get())
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn compare_and_set_login_state(
        &self,
        id: AccountId,
        expected: LoginState,
        next: LoginState,
    ) -> Result<bool, StoreError> {
        // Single conditional UPDATE: Postgres row locking serializes concurrent writers,
        // and the WHERE clause rejects writers that decided on a stale snapshot.
        let query = r"
            UPDATE users
            SET failed_attempts = $1, locked_until = $2
            WHERE id = $3
              AND failed_attempts = $4
              AND locked_until IS NOT DISTINCT FROM $5
        ";
        let result = sqlx::query(query)
            .bind(i16::from(next.failed_attempts))
            .bind(next.locked_until)
            .bind(id.get())
            .bind(i16::from(expected.failed_attempts))
            .bind(expected.locked_until)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_password(&self, id: AccountId, password_hash: &str) -> Result<bool, StoreError> {
        self.update_password(id, password_hash, false).await
    }

    async fn reset_password(
        &self,
        id: AccountId,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        self.update_password(id, password_hash, true).await
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let query = format!(
            "INSERT INTO users (email, name, password, role, must_change_pass) \
             VALUES ($1, $2, $3, $4, TRUE) RETURNING {ACCOUNT_COLUMNS}"
        );
        let row = sqlx::query(&query)
            .bind(&account.email)
            .bind(&account.name)
            .bind(&account.password_hash)
            .bind(account.role.as_str())
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await;

        match row {
            Ok(row) => account_from_row(&row),
            Err(err) if is_unique_violation(&err) => {
                Err(StoreError::Conflict(format!("email {}", account.email)))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn list(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let query = "SELECT id, name, email, role, created_at FROM users ORDER BY created_at DESC, id DESC";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;

        rows.iter()
            .map(|row| -> Result<AccountSummary, StoreError> {
                let role: String = row.try_get("role")?;
                Ok(AccountSummary {
                    id: AccountId::new(row.try_get("id")?),
                    name: row.try_get("name")?,
                    email: row.try_get("email")?,
                    role: parse_role(&role)?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect()
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let query = "SELECT COUNT(*) FROM users";
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let query = "SELECT 1";
        sqlx::query(query)
            .execute(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let query = r"
            SELECT p.id, p.name, p.expiration, p.type_id, p.created_at, t.name AS type_name
            FROM products p
            JOIN product_types t ON t.id = p.type_id
            ORDER BY p.created_at DESC, p.id DESC
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        rows.iter().map(product_from_row).collect()
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let query = r"
            WITH inserted AS (
                INSERT INTO products (name, expiration, type_id)
                VALUES ($1, $2, $3)
                RETURNING id, name, expiration, type_id, created_at
            )
            SELECT i.id, i.name, i.expiration, i.type_id, i.created_at, t.name AS type_name
            FROM inserted i
            JOIN product_types t ON t.id = i.type_id
        ";
        let row = sqlx::query(query)
            .bind(&product.name)
            .bind(product.expiration)
            .bind(product.type_id)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match row {
            Ok(row) => product_from_row(&row),
            Err(err) if is_foreign_key_violation(&err) => Err(StoreError::InvalidReference(
                format!("product type {}", product.type_id),
            )),
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_product(&self, id: i64) -> Result<bool, StoreError> {
        let query = "DELETE FROM products WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn list_product_types(&self) -> Result<Vec<ProductType>, StoreError> {
        let query = "SELECT id, name FROM product_types ORDER BY id";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| -> Result<ProductType, StoreError> {
                Ok(ProductType {
                    id: row.try_get("id")?,
                    name: row.try_get("name")?,
                })
            })
            .collect()
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        let query = "SELECT COUNT(*) FROM products";
        let row = sqlx::query(query)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn products_per_type(&self) -> Result<Vec<TypeCount>, StoreError> {
        let query = r"
            SELECT t.name, COUNT(p.id) AS products
            FROM product_types t
            LEFT JOIN products p ON p.type_id = t.id
            GROUP BY t.id, t.name
            ORDER BY t.id
        ";
        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        rows.iter()
            .map(|row| -> Result<TypeCount, StoreError> {
                Ok(TypeCount {
                    name: row.try_get("name")?,
                    products: row.try_get("products")?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_role_rejects_unknown_values() {
        assert!(matches!(parse_role("ADMIN"), Ok(Role::Administrator)));
        assert!(matches!(parse_role("root"), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn account_columns_cover_lockout_fields() {
        assert!(ACCOUNT_COLUMNS.contains("failed_attempts"));
        assert!(ACCOUNT_COLUMNS.contains("locked_until"));
        assert!(ACCOUNT_COLUMNS.contains("must_change_pass"));
    }
}
