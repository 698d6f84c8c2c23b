//! Persistence boundary for accounts and the inventory catalog.
//!
//! Flow Overview: the server opens one backend at startup (`open`), hands the
//! trait objects to the auth and API layers, and closes it on shutdown. Only the
//! login and rotation flows touch account rows; the access gate never does.
//!
//! `AccountStore::compare_and_set_login_state` is the per-account
//! synchronization point for the lockout counters: it applies a write only when
//! the row still holds the state the caller decided on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use thiserror::Error;
use utoipa::ToSchema;

use crate::auth::Role;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// DSN that selects the in-process store instead of Postgres.
pub const MEMORY_DSN: &str = "memory://";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record already exists: {0}")]
    Conflict(String),
    #[error("unknown reference: {0}")]
    InvalidReference(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

/// Primary key of an account row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct AccountId(i64);

impl AccountId {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<i64> for AccountId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Lockout bookkeeping of one account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoginState {
    pub failed_attempts: u8,
    pub locked_until: Option<DateTime<Utc>>,
}

impl LoginState {
    /// Seconds left on an active lock, rounded up. `None` once the lock expired.
    #[must_use]
    pub fn locked_for(&self, now: DateTime<Utc>) -> Option<u64> {
        let until = self.locked_until?;
        if now >= until {
            return None;
        }
        let millis = (until - now).num_milliseconds().max(1);
        u64::try_from((millis + 999) / 1000).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
    pub must_change_password: bool,
    pub failed_attempts: u8,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    #[must_use]
    pub fn login_state(&self) -> LoginState {
        LoginState {
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until,
        }
    }

    #[must_use]
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role,
        }
    }

    #[must_use]
    pub fn summary(&self) -> AccountSummary {
        AccountSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

/// Public view returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AccountProfile {
    pub email: String,
    pub name: String,
    pub role: Role,
}

/// Listing view for administrators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to create an account. New accounts always start with a pending rotation.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ProductType {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub expiration: DateTime<Utc>,
    pub type_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub product_type: ProductType,
}

#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub expiration: DateTime<Utc>,
    pub type_id: i64,
}

/// Number of products per product type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCount {
    pub name: String,
    pub products: i64,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Atomically replace the lockout fields if the row still equals `expected`.
    ///
    /// Returns `false` when the account is missing or was modified concurrently.
    async fn compare_and_set_login_state(
        &self,
        id: AccountId,
        expected: LoginState,
        next: LoginState,
    ) -> Result<bool, StoreError>;

    /// Store a new hash and clear the pending rotation flag.
    async fn set_password(&self, id: AccountId, password_hash: &str) -> Result<bool, StoreError>;

    /// Administrative reset: store a new hash and require a rotation.
    async fn reset_password(&self, id: AccountId, password_hash: &str)
        -> Result<bool, StoreError>;

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// All accounts, newest first.
    async fn list(&self) -> Result<Vec<AccountSummary>, StoreError>;

    async fn count(&self) -> Result<i64, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    async fn close(&self);
}

#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// All products with their type, newest first.
    async fn list_products(&self) -> Result<Vec<Product>, StoreError>;

    /// Fails with `StoreError::InvalidReference` for an unknown type.
    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError>;

    async fn delete_product(&self, id: i64) -> Result<bool, StoreError>;

    async fn list_product_types(&self) -> Result<Vec<ProductType>, StoreError>;

    async fn count_products(&self) -> Result<i64, StoreError>;

    async fn products_per_type(&self) -> Result<Vec<TypeCount>, StoreError>;
}

/// The pair of store handles shared by the server.
#[derive(Clone)]
pub struct Backend {
    pub accounts: Arc<dyn AccountStore>,
    pub inventory: Arc<dyn InventoryStore>,
}

impl Backend {
    pub fn from_store<T>(store: Arc<T>) -> Self
    where
        T: AccountStore + InventoryStore + 'static,
    {
        Self {
            accounts: store.clone(),
            inventory: store,
        }
    }

    pub async fn close(&self) {
        self.accounts.close().await;
    }
}

/// Open the backend named by `dsn`: [`MEMORY_DSN`] or a Postgres connection string.
///
/// # Errors
/// Returns an error if the database cannot be reached.
pub async fn open(dsn: &str) -> Result<Backend, StoreError> {
    if dsn == MEMORY_DSN {
        return Ok(Backend::from_store(Arc::new(MemoryStore::with_default_types())));
    }
    let store = PgStore::open(dsn).await?;
    Ok(Backend::from_store(Arc::new(store)))
}
