//! In-process store used for local runs (`memory://`) and tests.
//!
//! A single `RwLock` guards all tables, so every compare-and-set is trivially
//! serialized per account. State is lost on restart and is not shared between
//! processes.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{
    Account, AccountId, AccountStore, AccountSummary, InventoryStore, LoginState, NewAccount,
    NewProduct, Product, ProductType, StoreError, TypeCount,
};

const DEFAULT_PRODUCT_TYPES: [&str; 3] = ["Coco Seco", "Coco Verde", "Agua de Coco"];

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    next_account_id: i64,
    product_types: BTreeMap<i64, ProductType>,
    next_type_id: i64,
    products: BTreeMap<i64, StoredProduct>,
    next_product_id: i64,
}

#[derive(Debug, Clone)]
struct StoredProduct {
    id: i64,
    name: String,
    expiration: chrono::DateTime<Utc>,
    type_id: i64,
    created_at: chrono::DateTime<Utc>,
}

impl Tables {
    fn product(&self, stored: &StoredProduct) -> Result<Product, StoreError> {
        let product_type = self
            .product_types
            .get(&stored.type_id)
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!("product {} has no type", stored.id)))?;
        Ok(Product {
            id: stored.id,
            name: stored.name.clone(),
            expiration: stored.expiration,
            type_id: stored.type_id,
            created_at: stored.created_at,
            product_type,
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty store with the catalog's stock product types.
    #[must_use]
    pub fn with_default_types() -> Self {
        let mut tables = Tables::default();
        for name in DEFAULT_PRODUCT_TYPES {
            tables.next_type_id += 1;
            let id = tables.next_type_id;
            tables.product_types.insert(
                id,
                ProductType {
                    id,
                    name: name.to_string(),
                },
            );
        }
        Self {
            tables: RwLock::new(tables),
        }
    }

    pub async fn add_product_type(&self, name: &str) -> ProductType {
        let mut tables = self.tables.write().await;
        tables.next_type_id += 1;
        let product_type = ProductType {
            id: tables.next_type_id,
            name: name.to_string(),
        };
        tables
            .product_types
            .insert(product_type.id, product_type.clone());
        product_type
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.tables.read().await.accounts.get(&id).cloned())
    }

    async fn compare_and_set_login_state(
        &self,
        id: AccountId,
        expected: LoginState,
        next: LoginState,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(account) = tables.accounts.get_mut(&id) else {
            return Ok(false);
        };
        if account.login_state() != expected {
            return Ok(false);
        }
        account.failed_attempts = next.failed_attempts;
        account.locked_until = next.locked_until;
        Ok(true)
    }

    async fn set_password(&self, id: AccountId, password_hash: &str) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.accounts.get_mut(&id).map_or(false, |account| {
            account.password_hash = password_hash.to_string();
            account.must_change_password = false;
            true
        }))
    }

    async fn reset_password(
        &self,
        id: AccountId,
        password_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.accounts.get_mut(&id).map_or(false, |account| {
            account.password_hash = password_hash.to_string();
            account.must_change_password = true;
            true
        }))
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.accounts.values().any(|a| a.email == account.email) {
            return Err(StoreError::Conflict(format!("email {}", account.email)));
        }
        tables.next_account_id += 1;
        let created = Account {
            id: AccountId::new(tables.next_account_id),
            email: account.email,
            name: account.name,
            password_hash: account.password_hash,
            role: account.role,
            must_change_password: true,
            failed_attempts: 0,
            locked_until: None,
            created_at: Utc::now(),
        };
        tables.accounts.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<AccountSummary>, StoreError> {
        let tables = self.tables.read().await;
        let mut accounts: Vec<AccountSummary> =
            tables.accounts.values().map(Account::summary).collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(accounts)
    }

    async fn count(&self) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        i64::try_from(tables.accounts.len())
            .map_err(|_| StoreError::Corrupt("account count overflow".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn list_products(&self) -> Result<Vec<Product>, StoreError> {
        let tables = self.tables.read().await;
        let mut products = tables
            .products
            .values()
            .map(|stored| tables.product(stored))
            .collect::<Result<Vec<_>, _>>()?;
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(products)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.product_types.contains_key(&product.type_id) {
            return Err(StoreError::InvalidReference(format!(
                "product type {}",
                product.type_id
            )));
        }
        tables.next_product_id += 1;
        let stored = StoredProduct {
            id: tables.next_product_id,
            name: product.name,
            expiration: product.expiration,
            type_id: product.type_id,
            created_at: Utc::now(),
        };
        tables.products.insert(stored.id, stored.clone());
        tables.product(&stored)
    }

    async fn delete_product(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.tables.write().await.products.remove(&id).is_some())
    }

    async fn list_product_types(&self) -> Result<Vec<ProductType>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .product_types
            .values()
            .cloned()
            .collect())
    }

    async fn count_products(&self) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        i64::try_from(tables.products.len())
            .map_err(|_| StoreError::Corrupt("product count overflow".to_string()))
    }

    async fn products_per_type(&self) -> Result<Vec<TypeCount>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .product_types
            .values()
            .map(|product_type| TypeCount {
                name: product_type.name.clone(),
                products: tables
                    .products
                    .values()
                    .filter(|p| p.type_id == product_type.id)
                    .count()
                    .try_into()
                    .unwrap_or(i64::MAX),
            })
            .collect())
    }
}
