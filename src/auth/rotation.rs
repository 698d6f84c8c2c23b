use std::sync::Arc;
use tracing::info;

use super::{credentials::CredentialVault, AuthError};
use crate::store::{AccountId, AccountStore};

/// Replaces an account's password and clears its pending rotation flag.
///
/// Any non-empty password is accepted; there is no strength policy.
#[derive(Clone)]
pub struct PasswordRotation {
    accounts: Arc<dyn AccountStore>,
    vault: CredentialVault,
}

impl PasswordRotation {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, vault: CredentialVault) -> Self {
        Self { accounts, vault }
    }

    /// # Errors
    /// `Validation` for a missing or empty password, `Internal` if hashing or
    /// the store write fails or the account no longer exists.
    pub async fn rotate(
        &self,
        account_id: AccountId,
        new_password: Option<&str>,
    ) -> Result<(), AuthError> {
        let new_password = new_password
            .filter(|password| !password.is_empty())
            .ok_or_else(|| AuthError::Validation("Password is required".to_string()))?;

        let digest = self
            .vault
            .hash_blocking(new_password)
            .await
            .map_err(AuthError::internal)?;

        if !self.accounts.set_password(account_id, &digest).await? {
            return Err(AuthError::internal(format!(
                "account {account_id} not found during password rotation"
            )));
        }

        info!(account_id = %account_id, "Password rotated");
        Ok(())
    }
}
