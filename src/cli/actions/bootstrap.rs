use crate::{
    auth::{CredentialVault, Role},
    store::{self, Backend, NewAccount},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub dsn: String,
    pub email: String,
    pub name: String,
    pub password: SecretString,
}

/// Outcome of a bootstrap run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bootstrap {
    Created,
    AlreadyPresent,
}

/// Create the administrator unless an account with that e-mail exists.
///
/// # Errors
/// Returns an error if hashing or the store fails.
pub async fn ensure_admin(
    backend: &Backend,
    vault: &CredentialVault,
    email: &str,
    name: &str,
    password: &str,
) -> Result<Bootstrap> {
    if backend.accounts.find_by_email(email).await?.is_some() {
        return Ok(Bootstrap::AlreadyPresent);
    }

    let password_hash = vault.hash_blocking(password).await?;
    let account = backend
        .accounts
        .create(NewAccount {
            email: email.to_string(),
            name: name.to_string(),
            password_hash,
            role: Role::Administrator,
        })
        .await
        .context("Failed to create administrator")?;

    info!(account_id = %account.id, "Administrator created");
    Ok(Bootstrap::Created)
}

/// Execute the bootstrap-admin action.
/// # Errors
/// Returns an error if the datastore cannot be opened or the account cannot be created.
pub async fn execute(args: Args) -> Result<()> {
    let backend = store::open(&args.dsn)
        .await
        .context("Failed to open datastore")?;
    let vault = tokio::task::spawn_blocking(CredentialVault::new).await??;

    let result = ensure_admin(
        &backend,
        &vault,
        &args.email,
        &args.name,
        args.password.expose_secret(),
    )
    .await;

    backend.close().await;

    match result? {
        Bootstrap::Created => println!("Administrator {} created", args.email),
        Bootstrap::AlreadyPresent => println!("Account {} already exists, nothing to do", args.email),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::credentials::fast_params, store::MEMORY_DSN};

    #[tokio::test]
    async fn bootstrap_creates_once() -> Result<()> {
        let backend = store::open(MEMORY_DSN).await?;
        let vault = CredentialVault::with_params(fast_params())?;

        let first = ensure_admin(&backend, &vault, "admin@example.com", "Admin", "temp").await?;
        assert_eq!(first, Bootstrap::Created);
        let second = ensure_admin(&backend, &vault, "admin@example.com", "Admin", "other").await?;
        assert_eq!(second, Bootstrap::AlreadyPresent);

        let admin = backend
            .accounts
            .find_by_email("admin@example.com")
            .await?
            .context("administrator missing")?;
        assert_eq!(admin.role, Role::Administrator);
        assert!(admin.must_change_password);
        assert!(vault.verify("temp", &admin.password_hash));
        Ok(())
    }
}
