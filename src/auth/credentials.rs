//! Argon2id password digests in PHC string format.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to hash password: {0}")]
    Hash(String),
    #[error("hashing task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Hashes and verifies passwords. Cloning shares the parameters and the decoy digest.
#[derive(Clone)]
pub struct CredentialVault {
    params: Params,
    decoy: Arc<str>,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("m_cost", &self.params.m_cost())
            .field("t_cost", &self.params.t_cost())
            .finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Vault with the default Argon2id cost.
    ///
    /// # Errors
    /// Returns an error if the decoy digest cannot be computed.
    pub fn new() -> Result<Self, CredentialError> {
        Self::with_params(Params::default())
    }

    /// Vault with explicit Argon2 parameters.
    ///
    /// # Errors
    /// Returns an error if the decoy digest cannot be computed.
    pub fn with_params(params: Params) -> Result<Self, CredentialError> {
        let mut vault = Self {
            params,
            decoy: Arc::from(""),
        };
        vault.decoy = Arc::from(vault.hash("decoy-password-for-unknown-accounts")?);
        Ok(vault)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Salted digest of `plaintext`; a fresh salt is drawn on every call.
    ///
    /// # Errors
    /// Returns an error if Argon2 rejects the input.
    pub fn hash(&self, plaintext: &str) -> Result<String, CredentialError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| CredentialError::Hash(err.to_string()))
    }

    /// `true` iff `plaintext` matches `digest`. A malformed digest is a mismatch.
    #[must_use]
    pub fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let parsed = match PasswordHash::new(digest) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!("Stored password digest is malformed: {err}");
                return false;
            }
        };
        // The digest carries its own parameters; verification honors them.
        self.argon2()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }

    /// Spend one verification against the decoy digest.
    pub fn dummy_verify(&self, plaintext: &str) {
        let _ = self.verify(plaintext, &self.decoy);
    }

    /// [`Self::hash`] on the blocking pool.
    ///
    /// # Errors
    /// Returns an error if hashing fails or the task panics.
    pub async fn hash_blocking(&self, plaintext: &str) -> Result<String, CredentialError> {
        let vault = self.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || vault.hash(&plaintext)).await?
    }

    /// [`Self::verify`] on the blocking pool.
    ///
    /// # Errors
    /// Returns an error only if the task panics.
    pub async fn verify_blocking(
        &self,
        plaintext: &str,
        digest: &str,
    ) -> Result<bool, CredentialError> {
        let vault = self.clone();
        let plaintext = plaintext.to_string();
        let digest = digest.to_string();
        Ok(tokio::task::spawn_blocking(move || vault.verify(&plaintext, &digest)).await?)
    }

    /// [`Self::dummy_verify`] on the blocking pool.
    ///
    /// # Errors
    /// Returns an error only if the task panics.
    pub async fn dummy_verify_blocking(&self, plaintext: &str) -> Result<(), CredentialError> {
        let vault = self.clone();
        let plaintext = plaintext.to_string();
        tokio::task::spawn_blocking(move || vault.dummy_verify(&plaintext)).await?;
        Ok(())
    }
}

/// Cheapest parameters Argon2 accepts. Test use only.
#[must_use]
pub fn fast_params() -> Params {
    Params::new(
        Params::MIN_M_COST,
        Params::MIN_T_COST,
        Params::MIN_P_COST,
        None,
    )
    .unwrap_or_default()
}
