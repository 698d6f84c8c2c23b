//! Login with brute-force lockout.
//!
//! Per account the lockout fields form a small state machine:
//!
//! - `Locked(until)` with `now < until`: every attempt is refused with the
//!   remaining seconds, credentials are not checked and nothing is written.
//! - `Locked(until)` with `now >= until`: behaves like `Active(0)`.
//! - `Active(n)`: a valid password writes `Active(0)` and succeeds. An invalid
//!   one writes `Active(n + 1)`, or `Locked(now + 60s)` with the counter reset
//!   once `n + 1` reaches [`MAX_FAILED_ATTEMPTS`].
//!
//! Writes go through `AccountStore::compare_and_set_login_state`. A lost race
//! re-reads the row and decides again, so concurrent failures are never
//! counted against a stale counter.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

use super::{
    credentials::CredentialVault,
    token::{SessionIdentity, TokenCodec},
    AuthError,
};
use crate::store::{Account, AccountProfile, AccountStore, LoginState};

pub const MAX_FAILED_ATTEMPTS: u8 = 3;
pub const LOCKOUT_DURATION: Duration = Duration::from_secs(60);

/// Retries after losing a compare-and-set before giving up.
const MAX_STATE_RACES: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginSuccess {
    pub token: String,
    pub user: AccountProfile,
    pub must_change_password: bool,
}

/// Decision for one attempt against one snapshot of the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Refused { remaining_seconds: u64 },
    Accepted,
    Failed { attempt: u8 },
    Locked,
}

fn decide(current: LoginState, password_ok: bool, now: DateTime<Utc>) -> (Outcome, LoginState) {
    if let Some(remaining_seconds) = current.locked_for(now) {
        return (Outcome::Refused { remaining_seconds }, current);
    }

    if password_ok {
        return (Outcome::Accepted, LoginState::default());
    }

    // An expired lock restarts the count.
    let previous = if current.locked_until.is_some() {
        0
    } else {
        current.failed_attempts
    };
    let attempt = previous.saturating_add(1);

    if attempt >= MAX_FAILED_ATTEMPTS {
        let until = now + ChronoDuration::seconds(LOCKOUT_DURATION.as_secs() as i64);
        (
            Outcome::Locked,
            LoginState {
                failed_attempts: 0,
                locked_until: Some(until),
            },
        )
    } else {
        (
            Outcome::Failed { attempt },
            LoginState {
                failed_attempts: attempt,
                locked_until: None,
            },
        )
    }
}

#[derive(Clone)]
pub struct LoginProcess {
    accounts: Arc<dyn AccountStore>,
    vault: CredentialVault,
    tokens: TokenCodec,
}

impl LoginProcess {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, vault: CredentialVault, tokens: TokenCodec) -> Self {
        Self {
            accounts,
            vault,
            tokens,
        }
    }

    /// Authenticate `email` / `password` and issue a session.
    ///
    /// # Errors
    /// `InvalidCredentials`, `LockedOut` and `AccountLocked` for refused
    /// attempts, `Internal` for store or hashing failures.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginSuccess, AuthError> {
        self.login_at(email, password, Utc::now()).await
    }

    /// # Errors
    /// See [`Self::login`].
    pub async fn login_at(
        &self,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> Result<LoginSuccess, AuthError> {
        let Some(mut account) = self.accounts.find_by_email(email).await? else {
            // Same hashing cost as a real mismatch.
            self.vault
                .dummy_verify_blocking(password)
                .await
                .map_err(AuthError::internal)?;
            debug!("Login for unknown account");
            return Err(AuthError::InvalidCredentials { attempt: None });
        };

        // (digest, verdict) of the last check, reused while the hash is unchanged.
        let mut checked: Option<(String, bool)> = None;

        for _ in 0..MAX_STATE_RACES {
            let current = account.login_state();

            if let Some(remaining_seconds) = current.locked_for(now) {
                info!(account_id = %account.id, remaining_seconds, "Login refused, account locked");
                return Err(AuthError::AccountLocked { remaining_seconds });
            }

            let password_ok = match &checked {
                Some((digest, verdict)) if *digest == account.password_hash => *verdict,
                _ => {
                    let verdict = self
                        .vault
                        .verify_blocking(password, &account.password_hash)
                        .await
                        .map_err(AuthError::internal)?;
                    checked = Some((account.password_hash.clone(), verdict));
                    verdict
                }
            };

            let (outcome, next) = decide(current, password_ok, now);

            if next != current
                && !self
                    .accounts
                    .compare_and_set_login_state(account.id, current, next)
                    .await?
            {
                debug!(account_id = %account.id, "Login state changed concurrently, retrying");
                account = self
                    .accounts
                    .find_by_id(account.id)
                    .await?
                    .ok_or_else(|| AuthError::internal("account vanished during login"))?;
                continue;
            }

            return match outcome {
                Outcome::Accepted => self.issue(&account),
                Outcome::Failed { attempt } => {
                    info!(account_id = %account.id, attempt, "Login failed");
                    Err(AuthError::InvalidCredentials {
                        attempt: Some(attempt),
                    })
                }
                Outcome::Locked => {
                    warn!(account_id = %account.id, "Account locked after repeated failures");
                    Err(AuthError::LockedOut)
                }
                Outcome::Refused { remaining_seconds } => {
                    Err(AuthError::AccountLocked { remaining_seconds })
                }
            };
        }

        Err(AuthError::internal(format!(
            "login state for account {} kept changing",
            account.id
        )))
    }

    fn issue(&self, account: &Account) -> Result<LoginSuccess, AuthError> {
        let token = self
            .tokens
            .issue(SessionIdentity {
                account_id: account.id,
                role: account.role,
                must_change_password: account.must_change_password,
            })
            .map_err(AuthError::internal)?;

        info!(account_id = %account.id, role = %account.role, "Login succeeded");

        Ok(LoginSuccess {
            token,
            user: account.profile(),
            must_change_password: account.must_change_password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        auth::{credentials::fast_params, Role},
        store::{AccountId, MemoryStore, NewAccount, StoreError},
    };

    const EMAIL: &str = "u1@example.com";
    const PASSWORD: &str = "right-password";

    struct Fixture {
        store: Arc<MemoryStore>,
        login: LoginProcess,
        tokens: TokenCodec,
        id: AccountId,
    }

    async fn fixture() -> Result<Fixture, Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let vault = CredentialVault::with_params(fast_params())?;
        let tokens = TokenCodec::new(b"login-test-secret")?;
        let account = store
            .create(NewAccount {
                email: EMAIL.to_string(),
                name: "User One".to_string(),
                password_hash: vault.hash(PASSWORD)?,
                role: Role::Editor,
            })
            .await?;
        let login = LoginProcess::new(store.clone(), vault, tokens.clone());
        Ok(Fixture {
            store,
            login,
            tokens,
            id: account.id,
        })
    }

    async fn state(fixture: &Fixture) -> Result<LoginState, StoreError> {
        Ok(fixture
            .store
            .find_by_id(fixture.id)
            .await?
            .map(|a| a.login_state())
            .unwrap_or_default())
    }

    async fn set_state(fixture: &Fixture, next: LoginState) -> Result<(), StoreError> {
        let current = state(fixture).await?;
        assert!(
            fixture
                .store
                .compare_and_set_login_state(fixture.id, current, next)
                .await?
        );
        Ok(())
    }

    #[test]
    fn decide_walks_the_transition_table() {
        let now = Utc::now();
        let active = |n| LoginState {
            failed_attempts: n,
            locked_until: None,
        };

        assert_eq!(
            decide(active(0), false, now),
            (Outcome::Failed { attempt: 1 }, active(1))
        );
        assert_eq!(
            decide(active(1), false, now),
            (Outcome::Failed { attempt: 2 }, active(2))
        );
        let (outcome, next) = decide(active(2), false, now);
        assert_eq!(outcome, Outcome::Locked);
        assert_eq!(next.failed_attempts, 0);
        assert_eq!(
            next.locked_until,
            Some(now + ChronoDuration::seconds(60))
        );
        assert_eq!(
            decide(active(2), true, now),
            (Outcome::Accepted, LoginState::default())
        );
    }

    #[test]
    fn decide_refuses_during_lock_without_change() {
        let now = Utc::now();
        let locked = LoginState {
            failed_attempts: 0,
            locked_until: Some(now + ChronoDuration::seconds(30)),
        };
        assert_eq!(
            decide(locked, true, now),
            (
                Outcome::Refused {
                    remaining_seconds: 30
                },
                locked
            )
        );
    }

    #[test]
    fn decide_treats_expired_lock_as_fresh() {
        let now = Utc::now();
        let expired = LoginState {
            failed_attempts: 2,
            locked_until: Some(now - ChronoDuration::seconds(1)),
        };
        assert_eq!(
            decide(expired, false, now),
            (
                Outcome::Failed { attempt: 1 },
                LoginState {
                    failed_attempts: 1,
                    locked_until: None
                }
            )
        );
        assert_eq!(
            decide(expired, true, now),
            (Outcome::Accepted, LoginState::default())
        );
    }

    #[tokio::test]
    async fn three_failures_lock_the_account() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let now = Utc::now();

        let first = fixture.login.login_at(EMAIL, "wrong", now).await;
        assert_eq!(
            first.err().map(|e| e.to_string()),
            Some("Invalid credentials. Attempt 1 of 3".to_string())
        );
        let second = fixture.login.login_at(EMAIL, "wrong", now).await;
        assert_eq!(
            second.err().map(|e| e.to_string()),
            Some("Invalid credentials. Attempt 2 of 3".to_string())
        );
        let third = fixture.login.login_at(EMAIL, "wrong", now).await;
        assert_eq!(third.err(), Some(AuthError::LockedOut));

        let locked = state(&fixture).await?;
        assert_eq!(locked.failed_attempts, 0);
        assert_eq!(locked.locked_until, Some(now + ChronoDuration::seconds(60)));

        // Correct password inside the window is not even checked.
        let fourth = fixture.login.login_at(EMAIL, PASSWORD, now).await;
        assert_eq!(
            fourth.err(),
            Some(AuthError::AccountLocked {
                remaining_seconds: 60
            })
        );
        assert_eq!(state(&fixture).await?, locked);
        Ok(())
    }

    #[tokio::test]
    async fn locked_account_rejects_without_writing() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let now = Utc::now();
        let locked = LoginState {
            failed_attempts: 0,
            locked_until: Some(now + ChronoDuration::seconds(10)),
        };
        set_state(&fixture, locked).await?;

        for password in [PASSWORD, "wrong"] {
            let result = fixture.login.login_at(EMAIL, password, now).await;
            assert!(matches!(result, Err(AuthError::AccountLocked { .. })));
        }
        assert_eq!(state(&fixture).await?, locked);
        Ok(())
    }

    #[tokio::test]
    async fn expired_lock_is_cleared_by_next_attempt() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let now = Utc::now();
        let expired = LoginState {
            failed_attempts: 0,
            locked_until: Some(now - ChronoDuration::seconds(1)),
        };

        set_state(&fixture, expired).await?;
        let failed = fixture.login.login_at(EMAIL, "wrong", now).await;
        assert_eq!(
            failed.err(),
            Some(AuthError::InvalidCredentials { attempt: Some(1) })
        );
        assert_eq!(
            state(&fixture).await?,
            LoginState {
                failed_attempts: 1,
                locked_until: None
            }
        );

        set_state(&fixture, expired).await?;
        fixture.login.login_at(EMAIL, PASSWORD, now).await?;
        assert_eq!(state(&fixture).await?, LoginState::default());
        Ok(())
    }

    #[tokio::test]
    async fn success_issues_session_and_resets_counter() -> Result<(), Box<dyn std::error::Error>>
    {
        let fixture = fixture().await?;
        let _ = fixture.login.login(EMAIL, "wrong").await;
        assert_eq!(state(&fixture).await?.failed_attempts, 1);

        let success = fixture.login.login(EMAIL, PASSWORD).await?;
        assert_eq!(state(&fixture).await?, LoginState::default());
        assert!(success.must_change_password);
        assert_eq!(success.user.email, EMAIL);
        assert_eq!(success.user.role, Role::Editor);

        let claims = fixture.tokens.verify(&success.token)?;
        assert_eq!(claims.sub, fixture.id);
        assert_eq!(claims.role, Role::Editor);
        assert!(claims.must_change_password);

        let body = serde_json::to_value(&success)?;
        assert!(body.get("mustChangePassword").is_some());
        assert!(body["user"].get("password").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_looks_like_wrong_password() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let unknown = fixture
            .login
            .login("nobody@example.com", PASSWORD)
            .await
            .err();
        assert_eq!(
            unknown,
            Some(AuthError::InvalidCredentials { attempt: None })
        );
        let status = unknown.map(|e| e.status());
        let wrong = fixture.login.login(EMAIL, "wrong").await.err();
        assert_eq!(status, wrong.map(|e| e.status()));
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() -> Result<(), Box<dyn std::error::Error>> {
        let fixture = fixture().await?;
        let now = Utc::now();

        let attempts = (0..3).map(|_| {
            let login = fixture.login.clone();
            tokio::spawn(async move { login.login_at(EMAIL, "wrong", now).await })
        });
        let mut locked_out = 0;
        let mut counted = Vec::new();
        for handle in attempts.collect::<Vec<_>>() {
            match handle.await? {
                Err(AuthError::LockedOut) => locked_out += 1,
                Err(AuthError::InvalidCredentials {
                    attempt: Some(attempt),
                }) => counted.push(attempt),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        counted.sort_unstable();

        assert_eq!(locked_out, 1);
        assert_eq!(counted, vec![1, 2]);
        assert!(state(&fixture).await?.locked_for(now).is_some());
        Ok(())
    }
}
