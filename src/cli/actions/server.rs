use crate::{
    api::{self, AppContext},
    auth::{CredentialVault, TokenCodec},
    store::{self, MEMORY_DSN},
};
use anyhow::{Context, Result};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub jwt_secret: SecretString,
}

fn log_startup_args(args: &Args) {
    // Never log the DSN; it usually embeds credentials.
    debug!(port = args.port, "Startup arguments");
    if args.dsn == MEMORY_DSN {
        warn!("Using the in-memory store: data is lost on restart and not shared between processes");
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the signing secret is unusable, the datastore cannot be
/// opened, or the server fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let tokens = TokenCodec::new(args.jwt_secret.expose_secret().as_bytes())
        .context("Invalid JWT signing secret")?;

    let vault = tokio::task::spawn_blocking(CredentialVault::new)
        .await
        .context("Failed to initialize password hashing")??;

    let backend = store::open(&args.dsn)
        .await
        .context("Failed to open datastore")?;

    let ctx = Arc::new(AppContext::new(backend.clone(), vault, tokens));

    let result = api::new(args.port, ctx).await;

    backend.close().await;
    info!("Server stopped");

    result
}
