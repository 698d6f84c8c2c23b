//! Maps validated CLI matches to an [`Action`].

use crate::cli::actions::{bootstrap, server, Action};
use crate::cli::commands::{admin, auth};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    if let Some(sub) = matches.subcommand_matches(admin::BOOTSTRAP_ADMIN) {
        let email = sub
            .get_one::<String>("email")
            .cloned()
            .context("missing required argument: --email")?;
        let name = sub
            .get_one::<String>("name")
            .cloned()
            .unwrap_or_else(|| "Administrator".to_string());
        let password = sub
            .get_one::<String>("password")
            .filter(|password| !password.is_empty())
            .map(|password| SecretString::from(password.clone()))
            .context("missing required argument: --password")?;

        return Ok(Action::BootstrapAdmin(bootstrap::Args {
            dsn,
            email,
            name,
            password,
        }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
    }))
}
