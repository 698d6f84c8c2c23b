use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_JWT_SECRET)
            .long(ARG_JWT_SECRET)
            .help("Secret used to sign session tokens")
            .long_help(
                "Secret used to sign session tokens. Changing it invalidates every outstanding session.",
            )
            .env("STOCKROOM_JWT_SECRET")
            .hide_env_values(true),
    )
}

#[derive(Debug)]
pub struct Options {
    pub jwt_secret: SecretString,
}

impl Options {
    /// # Errors
    /// Returns an error when the secret is missing or empty.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|secret| !secret.is_empty())
            .map(|secret| SecretString::from(secret.clone()))
            .context("missing required argument: --jwt-secret")?;

        Ok(Self { jwt_secret })
    }
}
