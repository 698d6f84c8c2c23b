use clap::{Arg, Command};

pub const BOOTSTRAP_ADMIN: &str = "bootstrap-admin";

/// `bootstrap-admin`: create the first administrator if it does not exist yet.
#[must_use]
pub fn with_args(command: Command) -> Command {
    command.subcommand(
        Command::new(BOOTSTRAP_ADMIN)
            .about("Create an administrator account that must change its password on first login")
            .arg(
                Arg::new("email")
                    .long("email")
                    .help("Administrator e-mail")
                    .env("STOCKROOM_ADMIN_EMAIL")
                    .required(true),
            )
            .arg(
                Arg::new("name")
                    .long("name")
                    .help("Administrator display name")
                    .env("STOCKROOM_ADMIN_NAME")
                    .default_value("Administrator"),
            )
            .arg(
                Arg::new("password")
                    .long("password")
                    .help("Temporary password")
                    .env("STOCKROOM_ADMIN_PASSWORD")
                    .hide_env_values(true)
                    .required(true),
            ),
    )
}
