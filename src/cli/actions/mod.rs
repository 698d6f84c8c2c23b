pub mod bootstrap;
pub mod server;

// Single dispatch point for `Action`; see `run::execute`.
mod run;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    BootstrapAdmin(bootstrap::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
