use clap::Args;

use common::crypto::CryptoError;
use common::identity::{IdentityStore, StoreError};
use common::ledger::AccountId;
use common::remote::RemoteError;

use crate::op::ContextError;
use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Account id allocated for this identity at signup
    #[arg(long)]
    pub account: String,

    /// Public alias id, if one was allocated
    #[arg(long)]
    pub alias: Option<String>,

    /// Ledger service base URL
    #[arg(long)]
    pub service_url: Option<String>,

    /// Key directory for private accounts
    #[arg(long)]
    pub users_url: Option<String>,

    /// Key directory for aliases and RSA keys
    #[arg(long)]
    pub public_users_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("invalid service url: {0}")]
    Remote(#[from] RemoteError),
    #[error("could not create identity store: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let passphrase = ctx.passphrase()?;

        let defaults = AppConfig::default();
        let config = AppConfig {
            service_url: self.service_url.clone().unwrap_or(defaults.service_url),
            users_url: self.users_url.clone().unwrap_or(defaults.users_url),
            public_users_url: self
                .public_users_url
                .clone()
                .unwrap_or(defaults.public_users_url),
            ..AppConfig::default()
        };
        config.remote_config()?;

        tracing::info!("generating keys for {}", self.account);
        let mut store = IdentityStore::generate()?;
        store.initialize(
            AccountId::new(self.account.as_str()),
            self.alias.as_deref().map(AccountId::new),
        );

        let state = AppState::init(ctx.config_path.clone(), Some(config))?;
        if let Err(e) = store.persist(passphrase, &state.store_path) {
            state.abandon()?;
            return Err(e.into());
        }

        Ok(format!(
            "Initialized thorne directory at: {}\n\
             - Identity store: {}\n\
             - Config: {}\n\
             - Service: {}\n\
             {}",
            state.thorne_dir.display(),
            state.store_path.display(),
            state.config_path.display(),
            state.config.service_url,
            super::identity::describe(&store)?
        ))
    }
}
