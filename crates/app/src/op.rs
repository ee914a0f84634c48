use std::error::Error;
use std::path::PathBuf;

use common::identity::{IdentityStore, StoreError};
use common::peer::{Peer, PeerError};
use common::remote::{HttpLedgerService, RemoteError};

use crate::state::{AppState, StateError};

pub type ThornePeer = Peer<HttpLedgerService>;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("no passphrase given: pass --passphrase or set THORNE_PASSPHRASE")]
    MissingPassphrase,
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Peer(#[from] PeerError),
}

#[derive(Clone)]
pub struct OpContext {
    /// Optional custom config path (defaults to ~/.thorne)
    pub config_path: Option<PathBuf>,
    passphrase: Option<String>,
}

impl std::fmt::Debug for OpContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpContext")
            .field("config_path", &self.config_path)
            .finish_non_exhaustive()
    }
}

impl OpContext {
    pub fn new(config_path: Option<PathBuf>, passphrase: Option<String>) -> Self {
        Self {
            config_path,
            passphrase,
        }
    }

    pub fn passphrase(&self) -> Result<&str, ContextError> {
        self.passphrase
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ContextError::MissingPassphrase)
    }

    /// Unlock the identity store and bind it to the configured service
    pub fn open_peer(&self) -> Result<(AppState, ThornePeer), ContextError> {
        let state = AppState::load(self.config_path.clone())?;
        let store = IdentityStore::open(self.passphrase()?, &state.store_path)?;
        if !store.is_initialized() {
            return Err(StoreError::NotInitialized.into());
        }

        let remote = HttpLedgerService::new(state.config.remote_config()?)?;
        let peer = Peer::builder()
            .store(store)
            .remote(remote)
            .config(state.config.sync_config())
            .build()?;
        Ok((state, peer))
    }

    pub fn save(&self, state: &AppState, peer: &ThornePeer) -> Result<(), ContextError> {
        peer.store().persist(self.passphrase()?, &state.store_path)?;
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}

#[macro_export]
macro_rules! command_enum {
    ($(($variant:ident, $type:ty)),* $(,)?) => {
        #[derive(Subcommand, Debug, Clone)]
        pub enum Command {
            $($variant($type),)*
        }

        #[derive(Debug)]
        pub enum OpOutput {
            $($variant(<$type as $crate::op::Op>::Output),)*
        }

        #[derive(Debug, thiserror::Error)]
        pub enum OpError {
            $(
                #[error(transparent)]
                $variant(<$type as $crate::op::Op>::Error),
            )*
        }

        #[async_trait::async_trait]
        impl $crate::op::Op for Command {
            type Output = OpOutput;
            type Error = OpError;

            async fn execute(&self, ctx: &$crate::op::OpContext) -> Result<Self::Output, Self::Error> {
                match self {
                    $(
                        Command::$variant(op) => {
                            op.execute(ctx).await
                                .map(OpOutput::$variant)
                                .map_err(OpError::$variant)
                        },
                    )*
                }
            }
        }

        impl std::fmt::Display for OpOutput {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                match self {
                    $(
                        OpOutput::$variant(output) => write!(f, "{}", output),
                    )*
                }
            }
        }
    };
}
