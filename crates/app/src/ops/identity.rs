use clap::Args;

use common::crypto::CryptoError;
use common::identity::IdentityStore;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Identity;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("could not encode public keys: {0}")]
    Crypto(#[from] CryptoError),
}

/// The public half of an identity, as handed to the key directory
pub fn describe(store: &IdentityStore) -> Result<String, CryptoError> {
    let identity = store.identity();
    let account = identity
        .account
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "(none)".to_string());
    let alias = identity
        .alias
        .as_ref()
        .map(|a| a.to_string())
        .unwrap_or_else(|| "(none)".to_string());
    let public_key = identity.public_key();

    Ok(format!(
        "Account: {}\n\
         Alias: {}\n\
         Fingerprint: {}\n\
         Identity key: {}\n\
         Alias key: {}\n\
         RSA key: {}",
        account,
        alias,
        public_key.fingerprint(),
        public_key.to_base64(),
        identity.alias_public_key().to_base64(),
        identity.rsa_key.public().to_base64()?,
    ))
}

#[async_trait::async_trait]
impl crate::op::Op for Identity {
    type Error = IdentityError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, peer) = ctx.open_peer()?;
        Ok(describe(peer.store())?)
    }
}
