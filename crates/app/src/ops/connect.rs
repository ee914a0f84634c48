use clap::Args;

use common::ledger::AccountId;
use common::peer::HandshakeError;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Connect {
    /// Account to connect to
    pub account: String,

    /// Introduction shown to the other side
    #[arg(long, short, default_value = "")]
    pub message: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("key exchange failed: {0}")]
    Handshake(#[from] HandshakeError),
}

#[async_trait::async_trait]
impl crate::op::Op for Connect {
    type Error = ConnectError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, mut peer) = ctx.open_peer()?;
        let remote = AccountId::new(self.account.as_str());

        peer.connect(&remote, &self.message).await?;
        ctx.save(&state, &peer)?;

        Ok(format!(
            "Connection request sent to {}. Run 'thorne sync' to pick up their answer.",
            remote
        ))
    }
}
