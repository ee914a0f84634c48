use clap::Args;

use common::ledger::LedgerId;
use common::peer::PeerError;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct SendMessage {
    /// Ledger to post to
    pub ledger: String,

    /// Message text
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("unknown ledger: {0}")]
    UnknownLedger(LedgerId),
    #[error("could not write message: {0}")]
    Peer(#[from] PeerError),
}

#[async_trait::async_trait]
impl crate::op::Op for SendMessage {
    type Error = SendError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, peer) = ctx.open_peer()?;
        let ledger = LedgerId::new(self.ledger.as_str());
        if peer.store().ledger(&ledger).is_none() {
            return Err(SendError::UnknownLedger(ledger));
        }

        let address = peer.send_message(&ledger, &self.text).await?;
        Ok(format!("Sent: {}", address))
    }
}
