use clap::Args;

use common::ledger::{AccountId, LedgerType};
use common::peer::PeerError;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct CreateLedger {
    /// Kind of ledger: private, public, one-on-one, group, photos or health
    pub kind: LedgerType,

    /// Additional users to include
    #[arg(long = "user")]
    pub users: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CreateLedgerError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("request inboxes are created by the service")]
    RequestsLedger,
    #[error("could not create ledger: {0}")]
    Peer(#[from] PeerError),
}

#[async_trait::async_trait]
impl crate::op::Op for CreateLedger {
    type Error = CreateLedgerError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if self.kind == LedgerType::Requests {
            return Err(CreateLedgerError::RequestsLedger);
        }
        let (state, mut peer) = ctx.open_peer()?;
        let users = self.users.iter().map(|u| AccountId::new(u.as_str())).collect();

        let id = peer.create_ledger(self.kind, None, users).await?;
        ctx.save(&state, &peer)?;

        Ok(format!("Created {} ledger {}", self.kind, id))
    }
}
