use clap::Args;

use common::identity::PendingStatus;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Pending;

#[derive(Debug, thiserror::Error)]
pub enum PendingError {
    #[error(transparent)]
    Context(#[from] ContextError),
}

#[async_trait::async_trait]
impl crate::op::Op for Pending {
    type Error = PendingError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, peer) = ctx.open_peer()?;

        let lines: Vec<String> = peer
            .store()
            .pending_connections()
            .map(|(remote, pending)| {
                let status = match pending.status {
                    PendingStatus::AwaitingResponse => "waiting for their response",
                    PendingStatus::AwaitingAck => "waiting for their confirmation",
                };
                match &pending.message {
                    Some(message) => format!("{}: {} \"{}\"", remote, status, message),
                    None => format!("{}: {}", remote, status),
                }
            })
            .collect();

        if lines.is_empty() {
            return Ok("No pending connections".to_string());
        }
        Ok(lines.join("\n"))
    }
}
