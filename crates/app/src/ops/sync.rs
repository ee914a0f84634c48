use clap::Args;

use common::ledger::{BlockAddress, BlockPayload, Ledger, LedgerId, SignedBlock};
use common::peer::{HandshakeOutcome, SyncError, SyncReport};

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct SyncLedgers {
    /// Only sync this ledger
    pub ledger: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncLedgersError {
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error("sync failed: {0}")]
    Sync(#[from] SyncError),
}

fn render_payload(ledger: &Ledger, block: &SignedBlock, payload: &BlockPayload) -> String {
    match payload {
        BlockPayload::Message(message) => {
            format!("[{}] {}: {}", ledger.id, message.author, message.message)
        }
        BlockPayload::NewLedgerNotice(notice) => {
            format!(
                "[{}] {} shared ledger {} {}",
                ledger.id, notice.from, notice.uuid, notice.name
            )
        }
        other => format!(
            "[{}] {} block from {}",
            ledger.id,
            other.block_type(),
            block.author()
        ),
    }
}

fn render_report(report: &SyncReport, out: &mut Vec<String>) {
    for outcome in &report.handshakes {
        out.push(match outcome {
            HandshakeOutcome::Responded { remote } => {
                format!("{} wants to connect; answered", remote)
            }
            HandshakeOutcome::Established { remote, ledger } => {
                format!("connected to {} on ledger {}", remote, ledger)
            }
            HandshakeOutcome::AlreadyHandled { remote } => {
                format!("repeated handshake message from {} ignored", remote)
            }
        });
    }
    for failure in &report.failures {
        out.push(format!("[{}] skipped {}", report.ledger, failure));
    }
}

#[async_trait::async_trait]
impl crate::op::Op for SyncLedgers {
    type Error = SyncLedgersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, mut peer) = ctx.open_peer()?;

        let mut delivered = Vec::new();
        let mut handler =
            |ledger: &Ledger, _: &BlockAddress, block: &SignedBlock, payload: BlockPayload| {
                delivered.push(render_payload(ledger, block, &payload));
            };

        let results = match &self.ledger {
            Some(id) => {
                let id = LedgerId::new(id.as_str());
                let result = peer.sync_ledger(&id, &mut handler).await;
                vec![(id, result)]
            }
            None => peer.sync_all(&mut handler).await,
        };

        // Checkpoints advanced by successful walks are kept even if others failed
        ctx.save(&state, &peer)?;

        let mut lines = delivered;
        let mut first_error = None;
        for (id, result) in results {
            match result {
                Ok(report) => render_report(&report, &mut lines),
                Err(e) => {
                    lines.push(format!("[{}] sync failed: {}", id, e));
                    first_error.get_or_insert(e);
                }
            }
        }

        // A single requested ledger that could not be synced is an error
        if self.ledger.is_some() {
            if let Some(e) = first_error {
                return Err(e.into());
            }
        }

        if lines.is_empty() {
            return Ok("Up to date".to_string());
        }
        Ok(lines.join("\n"))
    }
}
