use clap::Args;

use crate::op::ContextError;

#[derive(Args, Debug, Clone)]
pub struct Ledgers;

#[derive(Debug, thiserror::Error)]
pub enum LedgersError {
    #[error(transparent)]
    Context(#[from] ContextError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ledgers {
    type Error = LedgersError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, peer) = ctx.open_peer()?;
        let store = peer.store();

        if store.ledgers().is_empty() {
            return Ok("No ledgers".to_string());
        }

        let lines: Vec<String> = store
            .ledgers()
            .iter()
            .map(|ledger| {
                let key = match store.ledger_key(&ledger.id) {
                    Some(key) if key.secret.is_some() => "key held",
                    Some(_) if !ledger.is_encrypted() => "plaintext",
                    _ => "no key",
                };
                let users: Vec<&str> = ledger.participants().map(|a| a.as_str()).collect();
                format!(
                    "{} [{}, {}] users: {} checkpoint: {}",
                    ledger.id,
                    ledger.ledger_type,
                    key,
                    users.join(","),
                    ledger.last_block
                )
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
