mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

use ::common::ledger::{Block, BlockPayload, BlockType, LedgerId, LedgerType, SignedBlock};
use ::common::peer::{BlockFailure, NoopHandler, SyncConfig, SyncError};
use ::common::remote::{LedgerService, MemoryLedgerService};

use crate::common::{setup_flaky_peer, setup_peer, setup_peer_with, FlakyService, Recorder, TestPeer};

async fn public_ledger(peer: &mut TestPeer) -> LedgerId {
    peer.create_ledger(LedgerType::Public, None, vec![])
        .await
        .unwrap()
}

#[tokio::test]
async fn test_up_to_date_ledger_fetches_nothing() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    let report = alice.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    assert!(report.is_noop());
    assert_eq!(service.fetch_count(), 0);

    alice.send_message(&ledger, "one").await.unwrap();
    alice.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    let fetched = service.fetch_count();

    let report = alice.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    assert!(report.is_noop());
    assert!(report.delivered.is_empty());
    assert_eq!(service.fetch_count(), fetched);
}

#[tokio::test]
async fn test_blocks_delivered_newest_first_exactly_once() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    let first = alice.send_message(&ledger, "one").await.unwrap();
    let second = alice.send_message(&ledger, "two").await.unwrap();

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(recorder.messages(), vec!["two", "one"]);
    assert_eq!(report.delivered, vec![second.clone(), first]);
    assert_eq!(report.head, second);
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, second);

    let third = alice.send_message(&ledger, "three").await.unwrap();
    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(recorder.messages(), vec!["three"]);
    assert_eq!(report.previous, second);
    assert_eq!(report.head, third);
}

#[tokio::test]
async fn test_missing_block_ends_walk() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    alice.send_message(&ledger, "one").await.unwrap();
    let middle = alice.send_message(&ledger, "two").await.unwrap();
    let head = alice.send_message(&ledger, "three").await.unwrap();
    service.remove_block(&middle).unwrap();

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(recorder.messages(), vec!["three"]);
    assert!(report.failures.is_empty());
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, head);
}

#[tokio::test]
async fn test_tampered_block_withheld_when_strict() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    let address = alice.send_message(&ledger, "original").await.unwrap();
    let mut block = service.chain(&ledger)[0].1.clone();
    block.block.contents = BASE64.encode(br#"{"Author":"alice","Message":"forged"}"#);
    service.replace_block(&address, block);

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert!(recorder.seen.is_empty());
    assert!(report.delivered.is_empty());
    assert!(matches!(
        report.failures.as_slice(),
        [BlockFailure::SignatureInvalid { .. }]
    ));
    // The bad block still advances the checkpoint
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, address);
}

#[tokio::test]
async fn test_tampered_block_delivered_when_permissive() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer_with(
        &service,
        "alice",
        SyncConfig {
            strict_signature_verification: false,
        },
    );
    let ledger = public_ledger(&mut alice).await;

    let address = alice.send_message(&ledger, "original").await.unwrap();
    let mut block = service.chain(&ledger)[0].1.clone();
    block.block.contents = BASE64.encode(br#"{"Author":"alice","Message":"forged"}"#);
    service.replace_block(&address, block);

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(recorder.messages(), vec!["forged"]);
    assert_eq!(report.delivered, vec![address]);
    assert_eq!(report.failures.len(), 1);
}

#[tokio::test]
async fn test_undecryptable_block_is_skipped() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = alice
        .create_ledger(LedgerType::Private, None, vec![])
        .await
        .unwrap();

    let first = alice.send_message(&ledger, "before").await.unwrap();

    // Correctly signed, but not sealed under the ledger key
    let garbage = Block::new(
        alice.account_id().unwrap(),
        ledger.clone(),
        BASE64.encode([7u8; 64]),
        BlockType::Message,
    );
    let garbage = SignedBlock::sign(garbage, &alice.store().identity().identity_key).unwrap();
    let bad = service.write_block(garbage).await.unwrap();

    alice.send_message(&ledger, "after").await.unwrap();

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(recorder.messages(), vec!["after", "before"]);
    assert_eq!(report.delivered.len(), 2);
    assert_eq!(report.delivered[1], first);
    assert_eq!(
        report.failures,
        vec![BlockFailure::Authentication { address: bad }]
    );
}

#[tokio::test]
async fn test_ledger_without_key_reports_each_block() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let mut bob = setup_peer(&service, "bob");
    let ledger = alice
        .create_ledger(LedgerType::Group, None, vec![bob.account_id().unwrap()])
        .await
        .unwrap();
    alice.send_message(&ledger, "one").await.unwrap();
    alice.send_message(&ledger, "two").await.unwrap();

    bob.store_mut()
        .save_ledger(ledger.clone(), LedgerType::Group, None, vec![]);
    let report = bob.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    assert!(report.delivered.is_empty());
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f, BlockFailure::MissingLedgerKey { .. })));
}

#[tokio::test]
async fn test_handshake_outside_inbox_is_rejected() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    alice
        .write_block(
            &ledger,
            BlockType::HandshakeInit,
            br#"{"EphemeralPublicKey":"AAAA","UUID":"c2Vu"}"#,
        )
        .await
        .unwrap();

    let report = alice.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    assert!(report.handshakes.is_empty());
    assert!(matches!(
        report.failures.as_slice(),
        [BlockFailure::Handshake { .. }]
    ));
}

#[tokio::test]
async fn test_unrecognised_types_reach_handler() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let ledger = public_ledger(&mut alice).await;

    alice
        .write_block(&ledger, BlockType::from("kr"), b"rotated")
        .await
        .unwrap();

    let mut recorder = Recorder::default();
    alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    match recorder.seen.as_slice() {
        [(_, BlockPayload::Unknown { tag, bytes })] => {
            assert_eq!(tag, "kr");
            assert_eq!(bytes.as_slice(), b"rotated");
        }
        other => panic!("unexpected payloads: {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_ledger_is_an_error() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");

    let result = alice
        .sync_ledger(&LedgerId::new("never-seen"), &mut NoopHandler)
        .await;
    assert!(matches!(result, Err(SyncError::UnknownLedger(_))));
    assert_eq!(service.fetch_count(), 0);
}

#[tokio::test]
async fn test_sync_all_covers_every_ledger() {
    let service = MemoryLedgerService::new();
    let mut alice = setup_peer(&service, "alice");
    let first = public_ledger(&mut alice).await;
    let second = alice
        .create_ledger(LedgerType::Private, None, vec![])
        .await
        .unwrap();
    alice.send_message(&first, "public").await.unwrap();
    alice.send_message(&second, "private").await.unwrap();

    let mut recorder = Recorder::default();
    let results = alice.sync_all(&mut recorder).await;
    // inbox, public and private
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, result)| result.is_ok()));

    let mut messages = recorder.messages();
    messages.sort();
    assert_eq!(messages, vec!["private", "public"]);
}

#[tokio::test]
async fn test_unreachable_key_directory_keeps_checkpoint() {
    let service = FlakyService::new();
    let mut alice = setup_flaky_peer(&service, "alice");
    let ledger = alice
        .create_ledger(LedgerType::Public, None, vec![])
        .await
        .unwrap();
    let address = alice.send_message(&ledger, "hello").await.unwrap();

    service.fail_key_lookups(1);
    let mut recorder = Recorder::default();
    let result = alice.sync_ledger(&ledger, &mut recorder).await;
    assert!(matches!(result, Err(SyncError::Remote(_))));
    assert!(recorder.seen.is_empty());
    assert!(alice.store().ledger(&ledger).unwrap().last_block.is_terminal());

    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert!(report.failures.is_empty());
    assert_eq!(recorder.messages(), vec!["hello"]);
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, address);
}

#[tokio::test]
async fn test_fetch_failure_mid_walk_keeps_checkpoint() {
    let service = FlakyService::new();
    let mut alice = setup_flaky_peer(&service, "alice");
    let ledger = alice
        .create_ledger(LedgerType::Public, None, vec![])
        .await
        .unwrap();

    let first = alice.send_message(&ledger, "one").await.unwrap();
    alice.sync_ledger(&ledger, &mut NoopHandler).await.unwrap();
    alice.send_message(&ledger, "two").await.unwrap();
    let head = alice.send_message(&ledger, "three").await.unwrap();

    // The head is fetched, its parent is not
    service.fail_fetch_after(1);
    let mut recorder = Recorder::default();
    let result = alice.sync_ledger(&ledger, &mut recorder).await;
    assert!(matches!(result, Err(SyncError::Remote(_))));
    assert_eq!(recorder.messages(), vec!["three"]);
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, first);

    let mut recorder = Recorder::default();
    let report = alice.sync_ledger(&ledger, &mut recorder).await.unwrap();
    assert_eq!(report.previous, first);
    assert_eq!(report.head, head);
    assert_eq!(recorder.messages(), vec!["three", "two"]);
    assert_eq!(alice.store().ledger(&ledger).unwrap().last_block, head);
}
