//! ERC-1271 contract-wallet validation against the mocked provider,
//! including the historical-block retry path.

use std::sync::atomic::Ordering;

use authchain::builder::{create_signature, ephemeral_message};
use authchain::crypto::Identity;
use authchain::{AuthLink, LinkKind, validate_signature};
use chrono::{DateTime, Utc};

use crate::helpers::MockWalletProvider;

const WALLET_ADDRESS: &str = "0x3B3b69b5e915cbd9D982c6C9A2bD3c0b9BE2Ef92";
const ENTITY_ID: &str = "QmWWQSuPMS6aXCbZKpEjPHPUZN2NjB3YrhJTHsV4X3vb2t";

/// A plausibly sized multi-signature blob; the mock never inspects it.
fn contract_signature() -> String {
    format!("0x{}", "ab".repeat(130))
}

fn expiration_at_block(block: u64) -> DateTime<Utc> {
    DateTime::from_timestamp(MockWalletProvider::timestamp_of(block) as i64, 0)
        .unwrap()
        .with_timezone(&Utc)
}

/// SIGNER(wallet) -> contract-wallet delegation -> personal entity link.
fn contract_chain(ephemeral: &Identity, expiration: DateTime<Utc>) -> Vec<AuthLink> {
    let message = ephemeral_message(&ephemeral.address, expiration);
    let entity_signature = create_signature(ephemeral, ENTITY_ID).unwrap();
    vec![
        AuthLink::signer(WALLET_ADDRESS),
        AuthLink::new(LinkKind::EcdsaEip1654Ephemeral, message, contract_signature()),
        AuthLink::new(LinkKind::EcdsaPersonalSignedEntity, ENTITY_ID, entity_signature),
    ]
}

#[tokio::test]
async fn test_magic_at_head_validates_without_block_lookups() {
    let provider = MockWalletProvider::new(1_000, Some(1_000));
    let ephemeral = Identity::random();
    let chain = contract_chain(&ephemeral, expiration_at_block(900));
    let reference = MockWalletProvider::millis_of(800);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(result.ok, "{:?}", result.message);

    // One call, unpinned, and no block resolution needed.
    assert_eq!(*provider.view_calls.lock().unwrap(), vec![None]);
    assert_eq!(provider.block_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_rotated_wallet_validates_at_historical_block() {
    // The wallet's signer set was rotated after block 500, so the head call
    // fails and validation must pin to the block bracketing the reference.
    let provider = MockWalletProvider::new(1_000, Some(500));
    let ephemeral = Identity::random();
    let chain = contract_chain(&ephemeral, expiration_at_block(450));
    let reference = MockWalletProvider::millis_of(400);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(result.ok, "{:?}", result.message);

    let calls = provider.view_calls.lock().unwrap().clone();
    assert_eq!(calls.len(), 2, "{calls:?}");
    assert_eq!(calls[0], None);
    let pinned = calls[1].unwrap();
    // Pinned to the block at or just after the reference instant.
    assert!((400..=401).contains(&pinned), "{pinned}");
    assert!(provider.block_requests.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn test_wallet_that_never_validates_fails_the_link() {
    let provider = MockWalletProvider::new(1_000, None);
    let ephemeral = Identity::random();
    let chain = contract_chain(&ephemeral, expiration_at_block(900));
    let reference = MockWalletProvider::millis_of(800);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(!result.ok);
    let message = result.message.unwrap();
    assert!(message.contains("Link type: ECDSA_EIP_1654_EPHEMERAL"), "{message}");
    assert!(message.contains("magic value"), "{message}");

    // Both the head attempt and the historical retry were made.
    assert_eq!(provider.view_calls.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_contract_signed_entity_terminus() {
    let provider = MockWalletProvider::new(1_000, Some(1_000));
    let chain = vec![
        AuthLink::signer(WALLET_ADDRESS),
        AuthLink::new(LinkKind::EcdsaEip1654SignedEntity, ENTITY_ID, contract_signature()),
    ];
    let reference = MockWalletProvider::millis_of(800);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(result.ok, "{:?}", result.message);
}

#[tokio::test]
async fn test_expired_contract_delegation_issues_no_rpc() {
    let provider = MockWalletProvider::new(1_000, Some(1_000));
    let ephemeral = Identity::random();
    // Expires at block 300, reference is block 400.
    let chain = contract_chain(&ephemeral, expiration_at_block(300));
    let reference = MockWalletProvider::millis_of(400);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(!result.ok);
    assert!(result.message.unwrap().contains("expired"));

    // Expiration is checked before any on-chain work.
    assert!(provider.view_calls.lock().unwrap().is_empty());
    assert_eq!(provider.block_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_malformed_chain_issues_no_rpc() {
    let provider = MockWalletProvider::new(1_000, Some(1_000));
    let ephemeral = Identity::random();
    let mut chain = contract_chain(&ephemeral, expiration_at_block(900));
    chain.remove(0);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), None).await;
    assert!(!result.ok);
    assert_eq!(result.message.as_deref(), Some("ERROR: Malformed authChain"));
    assert!(provider.view_calls.lock().unwrap().is_empty());
    assert_eq!(provider.block_requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_line_ending_variants_share_one_wallet_signature() {
    // Contract wallets validate the normalized message, so a chain whose
    // payload was rewritten with \r\n line endings still validates.
    let provider = MockWalletProvider::new(1_000, Some(1_000));
    let ephemeral = Identity::random();
    let mut chain = contract_chain(&ephemeral, expiration_at_block(900));
    chain[1].payload = chain[1].payload.replace('\n', "\r\n");
    let reference = MockWalletProvider::millis_of(800);

    let result = validate_signature(ENTITY_ID, &chain, Some(&provider), Some(reference)).await;
    assert!(result.ok, "{:?}", result.message);
}
