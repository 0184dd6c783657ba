//! Tests for key loading and selection

use super::*;
use std::path::PathBuf;

const PASSPHRASE: &str = "reporter-test";
const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945387dc9f5a59e86cdc84e64546a1d8f76d59";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn fixture_paths() -> Vec<String> {
    vec![
        fixture("reporter-a.json").display().to_string(),
        fixture("reporter-b.json").display().to_string(),
    ]
}

fn ring(selection: KeySelection) -> KeyRing {
    KeyRing::from_identities(
        vec![
            SigningIdentity::from_private_key(KEY_A).unwrap(),
            SigningIdentity::from_private_key(KEY_B).unwrap(),
        ],
        selection,
    )
    .unwrap()
}

#[test]
fn test_private_key_address() {
    let identity = SigningIdentity::from_private_key(KEY_A).unwrap();
    let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
    assert_eq!(identity.address(), expected);
}

#[test]
fn test_invalid_private_key() {
    let err = SigningIdentity::from_private_key("0x1234").unwrap_err();
    assert!(matches!(err, ReporterError::Signing(_)));
}

#[test]
fn test_debug_hides_key_material() {
    let identity = SigningIdentity::from_private_key(KEY_A).unwrap();
    let printed = format!("{:?}", identity);
    assert!(printed.contains("SigningIdentity"));
    assert!(!printed.contains("ac0974bec39a17e36ba4a6b4d238ff944bacb478"));
}

#[test]
fn test_load_keystores() {
    let ring = KeyRing::load(&fixture_paths(), PASSPHRASE, KeySelection::RoundRobin).unwrap();
    assert_eq!(ring.len(), 2);
    assert_eq!(
        ring.addresses(),
        vec![
            SigningIdentity::from_private_key(KEY_A).unwrap().address(),
            SigningIdentity::from_private_key(KEY_B).unwrap().address(),
        ]
    );
}

#[test]
fn test_wrong_passphrase_is_keystore_error() {
    let err = KeyRing::load(&fixture_paths(), "not-the-passphrase", KeySelection::All).unwrap_err();
    assert!(matches!(err, ReporterError::Keystore { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_missing_keystore_file() {
    let paths = vec![fixture("does-not-exist.json").display().to_string()];
    let err = KeyRing::load(&paths, PASSPHRASE, KeySelection::All).unwrap_err();
    match err {
        ReporterError::Keystore { path, .. } => assert!(path.ends_with("does-not-exist.json")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_empty_ring_rejected() {
    assert!(KeyRing::from_identities(vec![], KeySelection::RoundRobin).is_err());
}

#[test]
fn test_round_robin_rotates() {
    let ring = ring(KeySelection::RoundRobin);
    let addresses = ring.addresses();
    let picks: Vec<Address> = (0..4).map(|turn| ring.select(turn)[0].address()).collect();
    assert_eq!(
        picks,
        vec![addresses[0], addresses[1], addresses[0], addresses[1]]
    );
}

#[test]
fn test_random_picks_one_member() {
    let ring = ring(KeySelection::Random);
    let addresses = ring.addresses();
    for turn in 0..20 {
        let picked = ring.select(turn);
        assert_eq!(picked.len(), 1);
        assert!(addresses.contains(&picked[0].address()));
    }
}

#[test]
fn test_all_returns_every_identity_in_order() {
    let ring = ring(KeySelection::All);
    let picked: Vec<Address> = ring.select(7).iter().map(|id| id.address()).collect();
    assert_eq!(picked, ring.addresses());
}

#[test]
fn test_single_key_always_selected() {
    for selection in [KeySelection::RoundRobin, KeySelection::Random, KeySelection::All] {
        let ring = KeyRing::from_identities(
            vec![SigningIdentity::from_private_key(KEY_B).unwrap()],
            selection,
        )
        .unwrap();
        for turn in 0..3 {
            let picked = ring.select(turn);
            assert_eq!(picked.len(), 1);
            assert_eq!(picked[0].address(), ring.addresses()[0]);
        }
    }
}

#[test]
fn test_sign_transaction_recovers_signer() {
    use ethers::types::TransactionRequest;

    let identity = SigningIdentity::from_private_key(KEY_A).unwrap();
    let tx: TypedTransaction = TransactionRequest::new()
        .from(identity.address())
        .to(Address::repeat_byte(0x11))
        .nonce(3u64)
        .gas(100_000u64)
        .gas_price(1_000_000_000u64)
        .chain_id(61u64)
        .into();

    let signature = identity.sign_transaction(&tx, 61).unwrap();
    assert_eq!(signature.recover(tx.sighash()).unwrap(), identity.address());
    // EIP-155: v = recid + 35 + 2 * chain_id
    assert!(signature.v == 157 || signature.v == 158);
}
