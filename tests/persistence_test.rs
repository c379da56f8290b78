//! Key records written to disk and restored into a new account
//!
//! Run with: cargo test --test persistence_test -- --nocapture

mod common;

use std::fs;

use common::{receive_address_at, test_account, test_crypter, LOOKAHEAD};
use hd_pocket::{
    CoinType, HdAccount, KeyPurpose, KeyRecord, MessageStatus, SecretRecord, SignedMessage,
    SimpleHdKeyChain,
};
use tempfile::TempDir;

fn write_and_restore(account: &HdAccount, dir: &TempDir) -> anyhow::Result<HdAccount> {
    let path = dir.path().join(format!("{}.json", account.id()));
    fs::write(&path, serde_json::to_string_pretty(&account.serialize_key_chain())?)?;
    log::info!("📁 Wrote key records to {:?}", path);

    let records: Vec<KeyRecord> = serde_json::from_str(&fs::read_to_string(&path)?)?;
    let keys = SimpleHdKeyChain::from_key_records(&records)?;
    Ok(HdAccount::with_key_chain(Box::new(keys), account.coin_type()))
}

#[test]
fn test_restore_plain_account() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let account = test_account();
    account.fresh_receive_address()?;
    account.fresh_receive_address()?;
    account.mark_address_as_used(&receive_address_at(&account, 1))?;
    account.change_address()?;

    let restored = write_and_restore(&account, &dir)?;

    assert_eq!(restored.id(), account.id());
    assert_eq!(restored.public_key_serialized(), account.public_key_serialized());
    assert_eq!(restored.receive_address()?, account.receive_address()?);
    assert_eq!(
        restored.issued_receive_addresses(),
        account.issued_receive_addresses()
    );
    assert_eq!(
        restored.last_used_address(KeyPurpose::ReceiveFunds),
        account.last_used_address(KeyPurpose::ReceiveFunds)
    );
    assert_eq!(restored.active_addresses().len(), 2 * LOOKAHEAD as usize + 2);
    Ok(())
}

#[test]
fn test_restore_encrypted_account() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let account = test_account();
    let crypter = test_crypter();
    let aes_key = crypter.derive_key("vault")?;
    account.encrypt(&crypter, &aes_key)?;

    let records = account.serialize_key_chain();
    let Some(KeyRecord::Root { secret, .. }) = records.first() else {
        panic!("root record must come first");
    };
    assert!(matches!(secret, SecretRecord::Encrypted { .. }));

    let restored = write_and_restore(&account, &dir)?;
    assert!(restored.is_encrypted());
    assert_eq!(restored.key_crypter(), Some(crypter));

    let request = SignedMessage::unsigned(restored.receive_address()?.to_string(), "restored");
    assert_eq!(
        restored.sign_message(&request, Some(&aes_key)).status(),
        Some(MessageStatus::SignedOk)
    );

    restored.decrypt(&aes_key)?;
    assert!(!restored.is_encrypted());
    Ok(())
}

#[test]
fn test_accounts_of_other_coins_differ() -> anyhow::Result<()> {
    let bitcoin = test_account();
    let litecoin = HdAccount::from_mnemonic(
        common::MNEMONIC,
        "",
        0,
        &common::test_config(CoinType::Litecoin),
    )?;

    assert_ne!(bitcoin.id(), litecoin.id());
    assert_ne!(bitcoin.public_key(), litecoin.public_key());
    assert!(litecoin.receive_address()?.to_string().starts_with('L'));
    assert!(litecoin.to_string().ends_with("Litecoin"));
    Ok(())
}
