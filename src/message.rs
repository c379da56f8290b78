//! Signed messages
//!
//! Messages are hashed the way `signmessage` does it, with the coin's own
//! header: `sha256d(len(header) || header || len(message) || message)` where
//! lengths are consensus `VarInt`s. Signatures are the 65-byte
//! recoverable form, so verification only needs the address.

use bitcoin::consensus::encode::{serialize, VarInt};
use bitcoin::hashes::{sha256d, Hash, HashEngine};
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sign_message::MessageSignature;
use serde::{Deserialize, Serialize};

use crate::address::BitAddress;
use crate::coins::CoinType;

/// Outcome of signing or verifying a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageStatus {
    AddressMalformed,
    MissingPrivateKey,
    KeyIsEncrypted,
    SignedOk,
    InvalidMessageSignature,
    InvalidSigningAddress,
    VerifiedOk,
}

/// A message with the address it is signed for
///
/// Signing and verification return a new value with the outcome set; the
/// request itself is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMessage {
    address: String,
    message: String,
    #[serde(with = "hex::serde")]
    signature: Vec<u8>,
    #[serde(default)]
    status: Option<MessageStatus>,
}

impl SignedMessage {
    pub fn unsigned(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            message: message.into(),
            signature: Vec::new(),
            status: None,
        }
    }

    pub fn with_signature(
        address: impl Into<String>,
        message: impl Into<String>,
        signature: Vec<u8>,
    ) -> Self {
        Self {
            signature,
            ..Self::unsigned(address, message)
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Signature bytes, `None` when no signature is attached
    pub fn signature(&self) -> Option<&[u8]> {
        if self.signature.is_empty() {
            None
        } else {
            Some(&self.signature)
        }
    }

    /// Outcome of the last sign or verify, `None` before either ran
    pub fn status(&self) -> Option<MessageStatus> {
        self.status
    }

    pub(crate) fn with_status(&self, status: MessageStatus) -> Self {
        Self {
            status: Some(status),
            ..self.clone()
        }
    }

    pub(crate) fn signed(&self, signature: Vec<u8>) -> Self {
        Self {
            signature,
            status: Some(MessageStatus::SignedOk),
            ..self.clone()
        }
    }
}

/// Feed `bytes` prefixed with their compact-size length
fn input_with_length<E: HashEngine>(engine: &mut E, bytes: &[u8]) {
    engine.input(&serialize(&VarInt::from(bytes.len())));
    engine.input(bytes);
}

/// Hash of `message` under the coin's signed message header
pub fn signed_message_hash(coin: CoinType, message: &str) -> sha256d::Hash {
    let header = coin.signed_message_header();
    let mut engine = sha256d::Hash::engine();

    input_with_length(&mut engine, header.as_bytes());
    input_with_length(&mut engine, message.as_bytes());

    sha256d::Hash::from_engine(engine)
}

/// Sign with a compressed-key recoverable signature
pub fn sign_message_hash(secret: &SecretKey, hash: sha256d::Hash) -> Vec<u8> {
    let secp = Secp256k1::signing_only();
    let digest = Message::from_digest(hash.to_byte_array());
    let signature = secp.sign_ecdsa_recoverable(&digest, secret);

    MessageSignature::new(signature, true).serialize().to_vec()
}

/// Recover the signing address from a signature, `None` if it is malformed
pub fn recover_address(
    coin: CoinType,
    message: &str,
    signature: &[u8],
) -> Option<BitAddress> {
    let signature = MessageSignature::from_slice(signature).ok()?;
    let secp = Secp256k1::verification_only();
    let pubkey = signature
        .recover_pubkey(&secp, signed_message_hash(coin, message))
        .ok()?;

    Some(BitAddress::from_public_key(coin, &pubkey))
}
