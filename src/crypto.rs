//! Cryptographic primitives: recoverable ECDSA over secp256k1.
//!
//! The core only calls `sign` and `recover_signer`; key storage lives in
//! [`crate::wallet`]. Verifying a signed transaction means recovering the
//! public key from the signature and checking that its address equals the
//! declared sender.

use crate::error::{ChainError, Result};
use crate::transaction::Account;
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{All, Message, PublicKey, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

/// Length of a recoverable signature: 64 compact bytes plus the recovery id.
pub const SIGNATURE_SIZE: usize = 65;

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random keypair using the OS random number generator.
    pub fn generate() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(secret_key)
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self> {
        let secret_key = SecretKey::from_slice(bytes)
            .map_err(|e| ChainError::Crypto(format!("invalid secret key bytes: {}", e)))?;
        Ok(Self::from_secret_key(secret_key))
    }

    /// The account address: SHA-256 of the compressed public key.
    pub fn address(&self) -> Account {
        address_of(&self.public_key)
    }

    /// Signs a message and returns the 65-byte recoverable signature
    /// (compact form followed by the recovery id).
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let message = digest_message(message)?;
        let signature = SECP256K1_CONTEXT.sign_ecdsa_recoverable(&message, &self.secret_key);
        let (recovery_id, compact) = signature.serialize_compact();

        let mut bytes = compact.to_vec();
        bytes.push(recovery_id.to_i32() as u8);
        Ok(bytes)
    }
}

/// Derives the account address for a public key.
pub fn address_of(public_key: &PublicKey) -> Account {
    Account(Sha256::digest(public_key.serialize()).into())
}

/// Recovers the signer's address from a message and a recoverable signature.
/// Deterministic: the same message and signature always recover the same
/// address.
pub fn recover_signer(message: &[u8], signature: &[u8]) -> Result<Account> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(ChainError::Crypto(format!(
            "signature must be exactly {} bytes, got {}",
            SIGNATURE_SIZE,
            signature.len()
        )));
    }

    let recovery_id = RecoveryId::from_i32(signature[64] as i32)
        .map_err(|e| ChainError::Crypto(format!("invalid recovery id: {}", e)))?;
    let signature = RecoverableSignature::from_compact(&signature[..64], recovery_id)
        .map_err(|e| ChainError::Crypto(format!("invalid signature: {}", e)))?;

    let message = digest_message(message)?;
    let public_key = SECP256K1_CONTEXT
        .recover_ecdsa(&message, &signature)
        .map_err(|_| ChainError::Crypto("signature recovery failed".to_string()))?;

    Ok(address_of(&public_key))
}

fn digest_message(message: &[u8]) -> Result<Message> {
    let digest = Sha256::digest(message);
    Message::from_digest_slice(&digest)
        .map_err(|e| ChainError::Crypto(format!("failed to create message: {}", e)))
}
