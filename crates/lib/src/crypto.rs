//! Cryptographic primitives for authchain credentials
//!
//! This module provides Ethereum-style message hashing, recoverable ECDSA
//! signatures over secp256k1, and EIP-55 checksummed address derivation.
//! Signatures travel as 65-byte `r ‖ s ‖ v` blobs, hex-encoded with a `0x`
//! prefix; the recovery byte `v` is accepted in both the legacy (0/1) and the
//! canonical (27/28) encoding.

use rand::rngs::OsRng;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;
use tiny_keccak::{Hasher, Keccak};

/// Size of a recoverable Ethereum signature in bytes (r:32, s:32, v:1)
pub const SIGNATURE_SIZE: usize = 65;

/// Size of an uncompressed secp256k1 public key without the 0x04 prefix
pub const PUBLIC_KEY_SIZE: usize = 64;

/// Prefix hashed in front of personal-sign payloads
const ETHEREUM_MESSAGE_PREFIX: &str = "\x19Ethereum Signed Message:\n";

/// Errors that can occur in the cryptographic primitives.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum CryptoError {
    /// A hex string could not be decoded.
    #[error("Invalid hex encoding: {reason}")]
    InvalidHex {
        /// Description of the decoding failure
        reason: String,
    },

    /// A signature blob has the wrong length.
    #[error("Invalid signature length: expected {SIGNATURE_SIZE} bytes, got {length}")]
    InvalidSignatureLength {
        /// The length that was actually supplied
        length: usize,
    },

    /// The recovery byte is not one of 0, 1, 27 or 28.
    #[error("Invalid recovery id: {value}")]
    InvalidRecoveryId {
        /// The recovery byte that was supplied
        value: u8,
    },

    /// A public key has the wrong length.
    #[error("Invalid public key length: expected {PUBLIC_KEY_SIZE} or 65 bytes, got {length}")]
    InvalidPublicKeyLength {
        /// The length that was actually supplied
        length: usize,
    },

    /// A private key could not be parsed.
    #[error("Invalid private key: {reason}")]
    InvalidPrivateKey {
        /// Description of the parsing failure
        reason: String,
    },

    /// The underlying secp256k1 operation failed.
    #[error("Secp256k1 operation failed: {0}")]
    Secp256k1(#[from] secp256k1::Error),
}

impl CryptoError {
    /// Check if this error indicates malformed input rather than a failed operation.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            CryptoError::InvalidHex { .. }
                | CryptoError::InvalidSignatureLength { .. }
                | CryptoError::InvalidRecoveryId { .. }
                | CryptoError::InvalidPublicKeyLength { .. }
                | CryptoError::InvalidPrivateKey { .. }
        )
    }
}

/// Compute the keccak256 digest of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut output = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut output);
    output
}

/// Hash a payload the way `personal_sign` does.
///
/// The digest is `keccak256("\x19Ethereum Signed Message:\n" + <decimal byte
/// length of payload> + payload)`.
pub fn create_ethereum_message_hash(payload: impl AsRef<[u8]>) -> [u8; 32] {
    let payload = payload.as_ref();
    let mut data = Vec::with_capacity(ETHEREUM_MESSAGE_PREFIX.len() + 20 + payload.len());
    data.extend_from_slice(ETHEREUM_MESSAGE_PREFIX.as_bytes());
    data.extend_from_slice(payload.len().to_string().as_bytes());
    data.extend_from_slice(payload);
    keccak256(&data)
}

/// Hash a payload for ERC-1271 contract-wallet validation.
///
/// Contract wallets receive the plain keccak256 of the raw UTF-8 payload,
/// without the personal-sign prefix.
pub fn create_eip1271_message_hash(payload: impl AsRef<[u8]>) -> [u8; 32] {
    keccak256(payload.as_ref())
}

/// Sign a 32-byte digest, returning the 65-byte `r ‖ s ‖ v` signature.
///
/// The recovery byte uses the canonical 27/28 encoding.
pub fn sign(secret_key: &SecretKey, hash: &[u8; 32]) -> [u8; SIGNATURE_SIZE] {
    let secp = Secp256k1::new();
    let message = Message::from_digest(*hash);
    let signature = secp.sign_ecdsa_recoverable(&message, secret_key);
    let (recovery_id, compact) = signature.serialize_compact();

    let mut out = [0u8; SIGNATURE_SIZE];
    out[..64].copy_from_slice(&compact);
    out[64] = 27 + recovery_id.to_i32() as u8;
    out
}

/// Sign a 32-byte digest and return the signature as a `0x`-prefixed hex string.
pub fn sign_hex(secret_key: &SecretKey, hash: &[u8; 32]) -> String {
    encode_hex(&sign(secret_key, hash))
}

/// Recover the uncompressed public key (without the 0x04 prefix) that signed
/// `hash`.
///
/// The recovery byte is accepted in both the legacy (0/1) and the canonical
/// (27/28) encoding and normalized internally.
pub fn recover_public_key(
    signature: &[u8],
    hash: &[u8; 32],
) -> Result<[u8; PUBLIC_KEY_SIZE], CryptoError> {
    if signature.len() != SIGNATURE_SIZE {
        return Err(CryptoError::InvalidSignatureLength {
            length: signature.len(),
        });
    }

    let index = match signature[64] {
        0 | 27 => 0,
        1 | 28 => 1,
        value => return Err(CryptoError::InvalidRecoveryId { value }),
    };

    let secp = Secp256k1::new();
    let message = Message::from_digest(*hash);
    let recovery_id = RecoveryId::from_i32(index)?;
    let recoverable = RecoverableSignature::from_compact(&signature[..64], recovery_id)?;
    let public_key = secp.recover_ecdsa(&message, &recoverable)?;

    let uncompressed = public_key.serialize_uncompressed();
    let mut out = [0u8; PUBLIC_KEY_SIZE];
    out.copy_from_slice(&uncompressed[1..]);
    Ok(out)
}

/// Derive the EIP-55 checksummed address of a public key.
///
/// Accepts either the 64-byte raw key or the 65-byte `0x04`-prefixed
/// uncompressed form. The address is the low 20 bytes of the keccak256 of the
/// raw key.
pub fn compute_address(public_key: &[u8]) -> Result<String, CryptoError> {
    let raw = match public_key.len() {
        PUBLIC_KEY_SIZE => public_key,
        65 if public_key[0] == 0x04 => &public_key[1..],
        length => return Err(CryptoError::InvalidPublicKeyLength { length }),
    };

    let digest = keccak256(raw);
    Ok(to_checksum_address(&hex::encode(&digest[12..])))
}

/// Apply the EIP-55 mixed-case checksum to a hex address.
///
/// The input may carry a `0x` prefix and arbitrary casing; the output is
/// always `0x`-prefixed.
pub fn to_checksum_address(address: &str) -> String {
    let lower = address.trim_start_matches("0x").to_ascii_lowercase();
    let digest = keccak256(lower.as_bytes());

    let mut out = String::with_capacity(2 + lower.len());
    out.push_str("0x");
    for (i, ch) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if ch.is_ascii_alphabetic() && nibble >= 8 {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Recover the checksummed signer address of a personal-sign signature over
/// `msg`.
pub fn recover_address_from_eth_signature(
    signature_hex: &str,
    msg: impl AsRef<[u8]>,
) -> Result<String, CryptoError> {
    let signature = decode_personal_signature(signature_hex)?;
    let hash = create_ethereum_message_hash(msg);
    compute_address(&recover_public_key(&signature, &hash)?)
}

/// Decode a `0x`-prefixed hex string.
pub fn decode_hex(value: &str) -> Result<Vec<u8>, CryptoError> {
    hex::decode(value.trim_start_matches("0x")).map_err(|e| CryptoError::InvalidHex {
        reason: e.to_string(),
    })
}

/// Encode bytes as a `0x`-prefixed lowercase hex string.
pub fn encode_hex(data: &[u8]) -> String {
    format!("0x{}", hex::encode(data))
}

/// Decode a hex signature string and require the 65-byte personal-sign shape.
pub fn decode_personal_signature(value: &str) -> Result<[u8; SIGNATURE_SIZE], CryptoError> {
    let bytes = decode_hex(value)?;
    let length = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidSignatureLength { length })
}

/// A self-contained Ethereum identity: private key, public key and address,
/// all as `0x`-prefixed hex strings.
///
/// Serializes with the original camelCase wire field names so credentials
/// interoperate with existing JSON chains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Hex-encoded 32-byte secp256k1 secret key
    pub private_key: String,
    /// Hex-encoded 64-byte uncompressed public key (no 0x04 prefix)
    pub public_key: String,
    /// EIP-55 checksummed address
    pub address: String,
}

impl Identity {
    /// Generate a fresh identity from the OS random number generator.
    pub fn random() -> Self {
        let secret_key = SecretKey::new(&mut OsRng);
        Self::from_secret_key(&secret_key)
    }

    /// Build the identity triple for an existing secret key.
    pub fn from_secret_key(secret_key: &SecretKey) -> Self {
        let secp = Secp256k1::new();
        let public_key = PublicKey::from_secret_key(&secp, secret_key);
        let raw = &public_key.serialize_uncompressed()[1..];

        // compute_address cannot fail for a well-formed 64-byte key
        let address = compute_address(raw).unwrap_or_default();

        Identity {
            private_key: encode_hex(&secret_key.secret_bytes()),
            public_key: encode_hex(raw),
            address,
        }
    }

    /// Parse the private key back into a typed secret key.
    pub fn secret_key(&self) -> Result<SecretKey, CryptoError> {
        let bytes = decode_hex(&self.private_key)?;
        SecretKey::from_slice(&bytes).map_err(|e| CryptoError::InvalidPrivateKey {
            reason: e.to_string(),
        })
    }
}
