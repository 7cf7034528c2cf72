//! Chain-of-custody validation
//!
//! [`validate_signature`] folds an [`AuthChain`] sequentially: each link's
//! output authority becomes the next link's expected signer. The ordering is
//! the security property being enforced, so links are never validated out of
//! order or in parallel. The fold stops at the first failing link and
//! surfaces a single diagnostic naming the link kind and cause; invalid input
//! data never panics the routine.
//!
//! Contract-wallet links (ERC-1271 / EIP-1654) have no local recovery: they
//! are checked through the injected [`EthereumProvider`], first at the chain
//! head and, when that does not return the magic value, pinned to the
//! historical block bracketing the reference time. A wallet's authorized
//! signer set can change, so validation must reflect state "as of" that
//! instant.

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error as ThisError;
use tracing::debug;

use crate::blocks::BlockFinder;
use crate::chain::{AuthLink, LinkKind, ValidationResult, is_valid_auth_chain};
use crate::crypto::{
    CryptoError, compute_address, create_eip1271_message_hash, create_ethereum_message_hash,
    decode_hex, decode_personal_signature, recover_public_key,
};
use crate::provider::EthereumProvider;

/// `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`.
///
/// Doubles as the function selector and as the value a conforming contract
/// must return to signal a valid signature.
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// Diagnostic emitted for structurally malformed chains, preserved verbatim
/// from the original wire format.
const MALFORMED_CHAIN_MESSAGE: &str = "ERROR: Malformed authChain";

const EPHEMERAL_ADDRESS_FIELD: &str = "Ephemeral address: ";
const EXPIRATION_FIELD: &str = "Expiration: ";

/// Errors that can occur while validating a single link.
#[non_exhaustive]
#[derive(Debug, ThisError)]
pub enum ValidationError {
    /// The chain violates the structural invariant (exactly one SIGNER link,
    /// at index 0).
    #[error("Malformed authChain")]
    MalformedChain,

    /// The recovered signer does not match the current authority.
    #[error("Signature mismatch. Expected signer {expected}, recovered {actual}")]
    SignatureMismatch {
        /// The authority the fold expected to have signed this link
        expected: String,
        /// The address actually recovered from the signature
        actual: String,
    },

    /// The ephemeral credential's expiration is not after the reference time.
    #[error("Ephemeral key expired. Expiration was {expiration}, reference time was {reference}")]
    Expired {
        /// The parsed expiration instant
        expiration: String,
        /// The reference instant the check ran against
        reference: String,
    },

    /// An ephemeral payload does not have the expected three-line shape.
    #[error("Malformed ephemeral payload: {reason}")]
    MalformedPayload {
        /// Description of the parse failure
        reason: String,
    },

    /// The injected RPC capability failed, reverted, or returned the wrong
    /// magic value.
    #[error("Collaborator failure: {reason}")]
    Collaborator {
        /// Description of the collaborator failure
        reason: String,
    },

    /// The chain is internally consistent but its terminus is not the
    /// caller's expected authority.
    #[error("Expected final authority to be {expected}, but it was {actual}")]
    FinalAuthorityMismatch {
        /// The authority the caller expected the chain to terminate at
        expected: String,
        /// The authority the fold actually produced
        actual: String,
    },

    /// A signature or key could not be decoded.
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

impl ValidationError {
    /// Check if this error indicates an expired credential.
    pub fn is_expired(&self) -> bool {
        matches!(self, ValidationError::Expired { .. })
    }

    /// Check if this error indicates a signer mismatch.
    pub fn is_signature_mismatch(&self) -> bool {
        matches!(self, ValidationError::SignatureMismatch { .. })
    }

    /// Check if this error came from the injected RPC capability.
    pub fn is_collaborator(&self) -> bool {
        matches!(self, ValidationError::Collaborator { .. })
    }
}

/// Validate that an auth chain proves custody from `expected_final_authority`
/// down to its final payload.
///
/// The chain is first checked structurally; malformed chains are rejected
/// without any cryptographic work or RPC calls. The fold then runs each
/// link's validator in order, threading the current authority through, and
/// finally compares the terminus against the expected authority.
///
/// # Arguments
/// * `expected_final_authority` - The authority the chain must terminate at
///   (typically the entity id being authorized)
/// * `auth_chain` - The chain to validate
/// * `provider` - RPC capability, required only for contract-wallet links
/// * `reference_time_millis` - Instant all expiration checks run against;
///   defaults to the current time. Supplying a past instant makes validation
///   deterministic and replayable.
pub async fn validate_signature(
    expected_final_authority: &str,
    auth_chain: &[AuthLink],
    provider: Option<&dyn EthereumProvider>,
    reference_time_millis: Option<u64>,
) -> ValidationResult {
    if !is_valid_auth_chain(auth_chain) {
        return ValidationResult::fail(MALFORMED_CHAIN_MESSAGE);
    }

    let reference_millis = reference_time_millis.unwrap_or_else(now_millis);

    let mut current_authority = String::new();
    for link in auth_chain {
        debug!(kind = %link.kind, authority = %current_authority, "validating link");
        match validate_link(&current_authority, link, provider, reference_millis).await {
            Ok(next_authority) => current_authority = next_authority,
            Err(err) => {
                return ValidationResult::fail(format!("ERROR. Link type: {}. {err}.", link.kind));
            }
        }
    }

    if current_authority == expected_final_authority {
        ValidationResult::ok()
    } else {
        let err = ValidationError::FinalAuthorityMismatch {
            expected: expected_final_authority.to_string(),
            actual: current_authority,
        };
        ValidationResult::fail(format!("ERROR. {err}."))
    }
}

/// Dispatch a single link to its validator.
///
/// Contract: consumes the current authority, produces the next one. The
/// match is exhaustive over the closed [`LinkKind`] enum; unknown wire tags
/// never reach this point because deserialization rejects them.
async fn validate_link(
    authority: &str,
    link: &AuthLink,
    provider: Option<&dyn EthereumProvider>,
    reference_millis: u64,
) -> Result<String, ValidationError> {
    match link.kind {
        // Declares the trust root; no cryptographic check.
        LinkKind::Signer => Ok(link.payload.clone()),
        LinkKind::EcdsaPersonalSignedEntity => validate_personal_signed_entity(authority, link),
        LinkKind::EcdsaPersonalEphemeral => {
            validate_personal_ephemeral(authority, link, reference_millis)
        }
        LinkKind::EcdsaEip1654SignedEntity => {
            let message = link.payload.clone();
            validate_contract_signature(authority, &message, &link.signature, provider, reference_millis)
                .await?;
            Ok(message)
        }
        LinkKind::EcdsaEip1654Ephemeral => {
            validate_eip1654_ephemeral(authority, link, provider, reference_millis).await
        }
    }
}

/// Personal-sign link over an opaque entity payload.
fn validate_personal_signed_entity(
    authority: &str,
    link: &AuthLink,
) -> Result<String, ValidationError> {
    let recovered = recover_signer(&link.signature, &link.payload)?;
    if !authority.eq_ignore_ascii_case(&recovered) {
        return Err(ValidationError::SignatureMismatch {
            expected: authority.to_string(),
            actual: recovered,
        });
    }
    Ok(link.payload.clone())
}

/// Personal-sign delegation to an ephemeral key.
///
/// The expiration is checked before any recovery work; on success the next
/// authority is the parsed ephemeral address, not the recovered signer.
fn validate_personal_ephemeral(
    authority: &str,
    link: &AuthLink,
    reference_millis: u64,
) -> Result<String, ValidationError> {
    let payload = EphemeralPayload::parse(&link.payload)?;
    payload.check_expiration(reference_millis)?;

    // The signature covers the payload exactly as transmitted, including any
    // carriage returns.
    let recovered = recover_signer(&link.signature, &link.payload)?;
    if !authority.eq_ignore_ascii_case(&recovered) {
        return Err(ValidationError::SignatureMismatch {
            expected: authority.to_string(),
            actual: recovered,
        });
    }
    Ok(payload.ephemeral_address)
}

/// Contract-wallet delegation to an ephemeral key.
async fn validate_eip1654_ephemeral(
    authority: &str,
    link: &AuthLink,
    provider: Option<&dyn EthereumProvider>,
    reference_millis: u64,
) -> Result<String, ValidationError> {
    let payload = EphemeralPayload::parse(&link.payload)?;
    payload.check_expiration(reference_millis)?;

    // Contract wallets validate the normalized message, so chains signed with
    // either line ending verify against the same on-chain signer set.
    validate_contract_signature(
        authority,
        &payload.message,
        &link.signature,
        provider,
        reference_millis,
    )
    .await?;
    Ok(payload.ephemeral_address)
}

/// Run `isValidSignature(bytes32,bytes)` against the wallet contract at
/// `authority`.
///
/// The call is made at the chain head first; when the head does not return
/// the magic value, it is retried pinned to the historical block bracketing
/// the reference time before the link is failed.
async fn validate_contract_signature(
    authority: &str,
    message: &str,
    signature_hex: &str,
    provider: Option<&dyn EthereumProvider>,
    reference_millis: u64,
) -> Result<(), ValidationError> {
    let provider = provider.ok_or_else(|| ValidationError::Collaborator {
        reason: "an Ethereum provider is required for contract-wallet links".to_string(),
    })?;

    let hash = create_eip1271_message_hash(message);
    let signature = decode_hex(signature_hex)?;
    let args = encode_is_valid_signature_args(&hash, &signature);

    match call_returns_magic(provider, authority, &args, None).await {
        Ok(true) => return Ok(()),
        Ok(false) | Err(_) => {}
    }

    let finder = BlockFinder::new(provider);
    let block = finder
        .block_for_timestamp(reference_millis, true)
        .await
        .map_err(|e| ValidationError::Collaborator {
            reason: e.to_string(),
        })?;
    debug!(block, "retrying contract-wallet check at historical block");

    match call_returns_magic(provider, authority, &args, Some(block)).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(ValidationError::Collaborator {
            reason: format!("contract at {authority} did not return the ERC-1271 magic value"),
        }),
        Err(e) => Err(ValidationError::Collaborator {
            reason: e.to_string(),
        }),
    }
}

async fn call_returns_magic(
    provider: &dyn EthereumProvider,
    contract: &str,
    args: &[u8],
    block: Option<u64>,
) -> Result<bool, crate::provider::ProviderError> {
    let returned = provider
        .call_view(contract, ERC1271_MAGIC_VALUE, args, block)
        .await?;
    Ok(returned.len() >= 4 && returned[..4] == ERC1271_MAGIC_VALUE)
}

/// ABI-encode the arguments of `isValidSignature(bytes32 hash, bytes sig)`.
///
/// Layout: the hash word, the offset word pointing at the dynamic bytes
/// (0x40), then length-prefixed signature bytes padded to a 32-byte boundary.
fn encode_is_valid_signature_args(hash: &[u8; 32], signature: &[u8]) -> Vec<u8> {
    let padded = signature.len().div_ceil(32) * 32;
    let mut out = Vec::with_capacity(96 + padded);
    out.extend_from_slice(hash);
    out.extend_from_slice(&abi_word(0x40));
    out.extend_from_slice(&abi_word(signature.len() as u64));
    out.extend_from_slice(signature);
    out.resize(96 + padded, 0);
    out
}

fn abi_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// Recover the checksummed signer address from a personal-sign link.
fn recover_signer(signature_hex: &str, payload: &str) -> Result<String, ValidationError> {
    let signature = decode_personal_signature(signature_hex)?;
    let hash = create_ethereum_message_hash(payload);
    Ok(compute_address(&recover_public_key(&signature, &hash)?)?)
}

/// The parsed three-line ephemeral payload.
///
/// Shape: a human label, `Ephemeral address: <addr>`, `Expiration: <rfc3339>`.
/// Both `\n` and `\r\n` line endings are accepted; carriage returns are
/// stripped before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EphemeralPayload {
    /// The payload with carriage returns removed
    message: String,
    ephemeral_address: String,
    expiration: DateTime<Utc>,
}

impl EphemeralPayload {
    fn parse(payload: &str) -> Result<Self, ValidationError> {
        let message = payload.replace('\r', "");
        let mut lines = message.split('\n');

        let _label = lines.next();
        let ephemeral_address = lines
            .next()
            .and_then(|line| line.strip_prefix(EPHEMERAL_ADDRESS_FIELD))
            .ok_or_else(|| ValidationError::MalformedPayload {
                reason: format!("missing '{}' line", EPHEMERAL_ADDRESS_FIELD.trim_end()),
            })?
            .to_string();
        let expiration_text = lines
            .next()
            .and_then(|line| line.strip_prefix(EXPIRATION_FIELD))
            .ok_or_else(|| ValidationError::MalformedPayload {
                reason: format!("missing '{}' line", EXPIRATION_FIELD.trim_end()),
            })?;

        let expiration = DateTime::parse_from_rfc3339(expiration_text)
            .map_err(|e| ValidationError::MalformedPayload {
                reason: format!("unparseable expiration '{expiration_text}': {e}"),
            })?
            .with_timezone(&Utc);

        Ok(EphemeralPayload {
            message,
            ephemeral_address,
            expiration,
        })
    }

    /// Fail unless the reference instant is strictly before the expiration.
    fn check_expiration(&self, reference_millis: u64) -> Result<(), ValidationError> {
        let expiration_millis = self.expiration.timestamp_millis();
        if reference_millis as i64 >= expiration_millis {
            let reference = DateTime::<Utc>::from_timestamp_millis(reference_millis as i64)
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
                .unwrap_or_else(|| reference_millis.to_string());
            return Err(ValidationError::Expired {
                expiration: self
                    .expiration
                    .to_rfc3339_opts(SecondsFormat::Millis, true),
                reference,
            });
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
