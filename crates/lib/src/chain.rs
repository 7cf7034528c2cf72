//! Chain model for delegated credentials
//!
//! An [`AuthChain`] is an ordered proof of custody: it starts at a SIGNER link
//! declaring the trust root (the owner address) and ends at the payload being
//! authorized. Chains are immutable once built; validation only reads them.
//!
//! Link kinds serialize with the original wire tags so chains interoperate
//! with JSON produced by existing implementations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::Identity;

/// The closed set of link kinds an auth chain can contain.
///
/// The serde tags are the wire names; note that the personal variants drop the
/// `PERSONAL` infix on the wire for historical reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkKind {
    /// Declares the trust root; payload is the owner address, signature empty
    #[serde(rename = "SIGNER")]
    Signer,
    /// Owner delegates to an ephemeral key via personal sign
    #[serde(rename = "ECDSA_EPHEMERAL")]
    EcdsaPersonalEphemeral,
    /// Ephemeral key signs the final entity payload via personal sign
    #[serde(rename = "ECDSA_SIGNED_ENTITY")]
    EcdsaPersonalSignedEntity,
    /// Contract wallet delegates to an ephemeral key (ERC-1271 view call)
    #[serde(rename = "ECDSA_EIP_1654_EPHEMERAL")]
    EcdsaEip1654Ephemeral,
    /// Contract wallet signs the final entity payload (ERC-1271 view call)
    #[serde(rename = "ECDSA_EIP_1654_SIGNED_ENTITY")]
    EcdsaEip1654SignedEntity,
}

impl LinkKind {
    /// The wire tag for this kind, as used in serialized chains and in
    /// validation diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Signer => "SIGNER",
            LinkKind::EcdsaPersonalEphemeral => "ECDSA_EPHEMERAL",
            LinkKind::EcdsaPersonalSignedEntity => "ECDSA_SIGNED_ENTITY",
            LinkKind::EcdsaEip1654Ephemeral => "ECDSA_EIP_1654_EPHEMERAL",
            LinkKind::EcdsaEip1654SignedEntity => "ECDSA_EIP_1654_SIGNED_ENTITY",
        }
    }
}

impl std::fmt::Display for LinkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One delegation step in an auth chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLink {
    /// The link kind, serialized under the original `type` field name
    #[serde(rename = "type")]
    pub kind: LinkKind,
    /// Opaque payload; its interpretation depends on the kind
    pub payload: String,
    /// Hex-encoded signature, or the empty string for the root SIGNER link
    pub signature: String,
}

impl AuthLink {
    /// Build a link of the given kind.
    pub fn new(
        kind: LinkKind,
        payload: impl Into<String>,
        signature: impl Into<String>,
    ) -> Self {
        AuthLink {
            kind,
            payload: payload.into(),
            signature: signature.into(),
        }
    }

    /// Build the root SIGNER link declaring the owner address.
    pub fn signer(owner_address: impl Into<String>) -> Self {
        AuthLink::new(LinkKind::Signer, owner_address, "")
    }
}

/// An ordered proof chain from a root owner address to a final authorized
/// entity identifier.
pub type AuthChain = Vec<AuthLink>;

/// Check structural well-formedness of a chain.
///
/// A chain is well-formed iff it is non-empty, its first link is SIGNER, and
/// no other link is SIGNER. Malformed chains are rejected before any
/// cryptographic work.
pub fn is_valid_auth_chain(chain: &[AuthLink]) -> bool {
    match chain {
        [] => false,
        [first, rest @ ..] => {
            first.kind == LinkKind::Signer
                && rest.iter().all(|link| link.kind != LinkKind::Signer)
        }
    }
}

/// The owner address a chain claims as its trust root, if the chain starts
/// with a SIGNER link.
pub fn owner_address(chain: &[AuthLink]) -> Option<&str> {
    match chain.first() {
        Some(link) if link.kind == LinkKind::Signer => Some(&link.payload),
        _ => None,
    }
}

/// A reusable intermediate credential: an ephemeral identity plus the chain
/// prefix that delegates to it.
///
/// Produced by [`crate::builder::initialize_auth_chain`]; extend it with
/// [`crate::builder::sign_payload`] to authorize individual payloads until
/// the expiration instant passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthIdentity {
    /// The delegated short-lived identity
    pub ephemeral_identity: Identity,
    /// Instant after which the credential no longer validates
    pub expiration: DateTime<Utc>,
    /// Chain prefix ending at the ephemeral delegation link
    pub auth_chain: AuthChain,
}

/// Outcome of a chain validation run.
///
/// Success carries no message; failure carries a single diagnostic naming the
/// offending link kind and cause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the chain validated
    pub ok: bool,
    /// Diagnostic for failed validations
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    /// A passing result.
    pub fn ok() -> Self {
        ValidationResult {
            ok: true,
            message: None,
        }
    }

    /// A failing result with a diagnostic.
    pub fn fail(message: impl Into<String>) -> Self {
        ValidationResult {
            ok: false,
            message: Some(message.into()),
        }
    }
}
