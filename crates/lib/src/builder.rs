//! Chain construction
//!
//! The inverse of validation: builds the chains and reusable credentials that
//! [`crate::validate_signature`] later checks. A full chain has three links,
//! SIGNER, an ephemeral delegation signed by the owner, and a signed-entity
//! link signed by the ephemeral key.

use std::future::Future;

use chrono::{DateTime, Duration, SecondsFormat, Utc};

use crate::chain::{AuthChain, AuthIdentity, AuthLink, LinkKind};
use crate::crypto::{Identity, create_ethereum_message_hash, sign_hex};
use crate::provider::ProviderError;
use crate::{Error, Result};

/// Human-readable first line of the ephemeral delegation payload.
///
/// Validators ignore it; it exists so wallet UIs show users something
/// meaningful when asked to sign the delegation.
pub const EPHEMERAL_MESSAGE_LABEL: &str = "Ephemeral Login";

/// Hex signature strings longer than this come from contract wallets.
///
/// A single recoverable ECDSA signature is 65 bytes (132 hex chars with the
/// prefix); contract wallets concatenate several. This length heuristic is
/// how link kinds are disambiguated at creation time; there is no protocol
/// tag.
const PERSONAL_SIGNATURE_MAX_LENGTH: usize = 150;

/// Format the three-line ephemeral delegation payload.
///
/// The expiration is rendered as RFC 3339 with millisecond precision and a
/// `Z` suffix, matching what validators parse back out.
pub fn ephemeral_message(ephemeral_address: &str, expiration: DateTime<Utc>) -> String {
    format!(
        "{EPHEMERAL_MESSAGE_LABEL}\nEphemeral address: {ephemeral_address}\nExpiration: {}",
        expiration.to_rfc3339_opts(SecondsFormat::Millis, true)
    )
}

/// Personal-sign a message with an identity, returning the hex signature.
pub fn create_signature(identity: &Identity, message: &str) -> Result<String> {
    let secret_key = identity.secret_key()?;
    Ok(sign_hex(&secret_key, &create_ethereum_message_hash(message)))
}

/// Pick the ephemeral link kind for an externally produced signature.
///
/// Contract-wallet signatures are recognized purely by length; see
/// [`PERSONAL_SIGNATURE_MAX_LENGTH`].
pub fn ephemeral_signature_kind(signature: &str) -> LinkKind {
    if signature.len() > PERSONAL_SIGNATURE_MAX_LENGTH {
        LinkKind::EcdsaEip1654Ephemeral
    } else {
        LinkKind::EcdsaPersonalEphemeral
    }
}

/// Build a complete three-link chain authorizing `entity_id`.
///
/// The ephemeral credential expires `ephemeral_minutes` from now; a negative
/// value yields an already-expired chain, which is useful for replaying past
/// validations.
pub fn create_auth_chain(
    owner: &Identity,
    ephemeral: &Identity,
    ephemeral_minutes: i64,
    entity_id: &str,
) -> Result<AuthChain> {
    create_auth_chain_with_expiration(
        owner,
        ephemeral,
        Utc::now() + Duration::minutes(ephemeral_minutes),
        entity_id,
    )
}

/// Like [`create_auth_chain`] but with an explicit expiration instant.
pub fn create_auth_chain_with_expiration(
    owner: &Identity,
    ephemeral: &Identity,
    expiration: DateTime<Utc>,
    entity_id: &str,
) -> Result<AuthChain> {
    let message = ephemeral_message(&ephemeral.address, expiration);
    let delegation_signature = create_signature(owner, &message)?;
    let entity_signature = create_signature(ephemeral, entity_id)?;

    Ok(vec![
        AuthLink::signer(owner.address.clone()),
        AuthLink::new(LinkKind::EcdsaPersonalEphemeral, message, delegation_signature),
        AuthLink::new(
            LinkKind::EcdsaPersonalSignedEntity,
            entity_id,
            entity_signature,
        ),
    ])
}

/// Build a two-link chain where the owner signs the final payload directly,
/// with no ephemeral delegation.
pub fn create_simple_auth_chain(
    final_payload: &str,
    owner_address: &str,
    signature: &str,
) -> AuthChain {
    vec![
        AuthLink::signer(owner_address),
        AuthLink::new(LinkKind::EcdsaPersonalSignedEntity, final_payload, signature),
    ]
}

/// Build a reusable [`AuthIdentity`] by asking an external signer (hardware
/// or remote wallet) to sign the ephemeral delegation.
///
/// The returned signature's length decides whether the delegation link is a
/// personal or a contract-wallet link; see [`ephemeral_signature_kind`].
pub async fn initialize_auth_chain<F, Fut>(
    owner_address: &str,
    ephemeral_identity: Identity,
    ephemeral_minutes: i64,
    signer: F,
) -> Result<AuthIdentity>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = std::result::Result<String, ProviderError>>,
{
    initialize_auth_chain_with_expiration(
        owner_address,
        ephemeral_identity,
        Utc::now() + Duration::minutes(ephemeral_minutes),
        signer,
    )
    .await
}

/// Like [`initialize_auth_chain`] but with an explicit expiration instant.
pub async fn initialize_auth_chain_with_expiration<F, Fut>(
    owner_address: &str,
    ephemeral_identity: Identity,
    expiration: DateTime<Utc>,
    signer: F,
) -> Result<AuthIdentity>
where
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = std::result::Result<String, ProviderError>>,
{
    let message = ephemeral_message(&ephemeral_identity.address, expiration);
    let signature = signer(message.clone()).await.map_err(Error::Provider)?;

    let auth_chain = vec![
        AuthLink::signer(owner_address),
        AuthLink::new(ephemeral_signature_kind(&signature), message, signature),
    ];

    Ok(AuthIdentity {
        ephemeral_identity,
        expiration,
        auth_chain,
    })
}

/// Extend a credential with a final signed-entity link authorizing
/// `entity_id`.
///
/// The credential itself is not consumed; one `AuthIdentity` can sign many
/// payloads until it expires.
pub fn sign_payload(auth_identity: &AuthIdentity, entity_id: &str) -> Result<AuthChain> {
    let signature = create_signature(&auth_identity.ephemeral_identity, entity_id)?;

    let mut chain = auth_identity.auth_chain.clone();
    chain.push(AuthLink::new(
        LinkKind::EcdsaPersonalSignedEntity,
        entity_id,
        signature,
    ));
    Ok(chain)
}
