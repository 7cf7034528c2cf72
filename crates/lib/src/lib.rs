//!
//! Authchain: chain-of-custody validation for Ethereum-style delegated credentials.
//!
//! An owner key (an externally-owned address or a smart-contract wallet)
//! delegates signing authority to a short-lived *ephemeral* key, which in turn
//! signs the payload being authorized. The proof of that delegation is an
//! [`AuthChain`]: an ordered sequence of typed links folded sequentially so
//! that each link's output authority becomes the next link's expected signer.
//!
//! ## Core Concepts
//!
//! * **Chain model (`chain`)**: [`AuthLink`], [`LinkKind`] and the
//!   well-formedness check [`is_valid_auth_chain`].
//! * **Signature primitives (`crypto`)**: Ethereum message hashing, ECDSA
//!   sign/recover over secp256k1, and EIP-55 address derivation.
//! * **Validation (`validation`)**: [`validate_signature`], the sequential
//!   authority fold with one validator per link kind.
//! * **Providers (`provider`)**: the injected RPC capability
//!   ([`provider::EthereumProvider`]) consumed by the contract-wallet
//!   validator and the block resolver.
//! * **Block resolver (`blocks`)**: maps a wall-clock instant to the chain
//!   block bracketing it, so a contract-wallet check can be evaluated "as of"
//!   a past instant.
//! * **Builder (`builder`)**: constructs chains and reusable
//!   [`AuthIdentity`] credentials, the inverse of validation.

pub mod blocks;
pub mod builder;
pub mod chain;
pub mod crypto;
pub mod provider;
pub mod validation;

pub use chain::{
    AuthChain, AuthIdentity, AuthLink, LinkKind, ValidationResult, is_valid_auth_chain,
    owner_address,
};
pub use crypto::Identity;
pub use validation::validate_signature;

/// Result type used throughout the authchain library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the authchain library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Structured cryptography errors from the crypto module
    #[error(transparent)]
    Crypto(#[from] crypto::CryptoError),

    /// Structured RPC collaborator errors from the provider module
    #[error(transparent)]
    Provider(#[from] provider::ProviderError),

    /// Structured validation errors from the validation module
    #[error(transparent)]
    Validation(#[from] validation::ValidationError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Crypto(_) => "crypto",
            Error::Provider(_) => "provider",
            Error::Validation(_) => "validation",
        }
    }

    /// Check if this error came from the injected RPC capability.
    pub fn is_provider_error(&self) -> bool {
        matches!(self, Error::Provider(_))
    }

    /// Check if this error indicates an expired ephemeral credential.
    pub fn is_expired(&self) -> bool {
        match self {
            Error::Validation(err) => err.is_expired(),
            _ => false,
        }
    }
}
