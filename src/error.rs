//! Error types for protocol operations.

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during protocol operations.
///
/// Failures are always reported to the caller; nothing is retried
/// internally. No variant carries key material.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Input has the wrong length for its field
    #[error("bad input length")]
    BadLength,

    /// Point or public key failed to decode
    #[error("bad curve point")]
    BadPoint,

    /// Signature failed to verify
    #[error("bad signature")]
    BadSignature,

    /// Signed-prekey signature in a bundle failed to verify
    #[error("bad prekey signature")]
    BadPrekeySignature,

    /// VRF proof failed to verify
    #[error("bad proof")]
    BadProof,

    /// Referenced one-time prekey is not in the store
    #[error("unknown one-time prekey")]
    UnknownOneTimePrekey,

    /// No prekey available where one is required
    #[error("missing prekey")]
    MissingPrekey,

    /// Key derivation failed or a chain was not yet established
    #[error("key derivation failed")]
    DerivationFailed,

    /// AEAD tag did not verify; session state is unchanged
    #[error("decryption failed")]
    DecryptFailed,

    /// Skipped-message window exceeded; the session must be re-established
    #[error("receive chain too long")]
    ChainTooLong,
}
