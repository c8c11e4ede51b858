//! Cryptographic primitives: key derivation and authenticated encryption.

use crate::error::{Error, Result};
use crate::keys::DhOutput;

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// HKDF info string for the X3DH session secret
const X3DH_INFO: &[u8] = b"X3DH-Signal";

/// HKDF info string for the root-key ratchet
const ROOT_INFO: &[u8] = b"DR-RK";

/// HKDF info string for per-message nonce derivation
const NONCE_INFO: &[u8] = b"DR-Nonce";

/// Leading block of the X3DH key material.
///
/// 32 bytes of 0xFF keep Diffie-Hellman outputs out of the XEdDSA hash
/// domain, which reserves the same prefix values for its own use.
const DH_PREFIX: [u8; 32] = [0xFF; 32];

/// Size of derived keys (32 bytes for 256-bit security)
pub const KEY_SIZE_32: usize = 32;

/// Size of derived keys (64 bytes for 512-bit security)
pub const KEY_SIZE_64: usize = 64;

/// Size of authentication tags for AEAD
pub const TAG_SIZE: usize = 16;

/// Size of nonce for AES-256-GCM
pub const NONCE_SIZE: usize = 12;

/// Derived symmetric key with automatic zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; KEY_SIZE_32]);

impl SymmetricKey {
    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    /// Get key as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

/// X3DH key derivation.
///
/// `SK = HKDF(0xFF*32 || DH1 || DH2 || DH3 || DH4?, salt=zeros(32),
/// info="X3DH-Signal", 32)`. The fourth output is present iff a one-time
/// prekey was consumed.
pub fn derive_session_key(
    dh1: &DhOutput,
    dh2: &DhOutput,
    dh3: &DhOutput,
    dh4: Option<&DhOutput>,
) -> Result<SymmetricKey> {
    let mut input = Vec::with_capacity(160);
    input.extend_from_slice(&DH_PREFIX);
    input.extend_from_slice(dh1.as_bytes());
    input.extend_from_slice(dh2.as_bytes());
    input.extend_from_slice(dh3.as_bytes());
    if let Some(dh4) = dh4 {
        input.extend_from_slice(dh4.as_bytes());
    }

    let hkdf = Hkdf::<Sha256>::new(Some(&[0u8; KEY_SIZE_32]), &input);
    let mut output = [0u8; KEY_SIZE_32];
    let expanded = hkdf.expand(X3DH_INFO, &mut output);

    input.zeroize();
    expanded.map_err(|_| Error::DerivationFailed)?;
    Ok(SymmetricKey(output))
}

/// Derives a new root key and chain key from a DH ratchet output.
///
/// `(RK', CK) = HKDF(ikm=dh_output, salt=RK, info="DR-RK", 64)`, split
/// into 32-byte halves.
pub fn kdf_root(
    root_key: &SymmetricKey,
    dh_output: &DhOutput,
) -> Result<(SymmetricKey, SymmetricKey)> {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key.as_bytes()), dh_output.as_bytes());

    let mut output = [0u8; KEY_SIZE_64];
    hkdf.expand(ROOT_INFO, &mut output)
        .map_err(|_| Error::DerivationFailed)?;

    let new_root = SymmetricKey::from_bytes(output[..KEY_SIZE_32].try_into().expect("split is 32 bytes"));
    let new_chain = SymmetricKey::from_bytes(output[KEY_SIZE_32..].try_into().expect("split is 32 bytes"));

    output.zeroize();
    Ok((new_root, new_chain))
}

/// Advances a chain key and derives the next message key.
///
/// `message_key = HMAC(chain_key, 0x01)`,
/// `new_chain_key = HMAC(chain_key, 0x02)`. Both peers must use this
/// construction; it is the symmetric half of the ratchet.
#[must_use]
pub fn kdf_chain(chain_key: &SymmetricKey) -> (SymmetricKey, SymmetricKey) {
    type HmacSha256 = Hmac<Sha256>;

    let mut mac = <HmacSha256 as Mac>::new_from_slice(chain_key.as_bytes())
        .expect("HMAC accepts any key size");
    mac.update(&[0x01]);
    let message_key = SymmetricKey::from_bytes(mac.finalize().into_bytes().into());

    let mut mac = <HmacSha256 as Mac>::new_from_slice(chain_key.as_bytes())
        .expect("HMAC accepts any key size");
    mac.update(&[0x02]);
    let new_chain_key = SymmetricKey::from_bytes(mac.finalize().into_bytes().into());

    (new_chain_key, message_key)
}

/// Derives the AEAD nonce for a message key.
///
/// Each message key encrypts exactly one message, so a nonce derived from
/// the key itself is unique per (key, message) pair on both peers.
#[must_use]
pub fn derive_nonce(message_key: &SymmetricKey) -> [u8; NONCE_SIZE] {
    let hkdf = Hkdf::<Sha256>::new(None, message_key.as_bytes());
    let mut nonce = [0u8; NONCE_SIZE];
    hkdf.expand(NONCE_INFO, &mut nonce)
        .expect("12-byte HKDF output is always valid");
    nonce
}

/// Encrypt a message using AES-256-GCM.
///
/// Returns ciphertext with the 16-byte authentication tag appended.
/// Associated data is authenticated but not encrypted.
pub fn encrypt(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    plaintext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let payload = Payload {
        msg: plaintext,
        aad: associated_data,
    };

    cipher
        .encrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| Error::BadLength)
}

/// Decrypt a message using AES-256-GCM.
///
/// # Errors
/// Returns [`Error::DecryptFailed`] if the tag does not verify.
pub fn decrypt(
    key: &SymmetricKey,
    nonce: &[u8; NONCE_SIZE],
    ciphertext: &[u8],
    associated_data: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::DecryptFailed);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let payload = Payload {
        msg: ciphertext,
        aad: associated_data,
    };

    cipher
        .decrypt(Nonce::from_slice(nonce), payload)
        .map_err(|_| Error::DecryptFailed)
}
